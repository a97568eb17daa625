//! Wire-line cleanup and the two frame parsers (legacy and CAN) that turn
//! cleaned hex lines into reassembled [`crate::message::Message`]s.

pub mod can;
pub mod legacy;

use crate::ecu::ECUID;

/// One cleaned-up line of adapter output, not yet classified as legacy or
/// CAN: just the raw bytes left after hex cleanup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLine(pub Vec<u8>);

/// Upper-cases, strips whitespace/`SEARCHING...` noise, and keeps a line
/// only if what remains is an even-length hex string at least
/// `min_hex_chars` long. `min_hex_chars` is 4 in emulator-compat mode, 12
/// for normal legacy, 6 for CAN (the configured minimum is chosen by the
/// caller based on the active protocol and [`crate::config::Config`]).
pub fn clean_line(line: &str, min_hex_chars: usize) -> Option<RawLine> {
    let upper = line.to_ascii_uppercase();
    let hex: String = upper
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    let hex = hex.replace("SEARCHING...", "");
    if hex.is_empty() || hex.len() % 2 != 0 || hex.len() < min_hex_chars {
        return None;
    }
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let bytes = crate::hex_to_bytes(&hex)?;
    Some(RawLine(bytes))
}

/// A legacy (non-CAN) raw frame: `{priority, rx_id, tx_id, payload}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyRawFrame {
    pub priority: u8,
    pub rx_id: u8,
    pub tx_id: ECUID,
    pub payload: Vec<u8>,
}

/// A CAN (ISO 15765-2) raw frame before multi-frame reassembly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanRawFrame {
    pub arb_id: u32,
    pub pci: u8,
    pub payload: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_line_rejects_odd_length() {
        assert_eq!(clean_line("41 0", 2), None);
    }

    #[test]
    fn clean_line_strips_whitespace_and_searching_noise() {
        let r = clean_line("SEARCHING...41 0D 32", 6).unwrap();
        assert_eq!(r.0, vec![0x41, 0x0D, 0x32]);
    }

    #[test]
    fn clean_line_enforces_minimum_length() {
        assert_eq!(clean_line("41 0D", 6), None);
    }
}
