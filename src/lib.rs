#![deny(
    missing_debug_implementations,
    trivial_casts,
    trivial_numeric_casts,
    unstable_features,
    unused_import_braces,
    unused_qualifications
)]

//! A crate which speaks the ELM327 text protocol to a serial-like OBD-II
//! adapter (reachable over Bluetooth Low Energy or TCP/IP) and, through it,
//! to a vehicle's diagnostic bus.
//!
//! ## What this crate does
//!
//! * Establishes the link to an ELM327-class adapter and drives its AT
//!   command initialization sequence.
//! * Auto-negotiates the in-vehicle protocol: the five legacy (non-CAN)
//!   protocols and four ISO 15765-4 CAN variants.
//! * Reassembles multi-frame adapter responses into logical per-ECU
//!   messages, for both legacy and CAN wire formats.
//! * Decodes Mode 01/03/04/06/07/09/0A service payloads into typed
//!   measurements with physical units, trouble codes, readiness status and
//!   vehicle identifiers.
//! * Schedules batches of PID requests against the single half-duplex link
//!   on an interval, optionally adaptive to observed round-trip time.
//!
//! ## What this crate does not do
//!
//! Transport discovery UX, persistent storage of user settings, background
//! task lifecycle integration with a host OS, and bit-exact reproduction of
//! adapter vendor quirks beyond ELM327 v1.x text conventions are explicitly
//! out of scope; see [`transport`] for the boundary this crate consumes
//! rather than implements.
//!
//! ## Layout
//!
//! * [`transport`] - the byte-oriented channel contract (BLE, TCP, mock) the
//!   core consumes.
//! * [`line_session`] - frames transport bytes into ASCII command/response
//!   exchanges terminated by the adapter prompt.
//! * [`protocol`] - the `OBDProtocol` enum and its ELM327 wire identifiers.
//! * [`ecu`] - the `ECUID` type identifying a bus endpoint.
//! * [`frame`] - the legacy and CAN frame parsers (cleanup, grouping,
//!   multi-frame reassembly).
//! * [`message`] - the reassembled, per-ECU logical [`message::Message`].
//! * [`catalogue`] - the static PID table and pure byte-to-value decoders.
//! * [`dtc`] - diagnostic trouble code encode/decode.
//! * [`status`] - Mode 01 PID 01 readiness monitor decoding.
//! * [`session`] - the ELM327 session: adapter init, protocol detection,
//!   ECU mapping, VIN and supported-PID discovery.
//! * [`polling`] - the continuous-polling engine.
//! * [`config`] - the immutable configuration value object.
//! * [`error`] - the error taxonomy.
//! * [`client`] - the public API surface.

pub mod catalogue;
pub mod client;
pub mod config;
pub mod dtc;
pub mod ecu;
pub mod error;
pub mod frame;
pub mod line_session;
pub mod message;
pub mod polling;
pub mod protocol;
pub mod session;
pub mod status;
pub mod transport;

pub use client::ObdClient;
pub use config::Config;
pub use error::{ClientError, ClientResult};
pub use protocol::OBDProtocol;

/// Upper-cases an ASCII buffer and strips all whitespace, as every adapter
/// line must be before it is treated as a hex string by either frame parser.
pub(crate) fn clean_hex_line(line: &str) -> String {
    line.chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_uppercase()
}

/// Decodes a hex-digit ASCII string into bytes. Returns `None` if the string
/// has odd length or contains non-hex characters.
pub(crate) fn hex_to_bytes(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len() / 2);
    for chunk in bytes.chunks(2) {
        let hi = (chunk[0] as char).to_digit(16)?;
        let lo = (chunk[1] as char).to_digit(16)?;
        out.push(((hi << 4) | lo) as u8);
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_hex_line_strips_whitespace_and_upcases() {
        assert_eq!(clean_hex_line(" 41 0d\r\n"), "410D");
    }

    #[test]
    fn hex_to_bytes_round_trips() {
        assert_eq!(hex_to_bytes("410D32"), Some(vec![0x41, 0x0D, 0x32]));
        assert_eq!(hex_to_bytes("41D"), None);
        assert_eq!(hex_to_bytes("41ZZ"), None);
    }
}
