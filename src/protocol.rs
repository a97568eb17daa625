//! OBD-II wire protocols an ELM327 adapter can select, and the `ATSP`
//! command used to request each one.

use std::fmt;

/// One of the eleven protocols ELM327 firmware understands, plus `Auto` for
/// `ATSP0` and `Unknown` for an `ATDPN` reply this crate doesn't recognize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum OBDProtocol {
    /// Automatic protocol selection (`ATSP0`).
    Auto,
    /// SAE J1850 PWM, 41.6 kbps.
    J1850PWM,
    /// SAE J1850 VPW, 10.4 kbps.
    J1850VPW,
    /// ISO 9141-2.
    ISO9141_2,
    /// ISO 14230-4 KWP, 5-baud initialization.
    KWP_5Baud,
    /// ISO 14230-4 KWP, fast initialization.
    KWP_Fast,
    /// ISO 15765-4 CAN, 11-bit ID, 500 kbps.
    CAN_11_500,
    /// ISO 15765-4 CAN, 29-bit ID, 500 kbps.
    CAN_29_500,
    /// ISO 15765-4 CAN, 11-bit ID, 250 kbps.
    CAN_11_250,
    /// ISO 15765-4 CAN, 29-bit ID, 250 kbps.
    CAN_29_250,
    /// A protocol id the adapter reported that this crate does not map.
    Unknown,
}

impl OBDProtocol {
    /// The ELM327 protocol id, as used by `ATSPn` and reported by `ATDPN`.
    pub fn elm_id(self) -> u8 {
        match self {
            OBDProtocol::Auto => 0,
            OBDProtocol::J1850PWM => 1,
            OBDProtocol::J1850VPW => 2,
            OBDProtocol::ISO9141_2 => 3,
            OBDProtocol::KWP_5Baud => 4,
            OBDProtocol::KWP_Fast => 5,
            OBDProtocol::CAN_11_500 => 6,
            OBDProtocol::CAN_29_500 => 7,
            OBDProtocol::CAN_11_250 => 8,
            OBDProtocol::CAN_29_250 => 9,
            OBDProtocol::Unknown => 0xFF,
        }
    }

    /// Builds the `ATSPn` command to request this protocol.
    pub fn at_command(self) -> String {
        format!("ATSP{:X}", self.elm_id())
    }

    /// Maps an `ATDPN` single-hex-digit reply (ELM327 returns the digit,
    /// optionally prefixed with `A` when auto-selected) to a protocol.
    pub fn from_elm_id(id: u8) -> OBDProtocol {
        match id {
            0 => OBDProtocol::Auto,
            1 => OBDProtocol::J1850PWM,
            2 => OBDProtocol::J1850VPW,
            3 => OBDProtocol::ISO9141_2,
            4 => OBDProtocol::KWP_5Baud,
            5 => OBDProtocol::KWP_Fast,
            6 => OBDProtocol::CAN_11_500,
            7 => OBDProtocol::CAN_29_500,
            8 => OBDProtocol::CAN_11_250,
            9 => OBDProtocol::CAN_29_250,
            _ => OBDProtocol::Unknown,
        }
    }

    /// `true` for any of the four ISO 15765-4 CAN variants.
    pub fn is_can(self) -> bool {
        matches!(
            self,
            OBDProtocol::CAN_11_500
                | OBDProtocol::CAN_29_500
                | OBDProtocol::CAN_11_250
                | OBDProtocol::CAN_29_250
        )
    }

    /// `true` when the arbitration/header id on this protocol is 29 bits
    /// wide rather than 11.
    pub fn is_29bit(self) -> bool {
        matches!(self, OBDProtocol::CAN_29_500 | OBDProtocol::CAN_29_250)
    }

    /// The manual probe order `TryManual` walks: every non-auto protocol
    /// id, 1 through 9.
    pub fn manual_probe_order() -> &'static [OBDProtocol] {
        &[
            OBDProtocol::J1850PWM,
            OBDProtocol::J1850VPW,
            OBDProtocol::ISO9141_2,
            OBDProtocol::KWP_5Baud,
            OBDProtocol::KWP_Fast,
            OBDProtocol::CAN_11_500,
            OBDProtocol::CAN_29_500,
            OBDProtocol::CAN_11_250,
            OBDProtocol::CAN_29_250,
        ]
    }
}

impl fmt::Display for OBDProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OBDProtocol::Auto => "Auto",
            OBDProtocol::J1850PWM => "SAE J1850 PWM",
            OBDProtocol::J1850VPW => "SAE J1850 VPW",
            OBDProtocol::ISO9141_2 => "ISO 9141-2",
            OBDProtocol::KWP_5Baud => "ISO 14230-4 KWP (5-baud init)",
            OBDProtocol::KWP_Fast => "ISO 14230-4 KWP (fast init)",
            OBDProtocol::CAN_11_500 => "ISO 15765-4 CAN (11 bit, 500 kbps)",
            OBDProtocol::CAN_29_500 => "ISO 15765-4 CAN (29 bit, 500 kbps)",
            OBDProtocol::CAN_11_250 => "ISO 15765-4 CAN (11 bit, 250 kbps)",
            OBDProtocol::CAN_29_250 => "ISO 15765-4 CAN (29 bit, 250 kbps)",
            OBDProtocol::Unknown => "Unknown",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elm_id_round_trips_through_from_elm_id() {
        for p in OBDProtocol::manual_probe_order() {
            assert_eq!(OBDProtocol::from_elm_id(p.elm_id()), *p);
        }
    }

    #[test]
    fn at_command_formats_hex_digit() {
        assert_eq!(OBDProtocol::CAN_11_500.at_command(), "ATSP6");
        assert_eq!(OBDProtocol::Auto.at_command(), "ATSP0");
    }

    #[test]
    fn can_variants_flagged_correctly() {
        assert!(OBDProtocol::CAN_29_250.is_can());
        assert!(OBDProtocol::CAN_29_250.is_29bit());
        assert!(!OBDProtocol::ISO9141_2.is_can());
    }
}
