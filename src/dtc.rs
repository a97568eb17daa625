//! Diagnostic trouble codes: the `Pxxxx`/`Cxxxx`/`Bxxxx`/`Uxxxx` encoding
//! used by Mode 03/07/0A responses.

use std::fmt;

/// A single decoded trouble code.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TroubleCode {
    /// Five-character code, e.g. `"P0133"`.
    pub code: String,
    /// The raw two-byte encoding this code was parsed from (or would
    /// encode to).
    pub raw: u16,
}

impl TroubleCode {
    /// Decodes a DTC from its two-byte wire form. The top two bits of the
    /// first byte select the letter (`P|C|B|U`), the next two bits are the
    /// first digit, and the remaining 12 bits are the last three hex
    /// digits. Returns `None` for the `00 00` terminator pair.
    pub fn decode(a: u8, b: u8) -> Option<TroubleCode> {
        if a == 0 && b == 0 {
            return None;
        }
        let letter = match a >> 6 {
            0 => 'P',
            1 => 'C',
            2 => 'B',
            3 => 'U',
            _ => unreachable!("two-bit field"),
        };
        let first_digit = (a >> 4) & 0x03;
        let raw = (u16::from(a) << 8) | u16::from(b);
        let rest = raw & 0x0FFF;
        let code = format!("{letter}{first_digit}{rest:03X}");
        Some(TroubleCode { code, raw })
    }

    /// Encodes this code back into its two-byte wire form, the inverse of
    /// [`TroubleCode::decode`].
    pub fn encode(code: &str) -> Option<(u8, u8)> {
        let mut chars = code.chars();
        let letter = chars.next()?;
        let letter_bits: u8 = match letter {
            'P' => 0,
            'C' => 1,
            'B' => 2,
            'U' => 3,
            _ => return None,
        };
        let digits = chars.as_str();
        if digits.len() != 4 {
            return None;
        }
        let first_digit: u8 = digits[0..1].parse().ok()?;
        if first_digit > 3 {
            return None;
        }
        let rest = u16::from_str_radix(&digits[1..], 16).ok()?;
        let a = (letter_bits << 6) | (first_digit << 4);
        let raw = (u16::from(a) << 8) | rest;
        let a = (raw >> 8) as u8;
        let b = (raw & 0xFF) as u8;
        Some((a, b))
    }

    /// Parses a full code string (e.g. `"P0133"`) directly into a
    /// [`TroubleCode`], computing its raw encoding.
    pub fn from_code(code: &str) -> Option<TroubleCode> {
        let (a, b) = Self::encode(code)?;
        TroubleCode::decode(a, b).filter(|tc| tc.code == code)
    }
}

impl fmt::Display for TroubleCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.code)
    }
}

/// Decodes a byte payload into a list of trouble codes, two bytes per
/// code, dropping `00 00` terminator pairs. Used by Mode 03/07/0A and the
/// `dtc_list` decoder.
pub fn decode_dtc_list(payload: &[u8]) -> Vec<TroubleCode> {
    payload
        .chunks_exact(2)
        .filter_map(|pair| TroubleCode::decode(pair[0], pair[1]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_p0133() {
        // P0133 -> letter=P(00), first digit=0, rest=0x133
        let tc = TroubleCode::decode(0x01, 0x33).unwrap();
        assert_eq!(tc.code, "P0133");
    }

    #[test]
    fn zero_pair_is_terminator() {
        assert_eq!(TroubleCode::decode(0, 0), None);
    }

    #[test]
    fn round_trips_through_encode_decode_for_every_letter() {
        for code in ["P0133", "C0300", "B1201", "U3003"] {
            let (a, b) = TroubleCode::encode(code).unwrap();
            let tc = TroubleCode::decode(a, b).unwrap();
            assert_eq!(tc.code, code);
        }
    }

    #[test]
    fn decode_dtc_list_drops_terminators() {
        let payload = crate::hex_to_bytes("013300000000").unwrap();
        let codes = decode_dtc_list(&payload);
        assert_eq!(codes.len(), 1);
        assert_eq!(codes[0].code, "P0133");
    }
}
