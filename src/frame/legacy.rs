//! Legacy (non-CAN) frame parsing: SAE J1850 PWM/VPW, ISO 9141-2, ISO
//! 14230-4 KWP (both init variants). All four share the same 11-bit-style
//! wire framing once headers are on.

use super::{clean_line, LegacyRawFrame, RawLine};
use crate::ecu::ECUID;
use crate::error::{ParseError, ParseResult};
use crate::message::Message;
use std::collections::BTreeMap;

const MODE03_RESPONSE: u8 = 0x43;

/// Lifts a cleaned line into a [`LegacyRawFrame`]. Valid only for
/// `4 <= bytelen <= 12`.
pub fn parse_raw_frame(line: RawLine) -> ParseResult<LegacyRawFrame> {
    let b = line.0;
    if b.len() < 4 || b.len() > 12 {
        return Err(ParseError::ShortFrame { len: b.len() });
    }
    Ok(LegacyRawFrame {
        priority: b[0],
        rx_id: b[1],
        tx_id: ECUID::Unknown((b[2] & 0x07) as u32),
        payload: b[3..].to_vec(),
    })
}

/// Cleans and parses every line of one response, grouping the resulting
/// frames by ECU and reassembling each group into a [`Message`].
///
/// `min_hex_chars` should be 4 for emulator-compat mode or 12 for normal
/// legacy traffic, per the active [`crate::config::Config`].
pub fn parse_lines(
    lines: &[String],
    min_hex_chars: usize,
    emulator_mode: bool,
) -> ParseResult<Vec<Message>> {
    let mut by_ecu: BTreeMap<ECUID, Vec<LegacyRawFrame>> = BTreeMap::new();
    for line in lines {
        let Some(raw) = clean_line(line, min_hex_chars) else {
            continue;
        };
        let frame = parse_raw_frame(raw)?;
        by_ecu.entry(frame.tx_id).or_default().push(frame);
    }

    let mut messages = Vec::with_capacity(by_ecu.len());
    for (ecu, frames) in by_ecu {
        let data = reassemble_group(&frames, emulator_mode)?;
        messages.push(Message { ecu, data });
    }
    Ok(messages)
}

fn reassemble_group(frames: &[LegacyRawFrame], emulator_mode: bool) -> ParseResult<Vec<u8>> {
    if frames.is_empty() {
        return Err(ParseError::NoData);
    }
    if frames.len() == 1 {
        return Ok(single_frame_data(&frames[0].payload));
    }

    if emulator_mode && frames.iter().all(|f| f.payload.len() == 4 || f.payload.len() == 5) {
        let mut data = Vec::new();
        for f in frames {
            data.extend_from_slice(&f.payload);
        }
        return Ok(data);
    }

    if frames[0].payload.first() == Some(&MODE03_RESPONSE) {
        let mut data = vec![MODE03_RESPONSE, 0x00];
        for f in frames {
            if f.payload.is_empty() {
                return Err(ParseError::ShortFrame { len: 0 });
            }
            data.extend_from_slice(&f.payload[1..]);
        }
        return Ok(data);
    }

    reassemble_sequenced(frames)
}

/// Lifts a single frame's payload into `Message.data`, keeping the
/// response/service byte (`0x41`/`0x49`/...) at index 0 exactly as
/// [`reassemble_sequenced`]'s header does, except for Mode 03 where ELM327
/// omits the DTC-count byte real hardware would send and one is synthesized
/// so `dtc_list` decoding sees the same shape as every other mode.
fn single_frame_data(payload: &[u8]) -> Vec<u8> {
    match payload.first() {
        Some(&MODE03_RESPONSE) => {
            let mut data = vec![MODE03_RESPONSE, 0x00];
            data.extend_from_slice(&payload[1..]);
            data
        }
        _ => payload.to_vec(),
    }
}

fn reassemble_sequenced(frames: &[LegacyRawFrame]) -> ParseResult<Vec<u8>> {
    let mut sorted: Vec<&LegacyRawFrame> = frames.iter().collect();
    for f in &sorted {
        if f.payload.len() < 3 {
            return Err(ParseError::ShortFrame { len: f.payload.len() });
        }
    }
    sorted.sort_by_key(|f| f.payload[2]);

    let mut expected = 1u8;
    for f in &sorted {
        let got = f.payload[2];
        if got != expected {
            return Err(ParseError::BadSequence { expected, got });
        }
        expected += 1;
    }

    let mut data = sorted[0].payload[0..2].to_vec();
    for f in &sorted {
        data.extend_from_slice(&f.payload[3..]);
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(hex: &str) -> LegacyRawFrame {
        let bytes = crate::hex_to_bytes(&hex.replace(' ', "")).unwrap();
        LegacyRawFrame {
            priority: bytes[0],
            rx_id: bytes[1],
            tx_id: ECUID::Unknown((bytes[2] & 0x07) as u32),
            payload: bytes[3..].to_vec(),
        }
    }

    #[test]
    fn single_frame_keeps_service_byte_and_pid_echo() {
        let f = frame("48 6B 10 41 0D 32");
        assert_eq!(single_frame_data(&f.payload), vec![0x41, 0x0D, 0x32]);
    }

    #[test]
    fn mode03_single_frame_gets_synthetic_count_byte() {
        let f = frame("48 6B 10 43 01 33 00");
        assert_eq!(single_frame_data(&f.payload), vec![0x43, 0x00, 0x01, 0x33, 0x00]);
    }

    #[test]
    fn multi_frame_vin_reassembles_with_header_and_sequence() {
        let frames = vec![
            frame("48 6B 10 49 02 01 00 00 00 31"),
            frame("48 6B 10 49 02 02 44 34 47 50"),
            frame("48 6B 10 49 02 03 30 30 52 35"),
        ];
        let data = reassemble_group(&frames, false).unwrap();
        assert_eq!(
            data,
            crate::hex_to_bytes("4902000000314434475030305235").unwrap()
        );
    }

    #[test]
    fn out_of_order_frames_are_sorted_before_reassembly() {
        let frames = vec![
            frame("48 6B 10 49 02 02 44 34 47 50"),
            frame("48 6B 10 49 02 01 00 00 00 31"),
            frame("48 6B 10 49 02 03 30 30 52 35"),
        ];
        let data = reassemble_group(&frames, false).unwrap();
        assert_eq!(
            data,
            crate::hex_to_bytes("4902000000314434475030305235").unwrap()
        );
    }

    #[test]
    fn non_contiguous_sequence_is_rejected() {
        let frames = vec![
            frame("48 6B 10 49 02 01 00 00 00 31"),
            frame("48 6B 10 49 02 03 30 30 52 35"),
        ];
        assert_eq!(
            reassemble_group(&frames, false),
            Err(ParseError::BadSequence { expected: 2, got: 3 })
        );
    }

    #[test]
    fn emulator_quirk_concatenates_verbatim_when_enabled() {
        let frames = vec![
            frame("48 6B 10 AA BB CC DD"),
            frame("48 6B 10 EE FF 00 11 22"),
        ];
        let data = reassemble_group(&frames, true).unwrap();
        assert_eq!(data, crate::hex_to_bytes("AABBCCDDEEFF001122").unwrap());
    }
}
