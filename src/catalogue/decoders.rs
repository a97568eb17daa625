//! Pure byte-to-value decoders (I5: no I/O, no hidden state). Each
//! [`DecoderId`] names one of these functions; [`decode`] is the single
//! dispatch point the catalogue and the client call through.

use super::units::{MeasurementResult, Unit, UnitSystem};
use crate::dtc::{decode_dtc_list, TroubleCode};
use crate::error::{DecodeError, DecodeResult};
use crate::status::{decode_status, Status};

/// One Mode 06 on-board monitoring test record.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MonitorTestResult {
    /// Test id byte.
    pub tid: u8,
    /// Raw test value.
    pub value: f64,
    /// Minimum passing value.
    pub min: f64,
    /// Maximum passing value.
    pub max: f64,
    /// Whether `value` fell within `[min, max]`.
    pub passed: bool,
}

/// The result of running a decoder over a payload.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TypedValue {
    /// A single scalar measurement with a unit.
    Measurement(MeasurementResult),
    /// Mode 01 PID 01 readiness status.
    Status(Status),
    /// A list of diagnostic trouble codes.
    TroubleCodes(Vec<TroubleCode>),
    /// A list of Mode 06 test records.
    MonitorTests(Vec<MonitorTestResult>),
    /// A decoded ASCII string (VIN, CALID, ...).
    EncodedString(String),
    /// Bytes with no further interpretation applied here (e.g. a
    /// PID-support bitmap, whose bits are unpacked one layer up by the
    /// supported-PID discovery routine).
    Raw(Vec<u8>),
}

/// One entry in the SAE J1979 "unit and scaling" table: `value = raw *
/// scale + offset`. Only a representative subset is implemented; unlisted
/// codes decode as [`DecodeError::UnsupportedDecoder`].
#[derive(Debug, Clone, Copy)]
struct UasEntry {
    bytes: usize,
    scale: f64,
    offset: f64,
    unit: Unit,
}

fn uas_table(code: u8) -> Option<UasEntry> {
    match code {
        0x01 => Some(UasEntry { bytes: 2, scale: 1.0 / 32768.0, offset: 0.0, unit: Unit::Ratio }),
        0x05 => Some(UasEntry { bytes: 1, scale: 1.0, offset: -40.0, unit: Unit::Celsius }),
        0x09 => Some(UasEntry { bytes: 2, scale: 0.01, offset: 0.0, unit: Unit::Ratio }),
        0x0B => Some(UasEntry { bytes: 2, scale: 1.0, offset: 0.0, unit: Unit::Kpa }),
        0x12 => Some(UasEntry { bytes: 2, scale: 1.0, offset: 0.0, unit: Unit::Second }),
        0x24 => Some(UasEntry { bytes: 2, scale: 1.0 / 1000.0, offset: 0.0, unit: Unit::Volt }),
        _ => None,
    }
}

/// The closed set of pure decoders a [`super::CommandSpec`] can name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DecoderId {
    Percent,
    PercentCentered,
    TempC,
    PressureKpa,
    FuelPressure,
    EvapPressure,
    EvapPressureAlt,
    Rpm,
    SpeedKmh,
    TimingAdvanceDeg,
    Maf,
    SensorVoltage,
    SensorVoltageWide,
    CurrentCentered,
    Uas(u8),
    PidSupportBitmap,
    Status,
    DtcList,
    SingleDtc,
    MonitorTest,
    EncodedString,
    Cvn,
    Count,
    DistanceKm,
    Minutes,
    ObdCompliance,
    FuelStatus,
    FuelType,
    AirStatus,
    O2SensorsPresent,
    None,
}

fn need(payload: &[u8], n: usize) -> DecodeResult<()> {
    if payload.len() < n {
        Err(DecodeError::InsufficientBytes { needed: n, got: payload.len() })
    } else {
        Ok(())
    }
}

fn measurement(value: f64, unit: Unit, min: f64, max: f64, system: UnitSystem) -> DecodeResult<TypedValue> {
    if !value.is_finite() || value < min || value > max {
        return Err(DecodeError::OutOfRange);
    }
    Ok(TypedValue::Measurement(
        MeasurementResult::new(value, unit).in_unit_system(system),
    ))
}

fn ascii_decode(payload: &[u8]) -> String {
    payload
        .iter()
        .copied()
        .filter(|b| *b != 0 && b.is_ascii_graphic())
        .map(|b| b as char)
        .collect()
}

const FUEL_TYPES: &[&str] = &[
    "Not available", "Gasoline", "Methanol", "Ethanol", "Diesel", "LPG", "CNG", "Propane",
    "Electric", "Bifuel (gasoline)", "Bifuel (methanol)", "Bifuel (ethanol)", "Bifuel (LPG)",
    "Bifuel (CNG)", "Bifuel (propane)", "Bifuel (electricity)", "Bifuel (mixed gas/electric)",
    "Hybrid (gasoline)", "Hybrid (ethanol)", "Hybrid (diesel)", "Hybrid (electric)",
    "Hybrid (mixed fuel/electric)", "Hybrid (regenerative)",
];

fn obd_compliance_name(code: u8) -> &'static str {
    match code {
        1 => "OBD-II (California ARB)",
        2 => "OBD (federal EPA)",
        3 => "OBD and OBD-II",
        4 => "OBD-I",
        5 => "Not OBD compliant",
        6 => "EOBD",
        7 => "EOBD and OBD-II",
        8 => "EOBD and OBD",
        9 => "EOBD, OBD and OBD-II",
        10 => "JOBD",
        17 => "Engine Manufacturer Diagnostics (EMD)",
        _ => "Unknown",
    }
}

fn fuel_status_name(byte: u8) -> &'static str {
    match byte {
        0x01 => "Open loop (insufficient engine temperature)",
        0x02 => "Closed loop (using oxygen sensor feedback)",
        0x04 => "Open loop (engine load or fuel cut)",
        0x08 => "Open loop (system failure)",
        0x10 => "Closed loop (using at least one oxygen sensor, fault in a sensor)",
        _ => "Unknown",
    }
}

fn air_status_name(bit: u8) -> Option<&'static str> {
    match bit {
        0 => Some("Upstream"),
        1 => Some("Downstream of catalytic converter"),
        2 => Some("From the outside atmosphere or off"),
        3 => Some("Pump commanded on for diagnostics"),
        _ => None,
    }
}

/// Decodes `payload` with decoder `id`, converting the resulting
/// measurement (if any) into `system` and rejecting values outside
/// `[min, max]` per P1.
pub fn decode(id: DecoderId, payload: &[u8], system: UnitSystem, min: f64, max: f64) -> DecodeResult<TypedValue> {
    match id {
        DecoderId::None => Ok(TypedValue::Raw(payload.to_vec())),

        DecoderId::Percent => {
            need(payload, 1)?;
            measurement(payload[0] as f64 * 100.0 / 255.0, Unit::Percent, min, max, system)
        }
        DecoderId::PercentCentered => {
            need(payload, 1)?;
            let v = (payload[0] as i32 - 128) as f64 * 100.0 / 128.0;
            measurement(v, Unit::Percent, min, max, system)
        }
        DecoderId::TempC => {
            need(payload, 1)?;
            measurement(payload[0] as f64 - 40.0, Unit::Celsius, min, max, system)
        }
        DecoderId::PressureKpa => {
            need(payload, 1)?;
            measurement(payload[0] as f64, Unit::Kpa, min, max, system)
        }
        DecoderId::FuelPressure => {
            need(payload, 1)?;
            measurement(payload[0] as f64 * 3.0, Unit::Kpa, min, max, system)
        }
        DecoderId::EvapPressure => {
            need(payload, 2)?;
            let raw = i16::from_be_bytes([payload[0], payload[1]]);
            measurement(raw as f64 / 4.0, Unit::Pa, min, max, system)
        }
        DecoderId::EvapPressureAlt => {
            need(payload, 2)?;
            let raw = u16::from_be_bytes([payload[0], payload[1]]);
            measurement(raw as f64 / 1000.0, Unit::Kpa, min, max, system)
        }
        DecoderId::Rpm => {
            need(payload, 2)?;
            let raw = 256 * payload[0] as u32 + payload[1] as u32;
            measurement(raw as f64 / 4.0, Unit::Rpm, min, max, system)
        }
        DecoderId::SpeedKmh => {
            need(payload, 1)?;
            measurement(payload[0] as f64, Unit::Kmh, min, max, system)
        }
        DecoderId::TimingAdvanceDeg => {
            need(payload, 1)?;
            measurement(payload[0] as f64 / 2.0 - 64.0, Unit::Degree, min, max, system)
        }
        DecoderId::Maf => {
            need(payload, 2)?;
            let raw = 256 * payload[0] as u32 + payload[1] as u32;
            measurement(raw as f64 / 100.0, Unit::GramsPerSec, min, max, system)
        }
        DecoderId::SensorVoltage => {
            // b0/200 V; the short-term fuel-trim percent carried in b1 is
            // not surfaced as a second measurement (TypedValue carries one
            // value per command).
            need(payload, 2)?;
            measurement(payload[0] as f64 / 200.0, Unit::Volt, min, max, system)
        }
        DecoderId::SensorVoltageWide => {
            // Wideband O2: voltage component only, see SensorVoltage note.
            need(payload, 4)?;
            let raw = 256 * payload[2] as u32 + payload[3] as u32;
            measurement(raw as f64 * 8.0 / 65535.0, Unit::Volt, min, max, system)
        }
        DecoderId::CurrentCentered => {
            need(payload, 4)?;
            let raw = 256 * payload[2] as u32 + payload[3] as u32;
            measurement(raw as f64 / 256.0 - 128.0, Unit::MilliAmp, min, max, system)
        }
        DecoderId::Uas(code) => {
            let entry = uas_table(code).ok_or(DecodeError::UnsupportedDecoder)?;
            need(payload, entry.bytes)?;
            let raw = payload[..entry.bytes]
                .iter()
                .fold(0u32, |acc, b| (acc << 8) | *b as u32);
            let value = raw as f64 * entry.scale + entry.offset;
            measurement(value, entry.unit, min, max, system)
        }

        DecoderId::PidSupportBitmap => {
            need(payload, 4)?;
            Ok(TypedValue::Raw(payload[..4].to_vec()))
        }
        DecoderId::Status => {
            need(payload, 4)?;
            decode_status(&payload[..4])
                .map(TypedValue::Status)
                .ok_or(DecodeError::InsufficientBytes { needed: 4, got: payload.len() })
        }
        DecoderId::DtcList => {
            // First byte is the DTC count (real on CAN, synthesized for
            // legacy frames by the frame parser); the pairs start after it.
            need(payload, 1)?;
            Ok(TypedValue::TroubleCodes(decode_dtc_list(&payload[1..])))
        }
        DecoderId::SingleDtc => {
            need(payload, 2)?;
            let codes = TroubleCode::decode(payload[0], payload[1])
                .into_iter()
                .collect();
            Ok(TypedValue::TroubleCodes(codes))
        }
        DecoderId::MonitorTest => Ok(TypedValue::MonitorTests(decode_monitor_tests(payload))),
        DecoderId::EncodedString => Ok(TypedValue::EncodedString(ascii_decode(payload))),
        DecoderId::Cvn => {
            need(payload, 4)?;
            let hex: String = payload[..4].iter().map(|b| format!("{b:02X}")).collect();
            Ok(TypedValue::EncodedString(hex))
        }
        DecoderId::Count => {
            need(payload, 1)?;
            let raw = payload.iter().fold(0u32, |acc, b| (acc << 8) | *b as u32);
            measurement(raw as f64, Unit::None, min, max, system)
        }
        DecoderId::DistanceKm => {
            need(payload, 2)?;
            let raw = 256 * payload[0] as u32 + payload[1] as u32;
            measurement(raw as f64, Unit::Kilometer, min, max, system)
        }
        DecoderId::Minutes => {
            need(payload, 2)?;
            let raw = 256 * payload[0] as u32 + payload[1] as u32;
            measurement(raw as f64, Unit::Minute, min, max, system)
        }
        DecoderId::ObdCompliance => {
            need(payload, 1)?;
            Ok(TypedValue::EncodedString(obd_compliance_name(payload[0]).to_string()))
        }
        DecoderId::FuelStatus => {
            need(payload, 1)?;
            let primary = fuel_status_name(payload[0]);
            let desc = match payload.get(1).copied() {
                Some(secondary) if secondary != 0 => {
                    format!("{primary} / {}", fuel_status_name(secondary))
                }
                _ => primary.to_string(),
            };
            Ok(TypedValue::EncodedString(desc))
        }
        DecoderId::FuelType => {
            need(payload, 1)?;
            let name = FUEL_TYPES.get(payload[0] as usize).copied().unwrap_or("Unknown");
            Ok(TypedValue::EncodedString(name.to_string()))
        }
        DecoderId::AirStatus => {
            need(payload, 1)?;
            let names: Vec<&str> = (0..4)
                .filter(|bit| payload[0] & (1 << bit) != 0)
                .filter_map(air_status_name)
                .collect();
            Ok(TypedValue::EncodedString(names.join(", ")))
        }
        DecoderId::O2SensorsPresent => {
            need(payload, 1)?;
            let names: Vec<String> = (0..8)
                .filter(|bit| payload[0] & (1 << bit) != 0)
                .map(|bit| format!("Bank{} Sensor{}", bit / 4 + 1, bit % 4 + 1))
                .collect();
            Ok(TypedValue::EncodedString(names.join(", ")))
        }
    }
}

fn decode_monitor_tests(payload: &[u8]) -> Vec<MonitorTestResult> {
    payload
        .chunks_exact(9)
        .map(|c| {
            let value = f64::from(u16::from_be_bytes([c[3], c[4]]));
            let min = f64::from(u16::from_be_bytes([c[5], c[6]]));
            let max = f64::from(u16::from_be_bytes([c[7], c[8]]));
            MonitorTestResult {
                tid: c[1],
                value,
                min,
                max,
                passed: value >= min && value <= max,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn speed_decodes_directly_in_kmh() {
        let v = decode(DecoderId::SpeedKmh, &[50], UnitSystem::Metric, 0.0, 255.0).unwrap();
        assert_eq!(v, TypedValue::Measurement(MeasurementResult::new(50.0, Unit::Kmh)));
    }

    #[test]
    fn speed_converts_to_mph_in_imperial_system() {
        let v = decode(DecoderId::SpeedKmh, &[100], UnitSystem::Imperial, 0.0, 255.0).unwrap();
        match v {
            TypedValue::Measurement(m) => {
                assert_eq!(m.unit, Unit::Mph);
                assert!((m.value - 62.1371).abs() < 1e-3);
            }
            _ => panic!("expected a measurement"),
        }
    }

    #[test]
    fn rpm_matches_scenario_fixture() {
        let v = decode(DecoderId::Rpm, &[0x0F, 0xA0], UnitSystem::Metric, 0.0, 16383.75).unwrap();
        assert_eq!(v, TypedValue::Measurement(MeasurementResult::new(1000.0, Unit::Rpm)));
    }

    #[test]
    fn temp_c_offsets_by_40() {
        let v = decode(DecoderId::TempC, &[0], UnitSystem::Metric, -40.0, 215.0).unwrap();
        assert_eq!(v, TypedValue::Measurement(MeasurementResult::new(-40.0, Unit::Celsius)));
    }

    #[test]
    fn out_of_range_value_is_rejected_never_panics() {
        // byte_width=1 decoder, every possible byte must either be in
        // range or produce a DecodeError; percent's range [0,100] always
        // holds for a single byte, so force a narrower max.
        let err = decode(DecoderId::Percent, &[255], UnitSystem::Metric, 0.0, 50.0);
        assert_eq!(err, Err(DecodeError::OutOfRange));
    }

    #[test]
    fn insufficient_bytes_reported_not_panicking() {
        let err = decode(DecoderId::Rpm, &[0x0F], UnitSystem::Metric, 0.0, 16383.75);
        assert_eq!(err, Err(DecodeError::InsufficientBytes { needed: 2, got: 1 }));
    }

    #[test]
    fn unsupported_uas_code_is_reported() {
        let err = decode(DecoderId::Uas(0xFE), &[0, 0], UnitSystem::Metric, 0.0, 1.0);
        assert_eq!(err, Err(DecodeError::UnsupportedDecoder));
    }

    #[test]
    fn fuel_type_looks_up_table() {
        let v = decode(DecoderId::FuelType, &[1], UnitSystem::Metric, 0.0, 0.0).unwrap();
        assert_eq!(v, TypedValue::EncodedString("Gasoline".to_string()));
    }

    #[test]
    fn monitor_test_flags_pass_fail_by_range() {
        let payload = crate::hex_to_bytes("0101010032000000C8").unwrap();
        let v = decode(DecoderId::MonitorTest, &payload, UnitSystem::Metric, 0.0, 0.0).unwrap();
        match v {
            TypedValue::MonitorTests(tests) => {
                assert_eq!(tests.len(), 1);
                assert!(tests[0].passed);
            }
            _ => panic!("expected monitor tests"),
        }
    }
}
