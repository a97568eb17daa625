//! The PID catalogue: command identity, wire strings, and the metadata
//! (`byte_width`, `decoder`, `min`/`max`, `live`) that drives both request
//! construction and response decoding. This is the module the rest of the
//! crate is built around — everything else exists to feed bytes into, or
//! take typed values out of, the table built here.

pub mod decoders;
pub mod units;

pub use decoders::{decode, DecoderId, MonitorTestResult, TypedValue};
pub use units::{MeasurementResult, Unit, UnitSystem};

use crate::protocol::OBDProtocol;
use std::sync::OnceLock;

/// An ELM327 `AT` command that is not protocol selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum GeneralCmd {
    /// `ATZ` - reset the adapter.
    Reset,
    /// `ATE0` - echo off.
    EchoOff,
    /// `ATL0` - linefeeds off.
    LinefeedOff,
    /// `ATS0` - spaces off.
    SpacesOff,
    /// `ATH1` - headers on.
    HeadersOn,
    /// `ATI` - adapter identification banner.
    Info,
    /// `ATRV` - read adapter supply voltage.
    ReadVoltage,
}

/// An ELM327 command about the vehicle protocol rather than the adapter
/// itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ProtocolsCmd {
    /// `ATSPn` - select (or auto-select) a protocol.
    SetProtocol(OBDProtocol),
    /// `ATDPN` - describe the currently-selected protocol by number.
    DescribeProtocolNumber,
}

/// Identifies one command this crate can issue, tagged by OBD-II service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CommandId {
    /// Adapter-level `AT` commands.
    General(GeneralCmd),
    /// Protocol selection/inspection `AT` commands.
    Protocols(ProtocolsCmd),
    /// Mode 01 (show current data), addressed by PID.
    Mode01(u8),
    /// Mode 03 (show stored trouble codes). Takes no PID.
    Mode03,
    /// Mode 04 (clear trouble codes and stored values). Takes no PID.
    Mode04,
    /// Mode 06 (on-board monitoring test results), addressed by TID.
    Mode06(u8),
    /// Mode 07 (show pending trouble codes). Takes no PID.
    Mode07,
    /// Mode 09 (request vehicle information), addressed by PID.
    Mode09(u8),
    /// Mode 0A (show permanent trouble codes). Takes no PID.
    Mode0A,
}

impl CommandId {
    /// The ASCII wire string this command sends, e.g. `"010C"`.
    pub fn wire(self) -> String {
        match self {
            CommandId::General(GeneralCmd::Reset) => "ATZ".to_string(),
            CommandId::General(GeneralCmd::EchoOff) => "ATE0".to_string(),
            CommandId::General(GeneralCmd::LinefeedOff) => "ATL0".to_string(),
            CommandId::General(GeneralCmd::SpacesOff) => "ATS0".to_string(),
            CommandId::General(GeneralCmd::HeadersOn) => "ATH1".to_string(),
            CommandId::General(GeneralCmd::Info) => "ATI".to_string(),
            CommandId::General(GeneralCmd::ReadVoltage) => "ATRV".to_string(),
            CommandId::Protocols(ProtocolsCmd::SetProtocol(p)) => p.at_command(),
            CommandId::Protocols(ProtocolsCmd::DescribeProtocolNumber) => "ATDPN".to_string(),
            CommandId::Mode01(pid) => format!("01{pid:02X}"),
            CommandId::Mode03 => "03".to_string(),
            CommandId::Mode04 => "04".to_string(),
            CommandId::Mode06(tid) => format!("06{tid:02X}"),
            CommandId::Mode07 => "07".to_string(),
            CommandId::Mode09(pid) => format!("09{pid:02X}"),
            CommandId::Mode0A => "0A".to_string(),
        }
    }
}

/// Static metadata for one [`CommandId`].
#[derive(Debug, Clone)]
pub struct CommandSpec {
    /// The command this spec describes.
    pub id: CommandId,
    /// Long-form description.
    pub description: &'static str,
    /// Short label suitable for a UI column header.
    pub short_description: &'static str,
    /// Exact number of response bytes this decoder requires (after the
    /// service byte and, for Mode 01/09, the PID echo have been
    /// stripped).
    pub byte_width: usize,
    /// Which pure decoder interprets the response payload.
    pub decoder: DecoderId,
    /// Whether this command represents a continuously-changing live
    /// value (Mode 01 sensor data) as opposed to a one-shot identifier or
    /// diagnostic query.
    pub live: bool,
    /// Minimum plausible decoded value (P1 range check).
    pub min: f64,
    /// Maximum plausible decoded value (P1 range check).
    pub max: f64,
}

/// Every Mode 01 PID whose decoder is [`DecoderId::PidSupportBitmap`];
/// `0100` is always the first.
pub const MODE01_SUPPORT_GETTERS: [u8; 7] = [0x00, 0x20, 0x40, 0x60, 0x80, 0xA0, 0xC0];

fn mode01_table() -> Vec<CommandSpec> {
    use DecoderId::*;
    let entries: &[(u8, &'static str, &'static str, usize, DecoderId, bool, f64, f64)] = &[
        (0x00, "PIDs supported 01-20", "PIDs 01-20", 4, PidSupportBitmap, false, 0.0, 0.0),
        (0x01, "Monitor status since DTCs cleared", "Status", 4, Status, false, 0.0, 0.0),
        (0x02, "Freeze frame trouble code", "Freeze DTC", 2, SingleDtc, false, 0.0, 0.0),
        (0x03, "Fuel system status", "Fuel status", 2, FuelStatus, true, 0.0, 0.0),
        (0x04, "Calculated engine load", "Engine load", 1, Percent, true, 0.0, 100.0),
        (0x05, "Engine coolant temperature", "Coolant temp", 1, TempC, true, -40.0, 215.0),
        (0x06, "Short term fuel trim, bank 1", "STFT B1", 1, PercentCentered, true, -100.0, 99.2),
        (0x07, "Long term fuel trim, bank 1", "LTFT B1", 1, PercentCentered, true, -100.0, 99.2),
        (0x08, "Short term fuel trim, bank 2", "STFT B2", 1, PercentCentered, true, -100.0, 99.2),
        (0x09, "Long term fuel trim, bank 2", "LTFT B2", 1, PercentCentered, true, -100.0, 99.2),
        (0x0A, "Fuel pressure", "Fuel pressure", 1, FuelPressure, true, 0.0, 765.0),
        (0x0B, "Intake manifold absolute pressure", "MAP", 1, PressureKpa, true, 0.0, 255.0),
        (0x0C, "Engine RPM", "RPM", 2, Rpm, true, 0.0, 16383.75),
        (0x0D, "Vehicle speed", "Speed", 1, SpeedKmh, true, 0.0, 255.0),
        (0x0E, "Timing advance", "Timing advance", 1, TimingAdvanceDeg, true, -64.0, 63.5),
        (0x0F, "Intake air temperature", "Intake air temp", 1, TempC, true, -40.0, 215.0),
        (0x10, "Mass air flow rate", "MAF", 2, Maf, true, 0.0, 655.35),
        (0x11, "Throttle position", "Throttle", 1, Percent, true, 0.0, 100.0),
        (0x12, "Commanded secondary air status", "Air status", 1, AirStatus, true, 0.0, 0.0),
        (0x13, "Oxygen sensors present (2 banks)", "O2 sensors present", 1, O2SensorsPresent, false, 0.0, 0.0),
        (0x14, "Oxygen sensor 1 voltage", "O2 B1S1", 2, SensorVoltage, true, 0.0, 1.275),
        (0x15, "Oxygen sensor 2 voltage", "O2 B1S2", 2, SensorVoltage, true, 0.0, 1.275),
        (0x16, "Oxygen sensor 3 voltage", "O2 B1S3", 2, SensorVoltage, true, 0.0, 1.275),
        (0x17, "Oxygen sensor 4 voltage", "O2 B1S4", 2, SensorVoltage, true, 0.0, 1.275),
        (0x18, "Oxygen sensor 5 voltage", "O2 B2S1", 2, SensorVoltage, true, 0.0, 1.275),
        (0x19, "Oxygen sensor 6 voltage", "O2 B2S2", 2, SensorVoltage, true, 0.0, 1.275),
        (0x1A, "Oxygen sensor 7 voltage", "O2 B2S3", 2, SensorVoltage, true, 0.0, 1.275),
        (0x1B, "Oxygen sensor 8 voltage", "O2 B2S4", 2, SensorVoltage, true, 0.0, 1.275),
        (0x1C, "OBD standard this vehicle conforms to", "OBD standard", 1, ObdCompliance, false, 0.0, 0.0),
        (0x1D, "Oxygen sensors present (4 banks)", "O2 sensors present (alt)", 1, O2SensorsPresent, false, 0.0, 0.0),
        (0x1F, "Run time since engine start", "Run time", 2, Minutes, true, 0.0, 65535.0),
        (0x20, "PIDs supported 21-40", "PIDs 21-40", 4, PidSupportBitmap, false, 0.0, 0.0),
        (0x21, "Distance traveled with MIL on", "Distance w/ MIL", 2, DistanceKm, true, 0.0, 65535.0),
        (0x2C, "Commanded EGR", "EGR", 1, Percent, true, 0.0, 100.0),
        (0x2D, "EGR Error", "EGR error", 1, PercentCentered, true, -100.0, 99.2),
        (0x2E, "Commanded evaporative purge", "Evap purge", 1, Percent, true, 0.0, 100.0),
        (0x2F, "Fuel tank level input", "Fuel level", 1, Percent, true, 0.0, 100.0),
        (0x30, "Warm-ups since codes cleared", "Warm-ups", 1, Count, false, 0.0, 255.0),
        (0x31, "Distance traveled since codes cleared", "Distance since cleared", 2, DistanceKm, false, 0.0, 65535.0),
        (0x32, "Evap system vapor pressure", "Evap pressure", 2, EvapPressure, true, -8192.0, 8191.75),
        (0x33, "Barometric pressure", "Barometric pressure", 1, PressureKpa, true, 0.0, 255.0),
        (0x34, "Oxygen sensor 1 current", "O2 B1S1 current", 4, SensorVoltageWide, true, 0.0, 8.0),
        (0x35, "Oxygen sensor 2 current", "O2 B1S2 current", 4, SensorVoltageWide, true, 0.0, 8.0),
        (0x36, "Oxygen sensor 3 current", "O2 B1S3 current", 4, SensorVoltageWide, true, 0.0, 8.0),
        (0x37, "Oxygen sensor 4 current", "O2 B1S4 current", 4, SensorVoltageWide, true, 0.0, 8.0),
        (0x38, "Oxygen sensor 5 current", "O2 B2S1 current", 4, SensorVoltageWide, true, 0.0, 8.0),
        (0x39, "Oxygen sensor 6 current", "O2 B2S2 current", 4, SensorVoltageWide, true, 0.0, 8.0),
        (0x3A, "Oxygen sensor 7 current", "O2 B2S3 current", 4, SensorVoltageWide, true, 0.0, 8.0),
        (0x3B, "Oxygen sensor 8 current", "O2 B2S4 current", 4, SensorVoltageWide, true, 0.0, 8.0),
        (0x40, "PIDs supported 41-60", "PIDs 41-60", 4, PidSupportBitmap, false, 0.0, 0.0),
        (0x51, "Fuel type", "Fuel type", 1, FuelType, false, 0.0, 0.0),
        (0x5C, "Engine oil temperature", "Oil temp", 1, TempC, true, -40.0, 215.0),
        (0x60, "PIDs supported 61-80", "PIDs 61-80", 4, PidSupportBitmap, false, 0.0, 0.0),
        (0x80, "PIDs supported 81-A0", "PIDs 81-A0", 4, PidSupportBitmap, false, 0.0, 0.0),
        (0xA0, "PIDs supported A1-C0", "PIDs A1-C0", 4, PidSupportBitmap, false, 0.0, 0.0),
        (0xC0, "PIDs supported C1-E0", "PIDs C1-E0", 4, PidSupportBitmap, false, 0.0, 0.0),
    ];
    entries
        .iter()
        .map(|&(pid, desc, short, width, dec, live, min, max)| CommandSpec {
            id: CommandId::Mode01(pid),
            description: desc,
            short_description: short,
            byte_width: width,
            decoder: dec,
            live,
            min,
            max,
        })
        .collect()
}

fn mode09_table() -> Vec<CommandSpec> {
    use DecoderId::*;
    vec![
        CommandSpec {
            id: CommandId::Mode09(0x00),
            description: "PIDs supported 01-20 (Mode 09)",
            short_description: "Mode09 PIDs 01-20",
            byte_width: 4,
            decoder: PidSupportBitmap,
            live: false,
            min: 0.0,
            max: 0.0,
        },
        CommandSpec {
            id: CommandId::Mode09(0x02),
            description: "Vehicle Identification Number",
            short_description: "VIN",
            byte_width: 17,
            decoder: EncodedString,
            live: false,
            min: 0.0,
            max: 0.0,
        },
        CommandSpec {
            id: CommandId::Mode09(0x04),
            description: "Calibration ID",
            short_description: "CALID",
            byte_width: 16,
            decoder: EncodedString,
            live: false,
            min: 0.0,
            max: 0.0,
        },
        CommandSpec {
            id: CommandId::Mode09(0x06),
            description: "Calibration Verification Number",
            short_description: "CVN",
            byte_width: 4,
            decoder: Cvn,
            live: false,
            min: 0.0,
            max: 0.0,
        },
        CommandSpec {
            id: CommandId::Mode09(0x0A),
            description: "ECU name",
            short_description: "ECU name",
            byte_width: 20,
            decoder: EncodedString,
            live: false,
            min: 0.0,
            max: 0.0,
        },
    ]
}

fn static_table() -> Vec<CommandSpec> {
    let mut table = Vec::new();
    table.push(CommandSpec {
        id: CommandId::Mode03,
        description: "Show stored trouble codes",
        short_description: "Stored DTCs",
        byte_width: 0,
        decoder: DecoderId::DtcList,
        live: false,
        min: 0.0,
        max: 0.0,
    });
    table.push(CommandSpec {
        id: CommandId::Mode04,
        description: "Clear trouble codes and stored values",
        short_description: "Clear DTCs",
        byte_width: 0,
        decoder: DecoderId::None,
        live: false,
        min: 0.0,
        max: 0.0,
    });
    table.push(CommandSpec {
        id: CommandId::Mode07,
        description: "Show pending trouble codes",
        short_description: "Pending DTCs",
        byte_width: 0,
        decoder: DecoderId::DtcList,
        live: false,
        min: 0.0,
        max: 0.0,
    });
    table.push(CommandSpec {
        id: CommandId::Mode0A,
        description: "Show permanent trouble codes",
        short_description: "Permanent DTCs",
        byte_width: 0,
        decoder: DecoderId::DtcList,
        live: false,
        min: 0.0,
        max: 0.0,
    });
    table.extend(mode01_table());
    table.extend(mode09_table());
    table
}

fn catalogue() -> &'static [CommandSpec] {
    static TABLE: OnceLock<Vec<CommandSpec>> = OnceLock::new();
    TABLE.get_or_init(static_table)
}

/// Looks up a [`CommandSpec`] by its [`CommandId`]. Returns `None` for
/// `Mode06` (test ids are vehicle-specific and not cataloged statically;
/// see [`mode06_spec`]) and for any `Mode01`/`Mode09` PID not in the
/// table.
pub fn lookup(id: CommandId) -> Option<&'static CommandSpec> {
    catalogue().iter().find(|spec| spec.id == id)
}

/// Synthesizes a [`CommandSpec`] for an arbitrary Mode 06 test id. Unlike
/// Mode 01/09 PIDs, Mode 06 TIDs are vehicle- and manufacturer-specific,
/// so there is no fixed catalogue entry to look up; every TID decodes the
/// same way.
pub fn mode06_spec(tid: u8) -> CommandSpec {
    CommandSpec {
        id: CommandId::Mode06(tid),
        description: "On-board monitoring test result",
        short_description: "Monitor test",
        byte_width: 0,
        decoder: DecoderId::MonitorTest,
        live: false,
        min: 0.0,
        max: 0.0,
    }
}

/// Finds the [`CommandSpec`] whose wire string matches `wire` exactly
/// (case-sensitive; callers should upper-case first).
pub fn lookup_by_wire(wire: &str) -> Option<&'static CommandSpec> {
    catalogue().iter().find(|spec| spec.id.wire() == wire)
}

/// Every statically cataloged [`CommandId`] whose decoder is
/// [`DecoderId::PidSupportBitmap`], in probe order, for both Mode 01 and
/// Mode 09.
pub fn support_getters() -> impl Iterator<Item = CommandId> {
    catalogue()
        .iter()
        .filter(|spec| spec.decoder == DecoderId::PidSupportBitmap)
        .map(|spec| spec.id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_strings_match_spec_examples() {
        assert_eq!(CommandId::Mode01(0x0D).wire(), "010D");
        assert_eq!(CommandId::Mode03.wire(), "03");
        assert_eq!(
            CommandId::Protocols(ProtocolsCmd::SetProtocol(OBDProtocol::CAN_11_500)).wire(),
            "ATSP6"
        );
    }

    #[test]
    fn lookup_finds_rpm_with_correct_width() {
        let spec = lookup(CommandId::Mode01(0x0C)).unwrap();
        assert_eq!(spec.byte_width, 2);
        assert_eq!(spec.decoder, DecoderId::Rpm);
    }

    #[test]
    fn lookup_by_wire_round_trips_with_wire() {
        let spec = lookup(CommandId::Mode01(0x0D)).unwrap();
        let by_wire = lookup_by_wire(&spec.id.wire()).unwrap();
        assert_eq!(spec.id, by_wire.id);
    }

    #[test]
    fn unlisted_pid_is_absent() {
        assert!(lookup(CommandId::Mode01(0xFE)).is_none());
    }

    #[test]
    fn support_getters_cover_every_pid_support_bitmap_entry() {
        let getters: Vec<CommandId> = support_getters().collect();
        assert!(getters.contains(&CommandId::Mode01(0x00)));
        assert!(getters.contains(&CommandId::Mode09(0x00)));
        assert!(getters.len() >= MODE01_SUPPORT_GETTERS.len());
    }
}
