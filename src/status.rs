//! Mode 01 PID 01 readiness/monitor status: `{mil, dtc_count, ignition,
//! tests}`.

use std::collections::BTreeMap;

/// Spark vs compression ignition, selected by bit 3 of the readiness
/// frame's second byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum IgnitionType {
    /// Gasoline/spark-ignition engines.
    Spark,
    /// Diesel/compression-ignition engines.
    Compression,
}

/// Availability and completion state of a single readiness monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MonitorState {
    /// Whether the vehicle supports this monitor at all.
    pub available: bool,
    /// Whether the monitor has completed its test this drive cycle.
    pub complete: bool,
}

/// Decoded Mode 01 PID 01 readiness status.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Status {
    /// Malfunction indicator lamp state.
    pub mil: bool,
    /// Number of stored trouble codes.
    pub dtc_count: u8,
    /// Engine ignition type, which selects the fuel-type-dependent monitor
    /// set.
    pub ignition: IgnitionType,
    /// Every readiness monitor by name: the three always-present base
    /// monitors plus the eight ignition-type-dependent ones.
    pub tests: BTreeMap<&'static str, MonitorState>,
}

const SPARK_MONITORS: [&str; 8] = [
    "catalyst",
    "heated_catalyst",
    "evaporative_system",
    "secondary_air_system",
    "ac_refrigerant",
    "oxygen_sensor",
    "oxygen_sensor_heater",
    "egr_system",
];

const COMPRESSION_MONITORS: [&str; 8] = [
    "nmhc_catalyst",
    "nox_scr_monitor",
    "reserved_2",
    "boost_pressure",
    "reserved_4",
    "exhaust_gas_sensor",
    "pm_filter_monitoring",
    "egr_vvt_system",
];

/// Decodes the 4-byte Mode 01 PID 01 payload (already stripped of the
/// service byte and PID echo).
pub fn decode_status(payload: &[u8]) -> Option<Status> {
    let [a, b, c, d] = payload else { return None };

    let mil = a & 0x80 != 0;
    let dtc_count = a & 0x7F;
    let ignition = if b & 0x08 != 0 {
        IgnitionType::Compression
    } else {
        IgnitionType::Spark
    };

    let mut tests = BTreeMap::new();
    tests.insert(
        "misfire",
        MonitorState {
            available: b & 0x01 != 0,
            complete: b & 0x10 != 0,
        },
    );
    tests.insert(
        "fuel_system",
        MonitorState {
            available: b & 0x02 != 0,
            complete: b & 0x20 != 0,
        },
    );
    tests.insert(
        "comprehensive_component",
        MonitorState {
            available: b & 0x04 != 0,
            complete: b & 0x40 != 0,
        },
    );

    let names = match ignition {
        IgnitionType::Spark => &SPARK_MONITORS,
        IgnitionType::Compression => &COMPRESSION_MONITORS,
    };
    for (i, name) in names.iter().enumerate() {
        let bit = 1 << i;
        tests.insert(
            name,
            MonitorState {
                available: c & bit != 0,
                complete: d & bit != 0,
            },
        );
    }

    Some(Status {
        mil,
        dtc_count,
        ignition,
        tests,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_scenario_from_fixture() {
        let payload = crate::hex_to_bytes("8207E500").unwrap();
        let status = decode_status(&payload).unwrap();
        assert!(status.mil);
        assert_eq!(status.dtc_count, 2);
        assert_eq!(status.ignition, IgnitionType::Spark);
        let misfire = status.tests["misfire"];
        assert!(misfire.available);
        assert!(!misfire.complete);
    }

    #[test]
    fn short_payload_returns_none() {
        assert_eq!(decode_status(&[0x82, 0x07, 0xE5]), None);
    }
}
