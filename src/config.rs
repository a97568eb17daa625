//! The immutable configuration value object: every tunable named by the
//! session and polling engine, constructed once by the caller and captured
//! by the session at `connect` time.
//!
//! A `Copy` settings struct passed into a session constructor, collapsed
//! into a single struct threaded through one session rather than duplicated
//! per protocol module - there is one wire protocol here (ELM327 text), not
//! one per diagnostic layer. No global mutable settings object exists
//! anywhere in the core; every timeout/retry value used by [`crate::session`]
//! and [`crate::polling`] flows from the `Config` the caller passed to
//! `connect`.

use crate::catalogue::UnitSystem;
use crate::protocol::OBDProtocol;
use std::time::Duration;

/// Where the transport should connect.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Endpoint {
    /// A TCP/IP (WiFi) ELM327 adapter.
    Tcp {
        /// Hostname or IP address.
        host: String,
        /// TCP port, commonly `35000`.
        port: u16,
    },
    /// A Bluetooth Low Energy ELM327 adapter, looked up by advertised name.
    #[cfg(feature = "ble")]
    Ble {
        /// The advertised local name to scan for.
        device_name: String,
    },
    /// An in-memory transport the caller constructs and supplies directly;
    /// `connect` is a no-op for this variant since the transport is already
    /// owned by the caller.
    Preconfigured,
}

/// Every tunable the session and polling engine consult, built once by the
/// caller and passed into `connect`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Config {
    /// Where to connect.
    pub endpoint: Endpoint,
    /// Per-command timeout: how long `send` waits for the `>` prompt.
    pub command_timeout: Duration,
    /// Number of additional attempts after the first failed send (`R`).
    pub retries: u8,
    /// Delay observed after each adapter-init `AT` command before the next
    /// is sent.
    pub init_delay: Duration,
    /// Minimum spacing enforced between the start of one polling round and
    /// the next.
    pub min_polling_interval: Duration,
    /// Upper bound the adaptive pacer may stretch the polling interval to
    /// when round-trip times are high.
    pub max_polling_interval: Duration,
    /// Protocol to try first during negotiation, before falling back to
    /// auto-detect and the manual probe order. `None` goes straight to
    /// auto-detect (`ATSP0`).
    pub preferred_protocol: Option<OBDProtocol>,
    /// Unit system every decoded measurement is converted into.
    pub unit_system: UnitSystem,
    /// Enables the legacy multi-frame emulator quirk (payloads of 4/5 bytes
    /// with no sequence byte, concatenated verbatim) for talking to known
    /// software simulators instead of real adapters.
    pub emulator_compat: bool,
    /// Enables stripping a trailing legacy checksum byte from 9141-2/KWP
    /// raw frames before PCI/payload splitting, for adapters configured
    /// with `ATL0`/`ATS0` but that still append one.
    pub legacy_checksum_mode: bool,
}

impl Config {
    /// A `Config` for talking to an in-memory [`crate::transport::mock::MockTransport`]
    /// (or any caller-owned transport), with conservative defaults for
    /// everything else.
    pub fn for_preconfigured_transport() -> Self {
        Self {
            endpoint: Endpoint::Preconfigured,
            ..Self::defaults()
        }
    }

    /// A `Config` targeting a WiFi ELM327 adapter at `host:port`.
    pub fn for_tcp(host: impl Into<String>, port: u16) -> Self {
        Self {
            endpoint: Endpoint::Tcp { host: host.into(), port },
            ..Self::defaults()
        }
    }

    /// A `Config` targeting a BLE ELM327 adapter advertising `device_name`.
    #[cfg(feature = "ble")]
    pub fn for_ble(device_name: impl Into<String>) -> Self {
        Self {
            endpoint: Endpoint::Ble { device_name: device_name.into() },
            ..Self::defaults()
        }
    }

    fn defaults() -> Self {
        Self {
            endpoint: Endpoint::Preconfigured,
            command_timeout: Duration::from_millis(2_000),
            retries: 2,
            init_delay: Duration::from_millis(50),
            min_polling_interval: Duration::from_millis(300),
            max_polling_interval: Duration::from_millis(5_000),
            preferred_protocol: None,
            unit_system: UnitSystem::Metric,
            emulator_compat: false,
            legacy_checksum_mode: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_conservative() {
        let cfg = Config::default();
        assert_eq!(cfg.retries, 2);
        assert_eq!(cfg.unit_system, UnitSystem::Metric);
        assert!(!cfg.emulator_compat);
    }

    #[test]
    fn for_tcp_overrides_only_endpoint() {
        let cfg = Config::for_tcp("192.168.0.10", 35000);
        assert_eq!(cfg.endpoint, Endpoint::Tcp { host: "192.168.0.10".to_string(), port: 35000 });
        assert_eq!(cfg.command_timeout, Config::default().command_timeout);
    }
}
