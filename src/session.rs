//! The ELM327 session: adapter `AT` init sequence, protocol auto-negotiation,
//! ECU map resolution, VIN/identifier discovery, and supported-PID
//! discovery, all built on top of [`crate::line_session::LineSession`].
//!
//! Runs a fixed handshake before handing back a session the rest of the
//! crate can issue requests through: the `AT` init string plus protocol
//! detection, in place of a UDS/KWP `StartDiagnosticSession` request.

use crate::catalogue::{self, decode, CommandId, CommandSpec, GeneralCmd, ProtocolsCmd, TypedValue};
use crate::config::Config;
use crate::ecu::ECUID;
use crate::error::{ClientError, ClientResult, ProtocolError, ProtocolResult, SessionResult};
use crate::frame::{can, legacy};
use crate::line_session::LineSession;
use crate::message::Message;
use crate::protocol::OBDProtocol;
use crate::transport::Transport;
use std::collections::BTreeMap;
use std::sync::RwLock;

/// Everything learned about the vehicle and adapter during `connect`.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OBDInfo {
    /// Vehicle Identification Number, if Mode 09 PID 02 answered.
    pub vin: Option<String>,
    /// Every `CommandId` the vehicle reported as supported, discovered via
    /// the Mode 01/09 PID-support bitmaps.
    pub supported_pids: Vec<CommandId>,
    /// The negotiated vehicle protocol.
    pub obd_protocol: Option<OBDProtocol>,
    /// Arbitration/rx id to resolved ECU identity, built from whichever
    /// ECUs answered during negotiation.
    pub ecu_map: BTreeMap<u32, ECUID>,
    /// The `ATI` adapter identification banner, verbatim.
    pub adapter_description: Option<String>,
    /// The `ATDPN` protocol name/number string, verbatim.
    pub protocol_name: Option<String>,
}

/// Drives one ELM327 adapter through its init sequence, protocol
/// negotiation and vehicle discovery, and serves typed requests afterward.
pub struct ElmSession<T: Transport> {
    line: LineSession<T>,
    config: Config,
    info: RwLock<OBDInfo>,
}

impl<T: Transport> std::fmt::Debug for ElmSession<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElmSession").finish_non_exhaustive()
    }
}

impl<T: Transport> ElmSession<T> {
    /// Wraps a transport with the given configuration. Does not connect.
    pub fn new(transport: T, config: Config) -> Self {
        Self {
            line: LineSession::new(transport),
            config,
            info: RwLock::new(OBDInfo::default()),
        }
    }

    /// Runs the full connect sequence: transport connect, `AT` init string,
    /// protocol negotiation, ECU map resolution, VIN lookup and
    /// supported-PID discovery. Returns the resulting [`OBDInfo`] snapshot,
    /// also retrievable afterward via [`ElmSession::info`].
    pub fn connect(&self) -> ClientResult<OBDInfo> {
        self.line.connect(self.config.command_timeout).map_err(ClientError::from)?;
        let banner = self.run_init_sequence().map_err(ClientError::from)?;
        let protocol = self.negotiate_protocol()?;
        {
            let mut info = self.info.write().expect("lock poisoned");
            info.adapter_description = Some(banner);
            info.obd_protocol = Some(protocol);
        }
        self.refresh_protocol_name();
        self.resolve_ecu_map(protocol)?;
        self.discover_vin();
        self.discover_supported_pids()?;
        Ok(self.info())
    }

    /// Disconnects the underlying transport.
    pub fn disconnect(&self) {
        self.line.disconnect();
    }

    /// A snapshot of everything learned about the adapter/vehicle so far.
    pub fn info(&self) -> OBDInfo {
        self.info.read().expect("lock poisoned").clone()
    }

    fn run_init_sequence(&self) -> SessionResult<String> {
        for cmd in [
            GeneralCmd::Reset,
            GeneralCmd::EchoOff,
            GeneralCmd::LinefeedOff,
            GeneralCmd::SpacesOff,
            GeneralCmd::HeadersOn,
        ] {
            self.send_at(CommandId::General(cmd))?;
            std::thread::sleep(self.config.init_delay);
        }
        let banner = self.send_at(CommandId::General(GeneralCmd::Info))?;
        Ok(banner.join(" "))
    }

    fn send_at(&self, id: CommandId) -> SessionResult<Vec<String>> {
        self.line.send(&id.wire(), self.config.command_timeout, self.config.retries)
    }

    /// Reads the adapter's supply voltage via `ATRV`, parsing a reply like
    /// `"12.3V"`.
    pub fn read_adapter_voltage(&self) -> ClientResult<f32> {
        let lines = self.send_at(CommandId::General(GeneralCmd::ReadVoltage)).map_err(ClientError::from)?;
        let line = lines.first().ok_or(ClientError::NoData)?;
        let numeric = line.trim_end_matches('V').trim_end_matches('v');
        numeric.parse::<f32>().map_err(|_| ClientError::CommandFailed {
            cmd: "ATRV".to_string(),
            cause: format!("could not parse voltage from {line:?}"),
        })
    }

    fn negotiate_protocol(&self) -> ClientResult<OBDProtocol> {
        if let Some(preferred) = self.config.preferred_protocol {
            if self.try_protocol(preferred).is_ok() {
                return Ok(preferred);
            }
            log::warn!("preferred protocol {preferred} failed to answer, falling back to auto-detect");
        }

        if self.try_protocol(OBDProtocol::Auto).is_ok() {
            if let Some(detected) = self.read_negotiated_protocol() {
                return Ok(detected);
            }
            return Ok(OBDProtocol::Auto);
        }

        for &candidate in OBDProtocol::manual_probe_order() {
            if self.try_protocol(candidate).is_ok() {
                return Ok(candidate);
            }
        }

        Err(ClientError::Protocol(ProtocolError::NoProtocolFound))
    }

    fn try_protocol(&self, protocol: OBDProtocol) -> ProtocolResult<()> {
        self.send_at(CommandId::Protocols(ProtocolsCmd::SetProtocol(protocol)))
            .map_err(|_| ProtocolError::NoProtocolFound)?;
        self.send_at(CommandId::Mode01(0x00))
            .map(|_| ())
            .map_err(|_| ProtocolError::NoProtocolFound)
    }

    fn read_negotiated_protocol(&self) -> Option<OBDProtocol> {
        let lines = self.send_at(CommandId::Protocols(ProtocolsCmd::DescribeProtocolNumber)).ok()?;
        let reply = lines.first()?;
        let id_hex = reply.trim_start_matches('A').trim();
        let id = u8::from_str_radix(id_hex, 16).ok()?;
        Some(OBDProtocol::from_elm_id(id))
    }

    fn refresh_protocol_name(&self) {
        if let Ok(lines) = self.send_at(CommandId::Protocols(ProtocolsCmd::DescribeProtocolNumber)) {
            self.info.write().expect("lock poisoned").protocol_name = lines.first().cloned();
        }
    }

    fn resolve_ecu_map(&self, protocol: OBDProtocol) -> ClientResult<()> {
        let messages = self.request_messages(CommandId::Mode01(0x00), protocol)?;
        let mut ids: Vec<u32> = messages
            .iter()
            .filter_map(|m| m.ecu.raw_id())
            .collect();
        ids.sort_unstable();
        ids.dedup();

        let mut map = BTreeMap::new();
        let mut iter = ids.into_iter();
        if let Some(first) = iter.next() {
            map.insert(first, ECUID::Engine);
        }
        if let Some(second) = iter.next() {
            map.insert(second, ECUID::Transmission);
        }
        for remaining in iter {
            map.insert(remaining, ECUID::Unknown(remaining));
        }
        self.info.write().expect("lock poisoned").ecu_map = map;
        Ok(())
    }

    fn discover_vin(&self) {
        if let Ok(TypedValue::EncodedString(vin)) = self.request(CommandId::Mode09(0x02)) {
            if !vin.is_empty() {
                self.info.write().expect("lock poisoned").vin = Some(vin);
            }
        }
    }

    /// Chained bitmap discovery per §4.4: starting from each mode's `*00`
    /// getter, union every responding ECU's bitmap into `supported`, and
    /// only issue the next getter (`base + 0x20`) when some ECU's bitmap has
    /// its last bit set.
    fn discover_supported_pids(&self) -> ClientResult<()> {
        let protocol = self.info.read().expect("lock poisoned").obd_protocol.unwrap_or(OBDProtocol::Auto);
        let mut supported = Vec::new();
        for mut getter in [CommandId::Mode01(0x00), CommandId::Mode09(0x00)] {
            loop {
                let Ok(messages) = self.request_messages(getter, protocol) else {
                    break;
                };
                let base = match getter {
                    CommandId::Mode01(base) | CommandId::Mode09(base) => base,
                    _ => break,
                };
                let mut chain_next = false;
                for message in &messages {
                    let payload = decoder_payload(message, getter);
                    let Ok(TypedValue::Raw(bitmap)) =
                        decode(catalogue::DecoderId::PidSupportBitmap, payload, self.config.unit_system, 0.0, 0.0)
                    else {
                        continue;
                    };
                    for (byte_idx, byte) in bitmap.iter().enumerate() {
                        for bit in 0..8 {
                            if byte & (0x80 >> bit) != 0 {
                                let pid = base.wrapping_add((byte_idx * 8 + bit + 1) as u8);
                                let cmd = match getter {
                                    CommandId::Mode09(_) => CommandId::Mode09(pid),
                                    _ => CommandId::Mode01(pid),
                                };
                                if !supported.contains(&cmd) {
                                    supported.push(cmd);
                                }
                            }
                        }
                    }
                    if bitmap.last().is_some_and(|b| b & 0x01 != 0) {
                        chain_next = true;
                    }
                }
                if !chain_next {
                    break;
                }
                getter = match getter {
                    CommandId::Mode01(base) => CommandId::Mode01(base.wrapping_add(0x20)),
                    CommandId::Mode09(base) => CommandId::Mode09(base.wrapping_add(0x20)),
                    other => other,
                };
            }
        }
        self.info.write().expect("lock poisoned").supported_pids = supported;
        Ok(())
    }

    /// Sends one command and decodes its reply into a [`TypedValue`].
    pub fn request(&self, id: CommandId) -> ClientResult<TypedValue> {
        let protocol = self.info.read().expect("lock poisoned").obd_protocol.unwrap_or(OBDProtocol::Auto);
        let messages = self.request_messages(id, protocol)?;
        let message = messages.into_iter().next().ok_or(ClientError::NoData)?;
        let spec = command_spec(id);
        let payload = decoder_payload(&message, id);
        decode(spec.decoder, payload, self.config.unit_system, spec.min, spec.max)
            .map_err(|e| ClientError::CommandFailed { cmd: id.wire(), cause: e.to_string() })
    }

    /// Sends a DTC-bearing command (Mode 03/07/0A) and decodes every
    /// responding ECU's payload independently, since a stored/pending/
    /// permanent code can be set by more than one control unit at once.
    pub fn scan_dtcs(&self, id: CommandId) -> ClientResult<BTreeMap<ECUID, Vec<crate::dtc::TroubleCode>>> {
        let protocol = self.info.read().expect("lock poisoned").obd_protocol.unwrap_or(OBDProtocol::Auto);
        let messages = self.request_messages(id, protocol)?;
        let spec = command_spec(id);
        let mut by_ecu = BTreeMap::new();
        for message in &messages {
            let payload = decoder_payload(message, id);
            match decode(spec.decoder, payload, self.config.unit_system, spec.min, spec.max) {
                Ok(TypedValue::TroubleCodes(codes)) => {
                    by_ecu.insert(message.ecu, codes);
                }
                Ok(_) => {
                    log::warn!("scan_dtcs: {} returned a non-trouble-code value, skipping ECU {}", id.wire(), message.ecu);
                }
                Err(e) => {
                    log::warn!("scan_dtcs: failed to decode {} response from ECU {}: {e}", id.wire(), message.ecu);
                }
            }
        }
        Ok(by_ecu)
    }

    fn request_messages(&self, id: CommandId, protocol: OBDProtocol) -> ClientResult<Vec<Message>> {
        let lines = self.send_at(id).map_err(ClientError::from)?;
        self.reassemble(lines, protocol)
    }

    fn reassemble(&self, lines: Vec<String>, protocol: OBDProtocol) -> ClientResult<Vec<Message>> {
        if protocol.is_can() {
            let ecu_map = self.info.read().expect("lock poisoned").ecu_map.clone();
            Ok(can::parse_lines(&lines, protocol.is_29bit(), true, Some(&ecu_map))?)
        } else {
            let min_hex = if self.config.emulator_compat { 4 } else { 12 };
            Ok(legacy::parse_lines(&lines, min_hex, self.config.emulator_compat)?)
        }
    }

    /// Sends an arbitrary wire string (bypassing the catalogue) and returns
    /// the negotiated protocol alongside the adapter's reply lines, for
    /// callers that need to interpret a reply themselves.
    pub(crate) fn send_raw(&self, wire: &str) -> ClientResult<(OBDProtocol, Vec<String>)> {
        let protocol = self.info.read().expect("lock poisoned").obd_protocol.unwrap_or(OBDProtocol::Auto);
        let lines = self.line.send(wire, self.config.command_timeout, self.config.retries).map_err(ClientError::from)?;
        Ok((protocol, lines))
    }

    /// Sends an arbitrary wire string and reassembles the reply into
    /// [`Message`]s, for callers that issue a compound request the
    /// catalogue has no single [`CommandId`] for (the batched Mode 01
    /// polling request used by [`crate::polling`]).
    pub(crate) fn send_raw_messages(&self, wire: &str) -> ClientResult<Vec<Message>> {
        let protocol = self.info.read().expect("lock poisoned").obd_protocol.unwrap_or(OBDProtocol::Auto);
        let lines = self.line.send(wire, self.config.command_timeout, self.config.retries).map_err(ClientError::from)?;
        self.reassemble(lines, protocol)
    }

    /// The catalogue entry for `id`, for callers outside this module that
    /// need to decode bytes they obtained themselves (polling's batched
    /// splitter).
    pub(crate) fn command_spec_for(&self, id: CommandId) -> CommandSpec {
        command_spec(id)
    }

    /// The unit system every decoded measurement should be converted into.
    pub(crate) fn unit_system(&self) -> catalogue::UnitSystem {
        self.config.unit_system
    }

    /// The configured `(min, max)` polling interval bounds.
    pub(crate) fn polling_interval_bounds(&self) -> (std::time::Duration, std::time::Duration) {
        (self.config.min_polling_interval, self.config.max_polling_interval)
    }
}

/// Slices a reassembled [`Message`] down to the bytes its decoder expects,
/// skipping the PID/TID echo that Mode 01/09 responses carry between the
/// service byte (already stripped by `service_payload()`) and the actual
/// value bytes. Mode 03/04/06/07/0A responses carry no such echo.
fn decoder_payload<'a>(message: &'a Message, id: CommandId) -> &'a [u8] {
    let payload = message.service_payload();
    match id {
        CommandId::Mode01(_) | CommandId::Mode09(_) => payload.get(1..).unwrap_or(&[]),
        _ => payload,
    }
}

fn command_spec(id: CommandId) -> CommandSpec {
    if let CommandId::Mode06(tid) = id {
        return catalogue::mode06_spec(tid);
    }
    catalogue::lookup(id).cloned().unwrap_or(CommandSpec {
        id,
        description: "unregistered command",
        short_description: "unregistered",
        byte_width: 0,
        decoder: catalogue::DecoderId::None,
        live: false,
        min: 0.0,
        max: 0.0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::MockTransport;

    fn connected_mock() -> MockTransport {
        let mut t = MockTransport::new();
        t.add_response("ATZ", "ELM327 v1.5\r>");
        t.add_response("ATE0", "OK\r>");
        t.add_response("ATL0", "OK\r>");
        t.add_response("ATS0", "OK\r>");
        t.add_response("ATH1", "OK\r>");
        t.add_response("ATI", "ELM327 v1.5\r>");
        t.add_response("ATSP6", "OK\r>");
        t.add_response("0100", "7E8 06 41 00 98 3B 80 13\r>");
        t.add_response("ATDPN", "A6\r>");
        t.add_response("0902", "7E8 10 14 49 02 01 31 47 31\r7E8 21 4A 43 35 34 34 34 52\r7E8 22 37 32 35 32 33 36 37\r>");
        t.add_response("0120", "7E8 06 41 20 00 00 00 01\r>");
        t.add_response("0900", "7E8 06 49 00 00 00 00 01\r>");
        t.connect(std::time::Duration::from_secs(1)).unwrap();
        t
    }

    #[test]
    fn connect_runs_init_and_negotiates_can_protocol() {
        let mut cfg = Config::for_preconfigured_transport();
        cfg.preferred_protocol = Some(OBDProtocol::CAN_11_500);
        let session = ElmSession::new(connected_mock(), cfg);
        session.connect().unwrap();
        let info = session.info();
        assert_eq!(info.obd_protocol, Some(OBDProtocol::CAN_11_500));
        assert_eq!(info.vin.as_deref(), Some("1G1JC5444R7252367"));
    }

    #[test]
    fn resolves_single_responding_ecu_as_engine() {
        let mut cfg = Config::for_preconfigured_transport();
        cfg.preferred_protocol = Some(OBDProtocol::CAN_11_500);
        let session = ElmSession::new(connected_mock(), cfg);
        session.connect().unwrap();
        let info = session.info();
        assert_eq!(info.ecu_map.get(&0x7E8), Some(&ECUID::Engine));
    }
}
