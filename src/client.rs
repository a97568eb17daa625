//! The public API surface: [`ObdClient`] wraps [`crate::session::ElmSession`]
//! with the request/scan/clear/poll vocabulary callers actually reach for,
//! translating typed-value mismatches into [`ClientError`] instead of
//! leaking [`TypedValue`] pattern matching to every caller.
//!
//! A thin struct over the protocol-specific session that exposes the few
//! operations a consumer actually issues, backed by an `Arc` so a
//! background poll loop can share ownership with the caller.

use crate::catalogue::{CommandId, MeasurementResult, MonitorTestResult, TypedValue};
use crate::config::Config;
use crate::dtc::TroubleCode;
use crate::ecu::ECUID;
use crate::error::{ClientError, ClientResult};
use crate::polling::{self, PollHandle, PollSample, PollStrategy};
use crate::session::{ElmSession, OBDInfo};
use crate::status::Status;
use crate::transport::Transport;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// The crate's top-level client: one adapter connection, one vehicle
/// session.
pub struct ObdClient<T: Transport> {
    session: Arc<ElmSession<T>>,
}

impl<T: Transport> std::fmt::Debug for ObdClient<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObdClient").finish_non_exhaustive()
    }
}

impl<T: Transport + 'static> ObdClient<T> {
    /// Wraps `transport` with `config`. Does not connect.
    pub fn new(transport: T, config: Config) -> Self {
        Self { session: Arc::new(ElmSession::new(transport, config)) }
    }

    /// Runs the adapter init sequence, negotiates a protocol, and discovers
    /// the VIN and supported PIDs. Returns the resulting [`OBDInfo`]
    /// snapshot.
    pub fn connect(&self) -> ClientResult<OBDInfo> {
        self.session.connect()
    }

    /// Disconnects the underlying transport.
    pub fn disconnect(&self) {
        self.session.disconnect();
    }

    /// A snapshot of everything learned about the adapter/vehicle during
    /// `connect`.
    pub fn info(&self) -> OBDInfo {
        self.session.info()
    }

    /// Every `CommandId` the vehicle reported as supported.
    pub fn supported_pids(&self) -> Vec<CommandId> {
        self.session.info().supported_pids
    }

    /// Issues an arbitrary catalogued command and returns its decoded value
    /// verbatim, for callers that want to match on [`TypedValue`]
    /// themselves.
    pub fn send_command(&self, id: CommandId) -> ClientResult<TypedValue> {
        self.session.request(id)
    }

    /// Requests a single Mode 01 PID.
    pub fn request_pid(&self, pid: u8) -> ClientResult<TypedValue> {
        self.session.request(CommandId::Mode01(pid))
    }

    /// Requests every id in `ids` in turn and collects the ones that decode
    /// to a [`MeasurementResult`], keyed by the [`CommandId`] that produced
    /// them. A command that fails outright (transport/session error) aborts
    /// the whole batch; a command that answers but decodes to a non-
    /// measurement shape (a bitmap, a string, ...) is silently omitted
    /// rather than treated as a batch failure.
    pub fn request_pids(&self, ids: Vec<CommandId>) -> ClientResult<HashMap<CommandId, MeasurementResult>> {
        let mut out = HashMap::with_capacity(ids.len());
        for id in ids {
            if let TypedValue::Measurement(m) = self.session.request(id)? {
                out.insert(id, m);
            } else {
                log::warn!("request_pids: {} did not decode to a measurement, omitting", id.wire());
            }
        }
        Ok(out)
    }

    /// Mode 01 PID 01 readiness/monitor status.
    pub fn status(&self) -> ClientResult<Status> {
        expect_status(self.session.request(CommandId::Mode01(0x01))?)
    }

    /// Mode 03: stored trouble codes, keyed by the ECU that reported them
    /// (more than one control unit can have codes set at once).
    pub fn scan_trouble_codes(&self) -> ClientResult<BTreeMap<ECUID, Vec<TroubleCode>>> {
        self.session.scan_dtcs(CommandId::Mode03)
    }

    /// Mode 07: pending trouble codes (not yet confirmed over a full drive
    /// cycle), keyed by ECU.
    pub fn scan_pending_codes(&self) -> ClientResult<BTreeMap<ECUID, Vec<TroubleCode>>> {
        self.session.scan_dtcs(CommandId::Mode07)
    }

    /// Mode 0A: permanent trouble codes (cannot be cleared by `ATZ`/Mode 04,
    /// only by the ECU itself after repair verification), keyed by ECU.
    pub fn scan_permanent_codes(&self) -> ClientResult<BTreeMap<ECUID, Vec<TroubleCode>>> {
        self.session.scan_dtcs(CommandId::Mode0A)
    }

    /// Mode 04: clears stored trouble codes and freeze-frame data.
    pub fn clear_trouble_codes(&self) -> ClientResult<()> {
        self.session
            .request(CommandId::Mode04)
            .map(|_| ())
            .map_err(|e| ClientError::ClearFailed(e.to_string()))
    }

    /// Mode 06: on-board monitoring test results for test id `tid`.
    pub fn scan_monitor_tests(&self, tid: u8) -> ClientResult<Vec<MonitorTestResult>> {
        expect_monitor_tests(self.session.request(CommandId::Mode06(tid))?)
    }

    /// `ATRV`: the adapter's reported supply voltage.
    pub fn read_adapter_voltage(&self) -> ClientResult<f32> {
        self.session.read_adapter_voltage()
    }

    /// Starts a background poll loop over `pids`, delivering one
    /// [`PollSample`] per PID per round to `on_sample` until the returned
    /// [`PollHandle`] is cancelled or dropped. Pacing stays within the
    /// `min`/`max` polling interval configured at construction.
    pub fn continuous_updates(
        &self,
        pids: Vec<CommandId>,
        strategy: PollStrategy,
        on_sample: impl FnMut(PollSample) + Send + 'static,
    ) -> PollHandle {
        let (min_interval, max_interval) = self.session.polling_interval_bounds();
        polling::start(self.session.clone(), pids, strategy, min_interval, max_interval, on_sample)
    }
}

fn expect_status(value: TypedValue) -> ClientResult<Status> {
    match value {
        TypedValue::Status(s) => Ok(s),
        _ => Err(mismatch("0101")),
    }
}

fn expect_monitor_tests(value: TypedValue) -> ClientResult<Vec<MonitorTestResult>> {
    match value {
        TypedValue::MonitorTests(tests) => Ok(tests),
        _ => Err(mismatch("06")),
    }
}

fn mismatch(cmd: &str) -> ClientError {
    ClientError::CommandFailed { cmd: cmd.to_string(), cause: "decoder returned an unexpected value shape".to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::OBDProtocol;
    use crate::transport::mock::MockTransport;

    fn connected_client() -> ObdClient<MockTransport> {
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
        t.add_response("010C", "7E8 04 41 0C 0F A0\r>");
        t.add_response("03", "7E8 06 43 01 01 33 00 00\r>");
        t.add_response("04", "7E8 01 44\r>");
        t.connect(std::time::Duration::from_secs(1)).unwrap();

        let mut cfg = Config::for_preconfigured_transport();
        cfg.preferred_protocol = Some(OBDProtocol::CAN_11_500);
        let client = ObdClient::new(t, cfg);
        client.connect().unwrap();
        client
    }

    #[test]
    fn request_pid_decodes_rpm() {
        let client = connected_client();
        let v = client.request_pid(0x0C).unwrap();
        match v {
            TypedValue::Measurement(m) => assert!((m.value - 1000.0).abs() < 1e-6),
            _ => panic!("expected a measurement"),
        }
    }

    #[test]
    fn request_pids_collects_measurements_and_skips_non_measurement_ids() {
        let client = connected_client();
        let result = client
            .request_pids(vec![CommandId::Mode01(0x0C), CommandId::Mode03])
            .unwrap();
        assert_eq!(result.len(), 1);
        let rpm = &result[&CommandId::Mode01(0x0C)];
        assert!((rpm.value - 1000.0).abs() < 1e-6);
    }

    #[test]
    fn scan_trouble_codes_decodes_stored_dtc_keyed_by_ecu() {
        let client = connected_client();
        let by_ecu = client.scan_trouble_codes().unwrap();
        assert_eq!(by_ecu.len(), 1);
        let codes = by_ecu.values().next().unwrap();
        assert_eq!(codes.len(), 1);
        assert_eq!(codes[0].code, "P0133");
    }

    #[test]
    fn clear_trouble_codes_succeeds_on_ack() {
        let client = connected_client();
        client.clear_trouble_codes().unwrap();
    }
}
