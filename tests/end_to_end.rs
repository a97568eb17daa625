//! End-to-end scenarios driving [`ObdClient`] over [`MockTransport`],
//! covering the full path from adapter init through protocol negotiation,
//! frame reassembly, decoding, and polling.

use elm_diagnostics::catalogue::{CommandId, TypedValue};
use elm_diagnostics::config::Config;
use elm_diagnostics::ecu::ECUID;
use elm_diagnostics::polling::PollStrategy;
use elm_diagnostics::protocol::OBDProtocol;
use elm_diagnostics::transport::mock::MockTransport;
use elm_diagnostics::transport::Transport;
use elm_diagnostics::ObdClient;
use std::time::Duration;

fn init_on(t: &mut MockTransport) {
    t.add_response("ATZ", "ELM327 v1.5\r>");
    t.add_response("ATE0", "OK\r>");
    t.add_response("ATL0", "OK\r>");
    t.add_response("ATS0", "OK\r>");
    t.add_response("ATH1", "OK\r>");
    t.add_response("ATI", "ELM327 v1.5\r>");
}

/// Brings up a client over CAN 11/500 with the base discovery replies any
/// `connect()` call issues (protocol select, `0100`, `ATDPN`, VIN, PID
/// support bitmaps), ready for the caller to layer additional responses on
/// top before connecting.
fn can_client(extra: &[(&str, &str)]) -> ObdClient<MockTransport> {
    let mut t = MockTransport::new();
    init_on(&mut t);
    t.add_response("ATSP6", "OK\r>");
    t.add_response("0100", "7E8 06 41 00 98 3B 80 13\r>");
    t.add_response("ATDPN", "A6\r>");
    t.add_response(
        "0902",
        "7E8 10 14 49 02 01 31 47 31\r7E8 21 4A 43 35 34 34 34 52\r7E8 22 37 32 35 32 33 36 37\r>",
    );
    t.add_response("0120", "7E8 06 41 20 00 00 00 01\r>");
    t.add_response("0900", "7E8 06 49 00 00 00 00 01\r>");
    for (cmd, reply) in extra {
        t.add_response(cmd, reply);
    }
    t.connect(Duration::from_secs(1)).unwrap();

    let mut cfg = Config::for_preconfigured_transport();
    cfg.preferred_protocol = Some(OBDProtocol::CAN_11_500);
    let client = ObdClient::new(t, cfg);
    client.connect().unwrap();
    client
}

#[test]
fn speed_single_frame_decodes_to_kmh() {
    let client = can_client(&[("010D", "7E8 03 41 0D 32\r>")]);
    match client.request_pid(0x0D).unwrap() {
        TypedValue::Measurement(m) => assert!((m.value - 50.0).abs() < 1e-6),
        other => panic!("expected a measurement, got {other:?}"),
    }
}

#[test]
fn rpm_and_speed_batch_poll_delivers_both_samples_per_round() {
    let client = can_client(&[("010C0D", "7E8 06 41 0C 0F A0 0D 32\r>")]);

    let (tx, rx) = std::sync::mpsc::channel();
    let mut handle = client.continuous_updates(
        vec![CommandId::Mode01(0x0C), CommandId::Mode01(0x0D)],
        PollStrategy::Batched,
        move |sample| {
            let _ = tx.send(sample);
        },
    );

    let first = rx.recv_timeout(Duration::from_secs(2)).unwrap();
    let second = rx.recv_timeout(Duration::from_secs(2)).unwrap();
    handle.cancel();

    let mut samples = vec![first, second];
    samples.sort_by_key(|s| match s.id {
        CommandId::Mode01(pid) => pid,
        _ => 0xFF,
    });

    let rpm = samples[0].outcome.as_ref().unwrap();
    let speed = samples[1].outcome.as_ref().unwrap();
    match rpm {
        TypedValue::Measurement(m) => assert!((m.value - 1000.0).abs() < 1e-6),
        other => panic!("expected rpm measurement, got {other:?}"),
    }
    match speed {
        TypedValue::Measurement(m) => assert!((m.value - 50.0).abs() < 1e-6),
        other => panic!("expected speed measurement, got {other:?}"),
    }
}

#[test]
fn vin_reassembles_across_three_can_frames_during_connect() {
    let client = can_client(&[]);
    assert_eq!(client.info().vin.as_deref(), Some("1G1JC5444R7252367"));
}

#[test]
fn legacy_multi_frame_vin_reassembles_with_sequence_bytes() {
    let mut t = MockTransport::new();
    init_on(&mut t);
    t.add_response("ATSP3", "OK\r>");
    t.add_response("0100", "48 6B 10 41 00 00 00 00 01\r>");
    t.add_response("ATDPN", "A3\r>");
    t.add_response(
        "0902",
        "48 6B 10 49 02 01 31 47 31 4A\r\
         48 6B 10 49 02 02 43 35 34 34\r\
         48 6B 10 49 02 03 34 52 37 32\r\
         48 6B 10 49 02 04 35 32 33 36\r\
         48 6B 10 49 02 05 37\r>",
    );
    t.connect(Duration::from_secs(1)).unwrap();

    let mut cfg = Config::for_preconfigured_transport();
    cfg.preferred_protocol = Some(OBDProtocol::ISO9141_2);
    let client = ObdClient::new(t, cfg);
    client.connect().unwrap();
    assert_eq!(client.info().vin.as_deref(), Some("1G1JC5444R7252367"));
}

#[test]
fn scan_trouble_codes_keys_results_by_responding_ecu() {
    let client = can_client(&[(
        "03",
        "7E8 06 43 01 01 33 00 00\r7E9 06 43 01 01 71 00 00\r>",
    )]);
    let by_ecu = client.scan_trouble_codes().unwrap();
    assert_eq!(by_ecu.len(), 2);
    assert_eq!(by_ecu[&ECUID::Engine][0].code, "P0133");
    assert_eq!(by_ecu[&ECUID::Unknown(0x7E9)][0].code, "P0171");
}

#[test]
fn readiness_status_decodes_mil_and_monitor_bits() {
    let client = can_client(&[("0101", "7E8 06 41 01 82 07 E5 00\r>")]);
    let status = client.status().unwrap();
    assert!(status.mil);
    assert_eq!(status.dtc_count, 2);
    let misfire = status.tests["misfire"];
    assert!(misfire.available);
    assert!(!misfire.complete);
}

/// `MockTransport` answers a command identically no matter which protocol
/// is active, so this cannot force a specific manual-probe candidate to
/// win; it only proves that a failing auto-detect (`ATSP0`) falls through
/// to the manual probe order instead of surfacing `NoProtocolFound`, and
/// that the probe stops at the first candidate (`J1850PWM`) whose `ATSPn`
/// doesn't itself error.
#[test]
fn failed_auto_detect_falls_back_to_manual_probe_order() {
    let mut t = MockTransport::new();
    init_on(&mut t);
    t.add_response("ATSP0", "SEARCHING...\rUNABLE TO CONNECT\r>");
    t.add_response("0100", "48 6B 10 41 00 00 00 00 01\r>");
    t.add_response("ATDPN", "A1\r>");
    t.connect(Duration::from_secs(1)).unwrap();

    let cfg = Config::for_preconfigured_transport();
    let client = ObdClient::new(t, cfg);
    client.connect().unwrap();
    assert_eq!(client.info().obd_protocol, Some(OBDProtocol::J1850PWM));
}

#[test]
fn cancelling_a_poll_mid_round_stops_the_loop_without_a_dangling_thread() {
    let client = can_client(&[("010D", "7E8 03 41 0D 32\r>")]);
    let (tx, rx) = std::sync::mpsc::channel();
    let mut handle = client.continuous_updates(
        vec![CommandId::Mode01(0x0D)],
        PollStrategy::Sequential,
        move |sample| {
            let _ = tx.send(sample);
        },
    );

    rx.recv_timeout(Duration::from_secs(2)).unwrap();
    // Cancel while the loop is most likely asleep between rounds; cancel()
    // must still return once the current send-to-prompt cycle (if any) has
    // drained, never mid-read.
    handle.cancel();

    // The loop thread has joined; no further samples can arrive.
    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
}
