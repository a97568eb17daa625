//! The continuous-polling engine: batched vs sequential PID scheduling,
//! pacing (with an adaptive interval bound to observed round-trip time),
//! and cooperative cancellation.
//!
//! A dedicated thread owns the request loop and reports results back to the
//! caller rather than the caller polling a queue itself. There is no
//! separate `mpsc` channel here because the callback itself is the delivery
//! mechanism (`FnMut` invoked from the polling thread).
//!
//! Cancellation never interrupts a command mid-flight: [`crate::line_session::LineSession::send`]
//! always reads through to the adapter's `>` prompt before returning, so by
//! construction there is nothing left to "drain" once a poll round checks
//! the cancellation flag between commands - draining is a side effect of
//! the send/receive cycle being synchronous and unconditional, not a
//! separate step this module performs.

use crate::catalogue::{decode, CommandId, TypedValue};
use crate::error::ClientResult;
use crate::session::ElmSession;
use crate::transport::Transport;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// How a polling round issues its requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollStrategy {
    /// Mode 01 PIDs are folded into a single compound `01<pid><pid>...`
    /// request per round; every other command falls back to one request
    /// each. Fewer round trips, at the cost of per-PID error isolation
    /// within the compound group.
    Batched,
    /// Every PID is requested with its own round trip, in order.
    Sequential,
}

/// One decoded (or failed) PID observation delivered to the polling
/// callback.
#[derive(Debug)]
pub struct PollSample {
    /// Which command this sample answers.
    pub id: CommandId,
    /// The decoded value, or the error this command failed with.
    pub outcome: ClientResult<TypedValue>,
    /// Wall-clock time the command took to answer.
    pub latency: Duration,
}

/// A running poll loop. Dropping this handle cancels the loop and joins its
/// thread.
pub struct PollHandle {
    stop: Arc<AtomicBool>,
    join: Option<thread::JoinHandle<()>>,
}

impl std::fmt::Debug for PollHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollHandle").finish_non_exhaustive()
    }
}

impl PollHandle {
    /// Requests the loop stop after its current round and blocks until its
    /// thread has exited.
    pub fn cancel(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Starts a polling loop against `session`, repeatedly requesting every id
/// in `pids` and delivering a [`PollSample`] per id to `on_sample` until the
/// returned [`PollHandle`] is cancelled or dropped.
pub fn start<T: Transport + 'static>(
    session: Arc<ElmSession<T>>,
    pids: Vec<CommandId>,
    strategy: PollStrategy,
    min_interval: Duration,
    max_interval: Duration,
    mut on_sample: impl FnMut(PollSample) + Send + 'static,
) -> PollHandle {
    let stop = Arc::new(AtomicBool::new(false));
    let stop_thread = stop.clone();

    let join = thread::spawn(move || {
        while !stop_thread.load(Ordering::SeqCst) {
            let round_start = Instant::now();
            run_round(&session, &pids, strategy, &mut on_sample, &stop_thread);
            if stop_thread.load(Ordering::SeqCst) {
                break;
            }
            let interval = adaptive_interval(round_start.elapsed(), min_interval, max_interval);
            sleep_cancelable(&stop_thread, interval);
        }
    });

    PollHandle { stop, join: Some(join) }
}

fn run_round<T: Transport>(
    session: &ElmSession<T>,
    pids: &[CommandId],
    strategy: PollStrategy,
    on_sample: &mut impl FnMut(PollSample),
    stop: &AtomicBool,
) {
    let (mode01, rest): (Vec<CommandId>, Vec<CommandId>) =
        pids.iter().partition(|id| matches!(id, CommandId::Mode01(_)));

    if strategy == PollStrategy::Batched && mode01.len() > 1 {
        if stop.load(Ordering::SeqCst) {
            return;
        }
        run_batched(session, &mode01, on_sample);
    } else {
        for id in &mode01 {
            if stop.load(Ordering::SeqCst) {
                return;
            }
            run_single(session, *id, on_sample);
        }
    }

    for id in &rest {
        if stop.load(Ordering::SeqCst) {
            return;
        }
        run_single(session, *id, on_sample);
    }
}

fn run_single<T: Transport>(session: &ElmSession<T>, id: CommandId, on_sample: &mut impl FnMut(PollSample)) {
    let start = Instant::now();
    let outcome = session.request(id);
    on_sample(PollSample { id, outcome, latency: start.elapsed() });
}

/// Issues every Mode 01 PID in `ids` as a single compound `01<pid>...`
/// request, reassembles the first responding ECU's message, and walks its
/// payload left-to-right peeling each requested PID's echo byte plus its
/// declared `byte_width` in request order. Scoped to the common case where
/// every PID's answer fits in one frame (true for every Mode 01 sensor PID
/// this catalogue lists); a PID whose answer would require multi-frame
/// reassembly is not compatible with batching and should be polled with
/// [`PollStrategy::Sequential`] instead.
fn run_batched<T: Transport>(session: &ElmSession<T>, ids: &[CommandId], on_sample: &mut impl FnMut(PollSample)) {
    let pids: Vec<u8> = ids
        .iter()
        .filter_map(|id| match id {
            CommandId::Mode01(p) => Some(*p),
            _ => None,
        })
        .collect();
    let wire: String = std::iter::once("01".to_string())
        .chain(pids.iter().map(|p| format!("{p:02X}")))
        .collect();

    let start = Instant::now();
    let messages = match session.send_raw_messages(&wire) {
        Ok(v) => v,
        Err(e) => {
            let cause = e.to_string();
            for id in ids {
                let outcome = Err(crate::error::ClientError::CommandFailed { cmd: id.wire(), cause: cause.clone() });
                on_sample(PollSample { id: *id, outcome, latency: start.elapsed() });
            }
            return;
        }
    };

    let payload: &[u8] = messages.first().map_or(&[], |m| m.service_payload());
    let mut offset = 0usize;
    for id in ids {
        let CommandId::Mode01(_) = id else { continue };
        let width = session.command_spec_for(*id).byte_width;
        let outcome = match payload.get(offset + 1..offset + 1 + width) {
            Some(value_bytes) => decode_for(session, *id, value_bytes),
            None => Err(crate::error::ClientError::NoData),
        };
        offset += 1 + width;
        on_sample(PollSample { id: *id, outcome, latency: start.elapsed() });
    }
}

fn decode_for<T: Transport>(session: &ElmSession<T>, id: CommandId, value_bytes: &[u8]) -> ClientResult<TypedValue> {
    let spec = session.command_spec_for(id);
    decode(spec.decoder, value_bytes, session.unit_system(), spec.min, spec.max)
        .map_err(|e| crate::error::ClientError::CommandFailed { cmd: id.wire(), cause: e.to_string() })
}

fn adaptive_interval(last_round: Duration, min: Duration, max: Duration) -> Duration {
    last_round.saturating_mul(2).clamp(min, max)
}

fn sleep_cancelable(stop: &AtomicBool, duration: Duration) {
    let step = Duration::from_millis(50);
    let mut remaining = duration;
    while remaining > Duration::ZERO {
        if stop.load(Ordering::SeqCst) {
            return;
        }
        let chunk = remaining.min(step);
        thread::sleep(chunk);
        remaining -= chunk;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adaptive_interval_clamps_to_bounds() {
        let min = Duration::from_millis(300);
        let max = Duration::from_millis(5_000);
        assert_eq!(adaptive_interval(Duration::from_millis(1), min, max), min);
        assert_eq!(adaptive_interval(Duration::from_secs(10), min, max), max);
    }

    #[test]
    fn run_batched_peels_interleaved_pids_from_one_message() {
        use crate::config::Config;
        use crate::protocol::OBDProtocol;
        use crate::transport::mock::MockTransport;

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
        t.add_response(
            "0902",
            "7E8 10 14 49 02 01 31 47 31\r7E8 21 4A 43 35 34 34 34 52\r7E8 22 37 32 35 32 33 36 37\r>",
        );
        t.add_response("0120", "7E8 06 41 20 00 00 00 01\r>");
        t.add_response("0900", "7E8 06 49 00 00 00 00 01\r>");
        t.add_response("010C0D", "7E8 06 41 0C 0F A0 0D 32\r>");
        t.connect(Duration::from_secs(1)).unwrap();

        let mut cfg = Config::for_preconfigured_transport();
        cfg.preferred_protocol = Some(OBDProtocol::CAN_11_500);
        let session = ElmSession::new(t, cfg);
        session.connect().unwrap();

        let ids = vec![CommandId::Mode01(0x0C), CommandId::Mode01(0x0D)];
        let mut samples = Vec::new();
        run_batched(&session, &ids, &mut |sample| samples.push(sample));

        assert_eq!(samples.len(), 2);
        match samples[0].outcome.as_ref().unwrap() {
            TypedValue::Measurement(m) => assert!((m.value - 1000.0).abs() < 1e-6),
            other => panic!("expected rpm measurement, got {other:?}"),
        }
        match samples[1].outcome.as_ref().unwrap() {
            TypedValue::Measurement(m) => assert!((m.value - 50.0).abs() < 1e-6),
            other => panic!("expected speed measurement, got {other:?}"),
        }
    }
}
