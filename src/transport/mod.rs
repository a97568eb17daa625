//! Byte-oriented transport contract the core consumes.
//!
//! This crate does not implement device discovery, pairing UX, or
//! connection-lifecycle policy for any transport; it only defines the
//! interface [`Transport`] the rest of the crate drives, plus a
//! [`ConnectionStateStream`] every transport publishes into. The three
//! implementations below are illustrative: [`mock::MockTransport`] is a
//! full, tested implementation used by this crate's own test suite;
//! [`tcp::TcpTransport`] is a small real implementation for WiFi-class
//! adapters; `ble` (behind the `ble` feature) is a real implementation over
//! `btleplug` covering the Veepeak/OBDLink CX/VGate-class GATT profiles.

pub mod mock;
#[cfg(feature = "tcp")]
pub mod tcp;

#[cfg(feature = "ble")]
pub mod ble;

use crate::error::TransportResult;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Connection lifecycle state, published by every [`Transport`].
///
/// Subscribers receive every transition in order; the initial value
/// observed by a fresh subscription is always [`ConnectionState::Disconnected`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No transport session exists.
    Disconnected,
    /// A transport-level connection attempt is in progress.
    Connecting,
    /// The transport link to the adapter itself is up (no vehicle protocol
    /// has necessarily been negotiated yet).
    ConnectedToAdapter,
    /// The vehicle protocol has been negotiated and the session can service
    /// OBD-II requests.
    ConnectedToVehicle,
}

/// Byte-oriented bidirectional channel to an ELM327-class adapter.
///
/// Implementations are not required to be `Send + Sync` for interior
/// mutability reasons (some BLE stacks are callback-driven), but must be
/// usable behind the single mutual-exclusion token the
/// [`crate::line_session::LineSession`] holds, so in practice almost every
/// implementation ends up `Send`.
pub trait Transport: Send {
    /// Opens the transport-level connection. Does not imply a vehicle
    /// protocol has been negotiated.
    fn connect(&mut self, timeout: Duration) -> TransportResult<()>;

    /// Writes raw bytes (already including the trailing `\r`) to the
    /// adapter.
    fn write(&mut self, bytes: &[u8]) -> TransportResult<()>;

    /// Reads bytes until `terminator` is seen (inclusive) or `timeout`
    /// elapses.
    fn read_until(&mut self, terminator: u8, timeout: Duration) -> TransportResult<Vec<u8>>;

    /// Tears down the transport-level connection.
    fn disconnect(&mut self);

    /// Returns a handle to this transport's connection-state broadcast.
    fn state_stream(&self) -> ConnectionStateStream;
}

/// Multi-producer connection-state broadcast, owned by whichever
/// [`Transport`] publishes into it.
///
/// Modeled as a plain `Vec` of subscriber callbacks behind a mutex rather
/// than pulling in a channel-broadcast crate: fan-out to UI listeners is a
/// consumer-side concern per the design notes, and the set of subscribers is
/// small and long-lived.
#[derive(Clone, Default)]
pub struct ConnectionStateStream {
    subscribers: Arc<Mutex<Vec<Box<dyn Fn(ConnectionState) + Send>>>>,
}

impl std::fmt::Debug for ConnectionStateStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionStateStream").finish_non_exhaustive()
    }
}

impl ConnectionStateStream {
    /// Creates an empty stream, with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a subscriber. The subscriber is not replayed the current
    /// state; callers that care about the state at subscription time should
    /// query it separately.
    pub fn subscribe<F: Fn(ConnectionState) + Send + 'static>(&self, f: F) {
        self.subscribers.lock().unwrap().push(Box::new(f));
    }

    /// Publishes a new state to every subscriber, in registration order.
    pub fn publish(&self, state: ConnectionState) {
        for sub in self.subscribers.lock().unwrap().iter() {
            sub(state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn state_stream_fans_out_to_all_subscribers() {
        let stream = ConnectionStateStream::new();
        let count = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let c = count.clone();
            stream.subscribe(move |_| {
                c.fetch_add(1, Ordering::SeqCst);
            });
        }
        stream.publish(ConnectionState::ConnectedToAdapter);
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }
}
