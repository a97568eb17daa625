//! In-memory mock transport for tests and simulators.
//!
//! Grounded on `hardware::simulation::SimulationIsoTpChannel`: a
//! request/response map plus a receive queue, but speaking the ELM327
//! prompt-delimited line protocol rather than raw ISO-TP frames.

use super::{ConnectionState, ConnectionStateStream, Transport};
use crate::error::{TransportError, TransportResult};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

/// A transport whose responses are pre-programmed by the test, matched on
/// the exact command bytes written (minus the trailing `\r`).
#[derive(Debug, Default)]
pub struct MockTransport {
    responses: HashMap<Vec<u8>, Vec<u8>>,
    rx_queue: VecDeque<u8>,
    connected: bool,
    state: ConnectionStateStream,
}

impl MockTransport {
    /// Creates an empty mock transport.
    pub fn new() -> Self {
        Self {
            responses: HashMap::new(),
            rx_queue: VecDeque::new(),
            connected: false,
            state: ConnectionStateStream::new(),
        }
    }

    /// Registers a canned reply for a command, e.g.
    /// `add_response("010D", "41 0D 32\r>")`. The stored reply is queued
    /// verbatim (including the prompt) when the matching command is
    /// written.
    pub fn add_response(&mut self, cmd: &str, reply: &str) {
        self.responses
            .insert(cmd.as_bytes().to_vec(), reply.as_bytes().to_vec());
    }

    /// Clears every registered response and any buffered bytes.
    pub fn clear(&mut self) {
        self.responses.clear();
        self.rx_queue.clear();
    }
}

impl Transport for MockTransport {
    fn connect(&mut self, _timeout: Duration) -> TransportResult<()> {
        self.connected = true;
        self.state.publish(ConnectionState::ConnectedToAdapter);
        Ok(())
    }

    fn write(&mut self, bytes: &[u8]) -> TransportResult<()> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        let trimmed: Vec<u8> = bytes
            .iter()
            .copied()
            .take_while(|b| *b != b'\r' && *b != b'\n')
            .collect();
        if let Some(reply) = self.responses.get(&trimmed) {
            self.rx_queue.extend(reply.iter().copied());
        } else {
            // Unknown command: adapters answer with an empty prompt.
            self.rx_queue.extend(b">".iter().copied());
        }
        Ok(())
    }

    fn read_until(&mut self, terminator: u8, _timeout: Duration) -> TransportResult<Vec<u8>> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        let mut out = Vec::new();
        while let Some(b) = self.rx_queue.pop_front() {
            out.push(b);
            if b == terminator {
                return Ok(out);
            }
        }
        Err(TransportError::Timeout)
    }

    fn disconnect(&mut self) {
        self.connected = false;
        self.state.publish(ConnectionState::Disconnected);
    }

    fn state_stream(&self) -> ConnectionStateStream {
        self.state.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replays_canned_response_up_to_prompt() {
        let mut t = MockTransport::new();
        t.add_response("010D", "41 0D 32\r>");
        t.connect(Duration::from_secs(1)).unwrap();
        t.write(b"010D\r").unwrap();
        let resp = t.read_until(b'>', Duration::from_secs(1)).unwrap();
        assert_eq!(resp, b"41 0D 32\r>");
    }

    #[test]
    fn unknown_command_returns_bare_prompt() {
        let mut t = MockTransport::new();
        t.connect(Duration::from_secs(1)).unwrap();
        t.write(b"ATZ\r").unwrap();
        let resp = t.read_until(b'>', Duration::from_secs(1)).unwrap();
        assert_eq!(resp, b">");
    }

    #[test]
    fn write_before_connect_fails() {
        let mut t = MockTransport::new();
        assert!(matches!(
            t.write(b"ATZ\r"),
            Err(TransportError::NotConnected)
        ));
    }
}
