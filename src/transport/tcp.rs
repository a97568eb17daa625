//! Plain TCP transport for WiFi-class ELM327 adapters.
//!
//! A response is a contiguous byte stream; framing is the same prompt byte
//! (`0x3E`) used on every other transport. The read loop is a byte-at-a-time
//! scan for the terminator, mirroring [`super::mock::MockTransport`]'s
//! queue-draining shape over a real socket.

use super::{ConnectionState, ConnectionStateStream, Transport};
use crate::error::{TransportError, TransportResult};
use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

/// TCP transport connecting to `(host, port)`.
#[derive(Debug)]
pub struct TcpTransport {
    host: String,
    port: u16,
    stream: Option<TcpStream>,
    state: ConnectionStateStream,
}

impl TcpTransport {
    /// Creates a transport targeting `host:port`. Defaults commonly used by
    /// WiFi ELM327 adapters are `192.168.0.10:35000`.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            stream: None,
            state: ConnectionStateStream::new(),
        }
    }
}

impl Transport for TcpTransport {
    fn connect(&mut self, timeout: Duration) -> TransportResult<()> {
        self.state.publish(ConnectionState::Connecting);
        let addr = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| TransportError::ConnectFailed(e.to_string()))?
            .next()
            .ok_or_else(|| TransportError::ConnectFailed("no address resolved".into()))?;
        let stream = TcpStream::connect_timeout(&addr, timeout)
            .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;
        stream
            .set_read_timeout(Some(timeout))
            .map_err(|e| TransportError::IOError(e.to_string()))?;
        stream
            .set_nodelay(true)
            .map_err(|e| TransportError::IOError(e.to_string()))?;
        self.stream = Some(stream);
        self.state.publish(ConnectionState::ConnectedToAdapter);
        Ok(())
    }

    fn write(&mut self, bytes: &[u8]) -> TransportResult<()> {
        let stream = self.stream.as_mut().ok_or(TransportError::NotConnected)?;
        stream
            .write_all(bytes)
            .map_err(|e| TransportError::IOError(e.to_string()))
    }

    fn read_until(&mut self, terminator: u8, timeout: Duration) -> TransportResult<Vec<u8>> {
        let stream = self.stream.as_mut().ok_or(TransportError::NotConnected)?;
        stream
            .set_read_timeout(Some(timeout))
            .map_err(|e| TransportError::IOError(e.to_string()))?;
        let mut out = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            match stream.read(&mut byte) {
                Ok(0) => return Err(TransportError::IOError("connection closed".into())),
                Ok(_) => {
                    out.push(byte[0]);
                    if byte[0] == terminator {
                        return Ok(out);
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    return Err(TransportError::Timeout)
                }
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {
                    return Err(TransportError::Timeout)
                }
                Err(e) => return Err(TransportError::IOError(e.to_string())),
            }
        }
    }

    fn disconnect(&mut self) {
        self.stream = None;
        self.state.publish(ConnectionState::Disconnected);
    }

    fn state_stream(&self) -> ConnectionStateStream {
        self.state.clone()
    }
}
