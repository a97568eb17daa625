//! The error taxonomy: one enum per layer, nested by `#[from]`, so a
//! transport failure, a malformed frame, and a decode mismatch each carry
//! their own distinct kind rather than collapsing into one flat error type.

use thiserror::Error;

/// Result type returned by [`crate::transport::Transport`] implementations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Errors from the byte-oriented transport (BLE, TCP, mock).
#[derive(Debug, Error)]
pub enum TransportError {
    /// `send`/`read_until` was attempted before `connect` succeeded.
    #[error("transport is not connected")]
    NotConnected,
    /// `connect` itself failed.
    #[error("failed to connect to adapter: {0}")]
    ConnectFailed(String),
    /// The transport was suspended by the host OS (e.g. app backgrounded)
    /// and the link can no longer be assumed live.
    #[error("transport was backgrounded")]
    Backgrounded,
    /// A `read_until`/`write` did not complete within its deadline.
    #[error("transport operation timed out")]
    Timeout,
    /// Low level I/O error from the underlying socket/characteristic.
    #[error("transport I/O error: {0}")]
    IOError(String),
}

/// Result type returned by [`crate::line_session::LineSession::send`].
pub type SessionResult<T> = Result<T, SessionError>;

/// Errors from the line session (adapter dialogue discipline).
#[derive(Debug, Error)]
pub enum SessionError {
    /// A command was issued while another was still in flight.
    #[error("adapter is busy with another command")]
    AdapterBusy,
    /// The adapter replied with `?` or `UNABLE TO CONNECT`.
    #[error("adapter returned an invalid response: {0}")]
    InvalidResponse(String),
    /// The adapter replied with `STOPPED`, `BUS INIT: ERROR` or `CAN ERROR`.
    #[error("adapter link error: {0}")]
    LinkError(String),
    /// The `ATZ`/`ATE0`/.../`ATSP*` init sequence did not complete.
    #[error("adapter initialization failed: {0}")]
    AdapterInitFailed(String),
    /// Underlying transport failure.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// A pending command/read was cancelled by the caller.
    #[error("operation was cancelled")]
    Cancelled,
}

/// Result type returned by protocol detection.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors from OBD-II protocol detection.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Every protocol (preferred, auto, and all nine manual candidates) was
    /// exhausted without a valid `41 00` response.
    #[error("no OBD-II protocol could be established with the vehicle")]
    NoProtocolFound,
    /// The adapter reported a protocol id this crate does not recognize.
    #[error("unrecognized protocol id 0x{0:X}")]
    UnknownProtocol(u8),
}

/// Result type returned by the frame parsers.
pub type ParseResult<T> = Result<T, ParseError>;

/// Errors from legacy/CAN frame parsing and multi-frame reassembly.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// A raw line was shorter than the minimum byte length for its parser.
    #[error("frame too short ({len} bytes)")]
    ShortFrame {
        /// Observed length in bytes.
        len: usize,
    },
    /// Multi-frame sequence numbers were not contiguous/monotonic.
    #[error("bad frame sequence: expected {expected}, got {got}")]
    BadSequence {
        /// Sequence number that should have followed.
        expected: u8,
        /// Sequence number actually observed.
        got: u8,
    },
    /// A checksum/trailer byte did not validate (legacy protocols only).
    #[error("bad checksum")]
    BadChecksum,
    /// The adapter reported `NO DATA` for the request.
    #[error("no data returned for request")]
    NoData,
}

/// Result type returned by decoders.
pub type DecodeResult<T> = Result<T, DecodeError>;

/// Errors from pure byte-to-value decoding (I5: decoders are pure).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// No decoder is registered for the requested [`crate::catalogue::DecoderId`].
    #[error("no decoder implemented for this command")]
    UnsupportedDecoder,
    /// The payload was shorter than the decoder's declared byte width.
    #[error("insufficient bytes: needed {needed}, got {got}")]
    InsufficientBytes {
        /// Bytes required by the decoder.
        needed: usize,
        /// Bytes actually available.
        got: usize,
    },
    /// The decoded value fell outside the command's declared `[min, max]`.
    #[error("decoded value out of range")]
    OutOfRange,
}

/// Top-level error returned by [`crate::client::ObdClient`] operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// A transport/session error occurred while talking to the adapter.
    #[error(transparent)]
    Session(#[from] SessionError),
    /// Protocol auto-negotiation failed.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    /// Frame reassembly failed.
    #[error(transparent)]
    Parse(#[from] ParseError),
    /// A command completed on the wire but failed for a usage reason.
    #[error("command {cmd} failed: {cause}")]
    CommandFailed {
        /// Wire string of the command that failed (e.g. `"010C"`).
        cmd: String,
        /// Human-readable cause.
        cause: String,
    },
    /// The ECU returned no data for a command that required an answer.
    #[error("no data returned")]
    NoData,
    /// `clear_trouble_codes` failed.
    #[error("failed to clear trouble codes: {0}")]
    ClearFailed(String),
    /// `scan_trouble_codes` (or a sibling Mode 06/07/0A scan) failed.
    #[error("failed to scan diagnostic data: {0}")]
    ScanFailed(String),
    /// The caller cancelled an in-flight operation.
    #[error("operation was cancelled")]
    Cancelled,
}

/// Convenience alias for all public client operations.
pub type ClientResult<T> = Result<T, ClientError>;

impl From<TransportError> for ClientError {
    fn from(value: TransportError) -> Self {
        ClientError::Session(SessionError::Transport(value))
    }
}
