//! Reassembled logical response for one ECU.

use crate::ecu::ECUID;

/// A fully reassembled response from one ECU. `data[0]` is the service
/// response byte (request service + `0x40`); for Mode 01 `data[1]` is the
/// echoed PID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// The ECU that produced this response.
    pub ecu: ECUID,
    /// Service byte, PID echo (where applicable), and payload.
    pub data: Vec<u8>,
}

impl Message {
    /// The service response byte (`data[0]`), if present.
    pub fn service(&self) -> Option<u8> {
        self.data.first().copied()
    }

    /// Everything after the service byte.
    pub fn service_payload(&self) -> &[u8] {
        self.data.get(1..).unwrap_or(&[])
    }
}
