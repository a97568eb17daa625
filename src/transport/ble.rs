//! Bluetooth Low Energy transport, built on `btleplug`.
//!
//! Covers three GATT profile shapes seen across adapter vendors:
//! Veepeak-class (service `FFE0`, characteristic `FFE1`, often assigned as
//! both read and write), OBDLink CX-class (service `FFF0`, characteristics
//! `FFF1` read/notify + `FFF2` write), and VGate-class (service `18F0`,
//! characteristics `2AF0`/`2AF1`). Falls back to any characteristic pair on
//! the device advertising `WRITE` plus (`NOTIFY` or `READ`).
//!
//! `btleplug`'s API is async; this crate's session/line layer is
//! synchronous (thread-based, not an async runtime), so each [`Transport`]
//! method blocks on a dedicated single-threaded Tokio runtime owned by the
//! transport, the same bridging shape used anywhere a sync API wraps an
//! inherently async BLE stack.

use super::{ConnectionState, ConnectionStateStream, Transport};
use crate::error::{TransportError, TransportResult};
use btleplug::api::{
    bleuuid::uuid_from_u16, Central, Characteristic, Manager as _, Peripheral as _, ScanFilter,
    WriteType,
};
use btleplug::platform::{Manager, Peripheral};
use futures_lite::StreamExt;
use std::collections::VecDeque;
use std::time::Duration;
use uuid::Uuid;

const VEEPEAK_SERVICE: u16 = 0xFFE0;
const VEEPEAK_CHAR: u16 = 0xFFE1;
const OBDLINK_SERVICE: u16 = 0xFFF0;
const OBDLINK_CHAR_NOTIFY: u16 = 0xFFF1;
const OBDLINK_CHAR_WRITE: u16 = 0xFFF2;
const VGATE_SERVICE: u16 = 0x18F0;
const VGATE_CHAR_NOTIFY: u16 = 0x2AF0;
const VGATE_CHAR_WRITE: u16 = 0x2AF1;

/// BLE transport to a single named peripheral.
pub struct BleTransport {
    device_name: String,
    rt: tokio::runtime::Runtime,
    peripheral: Option<Peripheral>,
    write_char: Option<Characteristic>,
    notify_char: Option<Characteristic>,
    rx_buffer: VecDeque<u8>,
    state: ConnectionStateStream,
}

impl std::fmt::Debug for BleTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BleTransport")
            .field("device_name", &self.device_name)
            .finish_non_exhaustive()
    }
}

impl BleTransport {
    /// Creates a BLE transport that will scan for and connect to a
    /// peripheral whose advertised name is exactly `device_name`.
    pub fn new(device_name: impl Into<String>) -> TransportResult<Self> {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| TransportError::IOError(e.to_string()))?;
        Ok(Self {
            device_name: device_name.into(),
            rt,
            peripheral: None,
            write_char: None,
            notify_char: None,
            rx_buffer: VecDeque::new(),
            state: ConnectionStateStream::new(),
        })
    }

    async fn find_and_connect(&self, timeout: Duration) -> TransportResult<Peripheral> {
        let manager = Manager::new()
            .await
            .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;
        let adapters = manager
            .adapters()
            .await
            .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;
        let central = adapters
            .into_iter()
            .next()
            .ok_or_else(|| TransportError::ConnectFailed("no BLE adapter present".into()))?;

        let filter = ScanFilter {
            services: vec![
                uuid_from_u16(VEEPEAK_SERVICE),
                uuid_from_u16(OBDLINK_SERVICE),
                uuid_from_u16(VGATE_SERVICE),
            ],
        };
        central
            .start_scan(filter)
            .await
            .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;
        tokio::time::sleep(timeout).await;

        for p in central
            .peripherals()
            .await
            .map_err(|e| TransportError::ConnectFailed(e.to_string()))?
        {
            let props = p
                .properties()
                .await
                .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;
            let Some(props) = props else { continue };
            // Devices that advertise an unusually strong in-pocket RSSI are
            // ignored, matching the scan-filter behavior named in §6.
            if props.rssi.unwrap_or(i16::MIN) >= 0 {
                continue;
            }
            if props.local_name.as_deref() == Some(self.device_name.as_str()) {
                p.connect()
                    .await
                    .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;
                return Ok(p);
            }
        }
        Err(TransportError::ConnectFailed(format!(
            "device '{}' not found during scan",
            self.device_name
        )))
    }

    async fn resolve_characteristics(
        peripheral: &Peripheral,
    ) -> TransportResult<(Characteristic, Characteristic)> {
        peripheral
            .discover_services()
            .await
            .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;
        let chars = peripheral.characteristics();

        let known_pairs: [(u16, u16); 2] = [
            (OBDLINK_CHAR_NOTIFY, OBDLINK_CHAR_WRITE),
            (VGATE_CHAR_NOTIFY, VGATE_CHAR_WRITE),
        ];
        for (notify_id, write_id) in known_pairs {
            let notify = chars
                .iter()
                .find(|c| c.uuid == uuid_from_u16(notify_id))
                .cloned();
            let write = chars
                .iter()
                .find(|c| c.uuid == uuid_from_u16(write_id))
                .cloned();
            if let (Some(n), Some(w)) = (notify, write) {
                return Ok((n, w));
            }
        }

        // Veepeak-class: a single characteristic combining write with
        // notify/read is an explicitly allowed configuration, not rejected.
        if let Some(combined) = chars.iter().find(|c| c.uuid == uuid_from_u16(VEEPEAK_CHAR)) {
            return Ok((combined.clone(), combined.clone()));
        }

        // Generic fallback: any characteristic pair exposing write plus
        // (notify or read).
        let write = chars
            .iter()
            .find(|c| c.properties.contains(btleplug::api::CharPropFlags::WRITE))
            .cloned();
        let notify = chars
            .iter()
            .find(|c| {
                c.properties.contains(btleplug::api::CharPropFlags::NOTIFY)
                    || c.properties.contains(btleplug::api::CharPropFlags::READ)
            })
            .cloned();
        match (notify, write) {
            (Some(n), Some(w)) => Ok((n, w)),
            _ => Err(TransportError::ConnectFailed(
                "no suitable write/notify characteristic pair found".into(),
            )),
        }
    }

    fn uuid_label(u: &Uuid) -> String {
        u.to_string()
    }
}

impl Transport for BleTransport {
    fn connect(&mut self, timeout: Duration) -> TransportResult<()> {
        self.state.publish(ConnectionState::Connecting);
        let peripheral = self.rt.block_on(self.find_and_connect(timeout))?;
        let (notify, write) = self
            .rt
            .block_on(Self::resolve_characteristics(&peripheral))?;
        self.rt
            .block_on(peripheral.subscribe(&notify))
            .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;
        log::debug!(
            "BLE connected: notify={}, write={}",
            Self::uuid_label(&notify.uuid),
            Self::uuid_label(&write.uuid)
        );
        self.peripheral = Some(peripheral);
        self.notify_char = Some(notify);
        self.write_char = Some(write);
        self.state.publish(ConnectionState::ConnectedToAdapter);
        Ok(())
    }

    fn write(&mut self, bytes: &[u8]) -> TransportResult<()> {
        let peripheral = self.peripheral.as_ref().ok_or(TransportError::NotConnected)?;
        let write_char = self.write_char.as_ref().ok_or(TransportError::NotConnected)?;
        self.rt
            .block_on(peripheral.write(write_char, bytes, WriteType::WithResponse))
            .map_err(|e| TransportError::IOError(e.to_string()))
    }

    fn read_until(&mut self, terminator: u8, timeout: Duration) -> TransportResult<Vec<u8>> {
        if let Some(pos) = self.rx_buffer.iter().position(|b| *b == terminator) {
            return Ok(self.rx_buffer.drain(..=pos).collect());
        }
        let peripheral = self
            .peripheral
            .clone()
            .ok_or(TransportError::NotConnected)?;
        let rx_buffer = &mut self.rx_buffer;
        self.rt.block_on(async {
            let mut stream = peripheral
                .notifications()
                .await
                .map_err(|e| TransportError::IOError(e.to_string()))?;
            let deadline = tokio::time::Instant::now() + timeout;
            loop {
                let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
                if remaining.is_zero() {
                    return Err(TransportError::Timeout);
                }
                match tokio::time::timeout(remaining, stream.next()).await {
                    Ok(Some(data)) => {
                        rx_buffer.extend(data.value.iter().copied());
                        if let Some(pos) = rx_buffer.iter().position(|b| *b == terminator) {
                            return Ok(rx_buffer.drain(..=pos).collect());
                        }
                    }
                    Ok(None) => return Err(TransportError::IOError("notify stream closed".into())),
                    Err(_) => return Err(TransportError::Timeout),
                }
            }
        })
    }

    fn disconnect(&mut self) {
        if let Some(peripheral) = self.peripheral.take() {
            let _ = self.rt.block_on(peripheral.disconnect());
        }
        self.write_char = None;
        self.notify_char = None;
        self.rx_buffer.clear();
        self.state.publish(ConnectionState::Disconnected);
    }

    fn state_stream(&self) -> ConnectionStateStream {
        self.state.clone()
    }
}
