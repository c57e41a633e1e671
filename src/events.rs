//! Events pushed out of the scanning core.
//!
//! Delivery is fire-and-forget: sinks never report back and a sink with no
//! listeners silently drops events.

use bytes::Bytes;
use tokio::sync::{broadcast, mpsc};

use crate::ble::adapter::AdapterState;
use crate::ble::address::PeripheralAddress;
use crate::ble::connection::ConnectionState;
use crate::registry::PeripheralRecord;

/// Events produced by the scanning core.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "type", rename_all = "snake_case"))]
pub enum ScanEvent {
    /// A discovery callback updated the registry.
    PeripheralDiscovered {
        /// Hardware address of the peripheral.
        address: PeripheralAddress,
        /// Advertised name, if any.
        name: Option<String>,
        /// Signal strength in dBm.
        rssi: i16,
        /// Raw advertisement payload.
        advertisement: Bytes,
        /// Connection state held in the registry.
        connection_state: ConnectionState,
    },
    /// A timed scan ran out and was stopped.
    ScanStopped,
    /// The adapter power state was observed.
    AdapterStateChanged {
        /// The observed state.
        state: AdapterState,
    },
}

impl ScanEvent {
    /// Build a discovery event from the registry's view of a peripheral.
    pub fn discovered(record: &PeripheralRecord) -> Self {
        Self::PeripheralDiscovered {
            address: record.address,
            name: record.name.clone(),
            rssi: record.rssi,
            advertisement: record.advertisement.clone(),
            connection_state: record.connection_state,
        }
    }
}

/// Destination for [`ScanEvent`]s.
pub trait EventSink: Send + Sync {
    /// Deliver an event. Must not block.
    fn emit(&self, event: ScanEvent);
}

impl EventSink for broadcast::Sender<ScanEvent> {
    fn emit(&self, event: ScanEvent) {
        // No receivers is not an error.
        let _ = self.send(event);
    }
}

impl EventSink for mpsc::UnboundedSender<ScanEvent> {
    fn emit(&self, event: ScanEvent) {
        let _ = self.send(event);
    }
}

/// Create a broadcast channel for scan events.
pub fn event_channel(
    capacity: usize,
) -> (broadcast::Sender<ScanEvent>, broadcast::Receiver<ScanEvent>) {
    broadcast::channel(capacity)
}
