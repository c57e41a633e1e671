//! Radio subsystem abstraction.
//!
//! The [`Radio`] trait is the seam between the scan controllers and whatever
//! actually drives the hardware: [`HostRadio`](crate::ble::host::HostRadio)
//! for the system adapter via btleplug, or
//! [`MockRadio`](crate::ble::mock::MockRadio) for tests.
//!
//! Radios report asynchronous happenings (discovery results, scan failures,
//! power transitions) as a single ordered stream of [`RadioEvent`]s.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use uuid::Uuid;

use crate::ble::adapter::AdapterState;
use crate::ble::address::PeripheralAddress;
use crate::error::Result;
use crate::scan::session::ScanOptions;

/// RSSI value reported when the radio supplies no signal strength.
pub const RSSI_UNAVAILABLE: i16 = 127;

/// What the radio hardware can do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RadioCapabilities {
    /// Service-UUID filters are applied by the radio itself.
    pub native_service_filter: bool,
    /// Scan mode, match mode and match count are honored.
    pub hardware_match_tuning: bool,
    /// Start-scan rejections are reported (synchronously or as events).
    pub scan_failure_reports: bool,
    /// The adapter can be powered off and on programmatically.
    pub power_control: bool,
}

/// Scan parameters in the form handed to the radio.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NativeScanRequest {
    /// Services to filter on; empty matches every peripheral.
    pub services: Vec<Uuid>,
    /// Report every advertisement instead of one per peripheral.
    pub allow_duplicates: bool,
    /// Hardware tuning, if the controller variant supports it.
    pub tuning: Option<ScanOptions>,
}

/// A single discovery result from the radio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryReport {
    /// Hardware address of the peripheral.
    pub address: PeripheralAddress,
    /// Advertised name, if any.
    pub name: Option<String>,
    /// Signal strength in dBm.
    pub rssi: i16,
    /// Raw advertisement payload.
    pub advertisement: Bytes,
    /// Services listed in the advertisement.
    pub services: Vec<Uuid>,
}

impl DiscoveryReport {
    /// Create a report with no name, payload or services.
    pub fn new(address: PeripheralAddress, rssi: i16) -> Self {
        Self {
            address,
            name: None,
            rssi,
            advertisement: Bytes::new(),
            services: Vec::new(),
        }
    }

    /// Set the advertised name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the raw advertisement payload.
    pub fn with_advertisement(mut self, advertisement: impl Into<Bytes>) -> Self {
        self.advertisement = advertisement.into();
        self
    }

    /// Set the advertised services.
    pub fn with_services(mut self, services: Vec<Uuid>) -> Self {
        self.services = services;
        self
    }
}

/// Asynchronous notifications from the radio subsystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioEvent {
    /// A peripheral was seen while scanning.
    Discovered(DiscoveryReport),
    /// The radio rejected the current scan request.
    ScanFailed {
        /// Radio-specific failure code.
        code: i32,
    },
    /// The adapter power state changed.
    PowerStateChanged(AdapterState),
    /// A peripheral's link came up or went down.
    ConnectionChanged {
        /// Hardware address of the peripheral.
        address: PeripheralAddress,
        /// Whether the link is now up.
        connected: bool,
    },
}

/// Ordered stream of radio events.
pub type RadioEventStream = BoxStream<'static, RadioEvent>;

/// Trait abstracting the radio adapter.
///
/// Power transitions issued through [`set_powered`](Radio::set_powered) are
/// asynchronous; callers poll [`power_state`](Radio::power_state) to observe
/// completion.
#[async_trait]
pub trait Radio: Send + Sync {
    /// Report what this radio supports.
    fn capabilities(&self) -> RadioCapabilities;

    /// Read the current power state.
    async fn power_state(&self) -> Result<AdapterState>;

    /// Request a power transition. Returns once the request is issued.
    async fn set_powered(&self, powered: bool) -> Result<()>;

    /// Start scanning. An error means the radio rejected the request.
    async fn start_scan(&self, request: &NativeScanRequest) -> Result<()>;

    /// Stop scanning.
    async fn stop_scan(&self) -> Result<()>;

    /// Subscribe to radio events.
    async fn events(&self) -> Result<RadioEventStream>;
}
