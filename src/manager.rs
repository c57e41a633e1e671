//! Manager for discovering peripherals and tracking the registry.
//!
//! [`BleManager`] ties a radio, a scan controller and the event channel
//! together. It picks the controller variant once from the radio's
//! capabilities and runs a background task that feeds radio events into it.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::ble::adapter::{AdapterGateway, AdapterState};
use crate::ble::address::PeripheralAddress;
use crate::ble::connection::ConnectionState;
use crate::ble::radio::Radio;
use crate::config::ManagerConfig;
use crate::error::Result;
use crate::events::{event_channel, ScanEvent};
use crate::registry::PeripheralRecord;
use crate::scan::{
    create_controller, spawn_dispatcher, ScanController, ScanCore, ScanOptions, ScanPhase,
    ScanRequest, ScanSession, ScanVariant,
};

/// Handle for unregistering an event callback.
///
/// The callback is unregistered when the handle is dropped.
pub struct CallbackHandle {
    id: u64,
    unregister_fn: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl CallbackHandle {
    pub(crate) fn new(id: u64, unregister_fn: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            id,
            unregister_fn: Some(Box::new(unregister_fn)),
        }
    }

    /// Unregister this callback.
    pub fn unregister(mut self) {
        if let Some(f) = self.unregister_fn.take() {
            f();
        }
    }

    /// Get the callback ID.
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for CallbackHandle {
    fn drop(&mut self) {
        if let Some(f) = self.unregister_fn.take() {
            f();
        }
    }
}

impl std::fmt::Debug for CallbackHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackHandle").field("id", &self.id).finish()
    }
}

/// Central manager for scanning and the peripheral registry.
pub struct BleManager {
    /// Scan controller for the selected variant.
    controller: Arc<dyn ScanController>,
    /// Scan event channel.
    event_tx: broadcast::Sender<ScanEvent>,
    /// Radio event dispatcher task.
    dispatcher: RwLock<Option<JoinHandle<()>>>,
    /// Callback ID counter.
    callback_counter: AtomicU64,
    config: ManagerConfig,
}

impl BleManager {
    /// Create a manager on the first system Bluetooth adapter.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoAdapter`](crate::Error::NoAdapter) if Bluetooth is
    /// not available.
    pub async fn new() -> Result<Self> {
        Self::with_config(ManagerConfig::default()).await
    }

    /// Create a manager on the first system Bluetooth adapter with `config`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoAdapter`](crate::Error::NoAdapter) if Bluetooth is
    /// not available.
    pub async fn with_config(config: ManagerConfig) -> Result<Self> {
        let gateway = AdapterGateway::resolve().await?;
        Self::with_gateway(gateway, config).await
    }

    /// Create a manager driving `radio`.
    ///
    /// # Errors
    ///
    /// Returns an error if the radio event stream cannot be opened.
    pub async fn with_radio(radio: Arc<dyn Radio>, config: ManagerConfig) -> Result<Self> {
        Self::with_gateway(AdapterGateway::new(radio), config).await
    }

    async fn with_gateway(gateway: AdapterGateway, config: ManagerConfig) -> Result<Self> {
        let (event_tx, _) = event_channel(config.event_capacity);

        let variant = ScanVariant::select(gateway.current().capabilities(), config.force_legacy);
        info!("Using {} scan controller", variant);

        let core = ScanCore::new(gateway, Arc::new(event_tx.clone()));
        let controller = create_controller(variant, core, config.recovery_poll_interval);
        let dispatcher = spawn_dispatcher(controller.clone()).await?;

        Ok(Self {
            controller,
            event_tx,
            dispatcher: RwLock::new(Some(dispatcher)),
            callback_counter: AtomicU64::new(0),
            config,
        })
    }

    /// Start a scan, replacing any running one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AdapterDisabled`](crate::Error::AdapterDisabled) if the
    /// adapter is not powered on.
    pub async fn scan(&self, request: ScanRequest) -> Result<()> {
        self.controller.scan(request).await
    }

    /// Start a scan from short or full service UUID strings.
    ///
    /// A `duration_secs` of zero scans until stopped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`](crate::Error::InvalidParameter) for
    /// an unparseable UUID and
    /// [`Error::AdapterDisabled`](crate::Error::AdapterDisabled) if the adapter
    /// is not powered on.
    pub async fn scan_with<S: AsRef<str>>(
        &self,
        services: &[S],
        duration_secs: u64,
        allow_duplicates: bool,
        options: ScanOptions,
    ) -> Result<()> {
        let request = ScanRequest::new()
            .service_strings(services)?
            .duration_secs(duration_secs)
            .allow_duplicates(allow_duplicates)
            .options(options);
        self.scan(request).await
    }

    /// Stop the running scan.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AdapterDisabled`](crate::Error::AdapterDisabled) if the
    /// adapter is not powered on.
    pub async fn stop_scan(&self) -> Result<()> {
        self.controller.stop_scan().await
    }

    /// The controller variant in use.
    pub fn variant(&self) -> ScanVariant {
        self.controller.variant()
    }

    /// The current scan phase.
    pub fn phase(&self) -> ScanPhase {
        self.controller.core().phase()
    }

    /// Check if a scan is running or recovering.
    pub fn is_scanning(&self) -> bool {
        self.phase() != ScanPhase::Idle
    }

    /// The running scan session, if any.
    pub fn current_session(&self) -> Option<ScanSession> {
        self.controller.core().current_session()
    }

    /// The configuration this manager was built with.
    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// All known peripherals, in discovery order.
    pub fn discovered_peripherals(&self) -> Vec<PeripheralRecord> {
        self.core().with_registry(|registry| registry.snapshot(|_| true))
    }

    /// Connected peripherals offering any of `services`.
    ///
    /// An empty `services` slice matches every connected peripheral.
    pub fn connected_peripherals(&self, services: &[Uuid]) -> Vec<PeripheralRecord> {
        self.core().with_registry(|registry| {
            registry.snapshot(|record| {
                record.connection_state.is_connected()
                    && (services.is_empty() || record.has_any_service(services))
            })
        })
    }

    /// Look up a peripheral by address.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAddress`](crate::Error::InvalidAddress) if
    /// `address` is malformed.
    pub fn peripheral(&self, address: &str) -> Result<Option<PeripheralRecord>> {
        let address = PeripheralAddress::parse(address)?;
        Ok(self
            .core()
            .with_registry(|registry| registry.get(&address).cloned()))
    }

    /// Ensure the registry has a record for `address`.
    ///
    /// Used before connecting to a peripheral that was never scanned.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAddress`](crate::Error::InvalidAddress) if
    /// `address` is malformed.
    pub fn register_peripheral(&self, address: &str) -> Result<PeripheralRecord> {
        let address = PeripheralAddress::parse(address)?;
        Ok(self
            .core()
            .with_registry_mut(|registry| registry.register(address).clone()))
    }

    /// Record the connection state of a known peripheral.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAddress`](crate::Error::InvalidAddress) or
    /// [`Error::PeripheralNotFound`](crate::Error::PeripheralNotFound).
    pub fn set_connection_state(&self, address: &str, state: ConnectionState) -> Result<()> {
        let address = PeripheralAddress::parse(address)?;
        debug!("Peripheral {} is now {}", address, state);
        self.core()
            .with_registry_mut(|registry| registry.set_connection_state(&address, state))
    }

    /// Record services discovered on a known peripheral.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAddress`](crate::Error::InvalidAddress) or
    /// [`Error::PeripheralNotFound`](crate::Error::PeripheralNotFound).
    pub fn add_services(
        &self,
        address: &str,
        services: impl IntoIterator<Item = Uuid>,
    ) -> Result<()> {
        let address = PeripheralAddress::parse(address)?;
        self.core()
            .with_registry_mut(|registry| registry.add_services(&address, services))
    }

    /// Remove a disconnected peripheral from the registry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAddress`](crate::Error::InvalidAddress),
    /// [`Error::PeripheralNotFound`](crate::Error::PeripheralNotFound) or
    /// [`Error::StillConnected`](crate::Error::StillConnected).
    pub fn remove_peripheral(&self, address: &str) -> Result<PeripheralRecord> {
        let address = PeripheralAddress::parse(address)?;
        let removed = self
            .core()
            .with_registry_mut(|registry| registry.remove(&address))?;
        info!("Removed peripheral {}", address);
        Ok(removed)
    }

    /// Read the adapter power state and emit it as an event.
    ///
    /// # Errors
    ///
    /// Returns an error if the state cannot be read.
    pub async fn check_state(&self) -> Result<AdapterState> {
        let state = self.core().gateway().power_state().await?;
        self.core().emit_adapter_state(state);
        Ok(state)
    }

    /// Subscribe to scan events.
    pub fn subscribe(&self) -> broadcast::Receiver<ScanEvent> {
        self.event_tx.subscribe()
    }

    /// Register a callback for scan events.
    pub fn on_event<F>(&self, callback: F) -> CallbackHandle
    where
        F: Fn(ScanEvent) + Send + Sync + 'static,
    {
        let callback_id = self.callback_counter.fetch_add(1, Ordering::SeqCst);
        let mut rx = self.event_tx.subscribe();

        let handle = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => callback(event),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Event callback {} lagged, skipped {} events", callback_id, skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        CallbackHandle::new(callback_id, move || {
            handle.abort();
        })
    }

    /// Stop scanning and the background task.
    ///
    /// # Errors
    ///
    /// Returns an error if a running scan cannot be stopped.
    pub async fn shutdown(&self) -> Result<()> {
        info!("Shutting down BLE manager");

        if self.is_scanning() && self.core().gateway().is_enabled().await {
            self.stop_scan().await?;
        }

        if let Some(handle) = self.dispatcher.write().take() {
            handle.abort();
        }

        Ok(())
    }

    fn core(&self) -> &ScanCore {
        self.controller.core()
    }
}

impl Drop for BleManager {
    fn drop(&mut self) {
        if let Some(handle) = self.dispatcher.write().take() {
            handle.abort();
        }
    }
}

impl std::fmt::Debug for BleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BleManager")
            .field("variant", &self.variant())
            .field("core", self.core())
            .field("config", &self.config)
            .finish()
    }
}
