//! Session lifecycle shared by both controller variants.
//!
//! [`ScanCore`] owns the generation counter, the current session, the last
//! issued request and the peripheral registry, all behind one lock. The lock
//! is never held across an await; events are emitted after it is released.
//!
//! Every session gets a fresh generation id. Timeouts and recovery capture the
//! id they were started for and only act while it is still the live one, so a
//! stale timer can never stop a newer scan.
//!
//! Radio command sequences (start, stop, timed stop) are serialized by a
//! separate async command lock, so a timer that has passed the generation
//! check finishes its stop before a newer session can reach the radio.

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{Mutex as CommandLock, MutexGuard};
use tracing::{debug, info, trace, warn};

use crate::ble::adapter::{AdapterGateway, AdapterState};
use crate::ble::address::PeripheralAddress;
use crate::ble::connection::ConnectionState;
use crate::ble::radio::DiscoveryReport;
use crate::error::Result;
use crate::events::{EventSink, ScanEvent};
use crate::registry::{PeripheralRecord, PeripheralRegistry};
use crate::scan::recovery::RecoveryPhase;
use crate::scan::session::{ScanRequest, ScanSession};

/// Where a controller is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanPhase {
    /// No session is running.
    Idle,
    /// A session is running.
    Scanning,
    /// The adapter is being power cycled after a hardware scan failure.
    Recovering(RecoveryPhase),
}

struct ScanState {
    generation: u64,
    current: Option<ScanSession>,
    /// Snapshot of the most recently issued request, replayed after recovery.
    last_issued: Option<ScanRequest>,
    recovery: Option<RecoveryPhase>,
    registry: PeripheralRegistry,
}

/// Shared session state and lifecycle helpers.
///
/// Cloning is cheap; all clones share the same state.
#[derive(Clone)]
pub struct ScanCore {
    gateway: AdapterGateway,
    sink: Arc<dyn EventSink>,
    state: Arc<Mutex<ScanState>>,
    commands: Arc<CommandLock<()>>,
}

impl ScanCore {
    /// Create a core driving `gateway` and reporting to `sink`.
    pub fn new(gateway: AdapterGateway, sink: Arc<dyn EventSink>) -> Self {
        Self {
            gateway,
            sink,
            state: Arc::new(Mutex::new(ScanState {
                generation: 0,
                current: None,
                last_issued: None,
                recovery: None,
                registry: PeripheralRegistry::new(),
            })),
            commands: Arc::new(CommandLock::new(())),
        }
    }

    /// The adapter this core drives.
    pub fn gateway(&self) -> &AdapterGateway {
        &self.gateway
    }

    /// The live generation id.
    pub fn generation(&self) -> u64 {
        self.state.lock().generation
    }

    /// The current lifecycle phase.
    pub fn phase(&self) -> ScanPhase {
        let state = self.state.lock();
        match (state.recovery, &state.current) {
            (Some(phase), _) => ScanPhase::Recovering(phase),
            (None, Some(_)) => ScanPhase::Scanning,
            (None, None) => ScanPhase::Idle,
        }
    }

    /// The session currently running, if any.
    pub fn current_session(&self) -> Option<ScanSession> {
        self.state.lock().current.clone()
    }

    /// The most recently issued request, if any.
    pub fn last_issued(&self) -> Option<ScanRequest> {
        self.state.lock().last_issued.clone()
    }

    /// Run `f` against the registry under the core lock.
    pub fn with_registry<R>(&self, f: impl FnOnce(&PeripheralRegistry) -> R) -> R {
        f(&self.state.lock().registry)
    }

    /// Run `f` against the mutable registry under the core lock.
    pub fn with_registry_mut<R>(&self, f: impl FnOnce(&mut PeripheralRegistry) -> R) -> R {
        f(&mut self.state.lock().registry)
    }

    /// Wait for exclusive use of the radio's scan commands.
    ///
    /// Held across an adapter check and the start or stop call that depends
    /// on it. Never held across recovery polling.
    pub(crate) async fn lock_commands(&self) -> MutexGuard<'_, ()> {
        self.commands.lock().await
    }

    /// Make `request` the current session.
    ///
    /// Prunes disconnected peripherals, advances the generation and records
    /// the request as the one to replay after recovery.
    pub(crate) fn begin_session(&self, request: ScanRequest) -> ScanSession {
        let mut state = self.state.lock();

        let pruned = state.registry.prune_disconnected();
        if pruned > 0 {
            debug!("Pruned {} disconnected peripherals before scan", pruned);
        }

        state.generation += 1;
        let session = ScanSession::new(state.generation, request.clone());
        state.current = Some(session.clone());
        state.last_issued = Some(request);
        session
    }

    /// Mark the session `generation` as over, if it is still current.
    pub(crate) fn end_session(&self, generation: u64) {
        let mut state = self.state.lock();
        if state.generation == generation {
            state.current = None;
        }
    }

    /// Schedule the duration timeout for a bounded session.
    pub(crate) fn arm_timeout(&self, session: &ScanSession) {
        let duration = session.request().duration;
        if duration.is_zero() {
            return;
        }

        let core = self.clone();
        let generation = session.generation();
        debug!("Scan generation {} will stop in {:?}", generation, duration);

        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            core.fire_timeout(generation).await;
        });
    }

    /// Timeout action for the session `generation`.
    ///
    /// Returns `true` if the scan was stopped and [`ScanEvent::ScanStopped`]
    /// emitted.
    pub(crate) async fn fire_timeout(&self, generation: u64) -> bool {
        let _commands = self.lock_commands().await;

        if !self.is_live(generation) {
            return false;
        }
        self.end_session(generation);

        if !self.gateway.is_enabled().await {
            debug!("Adapter not powered on, skipping timed stop");
            return false;
        }

        match self.gateway.current().stop_scan().await {
            Ok(()) => {
                info!("Scan generation {} timed out, stopped", generation);
                self.sink.emit(ScanEvent::ScanStopped);
                true
            }
            Err(e) => {
                warn!("Failed to stop timed out scan: {}", e);
                false
            }
        }
    }

    /// Check `generation` is still live. Callers hold the command lock.
    fn is_live(&self, generation: u64) -> bool {
        let live = self.state.lock().generation;
        if live != generation {
            debug!("Timeout for generation {} superseded by generation {}", generation, live);
        }
        live == generation
    }

    /// Stop the current session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AdapterDisabled`](crate::Error::AdapterDisabled) if the
    /// adapter is not powered on.
    pub(crate) async fn stop(&self) -> Result<()> {
        let _commands = self.lock_commands().await;
        self.gateway.ensure_enabled().await?;

        let generation = {
            let mut state = self.state.lock();
            state.generation += 1;
            state.current = None;
            state.generation
        };

        info!("Stopping scan (generation now {})", generation);
        self.gateway.current().stop_scan().await
    }

    /// Record a discovery result and emit it.
    pub(crate) fn handle_discovery(&self, report: DiscoveryReport) {
        trace!(
            "Discovered {} ({:?}) rssi {}",
            report.address,
            report.name,
            report.rssi
        );

        let event = {
            let mut state = self.state.lock();
            let record = state.registry.upsert(PeripheralRecord::from(report));
            ScanEvent::discovered(record)
        };

        self.sink.emit(event);
    }

    /// Apply a link state change reported by the radio.
    pub(crate) fn handle_connection_change(&self, address: PeripheralAddress, connected: bool) {
        let result = self
            .state
            .lock()
            .registry
            .set_connection_state(&address, ConnectionState::from(connected));

        if result.is_err() {
            trace!("Connection change for unknown peripheral {}", address);
        }
    }

    /// Emit an adapter state observation.
    pub(crate) fn emit_adapter_state(&self, state: AdapterState) {
        debug!("Adapter state: {}", state);
        self.sink.emit(ScanEvent::AdapterStateChanged { state });
    }

    /// Claim the recovery slot. Returns `false` if recovery is already running.
    pub(crate) fn try_begin_recovery(&self) -> bool {
        let mut state = self.state.lock();
        if state.recovery.is_some() {
            return false;
        }
        state.recovery = Some(RecoveryPhase::Disabling);
        true
    }

    pub(crate) fn set_recovery_phase(&self, phase: RecoveryPhase) {
        self.state.lock().recovery = Some(phase);
    }

    /// Release the recovery slot and return the request to replay, unless a
    /// newer session superseded `generation` in the meantime.
    pub(crate) fn finish_recovery(&self, generation: u64) -> Option<ScanRequest> {
        let mut state = self.state.lock();
        state.recovery = None;
        if state.generation == generation {
            state.last_issued.clone()
        } else {
            None
        }
    }
}

impl std::fmt::Debug for ScanCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ScanCore")
            .field("generation", &state.generation)
            .field("current", &state.current)
            .field("recovery", &state.recovery)
            .field("peripherals", &state.registry.len())
            .finish()
    }
}
