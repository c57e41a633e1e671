//! Scan session control.
//!
//! Two controller variants share the session lifecycle in [`ScanCore`]:
//!
//! - [`LegacyScanController`] for radios that can only scan unfiltered. It has
//!   no failure signal to react to; sessions end on stop or timeout.
//! - [`ModernScanController`] for radios with native service filtering and
//!   scan failure reporting. A hardware scan failure power cycles the adapter
//!   and resumes the last request.

pub mod lifecycle;
pub mod legacy;
pub mod modern;
pub mod recovery;
pub mod session;

use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::ble::radio::{RadioCapabilities, RadioEvent};
use crate::error::Result;

pub use lifecycle::{ScanCore, ScanPhase};
pub use legacy::LegacyScanController;
pub use modern::ModernScanController;
pub use recovery::RecoveryPhase;
pub use session::{MatchCount, MatchMode, ScanMode, ScanOptions, ScanRequest, ScanSession};

/// Which controller variant drives the radio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ScanVariant {
    /// Unfiltered scanning without failure recovery.
    Legacy,
    /// Natively filtered scanning with failure recovery.
    Modern,
}

impl ScanVariant {
    /// Pick the variant for a radio.
    pub fn select(capabilities: RadioCapabilities, force_legacy: bool) -> Self {
        if !force_legacy
            && capabilities.native_service_filter
            && capabilities.scan_failure_reports
        {
            Self::Modern
        } else {
            Self::Legacy
        }
    }
}

impl std::fmt::Display for ScanVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Legacy => write!(f, "legacy"),
            Self::Modern => write!(f, "modern"),
        }
    }
}

/// Starts and stops discovery on a radio.
#[async_trait]
pub trait ScanController: Send + Sync {
    /// The variant this controller implements.
    fn variant(&self) -> ScanVariant;

    /// The shared session state.
    fn core(&self) -> &ScanCore;

    /// Start a new session, replacing any current one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AdapterDisabled`](crate::Error::AdapterDisabled) if the
    /// adapter is not powered on.
    async fn scan(&self, request: ScanRequest) -> Result<()>;

    /// Stop the current session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AdapterDisabled`](crate::Error::AdapterDisabled) if the
    /// adapter is not powered on.
    async fn stop_scan(&self) -> Result<()> {
        self.core().stop().await
    }

    /// React to an asynchronous scan failure reported by the radio.
    async fn handle_scan_failure(&self, code: i32);
}

/// Build the controller for `variant`.
pub fn create_controller(
    variant: ScanVariant,
    core: ScanCore,
    poll_interval: Duration,
) -> Arc<dyn ScanController> {
    match variant {
        ScanVariant::Legacy => Arc::new(LegacyScanController::new(core)),
        ScanVariant::Modern => Arc::new(ModernScanController::new(core, poll_interval)),
    }
}

/// Spawn the task that consumes radio events for `controller`.
///
/// Events are handled one at a time in arrival order.
///
/// # Errors
///
/// Returns an error if the radio event stream cannot be opened.
pub async fn spawn_dispatcher(controller: Arc<dyn ScanController>) -> Result<JoinHandle<()>> {
    let mut events = controller.core().gateway().current().events().await?;

    Ok(tokio::spawn(async move {
        while let Some(event) = events.next().await {
            let core = controller.core();
            match event {
                RadioEvent::Discovered(report) => core.handle_discovery(report),
                RadioEvent::ScanFailed { code } => controller.handle_scan_failure(code).await,
                RadioEvent::PowerStateChanged(state) => core.emit_adapter_state(state),
                RadioEvent::ConnectionChanged { address, connected } => {
                    core.handle_connection_change(address, connected)
                }
            }
        }

        info!("Radio event stream ended");
        debug!("Scan dispatcher for {} controller exiting", controller.variant());
    }))
}
