//! Legacy scan controller.
//!
//! The radio scans unfiltered: service filters, duplicate suppression and
//! hardware tuning are not available and are ignored with a notice.

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::ble::radio::NativeScanRequest;
use crate::error::Result;
use crate::scan::lifecycle::ScanCore;
use crate::scan::session::ScanRequest;
use crate::scan::{ScanController, ScanVariant};

/// Scan controller for radios without native filtering.
#[derive(Debug, Clone)]
pub struct LegacyScanController {
    core: ScanCore,
}

impl LegacyScanController {
    /// Create a controller over `core`.
    pub fn new(core: ScanCore) -> Self {
        Self { core }
    }
}

#[async_trait]
impl ScanController for LegacyScanController {
    fn variant(&self) -> ScanVariant {
        ScanVariant::Legacy
    }

    fn core(&self) -> &ScanCore {
        &self.core
    }

    async fn scan(&self, request: ScanRequest) -> Result<()> {
        let _commands = self.core.lock_commands().await;
        self.core.gateway().ensure_enabled().await?;

        if !request.services.is_empty() {
            debug!(
                "Service filters are not applied by legacy scanning ({} ignored)",
                request.services.len()
            );
        }
        if !request.options.is_default() {
            info!("Scan options {:?} ignored by legacy scanning", request.options);
        }

        let session = self.core.begin_session(request);
        info!("Starting legacy scan (generation {})", session.generation());

        let native = NativeScanRequest {
            services: Vec::new(),
            allow_duplicates: true,
            tuning: None,
        };

        if let Err(e) = self.core.gateway().current().start_scan(&native).await {
            warn!("Legacy scan failed to start: {}", e);
            self.core.end_session(session.generation());
            return Err(e);
        }

        self.core.arm_timeout(&session);
        Ok(())
    }

    async fn handle_scan_failure(&self, code: i32) {
        warn!("Ignoring scan failure code {} in legacy mode", code);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble::adapter::{AdapterGateway, AdapterState};
    use crate::ble::mock::{MockCommand, MockRadio};
    use crate::ble::uuids::HEART_RATE_SERVICE_UUID;
    use crate::events::ScanEvent;
    use crate::scan::lifecycle::ScanPhase;
    use crate::scan::session::{ScanMode, ScanOptions};
    use crate::Error;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn controller() -> (
        LegacyScanController,
        Arc<MockRadio>,
        mpsc::UnboundedReceiver<ScanEvent>,
    ) {
        let radio = Arc::new(MockRadio::legacy());
        let (tx, rx) = mpsc::unbounded_channel::<ScanEvent>();
        let core = ScanCore::new(AdapterGateway::new(radio.clone()), Arc::new(tx));
        (LegacyScanController::new(core), radio, rx)
    }

    #[tokio::test]
    async fn test_filters_and_options_not_sent_to_radio() {
        let (controller, radio, _rx) = controller();
        let request = ScanRequest::new()
            .services([HEART_RATE_SERVICE_UUID])
            .allow_duplicates(false)
            .options(ScanOptions::new().scan_mode(ScanMode::LowLatency));

        tokio_test::assert_ok!(controller.scan(request).await);

        let starts = radio.start_requests();
        assert_eq!(starts.len(), 1);
        assert!(starts[0].services.is_empty());
        assert!(starts[0].allow_duplicates);
        assert_eq!(starts[0].tuning, None);
    }

    #[tokio::test]
    async fn test_scan_with_adapter_off() {
        let (controller, radio, _rx) = controller();
        radio.set_power_state(AdapterState::Off);

        assert!(matches!(
            controller.scan(ScanRequest::new()).await,
            Err(Error::AdapterDisabled)
        ));
        assert!(radio.start_requests().is_empty());
        assert_eq!(controller.core().generation(), 0);
    }

    #[tokio::test]
    async fn test_rejected_start_is_reported() {
        let (controller, radio, _rx) = controller();
        radio.fail_next_starts(1);

        tokio_test::assert_err!(controller.scan(ScanRequest::new()).await);
        assert_eq!(controller.core().phase(), ScanPhase::Idle);
        assert!(radio.power_history().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_stops_scan() {
        let (controller, radio, mut rx) = controller();
        controller
            .scan(ScanRequest::new().duration_secs(5))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_secs(6)).await;

        assert_eq!(radio.start_requests().len(), 1);
        assert_eq!(radio.stop_count(), 1);
        assert_eq!(rx.try_recv().unwrap(), ScanEvent::ScanStopped);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_scan_failure_event_ignored() {
        let (controller, radio, _rx) = controller();
        controller.scan(ScanRequest::new()).await.unwrap();

        controller.handle_scan_failure(2).await;
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(controller.core().phase(), ScanPhase::Scanning);
        assert_eq!(radio.start_requests().len(), 1);
        assert!(radio.power_history().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_in_flight_finishes_before_new_scan() {
        let (controller, radio, mut rx) = controller();
        radio.set_power_read_delay(Duration::from_millis(300));

        controller
            .scan(ScanRequest::new().duration_secs(1))
            .await
            .unwrap();

        // The timer is reading the adapter state when the next scan arrives.
        tokio::time::sleep(Duration::from_millis(1100)).await;
        controller
            .scan(ScanRequest::new().duration_secs(30))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(
            radio.commands(),
            vec![
                MockCommand::StartScan,
                MockCommand::StopScan,
                MockCommand::StartScan
            ]
        );
        assert_eq!(rx.try_recv().unwrap(), ScanEvent::ScanStopped);
        assert!(rx.try_recv().is_err());
        assert_eq!(controller.core().phase(), ScanPhase::Scanning);
        assert_eq!(controller.core().generation(), 2);
    }
}
