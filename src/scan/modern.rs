//! Modern scan controller.
//!
//! Service filters and tuning are handed to the radio. A start-scan rejection
//! or an asynchronous [`RadioEvent::ScanFailed`](crate::ble::radio::RadioEvent::ScanFailed)
//! triggers an adapter power cycle, after which the last issued request is
//! started again unless a newer session has taken over.

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::ble::radio::NativeScanRequest;
use crate::ble::uuids::short_form;
use crate::error::Result;
use crate::scan::lifecycle::ScanCore;
use crate::scan::recovery;
use crate::scan::session::{ScanOptions, ScanRequest};
use crate::scan::{ScanController, ScanVariant};

/// Scan controller for radios with native filtering and failure reports.
#[derive(Debug, Clone)]
pub struct ModernScanController {
    core: ScanCore,
    poll_interval: Duration,
}

impl ModernScanController {
    /// Create a controller over `core`, polling the adapter every
    /// `poll_interval` during recovery.
    pub fn new(core: ScanCore, poll_interval: Duration) -> Self {
        Self {
            core,
            poll_interval,
        }
    }

    /// Start recovery for the session `generation` in the background.
    fn begin_recovery(&self, generation: u64) {
        if !self.core.try_begin_recovery() {
            debug!(
                "Recovery already running, ignoring failure for generation {}",
                generation
            );
            return;
        }

        let controller = self.clone();
        tokio::spawn(async move {
            controller.recover(generation).await;
        });
    }

    async fn recover(&self, generation: u64) {
        info!(
            "Power cycling adapter after scan failure (generation {})",
            generation
        );

        recovery::power_cycle(self.core.gateway(), self.poll_interval, |phase| {
            debug!("Recovery phase {:?}", phase);
            self.core.set_recovery_phase(phase);
        })
        .await;

        match self.core.finish_recovery(generation) {
            Some(request) => {
                info!("Adapter recovered, resuming last scan");
                if let Err(e) = self.scan(request).await {
                    warn!("Failed to resume scan after recovery ({}), cycling again", e);
                    self.begin_recovery(generation);
                }
            }
            None => info!(
                "Adapter recovered, scan generation {} was superseded",
                generation
            ),
        }
    }
}

#[async_trait]
impl ScanController for ModernScanController {
    fn variant(&self) -> ScanVariant {
        ScanVariant::Modern
    }

    fn core(&self) -> &ScanCore {
        &self.core
    }

    async fn scan(&self, request: ScanRequest) -> Result<()> {
        let _commands = self.core.lock_commands().await;
        let gateway = self.core.gateway();
        gateway.ensure_enabled().await?;

        for uuid in &request.services {
            debug!("Filtering scan on service {}", short_form(uuid));
        }

        let mut tuning = request.options;
        if !gateway.current().capabilities().hardware_match_tuning {
            let scan_mode_only = ScanOptions::new().scan_mode(tuning.scan_mode);
            if tuning != scan_mode_only {
                debug!("Radio does not support match tuning, sending scan mode only");
            }
            tuning = scan_mode_only;
        }

        let native = NativeScanRequest {
            services: request.services.clone(),
            allow_duplicates: request.allow_duplicates,
            tuning: Some(tuning),
        };

        let session = self.core.begin_session(request);
        info!("Starting scan (generation {})", session.generation());

        if let Err(e) = gateway.current().start_scan(&native).await {
            error!("Scan failed to start: {}", e);
            self.begin_recovery(session.generation());
            return Ok(());
        }

        self.core.arm_timeout(&session);
        Ok(())
    }

    async fn handle_scan_failure(&self, code: i32) {
        error!("Radio reported scan failure (code {})", code);
        self.begin_recovery(self.core.generation());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble::adapter::{AdapterGateway, AdapterState};
    use crate::ble::mock::MockRadio;
    use crate::ble::radio::RadioCapabilities;
    use crate::ble::uuids::HEART_RATE_SERVICE_UUID;
    use crate::events::ScanEvent;
    use crate::scan::lifecycle::ScanPhase;
    use crate::scan::recovery::{RecoveryPhase, DEFAULT_POLL_INTERVAL};
    use crate::scan::session::{MatchCount, MatchMode, ScanMode};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    fn controller() -> (
        ModernScanController,
        Arc<MockRadio>,
        mpsc::UnboundedReceiver<ScanEvent>,
    ) {
        let radio = Arc::new(MockRadio::new());
        let (tx, rx) = mpsc::unbounded_channel::<ScanEvent>();
        let core = ScanCore::new(AdapterGateway::new(radio.clone()), Arc::new(tx));
        (
            ModernScanController::new(core, DEFAULT_POLL_INTERVAL),
            radio,
            rx,
        )
    }

    fn heart_rate_request() -> ScanRequest {
        ScanRequest::new()
            .service_strings(&["180D"])
            .unwrap()
            .options(ScanOptions::new().scan_mode(ScanMode::Balanced))
    }

    fn full_cycle() -> Vec<AdapterState> {
        vec![
            AdapterState::TurningOff,
            AdapterState::Off,
            AdapterState::TurningOn,
            AdapterState::On,
        ]
    }

    #[tokio::test]
    async fn test_filters_and_options_sent_to_radio() {
        let (controller, radio, _rx) = controller();
        controller
            .scan(heart_rate_request().allow_duplicates(true))
            .await
            .unwrap();

        let starts = radio.start_requests();
        assert_eq!(starts.len(), 1);
        assert_eq!(starts[0].services, vec![HEART_RATE_SERVICE_UUID]);
        assert!(starts[0].allow_duplicates);
        assert_eq!(
            starts[0].tuning.map(|t| t.scan_mode),
            Some(ScanMode::Balanced)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_start_recovers_and_replays() {
        let (controller, radio, _rx) = controller();
        radio.fail_next_starts(1);

        tokio_test::assert_ok!(controller.scan(heart_rate_request()).await);
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert_eq!(radio.power_history(), full_cycle());

        let starts = radio.start_requests();
        assert_eq!(starts.len(), 2);
        for start in &starts {
            assert_eq!(start.services, vec![HEART_RATE_SERVICE_UUID]);
            assert_eq!(start.tuning.map(|t| t.scan_mode), Some(ScanMode::Balanced));
        }
        assert_eq!(controller.core().phase(), ScanPhase::Scanning);
        assert_eq!(controller.core().generation(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reported_failure_recovers() {
        let (controller, radio, _rx) = controller();
        controller.scan(heart_rate_request()).await.unwrap();

        controller.handle_scan_failure(2).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(matches!(
            controller.core().phase(),
            ScanPhase::Recovering(RecoveryPhase::WaitingOff)
        ));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(radio.power_history(), full_cycle());
        assert_eq!(radio.start_requests().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_failure_cycles_again() {
        let (controller, radio, _rx) = controller();
        radio.fail_next_starts(2);

        controller.scan(heart_rate_request()).await.unwrap();
        tokio::time::sleep(Duration::from_secs(20)).await;

        let mut expected = full_cycle();
        expected.extend(full_cycle());
        assert_eq!(radio.power_history(), expected);
        assert_eq!(radio.start_requests().len(), 3);
        assert_eq!(controller.core().phase(), ScanPhase::Scanning);
    }

    #[tokio::test(start_paused = true)]
    async fn test_superseded_session_not_replayed() {
        let (controller, radio, _rx) = controller();
        radio.fail_next_starts(1);

        controller.scan(heart_rate_request()).await.unwrap();

        // Adapter is powering back on; force it on early and start a new scan.
        tokio::time::sleep(Duration::from_millis(1700)).await;
        radio.set_power_state(AdapterState::On);
        controller
            .scan(ScanRequest::new().duration_secs(30))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_secs(5)).await;

        let starts = radio.start_requests();
        assert_eq!(starts.len(), 2);
        assert!(starts[1].services.is_empty());
        assert_eq!(controller.core().phase(), ScanPhase::Scanning);
        assert_eq!(controller.core().generation(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_failure_during_recovery_ignored() {
        let (controller, radio, _rx) = controller();
        controller.scan(heart_rate_request()).await.unwrap();

        controller.handle_scan_failure(2).await;
        controller.handle_scan_failure(2).await;
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert_eq!(radio.power_history(), full_cycle());
        assert_eq!(radio.start_requests().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_replay_rejected_by_adapter_cycles_again() {
        let (controller, radio, _rx) = controller();
        radio.fail_next_starts(1);
        radio.drop_power_after_next_on(1);

        controller.scan(heart_rate_request()).await.unwrap();
        tokio::time::sleep(Duration::from_secs(20)).await;

        assert_eq!(
            radio.power_history(),
            vec![
                AdapterState::TurningOff,
                AdapterState::Off,
                AdapterState::TurningOn,
                AdapterState::On,
                AdapterState::Off,
                AdapterState::TurningOn,
                AdapterState::On,
            ]
        );
        assert_eq!(radio.start_requests().len(), 2);
        assert_eq!(controller.core().phase(), ScanPhase::Scanning);
        assert_eq!(controller.core().generation(), 2);
    }

    #[tokio::test]
    async fn test_match_tuning_stripped_without_support() {
        let radio = Arc::new(MockRadio::with_capabilities(RadioCapabilities {
            native_service_filter: true,
            hardware_match_tuning: false,
            scan_failure_reports: true,
            power_control: true,
        }));
        let (tx, _rx) = mpsc::unbounded_channel::<ScanEvent>();
        let core = ScanCore::new(AdapterGateway::new(radio.clone()), Arc::new(tx));
        let controller = ModernScanController::new(core, DEFAULT_POLL_INTERVAL);

        let options = ScanOptions::new()
            .scan_mode(ScanMode::LowLatency)
            .match_mode(MatchMode::Sticky)
            .number_of_matches(MatchCount::One);
        controller
            .scan(ScanRequest::new().options(options))
            .await
            .unwrap();

        assert_eq!(
            radio.start_requests()[0].tuning,
            Some(ScanOptions::new().scan_mode(ScanMode::LowLatency))
        );
        assert_eq!(controller.core().last_issued().map(|r| r.options), Some(options));
    }
}
