//! Adapter power-cycle recovery.
//!
//! Some chipsets reject every scan request after a hardware scan failure until
//! the adapter is power cycled. Recovery disables the adapter, polls until it
//! reports off, enables it and polls until it reports on. State-change
//! notifications are not trusted here since they may be suppressed while the
//! radio is in the faulty condition.
//!
//! There is no retry bound or backoff: a failure of the resumed scan starts
//! another cycle.

use std::time::Duration;
use tracing::{debug, trace, warn};

use crate::ble::adapter::{AdapterGateway, AdapterState};

/// Default delay between power state polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Step of the recovery state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecoveryPhase {
    /// Power-off requested.
    Disabling,
    /// Waiting for the adapter to report off.
    WaitingOff,
    /// Power-on requested.
    Enabling,
    /// Waiting for the adapter to report on.
    WaitingOn,
}

/// Power cycle the adapter, reporting each phase to `on_phase`.
///
/// Returns once the adapter has been observed on again. Never fails: power
/// requests that error are logged and the poll continues, waiting for the
/// transition to happen some other way.
pub(crate) async fn power_cycle<F>(gateway: &AdapterGateway, poll_interval: Duration, on_phase: F)
where
    F: Fn(RecoveryPhase),
{
    on_phase(RecoveryPhase::Disabling);
    if let Err(e) = gateway.disable().await {
        warn!("Failed to disable adapter ({}), waiting for it to power off", e);
    }

    on_phase(RecoveryPhase::WaitingOff);
    let polls = wait_for_state(gateway, AdapterState::Off, poll_interval).await;
    debug!("Adapter off after {} polls, powering on", polls);

    on_phase(RecoveryPhase::Enabling);
    if let Err(e) = gateway.enable().await {
        warn!("Failed to enable adapter ({}), waiting for it to power on", e);
    }

    on_phase(RecoveryPhase::WaitingOn);
    let polls = wait_for_state(gateway, AdapterState::On, poll_interval).await;
    debug!("Adapter on after {} polls", polls);
}

/// Poll every `poll_interval` until the adapter reports `target`.
///
/// Returns the number of polls taken.
pub(crate) async fn wait_for_state(
    gateway: &AdapterGateway,
    target: AdapterState,
    poll_interval: Duration,
) -> u32 {
    let mut polls = 0;
    loop {
        tokio::time::sleep(poll_interval).await;
        polls += 1;

        match gateway.power_state().await {
            Ok(state) if state == target => return polls,
            Ok(state) => trace!("Adapter is {}, waiting for {}", state, target),
            Err(e) => debug!("Failed to read adapter state: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble::mock::MockRadio;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_power_cycle_visits_every_phase() {
        let radio = Arc::new(MockRadio::new());
        radio.set_settle_polls(3);
        let gateway = AdapterGateway::new(radio.clone());
        let phases = Mutex::new(Vec::new());

        power_cycle(&gateway, DEFAULT_POLL_INTERVAL, |phase| phases.lock().push(phase)).await;

        assert_eq!(
            phases.into_inner(),
            vec![
                RecoveryPhase::Disabling,
                RecoveryPhase::WaitingOff,
                RecoveryPhase::Enabling,
                RecoveryPhase::WaitingOn,
            ]
        );
        assert_eq!(
            radio.power_history(),
            vec![
                AdapterState::TurningOff,
                AdapterState::Off,
                AdapterState::TurningOn,
                AdapterState::On,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_state_counts_polls() {
        let radio = Arc::new(MockRadio::new());
        radio.set_settle_polls(2);
        let gateway = AdapterGateway::new(radio.clone());

        gateway.disable().await.unwrap();
        let polls = wait_for_state(&gateway, AdapterState::Off, Duration::from_millis(10)).await;
        assert_eq!(polls, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_power_cycle_without_power_control() {
        let radio = Arc::new(MockRadio::legacy());
        let gateway = AdapterGateway::new(radio.clone());

        let external = radio.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            external.set_power_state(AdapterState::Off);
            tokio::time::sleep(Duration::from_secs(2)).await;
            external.set_power_state(AdapterState::On);
        });

        power_cycle(&gateway, DEFAULT_POLL_INTERVAL, |_| {}).await;
        assert_eq!(
            radio.power_history(),
            vec![AdapterState::Off, AdapterState::On]
        );
    }
}
