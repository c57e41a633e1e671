//! Mock radio implementation for testing.
//!
//! [`MockRadio`] implements [`Radio`] entirely in memory so scan sessions,
//! timeouts and adapter recovery can be exercised without hardware.
//!
//! # Features
//!
//! - **Failure injection**: reject the next N start-scan requests, or push a
//!   [`RadioEvent::ScanFailed`] as if the radio reported it asynchronously
//! - **Power simulation**: power requests pass through the transitional
//!   states and settle after a configurable number of state polls
//! - **Call recording**: every start-scan request, stop-scan call and power
//!   state change is recorded for assertions
//! - **Slow adapter**: power state reads can be delayed to widen races

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::ble::adapter::AdapterState;
use crate::ble::radio::{
    DiscoveryReport, NativeScanRequest, Radio, RadioCapabilities, RadioEvent, RadioEventStream,
};
use crate::error::{Error, Result};

/// Failure code used for injected start-scan rejections.
pub const MOCK_SCAN_FAILURE_CODE: i32 = 2;

/// A scan command received by [`MockRadio`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockCommand {
    /// `start_scan` was called.
    StartScan,
    /// `stop_scan` was called.
    StopScan,
}

struct PowerState {
    state: AdapterState,
    /// Polls left before a transitional state settles.
    pending_polls: u32,
    /// Power-on completions that drop straight back to off on the next read.
    drops_after_on: u32,
    drop_pending: bool,
    history: Vec<AdapterState>,
}

/// A scriptable in-memory radio.
///
/// # Example
///
/// ```
/// use ble_scan_manager::ble::mock::MockRadio;
/// use ble_scan_manager::ble::radio::{NativeScanRequest, Radio};
///
/// #[tokio::main]
/// async fn main() {
///     let radio = MockRadio::new();
///     radio.fail_next_starts(1);
///
///     assert!(radio.start_scan(&NativeScanRequest::default()).await.is_err());
///     assert!(radio.start_scan(&NativeScanRequest::default()).await.is_ok());
///     assert_eq!(radio.start_requests().len(), 2);
/// }
/// ```
pub struct MockRadio {
    capabilities: RadioCapabilities,
    power: Mutex<PowerState>,
    settle_polls: AtomicU32,
    fail_starts: AtomicU32,
    read_delay: Mutex<Duration>,
    starts: Mutex<Vec<NativeScanRequest>>,
    stops: AtomicUsize,
    commands: Mutex<Vec<MockCommand>>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<RadioEvent>>>,
}

impl std::fmt::Debug for MockRadio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockRadio")
            .field("capabilities", &self.capabilities)
            .field("state", &self.power.lock().state)
            .field("starts", &self.starts.lock().len())
            .field("stops", &self.stops.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for MockRadio {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRadio {
    /// Create a powered-on radio with every capability.
    pub fn new() -> Self {
        Self::with_capabilities(RadioCapabilities {
            native_service_filter: true,
            hardware_match_tuning: true,
            scan_failure_reports: true,
            power_control: true,
        })
    }

    /// Create a powered-on radio with the given capabilities.
    pub fn with_capabilities(capabilities: RadioCapabilities) -> Self {
        Self {
            capabilities,
            power: Mutex::new(PowerState {
                state: AdapterState::On,
                pending_polls: 0,
                drops_after_on: 0,
                drop_pending: false,
                history: Vec::new(),
            }),
            settle_polls: AtomicU32::new(2),
            fail_starts: AtomicU32::new(0),
            read_delay: Mutex::new(Duration::ZERO),
            starts: Mutex::new(Vec::new()),
            stops: AtomicUsize::new(0),
            commands: Mutex::new(Vec::new()),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Create a radio that only offers unfiltered scanning.
    pub fn legacy() -> Self {
        Self::with_capabilities(RadioCapabilities::default())
    }

    /// Set how many state polls a power transition takes to settle.
    pub fn set_settle_polls(&self, polls: u32) {
        self.settle_polls.store(polls, Ordering::SeqCst);
    }

    /// Reject the next `count` start-scan requests.
    pub fn fail_next_starts(&self, count: u32) {
        self.fail_starts.store(count, Ordering::SeqCst);
    }

    /// Delay every power state read by `delay`.
    pub fn set_power_read_delay(&self, delay: Duration) {
        *self.read_delay.lock() = delay;
    }

    /// Make the next `count` completed power-ons fall back to off on the
    /// following state read, as a flaky adapter does.
    pub fn drop_power_after_next_on(&self, count: u32) {
        self.power.lock().drops_after_on = count;
    }

    /// Force the power state, as if changed outside the process.
    pub fn set_power_state(&self, state: AdapterState) {
        let mut power = self.power.lock();
        power.pending_polls = 0;
        self.transition(&mut power, state);
    }

    /// Deliver a discovery result to subscribers.
    pub fn discover(&self, report: DiscoveryReport) {
        self.publish(RadioEvent::Discovered(report));
    }

    /// Deliver an asynchronous scan failure to subscribers.
    pub fn report_scan_failure(&self, code: i32) {
        self.publish(RadioEvent::ScanFailed { code });
    }

    /// Deliver an arbitrary event to subscribers.
    pub fn publish(&self, event: RadioEvent) {
        self.subscribers
            .lock()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Every start-scan request received, in order.
    pub fn start_requests(&self) -> Vec<NativeScanRequest> {
        self.starts.lock().clone()
    }

    /// Number of stop-scan calls received.
    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    /// Every start-scan and stop-scan call, in order.
    pub fn commands(&self) -> Vec<MockCommand> {
        self.commands.lock().clone()
    }

    /// Every power state the radio has passed through, in order.
    pub fn power_history(&self) -> Vec<AdapterState> {
        self.power.lock().history.clone()
    }

    fn transition(&self, power: &mut PowerState, state: AdapterState) {
        if power.state != state {
            power.state = state;
            power.history.push(state);
            self.publish(RadioEvent::PowerStateChanged(state));
        }
    }
}

#[async_trait]
impl Radio for MockRadio {
    fn capabilities(&self) -> RadioCapabilities {
        self.capabilities
    }

    async fn power_state(&self) -> Result<AdapterState> {
        let delay = *self.read_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut power = self.power.lock();
        if power.drop_pending && power.state.is_on() {
            power.drop_pending = false;
            self.transition(&mut power, AdapterState::Off);
        } else if power.state.is_transitioning() {
            if power.pending_polls == 0 {
                let settled = match power.state {
                    AdapterState::TurningOff => AdapterState::Off,
                    _ => AdapterState::On,
                };
                self.transition(&mut power, settled);
                if settled.is_on() && power.drops_after_on > 0 {
                    power.drops_after_on -= 1;
                    power.drop_pending = true;
                }
            } else {
                power.pending_polls -= 1;
            }
        }
        Ok(power.state)
    }

    async fn set_powered(&self, powered: bool) -> Result<()> {
        if !self.capabilities.power_control {
            return Err(Error::NotSupported {
                operation: "adapter power control".to_string(),
            });
        }

        let mut power = self.power.lock();
        let target = if powered {
            AdapterState::TurningOn
        } else {
            AdapterState::TurningOff
        };
        let settled = if powered {
            AdapterState::On
        } else {
            AdapterState::Off
        };

        if power.state != settled {
            power.pending_polls = self.settle_polls.load(Ordering::SeqCst);
            self.transition(&mut power, target);
        }
        Ok(())
    }

    async fn start_scan(&self, request: &NativeScanRequest) -> Result<()> {
        self.starts.lock().push(request.clone());
        self.commands.lock().push(MockCommand::StartScan);

        let failing = self
            .fail_starts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();

        if failing || !self.power.lock().state.is_on() {
            Err(Error::HardwareScanFailure {
                code: MOCK_SCAN_FAILURE_CODE,
            })
        } else {
            Ok(())
        }
    }

    async fn stop_scan(&self) -> Result<()> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.commands.lock().push(MockCommand::StopScan);
        Ok(())
    }

    async fn events(&self) -> Result<RadioEventStream> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(tx);
        let events = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        });
        Ok(events.boxed())
    }
}
