//! # ble-scan-manager
//!
//! Bluetooth Low Energy peripheral discovery with a shared peripheral
//! registry and automatic recovery from adapter-level scan failures.
//!
//! ## Features
//!
//! - **Timed Scans**: Start discovery with an optional duration; a newer scan
//!   or an explicit stop always wins over an older scan's timer
//! - **Peripheral Registry**: Deduplicated by address and updated in place on
//!   every advertisement
//! - **Failure Recovery**: Radios that report hardware scan failures are power
//!   cycled and the last scan is resumed with the same parameters
//! - **Two Controller Variants**: Natively filtered scanning where the radio
//!   supports it, unfiltered legacy scanning elsewhere
//! - **Testable**: Every component runs against the in-memory [`MockRadio`]
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ble_scan_manager::{BleManager, Result, ScanEvent, ScanRequest};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let manager = BleManager::new().await?;
//!     let mut events = manager.subscribe();
//!
//!     // Scan for heart rate monitors for ten seconds
//!     let request = ScanRequest::new()
//!         .service_strings(&["180D"])?
//!         .duration_secs(10);
//!     manager.scan(request).await?;
//!
//!     while let Ok(event) = events.recv().await {
//!         match event {
//!             ScanEvent::PeripheralDiscovered { address, name, rssi, .. } => {
//!                 println!("{} {:?} {} dBm", address, name, rssi);
//!             }
//!             ScanEvent::ScanStopped => break,
//!             ScanEvent::AdapterStateChanged { state } => println!("Adapter {}", state),
//!         }
//!     }
//!
//!     manager.shutdown().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Platform Notes
//!
//! The host radio is provided by btleplug. It cannot toggle adapter power, so
//! recovery on real hardware waits for the adapter to be power cycled by the
//! operating system or the user.
//!
//! ## Feature Flags
//!
//! - `serde`: Enable serialization/deserialization for data types

pub mod ble;
pub mod config;
pub mod error;
pub mod events;
pub mod manager;
pub mod registry;
pub mod scan;

pub use ble::adapter::{AdapterGateway, AdapterState};
pub use ble::address::PeripheralAddress;
pub use ble::connection::ConnectionState;
pub use ble::mock::MockRadio;
pub use ble::radio::{DiscoveryReport, Radio, RadioCapabilities, RadioEvent};
pub use config::ManagerConfig;
pub use error::{Error, Result};
pub use events::{EventSink, ScanEvent};
pub use manager::{BleManager, CallbackHandle};
pub use registry::{PeripheralRecord, PeripheralRegistry};
pub use scan::{
    MatchCount, MatchMode, RecoveryPhase, ScanController, ScanCore, ScanMode, ScanOptions,
    ScanPhase, ScanRequest, ScanSession, ScanVariant,
};
