//! BLE radio module.
//!
//! This module provides the radio seam the scan controllers drive, its
//! btleplug and in-memory implementations, and the address, UUID and
//! advertisement helpers shared by both.

pub mod adapter;
pub mod address;
pub mod advertising;
pub mod connection;
pub mod host;
pub mod mock;
pub mod radio;
pub mod uuids;

pub use adapter::{AdapterGateway, AdapterState};
pub use address::PeripheralAddress;
pub use advertising::{parse_ad_structures, AdStructure, AdvertisementBuilder};
pub use connection::ConnectionState;
pub use host::HostRadio;
pub use mock::MockRadio;
pub use radio::{
    DiscoveryReport, NativeScanRequest, Radio, RadioCapabilities, RadioEvent, RadioEventStream,
    RSSI_UNAVAILABLE,
};
pub use uuids::*;
