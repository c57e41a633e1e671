//! Error types for the ble-scan-manager crate.

use thiserror::Error;

/// The main error type for this crate.
#[derive(Error, Debug)]
pub enum Error {
    /// Bluetooth-related error from the underlying BLE library.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// No radio adapter is available on this system.
    #[error("No Bluetooth adapter available")]
    NoAdapter,

    /// The radio adapter exists but is not powered on.
    #[error("Bluetooth adapter is disabled")]
    AdapterDisabled,

    /// A malformed device address was supplied.
    #[error("Invalid peripheral address: {address}")]
    InvalidAddress {
        /// The address as it was supplied.
        address: String,
    },

    /// No peripheral is registered under the given address.
    #[error("Peripheral not found: {address}")]
    PeripheralNotFound {
        /// The canonical address that was searched for.
        address: String,
    },

    /// Removal was attempted on a peripheral that is still connected.
    #[error("Peripheral {address} can not be removed while connected")]
    StillConnected {
        /// The canonical address of the connected peripheral.
        address: String,
    },

    /// The radio rejected a start-scan request.
    ///
    /// The modern scan controller absorbs this into adapter recovery; it is
    /// never returned from its `scan()`.
    #[error("Hardware scan failure (code {code})")]
    HardwareScanFailure {
        /// Radio-specific failure code.
        code: i32,
    },

    /// An invalid parameter was provided.
    #[error("Invalid parameter: {name} = {value}")]
    InvalidParameter {
        /// The name of the parameter.
        name: String,
        /// The invalid value that was provided.
        value: String,
    },

    /// Invalid data was received from the radio.
    #[error("Invalid data received: {context}")]
    InvalidData {
        /// Description of what was invalid about the data.
        context: String,
    },

    /// The requested operation is not supported by the radio.
    #[error("Operation not supported: {operation}")]
    NotSupported {
        /// Description of the unsupported operation.
        operation: String,
    },
}

impl Error {
    /// Build an [`Error::InvalidParameter`] from anything displayable.
    pub(crate) fn invalid_parameter(name: &str, value: impl std::fmt::Display) -> Self {
        Self::InvalidParameter {
            name: name.to_string(),
            value: value.to_string(),
        }
    }
}

/// A specialized Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
