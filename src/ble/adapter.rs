//! Adapter power state and access.

use std::sync::Arc;

use btleplug::api::{Central, Manager as _};
use btleplug::platform::Manager;
use tracing::{debug, info};

use crate::ble::host::HostRadio;
use crate::ble::radio::Radio;
use crate::error::{Error, Result};

/// Power state of the radio adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum AdapterState {
    /// Powered off.
    Off,
    /// Powering down.
    TurningOff,
    /// Powered on.
    On,
    /// Powering up.
    TurningOn,
}

impl AdapterState {
    /// Check if the adapter is powered on.
    pub fn is_on(&self) -> bool {
        matches!(self, Self::On)
    }

    /// Check if in a transitional state.
    pub fn is_transitioning(&self) -> bool {
        matches!(self, Self::TurningOff | Self::TurningOn)
    }

    /// Wire name of the state ("off", "turning_off", "on", "turning_on").
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::TurningOff => "turning_off",
            Self::On => "on",
            Self::TurningOn => "turning_on",
        }
    }
}

impl std::fmt::Display for AdapterState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accessor for the single radio adapter driven by a scan controller.
///
/// Cloning is cheap; all clones share the same adapter handle.
#[derive(Clone)]
pub struct AdapterGateway {
    radio: Arc<dyn Radio>,
}

impl AdapterGateway {
    /// Wrap an already resolved radio.
    pub fn new(radio: Arc<dyn Radio>) -> Self {
        Self { radio }
    }

    /// Resolve the first system adapter through btleplug.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoAdapter`] if the Bluetooth subsystem is unavailable
    /// or exposes no adapters.
    pub async fn resolve() -> Result<Self> {
        let manager = Manager::new().await.map_err(|e| {
            debug!("Bluetooth manager unavailable: {}", e);
            Error::NoAdapter
        })?;

        let adapter = manager
            .adapters()
            .await
            .map_err(Error::Bluetooth)?
            .into_iter()
            .next()
            .ok_or(Error::NoAdapter)?;

        info!(
            "Using Bluetooth adapter: {:?}",
            adapter.adapter_info().await.ok()
        );

        Ok(Self::new(Arc::new(HostRadio::new(adapter))))
    }

    /// Get the adapter handle.
    pub fn current(&self) -> &Arc<dyn Radio> {
        &self.radio
    }

    /// Read the adapter power state.
    pub async fn power_state(&self) -> Result<AdapterState> {
        self.radio.power_state().await
    }

    /// Check if the adapter is powered on. Read failures count as off.
    pub async fn is_enabled(&self) -> bool {
        match self.radio.power_state().await {
            Ok(state) => state.is_on(),
            Err(e) => {
                debug!("Failed to read adapter state: {}", e);
                false
            }
        }
    }

    /// Fail with [`Error::AdapterDisabled`] unless the adapter is powered on.
    pub async fn ensure_enabled(&self) -> Result<()> {
        if self.power_state().await?.is_on() {
            Ok(())
        } else {
            Err(Error::AdapterDisabled)
        }
    }

    /// Request power off. Poll [`power_state`](Self::power_state) for completion.
    pub async fn disable(&self) -> Result<()> {
        self.radio.set_powered(false).await
    }

    /// Request power on. Poll [`power_state`](Self::power_state) for completion.
    pub async fn enable(&self) -> Result<()> {
        self.radio.set_powered(true).await
    }
}

impl std::fmt::Debug for AdapterGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterGateway")
            .field("capabilities", &self.radio.capabilities())
            .finish()
    }
}
