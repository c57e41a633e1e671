//! Host radio backed by btleplug.
//!
//! Translates btleplug central events into [`RadioEvent`]s and scan requests
//! into btleplug [`ScanFilter`]s.

use async_trait::async_trait;
use btleplug::api::{Central, CentralEvent, CentralState, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, PeripheralId};
use futures::stream::StreamExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

use crate::ble::adapter::AdapterState;
use crate::ble::address::PeripheralAddress;
use crate::ble::advertising::AdvertisementBuilder;
use crate::ble::radio::{
    DiscoveryReport, NativeScanRequest, Radio, RadioCapabilities, RadioEvent, RadioEventStream,
    RSSI_UNAVAILABLE,
};
use crate::error::{Error, Result};

/// The system Bluetooth adapter.
///
/// btleplug filters on service UUIDs natively and reports rejected scans as
/// errors, but exposes neither hardware match tuning nor power control.
#[derive(Clone)]
pub struct HostRadio {
    adapter: Adapter,
    /// Whether repeated advertisements from a known peripheral are forwarded.
    allow_duplicates: Arc<AtomicBool>,
}

impl HostRadio {
    /// Wrap a btleplug adapter.
    pub fn new(adapter: Adapter) -> Self {
        Self {
            adapter,
            allow_duplicates: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Translate a central event, looking up peripheral properties as needed.
    async fn translate(
        adapter: &Adapter,
        event: CentralEvent,
        allow_duplicates: bool,
    ) -> Option<RadioEvent> {
        match event {
            CentralEvent::DeviceDiscovered(id) => {
                trace!("Device discovered: {:?}", id);
                Self::discovery_report(adapter, &id).await.map(RadioEvent::Discovered)
            }
            CentralEvent::DeviceUpdated(id) if allow_duplicates => {
                trace!("Device updated: {:?}", id);
                Self::discovery_report(adapter, &id).await.map(RadioEvent::Discovered)
            }
            CentralEvent::DeviceConnected(id) => {
                debug!("Device connected: {:?}", id);
                let address = Self::address_of(adapter, &id).await?;
                Some(RadioEvent::ConnectionChanged {
                    address,
                    connected: true,
                })
            }
            CentralEvent::DeviceDisconnected(id) => {
                debug!("Device disconnected: {:?}", id);
                let address = Self::address_of(adapter, &id).await?;
                Some(RadioEvent::ConnectionChanged {
                    address,
                    connected: false,
                })
            }
            CentralEvent::StateUpdate(state) => {
                Some(RadioEvent::PowerStateChanged(map_central_state(state)))
            }
            // Advertisement events are followed by DeviceUpdated.
            _ => None,
        }
    }

    async fn address_of(adapter: &Adapter, id: &PeripheralId) -> Option<PeripheralAddress> {
        let peripheral = adapter.peripheral(id).await.ok()?;
        Some(PeripheralAddress::from(peripheral.address().into_inner()))
    }

    async fn discovery_report(adapter: &Adapter, id: &PeripheralId) -> Option<DiscoveryReport> {
        let peripheral = match adapter.peripheral(id).await {
            Ok(p) => p,
            Err(e) => {
                trace!("Failed to get peripheral: {}", e);
                return None;
            }
        };

        let properties = match peripheral.properties().await {
            Ok(Some(p)) => p,
            _ => return None,
        };

        let mut builder = AdvertisementBuilder::new();
        if let Some(name) = &properties.local_name {
            builder = builder.local_name(name);
        }
        let advertisement = builder
            .services(&properties.services)
            .manufacturer_map(&properties.manufacturer_data)
            .service_data_map(&properties.service_data)
            .build();

        Some(DiscoveryReport {
            address: PeripheralAddress::from(properties.address.into_inner()),
            name: properties.local_name,
            rssi: properties.rssi.unwrap_or(RSSI_UNAVAILABLE),
            advertisement,
            services: properties.services,
        })
    }
}

fn map_central_state(state: CentralState) -> AdapterState {
    match state {
        CentralState::PoweredOn => AdapterState::On,
        CentralState::PoweredOff => AdapterState::Off,
        other => {
            debug!("Treating adapter state {:?} as off", other);
            AdapterState::Off
        }
    }
}

#[async_trait]
impl Radio for HostRadio {
    fn capabilities(&self) -> RadioCapabilities {
        RadioCapabilities {
            native_service_filter: true,
            hardware_match_tuning: false,
            scan_failure_reports: true,
            power_control: false,
        }
    }

    async fn power_state(&self) -> Result<AdapterState> {
        let state = self.adapter.adapter_state().await?;
        Ok(map_central_state(state))
    }

    async fn set_powered(&self, powered: bool) -> Result<()> {
        Err(Error::NotSupported {
            operation: format!("set adapter power to {}", if powered { "on" } else { "off" }),
        })
    }

    async fn start_scan(&self, request: &NativeScanRequest) -> Result<()> {
        if let Some(tuning) = &request.tuning {
            trace!("Host adapter ignores scan tuning {:?}", tuning);
        }

        self.allow_duplicates
            .store(request.allow_duplicates, Ordering::SeqCst);

        self.adapter
            .start_scan(ScanFilter {
                services: request.services.clone(),
            })
            .await
            .map_err(Error::Bluetooth)
    }

    async fn stop_scan(&self) -> Result<()> {
        self.adapter.stop_scan().await.map_err(Error::Bluetooth)
    }

    async fn events(&self) -> Result<RadioEventStream> {
        let events = self.adapter.events().await.map_err(Error::Bluetooth)?;
        let adapter = self.adapter.clone();
        let allow_duplicates = self.allow_duplicates.clone();

        let stream = events.filter_map(move |event| {
            let adapter = adapter.clone();
            let allow_duplicates = allow_duplicates.load(Ordering::SeqCst);
            async move { Self::translate(&adapter, event, allow_duplicates).await }
        });

        Ok(stream.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_central_state() {
        assert_eq!(map_central_state(CentralState::PoweredOn), AdapterState::On);
        assert_eq!(map_central_state(CentralState::PoweredOff), AdapterState::Off);
        assert_eq!(map_central_state(CentralState::Unknown), AdapterState::Off);
    }
}
