//! Registry of peripherals seen by the radio.
//!
//! Records are keyed by canonical [`PeripheralAddress`] and kept in the order
//! they were first seen. The registry itself does no locking; the scan core
//! owns it behind the same lock that guards the session generation.

use bytes::Bytes;
use std::collections::{BTreeSet, HashMap};
use uuid::Uuid;

use crate::ble::address::PeripheralAddress;
use crate::ble::advertising::local_name;
use crate::ble::connection::ConnectionState;
use crate::ble::radio::DiscoveryReport;
use crate::error::{Error, Result};

/// Everything known about one peripheral.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PeripheralRecord {
    /// Hardware address, the registry key.
    pub address: PeripheralAddress,
    /// Advertised name, if any.
    pub name: Option<String>,
    /// Last-known signal strength in dBm.
    pub rssi: i16,
    /// Last-known raw advertisement payload.
    pub advertisement: Bytes,
    /// Connection state, as reported by the connection collaborator.
    pub connection_state: ConnectionState,
    /// Services advertised or discovered for this peripheral.
    pub services: BTreeSet<Uuid>,
}

impl PeripheralRecord {
    /// Create a record for a peripheral that has not been seen yet.
    pub fn new(address: PeripheralAddress) -> Self {
        Self {
            address,
            name: None,
            rssi: 0,
            advertisement: Bytes::new(),
            connection_state: ConnectionState::Disconnected,
            services: BTreeSet::new(),
        }
    }

    /// Check if the record carries any of the given services.
    pub fn has_any_service(&self, services: &[Uuid]) -> bool {
        services.iter().any(|uuid| self.services.contains(uuid))
    }
}

impl From<DiscoveryReport> for PeripheralRecord {
    fn from(report: DiscoveryReport) -> Self {
        Self {
            address: report.address,
            name: report
                .name
                .filter(|n| !n.is_empty())
                .or_else(|| local_name(&report.advertisement)),
            rssi: report.rssi,
            advertisement: report.advertisement,
            connection_state: ConnectionState::Disconnected,
            services: report.services.into_iter().collect(),
        }
    }
}

/// Insertion-ordered map of peripheral records.
#[derive(Debug, Default)]
pub struct PeripheralRegistry {
    records: HashMap<PeripheralAddress, PeripheralRecord>,
    order: Vec<PeripheralAddress>,
}

impl PeripheralRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a newly discovered peripheral, or refresh a known one.
    ///
    /// For a known address only signal strength and advertisement payload are
    /// replaced; a name is filled in if previously absent and advertised
    /// services are merged. Connection state is always preserved.
    pub fn upsert(&mut self, record: PeripheralRecord) -> &PeripheralRecord {
        let address = record.address;

        if !self.records.contains_key(&address) {
            self.order.push(address);
        }

        let entry = self
            .records
            .entry(address)
            .and_modify(|existing| {
                existing.rssi = record.rssi;
                existing.advertisement = record.advertisement.clone();
                if existing.name.is_none() {
                    existing.name = record.name.clone();
                }
                existing.services.extend(record.services.iter().copied());
            })
            .or_insert(record);

        &*entry
    }

    /// Remove every disconnected record, returning how many were removed.
    pub fn prune_disconnected(&mut self) -> usize {
        let before = self.order.len();
        let records = &mut self.records;

        self.order.retain(|address| {
            let keep = records
                .get(address)
                .map(|r| !r.connection_state.is_disconnected())
                .unwrap_or(false);
            if !keep {
                records.remove(address);
            }
            keep
        });

        before - self.order.len()
    }

    /// Look up a record.
    pub fn get(&self, address: &PeripheralAddress) -> Option<&PeripheralRecord> {
        self.records.get(address)
    }

    /// Records matching `predicate`, in insertion order.
    pub fn snapshot<F>(&self, predicate: F) -> Vec<PeripheralRecord>
    where
        F: Fn(&PeripheralRecord) -> bool,
    {
        self.order
            .iter()
            .filter_map(|address| self.records.get(address))
            .filter(|record| predicate(record))
            .cloned()
            .collect()
    }

    /// Remove a disconnected record.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PeripheralNotFound`] if the address is unknown and
    /// [`Error::StillConnected`] if the record is not disconnected.
    pub fn remove(&mut self, address: &PeripheralAddress) -> Result<PeripheralRecord> {
        let record = self
            .records
            .get(address)
            .ok_or_else(|| Error::PeripheralNotFound {
                address: address.to_string(),
            })?;

        if !record.connection_state.is_disconnected() {
            return Err(Error::StillConnected {
                address: address.to_string(),
            });
        }

        self.order.retain(|a| a != address);
        self.records.remove(address).ok_or_else(|| Error::PeripheralNotFound {
            address: address.to_string(),
        })
    }

    /// Ensure a record exists for `address`, creating an empty one if needed.
    pub fn register(&mut self, address: PeripheralAddress) -> &PeripheralRecord {
        if !self.records.contains_key(&address) {
            self.order.push(address);
        }
        self.records
            .entry(address)
            .or_insert_with(|| PeripheralRecord::new(address))
    }

    /// Update the connection state of a known record.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PeripheralNotFound`] if the address is unknown.
    pub fn set_connection_state(
        &mut self,
        address: &PeripheralAddress,
        state: ConnectionState,
    ) -> Result<()> {
        let record = self.get_mut(address)?;
        record.connection_state = state;
        Ok(())
    }

    /// Merge services learned for a known record.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PeripheralNotFound`] if the address is unknown.
    pub fn add_services(
        &mut self,
        address: &PeripheralAddress,
        services: impl IntoIterator<Item = Uuid>,
    ) -> Result<()> {
        self.get_mut(address)?.services.extend(services);
        Ok(())
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    fn get_mut(&mut self, address: &PeripheralAddress) -> Result<&mut PeripheralRecord> {
        self.records
            .get_mut(address)
            .ok_or_else(|| Error::PeripheralNotFound {
                address: address.to_string(),
            })
    }
}
