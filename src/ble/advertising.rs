//! Advertisement payload encoding and parsing.
//!
//! A raw advertisement is a sequence of AD structures, each laid out as
//! `[length, type, data...]` where `length` counts the type byte and data.
//! Radios that only expose parsed advertisement properties use
//! [`AdvertisementBuilder`] to rebuild an equivalent raw payload.

use bytes::{BufMut, Bytes, BytesMut};
use std::collections::HashMap;
use uuid::Uuid;

use crate::ble::uuids;
use crate::error::{Error, Result};

/// AD type: complete list of 16-bit service UUIDs.
pub const AD_TYPE_SERVICES_16: u8 = 0x03;
/// AD type: complete list of 128-bit service UUIDs.
pub const AD_TYPE_SERVICES_128: u8 = 0x07;
/// AD type: complete local name.
pub const AD_TYPE_COMPLETE_LOCAL_NAME: u8 = 0x09;
/// AD type: service data with a 16-bit UUID.
pub const AD_TYPE_SERVICE_DATA_16: u8 = 0x16;
/// AD type: service data with a 128-bit UUID.
pub const AD_TYPE_SERVICE_DATA_128: u8 = 0x21;
/// AD type: manufacturer specific data.
pub const AD_TYPE_MANUFACTURER_DATA: u8 = 0xFF;

/// A single AD structure from an advertisement payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdStructure {
    /// The AD type byte.
    pub ad_type: u8,
    /// The structure payload, excluding length and type.
    pub data: Bytes,
}

/// Split a raw advertisement payload into its AD structures.
///
/// A zero length byte terminates the significant part of the payload.
///
/// # Errors
///
/// Returns [`Error::InvalidData`] if a structure runs past the end of the payload.
pub fn parse_ad_structures(payload: &[u8]) -> Result<Vec<AdStructure>> {
    let mut structures = Vec::new();
    let mut offset = 0;

    while offset < payload.len() {
        let length = payload[offset] as usize;
        if length == 0 {
            break;
        }

        let end = offset + 1 + length;
        if end > payload.len() {
            return Err(Error::InvalidData {
                context: format!(
                    "AD structure at offset {} needs {} bytes, {} available",
                    offset,
                    length,
                    payload.len() - offset - 1
                ),
            });
        }

        structures.push(AdStructure {
            ad_type: payload[offset + 1],
            data: Bytes::copy_from_slice(&payload[offset + 2..end]),
        });
        offset = end;
    }

    Ok(structures)
}

/// Extract the local name from a raw advertisement payload, if present.
pub fn local_name(payload: &[u8]) -> Option<String> {
    parse_ad_structures(payload)
        .ok()?
        .into_iter()
        .find(|s| s.ad_type == AD_TYPE_COMPLETE_LOCAL_NAME)
        .map(|s| String::from_utf8_lossy(&s.data).into_owned())
}

/// Builder for raw advertisement payloads.
#[derive(Debug, Default)]
pub struct AdvertisementBuilder {
    buf: BytesMut,
}

impl AdvertisementBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a raw AD structure. Data longer than 254 bytes is truncated.
    pub fn structure(mut self, ad_type: u8, data: &[u8]) -> Self {
        let data = &data[..data.len().min(254)];
        self.buf.put_u8(data.len() as u8 + 1);
        self.buf.put_u8(ad_type);
        self.buf.put_slice(data);
        self
    }

    /// Append the complete local name.
    pub fn local_name(self, name: &str) -> Self {
        self.structure(AD_TYPE_COMPLETE_LOCAL_NAME, name.as_bytes())
    }

    /// Append service UUID lists, split into 16-bit and 128-bit structures.
    pub fn services(mut self, services: &[Uuid]) -> Self {
        let mut short = Vec::new();
        let mut long = Vec::new();

        for uuid in services {
            match short_uuid(uuid) {
                Some(value) => short.extend_from_slice(&value.to_le_bytes()),
                None => long.extend(uuid.as_bytes().iter().rev()),
            }
        }

        if !short.is_empty() {
            self = self.structure(AD_TYPE_SERVICES_16, &short);
        }
        if !long.is_empty() {
            self = self.structure(AD_TYPE_SERVICES_128, &long);
        }
        self
    }

    /// Append manufacturer specific data for a company identifier.
    pub fn manufacturer_data(self, company_id: u16, data: &[u8]) -> Self {
        let mut body = Vec::with_capacity(data.len() + 2);
        body.extend_from_slice(&company_id.to_le_bytes());
        body.extend_from_slice(data);
        self.structure(AD_TYPE_MANUFACTURER_DATA, &body)
    }

    /// Append service data for a service UUID.
    pub fn service_data(self, uuid: &Uuid, data: &[u8]) -> Self {
        let mut body = Vec::with_capacity(data.len() + 16);
        let ad_type = match short_uuid(uuid) {
            Some(value) => {
                body.extend_from_slice(&value.to_le_bytes());
                AD_TYPE_SERVICE_DATA_16
            }
            None => {
                body.extend(uuid.as_bytes().iter().rev());
                AD_TYPE_SERVICE_DATA_128
            }
        };
        body.extend_from_slice(data);
        self.structure(ad_type, &body)
    }

    /// Append every manufacturer data entry, ordered by company identifier.
    pub fn manufacturer_map(mut self, entries: &HashMap<u16, Vec<u8>>) -> Self {
        let mut ids: Vec<_> = entries.keys().copied().collect();
        ids.sort_unstable();
        for id in ids {
            self = self.manufacturer_data(id, &entries[&id]);
        }
        self
    }

    /// Append every service data entry, ordered by UUID.
    pub fn service_data_map(mut self, entries: &HashMap<Uuid, Vec<u8>>) -> Self {
        let mut uuids: Vec<_> = entries.keys().copied().collect();
        uuids.sort_unstable();
        for uuid in uuids {
            self = self.service_data(&uuid, &entries[&uuid]);
        }
        self
    }

    /// Finish the payload.
    pub fn build(self) -> Bytes {
        self.buf.freeze()
    }
}

fn short_uuid(uuid: &Uuid) -> Option<u16> {
    if !uuids::is_base_derived(uuid) {
        return None;
    }
    u16::try_from(uuid.as_u128() >> 96).ok()
}
