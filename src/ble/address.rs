//! Peripheral addresses.
//!
//! The registry is keyed by the radio-hardware address of each peripheral.
//! Addresses are validated and canonicalized to upper case on the way in so
//! "aa:bb:cc:dd:ee:ff" and "AA:BB:CC:DD:EE:FF" name the same record.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// A canonical 48-bit Bluetooth device address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeripheralAddress([u8; 6]);

impl PeripheralAddress {
    /// Create an address from its raw octets, most significant first.
    pub const fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    /// Parse an address of the form `XX:XX:XX:XX:XX:XX` (any case).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAddress`] if the string is not a valid address.
    pub fn parse(value: &str) -> Result<Self> {
        let invalid = || Error::InvalidAddress {
            address: value.to_string(),
        };

        let mut octets = [0u8; 6];
        let mut parts = value.split(':');

        for octet in octets.iter_mut() {
            let part = parts.next().ok_or_else(invalid)?;
            if part.len() != 2 || !part.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(invalid());
            }
            *octet = u8::from_str_radix(part, 16).map_err(|_| invalid())?;
        }

        if parts.next().is_some() {
            return Err(invalid());
        }

        Ok(Self(octets))
    }

    /// Get the raw octets.
    pub fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl FromStr for PeripheralAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl From<[u8; 6]> for PeripheralAddress {
    fn from(octets: [u8; 6]) -> Self {
        Self(octets)
    }
}

impl fmt::Display for PeripheralAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            a, b, c, d, e, g
        )
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for PeripheralAddress {
    fn serialize<S: serde::Serializer>(
        &self,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for PeripheralAddress {
    fn deserialize<D: serde::Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Self::parse(&value).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_canonicalizes_case() {
        let lower = PeripheralAddress::parse("aa:bb:cc:dd:ee:ff").unwrap();
        let upper = PeripheralAddress::parse("AA:BB:CC:DD:EE:FF").unwrap();
        assert_eq!(lower, upper);
        assert_eq!(lower.to_string(), "AA:BB:CC:DD:EE:FF");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for bad in [
            "",
            "AA:BB:CC:DD:EE",
            "AA:BB:CC:DD:EE:FF:00",
            "AA-BB-CC-DD-EE-FF",
            "AA:BB:CC:DD:EE:FG",
            "A:BB:CC:DD:EE:FF0",
            "+A:BB:CC:DD:EE:FF",
        ] {
            assert!(
                matches!(PeripheralAddress::parse(bad), Err(Error::InvalidAddress { .. })),
                "accepted {:?}",
                bad
            );
        }
    }

    #[test]
    fn test_from_octets() {
        let address = PeripheralAddress::from([0x01, 0x02, 0x03, 0x0a, 0x0b, 0x0c]);
        assert_eq!(address.to_string(), "01:02:03:0A:0B:0C");
        assert_eq!("01:02:03:0a:0b:0c".parse::<PeripheralAddress>().unwrap(), address);
    }
}
