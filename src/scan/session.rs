//! Scan requests and sessions.
//!
//! A [`ScanRequest`] is what a caller asks for. A [`ScanSession`] is that
//! request stamped with the generation id the controller assigned when it
//! became current.

use std::time::Duration;
use uuid::Uuid;

use crate::ble::uuids::parse_uuid;
use crate::error::{Error, Result};

/// Hardware scan mode (power/latency trade-off).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ScanMode {
    /// Only receive results from scans started by other applications.
    Opportunistic,
    /// Lowest duty cycle.
    #[default]
    LowPower,
    /// Balanced duty cycle.
    Balanced,
    /// Continuous scanning.
    LowLatency,
}

impl ScanMode {
    /// Create from the raw platform value.
    pub fn from_raw(value: i32) -> Result<Self> {
        match value {
            -1 => Ok(Self::Opportunistic),
            0 => Ok(Self::LowPower),
            1 => Ok(Self::Balanced),
            2 => Ok(Self::LowLatency),
            other => Err(Error::invalid_parameter("scan_mode", other)),
        }
    }

    /// Get the raw platform value.
    pub fn to_raw(self) -> i32 {
        match self {
            Self::Opportunistic => -1,
            Self::LowPower => 0,
            Self::Balanced => 1,
            Self::LowLatency => 2,
        }
    }
}

/// How aggressively the hardware matches advertisements against filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum MatchMode {
    /// Report on few sightings, even with weak signal.
    #[default]
    Aggressive,
    /// Require more sightings and stronger signal before reporting.
    Sticky,
}

impl MatchMode {
    /// Create from the raw platform value.
    pub fn from_raw(value: i32) -> Result<Self> {
        match value {
            1 => Ok(Self::Aggressive),
            2 => Ok(Self::Sticky),
            other => Err(Error::invalid_parameter("match_mode", other)),
        }
    }

    /// Get the raw platform value.
    pub fn to_raw(self) -> i32 {
        match self {
            Self::Aggressive => 1,
            Self::Sticky => 2,
        }
    }
}

/// How many advertisements per filter the hardware tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum MatchCount {
    /// One advertisement per filter.
    One,
    /// A few advertisements per filter.
    Few,
    /// As many as the hardware allows.
    #[default]
    Max,
}

impl MatchCount {
    /// Create from the raw platform value.
    pub fn from_raw(value: i32) -> Result<Self> {
        match value {
            1 => Ok(Self::One),
            2 => Ok(Self::Few),
            3 => Ok(Self::Max),
            other => Err(Error::invalid_parameter("number_of_matches", other)),
        }
    }

    /// Get the raw platform value.
    pub fn to_raw(self) -> i32 {
        match self {
            Self::One => 1,
            Self::Few => 2,
            Self::Max => 3,
        }
    }
}

/// Hardware tuning options. Only the modern controller applies them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ScanOptions {
    /// Scan duty cycle.
    pub scan_mode: ScanMode,
    /// Number of matches tracked per filter.
    pub number_of_matches: MatchCount,
    /// Match aggressiveness.
    pub match_mode: MatchMode,
}

impl ScanOptions {
    /// Create options with platform defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the scan mode.
    pub fn scan_mode(mut self, mode: ScanMode) -> Self {
        self.scan_mode = mode;
        self
    }

    /// Set the number of matches.
    pub fn number_of_matches(mut self, count: MatchCount) -> Self {
        self.number_of_matches = count;
        self
    }

    /// Set the match mode.
    pub fn match_mode(mut self, mode: MatchMode) -> Self {
        self.match_mode = mode;
        self
    }

    /// Check if every option is at its default.
    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }
}

/// Parameters of one discovery request.
///
/// Requests are immutable snapshots once handed to a controller; the modern
/// controller replays the last one verbatim after adapter recovery.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ScanRequest {
    /// Service filters; empty matches every peripheral.
    pub services: Vec<Uuid>,
    /// How long to scan. Zero scans until stopped.
    pub duration: Duration,
    /// Report every advertisement instead of one per peripheral.
    pub allow_duplicates: bool,
    /// Hardware tuning.
    pub options: ScanOptions,
}

impl ScanRequest {
    /// Create an unbounded, unfiltered request.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the service filters, dropping duplicates.
    pub fn services(mut self, services: impl IntoIterator<Item = Uuid>) -> Self {
        self.services.clear();
        for uuid in services {
            if !self.services.contains(&uuid) {
                self.services.push(uuid);
            }
        }
        self
    }

    /// Set the service filters from short or full UUID strings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] for any unparseable UUID.
    pub fn service_strings<S: AsRef<str>>(self, services: &[S]) -> Result<Self> {
        let uuids = services
            .iter()
            .map(|s| parse_uuid(s.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Ok(self.services(uuids))
    }

    /// Set the scan duration.
    pub fn duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Set the scan duration in seconds.
    pub fn duration_secs(self, secs: u64) -> Self {
        self.duration(Duration::from_secs(secs))
    }

    /// Set whether duplicate advertisements are reported.
    pub fn allow_duplicates(mut self, allow: bool) -> Self {
        self.allow_duplicates = allow;
        self
    }

    /// Set the hardware tuning options.
    pub fn options(mut self, options: ScanOptions) -> Self {
        self.options = options;
        self
    }

    /// Check if the scan stops on its own.
    pub fn is_bounded(&self) -> bool {
        !self.duration.is_zero()
    }
}

/// A scan request that has become the controller's current session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanSession {
    generation: u64,
    request: ScanRequest,
}

impl ScanSession {
    pub(crate) fn new(generation: u64, request: ScanRequest) -> Self {
        Self {
            generation,
            request,
        }
    }

    /// The generation id assigned to this session.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The request this session was started with.
    pub fn request(&self) -> &ScanRequest {
        &self.request
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble::uuids::{BATTERY_SERVICE_UUID, HEART_RATE_SERVICE_UUID};

    #[test]
    fn test_raw_values() {
        assert_eq!(ScanMode::from_raw(1).unwrap(), ScanMode::Balanced);
        assert_eq!(ScanMode::Opportunistic.to_raw(), -1);
        assert!(ScanMode::from_raw(3).is_err());

        assert_eq!(MatchMode::from_raw(2).unwrap(), MatchMode::Sticky);
        assert!(MatchMode::from_raw(0).is_err());

        assert_eq!(MatchCount::from_raw(3).unwrap(), MatchCount::Max);
        assert_eq!(MatchCount::Few.to_raw(), 2);
        assert!(matches!(
            MatchCount::from_raw(9),
            Err(Error::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_default_options() {
        let options = ScanOptions::default();
        assert_eq!(options.scan_mode, ScanMode::LowPower);
        assert_eq!(options.number_of_matches, MatchCount::Max);
        assert_eq!(options.match_mode, MatchMode::Aggressive);
        assert!(options.is_default());
        assert!(!options.scan_mode(ScanMode::Balanced).is_default());
    }

    #[test]
    fn test_request_builder() {
        let request = ScanRequest::new()
            .service_strings(&["180D", "180f", "180D"])
            .unwrap()
            .duration_secs(5)
            .allow_duplicates(true);

        assert_eq!(
            request.services,
            vec![HEART_RATE_SERVICE_UUID, BATTERY_SERVICE_UUID]
        );
        assert_eq!(request.duration, Duration::from_secs(5));
        assert!(request.is_bounded());
        assert!(request.allow_duplicates);
        assert!(!ScanRequest::new().is_bounded());
    }

    #[test]
    fn test_request_rejects_bad_uuid() {
        assert!(ScanRequest::new().service_strings(&["nope"]).is_err());
    }
}
