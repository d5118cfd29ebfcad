//! Station registry for the AquaMapper sensor import service.
//!
//! Maps sensor station identifiers to their WGS84 coordinates. The table is
//! loaded once at startup from a TOML file (`stations.toml`) and passed
//! explicitly to everything that needs it; nothing else in the crate should
//! hardcode station identifiers or coordinates.
//!
//! The registry also acts as the record filter: rows for stations outside
//! the simulated deployment are dropped here, silently and in order.

use crate::model::{ImportError, RawRow};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;

// ---------------------------------------------------------------------------
// Station metadata
// ---------------------------------------------------------------------------

/// Metadata for a single sensor station.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Station {
    /// Unique identifier, matched against the `sensor_id` input column.
    pub station_id: String,
    /// Human-readable name. Optional in the TOML file.
    #[serde(default)]
    pub name: String,
    /// WGS84 latitude.
    pub latitude: f64,
    /// WGS84 longitude.
    pub longitude: f64,
}

#[derive(Debug, Deserialize)]
struct StationFile {
    stations: Vec<Station>,
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Immutable lookup table from station identifier to station metadata.
#[derive(Debug, Clone, Default)]
pub struct StationRegistry {
    stations: HashMap<String, Station>,
}

impl StationRegistry {
    /// Builds a registry, rejecting duplicate identifiers and coordinates
    /// outside the WGS84 range.
    pub fn from_stations(stations: Vec<Station>) -> Result<Self, ImportError> {
        let mut seen = HashSet::new();
        for station in &stations {
            if station.station_id.trim().is_empty() {
                return Err(ImportError::config("station with empty station_id"));
            }
            if !seen.insert(station.station_id.as_str()) {
                return Err(ImportError::config(format!(
                    "duplicate station_id '{}'",
                    station.station_id
                )));
            }
            if !(-90.0..=90.0).contains(&station.latitude) {
                return Err(ImportError::config(format!(
                    "latitude {} out of range for '{}'",
                    station.latitude, station.station_id
                )));
            }
            if !(-180.0..=180.0).contains(&station.longitude) {
                return Err(ImportError::config(format!(
                    "longitude {} out of range for '{}'",
                    station.longitude, station.station_id
                )));
            }
        }

        Ok(StationRegistry {
            stations: stations
                .into_iter()
                .map(|s| (s.station_id.clone(), s))
                .collect(),
        })
    }

    /// Parses a `[[stations]]` TOML document.
    pub fn from_toml_str(contents: &str) -> Result<Self, ImportError> {
        let file: StationFile = toml::from_str(contents)
            .map_err(|e| ImportError::config(format!("invalid station table: {}", e)))?;
        Self::from_stations(file.stations)
    }

    /// Coordinates for a station as `(longitude, latitude)`.
    ///
    /// Returns `None` for an unknown identifier; that is an expected
    /// filtering condition, not an error.
    pub fn lookup(&self, station_id: &str) -> Option<(f64, f64)> {
        self.stations
            .get(station_id)
            .map(|s| (s.longitude, s.latitude))
    }

    /// Looks up full station metadata. Returns `None` if not found.
    pub fn find_station(&self, station_id: &str) -> Option<&Station> {
        self.stations.get(station_id)
    }

    pub fn contains(&self, station_id: &str) -> bool {
        self.stations.contains_key(station_id)
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }

    /// All registered identifiers, sorted for stable output.
    pub fn all_station_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.stations.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Keeps only rows whose station is registered, preserving input order.
    pub fn filter_rows<I>(&self, rows: I) -> Vec<RawRow>
    where
        I: IntoIterator<Item = RawRow>,
    {
        rows.into_iter()
            .filter(|row| self.contains(&row.station_id))
            .collect()
    }
}

/// Loads the station table from a TOML file.
pub fn load_stations(path: impl AsRef<Path>) -> Result<StationRegistry, ImportError> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path).map_err(|e| {
        ImportError::config(format!("cannot read station file {}: {}", path.display(), e))
    })?;
    StationRegistry::from_toml_str(&contents)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
