//! Core data types for the AquaMapper sensor import service.
//!
//! This module defines the shared domain model imported by all other
//! modules: the raw input row, the persisted reading document with its
//! point geometry, and the error type every fallible operation returns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Reading invariants
// ---------------------------------------------------------------------------

/// Lowest and highest water level a reading may carry, in metres.
pub const WATER_LEVEL_RANGE_M: (f64, f64) = (1.0, 10.0);

/// Lowest and highest pH a reading may carry.
pub const PH_RANGE: (f64, f64) = (6.5, 8.5);

// ---------------------------------------------------------------------------
// Input rows
// ---------------------------------------------------------------------------

/// One row of the tabular sensor source, after column extraction.
///
/// Only lives for the duration of one import pass. `rainfall_mm` is kept as
/// the raw cell text because the simulator owns the "missing or invalid
/// means zero" rule.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    pub station_id: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub rainfall_mm: Option<String>,
    /// `None` when the source cell could not be parsed as a date/time.
    pub timestamp: Option<DateTime<Utc>>,
}

impl RawRow {
    /// Convenience constructor used by tests and fixtures.
    pub fn new(station_id: &str, rainfall_mm: &str, timestamp: Option<DateTime<Utc>>) -> Self {
        RawRow {
            station_id: station_id.to_string(),
            latitude: None,
            longitude: None,
            rainfall_mm: Some(rainfall_mm.to_string()),
            timestamp,
        }
    }
}

// ---------------------------------------------------------------------------
// Geometry
// ---------------------------------------------------------------------------

/// GeoJSON geometry discriminator. Only points are ever produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GeometryType {
    Point,
}

/// A GeoJSON point. Coordinates are always `[longitude, latitude]`; the
/// fields are private so the order cannot be swapped by a caller.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointGeometry {
    #[serde(rename = "type")]
    kind: GeometryType,
    coordinates: [f64; 2],
}

impl PointGeometry {
    pub fn new(longitude: f64, latitude: f64) -> Self {
        PointGeometry {
            kind: GeometryType::Point,
            coordinates: [longitude, latitude],
        }
    }

    pub fn kind(&self) -> GeometryType {
        self.kind
    }

    /// `[longitude, latitude]`, the order the geospatial index expects.
    pub fn coordinates(&self) -> [f64; 2] {
        self.coordinates
    }

    pub fn longitude(&self) -> f64 {
        self.coordinates[0]
    }

    pub fn latitude(&self) -> f64 {
        self.coordinates[1]
    }
}

// ---------------------------------------------------------------------------
// Persisted reading
// ---------------------------------------------------------------------------

/// The persisted water-quality document.
///
/// Invariants (enforced by the simulator, re-checked by the stores):
///   1.0 <= water_level_m <= 10.0
///   rainfall_mm >= 0
///   6.5 <= ph_level <= 8.5
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulatedReading {
    pub station_id: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub water_level_m: f64,
    pub rainfall_mm: f64,
    pub ph_level: f64,
    pub location: PointGeometry,
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that end an import run, plus the registry invariant violation the
/// geo formatter reports.
#[derive(Error, Debug)]
pub enum ImportError {
    /// The input file does not exist.
    #[error("Source not found: {}", path.display())]
    SourceNotFound { path: PathBuf },

    /// The input file exists but could not be opened or read.
    #[error("Source unreadable: {}: {source}", path.display())]
    SourceUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The input could be opened but is not well-formed CSV.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// The datastore could not be reached at connect time.
    #[error("Datastore unreachable: {reason}")]
    DatastoreUnreachable { reason: String },

    /// A statement failed after the connection was established.
    #[error("Database error: {0}")]
    Database(#[from] postgres::Error),

    /// Invalid configuration file, station table or simulation parameters.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// A reading was formatted for a station the registry does not know.
    #[error("Station not registered: {0}")]
    UnregisteredStation(String),
}

impl ImportError {
    pub fn config(message: impl Into<String>) -> Self {
        ImportError::Config {
            message: message.into(),
        }
    }

    /// True for the "input source missing" kind, which the binary reports
    /// with its own message.
    pub fn is_source_not_found(&self) -> bool {
        matches!(self, ImportError::SourceNotFound { .. })
    }
}
