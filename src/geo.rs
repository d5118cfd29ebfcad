//! Attaches point geometry to simulated values.
//!
//! Coordinates always come from the station registry, never from the input
//! row, and are emitted longitude first.

use crate::model::{ImportError, PointGeometry, SimulatedReading};
use crate::simulate::SimulatedValue;
use crate::stations::StationRegistry;

/// Builds the persisted document for one simulated value.
///
/// The record filter guarantees every value reaching this point belongs to
/// a registered station. A miss here is an invariant violation and is
/// reported as [`ImportError::UnregisteredStation`] rather than producing a
/// document with made-up coordinates.
pub fn format_reading(
    registry: &StationRegistry,
    value: SimulatedValue,
) -> Result<SimulatedReading, ImportError> {
    let (longitude, latitude) = registry
        .lookup(&value.station_id)
        .ok_or_else(|| ImportError::UnregisteredStation(value.station_id.clone()))?;

    Ok(SimulatedReading {
        location: PointGeometry::new(longitude, latitude),
        station_id: value.station_id,
        timestamp: value.timestamp,
        water_level_m: value.water_level_m,
        rainfall_mm: value.rainfall_mm,
        ph_level: value.ph_level,
    })
}

/// Formats a whole batch, failing on the first unregistered station.
pub fn format_all(
    registry: &StationRegistry,
    values: Vec<SimulatedValue>,
) -> Result<Vec<SimulatedReading>, ImportError> {
    values
        .into_iter()
        .map(|value| format_reading(registry, value))
        .collect()
}
