//! Sequential metric simulator.
//!
//! Turns accepted input rows into simulated water level and pH values, one
//! output per row, strictly in input order. The water level carries forward
//! from one row to the next; pH does not.
//!
//! The carried level is scoped by [`StateScope`]: one value per station
//! (default), or a single value threaded through the whole row stream to
//! reproduce the legacy importer.
//!
//! Noise comes from the `Rng` the simulator owns. Seed it with
//! [`Simulator::seeded`] to get a reproducible run.
//!
//! Submodules:
//! - `metrics`: the stateless per-row formulas.

pub mod metrics;

use crate::config::{SimulationParams, StateScope};
use crate::model::{ImportError, RawRow};
use chrono::{DateTime, Utc};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::HashMap;

pub use metrics::{compute_ph, next_level, parse_rainfall, round2};

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// Simulated values for one row, already rounded for persistence.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatedValue {
    pub station_id: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub water_level_m: f64,
    pub rainfall_mm: f64,
    pub ph_level: f64,
}

// ---------------------------------------------------------------------------
// Carried state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum LevelState {
    Shared(f64),
    PerStation(HashMap<String, f64>),
}

impl LevelState {
    fn new(scope: StateScope, initial: f64) -> Self {
        match scope {
            StateScope::Shared => LevelState::Shared(initial),
            StateScope::PerStation => LevelState::PerStation(HashMap::new()),
        }
    }

    fn get(&self, station_id: &str, initial: f64) -> f64 {
        match self {
            LevelState::Shared(level) => *level,
            LevelState::PerStation(levels) => levels.get(station_id).copied().unwrap_or(initial),
        }
    }

    fn set(&mut self, station_id: &str, level: f64) {
        match self {
            LevelState::Shared(current) => *current = level,
            LevelState::PerStation(levels) => {
                if let Some(current) = levels.get_mut(station_id) {
                    *current = level;
                } else {
                    levels.insert(station_id.to_string(), level);
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Simulator
// ---------------------------------------------------------------------------

/// One simulator per import run. Takes `&mut self` per row, so two runs
/// can never interleave against the same state.
pub struct Simulator<R = ChaCha8Rng> {
    params: SimulationParams,
    scope: StateScope,
    state: LevelState,
    rng: R,
    rows_processed: usize,
}

impl Simulator<ChaCha8Rng> {
    /// ChaCha8-backed simulator. `Some(seed)` gives a reproducible run,
    /// `None` seeds from the OS.
    pub fn seeded(
        params: SimulationParams,
        scope: StateScope,
        seed: Option<u64>,
    ) -> Result<Self, ImportError> {
        let rng = match seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        Self::with_rng(params, scope, rng)
    }
}

impl<R: Rng> Simulator<R> {
    pub fn with_rng(params: SimulationParams, scope: StateScope, rng: R) -> Result<Self, ImportError> {
        params.validate()?;
        Ok(Simulator {
            state: LevelState::new(scope, params.initial_level_m),
            params,
            scope,
            rng,
            rows_processed: 0,
        })
    }

    pub fn scope(&self) -> StateScope {
        self.scope
    }

    pub fn rows_processed(&self) -> usize {
        self.rows_processed
    }

    /// Unrounded carried level that the next row for `station_id` will
    /// start from.
    pub fn current_level(&self, station_id: &str) -> f64 {
        self.state.get(station_id, self.params.initial_level_m)
    }

    /// Simulates one row and advances the carried level.
    pub fn step(&mut self, row: &RawRow) -> SimulatedValue {
        let rainfall = parse_rainfall(row.rainfall_mm.as_deref());

        let level_noise = uniform(&mut self.rng, self.params.level_noise_m);
        let previous = self.current_level(&row.station_id);
        let level = next_level(&self.params, previous, rainfall, level_noise);
        self.state.set(&row.station_id, level);

        let ph_noise = uniform(&mut self.rng, self.params.ph_noise);
        let ph = compute_ph(&self.params, rainfall, ph_noise);

        self.rows_processed += 1;
        tracing::trace!(
            station = %row.station_id,
            previous,
            level,
            ph,
            "simulated row"
        );

        SimulatedValue {
            station_id: row.station_id.clone(),
            timestamp: row.timestamp,
            water_level_m: round2(level),
            rainfall_mm: round2(rainfall),
            ph_level: round2(ph),
        }
    }

    /// Simulates every row in order.
    pub fn run(&mut self, rows: &[RawRow]) -> Vec<SimulatedValue> {
        rows.iter().map(|row| self.step(row)).collect()
    }
}

/// Uniform sample in `[-amplitude, amplitude]`. A zero amplitude draws
/// nothing from the generator.
fn uniform<R: Rng>(rng: &mut R, amplitude: f64) -> f64 {
    if amplitude == 0.0 {
        0.0
    } else {
        rng.gen_range(-amplitude..=amplitude)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
