//! Configuration for the import service.
//!
//! Settings come from an optional TOML file (`aquamapper.toml`) with
//! `[import]`, `[simulation]` and `[logging]` sections. Every field has a
//! default, so an absent file or an empty section is valid. The database
//! URL is never read from this file: it comes from `DATABASE_URL` in the
//! environment (or `.env`).

use crate::model::{ImportError, PH_RANGE, WATER_LEVEL_RANGE_M};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "aquamapper.toml";
pub const DEFAULT_INPUT_FILE: &str = "hyderabad_sensor_data.csv";
pub const DEFAULT_STATIONS_FILE: &str = "stations.toml";

// ---------------------------------------------------------------------------
// State scope
// ---------------------------------------------------------------------------

/// How the simulator scopes the carried water level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum StateScope {
    /// One carried level per station.
    #[default]
    PerStation,
    /// One carried level shared by every row in the run, whatever its
    /// station. Reproduces the legacy importer's output.
    Shared,
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImportSettings {
    pub input: PathBuf,
    pub stations_file: PathBuf,
    pub state_scope: StateScope,
    /// Fixed seed for reproducible noise. `None` seeds from entropy.
    pub seed: Option<u64>,
}

impl Default for ImportSettings {
    fn default() -> Self {
        ImportSettings {
            input: PathBuf::from(DEFAULT_INPUT_FILE),
            stations_file: PathBuf::from(DEFAULT_STATIONS_FILE),
            state_scope: StateScope::default(),
            seed: None,
        }
    }
}

/// Constants of the water-level and pH model.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationParams {
    pub initial_level_m: f64,
    pub rain_influence_factor: f64,
    pub decline_rate_m: f64,
    /// Half-width of the uniform level perturbation.
    pub level_noise_m: f64,
    pub level_min_m: f64,
    pub level_max_m: f64,
    pub base_ph: f64,
    /// Half-width of the uniform pH perturbation.
    pub ph_noise: f64,
    pub ph_rain_threshold_mm: f64,
    pub ph_rain_divisor_mm: f64,
    pub ph_rain_factor: f64,
    pub ph_min: f64,
    pub ph_max: f64,
}

impl Default for SimulationParams {
    fn default() -> Self {
        SimulationParams {
            initial_level_m: 5.0,
            rain_influence_factor: 0.1,
            decline_rate_m: 0.005,
            level_noise_m: 0.01,
            level_min_m: 1.0,
            level_max_m: 10.0,
            base_ph: 7.5,
            ph_noise: 0.05,
            ph_rain_threshold_mm: 5.0,
            ph_rain_divisor_mm: 50.0,
            ph_rain_factor: -0.2,
            ph_min: 6.5,
            ph_max: 8.5,
        }
    }
}

impl SimulationParams {
    /// Same model with both perturbations switched off.
    pub fn without_noise(mut self) -> Self {
        self.level_noise_m = 0.0;
        self.ph_noise = 0.0;
        self
    }

    pub fn validate(&self) -> Result<(), ImportError> {
        let all = [
            self.initial_level_m,
            self.rain_influence_factor,
            self.decline_rate_m,
            self.level_noise_m,
            self.level_min_m,
            self.level_max_m,
            self.base_ph,
            self.ph_noise,
            self.ph_rain_threshold_mm,
            self.ph_rain_divisor_mm,
            self.ph_rain_factor,
            self.ph_min,
            self.ph_max,
        ];
        if all.iter().any(|v| !v.is_finite()) {
            return Err(ImportError::config("simulation parameters must be finite"));
        }
        if self.level_min_m >= self.level_max_m {
            return Err(ImportError::config("level_min_m must be below level_max_m"));
        }
        if self.level_min_m < WATER_LEVEL_RANGE_M.0 || self.level_max_m > WATER_LEVEL_RANGE_M.1 {
            return Err(ImportError::config(format!(
                "level bounds must lie within {:?} m",
                WATER_LEVEL_RANGE_M
            )));
        }
        if self.ph_min >= self.ph_max {
            return Err(ImportError::config("ph_min must be below ph_max"));
        }
        if self.ph_min < PH_RANGE.0 || self.ph_max > PH_RANGE.1 {
            return Err(ImportError::config(format!("pH bounds must lie within {:?}", PH_RANGE)));
        }
        if self.level_noise_m < 0.0 || self.ph_noise < 0.0 {
            return Err(ImportError::config("noise amplitudes must not be negative"));
        }
        if self.ph_rain_divisor_mm <= 0.0 {
            return Err(ImportError::config("ph_rain_divisor_mm must be positive"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSettings {
    /// `trace`, `debug`, `info`, `warn` or `error`.
    pub level: String,
    /// Append-only log file in addition to the console.
    pub file: Option<PathBuf>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        LoggingSettings {
            level: "info".to_string(),
            file: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub import: ImportSettings,
    pub simulation: SimulationParams,
    pub logging: LoggingSettings,
}

impl Config {
    pub fn from_toml_str(contents: &str) -> Result<Self, ImportError> {
        let config: Config = toml::from_str(contents)
            .map_err(|e| ImportError::config(format!("invalid config file: {}", e)))?;
        config.simulation.validate()?;
        Ok(config)
    }

    /// Reads the config file. A missing file at the default location falls
    /// back to defaults; a missing file the user named explicitly is an
    /// error.
    pub fn load(path: Option<&Path>) -> Result<Self, ImportError> {
        let (path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
        };

        match std::fs::read_to_string(&path) {
            Ok(contents) => Self::from_toml_str(&contents),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !explicit => Ok(Config::default()),
            Err(e) => Err(ImportError::config(format!(
                "cannot read config file {}: {}",
                path.display(),
                e
            ))),
        }
    }
}

/// Reads `DATABASE_URL`, loading `.env` first if present.
pub fn database_url() -> Result<String, ImportError> {
    dotenv::dotenv().ok();
    std::env::var("DATABASE_URL")
        .map_err(|_| ImportError::config("DATABASE_URL must be set (environment or .env)"))
}
