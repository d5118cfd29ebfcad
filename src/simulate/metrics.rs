//! Pure per-row metric functions.
//!
//! Nothing here holds state or draws randomness; the caller passes the
//! carried level and the noise samples in. That keeps every formula
//! checkable with exact inputs.

use crate::config::SimulationParams;

/// Parses a rainfall cell in millimetres.
///
/// Missing, blank, non-numeric, non-finite and negative values all degrade
/// to 0. Never fails.
pub fn parse_rainfall(raw: Option<&str>) -> f64 {
    raw.and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite() && *v > 0.0)
        .unwrap_or(0.0)
}

/// Next water level from the carried level, clamped to the configured
/// bounds. `noise` is the already-drawn perturbation.
pub fn next_level(params: &SimulationParams, previous_m: f64, rainfall_mm: f64, noise: f64) -> f64 {
    let rain_influence = rainfall_mm * params.rain_influence_factor;
    let candidate = previous_m + rain_influence - params.decline_rate_m + noise;
    candidate.clamp(params.level_min_m, params.level_max_m)
}

/// pH for one row. Depends only on this row's rainfall; heavy rain
/// (strictly above the threshold) acidifies proportionally.
pub fn compute_ph(params: &SimulationParams, rainfall_mm: f64, noise: f64) -> f64 {
    let rain_effect = if rainfall_mm > params.ph_rain_threshold_mm {
        (rainfall_mm / params.ph_rain_divisor_mm) * params.ph_rain_factor
    } else {
        0.0
    };
    (params.base_ph + noise + rain_effect).clamp(params.ph_min, params.ph_max)
}

/// Rounds to two decimal places for persistence. Values of 1e15 and above
/// have no fractional digits left and pass through unchanged.
pub fn round2(value: f64) -> f64 {
    if !value.is_finite() || value.abs() >= 1e15 {
        return value;
    }
    (value * 100.0).round() / 100.0
}
