// Ripple test parameters and statistics
use super::adapter::{Band, MAX_ADAPTER_VOLTAGE};
use super::error::ValidationError;
use serde::{Deserialize, Serialize};

pub const MIN_RIPPLE_DURATION_SECS: u32 = 10;
pub const MAX_RIPPLE_DURATION_SECS: u32 = 120;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RippleParameters {
    pub expected_voltage: f64,
    pub tolerance_percent: f64,
    pub duration_secs: u32,
}

impl RippleParameters {
    pub fn new(
        expected_voltage: f64,
        tolerance_percent: f64,
        duration_secs: u32,
    ) -> Result<Self, ValidationError> {
        if !(expected_voltage > 0.0 && expected_voltage <= MAX_ADAPTER_VOLTAGE) {
            return Err(ValidationError::out_of_range(
                "expected voltage",
                "in (0, 15] V",
                expected_voltage,
            ));
        }
        if !(tolerance_percent > 0.0 && tolerance_percent <= 100.0) {
            return Err(ValidationError::out_of_range(
                "tolerance",
                "in (0, 100] %",
                tolerance_percent,
            ));
        }
        if !(MIN_RIPPLE_DURATION_SECS..=MAX_RIPPLE_DURATION_SECS).contains(&duration_secs) {
            return Err(ValidationError::out_of_range(
                "duration",
                "between 10 and 120 s",
                duration_secs as f64,
            ));
        }
        Ok(Self {
            expected_voltage,
            tolerance_percent,
            duration_secs,
        })
    }

    pub fn limits(&self) -> Band {
        Band::around(self.expected_voltage, self.tolerance_percent)
    }

    /// Samples covering the capture window at `samples_per_sec`.
    pub fn sample_count(&self, samples_per_sec: f64) -> usize {
        (self.duration_secs as f64 * samples_per_sec).round() as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RippleStatistics {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub top_quartile: f64,
    pub bottom_quartile: f64,
}

/// Summary statistics of a voltage capture; `None` for an empty capture.
pub fn statistics(voltages: &[f64]) -> Option<RippleStatistics> {
    if voltages.is_empty() {
        return None;
    }
    let mut sorted = voltages.to_vec();
    sorted.sort_by(f64::total_cmp);

    Some(RippleStatistics {
        min: sorted[0],
        max: sorted[sorted.len() - 1],
        mean: sorted.iter().sum::<f64>() / sorted.len() as f64,
        top_quartile: percentile(&sorted, 75.0),
        bottom_quartile: percentile(&sorted, 25.0),
    })
}

/// Linear-interpolated percentile of an ascending, non-empty slice.
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    let rank = (p / 100.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let weight = rank - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * weight
}

/// Indices of samples outside `limits`.
pub fn out_of_band(voltages: &[f64], limits: Band) -> Vec<usize> {
    voltages
        .iter()
        .enumerate()
        .filter(|(_, v)| !limits.contains(**v))
        .map(|(i, _)| i)
        .collect()
}
