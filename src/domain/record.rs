// Persisted test and ripple records
use super::adapter::{AdapterProfile, Band};
use super::phase::OppTrip;
use super::sample::LoadCommand;
use super::settings::TestSettings;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvaluatedTrip {
    #[serde(flatten)]
    pub trip: OppTrip,
    pub within_spec: bool,
}

/// One row of the persisted measurement table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MeasurementRow {
    pub voltage_bottom_bound: Option<f64>,
    pub voltage: f64,
    pub voltage_top_bound: Option<f64>,
    pub current: f64,
    pub load: LoadCommand,
    pub time_sec: f64,
    pub phase: u8,
}

/// Phase 1/2 sample that left its current or voltage band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OutOfBandSample {
    pub index: usize,
    pub voltage: f64,
    pub current: f64,
    pub load_percent: f64,
    pub expected_voltage: Band,
    pub expected_current: Band,
}

/// The part of a test record kept in memory after it is persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestSummary {
    pub test_id: String,
    pub phase1_pass: bool,
    pub phase2_pass: bool,
    pub phase3_pass: bool,
    pub short_circuit_pass: bool,
    pub valid: bool,
    pub opp_trips: Vec<EvaluatedTrip>,
}

impl TestSummary {
    pub fn passed(&self) -> bool {
        self.phase1_pass && self.phase2_pass && self.phase3_pass && self.short_circuit_pass
    }

    /// Human-readable result line for the message feed.
    pub fn result_line(&self) -> String {
        let verdict = |pass: bool| if pass { "PASS" } else { "FAIL" };
        let loads: Vec<String> = self
            .opp_trips
            .iter()
            .map(|t| format!("{:.0}%", t.trip.load_percent))
            .collect();
        format!(
            "{}: phase 1 {}, phase 2 {}, phase 3 {}, short circuit {}, {}; OPP trips [{}]",
            self.test_id,
            verdict(self.phase1_pass),
            verdict(self.phase2_pass),
            verdict(self.phase3_pass),
            verdict(self.short_circuit_pass),
            if self.valid { "VALID" } else { "INVALID" },
            loads.join(", ")
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestRecord {
    #[serde(flatten)]
    pub summary: TestSummary,
    pub date: DateTime<Local>,
    pub adapter: AdapterProfile,
    pub settings: TestSettings,
    pub out_of_band: Vec<OutOfBandSample>,
    pub rows: Vec<MeasurementRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RippleRecord {
    pub test_id: String,
    pub date: DateTime<Local>,
    pub expected_voltage: f64,
    pub tolerance_percent: f64,
    pub duration_secs: u32,
    pub pass: bool,
    pub bottom_limit: f64,
    pub top_limit: f64,
    pub bottom_quartile: f64,
    pub top_quartile: f64,
    pub min_voltage: f64,
    pub max_voltage: f64,
    pub mean_voltage: f64,
    pub out_of_band: Vec<usize>,
    pub samples: Vec<f64>,
}

/// Catalogue entry for a persisted record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordEntry {
    pub test_id: String,
    pub date: DateTime<Local>,
    pub pass: bool,
}
