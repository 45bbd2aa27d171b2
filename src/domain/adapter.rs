// Adapter profile domain model
use super::error::ValidationError;
use serde::{Deserialize, Serialize};

/// Highest current the electronic load is rated for.
pub const MAX_ADAPTER_CURRENT: f64 = 3.2;
/// Highest adapter voltage the sensor front end accepts.
pub const MAX_ADAPTER_VOLTAGE: f64 = 15.0;
pub const OPP_LIMIT_MIN: u32 = 100;
pub const OPP_LIMIT_MAX: u32 = 250;
/// Current band half-width, in load percentage points.
pub const CURRENT_TOLERANCE_POINTS: f64 = 10.0;

/// Closed interval `[low, high]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Band {
    pub low: f64,
    pub high: f64,
}

impl Band {
    pub fn new(low: f64, high: f64) -> Self {
        Self { low, high }
    }

    /// Band of `nominal` widened by `tolerance_percent` on each side.
    pub fn around(nominal: f64, tolerance_percent: f64) -> Self {
        Self {
            low: nominal * (100.0 - tolerance_percent) / 100.0,
            high: nominal * (100.0 + tolerance_percent) / 100.0,
        }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.low && value <= self.high
    }
}

/// Declarative description of an adapter model under test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdapterProfile {
    pub name: String,
    pub max_current: f64,
    pub max_voltage: f64,
    pub min_voltage: f64,
    #[serde(rename = "voltage_tolerance")]
    pub voltage_tolerance_percent: f64,
    #[serde(rename = "min_OPP")]
    pub opp_min: u32,
    #[serde(rename = "max_OPP")]
    pub opp_max: u32,
}

impl AdapterProfile {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::Empty { field: "name" });
        }
        for (field, value) in [
            ("max current", self.max_current),
            ("max voltage", self.max_voltage),
            ("min voltage", self.min_voltage),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ValidationError::out_of_range(field, "a non-negative number", value));
            }
        }
        if self.max_current > MAX_ADAPTER_CURRENT {
            return Err(ValidationError::out_of_range(
                "max current",
                "at most 3.2 A",
                self.max_current,
            ));
        }
        if self.max_voltage > MAX_ADAPTER_VOLTAGE {
            return Err(ValidationError::out_of_range(
                "max voltage",
                "at most 15 V",
                self.max_voltage,
            ));
        }
        if self.min_voltage > self.max_voltage {
            return Err(ValidationError::Inconsistent(format!(
                "min voltage ({}V) must not exceed max voltage ({}V)",
                self.min_voltage, self.max_voltage
            )));
        }
        if !(OPP_LIMIT_MIN..=OPP_LIMIT_MAX).contains(&self.opp_min) {
            return Err(ValidationError::out_of_range(
                "OPP min",
                "between 100 and 250 %",
                self.opp_min as f64,
            ));
        }
        if self.opp_max < self.opp_min || self.opp_max > OPP_LIMIT_MAX {
            return Err(ValidationError::out_of_range(
                "OPP max",
                "between OPP min and 250 %",
                self.opp_max as f64,
            ));
        }
        if !(self.voltage_tolerance_percent > 0.0 && self.voltage_tolerance_percent <= 100.0) {
            return Err(ValidationError::out_of_range(
                "voltage tolerance",
                "in (0, 100] %",
                self.voltage_tolerance_percent,
            ));
        }
        Ok(())
    }

    /// Acceptable output voltage while loaded within rating.
    pub fn voltage_band(&self) -> Band {
        Band::around(self.max_voltage, self.voltage_tolerance_percent)
    }

    /// Acceptable measured current for a commanded load percentage.
    pub fn current_band(&self, load_percent: f64) -> Band {
        Band::new(
            ((load_percent - CURRENT_TOLERANCE_POINTS) / 100.0) * self.max_current,
            ((load_percent + CURRENT_TOLERANCE_POINTS) / 100.0) * self.max_current,
        )
    }

    pub fn opp_within_spec(&self, load_percent: f64) -> bool {
        load_percent >= self.opp_min as f64 && load_percent <= self.opp_max as f64
    }

    /// Load percentage corresponding to a measured current.
    pub fn load_percent_of(&self, current: f64) -> f64 {
        if self.max_current > 0.0 {
            ((current / self.max_current) * 100.0).round()
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> AdapterProfile {
        AdapterProfile {
            name: "ACME-12V".to_string(),
            max_current: 2.0,
            max_voltage: 12.0,
            min_voltage: 10.0,
            voltage_tolerance_percent: 5.0,
            opp_min: 120,
            opp_max: 200,
        }
    }

    #[test]
    fn test_voltage_band() {
        let band = profile().voltage_band();
        assert!((band.low - 11.4).abs() < 1e-9);
        assert!((band.high - 12.6).abs() < 1e-9);
        assert!(band.contains(12.0));
        assert!(!band.contains(8.0));
    }

    #[test]
    fn test_current_band_is_ten_points_of_rating() {
        let band = profile().current_band(50.0);
        assert!((band.low - 0.8).abs() < 1e-9);
        assert!((band.high - 1.2).abs() < 1e-9);
    }

    #[test]
    fn test_opp_spec_is_inclusive() {
        let p = profile();
        assert!(p.opp_within_spec(150.0));
        assert!(p.opp_within_spec(120.0));
        assert!(p.opp_within_spec(200.0));
        assert!(!p.opp_within_spec(250.0));
    }

    #[test]
    fn test_validate_rejects_out_of_range_values() {
        assert!(profile().validate().is_ok());

        let mut p = profile();
        p.max_current = 3.3;
        assert!(p.validate().is_err());

        let mut p = profile();
        p.max_voltage = 16.0;
        assert!(p.validate().is_err());

        let mut p = profile();
        p.min_voltage = 13.0;
        assert!(matches!(p.validate(), Err(ValidationError::Inconsistent(_))));

        let mut p = profile();
        p.opp_min = 90;
        assert!(p.validate().is_err());

        let mut p = profile();
        p.opp_max = 110;
        assert!(p.validate().is_err());

        let mut p = profile();
        p.voltage_tolerance_percent = 0.0;
        assert!(p.validate().is_err());

        let mut p = profile();
        p.name = "  ".to_string();
        assert!(matches!(p.validate(), Err(ValidationError::Empty { .. })));
    }

    #[test]
    fn test_storage_field_names() {
        let json = serde_json::to_value(profile()).unwrap();
        assert_eq!(json["voltage_tolerance"], 5.0);
        assert_eq!(json["min_OPP"], 120);
        assert_eq!(json["max_OPP"], 200);
    }
}
