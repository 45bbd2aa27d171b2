// Repository traits for records, profiles, calibration and settings
use crate::domain::adapter::AdapterProfile;
use crate::domain::calibration::CalibrationTable;
use crate::domain::error::PersistenceFailure;
use crate::domain::record::{RecordEntry, RippleRecord, TestRecord};
use crate::domain::settings::TestSettings;
use async_trait::async_trait;
use std::path::PathBuf;

/// Which record family an identifier belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Test,
    Ripple,
}

#[async_trait]
pub trait RecordRepository: Send + Sync {
    /// Allocates the next identifier for today, e.g. `ACME-20260101-004-K2Q9`.
    async fn next_id(&self, kind: RecordKind, prefix: &str) -> Result<String, PersistenceFailure>;

    async fn save_test(&self, record: &TestRecord) -> Result<PathBuf, PersistenceFailure>;

    async fn load_test(&self, test_id: &str) -> Result<TestRecord, PersistenceFailure>;

    async fn list_tests(&self) -> Result<Vec<RecordEntry>, PersistenceFailure>;

    async fn delete_test(&self, test_id: &str) -> Result<(), PersistenceFailure>;

    async fn save_ripple(&self, record: &RippleRecord) -> Result<PathBuf, PersistenceFailure>;

    async fn load_ripple(&self, test_id: &str) -> Result<RippleRecord, PersistenceFailure>;

    async fn list_ripples(&self) -> Result<Vec<RecordEntry>, PersistenceFailure>;

    async fn delete_ripple(&self, test_id: &str) -> Result<(), PersistenceFailure>;
}

/// Whole-collection adapter profile storage; mutations are read-modify-write.
#[async_trait]
pub trait ProfileRepository: Send + Sync {
    async fn load_all(&self) -> Result<Vec<AdapterProfile>, PersistenceFailure>;

    async fn add(&self, profile: &AdapterProfile) -> Result<(), PersistenceFailure>;

    /// Removes and returns the profile at `index`.
    async fn delete(&self, index: usize) -> Result<AdapterProfile, PersistenceFailure>;
}

#[async_trait]
pub trait CalibrationRepository: Send + Sync {
    async fn load(&self) -> Result<CalibrationTable, PersistenceFailure>;

    async fn save(&self, table: &CalibrationTable) -> Result<(), PersistenceFailure>;
}

#[async_trait]
pub trait SettingsRepository: Send + Sync {
    /// Settings saved by a previous session, if any.
    async fn load(&self) -> Result<Option<TestSettings>, PersistenceFailure>;

    async fn save(&self, settings: &TestSettings) -> Result<(), PersistenceFailure>;
}
