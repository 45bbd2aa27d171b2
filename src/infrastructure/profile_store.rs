// Profile and calibration stores - whole-file JSON documents
use crate::application::repositories::{CalibrationRepository, ProfileRepository};
use crate::domain::adapter::AdapterProfile;
use crate::domain::calibration::CalibrationTable;
use crate::domain::error::PersistenceFailure;
use crate::infrastructure::json_file::{read_json, write_json};
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::sync::Mutex;

/// Adapter profiles kept as one JSON array. A missing file is an empty catalogue.
pub struct JsonProfileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonProfileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }
}

#[async_trait]
impl ProfileRepository for JsonProfileStore {
    async fn load_all(&self) -> Result<Vec<AdapterProfile>, PersistenceFailure> {
        Ok(read_json(&self.path).await?.unwrap_or_default())
    }

    async fn add(&self, profile: &AdapterProfile) -> Result<(), PersistenceFailure> {
        let _guard = self.write_lock.lock().await;
        let mut profiles = self.load_all().await?;
        profiles.push(profile.clone());
        write_json(&self.path, &profiles).await
    }

    async fn delete(&self, index: usize) -> Result<AdapterProfile, PersistenceFailure> {
        let _guard = self.write_lock.lock().await;
        let mut profiles = self.load_all().await?;
        if index >= profiles.len() {
            return Err(PersistenceFailure::IndexOutOfBounds {
                index,
                len: profiles.len(),
            });
        }
        let removed = profiles.remove(index);
        write_json(&self.path, &profiles).await?;
        Ok(removed)
    }
}

pub struct JsonCalibrationStore {
    path: PathBuf,
}

impl JsonCalibrationStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl CalibrationRepository for JsonCalibrationStore {
    /// An absent file means the bench has never been calibrated.
    async fn load(&self) -> Result<CalibrationTable, PersistenceFailure> {
        Ok(read_json(&self.path).await?.unwrap_or_default())
    }

    async fn save(&self, table: &CalibrationTable) -> Result<(), PersistenceFailure> {
        write_json(&self.path, table).await?;
        tracing::info!(
            "calibration with {} points saved to {}",
            table.points().len(),
            self.path.display()
        );
        Ok(())
    }
}
