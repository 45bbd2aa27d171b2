// Settings service - validated test configuration applied to the bench
use crate::application::bench::{Bench, BenchBusy, BenchUser};
use crate::application::repositories::SettingsRepository;
use crate::domain::error::{HardwareFault, PersistenceFailure, ValidationError};
use crate::domain::settings::TestSettings;
use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("settings can't be changed: {0}")]
    Busy(#[from] BenchBusy),
    #[error(transparent)]
    Hardware(#[from] HardwareFault),
    #[error(transparent)]
    Persistence(#[from] PersistenceFailure),
}

pub struct SettingsService {
    repository: Arc<dyn SettingsRepository>,
    bench: Arc<Bench>,
    current: Mutex<TestSettings>,
}

impl SettingsService {
    pub fn new(
        repository: Arc<dyn SettingsRepository>,
        bench: Arc<Bench>,
        initial: TestSettings,
    ) -> Self {
        Self {
            repository,
            bench,
            current: Mutex::new(initial),
        }
    }

    pub fn current(&self) -> TestSettings {
        *self.current.lock()
    }

    /// Pushes the current sampling mode to the bench and the sensor.
    pub fn apply(&self) -> Result<(), HardwareFault> {
        let settings = self.current();
        self.bench.set_sample_interval(settings.sample_interval());
        self.bench
            .hardware()
            .set_high_resolution(settings.high_resolution)
    }

    /// Validates, applies and persists new settings. Rejected while the bench
    /// is in use; nothing changes on error before the persistence step.
    /// The bench stays held until the update is saved.
    pub async fn update(&self, settings: TestSettings) -> Result<TestSettings, SettingsError> {
        settings.validate()?;
        let _lease = self.bench.acquire(BenchUser::Settings)?;

        let previous = self.current();
        if previous.high_resolution != settings.high_resolution {
            self.bench
                .hardware()
                .set_high_resolution(settings.high_resolution)?;
            self.bench.feed().debug(if settings.high_resolution {
                "Switched to high resolution"
            } else {
                "Switched to low resolution"
            });
        }
        *self.current.lock() = settings;
        self.bench.set_sample_interval(settings.sample_interval());

        self.repository.save(&settings).await?;
        self.bench.feed().info("Settings saved");
        Ok(settings)
    }
}
