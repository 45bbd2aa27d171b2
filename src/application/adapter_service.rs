// Adapter service - profile catalogue and the selected profile
use crate::application::repositories::ProfileRepository;
use crate::domain::adapter::AdapterProfile;
use crate::domain::error::{PersistenceFailure, ValidationError};
use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Persistence(#[from] PersistenceFailure),
    #[error("no adapter profile at index {index} ({len} profiles)")]
    UnknownIndex { index: usize, len: usize },
}

/// Loaded profiles plus the one chosen for the next run.
///
/// A run takes its own `Arc` of the selected profile, so later edits never
/// affect a test in progress.
pub struct AdapterService {
    repository: Arc<dyn ProfileRepository>,
    profiles: Mutex<Vec<AdapterProfile>>,
    selected: Mutex<Option<Arc<AdapterProfile>>>,
}

impl AdapterService {
    pub fn new(repository: Arc<dyn ProfileRepository>) -> Self {
        Self {
            repository,
            profiles: Mutex::new(Vec::new()),
            selected: Mutex::new(None),
        }
    }

    /// Reloads the catalogue from storage. Returns the number of profiles.
    pub async fn load(&self) -> Result<usize, PersistenceFailure> {
        let profiles = self.repository.load_all().await?;
        let count = profiles.len();
        *self.profiles.lock() = profiles;
        tracing::debug!("loaded {} adapter profiles", count);
        Ok(count)
    }

    pub fn list(&self) -> Vec<AdapterProfile> {
        self.profiles.lock().clone()
    }

    pub async fn add(&self, profile: AdapterProfile) -> Result<(), AdapterError> {
        profile.validate()?;
        self.repository.add(&profile).await?;
        self.load().await?;
        Ok(())
    }

    pub async fn delete(&self, index: usize) -> Result<AdapterProfile, AdapterError> {
        let removed = self.repository.delete(index).await.map_err(|e| match e {
            PersistenceFailure::IndexOutOfBounds { index, len } => {
                AdapterError::UnknownIndex { index, len }
            }
            other => AdapterError::Persistence(other),
        })?;
        self.load().await?;

        let mut selected = self.selected.lock();
        if selected.as_deref() == Some(&removed) {
            *selected = None;
        }
        Ok(removed)
    }

    pub fn select(&self, index: usize) -> Result<Arc<AdapterProfile>, AdapterError> {
        let profiles = self.profiles.lock();
        let profile = profiles
            .get(index)
            .cloned()
            .map(Arc::new)
            .ok_or(AdapterError::UnknownIndex {
                index,
                len: profiles.len(),
            })?;
        *self.selected.lock() = Some(Arc::clone(&profile));
        tracing::info!("selected adapter {}", profile.name);
        Ok(profile)
    }

    pub fn selected(&self) -> Option<Arc<AdapterProfile>> {
        self.selected.lock().clone()
    }
}
