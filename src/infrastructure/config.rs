// Configuration - process settings and the persisted test settings file
use crate::application::repositories::SettingsRepository;
use crate::domain::error::PersistenceFailure;
use crate::domain::settings::TestSettings;
use crate::infrastructure::json_file::write_atomic;
use crate::infrastructure::simulated_hardware::SimulatorSettings;
use async_trait::async_trait;
use serde::Deserialize;
use std::io::ErrorKind;
use std::path::PathBuf;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(default)]
    pub simulator: SimulatorSettings,
    /// Defaults for the first start; superseded by the saved settings file.
    #[serde(default)]
    pub test: TestSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    pub bind: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8050".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageSettings {
    pub data_dir: PathBuf,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
        }
    }
}

impl StorageSettings {
    pub fn records_dir(&self) -> PathBuf {
        self.data_dir.join("records")
    }

    pub fn adapters_file(&self) -> PathBuf {
        self.data_dir.join("adapters.json")
    }

    pub fn calibration_file(&self) -> PathBuf {
        self.data_dir.join("calibration.json")
    }

    pub fn settings_file(&self) -> PathBuf {
        self.data_dir.join("settings.toml")
    }
}

pub fn load_app_config() -> anyhow::Result<AppConfig> {
    load_app_config_from("config/tester")
}

/// Reads `<name>.toml` (optional) overlaid with `TESTER__SECTION__KEY` variables.
pub fn load_app_config_from(name: &str) -> anyhow::Result<AppConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name(name).required(false))
        .add_source(config::Environment::with_prefix("TESTER").separator("__"))
        .build()?;

    Ok(settings.try_deserialize()?)
}

/// Test settings edited at runtime, kept as TOML.
pub struct TomlSettingsStore {
    path: PathBuf,
}

impl TomlSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl SettingsRepository for TomlSettingsStore {
    async fn load(&self) -> Result<Option<TestSettings>, PersistenceFailure> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(PersistenceFailure::io(&self.path, e)),
        };
        toml::from_str(&text)
            .map(Some)
            .map_err(|e| PersistenceFailure::Encode(format!("{}: {}", self.path.display(), e)))
    }

    async fn save(&self, settings: &TestSettings) -> Result<(), PersistenceFailure> {
        let text = toml::to_string_pretty(settings)
            .map_err(|e| PersistenceFailure::Encode(e.to_string()))?;
        write_atomic(&self.path, text.as_bytes()).await
    }
}

/// Saved settings win over the configured defaults unless they no longer validate.
pub async fn startup_settings(store: &dyn SettingsRepository, configured: TestSettings) -> TestSettings {
    match store.load().await {
        Ok(Some(saved)) => match saved.validate() {
            Ok(()) => saved,
            Err(e) => {
                tracing::warn!("ignoring saved settings: {}", e);
                configured
            }
        },
        Ok(None) => configured,
        Err(e) => {
            tracing::warn!("could not read saved settings: {}", e);
            configured
        }
    }
}
