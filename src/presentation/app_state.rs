// Application state for HTTP handlers
use crate::application::adapter_service::AdapterService;
use crate::application::bench::Bench;
use crate::application::ripple_service::RippleSequencer;
use crate::application::sequencer::TesterService;
use crate::application::settings_service::SettingsService;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub bench: Arc<Bench>,
    pub tester: Arc<TesterService>,
    pub ripple: Arc<RippleSequencer>,
    pub adapters: Arc<AdapterService>,
    pub settings: Arc<SettingsService>,
}
