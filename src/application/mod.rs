// Application layer - Bench coordination, procedures and services
pub mod acquisition;
pub mod actuation;
pub mod adapter_service;
pub mod bench;
pub mod calibration_service;
pub mod hardware;
pub mod messages;
pub mod repositories;
pub mod ripple_service;
pub mod run_control;
pub mod sequencer;
pub mod settings_service;
