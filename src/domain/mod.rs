// Domain layer - Samples, profiles, calibration and evaluation rules
pub mod adapter;
pub mod buffer;
pub mod calibration;
pub mod error;
pub mod evaluation;
pub mod phase;
pub mod record;
pub mod ripple;
pub mod sample;
pub mod settings;
