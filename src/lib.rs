pub mod about;
pub mod annotation;
pub mod baseline;
pub mod config;
pub mod error;
pub mod extremum;
pub mod loader;
pub mod pipeline;
pub mod plate_export;
pub mod plot;
pub mod reading;
pub mod repair;
pub mod report;
pub mod threshold;

pub use error::{RecoveryError, Result};
pub use pipeline::run_pipeline;
