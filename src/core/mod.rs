//! Core types, configuration and shared utilities.

pub mod config;
pub mod constants;
pub mod types;
pub mod utils;

pub use config::AnalysisConfig;
pub use types::*;
