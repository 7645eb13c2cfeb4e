//! Core domain models
//!
//! This module defines the pipeline, stage and execution snapshots shared by
//! the API adapter, the state cache and the terminal views, plus the
//! application configuration.

pub mod config;
pub mod model;

pub use config::{AppConfig, ConfigError};
pub use model::*;
