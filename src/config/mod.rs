//! Configuration loading and management.
//!
//! This module is split into logical submodules:
//! - [`types`]: config struct definitions and TOML loading
//! - [`defaults`]: serde default value functions
//! - [`validation`]: startup validation that reports every problem at once

mod defaults;
mod types;
pub mod validation;

pub use types::{
    ApiConfig, Config, ConfigError, DatabaseConfig, LogFormat, LoggerSettings, LoggingConfig,
    NetworkSeed, RouterConfig, TailConfig,
};
