//! Configuration management for the Keel kernel.
//!
//! Settings are layered: built-in defaults, then optional files
//! (`config/default`, `config/{KEEL_ENV}`, `keel`), then environment
//! variables prefixed with `KEEL` using `__` as the section separator
//! (`KEEL__DATABASE__URL`).
//!
//! # Example
//!
//! ```no_run
//! use keel_kernel::infrastructure::config::Settings;
//!
//! let settings = Settings::new().expect("Failed to load configuration");
//! ```

pub mod database;
pub mod orchestration;
pub mod server;
pub mod telemetry;

pub use database::DatabaseSettings;
pub use orchestration::OrchestrationSettings;
pub use server::{BindAddress, ServerSettings};
pub use telemetry::TelemetrySettings;

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use serde::Deserialize;

/// Top-level configuration for the Keel kernel.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    /// Control plane settings.
    pub server: ServerSettings,
    /// Telemetry settings.
    pub telemetry: TelemetrySettings,
    /// Database settings.
    pub database: DatabaseSettings,
    /// Engine settings.
    #[serde(default)]
    pub orchestration: OrchestrationSettings,
}

impl Settings {
    /// Creates a new settings instance from files, environment variables and defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be built or deserialized.
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = std::env::var("KEEL_ENV").unwrap_or_else(|_| "development".into());

        let s = Self::defaults()?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
            .add_source(File::with_name("keel").required(false))
            .add_source(Environment::with_prefix("KEEL").separator("__"))
            .build()?;

        s.try_deserialize()
    }

    /// Loads settings from one file on top of the defaults, ignoring the
    /// environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or deserialized.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        Self::defaults()?
            .add_source(File::from(path))
            .build()?
            .try_deserialize()
    }

    fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 9090)?
            .set_default("database.url", "sqlite://keel.db?mode=rwc")?
            .set_default("telemetry.service_name", "keel")?
            .set_default("telemetry.log_level", "info")?
            .set_default("telemetry.sampling_ratio", 1.0)
    }
}
