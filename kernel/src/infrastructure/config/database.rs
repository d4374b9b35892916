//! Database configuration for the Keel kernel.
//!
//! This module defines database connection settings.

use secrecy::SecretString;
use serde::Deserialize;

/// Database connection settings.
#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseSettings {
    /// Database connection URL. May carry credentials, so it is kept secret.
    pub url: SecretString,
    /// Upper bound on pooled connections (default: 5)
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}
