//! Runtime configuration for the API server

use config::{Config, ConfigError, Environment};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Interface to bind the listener to
    pub bind_address: String,
    pub port: u16,
    /// Base URL advertised in BIP70 payment and callback URLs
    pub public_base_url: String,
}

impl ApiConfig {
    /// Load configuration from defaults overridden by `ESCROWD_*`
    /// environment variables (e.g. `ESCROWD_PORT=9090`).
    pub fn load() -> Result<Self, ConfigError> {
        Config::builder()
            .set_default("bind_address", "0.0.0.0")?
            .set_default("port", "8080")?
            .set_default("public_base_url", "http://localhost:8080")?
            .add_source(Environment::with_prefix("ESCROWD"))
            .build()?
            .try_deserialize()
    }
}
