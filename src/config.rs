//! Core service configuration, built from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Shared secret a conversation must present before the bot responds.
    pub access_secret: SecretString,
    /// Port for the REST API.
    pub http_port: u16,
    /// Directory where inbound document uploads are saved.
    pub download_dir: PathBuf,
    /// Sessions idle past this duration are swept from the store.
    pub session_idle_timeout: Duration,
}

impl Config {
    /// Build config from environment variables.
    ///
    /// `BULK_RELAY_SECRET` is required; everything else has a default.
    pub fn from_env() -> Result<Self, ConfigError> {
        let access_secret = std::env::var("BULK_RELAY_SECRET")
            .map(SecretString::from)
            .map_err(|_| ConfigError::MissingEnvVar("BULK_RELAY_SECRET".into()))?;

        let http_port: u16 = std::env::var("BULK_RELAY_HTTP_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(8080);

        let download_dir = std::env::var("BULK_RELAY_DOWNLOAD_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data/uploads"));

        let idle_secs: u64 = std::env::var("BULK_RELAY_SESSION_IDLE_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(3600);

        Ok(Self {
            access_secret,
            http_port,
            download_dir,
            session_idle_timeout: Duration::from_secs(idle_secs),
        })
    }
}
