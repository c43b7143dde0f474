use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::recording::DEFAULT_STORAGE_TIMEOUT;

/// Environment variables override file values, e.g. `RECORDINGS__SERVICE__HTTP__PORT=9000`
pub const ENV_PREFIX: &str = "RECORDINGS";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub cors: CorsConfig,
    pub nats: NatsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Directory holding recording files (`~` is expanded); audio outside it is refused
    pub recordings_path: String,
    /// SQLite file for recording metadata (`~` is expanded)
    pub database_path: String,
    /// Upper bound for opening or removing an audio file
    pub audio_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NatsConfig {
    /// Listen for capture/transcription events
    pub enabled: bool,
    pub url: String,
}

impl Config {
    /// Load `path` (any format the `config` crate knows, extension optional) over built-in
    /// defaults, then apply environment overrides. A missing file is not an error.
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .set_default("service.name", "recordings-api")?
            .set_default("service.http.bind", "0.0.0.0")?
            .set_default("service.http.port", 8080)?
            .set_default("storage.recordings_path", "./data")?
            .set_default("storage.database_path", "./data/recordings.db")?
            .set_default(
                "storage.audio_timeout_ms",
                DEFAULT_STORAGE_TIMEOUT.as_millis() as u64,
            )?
            .set_default(
                "cors.allowed_origins",
                vec!["http://localhost:3000", "http://localhost:5173"],
            )?
            .set_default("nats.enabled", false)?
            .set_default("nats.url", "nats://localhost:4222")?
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("cors.allowed_origins")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        settings
            .try_deserialize()
            .context("Failed to parse configuration")
    }

    pub fn recordings_dir(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.storage.recordings_path).into_owned())
    }

    pub fn database_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.storage.database_path).into_owned())
    }

    pub fn audio_timeout(&self) -> Duration {
        Duration::from_millis(self.storage.audio_timeout_ms)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.service.http.bind, self.service.http.port)
    }
}
