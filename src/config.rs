use std::time::Duration;

use config::builder::DefaultState;
use config::{ConfigBuilder, ConfigError};
use serde::Deserialize;
use tracing::Level;

use crate::display::SlotOptions;
use crate::error::Error;

const ENV_PREFIX: &str = "BANNERS";

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub rotation: RotationConfig,
    pub log_level: String,
    pub seed: bool,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ServerConfig {
    pub bind_address: String,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    Mongo,
    Memory,
}

#[derive(Clone, Debug, Deserialize)]
pub struct DatabaseConfig {
    pub backend: DatabaseBackend,
    pub uri: String,
    pub name: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct RotationConfig {
    pub interval_seconds: u64,
    pub fetch_timeout_ms: u64,
    pub fetch_attempts: u32,
}

fn with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    config::Config::builder()
        .set_default("server.bind_address", "127.0.0.1:8080")?
        .set_default("database.backend", "mongo")?
        .set_default("database.uri", "mongodb://localhost:27017")?
        .set_default("database.name", "jobboard")?
        .set_default("rotation.interval_seconds", 10)?
        .set_default("rotation.fetch_timeout_ms", 5000)?
        .set_default("rotation.fetch_attempts", 3)?
        .set_default("log_level", "debug")?
        .set_default("seed", false)
}

impl Config {
    /// Layers built-in defaults, `config/default`, `config/local` and
    /// `BANNERS__*` environment variables, later sources winning.
    pub fn load() -> Result<Config, Error> {
        let config = with_defaults()?
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// The built-in defaults alone, ignoring files and the environment.
    pub fn defaults() -> Result<Config, Error> {
        Ok(with_defaults()?.build()?.try_deserialize()?)
    }

    pub fn log_level(&self) -> Level {
        self.log_level.parse().unwrap_or(Level::DEBUG)
    }

    pub fn slot_options(&self) -> SlotOptions {
        SlotOptions {
            rotation_interval: Duration::from_secs(self.rotation.interval_seconds.max(1)),
            fetch_timeout: Duration::from_millis(self.rotation.fetch_timeout_ms),
            fetch_attempts: self.rotation.fetch_attempts.max(1),
            ..SlotOptions::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use config::{File, FileFormat};

    use super::*;

    #[test]
    fn defaults_are_usable_without_files() {
        let config = Config::defaults().unwrap();

        assert_eq!(config.server.bind_address, "127.0.0.1:8080");
        assert_eq!(config.database.backend, DatabaseBackend::Mongo);
        assert_eq!(config.rotation.interval_seconds, 10);
        assert!(!config.seed);
        assert_eq!(config.log_level(), Level::DEBUG);
        assert_eq!(config.slot_options().rotation_interval, Duration::from_secs(10));
    }

    #[test]
    fn later_sources_override_defaults() {
        let overrides = r#"
            log_level = "warn"

            [database]
            backend = "memory"

            [rotation]
            interval_seconds = 0
        "#;

        let config: Config = with_defaults()
            .unwrap()
            .add_source(File::from_str(overrides, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.database.backend, DatabaseBackend::Memory);
        assert_eq!(config.database.name, "jobboard");
        assert_eq!(config.log_level(), Level::WARN);
        assert_eq!(config.slot_options().rotation_interval, Duration::from_secs(1));
    }
}
