use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File};
use graph_auth::auth::{CACHE_FILE_NAME, ProviderSettings};
use serde::Deserialize;

pub const DEFAULT_CONFIG_FILE: &str = "bettergraph.toml";
pub const ENV_PREFIX: &str = "BETTERGRAPH";

const DEFAULT_LOG_LEVEL: &str = "warn";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("Invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Tool settings read from `bettergraph.toml` and `BETTERGRAPH__*` overrides.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    logging: LoggingConfig,
    cache_dir: Option<PathBuf>,
    graph_host: Option<String>,
    authority_host: Option<String>,
    interactive_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    level: Option<String>,
    file: Option<String>,
}

impl LoggingConfig {
    pub fn level(&self) -> &str {
        self.level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL)
    }

    pub fn file(&self) -> Option<&str> {
        self.file.as_deref().filter(|f| !f.trim().is_empty())
    }
}

impl CliConfig {
    /// Loads the optional config file and environment overrides.
    ///
    /// When `path` is `None` the file is looked up in the working directory
    /// first and in the per-user config directory second.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        match path {
            Some(path) => {
                builder = builder.add_source(File::from(path.to_path_buf()).required(true));
            }
            None => {
                if let Some(user_file) = user_config_file() {
                    builder = builder.add_source(File::from(user_file).required(false));
                }
                builder = builder.add_source(File::with_name(DEFAULT_CONFIG_FILE).required(false));
            }
        }

        let config = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize::<CliConfig>()?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.interactive_timeout_secs == Some(0) {
            return Err(ConfigError::Invalid {
                field: "interactive_timeout_secs",
                reason: "must be greater than zero".to_string(),
            });
        }
        for (field, value) in [
            ("graph_host", &self.graph_host),
            ("authority_host", &self.authority_host),
        ] {
            if value.as_deref().is_some_and(|v| v.trim().is_empty()) {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "must not be empty".to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn logging(&self) -> &LoggingConfig {
        &self.logging
    }

    pub fn cache_path(&self) -> Option<PathBuf> {
        self.cache_dir
            .as_ref()
            .map(|dir| dir.join(CACHE_FILE_NAME))
    }

    pub fn interactive_timeout(&self) -> Option<Duration> {
        self.interactive_timeout_secs.map(Duration::from_secs)
    }

    /// Settings every provider of this process is built with.
    pub fn provider_settings(&self) -> ProviderSettings {
        let mut settings = ProviderSettings::default();
        if let Some(host) = &self.graph_host {
            settings.graph_host = host.trim().to_string();
        }
        if let Some(host) = &self.authority_host {
            settings.authority_host = host.trim().trim_end_matches('/').to_string();
        }
        if let Some(timeout) = self.interactive_timeout() {
            settings.interactive_timeout = timeout;
        }
        settings.cache_path = self.cache_path();
        settings
    }
}

fn user_config_file() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("bettergraph").join("config.toml"))
}
