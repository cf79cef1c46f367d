//! Configuration
//!
//! Layered, loaded once at startup:
//! 1. Built-in defaults
//! 2. `~/.tokenrelay/config.toml` (or an explicit path), optional
//! 3. `TOKENRELAY__SECTION__KEY` environment variables
//!
//! There is no hot reload.

mod types;

pub use types::{AccountInfo, Config, LoggingConfig, RelayConfig, Secret, TelegramConfig};

use std::path::{Path, PathBuf};

use thiserror::Error;

const ENV_PREFIX: &str = "TOKENRELAY";
const ENV_SEPARATOR: &str = "__";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("failed to write configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// `~/.tokenrelay`
pub fn tokenrelay_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".tokenrelay")
}

pub fn default_config_path() -> PathBuf {
    tokenrelay_home().join("config.toml")
}

impl Config {
    /// Load from `path` (or the default path) and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
        Self::load_with_env(&path, ENV_PREFIX)
    }

    fn load_with_env(path: &Path, env_prefix: &str) -> Result<Self, ConfigError> {
        let exists = path.exists();
        let settings = ::config::Config::builder()
            .add_source(
                ::config::File::from(path.to_path_buf())
                    .format(::config::FileFormat::Toml)
                    .required(false),
            )
            .add_source(
                ::config::Environment::with_prefix(env_prefix)
                    .prefix_separator(ENV_SEPARATOR)
                    .separator(ENV_SEPARATOR),
            )
            .build()?;

        let cfg: Config = settings.try_deserialize()?;
        if exists {
            tracing::debug!("Loaded configuration from {}", path.display());
        } else {
            tracing::debug!("No config file at {}, using defaults and environment", path.display());
        }
        Ok(cfg)
    }

    /// Check everything `run` needs except the bot token.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.telegram.validate()?;
        self.relay.validate()
    }

    /// Render as TOML with a short header.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        let body = toml::to_string_pretty(self)?;
        Ok(format!(
            "# tokenrelay configuration\n\
             # Environment overrides: TOKENRELAY__<SECTION>__<KEY>, e.g. TOKENRELAY__TELEGRAM__BOT_TOKEN\n\n\
             {body}"
        ))
    }

    /// Write to `path`, creating parent directories. Refuses to overwrite
    /// unless `force` is set.
    pub fn write_to(&self, path: &Path, force: bool) -> Result<(), ConfigError> {
        if path.exists() && !force {
            return Err(ConfigError::Invalid(format!(
                "{} already exists (use --force to overwrite)",
                path.display()
            )));
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_toml()?)?;
        tracing::info!("Wrote configuration to {}", path.display());
        Ok(())
    }
}
