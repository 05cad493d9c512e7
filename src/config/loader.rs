//! Configuration Loader
//!
//! Environment-aware configuration loading built on the `config` crate.

use super::error::{ConfigResult, ConfigurationError};
use super::EngineConfig;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Prefix for environment overrides, e.g. `SEQUENCER__LOGGING__JSON=true`
pub const ENV_PREFIX: &str = "SEQUENCER";

/// Loaded engine configuration plus where it came from
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: EngineConfig,
    environment: String,
    source_file: Option<PathBuf>,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection.
    ///
    /// Reads the file named by `SEQUENCER_CONFIG` when set, then applies
    /// `SEQUENCER__*` environment overrides.
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        let file = env::var("SEQUENCER_CONFIG").ok().map(PathBuf::from);
        Self::load_from_sources(file.as_deref(), Some(ENV_PREFIX))
    }

    /// Load configuration from a specific file, with environment overrides
    pub fn load_from_file(path: impl AsRef<Path>) -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_sources(Some(path.as_ref()), Some(ENV_PREFIX))
    }

    /// Load configuration from explicit sources.
    ///
    /// Passing `None` for `env_prefix` disables environment overrides, which
    /// keeps tests independent of the process environment.
    pub fn load_from_sources(
        file: Option<&Path>,
        env_prefix: Option<&str>,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();

        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&EngineConfig::default())?);

        if let Some(path) = file {
            if !path.exists() {
                return Err(ConfigurationError::ConfigFileNotFound {
                    path: path.to_path_buf(),
                });
            }
            debug!(path = %path.display(), "Loading configuration file");
            builder = builder.add_source(config::File::from(path).required(true));
        }

        if let Some(prefix) = env_prefix {
            builder = builder.add_source(
                config::Environment::with_prefix(prefix)
                    .separator("__")
                    .try_parsing(true),
            );
        }

        let config: EngineConfig = builder.build()?.try_deserialize()?;
        config.validate()?;

        debug!(
            environment = %environment,
            error_behavior = ?config.error_behavior,
            progress_channel_capacity = config.progress_channel_capacity,
            "Configuration loaded successfully"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment,
            source_file: file.map(Path::to_path_buf),
        }))
    }

    /// Wrap an already-built configuration
    pub fn from_config(config: EngineConfig) -> ConfigResult<Arc<ConfigManager>> {
        config.validate()?;
        Ok(Arc::new(ConfigManager {
            config,
            environment: Self::detect_environment(),
            source_file: None,
        }))
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn source_file(&self) -> Option<&Path> {
        self.source_file.as_deref()
    }

    pub(crate) fn detect_environment() -> String {
        env::var("SEQUENCER_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
    }
}
