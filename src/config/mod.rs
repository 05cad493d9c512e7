//! # Engine Configuration
//!
//! Layered configuration for the sequence engine: built-in defaults, then an
//! optional TOML/YAML file, then `SEQUENCER__*` environment variables.
//!
//! ```rust,no_run
//! use sequencer_core::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let behavior = manager.config().error_behavior;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// What an item does when its action fails with an ordinary error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ErrorBehavior {
    /// Mark the item failed, log it and move on to the next sibling
    #[default]
    Continue,
    /// Re-execute the action up to `attempts` more times, then behave like `Continue`
    Retry { attempts: u32 },
    /// Mark the item failed and unwind the whole run
    AbortRun,
}

/// Logging settings consumed by [`crate::logging::init_structured_logging`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive; the environment default is used when absent
    pub level: Option<String>,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Default failure policy for items that do not set their own
    pub error_behavior: ErrorBehavior,
    /// Capacity of the broadcast channel behind the runner's progress publisher
    pub progress_channel_capacity: usize,
    pub logging: LoggingConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            error_behavior: ErrorBehavior::Continue,
            progress_channel_capacity: 1000,
            logging: LoggingConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.progress_channel_capacity == 0 {
            return Err(ConfigurationError::invalid_value(
                "progress_channel_capacity",
                "0",
                "channel capacity must be greater than 0",
            ));
        }

        if let ErrorBehavior::Retry { attempts: 0 } = self.error_behavior {
            return Err(ConfigurationError::invalid_value(
                "error_behavior.attempts",
                "0",
                "retry needs at least one attempt",
            ));
        }

        Ok(())
    }
}
