//! # Structured Logging Module
//!
//! Environment-aware structured logging for sequence runs. Output goes to the
//! console, either human-readable or as JSON lines.

use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};
use uuid::Uuid;

use crate::config::{loader::ConfigManager, LoggingConfig};
use crate::state_machine::EntityStatus;

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration.
///
/// Safe to call more than once; only the first call installs a subscriber, and
/// an already-installed global subscriber is left in place.
pub fn init_structured_logging(logging: &LoggingConfig) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = ConfigManager::detect_environment();
        let log_level = logging
            .level
            .clone()
            .unwrap_or_else(|| get_log_level(&environment));

        let console = if logging.json {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .json()
                .with_filter(EnvFilter::new(log_level.clone()))
                .boxed()
        } else {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_ansi(true)
                .with_filter(EnvFilter::new(log_level.clone()))
                .boxed()
        };

        if tracing_subscriber::registry().with(console).try_init().is_err() {
            tracing::debug!("Global tracing subscriber already initialized - keeping it");
        }

        tracing::info!(
            environment = %environment,
            level = %log_level,
            json = logging.json,
            "Structured logging initialized"
        );
    });
}

/// Get log level based on environment
fn get_log_level(environment: &str) -> String {
    match environment {
        "production" => "info".to_string(),
        _ => "debug".to_string(),
    }
}

/// Log structured data for an entity status change
pub fn log_entity_transition(
    operation: &str,
    entity_id: Uuid,
    entity_name: &str,
    status: EntityStatus,
    details: Option<&str>,
) {
    tracing::debug!(
        operation = %operation,
        entity_id = %entity_id,
        entity_name = %entity_name,
        status = %status,
        details = details,
        "ENTITY_TRANSITION"
    );
}

/// Log error with full context
pub fn log_error(component: &str, operation: &str, error: &str, context: Option<&str>) {
    tracing::error!(
        component = %component,
        operation = %operation,
        error = %error,
        context = context,
        "ERROR"
    );
}
