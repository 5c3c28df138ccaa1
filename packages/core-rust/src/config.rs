//! Framework-wide configuration shared by rule engines and endpoints.

use std::fmt;
use std::sync::Arc;

/// Loosely typed configuration bag handed to components on `init`.
///
/// Components decode the keys they recognise into their own structured
/// config and ignore the rest.
pub type Configuration = serde_json::Map<String, serde_json::Value>;

/// `Printf`-shaped log sink supplied by the embedding application.
pub trait Logger: Send + Sync {
    fn printf(&self, args: fmt::Arguments<'_>);
}

/// Logger that forwards every line to `tracing` at info level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn printf(&self, args: fmt::Arguments<'_>) {
        tracing::info!(target: "rulego", "{}", args);
    }
}

/// Configuration shared across the framework.
///
/// Only the logger is consulted by endpoints. An absent logger disables
/// logging entirely.
#[derive(Clone, Default)]
pub struct RuleConfig {
    pub logger: Option<Arc<dyn Logger>>,
}

impl RuleConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of this config that logs to `logger`.
    #[must_use]
    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Writes a line to the configured logger, if any.
    pub fn printf(&self, args: fmt::Arguments<'_>) {
        if let Some(logger) = &self.logger {
            logger.printf(args);
        }
    }
}

impl fmt::Debug for RuleConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleConfig")
            .field("logger", &self.logger.is_some())
            .finish()
    }
}
