//! Non-fatal failure reporting.
//!
//! The lifecycle never uses telemetry for control flow: every call here is a
//! side channel for operators. [`TracingTelemetry`] is the default sink.

use std::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
}

/// Observability collaborator for the lifecycle and the geofence controller.
pub trait Telemetry: Send + Sync {
    fn log(&self, level: Level, tag: &str, message: &str);

    fn log_error(&self, error: &dyn Error);
}

/// Routes telemetry to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingTelemetry;

impl Telemetry for TracingTelemetry {
    fn log(&self, level: Level, tag: &str, message: &str) {
        match level {
            Level::Debug => tracing::debug!(tag, "{message}"),
            Level::Info => tracing::info!(tag, "{message}"),
            Level::Warn => tracing::warn!(tag, "{message}"),
            Level::Error => tracing::error!(tag, "{message}"),
        }
    }

    fn log_error(&self, error: &dyn Error) {
        tracing::error!(error = %error, "non-fatal failure");
    }
}
