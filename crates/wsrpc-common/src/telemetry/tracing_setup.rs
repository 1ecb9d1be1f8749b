//! Tracing and logging setup
//!
//! Installs a `tracing` subscriber filtered by `RUST_LOG`, falling back to the configured level.

use crate::config::Environment;
use tracing::{Level, Subscriber};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Tracing configuration options
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Fallback level when `RUST_LOG` is unset
    pub level: Level,
    /// Emit JSON lines
    pub json: bool,
    /// Log span open/close
    pub span_events: bool,
    pub file_line: bool,
    pub thread_names: bool,
    pub thread_ids: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            json: false,
            span_events: false,
            file_line: true,
            thread_names: false,
            thread_ids: false,
        }
    }
}

impl TracingConfig {
    /// Debug level, human readable
    #[must_use]
    pub fn development() -> Self {
        Self {
            level: Level::DEBUG,
            span_events: true,
            thread_names: true,
            ..Self::default()
        }
    }

    /// Info level, JSON lines
    #[must_use]
    pub fn production() -> Self {
        Self {
            json: true,
            file_line: false,
            ..Self::default()
        }
    }

    /// Preset matching the deployment environment
    #[must_use]
    pub fn for_environment(env: Environment) -> Self {
        match env {
            Environment::Production => Self::production(),
            Environment::Staging => Self::default(),
            Environment::Development => Self::development(),
        }
    }

    fn span_events(&self) -> FmtSpan {
        if self.span_events {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        }
    }

    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(self.level.to_string()))
    }

    fn fmt_layer<S>(&self) -> Box<dyn Layer<S> + Send + Sync>
    where
        S: Subscriber + for<'a> LookupSpan<'a>,
    {
        let layer = fmt::layer()
            .with_file(self.file_line)
            .with_line_number(self.file_line)
            .with_thread_names(self.thread_names)
            .with_thread_ids(self.thread_ids)
            .with_span_events(self.span_events());

        if self.json {
            layer.json().boxed()
        } else {
            layer.boxed()
        }
    }
}

/// Initialize the tracing subscriber with default configuration
///
/// # Panics
/// Panics if a global subscriber is already set.
pub fn init_tracing() {
    if let Err(e) = try_init_tracing() {
        panic!("{e}");
    }
}

/// Try to initialize tracing with default configuration
///
/// Safe to call more than once; later calls report `AlreadyInitialized`.
pub fn try_init_tracing() -> Result<(), TracingError> {
    try_init_tracing_with_config(TracingConfig::default())
}

/// Try to initialize tracing with custom configuration
pub fn try_init_tracing_with_config(config: TracingConfig) -> Result<(), TracingError> {
    tracing_subscriber::registry()
        .with(config.env_filter())
        .with(config.fmt_layer())
        .try_init()
        .map_err(|_| TracingError::AlreadyInitialized)
}

/// Tracing initialization errors
#[derive(Debug, thiserror::Error)]
pub enum TracingError {
    #[error("Tracing subscriber already initialized")]
    AlreadyInitialized,
}
