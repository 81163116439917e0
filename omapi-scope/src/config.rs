//! Telemetry configuration
//!
//! Settings for the instrumented side. The only setting that can change while
//! hooks are live is the verbosity toggle, which is read on every send.

use omapi_scope_common::{Verbosity, DEFAULT_SOCKET_PATH, ENV_REDUCED_VERBOSITY, ENV_SOCKET_PATH};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::capture::{CaptureStart, ObserverSignatures};
use crate::domain::ConfigError;

/// Shared, externally settable "reduced verbosity" flag.
///
/// Clones share the same flag. Defaults to full verbosity.
#[derive(Debug, Clone, Default)]
pub struct VerbosityToggle {
    reduced: Arc<AtomicBool>,
}

impl VerbosityToggle {
    #[must_use]
    pub fn new(verbosity: Verbosity) -> Self {
        let toggle = Self::default();
        toggle.set(verbosity);
        toggle
    }

    pub fn set(&self, verbosity: Verbosity) {
        self.reduced.store(verbosity == Verbosity::Reduced, Ordering::Relaxed);
    }

    pub fn set_reduced(&self, reduced: bool) {
        self.reduced.store(reduced, Ordering::Relaxed);
    }

    #[must_use]
    pub fn get(&self) -> Verbosity {
        if self.reduced.load(Ordering::Relaxed) {
            Verbosity::Reduced
        } else {
            Verbosity::Full
        }
    }
}

/// Configuration of the instrumented side.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Package or identifier of the observed process
    pub source_identity: String,
    /// Unix socket the observer listens on
    pub socket_path: PathBuf,
    /// Frames hidden from the observed program's stack queries
    pub signatures: ObserverSignatures,
    /// Where captured call stacks begin
    pub capture_start: CaptureStart,
    pub verbosity: VerbosityToggle,
}

impl TelemetryConfig {
    /// Defaults for `source_identity`.
    #[must_use]
    pub fn new(source_identity: impl Into<String>) -> Self {
        Self {
            source_identity: source_identity.into(),
            socket_path: PathBuf::from(DEFAULT_SOCKET_PATH),
            signatures: ObserverSignatures::default(),
            capture_start: CaptureStart::default(),
            verbosity: VerbosityToggle::default(),
        }
    }

    /// Defaults overridden by `OMAPI_SCOPE_SOCKET` and `OMAPI_SCOPE_REDUCED`.
    ///
    /// # Errors
    /// Returns an error if the source identity is empty or a variable holds an
    /// unrecognised value.
    pub fn from_env(source_identity: impl Into<String>) -> Result<Self, ConfigError> {
        Self::from_lookup(source_identity, |name| std::env::var(name).ok())
    }

    fn from_lookup(
        source_identity: impl Into<String>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut config = Self::new(source_identity);
        if config.source_identity.is_empty() {
            return Err(ConfigError::Empty("source identity"));
        }

        if let Some(path) = lookup(ENV_SOCKET_PATH) {
            if path.is_empty() {
                return Err(ConfigError::Empty(ENV_SOCKET_PATH));
            }
            config.socket_path = PathBuf::from(path);
        }

        if let Some(value) = lookup(ENV_REDUCED_VERBOSITY) {
            let reduced = parse_flag(ENV_REDUCED_VERBOSITY, &value)?;
            config.verbosity.set_reduced(reduced);
        }

        Ok(config)
    }

    #[must_use]
    pub fn with_socket_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.socket_path = path.into();
        self
    }

    #[must_use]
    pub fn with_signatures(mut self, signatures: ObserverSignatures) -> Self {
        self.signatures = signatures;
        self
    }

    #[must_use]
    pub fn with_capture_start(mut self, capture_start: CaptureStart) -> Self {
        self.capture_start = capture_start;
        self
    }
}

fn parse_flag(variable: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidFlag {
            variable,
            value: value.to_owned(),
        }),
    }
}
