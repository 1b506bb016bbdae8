#![forbid(unsafe_code)]

//! Window-layer configuration with environment overrides.
//!
//! | Variable | Field | Default |
//! |----------|-------|---------|
//! | `QGRID_PAGE_SIZE` | `page_size` | 50 |
//! | `QGRID_DEBOUNCE_MS` | `debounce` | 550 |
//! | `QGRID_PRIME_FIRST_PAGE` | `prime_first_page` | true |
//!
//! Unparseable values keep the default and are reported through
//! [`ConfigParse::errors`]; [`WindowConfig::from_env`] logs them and moves on.

use std::env;
use std::fmt;
use std::time::Duration;

/// Rows per fetched page.
pub const DEFAULT_PAGE_SIZE: usize = 50;

/// Quiet period before a range change is acted on.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(550);

const ENV_PAGE_SIZE: &str = "QGRID_PAGE_SIZE";
const ENV_DEBOUNCE_MS: &str = "QGRID_DEBOUNCE_MS";
const ENV_PRIME_FIRST_PAGE: &str = "QGRID_PRIME_FIRST_PAGE";

/// Configuration for a query session's row window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowConfig {
    /// Rows per page. Fixed for the lifetime of a coalescer.
    pub page_size: usize,
    /// Trailing debounce delay for range changes.
    pub debounce: Duration,
    /// Request the first page as soon as an execution completes.
    pub prime_first_page: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            debounce: DEFAULT_DEBOUNCE,
            prime_first_page: true,
        }
    }
}

/// Configuration parse diagnostics (env + validation).
#[derive(Debug, Clone)]
pub struct ConfigParse {
    pub config: WindowConfig,
    pub errors: Vec<ConfigError>,
}

/// Configuration error with field context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    pub field: &'static str,
    pub value: String,
    pub message: String,
}

impl ConfigError {
    pub fn new(field: &'static str, value: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field,
            value: value.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={} ({})", self.field, self.value, self.message)
    }
}

impl std::error::Error for ConfigError {}

impl WindowConfig {
    /// Parse config from environment variables, logging any rejected values.
    #[must_use]
    pub fn from_env() -> Self {
        let parsed = Self::from_env_with_diagnostics();
        for error in &parsed.errors {
            tracing::warn!(%error, "ignoring invalid window config override");
        }
        parsed.config
    }

    /// Parse config from environment variables, returning diagnostics.
    #[must_use]
    pub fn from_env_with_diagnostics() -> ConfigParse {
        Self::from_env_with(|key| env::var(key).ok())
    }

    /// Parse config through an arbitrary lookup (tests, CLI layers).
    pub fn from_env_with<F>(mut get: F) -> ConfigParse
    where
        F: FnMut(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let mut errors = Vec::new();

        if let Some(value) = get(ENV_PAGE_SIZE) {
            match value.trim().parse::<usize>() {
                Ok(parsed) if parsed > 0 => config.page_size = parsed,
                _ => errors.push(ConfigError::new(
                    "page_size",
                    value,
                    "expected positive integer",
                )),
            }
        }

        if let Some(value) = get(ENV_DEBOUNCE_MS) {
            match value.trim().parse::<u64>() {
                Ok(ms) => config.debounce = Duration::from_millis(ms),
                Err(_) => errors.push(ConfigError::new(
                    "debounce_ms",
                    value,
                    "expected integer milliseconds",
                )),
            }
        }

        if let Some(value) = get(ENV_PRIME_FIRST_PAGE) {
            match parse_bool(&value) {
                Some(parsed) => config.prime_first_page = parsed,
                None => errors.push(ConfigError::new(
                    "prime_first_page",
                    value,
                    "expected bool (1/0/true/false)",
                )),
            }
        }

        ConfigParse { config, errors }
    }

    /// Validate config constraints and return all violations.
    pub fn validate(&self) -> Result<(), Vec<ConfigError>> {
        let mut errors = Vec::new();
        if self.page_size == 0 {
            errors.push(ConfigError::new(
                "page_size",
                "0",
                "page size must be greater than 0",
            ));
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    #[must_use]
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    #[must_use]
    pub fn with_prime_first_page(mut self, enabled: bool) -> Self {
        self.prime_first_page = enabled;
        self
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
