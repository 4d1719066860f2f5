//! Configuration for grid searches and sweep files.
//!
//! A sweep file is YAML describing the parameter space and how to run it.
//! Values may reference environment variables as `${VAR}` or
//! `${VAR:-default}`.
//!
//! # Usage
//!
//! ```rust,ignore
//! use grid_searcher::config::load_sweep;
//!
//! // Load from default path (sweep.yaml)
//! let sweep = load_sweep(None)?;
//!
//! // Load from custom path
//! let sweep = load_sweep(Some("sweeps/lr.yaml"))?;
//!
//! println!("{} parameters", sweep.parameters.len());
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::SearchError;
use crate::grid::ParameterSpace;

/// Default progress bar width in columns.
pub const DEFAULT_BAR_WIDTH: usize = 60;

/// Widest progress bar accepted by [`SearchConfig::validate`].
pub const MAX_BAR_WIDTH: usize = 1024;

/// Default minimum interval between progress polls.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_millis(100);

/// What to do when a model fails to configure or run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Abort the whole search with the first failure.
    #[default]
    Abort,
    /// Record the failure in the store and keep going. Never retries.
    Isolate,
}

/// Runtime configuration for a grid search.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Worker threads (`None` = available parallelism minus one).
    pub workers: Option<usize>,

    /// Whether to render the progress bar.
    pub verbose: bool,

    /// Minimum interval between progress polls.
    pub refresh_interval: Duration,

    /// Progress bar width in columns.
    pub bar_width: usize,

    /// Handling of model failures.
    pub failure_policy: FailurePolicy,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            workers: None,
            verbose: true,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            bar_width: DEFAULT_BAR_WIDTH,
            failure_policy: FailurePolicy::Abort,
        }
    }
}

impl SearchConfig {
    /// Set the worker count.
    #[must_use]
    pub const fn with_workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    /// Disable the progress bar.
    #[must_use]
    pub const fn quiet(mut self) -> Self {
        self.verbose = false;
        self
    }

    /// Set the failure policy.
    #[must_use]
    pub const fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Get effective worker count.
    #[must_use]
    pub fn effective_workers(&self) -> usize {
        self.workers.unwrap_or_else(default_workers)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns an invalid-configuration error for zero workers, a bar width
    /// outside `1..=MAX_BAR_WIDTH` or a zero refresh interval.
    pub fn validate(&self) -> Result<(), SearchError> {
        if self.workers == Some(0) {
            return Err(SearchError::invalid("workers must be at least 1"));
        }
        if self.bar_width == 0 {
            return Err(SearchError::invalid("bar_width must be at least 1"));
        }
        if self.bar_width > MAX_BAR_WIDTH {
            return Err(SearchError::invalid(format!(
                "bar_width must be at most {MAX_BAR_WIDTH}, got {}",
                self.bar_width
            )));
        }
        if self.refresh_interval.is_zero() {
            return Err(SearchError::invalid("refresh_interval must be positive"));
        }
        Ok(())
    }
}

/// Available parallelism minus one, never below one.
#[must_use]
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map_or(1, std::num::NonZeroUsize::get)
        .saturating_sub(1)
        .max(1)
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read sweep file.
    #[error("Failed to read sweep file '{path}': {source}")]
    ReadError {
        /// Path to the sweep file.
        path: String,
        /// The underlying IO error.
        source: std::io::Error,
    },

    /// Failed to parse YAML.
    #[error("Failed to parse sweep YAML: {0}")]
    ParseError(#[from] serde_yaml_bw::Error),

    /// Sweep validation failed.
    #[error("Sweep validation failed: {0}")]
    ValidationError(String),
}

/// Root sweep file structure.
#[derive(Debug, Clone, Deserialize)]
pub struct SweepFile {
    /// Parameter names mapped to candidate values, in declaration order.
    pub parameters: ParameterSpace,
    /// Search settings.
    #[serde(default)]
    pub search: SearchSection,
    /// Output settings.
    #[serde(default)]
    pub output: OutputSection,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl SweepFile {
    /// Runtime configuration described by the `search` section.
    #[must_use]
    pub const fn search_config(&self) -> SearchConfig {
        SearchConfig {
            workers: self.search.workers,
            verbose: self.search.verbose,
            refresh_interval: Duration::from_millis(self.search.refresh_interval_ms),
            bar_width: self.search.bar_width,
            failure_policy: if self.search.isolate_failures {
                FailurePolicy::Isolate
            } else {
                FailurePolicy::Abort
            },
        }
    }
}

/// `search` section of a sweep file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchSection {
    /// Worker threads.
    #[serde(default)]
    pub workers: Option<usize>,
    /// Render the progress bar.
    #[serde(default = "default_true")]
    pub verbose: bool,
    /// Minimum interval between progress polls, in milliseconds.
    #[serde(default = "default_refresh_interval_ms")]
    pub refresh_interval_ms: u64,
    /// Progress bar width in columns.
    #[serde(default = "default_bar_width")]
    pub bar_width: usize,
    /// Record failing combinations instead of aborting.
    #[serde(default)]
    pub isolate_failures: bool,
}

impl Default for SearchSection {
    fn default() -> Self {
        Self {
            workers: None,
            verbose: true,
            refresh_interval_ms: default_refresh_interval_ms(),
            bar_width: DEFAULT_BAR_WIDTH,
            isolate_failures: false,
        }
    }
}

/// `output` section of a sweep file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputSection {
    /// Where to persist results; nothing is written when unset.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level, overridden by `RUST_LOG`.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Output format: `pretty` or `json`.
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

const fn default_true() -> bool {
    true
}

const fn default_refresh_interval_ms() -> u64 {
    DEFAULT_REFRESH_INTERVAL.as_millis() as u64
}

const fn default_bar_width() -> usize {
    DEFAULT_BAR_WIDTH
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

/// Load a sweep file from a YAML path.
///
/// # Errors
///
/// Returns a `ConfigError` if the file cannot be read, parsed, or validated.
pub fn load_sweep(path: Option<&str>) -> Result<SweepFile, ConfigError> {
    let path = path.unwrap_or("sweep.yaml");

    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_string(),
        source: e,
    })?;

    load_sweep_from_string(&contents)
}

/// Load a sweep from a YAML string (useful for testing).
///
/// # Errors
///
/// Returns a `ConfigError` if the YAML cannot be parsed or validated.
pub fn load_sweep_from_string(yaml: &str) -> Result<SweepFile, ConfigError> {
    let interpolated = interpolate_env_vars(yaml);
    let sweep: SweepFile = serde_yaml_bw::from_str(&interpolated)?;
    validate_sweep(&sweep)?;
    Ok(sweep)
}

/// Interpolate environment variables in a string.
///
/// Supports both `${VAR}` and `${VAR:-default}` syntax.
#[allow(clippy::expect_used)] // Regex is compile-time constant; expect() is safe here
fn interpolate_env_vars(input: &str) -> String {
    use std::sync::OnceLock;

    static ENV_VAR_REGEX: OnceLock<regex::Regex> = OnceLock::new();

    let re = ENV_VAR_REGEX.get_or_init(|| {
        regex::Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
            .expect("env var regex is valid")
    });

    re.replace_all(input, |cap: &regex::Captures<'_>| {
        let default_value = cap.get(2).map(|m| m.as_str());
        match std::env::var(&cap[1]) {
            Ok(v) if !v.is_empty() => v,
            _ => default_value.map_or_else(String::new, str::to_string),
        }
    })
    .into_owned()
}

/// Validate sweep values.
fn validate_sweep(sweep: &SweepFile) -> Result<(), ConfigError> {
    sweep
        .search_config()
        .validate()
        .map_err(|e| ConfigError::ValidationError(e.to_string()))?;

    if !matches!(sweep.logging.format.as_str(), "pretty" | "json") {
        return Err(ConfigError::ValidationError(format!(
            "logging.format must be 'pretty' or 'json', got '{}'",
            sweep.logging.format
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;
    use crate::types::ParamValue;

    const MINIMAL: &str = "
parameters:
  a: [1, 2]
  b: [10, 20]
";

    #[test]
    fn test_search_config_default() {
        let config = SearchConfig::default();

        assert_eq!(config.workers, None);
        assert!(config.verbose);
        assert_eq!(config.refresh_interval, Duration::from_millis(100));
        assert_eq!(config.bar_width, 60);
        assert_eq!(config.failure_policy, FailurePolicy::Abort);
        assert!(config.effective_workers() >= 1);
    }

    #[test]
    fn test_search_config_rejects_zero_workers() {
        let config = SearchConfig::default().with_workers(0);
        assert!(matches!(
            config.validate(),
            Err(SearchError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn test_bar_width_cap_is_inclusive() {
        let config = SearchConfig {
            bar_width: MAX_BAR_WIDTH,
            ..SearchConfig::default()
        };
        assert!(config.validate().is_ok());

        let config = SearchConfig {
            bar_width: usize::MAX,
            ..SearchConfig::default()
        };
        let Err(SearchError::InvalidConfiguration { message }) = config.validate() else {
            panic!("expected invalid configuration");
        };
        assert!(message.contains("bar_width"));
    }

    #[test]
    fn test_minimal_sweep_defaults() {
        let sweep = load_sweep_from_string(MINIMAL).unwrap();

        assert_eq!(sweep.parameters.names(), ["a", "b"]);
        assert_eq!(sweep.parameters.total_combinations().unwrap(), 4);
        assert!(sweep.output.path.is_none());
        assert_eq!(sweep.logging.level, "info");

        let config = sweep.search_config();
        assert!(config.verbose);
        assert_eq!(config.bar_width, DEFAULT_BAR_WIDTH);
        assert_eq!(config.refresh_interval, DEFAULT_REFRESH_INTERVAL);
    }

    #[test]
    fn test_full_sweep() {
        let yaml = "
parameters:
  optimizer: [sgd, adam]
  lr: [0.1, 0.01]
  layers: [[64, 32]]
search:
  workers: 3
  verbose: false
  refresh_interval_ms: 250
  bar_width: 40
  isolate_failures: true
output:
  path: results.json
logging:
  level: debug
  format: json
";
        let sweep = load_sweep_from_string(yaml).unwrap();
        let config = sweep.search_config();

        assert_eq!(config.workers, Some(3));
        assert!(!config.verbose);
        assert_eq!(config.refresh_interval, Duration::from_millis(250));
        assert_eq!(config.bar_width, 40);
        assert_eq!(config.failure_policy, FailurePolicy::Isolate);
        assert_eq!(sweep.output.path, Some(PathBuf::from("results.json")));
        assert_eq!(
            sweep.parameters.values("optimizer"),
            Some(&[ParamValue::from("sgd"), ParamValue::from("adam")][..])
        );
        assert_eq!(
            sweep.parameters.values("layers"),
            Some(&[ParamValue::from(vec![64_i64, 32])][..])
        );
    }

    #[test]
    fn test_env_interpolation_with_default() {
        let yaml = "
parameters:
  seed: [${GRID_SEARCHER_TEST_UNSET_SEED:-7}]
search:
  workers: ${GRID_SEARCHER_TEST_UNSET_WORKERS:-2}
";
        let sweep = load_sweep_from_string(yaml).unwrap();

        assert_eq!(sweep.search.workers, Some(2));
        assert_eq!(sweep.parameters.values("seed"), Some(&[ParamValue::Int(7)][..]));
    }

    #[test_case("parameters: {}\n" ; "empty space")]
    #[test_case("parameters:\n  a: []\n" ; "empty value list")]
    #[test_case("search:\n  workers: 1\n" ; "missing parameters")]
    #[test_case("parameters:\n  a: [1.0, .inf]\n" ; "infinite value")]
    #[test_case("parameters:\n  a: [[0.5, .nan]]\n" ; "nan inside list")]
    fn test_invalid_space_is_parse_error(yaml: &str) {
        assert!(matches!(
            load_sweep_from_string(yaml),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test_case("search:\n  workers: 0\n" ; "zero workers")]
    #[test_case("search:\n  bar_width: 0\n" ; "zero bar width")]
    #[test_case("search:\n  bar_width: 1025\n" ; "bar width above cap")]
    #[test_case("search:\n  bar_width: 18446744073709551615\n" ; "bar width at usize max")]
    #[test_case("search:\n  refresh_interval_ms: 0\n" ; "zero interval")]
    #[test_case("logging:\n  format: xml\n" ; "unknown log format")]
    fn test_validation_errors(section: &str) {
        let yaml = format!("{MINIMAL}{section}");
        assert!(matches!(
            load_sweep_from_string(&yaml),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        let result = load_sweep(Some("/nonexistent/sweep.yaml"));
        assert!(matches!(result, Err(ConfigError::ReadError { .. })));
    }
}
