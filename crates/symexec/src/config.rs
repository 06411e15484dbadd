//! Bounds-checked process configuration.
//!
//! Every numeric knob reads an environment variable prefixed `SYMBOLIC_`.
//! Unset or non-numeric values fall back to the default; numeric values
//! outside the admissible range are a **startup error** naming the variable
//! and the violated bound. [`Config`] is constructed once before any request
//! is accepted and is immutable afterwards — it is passed by reference (or
//! `Arc`) into the orchestrator, never stored in a mutable global.

use serde::Serialize;
use thiserror::Error;

/// Fraction of the total time budget granted to each explored path.
///
/// Fixed policy, not a tunable: holding the ratio at 0.10 guarantees about
/// ten paths receive a fair allocation regardless of the requested total.
pub const PER_PATH_TIMEOUT_RATIO: f64 = 0.10;

/// Hard ceiling on any client-requested timeout, in seconds.
pub const MAX_REQUEST_TIMEOUT_SECONDS: u64 = 3600;

const DEFAULT_MEMORY_LIMIT_MB: u64 = 2048;
const DEFAULT_CODE_SIZE_LIMIT: u64 = 65_536;
const DEFAULT_COVERAGE_EXHAUSTIVE_THRESHOLD: u64 = 1000;
const DEFAULT_ANALYSIS_TIMEOUT_SECONDS: u64 = 30;
const DEFAULT_EQUIVALENCE_TIMEOUT_SECONDS: u64 = 60;

/// A configuration variable carried a numeric value outside its bounds.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{variable}={value} is outside the admissible range {lo}..={hi}")]
pub struct ConfigError {
    pub variable: &'static str,
    pub value: u64,
    pub lo: u64,
    pub hi: u64,
}

/// Immutable process configuration.
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    /// Process address-space cap in MiB, applied once at startup.
    pub memory_limit_mb: u64,
    /// Maximum accepted source size in bytes.
    pub code_size_limit: u64,
    /// Path count at which coverage stops being reported as exhaustive.
    pub coverage_exhaustive_threshold: u64,
    /// Default time budget for contract check, exception search, and branch
    /// analysis, in seconds.
    pub default_timeout_seconds: u64,
    /// Default time budget for equivalence checking, in seconds.
    pub equivalence_timeout_seconds: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            memory_limit_mb: DEFAULT_MEMORY_LIMIT_MB,
            code_size_limit: DEFAULT_CODE_SIZE_LIMIT,
            coverage_exhaustive_threshold: DEFAULT_COVERAGE_EXHAUSTIVE_THRESHOLD,
            default_timeout_seconds: DEFAULT_ANALYSIS_TIMEOUT_SECONDS,
            equivalence_timeout_seconds: DEFAULT_EQUIVALENCE_TIMEOUT_SECONDS,
        }
    }
}

impl Config {
    /// Loads the configuration from `SYMBOLIC_*` environment variables.
    ///
    /// Must be called before the first request; the returned value is the
    /// only configuration the process ever uses. Returns the first bounds
    /// violation encountered, in declaration order.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            memory_limit_mb: parse_bounded(
                "SYMBOLIC_MEMORY_LIMIT_MB",
                std::env::var("SYMBOLIC_MEMORY_LIMIT_MB").ok().as_deref(),
                DEFAULT_MEMORY_LIMIT_MB,
                128,
                65_536,
            )?,
            code_size_limit: parse_bounded(
                "SYMBOLIC_CODE_SIZE_LIMIT",
                std::env::var("SYMBOLIC_CODE_SIZE_LIMIT").ok().as_deref(),
                DEFAULT_CODE_SIZE_LIMIT,
                1024,
                1_048_576,
            )?,
            coverage_exhaustive_threshold: parse_bounded(
                "SYMBOLIC_COVERAGE_EXHAUSTIVE_THRESHOLD",
                std::env::var("SYMBOLIC_COVERAGE_EXHAUSTIVE_THRESHOLD").ok().as_deref(),
                DEFAULT_COVERAGE_EXHAUSTIVE_THRESHOLD,
                100,
                100_000,
            )?,
            default_timeout_seconds: parse_bounded(
                "SYMBOLIC_DEFAULT_ANALYSIS_TIMEOUT_SECONDS",
                std::env::var("SYMBOLIC_DEFAULT_ANALYSIS_TIMEOUT_SECONDS").ok().as_deref(),
                DEFAULT_ANALYSIS_TIMEOUT_SECONDS,
                1,
                MAX_REQUEST_TIMEOUT_SECONDS,
            )?,
            equivalence_timeout_seconds: parse_bounded(
                "SYMBOLIC_EQUIVALENCE_TIMEOUT_SECONDS",
                std::env::var("SYMBOLIC_EQUIVALENCE_TIMEOUT_SECONDS").ok().as_deref(),
                DEFAULT_EQUIVALENCE_TIMEOUT_SECONDS,
                1,
                MAX_REQUEST_TIMEOUT_SECONDS,
            )?,
        })
    }
}

/// Parses one bounded numeric configuration value.
///
/// `raw == None` (unset) and non-numeric values fall back to `default`; a
/// numeric value outside `lo..=hi` is a [`ConfigError`] naming the variable.
fn parse_bounded(
    variable: &'static str,
    raw: Option<&str>,
    default: u64,
    lo: u64,
    hi: u64,
) -> Result<u64, ConfigError> {
    let value = match raw.and_then(|s| s.trim().parse::<u64>().ok()) {
        Some(v) => v,
        None => default,
    };
    if value < lo || value > hi {
        return Err(ConfigError { variable, value, lo, hi });
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── parse_bounded ─────────────────────────────────────────────────────────

    #[test]
    fn test_unset_falls_back_to_default() {
        assert_eq!(parse_bounded("SYMBOLIC_X", None, 2048, 128, 65_536), Ok(2048));
    }

    #[test]
    fn test_non_numeric_falls_back_to_default() {
        assert_eq!(
            parse_bounded("SYMBOLIC_X", Some("plenty"), 2048, 128, 65_536),
            Ok(2048)
        );
        assert_eq!(
            parse_bounded("SYMBOLIC_X", Some(""), 2048, 128, 65_536),
            Ok(2048)
        );
        assert_eq!(
            parse_bounded("SYMBOLIC_X", Some("-5"), 2048, 128, 65_536),
            Ok(2048)
        );
    }

    #[test]
    fn test_in_range_value_is_used() {
        assert_eq!(
            parse_bounded("SYMBOLIC_X", Some("4096"), 2048, 128, 65_536),
            Ok(4096)
        );
        assert_eq!(
            parse_bounded("SYMBOLIC_X", Some(" 512 "), 2048, 128, 65_536),
            Ok(512)
        );
    }

    #[test]
    fn test_bounds_are_inclusive() {
        assert_eq!(parse_bounded("SYMBOLIC_X", Some("128"), 2048, 128, 65_536), Ok(128));
        assert_eq!(
            parse_bounded("SYMBOLIC_X", Some("65536"), 2048, 128, 65_536),
            Ok(65_536)
        );
    }

    #[test]
    fn test_below_lower_bound_fails_naming_variable_and_bound() {
        let err = parse_bounded("SYMBOLIC_MEMORY_LIMIT_MB", Some("64"), 2048, 128, 65_536)
            .expect_err("64 is below the lower bound");
        assert_eq!(err.variable, "SYMBOLIC_MEMORY_LIMIT_MB");
        assert_eq!(err.value, 64);
        let msg = err.to_string();
        assert!(msg.contains("SYMBOLIC_MEMORY_LIMIT_MB"), "message names the variable: {msg}");
        assert!(msg.contains("128"), "message names the violated bound: {msg}");
    }

    #[test]
    fn test_above_upper_bound_fails() {
        let err = parse_bounded("SYMBOLIC_CODE_SIZE_LIMIT", Some("2097152"), 65_536, 1024, 1_048_576)
            .expect_err("2 MiB is above the upper bound");
        assert_eq!(err.value, 2_097_152);
        assert_eq!(err.hi, 1_048_576);
    }

    // ── Defaults ──────────────────────────────────────────────────────────────

    #[test]
    fn test_default_config_values() {
        let config = Config::default();
        assert_eq!(config.memory_limit_mb, 2048);
        assert_eq!(config.code_size_limit, 65_536);
        assert_eq!(config.coverage_exhaustive_threshold, 1000);
        assert_eq!(config.default_timeout_seconds, 30);
        assert_eq!(config.equivalence_timeout_seconds, 60);
    }

    #[test]
    fn test_per_path_ratio_is_fixed_policy() {
        assert!((PER_PATH_TIMEOUT_RATIO - 0.10).abs() < f64::EPSILON);
    }
}
