//! Resource governor: memory cap, code-size gate, and the time-budget cascade.
//!
//! Three bounds, three layers:
//! 1. [`apply_memory_cap`] — a process-wide address-space cap applied once at
//!    startup. OS-enforced on unix via `setrlimit(RLIMIT_AS)`; a warning-only
//!    no-op on targets without the facility.
//! 2. [`check_code_size`] — pre-validation byte-length gate.
//! 3. [`TimeBudget`] — the per-request cascade: the engine receives the total
//!    request budget and a fixed 10% per-path slice
//!    ([`PER_PATH_TIMEOUT_RATIO`](crate::config::PER_PATH_TIMEOUT_RATIO)).
//!
//! Timeouts are carried end-to-end by the engine's own limits; the
//! orchestrator never cancels threads.

use thiserror::Error;

use crate::config::{MAX_REQUEST_TIMEOUT_SECONDS, PER_PATH_TIMEOUT_RATIO};
use crate::error::AnalysisError;

/// The memory cap could not be applied on a platform that has the facility.
#[derive(Debug, Error)]
#[error("failed to apply the {limit_mb} MiB address-space cap")]
pub struct MemoryCapError {
    pub limit_mb: u64,
}

/// Applies a process-wide address-space cap of `limit_mb` MiB.
///
/// Called once at startup, before the first request. The cap is process
/// global; it is never adjusted per request. On non-unix targets there is no
/// portable equivalent, so the call logs a warning and succeeds.
#[cfg(unix)]
pub fn apply_memory_cap(limit_mb: u64) -> Result<(), MemoryCapError> {
    let bytes = limit_mb.saturating_mul(1024 * 1024);
    let limit = libc::rlimit {
        rlim_cur: bytes as libc::rlim_t,
        rlim_max: bytes as libc::rlim_t,
    };
    // Single syscall; the pointer is valid for the duration of the call.
    let rc = unsafe { libc::setrlimit(libc::RLIMIT_AS, &limit) };
    if rc != 0 {
        return Err(MemoryCapError { limit_mb });
    }
    tracing::debug!(limit_mb, "address-space cap applied");
    Ok(())
}

/// No address-space limit facility on this target; warn and continue.
#[cfg(not(unix))]
pub fn apply_memory_cap(limit_mb: u64) -> Result<(), MemoryCapError> {
    tracing::warn!(limit_mb, "no address-space cap facility on this platform; running uncapped");
    Ok(())
}

/// Rejects source longer than `limit` bytes.
///
/// Length exactly at the limit is accepted. The message is the enumerated
/// reason clients see; it carries no sizes beyond the configured limit.
pub fn check_code_size(source: &str, limit: u64) -> Result<(), AnalysisError> {
    if source.len() as u64 > limit {
        return Err(AnalysisError::Validation("code size exceeds limit".to_string()));
    }
    Ok(())
}

/// Per-request time budget, derived once and passed to the engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeBudget {
    /// Total seconds for the whole analysis.
    pub total_seconds: f64,
    /// Seconds granted to each explored path: `total * 0.10`, fixed.
    pub per_path_seconds: f64,
}

impl TimeBudget {
    pub fn new(total_seconds: u64) -> Self {
        let total = total_seconds as f64;
        Self {
            total_seconds: total,
            per_path_seconds: total * PER_PATH_TIMEOUT_RATIO,
        }
    }
}

/// Resolves a client-requested timeout against the operation default.
///
/// `None` takes the default; `Some(0)` and values above
/// [`MAX_REQUEST_TIMEOUT_SECONDS`] are rejected with `ValueError`.
pub fn resolve_timeout(requested: Option<u64>, default_seconds: u64) -> Result<u64, AnalysisError> {
    match requested {
        None => Ok(default_seconds),
        Some(0) => Err(AnalysisError::Value(
            "timeout_seconds must be a positive integer".to_string(),
        )),
        Some(s) if s > MAX_REQUEST_TIMEOUT_SECONDS => Err(AnalysisError::Value(format!(
            "timeout_seconds must not exceed {MAX_REQUEST_TIMEOUT_SECONDS}"
        ))),
        Some(s) => Ok(s),
    }
}
