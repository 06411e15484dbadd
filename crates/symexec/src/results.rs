//! Operation result shapes.
//!
//! Each operation returns a closed sum serialized with a `status` tag, so
//! the wire shape is the `{"status": ..., ...}` object clients switch on.
//! Every variant, success or failure, carries `time_seconds`. Error variants
//! carry the `error_type` wire string and a masked message.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::AnalysisError;

// ── Shared pieces ─────────────────────────────────────────────────────────────

/// A concrete assignment of argument values demonstrating a contract
/// violation or a triggered exception.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Counterexample {
    /// Positional arguments, keyed by the parameter names extracted from the
    /// source signature.
    pub args: Map<String, Value>,
    /// Keyword arguments. Empty unless the engine reports them separately.
    pub kwargs: Map<String, Value>,
    /// What was violated, as reported by the engine.
    pub violation: String,
    /// The value the function actually produced, when the engine saw one.
    pub actual_result: String,
    /// The path condition under which the violation occurred.
    pub path_condition: String,
}

/// Whether a branch can be entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Reachability {
    Reachable,
    Unreachable,
    Unknown,
}

/// One decision point of the analyzed function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BranchRecord {
    /// 1-based source line of the decision.
    pub line: u32,
    /// The condition as written in the source.
    pub condition_text: String,
    pub reachability: Reachability,
}

// ── Per-operation results ─────────────────────────────────────────────────────

/// Outcome of a contract check.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ContractCheckResult {
    Verified {
        paths_explored: u64,
        paths_verified: u64,
        coverage_estimate: f64,
        time_seconds: f64,
    },
    Counterexample {
        counterexamples: Vec<Counterexample>,
        paths_explored: u64,
        paths_verified: u64,
        coverage_estimate: f64,
        time_seconds: f64,
    },
    Timeout {
        message: String,
        paths_explored: u64,
        time_seconds: f64,
    },
    Error {
        error_type: String,
        message: String,
        time_seconds: f64,
    },
}

impl ContractCheckResult {
    pub fn error(err: &AnalysisError, time_seconds: f64) -> Self {
        Self::Error {
            error_type: err.error_type().to_string(),
            message: err.to_string(),
            time_seconds,
        }
    }
}

/// Outcome of an exception path search.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExceptionPathResult {
    Found {
        triggering_inputs: Vec<Map<String, Value>>,
        paths_explored: u64,
        time_seconds: f64,
    },
    Unreachable {
        paths_explored: u64,
        time_seconds: f64,
    },
    Error {
        error_type: String,
        message: String,
        time_seconds: f64,
    },
}

impl ExceptionPathResult {
    pub fn error(err: &AnalysisError, time_seconds: f64) -> Self {
        Self::Error {
            error_type: err.error_type().to_string(),
            message: err.to_string(),
            time_seconds,
        }
    }
}

/// Outcome of an equivalence check. Timeouts never surface as `equivalent`
/// or `different`; uncertainty is reported as an error instead.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EquivalenceResult {
    Equivalent {
        confidence: String,
        paths_explored: u64,
        time_seconds: f64,
    },
    Different {
        distinguishing_input: Map<String, Value>,
        confidence: String,
        paths_explored: u64,
        time_seconds: f64,
    },
    Error {
        error_type: String,
        message: String,
        time_seconds: f64,
    },
}

impl EquivalenceResult {
    pub fn error(err: &AnalysisError, time_seconds: f64) -> Self {
        Self::Error {
            error_type: err.error_type().to_string(),
            message: err.to_string(),
            time_seconds,
        }
    }
}

/// Outcome of a branch analysis.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BranchAnalysisResult {
    Success {
        branches: Vec<BranchRecord>,
        cyclomatic_complexity: u32,
        dead_code_lines: Vec<u32>,
        time_seconds: f64,
    },
    Error {
        error_type: String,
        message: String,
        time_seconds: f64,
    },
}

impl BranchAnalysisResult {
    pub fn error(err: &AnalysisError, time_seconds: f64) -> Self {
        Self::Error {
            error_type: err.error_type().to_string(),
            message: err.to_string(),
            time_seconds,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
