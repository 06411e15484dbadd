//! Error taxonomy for analysis operations.
//!
//! Every failure that can reach a client maps to one of six wire-stable
//! `error_type` strings. Messages are composed exclusively from enumerated
//! reasons and names the client already supplied; scratch paths, unit
//! identifiers, tracebacks, and engine internals never appear in them.

use thiserror::Error;

/// A failed analysis operation, classified for the wire.
///
/// The variant determines the `error_type` field of the JSON error response;
/// the `Display` rendering is the client-visible `message`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnalysisError {
    /// Target function not found, invalid exception name, or incompatible
    /// signatures for an equivalence request.
    #[error("{0}")]
    Value(String),

    /// The source failed to parse. `line` is 1-based, 0 when unknown.
    #[error("{message}")]
    Syntax { message: String, line: u32 },

    /// The source violated the security policy; the sub-reason names the
    /// rule that fired and the offending construct.
    #[error("{0}")]
    Validation(String),

    /// An import was refused at load time. The validator should have caught
    /// this earlier; reaching it indicates a validator gap.
    #[error("import of module '{0}' was refused at load time")]
    Import(String),

    /// The analysis exceeded its time budget.
    #[error("analysis exceeded the configured time budget")]
    Timeout,

    /// Any unexpected condition. The message is deliberately generic.
    #[error("internal error")]
    Runtime,
}

impl AnalysisError {
    /// The wire `error_type` string for this error.
    pub fn error_type(&self) -> &'static str {
        match self {
            AnalysisError::Value(_) => "ValueError",
            AnalysisError::Syntax { .. } => "SyntaxError",
            AnalysisError::Validation(_) => "ValidationError",
            AnalysisError::Import(_) => "ImportError",
            AnalysisError::Timeout => "TimeoutError",
            AnalysisError::Runtime => "RuntimeError",
        }
    }
}
