//! The symbolic engine seam.
//!
//! The orchestrator drives any engine that can (a) analyze one callable of a
//! loaded unit under time limits and contract styles, yielding classified
//! messages, and (b) judge whether a branch condition is satisfiable. The
//! in-process default is [`ProbeEngine`](crate::probe::ProbeEngine); an
//! SMT-backed engine slots in behind the same trait without touching the
//! orchestrator.

use thiserror::Error;

use crate::governor::TimeBudget;
use crate::isolation::IsolatedUnit;
use crate::results::{BranchRecord, Reachability};

/// Classification of one engine message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// No input satisfies the declared preconditions.
    PreUnsat,
    /// A postcondition (or inline assertion) failed.
    PostFail,
    /// Execution raised an exception.
    ExecErr,
    /// A condition was confirmed on some path.
    Confirmed,
}

/// One message from an engine run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisMessage {
    pub kind: MessageKind,
    /// Human-readable summary. For `ExecErr` it opens with the exception
    /// class name followed by a colon.
    pub text: String,
    /// Concrete inputs in the engine's tuple rendering, when available.
    pub offending_inputs: Option<String>,
    /// What the callable actually produced, when the engine saw a value.
    pub actual_result: Option<String>,
    /// The path condition under which the message was produced.
    pub path_condition: Option<String>,
}

impl AnalysisMessage {
    pub fn exec_err(text: impl Into<String>, offending_inputs: Option<String>) -> Self {
        Self {
            kind: MessageKind::ExecErr,
            text: text.into(),
            offending_inputs,
            actual_result: None,
            path_condition: None,
        }
    }

    pub fn post_fail(text: impl Into<String>, offending_inputs: Option<String>) -> Self {
        Self {
            kind: MessageKind::PostFail,
            text: text.into(),
            offending_inputs,
            actual_result: None,
            path_condition: None,
        }
    }
}

/// Contract styles an engine is asked to honor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractStyle {
    /// `assert` statements inside the function body.
    InlineAsserts,
    /// `pre:` / `post:` declarations embedded in the docstring.
    DocstringContracts,
    /// Decorator-declared contracts.
    DecoratorContracts,
    /// Checks implied by parameter and return annotations.
    TypeChecks,
}

/// Options passed to the engine on every analysis call.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineOptions {
    /// Total budget for the whole analysis, in seconds.
    pub per_condition_timeout_seconds: f64,
    /// Budget for each explored path: one tenth of the total, fixed.
    pub per_path_timeout_seconds: f64,
    pub contract_styles: Vec<ContractStyle>,
}

impl EngineOptions {
    /// The standard option set: the request's budget and every supported
    /// contract style.
    pub fn standard(budget: &TimeBudget) -> Self {
        Self {
            per_condition_timeout_seconds: budget.total_seconds,
            per_path_timeout_seconds: budget.per_path_seconds,
            contract_styles: vec![
                ContractStyle::InlineAsserts,
                ContractStyle::DocstringContracts,
                ContractStyle::DecoratorContracts,
                ContractStyle::TypeChecks,
            ],
        }
    }
}

/// What one engine run produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineReport {
    pub messages: Vec<AnalysisMessage>,
    pub paths_explored: u64,
    pub paths_verified: u64,
    /// The engine stopped because the budget ran out. Messages gathered
    /// before the cutoff are still present.
    pub timed_out: bool,
}

/// Engine-level failure, distinct from message-level findings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("engine exceeded the analysis time budget")]
    Timeout,
    /// The engine refused an import the validator admitted.
    #[error("engine refused import of module '{0}'")]
    Import(String),
    #[error("{0}")]
    Failure(String),
}

/// Capabilities the orchestrator requires of an engine.
pub trait SymbolicEngine: Send + Sync {
    /// Explores `function` within the loaded unit, honoring the option
    /// budgets and contract styles.
    fn analyze(
        &self,
        unit: &IsolatedUnit,
        function: &str,
        options: &EngineOptions,
    ) -> Result<EngineReport, EngineError>;

    /// Judges whether `branch`'s condition is satisfiable given the
    /// function's precondition.
    fn probe_branch(
        &self,
        unit: &IsolatedUnit,
        function: &str,
        branch: &BranchRecord,
        options: &EngineOptions,
    ) -> Result<Reachability, EngineError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_options_carry_the_budget_cascade() {
        let budget = TimeBudget::new(30);
        let options = EngineOptions::standard(&budget);
        assert!((options.per_condition_timeout_seconds - 30.0).abs() < f64::EPSILON);
        assert!((options.per_path_timeout_seconds - 3.0).abs() < 1e-9);
        assert_eq!(options.contract_styles.len(), 4);
        assert!(options.contract_styles.contains(&ContractStyle::InlineAsserts));
        assert!(options.contract_styles.contains(&ContractStyle::DocstringContracts));
    }

    #[test]
    fn test_message_constructors_classify() {
        let err = AnalysisMessage::exec_err("ZeroDivisionError: division by zero", Some("(1, 0)".into()));
        assert_eq!(err.kind, MessageKind::ExecErr);
        let post = AnalysisMessage::post_fail("postcondition failed", None);
        assert_eq!(post.kind, MessageKind::PostFail);
    }
}
