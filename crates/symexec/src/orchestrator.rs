//! Analysis orchestrator.
//!
//! One [`Orchestrator`] instance drives the four operations over any
//! [`SymbolicEngine`]. Every request follows the same pipeline:
//!
//! ```text
//! validate → acquire isolated unit → look up callable → engine → teardown → shape result
//! ```
//!
//! Validation failure stops the pipeline before any unit exists. The unit is
//! dropped (teardown) before the result is shaped. Timing is measured from
//! entry and returned as `time_seconds` on success and failure alike. Each
//! public operation is wrapped in a catch-all that converts panics into the
//! generic runtime error, so nothing escapes to the transport.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use serde_json::{Map, Value};

use crate::ast_util::{self, ParamInfo, ParsedModule};
use crate::cexparse;
use crate::config::Config;
use crate::coverage::coverage_estimate;
use crate::engine::{AnalysisMessage, EngineError, EngineOptions, MessageKind, SymbolicEngine};
use crate::error::AnalysisError;
use crate::governor::{resolve_timeout, TimeBudget};
use crate::isolation::IsolatedUnit;
use crate::results::{
    BranchAnalysisResult, ContractCheckResult, Counterexample, EquivalenceResult,
    ExceptionPathResult, Reachability,
};
use crate::validator::{self, ReportErrorKind, ValidationReport};

/// Name of the synthesized equivalence wrapper function.
const EQUIVALENCE_WRAPPER: &str = "_equivalence_probe";

/// Drives the four analysis operations.
pub struct Orchestrator<E> {
    config: Arc<Config>,
    engine: E,
}

impl<E: SymbolicEngine> Orchestrator<E> {
    pub fn new(config: Arc<Config>, engine: E) -> Self {
        Self { config, engine }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The engine driving this orchestrator.
    pub fn engine_ref(&self) -> &E {
        &self.engine
    }

    // ── Contract check ────────────────────────────────────────────────────────

    /// Verifies that `function_name` satisfies its contracts, or produces
    /// counterexamples.
    pub fn contract_check(
        &self,
        source: &str,
        function_name: &str,
        timeout_seconds: Option<u64>,
    ) -> ContractCheckResult {
        let start = Instant::now();
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            match self.try_contract_check(source, function_name, timeout_seconds, start) {
                Ok(result) => result,
                Err(err) => ContractCheckResult::error(&err, elapsed(start)),
            }
        }));
        outcome.unwrap_or_else(|_| {
            ContractCheckResult::error(&AnalysisError::Runtime, elapsed(start))
        })
    }

    fn try_contract_check(
        &self,
        source: &str,
        function_name: &str,
        timeout_seconds: Option<u64>,
        start: Instant,
    ) -> Result<ContractCheckResult, AnalysisError> {
        let timeout = resolve_timeout(timeout_seconds, self.config.default_timeout_seconds)?;
        let parsed = self.parse_and_validate(source)?;
        let params = parsed.signature(function_name).unwrap_or_default();
        let options = EngineOptions::standard(&TimeBudget::new(timeout));

        let report = self.run_engine(source, function_name, &options)?;

        let coverage = coverage_estimate(
            report.paths_explored,
            self.config.coverage_exhaustive_threshold,
        );
        if report.timed_out {
            return Ok(ContractCheckResult::Timeout {
                message: "analysis exceeded the configured time budget".to_string(),
                paths_explored: report.paths_explored,
                time_seconds: elapsed(start),
            });
        }

        let counterexamples = build_counterexamples(&report.messages, &params);
        let has_failures = report
            .messages
            .iter()
            .any(|m| matches!(m.kind, MessageKind::PostFail | MessageKind::ExecErr));
        if has_failures {
            Ok(ContractCheckResult::Counterexample {
                counterexamples,
                paths_explored: report.paths_explored,
                paths_verified: report.paths_verified,
                coverage_estimate: coverage,
                time_seconds: elapsed(start),
            })
        } else {
            Ok(ContractCheckResult::Verified {
                paths_explored: report.paths_explored,
                paths_verified: report.paths_verified,
                coverage_estimate: coverage,
                time_seconds: elapsed(start),
            })
        }
    }

    // ── Exception path search ─────────────────────────────────────────────────

    /// Searches for inputs that make `function_name` raise `exception_type`.
    pub fn exception_path(
        &self,
        source: &str,
        function_name: &str,
        exception_type: &str,
        timeout_seconds: Option<u64>,
    ) -> ExceptionPathResult {
        let start = Instant::now();
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            match self.try_exception_path(source, function_name, exception_type, timeout_seconds, start)
            {
                Ok(result) => result,
                Err(err) => ExceptionPathResult::error(&err, elapsed(start)),
            }
        }));
        outcome.unwrap_or_else(|_| {
            ExceptionPathResult::error(&AnalysisError::Runtime, elapsed(start))
        })
    }

    fn try_exception_path(
        &self,
        source: &str,
        function_name: &str,
        exception_type: &str,
        timeout_seconds: Option<u64>,
        start: Instant,
    ) -> Result<ExceptionPathResult, AnalysisError> {
        if !is_python_identifier(exception_type) {
            return Err(AnalysisError::Value(format!(
                "'{exception_type}' is not a valid exception type name"
            )));
        }
        let timeout = resolve_timeout(timeout_seconds, self.config.default_timeout_seconds)?;
        let parsed = self.parse_and_validate(source)?;
        let params = parsed.signature(function_name).unwrap_or_default();
        let options = EngineOptions::standard(&TimeBudget::new(timeout));

        let report = self.run_engine(source, function_name, &options)?;

        let mut seen = std::collections::HashSet::new();
        let mut triggering_inputs: Vec<Map<String, Value>> = Vec::new();
        for message in &report.messages {
            if message.kind != MessageKind::ExecErr {
                continue;
            }
            if exception_class_of(&message.text) != Some(exception_type) {
                continue;
            }
            let Some(raw) = &message.offending_inputs else { continue };
            if !seen.insert(raw.clone()) {
                continue;
            }
            triggering_inputs.push(name_arguments(raw, &params));
        }

        if !triggering_inputs.is_empty() {
            return Ok(ExceptionPathResult::Found {
                triggering_inputs,
                paths_explored: report.paths_explored,
                time_seconds: elapsed(start),
            });
        }
        if report.timed_out {
            // The search was cut short; absence of a match proves nothing.
            return Err(AnalysisError::Timeout);
        }
        Ok(ExceptionPathResult::Unreachable {
            paths_explored: report.paths_explored,
            time_seconds: elapsed(start),
        })
    }

    // ── Equivalence ───────────────────────────────────────────────────────────

    /// Decides whether two functions agree on their common parameter space.
    pub fn equivalence(
        &self,
        source: &str,
        function_a: &str,
        function_b: &str,
        timeout_seconds: Option<u64>,
    ) -> EquivalenceResult {
        let start = Instant::now();
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            match self.try_equivalence(source, function_a, function_b, timeout_seconds, start) {
                Ok(result) => result,
                Err(err) => EquivalenceResult::error(&err, elapsed(start)),
            }
        }));
        outcome
            .unwrap_or_else(|_| EquivalenceResult::error(&AnalysisError::Runtime, elapsed(start)))
    }

    fn try_equivalence(
        &self,
        source: &str,
        function_a: &str,
        function_b: &str,
        timeout_seconds: Option<u64>,
        start: Instant,
    ) -> Result<EquivalenceResult, AnalysisError> {
        let timeout = resolve_timeout(timeout_seconds, self.config.equivalence_timeout_seconds)?;
        let parsed = self.parse_and_validate(source)?;

        let sig_a = parsed
            .signature(function_a)
            .ok_or_else(|| AnalysisError::Value(format!("function '{function_a}' not found in source")))?;
        let sig_b = parsed
            .signature(function_b)
            .ok_or_else(|| AnalysisError::Value(format!("function '{function_b}' not found in source")))?;

        let names_a: Vec<&str> = sig_a.iter().map(|p| p.name.as_str()).collect();
        let names_b: Vec<&str> = sig_b.iter().map(|p| p.name.as_str()).collect();
        if names_a != names_b {
            return Err(AnalysisError::Value(format!(
                "functions '{function_a}' and '{function_b}' have incompatible signatures"
            )));
        }

        let combined = format!(
            "{source}\n\n{}",
            equivalence_wrapper(function_a, function_b, &sig_a)
        );
        let options = EngineOptions::standard(&TimeBudget::new(timeout));
        let report = self.run_engine(&combined, EQUIVALENCE_WRAPPER, &options)?;

        if report.timed_out {
            // Uncertainty is never promoted to a proof in either direction.
            return Err(AnalysisError::Timeout);
        }

        if let Some(failure) = report
            .messages
            .iter()
            .find(|m| m.kind == MessageKind::PostFail)
        {
            let distinguishing_input = failure
                .offending_inputs
                .as_deref()
                .map(|raw| name_arguments(raw, &sig_a))
                .unwrap_or_default();
            return Ok(EquivalenceResult::Different {
                distinguishing_input,
                confidence: "proven".to_string(),
                paths_explored: report.paths_explored,
                time_seconds: elapsed(start),
            });
        }

        if report.messages.iter().any(|m| m.kind == MessageKind::ExecErr) {
            // The wrapper itself misbehaved; neither verdict is safe.
            tracing::warn!("equivalence wrapper raised outside the compared functions");
            return Err(AnalysisError::Runtime);
        }

        Ok(EquivalenceResult::Equivalent {
            confidence: "proven".to_string(),
            paths_explored: report.paths_explored,
            time_seconds: elapsed(start),
        })
    }

    // ── Branch analysis ───────────────────────────────────────────────────────

    /// Collects decision points and complexity; in symbolic mode, asks the
    /// engine to classify each branch's reachability.
    pub fn branch_analysis(
        &self,
        source: &str,
        function_name: &str,
        timeout_seconds: Option<u64>,
        symbolic_mode: bool,
    ) -> BranchAnalysisResult {
        let start = Instant::now();
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            match self.try_branch_analysis(source, function_name, timeout_seconds, symbolic_mode, start)
            {
                Ok(result) => result,
                Err(err) => BranchAnalysisResult::error(&err, elapsed(start)),
            }
        }));
        outcome.unwrap_or_else(|_| {
            BranchAnalysisResult::error(&AnalysisError::Runtime, elapsed(start))
        })
    }

    fn try_branch_analysis(
        &self,
        source: &str,
        function_name: &str,
        timeout_seconds: Option<u64>,
        symbolic_mode: bool,
        start: Instant,
    ) -> Result<BranchAnalysisResult, AnalysisError> {
        let timeout = resolve_timeout(timeout_seconds, self.config.default_timeout_seconds)?;
        let parsed = self.parse_and_validate(source)?;
        let info = crate::branches::analyze_function(&parsed, function_name).ok_or_else(|| {
            AnalysisError::Value(format!("function '{function_name}' not found in source"))
        })?;

        let unit = IsolatedUnit::acquire(source)?;
        unit.lookup_callable(function_name)?;

        let mut branches = info.branches;
        let mut dead_code_lines = Vec::new();
        if symbolic_mode {
            let options = EngineOptions::standard(&TimeBudget::new(timeout));
            for branch in &mut branches {
                // An engine failure degrades this branch to unknown rather
                // than failing the whole operation.
                let verdict = self
                    .engine
                    .probe_branch(&unit, function_name, branch, &options)
                    .unwrap_or(Reachability::Unknown);
                branch.reachability = verdict;
                if verdict == Reachability::Unreachable {
                    dead_code_lines.push(branch.line);
                }
            }
        }
        drop(unit);

        Ok(BranchAnalysisResult::Success {
            branches,
            cyclomatic_complexity: info.complexity,
            dead_code_lines,
            time_seconds: elapsed(start),
        })
    }

    // ── Common pipeline pieces ────────────────────────────────────────────────

    /// Parse once, then run the size gate and the rule walk over the shared
    /// tree.
    fn parse_and_validate<'s>(&self, source: &'s str) -> Result<ParsedModule<'s>, AnalysisError> {
        let parsed = ParsedModule::parse(source).map_err(|err| AnalysisError::Syntax {
            message: format!("syntax error: {}", err.error),
            line: ast_util::parse_error_line(source, &err),
        })?;
        let report = validator::check_parsed(&parsed, &self.config);
        if !report.ok {
            return Err(report_to_error(&report));
        }
        Ok(parsed)
    }

    /// Acquire a unit, resolve the callable, run the engine, tear down.
    fn run_engine(
        &self,
        source: &str,
        function_name: &str,
        options: &EngineOptions,
    ) -> Result<crate::engine::EngineReport, AnalysisError> {
        let unit = IsolatedUnit::acquire(source)?;
        unit.lookup_callable(function_name)?;
        let result = self.engine.analyze(&unit, function_name, options);
        drop(unit);
        match result {
            Ok(report) => Ok(report),
            Err(EngineError::Timeout) => Err(AnalysisError::Timeout),
            Err(EngineError::Import(module)) => Err(AnalysisError::Import(module)),
            Err(EngineError::Failure(detail)) => {
                tracing::warn!(detail = %detail, "engine failure");
                Err(AnalysisError::Runtime)
            }
        }
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn elapsed(start: Instant) -> f64 {
    start.elapsed().as_secs_f64()
}

fn report_to_error(report: &ValidationReport) -> AnalysisError {
    match report.error_kind {
        Some(ReportErrorKind::Syntax) => AnalysisError::Syntax {
            message: report.message.clone(),
            line: report.line.unwrap_or(0),
        },
        _ => AnalysisError::Validation(report.message.clone()),
    }
}

/// Builds one counterexample per distinct offending-input tuple.
fn build_counterexamples(messages: &[AnalysisMessage], params: &[ParamInfo]) -> Vec<Counterexample> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for message in messages {
        if !matches!(message.kind, MessageKind::PostFail | MessageKind::ExecErr) {
            continue;
        }
        let Some(raw) = &message.offending_inputs else { continue };
        if !seen.insert(raw.clone()) {
            continue;
        }
        out.push(Counterexample {
            args: name_arguments(raw, params),
            kwargs: Map::new(),
            violation: message.text.clone(),
            actual_result: message.actual_result.clone().unwrap_or_default(),
            path_condition: message.path_condition.clone().unwrap_or_default(),
        });
    }
    out
}

/// Pairs a parsed offending-input tuple with the source signature's
/// parameter names. Extra positions fall back to `arg<i>`.
fn name_arguments(raw: &str, params: &[ParamInfo]) -> Map<String, Value> {
    let values = cexparse::parse_offending_inputs(raw);
    let mut named = Map::new();
    for (index, value) in values.into_iter().enumerate() {
        let key = params
            .get(index)
            .map(|p| p.name.clone())
            .unwrap_or_else(|| format!("arg{index}"));
        named.insert(key, value);
    }
    named
}

/// Synthesizes the module-level wrapper asserting both functions agree,
/// treating "both raise the same exception class" as agreement.
fn equivalence_wrapper(function_a: &str, function_b: &str, params: &[ParamInfo]) -> String {
    let plist: Vec<String> = params
        .iter()
        .map(|p| match &p.annotation {
            Some(annotation) => format!("{}: {}", p.name, annotation),
            None => p.name.clone(),
        })
        .collect();
    let forward: Vec<&str> = params.iter().map(|p| p.name.as_str()).collect();
    let plist = plist.join(", ");
    let forward = forward.join(", ");
    format!(
        "def {EQUIVALENCE_WRAPPER}({plist}):\n    \
         try:\n        \
         __left = {function_a}({forward})\n        \
         __left_raised = None\n    \
         except Exception as __exc:\n        \
         __left = None\n        \
         __left_raised = type(__exc).__name__\n    \
         try:\n        \
         __right = {function_b}({forward})\n        \
         __right_raised = None\n    \
         except Exception as __exc:\n        \
         __right = None\n        \
         __right_raised = type(__exc).__name__\n    \
         assert __left_raised == __right_raised and __left == __right\n"
    )
}

/// The exception class an `ExecErr` message reports: the identifier before
/// the first colon.
fn exception_class_of(text: &str) -> Option<&str> {
    let head = text.split(':').next()?.trim();
    is_python_identifier(head).then_some(head)
}

fn is_python_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    // ── Pure helpers ──────────────────────────────────────────────────────────

    #[test]
    fn test_exception_class_extraction() {
        assert_eq!(
            exception_class_of("ZeroDivisionError: division by zero"),
            Some("ZeroDivisionError")
        );
        assert_eq!(exception_class_of("ValueError: bad input: really"), Some("ValueError"));
        assert_eq!(exception_class_of("not an identifier!"), None);
    }

    #[test]
    fn test_python_identifier_check() {
        assert!(is_python_identifier("ZeroDivisionError"));
        assert!(is_python_identifier("_Private"));
        assert!(!is_python_identifier(""));
        assert!(!is_python_identifier("3rd"));
        assert!(!is_python_identifier("os.path"));
    }

    #[test]
    fn test_build_counterexamples_deduplicates_by_input_tuple() {
        let params = vec![
            ParamInfo { name: "a".into(), annotation: Some("int".into()) },
            ParamInfo { name: "b".into(), annotation: Some("int".into()) },
        ];
        let messages = vec![
            AnalysisMessage::exec_err("ZeroDivisionError: division by zero", Some("(1, 0)".into())),
            AnalysisMessage::exec_err("ZeroDivisionError: division by zero", Some("(1, 0)".into())),
            AnalysisMessage::exec_err("ZeroDivisionError: division by zero", Some("(2, 0)".into())),
        ];
        let examples = build_counterexamples(&messages, &params);
        assert_eq!(examples.len(), 2);
        assert_eq!(examples[0].args.get("a"), Some(&Value::from(1)));
        assert_eq!(examples[0].args.get("b"), Some(&Value::from(0)));
        assert_eq!(examples[1].args.get("a"), Some(&Value::from(2)));
    }

    #[test]
    fn test_build_counterexamples_ignores_confirmed_messages() {
        let messages = vec![AnalysisMessage {
            kind: MessageKind::Confirmed,
            text: "path confirmed".to_string(),
            offending_inputs: Some("(1,)".to_string()),
            actual_result: None,
            path_condition: None,
        }];
        assert!(build_counterexamples(&messages, &[]).is_empty());
    }

    #[test]
    fn test_name_arguments_falls_back_past_signature() {
        let params = vec![ParamInfo { name: "x".into(), annotation: None }];
        let named = name_arguments("(1, 2)", &params);
        assert_eq!(named.get("x"), Some(&Value::from(1)));
        assert_eq!(named.get("arg1"), Some(&Value::from(2)));
    }

    #[test]
    fn test_equivalence_wrapper_shape() {
        let params = vec![
            ParamInfo { name: "x".into(), annotation: Some("int".into()) },
        ];
        let wrapper = equivalence_wrapper("v1", "v2", &params);
        assert!(wrapper.starts_with("def _equivalence_probe(x: int):"));
        assert!(wrapper.contains("v1(x)"));
        assert!(wrapper.contains("v2(x)"));
        assert!(wrapper.contains("assert __left_raised == __right_raised and __left == __right"));
        // The wrapper must parse as valid Python.
        let combined = format!("def v1(x: int):\n    return x\n\ndef v2(x: int):\n    return x\n\n{wrapper}");
        assert!(ParsedModule::parse(&combined).is_ok(), "wrapper must parse:\n{combined}");
    }
}
