//! The in-process bounded concrete-probe engine.
//!
//! [`ProbeEngine`] satisfies the [`SymbolicEngine`] trait with exhaustive
//! concrete-input exploration over small, annotation-derived domains: it
//! builds candidate argument tuples from the target's source signature,
//! filters them through docstring `pre:` conditions, calls the loaded
//! callable, and classifies each outcome — assertion failures become
//! `PostFail`, other exceptions `ExecErr` with the offending inputs rendered
//! in the tuple form the counterexample parser accepts.
//!
//! The budget is enforced cooperatively: the deadline is checked between
//! paths, never by cancelling a call in flight. For small integer domains
//! the exploration is exhaustive, which is exactly the regime where the
//! coverage estimate reports 1.0.

use std::time::{Duration, Instant};

use serde_json::Value;

use crate::ast_util::{ParamInfo, ParsedModule};
use crate::cexparse::render_input_tuple;
use crate::engine::{
    AnalysisMessage, ContractStyle, EngineError, EngineOptions, EngineReport, MessageKind,
    SymbolicEngine,
};
use crate::isolation::IsolatedUnit;
use crate::pyvm::ProbeOutcome;
use crate::results::{BranchRecord, Reachability};

/// Default ceiling on candidate tuples per analysis.
const DEFAULT_MAX_PATHS: u64 = 240;

/// Bounded concrete-input exploration engine.
#[derive(Debug, Clone)]
pub struct ProbeEngine {
    max_paths: u64,
}

impl ProbeEngine {
    pub fn new(max_paths: u64) -> Self {
        Self { max_paths: max_paths.max(1) }
    }
}

impl Default for ProbeEngine {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PATHS)
    }
}

impl SymbolicEngine for ProbeEngine {
    fn analyze(
        &self,
        unit: &IsolatedUnit,
        function: &str,
        options: &EngineOptions,
    ) -> Result<EngineReport, EngineError> {
        let parsed = ParsedModule::parse(unit.source())
            .map_err(|_| EngineError::Failure("unit source no longer parses".to_string()))?;
        let params = parsed.signature(function).unwrap_or_default();
        let (pre, post) = if options.contract_styles.contains(&ContractStyle::DocstringContracts) {
            docstring_conditions(parsed.docstring(function).as_deref())
        } else {
            (Vec::new(), Vec::new())
        };

        let deadline =
            Instant::now() + Duration::from_secs_f64(options.per_condition_timeout_seconds);
        let mut report = EngineReport::default();
        let mut satisfied_any_pre = false;

        for args in candidate_tuples(&params, self.max_paths) {
            if Instant::now() >= deadline {
                report.timed_out = true;
                break;
            }
            report.paths_explored += 1;

            match unit.probe_call(function, &params, &args, &pre, &post) {
                ProbeOutcome::PreFiltered => {}
                ProbeOutcome::Ok { post_violated: None, .. } => {
                    satisfied_any_pre = true;
                    report.paths_verified += 1;
                }
                ProbeOutcome::Ok { repr, post_violated: Some(condition) } => {
                    satisfied_any_pre = true;
                    report.messages.push(AnalysisMessage {
                        kind: MessageKind::PostFail,
                        text: format!("postcondition '{condition}' failed"),
                        offending_inputs: Some(render_input_tuple(&args)),
                        actual_result: Some(repr),
                        path_condition: Some(condition),
                    });
                }
                ProbeOutcome::Raised { class, message } => {
                    satisfied_any_pre = true;
                    let kind = if class == "AssertionError" {
                        MessageKind::PostFail
                    } else {
                        MessageKind::ExecErr
                    };
                    report.messages.push(AnalysisMessage {
                        kind,
                        text: format!("{class}: {message}"),
                        offending_inputs: Some(render_input_tuple(&args)),
                        actual_result: None,
                        path_condition: None,
                    });
                }
            }
        }

        if !pre.is_empty() && !satisfied_any_pre && report.paths_explored > 0 {
            report.messages.push(AnalysisMessage {
                kind: MessageKind::PreUnsat,
                text: "no explored inputs satisfy the declared preconditions".to_string(),
                offending_inputs: None,
                actual_result: None,
                path_condition: Some(pre.join(" and ")),
            });
        }

        Ok(report)
    }

    fn probe_branch(
        &self,
        unit: &IsolatedUnit,
        function: &str,
        branch: &BranchRecord,
        options: &EngineOptions,
    ) -> Result<Reachability, EngineError> {
        let parsed = ParsedModule::parse(unit.source())
            .map_err(|_| EngineError::Failure("unit source no longer parses".to_string()))?;
        let params = parsed.signature(function).unwrap_or_default();
        let pre = docstring_conditions(parsed.docstring(function).as_deref()).0;

        let deadline =
            Instant::now() + Duration::from_secs_f64(options.per_path_timeout_seconds.max(0.05));
        let mut saw_false = false;

        for args in candidate_tuples(&params, self.max_paths.min(64)) {
            if Instant::now() >= deadline {
                break;
            }
            let pre_ok = pre
                .iter()
                .all(|condition| unit.eval_bool(&params, condition, &args) == Some(true));
            if !pre_ok {
                continue;
            }
            match unit.eval_bool(&params, &branch.condition_text, &args) {
                Some(true) => return Ok(Reachability::Reachable),
                Some(false) => saw_false = true,
                // Conditions over loop targets or local state cannot be
                // evaluated against the signature alone.
                None => {}
            }
        }

        if saw_false {
            Ok(Reachability::Unreachable)
        } else {
            Ok(Reachability::Unknown)
        }
    }
}

// ── Docstring contracts ───────────────────────────────────────────────────────

/// Extracts `pre:` and `post:` condition expressions from a docstring.
pub(crate) fn docstring_conditions(docstring: Option<&str>) -> (Vec<String>, Vec<String>) {
    let mut pre = Vec::new();
    let mut post = Vec::new();
    let Some(doc) = docstring else {
        return (pre, post);
    };
    for line in doc.lines() {
        let line = line.trim();
        if let Some(condition) = line.strip_prefix("pre:") {
            let condition = condition.trim();
            if !condition.is_empty() {
                pre.push(condition.to_string());
            }
        } else if let Some(condition) = line.strip_prefix("post:") {
            let condition = condition.trim();
            if !condition.is_empty() {
                post.push(condition.to_string());
            }
        }
    }
    (pre, post)
}

// ── Candidate generation ──────────────────────────────────────────────────────

/// Small probe domain for one parameter, chosen from its annotation.
/// Unannotated parameters probe over small integers.
fn domain_for(param: &ParamInfo) -> Vec<Value> {
    match param.annotation.as_deref() {
        Some("bool") => vec![Value::Bool(false), Value::Bool(true)],
        Some("float") => vec![
            Value::from(-2.5),
            Value::from(-1.0),
            Value::from(0.0),
            Value::from(0.5),
            Value::from(3.0),
        ],
        Some("str") => vec![
            Value::from(""),
            Value::from("a"),
            Value::from("ab"),
            Value::from("hello"),
        ],
        _ => vec![
            Value::from(-2),
            Value::from(-1),
            Value::from(0),
            Value::from(1),
            Value::from(2),
            Value::from(7),
        ],
    }
}

/// Cartesian product of the per-parameter domains, capped at `max_paths`
/// tuples. A zero-parameter function yields the single empty tuple.
fn candidate_tuples(params: &[ParamInfo], max_paths: u64) -> Vec<Vec<Value>> {
    let domains: Vec<Vec<Value>> = params.iter().map(domain_for).collect();
    let mut tuples: Vec<Vec<Value>> = vec![Vec::new()];
    for domain in &domains {
        let mut next = Vec::with_capacity(tuples.len() * domain.len());
        'outer: for prefix in &tuples {
            for value in domain {
                if next.len() as u64 >= max_paths {
                    break 'outer;
                }
                let mut tuple = prefix.clone();
                tuple.push(value.clone());
                next.push(tuple);
            }
        }
        tuples = next;
    }
    tuples.truncate(max_paths as usize);
    tuples
}

// ── Tests ─────────────────────────────────────────────────────────────────────
