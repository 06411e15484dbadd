//! Whole-process lifecycle invariants.
//!
//! These assertions read the process-wide unit registry as a whole, so they
//! run as one sequential test in their own binary: nothing else in this
//! process acquires units while they execute.

use std::sync::Arc;

use symexec::isolation::registered_unit_count;
use symexec::{
    sweep_registry, Config, ContractCheckResult, EngineError, EngineOptions, EngineReport,
    IsolatedUnit, Orchestrator, ProbeEngine, Reachability, SymbolicEngine,
};

const DIVIDE: &str = "def divide(a: int, b: int) -> float:\n    return a / b\n";

/// Engine that panics mid-analysis, exercising unwind-path teardown.
struct PanickingEngine;

impl SymbolicEngine for PanickingEngine {
    fn analyze(
        &self,
        _unit: &IsolatedUnit,
        _function: &str,
        _options: &EngineOptions,
    ) -> Result<EngineReport, EngineError> {
        panic!("engine blew up mid-analysis");
    }

    fn probe_branch(
        &self,
        _unit: &IsolatedUnit,
        _function: &str,
        _branch: &symexec::BranchRecord,
        _options: &EngineOptions,
    ) -> Result<Reachability, EngineError> {
        Ok(Reachability::Unknown)
    }
}

#[test]
#[ignore = "slow: VM init per test"]
fn test_request_lifecycle_invariants() {
    // Every operation outcome — success, search, analysis, validation
    // rejection, missing function — leaves the registry empty.
    let orchestrator = Orchestrator::new(Arc::new(Config::default()), ProbeEngine::default());
    let _ = orchestrator.contract_check(DIVIDE, "divide", Some(5));
    let _ = orchestrator.exception_path(DIVIDE, "divide", "ZeroDivisionError", Some(5));
    let _ = orchestrator.branch_analysis(DIVIDE, "divide", Some(5), true);
    let _ = orchestrator.contract_check("import os\n", "f", None);
    let _ = orchestrator.contract_check(DIVIDE, "missing", None);
    assert_eq!(registered_unit_count(), 0, "operations must not leak registry entries");

    // A panicking engine unwinds through the unit; teardown still runs and
    // the client sees only the masked runtime error.
    let panicking = Orchestrator::new(Arc::new(Config::default()), PanickingEngine);
    match panicking.contract_check(DIVIDE, "divide", Some(5)) {
        ContractCheckResult::Error { error_type, message, .. } => {
            assert_eq!(error_type, "RuntimeError");
            assert_eq!(message, "internal error");
        }
        other => panic!("expected masked runtime error, got {other:?}"),
    }
    assert_eq!(registered_unit_count(), 0, "unwind must tear the unit down");

    // With every unit cleaning up after itself, the shutdown sweep finds
    // nothing to do.
    {
        let _unit = IsolatedUnit::acquire(DIVIDE).expect("acquire");
    }
    assert_eq!(sweep_registry(), 0);
    assert_eq!(registered_unit_count(), 0);
}
