// symexec: sandboxed symbolic-execution analysis of untrusted Python source.
//
// The request pipeline is a straight line: static validation (policy-table
// driven AST firewall) → isolated loading (fresh RustPython interpreter per
// unit, registry-tracked, RAII teardown) → engine-driven analysis under a
// time-budget cascade → status-tagged results.

pub mod ast_util;
pub mod branches;
pub mod cexparse;
pub mod config;
pub mod coverage;
pub mod engine;
pub mod error;
pub mod governor;
pub mod isolation;
pub mod orchestrator;
pub mod policy;
pub mod probe;
pub(crate) mod pyvm;
pub mod results;
pub mod validator;

pub use config::{Config, ConfigError, PER_PATH_TIMEOUT_RATIO};
pub use engine::{
    AnalysisMessage, ContractStyle, EngineError, EngineOptions, EngineReport, MessageKind,
    SymbolicEngine,
};
pub use error::AnalysisError;
pub use governor::{apply_memory_cap, TimeBudget};
pub use isolation::{sweep_registry, IsolatedUnit, UNIT_PREFIX};
pub use orchestrator::Orchestrator;
pub use policy::{
    PolicySnapshot, ALLOWED_MODULES, BLOCKED_GLOBALS, BLOCKED_MODULES, DANGEROUS_BUILTINS,
};
pub use probe::ProbeEngine;
pub use results::{
    BranchAnalysisResult, BranchRecord, ContractCheckResult, Counterexample, EquivalenceResult,
    ExceptionPathResult, Reachability,
};
pub use validator::{validate, Finding, FindingKind, ValidationReport};
