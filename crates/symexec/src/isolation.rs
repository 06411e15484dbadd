//! Isolation manager: transient, uniquely named, executable units.
//!
//! [`IsolatedUnit::acquire`] materializes validated source as
//! 1. a scratch file `<tmpdir>/<unit_id>.py` holding the source,
//! 2. a fresh `unit_id` of the form `mcp_temp_<128-bit random hex>`,
//! 3. an entry in the process-wide loaded-unit registry, and
//! 4. a loaded RustPython namespace.
//!
//! Teardown is `Drop`: the registry entry is removed under the registry
//! mutex, the scratch file is deleted (ignore-if-absent), and the namespace
//! is dropped with the unit. `Drop` runs on unwind as well, so cleanup
//! survives panicking analysis code.
//!
//! ## Registry discipline
//!
//! Every read, insert, and delete touching `mcp_temp_` entries happens while
//! holding the one registry mutex. A contains-check followed by a delete is
//! a single locked `remove`, never two sections. Nothing blocking runs under
//! the lock: file deletion happens after release.
//!
//! Units are never shared or reused: a second acquisition of byte-identical
//! source yields a distinct identifier, a distinct scratch file, and a
//! distinct interpreter.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};

use uuid::Uuid;

use crate::ast_util::ParamInfo;
use crate::error::AnalysisError;
use crate::policy::allowed_module_set;
use crate::pyvm::{self, LoadError, PyNamespace};

/// Prefix of every registered unit identifier.
pub const UNIT_PREFIX: &str = "mcp_temp_";

/// What the registry records per loaded unit.
struct RegisteredUnit {
    scratch_path: PathBuf,
}

fn registry() -> &'static Mutex<HashMap<String, RegisteredUnit>> {
    static REGISTRY: OnceLock<Mutex<HashMap<String, RegisteredUnit>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

/// A loaded unit, exclusively owned by one request for one operation.
#[derive(Debug)]
pub struct IsolatedUnit {
    unit_id: String,
    scratch_path: PathBuf,
    source: String,
    namespace: PyNamespace,
}

impl IsolatedUnit {
    /// Loads validated `source` into a fresh isolated unit.
    ///
    /// On any failure after registration, teardown runs before the error is
    /// returned: no registry entry and no scratch file outlive the call.
    pub fn acquire(source: &str) -> Result<Self, AnalysisError> {
        let unit_id = format!("{UNIT_PREFIX}{}", Uuid::new_v4().simple());
        let scratch_path = std::env::temp_dir().join(format!("{unit_id}.py"));

        if let Err(err) = fs::write(&scratch_path, source) {
            tracing::warn!(error = %err, "scratch artifact creation failed");
            return Err(AnalysisError::Runtime);
        }

        {
            let mut reg = registry().lock().unwrap_or_else(|e| e.into_inner());
            reg.insert(unit_id.clone(), RegisteredUnit { scratch_path: scratch_path.clone() });
        }

        let interp = pyvm::build_interpreter(allowed_module_set());
        match pyvm::load_namespace(interp, source, &unit_id) {
            Ok(namespace) => {
                tracing::debug!(unit_id = %unit_id, "isolated unit loaded");
                Ok(Self {
                    unit_id,
                    scratch_path,
                    source: source.to_string(),
                    namespace,
                })
            }
            Err(load_err) => {
                teardown(&unit_id, &scratch_path);
                Err(match load_err {
                    // Post-validation the source already parsed once; a VM
                    // compile failure here is an internal inconsistency.
                    LoadError::Syntax { message, .. } => {
                        tracing::warn!(detail = %message, "unit failed to compile after validation");
                        AnalysisError::Runtime
                    }
                    LoadError::ImportDenied { module } => AnalysisError::Import(module),
                    LoadError::Runtime { message } => {
                        tracing::debug!(detail = %message, "unit top-level execution failed");
                        AnalysisError::Runtime
                    }
                })
            }
        }
    }

    /// The unit's registered identifier.
    pub fn id(&self) -> &str {
        &self.unit_id
    }

    /// The source this unit was loaded from.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Verifies `name` is bound to a callable in this unit's namespace.
    pub fn lookup_callable(&self, name: &str) -> Result<(), AnalysisError> {
        if self.namespace.has_callable(name) {
            Ok(())
        } else {
            Err(AnalysisError::Value(format!("function '{name}' not found in source")))
        }
    }

    /// Calls `name` with concrete arguments under pre/post conditions.
    /// See [`pyvm::ProbeOutcome`].
    pub(crate) fn probe_call(
        &self,
        name: &str,
        params: &[ParamInfo],
        args: &[serde_json::Value],
        pre: &[String],
        post: &[String],
    ) -> pyvm::ProbeOutcome {
        let names: Vec<String> = params.iter().map(|p| p.name.clone()).collect();
        self.namespace.probe_call(name, &names, args, pre, post)
    }

    /// Evaluates a boolean expression against concrete argument bindings.
    pub(crate) fn eval_bool(
        &self,
        params: &[ParamInfo],
        condition: &str,
        args: &[serde_json::Value],
    ) -> Option<bool> {
        let names: Vec<String> = params.iter().map(|p| p.name.clone()).collect();
        self.namespace.eval_bool(&names, condition, args)
    }
}

impl Drop for IsolatedUnit {
    fn drop(&mut self) {
        teardown(&self.unit_id, &self.scratch_path);
    }
}

/// Removes the registry entry keyed by this unit's identifier (a single
/// locked section), then deletes the scratch file outside the lock.
fn teardown(unit_id: &str, scratch_path: &std::path::Path) {
    {
        let mut reg = registry().lock().unwrap_or_else(|e| e.into_inner());
        reg.remove(unit_id);
    }
    if let Err(err) = fs::remove_file(scratch_path) {
        if err.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(error = %err, "scratch artifact removal failed");
        }
    }
}

/// Removes every `mcp_temp_` entry from the registry and deletes the
/// associated scratch files. Returns the number of entries swept.
///
/// Normally a no-op: units tear themselves down. The server calls it at
/// shutdown to back the per-unit teardown against bugs.
pub fn sweep_registry() -> usize {
    let swept: Vec<(String, PathBuf)> = {
        let mut reg = registry().lock().unwrap_or_else(|e| e.into_inner());
        let ids: Vec<String> = reg
            .keys()
            .filter(|id| id.starts_with(UNIT_PREFIX))
            .cloned()
            .collect();
        ids.into_iter()
            .filter_map(|id| reg.remove(&id).map(|unit| (id, unit.scratch_path)))
            .collect()
    };
    for (id, path) in &swept {
        tracing::warn!(unit_id = %id, "sweeping abandoned unit");
        let _ = fs::remove_file(path);
    }
    swept.len()
}

/// Number of `mcp_temp_` entries currently registered.
pub fn registered_unit_count() -> usize {
    let reg = registry().lock().unwrap_or_else(|e| e.into_inner());
    reg.keys().filter(|id| id.starts_with(UNIT_PREFIX)).count()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = "def f(x):\n    return x + 1\n";

    /// Registry membership by identifier; immune to units other parallel
    /// tests may be holding.
    fn is_registered(unit_id: &str) -> bool {
        let reg = registry().lock().unwrap_or_else(|e| e.into_inner());
        reg.contains_key(unit_id)
    }

    #[test]
    #[ignore = "slow: VM init per test"]
    fn test_acquire_registers_and_drop_unregisters() {
        let scratch;
        let unit_id;
        {
            let unit = IsolatedUnit::acquire(SOURCE).expect("acquire");
            assert!(unit.id().starts_with(UNIT_PREFIX));
            assert_eq!(unit.id().len(), UNIT_PREFIX.len() + 32, "128-bit hex identifier");
            unit_id = unit.id().to_string();
            scratch = std::env::temp_dir().join(format!("{}.py", unit.id()));
            assert!(scratch.exists(), "scratch artifact present while unit lives");
            assert!(is_registered(&unit_id));
        }
        assert!(!is_registered(&unit_id), "drop removes the registry entry");
        assert!(!scratch.exists(), "drop removes the scratch artifact");
    }

    #[test]
    #[ignore = "slow: VM init per test"]
    fn test_identical_source_yields_distinct_units() {
        let a = IsolatedUnit::acquire(SOURCE).expect("first acquire");
        let b = IsolatedUnit::acquire(SOURCE).expect("second acquire");
        assert_ne!(a.id(), b.id());
    }

    #[test]
    #[ignore = "slow: VM init per test"]
    fn test_failed_load_is_import_error() {
        let err = IsolatedUnit::acquire("import socket\n").expect_err("blocked at load");
        assert_eq!(err.error_type(), "ImportError");
        assert!(err.to_string().contains("socket"));
    }

    #[test]
    #[ignore = "slow: VM init per test"]
    fn test_lookup_callable() {
        let unit = IsolatedUnit::acquire(SOURCE).expect("acquire");
        assert!(unit.lookup_callable("f").is_ok());
        let err = unit.lookup_callable("missing").expect_err("not defined");
        assert_eq!(err.error_type(), "ValueError");
    }

    #[test]
    #[ignore = "slow: VM init per test"]
    fn test_concurrent_acquisitions_are_distinct() {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                std::thread::spawn(|| {
                    let unit = IsolatedUnit::acquire(SOURCE).expect("acquire");
                    unit.id().to_string()
                })
            })
            .collect();
        let mut ids: Vec<String> = handles
            .into_iter()
            .map(|h| h.join().expect("thread completed"))
            .collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 4, "every concurrent acquisition got its own identifier");
    }
}
