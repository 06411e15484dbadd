//! Security policy tables.
//!
//! Four immutable, process-wide tables govern what untrusted source may do:
//! - [`ALLOWED_MODULES`] — modules user code may import.
//! - [`BLOCKED_MODULES`] — modules rejected even when a broader rule would
//!   admit them (OS, filesystem, network, subprocess, code-loading, ...).
//! - [`DANGEROUS_BUILTINS`] — names that may never be called or reached
//!   through dynamic lookup (`eval`, `exec`, `open`, ...).
//! - [`BLOCKED_GLOBALS`] — the builtins-module names used to reach dangerous
//!   callables by attribute or subscript access.
//!
//! The tables are `const` slices; [`allowed_module_set`] materializes the
//! allowlist as a `HashSet` for O(1) lookup inside the import hook.

use std::collections::HashSet;

use serde::Serialize;

/// Modules permitted for import by analyzed code.
///
/// Pure computation, data structures, iterators, typing, regex, JSON,
/// date/time, decimal/fraction, statistics, and abstract base classes.
/// Nothing here can touch the filesystem, the network, or other processes.
pub const ALLOWED_MODULES: &[&str] = &[
    "math",
    "cmath",
    "decimal",
    "fractions",
    "random",
    "statistics",
    "itertools",
    "functools",
    "operator",
    "collections",
    "heapq",
    "bisect",
    "array",
    "string",
    "re",
    "json",
    "datetime",
    "time",
    "calendar",
    "typing",
    "abc",
];

/// Modules rejected outright.
///
/// OS and filesystem access, networking, subprocess spawning, serialization
/// formats that execute code on load, concurrency primitives, foreign
/// function interfaces, import machinery, and low-level process control.
pub const BLOCKED_MODULES: &[&str] = &[
    "os",
    "sys",
    "subprocess",
    "shutil",
    "pathlib",
    "tempfile",
    "glob",
    "socket",
    "ssl",
    "http",
    "urllib",
    "ftplib",
    "telnetlib",
    "smtplib",
    "pickle",
    "marshal",
    "shelve",
    "dbm",
    "ctypes",
    "multiprocessing",
    "threading",
    "asyncio",
    "concurrent",
    "importlib",
    "runpy",
    "code",
    "codeop",
    "signal",
    "resource",
    "fcntl",
    "pty",
    "tty",
    "termios",
    "builtins",
];

/// Builtin names that may never appear as called identifiers or as targets
/// of dynamic-lookup constructions.
pub const DANGEROUS_BUILTINS: &[&str] = &[
    "eval",
    "exec",
    "compile",
    "__import__",
    "open",
    "globals",
    "locals",
    "vars",
    "dir",
];

/// Global names through which dangerous callables are reachable by
/// attribute or subscript access.
pub const BLOCKED_GLOBALS: &[&str] = &["builtins", "__builtins__"];

/// Why a module was denied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleDenial {
    /// The module (or its top-level package) is on the blocklist.
    Blocked(String),
    /// The module's top-level package is absent from the allowlist.
    NotAllowlisted(String),
}

impl ModuleDenial {
    /// The denied module name.
    pub fn module(&self) -> &str {
        match self {
            ModuleDenial::Blocked(m) | ModuleDenial::NotAllowlisted(m) => m,
        }
    }
}

/// Checks whether `module` is admitted by the import policy.
///
/// The decision is made on the top-level segment of a dotted name: `json`
/// admits `json.decoder`, while `os` poisons `os.path`. The blocklist is
/// consulted first so a name appearing on both tables is rejected.
pub fn check_module_admitted(module: &str) -> Result<(), ModuleDenial> {
    let top = module.split('.').next().unwrap_or(module);
    if BLOCKED_MODULES.contains(&top) {
        return Err(ModuleDenial::Blocked(module.to_string()));
    }
    if ALLOWED_MODULES.contains(&top) {
        return Ok(());
    }
    Err(ModuleDenial::NotAllowlisted(module.to_string()))
}

/// Returns `true` if `name` is a dangerous builtin.
pub fn is_dangerous_builtin(name: &str) -> bool {
    DANGEROUS_BUILTINS.contains(&name)
}

/// Returns `true` if `name` is a blocked global.
pub fn is_blocked_global(name: &str) -> bool {
    BLOCKED_GLOBALS.contains(&name)
}

/// The allowlist as a `HashSet<String>` for O(1) per-import lookup inside
/// the load-time import hook.
pub fn allowed_module_set() -> HashSet<String> {
    ALLOWED_MODULES.iter().map(|s| s.to_string()).collect()
}

/// Read-only snapshot of the policy tables, served by the configuration
/// resources. Contains only the table contents; no environment values.
#[derive(Debug, Clone, Serialize)]
pub struct PolicySnapshot {
    pub allowed_modules: Vec<&'static str>,
    pub blocked_modules: Vec<&'static str>,
    pub dangerous_builtins: Vec<&'static str>,
    pub blocked_globals: Vec<&'static str>,
}

impl PolicySnapshot {
    pub fn current() -> Self {
        Self {
            allowed_modules: ALLOWED_MODULES.to_vec(),
            blocked_modules: BLOCKED_MODULES.to_vec(),
            dangerous_builtins: DANGEROUS_BUILTINS.to_vec(),
            blocked_globals: BLOCKED_GLOBALS.to_vec(),
        }
    }
}
