//! RustPython VM lifecycle for isolated units.
//!
//! This module owns all RustPython API calls. It:
//! - Creates a fresh interpreter per isolated unit with stdlib and the
//!   import allowlist hook.
//! - Compiles and executes unit source into a new scope, returning a
//!   [`PyNamespace`] that the analysis engine probes.
//! - Extracts structured load errors (syntax, refused import, runtime).
//!
//! ## Import hook
//!
//! RustPython resolves imports by calling `builtins.__import__`. The init
//! closure in `Interpreter::with_init` runs BEFORE `vm.initialize()`, so
//! `builtins.__import__` is not yet set there; the hook is installed at the
//! beginning of each load (inside `enter()`), after full initialization.
//!
//! The hook is the belt-and-suspenders layer behind the static validator:
//! it enforces the same allowlist at load time, so a blocked import that
//! somehow survives validation still cannot resolve. Denials are raised as
//! `ImportError("ImportBlocked:<name>")` and recognized by the sentinel.
//!
//! ## One interpreter per unit
//!
//! Interpreters are never pooled or reused: a unit's namespace must not be
//! visible to any other unit, and a later unit with byte-identical source
//! still gets a fresh interpreter.

use std::collections::HashSet;
use std::sync::Arc;

use rustpython_vm::{
    builtins::PyBaseExceptionRef,
    compiler::Mode,
    function::FuncArgs,
    scope::Scope,
    AsObject, Interpreter, PyObjectRef, PyResult, TryFromObject, VirtualMachine,
};
use serde_json::Value;

use crate::policy::check_module_admitted;

// ── Types ─────────────────────────────────────────────────────────────────────

/// A configured interpreter bundled with its module allowlist.
pub(crate) struct PyInterp {
    inner: Interpreter,
    allowed: Arc<HashSet<String>>,
}

/// A loaded unit namespace: the interpreter plus the scope its source ran in.
pub(crate) struct PyNamespace {
    interp: PyInterp,
    scope: Scope,
}

impl std::fmt::Debug for PyNamespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PyNamespace").finish_non_exhaustive()
    }
}

/// Why loading unit source failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum LoadError {
    /// The source did not compile. Post-validation this indicates a grammar
    /// gap between parser and VM; callers treat it as a runtime failure.
    Syntax { message: String, line: u32 },
    /// The import hook refused a module.
    ImportDenied { module: String },
    /// Top-level execution raised.
    Runtime { message: String },
}

/// Result of probing one candidate input tuple against a callable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ProbeOutcome {
    /// A precondition was false (or unevaluable) for these inputs.
    PreFiltered,
    /// The call returned. `post_violated` names the first failed
    /// postcondition expression, if any.
    Ok { repr: String, post_violated: Option<String> },
    /// The call raised.
    Raised { class: String, message: String },
}

const IMPORT_SENTINEL: &str = "ImportBlocked:";
const SAVED_IMPORT_ATTR: &str = "__symexec_original_import__";

// ── Interpreter construction ──────────────────────────────────────────────────

/// Candidate filesystem paths for a Python standard library installation.
///
/// The `freeze-stdlib` feature only freezes the VM's own core modules; the
/// pure-Python standard library (json, datetime wrappers, typing, ...) comes
/// from a host installation when one is present. Native modules registered
/// from `rustpython_stdlib` shadow any compiled extensions on the same path.
fn python_stdlib_paths() -> Vec<String> {
    let candidates = [
        "/usr/local/lib/python3.13",
        "/usr/local/lib/python3.12",
        "/usr/local/lib/python3.11",
        "/usr/local/lib/python3.10",
        "/usr/lib/python3",
        "/usr/lib/python3.12",
        "/usr/lib/python3.11",
        "/usr/lib/python3.10",
    ];
    candidates
        .iter()
        .filter(|p| std::path::Path::new(p).is_dir())
        .map(|p| p.to_string())
        .collect()
}

/// Creates a fresh interpreter with stdlib configured and the given import
/// allowlist. The hook itself is installed inside each `enter()`.
pub(crate) fn build_interpreter(allowed: HashSet<String>) -> PyInterp {
    let mut settings = rustpython_vm::Settings::default();
    for path in python_stdlib_paths() {
        settings.path_list.push(path);
    }

    let inner = Interpreter::with_init(settings, move |vm| {
        vm.add_native_modules(rustpython_stdlib::get_module_inits());
    });

    PyInterp { inner, allowed: Arc::new(allowed) }
}

// ── Loading ───────────────────────────────────────────────────────────────────

/// Compiles and executes `source` in a new scope, producing the unit's
/// namespace. `unit_name` becomes the scope's `__name__`, which is how the
/// import hook recognizes unit code.
pub(crate) fn load_namespace(
    interp: PyInterp,
    source: &str,
    unit_name: &str,
) -> Result<PyNamespace, LoadError> {
    let allowed = Arc::clone(&interp.allowed);
    let load_result = interp.inner.enter(|vm| {
        install_import_hook(vm, &allowed);

        let code = match vm.compile(source, Mode::Exec, "<unit>".to_owned()) {
            Ok(c) => c,
            Err(e) => {
                let (row, _col) = e.python_location();
                return Err(LoadError::Syntax { message: e.to_string(), line: row as u32 });
            }
        };

        let scope = vm.new_scope_with_builtins();
        let _ = scope
            .globals
            .set_item("__name__", vm.ctx.new_str(unit_name).into(), vm);

        match vm.run_code_obj(code, scope.clone()) {
            Ok(_) => Ok(scope),
            Err(exc) => {
                if let Some(module) = extract_import_denied(vm, &exc) {
                    Err(LoadError::ImportDenied { module })
                } else {
                    Err(LoadError::Runtime { message: exception_summary(vm, &exc) })
                }
            }
        }
    });

    load_result.map(|scope| PyNamespace { interp, scope })
}

// ── Namespace probing ─────────────────────────────────────────────────────────

impl PyNamespace {
    /// Returns `true` if `name` is bound in the unit's globals to something
    /// callable.
    pub(crate) fn has_callable(&self, name: &str) -> bool {
        self.interp.inner.enter(|vm| {
            match lookup_global(vm, &self.scope, name) {
                Some(obj) => obj.get_attr("__call__", vm).is_ok(),
                None => false,
            }
        })
    }

    /// Calls `name` with `args`, evaluating `pre` conditions first and `post`
    /// conditions on the returned value.
    ///
    /// `params` are the function's parameter names, used to bind arguments in
    /// condition lambdas; post conditions additionally see `__return__`.
    pub(crate) fn probe_call(
        &self,
        name: &str,
        params: &[String],
        args: &[Value],
        pre: &[String],
        post: &[String],
    ) -> ProbeOutcome {
        self.interp.inner.enter(|vm| {
            let py_args: Vec<PyObjectRef> = args.iter().map(|v| value_to_py(vm, v)).collect();

            for condition in pre {
                match eval_condition(vm, &self.scope, params, condition, &py_args) {
                    Some(true) => {}
                    // False or unevaluable: these inputs are outside the
                    // declared precondition.
                    _ => return ProbeOutcome::PreFiltered,
                }
            }

            let func = match lookup_global(vm, &self.scope, name) {
                Some(f) => f,
                None => {
                    return ProbeOutcome::Raised {
                        class: "NameError".to_string(),
                        message: format!("name '{name}' is not defined"),
                    }
                }
            };

            match func.call(FuncArgs::from(py_args.clone()), vm) {
                Ok(ret) => {
                    let mut post_violated = None;
                    if !post.is_empty() {
                        let mut bound = params.to_vec();
                        bound.push("__return__".to_string());
                        let mut bound_args = py_args;
                        bound_args.push(ret.clone());
                        for condition in post {
                            if let Some(false) =
                                eval_condition(vm, &self.scope, &bound, condition, &bound_args)
                            {
                                post_violated = Some(condition.clone());
                                break;
                            }
                        }
                    }
                    let repr = ret
                        .repr(vm)
                        .map(|s| s.as_str().to_owned())
                        .unwrap_or_default();
                    ProbeOutcome::Ok { repr, post_violated }
                }
                Err(exc) => ProbeOutcome::Raised {
                    class: exception_class_name(vm, &exc),
                    message: exception_message(vm, &exc),
                },
            }
        })
    }

    /// Evaluates a boolean condition expression with the given parameter
    /// bindings. `None` when the expression does not compile or raises.
    pub(crate) fn eval_bool(
        &self,
        params: &[String],
        condition: &str,
        args: &[Value],
    ) -> Option<bool> {
        self.interp.inner.enter(|vm| {
            let py_args: Vec<PyObjectRef> = args.iter().map(|v| value_to_py(vm, v)).collect();
            eval_condition(vm, &self.scope, params, condition, &py_args)
        })
    }
}

/// Looks up `name` in the scope's globals. Uses the dict `get` protocol so a
/// missing key is `None` rather than an exception.
fn lookup_global(vm: &VirtualMachine, scope: &Scope, name: &str) -> Option<PyObjectRef> {
    let globals: PyObjectRef = scope.globals.clone().into();
    let value = vm
        .call_method(&globals, "get", (vm.ctx.new_str(name),))
        .ok()?;
    if vm.is_none(&value) {
        None
    } else {
        Some(value)
    }
}

/// Compiles `lambda <params>: bool(<condition>)` in the unit's scope and
/// calls it with `args`. The lambda sees the unit's globals, so conditions
/// may reference module-level helpers.
fn eval_condition(
    vm: &VirtualMachine,
    scope: &Scope,
    params: &[String],
    condition: &str,
    args: &[PyObjectRef],
) -> Option<bool> {
    let lambda_src = format!("lambda {}: bool({})", params.join(", "), condition);
    let code = vm
        .compile(&lambda_src, Mode::Eval, "<condition>".to_owned())
        .ok()?;
    let lambda = vm.run_code_obj(code, scope.clone()).ok()?;
    let result = lambda.call(FuncArgs::from(args.to_vec()), vm).ok()?;
    bool::try_from_object(vm, result).ok()
}

/// Converts a scalar JSON value into a Python object.
fn value_to_py(vm: &VirtualMachine, value: &Value) -> PyObjectRef {
    match value {
        Value::Null => vm.ctx.none(),
        Value::Bool(b) => vm.ctx.new_bool(*b).into(),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                vm.ctx.new_int(i).into()
            } else {
                vm.ctx.new_float(n.as_f64().unwrap_or(0.0)).into()
            }
        }
        Value::String(s) => vm.ctx.new_str(s.as_str()).into(),
        Value::Array(items) => {
            let elements: Vec<PyObjectRef> = items.iter().map(|v| value_to_py(vm, v)).collect();
            vm.ctx.new_list(elements).into()
        }
        Value::Object(_) => vm.ctx.none(),
    }
}

// ── Import hook ───────────────────────────────────────────────────────────────

/// Returns `true` if the import originates from unit code rather than from a
/// stdlib module loading its own dependencies.
///
/// Unit scopes run with `__name__` set to the unit identifier (or
/// `"__main__"` under tests); real modules carry their own names.
fn is_unit_code_import(args: &FuncArgs, vm: &VirtualMachine) -> bool {
    let globals = match args.args.get(1) {
        Some(g) => g,
        None => return true,
    };
    if vm.is_none(globals) {
        return true;
    }
    if let Ok(name_val) = vm.call_method(globals, "get", (vm.ctx.new_str("__name__"),)) {
        if !vm.is_none(&name_val) {
            if let Ok(name_str) = name_val.str(vm) {
                let name = name_str.as_str();
                return name.is_empty()
                    || name == "__main__"
                    || name.starts_with(crate::isolation::UNIT_PREFIX);
            }
        }
    }
    // No __name__ at all: assume unit code and enforce the allowlist.
    true
}

/// Installs a `builtins.__import__` override enforcing the module allowlist.
///
/// The real original import is saved under a private builtins attribute on
/// first install, so reinstallation never chains through a stale hook.
fn install_import_hook(vm: &VirtualMachine, allowed: &Arc<HashSet<String>>) {
    let original_import = if let Ok(saved) = vm.builtins.get_attr(SAVED_IMPORT_ATTR, vm) {
        saved
    } else {
        let real_original = match vm.builtins.get_attr("__import__", vm) {
            Ok(f) => f,
            Err(_) => return,
        };
        let _ = vm
            .builtins
            .set_attr(SAVED_IMPORT_ATTR, real_original.clone(), vm);
        real_original
    };

    // PyObjectRef is not Send+Sync but the closure runs within the VM thread only.
    #[allow(clippy::arc_with_non_send_sync)]
    let original_import = Arc::new(original_import);
    let allowed = Arc::clone(allowed);

    let hook = vm.new_function(
        "__import__",
        move |args: FuncArgs, vm: &VirtualMachine| -> PyResult<PyObjectRef> {
            let module_name: String = args
                .args
                .first()
                .and_then(|o| o.str(vm).ok())
                .map(|s| s.as_str().to_owned())
                .unwrap_or_default();

            if is_unit_code_import(&args, vm) && !import_admitted(&module_name, &allowed) {
                return Err(vm.new_import_error(
                    format!("{IMPORT_SENTINEL}{module_name}"),
                    vm.ctx.new_str(module_name),
                ));
            }

            original_import.call(args, vm)
        },
    );

    let _ = vm.builtins.set_attr("__import__", hook, vm);
}

/// Admission check for the hook: the policy tables decide, and a submodule
/// rides on its parent package's admission (`json` admits `json.decoder`).
fn import_admitted(module: &str, allowed: &HashSet<String>) -> bool {
    if check_module_admitted(module).is_err() {
        return false;
    }
    let top = module.split('.').next().unwrap_or(module);
    allowed.contains(top)
}

// ── Error extraction ──────────────────────────────────────────────────────────

/// Recognizes the import hook's sentinel and extracts the denied module name.
fn extract_import_denied(vm: &VirtualMachine, exc: &PyBaseExceptionRef) -> Option<String> {
    let msg = exc.as_object().str(vm).ok()?;
    msg.as_str()
        .strip_prefix(IMPORT_SENTINEL)
        .map(|name| name.to_string())
}

/// The exception's class name (`ZeroDivisionError`, `AssertionError`, ...).
fn exception_class_name(vm: &VirtualMachine, exc: &PyBaseExceptionRef) -> String {
    exc.as_object()
        .get_attr("__class__", vm)
        .ok()
        .and_then(|cls| cls.get_attr("__name__", vm).ok())
        .and_then(|name| name.str(vm).ok())
        .map(|s| s.as_str().to_owned())
        .unwrap_or_else(|| "Exception".to_string())
}

/// The exception's own message, without any traceback.
fn exception_message(vm: &VirtualMachine, exc: &PyBaseExceptionRef) -> String {
    exc.as_object()
        .str(vm)
        .map(|s| s.as_str().to_owned())
        .unwrap_or_else(|_| "unknown error".to_string())
}

/// `Class: message` summary used for load failures.
fn exception_summary(vm: &VirtualMachine, exc: &PyBaseExceptionRef) -> String {
    format!("{}: {}", exception_class_name(vm, exc), exception_message(vm, exc))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
