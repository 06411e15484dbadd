//! Bypass battery for the static validator.
//!
//! Each case is a construction an attacker could use to reach a forbidden
//! callable or module without naming it plainly at the call site. All of
//! these must be rejected before any loading occurs; none require a VM.

use symexec::{validate, Config, FindingKind};

fn rejected(source: &str) -> symexec::ValidationReport {
    let report = validate(source, &Config::default());
    assert!(!report.ok, "must be rejected: {source:?}");
    report
}

fn accepted(source: &str) {
    let report = validate(source, &Config::default());
    assert!(report.ok, "must be accepted: {source:?} → {report:?}");
}

// ── Import routes ─────────────────────────────────────────────────────────────

#[test]
fn test_direct_blocked_imports() {
    for module in ["os", "sys", "subprocess", "socket", "pickle", "ctypes", "importlib", "signal"] {
        let report = rejected(&format!("import {module}\n"));
        assert_eq!(report.findings[0].kind, FindingKind::BlockedImport);
    }
}

#[test]
fn test_import_under_alias_still_blocked() {
    rejected("import os as harmless\n");
    rejected("from subprocess import run as do_thing\n");
}

#[test]
fn test_import_inside_function_body_blocked() {
    rejected("def f():\n    import os\n    return os.getcwd()\n");
}

#[test]
fn test_import_inside_conditional_blocked() {
    rejected("if True:\n    import socket\n");
}

#[test]
fn test_builtins_module_import_blocked() {
    rejected("import builtins\n");
}

// ── Dangerous builtins at the call site ──────────────────────────────────────

#[test]
fn test_direct_dangerous_calls() {
    rejected("eval('1')\n");
    rejected("exec('pass')\n");
    rejected("compile('1', '<s>', 'eval')\n");
    rejected("__import__('os')\n");
    rejected("open('/etc/passwd')\n");
    rejected("globals()\n");
    rejected("locals()\n");
    rejected("vars()\n");
    rejected("dir()\n");
}

#[test]
fn test_dangerous_call_in_default_argument() {
    rejected("def f(x=eval('1')):\n    return x\n");
}

#[test]
fn test_dangerous_call_in_decorator() {
    rejected("@eval(\"lambda f: f\")\ndef f():\n    pass\n");
}

#[test]
fn test_dangerous_call_in_lambda_body() {
    rejected("g = lambda s: eval(s)\n");
}

// ── Dynamic builtins access ──────────────────────────────────────────────────

#[test]
fn test_builtins_attribute_and_subscript_access() {
    let report = rejected("f = __builtins__.eval\n");
    assert_eq!(report.findings[0].kind, FindingKind::DynamicBuiltinsAccess);
    rejected("f = __builtins__['eval']\n");
    rejected("f = getattr(__builtins__, 'ev' + 'al')\n");
}

// ── Literal hiding and folded callees ────────────────────────────────────────

#[test]
fn test_literal_hiding_variants() {
    let report = rejected("x = [eval][0]('1')\n");
    assert_eq!(report.findings[0].kind, FindingKind::LiteralHidingBypass);
    rejected("x = (eval,)[0]('1')\n");
    rejected("x = {0: eval}[0]('1')\n");
    rejected("x = [[eval]][0][0]('1')\n");
    rejected("x = [exec, print][0]\n");
}

#[test]
fn test_short_circuit_and_conditional_callees() {
    let r8 = rejected("def f(a):\n    return (a or eval)('1')\n");
    assert_eq!(r8.findings[0].kind, FindingKind::Bypass);
    rejected("def f(a):\n    return (a and exec)('pass')\n");
    rejected("def f(c, g):\n    return (eval if c else g)('1')\n");
    rejected("(lambda: eval)()('1')\n");
}

// ── Constructions that must stay admissible ──────────────────────────────────

#[test]
fn test_legitimate_code_is_not_over_rejected() {
    accepted("import math\n\ndef area(r: float) -> float:\n    return math.pi * r * r\n");
    accepted("from collections import Counter\n\ndef top(xs):\n    return Counter(xs).most_common(1)\n");
    accepted("def evaluate(model, x):\n    return model(x)\n");
    accepted("evaluation = {'eval_mode': True}\n");
    accepted("def f(d):\n    return d['eval_key']\n");
    accepted("def f(obj):\n    return getattr(obj, 'value')\n");
    accepted("def f(xs):\n    return [x for x in xs if x][0]\n");
}

#[test]
fn test_identifier_containing_dangerous_substring_is_fine() {
    accepted("def evaluate(x: int) -> int:\n    return x\n\ny = evaluate(3)\n");
    accepted("def reopen(x):\n    return x\n\nz = reopen(1)\n");
}
