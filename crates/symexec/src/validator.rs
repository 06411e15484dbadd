//! Static validator: the syntactic firewall in front of isolation and
//! analysis.
//!
//! [`validate`] parses the source, applies the size gate, and walks every
//! statement and expression once, applying eight rules:
//!
//! - R1/R2 — `import X` / `from X import ...` where X's top-level package is
//!   blocked or absent from the allowlist.
//! - R3 — a called identifier resolves by name to a dangerous builtin.
//! - R4 — `getattr` whose first positional argument names a blocked global.
//! - R5/R6 — attribute or subscript access on a blocked global.
//! - R7 — a subscript over a list/tuple/dict literal that holds a reference
//!   to a dangerous builtin (`[eval][0]`).
//! - R8 — a call whose callee is some other construction that could
//!   constant-fold to a dangerous builtin (`(f or eval)(...)`).
//!
//! R7 and R8 exist because name resolution at the call site never sees a
//! callable produced by a data-structure access or a short-circuit.
//!
//! The validator does no type checking and no flow analysis; its only output
//! is a [`ValidationReport`]. It never panics and never returns `Err`.

use rustpython_parser::ast::{self, Ranged};
use serde::Serialize;

use crate::ast_util::{self, ParsedModule};
use crate::config::Config;
use crate::policy;

// ── Report types ──────────────────────────────────────────────────────────────

/// Coarse classification of a rejection, serialized with the wire
/// `error_type` spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ReportErrorKind {
    #[serde(rename = "SyntaxError")]
    Syntax,
    #[serde(rename = "ValidationError")]
    Validation,
}

/// What a single finding is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FindingKind {
    BlockedImport,
    DangerousCall,
    DynamicBuiltinsAccess,
    LiteralHidingBypass,
    Bypass,
}

/// One rule violation, located when possible.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub kind: FindingKind,
    /// Stable rule identifier, `R1`..`R8`.
    pub rule: &'static str,
    pub message: String,
    /// 1-based source line of the offending node.
    pub line: u32,
}

/// The validator's only output. `ok == true` means the source may be loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub ok: bool,
    pub error_kind: Option<ReportErrorKind>,
    pub message: String,
    pub line: Option<u32>,
    /// All findings from the single pass, in traversal order. The report
    /// message carries the first; the rest give clients the full picture.
    pub findings: Vec<Finding>,
}

impl ValidationReport {
    fn accepted() -> Self {
        Self {
            ok: true,
            error_kind: None,
            message: String::new(),
            line: None,
            findings: Vec::new(),
        }
    }

    fn syntax(message: String, line: u32) -> Self {
        Self {
            ok: false,
            error_kind: Some(ReportErrorKind::Syntax),
            message,
            line: Some(line),
            findings: Vec::new(),
        }
    }

    fn size_exceeded() -> Self {
        Self {
            ok: false,
            error_kind: Some(ReportErrorKind::Validation),
            message: "code size exceeds limit".to_string(),
            line: None,
            findings: Vec::new(),
        }
    }

    fn rejected(findings: Vec<Finding>) -> Self {
        let first = &findings[0];
        Self {
            ok: false,
            error_kind: Some(ReportErrorKind::Validation),
            message: first.message.clone(),
            line: Some(first.line),
            findings,
        }
    }
}

// ── Entry points ──────────────────────────────────────────────────────────────

/// Validates raw source: parse, size gate, rule walk.
pub fn validate(source: &str, config: &Config) -> ValidationReport {
    let module = match ParsedModule::parse(source) {
        Ok(m) => m,
        Err(err) => {
            return ValidationReport::syntax(
                format!("syntax error: {}", err.error),
                ast_util::parse_error_line(source, &err),
            );
        }
    };
    check_parsed(&module, config)
}

/// Validates an already-parsed module (size gate + rule walk). Used by the
/// orchestrator so the same tree feeds signature extraction and branch
/// analysis afterwards.
pub fn check_parsed(module: &ParsedModule<'_>, config: &Config) -> ValidationReport {
    if crate::governor::check_code_size(module.source, config.code_size_limit).is_err() {
        return ValidationReport::size_exceeded();
    }

    let mut walker = Walker { module, findings: Vec::new() };
    for stmt in &module.suite {
        walker.stmt(stmt);
    }

    if walker.findings.is_empty() {
        ValidationReport::accepted()
    } else {
        ValidationReport::rejected(walker.findings)
    }
}

// ── The walker ────────────────────────────────────────────────────────────────

struct Walker<'m, 'src> {
    module: &'m ParsedModule<'src>,
    findings: Vec<Finding>,
}

impl Walker<'_, '_> {
    fn push(&mut self, kind: FindingKind, rule: &'static str, message: String, node: &impl Ranged) {
        let line = self.module.line_at(node.start());
        self.findings.push(Finding { kind, rule, message, line });
    }

    // ── Statements ────────────────────────────────────────────────────────────

    fn stmt(&mut self, stmt: &ast::Stmt) {
        match stmt {
            ast::Stmt::Import(s) => {
                for alias in &s.names {
                    self.check_import(alias.name.as_str(), "R1", s);
                }
            }
            ast::Stmt::ImportFrom(s) => {
                let level = s.level.as_ref().map(|l| l.to_u32()).unwrap_or(0);
                match (&s.module, level) {
                    (Some(module), 0) => self.check_import(module.as_str(), "R2", s),
                    _ => self.push(
                        FindingKind::BlockedImport,
                        "R2",
                        "blocked import: relative imports are not permitted (rule R2)".to_string(),
                        s,
                    ),
                }
            }
            ast::Stmt::FunctionDef(s) => {
                self.arguments(&s.args);
                for dec in &s.decorator_list {
                    self.expr(dec);
                }
                if let Some(returns) = &s.returns {
                    self.expr(returns);
                }
                self.stmts(&s.body);
            }
            ast::Stmt::AsyncFunctionDef(s) => {
                self.arguments(&s.args);
                for dec in &s.decorator_list {
                    self.expr(dec);
                }
                if let Some(returns) = &s.returns {
                    self.expr(returns);
                }
                self.stmts(&s.body);
            }
            ast::Stmt::ClassDef(s) => {
                for base in &s.bases {
                    self.expr(base);
                }
                for kw in &s.keywords {
                    self.expr(&kw.value);
                }
                for dec in &s.decorator_list {
                    self.expr(dec);
                }
                self.stmts(&s.body);
            }
            ast::Stmt::Return(s) => {
                if let Some(value) = &s.value {
                    self.expr(value);
                }
            }
            ast::Stmt::Delete(s) => {
                for target in &s.targets {
                    self.expr(target);
                }
            }
            ast::Stmt::Assign(s) => {
                for target in &s.targets {
                    self.expr(target);
                }
                self.expr(&s.value);
            }
            ast::Stmt::AugAssign(s) => {
                self.expr(&s.target);
                self.expr(&s.value);
            }
            ast::Stmt::AnnAssign(s) => {
                self.expr(&s.target);
                self.expr(&s.annotation);
                if let Some(value) = &s.value {
                    self.expr(value);
                }
            }
            ast::Stmt::For(s) => {
                self.expr(&s.target);
                self.expr(&s.iter);
                self.stmts(&s.body);
                self.stmts(&s.orelse);
            }
            ast::Stmt::AsyncFor(s) => {
                self.expr(&s.target);
                self.expr(&s.iter);
                self.stmts(&s.body);
                self.stmts(&s.orelse);
            }
            ast::Stmt::While(s) => {
                self.expr(&s.test);
                self.stmts(&s.body);
                self.stmts(&s.orelse);
            }
            ast::Stmt::If(s) => {
                self.expr(&s.test);
                self.stmts(&s.body);
                self.stmts(&s.orelse);
            }
            ast::Stmt::With(s) => {
                for item in &s.items {
                    self.expr(&item.context_expr);
                    if let Some(vars) = &item.optional_vars {
                        self.expr(vars);
                    }
                }
                self.stmts(&s.body);
            }
            ast::Stmt::AsyncWith(s) => {
                for item in &s.items {
                    self.expr(&item.context_expr);
                    if let Some(vars) = &item.optional_vars {
                        self.expr(vars);
                    }
                }
                self.stmts(&s.body);
            }
            ast::Stmt::Match(s) => {
                self.expr(&s.subject);
                for case in &s.cases {
                    self.pattern(&case.pattern);
                    if let Some(guard) = &case.guard {
                        self.expr(guard);
                    }
                    self.stmts(&case.body);
                }
            }
            ast::Stmt::Raise(s) => {
                if let Some(exc) = &s.exc {
                    self.expr(exc);
                }
                if let Some(cause) = &s.cause {
                    self.expr(cause);
                }
            }
            ast::Stmt::Try(s) => {
                self.stmts(&s.body);
                for handler in &s.handlers {
                    let ast::ExceptHandler::ExceptHandler(h) = handler;
                    if let Some(type_) = &h.type_ {
                        self.expr(type_);
                    }
                    self.stmts(&h.body);
                }
                self.stmts(&s.orelse);
                self.stmts(&s.finalbody);
            }
            ast::Stmt::TryStar(s) => {
                self.stmts(&s.body);
                for handler in &s.handlers {
                    let ast::ExceptHandler::ExceptHandler(h) = handler;
                    if let Some(type_) = &h.type_ {
                        self.expr(type_);
                    }
                    self.stmts(&h.body);
                }
                self.stmts(&s.orelse);
                self.stmts(&s.finalbody);
            }
            ast::Stmt::Assert(s) => {
                self.expr(&s.test);
                if let Some(msg) = &s.msg {
                    self.expr(msg);
                }
            }
            ast::Stmt::Expr(s) => self.expr(&s.value),
            ast::Stmt::Global(_)
            | ast::Stmt::Nonlocal(_)
            | ast::Stmt::Pass(_)
            | ast::Stmt::Break(_)
            | ast::Stmt::Continue(_) => {}
            // Future statement forms hold no executable subexpressions that
            // run at load or call time.
            _ => {}
        }
    }

    fn stmts(&mut self, stmts: &[ast::Stmt]) {
        for stmt in stmts {
            self.stmt(stmt);
        }
    }

    fn arguments(&mut self, args: &ast::Arguments) {
        for arg in args.posonlyargs.iter().chain(&args.args).chain(&args.kwonlyargs) {
            if let Some(annotation) = &arg.def.annotation {
                self.expr(annotation);
            }
            if let Some(default) = &arg.default {
                self.expr(default);
            }
        }
        for vararg in args.vararg.iter().chain(&args.kwarg) {
            if let Some(annotation) = &vararg.annotation {
                self.expr(annotation);
            }
        }
    }

    // ── Expressions ───────────────────────────────────────────────────────────

    fn expr(&mut self, expr: &ast::Expr) {
        match expr {
            ast::Expr::Call(call) => {
                self.check_call(call);
                self.expr(&call.func);
                for arg in &call.args {
                    self.expr(arg);
                }
                for kw in &call.keywords {
                    self.expr(&kw.value);
                }
            }
            ast::Expr::Attribute(attr) => {
                // R5: attribute access on a blocked global.
                if let ast::Expr::Name(base) = attr.value.as_ref() {
                    if policy::is_blocked_global(base.id.as_str()) {
                        self.push(
                            FindingKind::DynamicBuiltinsAccess,
                            "R5",
                            format!(
                                "dynamic builtins access: attribute access on '{}' (rule R5)",
                                base.id
                            ),
                            attr,
                        );
                    }
                }
                self.expr(&attr.value);
            }
            ast::Expr::Subscript(sub) => {
                self.check_subscript(sub);
                self.expr(&sub.value);
                self.expr(&sub.slice);
            }
            ast::Expr::BoolOp(e) => {
                for value in &e.values {
                    self.expr(value);
                }
            }
            ast::Expr::NamedExpr(e) => {
                self.expr(&e.target);
                self.expr(&e.value);
            }
            ast::Expr::BinOp(e) => {
                self.expr(&e.left);
                self.expr(&e.right);
            }
            ast::Expr::UnaryOp(e) => self.expr(&e.operand),
            ast::Expr::Lambda(e) => {
                self.arguments(&e.args);
                self.expr(&e.body);
            }
            ast::Expr::IfExp(e) => {
                self.expr(&e.test);
                self.expr(&e.body);
                self.expr(&e.orelse);
            }
            ast::Expr::Dict(e) => {
                for key in e.keys.iter().flatten() {
                    self.expr(key);
                }
                for value in &e.values {
                    self.expr(value);
                }
            }
            ast::Expr::Set(e) => {
                for elt in &e.elts {
                    self.expr(elt);
                }
            }
            ast::Expr::ListComp(e) => {
                self.expr(&e.elt);
                self.comprehensions(&e.generators);
            }
            ast::Expr::SetComp(e) => {
                self.expr(&e.elt);
                self.comprehensions(&e.generators);
            }
            ast::Expr::DictComp(e) => {
                self.expr(&e.key);
                self.expr(&e.value);
                self.comprehensions(&e.generators);
            }
            ast::Expr::GeneratorExp(e) => {
                self.expr(&e.elt);
                self.comprehensions(&e.generators);
            }
            ast::Expr::Await(e) => self.expr(&e.value),
            ast::Expr::Yield(e) => {
                if let Some(value) = &e.value {
                    self.expr(value);
                }
            }
            ast::Expr::YieldFrom(e) => self.expr(&e.value),
            ast::Expr::Compare(e) => {
                self.expr(&e.left);
                for comparator in &e.comparators {
                    self.expr(comparator);
                }
            }
            ast::Expr::FormattedValue(e) => {
                self.expr(&e.value);
                if let Some(spec) = &e.format_spec {
                    self.expr(spec);
                }
            }
            ast::Expr::JoinedStr(e) => {
                for value in &e.values {
                    self.expr(value);
                }
            }
            ast::Expr::Starred(e) => self.expr(&e.value),
            ast::Expr::List(e) => {
                for elt in &e.elts {
                    self.expr(elt);
                }
            }
            ast::Expr::Tuple(e) => {
                for elt in &e.elts {
                    self.expr(elt);
                }
            }
            ast::Expr::Slice(e) => {
                for part in [&e.lower, &e.upper, &e.step].into_iter().flatten() {
                    self.expr(part);
                }
            }
            ast::Expr::Name(_) | ast::Expr::Constant(_) => {}
            _ => {}
        }
    }

    fn comprehensions(&mut self, generators: &[ast::Comprehension]) {
        for comp in generators {
            self.expr(&comp.target);
            self.expr(&comp.iter);
            for cond in &comp.ifs {
                self.expr(cond);
            }
        }
    }

    // ── Rules ─────────────────────────────────────────────────────────────────

    fn check_import(&mut self, module: &str, rule: &'static str, node: &impl Ranged) {
        if policy::check_module_admitted(module).is_err() {
            self.push(
                FindingKind::BlockedImport,
                rule,
                format!("blocked import: module '{module}' is not permitted (rule {rule})"),
                node,
            );
        }
    }

    fn check_call(&mut self, call: &ast::ExprCall) {
        match call.func.as_ref() {
            ast::Expr::Name(name) => {
                let id = name.id.as_str();
                // R3: the callee resolves by name to a dangerous builtin.
                if policy::is_dangerous_builtin(id) {
                    self.push(
                        FindingKind::DangerousCall,
                        "R3",
                        format!("dangerous call: builtin '{id}' may not be called (rule R3)"),
                        call,
                    );
                }
                // R4: getattr reaching into a blocked global.
                if id == "getattr" {
                    if let Some(ast::Expr::Name(first)) = call.args.first() {
                        if policy::is_blocked_global(first.id.as_str()) {
                            self.push(
                                FindingKind::DynamicBuiltinsAccess,
                                "R4",
                                format!(
                                    "dynamic builtins access: getattr on '{}' (rule R4)",
                                    first.id
                                ),
                                call,
                            );
                        }
                    }
                }
            }
            // Attribute and subscript callees are judged by R5–R7 when the
            // walk reaches them.
            ast::Expr::Attribute(_) | ast::Expr::Subscript(_) => {}
            // R8: any other construction that could constant-fold to a
            // dangerous builtin, e.g. `(f or eval)("1")`.
            other => {
                if let Some(name) = find_dangerous_name(other) {
                    self.push(
                        FindingKind::Bypass,
                        "R8",
                        format!(
                            "bypass: call target could evaluate to builtin '{name}' (rule R8)"
                        ),
                        call,
                    );
                }
            }
        }
    }

    fn check_subscript(&mut self, sub: &ast::ExprSubscript) {
        // R6: subscript on a blocked global.
        if let ast::Expr::Name(base) = sub.value.as_ref() {
            if policy::is_blocked_global(base.id.as_str()) {
                self.push(
                    FindingKind::DynamicBuiltinsAccess,
                    "R6",
                    format!(
                        "dynamic builtins access: subscript access on '{}' (rule R6)",
                        base.id
                    ),
                    sub,
                );
            }
        }
        // R7: subscript over a container literal hiding a dangerous builtin.
        let literal = matches!(
            sub.value.as_ref(),
            ast::Expr::List(_) | ast::Expr::Tuple(_) | ast::Expr::Dict(_)
        );
        if literal {
            if let Some(name) = find_dangerous_name(&sub.value) {
                self.push(
                    FindingKind::LiteralHidingBypass,
                    "R7",
                    format!(
                        "literal-hiding bypass: container literal holding '{name}' is subscripted (rule R7)"
                    ),
                    sub,
                );
            }
        }
    }

    fn pattern(&mut self, pattern: &ast::Pattern) {
        match pattern {
            ast::Pattern::MatchValue(p) => self.expr(&p.value),
            ast::Pattern::MatchMapping(p) => {
                for key in &p.keys {
                    self.expr(key);
                }
                for inner in &p.patterns {
                    self.pattern(inner);
                }
            }
            ast::Pattern::MatchClass(p) => {
                self.expr(&p.cls);
                for inner in p.patterns.iter().chain(&p.kwd_patterns) {
                    self.pattern(inner);
                }
            }
            ast::Pattern::MatchSequence(p) => {
                for inner in &p.patterns {
                    self.pattern(inner);
                }
            }
            ast::Pattern::MatchOr(p) => {
                for inner in &p.patterns {
                    self.pattern(inner);
                }
            }
            ast::Pattern::MatchAs(p) => {
                if let Some(inner) = &p.pattern {
                    self.pattern(inner);
                }
            }
            ast::Pattern::MatchSingleton(_) | ast::Pattern::MatchStar(_) => {}
        }
    }
}

/// Searches an expression for a name that refers to a dangerous builtin.
/// Used by R7 (literal hiding) and R8 (folded call targets), where the
/// reference sits inside a construction rather than at the call site.
fn find_dangerous_name(expr: &ast::Expr) -> Option<&str> {
    match expr {
        ast::Expr::Name(name) => {
            let id = name.id.as_str();
            policy::is_dangerous_builtin(id).then_some(id)
        }
        ast::Expr::Tuple(e) => e.elts.iter().find_map(find_dangerous_name),
        ast::Expr::List(e) => e.elts.iter().find_map(find_dangerous_name),
        ast::Expr::Set(e) => e.elts.iter().find_map(find_dangerous_name),
        ast::Expr::Dict(e) => e
            .keys
            .iter()
            .flatten()
            .find_map(find_dangerous_name)
            .or_else(|| e.values.iter().find_map(find_dangerous_name)),
        ast::Expr::BoolOp(e) => e.values.iter().find_map(find_dangerous_name),
        ast::Expr::BinOp(e) => {
            find_dangerous_name(&e.left).or_else(|| find_dangerous_name(&e.right))
        }
        ast::Expr::UnaryOp(e) => find_dangerous_name(&e.operand),
        ast::Expr::IfExp(e) => find_dangerous_name(&e.body)
            .or_else(|| find_dangerous_name(&e.orelse))
            .or_else(|| find_dangerous_name(&e.test)),
        ast::Expr::NamedExpr(e) => find_dangerous_name(&e.value),
        ast::Expr::Starred(e) => find_dangerous_name(&e.value),
        ast::Expr::Compare(e) => find_dangerous_name(&e.left)
            .or_else(|| e.comparators.iter().find_map(find_dangerous_name)),
        ast::Expr::Call(e) => find_dangerous_name(&e.func)
            .or_else(|| e.args.iter().find_map(find_dangerous_name)),
        ast::Expr::Lambda(e) => find_dangerous_name(&e.body),
        ast::Expr::Attribute(e) => find_dangerous_name(&e.value),
        ast::Expr::Subscript(e) => {
            find_dangerous_name(&e.value).or_else(|| find_dangerous_name(&e.slice))
        }
        _ => None,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
