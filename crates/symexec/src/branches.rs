//! Branch collection and cyclomatic complexity.
//!
//! One pass over the target function's body collects every `if`/`elif`/
//! `while`/`for` decision point as a [`BranchRecord`] (condition text sliced
//! straight from the source) and computes cyclomatic complexity as
//! `1 + decision_points + extra_boolean_operands`: each `and`/`or` beyond
//! the first operand of a boolean expression adds an independent path.
//!
//! Reachability starts as `unknown` on every record; symbolic mode asks the
//! engine to refine it afterwards.

use rustpython_parser::ast::{self, Ranged};
use rustpython_parser::text_size::TextRange;

use crate::ast_util::ParsedModule;
use crate::results::{BranchRecord, Reachability};

/// Everything the branch analysis operation derives from the AST.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchInfo {
    pub branches: Vec<BranchRecord>,
    pub complexity: u32,
}

/// Collects decision points and complexity for `function`. `None` when the
/// function is not defined in the source.
pub fn analyze_function(module: &ParsedModule<'_>, function: &str) -> Option<BranchInfo> {
    let def = module.function_def(function)?;
    let mut collector = Collector {
        module,
        branches: Vec::new(),
        decisions: 0,
        bool_extras: 0,
    };
    collector.stmts(&def.body);
    Some(BranchInfo {
        branches: collector.branches,
        complexity: 1 + collector.decisions + collector.bool_extras,
    })
}

struct Collector<'m, 'src> {
    module: &'m ParsedModule<'src>,
    branches: Vec<BranchRecord>,
    decisions: u32,
    bool_extras: u32,
}

impl Collector<'_, '_> {
    fn record(&mut self, range: TextRange) {
        self.decisions += 1;
        self.branches.push(BranchRecord {
            line: self.module.line_at(range.start()),
            condition_text: self.module.snippet(range).to_string(),
            reachability: Reachability::Unknown,
        });
    }

    fn stmts(&mut self, stmts: &[ast::Stmt]) {
        for stmt in stmts {
            self.stmt(stmt);
        }
    }

    fn stmt(&mut self, stmt: &ast::Stmt) {
        match stmt {
            ast::Stmt::If(s) => {
                self.record(s.test.range());
                self.expr(&s.test);
                self.stmts(&s.body);
                // An elif arrives as a nested If in orelse and records its
                // own decision; a bare else adds none.
                self.stmts(&s.orelse);
            }
            ast::Stmt::While(s) => {
                self.record(s.test.range());
                self.expr(&s.test);
                self.stmts(&s.body);
                self.stmts(&s.orelse);
            }
            ast::Stmt::For(s) => {
                self.record(TextRange::new(s.target.start(), s.iter.end()));
                self.expr(&s.iter);
                self.stmts(&s.body);
                self.stmts(&s.orelse);
            }
            ast::Stmt::AsyncFor(s) => {
                self.record(TextRange::new(s.target.start(), s.iter.end()));
                self.expr(&s.iter);
                self.stmts(&s.body);
                self.stmts(&s.orelse);
            }
            ast::Stmt::Try(s) => {
                self.stmts(&s.body);
                for handler in &s.handlers {
                    let ast::ExceptHandler::ExceptHandler(h) = handler;
                    self.stmts(&h.body);
                }
                self.stmts(&s.orelse);
                self.stmts(&s.finalbody);
            }
            ast::Stmt::With(s) => {
                for item in &s.items {
                    self.expr(&item.context_expr);
                }
                self.stmts(&s.body);
            }
            ast::Stmt::Match(s) => {
                self.expr(&s.subject);
                for case in &s.cases {
                    if let Some(guard) = &case.guard {
                        self.expr(guard);
                    }
                    self.stmts(&case.body);
                }
            }
            ast::Stmt::Return(s) => {
                if let Some(value) = &s.value {
                    self.expr(value);
                }
            }
            ast::Stmt::Assign(s) => self.expr(&s.value),
            ast::Stmt::AugAssign(s) => self.expr(&s.value),
            ast::Stmt::AnnAssign(s) => {
                if let Some(value) = &s.value {
                    self.expr(value);
                }
            }
            ast::Stmt::Expr(s) => self.expr(&s.value),
            ast::Stmt::Assert(s) => {
                self.expr(&s.test);
            }
            ast::Stmt::Raise(s) => {
                if let Some(exc) = &s.exc {
                    self.expr(exc);
                }
            }
            // Branches of a nested def belong to that function, not this one.
            ast::Stmt::FunctionDef(_) | ast::Stmt::AsyncFunctionDef(_) | ast::Stmt::ClassDef(_) => {}
            _ => {}
        }
    }

    /// Counts extra operands of boolean expressions: `a and b or c`
    /// contributes two.
    fn expr(&mut self, expr: &ast::Expr) {
        if let ast::Expr::BoolOp(op) = expr {
            self.bool_extras += op.values.len().saturating_sub(1) as u32;
        }
        match expr {
            ast::Expr::BoolOp(e) => {
                for value in &e.values {
                    self.expr(value);
                }
            }
            ast::Expr::BinOp(e) => {
                self.expr(&e.left);
                self.expr(&e.right);
            }
            ast::Expr::UnaryOp(e) => self.expr(&e.operand),
            ast::Expr::Compare(e) => {
                self.expr(&e.left);
                for comparator in &e.comparators {
                    self.expr(comparator);
                }
            }
            ast::Expr::Call(e) => {
                self.expr(&e.func);
                for arg in &e.args {
                    self.expr(arg);
                }
                for kw in &e.keywords {
                    self.expr(&kw.value);
                }
            }
            ast::Expr::IfExp(e) => {
                self.expr(&e.test);
                self.expr(&e.body);
                self.expr(&e.orelse);
            }
            ast::Expr::Lambda(e) => self.expr(&e.body),
            ast::Expr::NamedExpr(e) => self.expr(&e.value),
            ast::Expr::Starred(e) => self.expr(&e.value),
            ast::Expr::Attribute(e) => self.expr(&e.value),
            ast::Expr::Subscript(e) => {
                self.expr(&e.value);
                self.expr(&e.slice);
            }
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
            ast::Expr::Set(e) => {
                for elt in &e.elts {
                    self.expr(elt);
                }
            }
            ast::Expr::Dict(e) => {
                for key in e.keys.iter().flatten() {
                    self.expr(key);
                }
                for value in &e.values {
                    self.expr(value);
                }
            }
            _ => {}
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn analyze(source: &str, function: &str) -> BranchInfo {
        let module = ParsedModule::parse(source).expect("parses");
        analyze_function(&module, function).expect("function defined")
    }

    #[test]
    fn test_straight_line_function_has_complexity_one() {
        let info = analyze("def f(x):\n    return x + 1\n", "f");
        assert!(info.branches.is_empty());
        assert_eq!(info.complexity, 1);
    }

    #[test]
    fn test_single_if_records_condition_and_line() {
        let info = analyze("def f(x):\n    if x > 0:\n        return x\n    return -x\n", "f");
        assert_eq!(info.branches.len(), 1);
        assert_eq!(info.branches[0].line, 2);
        assert_eq!(info.branches[0].condition_text, "x > 0");
        assert_eq!(info.branches[0].reachability, Reachability::Unknown);
        assert_eq!(info.complexity, 2);
    }

    #[test]
    fn test_elif_chain_records_each_decision() {
        let source = "def f(x):\n    if x > 10:\n        return 2\n    elif x > 0:\n        return 1\n    else:\n        return 0\n";
        let info = analyze(source, "f");
        assert_eq!(info.branches.len(), 2);
        assert_eq!(info.branches[0].condition_text, "x > 10");
        assert_eq!(info.branches[1].condition_text, "x > 0");
        assert_eq!(info.branches[1].line, 4);
        assert_eq!(info.complexity, 3);
    }

    #[test]
    fn test_while_and_for_are_decisions() {
        let source = "def f(n):\n    total = 0\n    while n > 0:\n        n -= 1\n    for i in range(3):\n        total += i\n    return total\n";
        let info = analyze(source, "f");
        assert_eq!(info.branches.len(), 2);
        assert_eq!(info.branches[0].condition_text, "n > 0");
        assert_eq!(info.branches[1].condition_text, "i in range(3)");
        assert_eq!(info.complexity, 3);
    }

    #[test]
    fn test_boolean_operands_add_complexity() {
        let source = "def f(a, b, c):\n    if a and b or c:\n        return 1\n    return 0\n";
        let info = analyze(source, "f");
        assert_eq!(info.branches.len(), 1);
        // 1 + one decision + two extra boolean operands.
        assert_eq!(info.complexity, 4);
    }

    #[test]
    fn test_boolean_operands_outside_conditions_count() {
        let info = analyze("def f(a, b):\n    return a or b\n", "f");
        assert!(info.branches.is_empty());
        assert_eq!(info.complexity, 2);
    }

    #[test]
    fn test_nested_function_branches_are_not_counted() {
        let source = "def f(x):\n    def inner(y):\n        if y:\n            return 1\n        return 0\n    return inner(x)\n";
        let info = analyze(source, "f");
        assert!(info.branches.is_empty());
        assert_eq!(info.complexity, 1);
    }

    #[test]
    fn test_missing_function_is_none() {
        let module = ParsedModule::parse("def f():\n    pass\n").expect("parses");
        assert!(analyze_function(&module, "g").is_none());
    }
}
