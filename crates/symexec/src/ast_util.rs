//! Shared parse layer.
//!
//! One request parses its source exactly once into a [`ParsedModule`]; the
//! validator, the signature extractor, and the branch/complexity analyzer all
//! walk the same tree. Offsets from the parser are byte positions into the
//! original source, so line numbers and condition text are recovered by
//! slicing rather than by re-rendering the AST.

use rustpython_parser::ast::{self, Ranged};
use rustpython_parser::text_size::{TextRange, TextSize};
use rustpython_parser::{Parse, ParseError};

/// One parameter of a function signature, as written in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamInfo {
    pub name: String,
    /// The annotation expression text (`int`, `str`, ...), when present.
    pub annotation: Option<String>,
}

/// A source string together with its parsed statement list.
#[derive(Debug)]
pub struct ParsedModule<'a> {
    pub source: &'a str,
    pub suite: ast::Suite,
}

impl<'a> ParsedModule<'a> {
    /// Parses `source` as a module. The returned error carries a byte offset;
    /// convert it with [`line_at`].
    pub fn parse(source: &'a str) -> Result<Self, ParseError> {
        let suite = ast::Suite::parse(source, "<unit>")?;
        Ok(Self { source, suite })
    }

    /// 1-based line number of a byte offset.
    pub fn line_at(&self, offset: TextSize) -> u32 {
        line_at(self.source, offset)
    }

    /// The source text covered by `range`.
    pub fn snippet(&self, range: TextRange) -> &'a str {
        let start = usize::from(range.start()).min(self.source.len());
        let end = usize::from(range.end()).min(self.source.len());
        &self.source[start..end]
    }

    /// Finds the definition of `name`, searching nested scopes and class
    /// bodies as well as the module top level.
    pub fn function_def(&self, name: &str) -> Option<&ast::StmtFunctionDef> {
        find_function(&self.suite, name)
    }

    /// Parameter names and annotations of `name`, in positional order
    /// (positional-only, then regular, then keyword-only). `None` when the
    /// function is not defined in the source.
    pub fn signature(&self, name: &str) -> Option<Vec<ParamInfo>> {
        let def = self.function_def(name)?;
        let mut params = Vec::new();
        for arg in def.args.posonlyargs.iter().chain(def.args.args.iter()) {
            params.push(self.param_info(&arg.def));
        }
        for arg in &def.args.kwonlyargs {
            params.push(self.param_info(&arg.def));
        }
        Some(params)
    }

    /// The docstring of `name`, when its body opens with a string constant.
    pub fn docstring(&self, name: &str) -> Option<String> {
        let def = self.function_def(name)?;
        let first = def.body.first()?;
        if let ast::Stmt::Expr(expr_stmt) = first {
            if let ast::Expr::Constant(c) = expr_stmt.value.as_ref() {
                if let ast::Constant::Str(s) = &c.value {
                    return Some(s.clone());
                }
            }
        }
        None
    }

    fn param_info(&self, arg: &ast::Arg) -> ParamInfo {
        ParamInfo {
            name: arg.arg.to_string(),
            annotation: arg
                .annotation
                .as_deref()
                .map(|ann| self.snippet(ann.range()).to_string()),
        }
    }
}

/// 1-based line number of `offset` within `source`.
pub fn line_at(source: &str, offset: TextSize) -> u32 {
    let cut = usize::from(offset).min(source.len());
    source[..cut].bytes().filter(|b| *b == b'\n').count() as u32 + 1
}

/// 1-based line of a parse error.
pub fn parse_error_line(source: &str, err: &ParseError) -> u32 {
    line_at(source, err.offset)
}

fn find_function<'t>(stmts: &'t [ast::Stmt], name: &str) -> Option<&'t ast::StmtFunctionDef> {
    for stmt in stmts {
        match stmt {
            ast::Stmt::FunctionDef(def) => {
                if def.name.as_str() == name {
                    return Some(def);
                }
                if let Some(found) = find_function(&def.body, name) {
                    return Some(found);
                }
            }
            ast::Stmt::ClassDef(class) => {
                if let Some(found) = find_function(&class.body, name) {
                    return Some(found);
                }
            }
            ast::Stmt::If(s) => {
                if let Some(found) =
                    find_function(&s.body, name).or_else(|| find_function(&s.orelse, name))
                {
                    return Some(found);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_accepts_a_simple_function() {
        let module = ParsedModule::parse("def f(x):\n    return x\n").expect("parses");
        assert_eq!(module.suite.len(), 1);
    }

    #[test]
    fn test_parse_error_carries_a_line() {
        let source = "x = 1\ndef f(:\n";
        let err = ParsedModule::parse(source).expect_err("invalid def");
        assert_eq!(parse_error_line(source, &err), 2);
    }

    #[test]
    fn test_function_def_found_at_top_level() {
        let module = ParsedModule::parse("def alpha():\n    pass\n\ndef beta():\n    pass\n")
            .expect("parses");
        assert!(module.function_def("alpha").is_some());
        assert!(module.function_def("beta").is_some());
        assert!(module.function_def("gamma").is_none());
    }

    #[test]
    fn test_function_def_found_inside_class() {
        let module =
            ParsedModule::parse("class C:\n    def method(self):\n        pass\n").expect("parses");
        assert!(module.function_def("method").is_some());
    }

    #[test]
    fn test_signature_names_and_annotations_in_order() {
        let module =
            ParsedModule::parse("def divide(a: int, b: int) -> float:\n    return a / b\n")
                .expect("parses");
        let sig = module.signature("divide").expect("divide is defined");
        assert_eq!(sig.len(), 2);
        assert_eq!(sig[0].name, "a");
        assert_eq!(sig[0].annotation.as_deref(), Some("int"));
        assert_eq!(sig[1].name, "b");
        assert_eq!(sig[1].annotation.as_deref(), Some("int"));
    }

    #[test]
    fn test_signature_without_annotations() {
        let module = ParsedModule::parse("def f(x, y):\n    return x\n").expect("parses");
        let sig = module.signature("f").expect("f is defined");
        assert_eq!(sig[0].annotation, None);
        assert_eq!(sig[1].annotation, None);
    }

    #[test]
    fn test_docstring_extraction() {
        let source = "def f(x: int) -> int:\n    \"\"\"pre: x > 0\n    post: __return__ > 0\n    \"\"\"\n    return x\n";
        let module = ParsedModule::parse(source).expect("parses");
        let doc = module.docstring("f").expect("has docstring");
        assert!(doc.contains("pre: x > 0"));
    }

    #[test]
    fn test_no_docstring_is_none() {
        let module = ParsedModule::parse("def f():\n    return 1\n").expect("parses");
        assert_eq!(module.docstring("f"), None);
    }

    #[test]
    fn test_line_at_counts_newlines() {
        let source = "a = 1\nb = 2\nc = 3\n";
        assert_eq!(line_at(source, TextSize::new(0)), 1);
        assert_eq!(line_at(source, TextSize::new(6)), 2);
        assert_eq!(line_at(source, TextSize::new(12)), 3);
    }
}
