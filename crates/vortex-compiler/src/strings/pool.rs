//! String pool and collector
//!
//! One walk over the AST gathers every string the emitted program will
//! need: literals, cooked template chunks, non-computed member keys and
//! static property names, plus a fixed set of runtime names the lowering
//! itself introduces (iterator protocol, prototype wiring, reflective
//! helpers). The pool is append-only until finalization, which shuffles
//! the entries, assigns dense ids and encodes the payloads.

use crate::error::{CompileError, CompileResult};
use crate::rng::Prng;
use crate::strings::conceal::conceal;
use rustc_hash::FxHashMap;
use vortex_ast::{
    walk_expression, walk_property_key, Expression, MemberProperty, ObjectProperty,
    PropertyKey, Statement, Visitor,
};

/// Sentinel thrown into the VM to signal generator termination
pub const GENERATOR_SENTINEL: &str = "@@VRXT";

/// Runtime names the lowering and the VM scaffold rely on regardless of
/// whether the source mentions them.
pub const RESERVED_RUNTIME_NAMES: &[&str] = &[
    "prototype",
    "constructor",
    "call",
    "apply",
    "bind",
    "length",
    "name",
    "next",
    "throw",
    "return",
    "value",
    "done",
    "iterator",
    "asyncIterator",
    "keys",
    "get",
    "set",
    "has",
    "then",
    "resolve",
    "construct",
    "create",
    "slice",
    "assign",
    "deleteProperty",
    "getPrototypeOf",
    "setPrototypeOf",
    "defineProperty",
    "configurable",
    "enumerable",
    "writable",
    GENERATOR_SENTINEL,
];

#[derive(Debug, Default)]
pub struct StringPool {
    ids: FxHashMap<String, u32>,
    entries: Vec<String>,
    payloads: Vec<String>,
    finalized: bool,
}

impl StringPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one string. Duplicates are ignored; calls after finalization
    /// are a programming error.
    pub fn insert(&mut self, s: &str) {
        debug_assert!(!self.finalized, "insert after finalize");
        if !self.ids.contains_key(s) {
            self.ids.insert(s.to_string(), self.entries.len() as u32);
            self.entries.push(s.to_string());
        }
    }

    /// Walk the program body and gather every string the output will
    /// query, then the reserved runtime names.
    pub fn collect(&mut self, statements: &[Statement]) {
        let mut collector = Collector { pool: self };
        for stmt in statements {
            collector.visit_statement(stmt);
        }
        for name in RESERVED_RUNTIME_NAMES {
            self.insert(name);
        }
    }

    /// Shuffle, assign final dense ids and encode payloads. After this,
    /// lookups for uncollected strings fail.
    pub fn finalize(&mut self, prng: &mut Prng, encrypt: bool) {
        debug_assert!(!self.finalized, "finalize twice");
        prng.shuffle(&mut self.entries);
        self.ids.clear();
        for (id, s) in self.entries.iter().enumerate() {
            self.ids.insert(s.clone(), id as u32);
        }
        self.payloads = self
            .entries
            .iter()
            .map(|s| {
                if encrypt {
                    conceal(s.as_bytes(), prng)
                } else {
                    s.clone()
                }
            })
            .collect();
        self.finalized = true;
    }

    pub fn get_id(&self, s: &str) -> CompileResult<u32> {
        self.ids
            .get(s)
            .copied()
            .ok_or_else(|| CompileError::MissingString {
                value: s.to_string(),
            })
    }

    pub fn contains(&self, s: &str) -> bool {
        self.ids.contains_key(s)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Encoded payloads in id order; valid after finalization
    pub fn payloads(&self) -> &[String] {
        &self.payloads
    }

    /// Entries in id order; valid after finalization
    pub fn entries(&self) -> &[String] {
        &self.entries
    }
}

struct Collector<'a> {
    pool: &'a mut StringPool,
}

impl Visitor for Collector<'_> {
    fn visit_expression(&mut self, expr: &Expression) {
        match expr {
            Expression::String(s) => self.pool.insert(s),
            Expression::Template(tpl) => {
                for quasi in &tpl.quasis {
                    self.pool.insert(quasi);
                }
            }
            Expression::Member(member) => {
                if let MemberProperty::Identifier(name) = &member.property {
                    self.pool.insert(name);
                }
            }
            Expression::Object(obj) => {
                for prop in &obj.properties {
                    if let ObjectProperty::Shorthand(name) = prop {
                        self.pool.insert(name);
                    }
                }
            }
            _ => {}
        }
        walk_expression(self, expr);
    }

    fn visit_property_key(&mut self, key: &PropertyKey) {
        if let Some(name) = key.as_static_name() {
            self.pool.insert(&name);
        }
        walk_property_key(self, key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vortex_ast::{BlockStatement, Function, Pattern, Program};

    fn pool_for(program: &Program) -> StringPool {
        let mut pool = StringPool::new();
        pool.collect(&program.body);
        pool
    }

    #[test]
    fn test_collects_literals_and_member_keys() {
        let program = Program::new(vec![Statement::expr(Expression::call(
            Expression::member(Expression::ident("console"), "log"),
            vec![Expression::str("hello")],
        ))]);
        let pool = pool_for(&program);
        assert!(pool.contains("hello"));
        assert!(pool.contains("log"));
    }

    #[test]
    fn test_collects_template_chunks() {
        let program = Program::new(vec![Statement::expr(Expression::Template(
            vortex_ast::TemplateLiteral {
                quasis: vec!["pre ".into(), " post".into()],
                expressions: vec![Expression::ident("x")],
            },
        ))]);
        let pool = pool_for(&program);
        assert!(pool.contains("pre "));
        assert!(pool.contains(" post"));
    }

    #[test]
    fn test_reserved_names_always_present() {
        let pool = pool_for(&Program::default());
        for name in RESERVED_RUNTIME_NAMES {
            assert!(pool.contains(name), "missing reserved name {name}");
        }
        assert!(pool.contains(GENERATOR_SENTINEL));
    }

    #[test]
    fn test_collects_inside_functions() {
        let program = Program::new(vec![Statement::FunctionDecl(vortex_ast::FunctionDecl {
            name: "f".into(),
            function: Function::new(
                vec![Pattern::Identifier("a".into())],
                BlockStatement::new(vec![Statement::expr(Expression::str("inner"))]),
            ),
        })]);
        let pool = pool_for(&program);
        assert!(pool.contains("inner"));
    }

    #[test]
    fn test_finalize_assigns_dense_ids() {
        let mut pool = StringPool::new();
        pool.insert("a");
        pool.insert("b");
        pool.insert("c");
        let mut prng = Prng::new(Some(5));
        pool.finalize(&mut prng, true);
        let mut seen: Vec<u32> = ["a", "b", "c"]
            .iter()
            .map(|s| pool.get_id(s).unwrap())
            .collect();
        seen.sort_unstable();
        assert_eq!(seen, vec![0, 1, 2]);
        assert_eq!(pool.payloads().len(), 3);
    }

    #[test]
    fn test_missing_string_error() {
        let mut pool = StringPool::new();
        pool.insert("present");
        let mut prng = Prng::new(Some(5));
        pool.finalize(&mut prng, false);
        assert!(matches!(
            pool.get_id("absent"),
            Err(CompileError::MissingString { .. })
        ));
    }

    #[test]
    fn test_plaintext_mode_stores_raw_strings() {
        let mut pool = StringPool::new();
        pool.insert("raw");
        let mut prng = Prng::new(Some(5));
        pool.finalize(&mut prng, false);
        assert_eq!(pool.payloads(), &["raw".to_string()]);
    }
}
