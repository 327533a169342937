//! Vortex AST - Source Language Data Model
//!
//! This crate defines the AST of the ECMAScript-like source language the
//! Vortex compiler consumes and re-emits. The parser that produces these
//! nodes lives outside the compiler; tests and embedders construct them
//! directly.

pub mod expression;
pub mod pattern;
pub mod print;
pub mod statement;
pub mod visitor;

pub use expression::*;
pub use pattern::*;
pub use print::print_program;
pub use statement::*;
pub use visitor::{
    walk_class, walk_expression, walk_function, walk_pattern, walk_program, walk_property_key,
    walk_statement, Visitor,
};

use serde::{Deserialize, Serialize};

/// A complete parsed program (module or script).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Program {
    pub body: Vec<Statement>,
}

impl Program {
    pub fn new(body: Vec<Statement>) -> Self {
        Self { body }
    }
}
