//! Binding patterns
//!
//! Patterns appear in variable declarations, function parameters, catch
//! clauses and destructuring assignment targets.

use super::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Pattern {
    /// Plain binding: `x`
    Identifier(String),

    /// Array destructuring: `[a, , b = 1, ...rest]`
    Array(ArrayPattern),

    /// Object destructuring: `{ a, b: c, [k]: d, ...rest }`
    Object(ObjectPattern),

    /// Default value: `x = expr`
    Assignment(AssignmentPattern),

    /// Rest element: `...xs`
    Rest(Box<Pattern>),

    /// Member target, only valid in destructuring assignment: `[o.p] = v`
    Member(MemberExpression),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayPattern {
    /// None encodes a hole
    pub elements: Vec<Option<Pattern>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectPattern {
    pub properties: Vec<ObjectPatternProperty>,
    pub rest: Option<Box<Pattern>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectPatternProperty {
    pub key: PropertyKey,
    pub value: Pattern,
    pub shorthand: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentPattern {
    pub target: Box<Pattern>,
    pub default: Box<Expression>,
}

impl Pattern {
    /// Collect every identifier this pattern binds, in source order.
    /// Member targets bind nothing.
    pub fn bound_names<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Pattern::Identifier(name) => out.push(name),
            Pattern::Array(arr) => {
                for elem in arr.elements.iter().flatten() {
                    elem.bound_names(out);
                }
            }
            Pattern::Object(obj) => {
                for prop in &obj.properties {
                    prop.value.bound_names(out);
                }
                if let Some(rest) = &obj.rest {
                    rest.bound_names(out);
                }
            }
            Pattern::Assignment(assign) => assign.target.bound_names(out),
            Pattern::Rest(inner) => inner.bound_names(out),
            Pattern::Member(_) => {}
        }
    }

    /// The single identifier, if this pattern is one
    pub fn as_identifier(&self) -> Option<&str> {
        match self {
            Pattern::Identifier(name) => Some(name),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bound_names_nested() {
        // [a, {b: [c]}, ...d]
        let pattern = Pattern::Array(ArrayPattern {
            elements: vec![
                Some(Pattern::Identifier("a".into())),
                None,
                Some(Pattern::Object(ObjectPattern {
                    properties: vec![ObjectPatternProperty {
                        key: PropertyKey::Identifier("b".into()),
                        value: Pattern::Array(ArrayPattern {
                            elements: vec![Some(Pattern::Identifier("c".into()))],
                        }),
                        shorthand: false,
                    }],
                    rest: None,
                })),
                Some(Pattern::Rest(Box::new(Pattern::Identifier("d".into())))),
            ],
        });
        let mut names = Vec::new();
        pattern.bound_names(&mut names);
        assert_eq!(names, vec!["a", "c", "d"]);
    }

    #[test]
    fn test_default_binds_target() {
        let pattern = Pattern::Assignment(AssignmentPattern {
            target: Box::new(Pattern::Identifier("x".into())),
            default: Box::new(Expression::num(1.0)),
        });
        let mut names = Vec::new();
        pattern.bound_names(&mut names);
        assert_eq!(names, vec!["x"]);
    }
}
