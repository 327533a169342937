//! IR values
//!
//! Literals carried by assignment ops and the embedded fragment kinds some
//! ops transport into the code generator.

use crate::ir::StateId;
use serde::{Deserialize, Serialize};

/// Constant values in the IR
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Number(f64),
    String(String),
    Boolean(bool),
    Null,
    Undefined,
    /// A state id used as a runtime jump target (finally routing). The
    /// code generator translates it through the id mapping, so it must be
    /// remapped like any other state reference.
    StateRef(StateId),
}

impl Literal {
    /// Check if this is a numeric constant
    pub fn is_numeric(&self) -> bool {
        matches!(self, Literal::Number(_))
    }

    /// Try to get as f64
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Literal::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Try to get as bool
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Literal::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// JS truthiness, when statically known
    pub fn truthiness(&self) -> Option<bool> {
        match self {
            Literal::Number(n) => Some(*n != 0.0 && !n.is_nan()),
            Literal::String(s) => Some(!s.is_empty()),
            Literal::Boolean(b) => Some(*b),
            Literal::Null | Literal::Undefined => Some(false),
            Literal::StateRef(_) => None,
        }
    }
}

/// Embedded fragment kinds carried by ASSIGN_LITERAL_DIRECT.
///
/// Rather than an opaque AST blob, fragments are a closed set so the
/// optimizer can walk them for usage counting and the code generator can
/// render each kind with the right wrapper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Fragment {
    /// A wrapper around a virtualized function: the emitted value is a
    /// host function that enters the VM at `entry`.
    FuncRef {
        name: String,
        entry: StateId,
        /// Parameter slot names in binding order (captured first)
        params: Vec<String>,
        /// Rest parameter slot name, bound to the argument tail
        rest: Option<String>,
        /// Captured enclosing names whose current values are passed on
        /// every call
        captured: Vec<String>,
        is_generator: bool,
        is_async: bool,
    },
    /// A raw expression rendered verbatim (partial mode, odd literals)
    Expr(Box<vortex_ast::Expression>),
}

impl Fragment {
    pub fn is_func_ref(&self) -> bool {
        matches!(self, Fragment::FuncRef { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthiness() {
        assert_eq!(Literal::Number(0.0).truthiness(), Some(false));
        assert_eq!(Literal::Number(2.0).truthiness(), Some(true));
        assert_eq!(Literal::Number(f64::NAN).truthiness(), Some(false));
        assert_eq!(Literal::String(String::new()).truthiness(), Some(false));
        assert_eq!(Literal::String("x".into()).truthiness(), Some(true));
        assert_eq!(Literal::Null.truthiness(), Some(false));
        assert_eq!(Literal::Undefined.truthiness(), Some(false));
        assert_eq!(Literal::StateRef(3).truthiness(), None);
    }

    #[test]
    fn test_as_number() {
        assert_eq!(Literal::Number(4.5).as_number(), Some(4.5));
        assert_eq!(Literal::Boolean(true).as_number(), None);
    }
}
