//! Compile-time control stack
//!
//! The generator tracks enclosing loops, switches, labels and try contexts
//! explicitly so `break`/`continue`/`return` can be routed through pending
//! finally blocks with disposition codes instead of relying on the host
//! language's own unwinding.

use crate::ir::StateId;

/// Finally disposition codes stored in the `_FIN` slot
pub mod disposition {
    pub const NORMAL: f64 = 0.0;
    pub const RETURN: f64 = 1.0;
    pub const BREAK: f64 = 2.0;
    pub const CONTINUE: f64 = 3.0;
    pub const THROW: f64 = 4.0;
}

#[derive(Debug, Clone)]
pub enum ControlFrame {
    Loop {
        label: Option<String>,
        break_target: StateId,
        continue_target: StateId,
    },
    Switch {
        label: Option<String>,
        break_target: StateId,
    },
    /// Plain labeled statement; only a labeled `break` can target it
    Labeled {
        label: String,
        break_target: StateId,
    },
    Try {
        finally_start: Option<StateId>,
        has_catch: bool,
        /// Whether a handler pushed by this try is live at the current
        /// lowering position (body or catch-with-finally phase)
        handler_active: bool,
    },
}

impl ControlFrame {
    pub fn matches_break(&self, label: Option<&str>) -> bool {
        match (self, label) {
            (ControlFrame::Loop { label: l, .. }, Some(want)) => l.as_deref() == Some(want),
            (ControlFrame::Switch { label: l, .. }, Some(want)) => l.as_deref() == Some(want),
            (ControlFrame::Labeled { label: l, .. }, Some(want)) => l == want,
            (ControlFrame::Loop { .. } | ControlFrame::Switch { .. }, None) => true,
            _ => false,
        }
    }

    pub fn matches_continue(&self, label: Option<&str>) -> bool {
        match (self, label) {
            (ControlFrame::Loop { label: l, .. }, Some(want)) => l.as_deref() == Some(want),
            (ControlFrame::Loop { .. }, None) => true,
            _ => false,
        }
    }

    pub fn break_target(&self) -> Option<StateId> {
        match self {
            ControlFrame::Loop { break_target, .. }
            | ControlFrame::Switch { break_target, .. }
            | ControlFrame::Labeled { break_target, .. } => Some(*break_target),
            ControlFrame::Try { .. } => None,
        }
    }

    pub fn continue_target(&self) -> Option<StateId> {
        match self {
            ControlFrame::Loop {
                continue_target, ..
            } => Some(*continue_target),
            _ => None,
        }
    }
}
