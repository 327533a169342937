//! IR operations
//!
//! The opcode catalog of the flat state machine. Every op reads and writes
//! named memory slots; the code generator resolves names to indices. The
//! helper methods at the bottom give the optimizer a uniform view of state
//! references, reads and writes without matching on every variant at each
//! call site.

use crate::ir::value::{Fragment, Literal};
use crate::ir::StateId;
use serde::{Deserialize, Serialize};
use vortex_ast::{BinaryOp, Statement, UnaryOp};

/// A positional call argument
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CallArg {
    Var(String),
    Spread(String),
}

impl CallArg {
    pub fn var(&self) -> &str {
        match self {
            CallArg::Var(v) | CallArg::Spread(v) => v,
        }
    }

    fn var_mut(&mut self) -> &mut String {
        match self {
            CallArg::Var(v) | CallArg::Spread(v) => v,
        }
    }
}

/// One element of a CREATE_ARRAY op
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ArrayItem {
    Var(String),
    Spread(String),
    Hole,
}

/// One property of a CREATE_OBJECT op
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ObjectItem {
    /// Static key
    KeyValue { key: String, value_var: String },
    /// Computed key
    Computed { key_var: String, value_var: String },
    /// `...source`
    Spread { value_var: String },
}

/// State operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Op {
    /// Merged block of ops executed in order (optimizer product)
    Sequence { ops: Vec<Op> },

    /// No effect
    Noop,

    /// Unconditional jump
    Goto { target: StateId },

    /// Stop the program
    Halt,

    /// Pinned entry of a virtualized function. `params` are slot names in
    /// binding order (captured names first); `rest` binds the argument tail.
    FuncEntry {
        name: String,
        params: Vec<String>,
        rest: Option<String>,
        is_generator: bool,
        is_async: bool,
    },

    /// Push a frame and enter a known function at `entry`
    Call {
        callee: String,
        entry: StateId,
        args: Vec<CallArg>,
        caller_func_name: Option<String>,
    },

    /// Landing state after an internal call returns
    PostCall,

    /// Copy the last internal return value into a slot
    RetrieveResult { to: String },

    Return { value_var: Option<String> },

    Throw { value_var: String },

    /// Suspend with a value; `to` receives the resumed input
    Yield {
        to: String,
        value_var: Option<String>,
        delegate: bool,
    },

    /// Suspend on a promise; `to` receives the settled value
    Await { to: String, value_var: String },

    /// Copy between slots
    Assign { to: String, from: String },

    AssignLiteral { to: String, value: Literal },

    /// Assign an embedded fragment (function wrapper, raw expression)
    AssignLiteralDirect { to: String, fragment: Fragment },

    /// Read a host global into a slot
    AssignGlobal { to: String, global_name: String },

    Binary {
        to: String,
        op: BinaryOp,
        left: String,
        right: String,
    },

    Unary {
        to: String,
        op: UnaryOp,
        operand: String,
    },

    CondJump {
        test_var: String,
        true_state: StateId,
        false_state: StateId,
    },

    MemberAccess {
        to: String,
        object: String,
        property: String,
    },

    MemberAccessComputed {
        to: String,
        object: String,
        key_var: String,
    },

    /// Property read directly off a host global
    MemberAccessGlobal {
        to: String,
        global_name: String,
        property: String,
    },

    MemberAssign {
        object: String,
        property: String,
        value_var: String,
    },

    MemberAssignComputed {
        object: String,
        key_var: String,
        value_var: String,
    },

    CreateArray { to: String, elements: Vec<ArrayItem> },

    CreateObject { to: String, properties: Vec<ObjectItem> },

    /// Construct a known (virtualized) class by slot name
    NewInstance {
        to: String,
        callee: String,
        args: Vec<CallArg>,
    },

    /// Construct through a value held in a slot
    NewExternalInstance {
        to: String,
        callee_var: String,
        args: Vec<CallArg>,
    },

    MethodCall {
        to: String,
        object: String,
        /// Static method name; ignored when `key_var` is set
        method: String,
        key_var: Option<String>,
        args: Vec<CallArg>,
    },

    /// Call through a value, optionally with an explicit receiver
    ExternalCall {
        to: String,
        callee_var: String,
        this_object: Option<String>,
        args: Vec<CallArg>,
    },

    /// Push an exception handler target onto the in-frame EH stack
    PushCatchHandler { target: StateId },

    PopCatchHandler,

    /// Route execution out of a finally block by disposition code
    FinallyDispatch { normal: StateId },

    /// Host statement rendered verbatim into the dispatcher
    ExecuteStatement { statement: Box<Statement> },

    /// Tombstone
    Dead,
}

impl Op {
    /// Terminal ops never use the state's `next` edge
    pub fn is_terminal(&self) -> bool {
        match self {
            Op::Return { .. }
            | Op::Throw { .. }
            | Op::Halt
            | Op::Goto { .. }
            | Op::CondJump { .. }
            | Op::FinallyDispatch { .. } => true,
            Op::Sequence { ops } => ops.last().is_some_and(Op::is_terminal),
            _ => false,
        }
    }

    /// Ops that must not be merged into superblocks or moved across
    pub fn is_barrier(&self) -> bool {
        matches!(
            self,
            Op::Call { .. }
                | Op::CondJump { .. }
                | Op::Return { .. }
                | Op::Throw { .. }
                | Op::Halt
                | Op::Yield { .. }
                | Op::Await { .. }
                | Op::FinallyDispatch { .. }
                | Op::FuncEntry { .. }
                | Op::PostCall
                | Op::Goto { .. }
                | Op::Dead
        )
    }

    /// Whether executing this op can be observed (calls, stores, control)
    pub fn has_side_effects(&self) -> bool {
        match self {
            Op::Sequence { ops } => ops.iter().any(Op::has_side_effects),
            Op::Noop
            | Op::Assign { .. }
            | Op::AssignLiteral { .. }
            | Op::AssignGlobal { .. }
            | Op::Binary { .. }
            | Op::Unary { .. }
            | Op::MemberAccessGlobal { .. } => false,
            _ => true,
        }
    }

    /// Visit every state id this op references
    pub fn for_each_state_ref(&self, f: &mut impl FnMut(StateId)) {
        match self {
            Op::Sequence { ops } => {
                for op in ops {
                    op.for_each_state_ref(f);
                }
            }
            Op::Goto { target } | Op::PushCatchHandler { target } => f(*target),
            Op::CondJump {
                true_state,
                false_state,
                ..
            } => {
                f(*true_state);
                f(*false_state);
            }
            Op::Call { entry, .. } => f(*entry),
            Op::FinallyDispatch { normal } => f(*normal),
            Op::AssignLiteral {
                value: Literal::StateRef(id),
                ..
            } => f(*id),
            Op::AssignLiteralDirect {
                fragment: Fragment::FuncRef { entry, .. },
                ..
            } => f(*entry),
            _ => {}
        }
    }

    /// Rewrite every state id this op references
    pub fn remap_state_refs(&mut self, f: &mut impl FnMut(StateId) -> StateId) {
        match self {
            Op::Sequence { ops } => {
                for op in ops {
                    op.remap_state_refs(f);
                }
            }
            Op::Goto { target } | Op::PushCatchHandler { target } => *target = f(*target),
            Op::CondJump {
                true_state,
                false_state,
                ..
            } => {
                *true_state = f(*true_state);
                *false_state = f(*false_state);
            }
            Op::Call { entry, .. } => *entry = f(*entry),
            Op::FinallyDispatch { normal } => *normal = f(*normal),
            Op::AssignLiteral {
                value: Literal::StateRef(id),
                ..
            } => *id = f(*id),
            Op::AssignLiteralDirect {
                fragment: Fragment::FuncRef { entry, .. },
                ..
            } => *entry = f(*entry),
            _ => {}
        }
    }

    /// The slot this op writes, if exactly one
    pub fn dest(&self) -> Option<&str> {
        match self {
            Op::RetrieveResult { to }
            | Op::Yield { to, .. }
            | Op::Await { to, .. }
            | Op::Assign { to, .. }
            | Op::AssignLiteral { to, .. }
            | Op::AssignLiteralDirect { to, .. }
            | Op::AssignGlobal { to, .. }
            | Op::Binary { to, .. }
            | Op::Unary { to, .. }
            | Op::MemberAccess { to, .. }
            | Op::MemberAccessComputed { to, .. }
            | Op::MemberAccessGlobal { to, .. }
            | Op::CreateArray { to, .. }
            | Op::CreateObject { to, .. }
            | Op::NewInstance { to, .. }
            | Op::NewExternalInstance { to, .. }
            | Op::MethodCall { to, .. }
            | Op::ExternalCall { to, .. } => Some(to),
            _ => None,
        }
    }

    /// Visit every slot name this op reads
    pub fn for_each_read(&self, f: &mut impl FnMut(&str)) {
        let read_args = |args: &[CallArg], f: &mut dyn FnMut(&str)| {
            for arg in args {
                f(arg.var());
            }
        };
        match self {
            Op::Sequence { ops } => {
                for op in ops {
                    op.for_each_read(f);
                }
            }
            Op::Assign { from, .. } => f(from),
            Op::Binary { left, right, .. } => {
                f(left);
                f(right);
            }
            Op::Unary { operand, .. } => f(operand),
            Op::CondJump { test_var, .. } => f(test_var),
            Op::Return { value_var } => {
                if let Some(v) = value_var {
                    f(v);
                }
            }
            Op::Throw { value_var } => f(value_var),
            Op::Yield { value_var, .. } => {
                if let Some(v) = value_var {
                    f(v);
                }
            }
            Op::Await { value_var, .. } => f(value_var),
            Op::Call { args, .. } => read_args(args, f),
            Op::MemberAccess { object, .. } => f(object),
            Op::MemberAccessComputed {
                object, key_var, ..
            } => {
                f(object);
                f(key_var);
            }
            Op::MemberAssign {
                object, value_var, ..
            } => {
                f(object);
                f(value_var);
            }
            Op::MemberAssignComputed {
                object,
                key_var,
                value_var,
            } => {
                f(object);
                f(key_var);
                f(value_var);
            }
            Op::CreateArray { elements, .. } => {
                for elem in elements {
                    match elem {
                        ArrayItem::Var(v) | ArrayItem::Spread(v) => f(v),
                        ArrayItem::Hole => {}
                    }
                }
            }
            Op::CreateObject { properties, .. } => {
                for prop in properties {
                    match prop {
                        ObjectItem::KeyValue { value_var, .. } => f(value_var),
                        ObjectItem::Computed { key_var, value_var } => {
                            f(key_var);
                            f(value_var);
                        }
                        ObjectItem::Spread { value_var } => f(value_var),
                    }
                }
            }
            Op::NewInstance { callee, args, .. } => {
                f(callee);
                read_args(args, f);
            }
            Op::NewExternalInstance {
                callee_var, args, ..
            } => {
                f(callee_var);
                read_args(args, f);
            }
            Op::MethodCall {
                object,
                key_var,
                args,
                ..
            } => {
                f(object);
                if let Some(k) = key_var {
                    f(k);
                }
                read_args(args, f);
            }
            Op::ExternalCall {
                callee_var,
                this_object,
                args,
                ..
            } => {
                f(callee_var);
                if let Some(t) = this_object {
                    f(t);
                }
                read_args(args, f);
            }
            Op::AssignLiteralDirect { fragment, .. } => {
                // Captured names are read live by the emitted wrapper.
                if let Fragment::FuncRef { captured, .. } = fragment {
                    for name in captured {
                        f(name);
                    }
                }
            }
            _ => {}
        }
    }

    /// Rewrite every read of slot `from` to read `to` instead
    pub fn rename_reads(&mut self, from: &str, to: &str) {
        let rename = |v: &mut String| {
            if v == from {
                *v = to.to_string();
            }
        };
        let rename_args = |args: &mut [CallArg]| {
            for arg in args {
                let v = arg.var_mut();
                if v == from {
                    *v = to.to_string();
                }
            }
        };
        match self {
            Op::Sequence { ops } => {
                for op in ops {
                    op.rename_reads(from, to);
                }
            }
            Op::Assign { from: src, .. } => rename(src),
            Op::Binary { left, right, .. } => {
                rename(left);
                rename(right);
            }
            Op::Unary { operand, .. } => rename(operand),
            Op::CondJump { test_var, .. } => rename(test_var),
            Op::Return { value_var } => {
                if let Some(v) = value_var {
                    rename(v);
                }
            }
            Op::Throw { value_var } => rename(value_var),
            Op::Yield { value_var, .. } => {
                if let Some(v) = value_var {
                    rename(v);
                }
            }
            Op::Await { value_var, .. } => rename(value_var),
            Op::Call { args, .. } => rename_args(args),
            Op::MemberAccess { object, .. } => rename(object),
            Op::MemberAccessComputed {
                object, key_var, ..
            } => {
                rename(object);
                rename(key_var);
            }
            Op::MemberAssign {
                object, value_var, ..
            } => {
                rename(object);
                rename(value_var);
            }
            Op::MemberAssignComputed {
                object,
                key_var,
                value_var,
            } => {
                rename(object);
                rename(key_var);
                rename(value_var);
            }
            Op::CreateArray { elements, .. } => {
                for elem in elements {
                    match elem {
                        ArrayItem::Var(v) | ArrayItem::Spread(v) => rename(v),
                        ArrayItem::Hole => {}
                    }
                }
            }
            Op::CreateObject { properties, .. } => {
                for prop in properties {
                    match prop {
                        ObjectItem::KeyValue { value_var, .. } => rename(value_var),
                        ObjectItem::Computed { key_var, value_var } => {
                            rename(key_var);
                            rename(value_var);
                        }
                        ObjectItem::Spread { value_var } => rename(value_var),
                    }
                }
            }
            Op::NewInstance { callee, args, .. } => {
                rename(callee);
                rename_args(args);
            }
            Op::NewExternalInstance {
                callee_var, args, ..
            } => {
                rename(callee_var);
                rename_args(args);
            }
            Op::MethodCall {
                object,
                key_var,
                args,
                ..
            } => {
                rename(object);
                if let Some(k) = key_var {
                    rename(k);
                }
                rename_args(args);
            }
            Op::ExternalCall {
                callee_var,
                this_object,
                args,
                ..
            } => {
                rename(callee_var);
                if let Some(t) = this_object {
                    rename(t);
                }
                rename_args(args);
            }
            _ => {}
        }
    }

    /// Short opcode name for dumps and diagnostics
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Op::Sequence { .. } => "SEQUENCE",
            Op::Noop => "NOOP",
            Op::Goto { .. } => "GOTO",
            Op::Halt => "HALT",
            Op::FuncEntry { .. } => "FUNC_ENTRY",
            Op::Call { .. } => "CALL",
            Op::PostCall => "POST_CALL",
            Op::RetrieveResult { .. } => "RETRIEVE_RESULT",
            Op::Return { .. } => "RETURN",
            Op::Throw { .. } => "THROW",
            Op::Yield { .. } => "YIELD",
            Op::Await { .. } => "AWAIT",
            Op::Assign { .. } => "ASSIGN",
            Op::AssignLiteral { .. } => "ASSIGN_LITERAL",
            Op::AssignLiteralDirect { .. } => "ASSIGN_LITERAL_DIRECT",
            Op::AssignGlobal { .. } => "ASSIGN_GLOBAL",
            Op::Binary { .. } => "BINARY",
            Op::Unary { .. } => "UNARY",
            Op::CondJump { .. } => "COND_JUMP",
            Op::MemberAccess { .. } => "MEMBER_ACCESS",
            Op::MemberAccessComputed { .. } => "MEMBER_ACCESS_COMPUTED",
            Op::MemberAccessGlobal { .. } => "MEMBER_ACCESS_GLOBAL",
            Op::MemberAssign { .. } => "MEMBER_ASSIGN",
            Op::MemberAssignComputed { .. } => "MEMBER_ASSIGN_COMPUTED",
            Op::CreateArray { .. } => "CREATE_ARRAY",
            Op::CreateObject { .. } => "CREATE_OBJECT",
            Op::NewInstance { .. } => "NEW_INSTANCE",
            Op::NewExternalInstance { .. } => "NEW_EXTERNAL_INSTANCE",
            Op::MethodCall { .. } => "METHOD_CALL",
            Op::ExternalCall { .. } => "EXTERNAL_CALL",
            Op::PushCatchHandler { .. } => "PUSH_CATCH_HANDLER",
            Op::PopCatchHandler => "POP_CATCH_HANDLER",
            Op::FinallyDispatch { .. } => "FINALLY_DISPATCH",
            Op::ExecuteStatement { .. } => "EXECUTE_STATEMENT",
            Op::Dead => "DEAD",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_classification() {
        assert!(Op::Halt.is_terminal());
        assert!(Op::Return { value_var: None }.is_terminal());
        assert!(Op::Goto { target: 1 }.is_terminal());
        assert!(!Op::Noop.is_terminal());
        assert!(!Op::PostCall.is_terminal());
        let seq = Op::Sequence {
            ops: vec![Op::Noop, Op::Halt],
        };
        assert!(seq.is_terminal());
    }

    #[test]
    fn test_state_refs_cond_jump() {
        let op = Op::CondJump {
            test_var: "t".into(),
            true_state: 3,
            false_state: 9,
        };
        let mut refs = Vec::new();
        op.for_each_state_ref(&mut |id| refs.push(id));
        assert_eq!(refs, vec![3, 9]);
    }

    #[test]
    fn test_state_refs_through_sequence_and_literal() {
        let op = Op::Sequence {
            ops: vec![
                Op::AssignLiteral {
                    to: "x".into(),
                    value: Literal::StateRef(7),
                },
                Op::Goto { target: 4 },
            ],
        };
        let mut refs = Vec::new();
        op.for_each_state_ref(&mut |id| refs.push(id));
        assert_eq!(refs, vec![7, 4]);
    }

    #[test]
    fn test_remap_state_refs() {
        let mut op = Op::CondJump {
            test_var: "t".into(),
            true_state: 1,
            false_state: 2,
        };
        op.remap_state_refs(&mut |id| id + 10);
        match op {
            Op::CondJump {
                true_state,
                false_state,
                ..
            } => {
                assert_eq!(true_state, 11);
                assert_eq!(false_state, 12);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_reads_and_dest() {
        let op = Op::Binary {
            to: "t2".into(),
            op: BinaryOp::Add,
            left: "a".into(),
            right: "b".into(),
        };
        assert_eq!(op.dest(), Some("t2"));
        let mut reads = Vec::new();
        op.for_each_read(&mut |v| reads.push(v.to_string()));
        assert_eq!(reads, vec!["a", "b"]);
    }

    #[test]
    fn test_rename_reads_keeps_dest() {
        let mut op = Op::Assign {
            to: "x".into(),
            from: "x".into(),
        };
        op.rename_reads("x", "y");
        match op {
            Op::Assign { to, from } => {
                assert_eq!(to, "x");
                assert_eq!(from, "y");
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_side_effects() {
        assert!(!Op::Noop.has_side_effects());
        assert!(!Op::Assign {
            to: "a".into(),
            from: "b".into()
        }
        .has_side_effects());
        assert!(Op::MethodCall {
            to: "t".into(),
            object: "o".into(),
            method: "m".into(),
            key_var: None,
            args: vec![],
        }
        .has_side_effects());
    }
}
