//! IR pretty printer
//!
//! Human-readable dumps for debugging and test assertions.

use crate::ir::{Ir, Literal, Op, State};
use std::fmt::Write;

/// Render the whole program, one live state per line.
pub fn dump(ir: &Ir) -> String {
    let mut out = String::new();
    for state in &ir.states {
        if matches!(state.op, Op::Dead) {
            continue;
        }
        let _ = writeln!(out, "{}", format_state(state));
    }
    if !ir.function_table.is_empty() {
        let _ = writeln!(out, "---");
        for entry in &ir.function_table {
            let _ = writeln!(out, "fn {} -> s{}", entry.name, entry.entry);
        }
    }
    out
}

/// One-line rendering of a state
pub fn format_state(state: &State) -> String {
    let mut line = format!("s{}: {}", state.id, format_op(&state.op));
    if let Some(next) = state.next {
        let _ = write!(line, " -> s{}", next);
    }
    line
}

fn format_literal(value: &Literal) -> String {
    match value {
        Literal::Number(n) => format!("{}", n),
        Literal::String(s) => format!("{:?}", s),
        Literal::Boolean(b) => format!("{}", b),
        Literal::Null => "null".into(),
        Literal::Undefined => "undefined".into(),
        Literal::StateRef(id) => format!("&s{}", id),
    }
}

fn format_op(op: &Op) -> String {
    match op {
        Op::Sequence { ops } => {
            let inner: Vec<String> = ops.iter().map(format_op).collect();
            format!("SEQUENCE [{}]", inner.join("; "))
        }
        Op::Goto { target } => format!("GOTO s{}", target),
        Op::FuncEntry { name, params, .. } => {
            format!("FUNC_ENTRY {}({})", name, params.join(", "))
        }
        Op::Call { callee, entry, args, .. } => {
            format!("CALL {}@s{} ({} args)", callee, entry, args.len())
        }
        Op::RetrieveResult { to } => format!("RETRIEVE_RESULT {}", to),
        Op::Return { value_var } => match value_var {
            Some(v) => format!("RETURN {}", v),
            None => "RETURN".into(),
        },
        Op::Throw { value_var } => format!("THROW {}", value_var),
        Op::Yield { to, value_var, delegate } => format!(
            "YIELD{} {} <- {}",
            if *delegate { "*" } else { "" },
            to,
            value_var.as_deref().unwrap_or("undefined")
        ),
        Op::Await { to, value_var } => format!("AWAIT {} <- {}", to, value_var),
        Op::Assign { to, from } => format!("ASSIGN {} <- {}", to, from),
        Op::AssignLiteral { to, value } => {
            format!("ASSIGN_LITERAL {} <- {}", to, format_literal(value))
        }
        Op::AssignLiteralDirect { to, .. } => format!("ASSIGN_LITERAL_DIRECT {}", to),
        Op::AssignGlobal { to, global_name } => {
            format!("ASSIGN_GLOBAL {} <- {}", to, global_name)
        }
        Op::Binary { to, op, left, right } => {
            format!("BINARY {} <- {} {} {}", to, left, op.as_str(), right)
        }
        Op::Unary { to, op, operand } => {
            format!("UNARY {} <- {} {}", to, op.as_str(), operand)
        }
        Op::CondJump {
            test_var,
            true_state,
            false_state,
        } => format!("COND_JUMP {} ? s{} : s{}", test_var, true_state, false_state),
        Op::MemberAccess { to, object, property } => {
            format!("MEMBER_ACCESS {} <- {}.{}", to, object, property)
        }
        Op::MemberAccessComputed { to, object, key_var } => {
            format!("MEMBER_ACCESS_COMPUTED {} <- {}[{}]", to, object, key_var)
        }
        Op::MemberAccessGlobal {
            to,
            global_name,
            property,
        } => format!("MEMBER_ACCESS_GLOBAL {} <- {}.{}", to, global_name, property),
        Op::MemberAssign {
            object,
            property,
            value_var,
        } => format!("MEMBER_ASSIGN {}.{} <- {}", object, property, value_var),
        Op::MemberAssignComputed {
            object,
            key_var,
            value_var,
        } => format!("MEMBER_ASSIGN_COMPUTED {}[{}] <- {}", object, key_var, value_var),
        Op::CreateArray { to, elements } => {
            format!("CREATE_ARRAY {} ({} elems)", to, elements.len())
        }
        Op::CreateObject { to, properties } => {
            format!("CREATE_OBJECT {} ({} props)", to, properties.len())
        }
        Op::NewInstance { to, callee, .. } => format!("NEW_INSTANCE {} <- new {}", to, callee),
        Op::NewExternalInstance { to, callee_var, .. } => {
            format!("NEW_EXTERNAL_INSTANCE {} <- new {}", to, callee_var)
        }
        Op::MethodCall {
            to,
            object,
            method,
            key_var,
            ..
        } => match key_var {
            Some(k) => format!("METHOD_CALL {} <- {}[{}]()", to, object, k),
            None => format!("METHOD_CALL {} <- {}.{}()", to, object, method),
        },
        Op::ExternalCall { to, callee_var, .. } => {
            format!("EXTERNAL_CALL {} <- {}()", to, callee_var)
        }
        Op::PushCatchHandler { target } => format!("PUSH_CATCH_HANDLER s{}", target),
        Op::FinallyDispatch { normal } => format!("FINALLY_DISPATCH normal=s{}", normal),
        Op::ExecuteStatement { .. } => "EXECUTE_STATEMENT".into(),
        other => other.mnemonic().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_simple_states() {
        let mut ir = Ir::new();
        let a = ir.alloc(Op::AssignLiteral {
            to: "_temp$0".into(),
            value: Literal::Number(3.0),
        });
        let b = ir.alloc(Op::Halt);
        ir.set_next(a, b);
        let text = dump(&ir);
        assert!(text.contains("s0: ASSIGN_LITERAL _temp$0 <- 3 -> s1"));
        assert!(text.contains("s1: HALT"));
    }
}
