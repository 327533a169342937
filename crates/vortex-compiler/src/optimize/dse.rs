//! Global dead-store elimination
//!
//! Counts reads of every generated temporary across the whole program --
//! including conservative scans of embedded AST payloads -- and deletes
//! side-effect-free writes nobody reads.

use super::{is_temp, read_counts, Optimizer};
use crate::ir::{Fragment, Ir, Op};
use rustc_hash::FxHashMap;

pub(super) fn dead_stores(_o: &mut Optimizer, ir: &mut Ir) -> usize {
    let reads = read_counts(ir);
    let mut changed = 0;
    for state in &mut ir.states {
        changed += sweep_op(&mut state.op, &reads);
    }
    changed
}

fn removable(op: &Op, reads: &FxHashMap<String, usize>) -> bool {
    let dead_temp = |name: &str| is_temp(name) && reads.get(name).copied().unwrap_or(0) == 0;
    match op {
        Op::Assign { to, .. }
        | Op::AssignLiteral { to, .. }
        | Op::AssignGlobal { to, .. }
        | Op::Binary { to, .. }
        | Op::Unary { to, .. }
        | Op::MemberAccessGlobal { to, .. } => dead_temp(to),
        // Wrapper creation is pure; raw fragments may not be.
        Op::AssignLiteralDirect {
            to,
            fragment: Fragment::FuncRef { .. },
        } => dead_temp(to),
        _ => false,
    }
}

fn sweep_op(op: &mut Op, reads: &FxHashMap<String, usize>) -> usize {
    if let Op::Sequence { ops } = op {
        let before = ops.len();
        let mut kept = Vec::with_capacity(before);
        for inner in ops.drain(..) {
            if !removable(&inner, reads) {
                kept.push(inner);
            }
        }
        let removed = before - kept.len();
        *ops = kept;
        return removed;
    }
    if removable(op, reads) {
        *op = Op::Noop;
        return 1;
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Literal;

    #[test]
    fn test_unread_temp_store_removed() {
        let mut ir = Ir::new();
        let a = ir.alloc(Op::AssignLiteral {
            to: "_temp$0".into(),
            value: Literal::Number(1.0),
        });
        let b = ir.alloc(Op::Halt);
        ir.set_next(a, b);
        let reads = read_counts(&ir);
        assert_eq!(sweep_op(&mut ir.states[0].op.clone(), &reads), 1);
    }

    #[test]
    fn test_read_temp_store_kept() {
        let mut ir = Ir::new();
        let a = ir.alloc(Op::AssignLiteral {
            to: "_temp$0".into(),
            value: Literal::Number(1.0),
        });
        let b = ir.alloc(Op::Return {
            value_var: Some("_temp$0".into()),
        });
        ir.set_next(a, b);
        let reads = read_counts(&ir);
        let mut op = ir.states[0].op.clone();
        assert_eq!(sweep_op(&mut op, &reads), 0);
    }

    #[test]
    fn test_user_variable_store_kept() {
        let mut ir = Ir::new();
        ir.alloc(Op::AssignLiteral {
            to: "counter".into(),
            value: Literal::Number(0.0),
        });
        let reads = read_counts(&ir);
        let mut op = ir.states[0].op.clone();
        assert_eq!(sweep_op(&mut op, &reads), 0);
    }

    #[test]
    fn test_embedded_fragment_usage_counts() {
        use vortex_ast::Expression;
        let mut ir = Ir::new();
        let a = ir.alloc(Op::AssignLiteral {
            to: "_temp$9".into(),
            value: Literal::Number(1.0),
        });
        // An embedded raw expression mentioning the temp keeps it alive.
        let b = ir.alloc(Op::AssignLiteralDirect {
            to: "sink".into(),
            fragment: Fragment::Expr(Box::new(Expression::ident("_temp$9"))),
        });
        ir.set_next(a, b);
        let reads = read_counts(&ir);
        let mut op = ir.states[0].op.clone();
        assert_eq!(sweep_op(&mut op, &reads), 0);
    }
}
