//! Constant folding and algebraic simplification
//!
//! Works off the single-assignment literal map: a temp written exactly
//! once by a plain literal can stand in for its value anywhere it is
//! read. Folding never touches state-id literals.

use super::{is_temp, read_counts, single_literal_defs, write_counts, Optimizer};
use crate::ir::{Ir, Literal, Op, StateId};
use rustc_hash::FxHashMap;
use vortex_ast::{BinaryOp, UnaryOp};

/// Evaluate pure ops over known literal operands; fold COND_JUMPs with a
/// known test into GOTOs.
pub(super) fn constant_fold(_o: &mut Optimizer, ir: &mut Ir) -> usize {
    let defs = single_literal_defs(ir);
    let mut changed = 0;
    for i in 0..ir.states.len() {
        let op = ir.states[i].op.clone();
        match op {
            Op::Binary {
                to,
                op: bin,
                left,
                right,
            } => {
                if let (Some(l), Some(r)) = (defs.get(&left), defs.get(&right)) {
                    if let Some(value) = eval_binary(l, bin, r) {
                        ir.states[i].op = Op::AssignLiteral { to, value };
                        changed += 1;
                    }
                }
            }
            Op::Unary {
                to,
                op: un,
                operand,
            } => {
                if let Some(v) = defs.get(&operand) {
                    if let Some(value) = eval_unary(un, v) {
                        ir.states[i].op = Op::AssignLiteral { to, value };
                        changed += 1;
                    }
                }
            }
            Op::CondJump {
                test_var,
                true_state,
                false_state,
            } => {
                if let Some(truth) = defs.get(&test_var).and_then(Literal::truthiness) {
                    let target = if truth { true_state } else { false_state };
                    ir.states[i].op = Op::Goto { target };
                    changed += 1;
                }
            }
            _ => {}
        }
    }
    changed
}

/// `true && x`, `false || x` and friends. Logical operators lower to
/// COND_JUMP diamonds, so this pass catches the boolean residue: nots of
/// known booleans and equality over two known booleans.
pub(super) fn boolean_logic(_o: &mut Optimizer, ir: &mut Ir) -> usize {
    let defs = single_literal_defs(ir);
    let mut changed = 0;
    for i in 0..ir.states.len() {
        let op = ir.states[i].op.clone();
        match op {
            Op::Unary {
                to,
                op: UnaryOp::Not,
                operand,
            } => {
                if let Some(truth) = defs.get(&operand).and_then(Literal::truthiness) {
                    ir.states[i].op = Op::AssignLiteral {
                        to,
                        value: Literal::Boolean(!truth),
                    };
                    changed += 1;
                }
            }
            Op::Binary {
                to,
                op: BinaryOp::StrictEqual | BinaryOp::Equal,
                left,
                right,
            } => {
                if let (Some(Literal::Boolean(l)), Some(Literal::Boolean(r))) =
                    (defs.get(&left), defs.get(&right))
                {
                    ir.states[i].op = Op::AssignLiteral {
                        to,
                        value: Literal::Boolean(l == r),
                    };
                    changed += 1;
                }
            }
            _ => {}
        }
    }
    changed
}

/// `x*1`, `x+0`, `x-0`, `x|0`, `x-x` over operands known to be numeric
pub(super) fn strength_reduction(_o: &mut Optimizer, ir: &mut Ir) -> usize {
    let defs = single_literal_defs(ir);
    let numeric = numeric_producers(ir);
    let mut changed = 0;

    let lit_num = |defs: &FxHashMap<String, Literal>, var: &str| -> Option<f64> {
        defs.get(var).and_then(Literal::as_number)
    };

    for i in 0..ir.states.len() {
        let Op::Binary {
            to,
            op: bin,
            left,
            right,
        } = ir.states[i].op.clone()
        else {
            continue;
        };
        // Coercion is only droppable when the variable side is numeric.
        let left_is_num = numeric.contains_key(&left);
        let replacement = match bin {
            BinaryOp::Mul if lit_num(&defs, &right) == Some(1.0) && left_is_num => {
                Some(Op::Assign {
                    to: to.clone(),
                    from: left.clone(),
                })
            }
            BinaryOp::Add | BinaryOp::Sub
                if lit_num(&defs, &right) == Some(0.0) && left_is_num =>
            {
                Some(Op::Assign {
                    to: to.clone(),
                    from: left.clone(),
                })
            }
            BinaryOp::BitOr if lit_num(&defs, &right) == Some(0.0) && left_is_num => {
                Some(Op::Assign {
                    to: to.clone(),
                    from: left.clone(),
                })
            }
            BinaryOp::Sub if left == right && left_is_num => Some(Op::AssignLiteral {
                to: to.clone(),
                value: Literal::Number(0.0),
            }),
            _ => None,
        };
        if let Some(op) = replacement {
            ir.states[i].op = op;
            changed += 1;
        }
    }
    changed
}

/// `(x + a) + b  ->  x + (a+b)` over integer literal tails. The second
/// literal's defining state is rewritten to the combined constant and the
/// chain re-rooted, leaving the first literal for dead-store cleanup.
pub(super) fn reassociate(_o: &mut Optimizer, ir: &mut Ir) -> usize {
    let defs = single_literal_defs(ir);
    let reads = read_counts(ir);
    let writes = write_counts(ir);

    // Defining state of each top-level temp write.
    let mut def_state: FxHashMap<String, StateId> = FxHashMap::default();
    for state in &ir.states {
        if matches!(state.op, Op::Dead) {
            continue;
        }
        if let Some(dest) = state.op.dest() {
            if is_temp(dest) {
                def_state.insert(dest.to_string(), state.id);
            }
        }
    }

    let as_int = |lit: &Literal| -> Option<f64> {
        let n = lit.as_number()?;
        (n.fract() == 0.0 && n.abs() < 2f64.powi(31)).then_some(n)
    };

    let mut changed = 0;
    for i in 0..ir.states.len() {
        let Op::Binary {
            to,
            op: outer_op @ (BinaryOp::Add | BinaryOp::Sub),
            left,
            right,
        } = ir.states[i].op.clone()
        else {
            continue;
        };
        // Outer right must be a single-use integer literal we may rewrite.
        let Some(b) = defs.get(&right).and_then(as_int) else {
            continue;
        };
        if reads.get(&right).copied() != Some(1) {
            continue;
        }
        // Left must be a single-use chain link `x (+|-) a`.
        if writes.get(&left).copied() != Some(1) || reads.get(&left).copied() != Some(1) {
            continue;
        }
        let Some(&left_def) = def_state.get(&left) else {
            continue;
        };
        let Op::Binary {
            op: inner_op @ (BinaryOp::Add | BinaryOp::Sub),
            left: x,
            right: inner_right,
            ..
        } = ir.states[left_def as usize].op.clone()
        else {
            continue;
        };
        let Some(a) = defs.get(&inner_right).and_then(as_int) else {
            continue;
        };

        // Combined constant of  ((x ± a) ± b)  expressed as  x + c.
        let signed_a = if inner_op == BinaryOp::Add { a } else { -a };
        let signed_b = if outer_op == BinaryOp::Add { b } else { -b };
        let combined = signed_a + signed_b;

        let Some(&b_def) = def_state.get(&right) else {
            continue;
        };
        ir.states[b_def as usize].op = Op::AssignLiteral {
            to: right.clone(),
            value: Literal::Number(combined),
        };
        ir.states[i].op = Op::Binary {
            to,
            op: BinaryOp::Add,
            left: x,
            right,
        };
        changed += 1;
    }
    changed
}

/// Temps whose single definition provably yields a number
fn numeric_producers(ir: &Ir) -> FxHashMap<String, ()> {
    fn visit(op: &Op, writes: &FxHashMap<String, usize>, out: &mut FxHashMap<String, ()>) {
        match op {
            Op::Sequence { ops } => {
                for inner in ops {
                    visit(inner, writes, out);
                }
            }
            Op::AssignLiteral {
                to,
                value: Literal::Number(_),
            } if is_temp(to) && writes.get(to.as_str()).copied() == Some(1) => {
                out.insert(to.clone(), ());
            }
            Op::Binary { to, op: bin, .. }
                if is_temp(to)
                    && writes.get(to.as_str()).copied() == Some(1)
                    && matches!(
                        bin,
                        BinaryOp::Sub
                            | BinaryOp::Mul
                            | BinaryOp::Div
                            | BinaryOp::Mod
                            | BinaryOp::Pow
                            | BinaryOp::BitAnd
                            | BinaryOp::BitOr
                            | BinaryOp::BitXor
                            | BinaryOp::ShiftLeft
                            | BinaryOp::ShiftRight
                            | BinaryOp::UnsignedShiftRight
                    ) =>
            {
                out.insert(to.clone(), ());
            }
            Op::Unary {
                to,
                op: UnaryOp::Plus | UnaryOp::Minus | UnaryOp::BitNot,
                ..
            } if is_temp(to) && writes.get(to.as_str()).copied() == Some(1) => {
                out.insert(to.clone(), ());
            }
            _ => {}
        }
    }
    let writes = write_counts(ir);
    let mut out = FxHashMap::default();
    for state in &ir.states {
        if !matches!(state.op, Op::Dead) {
            visit(&state.op, &writes, &mut out);
        }
    }
    out
}

// ----------------------------------------------------------------------
// Literal evaluation (JS number semantics)
// ----------------------------------------------------------------------

fn to_int32(n: f64) -> i32 {
    if !n.is_finite() || n == 0.0 {
        return 0;
    }
    let m = n.trunc() % 4_294_967_296.0;
    let m = if m < 0.0 { m + 4_294_967_296.0 } else { m };
    if m >= 2_147_483_648.0 {
        (m - 4_294_967_296.0) as i32
    } else {
        m as i32
    }
}

fn to_uint32(n: f64) -> u32 {
    to_int32(n) as u32
}

pub(super) fn eval_binary(left: &Literal, op: BinaryOp, right: &Literal) -> Option<Literal> {
    use Literal::*;
    // String concatenation first: Add with any string operand.
    if op == BinaryOp::Add {
        if let (String(l), String(r)) = (left, right) {
            return Some(String(format!("{l}{r}")));
        }
    }
    match (left, right) {
        (Number(l), Number(r)) => {
            let (l, r) = (*l, *r);
            Some(match op {
                BinaryOp::Add => Number(l + r),
                BinaryOp::Sub => Number(l - r),
                BinaryOp::Mul => Number(l * r),
                BinaryOp::Div => Number(l / r),
                BinaryOp::Mod => Number(l % r),
                BinaryOp::Pow => Number(l.powf(r)),
                BinaryOp::Less => Boolean(l < r),
                BinaryOp::LessEqual => Boolean(l <= r),
                BinaryOp::Greater => Boolean(l > r),
                BinaryOp::GreaterEqual => Boolean(l >= r),
                BinaryOp::Equal | BinaryOp::StrictEqual => Boolean(l == r),
                BinaryOp::NotEqual | BinaryOp::StrictNotEqual => Boolean(l != r),
                BinaryOp::BitAnd => Number((to_int32(l) & to_int32(r)) as f64),
                BinaryOp::BitOr => Number((to_int32(l) | to_int32(r)) as f64),
                BinaryOp::BitXor => Number((to_int32(l) ^ to_int32(r)) as f64),
                BinaryOp::ShiftLeft => Number((to_int32(l) << (to_uint32(r) & 31)) as f64),
                BinaryOp::ShiftRight => Number((to_int32(l) >> (to_uint32(r) & 31)) as f64),
                BinaryOp::UnsignedShiftRight => {
                    Number((to_uint32(l) >> (to_uint32(r) & 31)) as f64)
                }
                BinaryOp::In | BinaryOp::Instanceof => return None,
            })
        }
        (String(l), String(r)) => Some(match op {
            BinaryOp::Equal | BinaryOp::StrictEqual => Boolean(l == r),
            BinaryOp::NotEqual | BinaryOp::StrictNotEqual => Boolean(l != r),
            BinaryOp::Less => Boolean(l < r),
            BinaryOp::LessEqual => Boolean(l <= r),
            BinaryOp::Greater => Boolean(l > r),
            BinaryOp::GreaterEqual => Boolean(l >= r),
            _ => return None,
        }),
        (Boolean(l), Boolean(r)) => Some(match op {
            BinaryOp::Equal | BinaryOp::StrictEqual => Boolean(l == r),
            BinaryOp::NotEqual | BinaryOp::StrictNotEqual => Boolean(l != r),
            _ => return None,
        }),
        _ => None,
    }
}

pub(super) fn eval_unary(op: UnaryOp, operand: &Literal) -> Option<Literal> {
    use Literal::*;
    match (op, operand) {
        (UnaryOp::Minus, Number(n)) => Some(Number(-n)),
        (UnaryOp::Plus, Number(n)) => Some(Number(*n)),
        (UnaryOp::BitNot, Number(n)) => Some(Number(!to_int32(*n) as f64)),
        (UnaryOp::Not, lit) => lit.truthiness().map(|t| Boolean(!t)),
        (UnaryOp::Void, _) => Some(Undefined),
        (UnaryOp::Typeof, Number(_)) => Some(String("number".into())),
        (UnaryOp::Typeof, String(_)) => Some(String("string".into())),
        (UnaryOp::Typeof, Boolean(_)) => Some(String("boolean".into())),
        (UnaryOp::Typeof, Undefined) => Some(String("undefined".into())),
        (UnaryOp::Typeof, Null) => Some(String("object".into())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eval_number_arithmetic() {
        assert_eq!(
            eval_binary(&Literal::Number(6.0), BinaryOp::Mul, &Literal::Number(7.0)),
            Some(Literal::Number(42.0))
        );
        assert_eq!(
            eval_binary(&Literal::Number(1.0), BinaryOp::Div, &Literal::Number(0.0)),
            Some(Literal::Number(f64::INFINITY))
        );
    }

    #[test]
    fn test_eval_string_concat() {
        assert_eq!(
            eval_binary(
                &Literal::String("a".into()),
                BinaryOp::Add,
                &Literal::String("b".into())
            ),
            Some(Literal::String("ab".into()))
        );
    }

    #[test]
    fn test_eval_bitwise_uses_int32() {
        assert_eq!(
            eval_binary(
                &Literal::Number(4_294_967_297.0),
                BinaryOp::BitOr,
                &Literal::Number(0.0)
            ),
            Some(Literal::Number(1.0))
        );
    }

    #[test]
    fn test_eval_refuses_mixed_types() {
        assert_eq!(
            eval_binary(
                &Literal::Number(1.0),
                BinaryOp::Add,
                &Literal::String("x".into())
            ),
            None
        );
    }

    #[test]
    fn test_to_int32_wraps() {
        assert_eq!(to_int32(2_147_483_648.0), -2_147_483_648);
        assert_eq!(to_int32(-1.0), -1);
        assert_eq!(to_int32(f64::NAN), 0);
    }

    #[test]
    fn test_unary_typeof() {
        assert_eq!(
            eval_unary(UnaryOp::Typeof, &Literal::Null),
            Some(Literal::String("object".into()))
        );
    }
}
