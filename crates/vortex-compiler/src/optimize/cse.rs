//! Local common-subexpression elimination
//!
//! Scoped to a single SEQUENCE state: identical BINARY/UNARY ops keyed by
//! (operator, operands) are memoized into the first destination, and an
//! entry dies the moment any of its operands is reassigned. Nothing
//! crosses a state boundary.

use super::Optimizer;
use crate::ir::{Ir, Op};

pub(super) fn local_cse(_o: &mut Optimizer, ir: &mut Ir) -> usize {
    let mut changed = 0;
    for state in &mut ir.states {
        let Op::Sequence { ops } = &mut state.op else {
            continue;
        };
        changed += run_window(ops);
    }
    changed
}

fn run_window(ops: &mut [Op]) -> usize {
    // (key, operands, destination holding the value)
    let mut available: Vec<(String, Vec<String>, String)> = Vec::new();
    let mut changed = 0;

    for op in ops.iter_mut() {
        let candidate = match op {
            Op::Binary {
                to,
                op: bin,
                left,
                right,
            } => Some((
                format!("B:{}:{}:{}", bin.as_str(), left, right),
                vec![left.clone(), right.clone()],
                to.clone(),
            )),
            Op::Unary {
                to,
                op: un,
                operand,
            } => Some((
                format!("U:{}:{}", un.as_str(), operand),
                vec![operand.clone()],
                to.clone(),
            )),
            _ => None,
        };

        if let Some((key, operands, dest)) = candidate {
            if let Some((_, _, prior)) = available.iter().find(|(k, _, _)| *k == key) {
                let prior = prior.clone();
                // A self-referencing rewrite would read the op's own dest.
                if prior != dest {
                    *op = Op::Assign {
                        to: dest.clone(),
                        from: prior,
                    };
                    changed += 1;
                }
            } else {
                available.push((key, operands, dest.clone()));
            }
        }

        // Any write invalidates entries that read or produced that slot.
        if let Some(written) = op.dest().map(str::to_string) {
            available.retain(|(_, operands, dest)| {
                *dest != written && !operands.contains(&written)
            });
            // Keep the entry for the op that just produced the value.
            if let Op::Binary {
                to,
                op: bin,
                left,
                right,
            } = op
            {
                let key = format!("B:{}:{}:{}", bin.as_str(), left, right);
                if !available.iter().any(|(k, _, _)| *k == key) {
                    available.push((key, vec![left.clone(), right.clone()], to.clone()));
                }
            }
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use vortex_ast::BinaryOp;

    fn binary(to: &str, left: &str, right: &str) -> Op {
        Op::Binary {
            to: to.into(),
            op: BinaryOp::Add,
            left: left.into(),
            right: right.into(),
        }
    }

    #[test]
    fn test_duplicate_binary_becomes_copy() {
        let mut ops = vec![binary("_temp$0", "a", "b"), binary("_temp$1", "a", "b")];
        assert_eq!(run_window(&mut ops), 1);
        assert_eq!(
            ops[1],
            Op::Assign {
                to: "_temp$1".into(),
                from: "_temp$0".into()
            }
        );
    }

    #[test]
    fn test_reassignment_invalidates() {
        let mut ops = vec![
            binary("_temp$0", "a", "b"),
            Op::Assign {
                to: "a".into(),
                from: "c".into(),
            },
            binary("_temp$1", "a", "b"),
        ];
        assert_eq!(run_window(&mut ops), 0);
        assert!(matches!(ops[2], Op::Binary { .. }));
    }

    #[test]
    fn test_different_operands_not_shared() {
        let mut ops = vec![binary("_temp$0", "a", "b"), binary("_temp$1", "a", "c")];
        assert_eq!(run_window(&mut ops), 0);
    }
}
