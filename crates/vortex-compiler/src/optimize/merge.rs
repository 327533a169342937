//! Superblock merging and copy propagation
//!
//! Merging coalesces straight-line pairs into SEQUENCE states bounded by
//! the configured size; copy propagation forwards single-use temporaries
//! into their only reader.

use super::{is_temp, predecessor_counts, read_counts, write_counts, Optimizer};
use crate::ir::{Ir, Op};

/// Coalesce A -> B when B is A's only successor, B's only predecessor is
/// A, and neither side is control-sensitive.
pub(super) fn merge_blocks(o: &mut Optimizer, ir: &mut Ir) -> usize {
    let max = o.max_superblock();
    let preds = predecessor_counts(ir);
    let mut changed = 0;

    for a in 0..ir.states.len() {
        let a = a as u32;
        if !ir.is_live(a) {
            continue;
        }
        let Some(b) = ir.state(a).next else { continue };
        if a == b || !ir.is_live(b) {
            continue;
        }
        if preds.get(&b).copied().unwrap_or(0) != 1 {
            continue;
        }
        let a_state = ir.state(a);
        let b_state = ir.state(b);
        if a_state.op.is_barrier() || b_state.op.is_barrier() {
            continue;
        }
        if matches!(a_state.op, Op::Noop) && a == 0 {
            continue; // keep the entry intact
        }
        let a_len = seq_len(&a_state.op);
        let b_len = seq_len(&b_state.op);
        if a_len + b_len > max {
            continue;
        }

        let mut ops = into_ops(ir.state(a).op.clone());
        ops.extend(into_ops(ir.state(b).op.clone()));
        let b_next = ir.state(b).next;
        {
            let a_state = ir.state_mut(a);
            a_state.op = Op::Sequence { ops };
            a_state.next = b_next;
        }
        ir.tombstone(b);
        changed += 1;
    }
    changed
}

fn seq_len(op: &Op) -> usize {
    match op {
        Op::Sequence { ops } => ops.len(),
        _ => 1,
    }
}

fn into_ops(op: Op) -> Vec<Op> {
    match op {
        Op::Sequence { ops } => ops,
        Op::Noop => Vec::new(),
        other => vec![other],
    }
}

/// Forward `t = src; use(t)` into `use(src)` when `t` is a temp written
/// once and read exactly once, in the defining state's only successor.
pub(super) fn propagate_copies(_o: &mut Optimizer, ir: &mut Ir) -> usize {
    let reads = read_counts(ir);
    let writes = write_counts(ir);
    let mut changed = 0;

    for i in 0..ir.states.len() {
        let id = i as u32;
        if !ir.is_live(id) {
            continue;
        }
        let Some(next) = ir.state(id).next else {
            continue;
        };
        if !ir.is_live(next) || next == id {
            continue;
        }

        enum Source {
            Var(String),
            Lit(crate::ir::Literal),
        }
        let (temp, source) = match &ir.state(id).op {
            Op::Assign { to, from } if is_temp(to) => (to.clone(), Source::Var(from.clone())),
            Op::AssignLiteral { to, value }
                if is_temp(to) && !matches!(value, crate::ir::Literal::StateRef(_)) =>
            {
                (to.clone(), Source::Lit(value.clone()))
            }
            _ => continue,
        };
        if reads.get(&temp).copied().unwrap_or(0) != 1 || writes.get(&temp).copied() != Some(1) {
            continue;
        }
        // The single read must sit in the immediate successor.
        let mut reads_here = 0;
        ir.state(next).op.for_each_read(&mut |name| {
            if name == temp {
                reads_here += 1;
            }
        });
        if reads_here != 1 {
            continue;
        }

        match source {
            Source::Var(src) => {
                // Unsafe if the successor also rewrites the source first;
                // successors here are single ops or sequences that only
                // read before writing their own dest, so a same-name dest
                // is the only hazard.
                if ir.state(next).op.dest() == Some(src.as_str()) {
                    continue;
                }
                ir.state_mut(next).op.rename_reads(&temp, &src);
                ir.state_mut(id).op = Op::Noop;
                changed += 1;
            }
            Source::Lit(value) => {
                // Only a plain copy out of the temp can take a literal.
                let replace = matches!(
                    &ir.state(next).op,
                    Op::Assign { from, .. } if *from == temp
                );
                if replace {
                    let Op::Assign { to, .. } = ir.state(next).op.clone() else {
                        unreachable!()
                    };
                    ir.state_mut(next).op = Op::AssignLiteral { to, value };
                    ir.state_mut(id).op = Op::Noop;
                    changed += 1;
                }
            }
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Literal;
    use crate::memory::MemoryMap;

    fn run(ir: &mut Ir, pass: fn(&mut Optimizer, &mut Ir) -> usize) -> usize {
        let mut memory = MemoryMap::new();
        let mut opt = Optimizer::new(&mut memory, 8);
        pass(&mut opt, ir)
    }

    #[test]
    fn test_merges_straight_line() {
        let mut ir = Ir::new();
        let entry = ir.alloc(Op::Noop); // id 0 stays
        let a = ir.alloc(Op::AssignLiteral {
            to: "x".into(),
            value: Literal::Number(1.0),
        });
        let b = ir.alloc(Op::AssignLiteral {
            to: "y".into(),
            value: Literal::Number(2.0),
        });
        let halt = ir.alloc(Op::Halt);
        ir.set_next(entry, a);
        ir.set_next(a, b);
        ir.set_next(b, halt);
        assert_eq!(run(&mut ir, merge_blocks), 1);
        assert!(matches!(ir.state(a).op, Op::Sequence { .. }));
        assert!(!ir.is_live(b));
        assert_eq!(ir.state(a).next, Some(halt));
    }

    #[test]
    fn test_respects_superblock_cap() {
        let mut ir = Ir::new();
        let _entry = ir.alloc(Op::Noop);
        let ops: Vec<Op> = (0..8)
            .map(|i| Op::AssignLiteral {
                to: format!("v{i}"),
                value: Literal::Number(i as f64),
            })
            .collect();
        let a = ir.alloc(Op::Sequence { ops });
        let b = ir.alloc(Op::AssignLiteral {
            to: "y".into(),
            value: Literal::Number(2.0),
        });
        ir.set_next(0, a);
        ir.set_next(a, b);
        assert_eq!(run(&mut ir, merge_blocks), 0);
    }

    #[test]
    fn test_no_merge_with_two_predecessors() {
        let mut ir = Ir::new();
        let entry = ir.alloc(Op::Noop);
        let a = ir.alloc(Op::AssignLiteral {
            to: "x".into(),
            value: Literal::Number(1.0),
        });
        let b = ir.alloc(Op::AssignLiteral {
            to: "y".into(),
            value: Literal::Number(2.0),
        });
        let j = ir.alloc(Op::Goto { target: b });
        ir.set_next(entry, a);
        ir.set_next(a, b);
        let _ = j;
        assert_eq!(run(&mut ir, merge_blocks), 0);
    }

    #[test]
    fn test_copy_propagation_renames_read() {
        let mut ir = Ir::new();
        let _entry = ir.alloc(Op::Noop);
        let def = ir.alloc(Op::Assign {
            to: "_temp$0".into(),
            from: "x".into(),
        });
        let use_ = ir.alloc(Op::Return {
            value_var: Some("_temp$0".into()),
        });
        ir.set_next(0, def);
        ir.set_next(def, use_);
        assert_eq!(run(&mut ir, propagate_copies), 1);
        assert!(matches!(ir.state(def).op, Op::Noop));
        assert_eq!(
            ir.state(use_).op,
            Op::Return {
                value_var: Some("x".into())
            }
        );
    }

    #[test]
    fn test_literal_forwarding() {
        let mut ir = Ir::new();
        let _entry = ir.alloc(Op::Noop);
        let def = ir.alloc(Op::AssignLiteral {
            to: "_temp$0".into(),
            value: Literal::Number(5.0),
        });
        let copy = ir.alloc(Op::Assign {
            to: "x".into(),
            from: "_temp$0".into(),
        });
        ir.set_next(0, def);
        ir.set_next(def, copy);
        assert_eq!(run(&mut ir, propagate_copies), 1);
        assert_eq!(
            ir.state(copy).op,
            Op::AssignLiteral {
                to: "x".into(),
                value: Literal::Number(5.0)
            }
        );
    }
}
