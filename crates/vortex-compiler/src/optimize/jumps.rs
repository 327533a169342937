//! Control-flow cleanup passes
//!
//! Branch pruning, trampoline threading, trivial GOTO/NOOP elision and
//! identity-copy removal. Elision redirects every reference (fallthrough,
//! branch targets, catch targets, state-ref literals) before tombstoning.

use super::{resolve_target, Optimizer};
use crate::ir::{Ir, Op, StateId};
use rustc_hash::FxHashMap;

/// COND_JUMP with both arms on the same target is a GOTO
pub(super) fn prune_branches(_o: &mut Optimizer, ir: &mut Ir) -> usize {
    let mut changed = 0;
    for state in &mut ir.states {
        if let Op::CondJump {
            true_state,
            false_state,
            ..
        } = state.op
        {
            if true_state == false_state {
                state.op = Op::Goto { target: true_state };
                changed += 1;
            }
        }
    }
    changed
}

/// Rewrite every reference through chains of NOOP/GOTO to the ultimate
/// target, skipping the trampolines entirely.
pub(super) fn thread_jumps(_o: &mut Optimizer, ir: &mut Ir) -> usize {
    let mut resolved: FxHashMap<StateId, StateId> = FxHashMap::default();
    for state in &ir.states {
        if matches!(state.op, Op::Dead) {
            continue;
        }
        Ir::for_each_ref(state, &mut |id| {
            resolved.entry(id).or_insert_with(|| resolve_target(ir, id));
        });
    }
    let mut changed = 0;
    for state in &mut ir.states {
        if matches!(state.op, Op::Dead) {
            continue;
        }
        state.op.remap_state_refs(&mut |id| {
            let target = resolved.get(&id).copied().unwrap_or(id);
            if target != id {
                changed += 1;
            }
            target
        });
        if let Some(next) = state.next {
            let target = resolved.get(&next).copied().unwrap_or(next);
            if target != next {
                state.next = Some(target);
                changed += 1;
            }
        }
    }
    changed
}

/// Tombstone trivial GOTO/NOOP states after redirecting their references
pub(super) fn elide_trivial(_o: &mut Optimizer, ir: &mut Ir) -> usize {
    let mut redirects: FxHashMap<StateId, StateId> = FxHashMap::default();
    for state in &ir.states {
        if state.id == 0 {
            continue; // the program entry stays
        }
        let is_trivial = match &state.op {
            Op::Noop => state.next.is_some(),
            Op::Goto { .. } => true,
            _ => false,
        };
        if !is_trivial {
            continue;
        }
        // Collapse chains in one go; a cycle resolves to itself.
        let ultimate = resolve_target(ir, state.id);
        if ultimate != state.id {
            redirects.insert(state.id, ultimate);
        }
    }
    if redirects.is_empty() {
        return 0;
    }

    ir.remap_refs(&mut |id| redirects.get(&id).copied().unwrap_or(id));
    let mut changed = 0;
    for (&id, _) in &redirects {
        ir.tombstone(id);
        changed += 1;
    }
    changed
}

/// `x = x` with a fallthrough is a GOTO to it
pub(super) fn remove_identities(_o: &mut Optimizer, ir: &mut Ir) -> usize {
    let mut changed = 0;
    for state in &mut ir.states {
        let Op::Assign { to, from } = &state.op else {
            continue;
        };
        if to == from {
            if let Some(next) = state.next {
                state.op = Op::Goto { target: next };
                state.next = None;
                changed += 1;
            }
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryMap;
    use crate::optimize::Optimizer as Opt;

    fn with_opt<R>(f: impl FnOnce(&mut Opt, &mut Ir) -> R, ir: &mut Ir) -> R {
        let mut memory = MemoryMap::new();
        let mut opt = Opt::new(&mut memory, 8);
        f(&mut opt, ir)
    }

    #[test]
    fn test_prune_same_target_branch() {
        let mut ir = Ir::new();
        let t = ir.alloc(Op::Halt);
        let c = ir.alloc(Op::CondJump {
            test_var: "_temp$0".into(),
            true_state: t,
            false_state: t,
        });
        let n = with_opt(|o, ir| prune_branches(o, ir), &mut ir);
        assert_eq!(n, 1);
        assert!(matches!(ir.state(c).op, Op::Goto { .. }));
    }

    #[test]
    fn test_thread_through_noops() {
        let mut ir = Ir::new();
        let entry = ir.alloc(Op::Noop); // 0
        let hop = ir.alloc(Op::Noop);
        let halt = ir.alloc(Op::Halt);
        ir.set_next(entry, hop);
        ir.set_next(hop, halt);
        with_opt(|o, ir| thread_jumps(o, ir), &mut ir);
        assert_eq!(ir.state(entry).next, Some(halt));
    }

    #[test]
    fn test_elide_redirects_and_tombstones() {
        let mut ir = Ir::new();
        let entry = ir.alloc(Op::Noop); // id 0, kept
        let hop = ir.alloc(Op::Goto { target: 2 });
        let halt = ir.alloc(Op::Halt);
        ir.set_next(entry, hop);
        let n = with_opt(|o, ir| elide_trivial(o, ir), &mut ir);
        assert_eq!(n, 1);
        assert!(!ir.is_live(hop));
        assert_eq!(ir.state(entry).next, Some(halt));
    }

    #[test]
    fn test_identity_becomes_goto() {
        let mut ir = Ir::new();
        let a = ir.alloc(Op::Assign {
            to: "x".into(),
            from: "x".into(),
        });
        let b = ir.alloc(Op::Halt);
        ir.set_next(a, b);
        let n = with_opt(|o, ir| remove_identities(o, ir), &mut ir);
        assert_eq!(n, 1);
        assert!(matches!(ir.state(a).op, Op::Goto { target } if target == b));
    }
}
