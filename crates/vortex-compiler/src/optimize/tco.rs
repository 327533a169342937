//! Tail-call optimization
//!
//! A self-recursive CALL whose result is immediately returned becomes a
//! parameter-assignment dance plus a jump back to the entry's successor,
//! turning the recursion into iteration inside one frame. Arguments are
//! buffered through fresh temporaries first so assignments into the
//! parameter slots cannot clobber values still being read.

use super::{resolve_target, Optimizer};
use crate::ir::{CallArg, Ir, Literal, Op, StateId};

pub(super) fn tail_calls(o: &mut Optimizer, ir: &mut Ir) -> usize {
    let mut changed = 0;
    for i in 0..ir.states.len() {
        let id = i as StateId;
        if !ir.is_live(id) {
            continue;
        }
        let Op::Call {
            callee,
            entry,
            args,
            caller_func_name: Some(caller),
        } = ir.state(id).op.clone()
        else {
            continue;
        };
        if callee != caller {
            continue;
        }
        // Spreads make positional rebinding impossible.
        if args.iter().any(|a| matches!(a, CallArg::Spread(_))) {
            continue;
        }
        // The call must feed straight into RETURN of the retrieved value.
        let Some(ret_to) = tail_shape(ir, id) else {
            continue;
        };

        let Op::FuncEntry { params, rest, .. } = ir.state(entry).op.clone() else {
            continue;
        };
        if rest.is_some() || params.len() < args.len() {
            continue;
        }
        let Some(body_start) = ir.state(entry).next else {
            continue;
        };
        let _ = ret_to;

        // Buffer arguments, then rebind parameters, then jump.
        let mut prev: Option<StateId> = None;
        let mut first: Option<StateId> = None;
        let mut push = |ir: &mut Ir, op: Op| {
            let s = ir.alloc(op);
            if let Some(p) = prev {
                ir.set_next(p, s);
            }
            first.get_or_insert(s);
            prev = Some(s);
        };

        let mut buffers = Vec::with_capacity(args.len());
        for arg in &args {
            let buf = o.fresh_tco_temp();
            push(
                ir,
                Op::Assign {
                    to: buf.clone(),
                    from: arg.var().to_string(),
                },
            );
            buffers.push(buf);
        }
        for (i, param) in params.iter().enumerate() {
            match buffers.get(i) {
                Some(buf) => push(
                    ir,
                    Op::Assign {
                        to: param.clone(),
                        from: buf.clone(),
                    },
                ),
                None => push(
                    ir,
                    Op::AssignLiteral {
                        to: param.clone(),
                        value: Literal::Undefined,
                    },
                ),
            }
        }
        push(ir, Op::Goto { target: body_start });

        let first = first.expect("at least the goto was emitted");
        let call_state = ir.state_mut(id);
        call_state.op = Op::Goto { target: first };
        call_state.next = None;
        changed += 1;
    }
    changed
}

/// Check CALL -> POST_CALL -> RETRIEVE_RESULT t -> RETURN t (threading
/// through trampolines); yields the returned temp.
fn tail_shape(ir: &Ir, call: StateId) -> Option<String> {
    let post = resolve_target(ir, ir.state(call).next?);
    let Op::PostCall = ir.get(post)?.op else {
        return None;
    };
    let retrieve = resolve_target(ir, ir.get(post)?.next?);
    let Op::RetrieveResult { to } = &ir.get(retrieve)?.op else {
        return None;
    };
    let ret = resolve_target(ir, ir.get(retrieve)?.next?);
    let Op::Return {
        value_var: Some(returned),
    } = &ir.get(ret)?.op
    else {
        return None;
    };
    (returned == to).then(|| to.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::FunctionEntry;
    use crate::memory::MemoryMap;

    /// Build `function f(n) { return f(n); }` shaped IR by hand
    fn recursive_ir() -> (Ir, StateId) {
        let mut ir = Ir::new();
        let halt = ir.alloc(Op::Halt); // state 0
        let entry = ir.alloc(Op::FuncEntry {
            name: "f".into(),
            params: vec!["n".into()],
            rest: None,
            is_generator: false,
            is_async: false,
        });
        let arg = ir.alloc(Op::Assign {
            to: "_temp$0".into(),
            from: "n".into(),
        });
        let call = ir.alloc(Op::Call {
            callee: "f".into(),
            entry,
            args: vec![CallArg::Var("_temp$0".into())],
            caller_func_name: Some("f".into()),
        });
        let post = ir.alloc(Op::PostCall);
        let retrieve = ir.alloc(Op::RetrieveResult {
            to: "_temp$1".into(),
        });
        let ret = ir.alloc(Op::Return {
            value_var: Some("_temp$1".into()),
        });
        let _ = halt;
        ir.set_next(entry, arg);
        ir.set_next(arg, call);
        ir.set_next(call, post);
        ir.set_next(post, retrieve);
        ir.set_next(retrieve, ret);
        ir.function_table.push(FunctionEntry {
            name: "f".into(),
            entry,
        });
        (ir, call)
    }

    #[test]
    fn test_rewrites_self_tail_call() {
        let (mut ir, call) = recursive_ir();
        let mut memory = MemoryMap::new();
        let mut opt = Optimizer::new(&mut memory, 8);
        assert_eq!(tail_calls(&mut opt, &mut ir), 1);
        assert!(matches!(ir.state(call).op, Op::Goto { .. }));
        // No live CALL remains.
        let has_call = ir
            .states
            .iter()
            .any(|s| matches!(s.op, Op::Call { .. }) && ir.is_live(s.id));
        assert!(!has_call);
    }

    #[test]
    fn test_ignores_non_tail_call() {
        let (mut ir, call) = recursive_ir();
        // Break the tail shape: return a different temp.
        for state in &mut ir.states {
            if let Op::Return { value_var } = &mut state.op {
                *value_var = Some("other".into());
            }
        }
        let mut memory = MemoryMap::new();
        let mut opt = Optimizer::new(&mut memory, 8);
        assert_eq!(tail_calls(&mut opt, &mut ir), 0);
        assert!(matches!(ir.state(call).op, Op::Call { .. }));
    }
}
