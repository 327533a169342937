//! Statement lowering
//!
//! Control flow becomes COND_JUMP/GOTO edges over explicit head and end
//! states. `break`/`continue`/`return` consult the compile-time control
//! stack: when a pending finally stands between the jump and its target,
//! the exit is rewritten into a disposition write plus a jump into the
//! finally block, and the EH stack is rebalanced with explicit pops.

use super::control::{disposition, ControlFrame};
use super::{IrGenerator, Segment};
use crate::error::{CompileError, CompileResult};
use crate::ir::{Literal, Op, StateId};
use crate::strings::GENERATOR_SENTINEL;
use vortex_ast::*;

impl IrGenerator<'_> {
    pub(crate) fn lower_statement(&mut self, stmt: &Statement) -> CompileResult<Segment> {
        self.lower_labeled(stmt, None)
    }

    fn lower_labeled(
        &mut self,
        stmt: &Statement,
        label: Option<String>,
    ) -> CompileResult<Segment> {
        match stmt {
            Statement::VariableDecl(decl) => self.lower_variable_decl(decl),
            Statement::FunctionDecl(_) => {
                // Hoisted by the enclosing scope pass; nothing at this site.
                let id = self.noop();
                Ok(Segment { start: id, end: id })
            }
            Statement::ClassDecl(decl) => self.lower_class(&decl.name, &decl.class),
            Statement::Expression(s) => {
                let out = self.lower_expr(&s.expression)?;
                Ok(out.seg)
            }
            Statement::If(s) => self.lower_if(s),
            Statement::Switch(s) => self.lower_switch(s, label),
            Statement::While(s) => self.lower_while(s, label),
            Statement::DoWhile(s) => self.lower_do_while(s, label),
            Statement::For(s) => self.lower_for(s, label),
            Statement::ForIn(_) | Statement::ForOf(_) => Err(CompileError::internal(
                "for-in/for-of survived desugaring",
            )),
            Statement::Break(s) => self.lower_break(s.label.as_deref()),
            Statement::Continue(s) => self.lower_continue(s.label.as_deref()),
            Statement::Return(s) => self.lower_return(s.argument.as_ref()),
            Statement::Throw(s) => {
                let value = self.lower_expr(&s.argument)?;
                let throw = self.seg1(Op::Throw {
                    value_var: value.var,
                });
                Ok(self.chain(value.seg, throw))
            }
            Statement::Try(s) => self.lower_try(s),
            Statement::Labeled(s) => {
                if matches!(
                    &*s.body,
                    Statement::While(_)
                        | Statement::DoWhile(_)
                        | Statement::For(_)
                        | Statement::Switch(_)
                ) {
                    self.lower_labeled(&s.body, Some(s.label.clone()))
                } else {
                    let end = self.noop();
                    self.control.push(ControlFrame::Labeled {
                        label: s.label.clone(),
                        break_target: end,
                    });
                    let body = self.lower_statement(&s.body)?;
                    self.control.pop();
                    self.ir.set_next(body.end, end);
                    Ok(Segment {
                        start: body.start,
                        end,
                    })
                }
            }
            Statement::Block(block) => {
                let is_global = self.ctx.top_level;
                self.lower_scope(&block.statements, is_global)
            }
            Statement::Import(_) | Statement::Export(_) => Err(CompileError::internal(
                "module declaration survived preprocessing",
            )),
            Statement::Empty => {
                let id = self.noop();
                Ok(Segment { start: id, end: id })
            }
        }
    }

    fn lower_variable_decl(&mut self, decl: &VariableDecl) -> CompileResult<Segment> {
        let is_global = self.ctx.top_level;
        let start = self.noop();
        let mut seg = Segment { start, end: start };
        for d in &decl.declarations {
            self.memory.allocate_pattern(&d.pattern, is_global);
            match &d.init {
                Some(init) => {
                    let value = self.lower_expr(init)?;
                    seg = self.chain(seg, value.seg);
                    let bound = self.destructure(&d.pattern, &value.var, Some(is_global))?;
                    seg = self.chain(seg, bound);
                }
                None => {
                    // `let x;` initializes to undefined; `var x` is inert.
                    if decl.kind != VariableKind::Var {
                        if let Pattern::Identifier(name) = &d.pattern {
                            let init = self.seg1(Op::AssignLiteral {
                                to: name.clone(),
                                value: Literal::Undefined,
                            });
                            seg = self.chain(seg, init);
                        }
                    }
                }
            }
        }
        Ok(seg)
    }

    fn lower_if(&mut self, s: &IfStatement) -> CompileResult<Segment> {
        let test = self.lower_expr(&s.test)?;
        let end = self.noop();
        let cons = self.lower_statement(&s.consequent)?;
        self.ir.set_next(cons.end, end);
        let false_state = match &s.alternate {
            Some(alt) => {
                let alt = self.lower_statement(alt)?;
                self.ir.set_next(alt.end, end);
                alt.start
            }
            None => end,
        };
        let jump = self.seg1(Op::CondJump {
            test_var: test.var.clone(),
            true_state: cons.start,
            false_state,
        });
        self.chain(test.seg, jump);
        Ok(Segment {
            start: test.seg.start,
            end,
        })
    }

    fn lower_while(&mut self, s: &WhileStatement, label: Option<String>) -> CompileResult<Segment> {
        let head = self.noop();
        let end = self.noop();
        let test = self.lower_expr(&s.test)?;
        self.ir.set_next(head, test.seg.start);

        self.control.push(ControlFrame::Loop {
            label,
            break_target: end,
            continue_target: head,
        });
        let body = self.lower_statement(&s.body)?;
        self.control.pop();

        let jump = self.seg1(Op::CondJump {
            test_var: test.var.clone(),
            true_state: body.start,
            false_state: end,
        });
        self.chain(test.seg, jump);
        self.ir.set_next(body.end, head);
        Ok(Segment { start: head, end })
    }

    fn lower_do_while(
        &mut self,
        s: &DoWhileStatement,
        label: Option<String>,
    ) -> CompileResult<Segment> {
        let end = self.noop();
        let test_head = self.noop();

        self.control.push(ControlFrame::Loop {
            label,
            break_target: end,
            continue_target: test_head,
        });
        let body = self.lower_statement(&s.body)?;
        self.control.pop();

        self.ir.set_next(body.end, test_head);
        let test = self.lower_expr(&s.test)?;
        self.ir.set_next(test_head, test.seg.start);
        let jump = self.seg1(Op::CondJump {
            test_var: test.var.clone(),
            true_state: body.start,
            false_state: end,
        });
        self.chain(test.seg, jump);
        Ok(Segment {
            start: body.start,
            end,
        })
    }

    fn lower_for(&mut self, s: &ForStatement, label: Option<String>) -> CompileResult<Segment> {
        let head = self.noop();
        let end = self.noop();
        let test_head = self.noop();
        let update_head = self.noop();

        let init_seg = match &s.init {
            Some(ForInit::VariableDecl(decl)) => Some(self.lower_variable_decl(decl)?),
            Some(ForInit::Expression(expr)) => Some(self.lower_expr(expr)?.seg),
            None => None,
        };
        match init_seg {
            Some(init) => {
                self.ir.set_next(head, init.start);
                self.ir.set_next(init.end, test_head);
            }
            None => self.ir.set_next(head, test_head),
        }

        self.control.push(ControlFrame::Loop {
            label,
            break_target: end,
            continue_target: update_head,
        });
        let body = self.lower_statement(&s.body)?;
        self.control.pop();

        match &s.test {
            Some(test) => {
                let test = self.lower_expr(test)?;
                self.ir.set_next(test_head, test.seg.start);
                let jump = self.seg1(Op::CondJump {
                    test_var: test.var.clone(),
                    true_state: body.start,
                    false_state: end,
                });
                self.chain(test.seg, jump);
            }
            None => self.ir.set_next(test_head, body.start),
        }

        self.ir.set_next(body.end, update_head);
        match &s.update {
            Some(update) => {
                let update = self.lower_expr(update)?;
                self.ir.set_next(update_head, update.seg.start);
                self.ir.set_next(update.seg.end, test_head);
            }
            None => self.ir.set_next(update_head, test_head),
        }
        Ok(Segment { start: head, end })
    }

    fn lower_switch(
        &mut self,
        s: &SwitchStatement,
        label: Option<String>,
    ) -> CompileResult<Segment> {
        let end = self.noop();
        let discriminant = self.lower_expr(&s.discriminant)?;

        self.control.push(ControlFrame::Switch {
            label,
            break_target: end,
        });

        // Case bodies first, linked for fallthrough.
        let is_global = self.ctx.top_level;
        let mut heads = Vec::with_capacity(s.cases.len());
        let mut prev_end: Option<StateId> = None;
        for case in &s.cases {
            let head = self.noop();
            heads.push(head);
            if let Some(prev) = prev_end {
                self.ir.set_next(prev, head);
            }
            let body = self.lower_scope(&case.body, is_global)?;
            self.ir.set_next(head, body.start);
            prev_end = Some(body.end);
        }
        if let Some(prev) = prev_end {
            self.ir.set_next(prev, end);
        }
        self.control.pop();

        // Comparison chain in source order; a failed run of tests lands on
        // the default body (wherever it sits) or past the switch.
        let default_head = s
            .cases
            .iter()
            .position(|c| c.test.is_none())
            .map(|i| heads[i]);
        let mut next_target = default_head.unwrap_or(end);
        for (i, case) in s.cases.iter().enumerate().rev() {
            let Some(test) = &case.test else { continue };
            let test_out = self.lower_expr(test)?;
            let cmp = self.temp();
            let compare = self.seg1(Op::Binary {
                to: cmp.clone(),
                op: BinaryOp::StrictEqual,
                left: discriminant.var.clone(),
                right: test_out.var.clone(),
            });
            let jump = self.seg1(Op::CondJump {
                test_var: cmp,
                true_state: heads[i],
                false_state: next_target,
            });
            let seg = self.chain(test_out.seg, compare);
            self.chain(seg, jump);
            next_target = test_out.seg.start;
        }
        self.ir.set_next(discriminant.seg.end, next_target);

        Ok(Segment {
            start: discriminant.seg.start,
            end,
        })
    }

    // ------------------------------------------------------------------
    // Exits
    // ------------------------------------------------------------------

    fn lower_break(&mut self, label: Option<&str>) -> CompileResult<Segment> {
        let idx = self
            .control
            .iter()
            .rposition(|f| f.matches_break(label))
            .ok_or_else(|| CompileError::IllegalJump {
                kind: "break".into(),
            })?;
        let target = self.control[idx]
            .break_target()
            .ok_or_else(|| CompileError::internal("break frame without target"))?;
        self.divert_exit(idx + 1, disposition::BREAK, ExitPayload::Target(target))
    }

    fn lower_continue(&mut self, label: Option<&str>) -> CompileResult<Segment> {
        let idx = self
            .control
            .iter()
            .rposition(|f| f.matches_continue(label))
            .ok_or_else(|| CompileError::IllegalJump {
                kind: "continue".into(),
            })?;
        let target = self.control[idx]
            .continue_target()
            .ok_or_else(|| CompileError::internal("continue frame without target"))?;
        self.divert_exit(idx + 1, disposition::CONTINUE, ExitPayload::Target(target))
    }

    fn lower_return(&mut self, argument: Option<&Expression>) -> CompileResult<Segment> {
        let value = match argument {
            Some(arg) => Some(self.lower_expr(arg)?),
            None => None,
        };
        let has_finally = self
            .control
            .iter()
            .any(|f| matches!(f, ControlFrame::Try { finally_start: Some(_), .. }));

        if !has_finally {
            let op = self.seg1(Op::Return {
                value_var: value.as_ref().map(|v| v.var.clone()),
            });
            return Ok(match value {
                Some(v) => self.chain(v.seg, op),
                None => op,
            });
        }

        let payload = match &value {
            Some(v) => ExitPayload::Value(v.var.clone()),
            None => ExitPayload::Undefined,
        };
        let divert = self.divert_exit(0, disposition::RETURN, payload)?;
        Ok(match value {
            Some(v) => self.chain(v.seg, divert),
            None => divert,
        })
    }

    /// Emit the exit path for a jump leaving every frame at `first_exited`
    /// and above: rebalance the EH stack, then either jump straight to the
    /// target or divert through the innermost pending finally with the
    /// disposition code.
    fn divert_exit(
        &mut self,
        first_exited: usize,
        code: f64,
        payload: ExitPayload,
    ) -> CompileResult<Segment> {
        let exited = &self.control[first_exited..];
        let finally = exited
            .iter()
            .rev()
            .find_map(|f| match f {
                ControlFrame::Try {
                    finally_start: Some(fs),
                    ..
                } => Some(*fs),
                _ => None,
            });
        let pops = exited
            .iter()
            .filter(|f| {
                matches!(
                    f,
                    ControlFrame::Try {
                        handler_active: true,
                        ..
                    }
                )
            })
            .count();

        let start = self.noop();
        let mut seg = Segment { start, end: start };
        for _ in 0..pops {
            let pop = self.seg1(Op::PopCatchHandler);
            seg = self.chain(seg, pop);
        }

        match finally {
            Some(finally_start) => {
                let write_payload = match &payload {
                    ExitPayload::Target(id) => self.seg1(Op::AssignLiteral {
                        to: "_FIN_V".into(),
                        value: Literal::StateRef(*id),
                    }),
                    ExitPayload::Value(var) => self.seg1(Op::Assign {
                        to: "_FIN_V".into(),
                        from: var.clone(),
                    }),
                    ExitPayload::Undefined => self.seg1(Op::AssignLiteral {
                        to: "_FIN_V".into(),
                        value: Literal::Undefined,
                    }),
                };
                seg = self.chain(seg, write_payload);
                let write_code = self.seg1(Op::AssignLiteral {
                    to: "_FIN".into(),
                    value: Literal::Number(code),
                });
                seg = self.chain(seg, write_code);
                self.ir.set_next(seg.end, finally_start);
            }
            None => match payload {
                ExitPayload::Target(target) => {
                    let jump = self.seg1(Op::Goto { target });
                    seg = self.chain(seg, jump);
                }
                ExitPayload::Value(var) => {
                    let ret = self.seg1(Op::Return {
                        value_var: Some(var),
                    });
                    seg = self.chain(seg, ret);
                }
                ExitPayload::Undefined => {
                    let ret = self.seg1(Op::Return { value_var: None });
                    seg = self.chain(seg, ret);
                }
            },
        }
        // The tail is terminal or linked into the finally; either way the
        // statement chain must not fall through past it.
        Ok(Segment {
            start: seg.start,
            end: seg.end,
        })
    }

    // ------------------------------------------------------------------
    // Try / catch / finally
    // ------------------------------------------------------------------

    fn lower_try(&mut self, t: &TryStatement) -> CompileResult<Segment> {
        if t.handler.is_none() && t.finalizer.is_none() {
            return Err(CompileError::unsupported("try without catch or finally"));
        }
        let is_global = self.ctx.top_level;
        let end = self.noop();
        let finally_head = t.finalizer.as_ref().map(|_| self.noop());
        let catch_head = t.handler.as_ref().map(|_| self.noop());

        // Uncaught-throw entry: a catch target, or glue that re-routes the
        // exception through the finally with disposition THROW.
        let handler_target = match (catch_head, finally_head) {
            (Some(ch), _) => ch,
            (None, Some(fh)) => self.finally_glue(fh),
            (None, None) => unreachable!(),
        };

        self.control.push(ControlFrame::Try {
            finally_start: finally_head,
            has_catch: t.handler.is_some(),
            handler_active: true,
        });
        let frame = self.control.len() - 1;

        let push = self.seg1(Op::PushCatchHandler {
            target: handler_target,
        });
        let body = self.lower_scope(&t.block.statements, is_global)?;
        let pop = self.seg1(Op::PopCatchHandler);
        let mut seg = self.chain(push, body);
        seg = self.chain(seg, pop);

        // Normal completion of the protected block.
        match finally_head {
            Some(fh) => {
                let reset = self.seg1(Op::AssignLiteral {
                    to: "_FIN".into(),
                    value: Literal::Number(disposition::NORMAL),
                });
                seg = self.chain(seg, reset);
                self.ir.set_next(seg.end, fh);
            }
            None => self.ir.set_next(seg.end, end),
        }

        // Catch clause: guard against the generator-termination sentinel,
        // bind, run, and re-enter the finally (or fall out).
        if let Some(handler) = &t.handler {
            self.set_handler_active(frame, false);

            let catch_start = catch_head.expect("catch head allocated");
            let sentinel = self.literal(Literal::String(GENERATOR_SENTINEL.into()));
            let is_sentinel = self.temp();
            let compare = self.seg1(Op::Binary {
                to: is_sentinel.clone(),
                op: BinaryOp::StrictEqual,
                left: "_EXV".into(),
                right: sentinel.var.clone(),
            });
            let rethrow = self.seg1(Op::Throw {
                value_var: "_EXV".into(),
            });
            let bind_head = self.noop();
            let guard_jump = self.seg1(Op::CondJump {
                test_var: is_sentinel,
                true_state: rethrow.start,
                false_state: bind_head,
            });
            self.ir.set_next(catch_start, sentinel.seg.start);
            let guard = self.chain(sentinel.seg, compare);
            self.chain(guard, guard_jump);

            let mut catch_seg = Segment {
                start: bind_head,
                end: bind_head,
            };
            if let Some(param) = &handler.param {
                self.memory.allocate_pattern(param, is_global);
                let bound = self.destructure(param, "_EXV", Some(is_global))?;
                catch_seg = self.chain(catch_seg, bound);
            }

            if let Some(fh) = finally_head {
                let glue = self.finally_glue(fh);
                let repush = self.seg1(Op::PushCatchHandler { target: glue });
                catch_seg = self.chain(catch_seg, repush);
                self.set_handler_active(frame, true);
            }

            let catch_body = self.lower_scope(&handler.body.statements, is_global)?;
            catch_seg = self.chain(catch_seg, catch_body);

            match finally_head {
                Some(fh) => {
                    let pop_glue = self.seg1(Op::PopCatchHandler);
                    catch_seg = self.chain(catch_seg, pop_glue);
                    let reset = self.seg1(Op::AssignLiteral {
                        to: "_FIN".into(),
                        value: Literal::Number(disposition::NORMAL),
                    });
                    catch_seg = self.chain(catch_seg, reset);
                    self.ir.set_next(catch_seg.end, fh);
                    self.set_handler_active(frame, false);
                }
                None => self.ir.set_next(catch_seg.end, end),
            }
        }

        // The finally body runs outside its own try context.
        let popped = self.control.pop();
        debug_assert!(matches!(popped, Some(ControlFrame::Try { .. })));
        if let (Some(fh), Some(finalizer)) = (finally_head, &t.finalizer) {
            let fin_body = self.lower_scope(&finalizer.statements, is_global)?;
            self.ir.set_next(fh, fin_body.start);
            let dispatch = self.ir.alloc(Op::FinallyDispatch { normal: end });
            self.ir.set_next(fin_body.end, dispatch);
        }

        Ok(Segment {
            start: push.start,
            end,
        })
    }

    /// Glue entered via the EH stack when no catch intercepts: carry the
    /// exception through the finally with disposition THROW.
    fn finally_glue(&mut self, finally_start: StateId) -> StateId {
        let set_code = self.ir.alloc(Op::AssignLiteral {
            to: "_FIN".into(),
            value: Literal::Number(disposition::THROW),
        });
        let carry = self.ir.alloc(Op::Assign {
            to: "_FIN_V".into(),
            from: "_EXV".into(),
        });
        self.ir.set_next(set_code, carry);
        self.ir.set_next(carry, finally_start);
        set_code
    }

    fn set_handler_active(&mut self, frame: usize, active: bool) {
        if let ControlFrame::Try { handler_active, .. } = &mut self.control[frame] {
            *handler_active = active;
        }
    }
}

enum ExitPayload {
    /// Jump target carried through `_FIN_V`
    Target(StateId),
    /// Return value slot
    Value(String),
    Undefined,
}
