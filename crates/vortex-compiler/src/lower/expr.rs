//! Expression lowering
//!
//! Every expression reduces to a segment of states leaving its value in a
//! fresh `_temp$N` slot. Short-circuit operators become COND_JUMP diamonds,
//! calls pick the internal/external/method path, and function-shaped
//! expressions are virtualized on the spot.

use super::{IrGenerator, Segment};
use crate::error::{CompileError, CompileResult};
use crate::ir::{ArrayItem, CallArg, Literal, ObjectItem, Op};
use vortex_ast::*;

/// A lowered expression: its states and the slot holding its value
#[derive(Debug, Clone)]
pub(crate) struct ExprOut {
    pub seg: Segment,
    pub var: String,
}

/// Methods auto-awaited inside async generators (iterator delegation)
const AUTO_AWAIT_METHODS: &[&str] = &["next", "throw", "return"];

impl IrGenerator<'_> {
    pub(crate) fn lower_expr(&mut self, expr: &Expression) -> CompileResult<ExprOut> {
        match expr {
            Expression::Number(n) => Ok(self.literal(Literal::Number(*n))),
            Expression::String(s) => Ok(self.literal(Literal::String(s.clone()))),
            Expression::Boolean(b) => Ok(self.literal(Literal::Boolean(*b))),
            Expression::Null => Ok(self.literal(Literal::Null)),
            Expression::Identifier(name) => Ok(self.identifier_read(name)),
            Expression::This => Ok(self.slot_read("_THIS")),
            Expression::NewTarget => Ok(self.slot_read("_NEW_TARGET")),
            Expression::Super => Err(CompileError::unsupported("super outside a class body")),
            Expression::Template(tpl) => self.lower_template(tpl),
            Expression::Array(arr) => self.lower_array(arr),
            Expression::Object(obj) => self.lower_object(obj),
            Expression::Unary(e) => self.lower_unary(e),
            Expression::Update(e) => self.lower_update(e),
            Expression::Binary(e) => self.lower_binary(e),
            Expression::Logical(e) => self.lower_logical(e.op, &e.left, &e.right),
            Expression::Assignment(e) => self.lower_assignment(e),
            Expression::Conditional(e) => self.lower_conditional(e),
            Expression::Call(e) => self.lower_call(e),
            Expression::New(e) => self.lower_new(e),
            Expression::Member(member) => self.lower_member_read(member),
            Expression::Arrow(arrow) => self.lower_arrow(arrow),
            Expression::Function(e) => {
                self.lower_function_value(e.name.clone(), e.function.clone(), false)
            }
            Expression::Class(e) => self.lower_class_expression(e),
            Expression::Await(inner) => {
                let value = self.lower_expr(inner)?;
                let to = self.temp();
                let op = self.seg1(Op::Await {
                    to: to.clone(),
                    value_var: value.var,
                });
                let seg = self.chain(value.seg, op);
                Ok(ExprOut { seg, var: to })
            }
            Expression::Yield(e) => {
                let to = self.temp();
                let (seg, value_var) = match &e.argument {
                    Some(arg) => {
                        let value = self.lower_expr(arg)?;
                        (Some(value.seg), Some(value.var))
                    }
                    None => (None, None),
                };
                let op = self.seg1(Op::Yield {
                    to: to.clone(),
                    value_var,
                    delegate: e.delegate,
                });
                let seg = match seg {
                    Some(prefix) => self.chain(prefix, op),
                    None => op,
                };
                Ok(ExprOut { seg, var: to })
            }
            Expression::Sequence(exprs) => {
                let mut seg: Option<Segment> = None;
                let mut var = None;
                for e in exprs {
                    let out = self.lower_expr(e)?;
                    seg = Some(match seg {
                        Some(prev) => self.chain(prev, out.seg),
                        None => out.seg,
                    });
                    var = Some(out.var);
                }
                match (seg, var) {
                    (Some(seg), Some(var)) => Ok(ExprOut { seg, var }),
                    _ => Ok(self.literal(Literal::Undefined)),
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Primitive reads and writes
    // ------------------------------------------------------------------

    pub(crate) fn literal(&mut self, value: Literal) -> ExprOut {
        let to = self.temp();
        let seg = self.seg1(Op::AssignLiteral {
            to: to.clone(),
            value,
        });
        ExprOut { seg, var: to }
    }

    fn slot_read(&mut self, slot: &str) -> ExprOut {
        let to = self.temp();
        let seg = self.seg1(Op::Assign {
            to: to.clone(),
            from: slot.to_string(),
        });
        ExprOut { seg, var: to }
    }

    pub(crate) fn identifier_read(&mut self, name: &str) -> ExprOut {
        if name == "undefined" {
            return self.literal(Literal::Undefined);
        }
        let to = self.temp();
        let seg = if self.is_allocated(name) {
            self.seg1(Op::Assign {
                to: to.clone(),
                from: name.to_string(),
            })
        } else {
            self.use_global(name);
            self.seg1(Op::AssignGlobal {
                to: to.clone(),
                global_name: name.to_string(),
            })
        };
        ExprOut { seg, var: to }
    }

    /// Write a value into a named binding; undeclared names become
    /// implicit globals.
    pub(crate) fn identifier_write(&mut self, name: &str, from: &str) -> Segment {
        if !self.is_allocated(name) {
            self.memory.allocate(name, true);
        }
        self.seg1(Op::Assign {
            to: name.to_string(),
            from: from.to_string(),
        })
    }

    // ------------------------------------------------------------------
    // Operators
    // ------------------------------------------------------------------

    fn lower_binary(&mut self, e: &BinaryExpression) -> CompileResult<ExprOut> {
        let left = self.lower_expr(&e.left)?;
        let right = self.lower_expr(&e.right)?;
        let to = self.temp();
        let op = self.seg1(Op::Binary {
            to: to.clone(),
            op: e.op,
            left: left.var,
            right: right.var,
        });
        let seg = self.chain(left.seg, right.seg);
        let seg = self.chain(seg, op);
        Ok(ExprOut { seg, var: to })
    }

    fn lower_unary(&mut self, e: &UnaryExpression) -> CompileResult<ExprOut> {
        match e.op {
            UnaryOp::Delete => self.lower_delete(&e.argument),
            _ => {
                let operand = self.lower_expr(&e.argument)?;
                let to = self.temp();
                let op = self.seg1(Op::Unary {
                    to: to.clone(),
                    op: e.op,
                    operand: operand.var,
                });
                let seg = self.chain(operand.seg, op);
                Ok(ExprOut { seg, var: to })
            }
        }
    }

    fn lower_delete(&mut self, argument: &Expression) -> CompileResult<ExprOut> {
        match argument {
            Expression::Member(member) => {
                let object = self.lower_expr(&member.object)?;
                let key = self.member_key(&member.property)?;
                let reflect = self.temp();
                let reflect_seg = self.seg1(Op::AssignGlobal {
                    to: reflect.clone(),
                    global_name: "Reflect".into(),
                });
                self.use_global("Reflect");
                let to = self.temp();
                let call = self.seg1(Op::MethodCall {
                    to: to.clone(),
                    object: reflect,
                    method: "deleteProperty".into(),
                    key_var: None,
                    args: vec![CallArg::Var(object.var), CallArg::Var(key.var.clone())],
                });
                let seg = self.chain(object.seg, key.seg);
                let seg = self.chain(seg, reflect_seg);
                let seg = self.chain(seg, call);
                Ok(ExprOut { seg, var: to })
            }
            other => {
                // `delete nonMember` evaluates the operand and yields true.
                let side = self.lower_expr(other)?;
                let result = self.literal(Literal::Boolean(true));
                let seg = self.chain(side.seg, result.seg);
                Ok(ExprOut {
                    seg,
                    var: result.var,
                })
            }
        }
    }

    fn lower_update(&mut self, e: &UpdateExpression) -> CompileResult<ExprOut> {
        let bin_op = e.op.binary_op();
        match &*e.argument {
            Expression::Identifier(name) => {
                let raw = self.identifier_read(name);
                let old = self.temp();
                let coerce = self.seg1(Op::Unary {
                    to: old.clone(),
                    op: UnaryOp::Plus,
                    operand: raw.var,
                });
                let one = self.literal(Literal::Number(1.0));
                let new = self.temp();
                let compute = self.seg1(Op::Binary {
                    to: new.clone(),
                    op: bin_op,
                    left: old.clone(),
                    right: one.var.clone(),
                });
                let write = self.identifier_write(name, &new);
                let seg = self.chain(raw.seg, coerce);
                let seg = self.chain(seg, one.seg);
                let seg = self.chain(seg, compute);
                let seg = self.chain(seg, write);
                Ok(ExprOut {
                    seg,
                    var: if e.prefix { new } else { old },
                })
            }
            Expression::Member(member) => {
                let object = self.lower_expr(&member.object)?;
                let key = self.member_key(&member.property)?;
                let raw = self.temp();
                let read = self.seg1(Op::MemberAccessComputed {
                    to: raw.clone(),
                    object: object.var.clone(),
                    key_var: key.var.clone(),
                });
                let old = self.temp();
                let coerce = self.seg1(Op::Unary {
                    to: old.clone(),
                    op: UnaryOp::Plus,
                    operand: raw,
                });
                let one = self.literal(Literal::Number(1.0));
                let new = self.temp();
                let compute = self.seg1(Op::Binary {
                    to: new.clone(),
                    op: bin_op,
                    left: old.clone(),
                    right: one.var.clone(),
                });
                let write = self.seg1(Op::MemberAssignComputed {
                    object: object.var.clone(),
                    key_var: key.var.clone(),
                    value_var: new.clone(),
                });
                let seg = self.chain(object.seg, key.seg);
                let seg = self.chain(seg, read);
                let seg = self.chain(seg, coerce);
                let seg = self.chain(seg, one.seg);
                let seg = self.chain(seg, compute);
                let seg = self.chain(seg, write);
                Ok(ExprOut {
                    seg,
                    var: if e.prefix { new } else { old },
                })
            }
            _ => Err(CompileError::unsupported("update of a non-reference")),
        }
    }

    /// Short-circuit diamond shared by `&&`, `||` and `??`
    pub(crate) fn lower_logical(
        &mut self,
        op: LogicalOp,
        left: &Expression,
        right: &Expression,
    ) -> CompileResult<ExprOut> {
        let result = self.temp();
        let left_out = self.lower_expr(left)?;

        // Which branch evaluates the right side.
        let (test_var, test_seg, rhs_on_true) = match op {
            LogicalOp::And => (left_out.var.clone(), None, true),
            LogicalOp::Or => (left_out.var.clone(), None, false),
            LogicalOp::Nullish => {
                let undef = self.literal(Literal::Undefined);
                let test = self.temp();
                let cmp = self.seg1(Op::Binary {
                    to: test.clone(),
                    op: BinaryOp::Equal,
                    left: left_out.var.clone(),
                    right: undef.var.clone(),
                });
                let seg = self.chain(undef.seg, cmp);
                (test, Some(seg), true)
            }
        };

        let right_out = self.lower_expr(right)?;
        let take_right = self.seg1(Op::Assign {
            to: result.clone(),
            from: right_out.var.clone(),
        });
        let rhs = self.chain(right_out.seg, take_right);
        let take_left = self.seg1(Op::Assign {
            to: result.clone(),
            from: left_out.var.clone(),
        });

        let end = self.noop();
        let (true_state, false_state) = if rhs_on_true {
            (rhs.start, take_left.start)
        } else {
            (take_left.start, rhs.start)
        };
        let jump = self.seg1(Op::CondJump {
            test_var,
            true_state,
            false_state,
        });

        let mut seg = left_out.seg;
        if let Some(test) = test_seg {
            seg = self.chain(seg, test);
        }
        self.chain(seg, jump);
        self.ir.set_next(rhs.end, end);
        self.ir.set_next(take_left.end, end);

        Ok(ExprOut {
            seg: Segment {
                start: left_out.seg.start,
                end,
            },
            var: result,
        })
    }

    fn lower_conditional(&mut self, e: &ConditionalExpression) -> CompileResult<ExprOut> {
        let result = self.temp();
        let test = self.lower_expr(&e.test)?;

        let cons = self.lower_expr(&e.consequent)?;
        let take_cons = self.seg1(Op::Assign {
            to: result.clone(),
            from: cons.var.clone(),
        });
        let cons = self.chain(cons.seg, take_cons);

        let alt = self.lower_expr(&e.alternate)?;
        let take_alt = self.seg1(Op::Assign {
            to: result.clone(),
            from: alt.var.clone(),
        });
        let alt = self.chain(alt.seg, take_alt);

        let jump = self.seg1(Op::CondJump {
            test_var: test.var.clone(),
            true_state: cons.start,
            false_state: alt.start,
        });
        self.chain(test.seg, jump);
        let end = self.noop();
        self.ir.set_next(cons.end, end);
        self.ir.set_next(alt.end, end);

        Ok(ExprOut {
            seg: Segment {
                start: test.seg.start,
                end,
            },
            var: result,
        })
    }

    // ------------------------------------------------------------------
    // Assignment
    // ------------------------------------------------------------------

    fn lower_assignment(&mut self, e: &AssignmentExpression) -> CompileResult<ExprOut> {
        if let Some(logical) = e.op.logical_op() {
            return self.lower_logical_assignment(logical, &e.target, &e.value);
        }
        match &e.target {
            AssignmentTarget::Identifier(name) => match e.op.binary_op() {
                None => {
                    let value = self.lower_expr(&e.value)?;
                    let write = self.identifier_write(name, &value.var);
                    let seg = self.chain(value.seg, write);
                    Ok(ExprOut {
                        seg,
                        var: value.var,
                    })
                }
                Some(bin) => {
                    let old = self.identifier_read(name);
                    let value = self.lower_expr(&e.value)?;
                    let new = self.temp();
                    let compute = self.seg1(Op::Binary {
                        to: new.clone(),
                        op: bin,
                        left: old.var.clone(),
                        right: value.var.clone(),
                    });
                    let write = self.identifier_write(name, &new);
                    let seg = self.chain(old.seg, value.seg);
                    let seg = self.chain(seg, compute);
                    let seg = self.chain(seg, write);
                    Ok(ExprOut { seg, var: new })
                }
            },
            AssignmentTarget::Member(member) => {
                let object = self.lower_expr(&member.object)?;
                let key = self.member_key(&member.property)?;
                match e.op.binary_op() {
                    None => {
                        let value = self.lower_expr(&e.value)?;
                        let write = self.seg1(Op::MemberAssignComputed {
                            object: object.var.clone(),
                            key_var: key.var.clone(),
                            value_var: value.var.clone(),
                        });
                        let seg = self.chain(object.seg, key.seg);
                        let seg = self.chain(seg, value.seg);
                        let seg = self.chain(seg, write);
                        Ok(ExprOut {
                            seg,
                            var: value.var,
                        })
                    }
                    Some(bin) => {
                        let old = self.temp();
                        let read = self.seg1(Op::MemberAccessComputed {
                            to: old.clone(),
                            object: object.var.clone(),
                            key_var: key.var.clone(),
                        });
                        let value = self.lower_expr(&e.value)?;
                        let new = self.temp();
                        let compute = self.seg1(Op::Binary {
                            to: new.clone(),
                            op: bin,
                            left: old,
                            right: value.var.clone(),
                        });
                        let write = self.seg1(Op::MemberAssignComputed {
                            object: object.var.clone(),
                            key_var: key.var.clone(),
                            value_var: new.clone(),
                        });
                        let seg = self.chain(object.seg, key.seg);
                        let seg = self.chain(seg, read);
                        let seg = self.chain(seg, value.seg);
                        let seg = self.chain(seg, compute);
                        let seg = self.chain(seg, write);
                        Ok(ExprOut { seg, var: new })
                    }
                }
            }
            AssignmentTarget::Pattern(pattern) => {
                let value = self.lower_expr(&e.value)?;
                let spread = self.destructure(pattern, &value.var, None)?;
                let seg = self.chain(value.seg, spread);
                Ok(ExprOut {
                    seg,
                    var: value.var,
                })
            }
        }
    }

    fn lower_logical_assignment(
        &mut self,
        op: LogicalOp,
        target: &AssignmentTarget,
        value: &Expression,
    ) -> CompileResult<ExprOut> {
        // x ||= v  desugars to the diamond of  x || (x = v)
        let assigned = Expression::Assignment(AssignmentExpression {
            op: AssignmentOp::Assign,
            target: target.clone(),
            value: Box::new(value.clone()),
        });
        let current = match target {
            AssignmentTarget::Identifier(name) => Expression::ident(name.clone()),
            AssignmentTarget::Member(member) => Expression::Member(member.clone()),
            AssignmentTarget::Pattern(_) => {
                return Err(CompileError::unsupported(
                    "logical assignment to a destructuring pattern",
                ))
            }
        };
        self.lower_logical(op, &current, &assigned)
    }

    // ------------------------------------------------------------------
    // Members
    // ------------------------------------------------------------------

    /// Lower a member key to a slot holding the property string/value
    pub(crate) fn member_key(&mut self, property: &MemberProperty) -> CompileResult<ExprOut> {
        match property {
            MemberProperty::Identifier(name) => Ok(self.literal(Literal::String(name.clone()))),
            MemberProperty::Computed(key) => self.lower_expr(key),
            MemberProperty::Private(_) => Err(CompileError::unsupported(
                "private member outside a class body",
            )),
        }
    }

    fn lower_member_read(&mut self, member: &MemberExpression) -> CompileResult<ExprOut> {
        // Host-global object with a static key reads in one op.
        if let (Expression::Identifier(object), MemberProperty::Identifier(property)) =
            (&*member.object, &member.property)
        {
            if !self.is_allocated(object) && object != "undefined" {
                self.use_global(object);
                let to = self.temp();
                let seg = self.seg1(Op::MemberAccessGlobal {
                    to: to.clone(),
                    global_name: object.clone(),
                    property: property.clone(),
                });
                return Ok(ExprOut { seg, var: to });
            }
        }
        let object = self.lower_expr(&member.object)?;
        let to = self.temp();
        let (key_seg, op) = match &member.property {
            MemberProperty::Identifier(name) => (
                None,
                Op::MemberAccess {
                    to: to.clone(),
                    object: object.var.clone(),
                    property: name.clone(),
                },
            ),
            MemberProperty::Computed(key) => {
                let key = self.lower_expr(key)?;
                (
                    Some(key.seg),
                    Op::MemberAccessComputed {
                        to: to.clone(),
                        object: object.var.clone(),
                        key_var: key.var,
                    },
                )
            }
            MemberProperty::Private(_) => {
                return Err(CompileError::unsupported(
                    "private member outside a class body",
                ))
            }
        };
        let access = self.seg1(op);
        let mut seg = object.seg;
        if let Some(key_seg) = key_seg {
            seg = self.chain(seg, key_seg);
        }
        let seg = self.chain(seg, access);
        Ok(ExprOut { seg, var: to })
    }

    // ------------------------------------------------------------------
    // Calls
    // ------------------------------------------------------------------

    pub(crate) fn lower_args(
        &mut self,
        args: &[Argument],
    ) -> CompileResult<(Segment, Vec<CallArg>)> {
        let start = self.noop();
        let mut seg = Segment { start, end: start };
        let mut lowered = Vec::with_capacity(args.len());
        for arg in args {
            match arg {
                Argument::Expr(e) => {
                    let out = self.lower_expr(e)?;
                    seg = self.chain(seg, out.seg);
                    lowered.push(CallArg::Var(out.var));
                }
                Argument::Spread(e) => {
                    let out = self.lower_expr(e)?;
                    seg = self.chain(seg, out.seg);
                    lowered.push(CallArg::Spread(out.var));
                }
            }
        }
        Ok((seg, lowered))
    }

    fn lower_call(&mut self, e: &CallExpression) -> CompileResult<ExprOut> {
        match &*e.callee {
            Expression::Identifier(name) => {
                // Direct call of a known function without captures goes
                // through the stackless CALL path; everything else uses the
                // wrapper value so captured frames resolve correctly.
                let internal = self
                    .functions
                    .get(name.as_str())
                    .filter(|info| info.captured.is_empty() && !info.is_class)
                    .map(|info| info.entry);
                if let Some(entry) = internal {
                    let (aseg, args) = self.lower_args(&e.arguments)?;
                    let to = self.temp();
                    let call = self.seg1(Op::Call {
                        callee: name.clone(),
                        entry,
                        args,
                        caller_func_name: self.ctx.name.clone(),
                    });
                    let post = self.seg1(Op::PostCall);
                    let retrieve = self.seg1(Op::RetrieveResult { to: to.clone() });
                    let seg = self.chain(aseg, call);
                    let seg = self.chain(seg, post);
                    let seg = self.chain(seg, retrieve);
                    return Ok(ExprOut { seg, var: to });
                }
                let callee = self.identifier_read(name);
                let (aseg, args) = self.lower_args(&e.arguments)?;
                let to = self.temp();
                let call = self.seg1(Op::ExternalCall {
                    to: to.clone(),
                    callee_var: callee.var,
                    this_object: None,
                    args,
                });
                let seg = self.chain(callee.seg, aseg);
                let seg = self.chain(seg, call);
                Ok(ExprOut { seg, var: to })
            }
            Expression::Member(member) => {
                let object = self.lower_expr(&member.object)?;
                let (key_seg, method, key_var, auto_await) = match &member.property {
                    MemberProperty::Identifier(name) => {
                        let auto = self.ctx.is_generator
                            && self.ctx.is_async
                            && AUTO_AWAIT_METHODS.contains(&name.as_str());
                        (None, name.clone(), None, auto)
                    }
                    MemberProperty::Computed(key) => {
                        let key = self.lower_expr(key)?;
                        (Some(key.seg), String::new(), Some(key.var), false)
                    }
                    MemberProperty::Private(_) => {
                        return Err(CompileError::unsupported(
                            "private member outside a class body",
                        ))
                    }
                };
                let (aseg, args) = self.lower_args(&e.arguments)?;
                let to = self.temp();
                let call = self.seg1(Op::MethodCall {
                    to: to.clone(),
                    object: object.var.clone(),
                    method,
                    key_var,
                    args,
                });
                let mut seg = object.seg;
                if let Some(key_seg) = key_seg {
                    seg = self.chain(seg, key_seg);
                }
                seg = self.chain(seg, aseg);
                seg = self.chain(seg, call);
                if auto_await {
                    let awaited = self.temp();
                    let op = self.seg1(Op::Await {
                        to: awaited.clone(),
                        value_var: to,
                    });
                    let seg = self.chain(seg, op);
                    return Ok(ExprOut { seg, var: awaited });
                }
                Ok(ExprOut { seg, var: to })
            }
            Expression::Super => Err(CompileError::unsupported(
                "super call outside a constructor",
            )),
            other => {
                let callee = self.lower_expr(other)?;
                let (aseg, args) = self.lower_args(&e.arguments)?;
                let to = self.temp();
                let call = self.seg1(Op::ExternalCall {
                    to: to.clone(),
                    callee_var: callee.var,
                    this_object: None,
                    args,
                });
                let seg = self.chain(callee.seg, aseg);
                let seg = self.chain(seg, call);
                Ok(ExprOut { seg, var: to })
            }
        }
    }

    fn lower_new(&mut self, e: &NewExpression) -> CompileResult<ExprOut> {
        if let Expression::Identifier(name) = &*e.callee {
            if self.functions.get(name.as_str()).is_some_and(|i| i.is_class) {
                let (aseg, args) = self.lower_args(&e.arguments)?;
                let to = self.temp();
                let op = self.seg1(Op::NewInstance {
                    to: to.clone(),
                    callee: name.clone(),
                    args,
                });
                let seg = self.chain(aseg, op);
                return Ok(ExprOut { seg, var: to });
            }
        }
        let callee = self.lower_expr(&e.callee)?;
        let (aseg, args) = self.lower_args(&e.arguments)?;
        let to = self.temp();
        let op = self.seg1(Op::NewExternalInstance {
            to: to.clone(),
            callee_var: callee.var,
            args,
        });
        let seg = self.chain(callee.seg, aseg);
        let seg = self.chain(seg, op);
        Ok(ExprOut { seg, var: to })
    }

    // ------------------------------------------------------------------
    // Literals with structure
    // ------------------------------------------------------------------

    fn lower_template(&mut self, tpl: &TemplateLiteral) -> CompileResult<ExprOut> {
        // Fold to a `+` chain rooted at the first chunk so the result is
        // always a string.
        let mut acc = self.literal(Literal::String(tpl.quasis[0].clone()));
        for (i, expr) in tpl.expressions.iter().enumerate() {
            let value = self.lower_expr(expr)?;
            let to = self.temp();
            let add = self.seg1(Op::Binary {
                to: to.clone(),
                op: BinaryOp::Add,
                left: acc.var.clone(),
                right: value.var.clone(),
            });
            let seg = self.chain(acc.seg, value.seg);
            let seg = self.chain(seg, add);
            acc = ExprOut { seg, var: to };

            let quasi = &tpl.quasis[i + 1];
            if !quasi.is_empty() {
                let chunk = self.literal(Literal::String(quasi.clone()));
                let to = self.temp();
                let add = self.seg1(Op::Binary {
                    to: to.clone(),
                    op: BinaryOp::Add,
                    left: acc.var.clone(),
                    right: chunk.var.clone(),
                });
                let seg = self.chain(acc.seg, chunk.seg);
                let seg = self.chain(seg, add);
                acc = ExprOut { seg, var: to };
            }
        }
        Ok(acc)
    }

    fn lower_array(&mut self, arr: &ArrayExpression) -> CompileResult<ExprOut> {
        let start = self.noop();
        let mut seg = Segment { start, end: start };
        let mut elements = Vec::with_capacity(arr.elements.len());
        for elem in &arr.elements {
            match elem {
                ArrayElement::Expr(e) => {
                    let out = self.lower_expr(e)?;
                    seg = self.chain(seg, out.seg);
                    elements.push(ArrayItem::Var(out.var));
                }
                ArrayElement::Spread(e) => {
                    let out = self.lower_expr(e)?;
                    seg = self.chain(seg, out.seg);
                    elements.push(ArrayItem::Spread(out.var));
                }
                ArrayElement::Hole => elements.push(ArrayItem::Hole),
            }
        }
        let to = self.temp();
        let create = self.seg1(Op::CreateArray {
            to: to.clone(),
            elements,
        });
        let seg = self.chain(seg, create);
        Ok(ExprOut { seg, var: to })
    }

    fn lower_object(&mut self, obj: &ObjectExpression) -> CompileResult<ExprOut> {
        let start = self.noop();
        let mut seg = Segment { start, end: start };
        let mut properties = Vec::new();
        // Accessors install after creation: (key var, getter?, setter fn var)
        let mut accessors: Vec<(ExprOut, MethodKind, String)> = Vec::new();

        for prop in &obj.properties {
            match prop {
                ObjectProperty::KeyValue { key, value } => {
                    let value_out = self.lower_expr(value)?;
                    match self.object_key(key)? {
                        ObjectKey::Static(name) => {
                            seg = self.chain(seg, value_out.seg);
                            properties.push(ObjectItem::KeyValue {
                                key: name,
                                value_var: value_out.var,
                            });
                        }
                        ObjectKey::Computed(key_out) => {
                            seg = self.chain(seg, key_out.seg);
                            seg = self.chain(seg, value_out.seg);
                            properties.push(ObjectItem::Computed {
                                key_var: key_out.var,
                                value_var: value_out.var,
                            });
                        }
                    }
                }
                ObjectProperty::Shorthand(name) => {
                    let value = self.identifier_read(name);
                    seg = self.chain(seg, value.seg);
                    properties.push(ObjectItem::KeyValue {
                        key: name.clone(),
                        value_var: value.var,
                    });
                }
                ObjectProperty::Spread(e) => {
                    let out = self.lower_expr(e)?;
                    seg = self.chain(seg, out.seg);
                    properties.push(ObjectItem::Spread { value_var: out.var });
                }
                ObjectProperty::Method {
                    key,
                    kind,
                    function,
                } => {
                    let value = self.lower_function_value(None, function.clone(), false)?;
                    seg = self.chain(seg, value.seg);
                    match kind {
                        MethodKind::Method => match self.object_key(key)? {
                            ObjectKey::Static(name) => properties.push(ObjectItem::KeyValue {
                                key: name,
                                value_var: value.var,
                            }),
                            ObjectKey::Computed(key_out) => {
                                seg = self.chain(seg, key_out.seg);
                                properties.push(ObjectItem::Computed {
                                    key_var: key_out.var,
                                    value_var: value.var,
                                });
                            }
                        },
                        MethodKind::Getter | MethodKind::Setter => {
                            let key_out = match self.object_key(key)? {
                                ObjectKey::Static(name) => {
                                    self.literal(Literal::String(name))
                                }
                                ObjectKey::Computed(out) => out,
                            };
                            seg = self.chain(seg, key_out.seg);
                            accessors.push((key_out, *kind, value.var));
                        }
                    }
                }
            }
        }

        let to = self.temp();
        let create = self.seg1(Op::CreateObject {
            to: to.clone(),
            properties,
        });
        seg = self.chain(seg, create);

        for (key_out, kind, fn_var) in accessors {
            let install =
                self.define_accessor(&to, &key_out.var, kind, &fn_var, /*enumerable=*/ true)?;
            seg = self.chain(seg, install);
        }
        Ok(ExprOut { seg, var: to })
    }

    /// `Object.defineProperty(target, key, { get/set, configurable, enumerable })`
    pub(crate) fn define_accessor(
        &mut self,
        target: &str,
        key_var: &str,
        kind: MethodKind,
        fn_var: &str,
        enumerable: bool,
    ) -> CompileResult<Segment> {
        let object_global = self.temp();
        let load = self.seg1(Op::AssignGlobal {
            to: object_global.clone(),
            global_name: "Object".into(),
        });
        self.use_global("Object");
        let flag_true = self.literal(Literal::Boolean(true));
        let flag_enum = self.literal(Literal::Boolean(enumerable));
        let descriptor = self.temp();
        let accessor_key = match kind {
            MethodKind::Getter => "get",
            MethodKind::Setter => "set",
            MethodKind::Method => return Err(CompileError::internal("method is not an accessor")),
        };
        let build = self.seg1(Op::CreateObject {
            to: descriptor.clone(),
            properties: vec![
                ObjectItem::KeyValue {
                    key: accessor_key.into(),
                    value_var: fn_var.to_string(),
                },
                ObjectItem::KeyValue {
                    key: "configurable".into(),
                    value_var: flag_true.var.clone(),
                },
                ObjectItem::KeyValue {
                    key: "enumerable".into(),
                    value_var: flag_enum.var.clone(),
                },
            ],
        });
        let sink = self.temp();
        let call = self.seg1(Op::MethodCall {
            to: sink,
            object: object_global,
            method: "defineProperty".into(),
            key_var: None,
            args: vec![
                CallArg::Var(target.to_string()),
                CallArg::Var(key_var.to_string()),
                CallArg::Var(descriptor),
            ],
        });
        let seg = self.chain(load, flag_true.seg);
        let seg = self.chain(seg, flag_enum.seg);
        let seg = self.chain(seg, build);
        let seg = self.chain(seg, call);
        Ok(seg)
    }

    pub(crate) fn object_key(&mut self, key: &PropertyKey) -> CompileResult<ObjectKey> {
        match key {
            PropertyKey::Identifier(name) | PropertyKey::String(name) => {
                Ok(ObjectKey::Static(name.clone()))
            }
            PropertyKey::Number(n) => Ok(ObjectKey::Static(vortex_ast::print::number_to_string(
                *n,
            ))),
            PropertyKey::Computed(expr) => Ok(ObjectKey::Computed(self.lower_expr(expr)?)),
            PropertyKey::Private(_) => Err(CompileError::unsupported(
                "private key outside a class body",
            )),
        }
    }

    // ------------------------------------------------------------------
    // Function-shaped expressions
    // ------------------------------------------------------------------

    fn lower_arrow(&mut self, arrow: &ArrowFunction) -> CompileResult<ExprOut> {
        let ArrowBody::Block(body) = &arrow.body else {
            return Err(CompileError::internal(
                "arrow expression body survived desugaring",
            ));
        };
        let function = Function {
            params: arrow.params.clone(),
            body: body.clone(),
            is_async: arrow.is_async,
            is_generator: false,
        };
        self.lower_function_value(None, function, true)
    }

    /// Virtualize a function-valued expression: register it under its own
    /// (or a synthesized) name, lower the body, bind the wrapper to the
    /// name slot and yield it. Arrows capture the enclosing `this` slot.
    pub(crate) fn lower_function_value(
        &mut self,
        given_name: Option<String>,
        function: Function,
        lexical_this: bool,
    ) -> CompileResult<ExprOut> {
        let name = given_name.unwrap_or_else(|| self.fresh_anon("anon"));
        let uses_this = capture_uses_this(&function);
        self.register_function(&name, function, self.ctx.top_level, false)?;
        if lexical_this && uses_this {
            let info = self.functions.get_mut(&name).expect("just registered");
            if !info.captured.iter().any(|c| c == "_THIS") {
                info.captured.push("_THIS".into());
            }
        }
        self.process_function(&name)?;

        let fragment = self.func_ref_fragment(&name)?;
        let bind = self.seg1(Op::AssignLiteralDirect {
            to: name.clone(),
            fragment,
        });
        let to = self.temp();
        let read = self.seg1(Op::Assign {
            to: to.clone(),
            from: name,
        });
        let seg = self.chain(bind, read);
        Ok(ExprOut { seg, var: to })
    }

    fn lower_class_expression(&mut self, e: &ClassExpression) -> CompileResult<ExprOut> {
        let name = e
            .name
            .clone()
            .unwrap_or_else(|| self.fresh_anon("class"));
        let seg = self.lower_class(&name, &e.class)?;
        let to = self.temp();
        let read = self.seg1(Op::Assign {
            to: to.clone(),
            from: name,
        });
        let seg = self.chain(seg, read);
        Ok(ExprOut { seg, var: to })
    }

    // ------------------------------------------------------------------
    // Destructuring
    // ------------------------------------------------------------------

    /// Bind `pattern` from the value in `src`. `decl` carries the global
    /// flag for fresh declarations; `None` writes existing bindings.
    pub(crate) fn destructure(
        &mut self,
        pattern: &Pattern,
        src: &str,
        decl: Option<bool>,
    ) -> CompileResult<Segment> {
        match pattern {
            Pattern::Identifier(name) => {
                if let Some(is_global) = decl {
                    self.memory.allocate(name, is_global);
                }
                Ok(self.identifier_write(name, src))
            }
            Pattern::Assignment(assign) => {
                // src === undefined ? default : src
                let undef = self.literal(Literal::Undefined);
                let test = self.temp();
                let cmp = self.seg1(Op::Binary {
                    to: test.clone(),
                    op: BinaryOp::StrictEqual,
                    left: src.to_string(),
                    right: undef.var.clone(),
                });
                let chosen = self.temp();

                let default = self.lower_expr(&assign.default)?;
                let take_default = self.seg1(Op::Assign {
                    to: chosen.clone(),
                    from: default.var.clone(),
                });
                let default_path = self.chain(default.seg, take_default);
                let direct_path = self.seg1(Op::Assign {
                    to: chosen.clone(),
                    from: src.to_string(),
                });

                let jump = self.seg1(Op::CondJump {
                    test_var: test,
                    true_state: default_path.start,
                    false_state: direct_path.start,
                });
                let head = self.chain(undef.seg, cmp);
                self.chain(head, jump);
                let merge = self.noop();
                self.ir.set_next(default_path.end, merge);
                self.ir.set_next(direct_path.end, merge);

                let inner = self.destructure(&assign.target, &chosen, decl)?;
                self.ir.set_next(merge, inner.start);
                Ok(Segment {
                    start: head.start,
                    end: inner.end,
                })
            }
            Pattern::Array(arr) => {
                let start = self.noop();
                let mut seg = Segment { start, end: start };
                for (i, elem) in arr.elements.iter().enumerate() {
                    let Some(elem) = elem else { continue };
                    if let Pattern::Rest(inner) = elem {
                        let idx = self.literal(Literal::Number(i as f64));
                        let rest = self.temp();
                        let tail = self.seg1(Op::MethodCall {
                            to: rest.clone(),
                            object: src.to_string(),
                            method: "slice".into(),
                            key_var: None,
                            args: vec![CallArg::Var(idx.var.clone())],
                        });
                        seg = self.chain(seg, idx.seg);
                        seg = self.chain(seg, tail);
                        let bound = self.destructure(inner, &rest, decl)?;
                        seg = self.chain(seg, bound);
                        break;
                    }
                    let idx = self.literal(Literal::Number(i as f64));
                    let value = self.temp();
                    let read = self.seg1(Op::MemberAccessComputed {
                        to: value.clone(),
                        object: src.to_string(),
                        key_var: idx.var.clone(),
                    });
                    seg = self.chain(seg, idx.seg);
                    seg = self.chain(seg, read);
                    let bound = self.destructure(elem, &value, decl)?;
                    seg = self.chain(seg, bound);
                }
                Ok(seg)
            }
            Pattern::Object(obj) => {
                let start = self.noop();
                let mut seg = Segment { start, end: start };
                // Key slots kept for rest exclusion.
                let mut consumed: Vec<String> = Vec::new();
                for prop in &obj.properties {
                    let key_out = match self.object_key(&prop.key)? {
                        ObjectKey::Static(name) => self.literal(Literal::String(name)),
                        ObjectKey::Computed(out) => out,
                    };
                    seg = self.chain(seg, key_out.seg);
                    let value = self.temp();
                    let read = self.seg1(Op::MemberAccessComputed {
                        to: value.clone(),
                        object: src.to_string(),
                        key_var: key_out.var.clone(),
                    });
                    seg = self.chain(seg, read);
                    consumed.push(key_out.var);
                    let bound = self.destructure(&prop.value, &value, decl)?;
                    seg = self.chain(seg, bound);
                }
                if let Some(rest) = &obj.rest {
                    let object_global = self.temp();
                    let load = self.seg1(Op::AssignGlobal {
                        to: object_global.clone(),
                        global_name: "Object".into(),
                    });
                    self.use_global("Object");
                    let empty = self.temp();
                    let fresh = self.seg1(Op::CreateObject {
                        to: empty.clone(),
                        properties: vec![],
                    });
                    let copy = self.temp();
                    let assign = self.seg1(Op::MethodCall {
                        to: copy.clone(),
                        object: object_global,
                        method: "assign".into(),
                        key_var: None,
                        args: vec![CallArg::Var(empty), CallArg::Var(src.to_string())],
                    });
                    seg = self.chain(seg, load);
                    seg = self.chain(seg, fresh);
                    seg = self.chain(seg, assign);

                    let reflect = self.temp();
                    let load_reflect = self.seg1(Op::AssignGlobal {
                        to: reflect.clone(),
                        global_name: "Reflect".into(),
                    });
                    self.use_global("Reflect");
                    seg = self.chain(seg, load_reflect);
                    for key_var in &consumed {
                        let sink = self.temp();
                        let remove = self.seg1(Op::MethodCall {
                            to: sink,
                            object: reflect.clone(),
                            method: "deleteProperty".into(),
                            key_var: None,
                            args: vec![CallArg::Var(copy.clone()), CallArg::Var(key_var.clone())],
                        });
                        seg = self.chain(seg, remove);
                    }
                    let bound = self.destructure(rest, &copy, decl)?;
                    seg = self.chain(seg, bound);
                }
                Ok(seg)
            }
            Pattern::Rest(inner) => self.destructure(inner, src, decl),
            Pattern::Member(member) => {
                let object = self.lower_expr(&member.object)?;
                let key = self.member_key(&member.property)?;
                let write = self.seg1(Op::MemberAssignComputed {
                    object: object.var.clone(),
                    key_var: key.var.clone(),
                    value_var: src.to_string(),
                });
                let seg = self.chain(object.seg, key.seg);
                let seg = self.chain(seg, write);
                Ok(seg)
            }
        }
    }
}

/// Object literal/class key after evaluation
pub(crate) enum ObjectKey {
    Static(String),
    Computed(ExprOut),
}

fn capture_uses_this(function: &Function) -> bool {
    super::capture::free_variables(function).uses_this
}
