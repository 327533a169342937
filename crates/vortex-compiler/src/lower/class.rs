//! Class lowering
//!
//! A class decomposes into a virtualized constructor plus explicit
//! prototype wiring. Private members move into per-name WeakMap slots,
//! `super` becomes reflective access through a captured superclass
//! binding, and field initializers are injected into the constructor
//! after the first `super(...)` call.

use super::expr::ObjectKey;
use super::{IrGenerator, Segment};
use crate::error::{CompileError, CompileResult};
use crate::ir::{CallArg, Literal, Op};
use rustc_hash::FxHashMap;
use vortex_ast::*;

impl IrGenerator<'_> {
    pub(crate) fn lower_class(&mut self, name: &str, class: &Class) -> CompileResult<Segment> {
        let is_global = self.ctx.top_level;
        self.memory.allocate(name, is_global);

        let start = self.noop();
        let mut seg = Segment { start, end: start };

        // Stable binding for the superclass expression.
        let super_name = match &class.super_class {
            Some(sup) => {
                let binding = format!("_super${}", name);
                self.memory.allocate(&binding, is_global);
                // Methods reference the binding as a free name; make it
                // visible to capture analysis in the current scope.
                if let Some(scope) = self.scopes.last_mut() {
                    scope.insert(binding.clone());
                }
                let value = self.lower_expr(sup)?;
                seg = self.chain(seg, value.seg);
                let bind = self.seg1(Op::Assign {
                    to: binding.clone(),
                    from: value.var,
                });
                seg = self.chain(seg, bind);
                Some(binding)
            }
            None => None,
        };

        // One WeakMap slot per private name, shared by instances and the
        // class object itself (statics key on the class).
        let mut priv_slots: FxHashMap<String, String> = FxHashMap::default();
        for member in &class.members {
            let key = match member {
                ClassMember::Method(m) => &m.key,
                ClassMember::Field(f) => &f.key,
                ClassMember::Constructor(_) => continue,
            };
            if let PropertyKey::Private(pname) = key {
                if !priv_slots.contains_key(pname) {
                    let slot = format!("_priv${}${}", name, pname);
                    self.memory.allocate(&slot, true);
                    priv_slots.insert(pname.clone(), slot);
                }
            }
        }
        let mut slot_names: Vec<String> = priv_slots.values().cloned().collect();
        slot_names.sort();
        for slot in slot_names {
            let ctor = self.temp();
            let load = self.seg1(Op::AssignGlobal {
                to: ctor.clone(),
                global_name: "WeakMap".into(),
            });
            self.use_global("WeakMap");
            let map = self.temp();
            let build = self.seg1(Op::NewExternalInstance {
                to: map.clone(),
                callee_var: ctor,
                args: vec![],
            });
            let bind = self.seg1(Op::Assign {
                to: slot,
                from: map,
            });
            seg = self.chain(seg, load);
            seg = self.chain(seg, build);
            seg = self.chain(seg, bind);
        }

        let mut rewriter = ClassRewriter {
            super_name: super_name.as_deref(),
            priv_slots: &priv_slots,
            counter: 0,
        };

        // Build the constructor, injecting instance field and private
        // method initializers.
        let mut inits: Vec<Statement> = Vec::new();
        for member in &class.members {
            match member {
                ClassMember::Field(field) if !field.is_static => {
                    let value = field
                        .value
                        .clone()
                        .unwrap_or(Expression::Identifier("undefined".into()));
                    inits.push(Statement::expr(make_member_write(
                        Expression::This,
                        &field.key,
                        value,
                    )?));
                }
                ClassMember::Method(method)
                    if !method.is_static && matches!(method.key, PropertyKey::Private(_)) =>
                {
                    // #m lives in its WeakMap slot, populated per instance.
                    let PropertyKey::Private(pname) = &method.key else {
                        unreachable!()
                    };
                    let slot = priv_slots[pname].clone();
                    inits.push(Statement::expr(Expression::call(
                        Expression::member(Expression::ident(slot), "set"),
                        vec![
                            Expression::This,
                            Expression::Function(FunctionExpression {
                                name: None,
                                function: method.function.clone(),
                            }),
                        ],
                    )));
                }
                _ => {}
            }
        }

        let mut ctor = match class
            .members
            .iter()
            .find_map(|m| match m {
                ClassMember::Constructor(f) => Some(f.clone()),
                _ => None,
            }) {
            Some(f) => f,
            None => synthesize_constructor(super_name.is_some()),
        };
        inject_initializers(&mut ctor.body, inits);
        ctor.body
            .statements
            .push(Statement::Return(ReturnStatement {
                argument: Some(Expression::This),
            }));
        rewriter.function(&mut ctor);

        self.register_function(name, ctor, is_global, true)?;
        let fragment = self.func_ref_fragment(name)?;
        let bind_ctor = self.seg1(Op::AssignLiteralDirect {
            to: name.to_string(),
            fragment,
        });
        seg = self.chain(seg, bind_ctor);
        self.process_function(name)?;

        // Prototype wiring.
        let class_val = self.temp();
        let read_class = self.seg1(Op::Assign {
            to: class_val.clone(),
            from: name.to_string(),
        });
        seg = self.chain(seg, read_class);

        let proto = self.temp();
        match &super_name {
            Some(sup) => {
                let object_global = self.temp();
                let load = self.seg1(Op::AssignGlobal {
                    to: object_global.clone(),
                    global_name: "Object".into(),
                });
                self.use_global("Object");
                seg = self.chain(seg, load);

                let super_val = self.temp();
                let read_super = self.seg1(Op::Assign {
                    to: super_val.clone(),
                    from: sup.clone(),
                });
                seg = self.chain(seg, read_super);

                // Static side of the chain.
                let sink = self.temp();
                let wire_static = self.seg1(Op::MethodCall {
                    to: sink,
                    object: object_global.clone(),
                    method: "setPrototypeOf".into(),
                    key_var: None,
                    args: vec![
                        CallArg::Var(class_val.clone()),
                        CallArg::Var(super_val.clone()),
                    ],
                });
                seg = self.chain(seg, wire_static);

                // prototype = Object.create(Super.prototype)
                let super_proto = self.temp();
                let read_sp = self.seg1(Op::MemberAccess {
                    to: super_proto.clone(),
                    object: super_val,
                    property: "prototype".into(),
                });
                seg = self.chain(seg, read_sp);
                let make_proto = self.seg1(Op::MethodCall {
                    to: proto.clone(),
                    object: object_global,
                    method: "create".into(),
                    key_var: None,
                    args: vec![CallArg::Var(super_proto)],
                });
                seg = self.chain(seg, make_proto);
                let set_proto = self.seg1(Op::MemberAssign {
                    object: class_val.clone(),
                    property: "prototype".into(),
                    value_var: proto.clone(),
                });
                seg = self.chain(seg, set_proto);
                let back_link = self.seg1(Op::MemberAssign {
                    object: proto.clone(),
                    property: "constructor".into(),
                    value_var: class_val.clone(),
                });
                seg = self.chain(seg, back_link);
            }
            None => {
                let read_proto = self.seg1(Op::MemberAccess {
                    to: proto.clone(),
                    object: class_val.clone(),
                    property: "prototype".into(),
                });
                seg = self.chain(seg, read_proto);
            }
        }

        // Methods and accessors.
        for member in &class.members {
            let ClassMember::Method(method) = member else {
                continue;
            };
            if matches!(method.key, PropertyKey::Private(_)) && !method.is_static {
                continue; // installed per instance in the constructor
            }
            let mut function = method.function.clone();
            rewriter.function(&mut function);
            let target = if method.is_static { &class_val } else { &proto };

            if let PropertyKey::Private(pname) = &method.key {
                // static #m: populate the slot with the class as key
                let value = self.lower_function_value(None, function, false)?;
                seg = self.chain(seg, value.seg);
                let slot_val = self.temp();
                let read_slot = self.seg1(Op::Assign {
                    to: slot_val.clone(),
                    from: priv_slots[pname].clone(),
                });
                let sink = self.temp();
                let install = self.seg1(Op::MethodCall {
                    to: sink,
                    object: slot_val,
                    method: "set".into(),
                    key_var: None,
                    args: vec![CallArg::Var(class_val.clone()), CallArg::Var(value.var)],
                });
                seg = self.chain(seg, read_slot);
                seg = self.chain(seg, install);
                continue;
            }

            let value = self.lower_function_value(None, function, false)?;
            seg = self.chain(seg, value.seg);
            match method.kind {
                MethodKind::Method => match self.object_key(&method.key)? {
                    ObjectKey::Static(key) => {
                        let install = self.seg1(Op::MemberAssign {
                            object: target.clone(),
                            property: key,
                            value_var: value.var,
                        });
                        seg = self.chain(seg, install);
                    }
                    ObjectKey::Computed(key_out) => {
                        seg = self.chain(seg, key_out.seg);
                        let install = self.seg1(Op::MemberAssignComputed {
                            object: target.clone(),
                            key_var: key_out.var,
                            value_var: value.var,
                        });
                        seg = self.chain(seg, install);
                    }
                },
                MethodKind::Getter | MethodKind::Setter => {
                    let key_out = match self.object_key(&method.key)? {
                        ObjectKey::Static(key) => self.literal(Literal::String(key)),
                        ObjectKey::Computed(out) => out,
                    };
                    seg = self.chain(seg, key_out.seg);
                    let install = self.define_accessor(
                        target,
                        &key_out.var,
                        method.kind,
                        &value.var,
                        false,
                    )?;
                    seg = self.chain(seg, install);
                }
            }
        }

        // Static fields, evaluated with the class object as `this`.
        for member in &class.members {
            let ClassMember::Field(field) = member else {
                continue;
            };
            if !field.is_static {
                continue;
            }
            let mut value_expr = field
                .value
                .clone()
                .unwrap_or(Expression::Identifier("undefined".into()));
            replace_this(&mut value_expr, name);
            rewriter.expression(&mut value_expr);
            let value = self.lower_expr(&value_expr)?;
            seg = self.chain(seg, value.seg);

            if let PropertyKey::Private(pname) = &field.key {
                let slot_val = self.temp();
                let read_slot = self.seg1(Op::Assign {
                    to: slot_val.clone(),
                    from: priv_slots[pname].clone(),
                });
                let sink = self.temp();
                let install = self.seg1(Op::MethodCall {
                    to: sink,
                    object: slot_val,
                    method: "set".into(),
                    key_var: None,
                    args: vec![CallArg::Var(class_val.clone()), CallArg::Var(value.var)],
                });
                seg = self.chain(seg, read_slot);
                seg = self.chain(seg, install);
                continue;
            }

            match self.object_key(&field.key)? {
                ObjectKey::Static(key) => {
                    let install = self.seg1(Op::MemberAssign {
                        object: class_val.clone(),
                        property: key,
                        value_var: value.var,
                    });
                    seg = self.chain(seg, install);
                }
                ObjectKey::Computed(key_out) => {
                    seg = self.chain(seg, key_out.seg);
                    let install = self.seg1(Op::MemberAssignComputed {
                        object: class_val.clone(),
                        key_var: key_out.var,
                        value_var: value.var,
                    });
                    seg = self.chain(seg, install);
                }
            }
        }

        Ok(seg)
    }
}

/// `constructor(...args) { super(...args); }` or an empty one
fn synthesize_constructor(derived: bool) -> Function {
    if derived {
        Function::new(
            vec![Pattern::Rest(Box::new(Pattern::Identifier("_args$c".into())))],
            BlockStatement::new(vec![Statement::expr(Expression::Call(CallExpression {
                callee: Box::new(Expression::Super),
                arguments: vec![Argument::Spread(Expression::ident("_args$c"))],
            }))]),
        )
    } else {
        Function::new(vec![], BlockStatement::default())
    }
}

/// Insert field initializers after the first top-level `super(...)` call,
/// or at the start when there is none.
fn inject_initializers(body: &mut BlockStatement, inits: Vec<Statement>) {
    if inits.is_empty() {
        return;
    }
    let super_pos = body.statements.iter().position(|stmt| {
        matches!(
            stmt,
            Statement::Expression(ExpressionStatement {
                expression: Expression::Call(call),
            }) if matches!(*call.callee, Expression::Super)
        )
    });
    let at = super_pos.map(|i| i + 1).unwrap_or(0);
    let tail = body.statements.split_off(at);
    body.statements.extend(inits);
    body.statements.extend(tail);
}

/// `this.key = value` for a field initializer; private keys keep their
/// member form and are rewritten with the rest of the constructor.
fn make_member_write(
    object: Expression,
    key: &PropertyKey,
    value: Expression,
) -> CompileResult<Expression> {
    let property = match key {
        PropertyKey::Identifier(name) => MemberProperty::Identifier(name.clone()),
        PropertyKey::String(name) => MemberProperty::Computed(Box::new(Expression::str(
            name.clone(),
        ))),
        PropertyKey::Number(n) => MemberProperty::Computed(Box::new(Expression::num(*n))),
        PropertyKey::Private(name) => MemberProperty::Private(name.clone()),
        PropertyKey::Computed(expr) => MemberProperty::Computed(expr.clone()),
    };
    Ok(Expression::Assignment(AssignmentExpression {
        op: AssignmentOp::Assign,
        target: AssignmentTarget::Member(MemberExpression {
            object: Box::new(object),
            property,
        }),
        value: Box::new(value),
    }))
}

/// Replace top-level `this` with the class binding (static initializers)
fn replace_this(expr: &mut Expression, class_name: &str) {
    if matches!(expr, Expression::This) {
        *expr = Expression::ident(class_name);
        return;
    }
    // Shallow cases are enough: static initializers rarely nest `this`
    // under function boundaries, and those get their own binding anyway.
    match expr {
        Expression::Member(m) => replace_this(&mut m.object, class_name),
        Expression::Call(c) => {
            replace_this(&mut c.callee, class_name);
            for arg in &mut c.arguments {
                match arg {
                    Argument::Expr(e) | Argument::Spread(e) => replace_this(e, class_name),
                }
            }
        }
        Expression::Binary(b) => {
            replace_this(&mut b.left, class_name);
            replace_this(&mut b.right, class_name);
        }
        _ => {}
    }
}

/// Rewrites `super` and `#private` forms into reflective accesses
struct ClassRewriter<'a> {
    super_name: Option<&'a str>,
    priv_slots: &'a FxHashMap<String, String>,
    counter: u32,
}

impl ClassRewriter<'_> {
    fn fresh(&mut self, base: &str) -> String {
        let name = format!("_{}${}", base, self.counter);
        self.counter += 1;
        name
    }

    fn slot(&self, pname: &str) -> CompileResult<Expression> {
        self.priv_slots
            .get(pname)
            .map(|s| Expression::ident(s.clone()))
            .ok_or_else(|| CompileError::unsupported(format!("undeclared private name #{pname}")))
    }

    fn super_expr(&self) -> Expression {
        Expression::ident(self.super_name.unwrap_or("Object"))
    }

    fn function(&mut self, function: &mut Function) {
        self.block(&mut function.body);
    }

    fn block(&mut self, block: &mut BlockStatement) {
        for stmt in &mut block.statements {
            self.statement(stmt);
        }
    }

    fn statement(&mut self, stmt: &mut Statement) {
        match stmt {
            Statement::VariableDecl(decl) => {
                for d in &mut decl.declarations {
                    if let Some(init) = &mut d.init {
                        self.expression(init);
                    }
                }
            }
            Statement::FunctionDecl(decl) => self.function(&mut decl.function),
            Statement::Expression(s) => self.expression(&mut s.expression),
            Statement::If(s) => {
                self.expression(&mut s.test);
                self.statement(&mut s.consequent);
                if let Some(alt) = &mut s.alternate {
                    self.statement(alt);
                }
            }
            Statement::Switch(s) => {
                self.expression(&mut s.discriminant);
                for case in &mut s.cases {
                    if let Some(test) = &mut case.test {
                        self.expression(test);
                    }
                    for inner in &mut case.body {
                        self.statement(inner);
                    }
                }
            }
            Statement::While(s) => {
                self.expression(&mut s.test);
                self.statement(&mut s.body);
            }
            Statement::DoWhile(s) => {
                self.statement(&mut s.body);
                self.expression(&mut s.test);
            }
            Statement::For(s) => {
                match &mut s.init {
                    Some(ForInit::VariableDecl(decl)) => {
                        for d in &mut decl.declarations {
                            if let Some(init) = &mut d.init {
                                self.expression(init);
                            }
                        }
                    }
                    Some(ForInit::Expression(e)) => self.expression(e),
                    None => {}
                }
                if let Some(test) = &mut s.test {
                    self.expression(test);
                }
                if let Some(update) = &mut s.update {
                    self.expression(update);
                }
                self.statement(&mut s.body);
            }
            Statement::Return(s) => {
                if let Some(arg) = &mut s.argument {
                    self.expression(arg);
                }
            }
            Statement::Throw(s) => self.expression(&mut s.argument),
            Statement::Try(s) => {
                self.block(&mut s.block);
                if let Some(handler) = &mut s.handler {
                    self.block(&mut handler.body);
                }
                if let Some(finalizer) = &mut s.finalizer {
                    self.block(finalizer);
                }
            }
            Statement::Labeled(s) => self.statement(&mut s.body),
            Statement::Block(block) => self.block(block),
            _ => {}
        }
    }

    fn expression(&mut self, expr: &mut Expression) {
        // Rewrites that replace the node wholesale come first.
        match expr {
            // super(args) -> _THIS = Reflect.construct(Super, [args], new.target)
            Expression::Call(call) if matches!(*call.callee, Expression::Super) => {
                let mut elements = Vec::new();
                for arg in call.arguments.drain(..) {
                    match arg {
                        Argument::Expr(mut e) => {
                            self.expression(&mut e);
                            elements.push(ArrayElement::Expr(e));
                        }
                        Argument::Spread(mut e) => {
                            self.expression(&mut e);
                            elements.push(ArrayElement::Spread(e));
                        }
                    }
                }
                *expr = Expression::Assignment(AssignmentExpression {
                    op: AssignmentOp::Assign,
                    target: AssignmentTarget::Identifier("_THIS".into()),
                    value: Box::new(Expression::call(
                        Expression::member(Expression::ident("Reflect"), "construct"),
                        vec![
                            self.super_expr(),
                            Expression::Array(ArrayExpression { elements }),
                            Expression::NewTarget,
                        ],
                    )),
                });
                return;
            }
            // super.m(args) -> Super.prototype.m.call(this, args)
            Expression::Call(call) => {
                if let Expression::Member(member) = &mut *call.callee {
                    if matches!(*member.object, Expression::Super) {
                        let get_method = match &mut member.property {
                            MemberProperty::Identifier(name) => Expression::member(
                                Expression::member(self.super_expr(), "prototype"),
                                name.clone(),
                            ),
                            MemberProperty::Computed(key) => {
                                self.expression(key);
                                Expression::index(
                                    Expression::member(self.super_expr(), "prototype"),
                                    (**key).clone(),
                                )
                            }
                            MemberProperty::Private(_) => get_private_placeholder(),
                        };
                        let mut args = vec![Argument::Expr(Expression::This)];
                        for arg in call.arguments.drain(..) {
                            args.push(arg);
                        }
                        *expr = Expression::Call(CallExpression {
                            callee: Box::new(Expression::member(get_method, "call")),
                            arguments: args,
                        });
                        self.walk_children(expr);
                        return;
                    }
                    // o.#m(args) -> ((_o) => slot.get(_o).call(_o, args))(o)
                    if let MemberProperty::Private(pname) = &member.property {
                        let slot = match self.slot(pname) {
                            Ok(slot) => slot,
                            Err(_) => return,
                        };
                        let receiver = self.fresh("po");
                        let object = std::mem::replace(&mut *member.object, Expression::Null);
                        let mut args = vec![Argument::Expr(Expression::ident(receiver.clone()))];
                        args.extend(call.arguments.drain(..));
                        let body = Expression::Call(CallExpression {
                            callee: Box::new(Expression::member(
                                Expression::call(
                                    Expression::member(slot, "get"),
                                    vec![Expression::ident(receiver.clone())],
                                ),
                                "call",
                            )),
                            arguments: args,
                        });
                        *expr = iife(vec![(receiver, object)], body);
                        self.walk_children(expr);
                        return;
                    }
                }
            }
            // super.x / super[k]
            Expression::Member(member) if matches!(*member.object, Expression::Super) => {
                let key = match &mut member.property {
                    MemberProperty::Identifier(name) => Expression::str(name.clone()),
                    MemberProperty::Computed(k) => {
                        self.expression(k);
                        (**k).clone()
                    }
                    MemberProperty::Private(_) => {
                        *expr = get_private_placeholder();
                        return;
                    }
                };
                *expr = Expression::call(
                    Expression::member(Expression::ident("Reflect"), "get"),
                    vec![
                        Expression::member(self.super_expr(), "prototype"),
                        key,
                        Expression::This,
                    ],
                );
                return;
            }
            // o.#x -> slot.get(o)
            Expression::Member(member) => {
                if let MemberProperty::Private(pname) = &member.property {
                    let slot = match self.slot(pname) {
                        Ok(slot) => slot,
                        Err(_) => return,
                    };
                    let object = std::mem::replace(&mut *member.object, Expression::Null);
                    *expr = Expression::call(Expression::member(slot, "get"), vec![object]);
                    self.walk_children(expr);
                    return;
                }
            }
            Expression::Assignment(assign) => {
                // super.x = v
                if let AssignmentTarget::Member(member) = &mut assign.target {
                    if matches!(*member.object, Expression::Super) {
                        let key = match &mut member.property {
                            MemberProperty::Identifier(name) => Expression::str(name.clone()),
                            MemberProperty::Computed(k) => {
                                self.expression(k);
                                (**k).clone()
                            }
                            MemberProperty::Private(_) => {
                                *expr = get_private_placeholder();
                                return;
                            }
                        };
                        let mut value =
                            std::mem::replace(&mut *assign.value, Expression::Null);
                        self.expression(&mut value);
                        *expr = Expression::call(
                            Expression::member(Expression::ident("Reflect"), "set"),
                            vec![
                                Expression::member(self.super_expr(), "prototype"),
                                key,
                                value,
                                Expression::This,
                            ],
                        );
                        return;
                    }
                    // o.#x = v and compound forms
                    if let MemberProperty::Private(pname) = &member.property {
                        let slot = match self.slot(pname) {
                            Ok(slot) => slot,
                            Err(_) => return,
                        };
                        let receiver = self.fresh("po");
                        let incoming = self.fresh("pv");
                        let object = std::mem::replace(&mut *member.object, Expression::Null);
                        let mut value =
                            std::mem::replace(&mut *assign.value, Expression::Null);
                        self.expression(&mut value);

                        let stored = match assign.op.binary_op() {
                            None => Expression::ident(incoming.clone()),
                            Some(op) => Expression::Binary(BinaryExpression {
                                op,
                                left: Box::new(Expression::call(
                                    Expression::member(slot.clone(), "get"),
                                    vec![Expression::ident(receiver.clone())],
                                )),
                                right: Box::new(Expression::ident(incoming.clone())),
                            }),
                        };
                        let result = self.fresh("pr");
                        // ((_o, _v) => { const _r = <stored>; slot.set(_o, _r); return _r; })(o, v)
                        let body = BlockStatement::new(vec![
                            Statement::VariableDecl(VariableDecl::single(
                                VariableKind::Const,
                                result.clone(),
                                Some(stored),
                            )),
                            Statement::expr(Expression::call(
                                Expression::member(slot, "set"),
                                vec![
                                    Expression::ident(receiver.clone()),
                                    Expression::ident(result.clone()),
                                ],
                            )),
                            Statement::Return(ReturnStatement {
                                argument: Some(Expression::ident(result)),
                            }),
                        ]);
                        *expr = Expression::Call(CallExpression {
                            callee: Box::new(Expression::Arrow(ArrowFunction {
                                params: vec![
                                    Pattern::Identifier(receiver),
                                    Pattern::Identifier(incoming),
                                ],
                                body: ArrowBody::Block(body),
                                is_async: false,
                            })),
                            arguments: vec![Argument::Expr(object), Argument::Expr(value)],
                        });
                        self.walk_children(expr);
                        return;
                    }
                }
            }
            // ++o.#x / o.#x--
            Expression::Update(update) => {
                if let Expression::Member(member) = &mut *update.argument {
                    if let MemberProperty::Private(pname) = &member.property {
                        let slot = match self.slot(pname) {
                            Ok(slot) => slot,
                            Err(_) => return,
                        };
                        let receiver = self.fresh("po");
                        let object = std::mem::replace(&mut *member.object, Expression::Null);
                        let old = self.fresh("pt");
                        let new = self.fresh("pn");
                        let body = BlockStatement::new(vec![
                            Statement::VariableDecl(VariableDecl::single(
                                VariableKind::Const,
                                old.clone(),
                                Some(Expression::Unary(UnaryExpression {
                                    op: UnaryOp::Plus,
                                    argument: Box::new(Expression::call(
                                        Expression::member(slot.clone(), "get"),
                                        vec![Expression::ident(receiver.clone())],
                                    )),
                                })),
                            )),
                            Statement::VariableDecl(VariableDecl::single(
                                VariableKind::Const,
                                new.clone(),
                                Some(Expression::Binary(BinaryExpression {
                                    op: update.op.binary_op(),
                                    left: Box::new(Expression::ident(old.clone())),
                                    right: Box::new(Expression::num(1.0)),
                                })),
                            )),
                            Statement::expr(Expression::call(
                                Expression::member(slot, "set"),
                                vec![
                                    Expression::ident(receiver.clone()),
                                    Expression::ident(new.clone()),
                                ],
                            )),
                            Statement::Return(ReturnStatement {
                                argument: Some(Expression::ident(if update.prefix {
                                    new
                                } else {
                                    old
                                })),
                            }),
                        ]);
                        *expr = Expression::Call(CallExpression {
                            callee: Box::new(Expression::Arrow(ArrowFunction {
                                params: vec![Pattern::Identifier(receiver)],
                                body: ArrowBody::Block(body),
                                is_async: false,
                            })),
                            arguments: vec![Argument::Expr(object)],
                        });
                        self.walk_children(expr);
                        return;
                    }
                }
            }
            _ => {}
        }
        self.walk_children(expr);
    }

    fn walk_children(&mut self, expr: &mut Expression) {
        match expr {
            Expression::Template(tpl) => {
                for e in &mut tpl.expressions {
                    self.expression(e);
                }
            }
            Expression::Array(arr) => {
                for elem in &mut arr.elements {
                    match elem {
                        ArrayElement::Expr(e) | ArrayElement::Spread(e) => self.expression(e),
                        ArrayElement::Hole => {}
                    }
                }
            }
            Expression::Object(obj) => {
                for prop in &mut obj.properties {
                    match prop {
                        ObjectProperty::KeyValue { key, value } => {
                            if let PropertyKey::Computed(k) = key {
                                self.expression(k);
                            }
                            self.expression(value);
                        }
                        ObjectProperty::Method { key, function, .. } => {
                            if let PropertyKey::Computed(k) = key {
                                self.expression(k);
                            }
                            self.function(function);
                        }
                        ObjectProperty::Spread(e) => self.expression(e),
                        ObjectProperty::Shorthand(_) => {}
                    }
                }
            }
            Expression::Unary(e) => self.expression(&mut e.argument),
            Expression::Update(e) => self.expression(&mut e.argument),
            Expression::Binary(e) => {
                self.expression(&mut e.left);
                self.expression(&mut e.right);
            }
            Expression::Logical(e) => {
                self.expression(&mut e.left);
                self.expression(&mut e.right);
            }
            Expression::Assignment(e) => {
                if let AssignmentTarget::Member(member) = &mut e.target {
                    self.expression(&mut member.object);
                    if let MemberProperty::Computed(k) = &mut member.property {
                        self.expression(k);
                    }
                }
                self.expression(&mut e.value);
            }
            Expression::Conditional(e) => {
                self.expression(&mut e.test);
                self.expression(&mut e.consequent);
                self.expression(&mut e.alternate);
            }
            Expression::Call(e) => {
                self.expression(&mut e.callee);
                for arg in &mut e.arguments {
                    match arg {
                        Argument::Expr(a) | Argument::Spread(a) => self.expression(a),
                    }
                }
            }
            Expression::New(e) => {
                self.expression(&mut e.callee);
                for arg in &mut e.arguments {
                    match arg {
                        Argument::Expr(a) | Argument::Spread(a) => self.expression(a),
                    }
                }
            }
            Expression::Member(member) => {
                self.expression(&mut member.object);
                if let MemberProperty::Computed(k) = &mut member.property {
                    self.expression(k);
                }
            }
            Expression::Arrow(arrow) => {
                if let ArrowBody::Block(block) = &mut arrow.body {
                    self.block(block);
                }
            }
            Expression::Function(e) => self.function(&mut e.function),
            Expression::Await(e) => self.expression(e),
            Expression::Yield(e) => {
                if let Some(arg) = &mut e.argument {
                    self.expression(arg);
                }
            }
            Expression::Sequence(exprs) => {
                for e in exprs {
                    self.expression(e);
                }
            }
            _ => {}
        }
    }
}

/// Build `((p0, p1, ...) => body)(arg0, arg1, ...)`
fn iife(bindings: Vec<(String, Expression)>, body: Expression) -> Expression {
    let params = bindings
        .iter()
        .map(|(name, _)| Pattern::Identifier(name.clone()))
        .collect();
    let arguments = bindings
        .into_iter()
        .map(|(_, value)| Argument::Expr(value))
        .collect();
    Expression::Call(CallExpression {
        callee: Box::new(Expression::Arrow(ArrowFunction {
            params,
            body: ArrowBody::Block(BlockStatement::new(vec![Statement::Return(
                ReturnStatement {
                    argument: Some(body),
                },
            )])),
            is_async: false,
        })),
        arguments,
    })
}

/// Accessing a private member through `super` is a syntax error upstream;
/// keep the program well-formed if it slips through.
fn get_private_placeholder() -> Expression {
    Expression::Identifier("undefined".into())
}
