//! Pre-lowering AST rewrites
//!
//! Rewrites constructs the state generator does not lower directly into
//! equivalent forms it does:
//! - `for-of` becomes an iterator-protocol loop with a try/finally that
//!   calls `iterator.return()` on early termination (awaited variants in
//!   async position)
//! - `for-in` becomes an index loop over `Object.keys`
//! - parameter defaults, patterns and complex rest targets move into the
//!   function body as a prelude
//! - arrow expression bodies become block bodies
//!
//! Everything runs before string collection so synthesized literals land
//! in the pool.

use vortex_ast::*;

#[derive(Default)]
pub struct Desugarer {
    counter: usize,
}

impl Desugarer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn run(&mut self, program: &mut Program) {
        for stmt in &mut program.body {
            self.statement(stmt);
        }
    }

    /// Desugar a single function in place (partial-mode opt-ins)
    pub fn run_function(&mut self, function: &mut Function) {
        self.function(function);
    }

    fn fresh(&mut self, base: &str) -> String {
        let name = format!("_{}${}", base, self.counter);
        self.counter += 1;
        name
    }

    fn statement(&mut self, stmt: &mut Statement) {
        match stmt {
            Statement::ForOf(_) => {
                let Statement::ForOf(for_of) = std::mem::replace(stmt, Statement::Empty) else {
                    unreachable!()
                };
                *stmt = self.lower_for_of(for_of);
            }
            Statement::ForIn(_) => {
                let Statement::ForIn(for_in) = std::mem::replace(stmt, Statement::Empty) else {
                    unreachable!()
                };
                *stmt = self.lower_for_in(for_in);
            }
            Statement::VariableDecl(decl) => {
                for d in &mut decl.declarations {
                    self.pattern(&mut d.pattern);
                    if let Some(init) = &mut d.init {
                        self.expression(init);
                    }
                }
            }
            Statement::FunctionDecl(decl) => self.function(&mut decl.function),
            Statement::ClassDecl(decl) => self.class(&mut decl.class),
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
                            self.pattern(&mut d.pattern);
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
                    if let Some(param) = &mut handler.param {
                        self.pattern(param);
                    }
                    self.block(&mut handler.body);
                }
                if let Some(finalizer) = &mut s.finalizer {
                    self.block(finalizer);
                }
            }
            Statement::Labeled(s) => self.statement(&mut s.body),
            Statement::Block(block) => self.block(block),
            Statement::Export(ExportDecl::Declaration(inner)) => self.statement(inner),
            Statement::Export(ExportDecl::Default(expr)) => self.expression(expr),
            _ => {}
        }
    }

    fn block(&mut self, block: &mut BlockStatement) {
        for stmt in &mut block.statements {
            self.statement(stmt);
        }
    }

    fn class(&mut self, class: &mut Class) {
        if let Some(sup) = &mut class.super_class {
            self.expression(sup);
        }
        for member in &mut class.members {
            match member {
                ClassMember::Constructor(function) => self.function(function),
                ClassMember::Method(method) => {
                    if let PropertyKey::Computed(key) = &mut method.key {
                        self.expression(key);
                    }
                    self.function(&mut method.function);
                }
                ClassMember::Field(field) => {
                    if let PropertyKey::Computed(key) = &mut field.key {
                        self.expression(key);
                    }
                    if let Some(value) = &mut field.value {
                        self.expression(value);
                    }
                }
            }
        }
    }

    fn expression(&mut self, expr: &mut Expression) {
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
                match &mut e.target {
                    AssignmentTarget::Member(member) => self.member(member),
                    AssignmentTarget::Pattern(pattern) => self.pattern(pattern),
                    AssignmentTarget::Identifier(_) => {}
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
                self.arguments(&mut e.arguments);
            }
            Expression::New(e) => {
                self.expression(&mut e.callee);
                self.arguments(&mut e.arguments);
            }
            Expression::Member(member) => self.member(member),
            Expression::Arrow(arrow) => {
                if let ArrowBody::Expression(body) = &mut arrow.body {
                    let body = std::mem::replace(&mut **body, Expression::Null);
                    arrow.body = ArrowBody::Block(BlockStatement::new(vec![Statement::Return(
                        ReturnStatement {
                            argument: Some(body),
                        },
                    )]));
                }
                let mut prelude = Vec::new();
                self.params(&mut arrow.params, &mut prelude);
                if let ArrowBody::Block(block) = &mut arrow.body {
                    self.block(block);
                    if !prelude.is_empty() {
                        prelude.append(&mut block.statements);
                        block.statements = prelude;
                    }
                }
            }
            Expression::Function(e) => self.function(&mut e.function),
            Expression::Class(e) => self.class(&mut e.class),
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

    fn member(&mut self, member: &mut MemberExpression) {
        self.expression(&mut member.object);
        if let MemberProperty::Computed(key) = &mut member.property {
            self.expression(key);
        }
    }

    fn arguments(&mut self, args: &mut [Argument]) {
        for arg in args {
            match arg {
                Argument::Expr(e) | Argument::Spread(e) => self.expression(e),
            }
        }
    }

    fn pattern(&mut self, pattern: &mut Pattern) {
        match pattern {
            Pattern::Array(arr) => {
                for elem in arr.elements.iter_mut().flatten() {
                    self.pattern(elem);
                }
            }
            Pattern::Object(obj) => {
                for prop in &mut obj.properties {
                    if let PropertyKey::Computed(key) = &mut prop.key {
                        self.expression(key);
                    }
                    self.pattern(&mut prop.value);
                }
                if let Some(rest) = &mut obj.rest {
                    self.pattern(rest);
                }
            }
            Pattern::Assignment(assign) => {
                self.pattern(&mut assign.target);
                self.expression(&mut assign.default);
            }
            Pattern::Rest(inner) => self.pattern(inner),
            Pattern::Member(member) => self.member(member),
            Pattern::Identifier(_) => {}
        }
    }

    fn function(&mut self, function: &mut Function) {
        let mut prelude = Vec::new();
        self.params(&mut function.params, &mut prelude);
        self.block(&mut function.body);
        if !prelude.is_empty() {
            prelude.append(&mut function.body.statements);
            function.body.statements = prelude;
        }
    }

    /// Flatten parameters to plain identifiers (plus at most one trailing
    /// rest identifier), pushing defaults and destructuring into `prelude`.
    fn params(&mut self, params: &mut [Pattern], prelude: &mut Vec<Statement>) {
        for param in params.iter_mut() {
            self.pattern(param);
            match param {
                Pattern::Identifier(_) => {}
                Pattern::Rest(inner) => {
                    if !matches!(**inner, Pattern::Identifier(_)) {
                        let slot = self.fresh("arg");
                        let target = std::mem::replace(&mut **inner, Pattern::Identifier(slot.clone()));
                        prelude.push(Statement::VariableDecl(VariableDecl {
                            kind: VariableKind::Let,
                            declarations: vec![VariableDeclarator {
                                pattern: target,
                                init: Some(Expression::ident(slot)),
                            }],
                        }));
                    }
                }
                Pattern::Assignment(assign) => {
                    // `p = d` keeps its name; complex targets go through a
                    // synthesized slot.
                    let slot = match assign.target.as_identifier() {
                        Some(name) => name.to_string(),
                        None => self.fresh("arg"),
                    };
                    let default = std::mem::replace(&mut *assign.default, Expression::Null);
                    // slot = slot === void 0 ? default : slot;
                    prelude.push(Statement::expr(Expression::Assignment(
                        AssignmentExpression {
                            op: AssignmentOp::Assign,
                            target: AssignmentTarget::Identifier(slot.clone()),
                            value: Box::new(Expression::Conditional(ConditionalExpression {
                                test: Box::new(Expression::Binary(BinaryExpression {
                                    op: BinaryOp::StrictEqual,
                                    left: Box::new(Expression::ident(slot.clone())),
                                    right: Box::new(Expression::Unary(UnaryExpression {
                                        op: UnaryOp::Void,
                                        argument: Box::new(Expression::num(0.0)),
                                    })),
                                })),
                                consequent: Box::new(default),
                                alternate: Box::new(Expression::ident(slot.clone())),
                            })),
                        },
                    )));
                    let target = std::mem::replace(&mut *assign.target, Pattern::Identifier(slot.clone()));
                    if target.as_identifier().is_none() {
                        prelude.push(Statement::VariableDecl(VariableDecl {
                            kind: VariableKind::Let,
                            declarations: vec![VariableDeclarator {
                                pattern: target,
                                init: Some(Expression::ident(slot.clone())),
                            }],
                        }));
                    }
                    *param = Pattern::Identifier(slot);
                }
                _ => {
                    let slot = self.fresh("arg");
                    let target = std::mem::replace(param, Pattern::Identifier(slot.clone()));
                    prelude.push(Statement::VariableDecl(VariableDecl {
                        kind: VariableKind::Let,
                        declarations: vec![VariableDeclarator {
                            pattern: target,
                            init: Some(Expression::ident(slot)),
                        }],
                    }));
                }
            }
        }
    }

    /// Bind a loop target from a value expression
    fn bind_target(&mut self, target: ForTarget, value: Expression) -> Statement {
        match target {
            ForTarget::Declaration(kind, pattern) => Statement::VariableDecl(VariableDecl {
                kind,
                declarations: vec![VariableDeclarator {
                    pattern,
                    init: Some(value),
                }],
            }),
            ForTarget::Pattern(pattern) => {
                let target = match pattern {
                    Pattern::Identifier(name) => AssignmentTarget::Identifier(name),
                    Pattern::Member(member) => AssignmentTarget::Member(member),
                    other => AssignmentTarget::Pattern(other),
                };
                Statement::expr(Expression::Assignment(AssignmentExpression {
                    op: AssignmentOp::Assign,
                    target,
                    value: Box::new(value),
                }))
            }
        }
    }

    fn lower_for_of(&mut self, for_of: ForOfStatement) -> Statement {
        let src = self.fresh("src");
        let iter = self.fresh("iter");
        let step = self.fresh("step");
        let done = self.fresh("done");
        let is_await = for_of.is_await;

        let symbol_method = |name: &str| {
            // src[Symbol.<name>]
            Expression::index(
                Expression::ident(src.clone()),
                Expression::member(Expression::ident("Symbol"), name),
            )
        };

        let mut setup = vec![Statement::VariableDecl(VariableDecl::single(
            VariableKind::Const,
            src.clone(),
            Some(for_of.right),
        ))];

        if is_await {
            // const _m = src[Symbol.asyncIterator] || src[Symbol.iterator];
            // const _iter = _m.call(src);
            let method = self.fresh("m");
            setup.push(Statement::VariableDecl(VariableDecl::single(
                VariableKind::Const,
                method.clone(),
                Some(Expression::Logical(LogicalExpression {
                    op: LogicalOp::Or,
                    left: Box::new(symbol_method("asyncIterator")),
                    right: Box::new(symbol_method("iterator")),
                })),
            )));
            setup.push(Statement::VariableDecl(VariableDecl::single(
                VariableKind::Const,
                iter.clone(),
                Some(Expression::call(
                    Expression::member(Expression::ident(method), "call"),
                    vec![Expression::ident(src.clone())],
                )),
            )));
        } else {
            setup.push(Statement::VariableDecl(VariableDecl::single(
                VariableKind::Const,
                iter.clone(),
                Some(Expression::call(symbol_method("iterator"), vec![])),
            )));
        }

        setup.push(Statement::VariableDecl(VariableDecl::single(
            VariableKind::Let,
            done.clone(),
            Some(Expression::Boolean(false)),
        )));

        let maybe_await = |e: Expression| {
            if is_await {
                Expression::Await(Box::new(e))
            } else {
                e
            }
        };

        // let _step = [await] _iter.next();
        let next_call = maybe_await(Expression::call(
            Expression::member(Expression::ident(iter.clone()), "next"),
            vec![],
        ));
        let loop_body = vec![
            Statement::VariableDecl(VariableDecl::single(
                VariableKind::Const,
                step.clone(),
                Some(next_call),
            )),
            // if (_step.done) { _done = true; break; }
            Statement::If(IfStatement {
                test: Expression::member(Expression::ident(step.clone()), "done"),
                consequent: Box::new(Statement::Block(BlockStatement::new(vec![
                    Statement::expr(Expression::Assignment(AssignmentExpression {
                        op: AssignmentOp::Assign,
                        target: AssignmentTarget::Identifier(done.clone()),
                        value: Box::new(Expression::Boolean(true)),
                    })),
                    Statement::Break(BreakStatement { label: None }),
                ]))),
                alternate: None,
            }),
            self.bind_target(
                for_of.left,
                Expression::member(Expression::ident(step.clone()), "value"),
            ),
            *for_of.body,
        ];

        let loop_stmt = Statement::While(WhileStatement {
            test: Expression::Boolean(true),
            body: Box::new(Statement::Block(BlockStatement::new(loop_body))),
        });

        // finally { if (!_done && _iter.return) [await] _iter.return(); }
        let return_fn = Expression::member(Expression::ident(iter.clone()), "return");
        let cleanup = Statement::If(IfStatement {
            test: Expression::Logical(LogicalExpression {
                op: LogicalOp::And,
                left: Box::new(Expression::Unary(UnaryExpression {
                    op: UnaryOp::Not,
                    argument: Box::new(Expression::ident(done.clone())),
                })),
                right: Box::new(return_fn.clone()),
            }),
            consequent: Box::new(Statement::expr(maybe_await(Expression::call(
                Expression::member(Expression::ident(iter.clone()), "return"),
                vec![],
            )))),
            alternate: None,
        });

        setup.push(Statement::Try(TryStatement {
            block: BlockStatement::new(vec![loop_stmt]),
            handler: None,
            finalizer: Some(BlockStatement::new(vec![cleanup])),
        }));

        let mut result = Statement::Block(BlockStatement::new(setup));
        self.statement(&mut result);
        result
    }

    fn lower_for_in(&mut self, for_in: ForInStatement) -> Statement {
        let keys = self.fresh("keys");
        let idx = self.fresh("i");

        let body = vec![
            self.bind_target(
                for_in.left,
                Expression::index(
                    Expression::ident(keys.clone()),
                    Expression::ident(idx.clone()),
                ),
            ),
            // _i = _i + 1;
            Statement::expr(Expression::Assignment(AssignmentExpression {
                op: AssignmentOp::Assign,
                target: AssignmentTarget::Identifier(idx.clone()),
                value: Box::new(Expression::Binary(BinaryExpression {
                    op: BinaryOp::Add,
                    left: Box::new(Expression::ident(idx.clone())),
                    right: Box::new(Expression::num(1.0)),
                })),
            })),
            *for_in.body,
        ];

        let mut result = Statement::Block(BlockStatement::new(vec![
            // const _keys = Object.keys(<right>);
            Statement::VariableDecl(VariableDecl::single(
                VariableKind::Const,
                keys.clone(),
                Some(Expression::call(
                    Expression::member(Expression::ident("Object"), "keys"),
                    vec![for_in.right],
                )),
            )),
            Statement::VariableDecl(VariableDecl::single(
                VariableKind::Let,
                idx.clone(),
                Some(Expression::num(0.0)),
            )),
            Statement::While(WhileStatement {
                test: Expression::Binary(BinaryExpression {
                    op: BinaryOp::Less,
                    left: Box::new(Expression::ident(idx)),
                    right: Box::new(Expression::member(Expression::ident(keys), "length")),
                }),
                body: Box::new(Statement::Block(BlockStatement::new(body))),
            }),
        ]));
        self.statement(&mut result);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desugar(mut program: Program) -> Program {
        Desugarer::new().run(&mut program);
        program
    }

    #[test]
    fn test_for_of_becomes_iterator_loop() {
        let program = desugar(Program::new(vec![Statement::ForOf(ForOfStatement {
            left: ForTarget::Declaration(VariableKind::Const, Pattern::Identifier("x".into())),
            right: Expression::ident("xs"),
            body: Box::new(Statement::Empty),
            is_await: false,
        })]));
        let Statement::Block(block) = &program.body[0] else {
            panic!("expected block");
        };
        // setup: src, iter, done flag, then try/finally
        assert!(matches!(block.statements[0], Statement::VariableDecl(_)));
        let has_try = block
            .statements
            .iter()
            .any(|s| matches!(s, Statement::Try(t) if t.finalizer.is_some()));
        assert!(has_try, "cleanup try/finally missing");
    }

    #[test]
    fn test_for_await_uses_async_iterator_fallback() {
        let program = desugar(Program::new(vec![Statement::ForOf(ForOfStatement {
            left: ForTarget::Declaration(VariableKind::Const, Pattern::Identifier("x".into())),
            right: Expression::ident("xs"),
            body: Box::new(Statement::Empty),
            is_await: true,
        })]));
        let text = print_program(&program);
        assert!(text.contains("Symbol.asyncIterator"));
        assert!(text.contains("await"));
    }

    #[test]
    fn test_for_in_uses_object_keys() {
        let program = desugar(Program::new(vec![Statement::ForIn(ForInStatement {
            left: ForTarget::Declaration(VariableKind::Const, Pattern::Identifier("k".into())),
            right: Expression::ident("o"),
            body: Box::new(Statement::Empty),
        })]));
        let text = print_program(&program);
        assert!(text.contains("Object.keys(o)"));
        assert!(text.contains("while"));
    }

    #[test]
    fn test_default_param_moves_to_prelude() {
        let program = desugar(Program::new(vec![Statement::FunctionDecl(FunctionDecl {
            name: "f".into(),
            function: Function::new(
                vec![Pattern::Assignment(AssignmentPattern {
                    target: Box::new(Pattern::Identifier("a".into())),
                    default: Box::new(Expression::num(1.0)),
                })],
                BlockStatement::default(),
            ),
        })]));
        let Statement::FunctionDecl(decl) = &program.body[0] else {
            panic!();
        };
        assert_eq!(decl.function.params[0].as_identifier(), Some("a"));
        let text = print_program(&program);
        assert!(text.contains("a = a === void 0 ? 1 : a;"));
    }

    #[test]
    fn test_pattern_param_gets_slot() {
        let program = desugar(Program::new(vec![Statement::FunctionDecl(FunctionDecl {
            name: "f".into(),
            function: Function::new(
                vec![Pattern::Array(ArrayPattern {
                    elements: vec![Some(Pattern::Identifier("a".into()))],
                })],
                BlockStatement::default(),
            ),
        })]));
        let Statement::FunctionDecl(decl) = &program.body[0] else {
            panic!();
        };
        let slot = decl.function.params[0].as_identifier().unwrap();
        assert!(slot.starts_with("_arg$"));
        assert!(!decl.function.body.statements.is_empty());
    }

    #[test]
    fn test_arrow_expression_body_becomes_block() {
        let program = desugar(Program::new(vec![Statement::expr(Expression::Arrow(
            ArrowFunction {
                params: vec![Pattern::Identifier("x".into())],
                body: ArrowBody::Expression(Box::new(Expression::ident("x"))),
                is_async: false,
            },
        ))]));
        let Statement::Expression(s) = &program.body[0] else {
            panic!();
        };
        let Expression::Arrow(arrow) = &s.expression else {
            panic!();
        };
        assert!(matches!(arrow.body, ArrowBody::Block(_)));
    }
}
