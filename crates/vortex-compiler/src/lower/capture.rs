//! Free-variable analysis
//!
//! Finds the identifiers a function references but does not bind itself.
//! The generator intersects the result with the enclosing scopes to decide
//! which names become explicit capture parameters. `this` is tracked
//! separately: arrows are transparent to it, ordinary functions reset it.

use rustc_hash::FxHashSet;
use vortex_ast::*;

#[derive(Debug, Default)]
pub struct FreeVars {
    /// Referenced-but-unbound identifiers, first-use order
    pub names: Vec<String>,
    /// Whether `this` is referenced lexically (through arrows only)
    pub uses_this: bool,
}

/// Scan a function body for free identifiers
pub fn free_variables(function: &Function) -> FreeVars {
    let mut scanner = Scanner::default();
    scanner.push_scope();
    for param in &function.params {
        scanner.bind_pattern(param);
    }
    scanner.bind_block_decls(&function.body);
    for stmt in &function.body.statements {
        scanner.statement(stmt, true);
    }
    scanner.pop_scope();
    FreeVars {
        names: scanner.free,
        uses_this: scanner.uses_this,
    }
}

#[derive(Default)]
struct Scanner {
    scopes: Vec<FxHashSet<String>>,
    free: Vec<String>,
    seen: FxHashSet<String>,
    uses_this: bool,
}

impl Scanner {
    fn push_scope(&mut self) {
        self.scopes.push(FxHashSet::default());
    }

    fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    fn bind(&mut self, name: &str) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string());
        }
    }

    fn bind_pattern(&mut self, pattern: &Pattern) {
        let mut names = Vec::new();
        pattern.bound_names(&mut names);
        for name in names {
            self.bind(name);
        }
    }

    /// Hoist the declarations a block introduces into the current scope
    fn bind_block_decls(&mut self, block: &BlockStatement) {
        for stmt in &block.statements {
            match stmt {
                Statement::VariableDecl(decl) => {
                    for d in &decl.declarations {
                        self.bind_pattern(&d.pattern);
                    }
                }
                Statement::FunctionDecl(decl) => self.bind(&decl.name),
                Statement::ClassDecl(decl) => self.bind(&decl.name),
                _ => {}
            }
        }
    }

    fn reference(&mut self, name: &str) {
        if self.scopes.iter().any(|scope| scope.contains(name)) {
            return;
        }
        if self.seen.insert(name.to_string()) {
            self.free.push(name.to_string());
        }
    }

    /// `this_transparent` is false once we cross into a non-arrow function
    fn statement(&mut self, stmt: &Statement, this_transparent: bool) {
        match stmt {
            Statement::VariableDecl(decl) => {
                for d in &decl.declarations {
                    self.pattern_defaults(&d.pattern, this_transparent);
                    if let Some(init) = &d.init {
                        self.expression(init, this_transparent);
                    }
                }
            }
            Statement::FunctionDecl(decl) => {
                self.function(&decl.function);
            }
            Statement::ClassDecl(decl) => self.class(&decl.class, this_transparent),
            Statement::Expression(s) => self.expression(&s.expression, this_transparent),
            Statement::If(s) => {
                self.expression(&s.test, this_transparent);
                self.statement(&s.consequent, this_transparent);
                if let Some(alt) = &s.alternate {
                    self.statement(alt, this_transparent);
                }
            }
            Statement::Switch(s) => {
                self.expression(&s.discriminant, this_transparent);
                self.push_scope();
                for case in &s.cases {
                    if let Some(test) = &case.test {
                        self.expression(test, this_transparent);
                    }
                    for inner in &case.body {
                        self.statement(inner, this_transparent);
                    }
                }
                self.pop_scope();
            }
            Statement::While(s) => {
                self.expression(&s.test, this_transparent);
                self.statement(&s.body, this_transparent);
            }
            Statement::DoWhile(s) => {
                self.statement(&s.body, this_transparent);
                self.expression(&s.test, this_transparent);
            }
            Statement::For(s) => {
                self.push_scope();
                match &s.init {
                    Some(ForInit::VariableDecl(decl)) => {
                        for d in &decl.declarations {
                            self.bind_pattern(&d.pattern);
                            if let Some(init) = &d.init {
                                self.expression(init, this_transparent);
                            }
                        }
                    }
                    Some(ForInit::Expression(e)) => self.expression(e, this_transparent),
                    None => {}
                }
                if let Some(test) = &s.test {
                    self.expression(test, this_transparent);
                }
                if let Some(update) = &s.update {
                    self.expression(update, this_transparent);
                }
                self.statement(&s.body, this_transparent);
                self.pop_scope();
            }
            Statement::ForIn(s) => self.for_head(&s.left, &s.right, &s.body, this_transparent),
            Statement::ForOf(s) => self.for_head(&s.left, &s.right, &s.body, this_transparent),
            Statement::Return(s) => {
                if let Some(arg) = &s.argument {
                    self.expression(arg, this_transparent);
                }
            }
            Statement::Throw(s) => self.expression(&s.argument, this_transparent),
            Statement::Try(s) => {
                self.block(&s.block, this_transparent);
                if let Some(handler) = &s.handler {
                    self.push_scope();
                    if let Some(param) = &handler.param {
                        self.bind_pattern(param);
                        self.pattern_defaults(param, this_transparent);
                    }
                    self.bind_block_decls(&handler.body);
                    for inner in &handler.body.statements {
                        self.statement(inner, this_transparent);
                    }
                    self.pop_scope();
                }
                if let Some(finalizer) = &s.finalizer {
                    self.block(finalizer, this_transparent);
                }
            }
            Statement::Labeled(s) => self.statement(&s.body, this_transparent),
            Statement::Block(block) => self.block(block, this_transparent),
            Statement::Export(ExportDecl::Declaration(inner)) => {
                self.statement(inner, this_transparent)
            }
            Statement::Export(ExportDecl::Default(expr)) => {
                self.expression(expr, this_transparent)
            }
            Statement::Break(_)
            | Statement::Continue(_)
            | Statement::Empty
            | Statement::Import(_)
            | Statement::Export(_) => {}
        }
    }

    fn for_head(
        &mut self,
        left: &ForTarget,
        right: &Expression,
        body: &Statement,
        this_transparent: bool,
    ) {
        self.push_scope();
        match left {
            ForTarget::Declaration(_, pattern) => {
                self.bind_pattern(pattern);
                self.pattern_defaults(pattern, this_transparent);
            }
            ForTarget::Pattern(pattern) => self.pattern_targets(pattern, this_transparent),
        }
        self.expression(right, this_transparent);
        self.statement(body, this_transparent);
        self.pop_scope();
    }

    fn block(&mut self, block: &BlockStatement, this_transparent: bool) {
        self.push_scope();
        self.bind_block_decls(block);
        for stmt in &block.statements {
            self.statement(stmt, this_transparent);
        }
        self.pop_scope();
    }

    /// Default values and computed keys inside a binding pattern are
    /// ordinary expressions.
    fn pattern_defaults(&mut self, pattern: &Pattern, this_transparent: bool) {
        match pattern {
            Pattern::Identifier(_) => {}
            Pattern::Array(arr) => {
                for elem in arr.elements.iter().flatten() {
                    self.pattern_defaults(elem, this_transparent);
                }
            }
            Pattern::Object(obj) => {
                for prop in &obj.properties {
                    if let PropertyKey::Computed(key) = &prop.key {
                        self.expression(key, this_transparent);
                    }
                    self.pattern_defaults(&prop.value, this_transparent);
                }
                if let Some(rest) = &obj.rest {
                    self.pattern_defaults(rest, this_transparent);
                }
            }
            Pattern::Assignment(assign) => {
                self.pattern_defaults(&assign.target, this_transparent);
                self.expression(&assign.default, this_transparent);
            }
            Pattern::Rest(inner) => self.pattern_defaults(inner, this_transparent),
            Pattern::Member(member) => self.member(member, this_transparent),
        }
    }

    /// A destructuring *assignment* pattern references its targets
    fn pattern_targets(&mut self, pattern: &Pattern, this_transparent: bool) {
        match pattern {
            Pattern::Identifier(name) => self.reference(name),
            Pattern::Array(arr) => {
                for elem in arr.elements.iter().flatten() {
                    self.pattern_targets(elem, this_transparent);
                }
            }
            Pattern::Object(obj) => {
                for prop in &obj.properties {
                    if let PropertyKey::Computed(key) = &prop.key {
                        self.expression(key, this_transparent);
                    }
                    self.pattern_targets(&prop.value, this_transparent);
                }
                if let Some(rest) = &obj.rest {
                    self.pattern_targets(rest, this_transparent);
                }
            }
            Pattern::Assignment(assign) => {
                self.pattern_targets(&assign.target, this_transparent);
                self.expression(&assign.default, this_transparent);
            }
            Pattern::Rest(inner) => self.pattern_targets(inner, this_transparent),
            Pattern::Member(member) => self.member(member, this_transparent),
        }
    }

    fn member(&mut self, member: &MemberExpression, this_transparent: bool) {
        self.expression(&member.object, this_transparent);
        if let MemberProperty::Computed(key) = &member.property {
            self.expression(key, this_transparent);
        }
    }

    /// A nested non-arrow function: its own frees propagate, `this` resets
    fn function(&mut self, function: &Function) {
        let inner = free_variables(function);
        for name in inner.names {
            self.reference(&name);
        }
    }

    fn class(&mut self, class: &Class, this_transparent: bool) {
        if let Some(sup) = &class.super_class {
            self.expression(sup, this_transparent);
        }
        for member in &class.members {
            match member {
                ClassMember::Constructor(function) => self.function(function),
                ClassMember::Method(method) => {
                    if let PropertyKey::Computed(key) = &method.key {
                        self.expression(key, this_transparent);
                    }
                    self.function(&method.function);
                }
                ClassMember::Field(field) => {
                    if let PropertyKey::Computed(key) = &field.key {
                        self.expression(key, this_transparent);
                    }
                    // Field initializers run with the instance as `this`,
                    // never the enclosing one.
                    if let Some(value) = &field.value {
                        let saved = self.uses_this;
                        self.expression(value, false);
                        self.uses_this = saved;
                    }
                }
            }
        }
    }

    fn expression(&mut self, expr: &Expression, this_transparent: bool) {
        match expr {
            Expression::Identifier(name) => self.reference(name),
            Expression::This => {
                if this_transparent {
                    self.uses_this = true;
                }
            }
            Expression::Number(_)
            | Expression::String(_)
            | Expression::Boolean(_)
            | Expression::Null
            | Expression::Super
            | Expression::NewTarget => {}
            Expression::Template(tpl) => {
                for e in &tpl.expressions {
                    self.expression(e, this_transparent);
                }
            }
            Expression::Array(arr) => {
                for elem in &arr.elements {
                    match elem {
                        ArrayElement::Expr(e) | ArrayElement::Spread(e) => {
                            self.expression(e, this_transparent)
                        }
                        ArrayElement::Hole => {}
                    }
                }
            }
            Expression::Object(obj) => {
                for prop in &obj.properties {
                    match prop {
                        ObjectProperty::KeyValue { key, value } => {
                            if let PropertyKey::Computed(k) = key {
                                self.expression(k, this_transparent);
                            }
                            self.expression(value, this_transparent);
                        }
                        ObjectProperty::Shorthand(name) => self.reference(name),
                        ObjectProperty::Method { key, function, .. } => {
                            if let PropertyKey::Computed(k) = key {
                                self.expression(k, this_transparent);
                            }
                            self.function(function);
                        }
                        ObjectProperty::Spread(e) => self.expression(e, this_transparent),
                    }
                }
            }
            Expression::Unary(e) => self.expression(&e.argument, this_transparent),
            Expression::Update(e) => self.expression(&e.argument, this_transparent),
            Expression::Binary(e) => {
                self.expression(&e.left, this_transparent);
                self.expression(&e.right, this_transparent);
            }
            Expression::Logical(e) => {
                self.expression(&e.left, this_transparent);
                self.expression(&e.right, this_transparent);
            }
            Expression::Assignment(e) => {
                match &e.target {
                    AssignmentTarget::Identifier(name) => self.reference(name),
                    AssignmentTarget::Member(member) => self.member(member, this_transparent),
                    AssignmentTarget::Pattern(pattern) => {
                        self.pattern_targets(pattern, this_transparent)
                    }
                }
                self.expression(&e.value, this_transparent);
            }
            Expression::Conditional(e) => {
                self.expression(&e.test, this_transparent);
                self.expression(&e.consequent, this_transparent);
                self.expression(&e.alternate, this_transparent);
            }
            Expression::Call(e) => {
                self.expression(&e.callee, this_transparent);
                self.arguments(&e.arguments, this_transparent);
            }
            Expression::New(e) => {
                self.expression(&e.callee, this_transparent);
                self.arguments(&e.arguments, this_transparent);
            }
            Expression::Member(member) => self.member(member, this_transparent),
            Expression::Arrow(arrow) => {
                // Arrows are this-transparent and see the enclosing scope,
                // so scan in place with their params bound.
                self.push_scope();
                for param in &arrow.params {
                    self.bind_pattern(param);
                    self.pattern_defaults(param, this_transparent);
                }
                match &arrow.body {
                    ArrowBody::Expression(body) => self.expression(body, this_transparent),
                    ArrowBody::Block(block) => {
                        self.bind_block_decls(block);
                        for stmt in &block.statements {
                            self.statement(stmt, this_transparent);
                        }
                    }
                }
                self.pop_scope();
            }
            Expression::Function(e) => {
                if let Some(name) = &e.name {
                    // A named function expression can reference itself.
                    self.push_scope();
                    self.bind(name);
                    self.function(&e.function);
                    self.pop_scope();
                } else {
                    self.function(&e.function);
                }
            }
            Expression::Class(e) => self.class(&e.class, this_transparent),
            Expression::Await(e) => self.expression(e, this_transparent),
            Expression::Yield(e) => {
                if let Some(arg) = &e.argument {
                    self.expression(arg, this_transparent);
                }
            }
            Expression::Sequence(exprs) => {
                for e in exprs {
                    self.expression(e, this_transparent);
                }
            }
        }
    }

    fn arguments(&mut self, args: &[Argument], this_transparent: bool) {
        for arg in args {
            match arg {
                Argument::Expr(e) | Argument::Spread(e) => self.expression(e, this_transparent),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn func(params: Vec<Pattern>, statements: Vec<Statement>) -> Function {
        Function::new(params, BlockStatement::new(statements))
    }

    #[test]
    fn test_params_and_locals_are_bound() {
        let f = func(
            vec![Pattern::Identifier("a".into())],
            vec![
                Statement::VariableDecl(VariableDecl::single(
                    VariableKind::Let,
                    "b",
                    Some(Expression::ident("a")),
                )),
                Statement::expr(Expression::call(
                    Expression::ident("g"),
                    vec![Expression::ident("b"), Expression::ident("c")],
                )),
            ],
        );
        let free = free_variables(&f);
        assert_eq!(free.names, vec!["g", "c"]);
    }

    #[test]
    fn test_nested_function_frees_propagate() {
        // function outer() { function inner() { return x; } }
        let inner = Statement::FunctionDecl(FunctionDecl {
            name: "inner".into(),
            function: func(
                vec![],
                vec![Statement::Return(ReturnStatement {
                    argument: Some(Expression::ident("x")),
                })],
            ),
        });
        let outer = func(vec![], vec![inner]);
        let free = free_variables(&outer);
        assert_eq!(free.names, vec!["x"]);
    }

    #[test]
    fn test_shadowing_blocks_capture() {
        let inner = Statement::FunctionDecl(FunctionDecl {
            name: "inner".into(),
            function: func(
                vec![Pattern::Identifier("x".into())],
                vec![Statement::Return(ReturnStatement {
                    argument: Some(Expression::ident("x")),
                })],
            ),
        });
        let outer = func(vec![], vec![inner]);
        assert!(free_variables(&outer).names.is_empty());
    }

    #[test]
    fn test_this_through_arrow_only() {
        // () => this  inside f  => uses_this
        let arrow = Expression::Arrow(ArrowFunction {
            params: vec![],
            body: ArrowBody::Expression(Box::new(Expression::This)),
            is_async: false,
        });
        let f = func(vec![], vec![Statement::expr(arrow)]);
        assert!(free_variables(&f).uses_this);

        // function g() { return this; } inside f => not lexical
        let g = Statement::FunctionDecl(FunctionDecl {
            name: "g".into(),
            function: func(
                vec![],
                vec![Statement::Return(ReturnStatement {
                    argument: Some(Expression::This),
                })],
            ),
        });
        let f = func(vec![], vec![g]);
        assert!(!free_variables(&f).uses_this);
    }

    #[test]
    fn test_named_function_expression_self_reference() {
        let e = Expression::Function(FunctionExpression {
            name: Some("me".into()),
            function: func(
                vec![],
                vec![Statement::expr(Expression::call(
                    Expression::ident("me"),
                    vec![],
                ))],
            ),
        });
        let f = func(vec![], vec![Statement::expr(e)]);
        assert!(free_variables(&f).names.is_empty());
    }
}
