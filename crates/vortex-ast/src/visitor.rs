//! AST visitor for read-only traversal
//!
//! Each visit method has a default implementation that calls the
//! corresponding walk function, so implementors only override the nodes
//! they care about and still see the whole tree.

use super::*;

/// AST visitor trait
pub trait Visitor: Sized {
    fn visit_program(&mut self, program: &Program) {
        walk_program(self, program);
    }

    fn visit_statement(&mut self, stmt: &Statement) {
        walk_statement(self, stmt);
    }

    fn visit_expression(&mut self, expr: &Expression) {
        walk_expression(self, expr);
    }

    fn visit_pattern(&mut self, pattern: &Pattern) {
        walk_pattern(self, pattern);
    }

    fn visit_property_key(&mut self, key: &PropertyKey) {
        walk_property_key(self, key);
    }

    fn visit_function(&mut self, function: &Function) {
        walk_function(self, function);
    }

    fn visit_class(&mut self, class: &Class) {
        walk_class(self, class);
    }
}

pub fn walk_program<V: Visitor>(v: &mut V, program: &Program) {
    for stmt in &program.body {
        v.visit_statement(stmt);
    }
}

pub fn walk_statement<V: Visitor>(v: &mut V, stmt: &Statement) {
    match stmt {
        Statement::VariableDecl(decl) => {
            for d in &decl.declarations {
                v.visit_pattern(&d.pattern);
                if let Some(init) = &d.init {
                    v.visit_expression(init);
                }
            }
        }
        Statement::FunctionDecl(decl) => v.visit_function(&decl.function),
        Statement::ClassDecl(decl) => v.visit_class(&decl.class),
        Statement::Expression(stmt) => v.visit_expression(&stmt.expression),
        Statement::If(stmt) => {
            v.visit_expression(&stmt.test);
            v.visit_statement(&stmt.consequent);
            if let Some(alt) = &stmt.alternate {
                v.visit_statement(alt);
            }
        }
        Statement::Switch(stmt) => {
            v.visit_expression(&stmt.discriminant);
            for case in &stmt.cases {
                if let Some(test) = &case.test {
                    v.visit_expression(test);
                }
                for s in &case.body {
                    v.visit_statement(s);
                }
            }
        }
        Statement::While(stmt) => {
            v.visit_expression(&stmt.test);
            v.visit_statement(&stmt.body);
        }
        Statement::DoWhile(stmt) => {
            v.visit_statement(&stmt.body);
            v.visit_expression(&stmt.test);
        }
        Statement::For(stmt) => {
            match &stmt.init {
                Some(ForInit::VariableDecl(decl)) => {
                    for d in &decl.declarations {
                        v.visit_pattern(&d.pattern);
                        if let Some(init) = &d.init {
                            v.visit_expression(init);
                        }
                    }
                }
                Some(ForInit::Expression(expr)) => v.visit_expression(expr),
                None => {}
            }
            if let Some(test) = &stmt.test {
                v.visit_expression(test);
            }
            if let Some(update) = &stmt.update {
                v.visit_expression(update);
            }
            v.visit_statement(&stmt.body);
        }
        Statement::ForIn(stmt) => {
            walk_for_target(v, &stmt.left);
            v.visit_expression(&stmt.right);
            v.visit_statement(&stmt.body);
        }
        Statement::ForOf(stmt) => {
            walk_for_target(v, &stmt.left);
            v.visit_expression(&stmt.right);
            v.visit_statement(&stmt.body);
        }
        Statement::Break(_) | Statement::Continue(_) | Statement::Empty => {}
        Statement::Return(stmt) => {
            if let Some(arg) = &stmt.argument {
                v.visit_expression(arg);
            }
        }
        Statement::Throw(stmt) => v.visit_expression(&stmt.argument),
        Statement::Try(stmt) => {
            for s in &stmt.block.statements {
                v.visit_statement(s);
            }
            if let Some(handler) = &stmt.handler {
                if let Some(param) = &handler.param {
                    v.visit_pattern(param);
                }
                for s in &handler.body.statements {
                    v.visit_statement(s);
                }
            }
            if let Some(finalizer) = &stmt.finalizer {
                for s in &finalizer.statements {
                    v.visit_statement(s);
                }
            }
        }
        Statement::Labeled(stmt) => v.visit_statement(&stmt.body),
        Statement::Block(block) => {
            for s in &block.statements {
                v.visit_statement(s);
            }
        }
        Statement::Import(_) => {}
        Statement::Export(decl) => match decl {
            ExportDecl::Declaration(inner) => v.visit_statement(inner),
            ExportDecl::Default(expr) => v.visit_expression(expr),
            ExportDecl::Named { .. } | ExportDecl::All { .. } => {}
        },
    }
}

fn walk_for_target<V: Visitor>(v: &mut V, target: &ForTarget) {
    match target {
        ForTarget::Declaration(_, pattern) | ForTarget::Pattern(pattern) => {
            v.visit_pattern(pattern)
        }
    }
}

pub fn walk_expression<V: Visitor>(v: &mut V, expr: &Expression) {
    match expr {
        Expression::Number(_)
        | Expression::String(_)
        | Expression::Boolean(_)
        | Expression::Null
        | Expression::Identifier(_)
        | Expression::This
        | Expression::Super
        | Expression::NewTarget => {}
        Expression::Template(tpl) => {
            for e in &tpl.expressions {
                v.visit_expression(e);
            }
        }
        Expression::Array(arr) => {
            for elem in &arr.elements {
                match elem {
                    ArrayElement::Expr(e) | ArrayElement::Spread(e) => v.visit_expression(e),
                    ArrayElement::Hole => {}
                }
            }
        }
        Expression::Object(obj) => {
            for prop in &obj.properties {
                match prop {
                    ObjectProperty::KeyValue { key, value } => {
                        v.visit_property_key(key);
                        v.visit_expression(value);
                    }
                    ObjectProperty::Shorthand(_) => {}
                    ObjectProperty::Method { key, function, .. } => {
                        v.visit_property_key(key);
                        v.visit_function(function);
                    }
                    ObjectProperty::Spread(e) => v.visit_expression(e),
                }
            }
        }
        Expression::Unary(e) => v.visit_expression(&e.argument),
        Expression::Update(e) => v.visit_expression(&e.argument),
        Expression::Binary(e) => {
            v.visit_expression(&e.left);
            v.visit_expression(&e.right);
        }
        Expression::Logical(e) => {
            v.visit_expression(&e.left);
            v.visit_expression(&e.right);
        }
        Expression::Assignment(e) => {
            match &e.target {
                AssignmentTarget::Identifier(_) => {}
                AssignmentTarget::Member(m) => walk_member(v, m),
                AssignmentTarget::Pattern(p) => v.visit_pattern(p),
            }
            v.visit_expression(&e.value);
        }
        Expression::Conditional(e) => {
            v.visit_expression(&e.test);
            v.visit_expression(&e.consequent);
            v.visit_expression(&e.alternate);
        }
        Expression::Call(e) => {
            v.visit_expression(&e.callee);
            walk_arguments(v, &e.arguments);
        }
        Expression::New(e) => {
            v.visit_expression(&e.callee);
            walk_arguments(v, &e.arguments);
        }
        Expression::Member(e) => walk_member(v, e),
        Expression::Arrow(e) => {
            for p in &e.params {
                v.visit_pattern(p);
            }
            match &e.body {
                ArrowBody::Expression(expr) => v.visit_expression(expr),
                ArrowBody::Block(block) => {
                    for s in &block.statements {
                        v.visit_statement(s);
                    }
                }
            }
        }
        Expression::Function(e) => v.visit_function(&e.function),
        Expression::Class(e) => v.visit_class(&e.class),
        Expression::Await(e) => v.visit_expression(e),
        Expression::Yield(e) => {
            if let Some(arg) = &e.argument {
                v.visit_expression(arg);
            }
        }
        Expression::Sequence(exprs) => {
            for e in exprs {
                v.visit_expression(e);
            }
        }
    }
}

fn walk_member<V: Visitor>(v: &mut V, member: &MemberExpression) {
    v.visit_expression(&member.object);
    if let MemberProperty::Computed(key) = &member.property {
        v.visit_expression(key);
    }
}

fn walk_arguments<V: Visitor>(v: &mut V, args: &[Argument]) {
    for arg in args {
        match arg {
            Argument::Expr(e) | Argument::Spread(e) => v.visit_expression(e),
        }
    }
}

pub fn walk_pattern<V: Visitor>(v: &mut V, pattern: &Pattern) {
    match pattern {
        Pattern::Identifier(_) => {}
        Pattern::Array(arr) => {
            for elem in arr.elements.iter().flatten() {
                v.visit_pattern(elem);
            }
        }
        Pattern::Object(obj) => {
            for prop in &obj.properties {
                v.visit_property_key(&prop.key);
                v.visit_pattern(&prop.value);
            }
            if let Some(rest) = &obj.rest {
                v.visit_pattern(rest);
            }
        }
        Pattern::Assignment(assign) => {
            v.visit_pattern(&assign.target);
            v.visit_expression(&assign.default);
        }
        Pattern::Rest(inner) => v.visit_pattern(inner),
        Pattern::Member(member) => walk_member(v, member),
    }
}

pub fn walk_property_key<V: Visitor>(v: &mut V, key: &PropertyKey) {
    if let PropertyKey::Computed(expr) = key {
        v.visit_expression(expr);
    }
}

pub fn walk_function<V: Visitor>(v: &mut V, function: &Function) {
    for p in &function.params {
        v.visit_pattern(p);
    }
    for s in &function.body.statements {
        v.visit_statement(s);
    }
}

pub fn walk_class<V: Visitor>(v: &mut V, class: &Class) {
    if let Some(sup) = &class.super_class {
        v.visit_expression(sup);
    }
    for member in &class.members {
        match member {
            ClassMember::Constructor(function) => v.visit_function(function),
            ClassMember::Method(method) => {
                v.visit_property_key(&method.key);
                v.visit_function(&method.function);
            }
            ClassMember::Field(field) => {
                v.visit_property_key(&field.key);
                if let Some(value) = &field.value {
                    v.visit_expression(value);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountIdentifiers {
        count: usize,
    }

    impl Visitor for CountIdentifiers {
        fn visit_expression(&mut self, expr: &Expression) {
            if matches!(expr, Expression::Identifier(_)) {
                self.count += 1;
            }
            walk_expression(self, expr);
        }
    }

    #[test]
    fn test_counts_identifiers_through_nesting() {
        // if (a) { b(c + d); }
        let program = Program::new(vec![Statement::If(IfStatement {
            test: Expression::ident("a"),
            consequent: Box::new(Statement::expr(Expression::call(
                Expression::ident("b"),
                vec![Expression::Binary(BinaryExpression {
                    op: BinaryOp::Add,
                    left: Box::new(Expression::ident("c")),
                    right: Box::new(Expression::ident("d")),
                })],
            ))),
            alternate: None,
        })]);
        let mut counter = CountIdentifiers { count: 0 };
        counter.visit_program(&program);
        assert_eq!(counter.count, 4);
    }
}
