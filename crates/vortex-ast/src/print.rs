//! Compact source printer
//!
//! Renders AST nodes back to JavaScript source text. Output is compact
//! (single spaces, no indentation) since it is consumed by the virtualizer's
//! program assembly, not by humans. Parenthesization is driven by a small
//! precedence table.

use super::*;
use std::fmt::Write;

/// Print a whole program, one statement per line.
pub fn print_program(program: &Program) -> String {
    let mut out = String::new();
    for stmt in &program.body {
        print_statement(&mut out, stmt);
        out.push('\n');
    }
    out
}

/// Print a single statement to a string.
pub fn print_statement_to_string(stmt: &Statement) -> String {
    let mut out = String::new();
    print_statement(&mut out, stmt);
    out
}

/// Print a single expression to a string.
pub fn print_expression_to_string(expr: &Expression) -> String {
    let mut out = String::new();
    print_expr(&mut out, expr, 0);
    out
}

/// Render a number the way JS source does (integral values without a dot).
pub fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if n == n.trunc() && n.abs() < 9.007_199_254_740_992e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// Escape a string into a double-quoted JS literal.
pub fn quote_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{0}'..='\u{1f}' => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

// Binding strengths, tighter binds higher.
const PREC_SEQUENCE: u8 = 1;
const PREC_ASSIGN: u8 = 2;
const PREC_CONDITIONAL: u8 = 3;
const PREC_LOGICAL: u8 = 4;
const PREC_EQUALITY: u8 = 9;
const PREC_RELATIONAL: u8 = 10;
const PREC_SHIFT: u8 = 11;
const PREC_ADDITIVE: u8 = 12;
const PREC_MULTIPLICATIVE: u8 = 13;
const PREC_EXPONENT: u8 = 14;
const PREC_UNARY: u8 = 15;
const PREC_POSTFIX: u8 = 16;
const PREC_NEW: u8 = 17;
const PREC_CALL: u8 = 18;
const PREC_PRIMARY: u8 = 20;

fn binary_prec(op: BinaryOp) -> u8 {
    match op {
        BinaryOp::Pow => PREC_EXPONENT,
        BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => PREC_MULTIPLICATIVE,
        BinaryOp::Add | BinaryOp::Sub => PREC_ADDITIVE,
        BinaryOp::ShiftLeft | BinaryOp::ShiftRight | BinaryOp::UnsignedShiftRight => PREC_SHIFT,
        BinaryOp::Less
        | BinaryOp::LessEqual
        | BinaryOp::Greater
        | BinaryOp::GreaterEqual
        | BinaryOp::In
        | BinaryOp::Instanceof => PREC_RELATIONAL,
        BinaryOp::Equal | BinaryOp::NotEqual | BinaryOp::StrictEqual | BinaryOp::StrictNotEqual => {
            PREC_EQUALITY
        }
        BinaryOp::BitAnd => 8,
        BinaryOp::BitXor => 7,
        BinaryOp::BitOr => 6,
    }
}

fn logical_prec(op: LogicalOp) -> u8 {
    match op {
        LogicalOp::And => 5,
        // `??` may not mix bare with &&/||, so it always parenthesizes its
        // logical children via its own low level.
        LogicalOp::Or | LogicalOp::Nullish => PREC_LOGICAL,
    }
}

fn print_statement(out: &mut String, stmt: &Statement) {
    match stmt {
        Statement::VariableDecl(decl) => {
            print_variable_decl(out, decl);
            out.push(';');
        }
        Statement::FunctionDecl(decl) => {
            print_function(out, Some(&decl.name), &decl.function);
        }
        Statement::ClassDecl(decl) => {
            print_class(out, Some(&decl.name), &decl.class);
        }
        Statement::Expression(stmt) => {
            // A leading `{`, `function` or `class` would re-parse as a
            // different production.
            let text = print_expression_to_string(&stmt.expression);
            if text.starts_with('{') || text.starts_with("function") || text.starts_with("class") {
                out.push('(');
                out.push_str(&text);
                out.push(')');
            } else {
                out.push_str(&text);
            }
            out.push(';');
        }
        Statement::If(stmt) => {
            out.push_str("if (");
            print_expr(out, &stmt.test, 0);
            out.push_str(") ");
            print_nested(out, &stmt.consequent);
            if let Some(alt) = &stmt.alternate {
                out.push_str(" else ");
                print_nested(out, alt);
            }
        }
        Statement::Switch(stmt) => {
            out.push_str("switch (");
            print_expr(out, &stmt.discriminant, 0);
            out.push_str(") { ");
            for case in &stmt.cases {
                match &case.test {
                    Some(test) => {
                        out.push_str("case ");
                        print_expr(out, test, 0);
                        out.push_str(": ");
                    }
                    None => out.push_str("default: "),
                }
                for s in &case.body {
                    print_statement(out, s);
                    out.push(' ');
                }
            }
            out.push('}');
        }
        Statement::While(stmt) => {
            out.push_str("while (");
            print_expr(out, &stmt.test, 0);
            out.push_str(") ");
            print_nested(out, &stmt.body);
        }
        Statement::DoWhile(stmt) => {
            out.push_str("do ");
            print_nested(out, &stmt.body);
            out.push_str(" while (");
            print_expr(out, &stmt.test, 0);
            out.push_str(");");
        }
        Statement::For(stmt) => {
            out.push_str("for (");
            match &stmt.init {
                Some(ForInit::VariableDecl(decl)) => print_variable_decl(out, decl),
                Some(ForInit::Expression(expr)) => print_expr(out, expr, 0),
                None => {}
            }
            out.push_str("; ");
            if let Some(test) = &stmt.test {
                print_expr(out, test, 0);
            }
            out.push_str("; ");
            if let Some(update) = &stmt.update {
                print_expr(out, update, 0);
            }
            out.push_str(") ");
            print_nested(out, &stmt.body);
        }
        Statement::ForIn(stmt) => {
            out.push_str("for (");
            print_for_target(out, &stmt.left);
            out.push_str(" in ");
            print_expr(out, &stmt.right, PREC_ASSIGN);
            out.push_str(") ");
            print_nested(out, &stmt.body);
        }
        Statement::ForOf(stmt) => {
            out.push_str(if stmt.is_await { "for await (" } else { "for (" });
            print_for_target(out, &stmt.left);
            out.push_str(" of ");
            print_expr(out, &stmt.right, PREC_ASSIGN);
            out.push_str(") ");
            print_nested(out, &stmt.body);
        }
        Statement::Break(stmt) => {
            out.push_str("break");
            if let Some(label) = &stmt.label {
                out.push(' ');
                out.push_str(label);
            }
            out.push(';');
        }
        Statement::Continue(stmt) => {
            out.push_str("continue");
            if let Some(label) = &stmt.label {
                out.push(' ');
                out.push_str(label);
            }
            out.push(';');
        }
        Statement::Return(stmt) => {
            out.push_str("return");
            if let Some(arg) = &stmt.argument {
                out.push(' ');
                print_expr(out, arg, 0);
            }
            out.push(';');
        }
        Statement::Throw(stmt) => {
            out.push_str("throw ");
            print_expr(out, &stmt.argument, 0);
            out.push(';');
        }
        Statement::Try(stmt) => {
            out.push_str("try ");
            print_block(out, &stmt.block);
            if let Some(handler) = &stmt.handler {
                out.push_str(" catch ");
                if let Some(param) = &handler.param {
                    out.push('(');
                    print_pattern(out, param);
                    out.push_str(") ");
                }
                print_block(out, &handler.body);
            }
            if let Some(finalizer) = &stmt.finalizer {
                out.push_str(" finally ");
                print_block(out, finalizer);
            }
        }
        Statement::Labeled(stmt) => {
            out.push_str(&stmt.label);
            out.push_str(": ");
            print_statement(out, &stmt.body);
        }
        Statement::Block(block) => print_block(out, block),
        Statement::Import(decl) => print_import(out, decl),
        Statement::Export(decl) => print_export(out, decl),
        Statement::Empty => out.push(';'),
    }
}

fn print_nested(out: &mut String, stmt: &Statement) {
    match stmt {
        Statement::Block(block) => print_block(out, block),
        other => print_statement(out, other),
    }
}

fn print_block(out: &mut String, block: &BlockStatement) {
    out.push_str("{ ");
    for stmt in &block.statements {
        print_statement(out, stmt);
        out.push(' ');
    }
    out.push('}');
}

fn print_variable_decl(out: &mut String, decl: &VariableDecl) {
    out.push_str(decl.kind.as_str());
    out.push(' ');
    for (i, d) in decl.declarations.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        print_pattern(out, &d.pattern);
        if let Some(init) = &d.init {
            out.push_str(" = ");
            print_expr(out, init, PREC_ASSIGN);
        }
    }
}

fn print_for_target(out: &mut String, target: &ForTarget) {
    match target {
        ForTarget::Declaration(kind, pattern) => {
            out.push_str(kind.as_str());
            out.push(' ');
            print_pattern(out, pattern);
        }
        ForTarget::Pattern(pattern) => print_pattern(out, pattern),
    }
}

fn print_import(out: &mut String, decl: &ImportDecl) {
    out.push_str("import ");
    if decl.specifiers.is_empty() {
        out.push_str(&quote_string(&decl.source));
        out.push(';');
        return;
    }
    let mut named = Vec::new();
    let mut first = true;
    for spec in &decl.specifiers {
        match spec {
            ImportSpecifier::Default(local) => {
                if !first {
                    out.push_str(", ");
                }
                out.push_str(local);
                first = false;
            }
            ImportSpecifier::Namespace(local) => {
                if !first {
                    out.push_str(", ");
                }
                out.push_str("* as ");
                out.push_str(local);
                first = false;
            }
            ImportSpecifier::Named { imported, local } => named.push((imported, local)),
        }
    }
    if !named.is_empty() {
        if !first {
            out.push_str(", ");
        }
        out.push_str("{ ");
        for (i, (imported, local)) in named.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            if imported == local {
                out.push_str(local);
            } else {
                let _ = write!(out, "{} as {}", imported, local);
            }
        }
        out.push_str(" }");
    }
    out.push_str(" from ");
    out.push_str(&quote_string(&decl.source));
    out.push(';');
}

fn print_export(out: &mut String, decl: &ExportDecl) {
    match decl {
        ExportDecl::Declaration(stmt) => {
            out.push_str("export ");
            print_statement(out, stmt);
        }
        ExportDecl::Named { specifiers, source } => {
            out.push_str("export { ");
            for (i, spec) in specifiers.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                if spec.local == spec.exported {
                    out.push_str(&spec.local);
                } else {
                    let _ = write!(out, "{} as {}", spec.local, spec.exported);
                }
            }
            out.push_str(" }");
            if let Some(source) = source {
                out.push_str(" from ");
                out.push_str(&quote_string(source));
            }
            out.push(';');
        }
        ExportDecl::Default(expr) => {
            out.push_str("export default ");
            print_expr(out, expr, PREC_ASSIGN);
            out.push(';');
        }
        ExportDecl::All { source, alias } => {
            out.push_str("export *");
            if let Some(alias) = alias {
                out.push_str(" as ");
                out.push_str(alias);
            }
            out.push_str(" from ");
            out.push_str(&quote_string(source));
            out.push(';');
        }
    }
}

fn print_pattern(out: &mut String, pattern: &Pattern) {
    match pattern {
        Pattern::Identifier(name) => out.push_str(name),
        Pattern::Array(arr) => {
            out.push('[');
            for (i, elem) in arr.elements.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                if let Some(p) = elem {
                    print_pattern(out, p);
                }
            }
            out.push(']');
        }
        Pattern::Object(obj) => {
            out.push_str("{ ");
            for (i, prop) in obj.properties.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                if prop.shorthand {
                    print_pattern(out, &prop.value);
                } else {
                    print_property_key(out, &prop.key);
                    out.push_str(": ");
                    print_pattern(out, &prop.value);
                }
            }
            if let Some(rest) = &obj.rest {
                if !obj.properties.is_empty() {
                    out.push_str(", ");
                }
                out.push_str("...");
                print_pattern(out, rest);
            }
            out.push_str(" }");
        }
        Pattern::Assignment(assign) => {
            print_pattern(out, &assign.target);
            out.push_str(" = ");
            print_expr(out, &assign.default, PREC_ASSIGN);
        }
        Pattern::Rest(inner) => {
            out.push_str("...");
            print_pattern(out, inner);
        }
        Pattern::Member(member) => print_member(out, member),
    }
}

fn print_property_key(out: &mut String, key: &PropertyKey) {
    match key {
        PropertyKey::Identifier(name) => out.push_str(name),
        PropertyKey::String(s) => out.push_str(&quote_string(s)),
        PropertyKey::Number(n) => out.push_str(&number_to_string(*n)),
        PropertyKey::Private(name) => {
            out.push('#');
            out.push_str(name);
        }
        PropertyKey::Computed(expr) => {
            out.push('[');
            print_expr(out, expr, 0);
            out.push(']');
        }
    }
}

fn print_function(out: &mut String, name: Option<&str>, function: &Function) {
    if function.is_async {
        out.push_str("async ");
    }
    out.push_str("function");
    if function.is_generator {
        out.push('*');
    }
    if let Some(name) = name {
        out.push(' ');
        out.push_str(name);
    }
    out.push('(');
    for (i, param) in function.params.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        print_pattern(out, param);
    }
    out.push_str(") ");
    print_block(out, &function.body);
}

fn print_class(out: &mut String, name: Option<&str>, class: &Class) {
    out.push_str("class");
    if let Some(name) = name {
        out.push(' ');
        out.push_str(name);
    }
    if let Some(sup) = &class.super_class {
        out.push_str(" extends ");
        print_expr(out, sup, PREC_CALL);
    }
    out.push_str(" { ");
    for member in &class.members {
        match member {
            ClassMember::Constructor(function) => {
                out.push_str("constructor(");
                for (i, param) in function.params.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    print_pattern(out, param);
                }
                out.push_str(") ");
                print_block(out, &function.body);
            }
            ClassMember::Method(method) => {
                if method.is_static {
                    out.push_str("static ");
                }
                if method.function.is_async {
                    out.push_str("async ");
                }
                match method.kind {
                    MethodKind::Getter => out.push_str("get "),
                    MethodKind::Setter => out.push_str("set "),
                    MethodKind::Method => {
                        if method.function.is_generator {
                            out.push('*');
                        }
                    }
                }
                print_property_key(out, &method.key);
                out.push('(');
                for (i, param) in method.function.params.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    print_pattern(out, param);
                }
                out.push_str(") ");
                print_block(out, &method.function.body);
            }
            ClassMember::Field(field) => {
                if field.is_static {
                    out.push_str("static ");
                }
                print_property_key(out, &field.key);
                if let Some(value) = &field.value {
                    out.push_str(" = ");
                    print_expr(out, value, PREC_ASSIGN);
                }
                out.push(';');
            }
        }
        out.push(' ');
    }
    out.push('}');
}

fn print_member(out: &mut String, member: &MemberExpression) {
    print_expr(out, &member.object, PREC_CALL);
    match &member.property {
        MemberProperty::Identifier(name) => {
            out.push('.');
            out.push_str(name);
        }
        MemberProperty::Private(name) => {
            out.push_str(".#");
            out.push_str(name);
        }
        MemberProperty::Computed(key) => {
            out.push('[');
            print_expr(out, key, 0);
            out.push(']');
        }
    }
}

fn print_arguments(out: &mut String, args: &[Argument]) {
    out.push('(');
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        match arg {
            Argument::Expr(e) => print_expr(out, e, PREC_ASSIGN),
            Argument::Spread(e) => {
                out.push_str("...");
                print_expr(out, e, PREC_ASSIGN);
            }
        }
    }
    out.push(')');
}

fn print_expr(out: &mut String, expr: &Expression, min_prec: u8) {
    let prec = expr_prec(expr);
    let needs_parens = prec < min_prec;
    if needs_parens {
        out.push('(');
    }
    match expr {
        Expression::Number(n) => {
            if *n < 0.0 || (*n == 0.0 && n.is_sign_negative()) {
                // Negative literals print as a unary expression.
                out.push('(');
                out.push_str(&number_to_string(*n));
                out.push(')');
            } else {
                out.push_str(&number_to_string(*n));
            }
        }
        Expression::String(s) => out.push_str(&quote_string(s)),
        Expression::Boolean(b) => out.push_str(if *b { "true" } else { "false" }),
        Expression::Null => out.push_str("null"),
        Expression::Identifier(name) => out.push_str(name),
        Expression::This => out.push_str("this"),
        Expression::Super => out.push_str("super"),
        Expression::NewTarget => out.push_str("new.target"),
        Expression::Template(tpl) => {
            out.push('`');
            for (i, quasi) in tpl.quasis.iter().enumerate() {
                for c in quasi.chars() {
                    match c {
                        '`' => out.push_str("\\`"),
                        '\\' => out.push_str("\\\\"),
                        '$' => out.push_str("\\$"),
                        _ => out.push(c),
                    }
                }
                if i < tpl.expressions.len() {
                    out.push_str("${");
                    print_expr(out, &tpl.expressions[i], 0);
                    out.push('}');
                }
            }
            out.push('`');
        }
        Expression::Array(arr) => {
            out.push('[');
            for (i, elem) in arr.elements.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                match elem {
                    ArrayElement::Expr(e) => print_expr(out, e, PREC_ASSIGN),
                    ArrayElement::Spread(e) => {
                        out.push_str("...");
                        print_expr(out, e, PREC_ASSIGN);
                    }
                    ArrayElement::Hole => {}
                }
            }
            out.push(']');
        }
        Expression::Object(obj) => {
            out.push_str("{ ");
            for (i, prop) in obj.properties.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                match prop {
                    ObjectProperty::KeyValue { key, value } => {
                        print_property_key(out, key);
                        out.push_str(": ");
                        print_expr(out, value, PREC_ASSIGN);
                    }
                    ObjectProperty::Shorthand(name) => out.push_str(name),
                    ObjectProperty::Method {
                        key,
                        kind,
                        function,
                    } => {
                        if function.is_async {
                            out.push_str("async ");
                        }
                        match kind {
                            MethodKind::Getter => out.push_str("get "),
                            MethodKind::Setter => out.push_str("set "),
                            MethodKind::Method => {
                                if function.is_generator {
                                    out.push('*');
                                }
                            }
                        }
                        print_property_key(out, key);
                        out.push('(');
                        for (i, param) in function.params.iter().enumerate() {
                            if i > 0 {
                                out.push_str(", ");
                            }
                            print_pattern(out, param);
                        }
                        out.push_str(") ");
                        print_block(out, &function.body);
                    }
                    ObjectProperty::Spread(e) => {
                        out.push_str("...");
                        print_expr(out, e, PREC_ASSIGN);
                    }
                }
            }
            out.push_str(" }");
        }
        Expression::Unary(e) => {
            out.push_str(e.op.as_str());
            if matches!(e.op, UnaryOp::Typeof | UnaryOp::Void | UnaryOp::Delete) {
                out.push(' ');
            } else {
                // `--x` and `+ +x` must not fuse.
                match (e.op, &*e.argument) {
                    (UnaryOp::Minus, Expression::Unary(inner))
                        if inner.op == UnaryOp::Minus =>
                    {
                        out.push(' ')
                    }
                    (UnaryOp::Plus, Expression::Unary(inner)) if inner.op == UnaryOp::Plus => {
                        out.push(' ')
                    }
                    _ => {}
                }
            }
            print_expr(out, &e.argument, PREC_UNARY);
        }
        Expression::Update(e) => {
            if e.prefix {
                out.push_str(e.op.as_str());
                print_expr(out, &e.argument, PREC_UNARY);
            } else {
                print_expr(out, &e.argument, PREC_POSTFIX);
                out.push_str(e.op.as_str());
            }
        }
        Expression::Binary(e) => {
            let (lp, rp) = if e.op == BinaryOp::Pow {
                (prec + 1, prec)
            } else {
                (prec, prec + 1)
            };
            print_expr(out, &e.left, lp);
            out.push(' ');
            out.push_str(e.op.as_str());
            out.push(' ');
            print_expr(out, &e.right, rp);
        }
        Expression::Logical(e) => {
            print_expr(out, &e.left, prec);
            out.push(' ');
            out.push_str(e.op.as_str());
            out.push(' ');
            print_expr(out, &e.right, prec + 1);
        }
        Expression::Assignment(e) => {
            match &e.target {
                AssignmentTarget::Identifier(name) => out.push_str(name),
                AssignmentTarget::Member(member) => print_member(out, member),
                AssignmentTarget::Pattern(pattern) => print_pattern(out, pattern),
            }
            out.push(' ');
            out.push_str(match e.op {
                AssignmentOp::Assign => "=",
                AssignmentOp::Add => "+=",
                AssignmentOp::Sub => "-=",
                AssignmentOp::Mul => "*=",
                AssignmentOp::Div => "/=",
                AssignmentOp::Mod => "%=",
                AssignmentOp::Pow => "**=",
                AssignmentOp::ShiftLeft => "<<=",
                AssignmentOp::ShiftRight => ">>=",
                AssignmentOp::UnsignedShiftRight => ">>>=",
                AssignmentOp::BitAnd => "&=",
                AssignmentOp::BitOr => "|=",
                AssignmentOp::BitXor => "^=",
                AssignmentOp::And => "&&=",
                AssignmentOp::Or => "||=",
                AssignmentOp::Nullish => "??=",
            });
            out.push(' ');
            print_expr(out, &e.value, PREC_ASSIGN);
        }
        Expression::Conditional(e) => {
            print_expr(out, &e.test, prec + 1);
            out.push_str(" ? ");
            print_expr(out, &e.consequent, PREC_ASSIGN);
            out.push_str(" : ");
            print_expr(out, &e.alternate, PREC_ASSIGN);
        }
        Expression::Call(e) => {
            print_expr(out, &e.callee, PREC_CALL);
            print_arguments(out, &e.arguments);
        }
        Expression::New(e) => {
            out.push_str("new ");
            print_expr(out, &e.callee, PREC_NEW + 1);
            print_arguments(out, &e.arguments);
        }
        Expression::Member(member) => print_member(out, member),
        Expression::Arrow(arrow) => {
            if arrow.is_async {
                out.push_str("async ");
            }
            out.push('(');
            for (i, param) in arrow.params.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                print_pattern(out, param);
            }
            out.push_str(") => ");
            match &arrow.body {
                ArrowBody::Expression(body) => {
                    // An object literal body needs parens to not parse as a block.
                    if matches!(**body, Expression::Object(_)) {
                        out.push('(');
                        print_expr(out, body, PREC_ASSIGN);
                        out.push(')');
                    } else {
                        print_expr(out, body, PREC_ASSIGN);
                    }
                }
                ArrowBody::Block(block) => print_block(out, block),
            }
        }
        Expression::Function(e) => print_function(out, e.name.as_deref(), &e.function),
        Expression::Class(e) => print_class(out, e.name.as_deref(), &e.class),
        Expression::Await(e) => {
            out.push_str("await ");
            print_expr(out, e, PREC_UNARY);
        }
        Expression::Yield(e) => {
            out.push_str("yield");
            if e.delegate {
                out.push('*');
            }
            if let Some(arg) = &e.argument {
                out.push(' ');
                print_expr(out, arg, PREC_ASSIGN);
            }
        }
        Expression::Sequence(exprs) => {
            for (i, e) in exprs.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                print_expr(out, e, PREC_ASSIGN);
            }
        }
    }
    if needs_parens {
        out.push(')');
    }
}

fn expr_prec(expr: &Expression) -> u8 {
    match expr {
        Expression::Sequence(_) => PREC_SEQUENCE,
        Expression::Assignment(_) | Expression::Arrow(_) | Expression::Yield(_) => PREC_ASSIGN,
        Expression::Conditional(_) => PREC_CONDITIONAL,
        Expression::Logical(e) => logical_prec(e.op),
        Expression::Binary(e) => binary_prec(e.op),
        Expression::Unary(_) | Expression::Await(_) => PREC_UNARY,
        Expression::Update(_) => PREC_POSTFIX,
        Expression::New(_) => PREC_NEW,
        Expression::Call(_) | Expression::Member(_) => PREC_CALL,
        _ => PREC_PRIMARY,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_formats() {
        assert_eq!(number_to_string(42.0), "42");
        assert_eq!(number_to_string(3.5), "3.5");
        assert_eq!(number_to_string(-7.0), "-7");
    }

    #[test]
    fn test_string_escaping() {
        assert_eq!(quote_string("a\"b\n"), "\"a\\\"b\\n\"");
    }

    #[test]
    fn test_precedence_parens() {
        // (a + b) * c
        let e = Expression::Binary(BinaryExpression {
            op: BinaryOp::Mul,
            left: Box::new(Expression::Binary(BinaryExpression {
                op: BinaryOp::Add,
                left: Box::new(Expression::ident("a")),
                right: Box::new(Expression::ident("b")),
            })),
            right: Box::new(Expression::ident("c")),
        });
        assert_eq!(print_expression_to_string(&e), "(a + b) * c");
    }

    #[test]
    fn test_no_spurious_parens() {
        // a + b * c
        let e = Expression::Binary(BinaryExpression {
            op: BinaryOp::Add,
            left: Box::new(Expression::ident("a")),
            right: Box::new(Expression::Binary(BinaryExpression {
                op: BinaryOp::Mul,
                left: Box::new(Expression::ident("b")),
                right: Box::new(Expression::ident("c")),
            })),
        });
        assert_eq!(print_expression_to_string(&e), "a + b * c");
    }

    #[test]
    fn test_call_and_member() {
        let e = Expression::call(
            Expression::member(Expression::ident("console"), "log"),
            vec![Expression::str("hi"), Expression::num(2.0)],
        );
        assert_eq!(print_expression_to_string(&e), "console.log(\"hi\", 2)");
    }

    #[test]
    fn test_statement_rendering() {
        let s = Statement::If(IfStatement {
            test: Expression::ident("x"),
            consequent: Box::new(Statement::Return(ReturnStatement {
                argument: Some(Expression::num(1.0)),
            })),
            alternate: None,
        });
        assert_eq!(print_statement_to_string(&s), "if (x) return 1;");
    }

    #[test]
    fn test_object_expression_statement_parenthesized() {
        let s = Statement::expr(Expression::Object(ObjectExpression { properties: vec![] }));
        assert!(print_statement_to_string(&s).starts_with('('));
    }

    #[test]
    fn test_template_literal() {
        let e = Expression::Template(TemplateLiteral {
            quasis: vec!["a".into(), "b".into()],
            expressions: vec![Expression::ident("x")],
        });
        assert_eq!(print_expression_to_string(&e), "`a${x}b`");
    }
}
