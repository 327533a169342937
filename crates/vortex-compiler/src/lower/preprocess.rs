//! Module preprocessor
//!
//! Separates import/export declarations from the executable body and
//! detects the partial-virtualization directive. Export declarations are
//! unwrapped so the body is pure executable statements; the export surface
//! is reconstructed as name lists appended after the program.

use vortex_ast::*;

/// Scope opt-in directive for partial virtualization
pub const DIRECTIVE: &str = "use vortex";

#[derive(Debug)]
pub struct ModuleSplit {
    /// Import declarations, emitted verbatim before everything else
    pub imports: Vec<Statement>,
    /// Executable statements, export wrappers removed
    pub body: Vec<Statement>,
    /// Reconstructed export declarations, emitted last
    pub exports: Vec<Statement>,
    /// Whether any scope carries the directive
    pub partial: bool,
}

/// Split a program into imports, executable body and exports
pub fn split_module(program: Program) -> ModuleSplit {
    let mut imports = Vec::new();
    let mut body = Vec::new();
    let mut exports = Vec::new();
    let mut default_counter = 0usize;

    for stmt in program.body {
        match stmt {
            Statement::Import(_) => imports.push(stmt),
            Statement::Export(decl) => match decl {
                ExportDecl::Declaration(inner) => {
                    let names = declared_names(&inner);
                    body.push(*inner);
                    if !names.is_empty() {
                        exports.push(Statement::Export(ExportDecl::Named {
                            specifiers: names
                                .into_iter()
                                .map(|n| ExportSpecifier {
                                    local: n.clone(),
                                    exported: n,
                                })
                                .collect(),
                            source: None,
                        }));
                    }
                }
                ExportDecl::Default(expr) => {
                    let local = format!("_default${}", default_counter);
                    default_counter += 1;
                    body.push(Statement::VariableDecl(VariableDecl::single(
                        VariableKind::Const,
                        local.clone(),
                        Some(*expr),
                    )));
                    exports.push(Statement::Export(ExportDecl::Named {
                        specifiers: vec![ExportSpecifier {
                            local,
                            exported: "default".into(),
                        }],
                        source: None,
                    }));
                }
                named @ ExportDecl::Named { .. } => exports.push(Statement::Export(named)),
                all @ ExportDecl::All { .. } => exports.push(Statement::Export(all)),
            },
            other => body.push(other),
        }
    }

    let partial = program_has_directive(&body);
    ModuleSplit {
        imports,
        body,
        exports,
        partial,
    }
}

fn declared_names(stmt: &Statement) -> Vec<String> {
    match stmt {
        Statement::FunctionDecl(decl) => vec![decl.name.clone()],
        Statement::ClassDecl(decl) => vec![decl.name.clone()],
        Statement::VariableDecl(decl) => {
            let mut names = Vec::new();
            for d in &decl.declarations {
                let mut bound = Vec::new();
                d.pattern.bound_names(&mut bound);
                names.extend(bound.into_iter().map(String::from));
            }
            names
        }
        _ => Vec::new(),
    }
}

/// Whether a statement list opens with the directive
pub fn has_directive(statements: &[Statement]) -> bool {
    for stmt in statements {
        match stmt.as_directive() {
            Some(d) if d == DIRECTIVE => return true,
            Some(_) => continue,
            None => return false,
        }
    }
    false
}

/// Remove leading directive statements from a block
pub fn strip_directive(statements: &mut Vec<Statement>) {
    while statements
        .first()
        .and_then(|s| s.as_directive())
        .is_some_and(|d| d == DIRECTIVE)
    {
        statements.remove(0);
    }
}

fn program_has_directive(body: &[Statement]) -> bool {
    struct Finder {
        found: bool,
    }
    impl Visitor for Finder {
        fn visit_function(&mut self, function: &Function) {
            if has_directive(&function.body.statements) {
                self.found = true;
            }
            walk_statement_list(self, &function.body.statements);
        }
    }
    fn walk_statement_list<V: Visitor>(v: &mut V, statements: &[Statement]) {
        for stmt in statements {
            v.visit_statement(stmt);
        }
    }

    if has_directive(body) {
        return true;
    }
    let mut finder = Finder { found: false };
    for stmt in body {
        finder.visit_statement(stmt);
    }
    finder.found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_moves_imports_and_exports() {
        let program = Program::new(vec![
            Statement::Import(ImportDecl {
                specifiers: vec![ImportSpecifier::Default("fs".into())],
                source: "fs".into(),
            }),
            Statement::Export(ExportDecl::Declaration(Box::new(Statement::FunctionDecl(
                FunctionDecl {
                    name: "f".into(),
                    function: Function::new(vec![], BlockStatement::default()),
                },
            )))),
            Statement::expr(Expression::num(1.0)),
        ]);
        let split = split_module(program);
        assert_eq!(split.imports.len(), 1);
        assert_eq!(split.body.len(), 2);
        assert!(matches!(split.body[0], Statement::FunctionDecl(_)));
        assert_eq!(split.exports.len(), 1);
        assert!(!split.partial);
    }

    #[test]
    fn test_default_export_gets_synthetic_binding() {
        let program = Program::new(vec![Statement::Export(ExportDecl::Default(Box::new(
            Expression::num(7.0),
        )))]);
        let split = split_module(program);
        assert!(matches!(split.body[0], Statement::VariableDecl(_)));
        match &split.exports[0] {
            Statement::Export(ExportDecl::Named { specifiers, .. }) => {
                assert_eq!(specifiers[0].exported, "default");
            }
            _ => panic!("expected named export"),
        }
    }

    #[test]
    fn test_directive_detection_in_nested_function() {
        let program = Program::new(vec![Statement::FunctionDecl(FunctionDecl {
            name: "f".into(),
            function: Function::new(
                vec![],
                BlockStatement::new(vec![
                    Statement::expr(Expression::str(DIRECTIVE)),
                    Statement::Return(ReturnStatement { argument: None }),
                ]),
            ),
        })]);
        let split = split_module(program);
        assert!(split.partial);
    }

    #[test]
    fn test_directive_must_lead_the_block() {
        let statements = vec![
            Statement::expr(Expression::num(1.0)),
            Statement::expr(Expression::str(DIRECTIVE)),
        ];
        assert!(!has_directive(&statements));
    }

    #[test]
    fn test_strip_directive() {
        let mut statements = vec![
            Statement::expr(Expression::str(DIRECTIVE)),
            Statement::expr(Expression::num(1.0)),
        ];
        strip_directive(&mut statements);
        assert_eq!(statements.len(), 1);
    }
}
