//! End-to-end compilation through the public API

use vortex_ast::*;
use vortex_compiler::{Compiler, DispatcherKind, Options};

fn num(n: f64) -> Expression {
    Expression::num(n)
}

fn ident(name: &str) -> Expression {
    Expression::ident(name)
}

fn log(arg: Expression) -> Statement {
    Statement::expr(Expression::call(
        Expression::member(ident("console"), "log"),
        vec![arg],
    ))
}

fn func_decl(name: &str, params: &[&str], body: Vec<Statement>) -> Statement {
    Statement::FunctionDecl(FunctionDecl {
        name: name.into(),
        function: Function::new(
            params.iter().map(|p| Pattern::Identifier(p.to_string())).collect(),
            BlockStatement::new(body),
        ),
    })
}

fn sample_program() -> Program {
    // function add(a, b) { return a + b; }
    // console.log(add(2, 40), "done");
    Program::new(vec![
        func_decl(
            "add",
            &["a", "b"],
            vec![Statement::Return(ReturnStatement {
                argument: Some(Expression::Binary(BinaryExpression {
                    op: BinaryOp::Add,
                    left: Box::new(ident("a")),
                    right: Box::new(ident("b")),
                })),
            })],
        ),
        Statement::expr(Expression::Call(CallExpression {
            callee: Box::new(Expression::member(ident("console"), "log")),
            arguments: vec![
                Argument::Expr(Expression::call(ident("add"), vec![num(2.0), num(40.0)])),
                Argument::Expr(Expression::str("done")),
            ],
        })),
    ])
}

fn options(dispatcher: DispatcherKind, seed: u64) -> Options {
    Options {
        dispatcher,
        seed: Some(seed),
        ..Options::default()
    }
}

#[test]
fn fixed_seed_is_byte_reproducible() {
    let compiler = Compiler::new(options(DispatcherKind::Switch, 7));
    let a = compiler.compile(sample_program()).unwrap();
    let b = compiler.compile(sample_program()).unwrap();
    assert_eq!(a, b);
}

#[test]
fn different_seeds_differ() {
    let a = Compiler::new(options(DispatcherKind::Switch, 1))
        .compile(sample_program())
        .unwrap();
    let b = Compiler::new(options(DispatcherKind::Switch, 2))
        .compile(sample_program())
        .unwrap();
    assert_ne!(a, b);
}

#[test]
fn switch_dispatcher_shape() {
    let code = Compiler::new(options(DispatcherKind::Switch, 7))
        .compile(sample_program())
        .unwrap();
    assert!(code.contains("switch (S)"));
    assert!(code.contains("console.error"));
    // Entry call at logical state 0 (identity id mapping).
    assert!(code.contains("(0, [], false, void 0, void 0);"));
}

#[test]
fn bst_dispatcher_shape() {
    let code = Compiler::new(options(DispatcherKind::Bst, 7))
        .compile(sample_program())
        .unwrap();
    assert!(code.contains("if (S ==="));
    assert!(!code.contains("switch (S)"));
}

#[test]
fn cluster_dispatcher_shape() {
    let code = Compiler::new(options(DispatcherKind::Cluster, 7))
        .compile(sample_program())
        .unwrap();
    assert!(code.contains("const DS = S ^"));
    assert!(code.contains("Math.abs(DS) %"));
}

#[test]
fn chaos_dispatcher_shape() {
    let code = Compiler::new(options(DispatcherKind::Chaos, 7))
        .compile(sample_program())
        .unwrap();
    assert!(code.contains("let K0 = 0, K1 = 0, K2 = S;"));
    assert!(code.contains("const CS = (K0 ^ K1 ^ K2) ^"));
    assert!(code.contains("(K0 ^ K1 ^ K2) !== S"));
}

#[test]
fn all_dispatchers_accept_the_same_program() {
    for kind in [
        DispatcherKind::Switch,
        DispatcherKind::Bst,
        DispatcherKind::Cluster,
        DispatcherKind::Chaos,
    ] {
        let result = Compiler::new(options(kind, 99)).compile(sample_program());
        assert!(result.is_ok(), "{:?} failed: {:?}", kind, result.err());
    }
}

#[test]
fn plaintext_pool_without_encryption() {
    let opts = Options {
        no_encryption: true,
        seed: Some(7),
        ..Options::default()
    };
    let code = Compiler::new(opts).compile(sample_program()).unwrap();
    // The collected literal sits in the pool as-is.
    assert!(code.contains("\"done\""));
}

#[test]
fn encrypted_pool_hides_literals_and_ships_decoder() {
    let code = Compiler::new(options(DispatcherKind::Switch, 7))
        .compile(sample_program())
        .unwrap();
    assert!(!code.contains("\"done\""));
    assert!(code.contains("new Proxy(CORE"));
    assert!(code.contains("Math.imul"));
}

#[test]
fn state_randomization_still_compiles_deterministically() {
    let opts = Options {
        state_randomization: true,
        seed: Some(123),
        ..Options::default()
    };
    let a = Compiler::new(opts.clone()).compile(sample_program()).unwrap();
    let b = Compiler::new(opts).compile(sample_program()).unwrap();
    assert_eq!(a, b);
    assert!(!a.contains("(0, [], false, void 0, void 0);"));
}

#[test]
fn generator_wrapper_protocol() {
    // function* g() { yield 1; }  g().next();
    let program = Program::new(vec![
        Statement::FunctionDecl(FunctionDecl {
            name: "g".into(),
            function: Function {
                params: vec![],
                body: BlockStatement::new(vec![Statement::expr(Expression::Yield(
                    YieldExpression {
                        argument: Some(Box::new(num(1.0))),
                        delegate: false,
                    },
                ))]),
                is_async: false,
                is_generator: true,
            },
        }),
        Statement::expr(Expression::call(
            Expression::member(Expression::call(ident("g"), vec![]), "next"),
            vec![],
        )),
    ]);
    let code = Compiler::new(options(DispatcherKind::Switch, 7))
        .compile(program)
        .unwrap();
    assert!(code.contains("function* (...a)"));
    assert!(code.contains("yield* r.v"));
}

#[test]
fn async_wrapper_chains_promises() {
    // async function a() { return await 1; }  a();
    let program = Program::new(vec![
        Statement::FunctionDecl(FunctionDecl {
            name: "a".into(),
            function: Function {
                params: vec![],
                body: BlockStatement::new(vec![Statement::Return(ReturnStatement {
                    argument: Some(Expression::Await(Box::new(num(1.0)))),
                })]),
                is_async: true,
                is_generator: false,
            },
        }),
        Statement::expr(Expression::call(ident("a"), vec![])),
    ]);
    let code = Compiler::new(options(DispatcherKind::Switch, 7))
        .compile(program)
        .unwrap();
    assert!(code.contains("Promise.resolve"));
}

#[test]
fn class_program_compiles_with_prototype_wiring() {
    // class A { speak() { return "A"; } }
    // class B extends A { speak() { return super.speak() + "B"; } }
    // console.log(new B().speak());
    let speak_a = MethodDef {
        key: PropertyKey::Identifier("speak".into()),
        kind: MethodKind::Method,
        function: Function::new(
            vec![],
            BlockStatement::new(vec![Statement::Return(ReturnStatement {
                argument: Some(Expression::str("A")),
            })]),
        ),
        is_static: false,
    };
    let speak_b = MethodDef {
        key: PropertyKey::Identifier("speak".into()),
        kind: MethodKind::Method,
        function: Function::new(
            vec![],
            BlockStatement::new(vec![Statement::Return(ReturnStatement {
                argument: Some(Expression::Binary(BinaryExpression {
                    op: BinaryOp::Add,
                    left: Box::new(Expression::call(
                        Expression::member(Expression::Super, "speak"),
                        vec![],
                    )),
                    right: Box::new(Expression::str("B")),
                })),
            })]),
        ),
        is_static: false,
    };
    let program = Program::new(vec![
        Statement::ClassDecl(ClassDecl {
            name: "A".into(),
            class: Class {
                super_class: None,
                members: vec![ClassMember::Method(speak_a)],
            },
        }),
        Statement::ClassDecl(ClassDecl {
            name: "B".into(),
            class: Class {
                super_class: Some(Box::new(ident("A"))),
                members: vec![ClassMember::Method(speak_b)],
            },
        }),
        log(Expression::call(
            Expression::member(
                Expression::New(NewExpression {
                    callee: Box::new(ident("B")),
                    arguments: vec![],
                }),
                "speak",
            ),
            vec![],
        )),
    ]);
    let opts = Options {
        no_encryption: true,
        seed: Some(7),
        ..Options::default()
    };
    let code = Compiler::new(opts).compile(program).unwrap();
    // Wiring names travel through the plaintext pool.
    assert!(code.contains("\"setPrototypeOf\""));
    assert!(code.contains("\"prototype\""));
    assert!(code.contains("\"constructor\""));
}

#[test]
fn for_of_desugars_into_iterator_protocol() {
    // for (const x of xs) console.log(x);
    let program = Program::new(vec![
        Statement::VariableDecl(VariableDecl::single(
            VariableKind::Const,
            "xs",
            Some(Expression::Array(ArrayExpression {
                elements: vec![
                    ArrayElement::Expr(num(1.0)),
                    ArrayElement::Expr(num(2.0)),
                ],
            })),
        )),
        Statement::ForOf(ForOfStatement {
            left: ForTarget::Declaration(VariableKind::Const, Pattern::Identifier("x".into())),
            right: ident("xs"),
            body: Box::new(log(ident("x"))),
            is_await: false,
        }),
    ]);
    let opts = Options {
        no_encryption: true,
        seed: Some(7),
        ..Options::default()
    };
    let code = Compiler::new(opts).compile(program).unwrap();
    assert!(code.contains("\"iterator\""));
    assert!(code.contains("\"next\""));
    assert!(code.contains("\"return\""));
}

#[test]
fn partial_mode_preserves_unopted_source() {
    // function f() { "use vortex"; return 1; }
    // let plain = 2;
    // console.log(f(), plain);
    let program = Program::new(vec![
        Statement::FunctionDecl(FunctionDecl {
            name: "f".into(),
            function: Function::new(
                vec![],
                BlockStatement::new(vec![
                    Statement::expr(Expression::str("use vortex")),
                    Statement::Return(ReturnStatement {
                        argument: Some(num(1.0)),
                    }),
                ]),
            ),
        }),
        Statement::VariableDecl(VariableDecl::single(
            VariableKind::Let,
            "plain",
            Some(num(2.0)),
        )),
        Statement::expr(Expression::Call(CallExpression {
            callee: Box::new(Expression::member(ident("console"), "log")),
            arguments: vec![
                Argument::Expr(Expression::call(ident("f"), vec![])),
                Argument::Expr(ident("plain")),
            ],
        })),
    ]);
    let compilation = Compiler::new(options(DispatcherKind::Switch, 7))
        .compile_detailed(program)
        .unwrap();
    assert!(compilation.partial);
    // Host code survives as source; the opted function becomes a wrapper.
    assert!(compilation.code.contains("let plain = 2;"));
    assert!(compilation.code.contains("console.log(f(), plain);"));
    assert!(compilation.code.contains("const f = function (...a)"));
    assert!(!compilation.code.contains("use vortex"));
}

#[test]
fn no_directive_means_full_virtualization() {
    let compilation = Compiler::new(options(DispatcherKind::Switch, 7))
        .compile_detailed(sample_program())
        .unwrap();
    assert!(!compilation.partial);
    assert!(compilation.state_count > 0);
    // Nothing of the original surface syntax survives verbatim.
    assert!(!compilation.code.contains("function add"));
}

#[test]
fn module_surface_is_preserved() {
    // import fs from "fs"; export function f() { return 1; }
    let program = Program::new(vec![
        Statement::Import(ImportDecl {
            specifiers: vec![ImportSpecifier::Default("fs".into())],
            source: "fs".into(),
        }),
        Statement::Export(ExportDecl::Declaration(Box::new(func_decl(
            "f",
            &[],
            vec![Statement::Return(ReturnStatement {
                argument: Some(num(1.0)),
            })],
        )))),
    ]);
    let code = Compiler::new(options(DispatcherKind::Switch, 7))
        .compile(program)
        .unwrap();
    assert!(code.starts_with("import fs from \"fs\";"));
    assert!(code.contains("export { f };"));
}

#[test]
fn opaque_predicates_inject_dead_branches() {
    let opts = Options {
        opaque_predicates: true,
        opaque_prob: 1.0,
        seed: Some(7),
        ..Options::default()
    };
    let code = Compiler::new(opts).compile(sample_program()).unwrap();
    // Math-congruence guards appear at injection points.
    assert!(code.contains(") % 4 === 2"));
}
