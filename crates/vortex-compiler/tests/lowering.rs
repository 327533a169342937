//! IR generation and optimizer behavior on hand-built programs

use vortex_ast::*;
use vortex_compiler::ir::{Literal, Op};
use vortex_compiler::lower::IrGenerator;
use vortex_compiler::memory::MemoryMap;
use vortex_compiler::optimize::{graph_is_sound, Optimizer, MAX_ITERATIONS};
use vortex_compiler::CompileError;

fn num(n: f64) -> Expression {
    Expression::num(n)
}

fn ident(name: &str) -> Expression {
    Expression::ident(name)
}

fn binary(op: BinaryOp, left: Expression, right: Expression) -> Expression {
    Expression::Binary(BinaryExpression {
        op,
        left: Box::new(left),
        right: Box::new(right),
    })
}

fn ret(argument: Expression) -> Statement {
    Statement::Return(ReturnStatement {
        argument: Some(argument),
    })
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

fn log(arg: Expression) -> Statement {
    Statement::expr(Expression::call(
        Expression::member(ident("console"), "log"),
        vec![arg],
    ))
}

/// function f(n, a) { if (n <= 1) return a; return f(n - 1, a * n); }
/// console.log(f(10, 1));
fn factorial() -> Vec<Statement> {
    vec![
        func_decl(
            "f",
            &["n", "a"],
            vec![
                Statement::If(IfStatement {
                    test: binary(BinaryOp::LessEqual, ident("n"), num(1.0)),
                    consequent: Box::new(ret(ident("a"))),
                    alternate: None,
                }),
                ret(Expression::call(
                    ident("f"),
                    vec![
                        binary(BinaryOp::Sub, ident("n"), num(1.0)),
                        binary(BinaryOp::Mul, ident("a"), ident("n")),
                    ],
                )),
            ],
        ),
        log(Expression::call(ident("f"), vec![num(10.0), num(1.0)])),
    ]
}

fn lower(body: &[Statement]) -> (vortex_compiler::lower::IrOutput, MemoryMap) {
    let mut memory = MemoryMap::new();
    let out = IrGenerator::new(&mut memory)
        .transform_to_states(body)
        .expect("lowering failed");
    (out, memory)
}

#[test]
fn program_entry_and_halt() {
    let (out, _) = lower(&factorial());
    assert!(out.ir.is_live(0));
    let has_halt = out.ir.states.iter().any(|s| matches!(s.op, Op::Halt));
    assert!(has_halt);
    assert!(graph_is_sound(&out.ir));
}

#[test]
fn function_discovery_creates_pinned_entries() {
    let (out, _) = lower(&factorial());
    let entry = out.ir.entry_of("f").expect("f registered");
    assert!(matches!(out.ir.state(entry).op, Op::FuncEntry { .. }));
}

#[test]
fn self_tail_call_becomes_iteration() {
    let (mut out, mut memory) = lower(&factorial());
    let stats = Optimizer::new(&mut memory, 8).optimize(&mut out.ir);
    assert!(stats.transforms > 0);
    assert!(stats.iterations <= MAX_ITERATIONS);
    assert!(graph_is_sound(&out.ir));

    let recursive_call_survives = out.ir.states.iter().any(|s| {
        out.ir.is_live(s.id)
            && matches!(&s.op, Op::Call { callee, .. } if callee == "f")
    });
    assert!(!recursive_call_survives, "TCO did not fire");
}

#[test]
fn try_finally_routes_through_disposition_slots() {
    // function t() { try { return 1; } finally { console.log(3); } }
    let body = vec![func_decl(
        "t",
        &[],
        vec![Statement::Try(TryStatement {
            block: BlockStatement::new(vec![ret(num(1.0))]),
            handler: None,
            finalizer: Some(BlockStatement::new(vec![log(num(3.0))])),
        })],
    )];
    let (out, _) = lower(&body);

    let mut saw_push = false;
    let mut saw_dispatch = false;
    let mut saw_return_code = false;
    for state in &out.ir.states {
        match &state.op {
            Op::PushCatchHandler { .. } => saw_push = true,
            Op::FinallyDispatch { .. } => saw_dispatch = true,
            Op::AssignLiteral { to, value } if to == "_FIN" => {
                if *value == Literal::Number(1.0) {
                    saw_return_code = true;
                }
            }
            _ => {}
        }
    }
    assert!(saw_push, "try entry must push a handler");
    assert!(saw_dispatch, "finally must end in FINALLY_DISPATCH");
    assert!(saw_return_code, "return through finally must set _FIN = 1");
}

#[test]
fn catch_guard_checks_generator_sentinel() {
    let body = vec![func_decl(
        "t",
        &[],
        vec![Statement::Try(TryStatement {
            block: BlockStatement::new(vec![Statement::Throw(ThrowStatement {
                argument: num(1.0),
            })]),
            handler: Some(CatchClause {
                param: Some(Pattern::Identifier("e".into())),
                body: BlockStatement::new(vec![log(ident("e"))]),
            }),
            finalizer: None,
        })],
    )];
    let (out, _) = lower(&body);
    let guard = out.ir.states.iter().any(|s| {
        matches!(&s.op, Op::AssignLiteral { value: Literal::String(v), .. } if v == "@@VRXT")
    });
    assert!(guard, "catch must compare the exception to the sentinel");
}

#[test]
fn loops_produce_conditional_jumps() {
    // let i = 0; while (i < 3) { i = i + 1; }
    let body = vec![
        Statement::VariableDecl(VariableDecl::single(
            VariableKind::Let,
            "i",
            Some(num(0.0)),
        )),
        Statement::While(WhileStatement {
            test: binary(BinaryOp::Less, ident("i"), num(3.0)),
            body: Box::new(Statement::expr(Expression::Assignment(
                AssignmentExpression {
                    op: AssignmentOp::Assign,
                    target: AssignmentTarget::Identifier("i".into()),
                    value: Box::new(binary(BinaryOp::Add, ident("i"), num(1.0))),
                },
            ))),
        }),
    ];
    let (out, _) = lower(&body);
    let jumps = out
        .ir
        .states
        .iter()
        .filter(|s| matches!(s.op, Op::CondJump { .. }))
        .count();
    assert!(jumps >= 1);
    assert!(graph_is_sound(&out.ir));
}

#[test]
fn break_outside_loop_is_rejected() {
    let body = vec![Statement::Break(BreakStatement { label: None })];
    let mut memory = MemoryMap::new();
    let result = IrGenerator::new(&mut memory).transform_to_states(&body);
    assert!(matches!(result, Err(CompileError::IllegalJump { .. })));
}

#[test]
fn optimizer_keeps_graph_sound_on_mixed_program() {
    let body = vec![
        Statement::VariableDecl(VariableDecl::single(
            VariableKind::Let,
            "total",
            Some(num(0.0)),
        )),
        Statement::For(ForStatement {
            init: Some(ForInit::VariableDecl(VariableDecl::single(
                VariableKind::Let,
                "i",
                Some(num(0.0)),
            ))),
            test: Some(binary(BinaryOp::Less, ident("i"), num(10.0))),
            update: Some(Expression::Assignment(AssignmentExpression {
                op: AssignmentOp::Add,
                target: AssignmentTarget::Identifier("i".into()),
                value: Box::new(num(1.0)),
            })),
            body: Box::new(Statement::Block(BlockStatement::new(vec![
                Statement::If(IfStatement {
                    test: binary(
                        BinaryOp::StrictEqual,
                        binary(BinaryOp::Mod, ident("i"), num(2.0)),
                        num(0.0),
                    ),
                    consequent: Box::new(Statement::Continue(ContinueStatement {
                        label: None,
                    })),
                    alternate: None,
                }),
                Statement::expr(Expression::Assignment(AssignmentExpression {
                    op: AssignmentOp::Add,
                    target: AssignmentTarget::Identifier("total".into()),
                    value: Box::new(ident("i")),
                })),
            ]))),
        }),
        log(ident("total")),
    ];
    let (mut out, mut memory) = lower(&body);
    let before = out.ir.live_count();
    let stats = Optimizer::new(&mut memory, 8).optimize(&mut out.ir);
    assert!(graph_is_sound(&out.ir));
    assert!(out.ir.live_count() <= before);
    assert!(stats.iterations >= 1);
}

#[test]
fn constant_chain_folds_away() {
    // let x = 2 + 3; console.log(x);
    let body = vec![
        Statement::VariableDecl(VariableDecl::single(
            VariableKind::Let,
            "x",
            Some(binary(BinaryOp::Add, num(2.0), num(3.0))),
        )),
        log(ident("x")),
    ];
    let (mut out, mut memory) = lower(&body);
    Optimizer::new(&mut memory, 8).optimize(&mut out.ir);
    assert!(graph_is_sound(&out.ir));
    // The addition of two known literals must not survive.
    let live_add = out.ir.states.iter().any(|s| {
        out.ir.is_live(s.id) && matches!(&s.op, Op::Binary { op: BinaryOp::Add, .. })
    });
    assert!(!live_add, "2 + 3 should have been folded");
}
