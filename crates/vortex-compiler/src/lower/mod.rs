//! AST to state lowering
//!
//! Converts the desugared program into the flat state list. Functions are
//! discovered in a first pass per scope (hoisting), bodies are lowered in a
//! second, and every statement/expression handler produces a segment of
//! linked states.

pub mod capture;
pub mod control;
pub mod desugar;
pub mod preprocess;

mod class;
mod expr;
mod stmt;

use crate::error::{CompileError, CompileResult};
use crate::ir::{Fragment, FunctionEntry, Ir, Op, StateId};
use crate::memory::MemoryMap;
use capture::free_variables;
use control::ControlFrame;
use rustc_hash::{FxHashMap, FxHashSet};
use vortex_ast::{Function, Pattern, Statement};

/// A run of linked states. `end` is the open tail the next segment links
/// onto; linking onto a terminal end is a no-op.
#[derive(Debug, Clone, Copy)]
pub struct Segment {
    pub start: StateId,
    pub end: StateId,
}

/// Everything known about a discovered callable
#[derive(Debug)]
pub struct FuncInfo {
    pub entry: StateId,
    /// Plain user parameter names (captured names are prepended at entry)
    pub params: Vec<String>,
    pub rest: Option<String>,
    pub captured: Vec<String>,
    pub is_generator: bool,
    pub is_async: bool,
    pub is_class: bool,
    /// Body awaiting processing; taken when lowered
    ast: Option<Function>,
}

/// Result of IR generation
pub struct IrOutput {
    pub ir: Ir,
    pub functions: FxHashMap<String, FuncInfo>,
    /// Host globals the program reads, in first-use order
    pub globals_used: Vec<String>,
    /// Partial mode: statements kept as source around the VM
    pub retained: Vec<Statement>,
    pub partial: bool,
}

#[derive(Clone)]
pub(crate) struct FnCtx {
    pub name: Option<String>,
    pub is_generator: bool,
    pub is_async: bool,
    pub top_level: bool,
}

pub struct IrGenerator<'a> {
    pub(crate) ir: Ir,
    pub(crate) memory: &'a mut MemoryMap,
    pub(crate) functions: FxHashMap<String, FuncInfo>,
    pub(crate) control: Vec<ControlFrame>,
    /// Binding sets of enclosing function scopes, innermost last
    pub(crate) scopes: Vec<FxHashSet<String>>,
    pub(crate) ctx: FnCtx,
    temp_counter: u32,
    anon_counter: u32,
    pub(crate) globals_used: Vec<String>,
    globals_seen: FxHashSet<String>,
}

impl<'a> IrGenerator<'a> {
    pub fn new(memory: &'a mut MemoryMap) -> Self {
        Self {
            ir: Ir::new(),
            memory,
            functions: FxHashMap::default(),
            control: Vec::new(),
            scopes: Vec::new(),
            ctx: FnCtx {
                name: None,
                is_generator: false,
                is_async: false,
                top_level: true,
            },
            temp_counter: 0,
            anon_counter: 0,
            globals_used: Vec::new(),
            globals_seen: FxHashSet::default(),
        }
    }

    /// Lower a full program: entry sequence, every discovered function,
    /// terminated by HALT at the end of the top level.
    pub fn transform_to_states(mut self, body: &[Statement]) -> CompileResult<IrOutput> {
        let entry = self.ir.alloc(Op::Noop);
        debug_assert_eq!(entry, 0);

        let seg = self.lower_scope(body, true)?;
        self.ir.set_next(entry, seg.start);
        let halt = self.ir.alloc(Op::Halt);
        self.ir.set_next(seg.end, halt);

        Ok(IrOutput {
            ir: self.ir,
            functions: self.functions,
            globals_used: self.globals_used,
            retained: Vec::new(),
            partial: false,
        })
    }

    /// Partial mode: only top-level function declarations whose body opens
    /// with the directive are virtualized; everything else is retained as
    /// source. State 0 is a bare HALT.
    pub fn transform_partial(mut self, body: &[Statement]) -> CompileResult<IrOutput> {
        let entry = self.ir.alloc(Op::Halt);
        debug_assert_eq!(entry, 0);

        // Top-level bindings stay host-side; remember them so captures of
        // opted functions can name them.
        let mut top_names = FxHashSet::default();
        collect_scope_decl_names(body, &mut |name| {
            top_names.insert(name.to_string());
        });
        self.scopes.push(top_names);

        let mut retained = Vec::new();
        let mut opted = Vec::new();
        for stmt in body {
            match stmt {
                Statement::FunctionDecl(decl)
                    if preprocess::has_directive(&decl.function.body.statements) =>
                {
                    let mut function = decl.function.clone();
                    preprocess::strip_directive(&mut function.body.statements);
                    self.register_partial_function(&decl.name, function)?;
                    opted.push(decl.name.clone());
                }
                other => retained.push(other.clone()),
            }
        }
        for name in &opted {
            self.process_function(name)?;
        }

        Ok(IrOutput {
            ir: self.ir,
            functions: self.functions,
            globals_used: self.globals_used,
            retained,
            partial: true,
        })
    }

    // ------------------------------------------------------------------
    // Scope machinery
    // ------------------------------------------------------------------

    /// Lower one lexical scope: allocate its declarations, register and
    /// process its function declarations (hoisting), emit their wrapper
    /// assignments, then lower the remaining statements in order.
    pub(crate) fn lower_scope(
        &mut self,
        statements: &[Statement],
        is_global: bool,
    ) -> CompileResult<Segment> {
        let start = self.noop();
        let mut seg = Segment { start, end: start };

        let mut decl_names = Vec::new();
        collect_scope_decl_names(statements, &mut |name| decl_names.push(name.to_string()));
        for name in &decl_names {
            self.memory.allocate(name, is_global);
        }

        // Pass 1: register every function declared directly in this scope.
        let mut declared = Vec::new();
        for stmt in statements {
            if let Statement::FunctionDecl(decl) = stmt {
                self.register_function(&decl.name, decl.function.clone(), is_global, false)?;
                declared.push(decl.name.clone());
            }
        }

        // Hoisted wrapper bindings.
        for name in &declared {
            let wrapper = self.func_ref_fragment(name)?;
            let assign = self.seg1(Op::AssignLiteralDirect {
                to: name.clone(),
                fragment: wrapper,
            });
            seg = self.chain(seg, assign);
        }

        // Pass 2: bodies, then the statements themselves.
        for name in &declared {
            self.process_function(name)?;
        }
        for stmt in statements {
            if matches!(stmt, Statement::FunctionDecl(_)) {
                continue;
            }
            let stmt_seg = self.lower_statement(stmt)?;
            seg = self.chain(seg, stmt_seg);
        }
        Ok(seg)
    }

    /// Register a callable: allocate its name slot, create the pinned
    /// FUNC_ENTRY and compute its captured-name list. `as_class` marks
    /// constructor entries.
    pub(crate) fn register_function(
        &mut self,
        name: &str,
        function: Function,
        is_global: bool,
        as_class: bool,
    ) -> CompileResult<()> {
        self.memory.allocate(name, is_global);
        let entry = self.ir.alloc(Op::FuncEntry {
            name: name.to_string(),
            params: Vec::new(),
            rest: None,
            is_generator: function.is_generator,
            is_async: function.is_async,
        });
        self.ir.function_table.push(FunctionEntry {
            name: name.to_string(),
            entry,
        });

        let (params, rest) = plain_params(&function)?;
        let captured = self.captured_names(&function);
        for cap in &captured {
            self.memory.allocate(cap, false);
        }
        for p in params.iter().chain(rest.iter()) {
            self.memory.allocate(p, false);
        }

        self.functions.insert(
            name.to_string(),
            FuncInfo {
                entry,
                params,
                rest,
                captured,
                is_generator: function.is_generator,
                is_async: function.is_async,
                is_class: as_class,
                ast: Some(function),
            },
        );
        Ok(())
    }

    fn register_partial_function(&mut self, name: &str, function: Function) -> CompileResult<()> {
        // In partial mode the enclosing bindings are host-side, so the
        // capture filter is the top-level declaration set alone.
        self.memory.allocate(name, true);
        let entry = self.ir.alloc(Op::FuncEntry {
            name: name.to_string(),
            params: Vec::new(),
            rest: None,
            is_generator: function.is_generator,
            is_async: function.is_async,
        });
        self.ir.function_table.push(FunctionEntry {
            name: name.to_string(),
            entry,
        });

        let (params, rest) = plain_params(&function)?;
        let free = free_variables(&function);
        let captured: Vec<String> = free
            .names
            .into_iter()
            .filter(|n| self.scopes.iter().any(|s| s.contains(n)) && n != name)
            .collect();
        for p in captured.iter().chain(params.iter()).chain(rest.iter()) {
            self.memory.allocate(p, false);
        }

        self.functions.insert(
            name.to_string(),
            FuncInfo {
                entry,
                params,
                rest,
                captured,
                is_generator: function.is_generator,
                is_async: function.is_async,
                is_class: false,
                ast: Some(function),
            },
        );
        Ok(())
    }

    /// Names a function captures from enclosing frames: referenced, not
    /// bound inside it, allocated local, and bound by an enclosing
    /// function scope. Arrows additionally capture the `this` slot; the
    /// expression handler appends it.
    pub(crate) fn captured_names(&mut self, function: &Function) -> Vec<String> {
        let free = free_variables(function);
        free.names
            .into_iter()
            .filter(|n| {
                self.memory.is_local(n) && self.scopes.iter().any(|scope| scope.contains(n))
            })
            .collect()
    }

    /// Lower a registered function's body under its own context
    pub(crate) fn process_function(&mut self, name: &str) -> CompileResult<()> {
        let info = self
            .functions
            .get_mut(name)
            .ok_or_else(|| CompileError::UnknownFunction {
                name: name.to_string(),
            })?;
        let Some(function) = info.ast.take() else {
            return Ok(()); // already lowered
        };
        let entry = info.entry;
        let params = info.params.clone();
        let rest = info.rest.clone();
        let captured = info.captured.clone();
        let is_generator = info.is_generator;
        let is_async = info.is_async;

        // Finalize the pinned entry: captured names bind first.
        let mut all_params: Vec<String> = captured.clone();
        all_params.extend(params.iter().cloned());
        self.ir.state_mut(entry).op = Op::FuncEntry {
            name: name.to_string(),
            params: all_params,
            rest: rest.clone(),
            is_generator,
            is_async,
        };

        // Fresh function context.
        let saved_ctx = self.ctx.clone();
        let saved_control = std::mem::take(&mut self.control);
        self.ctx = FnCtx {
            name: Some(name.to_string()),
            is_generator,
            is_async,
            top_level: false,
        };

        let mut bindings: FxHashSet<String> =
            params.iter().chain(rest.iter()).cloned().collect();
        bindings.insert(name.to_string());
        collect_scope_decl_names(&function.body.statements, &mut |n| {
            bindings.insert(n.to_string());
        });
        for n in &bindings {
            self.memory.allocate(n, false);
        }
        self.scopes.push(bindings);

        let body = self.lower_scope(&function.body.statements, false)?;
        self.ir.set_next(entry, body.start);
        let ret = self.ir.alloc(Op::Return { value_var: None });
        self.ir.set_next(body.end, ret);

        self.scopes.pop();
        self.control = saved_control;
        self.ctx = saved_ctx;
        Ok(())
    }

    /// Wrapper fragment for a registered function
    pub(crate) fn func_ref_fragment(&self, name: &str) -> CompileResult<Fragment> {
        let info = self
            .functions
            .get(name)
            .ok_or_else(|| CompileError::UnknownFunction {
                name: name.to_string(),
            })?;
        let mut params = info.captured.clone();
        params.extend(info.params.iter().cloned());
        Ok(Fragment::FuncRef {
            name: name.to_string(),
            entry: info.entry,
            params,
            rest: info.rest.clone(),
            captured: info.captured.clone(),
            is_generator: info.is_generator,
            is_async: info.is_async,
        })
    }

    // ------------------------------------------------------------------
    // Small helpers
    // ------------------------------------------------------------------

    pub(crate) fn temp(&mut self) -> String {
        let name = format!("_temp${}", self.temp_counter);
        self.temp_counter += 1;
        self.memory.allocate(&name, false);
        name
    }

    pub(crate) fn fresh_anon(&mut self, base: &str) -> String {
        let name = format!("_{}${}", base, self.anon_counter);
        self.anon_counter += 1;
        name
    }

    pub(crate) fn noop(&mut self) -> StateId {
        self.ir.alloc(Op::Noop)
    }

    pub(crate) fn seg1(&mut self, op: Op) -> Segment {
        let id = self.ir.alloc(op);
        Segment { start: id, end: id }
    }

    /// Link two segments into one
    pub(crate) fn chain(&mut self, a: Segment, b: Segment) -> Segment {
        self.ir.set_next(a.end, b.start);
        Segment {
            start: a.start,
            end: b.end,
        }
    }

    /// Record a host global read for the preloader section
    pub(crate) fn use_global(&mut self, name: &str) {
        if self.globals_seen.insert(name.to_string()) {
            self.globals_used.push(name.to_string());
        }
    }

    /// Whether the name resolves to a virtualized slot
    pub(crate) fn is_allocated(&self, name: &str) -> bool {
        self.memory.contains(name)
    }
}

/// Plain parameter names after desugaring; anything else is a generator bug
fn plain_params(function: &Function) -> CompileResult<(Vec<String>, Option<String>)> {
    let mut params = Vec::new();
    let mut rest = None;
    for (i, p) in function.params.iter().enumerate() {
        match p {
            Pattern::Identifier(name) => params.push(name.clone()),
            Pattern::Rest(inner) => match (&**inner, i == function.params.len() - 1) {
                (Pattern::Identifier(name), true) => rest = Some(name.clone()),
                _ => {
                    return Err(CompileError::unsupported(
                        "rest parameter with a non-identifier target",
                    ))
                }
            },
            other => {
                return Err(CompileError::internal(format!(
                    "parameter pattern survived desugaring: {:?}",
                    other
                )))
            }
        }
    }
    Ok((params, rest))
}

/// Collect names declared anywhere in a statement list, recursing into
/// nested blocks but not into nested functions or classes.
pub(crate) fn collect_scope_decl_names(statements: &[Statement], f: &mut impl FnMut(&str)) {
    use vortex_ast::ForInit;
    for stmt in statements {
        match stmt {
            Statement::VariableDecl(decl) => {
                for d in &decl.declarations {
                    let mut names = Vec::new();
                    d.pattern.bound_names(&mut names);
                    for n in names {
                        f(n);
                    }
                }
            }
            Statement::FunctionDecl(decl) => f(&decl.name),
            Statement::ClassDecl(decl) => f(&decl.name),
            Statement::If(s) => {
                collect_scope_decl_names(std::slice::from_ref(&s.consequent), f);
                if let Some(alt) = &s.alternate {
                    collect_scope_decl_names(std::slice::from_ref(alt), f);
                }
            }
            Statement::Switch(s) => {
                for case in &s.cases {
                    collect_scope_decl_names(&case.body, f);
                }
            }
            Statement::While(s) => collect_scope_decl_names(std::slice::from_ref(&s.body), f),
            Statement::DoWhile(s) => collect_scope_decl_names(std::slice::from_ref(&s.body), f),
            Statement::For(s) => {
                if let Some(ForInit::VariableDecl(decl)) = &s.init {
                    for d in &decl.declarations {
                        let mut names = Vec::new();
                        d.pattern.bound_names(&mut names);
                        for n in names {
                            f(n);
                        }
                    }
                }
                collect_scope_decl_names(std::slice::from_ref(&s.body), f);
            }
            Statement::ForIn(s) => {
                collect_for_target(&s.left, f);
                collect_scope_decl_names(std::slice::from_ref(&s.body), f);
            }
            Statement::ForOf(s) => {
                collect_for_target(&s.left, f);
                collect_scope_decl_names(std::slice::from_ref(&s.body), f);
            }
            Statement::Try(s) => {
                collect_scope_decl_names(&s.block.statements, f);
                if let Some(handler) = &s.handler {
                    if let Some(param) = &handler.param {
                        let mut names = Vec::new();
                        param.bound_names(&mut names);
                        for n in names {
                            f(n);
                        }
                    }
                    collect_scope_decl_names(&handler.body.statements, f);
                }
                if let Some(finalizer) = &s.finalizer {
                    collect_scope_decl_names(&finalizer.statements, f);
                }
            }
            Statement::Labeled(s) => collect_scope_decl_names(std::slice::from_ref(&s.body), f),
            Statement::Block(block) => collect_scope_decl_names(&block.statements, f),
            Statement::Export(vortex_ast::ExportDecl::Declaration(inner)) => {
                collect_scope_decl_names(std::slice::from_ref(inner), f)
            }
            _ => {}
        }
    }
}

fn collect_for_target(target: &vortex_ast::ForTarget, f: &mut impl FnMut(&str)) {
    if let vortex_ast::ForTarget::Declaration(_, pattern) = target {
        let mut names = Vec::new();
        pattern.bound_names(&mut names);
        for n in names {
            f(n);
        }
    }
}
