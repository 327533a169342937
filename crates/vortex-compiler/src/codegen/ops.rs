//! Op-to-JavaScript translation
//!
//! One shared translator feeds all four dispatcher shapes: each live
//! state becomes a block of statements that executes its ops, assigns the
//! next state and continues the dispatch loop. State assignment goes
//! through a sink so the chaos dispatcher can split the state variable.

use super::writer::JsWriter;
use crate::error::{CompileError, CompileResult};
use crate::ir::{ArrayItem, CallArg, Fragment, Ir, Literal, ObjectItem, Op, State, StateId};
use crate::memory::MemoryMap;
use crate::rng::Prng;
use crate::strings::StringPool;
use rustc_hash::FxHashMap;
use vortex_ast::print::{number_to_string, print_statement_to_string};
use vortex_ast::UnaryOp;

/// Randomized top-level identifiers of the emitted program
#[derive(Debug, Clone)]
pub struct VmNames {
    pub pool: String,
    pub decoder: String,
    pub gm: String,
    pub vm: String,
    pub frame: String,
}

impl VmNames {
    pub fn generate(prng: &mut Prng) -> Self {
        Self {
            pool: prng.identifier(),
            decoder: prng.identifier(),
            gm: prng.identifier(),
            vm: prng.identifier(),
            frame: prng.identifier(),
        }
    }
}

/// Logical-to-emitted id mapping, with optional alias entry points and
/// trampoline hops (chaos dispatcher).
#[derive(Debug, Default)]
pub struct IdSpace {
    primary: FxHashMap<StateId, i64>,
    aliases: FxHashMap<StateId, Vec<i64>>,
    trampolines: FxHashMap<StateId, i64>,
}

impl IdSpace {
    /// Identity mapping over the live ids
    pub fn identity(ir: &Ir) -> Self {
        let mut primary = FxHashMap::default();
        for id in ir.live_ids() {
            primary.insert(id, id as i64);
        }
        Self {
            primary,
            ..Self::default()
        }
    }

    /// Unique random 32-bit ids for every live state
    pub fn randomized(ir: &Ir, prng: &mut Prng) -> Self {
        let mut primary = FxHashMap::default();
        let mut used = rustc_hash::FxHashSet::default();
        for id in ir.live_ids() {
            let value = loop {
                let v = prng.next_u32() as i32 as i64;
                if used.insert(v) {
                    break v;
                }
            };
            primary.insert(id, value);
        }
        Self {
            primary,
            ..Self::default()
        }
    }

    pub fn primary(&self, id: StateId) -> CompileResult<i64> {
        self.primary
            .get(&id)
            .copied()
            .ok_or(CompileError::InvalidStateReference { id })
    }

    pub fn fresh_value(&self, prng: &mut Prng) -> i64 {
        loop {
            let v = prng.next_u32() as i32 as i64;
            if !self.primary.values().any(|&p| p == v)
                && !self.aliases.values().flatten().any(|&a| a == v)
                && !self.trampolines.values().any(|&t| t == v)
            {
                return v;
            }
        }
    }

    pub fn add_alias(&mut self, id: StateId, value: i64) {
        self.aliases.entry(id).or_default().push(value);
    }

    pub fn set_trampoline(&mut self, id: StateId, value: i64) {
        self.trampolines.insert(id, value);
    }

    pub fn aliases_of(&self, id: StateId) -> &[i64] {
        self.aliases.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn trampoline_of(&self, id: StateId) -> Option<i64> {
        self.trampolines.get(&id).copied()
    }

    /// Every (emitted id, logical state) pair the dispatcher must cover,
    /// aliases included.
    pub fn entry_points(&self, ir: &Ir) -> Vec<(i64, StateId)> {
        let mut points = Vec::new();
        for id in ir.live_ids() {
            if let Some(&p) = self.primary.get(&id) {
                points.push((p, id));
            }
            for &a in self.aliases_of(id) {
                points.push((a, id));
            }
        }
        points
    }
}

/// How state assignments are written
#[derive(Debug, Clone)]
pub enum StateSink {
    /// `S = v;`
    Direct,
    /// Three-way XOR split; `S` stays the shadow of truth
    Horcrux { k: [String; 3] },
}

pub struct EmitCtx<'a> {
    pub memory: &'a MemoryMap,
    pub pool: &'a StringPool,
    pub encrypted: bool,
    pub names: &'a VmNames,
    pub ids: &'a IdSpace,
    pub sink: StateSink,
    pub randomize: bool,
    /// First EH slot (== local slot count)
    pub eh_base: u32,
}

impl EmitCtx<'_> {
    /// Memory reference for a slot name
    pub fn slot(&self, name: &str) -> CompileResult<String> {
        let slot = self.memory.lookup(name)?;
        Ok(if slot.is_global {
            format!("{}[{}]", self.names.gm, slot.index)
        } else {
            format!("M[{}]", slot.index)
        })
    }

    /// Raw local slot index (resume targets)
    pub fn local_index(&self, name: &str) -> CompileResult<u32> {
        let slot = self.memory.lookup(name)?;
        if slot.is_global {
            return Err(CompileError::internal(format!(
                "resume slot {name} must be local"
            )));
        }
        Ok(slot.index)
    }

    /// Pool access for a collected string
    pub fn string(&self, s: &str) -> CompileResult<String> {
        let id = self.pool.get_id(s)?;
        Ok(if self.encrypted {
            format!("{}({})", self.names.decoder, id)
        } else {
            format!("{}[{}]", self.names.pool, id)
        })
    }

    /// Integer literal, sometimes dressed up as arithmetic
    pub fn int_expr(&self, prng: &mut Prng, v: i64) -> String {
        if !self.randomize || prng.chance(0.2) {
            return format!("{}", v);
        }
        if prng.chance(0.5) {
            let mask = prng.next_u32() as i32 as i64;
            format!("({} ^ {})", (v as i32 ^ mask as i32), mask)
        } else {
            let delta = prng.range(-0x4000, 0x4000);
            format!("({} + {})", v - delta, delta)
        }
    }

    /// A literal value expression
    pub fn literal(&self, prng: &mut Prng, value: &Literal) -> CompileResult<String> {
        Ok(match value {
            Literal::Number(n) => {
                if self.randomize && n.fract() == 0.0 && n.abs() < 2_147_483_647.0 {
                    self.int_expr(prng, *n as i64)
                } else {
                    number_to_string(*n)
                }
            }
            Literal::String(s) => self.string(s)?,
            Literal::Boolean(b) => if *b { "true" } else { "false" }.to_string(),
            Literal::Null => "null".to_string(),
            Literal::Undefined => "void 0".to_string(),
            Literal::StateRef(id) => {
                let v = self.ids.primary(*id)?;
                self.int_expr(prng, v)
            }
        })
    }

    /// Pick an emitted id for a jump to `target`: its trampoline or any
    /// of its entry points.
    fn jump_value(&self, prng: &mut Prng, target: StateId) -> CompileResult<i64> {
        if let Some(t) = self.ids.trampoline_of(target) {
            if prng.chance(0.5) {
                return Ok(t);
            }
        }
        let aliases = self.ids.aliases_of(target);
        if !aliases.is_empty() && prng.chance(0.5) {
            return Ok(aliases[prng.index(aliases.len())]);
        }
        self.ids.primary(target)
    }

    /// `S <- target` through the sink, then back to the loop head
    pub fn goto(
        &self,
        w: &mut JsWriter,
        prng: &mut Prng,
        target: StateId,
        current: i64,
    ) -> CompileResult<()> {
        let value = self.jump_value(prng, target)?;
        self.set_state_value(w, prng, value, Some(current));
        w.line("continue L;");
        Ok(())
    }

    pub fn set_state_value(&self, w: &mut JsWriter, prng: &mut Prng, value: i64, current: Option<i64>) {
        match &self.sink {
            StateSink::Direct => {
                let expr = self.int_expr(prng, value);
                w.line(format!("S = {};", expr));
            }
            StateSink::Horcrux { k } => {
                if let Some(current) = current {
                    if prng.chance(0.4) {
                        // Delta update keeps the split in sync.
                        let d = (current as i32) ^ (value as i32);
                        let which = &k[prng.index(3)];
                        w.line(format!("S ^= {};", d));
                        w.line(format!("{} ^= {};", which, d));
                        return;
                    }
                }
                let r1 = prng.next_u32() as i32;
                let r2 = prng.next_u32() as i32;
                let r3 = (value as i32) ^ r1 ^ r2;
                w.line(format!("S = {};", self.int_expr(prng, value)));
                w.line(format!("{} = {};", k[0], r1));
                w.line(format!("{} = {};", k[1], r2));
                w.line(format!("{} = {};", k[2], r3));
            }
        }
    }

    /// `S <- (expr)` for dynamic targets (finally routing, frame pops)
    pub fn set_state_expr(&self, w: &mut JsWriter, prng: &mut Prng, expr: &str) {
        match &self.sink {
            StateSink::Direct => w.line(format!("S = {};", expr)),
            StateSink::Horcrux { k } => {
                let r = prng.next_u32() as i32;
                w.line(format!("S = {};", expr));
                w.line(format!("{} = S ^ {};", k[0], r));
                w.line(format!("{} = {};", k[1], r));
                w.line(format!("{} = 0;", k[2]));
            }
        }
    }

    fn args_list(&self, args: &[CallArg]) -> CompileResult<String> {
        let mut parts = Vec::with_capacity(args.len());
        for arg in args {
            match arg {
                CallArg::Var(v) => parts.push(self.slot(v)?),
                CallArg::Spread(v) => parts.push(format!("...{}", self.slot(v)?)),
            }
        }
        Ok(parts.join(", "))
    }
}

/// Whether the op chain has already transferred control
#[derive(PartialEq)]
enum Flow {
    Open,
    Closed,
}

/// Emit the full body of one state instance: ops, then the fallthrough
/// transition.
pub fn emit_state_body(
    ctx: &EmitCtx,
    prng: &mut Prng,
    w: &mut JsWriter,
    ir: &Ir,
    state: &State,
    current: i64,
) -> CompileResult<()> {
    let flow = emit_op(ctx, prng, w, ir, state, &state.op, current)?;
    if flow == Flow::Closed {
        return Ok(());
    }
    match state.next {
        Some(next) => ctx.goto(w, prng, next, current)?,
        // A dangling open state ends the program like HALT.
        None => w.line("return { _: 1, v: void 0 };"),
    }
    Ok(())
}

fn emit_op(
    ctx: &EmitCtx,
    prng: &mut Prng,
    w: &mut JsWriter,
    ir: &Ir,
    state: &State,
    op: &Op,
    current: i64,
) -> CompileResult<Flow> {
    match op {
        Op::Sequence { ops } => {
            for inner in ops {
                if emit_op(ctx, prng, w, ir, state, inner, current)? == Flow::Closed {
                    return Ok(Flow::Closed);
                }
            }
            Ok(Flow::Open)
        }
        Op::Noop | Op::PostCall | Op::Dead => Ok(Flow::Open),
        Op::Goto { target } => {
            ctx.goto(w, prng, *target, current)?;
            Ok(Flow::Closed)
        }
        Op::Halt => {
            w.line("return { _: 1, v: void 0 };");
            Ok(Flow::Closed)
        }
        Op::FuncEntry { params, rest, .. } => {
            w.line(format!("{} = Tv;", ctx.slot("_THIS")?));
            w.line(format!("{} = Nt;", ctx.slot("_NEW_TARGET")?));
            for (i, p) in params.iter().enumerate() {
                w.line(format!("{} = A[{}];", ctx.slot(p)?, i));
            }
            if let Some(rest) = rest {
                w.line(format!("{} = A.slice({});", ctx.slot(rest)?, params.len()));
            }
            Ok(Flow::Open)
        }
        Op::Call { entry, args, .. } => {
            let resume = state
                .next
                .ok_or_else(|| CompileError::internal("CALL without a resume state"))?;
            let resume_id = ctx.ids.primary(resume)?;
            w.line(format!(
                "VS.push({{ s: {}, m: M, a: A }});",
                ctx.int_expr(prng, resume_id)
            ));
            w.line(format!("A = [{}];", ctx.args_list(args)?));
            w.line(format!("M = {}();", ctx.names.frame));
            ctx.goto(w, prng, *entry, current)?;
            Ok(Flow::Closed)
        }
        Op::RetrieveResult { to } => {
            w.line(format!("{} = R;", ctx.slot(to)?));
            Ok(Flow::Open)
        }
        Op::Return { value_var } => {
            match value_var {
                Some(v) => w.line(format!("R = {};", ctx.slot(v)?)),
                None => w.line("R = void 0;"),
            }
            emit_frame_pop(ctx, prng, w);
            Ok(Flow::Closed)
        }
        Op::Throw { value_var } => {
            w.line(format!("throw {};", ctx.slot(value_var)?));
            Ok(Flow::Closed)
        }
        Op::Yield {
            to,
            value_var,
            delegate,
        } => {
            emit_suspend(ctx, prng, w, state, to)?;
            let value = match value_var {
                Some(v) => ctx.slot(v)?,
                None => "void 0".to_string(),
            };
            let code = if *delegate { 2 } else { 0 };
            w.line(format!("return {{ _: {}, v: {} }};", code, value));
            Ok(Flow::Closed)
        }
        Op::Await { to, value_var } => {
            emit_suspend(ctx, prng, w, state, to)?;
            w.line(format!("return {{ _: 4, v: {} }};", ctx.slot(value_var)?));
            Ok(Flow::Closed)
        }
        Op::Assign { to, from } => {
            w.line(format!("{} = {};", ctx.slot(to)?, ctx.slot(from)?));
            Ok(Flow::Open)
        }
        Op::AssignLiteral { to, value } => {
            w.line(format!(
                "{} = {};",
                ctx.slot(to)?,
                ctx.literal(prng, value)?
            ));
            Ok(Flow::Open)
        }
        Op::AssignLiteralDirect { to, fragment } => {
            let value = emit_fragment(ctx, prng, fragment)?;
            w.line(format!("{} = {};", ctx.slot(to)?, value));
            Ok(Flow::Open)
        }
        Op::AssignGlobal { to, global_name } => {
            w.line(format!("{} = {};", ctx.slot(to)?, ctx.slot(global_name)?));
            Ok(Flow::Open)
        }
        Op::Binary {
            to,
            op,
            left,
            right,
        } => {
            w.line(format!(
                "{} = {} {} {};",
                ctx.slot(to)?,
                ctx.slot(left)?,
                op.as_str(),
                ctx.slot(right)?
            ));
            Ok(Flow::Open)
        }
        Op::Unary { to, op, operand } => {
            let spacer = match op {
                UnaryOp::Typeof | UnaryOp::Void | UnaryOp::Delete => " ",
                _ => "",
            };
            w.line(format!(
                "{} = {}{}{};",
                ctx.slot(to)?,
                op.as_str(),
                spacer,
                ctx.slot(operand)?
            ));
            Ok(Flow::Open)
        }
        Op::CondJump {
            test_var,
            true_state,
            false_state,
        } => {
            let t = ctx.jump_value(prng, *true_state)?;
            let f = ctx.jump_value(prng, *false_state)?;
            let expr = format!(
                "{} ? {} : {}",
                ctx.slot(test_var)?,
                ctx.int_expr(prng, t),
                ctx.int_expr(prng, f)
            );
            match &ctx.sink {
                StateSink::Direct => w.line(format!("S = {};", expr)),
                StateSink::Horcrux { .. } => ctx.set_state_expr(w, prng, &expr),
            }
            w.line("continue L;");
            Ok(Flow::Closed)
        }
        Op::MemberAccess {
            to,
            object,
            property,
        } => {
            w.line(format!(
                "{} = {}[{}];",
                ctx.slot(to)?,
                ctx.slot(object)?,
                ctx.string(property)?
            ));
            Ok(Flow::Open)
        }
        Op::MemberAccessComputed {
            to,
            object,
            key_var,
        } => {
            w.line(format!(
                "{} = {}[{}];",
                ctx.slot(to)?,
                ctx.slot(object)?,
                ctx.slot(key_var)?
            ));
            Ok(Flow::Open)
        }
        Op::MemberAccessGlobal {
            to,
            global_name,
            property,
        } => {
            w.line(format!(
                "{} = {}[{}];",
                ctx.slot(to)?,
                ctx.slot(global_name)?,
                ctx.string(property)?
            ));
            Ok(Flow::Open)
        }
        Op::MemberAssign {
            object,
            property,
            value_var,
        } => {
            w.line(format!(
                "{}[{}] = {};",
                ctx.slot(object)?,
                ctx.string(property)?,
                ctx.slot(value_var)?
            ));
            Ok(Flow::Open)
        }
        Op::MemberAssignComputed {
            object,
            key_var,
            value_var,
        } => {
            w.line(format!(
                "{}[{}] = {};",
                ctx.slot(object)?,
                ctx.slot(key_var)?,
                ctx.slot(value_var)?
            ));
            Ok(Flow::Open)
        }
        Op::CreateArray { to, elements } => {
            let mut parts = Vec::with_capacity(elements.len());
            for elem in elements {
                match elem {
                    ArrayItem::Var(v) => parts.push(ctx.slot(v)?),
                    ArrayItem::Spread(v) => parts.push(format!("...{}", ctx.slot(v)?)),
                    ArrayItem::Hole => parts.push(String::new()),
                }
            }
            let trailing_hole = matches!(elements.last(), Some(ArrayItem::Hole));
            let body = parts.join(", ");
            let tail = if trailing_hole { "," } else { "" };
            w.line(format!("{} = [{}{}];", ctx.slot(to)?, body, tail));
            Ok(Flow::Open)
        }
        Op::CreateObject { to, properties } => {
            let mut parts = Vec::with_capacity(properties.len());
            for prop in properties {
                match prop {
                    ObjectItem::KeyValue { key, value_var } => parts.push(format!(
                        "[{}]: {}",
                        ctx.string(key)?,
                        ctx.slot(value_var)?
                    )),
                    ObjectItem::Computed { key_var, value_var } => parts.push(format!(
                        "[{}]: {}",
                        ctx.slot(key_var)?,
                        ctx.slot(value_var)?
                    )),
                    ObjectItem::Spread { value_var } => {
                        parts.push(format!("...{}", ctx.slot(value_var)?))
                    }
                }
            }
            w.line(format!("{} = {{ {} }};", ctx.slot(to)?, parts.join(", ")));
            Ok(Flow::Open)
        }
        Op::NewInstance { to, callee, args } => {
            w.line(format!(
                "{} = new ({})({});",
                ctx.slot(to)?,
                ctx.slot(callee)?,
                ctx.args_list(args)?
            ));
            Ok(Flow::Open)
        }
        Op::NewExternalInstance {
            to,
            callee_var,
            args,
        } => {
            w.line(format!(
                "{} = new ({})({});",
                ctx.slot(to)?,
                ctx.slot(callee_var)?,
                ctx.args_list(args)?
            ));
            Ok(Flow::Open)
        }
        Op::MethodCall {
            to,
            object,
            method,
            key_var,
            args,
        } => {
            let key = match key_var {
                Some(k) => ctx.slot(k)?,
                None => ctx.string(method)?,
            };
            w.line(format!(
                "{} = {}[{}]({});",
                ctx.slot(to)?,
                ctx.slot(object)?,
                key,
                ctx.args_list(args)?
            ));
            Ok(Flow::Open)
        }
        Op::ExternalCall {
            to,
            callee_var,
            this_object,
            args,
        } => {
            match this_object {
                Some(this_obj) => w.line(format!(
                    "{} = {}.call({}{}{});",
                    ctx.slot(to)?,
                    ctx.slot(callee_var)?,
                    ctx.slot(this_obj)?,
                    if args.is_empty() { "" } else { ", " },
                    ctx.args_list(args)?
                )),
                None => w.line(format!(
                    "{} = (0, {})({});",
                    ctx.slot(to)?,
                    ctx.slot(callee_var)?,
                    ctx.args_list(args)?
                )),
            }
            Ok(Flow::Open)
        }
        Op::PushCatchHandler { target } => {
            let id = ctx.ids.primary(*target)?;
            w.line(format!("M[M[2]++] = {};", ctx.int_expr(prng, id)));
            Ok(Flow::Open)
        }
        Op::PopCatchHandler => {
            w.line("M[2]--;");
            Ok(Flow::Open)
        }
        Op::FinallyDispatch { normal } => {
            let fin = ctx.slot("_FIN")?;
            let finv = ctx.slot("_FIN_V")?;
            w.open(&format!("if ({} === 1)", fin));
            w.line(format!("R = {};", finv));
            emit_frame_pop(ctx, prng, w);
            w.close("");
            w.open(&format!("if ({} === 2 || {} === 3)", fin, fin));
            ctx.set_state_expr(w, prng, &finv);
            w.line("continue L;");
            w.close("");
            w.open(&format!("if ({} === 4)", fin));
            w.line(format!("throw {};", finv));
            w.close("");
            ctx.goto(w, prng, *normal, current)?;
            Ok(Flow::Closed)
        }
        Op::ExecuteStatement { statement } => {
            w.raw_block(&print_statement_to_string(statement));
            Ok(Flow::Open)
        }
    }
}

/// Return-or-pop shared by RETURN and the finally return path
fn emit_frame_pop(ctx: &EmitCtx, prng: &mut Prng, w: &mut JsWriter) {
    w.line("if (!VS.length) return { _: 1, v: R };");
    w.open("");
    w.line("const F = VS.pop();");
    w.line("M = F.m;");
    w.line("A = F.a;");
    ctx.set_state_expr(w, prng, "F.s");
    w.close("");
    w.line("continue L;");
}

/// Save the resume context before a YIELD/AWAIT
fn emit_suspend(
    ctx: &EmitCtx,
    prng: &mut Prng,
    w: &mut JsWriter,
    state: &State,
    to: &str,
) -> CompileResult<()> {
    let next = state
        .next
        .ok_or_else(|| CompileError::internal("suspension without a resume state"))?;
    let next_id = ctx.ids.primary(next)?;
    w.line("C.M = M;");
    w.line("C.A = A;");
    w.line("C.VS = VS;");
    w.line(format!("C.S = {};", ctx.int_expr(prng, next_id)));
    w.line(format!("C.T = {};", ctx.local_index(to)?));
    Ok(())
}

/// Render an embedded fragment as a JS expression
pub fn emit_fragment(
    ctx: &EmitCtx,
    prng: &mut Prng,
    fragment: &Fragment,
) -> CompileResult<String> {
    match fragment {
        Fragment::Expr(expr) => Ok(vortex_ast::print::print_expression_to_string(expr)),
        Fragment::FuncRef {
            entry,
            captured,
            is_generator,
            is_async,
            ..
        } => {
            let entry_id = ctx.ids.primary(*entry)?;
            let caps: Vec<String> = captured
                .iter()
                .map(|c| {
                    // The declaring frame is snapshotted as FM; values read
                    // live at call time.
                    let slot = ctx.memory.lookup(c)?;
                    Ok(if slot.is_global {
                        format!("{}[{}]", ctx.names.gm, slot.index)
                    } else {
                        format!("FM[{}]", slot.index)
                    })
                })
                .collect::<CompileResult<Vec<_>>>()?;
            let body = wrapper_body(ctx, prng, entry_id, &caps, *is_generator, *is_async);
            Ok(if captured.is_empty() {
                body
            } else {
                format!("((FM) => ({}))(M)", body)
            })
        }
    }
}

/// The host-side wrapper function entering the VM at `entry_id`
pub fn wrapper_body(
    ctx: &EmitCtx,
    prng: &mut Prng,
    entry_id: i64,
    caps: &[String],
    is_generator: bool,
    is_async: bool,
) -> String {
    let v = &ctx.names.vm;
    let nf = &ctx.names.frame;
    let cap_tail = if caps.is_empty() {
        String::new()
    } else {
        format!(", {}", caps.join(", "))
    };
    let ctx_init = format!(
        "const C = {{ M: {}(), S: {}, T: null, A: [...a{}], VS: [] }};",
        nf,
        ctx.int_expr(prng, entry_id),
        cap_tail
    );
    let sentinel = ctx
        .string(crate::strings::GENERATOR_SENTINEL)
        .unwrap_or_else(|_| "\"@@VRXT\"".to_string());

    match (is_generator, is_async) {
        (false, false) => format!(
            "function (...a) {{ {ctx_init} return {v}(C, void 0, false, this, new.target).v; }}"
        ),
        (false, true) => format!(
            "function (...a) {{ {ctx_init} const step = (r) => r._ === 4 \
             ? Promise.resolve(r.v).then((w) => step({v}(C, w, false, this, void 0)), (e) => step({v}(C, e, true, this, void 0))) \
             : Promise.resolve(r.v); return step({v}(C, void 0, false, this, void 0)); }}"
        ),
        (true, false) => format!(
            "function* (...a) {{ {ctx_init} let I, E = false; for (;;) {{ \
             const r = {v}(C, I, E, this, void 0); \
             if (r._ === 1) return r.v; \
             let ok = false; \
             try {{ I = r._ === 2 ? yield* r.v : yield r.v; E = false; ok = true; }} \
             catch (e) {{ I = e; E = true; ok = true; }} \
             finally {{ if (!ok) {{ try {{ {v}(C, {sentinel}, true, this, void 0); }} catch (e2) {{ if (e2 !== {sentinel}) throw e2; }} }} }} }} }}"
        ),
        (true, true) => format!(
            "async function* (...a) {{ {ctx_init} let I, E = false; for (;;) {{ \
             const r = {v}(C, I, E, this, void 0); \
             if (r._ === 1) return r.v; \
             if (r._ === 4) {{ try {{ I = await r.v; E = false; }} catch (e) {{ I = e; E = true; }} continue; }} \
             let ok = false; \
             try {{ I = r._ === 2 ? yield* r.v : yield r.v; E = false; ok = true; }} \
             catch (e) {{ I = e; E = true; ok = true; }} \
             finally {{ if (!ok) {{ try {{ {v}(C, {sentinel}, true, this, void 0); }} catch (e2) {{ if (e2 !== {sentinel}) throw e2; }} }} }} }} }}"
        ),
    }
}
