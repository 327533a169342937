//! Dispatcher shapes
//!
//! Four interchangeable control structures around the same per-state
//! bodies: a flat switch, a recursive if/else search tree, a salted
//! hierarchical bucket tree and the chaos shape (aliases, trampolines and
//! a three-way split state variable). All shapes end unknown ids with a
//! logged break of the dispatch loop.

mod bst;
mod chaos;
mod cluster;

pub use chaos::prepare_chaos;

use super::opaque::OpaquePool;
use super::ops::{emit_state_body, EmitCtx};
use super::writer::JsWriter;
use crate::error::{CompileError, CompileResult};
use crate::ir::{Ir, StateId};
use crate::options::DispatcherKind;
use crate::rng::Prng;

/// One dispatch target: a real state (under a primary or alias id) or a
/// chaos trampoline hop.
#[derive(Debug, Clone, Copy)]
pub struct Entry {
    pub value: i64,
    pub kind: EntryKind,
}

#[derive(Debug, Clone, Copy)]
pub enum EntryKind {
    State(StateId),
    Trampoline(StateId),
}

/// Emit the dispatcher body (inside the loop's try block)
pub fn emit_dispatcher(
    kind: DispatcherKind,
    ctx: &EmitCtx,
    prng: &mut Prng,
    w: &mut JsWriter,
    ir: &Ir,
    opaque: &OpaquePool,
) -> CompileResult<()> {
    let mut entries: Vec<Entry> = ctx
        .ids
        .entry_points(ir)
        .into_iter()
        .map(|(value, id)| Entry {
            value,
            kind: EntryKind::State(id),
        })
        .collect();
    for id in ir.live_ids() {
        if let Some(value) = ctx.ids.trampoline_of(id) {
            entries.push(Entry {
                value,
                kind: EntryKind::Trampoline(id),
            });
        }
    }

    match kind {
        DispatcherKind::Switch => emit_switch(ctx, prng, w, ir, opaque, entries),
        DispatcherKind::Bst => bst::emit(ctx, prng, w, ir, opaque, entries),
        DispatcherKind::Cluster => cluster::emit(ctx, prng, w, ir, opaque, entries),
        DispatcherKind::Chaos => chaos::emit(ctx, prng, w, ir, opaque, entries),
    }
}

/// The labeled loop head for a shape; cluster varies its loop statement
pub fn loop_shape(kind: DispatcherKind, prng: &mut Prng) -> (&'static str, &'static str) {
    match kind {
        DispatcherKind::Cluster => *prng.pick(&[
            ("L: for (;;)", ""),
            ("L: while (true)", ""),
            ("L: do", " while (true);"),
        ]),
        _ => ("L: for (;;)", ""),
    }
}

fn emit_switch(
    ctx: &EmitCtx,
    prng: &mut Prng,
    w: &mut JsWriter,
    ir: &Ir,
    opaque: &OpaquePool,
    mut entries: Vec<Entry>,
) -> CompileResult<()> {
    prng.shuffle(&mut entries);
    w.open("switch (S)");
    for entry in &entries {
        w.open(&format!("case {}:", entry.value));
        maybe_inject_junk(ctx, prng, w, opaque);
        emit_entry_body(ctx, prng, w, ir, entry)?;
        w.close("");
    }
    w.open("default:");
    emit_unknown(w);
    w.close("");
    w.close("");
    Ok(())
}

/// The code run when dispatch lands on an entry
pub(super) fn emit_entry_body(
    ctx: &EmitCtx,
    prng: &mut Prng,
    w: &mut JsWriter,
    ir: &Ir,
    entry: &Entry,
) -> CompileResult<()> {
    match entry.kind {
        EntryKind::State(id) => {
            let state = ir
                .get(id)
                .ok_or(CompileError::InvalidStateReference { id })?;
            emit_state_body(ctx, prng, w, ir, state, entry.value)
        }
        EntryKind::Trampoline(target) => {
            let value = ctx.ids.primary(target)?;
            ctx.set_state_value(w, prng, value, Some(entry.value));
            w.line("continue L;");
            Ok(())
        }
    }
}

/// Unknown-state fallback: report and stop the loop, not the host
pub(super) fn emit_unknown(w: &mut JsWriter) {
    w.line("console.error(\"bad state\", S);");
    w.line("break L;");
}

/// Dead branch guarded by an always-false predicate
pub(super) fn maybe_inject_junk(
    ctx: &EmitCtx,
    prng: &mut Prng,
    w: &mut JsWriter,
    opaque: &OpaquePool,
) {
    if !opaque.roll(prng) {
        return;
    }
    w.open(&format!("if ({})", opaque.falsy(prng)));
    emit_junk(ctx, prng, w);
    w.close("");
}

/// Plausible-looking garbage for dead branches
pub(super) fn emit_junk(ctx: &EmitCtx, prng: &mut Prng, w: &mut JsWriter) {
    let slot = prng.range(0, ctx.eh_base.max(1) as i64);
    match prng.index(3) {
        0 => w.line(format!("M[{}] = (M[{}] || 0) + {};", slot, slot, prng.range(1, 9))),
        1 => w.line(format!("S ^= {};", prng.next_u32() as i32)),
        _ => w.line(format!("M[{}] = M[{}];", slot, prng.range(0, ctx.eh_base.max(1) as i64))),
    }
}

/// Honeypot: mutate memory, then trap
pub(super) fn emit_honeypot(ctx: &EmitCtx, prng: &mut Prng, w: &mut JsWriter) {
    let slot = prng.range(0, ctx.eh_base.max(1) as i64);
    w.line(format!("M[{}] = (M[{}] || 0) + 1;", slot, slot));
    w.line("for (;;) {}");
}
