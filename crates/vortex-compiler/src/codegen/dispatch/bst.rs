//! Binary-search-tree dispatcher
//!
//! A recursive if/else tree over the emitted ids. Each node randomly
//! picks a strategy: a ghost branch against an impossible id, modulo
//! bucketing, single-state isolation, or a jagged pivot split with a
//! randomly flipped comparison. Leaves guard with strict equality.

use super::super::opaque::OpaquePool;
use super::super::ops::EmitCtx;
use super::super::writer::JsWriter;
use super::{emit_entry_body, emit_junk, emit_unknown, maybe_inject_junk, Entry};
use crate::error::CompileResult;
use crate::ir::Ir;
use crate::rng::Prng;

pub(super) fn emit(
    ctx: &EmitCtx,
    prng: &mut Prng,
    w: &mut JsWriter,
    ir: &Ir,
    opaque: &OpaquePool,
    mut entries: Vec<Entry>,
) -> CompileResult<()> {
    entries.sort_by_key(|e| e.value);
    let mut builder = Builder {
        ctx,
        ir,
        opaque,
        ghost_budget: (entries.len() / 4).max(2),
    };
    builder.node(prng, w, &entries)?;
    emit_unknown(w);
    Ok(())
}

struct Builder<'a> {
    ctx: &'a EmitCtx<'a>,
    ir: &'a Ir,
    opaque: &'a OpaquePool,
    ghost_budget: usize,
}

impl Builder<'_> {
    fn node(&mut self, prng: &mut Prng, w: &mut JsWriter, entries: &[Entry]) -> CompileResult<()> {
        if entries.is_empty() {
            return Ok(());
        }
        if entries.len() == 1 {
            let entry = &entries[0];
            w.open(&format!("if (S === {})", entry.value));
            maybe_inject_junk(self.ctx, prng, w, self.opaque);
            emit_entry_body(self.ctx, prng, w, self.ir, entry)?;
            w.close("");
            return Ok(());
        }

        match prng.index(4) {
            0 if self.ghost_budget > 0 => self.ghost(prng, w, entries),
            1 => self.modulo(prng, w, entries),
            2 => self.isolate(prng, w, entries),
            _ => self.pivot(prng, w, entries),
        }
    }

    /// Impossible comparison with a dead body, then the real tree
    fn ghost(&mut self, prng: &mut Prng, w: &mut JsWriter, entries: &[Entry]) -> CompileResult<()> {
        self.ghost_budget -= 1;
        let fake = self.ctx.ids.fresh_value(prng);
        w.open(&format!("if (S === {})", fake));
        emit_junk(self.ctx, prng, w);
        emit_junk(self.ctx, prng, w);
        w.close("");
        w.open("else");
        self.node(prng, w, entries)?;
        w.close("");
        Ok(())
    }

    /// Partition by `|S| mod m`, m in {2, 3}
    fn modulo(&mut self, prng: &mut Prng, w: &mut JsWriter, entries: &[Entry]) -> CompileResult<()> {
        let m = *prng.pick(&[2i64, 3]);
        let mut groups: Vec<Vec<Entry>> = vec![Vec::new(); m as usize];
        for &entry in entries {
            let bucket = entry.value.rem_euclid(m) as usize;
            groups[bucket].push(entry);
        }
        // Degenerate partition makes no progress; fall back to a split.
        if groups.iter().any(|g| g.len() == entries.len()) {
            return self.pivot(prng, w, entries);
        }
        let mut first = true;
        for (r, group) in groups.iter().enumerate() {
            if group.is_empty() {
                continue;
            }
            let head = format!("if (((S % {m}) + {m}) % {m} === {r})");
            if first {
                w.open(&head);
                first = false;
            } else {
                w.open(&format!("else {}", head));
            }
            self.node(prng, w, group)?;
            w.close("");
        }
        Ok(())
    }

    /// Pull one random state out in front
    fn isolate(&mut self, prng: &mut Prng, w: &mut JsWriter, entries: &[Entry]) -> CompileResult<()> {
        let k = prng.index(entries.len());
        let picked = entries[k];
        let rest: Vec<Entry> = entries
            .iter()
            .copied()
            .enumerate()
            .filter(|(i, _)| *i != k)
            .map(|(_, e)| e)
            .collect();
        w.open(&format!("if (S === {})", picked.value));
        emit_entry_body(self.ctx, prng, w, self.ir, &picked)?;
        w.close("");
        w.open("else");
        self.node(prng, w, &rest)?;
        w.close("");
        Ok(())
    }

    /// Split at a jagged pivot (15%..85% of the sorted span), randomly
    /// flipping the comparison direction.
    fn pivot(&mut self, prng: &mut Prng, w: &mut JsWriter, entries: &[Entry]) -> CompileResult<()> {
        let lo = (entries.len() * 15) / 100;
        let hi = (entries.len() * 85) / 100;
        let at = if lo + 1 >= hi.max(1) {
            entries.len() / 2
        } else {
            prng.range(lo.max(1) as i64, hi as i64) as usize
        }
        .clamp(1, entries.len() - 1);
        let pivot = entries[at].value;
        let (left, right) = entries.split_at(at);
        if prng.chance(0.5) {
            w.open(&format!("if (S < {})", pivot));
            self.node(prng, w, left)?;
            w.close("");
            w.open("else");
            self.node(prng, w, right)?;
            w.close("");
        } else {
            w.open(&format!("if (S >= {})", pivot));
            self.node(prng, w, right)?;
            w.close("");
            w.open("else");
            self.node(prng, w, left)?;
            w.close("");
        }
        Ok(())
    }
}
