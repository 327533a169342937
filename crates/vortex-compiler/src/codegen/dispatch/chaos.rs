//! Chaos dispatcher
//!
//! The aggressive shape. The graph is inflated with alias entry points
//! and single-hop trampolines, the state variable is split across three
//! horcrux variables whose XOR always equals `S`, and the search tree
//! mixes opaque-predicate fake branches (with honeypots), bitwise
//! partitioning, modulo grouping and binary splits over the salted
//! combined value `CS`.

use super::super::opaque::OpaquePool;
use super::super::ops::{EmitCtx, IdSpace};
use super::super::writer::JsWriter;
use super::{emit_entry_body, emit_honeypot, emit_unknown, Entry};
use crate::error::CompileResult;
use crate::ir::Ir;
use crate::rng::Prng;

/// Inflate the id space with aliases and trampolines before emission
pub fn prepare_chaos(ids: &mut IdSpace, ir: &Ir, prng: &mut Prng) {
    for id in ir.live_ids() {
        if prng.chance(0.2) {
            let value = ids.fresh_value(prng);
            ids.add_alias(id, value);
        }
        if prng.chance(0.15) {
            let value = ids.fresh_value(prng);
            ids.set_trampoline(id, value);
        }
    }
}

pub(super) fn emit(
    ctx: &EmitCtx,
    prng: &mut Prng,
    w: &mut JsWriter,
    ir: &Ir,
    opaque: &OpaquePool,
    entries: Vec<Entry>,
) -> CompileResult<()> {
    let salt = prng.next_u32() as i32;
    w.line(format!("const CS = (K0 ^ K1 ^ K2) ^ {};", salt));

    let mut masked: Vec<(i64, Entry)> = entries
        .into_iter()
        .map(|e| ((((e.value as i32) ^ salt) as i64), e))
        .collect();
    masked.sort_by_key(|(m, _)| *m);

    let mut builder = Builder {
        ctx,
        ir,
        opaque,
        fake_budget: (masked.len() / 3).max(3),
    };
    builder.node(prng, w, &masked)?;
    emit_unknown(w);
    Ok(())
}

struct Builder<'a> {
    ctx: &'a EmitCtx<'a>,
    ir: &'a Ir,
    opaque: &'a OpaquePool,
    fake_budget: usize,
}

impl Builder<'_> {
    fn node(
        &mut self,
        prng: &mut Prng,
        w: &mut JsWriter,
        entries: &[(i64, Entry)],
    ) -> CompileResult<()> {
        if entries.is_empty() {
            return Ok(());
        }
        if entries.len() == 1 {
            let (masked, entry) = &entries[0];
            w.open(&format!("if (CS === {})", masked));
            emit_entry_body(self.ctx, prng, w, self.ir, entry)?;
            w.close("");
            return Ok(());
        }
        match prng.index(4) {
            0 if self.fake_budget > 0 => self.fake_branch(prng, w, entries),
            1 => self.bitwise(prng, w, entries),
            2 => self.modulo(prng, w, entries),
            _ => self.split(prng, w, entries),
        }
    }

    /// Opaque-predicate branch whose taken side is a honeypot
    fn fake_branch(
        &mut self,
        prng: &mut Prng,
        w: &mut JsWriter,
        entries: &[(i64, Entry)],
    ) -> CompileResult<()> {
        self.fake_budget -= 1;
        w.open(&format!("if ({})", self.opaque.falsy(prng)));
        emit_honeypot(self.ctx, prng, w);
        w.close("");
        w.open("else");
        self.node(prng, w, entries)?;
        w.close("");
        Ok(())
    }

    /// Partition by one bit of the salted value
    fn bitwise(
        &mut self,
        prng: &mut Prng,
        w: &mut JsWriter,
        entries: &[(i64, Entry)],
    ) -> CompileResult<()> {
        let bit = prng.range(0, 31) as u32;
        let mut zero = Vec::new();
        let mut one = Vec::new();
        for &(masked, entry) in entries {
            if ((masked as i32 as u32) >> bit) & 1 == 0 {
                zero.push((masked, entry));
            } else {
                one.push((masked, entry));
            }
        }
        if zero.is_empty() || one.is_empty() {
            return self.split(prng, w, entries);
        }
        w.open(&format!("if (((CS >>> {}) & 1) === 0)", bit));
        self.node(prng, w, &zero)?;
        w.close("");
        w.open("else");
        self.node(prng, w, &one)?;
        w.close("");
        Ok(())
    }

    fn modulo(
        &mut self,
        prng: &mut Prng,
        w: &mut JsWriter,
        entries: &[(i64, Entry)],
    ) -> CompileResult<()> {
        let m = *prng.pick(&[2i64, 3, 5]);
        let mut groups: Vec<Vec<(i64, Entry)>> = vec![Vec::new(); m as usize];
        for &(masked, entry) in entries {
            groups[masked.rem_euclid(m) as usize].push((masked, entry));
        }
        if groups.iter().any(|g| g.len() == entries.len()) {
            return self.split(prng, w, entries);
        }
        let mut first = true;
        for (r, group) in groups.iter().enumerate() {
            if group.is_empty() {
                continue;
            }
            let head = format!("if (((CS % {m}) + {m}) % {m} === {r})");
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

    fn split(
        &mut self,
        prng: &mut Prng,
        w: &mut JsWriter,
        entries: &[(i64, Entry)],
    ) -> CompileResult<()> {
        let mid = entries.len() / 2;
        let pivot = entries[mid].0;
        if prng.chance(0.5) {
            w.open(&format!("if (CS < {})", pivot));
            self.node(prng, w, &entries[..mid])?;
            w.close("");
            w.open("else");
            self.node(prng, w, &entries[mid..])?;
            w.close("");
        } else {
            w.open(&format!("if (CS >= {})", pivot));
            self.node(prng, w, &entries[mid..])?;
            w.close("");
            w.open("else");
            self.node(prng, w, &entries[..mid])?;
            w.close("");
        }
        Ok(())
    }
}
