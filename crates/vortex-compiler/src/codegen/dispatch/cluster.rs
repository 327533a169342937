//! Hierarchical cluster dispatcher
//!
//! States are pre-salted (`masked = id ^ SALT`) and bucketed by
//! `|masked| mod B`. A small bucket count daisy-chains if/else; larger
//! counts build a BST over the bucket index. Each bucket interior is a
//! switch on the salted state or an internal equality tree, chosen per
//! bucket.

use super::super::opaque::OpaquePool;
use super::super::ops::EmitCtx;
use super::super::writer::JsWriter;
use super::{emit_entry_body, emit_unknown, maybe_inject_junk, Entry};
use crate::error::CompileResult;
use crate::ir::Ir;
use crate::rng::Prng;

pub(super) fn emit(
    ctx: &EmitCtx,
    prng: &mut Prng,
    w: &mut JsWriter,
    ir: &Ir,
    opaque: &OpaquePool,
    entries: Vec<Entry>,
) -> CompileResult<()> {
    let salt = prng.next_u32() as i32;
    let bucket_count = ((entries.len() + 4) / 5).max(3);

    // Pre-salted ids, grouped.
    let mut buckets: Vec<Vec<(i64, Entry)>> = vec![Vec::new(); bucket_count];
    for entry in entries {
        let masked = ((entry.value as i32) ^ salt) as i64;
        let bucket = masked.unsigned_abs() as usize % bucket_count;
        buckets[bucket].push((masked, entry));
    }

    w.line(format!("const DS = S ^ {};", salt));
    w.line(format!("const BK = Math.abs(DS) % {};", bucket_count));

    let indices: Vec<usize> = (0..bucket_count).filter(|i| !buckets[*i].is_empty()).collect();
    if indices.len() <= 3 {
        // Linear daisy chain.
        let mut first = true;
        for &i in &indices {
            let head = format!("if (BK === {})", i);
            if first {
                w.open(&head);
                first = false;
            } else {
                w.open(&format!("else {}", head));
            }
            emit_bucket(ctx, prng, w, ir, opaque, &buckets[i])?;
            w.close("");
        }
    } else {
        bucket_tree(ctx, prng, w, ir, opaque, &buckets, &indices)?;
    }
    emit_unknown(w);
    Ok(())
}

/// BST over bucket indices
fn bucket_tree(
    ctx: &EmitCtx,
    prng: &mut Prng,
    w: &mut JsWriter,
    ir: &Ir,
    opaque: &OpaquePool,
    buckets: &[Vec<(i64, Entry)>],
    indices: &[usize],
) -> CompileResult<()> {
    if indices.len() == 1 {
        let i = indices[0];
        w.open(&format!("if (BK === {})", i));
        emit_bucket(ctx, prng, w, ir, opaque, &buckets[i])?;
        w.close("");
        return Ok(());
    }
    let mid = indices.len() / 2;
    let pivot = indices[mid];
    w.open(&format!("if (BK < {})", pivot));
    bucket_tree(ctx, prng, w, ir, opaque, buckets, &indices[..mid])?;
    w.close("");
    w.open("else");
    bucket_tree(ctx, prng, w, ir, opaque, buckets, &indices[mid..])?;
    w.close("");
    Ok(())
}

/// Bucket interior: shuffled switch on DS, or an equality tree
fn emit_bucket(
    ctx: &EmitCtx,
    prng: &mut Prng,
    w: &mut JsWriter,
    ir: &Ir,
    opaque: &OpaquePool,
    bucket: &[(i64, Entry)],
) -> CompileResult<()> {
    if bucket.len() > 1 && prng.chance(0.5) {
        let mut shuffled: Vec<(i64, Entry)> = bucket.to_vec();
        prng.shuffle(&mut shuffled);
        w.open("switch (DS)");
        for (masked, entry) in &shuffled {
            w.open(&format!("case {}:", masked));
            maybe_inject_junk(ctx, prng, w, opaque);
            emit_entry_body(ctx, prng, w, ir, entry)?;
            w.close("");
        }
        w.close("");
    } else {
        let mut sorted: Vec<(i64, Entry)> = bucket.to_vec();
        sorted.sort_by_key(|(m, _)| *m);
        equality_tree(ctx, prng, w, ir, opaque, &sorted)?;
    }
    Ok(())
}

fn equality_tree(
    ctx: &EmitCtx,
    prng: &mut Prng,
    w: &mut JsWriter,
    ir: &Ir,
    opaque: &OpaquePool,
    entries: &[(i64, Entry)],
) -> CompileResult<()> {
    if entries.is_empty() {
        return Ok(());
    }
    if entries.len() == 1 {
        let (masked, entry) = &entries[0];
        w.open(&format!("if (DS === {})", masked));
        maybe_inject_junk(ctx, prng, w, opaque);
        emit_entry_body(ctx, prng, w, ir, entry)?;
        w.close("");
        return Ok(());
    }
    let mid = entries.len() / 2;
    let pivot = entries[mid].0;
    w.open(&format!("if (DS < {})", pivot));
    equality_tree(ctx, prng, w, ir, opaque, &entries[..mid])?;
    w.close("");
    w.open("else");
    equality_tree(ctx, prng, w, ir, opaque, &entries[mid..])?;
    w.close("");
    Ok(())
}
