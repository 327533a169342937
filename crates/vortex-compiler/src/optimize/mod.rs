//! IR optimization pipeline
//!
//! Runs the pass catalog to a fixed point. Every pass executes inside a
//! transaction: the state vector is snapshotted first, and if the pass
//! leaves a dangling reference behind the snapshot is restored and the
//! rollback counter bumped. A mark-and-sweep from state 0 and every
//! function entry closes each iteration.

mod cse;
mod dse;
mod fold;
mod jumps;
mod merge;
mod tco;

use crate::ir::{Ir, Literal, Op, StateId};
use crate::memory::MemoryMap;
use once_cell::sync::Lazy;
use regex::Regex;
use rustc_hash::FxHashMap;
use vortex_ast::{walk_expression, walk_statement, Expression, Visitor};

/// Hard cap on fixed-point iterations
pub const MAX_ITERATIONS: usize = 25;

/// Statistics about an optimization run
#[derive(Debug, Clone, Copy, Default)]
pub struct OptStats {
    /// Total transformations applied across all passes
    pub transforms: usize,
    /// Passes undone by the integrity guard
    pub rollbacks: usize,
    /// Iterations until the fixed point (or the cap)
    pub iterations: usize,
}

pub struct Optimizer<'a> {
    memory: &'a mut MemoryMap,
    max_superblock: usize,
    tco_counter: u32,
}

impl<'a> Optimizer<'a> {
    pub fn new(memory: &'a mut MemoryMap, max_superblock: usize) -> Self {
        Self {
            memory,
            max_superblock: max_superblock.max(2),
            tco_counter: 0,
        }
    }

    /// Run the pipeline to a fixed point
    pub fn optimize(&mut self, ir: &mut Ir) -> OptStats {
        let mut stats = OptStats::default();
        type Pass<'a> = fn(&mut Optimizer<'a>, &mut Ir) -> usize;
        let passes: [Pass<'a>; 13] = [
            fold::constant_fold as Pass<'a>,
            fold::boolean_logic as Pass<'a>,
            fold::strength_reduction as Pass<'a>,
            cse::local_cse as Pass<'a>,
            fold::reassociate as Pass<'a>,
            dse::dead_stores as Pass<'a>,
            jumps::prune_branches as Pass<'a>,
            jumps::thread_jumps as Pass<'a>,
            tco::tail_calls as Pass<'a>,
            merge::merge_blocks as Pass<'a>,
            merge::propagate_copies as Pass<'a>,
            jumps::elide_trivial as Pass<'a>,
            jumps::remove_identities as Pass<'a>,
        ];

        for iteration in 0..MAX_ITERATIONS {
            stats.iterations = iteration + 1;
            let mut changed = 0usize;

            for pass in passes {
                let snapshot_states = ir.states.clone();
                let snapshot_table = ir.function_table.clone();
                let n = pass(self, ir);
                if n > 0 && !graph_is_sound(ir) {
                    ir.states = snapshot_states;
                    ir.function_table = snapshot_table;
                    stats.rollbacks += 1;
                } else {
                    changed += n;
                }
            }

            ir.sweep_unreachable();
            if changed == 0 {
                break;
            }
            stats.transforms += changed;
        }
        stats
    }

    pub(crate) fn memory_mut(&mut self) -> &mut MemoryMap {
        self.memory
    }

    pub(crate) fn max_superblock(&self) -> usize {
        self.max_superblock
    }

    pub(crate) fn fresh_tco_temp(&mut self) -> String {
        let name = format!("_tco${}", self.tco_counter);
        self.tco_counter += 1;
        self.memory.allocate(&name, false);
        name
    }
}

/// Graph integrity: every reference of every live state resolves to a live
/// state, every function entry is live, and state 0 is live.
pub fn graph_is_sound(ir: &Ir) -> bool {
    if !ir.is_live(0) {
        return false;
    }
    for entry in &ir.function_table {
        if !ir.is_live(entry.entry) {
            return false;
        }
        if !matches!(ir.state(entry.entry).op, Op::FuncEntry { .. }) {
            return false;
        }
    }
    for state in &ir.states {
        if matches!(state.op, Op::Dead) {
            continue;
        }
        let mut ok = true;
        Ir::for_each_ref(state, &mut |id| {
            if !ir.is_live(id) {
                ok = false;
            }
        });
        if !ok {
            return false;
        }
    }
    true
}

// ----------------------------------------------------------------------
// Shared analysis
// ----------------------------------------------------------------------

static TEMP_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^_(?:temp|tco)\$\d+$").unwrap());

/// Whether a name is a generated single-assignment temporary
pub(crate) fn is_temp(name: &str) -> bool {
    TEMP_RE.is_match(name)
}

/// Reads per slot name across the whole program, including conservative
/// scans of embedded AST payloads.
pub(crate) fn read_counts(ir: &Ir) -> FxHashMap<String, usize> {
    let mut counts: FxHashMap<String, usize> = FxHashMap::default();
    for state in &ir.states {
        if matches!(state.op, Op::Dead) {
            continue;
        }
        state.op.for_each_read(&mut |name| {
            *counts.entry(name.to_string()).or_default() += 1;
        });
        count_embedded_reads(&state.op, &mut counts);
    }
    counts
}

/// Writes per slot name across the whole program
pub(crate) fn write_counts(ir: &Ir) -> FxHashMap<String, usize> {
    fn visit(op: &Op, counts: &mut FxHashMap<String, usize>) {
        if let Op::Sequence { ops } = op {
            for inner in ops {
                visit(inner, counts);
            }
            return;
        }
        if let Some(dest) = op.dest() {
            *counts.entry(dest.to_string()).or_default() += 1;
        }
    }
    let mut counts = FxHashMap::default();
    for state in &ir.states {
        if !matches!(state.op, Op::Dead) {
            visit(&state.op, &mut counts);
        }
    }
    counts
}

/// Temps with exactly one write, where that write is a plain literal
pub(crate) fn single_literal_defs(ir: &Ir) -> FxHashMap<String, Literal> {
    fn visit(op: &Op, writes: &FxHashMap<String, usize>, defs: &mut FxHashMap<String, Literal>) {
        match op {
            Op::Sequence { ops } => {
                for inner in ops {
                    visit(inner, writes, defs);
                }
            }
            Op::AssignLiteral { to, value } => {
                if is_temp(to)
                    && writes.get(to.as_str()).copied() == Some(1)
                    && !matches!(value, Literal::StateRef(_))
                {
                    defs.insert(to.clone(), value.clone());
                }
            }
            _ => {}
        }
    }
    let writes = write_counts(ir);
    let mut defs = FxHashMap::default();
    for state in &ir.states {
        if !matches!(state.op, Op::Dead) {
            visit(&state.op, &writes, &mut defs);
        }
    }
    defs
}

/// Predecessor counts over every kind of reference, with roots (state 0
/// and function entries) given a synthetic extra predecessor so they are
/// never treated as merge fodder.
pub(crate) fn predecessor_counts(ir: &Ir) -> FxHashMap<StateId, usize> {
    let mut counts: FxHashMap<StateId, usize> = FxHashMap::default();
    counts.insert(0, 1);
    for entry in &ir.function_table {
        *counts.entry(entry.entry).or_default() += 1;
    }
    for state in &ir.states {
        if matches!(state.op, Op::Dead) {
            continue;
        }
        Ir::for_each_ref(state, &mut |id| {
            *counts.entry(id).or_default() += 1;
        });
    }
    counts
}

/// Count temp-shaped identifier reads inside embedded AST payloads. The
/// contract is "do not miscount usages": fragments are scanned, never
/// folded through.
fn count_embedded_reads(op: &Op, counts: &mut FxHashMap<String, usize>) {
    struct TempScan<'a> {
        counts: &'a mut FxHashMap<String, usize>,
    }
    impl Visitor for TempScan<'_> {
        fn visit_expression(&mut self, expr: &Expression) {
            if let Expression::Identifier(name) = expr {
                if is_temp(name) {
                    *self.counts.entry(name.clone()).or_default() += 1;
                }
            }
            walk_expression(self, expr);
        }
    }
    match op {
        Op::Sequence { ops } => {
            for inner in ops {
                count_embedded_reads(inner, counts);
            }
        }
        Op::ExecuteStatement { statement } => {
            let mut scan = TempScan { counts };
            walk_statement(&mut scan, statement);
        }
        Op::AssignLiteralDirect {
            fragment: crate::ir::Fragment::Expr(expr),
            ..
        } => {
            let mut scan = TempScan { counts };
            scan.visit_expression(expr);
        }
        _ => {}
    }
}

/// Follow NOOP/GOTO trampolines to the ultimate target, stopping on
/// cycles or anything substantial.
pub(crate) fn resolve_target(ir: &Ir, start: StateId) -> StateId {
    let mut seen = vec![start];
    let mut current = start;
    loop {
        let Some(state) = ir.get(current) else {
            return current;
        };
        let next = match &state.op {
            Op::Noop => match state.next {
                Some(next) => next,
                None => return current,
            },
            Op::Goto { target } => *target,
            Op::Sequence { ops } if ops.is_empty() => match state.next {
                Some(next) => next,
                None => return current,
            },
            _ => return current,
        };
        if seen.contains(&next) {
            return current;
        }
        seen.push(next);
        current = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temp_regex() {
        assert!(is_temp("_temp$0"));
        assert!(is_temp("_temp$137"));
        assert!(is_temp("_tco$2"));
        assert!(!is_temp("_temp$"));
        assert!(!is_temp("temp$1"));
        assert!(!is_temp("x"));
        assert!(!is_temp("_anon$1"));
    }

    #[test]
    fn test_integrity_detects_dangling_ref() {
        let mut ir = Ir::new();
        let a = ir.alloc(Op::Noop);
        let b = ir.alloc(Op::Noop);
        ir.set_next(a, b);
        assert!(graph_is_sound(&ir));
        ir.tombstone(b);
        assert!(!graph_is_sound(&ir));
    }

    #[test]
    fn test_resolve_follows_trampolines() {
        let mut ir = Ir::new();
        let a = ir.alloc(Op::Noop);
        let b = ir.alloc(Op::Goto { target: 3 });
        let c = ir.alloc(Op::Noop);
        let d = ir.alloc(Op::Halt);
        ir.set_next(a, b);
        ir.set_next(c, d);
        // a -> b -> (goto) c -> d
        assert_eq!(resolve_target(&ir, a), d);
    }

    #[test]
    fn test_resolve_stops_on_cycle() {
        let mut ir = Ir::new();
        let a = ir.alloc(Op::Noop);
        let b = ir.alloc(Op::Noop);
        ir.set_next(a, b);
        ir.set_next(b, a);
        // Must terminate and return something inside the cycle.
        let r = resolve_target(&ir, a);
        assert!(r == a || r == b);
    }
}
