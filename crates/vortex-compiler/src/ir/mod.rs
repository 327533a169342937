//! Flat IR
//!
//! The program is a vector of states forming a control-flow graph. States
//! reference one another by dense integer id (the vector is the arena), are
//! tombstoned to DEAD rather than removed, and are compacted only between
//! optimizer iterations so snapshot/rollback stays a plain vector clone.

pub mod op;
pub mod pretty;
pub mod value;

pub use op::{ArrayItem, CallArg, ObjectItem, Op};
pub use value::{Fragment, Literal};

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

pub type StateId = u32;

/// One node of the flat CFG
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct State {
    pub id: StateId,
    pub op: Op,
    /// Fallthrough successor; unused by terminal ops
    pub next: Option<StateId>,
}

/// A virtualized function's pinned entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionEntry {
    pub name: String,
    pub entry: StateId,
}

/// The whole IR program
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Ir {
    pub states: Vec<State>,
    /// Discovered callables in declaration order
    pub function_table: Vec<FunctionEntry>,
}

impl Ir {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh state; its id is its vector index
    pub fn alloc(&mut self, op: Op) -> StateId {
        let id = self.states.len() as StateId;
        self.states.push(State { id, op, next: None });
        id
    }

    pub fn state(&self, id: StateId) -> &State {
        &self.states[id as usize]
    }

    pub fn state_mut(&mut self, id: StateId) -> &mut State {
        &mut self.states[id as usize]
    }

    pub fn get(&self, id: StateId) -> Option<&State> {
        self.states.get(id as usize)
    }

    pub fn is_live(&self, id: StateId) -> bool {
        self.get(id).is_some_and(|s| !matches!(s.op, Op::Dead))
    }

    /// Link `from` to fall through into `to`. Terminal ops keep no edge.
    pub fn set_next(&mut self, from: StateId, to: StateId) {
        let state = self.state_mut(from);
        if !state.op.is_terminal() {
            state.next = Some(to);
        }
    }

    pub fn tombstone(&mut self, id: StateId) {
        let state = self.state_mut(id);
        state.op = Op::Dead;
        state.next = None;
    }

    pub fn entry_of(&self, name: &str) -> Option<StateId> {
        self.function_table
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.entry)
    }

    pub fn live_count(&self) -> usize {
        self.states
            .iter()
            .filter(|s| !matches!(s.op, Op::Dead))
            .count()
    }

    /// Visit every id reference of a state (op refs plus `next`)
    pub fn for_each_ref(state: &State, f: &mut impl FnMut(StateId)) {
        state.op.for_each_state_ref(f);
        if let Some(next) = state.next {
            f(next);
        }
    }

    /// Rewrite every id reference in the whole graph
    pub fn remap_refs(&mut self, f: &mut impl FnMut(StateId) -> StateId) {
        for state in &mut self.states {
            state.op.remap_state_refs(f);
            if let Some(next) = state.next {
                state.next = Some(f(next));
            }
        }
        for entry in &mut self.function_table {
            entry.entry = f(entry.entry);
        }
    }

    /// All states reachable from state 0 and every function entry
    pub fn reachable(&self) -> FxHashSet<StateId> {
        let mut seen = FxHashSet::default();
        let mut work: Vec<StateId> = Vec::new();
        if !self.states.is_empty() {
            work.push(0);
        }
        for entry in &self.function_table {
            work.push(entry.entry);
        }
        while let Some(id) = work.pop() {
            if !seen.insert(id) {
                continue;
            }
            if let Some(state) = self.get(id) {
                Self::for_each_ref(state, &mut |r| {
                    if !seen.contains(&r) {
                        work.push(r);
                    }
                });
            }
        }
        seen
    }

    /// Tombstone everything unreachable from the roots. Returns the number
    /// of states swept.
    pub fn sweep_unreachable(&mut self) -> usize {
        let reachable = self.reachable();
        let mut swept = 0;
        for id in 0..self.states.len() as StateId {
            if !reachable.contains(&id) && self.is_live(id) {
                self.tombstone(id);
                swept += 1;
            }
        }
        swept
    }

    /// Renumber live states densely and drop tombstones. Run once after
    /// optimization; invalidates any outstanding ids.
    pub fn compact(&mut self) {
        let mut remap = vec![StateId::MAX; self.states.len()];
        let mut new_states = Vec::with_capacity(self.live_count());
        for state in &self.states {
            if !matches!(state.op, Op::Dead) {
                remap[state.id as usize] = new_states.len() as StateId;
                new_states.push(state.clone());
            }
        }
        self.states = new_states;
        for (i, state) in self.states.iter_mut().enumerate() {
            state.id = i as StateId;
        }
        self.remap_refs(&mut |id| remap[id as usize]);
    }

    /// Ids of all live states in order
    pub fn live_ids(&self) -> Vec<StateId> {
        self.states
            .iter()
            .filter(|s| !matches!(s.op, Op::Dead))
            .map(|s| s.id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_assigns_dense_ids() {
        let mut ir = Ir::new();
        assert_eq!(ir.alloc(Op::Noop), 0);
        assert_eq!(ir.alloc(Op::Halt), 1);
        assert_eq!(ir.states.len(), 2);
    }

    #[test]
    fn test_set_next_respects_terminals() {
        let mut ir = Ir::new();
        let a = ir.alloc(Op::Noop);
        let b = ir.alloc(Op::Halt);
        let c = ir.alloc(Op::Noop);
        ir.set_next(a, b);
        ir.set_next(b, c);
        assert_eq!(ir.state(a).next, Some(b));
        assert_eq!(ir.state(b).next, None);
    }

    #[test]
    fn test_reachability_and_sweep() {
        let mut ir = Ir::new();
        let a = ir.alloc(Op::Noop);
        let b = ir.alloc(Op::Halt);
        let orphan = ir.alloc(Op::Noop);
        ir.set_next(a, b);
        assert!(ir.reachable().contains(&b));
        assert!(!ir.reachable().contains(&orphan));
        assert_eq!(ir.sweep_unreachable(), 1);
        assert!(!ir.is_live(orphan));
    }

    #[test]
    fn test_function_entries_are_roots() {
        let mut ir = Ir::new();
        let a = ir.alloc(Op::Halt);
        let entry = ir.alloc(Op::FuncEntry {
            name: "f".into(),
            params: vec![],
            rest: None,
            is_generator: false,
            is_async: false,
        });
        let body = ir.alloc(Op::Return { value_var: None });
        ir.set_next(entry, body);
        ir.function_table.push(FunctionEntry {
            name: "f".into(),
            entry,
        });
        let _ = a;
        assert_eq!(ir.sweep_unreachable(), 0);
        assert_eq!(ir.entry_of("f"), Some(entry));
    }

    #[test]
    fn test_compact_renumbers_and_remaps() {
        let mut ir = Ir::new();
        let a = ir.alloc(Op::Noop);
        let dead = ir.alloc(Op::Noop);
        let b = ir.alloc(Op::Goto { target: a });
        ir.set_next(a, b);
        ir.tombstone(dead);
        ir.compact();
        assert_eq!(ir.states.len(), 2);
        assert_eq!(ir.state(0).next, Some(1));
        match ir.state(1).op {
            Op::Goto { target } => assert_eq!(target, 0),
            _ => panic!("expected goto"),
        }
    }
}
