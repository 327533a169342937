//! Virtual memory allocator
//!
//! Assigns every source name a dense integer slot in the virtualized heap.
//! Local slots index into the per-frame vector `M` (cloned from a template
//! on every invocation); global slots index into the shared vector `GM`.
//! The VM-internal slots are allocated before any user name so their
//! indices are stable.

use crate::error::{CompileError, CompileResult};
use rustc_hash::FxHashMap;
use vortex_ast::Pattern;

/// Stack pointer slot
pub const SLOT_SP: u32 = 0;
/// Return value slot
pub const SLOT_RET: u32 = 1;
/// Exception-handler pointer slot
pub const SLOT_EHP: u32 = 2;
/// Last exception value slot
pub const SLOT_EXV: u32 = 3;
/// Finally disposition code slot
pub const SLOT_FIN: u32 = 4;
/// Finally payload slot
pub const SLOT_FIN_V: u32 = 5;
/// `this` binding slot
pub const SLOT_THIS: u32 = 6;
/// `new.target` slot
pub const SLOT_NEW_TARGET: u32 = 7;

/// Reserved VM slot names, in allocation order
pub const RESERVED_SLOTS: &[&str] = &[
    "_SP",
    "_RET",
    "_EHP",
    "_EXV",
    "_FIN",
    "_FIN_V",
    "_THIS",
    "_NEW_TARGET",
];

/// Extra global slots reserved for the VM stack region
pub const STACK_REGION: u32 = 600;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    pub index: u32,
    pub is_global: bool,
}

#[derive(Debug)]
pub struct MemoryMap {
    slots: FxHashMap<String, Slot>,
    /// Insertion order, for deterministic iteration
    order: Vec<String>,
    local_count: u32,
    global_count: u32,
}

impl Default for MemoryMap {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryMap {
    pub fn new() -> Self {
        let mut map = Self {
            slots: FxHashMap::default(),
            order: Vec::new(),
            local_count: 0,
            global_count: 0,
        };
        for name in RESERVED_SLOTS {
            map.allocate(name, false);
        }
        debug_assert_eq!(map.lookup("_NEW_TARGET").unwrap().index, SLOT_NEW_TARGET);
        map
    }

    /// Allocate a slot for `name`. Idempotent: repeated calls return the
    /// original slot and never change its global flag.
    pub fn allocate(&mut self, name: &str, is_global: bool) -> u32 {
        if let Some(slot) = self.slots.get(name) {
            return slot.index;
        }
        let index = if is_global {
            let i = self.global_count;
            self.global_count += 1;
            i
        } else {
            let i = self.local_count;
            self.local_count += 1;
            i
        };
        self.slots.insert(name.to_string(), Slot { index, is_global });
        self.order.push(name.to_string());
        index
    }

    /// Allocate every identifier a pattern binds
    pub fn allocate_pattern(&mut self, pattern: &Pattern, is_global: bool) {
        let mut names = Vec::new();
        pattern.bound_names(&mut names);
        for name in names {
            self.allocate(name, is_global);
        }
    }

    pub fn lookup(&self, name: &str) -> CompileResult<Slot> {
        self.slots
            .get(name)
            .copied()
            .ok_or_else(|| CompileError::UnallocatedVariable {
                name: name.to_string(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.slots.contains_key(name)
    }

    /// Whether `name` is allocated and lives in the global region
    pub fn is_global(&self, name: &str) -> bool {
        self.slots.get(name).is_some_and(|s| s.is_global)
    }

    /// Whether `name` is allocated and lives in the local region
    pub fn is_local(&self, name: &str) -> bool {
        self.slots.get(name).is_some_and(|s| !s.is_global)
    }

    pub fn local_slot_count(&self) -> u32 {
        self.local_count
    }

    pub fn global_slot_count(&self) -> u32 {
        self.global_count
    }

    /// Total length of the emitted global memory array, stack region included
    pub fn global_memory_len(&self) -> u32 {
        self.global_count + STACK_REGION
    }

    /// Names in allocation order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vortex_ast::{ArrayPattern, ObjectPattern, ObjectPatternProperty, PropertyKey};

    #[test]
    fn test_reserved_slots_first() {
        let map = MemoryMap::new();
        assert_eq!(map.lookup("_SP").unwrap().index, SLOT_SP);
        assert_eq!(map.lookup("_RET").unwrap().index, SLOT_RET);
        assert_eq!(map.lookup("_EHP").unwrap().index, SLOT_EHP);
        assert_eq!(map.lookup("_EXV").unwrap().index, SLOT_EXV);
        assert_eq!(map.lookup("_FIN").unwrap().index, SLOT_FIN);
        assert_eq!(map.lookup("_FIN_V").unwrap().index, SLOT_FIN_V);
        assert_eq!(map.lookup("_THIS").unwrap().index, SLOT_THIS);
        assert_eq!(map.lookup("_NEW_TARGET").unwrap().index, SLOT_NEW_TARGET);
    }

    #[test]
    fn test_allocate_idempotent() {
        let mut map = MemoryMap::new();
        let a = map.allocate("x", false);
        let b = map.allocate("x", true);
        assert_eq!(a, b);
        assert!(!map.is_global("x"));
    }

    #[test]
    fn test_global_and_local_spaces_are_disjoint() {
        let mut map = MemoryMap::new();
        let l = map.allocate("local", false);
        let g = map.allocate("global", true);
        assert_eq!(g, 0);
        assert!(l >= SLOT_NEW_TARGET);
        assert!(map.is_global("global"));
        assert_eq!(map.global_memory_len(), 1 + STACK_REGION);
    }

    #[test]
    fn test_pattern_allocation_recurses() {
        let mut map = MemoryMap::new();
        let pattern = Pattern::Object(ObjectPattern {
            properties: vec![ObjectPatternProperty {
                key: PropertyKey::Identifier("a".into()),
                value: Pattern::Array(ArrayPattern {
                    elements: vec![Some(Pattern::Identifier("b".into()))],
                }),
                shorthand: false,
            }],
            rest: Some(Box::new(Pattern::Identifier("c".into()))),
        });
        map.allocate_pattern(&pattern, false);
        assert!(map.contains("b"));
        assert!(map.contains("c"));
        assert!(!map.contains("a"));
    }

    #[test]
    fn test_unallocated_lookup_fails() {
        let map = MemoryMap::new();
        assert!(matches!(
            map.lookup("ghost"),
            Err(CompileError::UnallocatedVariable { .. })
        ));
    }
}
