//! Series / Array (spec §3.2, §4.B).
//!
//! Arrays are arena-allocated and referenced by handle (`SeriesId`) rather than by raw
//! pointer, following the teacher lineage's heap-arena pattern (`heap.rs`'s `HeapId`,
//! `namespace.rs`'s `NamespaceId`) and the spec's own recommendation at §9
//! ("self-referential archetypes... represent as an arena-allocated array indexed by a
//! handle"). A `SeriesArena` owns every array; the GC interface named in §3.4 is modeled
//! only as the `manage`/`unmanaged` distinction required to decide what a trap-scope exit
//! frees (spec §3.4) — no tracing collector is implemented (spec §1, §12).

use smallvec::SmallVec;

use crate::{
    cell::Cell,
    error::CoreError,
};

/// Handle to an arena-allocated array (spec §3.2 "Array").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SeriesId(u32);

impl SeriesId {
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Array flavor (spec §3.2): distinguishes what role an array plays without needing a
/// separate Rust type per flavor, matching the spec's own "flavor flags on a generic
/// series" design.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flavor {
    Plain,
    Paramlist,
    Varlist,
    Details,
    Pairlist,
}

/// Per-array info flags (spec §3.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SeriesInfo {
    pub frozen: bool,
    pub hold: u32,
    pub inaccessible: bool,
    pub fixed_size: bool,
    pub stack_lifetime: bool,
    /// Whether this array has been handed to the GC interface (spec §3.4
    /// "unmanaged... freed on trap-scope exit" vs. managed/reachable).
    pub managed: bool,
}

/// A cell array terminated conceptually by `Cell::end()` (spec §3.2). The terminator is
/// implicit (Rust `Vec` length is authoritative); `terminate` exists as a named operation
/// for parity with the spec but is a no-op beyond truncation bookkeeping.
#[derive(Debug, Clone)]
pub struct Array {
    cells: Vec<Cell>,
    flavor: Flavor,
    info: SeriesInfo,
}

impl Array {
    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    #[must_use]
    pub fn flavor(&self) -> Flavor {
        self.flavor
    }

    #[must_use]
    pub fn info(&self) -> SeriesInfo {
        self.info
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Cell> {
        self.cells.get(index)
    }

    #[must_use]
    pub fn get_mut(&mut self, index: usize) -> Option<&mut Cell> {
        if self.info.frozen {
            return None;
        }
        self.cells.get_mut(index)
    }

    #[must_use]
    pub fn as_slice(&self) -> &[Cell] {
        &self.cells
    }

    /// `append` (spec §4.B).
    ///
    /// # Errors
    /// Returns [`CoreError::series_held`] if the array is under an active hold, or a
    /// protected-access error if it is frozen (spec §5 shared-resource policy, §8
    /// invariant "a series under hold does not change length").
    pub fn append(&mut self, cell: Cell) -> Result<(), CoreError> {
        self.check_mutable()?;
        self.cells.push(cell);
        Ok(())
    }

    /// `expand_tail(n)` (spec §4.B): grows the array by `n` end-initialized cells.
    pub fn expand_tail(&mut self, n: usize) -> Result<(), CoreError> {
        self.check_mutable()?;
        self.cells.resize(self.cells.len() + n, Cell::end());
        Ok(())
    }

    /// `terminate` (spec §4.B): named for parity; the backing `Vec` is always
    /// length-authoritative so there is nothing to do beyond validating mutability.
    pub fn terminate(&self) {}

    /// `freeze` (spec §4.B): recursive, deep in the full design; this arena-local form
    /// freezes this array's own mutability. Recursive freezing of nested series requires
    /// walking payloads in [`SeriesArena::freeze_deep`].
    pub fn freeze(&mut self) {
        self.info.frozen = true;
    }

    /// `hold`/`release_hold` (spec §4.B): an iteration lock. Counted so nested iterations
    /// over the same series compose correctly.
    pub fn hold(&mut self) {
        self.info.hold += 1;
    }

    pub fn release_hold(&mut self) {
        self.info.hold = self.info.hold.saturating_sub(1);
    }

    #[must_use]
    pub fn is_held(&self) -> bool {
        self.info.hold > 0
    }

    pub fn manage(&mut self) {
        self.info.managed = true;
    }

    /// Marks this varlist as belonging to a not-yet-reified stack frame (spec §3.2,
    /// §4.D): informational bookkeeping mirrored by [`crate::context::Context`]'s own
    /// `inaccessible` bit, which is what `get_var`/`set_var` actually enforce.
    pub fn mark_stack_lifetime(&mut self) {
        self.info.stack_lifetime = true;
    }

    /// §4.D reification: upgrades a stack-lifetime varlist so it survives its owning
    /// frame's drop, and marks it managed (reachable independent of the call stack).
    pub fn mark_reified(&mut self) {
        self.info.stack_lifetime = false;
        self.info.managed = true;
    }

    fn check_mutable(&self) -> Result<(), CoreError> {
        if self.info.frozen {
            return Err(CoreError::protected());
        }
        if self.info.hold > 0 {
            return Err(CoreError::series_held());
        }
        Ok(())
    }
}

/// Owns every array in a single evaluation session (spec §3.4 "a paramlist is created
/// once... its identity is the action's identity"; arrays live here for their whole
/// session lifetime, indexed by handle).
#[derive(Debug, Default)]
pub struct SeriesArena {
    arrays: Vec<Array>,
}

impl SeriesArena {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// `make_array(capacity, flavor_flags)` (spec §4.B).
    pub fn make_array(&mut self, cells: Vec<Cell>, flavor: Flavor) -> SeriesId {
        let id = SeriesId(u32::try_from(self.arrays.len()).expect("series arena overflow"));
        self.arrays.push(Array { cells, flavor, info: SeriesInfo::default() });
        id
    }

    pub fn make_array_with_capacity(&mut self, capacity: usize, flavor: Flavor) -> SeriesId {
        self.make_array(Vec::with_capacity(capacity), flavor)
    }

    #[must_use]
    pub fn get(&self, id: SeriesId) -> &Array {
        &self.arrays[id.index()]
    }

    #[must_use]
    pub fn get_mut(&mut self, id: SeriesId) -> &mut Array {
        &mut self.arrays[id.index()]
    }

    /// Recursively freezes `id` and every nested block/group it contains (spec §4.B
    /// "freeze (recursive, deep)").
    pub fn freeze_deep(&mut self, id: SeriesId) {
        let mut stack: SmallVec<[SeriesId; 8]> = SmallVec::new();
        stack.push(id);
        while let Some(current) = stack.pop() {
            let nested: SmallVec<[SeriesId; 8]> = {
                let arr = self.get_mut(current);
                arr.freeze();
                arr.as_slice()
                    .iter()
                    .filter_map(|c| match c.payload() {
                        crate::cell::Payload::Series(nested_id) => Some(nested_id),
                        _ => None,
                    })
                    .collect()
            };
            stack.extend(nested);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::Cell;

    #[test]
    fn frozen_array_rejects_mutation() {
        let mut arena = SeriesArena::new();
        let id = arena.make_array(vec![Cell::integer(1)], Flavor::Plain);
        arena.get_mut(id).freeze();
        assert!(arena.get_mut(id).append(Cell::integer(2)).is_err());
    }

    #[test]
    fn held_array_rejects_length_change_but_allows_read() {
        let mut arena = SeriesArena::new();
        let id = arena.make_array(vec![Cell::integer(1)], Flavor::Plain);
        arena.get_mut(id).hold();
        assert!(arena.get_mut(id).append(Cell::integer(2)).is_err());
        assert_eq!(arena.get(id).get(0).unwrap().kind(), crate::cell::Kind::Integer);
        arena.get_mut(id).release_hold();
        assert!(arena.get_mut(id).append(Cell::integer(2)).is_ok());
    }

    #[test]
    fn freeze_deep_reaches_nested_blocks() {
        let mut arena = SeriesArena::new();
        let inner = arena.make_array(vec![Cell::integer(1)], Flavor::Plain);
        let outer = arena.make_array(vec![Cell::block(inner)], Flavor::Plain);
        arena.freeze_deep(outer);
        assert!(arena.get_mut(inner).append(Cell::integer(2)).is_err());
    }
}
