//! Context (spec §3.2 "Context", §4.B).
//!
//! `{ varlist, keylist }`, with keylists shareable between a context and the action that
//! produced it (an action's paramlist literally *is* the keylist of any frame context
//! built to call it — spec §3.2, §4.D). Grounded on the teacher lineage's `namespace.rs`
//! arena-by-index design: contexts never hold raw pointers to their storage, only handles
//! into arenas owned by the running session.

use crate::{
    cell::{Binding, Cell, Payload},
    dispatch::ActionId,
    error::CoreError,
    intern::Symbol,
    paramlist::{ParamEntry, ParamTable},
    series::{Flavor, SeriesArena, SeriesId},
};

/// Handle to a context (spec §3.2). Distinct from [`SeriesId`] because a context is the
/// *pairing* of a varlist and a keylist, not a single array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(u32);

impl ContextId {
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    #[cfg(test)]
    #[must_use]
    pub fn test_handle(index: u32) -> Self {
        Self(index)
    }
}

/// What archetype kind this context's varlist\[0\] carries (spec §3.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextKind {
    Object,
    Error,
    Port,
    Module,
    /// A frame context: `keylist[0]` (the rootkey) is the action identity (spec §3.2).
    Frame,
}

#[derive(Debug, Clone)]
pub struct Context {
    pub kind: ContextKind,
    varlist: SeriesId,
    keylist: SeriesId,
    /// Set once this context's vars have been stolen by another (spec §4.B
    /// `steal_context_vars`) or its owning stack frame dropped (spec §3.4).
    inaccessible: bool,
}

impl Context {
    #[must_use]
    pub fn varlist(&self) -> SeriesId {
        self.varlist
    }

    #[must_use]
    pub fn keylist(&self) -> SeriesId {
        self.keylist
    }

    #[must_use]
    pub fn is_accessible(&self) -> bool {
        !self.inaccessible
    }

    pub fn mark_inaccessible(&mut self) {
        self.inaccessible = true;
    }

    /// `A_k[0]` for a FRAME context is the action identity (spec §3.2).
    #[must_use]
    pub fn rootkey_action(&self, series: &SeriesArena) -> Option<ActionId> {
        if self.kind != ContextKind::Frame {
            return None;
        }
        match series.get(self.keylist).get(0)?.payload() {
            Payload::Action(id) => Some(id),
            _ => None,
        }
    }
}

/// Owns every context in a session (spec §3.4).
#[derive(Debug, Default)]
pub struct ContextArena {
    contexts: Vec<Context>,
}

impl ContextArena {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a fresh context whose varlist and keylist are newly allocated and parallel
    /// in length, with `varlist[0]`/`keylist[0]` as the archetype/rootkey pair.
    pub fn make(
        &mut self,
        series: &mut SeriesArena,
        kind: ContextKind,
        keylist: SeriesId,
        var_count: usize,
    ) -> ContextId {
        let id = ContextId(u32::try_from(self.contexts.len()).expect("context arena overflow"));
        let mut var_cells = vec![Cell::null(); var_count + 1];
        var_cells[0] = archetype_cell(kind, id);
        let varlist = series.make_array(var_cells, Flavor::Varlist);
        self.contexts.push(Context { kind, varlist, keylist, inaccessible: false });
        id
    }

    /// Builds a context that shares `keylist` with another context or an action's
    /// paramlist (spec §3.2 "keylists may be shared").
    #[must_use]
    pub fn with_shared_keylist(&mut self, series: &mut SeriesArena, kind: ContextKind, keylist: SeriesId) -> ContextId {
        let var_count = series.get(keylist).len().saturating_sub(1);
        self.make(series, kind, keylist, var_count)
    }

    #[must_use]
    pub fn get(&self, id: ContextId) -> &Context {
        &self.contexts[id.index()]
    }

    pub fn get_mut(&mut self, id: ContextId) -> &mut Context {
        &mut self.contexts[id.index()]
    }

    /// Looks up `symbol` in `id`'s keylist, returning the variable slot index
    /// (1-based, matching `A_v`/`A_k` indexing in spec §3.2) if present.
    #[must_use]
    pub fn find_slot(&self, series: &SeriesArena, params: &ParamTable, id: ContextId, symbol: Symbol) -> Option<usize> {
        let ctx = self.get(id);
        let keylist = series.get(ctx.keylist);
        for i in 1..keylist.len() {
            if let Payload::Param(pid) = keylist.get(i)?.payload() {
                if params.get(pid).symbol == symbol {
                    return Some(i);
                }
            }
        }
        None
    }

    /// Reads the variable at `slot` (spec §3.2, 1-based).
    ///
    /// # Errors
    /// Returns [`CoreError::expired_frame`] if the context's varlist was stolen or
    /// dropped (spec §3.4).
    pub fn get_var<'a>(&self, series: &'a SeriesArena, id: ContextId, slot: usize) -> Result<&'a Cell, CoreError> {
        let ctx = self.get(id);
        if ctx.inaccessible {
            return Err(CoreError::expired_frame());
        }
        Ok(series.get(ctx.varlist).get(slot).expect("slot in range"))
    }

    /// Writes the variable at `slot` (spec §3.2, 1-based).
    ///
    /// # Errors
    /// Propagates a protected-cell error from the underlying array, or
    /// [`CoreError::expired_frame`] if the context is inaccessible.
    pub fn set_var(&mut self, series: &mut SeriesArena, id: ContextId, slot: usize, value: Cell) -> Result<(), CoreError> {
        let ctx = self.get(id);
        if ctx.inaccessible {
            return Err(CoreError::expired_frame());
        }
        let varlist = ctx.varlist;
        let array = series.get_mut(varlist);
        let dst = array.get_mut(slot).ok_or_else(CoreError::protected)?;
        dst.move_from(&value);
        Ok(())
    }

    /// `steal_context_vars(ctx, new_keysource)` (spec §4.B): detaches `source`'s vars
    /// into a freshly built context sharing `new_keylist`, atomically marking `source`
    /// inaccessible. Used when a stack-lifetime frame must be freed while its vars need
    /// to live on (e.g. a closure capturing a function's locals, or `enclose`'s frame
    /// theft — spec §4.F "Encloser").
    pub fn steal_context_vars(&mut self, series: &mut SeriesArena, source: ContextId, new_keylist: SeriesId) -> ContextId {
        let old_varlist = self.get(source).varlist;
        let kind = self.get(source).kind;
        let new_id = ContextId(u32::try_from(self.contexts.len()).expect("context arena overflow"));
        self.contexts.push(Context { kind, varlist: old_varlist, keylist: new_keylist, inaccessible: false });
        self.get_mut(source).inaccessible = true;
        new_id
    }

    /// Declares a new variable directly into `ctx`'s keylist/varlist. The lexical
    /// scanner that would normally grow a module's keylist via SET-WORD binding is out
    /// of scope for this core (spec §1); natives that build module/object contexts from
    /// scratch (spec §11's native library, `for-each`'s loop variable) use this instead.
    pub fn declare(&mut self, series: &mut SeriesArena, params: &mut ParamTable, ctx: ContextId, entry: ParamEntry, value: Cell) {
        let keylist = self.get(ctx).keylist();
        let param = params.push(entry);
        series.get_mut(keylist).append(Cell::typeset(param)).expect("module keylist is never frozen or held");
        let varlist = self.get(ctx).varlist();
        series.get_mut(varlist).append(value).expect("module varlist is never frozen or held");
    }
}

fn archetype_cell(kind: ContextKind, id: ContextId) -> Cell {
    let mut cell = match kind {
        ContextKind::Object | ContextKind::Module => Cell::object(id),
        ContextKind::Error => Cell::error(id),
        ContextKind::Port => Cell::reset(crate::cell::Kind::Port, Payload::Context(id)),
        ContextKind::Frame => Cell::frame(id),
    };
    cell.set_binding(Binding::Context(id));
    cell
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{dispatch::ActionId, intern::Interner, paramlist::{compile_spec, SpecItem}};

    #[test]
    fn slot_lookup_finds_parameter_by_symbol() {
        let mut interner = Interner::new();
        let ret = interner.intern("return");
        let a = interner.intern("a");
        let b = interner.intern("b");
        let mut series = SeriesArena::new();
        let mut params = ParamTable::new();
        let compiled = compile_spec(
            &mut series,
            &mut params,
            ActionId::test_handle(0),
            &[SpecItem::Word(a), SpecItem::Word(b)],
            false,
            ret,
        )
        .unwrap();
        let mut contexts = ContextArena::new();
        let ctx = contexts.with_shared_keylist(&mut series, ContextKind::Frame, compiled.paramlist);
        assert_eq!(contexts.find_slot(&series, &params, ctx, a), Some(1));
        assert_eq!(contexts.find_slot(&series, &params, ctx, b), Some(2));
    }

    #[test]
    fn steal_marks_source_inaccessible() {
        let mut series = SeriesArena::new();
        let keylist = series.make_array(vec![Cell::null()], Flavor::Pairlist);
        let mut contexts = ContextArena::new();
        let ctx = contexts.make(&mut series, ContextKind::Object, keylist, 0);
        let stolen = contexts.steal_context_vars(&mut series, ctx, keylist);
        assert!(!contexts.get(ctx).is_accessible());
        assert!(contexts.get(stolen).is_accessible());
        assert!(contexts.get_var(&series, ctx, 0).is_err());
    }
}
