//! Dispatcher Layer (spec §3.2 "Action", §4.F).
//!
//! An action pairs a paramlist with a *dispatcher*: a native function, an interpreted
//! body, or a composition built on top of another action (specialize/adapt/chain/
//! enclose). Grounded on the teacher lineage's `function.rs` (callable object + call
//! protocol), `types/partial.rs` (`functools.partial` is exactly ADAPT's frozen-argument
//! shape), `types/functools.rs` (`wraps`/decorator chaining is ADAPT/CHAIN's prelude-then-
//! delegate shape), and `object.rs` (its kind-indexed slot-lookup table is the same shape
//! as [`GenericTable`]'s kind-dispatched generic actions).

use ahash::AHashMap;

use crate::{
    cell::{Cell, Kind},
    control::{EvalResult, Unwind},
    error::{CoreError, CoreResult, ErrorKind},
    intern::Symbol,
    paramlist::ParamId,
    series::{Flavor, SeriesArena, SeriesId},
    Engine,
};

/// Handle to a compiled action (spec §3.2). Distinct from a paramlist's [`SeriesId`]:
/// hijack (spec §4.F) must let every existing `ActionId` observe a replacement dispatcher
/// without those references changing, which a plain series handle can't express once the
/// paramlist itself is swapped out too.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ActionId(u32);

impl ActionId {
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

/// A native implementation (spec §11's minimal native-action library). Operates on the
/// currently top-of-stack frame inside `engine`. Returns [`EvalResult`] rather than a
/// plain [`CoreResult`] so natives that ARE control-flow primitives (`break`, `continue`,
/// `return`, `throw` — spec §4.E.5, §11) can signal an unwind directly instead of through
/// a side channel.
pub type NativeFn = fn(&mut Engine) -> EvalResult<Cell>;

/// What running an action actually does (spec §4.F).
pub enum Dispatcher {
    /// A builtin implemented directly in Rust (spec §11).
    Native(NativeFn),
    /// A user-defined body block, evaluated against the frame's varlist (spec §4.E.2).
    Interpreted { body: SeriesId },
    /// `specialize`: `base` called with `frozen` arguments pre-filled and hidden from the
    /// callable interface (spec §4.F "Specializer").
    Specialized { base: ActionId, frozen: Vec<(ParamId, Cell)> },
    /// `adapt`: `prelude` runs against the *same* frame as `base` before `base` dispatches
    /// (spec §4.F "Adapter") — a prelude that writes to a parameter changes what `base`
    /// sees.
    Adapted { base: ActionId, prelude: SeriesId },
    /// `chain`: each step after the first receives the previous step's result as its sole
    /// argument (spec §4.F "Chainer").
    Chained { steps: Vec<ActionId> },
    /// `enclose`: `outer` is called with a single argument — the reified frame built to
    /// call `base` — and `outer`'s own return value becomes the composed action's result,
    /// giving it a chance to run logic both before *and* after `base` (spec §4.F
    /// "Encloser").
    Enclosed { base: ActionId, outer: ActionId },
    /// `<void>` return spec tag (spec §14 open question #1): runs `base` for its side
    /// effects, discards whatever it produced, and always yields void. Distinct from an
    /// explicit `return: none` since the *callable interface* itself is what signals "no
    /// value" here, not a runtime choice the body makes.
    Voider { base: ActionId },
}

pub struct ActionInfo {
    pub paramlist: SeriesId,
    pub dispatcher: Dispatcher,
}

/// Owns every action compiled or composed in a session (spec §3.4, mirroring
/// [`crate::series::SeriesArena`]'s per-session ownership model).
#[derive(Default)]
pub struct ActionArena {
    actions: Vec<ActionInfo>,
}

impl ActionArena {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn make(&mut self, paramlist: SeriesId, dispatcher: Dispatcher) -> ActionId {
        let id = ActionId(u32::try_from(self.actions.len()).expect("action arena overflow"));
        self.actions.push(ActionInfo { paramlist, dispatcher });
        id
    }

    #[must_use]
    pub fn get(&self, id: ActionId) -> &ActionInfo {
        &self.actions[id.index()]
    }

    pub fn get_mut(&mut self, id: ActionId) -> &mut ActionInfo {
        &mut self.actions[id.index()]
    }

    /// `hijack(target, donor)` (spec §4.F "Hijacker"): overwrites `target`'s paramlist and
    /// dispatcher in place with `donor`'s, so every existing reference to `target`
    /// observes the new behavior — the defining difference from building a fresh action.
    pub fn hijack(&mut self, target: ActionId, donor: ActionId) {
        let donor_info = ActionInfo {
            paramlist: self.get(donor).paramlist,
            dispatcher: match &self.get(donor).dispatcher {
                Dispatcher::Native(f) => Dispatcher::Native(*f),
                Dispatcher::Interpreted { body } => Dispatcher::Interpreted { body: *body },
                Dispatcher::Specialized { base, frozen } => {
                    Dispatcher::Specialized { base: *base, frozen: frozen.clone() }
                }
                Dispatcher::Adapted { base, prelude } => Dispatcher::Adapted { base: *base, prelude: *prelude },
                Dispatcher::Chained { steps } => Dispatcher::Chained { steps: steps.clone() },
                Dispatcher::Enclosed { base, outer } => Dispatcher::Enclosed { base: *base, outer: *outer },
                Dispatcher::Voider { base } => Dispatcher::Voider { base: *base },
            },
        };
        self.actions[target.index()] = donor_info;
    }

    /// Reserves a slot for an action whose own id must appear inside its paramlist before
    /// the paramlist can be compiled (spec §4.C's archetype rootkey cell) — `function` and
    /// the composition natives (spec §4.F, §11) call [`Self::finalize`] once the real
    /// paramlist/dispatcher are ready.
    pub fn reserve(&mut self, series: &mut SeriesArena) -> ActionId {
        let placeholder = series.make_array(vec![], Flavor::Paramlist);
        self.make(placeholder, Dispatcher::Native(unreserved_dispatcher))
    }

    /// Fills in a slot obtained from [`Self::reserve`].
    pub fn finalize(&mut self, id: ActionId, paramlist: SeriesId, dispatcher: Dispatcher) {
        self.actions[id.index()] = ActionInfo { paramlist, dispatcher };
    }
}

fn unreserved_dispatcher(_engine: &mut Engine) -> EvalResult<Cell> {
    Err(Unwind::Error(CoreError::new(ErrorKind::Internal, "action reserved but never finalized")))
}

/// `specialize` (spec §4.F "Specializer"): builds a new action sharing `base`'s
/// dispatch chain but with `frozen` argument slots pre-filled and hidden from the
/// callable interface. `paramlist` must already have those slots' [`crate::paramlist::ParamEntry::hidden`]
/// bits set by the caller (the `specialize` native, spec §11) before calling this.
pub fn specialize(
    actions: &mut ActionArena,
    base: ActionId,
    paramlist: SeriesId,
    frozen: Vec<(ParamId, Cell)>,
) -> ActionId {
    actions.make(paramlist, Dispatcher::Specialized { base, frozen })
}

/// `adapt` (spec §4.F "Adapter"): `prelude` and `base` run against the same frame,
/// `base`'s paramlist unchanged.
pub fn adapt(actions: &mut ActionArena, base: ActionId, prelude: SeriesId) -> ActionId {
    let paramlist = actions.get(base).paramlist;
    actions.make(paramlist, Dispatcher::Adapted { base, prelude })
}

/// `chain` (spec §4.F "Chainer"): the composed action's paramlist mirrors the first
/// step's (its arguments are what the caller supplies; later steps each take exactly the
/// previous step's result).
///
/// # Errors
/// Returns a [`ErrorKind::Script`] error if `steps` is empty.
pub fn chain(actions: &mut ActionArena, steps: Vec<ActionId>) -> CoreResult<ActionId> {
    let Some(&first) = steps.first() else {
        return Err(CoreError::new(ErrorKind::Script, "chain requires at least one action"));
    };
    let paramlist = actions.get(first).paramlist;
    Ok(actions.make(paramlist, Dispatcher::Chained { steps }))
}

/// `enclose` (spec §4.F "Encloser"): the composed action's paramlist mirrors `base`'s;
/// `outer` must accept exactly one argument (the reified frame), which is the caller's
/// (the `enclose` native, spec §11) responsibility to validate.
pub fn enclose(actions: &mut ActionArena, base: ActionId, outer: ActionId) -> ActionId {
    let paramlist = actions.get(base).paramlist;
    actions.make(paramlist, Dispatcher::Enclosed { base, outer })
}

/// Kind-dispatched generic actions (spec §3.2, §4.F "Generic dispatch"): e.g. `ADD`
/// resolves differently for `INTEGER!` vs `DECIMAL!`, matching the teacher lineage's
/// `object.rs` kind-indexed slot table.
#[derive(Default)]
pub struct GenericTable {
    table: AHashMap<(Symbol, Kind), NativeFn>,
}

impl GenericTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, generic: Symbol, kind: Kind, handler: NativeFn) {
        self.table.insert((generic, kind), handler);
    }

    #[must_use]
    pub fn lookup(&self, generic: Symbol, kind: Kind) -> Option<NativeFn> {
        self.table.get(&(generic, kind)).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop_native(_engine: &mut Engine) -> EvalResult<Cell> {
        Ok(Cell::void())
    }

    fn fresh_action(engine: &mut Engine) -> ActionId {
        let paramlist = engine.series.make_array(vec![], Flavor::Paramlist);
        engine.actions.make(paramlist, Dispatcher::Native(noop_native))
    }

    #[test]
    fn hijack_replaces_dispatcher_in_place() {
        let mut engine = Engine::new_for_test();
        let target = fresh_action(&mut engine);
        let donor_paramlist = engine.series.make_array(vec![], Flavor::Paramlist);
        let donor = engine.actions.make(donor_paramlist, Dispatcher::Native(|_| Ok(Cell::integer(42))));
        engine.actions.hijack(target, donor);
        assert!(matches!(engine.actions.get(target).dispatcher, Dispatcher::Native(_)));
        assert_eq!(engine.actions.get(target).paramlist, donor_paramlist);
    }

    #[test]
    fn chain_paramlist_mirrors_first_step() {
        let mut engine = Engine::new_for_test();
        let first = fresh_action(&mut engine);
        let second = fresh_action(&mut engine);
        let chained = chain(&mut engine.actions, vec![first, second]).unwrap();
        assert_eq!(engine.actions.get(chained).paramlist, engine.actions.get(first).paramlist);
    }

    #[test]
    fn chain_rejects_empty_steps() {
        let mut engine = Engine::new_for_test();
        assert!(chain(&mut engine.actions, vec![]).is_err());
    }

    #[test]
    fn specialize_shares_caller_provided_paramlist_and_freezes_args() {
        let mut engine = Engine::new_for_test();
        let base = fresh_action(&mut engine);
        let paramlist = engine.series.make_array(vec![], Flavor::Paramlist);
        let frozen = vec![];
        let specialized = specialize(&mut engine.actions, base, paramlist, frozen);
        assert_eq!(engine.actions.get(specialized).paramlist, paramlist);
        assert!(matches!(engine.actions.get(specialized).dispatcher, Dispatcher::Specialized { base: b, .. } if b == base));
    }

    #[test]
    fn adapt_paramlist_mirrors_base() {
        let mut engine = Engine::new_for_test();
        let base = fresh_action(&mut engine);
        let prelude = engine.series.make_array(vec![], Flavor::Plain);
        let adapted = adapt(&mut engine.actions, base, prelude);
        assert_eq!(engine.actions.get(adapted).paramlist, engine.actions.get(base).paramlist);
    }

    #[test]
    fn generic_table_dispatches_by_kind() {
        let mut table = GenericTable::new();
        let mut interner = crate::intern::Interner::new();
        let add = interner.intern("add");
        table.register(add, Kind::Integer, noop_native);
        assert!(table.lookup(add, Kind::Integer).is_some());
        assert!(table.lookup(add, Kind::Decimal).is_none());
    }
}
