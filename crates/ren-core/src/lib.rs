//! Core evaluator, frame, and action-dispatch engine for a homoiconic, dynamically-typed
//! language in the Rebol/Ren-C family (see `SPEC_FULL.md` at the workspace root).
//!
//! This crate implements the evaluator loop, the function-call state machine, the
//! parameter-list compiler, and the specialize/adapt/chain/enclose/hijack composition
//! layer. It deliberately does not implement a lexical scanner, an I/O device layer, a
//! GC, or a console — those are out of scope; see `SPEC_FULL.md` §12.

#![expect(clippy::module_name_repetitions, reason = "handle types are named after their module on purpose")]

pub mod cell;
pub mod context;
pub mod control;
pub mod dispatch;
pub mod error;
pub mod evaluator;
pub mod frame;
pub mod intern;
pub mod mold;
pub mod natives;
pub mod paramlist;
pub mod resource;
pub mod series;
pub mod tracer;

use cell::Cell;
use context::ContextArena;
use dispatch::{ActionArena, ActionId, GenericTable};
use error::CoreResult;
use frame::{DataStack, FrameStack};
use intern::{Interner, Symbol};
use paramlist::ParamTable;
use resource::{LimitedDepthTracker, DEFAULT_MAX_DEPTH};
use series::SeriesArena;
use tracer::{NoopTracer, Tracer};

/// Symbols the engine itself needs to recognize without re-interning them on every use
/// (spec §4.C `return:`, §4.E.5 throw labels).
pub struct WellKnownSymbols {
    pub return_: Symbol,
    pub break_: Symbol,
    pub continue_: Symbol,
    pub throw: Symbol,
}

impl WellKnownSymbols {
    fn new(interner: &mut Interner) -> Self {
        Self {
            return_: interner.intern("return"),
            break_: interner.intern("break"),
            continue_: interner.intern("continue"),
            throw: interner.intern("throw"),
        }
    }
}

/// Host-tunable knobs (spec §10.4). Constructed once and consumed by [`Engine::new`].
pub struct EngineConfig {
    /// Maximum call-stack depth before a recursion-limit error is raised (spec §10.3).
    pub max_depth: usize,
    /// Initial symbol-table capacity, for an embedder that can estimate the distinct-word
    /// count of the program it's about to run (spec §10.4).
    pub symbol_capacity: usize,
    /// Observability hook; defaults to [`NoopTracer`] for zero-overhead production use
    /// (spec §10.2).
    pub tracer: Box<dyn Tracer>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { max_depth: DEFAULT_MAX_DEPTH, symbol_capacity: 0, tracer: Box::new(NoopTracer) }
    }
}

/// Everything one evaluation session owns: every arena plus the live call stack (spec
/// §3.4). Owning all of it in one struct (rather than passing a dozen arenas through every
/// call) mirrors the teacher lineage's top-level VM/interpreter struct, which bundles its
/// heap, namespaces, and call stack the same way.
pub struct Engine {
    pub series: SeriesArena,
    pub contexts: ContextArena,
    pub params: ParamTable,
    pub actions: ActionArena,
    pub generics: GenericTable,
    pub interner: Interner,
    pub frames: FrameStack,
    pub data_stack: DataStack,
    pub depth: LimitedDepthTracker,
    pub tracer: Box<dyn Tracer>,
    pub well_known: WellKnownSymbols,
    /// The installed `return` native's identity (spec §4.E.2 "definitional return"), set
    /// once by `natives::install`. A paramlist's synthetic return slot is filled with
    /// `Cell::action(return_action)` once this is known, so `return value` inside a body
    /// dispatches like any other action word; `None` before `install` runs (e.g. in unit
    /// tests that never call it) falls back to storing `null` in that slot instead.
    pub return_action: Option<ActionId>,
}

impl Engine {
    /// `init` (spec §6.1): builds a fresh session from host configuration.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        let mut interner = Interner::with_capacity(config.symbol_capacity);
        let well_known = WellKnownSymbols::new(&mut interner);
        Self {
            series: SeriesArena::new(),
            contexts: ContextArena::new(),
            params: ParamTable::new(),
            actions: ActionArena::new(),
            generics: GenericTable::new(),
            interner,
            frames: FrameStack::new(),
            data_stack: DataStack::new(),
            depth: LimitedDepthTracker::new(config.max_depth),
            tracer: config.tracer,
            well_known,
            return_action: None,
        }
    }

    #[cfg(test)]
    #[must_use]
    pub fn new_for_test() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

/// Evaluates `block` to completion and returns its last non-invisible result (spec
/// §4.E "top level driver"), the thin entry point a host (e.g. `ren-cli`) calls after
/// building cells by its own means (spec §1: lexing/loading is out of scope here).
///
/// # Errors
/// Propagates any unrecovered [`error::CoreError`] or unhandled throw surfaced as one
/// (spec §7 "User-visible behavior").
pub fn run_block(engine: &mut Engine, block: series::SeriesId) -> CoreResult<Cell> {
    evaluator::eval_to_end(engine, block)
}
