//! Frame & Stack (spec §3.2 "Frame", §4.D).
//!
//! A frame is the per-invocation activation record pushed for every action call. Its
//! backing storage is a [`Context`] (so `context of` and debugger access always have
//! something to reify to — spec §4.D "Reification"); the spec's stack-lifetime-vs-heap
//! distinction is modeled as a `reified` bit rather than two physically different storage
//! strategies, since every array in this crate already lives in an arena addressed by
//! handle (spec §9 "self-referential archetypes... represent as an arena-allocated array
//! indexed by a handle").

use crate::{
    cell::{Binding, Cell},
    context::{Context, ContextArena, ContextId, ContextKind},
    dispatch::ActionId,
    error::CoreError,
    resource::DepthTracker,
    series::{Flavor, SeriesArena, SeriesId},
    tracer::Tracer,
};

/// §4.D frame lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    Initial,
    FulfillingArgs,
    Dispatching,
    Dropped,
}

/// A dispatcher's request to restart argument fulfillment or re-inject a value (spec
/// §4.D, §4.F).
#[derive(Debug, Clone, Copy)]
pub enum Redo {
    /// Restart argument fulfillment with a possibly-new phase and type-check.
    Checked,
    /// Restart dispatch without re-checking argument types.
    Unchecked,
    /// Feed the frame's `spare` cell as the next input without advancing the feed.
    ReevaluateCell,
}

/// The evaluator's input stream abstraction (spec §3.2 "Feed"). Only the array-backed
/// form is implemented; a variadic feed source is named in the spec but has no
/// evaluation-driving native in this core's minimal vocabulary (spec §11) and is left as
/// a documented extension point rather than half-wired.
#[derive(Debug, Clone, Copy)]
pub struct Feed {
    array: SeriesId,
    pos: usize,
}

impl Feed {
    #[must_use]
    pub fn new(array: SeriesId) -> Self {
        Self { array, pos: 0 }
    }

    #[must_use]
    pub fn array(&self) -> SeriesId {
        self.array
    }

    #[must_use]
    pub fn pos(&self) -> usize {
        self.pos
    }

    #[must_use]
    pub fn peek<'a>(&self, series: &'a SeriesArena) -> Option<&'a Cell> {
        series.get(self.array).get(self.pos)
    }

    pub fn advance(&mut self) {
        self.pos += 1;
    }

    #[must_use]
    pub fn at_end(&self, series: &SeriesArena) -> bool {
        self.pos >= series.get(self.array).len()
    }
}

/// Per-invocation activation record (spec §3.2, §4.D).
#[derive(Debug)]
pub struct Frame {
    state: FrameState,
    /// Backing storage: a Frame-kind context sharing its keylist with `phase`'s
    /// paramlist (spec §3.2).
    context: ContextId,
    /// Current action identity under dispatch (spec §3.2) — may change across a
    /// `Redo::Checked`/`Redo::Unchecked` (e.g. adapt jumping to its adaptee).
    phase: ActionId,
    /// Archetype binding captured at call site, e.g. for definitional return (spec
    /// §3.2, §4.E.2).
    binding: Binding,
    out: Cell,
    spare: Cell,
    feed: Feed,
    /// Baseline of the shared refinement/data stack on entry (spec §3.2 `dsp_orig`).
    dsp_orig: usize,
    reified: bool,
}

impl Frame {
    #[must_use]
    pub fn state(&self) -> FrameState {
        self.state
    }

    #[must_use]
    pub fn context(&self) -> ContextId {
        self.context
    }

    #[must_use]
    pub fn phase(&self) -> ActionId {
        self.phase
    }

    pub fn set_phase(&mut self, phase: ActionId) {
        self.phase = phase;
    }

    #[must_use]
    pub fn binding(&self) -> Binding {
        self.binding
    }

    #[must_use]
    pub fn out(&self) -> &Cell {
        &self.out
    }

    pub fn out_mut(&mut self) -> &mut Cell {
        &mut self.out
    }

    pub fn set_out(&mut self, cell: Cell) {
        self.out = cell;
    }

    #[must_use]
    pub fn spare(&self) -> &Cell {
        &self.spare
    }

    pub fn set_spare(&mut self, cell: Cell) {
        self.spare = cell;
    }

    pub fn feed(&self) -> &Feed {
        &self.feed
    }

    pub fn feed_mut(&mut self) -> &mut Feed {
        &mut self.feed
    }

    #[must_use]
    pub fn dsp_orig(&self) -> usize {
        self.dsp_orig
    }

    pub fn set_state(&mut self, state: FrameState) {
        self.state = state;
    }

    /// Reification (spec §4.D): upgrades this frame's backing context so it survives the
    /// frame's drop — triggered by `context of`, debug access, or capturing the frame as
    /// a FRAME! value.
    pub fn reify(&mut self, series: &mut SeriesArena, contexts: &ContextArena) {
        if self.reified {
            return;
        }
        self.reified = true;
        let varlist = contexts.get(self.context).varlist();
        series.get_mut(varlist).mark_reified();
    }
}

/// The single evaluator-owned data stack (spec §9 "Shared mutable stack (dsp)"),
/// primarily used to record refinement names pushed during path traversal in their
/// call-site order (spec §4.E.3).
#[derive(Debug, Default)]
pub struct DataStack {
    cells: Vec<Cell>,
}

impl DataStack {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn dsp(&self) -> usize {
        self.cells.len()
    }

    pub fn push(&mut self, cell: Cell) {
        self.cells.push(cell);
    }

    /// Restores the stack to `baseline`, the scoped-drop discipline spec §5 requires
    /// ("callers must restore dsp_orig on all exit paths").
    pub fn restore(&mut self, baseline: usize) {
        self.cells.truncate(baseline);
    }

    #[must_use]
    pub fn slice_from(&self, baseline: usize) -> &[Cell] {
        &self.cells[baseline..]
    }
}

/// Owns the call stack and pushes/drops [`Frame`]s (spec §4.D).
pub struct FrameStack {
    frames: Vec<Frame>,
}

impl Default for FrameStack {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameStack {
    #[must_use]
    pub fn new() -> Self {
        Self { frames: Vec::new() }
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    #[must_use]
    pub fn top(&self) -> Option<&Frame> {
        self.frames.last()
    }

    pub fn top_mut(&mut self) -> Option<&mut Frame> {
        self.frames.last_mut()
    }

    /// The frame directly beneath the top of stack — the frame that dispatched the
    /// currently-running native. Definitional RETURN (spec §4.E.2, §11) targets this
    /// frame's context rather than its own ephemeral activation record.
    #[must_use]
    pub fn caller(&self) -> Option<&Frame> {
        let len = self.frames.len();
        if len < 2 {
            return None;
        }
        self.frames.get(len - 2)
    }

    /// Push (spec §4.D): captures `dsp_orig`, allocates the backing context sharing
    /// `paramlist` as its keylist, and guards recursion depth via `depth_tracker`.
    ///
    /// # Errors
    /// Propagates a recursion-limit error from `depth_tracker`.
    #[allow(clippy::too_many_arguments)]
    pub fn push(
        &mut self,
        series: &mut SeriesArena,
        contexts: &mut ContextArena,
        data_stack: &DataStack,
        depth_tracker: &mut impl DepthTracker,
        tracer: &mut dyn Tracer,
        phase: ActionId,
        paramlist: SeriesId,
        binding: Binding,
        feed: Feed,
    ) -> Result<(), CoreError> {
        depth_tracker.enter()?;
        let context = contexts.with_shared_keylist(series, ContextKind::Frame, paramlist);
        series.get_mut(contexts.get(context).varlist()).mark_stack_lifetime();
        self.frames.push(Frame {
            state: FrameState::Initial,
            context,
            phase,
            binding,
            out: Cell::void(),
            spare: Cell::void(),
            feed,
            dsp_orig: data_stack.dsp(),
            reified: false,
        });
        tracer.on_frame_push(self.frames.len());
        Ok(())
    }

    /// Drop (spec §4.D): restores the data stack to `dsp_orig` and, unless the frame was
    /// reified, marks its backing varlist inaccessible (spec §3.4).
    pub fn drop_top(
        &mut self,
        contexts: &mut ContextArena,
        data_stack: &mut DataStack,
        depth_tracker: &mut impl DepthTracker,
        tracer: &mut dyn Tracer,
    ) {
        let Some(mut frame) = self.frames.pop() else { return };
        data_stack.restore(frame.dsp_orig);
        if !frame.reified {
            contexts.get_mut(frame.context).mark_inaccessible();
        }
        frame.state = FrameState::Dropped;
        depth_tracker.exit();
        tracer.on_frame_drop(self.frames.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cell::Cell,
        dispatch::ActionId,
        resource::{LimitedDepthTracker, NoLimitDepthTracker},
        tracer::NoopTracer,
    };

    fn push_test_frame(
        stack: &mut FrameStack,
        series: &mut SeriesArena,
        contexts: &mut ContextArena,
        ds: &DataStack,
        tracker: &mut impl DepthTracker,
    ) {
        let paramlist = series.make_array(vec![Cell::action(ActionId::test_handle(0))], Flavor::Paramlist);
        let feed_array = series.make_array(vec![], Flavor::Plain);
        stack
            .push(
                series,
                contexts,
                ds,
                tracker,
                &mut NoopTracer,
                ActionId::test_handle(0),
                paramlist,
                Binding::Unbound,
                Feed::new(feed_array),
            )
            .unwrap();
    }

    #[test]
    fn push_and_drop_restores_dsp() {
        let mut series = SeriesArena::new();
        let mut contexts = ContextArena::new();
        let mut ds = DataStack::new();
        let mut stack = FrameStack::new();
        let mut tracker = NoLimitDepthTracker::default();
        ds.push(Cell::integer(1));
        let baseline = ds.dsp();
        push_test_frame(&mut stack, &mut series, &mut contexts, &ds, &mut tracker);
        ds.push(Cell::integer(2));
        stack.drop_top(&mut contexts, &mut ds, &mut tracker, &mut NoopTracer);
        assert_eq!(ds.dsp(), baseline);
    }

    #[test]
    fn dropped_non_reified_frame_is_inaccessible() {
        let mut series = SeriesArena::new();
        let mut contexts = ContextArena::new();
        let mut ds = DataStack::new();
        let mut stack = FrameStack::new();
        let mut tracker = NoLimitDepthTracker::default();
        push_test_frame(&mut stack, &mut series, &mut contexts, &ds, &mut tracker);
        let ctx_id = stack.top().unwrap().context();
        stack.drop_top(&mut contexts, &mut ds, &mut tracker, &mut NoopTracer);
        assert!(contexts.get_var(&series, ctx_id, 0).is_err());
    }

    #[test]
    fn reified_frame_survives_drop() {
        let mut series = SeriesArena::new();
        let mut contexts = ContextArena::new();
        let mut ds = DataStack::new();
        let mut stack = FrameStack::new();
        let mut tracker = NoLimitDepthTracker::default();
        push_test_frame(&mut stack, &mut series, &mut contexts, &ds, &mut tracker);
        let frame = stack.top_mut().unwrap();
        frame.reify(&mut series, &contexts);
        let ctx_id = stack.top().unwrap().context();
        stack.drop_top(&mut contexts, &mut ds, &mut tracker, &mut NoopTracer);
        assert!(contexts.get_var(&series, ctx_id, 0).is_ok());
    }

    #[test]
    fn recursion_limit_is_enforced_on_push() {
        let mut series = SeriesArena::new();
        let mut contexts = ContextArena::new();
        let ds = DataStack::new();
        let mut stack = FrameStack::new();
        let mut tracker = LimitedDepthTracker::new(1);
        push_test_frame(&mut stack, &mut series, &mut contexts, &ds, &mut tracker);
        let paramlist = series.make_array(vec![Cell::action(ActionId::test_handle(0))], Flavor::Paramlist);
        let feed_array = series.make_array(vec![], Flavor::Plain);
        let err = stack
            .push(
                &mut series,
                &mut contexts,
                &ds,
                &mut tracker,
                &mut NoopTracer,
                ActionId::test_handle(0),
                paramlist,
                Binding::Unbound,
                Feed::new(feed_array),
            )
            .unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Internal);
    }
}
