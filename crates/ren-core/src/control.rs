//! Loop & Throw Protocol (spec §4.E.5, §11).
//!
//! BREAK, CONTINUE, RETURN, STOP, and a generic labeled THROW all unwind the Rust call
//! stack the same way: as an [`Unwind`] threaded through `?`, rather than as a side
//! channel flag checked after every step. Grounded on the teacher lineage's
//! `bytecode/vm/exceptions.rs`, which represents Python's `break`/`continue`/`return`/
//! raised-exception unwind as one sum type propagated the same way up its VM's call
//! stack.

use crate::{cell::Cell, context::ContextId, error::CoreError, intern::Symbol};

/// A control-flow signal that unwinds past ordinary evaluation (spec §4.E.5). Distinct
/// from [`CoreError`] because these carry a *value* — LOOP's BREAK result, a function's
/// RETURN value, THROW's payload — not just a message.
#[derive(Debug, Clone)]
pub enum Thrown {
    /// Exits the nearest enclosing loop construct, yielding `null` as the loop's own
    /// result (spec §8 invariant "BREAK's unwind leaves the enclosing LOOP evaluating to
    /// null").
    Break,
    /// Skips to the next iteration of the nearest enclosing loop.
    Continue,
    /// Exits the function call that instantiated `target` specifically (spec §4.E.2
    /// "definitional return" — a captured RETURN invoked after its originating frame has
    /// already dropped targets a frame no longer on the stack, which surfaces as
    /// [`CoreError::expired_frame`] rather than silently returning from whatever frame
    /// happens to be active).
    Return { target: ContextId, value: Cell },
    /// Like RETURN but exits every frame up to and including the session's outermost
    /// catch point (spec §11) — used by natives that must abort evaluation entirely.
    Stop(Cell),
    /// A user-labeled throw/catch pair (spec §4.E.5, §11); `label` is matched by
    /// identity (word binding), not by spelling alone.
    Throw { label: Symbol, value: Cell },
}

impl Thrown {
    /// The name `no_catch_for_throw` should report when this signal escapes its owner
    /// (spec §7 "no catch for throw").
    #[must_use]
    pub fn label_name(&self, resolve: impl Fn(Symbol) -> String) -> String {
        match self {
            Self::Break => "break".to_string(),
            Self::Continue => "continue".to_string(),
            Self::Return { .. } => "return".to_string(),
            Self::Stop(_) => "stop".to_string(),
            Self::Throw { label, .. } => resolve(*label),
        }
    }
}

/// Either an ordinary error or a control-flow signal unwinding the Rust stack (spec
/// §4.E.5). Evaluator functions return `Result<Cell, Unwind>` uniformly so `?` threads
/// both kinds of interruption without a second channel.
#[derive(Debug, Clone)]
pub enum Unwind {
    Error(CoreError),
    Signal(Thrown),
}

pub type EvalResult<T> = Result<T, Unwind>;

impl From<CoreError> for Unwind {
    fn from(err: CoreError) -> Self {
        Self::Error(err)
    }
}

impl Unwind {
    /// Converts an unhandled signal into the typed error a host ultimately sees (spec
    /// §7 "an unhandled throw becomes... a Script-kind error naming the label").
    #[must_use]
    pub fn into_core_error(self, resolve: impl Fn(Symbol) -> String) -> CoreError {
        match self {
            Self::Error(err) => err,
            Self::Signal(thrown) => CoreError::no_catch_for_throw(&thrown.label_name(resolve)),
        }
    }
}

/// What a loop body's per-iteration evaluation resolved to (spec §11 loop family).
pub enum LoopSignal {
    /// Ordinary fall-through; carries the iteration's result (becomes the loop's overall
    /// result if no further iteration runs).
    Normal(Cell),
    /// CONTINUE was thrown; the loop should advance to its next iteration immediately.
    Continue,
    /// BREAK was thrown; the loop should stop, yielding `null` (spec §8 invariant).
    Break,
}

/// Absorbs a BREAK/CONTINUE thrown by evaluating one loop iteration, letting any other
/// signal or error propagate past the loop untouched (spec §4.E.5 "only the nearest
/// enclosing loop construct catches BREAK/CONTINUE").
pub fn absorb_loop_signal(result: EvalResult<Cell>) -> EvalResult<LoopSignal> {
    match result {
        Ok(v) => Ok(LoopSignal::Normal(v)),
        Err(Unwind::Signal(Thrown::Continue)) => Ok(LoopSignal::Continue),
        Err(Unwind::Signal(Thrown::Break)) => Ok(LoopSignal::Break),
        Err(other) => Err(other),
    }
}

/// Absorbs a RETURN targeting `frame`, letting a RETURN aimed at some other (outer)
/// frame keep propagating past this one untouched (spec §4.E.2 "definitional return
/// unwinds exactly to the frame that defined it").
pub fn absorb_return(result: EvalResult<Cell>, frame: ContextId) -> EvalResult<Cell> {
    match result {
        Err(Unwind::Signal(Thrown::Return { target, value })) if target == frame => Ok(value),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absorb_loop_signal_distinguishes_break_and_continue() {
        assert!(matches!(
            absorb_loop_signal(Err(Unwind::Signal(Thrown::Break))),
            Ok(LoopSignal::Break)
        ));
        assert!(matches!(
            absorb_loop_signal(Err(Unwind::Signal(Thrown::Continue))),
            Ok(LoopSignal::Continue)
        ));
        let target = ContextId::test_handle(0);
        assert!(absorb_loop_signal(Err(Unwind::Signal(Thrown::Return { target, value: Cell::void() }))).is_err());
    }

    #[test]
    fn absorb_return_only_catches_its_own_target() {
        let target = ContextId::test_handle(0);
        let other = ContextId::test_handle(1);
        assert!(absorb_return(Err(Unwind::Signal(Thrown::Break)), target).is_err());
        assert!(absorb_return(Err(Unwind::Signal(Thrown::Return { target: other, value: Cell::integer(9) })), target)
            .is_err());
        let value =
            absorb_return(Err(Unwind::Signal(Thrown::Return { target, value: Cell::integer(9) })), target).unwrap();
        assert_eq!(value.kind(), crate::cell::Kind::Integer);
    }
}
