//! Evaluator step tracing (spec §10.2).
//!
//! The evaluator is generic over a [`Tracer`] so that production dispatch pays zero
//! overhead for observability ([`NoopTracer`] monomorphizes away) while a debug build or
//! a host embedding a step debugger can swap in [`RecordingTracer`] or [`StderrTracer`].

use crate::cell::Kind;

/// One observable event in a single `eval_step` (spec §4.E) or frame lifecycle (§4.D)
/// transition.
#[derive(Debug, Clone)]
pub enum TraceEvent {
    /// The evaluator is about to dispatch on the feed item of this kind.
    Step { kind: Kind },
    /// A frame was pushed for an action invocation.
    FramePush { depth: usize },
    /// A frame was dropped (action completed, threw, or was reified away).
    FrameDrop { depth: usize },
    /// A value was thrown with the given label name (break/continue/return/stop/throw/
    /// error — §4.E.5).
    Thrown { label: String },
    /// A dispatcher requested a redo (§4.D, §4.F).
    Redo { checked: bool },
}

/// Hook points the evaluator and frame stack call into. Implement this to observe
/// execution without touching evaluator internals.
pub trait Tracer {
    fn on_step(&mut self, _kind: Kind) {}
    fn on_frame_push(&mut self, _depth: usize) {}
    fn on_frame_drop(&mut self, _depth: usize) {}
    fn on_thrown(&mut self, _label: &str) {}
    fn on_redo(&mut self, _checked: bool) {}
}

/// Zero-cost tracer: every method is empty and the compiler elides the calls entirely
/// under monomorphization, exactly as the teacher lineage's `NoopTracer` does for its VM.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTracer;

impl Tracer for NoopTracer {}

/// Prints a one-line human-readable trace to stderr as events occur.
#[derive(Debug, Clone, Copy, Default)]
pub struct StderrTracer;

impl Tracer for StderrTracer {
    fn on_step(&mut self, kind: Kind) {
        eprintln!("step: {kind:?}");
    }

    fn on_frame_push(&mut self, depth: usize) {
        eprintln!("frame push -> depth {depth}");
    }

    fn on_frame_drop(&mut self, depth: usize) {
        eprintln!("frame drop -> depth {depth}");
    }

    fn on_thrown(&mut self, label: &str) {
        eprintln!("thrown: {label}");
    }

    fn on_redo(&mut self, checked: bool) {
        eprintln!("redo (checked={checked})");
    }
}

/// Records every event for later inspection (deterministic replay, post-mortem, or test
/// assertions on evaluator behavior).
#[derive(Debug, Clone, Default)]
pub struct RecordingTracer {
    pub events: Vec<TraceEvent>,
}

impl RecordingTracer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Tracer for RecordingTracer {
    fn on_step(&mut self, kind: Kind) {
        self.events.push(TraceEvent::Step { kind });
    }

    fn on_frame_push(&mut self, depth: usize) {
        self.events.push(TraceEvent::FramePush { depth });
    }

    fn on_frame_drop(&mut self, depth: usize) {
        self.events.push(TraceEvent::FrameDrop { depth });
    }

    fn on_thrown(&mut self, label: &str) {
        self.events.push(TraceEvent::Thrown { label: label.to_string() });
    }

    fn on_redo(&mut self, checked: bool) {
        self.events.push(TraceEvent::Redo { checked });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_tracer_collects_events_in_order() {
        let mut tracer = RecordingTracer::new();
        tracer.on_frame_push(1);
        tracer.on_step(Kind::Integer);
        tracer.on_frame_drop(1);
        assert_eq!(tracer.events.len(), 3);
        assert!(matches!(tracer.events[0], TraceEvent::FramePush { depth: 1 }));
        assert!(matches!(tracer.events[2], TraceEvent::FrameDrop { depth: 1 }));
    }
}
