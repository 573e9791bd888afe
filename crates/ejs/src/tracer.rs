//! VM tracing hooks (ambient component P). This is the interpreter's entire
//! logging surface — no external logging crate is pulled in, matching the
//! teacher crate, which exposes the same kind of pluggable-trait tracer
//! rather than depending on `log`/`tracing`.

use std::fmt;

/// One observable event the evaluator can report to a [`VmTracer`].
#[derive(Debug, Clone)]
pub enum TraceEvent {
    /// A function call is about to begin. `depth` is the call-stack depth
    /// after this call is pushed.
    Call { name: String, depth: usize },
    /// A function call just returned.
    Return { name: String },
    /// A garbage-collection pass ran.
    Gc { reclaimed: usize, live_after: usize },
    /// An allocation failed even after a GC pass and the host's
    /// memory-pressure callback.
    AllocFailed,
    /// An exception was thrown (including ones later caught).
    Thrown { message: String },
}

impl fmt::Display for TraceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraceEvent::Call { name, depth } => write!(f, "call {name} (depth {depth})"),
            TraceEvent::Return { name } => write!(f, "return {name}"),
            TraceEvent::Gc { reclaimed, live_after } => {
                write!(f, "gc: reclaimed {reclaimed}, {live_after} live")
            }
            TraceEvent::AllocFailed => write!(f, "allocation failed"),
            TraceEvent::Thrown { message } => write!(f, "thrown: {message}"),
        }
    }
}

/// Receives [`TraceEvent`]s as the evaluator runs. Implementations must be
/// cheap — this is called on every function entry/exit and every GC pass.
pub trait VmTracer {
    fn trace(&mut self, event: TraceEvent);
}

/// The default tracer: discards everything at zero cost.
#[derive(Debug, Default)]
pub struct NoopTracer;

impl VmTracer for NoopTracer {
    fn trace(&mut self, _event: TraceEvent) {}
}

/// Writes every event to stderr, one line each. Handy for ad-hoc debugging
/// of a failing script.
#[derive(Debug, Default)]
pub struct StderrTracer;

impl VmTracer for StderrTracer {
    fn trace(&mut self, event: TraceEvent) {
        eprintln!("[ejs] {event}");
    }
}

/// Collects every event into a `Vec` for assertions in tests.
#[derive(Debug, Default)]
pub struct RecordingTracer {
    pub events: Vec<String>,
}

impl VmTracer for RecordingTracer {
    fn trace(&mut self, event: TraceEvent) {
        self.events.push(event.to_string());
    }
}
