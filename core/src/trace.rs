//! Trace span tree and the sink contract.
//!
//! The execution engine produces one [`TraceProcess`] tree per request,
//! keyed by the monotonically increasing request id. Stage spans nest in
//! pipeline order, with per-hook-index `unit` children so the constant-cost
//! part of a stage is distinguishable from user hook cost. This module only
//! defines the data; assembly lives in the runtime crate, and persistence
//! is a sink collaborator's problem.

use chrono::{DateTime, Utc};
use std::time::Duration;

/// One timed span: a pipeline stage, or a `unit` child covering a single
/// hook invocation.
#[derive(Clone, Debug)]
pub struct TraceProcess {
    /// Span name (stage name, or `unit` for per-hook children).
    pub name: String,
    /// Wall-clock time the span began.
    pub begin_at: DateTime<Utc>,
    /// Offset from the root span's begin.
    pub begin: Duration,
    /// Offset from the root span's begin at which the span ended, once
    /// resolved.
    pub end: Option<Duration>,
    /// Child spans, in execution order.
    pub children: Vec<TraceProcess>,
}

impl TraceProcess {
    /// Create an open span.
    #[must_use]
    pub fn new(name: impl Into<String>, begin_at: DateTime<Utc>, begin: Duration) -> Self {
        Self {
            name: name.into(),
            begin_at,
            begin,
            end: None,
            children: Vec::new(),
        }
    }

    /// Time spent inside the span, if it has ended.
    #[must_use]
    pub fn duration(&self) -> Option<Duration> {
        self.end.map(|end| end.saturating_sub(self.begin))
    }

    /// Find the first direct child with the given name.
    #[must_use]
    pub fn child(&self, name: &str) -> Option<&TraceProcess> {
        self.children.iter().find(|c| c.name == name)
    }
}

/// Whether a span event marks the beginning or the end of a span.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpanPhase {
    /// Span opened.
    Begin,
    /// Span closed.
    End,
}

/// A begin/end event emitted to trace sinks as spans open and close.
#[derive(Clone, Debug)]
pub struct SpanEvent {
    /// Request this span belongs to.
    pub request_id: u64,
    /// Span name.
    pub name: String,
    /// Begin or end.
    pub phase: SpanPhase,
    /// Wall-clock time of the event.
    pub at: DateTime<Utc>,
}

/// Consumer of streaming span events (logging/metrics integrations).
///
/// The engine only produces the span tree; it never persists it.
pub trait TraceSink: Send + Sync {
    /// Receive one span event.
    fn emit(&self, event: &SpanEvent);
}
