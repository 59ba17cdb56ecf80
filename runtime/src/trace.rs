//! Per-request span tree assembly.
//!
//! The tracer opens a root span per request and nests stage spans in
//! pipeline order, with `unit` children per hook invocation. Begin/end
//! events stream to the registered sinks as spans open and close; the
//! finished tree goes to `trace` hooks when the request completes. When
//! neither hooks nor sinks are registered the tracer is inert and costs a
//! branch per stage.

use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use weave_core::trace::{SpanEvent, SpanPhase, TraceProcess, TraceSink};

pub(crate) struct Tracer<'a> {
    enabled: bool,
    request_id: u64,
    epoch: Instant,
    stack: Vec<TraceProcess>,
    root: Option<TraceProcess>,
    sinks: &'a [Arc<dyn TraceSink>],
}

impl<'a> Tracer<'a> {
    pub(crate) fn new(
        request_id: u64,
        root_name: &str,
        enabled: bool,
        sinks: &'a [Arc<dyn TraceSink>],
    ) -> Self {
        let mut tracer = Self {
            enabled,
            request_id,
            epoch: Instant::now(),
            stack: Vec::new(),
            root: None,
            sinks,
        };
        tracer.begin(root_name);
        tracer
    }

    /// Open a span as a child of the current one.
    pub(crate) fn begin(&mut self, name: &str) {
        if !self.enabled {
            return;
        }
        let at = Utc::now();
        self.emit(name, SpanPhase::Begin);
        self.stack
            .push(TraceProcess::new(name, at, self.epoch.elapsed()));
    }

    /// Close the current span and attach it to its parent.
    pub(crate) fn end(&mut self) {
        if !self.enabled {
            return;
        }
        let Some(mut span) = self.stack.pop() else {
            return;
        };
        span.end = Some(self.epoch.elapsed());
        self.emit(&span.name, SpanPhase::End);
        if let Some(parent) = self.stack.last_mut() {
            parent.children.push(span);
        } else {
            self.root = Some(span);
        }
    }

    /// Close any spans still open and return the finished tree.
    pub(crate) fn finish(mut self) -> Option<TraceProcess> {
        while !self.stack.is_empty() {
            self.end();
        }
        self.root.take()
    }

    fn emit(&self, name: &str, phase: SpanPhase) {
        if self.sinks.is_empty() {
            return;
        }
        let event = SpanEvent {
            request_id: self.request_id,
            name: name.to_string(),
            phase,
            at: Utc::now(),
        };
        for sink in self.sinks {
            sink.emit(&event);
        }
    }
}
