//! Capturing trace sink.

use std::sync::Mutex;
use weave_core::trace::{SpanEvent, SpanPhase, TraceSink};

/// A sink that records every span event it receives.
#[derive(Debug, Default)]
pub struct CapturingSink {
    events: Mutex<Vec<SpanEvent>>,
}

impl CapturingSink {
    /// An empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A copy of the captured events.
    #[must_use]
    pub fn events(&self) -> Vec<SpanEvent> {
        self.events.lock().map(|events| events.clone()).unwrap_or_default()
    }

    /// The names of captured begin events, in order.
    #[must_use]
    pub fn begun_spans(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter(|event| event.phase == SpanPhase::Begin)
            .map(|event| event.name)
            .collect()
    }
}

impl TraceSink for CapturingSink {
    fn emit(&self, event: &SpanEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn events_are_captured_in_order() {
        let sink = CapturingSink::new();
        for (name, phase) in [("a", SpanPhase::Begin), ("a", SpanPhase::End)] {
            sink.emit(&SpanEvent {
                request_id: 1,
                name: name.to_string(),
                phase,
                at: Utc::now(),
            });
        }
        assert_eq!(sink.events().len(), 2);
        assert_eq!(sink.begun_spans(), vec!["a".to_string()]);
    }
}
