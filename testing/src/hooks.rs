//! Invocation-counting hooks and handlers.
//!
//! Short-circuit and dedup laws are stated in terms of "this was invoked
//! N times"; these helpers make that observable.

use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use weave_core::hook::{
    intercept_sync, lifetime_sync, notify_sync, transform_sync, InterceptFn, LifetimeFn, NotifyFn,
    TransformFn,
};
use weave_core::route::{handler_sync, Handler};

/// A shared invocation counter.
#[derive(Clone, Debug, Default)]
pub struct Counter(Arc<AtomicUsize>);

impl Counter {
    /// A counter starting at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of recorded invocations.
    #[must_use]
    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    /// Record one invocation.
    pub fn bump(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

/// A `request`/`beforeHandle`/`afterHandle` hook that counts and passes
/// through.
#[must_use]
pub fn counting_intercept(counter: &Counter) -> InterceptFn {
    let counter = counter.clone();
    intercept_sync(move |_| {
        counter.bump();
        Ok(None)
    })
}

/// An intercept hook that short-circuits with the given value.
#[must_use]
pub fn short_circuit(value: Value) -> InterceptFn {
    intercept_sync(move |_| Ok(Some(value.clone())))
}

/// A `transform` hook that counts.
#[must_use]
pub fn counting_transform(counter: &Counter) -> TransformFn {
    let counter = counter.clone();
    transform_sync(move |_| {
        counter.bump();
        Ok(())
    })
}

/// An `onResponse` hook that counts.
#[must_use]
pub fn counting_notify(counter: &Counter) -> NotifyFn {
    let counter = counter.clone();
    notify_sync(move |_| counter.bump())
}

/// A `start`/`stop` hook that counts.
#[must_use]
pub fn counting_lifetime(counter: &Counter) -> LifetimeFn {
    let counter = counter.clone();
    lifetime_sync(move || {
        counter.bump();
        Ok(())
    })
}

/// A handler that counts invocations and returns a fixed value.
#[must_use]
pub fn counting_handler(counter: &Counter, value: Value) -> Handler {
    let counter = counter.clone();
    handler_sync(move |_| {
        counter.bump();
        Ok(value.clone())
    })
}
