//! Runtime metrics.
//!
//! Counters and a duration histogram for the dispatcher and pipeline.
//! Exporter wiring is the embedding application's concern.

use http::Method;
use metrics::{counter, describe_counter, describe_histogram, histogram};
use weave_core::error::ErrorCode;

/// Metric names.
pub mod names {
    /// Requests dispatched to a route pipeline.
    pub const REQUESTS: &str = "weave_requests_total";
    /// Pipeline failures, labeled by error code.
    pub const FAILURES: &str = "weave_failures_total";
    /// Requests that matched no route.
    pub const NOT_FOUND: &str = "weave_not_found_total";
    /// End-to-end pipeline duration in seconds.
    pub const DURATION: &str = "weave_request_duration_seconds";
}

/// Register metric descriptions. Called once at engine start.
pub fn describe() {
    describe_counter!(names::REQUESTS, "Requests dispatched to a route pipeline");
    describe_counter!(names::FAILURES, "Pipeline failures by error code");
    describe_counter!(names::NOT_FOUND, "Requests that matched no route");
    describe_histogram!(names::DURATION, "End-to-end pipeline duration in seconds");
}

pub(crate) fn record_request(method: &Method) {
    counter!(names::REQUESTS, "method" => method.to_string()).increment(1);
}

pub(crate) fn record_failure(code: &ErrorCode) {
    counter!(names::FAILURES, "code" => code.as_str().to_string()).increment(1);
}

pub(crate) fn record_not_found() {
    counter!(names::NOT_FOUND).increment(1);
}

pub(crate) fn record_duration(seconds: f64) {
    histogram!(names::DURATION).record(seconds);
}
