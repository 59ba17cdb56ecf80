//! Default response mapping.
//!
//! Converts the pipeline's pending value into a transport response when no
//! `mapResponse` hook produced one, and maps failures to their JSON error
//! bodies. The status resolution order is: explicit failure override,
//! registered custom-code status, fixed default per code.

use http::{header, HeaderValue, StatusCode};
use serde_json::{json, Value};
use std::collections::HashMap;
use weave_core::context::{Context, Response};
use weave_core::error::{ErrorCode, Failure};

const TEXT_PLAIN: HeaderValue = HeaderValue::from_static("text/plain; charset=utf-8");
const APPLICATION_JSON: HeaderValue = HeaderValue::from_static("application/json");

/// Convert a pipeline value into a transport response.
pub(crate) fn value_to_response(value: Value, status: Option<StatusCode>) -> Response {
    match value {
        Value::Null => Response::empty(status.unwrap_or(StatusCode::NO_CONTENT)),
        Value::String(text) => {
            let mut response = Response::text(text);
            response.status = status.unwrap_or(StatusCode::OK);
            response
                .headers
                .insert(header::CONTENT_TYPE, TEXT_PLAIN);
            response
        }
        other => {
            let mut response = Response::json(other);
            response.status = status.unwrap_or(StatusCode::OK);
            response
                .headers
                .insert(header::CONTENT_TYPE, APPLICATION_JSON);
            response
        }
    }
}

/// Produce the final response from the context: a mapped response wins,
/// otherwise the pending value is converted. Headers staged by hooks are
/// merged in either way.
pub(crate) fn finalize(ctx: &mut Context) -> Response {
    let mut response = ctx.take_mapped().map_or_else(
        || {
            let value = ctx.take_result().unwrap_or(Value::Null);
            value_to_response(value, ctx.status_override())
        },
        |mapped| mapped,
    );
    for (name, value) in ctx.staged_headers() {
        response.headers.append(name.clone(), value.clone());
    }
    response
}

/// Resolve the status for a failure.
pub(crate) fn status_for(
    failure: &Failure,
    custom_status: &HashMap<String, StatusCode>,
) -> StatusCode {
    if let Some(status) = failure.status {
        return status;
    }
    if let ErrorCode::Custom(name) = &failure.code {
        if let Some(status) = custom_status.get(name) {
            return *status;
        }
    }
    failure.code.default_status()
}

/// The JSON error body for a failure.
pub(crate) fn failure_body(failure: &Failure) -> Value {
    let mut body = json!({
        "code": failure.code.as_str(),
        "message": failure.message,
    });
    if !failure.faults.is_empty() {
        if let Ok(faults) = serde_json::to_value(&failure.faults) {
            body["faults"] = faults;
        }
    }
    body
}

/// The default failure-to-response mapping. Always answers; the pipeline
/// never leaves a request without a response.
pub(crate) fn failure_response(
    failure: &Failure,
    custom_status: &HashMap<String, StatusCode>,
) -> Response {
    let mut response = Response::json(failure_body(failure));
    response.status = status_for(failure, custom_status);
    response
        .headers
        .insert(header::CONTENT_TYPE, APPLICATION_JSON);
    response
}
