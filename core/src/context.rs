//! Request, response, and the per-request `Context` handed to hooks.
//!
//! The `Context` is the single mutable surface a pipeline instance owns:
//! route parameters, the parsed body, derived values, decorators, the
//! shared store handle, and the staged response state (status/header
//! overrides, the pending result value, the mapped transport response).
//! Each request executes against its own `Context`; the only state shared
//! across concurrent requests is the store map, behind an `RwLock`.

use crate::singleton::ResolvedBindings;
use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Shared mutable state namespace, seeded from `state` bindings.
///
/// Concurrent mutation discipline is the caller's responsibility; the lock
/// only guarantees memory safety, not application-level ordering.
pub type SharedStore = Arc<RwLock<HashMap<String, Value>>>;

/// Create a store populated with the given seed entries.
#[must_use]
pub fn new_store(seed: &[(String, Value)]) -> SharedStore {
    let map = seed.iter().cloned().collect();
    Arc::new(RwLock::new(map))
}

/// An incoming request as seen by the composition engine.
///
/// The transport layer is out of scope; whatever listener feeds this engine
/// builds one of these per request.
#[derive(Clone, Debug)]
pub struct Request {
    /// HTTP method.
    pub method: Method,
    /// Request target: path plus optional `?query`.
    pub uri: String,
    /// Request headers.
    pub headers: HeaderMap,
    /// Raw, unparsed body bytes.
    pub body: Bytes,
}

impl Request {
    /// Create a request with no headers and an empty body.
    #[must_use]
    pub fn new(method: Method, uri: impl Into<String>) -> Self {
        Self {
            method,
            uri: uri.into(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// Attach a header. Invalid names or values are ignored.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.append(name, value);
        }
        self
    }

    /// Attach a raw body.
    #[must_use]
    pub fn with_body(mut self, body: Bytes) -> Self {
        self.body = body;
        self
    }

    /// Path component of the request target.
    #[must_use]
    pub fn path(&self) -> &str {
        self.uri.split('?').next().unwrap_or(&self.uri)
    }

    /// Query string, if any, without the leading `?`.
    #[must_use]
    pub fn query_string(&self) -> Option<&str> {
        self.uri.split_once('?').map(|(_, q)| q)
    }

    /// First value of a header, as a string.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// The `Content-Type` header, if present.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.header(http::header::CONTENT_TYPE.as_str())
    }
}

/// Response body payload.
#[derive(Clone, Debug, PartialEq)]
pub enum ResponseBody {
    /// No body.
    Empty,
    /// Plain text.
    Text(String),
    /// A JSON document.
    Json(Value),
    /// Raw bytes.
    Binary(Bytes),
}

/// A transport-level response.
#[derive(Clone, Debug)]
pub struct Response {
    /// Status code.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Body payload.
    pub body: ResponseBody,
}

impl Response {
    /// An empty response with the given status.
    #[must_use]
    pub fn empty(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: ResponseBody::Empty,
        }
    }

    /// A `200 OK` text response.
    #[must_use]
    pub fn text(body: impl Into<String>) -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: ResponseBody::Text(body.into()),
        }
    }

    /// A `200 OK` JSON response.
    #[must_use]
    pub fn json(body: Value) -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: ResponseBody::Json(body),
        }
    }

    /// Replace the status code.
    #[must_use]
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    /// Attach a header. Invalid names or values are ignored.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.append(name, value);
        }
        self
    }
}

/// The mutable per-request state threaded through every pipeline stage.
pub struct Context {
    request: Request,
    params: HashMap<String, String>,
    query: HashMap<String, String>,
    cookies: HashMap<String, String>,
    body: Option<Value>,
    derived: HashMap<String, Value>,
    bindings: ResolvedBindings,
    store: SharedStore,
    result: Option<Value>,
    mapped: Option<Response>,
    status: Option<StatusCode>,
    staged_headers: HeaderMap,
    request_id: u64,
}

impl Context {
    /// Create a context for one request. Parameter, query and cookie maps
    /// start empty; the dispatcher fills them in before the pipeline runs.
    #[must_use]
    pub fn new(
        request: Request,
        store: SharedStore,
        bindings: ResolvedBindings,
        request_id: u64,
    ) -> Self {
        Self {
            request,
            params: HashMap::new(),
            query: HashMap::new(),
            cookies: HashMap::new(),
            body: None,
            derived: HashMap::new(),
            bindings,
            store,
            result: None,
            mapped: None,
            status: None,
            staged_headers: HeaderMap::new(),
            request_id,
        }
    }

    /// The underlying request.
    #[must_use]
    pub const fn request(&self) -> &Request {
        &self.request
    }

    /// Request method.
    #[must_use]
    pub const fn method(&self) -> &Method {
        &self.request.method
    }

    /// Request path (no query string).
    #[must_use]
    pub fn path(&self) -> &str {
        self.request.path()
    }

    /// Monotonically increasing id of this request.
    #[must_use]
    pub const fn request_id(&self) -> u64 {
        self.request_id
    }

    /// Path parameters captured by the route matcher.
    #[must_use]
    pub const fn params(&self) -> &HashMap<String, String> {
        &self.params
    }

    /// One path parameter by name.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// Replace the path parameter map.
    pub fn set_params(&mut self, params: HashMap<String, String>) {
        self.params = params;
    }

    /// Parsed query parameters.
    #[must_use]
    pub const fn query(&self) -> &HashMap<String, String> {
        &self.query
    }

    /// One query parameter by name.
    #[must_use]
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    /// Replace the query map.
    pub fn set_query(&mut self, query: HashMap<String, String>) {
        self.query = query;
    }

    /// Request cookies (signed cookies appear here after verification).
    #[must_use]
    pub const fn cookies(&self) -> &HashMap<String, String> {
        &self.cookies
    }

    /// One cookie by name.
    #[must_use]
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    /// Replace the cookie map.
    pub fn set_cookies(&mut self, cookies: HashMap<String, String>) {
        self.cookies = cookies;
    }

    /// The parsed body, if the parse stage produced one.
    #[must_use]
    pub const fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }

    /// Set the parsed body.
    pub fn set_body(&mut self, body: Value) {
        self.body = Some(body);
    }

    /// A derived or resolved value by binding name.
    #[must_use]
    pub fn derived(&self, name: &str) -> Option<&Value> {
        self.derived.get(name)
    }

    /// Record a derived or resolved value.
    pub fn set_derived(&mut self, name: impl Into<String>, value: Value) {
        self.derived.insert(name.into(), value);
    }

    /// A decorator by name, downcast to its concrete type.
    #[must_use]
    pub fn decorator<T: Any + Send + Sync>(&self, name: &str) -> Option<&T> {
        self.bindings
            .decorators
            .iter()
            .find(|(n, _)| n == name)
            .and_then(|(_, v)| v.downcast_ref::<T>())
    }

    /// The bindings snapshot this route was composed with.
    #[must_use]
    pub const fn bindings(&self) -> &ResolvedBindings {
        &self.bindings
    }

    /// Handle to the shared store.
    #[must_use]
    pub fn store(&self) -> SharedStore {
        Arc::clone(&self.store)
    }

    /// The pending pipeline value (handler return or short-circuit value).
    #[must_use]
    pub const fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    /// Replace the pending pipeline value.
    pub fn set_result(&mut self, value: Value) {
        self.result = Some(value);
    }

    /// Take the pending pipeline value, leaving `None`.
    pub fn take_result(&mut self) -> Option<Value> {
        self.result.take()
    }

    /// The mapped transport response, if a `mapResponse` hook produced one.
    #[must_use]
    pub const fn mapped(&self) -> Option<&Response> {
        self.mapped.as_ref()
    }

    /// Stage a mapped transport response.
    pub fn set_mapped(&mut self, response: Response) {
        self.mapped = Some(response);
    }

    /// Take the mapped response, leaving `None`.
    pub fn take_mapped(&mut self) -> Option<Response> {
        self.mapped.take()
    }

    /// Override the response status.
    pub fn set_status(&mut self, status: StatusCode) {
        self.status = Some(status);
    }

    /// The staged status override, if any.
    #[must_use]
    pub const fn status_override(&self) -> Option<StatusCode> {
        self.status
    }

    /// Stage a response header. Invalid names or values are ignored.
    pub fn insert_header(&mut self, name: &str, value: &str) {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.staged_headers.append(name, value);
        }
    }

    /// Headers staged by hooks, merged into the final response.
    #[must_use]
    pub const fn staged_headers(&self) -> &HeaderMap {
        &self.staged_headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(request: Request) -> Context {
        Context::new(request, new_store(&[]), ResolvedBindings::default(), 1)
    }

    #[test]
    fn request_splits_path_and_query() {
        let request = Request::new(Method::GET, "/users/42?verbose=1");
        assert_eq!(request.path(), "/users/42");
        assert_eq!(request.query_string(), Some("verbose=1"));
    }

    #[test]
    fn request_without_query() {
        let request = Request::new(Method::GET, "/users");
        assert_eq!(request.path(), "/users");
        assert_eq!(request.query_string(), None);
    }

    #[test]
    fn context_exposes_params() {
        let mut ctx = context(Request::new(Method::GET, "/users/42"));
        ctx.set_params(HashMap::from([("id".to_string(), "42".to_string())]));
        assert_eq!(ctx.param("id"), Some("42"));
        assert_eq!(ctx.param("missing"), None);
    }

    #[test]
    fn staged_headers_accumulate() {
        let mut ctx = context(Request::new(Method::GET, "/"));
        ctx.insert_header("x-one", "1");
        ctx.insert_header("x-two", "2");
        assert_eq!(ctx.staged_headers().len(), 2);
    }

    #[tokio::test]
    async fn store_is_seeded_and_shared() {
        let store = new_store(&[("count".to_string(), serde_json::json!(0))]);
        let ctx = Context::new(
            Request::new(Method::GET, "/"),
            Arc::clone(&store),
            ResolvedBindings::default(),
            7,
        );
        ctx.store().write().await.insert("count".into(), serde_json::json!(1));
        assert_eq!(store.read().await.get("count"), Some(&serde_json::json!(1)));
    }
}
