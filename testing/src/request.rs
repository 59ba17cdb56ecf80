//! A request builder for tests.

use bytes::Bytes;
use http::Method;
use serde_json::Value;
use weave_core::context::Request;

/// Builds a [`Request`] fluently.
#[derive(Clone, Debug)]
pub struct TestRequest {
    method: Method,
    uri: String,
    headers: Vec<(String, String)>,
    body: Bytes,
}

impl TestRequest {
    /// Start a request with the given method and target.
    #[must_use]
    pub fn new(method: Method, uri: impl Into<String>) -> Self {
        Self {
            method,
            uri: uri.into(),
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    /// A `GET` request.
    #[must_use]
    pub fn get(uri: impl Into<String>) -> Self {
        Self::new(Method::GET, uri)
    }

    /// A `POST` request.
    #[must_use]
    pub fn post(uri: impl Into<String>) -> Self {
        Self::new(Method::POST, uri)
    }

    /// Add a header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Add a `Cookie` header.
    #[must_use]
    pub fn cookie(self, name: &str, value: &str) -> Self {
        self.header("cookie", format!("{name}={value}"))
    }

    /// Attach a JSON body with its content type.
    #[must_use]
    pub fn json(mut self, value: &Value) -> Self {
        self.body = Bytes::from(value.to_string());
        self.header("content-type", "application/json")
    }

    /// Attach a form body with its content type.
    #[must_use]
    pub fn form(mut self, pairs: &[(&str, &str)]) -> Self {
        self.body = Bytes::from(encode_form_pairs(pairs));
        self.header("content-type", "application/x-www-form-urlencoded")
    }

    /// Attach a plain-text body with its content type.
    #[must_use]
    pub fn text(mut self, body: impl Into<String>) -> Self {
        self.body = Bytes::from(body.into());
        self.header("content-type", "text/plain")
    }

    /// Attach raw bytes with an explicit content type.
    #[must_use]
    pub fn bytes(mut self, body: Bytes, content_type: &str) -> Self {
        self.body = body;
        self.header("content-type", content_type)
    }

    /// Build the request.
    #[must_use]
    pub fn build(self) -> Request {
        let mut request = Request::new(self.method, self.uri).with_body(self.body);
        for (name, value) in self.headers {
            request = request.with_header(&name, &value);
        }
        request
    }
}

// Minimal form encoding for test bodies; keys and values in tests are
// URL-safe already.
fn encode_form_pairs(pairs: &[(&str, &str)]) -> String {
    pairs
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}
