//! Route paths, the token grammar, and the internal route record.
//!
//! Paths use `:name` for named parameters and a trailing `*` for a
//! wildcard. Trailing slashes are normalized away unless strict-path mode
//! is enabled on the application.

use crate::checksum::Checksum;
use crate::context::{Context, Request, Response};
use crate::error::{Failure, RegistrationError};
use crate::hook::HookResult;
use crate::lifecycle::LifecycleStore;
use crate::schema::RouteSchema;
use crate::singleton::ResolvedBindings;
use futures::future::BoxFuture;
use http::Method;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

/// One path segment after tokenization.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Segment {
    /// A literal segment.
    Static(String),
    /// A named parameter (`:id`).
    Param(String),
    /// A trailing wildcard (`*`), capturing the rest of the path.
    Wildcard,
}

/// Normalize a path: ensure a leading slash, strip trailing slashes
/// (except for the root path).
#[must_use]
pub fn normalize_path(path: &str) -> String {
    let mut out = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    };
    while out.len() > 1 && out.ends_with('/') {
        out.pop();
    }
    out
}

/// Join a mount prefix and a route path without normalizing the result.
#[must_use]
pub fn join_paths(prefix: &str, path: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return path.to_string();
    }
    let prefix = if prefix.starts_with('/') {
        prefix.to_string()
    } else {
        format!("/{prefix}")
    };
    if path == "/" {
        prefix
    } else if path.starts_with('/') {
        format!("{prefix}{path}")
    } else {
        format!("{prefix}/{path}")
    }
}

/// Tokenize a path into segments.
///
/// # Errors
///
/// Returns [`RegistrationError::InvalidPath`] for an empty parameter name
/// or a wildcard that is not the final segment.
pub fn parse_segments(path: &str) -> Result<Vec<Segment>, RegistrationError> {
    let raw: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let mut segments = Vec::with_capacity(raw.len());
    for (index, part) in raw.iter().enumerate() {
        if *part == "*" {
            if index + 1 != raw.len() {
                return Err(RegistrationError::InvalidPath(format!(
                    "wildcard must be the final segment: {path}"
                )));
            }
            segments.push(Segment::Wildcard);
        } else if let Some(name) = part.strip_prefix(':') {
            if name.is_empty() {
                return Err(RegistrationError::InvalidPath(format!(
                    "empty parameter name: {path}"
                )));
            }
            segments.push(Segment::Param(name.to_string()));
        } else {
            segments.push(Segment::Static((*part).to_string()));
        }
    }
    Ok(segments)
}

/// Match a request path against tokenized segments, capturing parameters.
/// A wildcard captures the remainder (possibly empty) under `*`.
#[must_use]
pub fn match_path(segments: &[Segment], path: &str) -> Option<HashMap<String, String>> {
    let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let mut params = HashMap::new();
    let mut at = 0;
    for segment in segments {
        match segment {
            Segment::Static(expected) => {
                if parts.get(at) != Some(&expected.as_str()) {
                    return None;
                }
                at += 1;
            }
            Segment::Param(name) => {
                let part = parts.get(at)?;
                params.insert(name.clone(), (*part).to_string());
                at += 1;
            }
            Segment::Wildcard => {
                params.insert("*".to_string(), parts[at..].join("/"));
                return Some(params);
            }
        }
    }
    if at == parts.len() {
        Some(params)
    } else {
        None
    }
}

/// A route handler.
pub type Handler =
    Arc<dyn for<'a> Fn(&'a mut Context) -> BoxFuture<'a, HookResult<Value>> + Send + Sync>;

/// Wrap an async closure as a [`Handler`].
pub fn handler<F>(f: F) -> Handler
where
    F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, HookResult<Value>> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Wrap a synchronous closure as a [`Handler`].
pub fn handler_sync<F>(f: F) -> Handler
where
    F: Fn(&mut Context) -> Result<Value, Failure> + Send + Sync + 'static,
{
    Arc::new(move |ctx| {
        let out = f(ctx);
        Box::pin(std::future::ready(out))
    })
}

/// The composed per-route pipeline function.
pub type ComposedHandler = Arc<dyn Fn(Request) -> BoxFuture<'static, Response> + Send + Sync>;

/// A registered route and everything needed to compose it.
pub struct InternalRoute {
    /// HTTP method.
    pub method: Method,
    /// Full (possibly prefixed) path.
    pub path: String,
    /// Tokenized path.
    pub segments: Vec<Segment>,
    /// The route's own handler.
    pub handler: Handler,
    /// Route-local schema slots.
    pub schema: RouteSchema,
    /// Route-local hooks, including macro expansions.
    pub hooks: LifecycleStore,
    /// Scoped/local hooks baked in from the declaring application at mount
    /// time.
    pub inherited: LifecycleStore,
    /// Bindings snapshot taken at declaration time.
    pub bindings: ResolvedBindings,
    /// Checksum of the application this route was mounted from, if any.
    pub origin: Option<Checksum>,
    composed: OnceLock<ComposedHandler>,
}

impl InternalRoute {
    /// Create a freshly declared route (no inherited hooks, no origin).
    #[must_use]
    pub fn new(
        method: Method,
        path: String,
        segments: Vec<Segment>,
        handler: Handler,
        schema: RouteSchema,
        hooks: LifecycleStore,
        bindings: ResolvedBindings,
    ) -> Self {
        Self {
            method,
            path,
            segments,
            handler,
            schema,
            hooks,
            inherited: LifecycleStore::new(),
            bindings,
            origin: None,
            composed: OnceLock::new(),
        }
    }

    /// The cached composed handler, if one has been built.
    #[must_use]
    pub fn composed(&self) -> Option<ComposedHandler> {
        self.composed.get().cloned()
    }

    /// Cache a composed handler, returning the winner if another caller
    /// raced us. Written once; read-only thereafter.
    pub fn cache_composed(&self, handler: ComposedHandler) -> ComposedHandler {
        self.composed.get_or_init(|| handler).clone()
    }
}

impl Clone for InternalRoute {
    fn clone(&self) -> Self {
        // The composed-handler cache deliberately does not survive a clone:
        // mount re-keys cloned routes, so any cached pipeline is stale.
        Self {
            method: self.method.clone(),
            path: self.path.clone(),
            segments: self.segments.clone(),
            handler: Arc::clone(&self.handler),
            schema: self.schema.clone(),
            hooks: self.hooks.clone(),
            inherited: self.inherited.clone(),
            bindings: self.bindings.clone(),
            origin: self.origin,
            composed: OnceLock::new(),
        }
    }
}

impl fmt::Debug for InternalRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InternalRoute")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("origin", &self.origin)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can use unwrap
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn normalization_strips_trailing_slash() {
        assert_eq!(normalize_path("/users/"), "/users");
        assert_eq!(normalize_path("users"), "/users");
        assert_eq!(normalize_path("/"), "/");
    }

    #[test]
    fn join_handles_root_and_relative_paths() {
        assert_eq!(join_paths("/api", "/users"), "/api/users");
        assert_eq!(join_paths("/api/", "/users"), "/api/users");
        assert_eq!(join_paths("", "/users"), "/users");
        assert_eq!(join_paths("/api", "/"), "/api");
    }

    #[test]
    fn segments_parse_params_and_wildcard() {
        let segments = parse_segments("/users/:id/files/*").unwrap();
        assert_eq!(
            segments,
            vec![
                Segment::Static("users".into()),
                Segment::Param("id".into()),
                Segment::Static("files".into()),
                Segment::Wildcard,
            ]
        );
    }

    #[test]
    fn wildcard_must_be_last() {
        assert!(parse_segments("/files/*/meta").is_err());
        assert!(parse_segments("/users/:").is_err());
    }

    #[test]
    fn matching_captures_params() {
        let segments = parse_segments("/users/:id").unwrap();
        let params = match_path(&segments, "/users/42").unwrap();
        assert_eq!(params.get("id").map(String::as_str), Some("42"));
        assert!(match_path(&segments, "/users").is_none());
        assert!(match_path(&segments, "/users/42/extra").is_none());
    }

    #[test]
    fn wildcard_captures_remainder() {
        let segments = parse_segments("/files/*").unwrap();
        let params = match_path(&segments, "/files/a/b/c").unwrap();
        assert_eq!(params.get("*").map(String::as_str), Some("a/b/c"));
    }

    #[test]
    fn cloning_a_route_resets_the_composed_cache() {
        let route = InternalRoute::new(
            Method::GET,
            "/".into(),
            Vec::new(),
            handler_sync(|_| Ok(Value::Null)),
            RouteSchema::new(),
            LifecycleStore::new(),
            ResolvedBindings::default(),
        );
        route.cache_composed(Arc::new(|_| {
            Box::pin(std::future::ready(Response::text("ok")))
        }));
        assert!(route.composed().is_some());
        assert!(route.clone().composed().is_none());
    }

    proptest! {
        #[test]
        fn normalization_is_idempotent(path in "[a-z/]{0,24}") {
            let once = normalize_path(&path);
            prop_assert_eq!(normalize_path(&once), once.clone());
            prop_assert!(once.starts_with('/'));
        }
    }
}
