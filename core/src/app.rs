//! The application builder.
//!
//! An `App` accumulates hooks, namespaces, schemas, macros and routes at
//! registration time. Sub-applications compose with [`App::mount`]; the
//! runtime crate turns the finished value into per-route pipelines.
//!
//! Builder methods consume and return `self` so applications read as one
//! chain; the fallible ones (`route`, `mount`, `on`) return a
//! [`RegistrationError`] that must fail startup.

use crate::checksum::{Checksum, FingerprintBuilder};
use crate::error::{ErrorCode, RegistrationError};
use crate::hook::{
    ErrorFn, ErrorHook, Hook, HookContainer, HookOptions, HookScope, InterceptFn, LifetimeFn,
    MapResponseFn, NotifyFn, ParseFn, Position, TraceFn, TransformFn,
};
use crate::lifecycle::{LifecycleEvent, LifecycleStore};
use crate::macros::{MacroFn, MacroManager};
use crate::mount;
use crate::route::{normalize_path, parse_segments, Handler, InternalRoute};
use crate::schema::{ResponseSchema, RouteSchema, Schema};
use crate::singleton::{DeriveFn, SingletonBase};
use http::{Method, StatusCode};
use serde_json::Value;
use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;

/// One mount already folded into an application, kept for deduplication
/// and introspection.
#[derive(Clone, Debug)]
pub struct MountRecord {
    /// The mounted application's name, if it had one.
    pub name: Option<String>,
    /// The mounted application's seed.
    pub seed: Option<Value>,
    /// Structural checksum at mount time.
    pub checksum: Checksum,
    /// Prefix the routes were re-keyed under.
    pub prefix: String,
}

/// Per-route declaration options: schema slots, route-local hooks, and
/// macro invocations.
#[derive(Clone, Default)]
pub struct RouteOptions {
    pub(crate) schema: RouteSchema,
    pub(crate) hooks: Vec<(HookContainer, Position)>,
    pub(crate) invocations: Vec<(String, Value)>,
}

impl RouteOptions {
    /// Empty options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the body schema slot.
    #[must_use]
    pub fn body(mut self, schema: Schema) -> Self {
        self.schema.body = Some(schema);
        self
    }

    /// Set the headers schema slot.
    #[must_use]
    pub fn headers(mut self, schema: Schema) -> Self {
        self.schema.headers = Some(schema);
        self
    }

    /// Set the query schema slot.
    #[must_use]
    pub fn query(mut self, schema: Schema) -> Self {
        self.schema.query = Some(schema);
        self
    }

    /// Set the params schema slot.
    #[must_use]
    pub fn params(mut self, schema: Schema) -> Self {
        self.schema.params = Some(schema);
        self
    }

    /// Set the cookie schema slot.
    #[must_use]
    pub fn cookie(mut self, schema: Schema) -> Self {
        self.schema.cookie = Some(schema);
        self
    }

    /// Set a response schema for every status.
    #[must_use]
    pub fn response(mut self, schema: Schema) -> Self {
        self.schema.response = Some(ResponseSchema::Single(schema));
        self
    }

    /// Set a response schema for one status code. An earlier
    /// every-status schema becomes the 200 entry.
    #[must_use]
    pub fn response_for(mut self, status: u16, schema: Schema) -> Self {
        let mut map = match self.schema.response.take() {
            Some(ResponseSchema::PerStatus(map)) => map,
            Some(ResponseSchema::Single(single)) => BTreeMap::from([(200, single)]),
            None => BTreeMap::new(),
        };
        map.insert(status, schema);
        self.schema.response = Some(ResponseSchema::PerStatus(map));
        self
    }

    /// Attach a route-local `parse` hook.
    #[must_use]
    pub fn parse(self, hook: ParseFn) -> Self {
        self.hook(Hook::Parse(hook))
    }

    /// Attach a route-local `transform` hook.
    #[must_use]
    pub fn transform(self, hook: TransformFn) -> Self {
        self.hook(Hook::Transform(hook))
    }

    /// Attach a route-local `beforeHandle` hook.
    #[must_use]
    pub fn before_handle(self, hook: InterceptFn) -> Self {
        self.hook(Hook::BeforeHandle(hook))
    }

    /// Attach a route-local `afterHandle` hook.
    #[must_use]
    pub fn after_handle(self, hook: InterceptFn) -> Self {
        self.hook(Hook::AfterHandle(hook))
    }

    /// Attach a route-local `mapResponse` hook.
    #[must_use]
    pub fn map_response(self, hook: MapResponseFn) -> Self {
        self.hook(Hook::MapResponse(hook))
    }

    /// Attach a route-local `onResponse` hook.
    #[must_use]
    pub fn on_response(self, hook: NotifyFn) -> Self {
        self.hook(Hook::OnResponse(hook))
    }

    /// Attach a route-local `error` hook.
    #[must_use]
    pub fn on_error(self, hook: ErrorHook) -> Self {
        self.hook(Hook::Error(hook))
    }

    /// Invoke a macro by name with the given parameters.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, params: Value) -> Self {
        self.invocations.push((name.into(), params));
        self
    }

    fn hook(mut self, hook: Hook) -> Self {
        self.hooks
            .push((HookContainer::new(hook, HookScope::Local), Position::After));
        self
    }
}

/// An application under construction.
#[derive(Clone, Default)]
pub struct App {
    pub(crate) name: Option<String>,
    pub(crate) seed: Option<Value>,
    pub(crate) lifecycle: LifecycleStore,
    pub(crate) singletons: SingletonBase,
    pub(crate) routes: Vec<InternalRoute>,
    pub(crate) types: Vec<(String, Value)>,
    pub(crate) error_codes: Vec<(String, StatusCode)>,
    pub(crate) macros: Vec<(String, MacroFn)>,
    pub(crate) dependencies: Vec<MountRecord>,
    pub(crate) guard: RouteSchema,
    pub(crate) strict_path: bool,
    pub(crate) cookie_secret: Option<String>,
}

impl App {
    /// A new, empty application.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Name this application; the name participates in the checksum.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Seed value distinguishing otherwise-identical instances; part of
    /// the dedup identity.
    #[must_use]
    pub fn seed(mut self, seed: Value) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Disable trailing-slash normalization for this application's routes.
    #[must_use]
    pub const fn strict_path(mut self, strict: bool) -> Self {
        self.strict_path = strict;
        self
    }

    /// Secret used to verify signed cookies.
    #[must_use]
    pub fn cookie_secret(mut self, secret: impl Into<String>) -> Self {
        self.cookie_secret = Some(secret.into());
        self
    }

    /// Application-level schema defaults, inherited by routes that leave
    /// the matching slot absent.
    #[must_use]
    pub fn guard(mut self, schema: RouteSchema) -> Self {
        self.guard = schema;
        self
    }

    /// Attach a static decorator value.
    #[must_use]
    pub fn decorate<T: Any + Send + Sync>(mut self, name: impl Into<String>, value: T) -> Self {
        self.singletons.decorate(name, Arc::new(value));
        self
    }

    /// Seed a shared-store entry.
    #[must_use]
    pub fn state(mut self, name: impl Into<String>, value: Value) -> Self {
        self.singletons.state(name, value);
        self
    }

    /// Register a derive binding (computed per request, before validation).
    #[must_use]
    pub fn derive(mut self, name: impl Into<String>, f: DeriveFn) -> Self {
        self.singletons.derive(name, f);
        self
    }

    /// Register a resolve binding (computed per request, after validation).
    #[must_use]
    pub fn resolve(mut self, name: impl Into<String>, f: DeriveFn) -> Self {
        self.singletons.resolve(name, f);
        self
    }

    /// Declare a named schema type. Redeclaring a name overrides it.
    #[must_use]
    pub fn model(mut self, name: impl Into<String>, schema: Value) -> Self {
        let name = name.into();
        if let Some(entry) = self.types.iter_mut().find(|(n, _)| *n == name) {
            entry.1 = schema;
        } else {
            self.types.push((name, schema));
        }
        self
    }

    /// Register a custom error code and the status it maps to.
    #[must_use]
    pub fn register_error(mut self, code: impl Into<String>, status: StatusCode) -> Self {
        let code = code.into();
        if let Some(entry) = self.error_codes.iter_mut().find(|(c, _)| *c == code) {
            entry.1 = status;
        } else {
            self.error_codes.push((code, status));
        }
        self
    }

    /// Define a macro usable by route declarations in this application and
    /// its descendants.
    #[must_use]
    pub fn define_macro(mut self, name: impl Into<String>, body: MacroFn) -> Self {
        let name = name.into();
        if let Some(entry) = self.macros.iter_mut().find(|(n, _)| *n == name) {
            entry.1 = body;
        } else {
            self.macros.push((name, body));
        }
        self
    }

    /// Register a hook with explicit options.
    #[must_use]
    pub fn register_hook(mut self, hook: Hook, options: HookOptions) -> Self {
        self.lifecycle
            .register(HookContainer::new(hook, options.scope), options.position);
        self
    }

    /// Register a hook by string event name.
    ///
    /// # Errors
    ///
    /// [`RegistrationError::UnknownEvent`] for a name outside the fixed
    /// event set; [`RegistrationError::EventMismatch`] when the hook's
    /// variant belongs to a different event.
    pub fn on(self, event: &str, hook: Hook) -> Result<Self, RegistrationError> {
        let Some(parsed) = LifecycleEvent::from_name(event) else {
            return Err(RegistrationError::UnknownEvent(event.to_string()));
        };
        if hook.event() != parsed {
            return Err(RegistrationError::EventMismatch {
                expected: event.to_string(),
            });
        }
        Ok(self.register_hook(hook, HookOptions::default()))
    }

    /// Register a `request` hook.
    #[must_use]
    pub fn on_request(self, hook: InterceptFn) -> Self {
        self.register_hook(Hook::Request(hook), HookOptions::default())
    }

    /// Register a `parse` hook.
    #[must_use]
    pub fn on_parse(self, hook: ParseFn) -> Self {
        self.register_hook(Hook::Parse(hook), HookOptions::default())
    }

    /// Register a `transform` hook.
    #[must_use]
    pub fn on_transform(self, hook: TransformFn) -> Self {
        self.register_hook(Hook::Transform(hook), HookOptions::default())
    }

    /// Register a `beforeHandle` hook.
    #[must_use]
    pub fn on_before_handle(self, hook: InterceptFn) -> Self {
        self.register_hook(Hook::BeforeHandle(hook), HookOptions::default())
    }

    /// Register an `afterHandle` hook.
    #[must_use]
    pub fn on_after_handle(self, hook: InterceptFn) -> Self {
        self.register_hook(Hook::AfterHandle(hook), HookOptions::default())
    }

    /// Register a `mapResponse` hook.
    #[must_use]
    pub fn on_map_response(self, hook: MapResponseFn) -> Self {
        self.register_hook(Hook::MapResponse(hook), HookOptions::default())
    }

    /// Register an `onResponse` hook.
    #[must_use]
    pub fn on_response(self, hook: NotifyFn) -> Self {
        self.register_hook(Hook::OnResponse(hook), HookOptions::default())
    }

    /// Register a catch-all `error` hook.
    #[must_use]
    pub fn on_error(self, hook: ErrorFn) -> Self {
        self.register_hook(Hook::Error(ErrorHook::new(hook)), HookOptions::default())
    }

    /// Register an `error` hook limited to the given codes.
    #[must_use]
    pub fn on_error_for(self, codes: Vec<ErrorCode>, hook: ErrorFn) -> Self {
        self.register_hook(
            Hook::Error(ErrorHook::for_codes(codes, hook)),
            HookOptions::default(),
        )
    }

    /// Register a `trace` hook.
    #[must_use]
    pub fn on_trace(self, hook: TraceFn) -> Self {
        self.register_hook(Hook::Trace(hook), HookOptions::default())
    }

    /// Register a `start` hook. Application-lifetime hooks default to
    /// global scope so they survive mounting.
    #[must_use]
    pub fn on_start(self, hook: LifetimeFn) -> Self {
        self.register_hook(
            Hook::Start(hook),
            HookOptions::scoped_as(HookScope::Global),
        )
    }

    /// Register a `stop` hook (global scope by default, like `start`).
    #[must_use]
    pub fn on_stop(self, hook: LifetimeFn) -> Self {
        self.register_hook(Hook::Stop(hook), HookOptions::scoped_as(HookScope::Global))
    }

    /// Register a route.
    ///
    /// # Errors
    ///
    /// [`RegistrationError::DuplicateRoute`] when the method/path pair is
    /// taken, [`RegistrationError::InvalidPath`] for a malformed path, and
    /// [`RegistrationError::UnknownMacro`] for an unrecognized macro
    /// invocation.
    pub fn route(
        mut self,
        method: Method,
        path: &str,
        handler: Handler,
        options: RouteOptions,
    ) -> Result<Self, RegistrationError> {
        let path = if self.strict_path {
            path.to_string()
        } else {
            normalize_path(path)
        };
        if self
            .routes
            .iter()
            .any(|route| route.method == method && route.path == path)
        {
            return Err(RegistrationError::DuplicateRoute { method, path });
        }
        let segments = parse_segments(&path)?;

        let mut hooks = LifecycleStore::new();
        for (container, position) in options.hooks {
            hooks.register(container, position);
        }

        // Macro expansion happens here, once, never per request.
        for (name, params) in &options.invocations {
            let Some(body) = self.find_macro(name) else {
                return Err(RegistrationError::UnknownMacro(name.clone()));
            };
            let mut manager = MacroManager::default();
            body(&mut manager, params);
            for (container, position) in manager.route {
                hooks.register(container, position);
            }
            for (container, position) in manager.app {
                self.lifecycle.register(container, position);
            }
        }

        let bindings = self.singletons.snapshot();
        tracing::debug!(method = %method, path = %path, "registering route");
        self.routes.push(InternalRoute::new(
            method,
            path,
            segments,
            handler,
            options.schema,
            hooks,
            bindings,
        ));
        Ok(self)
    }

    /// Register a `GET` route with no options.
    ///
    /// # Errors
    ///
    /// See [`App::route`].
    pub fn get(self, path: &str, handler: Handler) -> Result<Self, RegistrationError> {
        self.route(Method::GET, path, handler, RouteOptions::new())
    }

    /// Register a `POST` route with no options.
    ///
    /// # Errors
    ///
    /// See [`App::route`].
    pub fn post(self, path: &str, handler: Handler) -> Result<Self, RegistrationError> {
        self.route(Method::POST, path, handler, RouteOptions::new())
    }

    /// Register a `PUT` route with no options.
    ///
    /// # Errors
    ///
    /// See [`App::route`].
    pub fn put(self, path: &str, handler: Handler) -> Result<Self, RegistrationError> {
        self.route(Method::PUT, path, handler, RouteOptions::new())
    }

    /// Register a `DELETE` route with no options.
    ///
    /// # Errors
    ///
    /// See [`App::route`].
    pub fn delete(self, path: &str, handler: Handler) -> Result<Self, RegistrationError> {
        self.route(Method::DELETE, path, handler, RouteOptions::new())
    }

    /// Mount a sub-application under a prefix.
    ///
    /// # Errors
    ///
    /// [`RegistrationError::DuplicateRoute`] when a re-keyed child route
    /// collides with an existing route of a different origin.
    pub fn mount(mut self, prefix: &str, child: App) -> Result<Self, RegistrationError> {
        mount::mount_into(&mut self, prefix, child)?;
        Ok(self)
    }

    /// Mount a sub-application without a prefix.
    ///
    /// # Errors
    ///
    /// See [`App::mount`].
    pub fn use_plugin(self, child: App) -> Result<Self, RegistrationError> {
        self.mount("", child)
    }

    /// Structural checksum of this application.
    #[must_use]
    pub fn checksum(&self) -> Checksum {
        let mut builder = FingerprintBuilder::new();
        if let Some(name) = &self.name {
            builder.push("name", name);
        }
        if let Some(seed) = &self.seed {
            builder.push("seed", &seed.to_string());
        }
        for route in &self.routes {
            builder.push("route", &format!("{} {}", route.method, route.path));
        }
        for (kind, name) in self.singletons.binding_names() {
            builder.push(kind, name);
        }
        for (name, _) in &self.types {
            builder.push("type", name);
        }
        for (code, status) in &self.error_codes {
            builder.push("error", &format!("{code} {status}"));
        }
        for (name, _) in &self.macros {
            builder.push("macro", name);
        }
        builder.finish()
    }

    /// Look a macro up by name.
    #[must_use]
    pub fn find_macro(&self, name: &str) -> Option<MacroFn> {
        self.macros
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, body)| Arc::clone(body))
    }

    /// Resolve a named schema type.
    #[must_use]
    pub fn resolve_type(&self, name: &str) -> Option<&Value> {
        self.types
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, schema)| schema)
    }

    /// The status registered for a custom error code.
    #[must_use]
    pub fn error_status(&self, code: &str) -> Option<StatusCode> {
        self.error_codes
            .iter()
            .find(|(c, _)| c == code)
            .map(|(_, status)| *status)
    }

    /// All registered custom error codes.
    #[must_use]
    pub fn error_codes(&self) -> &[(String, StatusCode)] {
        &self.error_codes
    }

    /// The application's routes.
    #[must_use]
    pub fn routes(&self) -> &[InternalRoute] {
        &self.routes
    }

    /// The application-level hook store.
    #[must_use]
    pub const fn lifecycle(&self) -> &LifecycleStore {
        &self.lifecycle
    }

    /// The application-level guard schema.
    #[must_use]
    pub const fn guard_schema(&self) -> &RouteSchema {
        &self.guard
    }

    /// Deduplicated store seed entries from every composed namespace.
    #[must_use]
    pub fn state_seed(&self) -> Vec<(String, Value)> {
        self.singletons.state_seed()
    }

    /// The application's name.
    #[must_use]
    pub fn app_name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The configured cookie secret.
    #[must_use]
    pub fn cookie_secret_value(&self) -> Option<&str> {
        self.cookie_secret.as_deref()
    }

    /// Mounts already folded into this application.
    #[must_use]
    pub fn dependencies(&self) -> &[MountRecord] {
        &self.dependencies
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can use unwrap
mod tests {
    use super::*;
    use crate::hook::intercept_sync;
    use crate::macros::macro_fn;
    use crate::route::handler_sync;
    use serde_json::json;

    fn noop() -> Handler {
        handler_sync(|_| Ok(Value::Null))
    }

    #[test]
    fn duplicate_route_is_rejected() {
        let result = App::new()
            .get("/users", noop())
            .unwrap()
            .get("/users/", noop());
        assert!(matches!(
            result,
            Err(RegistrationError::DuplicateRoute { .. })
        ));
    }

    #[test]
    fn strict_path_keeps_trailing_slash() {
        let app = App::new()
            .strict_path(true)
            .get("/users", noop())
            .unwrap()
            .get("/users/", noop())
            .unwrap();
        assert_eq!(app.routes().len(), 2);
    }

    #[test]
    fn unknown_event_name_is_rejected() {
        let result = App::new().on(
            "afterResponse",
            Hook::Request(intercept_sync(|_| Ok(None))),
        );
        assert!(matches!(result, Err(RegistrationError::UnknownEvent(_))));
    }

    #[test]
    fn mismatched_event_name_is_rejected() {
        let result = App::new().on("parse", Hook::Request(intercept_sync(|_| Ok(None))));
        assert!(matches!(
            result,
            Err(RegistrationError::EventMismatch { .. })
        ));
    }

    #[test]
    fn unknown_macro_is_rejected() {
        let result = App::new().route(
            Method::GET,
            "/admin",
            noop(),
            RouteOptions::new().with("auth", json!({"role": "admin"})),
        );
        assert!(matches!(result, Err(RegistrationError::UnknownMacro(_))));
    }

    #[test]
    fn macro_expansion_lands_on_the_route() {
        let app = App::new()
            .define_macro(
                "auth",
                macro_fn(|manager, _params| {
                    manager.on_before_handle(intercept_sync(|_| Ok(None)));
                }),
            )
            .route(
                Method::GET,
                "/admin",
                noop(),
                RouteOptions::new().with("auth", json!({"role": "admin"})),
            )
            .unwrap();
        let route = &app.routes()[0];
        assert_eq!(route.hooks.len(LifecycleEvent::BeforeHandle), 1);
    }

    #[test]
    fn checksum_is_structural() {
        let make = || {
            App::new()
                .name("auth")
                .state("attempts", json!(0))
                .get("/login", noop())
                .unwrap()
        };
        assert_eq!(make().checksum(), make().checksum());
        let other = make().model("user", json!({"type": "object"}));
        assert_ne!(make().checksum(), other.checksum());
    }

    #[test]
    fn seed_changes_checksum() {
        let base = App::new().name("auth");
        let seeded = App::new().name("auth").seed(json!({"realm": "admin"}));
        assert_ne!(base.checksum(), seeded.checksum());
    }
}
