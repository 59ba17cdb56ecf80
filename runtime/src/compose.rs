//! The route composer.
//!
//! For one registered route, merges the applicable global/scoped/local
//! hooks and schemas — in that precedence — into a single
//! [`ExecutionPlan`] the pipeline executes per request. Schema compilation
//! delegates to the [`SchemaCompiler`] collaborator; an unresolved named
//! type fails composition, never a request.

use http::{Method, StatusCode};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use weave_core::app::App;
use weave_core::error::{Failure, RegistrationError};
use weave_core::hook::{
    ErrorHook, Hook, HookContainer, HookScope, InterceptFn, MapResponseFn, NotifyFn, ParseFn,
    TraceFn, TransformFn,
};
use weave_core::lifecycle::LifecycleEvent;
use weave_core::route::{Handler, InternalRoute, Segment};
use weave_core::schema::{Checker, ResponseSchema, Schema, SchemaCompiler};
use weave_core::singleton::ResolvedBindings;

/// A compiled validator for one schema slot. Absent slots compile to
/// [`Validator::Noop`].
#[derive(Clone)]
pub enum Validator {
    /// Nothing to check.
    Noop,
    /// Delegates to a compiled checker.
    Checked(Arc<dyn Checker>),
}

impl Validator {
    /// Whether this validator does nothing.
    #[must_use]
    pub const fn is_noop(&self) -> bool {
        matches!(self, Self::Noop)
    }

    /// Validate a value, reporting faults under the given slot name.
    ///
    /// # Errors
    ///
    /// A VALIDATION [`Failure`] carrying the slot name and fault list.
    pub fn validate(&self, slot: &str, value: &Value) -> Result<(), Failure> {
        match self {
            Self::Noop => Ok(()),
            Self::Checked(checker) => {
                if checker.check(value) {
                    Ok(())
                } else {
                    Err(Failure::validation(slot, checker.errors(value)))
                }
            }
        }
    }
}

/// The response-slot validator: one checker, or one per status code.
#[derive(Clone)]
pub enum ResponseValidator {
    /// No response schema declared.
    Noop,
    /// One checker for every status.
    Single(Arc<dyn Checker>),
    /// Checker per status code.
    PerStatus(BTreeMap<u16, Arc<dyn Checker>>),
}

impl ResponseValidator {
    /// The checker applying to the given status, if any.
    #[must_use]
    pub fn checker_for(&self, status: u16) -> Option<&Arc<dyn Checker>> {
        match self {
            Self::Noop => None,
            Self::Single(checker) => Some(checker),
            Self::PerStatus(map) => map.get(&status),
        }
    }
}

/// Compiled validators for every slot, in validation order.
#[derive(Clone)]
pub struct ValidatorSet {
    /// Header validator.
    pub headers: Validator,
    /// Path-parameter validator.
    pub params: Validator,
    /// Query validator.
    pub query: Validator,
    /// Cookie validator.
    pub cookie: Validator,
    /// Body validator.
    pub body: Validator,
    /// Response validator.
    pub response: ResponseValidator,
}

/// One route's composed execution plan: ordered hook lists per stage,
/// compiled validators, the handler, and the bindings snapshot.
#[derive(Clone)]
pub struct ExecutionPlan {
    /// Route method.
    pub method: Method,
    /// Route path.
    pub path: String,
    /// `request` hooks.
    pub request: Vec<InterceptFn>,
    /// `parse` hooks.
    pub parse: Vec<ParseFn>,
    /// `transform` hooks.
    pub transform: Vec<TransformFn>,
    /// `beforeHandle` hooks.
    pub before_handle: Vec<InterceptFn>,
    /// `afterHandle` hooks.
    pub after_handle: Vec<InterceptFn>,
    /// `mapResponse` hooks.
    pub map_response: Vec<MapResponseFn>,
    /// `onResponse` hooks.
    pub on_response: Vec<NotifyFn>,
    /// `error` hooks with their code filters.
    pub error: Vec<ErrorHook>,
    /// `trace` hooks.
    pub trace: Vec<TraceFn>,
    /// The route handler.
    pub handler: Handler,
    /// Compiled validators.
    pub validators: ValidatorSet,
    /// Bindings snapshot from the route's declaration.
    pub bindings: ResolvedBindings,
    /// Secret for signed-cookie verification.
    pub cookie_secret: Option<String>,
    /// Registered custom error-code statuses.
    pub custom_status: Arc<HashMap<String, StatusCode>>,
}

impl ExecutionPlan {
    /// Hook counts per stage, in pipeline order. Two compositions of the
    /// same route produce identical summaries.
    #[must_use]
    pub fn stage_counts(&self) -> Vec<(&'static str, usize)> {
        vec![
            ("request", self.request.len()),
            ("parse", self.parse.len()),
            ("transform", self.transform.len()),
            ("beforeHandle", self.before_handle.len()),
            ("afterHandle", self.after_handle.len()),
            ("mapResponse", self.map_response.len()),
            ("onResponse", self.on_response.len()),
            ("error", self.error.len()),
            ("trace", self.trace.len()),
        ]
    }
}

/// Compose one route against its owning application.
///
/// # Errors
///
/// [`RegistrationError`] for unresolved named types or schema compilation
/// failures. These fail startup (ahead-of-time mode) or the first request's
/// composition (just-in-time mode, with references pre-checked at start).
pub fn compose(
    app: &App,
    route: &InternalRoute,
    compiler: &Arc<dyn SchemaCompiler>,
) -> Result<ExecutionPlan, RegistrationError> {
    let mut request = Vec::new();
    for container in gather(app, route, LifecycleEvent::Request) {
        if let Hook::Request(f) = &container.hook {
            request.push(Arc::clone(f));
        }
    }
    let mut parse = Vec::new();
    for container in gather(app, route, LifecycleEvent::Parse) {
        if let Hook::Parse(f) = &container.hook {
            parse.push(Arc::clone(f));
        }
    }
    let mut transform = Vec::new();
    for container in gather(app, route, LifecycleEvent::Transform) {
        if let Hook::Transform(f) = &container.hook {
            transform.push(Arc::clone(f));
        }
    }
    let mut before_handle = Vec::new();
    for container in gather(app, route, LifecycleEvent::BeforeHandle) {
        if let Hook::BeforeHandle(f) = &container.hook {
            before_handle.push(Arc::clone(f));
        }
    }
    let mut after_handle = Vec::new();
    for container in gather(app, route, LifecycleEvent::AfterHandle) {
        if let Hook::AfterHandle(f) = &container.hook {
            after_handle.push(Arc::clone(f));
        }
    }
    let mut map_response = Vec::new();
    for container in gather(app, route, LifecycleEvent::MapResponse) {
        if let Hook::MapResponse(f) = &container.hook {
            map_response.push(Arc::clone(f));
        }
    }
    let mut on_response = Vec::new();
    for container in gather(app, route, LifecycleEvent::OnResponse) {
        if let Hook::OnResponse(f) = &container.hook {
            on_response.push(Arc::clone(f));
        }
    }
    let mut error = Vec::new();
    for container in gather(app, route, LifecycleEvent::Error) {
        if let Hook::Error(hook) = &container.hook {
            error.push(hook.clone());
        }
    }
    let mut trace = Vec::new();
    for container in gather(app, route, LifecycleEvent::Trace) {
        if let Hook::Trace(f) = &container.hook {
            trace.push(Arc::clone(f));
        }
    }

    let guard = app.guard_schema();
    let validators = ValidatorSet {
        headers: compile_slot(
            app,
            compiler,
            "headers",
            route.schema.headers.as_ref().or(guard.headers.as_ref()),
        )?,
        params: compose_params(app, route, compiler)?,
        query: compile_slot(
            app,
            compiler,
            "query",
            route.schema.query.as_ref().or(guard.query.as_ref()),
        )?,
        cookie: compile_slot(
            app,
            compiler,
            "cookie",
            route.schema.cookie.as_ref().or(guard.cookie.as_ref()),
        )?,
        body: compile_slot(
            app,
            compiler,
            "body",
            route.schema.body.as_ref().or(guard.body.as_ref()),
        )?,
        response: compose_response(app, route, compiler)?,
    };

    let custom_status: HashMap<String, StatusCode> = app
        .error_codes()
        .iter()
        .map(|(code, status)| (code.clone(), *status))
        .collect();

    Ok(ExecutionPlan {
        method: route.method.clone(),
        path: route.path.clone(),
        request,
        parse,
        transform,
        before_handle,
        after_handle,
        map_response,
        on_response,
        error,
        trace,
        handler: Arc::clone(&route.handler),
        validators,
        bindings: route.bindings.clone(),
        cookie_secret: app.cookie_secret_value().map(String::from),
        custom_status: Arc::new(custom_status),
    })
}

/// Verify that every named type a route's schema references exists.
/// Used to keep unresolved references a startup failure even under
/// just-in-time composition.
pub(crate) fn check_references(app: &App, route: &InternalRoute) -> Result<(), RegistrationError> {
    let guard = app.guard_schema();
    let slots = [
        route.schema.body.as_ref().or(guard.body.as_ref()),
        route.schema.headers.as_ref().or(guard.headers.as_ref()),
        route.schema.query.as_ref().or(guard.query.as_ref()),
        route.schema.params.as_ref().or(guard.params.as_ref()),
        route.schema.cookie.as_ref().or(guard.cookie.as_ref()),
    ];
    for slot in slots.into_iter().flatten() {
        check_reference(app, slot)?;
    }
    match route.schema.response.as_ref().or(guard.response.as_ref()) {
        Some(ResponseSchema::Single(schema)) => check_reference(app, schema)?,
        Some(ResponseSchema::PerStatus(map)) => {
            for schema in map.values() {
                check_reference(app, schema)?;
            }
        }
        None => {}
    }
    Ok(())
}

fn check_reference(app: &App, schema: &Schema) -> Result<(), RegistrationError> {
    if let Schema::Ref(name) = schema {
        if app.resolve_type(name).is_none() {
            return Err(RegistrationError::UnknownSchemaType(name.clone()));
        }
    }
    Ok(())
}

/// Build the ordered hook list for one event: ancestor globals first (the
/// application store accumulates them outward-in as mounts fold), then the
/// app-level scoped/local hooks for routes declared here, then the hooks
/// baked onto the route at mount time, then the route's own.
fn gather(app: &App, route: &InternalRoute, event: LifecycleEvent) -> Vec<HookContainer> {
    let store = app.lifecycle().event(event);
    let mut out: Vec<HookContainer> = store
        .iter()
        .filter(|c| c.scope == HookScope::Global)
        .cloned()
        .collect();
    if route.origin.is_none() {
        out.extend(
            store
                .iter()
                .filter(|c| c.scope != HookScope::Global)
                .cloned(),
        );
    }
    out.extend(route.inherited.event(event).iter().cloned());
    out.extend(route.hooks.event(event).iter().cloned());
    out
}

fn resolve_schema(app: &App, schema: &Schema) -> Result<Value, RegistrationError> {
    match schema {
        Schema::Inline(value) => Ok(value.clone()),
        Schema::Ref(name) => app
            .resolve_type(name)
            .cloned()
            .ok_or_else(|| RegistrationError::UnknownSchemaType(name.clone())),
    }
}

fn compile_slot(
    app: &App,
    compiler: &Arc<dyn SchemaCompiler>,
    _slot: &str,
    schema: Option<&Schema>,
) -> Result<Validator, RegistrationError> {
    match schema {
        None => Ok(Validator::Noop),
        Some(schema) => {
            let resolved = resolve_schema(app, schema)?;
            compiler.compile(&resolved).map(Validator::Checked)
        }
    }
}

/// Params merge is special: the synthesized token schema is the base,
/// inherited (guard) parameter types apply only where they match tokens in
/// the final path, and the route-local slot overrides both.
fn compose_params(
    app: &App,
    route: &InternalRoute,
    compiler: &Arc<dyn SchemaCompiler>,
) -> Result<Validator, RegistrationError> {
    let tokens: Vec<String> = route
        .segments
        .iter()
        .filter_map(|segment| match segment {
            Segment::Param(name) => Some(name.clone()),
            Segment::Wildcard => Some("*".to_string()),
            Segment::Static(_) => None,
        })
        .collect();
    let declared = route.schema.params.as_ref();
    let inherited = app.guard_schema().params.as_ref();
    if tokens.is_empty() && declared.is_none() && inherited.is_none() {
        return Ok(Validator::Noop);
    }

    let mut properties = Map::new();
    for token in &tokens {
        properties.insert(token.clone(), json!({"type": "string"}));
    }
    if let Some(schema) = inherited {
        let resolved = resolve_schema(app, schema)?;
        if let Some(props) = resolved.get("properties").and_then(Value::as_object) {
            for (name, prop) in props {
                if properties.contains_key(name) {
                    properties.insert(name.clone(), prop.clone());
                }
            }
        }
    }
    if let Some(schema) = declared {
        let resolved = resolve_schema(app, schema)?;
        if let Some(props) = resolved.get("properties").and_then(Value::as_object) {
            for (name, prop) in props {
                properties.insert(name.clone(), prop.clone());
            }
        } else if tokens.is_empty() {
            return compiler.compile(&resolved).map(Validator::Checked);
        }
    }
    if properties.is_empty() {
        return Ok(Validator::Noop);
    }

    let required: Vec<Value> = tokens.iter().map(|t| Value::String(t.clone())).collect();
    let schema = json!({
        "type": "object",
        "properties": properties,
        "required": required,
    });
    compiler.compile(&schema).map(Validator::Checked)
}

fn compose_response(
    app: &App,
    route: &InternalRoute,
    compiler: &Arc<dyn SchemaCompiler>,
) -> Result<ResponseValidator, RegistrationError> {
    match route
        .schema
        .response
        .as_ref()
        .or(app.guard_schema().response.as_ref())
    {
        None => Ok(ResponseValidator::Noop),
        Some(ResponseSchema::Single(schema)) => {
            let resolved = resolve_schema(app, schema)?;
            compiler.compile(&resolved).map(ResponseValidator::Single)
        }
        Some(ResponseSchema::PerStatus(map)) => {
            let mut compiled = BTreeMap::new();
            for (status, schema) in map {
                let resolved = resolve_schema(app, schema)?;
                compiled.insert(*status, compiler.compile(&resolved)?);
            }
            Ok(ResponseValidator::PerStatus(compiled))
        }
    }
}
