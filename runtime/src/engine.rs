//! The engine: route dispatch and application lifecycle.
//!
//! An [`Engine`] owns a finished [`App`], the schema-compiler collaborator
//! and the shared store. Composing a route produces a single
//! [`ComposedHandler`] closure cached on the route record itself — written
//! once, read-only thereafter. Under ahead-of-time mode every route is
//! composed at [`Engine::start`]; under just-in-time mode the first request
//! composes and caches. Hook registration after a route has served a
//! request is unsupported: the cached handler never changes.

use crate::compose;
use crate::{cookie, metrics, parse, pipeline, respond};
use http::StatusCode;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use weave_core::app::App;
use weave_core::context::{new_store, Context, Request, Response, SharedStore};
use weave_core::error::{Failure, RegistrationError};
use weave_core::hook::Hook;
use weave_core::lifecycle::LifecycleEvent;
use weave_core::route::{match_path, ComposedHandler};
use weave_core::schema::SchemaCompiler;
use weave_core::trace::TraceSink;

/// When composed handlers are synthesized.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum CompileMode {
    /// Compose every route at [`Engine::start`].
    AheadOfTime,
    /// Compose each route on its first request (the default). Named-type
    /// references are still checked at start.
    #[default]
    JustInTime,
}

/// Errors raised while starting or stopping an engine.
#[derive(Error, Debug)]
pub enum EngineError {
    /// A route failed to compose.
    #[error(transparent)]
    Registration(#[from] RegistrationError),

    /// A `start` hook failed.
    #[error("start hook failed: {0}")]
    StartHook(Failure),

    /// A `stop` hook failed.
    #[error("stop hook failed: {0}")]
    StopHook(Failure),
}

/// The per-application dispatcher and pipeline host.
pub struct Engine {
    app: App,
    compiler: Arc<dyn SchemaCompiler>,
    mode: CompileMode,
    store: SharedStore,
    sinks: Vec<Arc<dyn TraceSink>>,
    sequence: Arc<AtomicU64>,
}

impl Engine {
    /// Create an engine over a finished application.
    #[must_use]
    pub fn new(app: App, compiler: Arc<dyn SchemaCompiler>) -> Self {
        let store = new_store(&app.state_seed());
        Self {
            app,
            compiler,
            mode: CompileMode::default(),
            store,
            sinks: Vec::new(),
            sequence: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Select the composition mode.
    #[must_use]
    pub fn with_mode(mut self, mode: CompileMode) -> Self {
        self.mode = mode;
        self
    }

    /// Attach a trace sink. Sinks attach before any route composes; the
    /// composed handlers capture them.
    #[must_use]
    pub fn with_trace_sink(mut self, sink: Arc<dyn TraceSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Handle to the shared store.
    #[must_use]
    pub fn store(&self) -> SharedStore {
        Arc::clone(&self.store)
    }

    /// The application this engine serves.
    #[must_use]
    pub const fn app(&self) -> &App {
        &self.app
    }

    /// Start the engine: compose (or reference-check) every route, then
    /// run `start` hooks in registration order.
    ///
    /// # Errors
    ///
    /// Composition failures and failing `start` hooks; both must abort
    /// startup.
    pub async fn start(&self) -> Result<(), EngineError> {
        metrics::describe();
        for index in 0..self.app.routes().len() {
            match self.mode {
                CompileMode::AheadOfTime => {
                    self.composed_for(index)?;
                }
                CompileMode::JustInTime => {
                    compose::check_references(&self.app, &self.app.routes()[index])?;
                }
            }
        }
        for container in self.app.lifecycle().event(LifecycleEvent::Start) {
            if let Hook::Start(hook) = &container.hook {
                hook().await.map_err(EngineError::StartHook)?;
            }
        }
        tracing::info!(
            routes = self.app.routes().len(),
            mode = ?self.mode,
            "engine started"
        );
        Ok(())
    }

    /// Stop the engine: run `stop` hooks in registration order.
    ///
    /// # Errors
    ///
    /// The first failing `stop` hook.
    pub async fn stop(&self) -> Result<(), EngineError> {
        for container in self.app.lifecycle().event(LifecycleEvent::Stop) {
            if let Hook::Stop(hook) = &container.hook {
                hook().await.map_err(EngineError::StopHook)?;
            }
        }
        tracing::info!("engine stopped");
        Ok(())
    }

    /// Dispatch one request. Always produces a response: unmatched paths
    /// get the NOT_FOUND default mapping without entering any route
    /// pipeline.
    pub async fn handle(&self, request: Request) -> Response {
        let Some(index) = self.match_route(&request) else {
            metrics::record_not_found();
            tracing::debug!(
                method = %request.method,
                path = request.path(),
                "no route matched"
            );
            return respond::failure_response(&Failure::not_found(), &HashMap::new());
        };

        match self.composed_for(index) {
            Ok(composed) => composed(request).await,
            Err(error) => {
                // Unreachable after a successful start(); kept as a guard
                // for engines driven without one.
                tracing::error!(error = %error, "route composition failed");
                respond::failure_response(
                    &Failure::internal("route composition failed"),
                    &HashMap::new(),
                )
            }
        }
    }

    /// The composed handler for a route, synthesizing and caching it on
    /// the route record on first use.
    fn composed_for(&self, index: usize) -> Result<ComposedHandler, RegistrationError> {
        let route = &self.app.routes()[index];
        if let Some(handler) = route.composed() {
            return Ok(handler);
        }
        let plan = Arc::new(compose::compose(&self.app, route, &self.compiler)?);
        let store = Arc::clone(&self.store);
        let sinks = self.sinks.clone();
        let sequence = Arc::clone(&self.sequence);
        let segments = route.segments.clone();
        let composed: ComposedHandler = Arc::new(move |request: Request| {
            let plan = Arc::clone(&plan);
            let store = Arc::clone(&store);
            let sinks = sinks.clone();
            let sequence = Arc::clone(&sequence);
            let segments = segments.clone();
            Box::pin(async move {
                let request_id = sequence.fetch_add(1, Ordering::Relaxed) + 1;
                let params = match_path(&segments, request.path()).unwrap_or_default();
                let query = parse::parse_query(request.query_string());
                let cookies = cookie::parse_cookie_header(request.header("cookie"));
                let mut ctx = Context::new(request, store, plan.bindings.clone(), request_id);
                ctx.set_params(params);
                ctx.set_query(query);
                ctx.set_cookies(cookies);
                pipeline::execute(&plan, ctx, &sinks).await
            })
        });
        Ok(route.cache_composed(composed))
    }

    fn match_route(&self, request: &Request) -> Option<usize> {
        let path = request.path();
        self.app.routes().iter().position(|route| {
            route.method == request.method && match_path(&route.segments, path).is_some()
        })
    }
}

/// The default mapping for a failure, exposed for embedding transports
/// that need to answer outside any engine (e.g. before routing).
#[must_use]
pub fn default_failure_response(failure: &Failure) -> Response {
    respond::failure_response(failure, &HashMap::new())
}

/// The status the default mapping assigns to a failure.
#[must_use]
pub fn default_status(failure: &Failure) -> StatusCode {
    respond::status_for(failure, &HashMap::new())
}
