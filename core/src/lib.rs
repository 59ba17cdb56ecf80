//! # Weave Core
//!
//! Registration-time model for the Weave request-lifecycle composition
//! engine.
//!
//! An HTTP framework built on this crate registers routes, lifecycle hooks,
//! schemas and namespaces on an [`App`]; sub-applications compose with
//! [`App::mount`]. The runtime crate (`weave-runtime`) turns each route
//! into a single composed pipeline function and executes it per request.
//!
//! ## Core Concepts
//!
//! - **Hook**: a function attached to a named lifecycle event, executed in
//!   registration order ([`hook`]).
//! - **Scope**: visibility of a hook across composition — `global`
//!   propagates through every mount, `scoped` reaches the immediate parent
//!   only, `local` never leaves its application ([`hook::HookScope`]).
//! - **Checksum**: structural fingerprint used to deduplicate repeated
//!   mounts of the same sub-application ([`checksum`]).
//! - **Macro**: a named, parameterized bundle of hook registrations exposed
//!   as a route-declaration option ([`macros`]).
//!
//! ## Example
//!
//! ```
//! use weave_core::prelude::*;
//! use serde_json::{json, Value};
//!
//! # fn main() -> Result<(), weave_core::error::RegistrationError> {
//! let sessions = App::new()
//!     .name("sessions")
//!     .state("active", json!(0))
//!     .get("/whoami", handler_sync(|ctx| {
//!         Ok(Value::String(ctx.path().to_string()))
//!     }))?;
//!
//! let app = App::new()
//!     .mount("/session", sessions)?;
//!
//! assert_eq!(app.routes()[0].path, "/session/whoami");
//! # Ok(())
//! # }
//! ```

/// The application builder and route declaration surface.
pub mod app;

/// Structural checksums for mount deduplication.
pub mod checksum;

/// Request, response and per-request context types.
pub mod context;

/// Registration and pipeline error types.
pub mod error;

/// Lifecycle hooks and their containers.
pub mod hook;

/// Lifecycle events and the per-application hook store.
pub mod lifecycle;

/// Named, parameterized hook bundles.
pub mod macros;

mod mount;

/// Route paths, the token grammar, and the internal route record.
pub mod route;

/// Route schemas and the external validation contract.
pub mod schema;

/// Decorator/store/derive/resolve namespaces.
pub mod singleton;

/// Trace span tree and the sink contract.
pub mod trace;

pub use app::{App, MountRecord, RouteOptions};
pub use checksum::Checksum;
pub use context::{new_store, Context, Request, Response, ResponseBody, SharedStore};
pub use error::{ErrorCode, Failure, Fault, RegistrationError};
pub use hook::{Hook, HookContainer, HookOptions, HookResult, HookScope, Position};
pub use lifecycle::{LifecycleEvent, LifecycleStore};
pub use route::{ComposedHandler, Handler, InternalRoute, Segment};
pub use schema::{Checker, ResponseSchema, RouteSchema, Schema, SchemaCompiler};
pub use singleton::{ResolvedBindings, SingletonBase};
pub use trace::{SpanEvent, SpanPhase, TraceProcess, TraceSink};

/// Commonly used items, re-exported for application code.
pub mod prelude {
    pub use crate::app::{App, RouteOptions};
    pub use crate::context::{Context, Request, Response, ResponseBody};
    pub use crate::error::{ErrorCode, Failure, Fault};
    pub use crate::hook::{
        error_fn, error_sync, intercept, intercept_sync, lifetime, lifetime_sync, map_response,
        map_response_sync, notify, notify_sync, trace_fn, transform, transform_sync, ErrorHook,
        Hook, HookOptions, HookScope, Position,
    };
    pub use crate::route::{handler, handler_sync};
    pub use crate::schema::{RouteSchema, Schema};
    pub use crate::singleton::{derive_fn, derive_sync};
}
