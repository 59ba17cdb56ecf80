//! # Weave Runtime
//!
//! Route composition and execution for the Weave request-lifecycle engine.
//!
//! The core crate models registration; this crate turns each registered
//! route into a single composed pipeline function and runs it per request:
//!
//! - **Composer** ([`compose`]): merges the applicable hooks and schemas
//!   into an [`compose::ExecutionPlan`], delegating schema compilation to
//!   the [`weave_core::schema::SchemaCompiler`] collaborator.
//! - **Engine** ([`engine`]): route matching, NOT_FOUND defaults,
//!   ahead-of-time/just-in-time plan caches, `start`/`stop` lifecycle.
//! - **Pipeline** (internal): the fixed-order stage machine with
//!   short-circuiting, error dispatch and span tracing.
//!
//! Each request runs as one independent pipeline instance; stages may
//! suspend without blocking other in-flight requests. The only state
//! shared across requests is the store namespace and the write-once plan
//! caches.
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use serde_json::json;
//! use weave_core::prelude::*;
//! use weave_runtime::{CompileMode, Engine};
//! use weave_testing::schema::StubCompiler;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let app = App::new()
//!     .get("/hello/:name", handler_sync(|ctx| {
//!         Ok(json!({ "hello": ctx.param("name") }))
//!     }))?;
//!
//! let engine = Engine::new(app, Arc::new(StubCompiler::new()))
//!     .with_mode(CompileMode::AheadOfTime);
//! engine.start().await?;
//!
//! let response = engine
//!     .handle(Request::new(http::Method::GET, "/hello/ada"))
//!     .await;
//! assert_eq!(response.status, http::StatusCode::OK);
//! # Ok(())
//! # }
//! ```

/// The route composer: hooks + schemas → one execution plan per route.
pub mod compose;

mod cookie;

/// The engine: dispatch, plan caches, start/stop lifecycle.
pub mod engine;

/// Runtime metric names and registration.
pub mod metrics;

mod parse;

mod pipeline;

/// Realtime/duplex pass-through adapter.
pub mod realtime;

mod respond;

mod trace;

pub use compose::{compose, ExecutionPlan, ResponseValidator, Validator, ValidatorSet};
pub use cookie::{sign_value, verify_value};
pub use engine::{CompileMode, Engine, EngineError};
pub use realtime::{DuplexHandler, RealtimeAdapter};
