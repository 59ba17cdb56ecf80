//! # Weave Testing
//!
//! Testing utilities and stub collaborators for the Weave engine.
//!
//! This crate provides:
//! - A structural stub for the schema-validation collaborator
//!   ([`schema::StubCompiler`])
//! - Invocation-counting hooks and handlers ([`hooks`])
//! - A fluent request builder ([`request::TestRequest`])
//! - A capturing trace sink ([`trace::CapturingSink`])
//!
//! ## Example
//!
//! ```
//! use weave_testing::hooks::{counting_handler, Counter};
//! use weave_testing::request::TestRequest;
//! use serde_json::json;
//!
//! let counter = Counter::new();
//! let _handler = counting_handler(&counter, json!("ok"));
//! let request = TestRequest::get("/users/42?verbose=1").build();
//! assert_eq!(request.path(), "/users/42");
//! assert_eq!(counter.count(), 0);
//! ```

/// Counting hooks and handlers.
pub mod hooks;

/// Request builder.
pub mod request;

/// Stub schema compiler.
pub mod schema;

/// Capturing trace sink.
pub mod trace;

pub use hooks::Counter;
pub use request::TestRequest;
pub use schema::StubCompiler;
pub use trace::CapturingSink;
