//! Error types for registration and pipeline execution.
//!
//! Two families live here and they never mix:
//!
//! - [`RegistrationError`]: raised while an application is being assembled
//!   (unknown event names, duplicate routes, unresolved schema references).
//!   These must fail startup and are never deferred to request time.
//! - [`Failure`]: the value that travels through a request pipeline when a
//!   stage fails. It carries one of the fixed [`ErrorCode`]s (or a custom
//!   code registered by name) plus the structured fault list produced by a
//!   schema checker.

use http::StatusCode;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Errors that can occur while assembling an application.
///
/// Every variant is a caller error detected at registration or composition
/// time. None of them are recoverable at request time; an application that
/// produces one must fail startup.
#[derive(Error, Debug)]
pub enum RegistrationError {
    /// A hook was registered by string name against an event that does not
    /// exist.
    #[error("unknown lifecycle event: {0}")]
    UnknownEvent(String),

    /// A hook was registered by string name against an event that exists,
    /// but the hook's variant belongs to a different event.
    #[error("hook does not belong to lifecycle event `{expected}`")]
    EventMismatch {
        /// The event name the caller asked for.
        expected: String,
    },

    /// Two routes resolved to the same method and path.
    #[error("duplicate route: {method} {path}")]
    DuplicateRoute {
        /// HTTP method of the colliding route.
        method: http::Method,
        /// Normalized path of the colliding route.
        path: String,
    },

    /// A route path failed to parse (empty parameter name, wildcard not in
    /// final position).
    #[error("invalid route path: {0}")]
    InvalidPath(String),

    /// A schema slot referenced a named type that was never declared.
    #[error("unknown schema type: {0}")]
    UnknownSchemaType(String),

    /// A route declaration used a macro name that was never defined.
    #[error("unknown macro: {0}")]
    UnknownMacro(String),

    /// The schema compiler collaborator rejected a schema.
    #[error("schema for `{slot}` failed to compile: {message}")]
    SchemaCompile {
        /// The schema slot being compiled (`body`, `params`, ...).
        slot: String,
        /// Compiler-provided detail.
        message: String,
    },
}

/// The fixed pipeline error taxonomy, plus an open set of custom codes.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Anything not classified below.
    Unknown,
    /// A schema check failed; the failure carries the fault list.
    Validation,
    /// No route matched the request. Produced by the dispatcher, never from
    /// inside a route pipeline.
    NotFound,
    /// Body parsing failed, or the content type was unrecognized.
    Parse,
    /// An uncaught error escaped a stage.
    InternalServerError,
    /// A signed cookie failed verification.
    InvalidCookieSignature,
    /// A code registered by name through the application's error namespace.
    Custom(String),
}

impl ErrorCode {
    /// Stable string identifier for this code, used in error responses.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Unknown => "UNKNOWN",
            Self::Validation => "VALIDATION",
            Self::NotFound => "NOT_FOUND",
            Self::Parse => "PARSE",
            Self::InternalServerError => "INTERNAL_SERVER_ERROR",
            Self::InvalidCookieSignature => "INVALID_COOKIE_SIGNATURE",
            Self::Custom(name) => name,
        }
    }

    /// The status code used when no registration overrides it.
    #[must_use]
    pub const fn default_status(&self) -> StatusCode {
        match self {
            Self::Validation => StatusCode::UNPROCESSABLE_ENTITY,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Parse | Self::InvalidCookieSignature => StatusCode::BAD_REQUEST,
            Self::Unknown | Self::InternalServerError | Self::Custom(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One structured fault produced by a schema checker.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Fault {
    /// Dotted path to the offending field (e.g. `params.id`).
    pub path: String,
    /// Human-readable description of the mismatch.
    pub message: String,
}

impl Fault {
    /// Create a fault for the given path.
    #[must_use]
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Return the same fault with `prefix.` prepended to its path.
    #[must_use]
    pub fn prefixed(mut self, prefix: &str) -> Self {
        self.path = if self.path.is_empty() {
            prefix.to_string()
        } else {
            format!("{prefix}.{}", self.path)
        };
        self
    }
}

/// A pipeline failure: an error code, a message, and the faults that
/// explain it.
///
/// Failures are caught by the execution engine and routed to the `error`
/// stage; nothing escapes a pipeline uncaught.
#[derive(Clone, Debug)]
pub struct Failure {
    /// Classified error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
    /// Structured fault list (empty for non-validation failures).
    pub faults: Vec<Fault>,
    /// Explicit status override, if a constructor or hook set one.
    pub status: Option<StatusCode>,
}

impl Failure {
    /// Create a failure with the given code and message.
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            faults: Vec::new(),
            status: None,
        }
    }

    /// A VALIDATION failure for one schema slot. Fault paths are prefixed
    /// with the slot name so `id` becomes `params.id`.
    #[must_use]
    pub fn validation(slot: &str, faults: Vec<Fault>) -> Self {
        Self {
            code: ErrorCode::Validation,
            message: format!("validation failed for {slot}"),
            faults: faults.into_iter().map(|f| f.prefixed(slot)).collect(),
            status: None,
        }
    }

    /// A PARSE failure.
    #[must_use]
    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Parse, message)
    }

    /// A NOT_FOUND failure.
    #[must_use]
    pub fn not_found() -> Self {
        Self::new(ErrorCode::NotFound, "route not found")
    }

    /// An INTERNAL_SERVER_ERROR failure.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalServerError, message)
    }

    /// An INVALID_COOKIE_SIGNATURE failure naming the offending cookie.
    #[must_use]
    pub fn invalid_cookie_signature(cookie: &str) -> Self {
        Self::new(
            ErrorCode::InvalidCookieSignature,
            format!("signature verification failed for cookie `{cookie}`"),
        )
    }

    /// A failure carrying a custom code registered by name.
    #[must_use]
    pub fn custom(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Custom(code.into()), message)
    }

    /// Attach an explicit status override.
    #[must_use]
    pub const fn with_status(mut self, status: StatusCode) -> Self {
        self.status = Some(status);
        self
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for Failure {}
