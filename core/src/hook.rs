//! Lifecycle hooks as tagged variants with concrete signatures.
//!
//! Every hook is one variant of [`Hook`], carrying the exact async
//! signature its stage invokes — there is no untyped invocation anywhere in
//! the engine. Hooks are wrapped in a [`HookContainer`] together with their
//! visibility [`HookScope`] and an optional dedup identity.
//!
//! The `*_sync` constructors exist because most hooks in practice are
//! synchronous; they wrap the closure in an already-resolved future.

use crate::checksum::Checksum;
use crate::context::{Context, Response};
use crate::error::{ErrorCode, Failure};
use crate::lifecycle::LifecycleEvent;
use crate::trace::TraceProcess;
use futures::future::BoxFuture;
use serde_json::Value;
use std::sync::Arc;

/// Outcome of a fallible hook invocation.
pub type HookResult<T> = Result<T, Failure>;

/// A hook that may short-circuit by returning a value (`request`,
/// `beforeHandle`) or replace the pending value (`afterHandle`).
pub type InterceptFn = Arc<
    dyn for<'a> Fn(&'a mut Context) -> BoxFuture<'a, HookResult<Option<Value>>> + Send + Sync,
>;

/// A body-parser hook; the first hook returning `Some` wins.
pub type ParseFn = InterceptFn;

/// A hook that mutates the context and cannot short-circuit.
pub type TransformFn =
    Arc<dyn for<'a> Fn(&'a mut Context) -> BoxFuture<'a, HookResult<()>> + Send + Sync>;

/// A hook that may replace the pending transport response.
pub type MapResponseFn = Arc<
    dyn for<'a> Fn(&'a mut Context) -> BoxFuture<'a, HookResult<Option<Response>>> + Send + Sync,
>;

/// A side-effect-only hook; return values are ignored.
pub type NotifyFn = Arc<dyn for<'a> Fn(&'a Context) -> BoxFuture<'a, ()> + Send + Sync>;

/// An error-stage hook body. Returning `Some` recovers with that value;
/// returning `None` defers to the next hook or the default mapping.
pub type ErrorFn = Arc<
    dyn for<'a> Fn(&'a mut Context, &'a Failure) -> BoxFuture<'a, HookResult<Option<Value>>>
        + Send
        + Sync,
>;

/// A trace hook, invoked with the finished span tree of a request.
pub type TraceFn = Arc<dyn Fn(&TraceProcess) + Send + Sync>;

/// A `start`/`stop` lifetime hook.
pub type LifetimeFn = Arc<dyn Fn() -> BoxFuture<'static, HookResult<()>> + Send + Sync>;

/// An error hook together with its code filter.
#[derive(Clone)]
pub struct ErrorHook {
    /// Codes this hook handles; `None` is a catch-all.
    pub codes: Option<Vec<ErrorCode>>,
    /// The hook body.
    pub run: ErrorFn,
}

impl ErrorHook {
    /// A catch-all error hook.
    #[must_use]
    pub fn new(run: ErrorFn) -> Self {
        Self { codes: None, run }
    }

    /// An error hook limited to the given codes.
    #[must_use]
    pub fn for_codes(codes: Vec<ErrorCode>, run: ErrorFn) -> Self {
        Self {
            codes: Some(codes),
            run,
        }
    }

    /// Whether this hook should run for the given code.
    #[must_use]
    pub fn handles(&self, code: &ErrorCode) -> bool {
        self.codes.as_ref().is_none_or(|codes| codes.contains(code))
    }
}

/// One lifecycle hook, tagged by the event it belongs to.
#[derive(Clone)]
pub enum Hook {
    /// `start` hook.
    Start(LifetimeFn),
    /// `request` hook; a non-void return short-circuits.
    Request(InterceptFn),
    /// `parse` hook; first non-void result wins.
    Parse(ParseFn),
    /// `transform` hook.
    Transform(TransformFn),
    /// `beforeHandle` hook; a non-void return short-circuits.
    BeforeHandle(InterceptFn),
    /// `afterHandle` hook; a non-void return replaces the pending value.
    AfterHandle(InterceptFn),
    /// `mapResponse` hook.
    MapResponse(MapResponseFn),
    /// `onResponse` hook (side effects only).
    OnResponse(NotifyFn),
    /// `trace` hook.
    Trace(TraceFn),
    /// `error` hook.
    Error(ErrorHook),
    /// `stop` hook.
    Stop(LifetimeFn),
}

impl Hook {
    /// The lifecycle event this hook belongs to.
    #[must_use]
    pub const fn event(&self) -> LifecycleEvent {
        match self {
            Self::Start(_) => LifecycleEvent::Start,
            Self::Request(_) => LifecycleEvent::Request,
            Self::Parse(_) => LifecycleEvent::Parse,
            Self::Transform(_) => LifecycleEvent::Transform,
            Self::BeforeHandle(_) => LifecycleEvent::BeforeHandle,
            Self::AfterHandle(_) => LifecycleEvent::AfterHandle,
            Self::MapResponse(_) => LifecycleEvent::MapResponse,
            Self::OnResponse(_) => LifecycleEvent::OnResponse,
            Self::Trace(_) => LifecycleEvent::Trace,
            Self::Error(_) => LifecycleEvent::Error,
            Self::Stop(_) => LifecycleEvent::Stop,
        }
    }
}

/// Visibility of a hook across application composition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HookScope {
    /// Visible to every route in the parent and propagated through further
    /// mounts.
    Global,
    /// Visible to routes in the immediate parent only; does not propagate
    /// further.
    Scoped,
    /// Visible only to routes declared in the same application; never
    /// exported on mount.
    Local,
}

/// Where a hook is inserted relative to the existing sequence for its
/// event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Position {
    /// Front of the sequence.
    Before,
    /// Back of the sequence (the default).
    #[default]
    After,
}

/// Registration options for a hook.
#[derive(Clone, Copy, Debug)]
pub struct HookOptions {
    /// Visibility scope. Defaults to [`HookScope::Local`].
    pub scope: HookScope,
    /// Insertion position. Defaults to [`Position::After`].
    pub position: Position,
}

impl Default for HookOptions {
    fn default() -> Self {
        Self {
            scope: HookScope::Local,
            position: Position::After,
        }
    }
}

impl HookOptions {
    /// Options with the given scope and default position.
    #[must_use]
    pub fn scoped_as(scope: HookScope) -> Self {
        Self {
            scope,
            ..Self::default()
        }
    }
}

/// A registered hook, its scope, and its dedup identity.
///
/// Identity for dedup purposes is `(checksum, subtype)` when a checksum is
/// present; a container without one is always applied. Containers are
/// immutable once created.
#[derive(Clone)]
pub struct HookContainer {
    /// The hook itself.
    pub hook: Hook,
    /// Visibility scope.
    pub scope: HookScope,
    /// Owning application's checksum, stamped at mount time.
    pub checksum: Option<Checksum>,
    /// Discriminator for containers sharing a checksum.
    pub subtype: Option<String>,
}

impl HookContainer {
    /// A container with no dedup identity.
    #[must_use]
    pub const fn new(hook: Hook, scope: HookScope) -> Self {
        Self {
            hook,
            scope,
            checksum: None,
            subtype: None,
        }
    }

    /// Attach a dedup identity.
    #[must_use]
    pub fn with_identity(mut self, checksum: Checksum, subtype: Option<String>) -> Self {
        self.checksum = Some(checksum);
        self.subtype = subtype;
        self
    }

    /// The event this container's hook belongs to.
    #[must_use]
    pub const fn event(&self) -> LifecycleEvent {
        self.hook.event()
    }

    /// Dedup key, if the container carries a checksum.
    #[must_use]
    pub fn dedup_key(&self) -> Option<(Checksum, Option<&str>)> {
        self.checksum
            .map(|checksum| (checksum, self.subtype.as_deref()))
    }
}

/// Wrap an async closure as an [`InterceptFn`].
pub fn intercept<F>(f: F) -> InterceptFn
where
    F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, HookResult<Option<Value>>>
        + Send
        + Sync
        + 'static,
{
    Arc::new(f)
}

/// Wrap a synchronous closure as an [`InterceptFn`].
pub fn intercept_sync<F>(f: F) -> InterceptFn
where
    F: Fn(&mut Context) -> HookResult<Option<Value>> + Send + Sync + 'static,
{
    Arc::new(move |ctx| {
        let out = f(ctx);
        Box::pin(std::future::ready(out))
    })
}

/// Wrap an async closure as a [`TransformFn`].
pub fn transform<F>(f: F) -> TransformFn
where
    F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, HookResult<()>> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Wrap a synchronous closure as a [`TransformFn`].
pub fn transform_sync<F>(f: F) -> TransformFn
where
    F: Fn(&mut Context) -> HookResult<()> + Send + Sync + 'static,
{
    Arc::new(move |ctx| {
        let out = f(ctx);
        Box::pin(std::future::ready(out))
    })
}

/// Wrap an async closure as a [`MapResponseFn`].
pub fn map_response<F>(f: F) -> MapResponseFn
where
    F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, HookResult<Option<Response>>>
        + Send
        + Sync
        + 'static,
{
    Arc::new(f)
}

/// Wrap a synchronous closure as a [`MapResponseFn`].
pub fn map_response_sync<F>(f: F) -> MapResponseFn
where
    F: Fn(&mut Context) -> HookResult<Option<Response>> + Send + Sync + 'static,
{
    Arc::new(move |ctx| {
        let out = f(ctx);
        Box::pin(std::future::ready(out))
    })
}

/// Wrap an async closure as a [`NotifyFn`].
pub fn notify<F>(f: F) -> NotifyFn
where
    F: for<'a> Fn(&'a Context) -> BoxFuture<'a, ()> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Wrap a synchronous closure as a [`NotifyFn`].
pub fn notify_sync<F>(f: F) -> NotifyFn
where
    F: Fn(&Context) + Send + Sync + 'static,
{
    Arc::new(move |ctx| {
        f(ctx);
        Box::pin(std::future::ready(()))
    })
}

/// Wrap an async closure as an [`ErrorFn`].
pub fn error_fn<F>(f: F) -> ErrorFn
where
    F: for<'a> Fn(&'a mut Context, &'a Failure) -> BoxFuture<'a, HookResult<Option<Value>>>
        + Send
        + Sync
        + 'static,
{
    Arc::new(f)
}

/// Wrap a synchronous closure as an [`ErrorFn`].
pub fn error_sync<F>(f: F) -> ErrorFn
where
    F: Fn(&mut Context, &Failure) -> HookResult<Option<Value>> + Send + Sync + 'static,
{
    Arc::new(move |ctx, failure| {
        let out = f(ctx, failure);
        Box::pin(std::future::ready(out))
    })
}

/// Wrap a closure as a [`TraceFn`].
pub fn trace_fn<F>(f: F) -> TraceFn
where
    F: Fn(&TraceProcess) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Wrap an async closure as a [`LifetimeFn`].
pub fn lifetime<F>(f: F) -> LifetimeFn
where
    F: Fn() -> BoxFuture<'static, HookResult<()>> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Wrap a synchronous closure as a [`LifetimeFn`].
pub fn lifetime_sync<F>(f: F) -> LifetimeFn
where
    F: Fn() -> HookResult<()> + Send + Sync + 'static,
{
    Arc::new(move || {
        let out = f();
        Box::pin(std::future::ready(out))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hook_reports_its_event() {
        let hook = Hook::Transform(transform_sync(|_| Ok(())));
        assert_eq!(hook.event(), LifecycleEvent::Transform);
    }

    #[test]
    fn error_hook_filters_by_code() {
        let hook = ErrorHook::for_codes(
            vec![ErrorCode::Custom("RateLimited".into())],
            error_sync(|_, _| Ok(None)),
        );
        assert!(hook.handles(&ErrorCode::Custom("RateLimited".into())));
        assert!(!hook.handles(&ErrorCode::Validation));

        let catch_all = ErrorHook::new(error_sync(|_, _| Ok(None)));
        assert!(catch_all.handles(&ErrorCode::Validation));
    }

    #[test]
    fn container_dedup_key_requires_checksum() {
        let container = HookContainer::new(
            Hook::Transform(transform_sync(|_| Ok(()))),
            HookScope::Local,
        );
        assert!(container.dedup_key().is_none());
    }
}
