//! Named, parameterized hook bundles.
//!
//! A macro is registered once at the application level and becomes a
//! recognized route-declaration option in that application and its
//! descendants: declaring `{ "auth": {"role": "admin"} }` on a route
//! expands the `auth` macro with those parameters. Expansion happens once,
//! at route-registration time — never per request.

use crate::hook::{
    ErrorHook, Hook, HookContainer, HookOptions, HookScope, InterceptFn, MapResponseFn, NotifyFn,
    ParseFn, Position, TransformFn,
};
use serde_json::Value;
use std::sync::Arc;

/// A macro body: receives the manager and the parameters the route
/// declaration supplied.
pub type MacroFn = Arc<dyn Fn(&mut MacroManager, &Value) + Send + Sync>;

/// Wrap a closure as a [`MacroFn`].
pub fn macro_fn<F>(f: F) -> MacroFn
where
    F: Fn(&mut MacroManager, &Value) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Collects the hook registrations a macro expands into.
///
/// Hooks land in the route's local scope by default; an explicit
/// [`HookOptions`] with a wider scope redirects the registration to the
/// application store instead.
#[derive(Default)]
pub struct MacroManager {
    pub(crate) route: Vec<(HookContainer, Position)>,
    pub(crate) app: Vec<(HookContainer, Position)>,
}

impl MacroManager {
    /// Register a `parse` hook.
    pub fn on_parse(&mut self, hook: ParseFn) {
        self.on_parse_with(hook, HookOptions::default());
    }

    /// Register a `parse` hook with explicit options.
    pub fn on_parse_with(&mut self, hook: ParseFn, options: HookOptions) {
        self.push(Hook::Parse(hook), options);
    }

    /// Register a `transform` hook.
    pub fn on_transform(&mut self, hook: TransformFn) {
        self.on_transform_with(hook, HookOptions::default());
    }

    /// Register a `transform` hook with explicit options.
    pub fn on_transform_with(&mut self, hook: TransformFn, options: HookOptions) {
        self.push(Hook::Transform(hook), options);
    }

    /// Register a `beforeHandle` hook.
    pub fn on_before_handle(&mut self, hook: InterceptFn) {
        self.on_before_handle_with(hook, HookOptions::default());
    }

    /// Register a `beforeHandle` hook with explicit options.
    pub fn on_before_handle_with(&mut self, hook: InterceptFn, options: HookOptions) {
        self.push(Hook::BeforeHandle(hook), options);
    }

    /// Register an `afterHandle` hook.
    pub fn on_after_handle(&mut self, hook: InterceptFn) {
        self.on_after_handle_with(hook, HookOptions::default());
    }

    /// Register an `afterHandle` hook with explicit options.
    pub fn on_after_handle_with(&mut self, hook: InterceptFn, options: HookOptions) {
        self.push(Hook::AfterHandle(hook), options);
    }

    /// Register a `mapResponse` hook.
    pub fn on_map_response(&mut self, hook: MapResponseFn) {
        self.on_map_response_with(hook, HookOptions::default());
    }

    /// Register a `mapResponse` hook with explicit options.
    pub fn on_map_response_with(&mut self, hook: MapResponseFn, options: HookOptions) {
        self.push(Hook::MapResponse(hook), options);
    }

    /// Register an `onResponse` hook.
    pub fn on_response(&mut self, hook: NotifyFn) {
        self.on_response_with(hook, HookOptions::default());
    }

    /// Register an `onResponse` hook with explicit options.
    pub fn on_response_with(&mut self, hook: NotifyFn, options: HookOptions) {
        self.push(Hook::OnResponse(hook), options);
    }

    /// Register an `error` hook.
    pub fn on_error(&mut self, hook: ErrorHook) {
        self.on_error_with(hook, HookOptions::default());
    }

    /// Register an `error` hook with explicit options.
    pub fn on_error_with(&mut self, hook: ErrorHook, options: HookOptions) {
        self.push(Hook::Error(hook), options);
    }

    fn push(&mut self, hook: Hook, options: HookOptions) {
        let container = HookContainer::new(hook, options.scope);
        if options.scope == HookScope::Local {
            self.route.push((container, options.position));
        } else {
            self.app.push((container, options.position));
        }
    }
}
