//! Per-application namespaces: decorators, store seeds, derive and resolve
//! bindings.
//!
//! The four namespaces are independent ordered lists of named bindings.
//! Composition unions the lists; a name collision resolves to the innermost
//! definition. Routes snapshot their resolved bindings at declaration time
//! ([`SingletonBase::snapshot`]), so a later mount never rewrites what an
//! already-declared route sees — precedence is innermost-definition-at-
//! declaration-time, not innermost-at-mount-time.

use crate::context::Context;
use crate::error::Failure;
use futures::future::BoxFuture;
use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

/// A static value attached to every context composed from this namespace.
pub type DecoratorValue = Arc<dyn Any + Send + Sync>;

/// A named per-request computation. `derive` bindings run before
/// validation, `resolve` bindings after.
pub type DeriveFn =
    Arc<dyn for<'a> Fn(&'a Context) -> BoxFuture<'a, Result<Value, Failure>> + Send + Sync>;

/// Wrap an async closure as a [`DeriveFn`].
pub fn derive_fn<F>(f: F) -> DeriveFn
where
    F: for<'a> Fn(&'a Context) -> BoxFuture<'a, Result<Value, Failure>> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Wrap a synchronous closure as a [`DeriveFn`].
pub fn derive_sync<F>(f: F) -> DeriveFn
where
    F: Fn(&Context) -> Result<Value, Failure> + Send + Sync + 'static,
{
    Arc::new(move |ctx| {
        let out = f(ctx);
        Box::pin(std::future::ready(out))
    })
}

/// The four per-application namespaces as ordered binding lists.
#[derive(Clone, Default)]
pub struct SingletonBase {
    decorators: Vec<(String, DecoratorValue)>,
    state: Vec<(String, Value)>,
    derives: Vec<(String, DeriveFn)>,
    resolves: Vec<(String, DeriveFn)>,
}

impl SingletonBase {
    /// Empty namespaces.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a decorator.
    pub fn decorate(&mut self, name: impl Into<String>, value: DecoratorValue) {
        self.decorators.push((name.into(), value));
    }

    /// Register a store seed value.
    pub fn state(&mut self, name: impl Into<String>, value: Value) {
        self.state.push((name.into(), value));
    }

    /// Register a derive binding (runs before validation).
    pub fn derive(&mut self, name: impl Into<String>, f: DeriveFn) {
        self.derives.push((name.into(), f));
    }

    /// Register a resolve binding (runs after validation).
    pub fn resolve(&mut self, name: impl Into<String>, f: DeriveFn) {
        self.resolves.push((name.into(), f));
    }

    /// Union another application's namespaces into this one. The other
    /// side's definitions land after ours, so they win on name collision
    /// for anything declared from here on.
    pub fn union_from(&mut self, other: &SingletonBase) {
        self.decorators.extend(other.decorators.iter().cloned());
        self.state.extend(other.state.iter().cloned());
        self.derives.extend(other.derives.iter().cloned());
        self.resolves.extend(other.resolves.iter().cloned());
    }

    /// Resolve the current lists into a per-route snapshot: duplicates
    /// collapse to the innermost (latest) definition, first-seen order is
    /// kept.
    #[must_use]
    pub fn snapshot(&self) -> ResolvedBindings {
        ResolvedBindings {
            decorators: Arc::new(dedup_last(&self.decorators)),
            state: Arc::new(dedup_last(&self.state)),
            derives: Arc::new(dedup_last(&self.derives)),
            resolves: Arc::new(dedup_last(&self.resolves)),
        }
    }

    /// Deduplicated store seed entries.
    #[must_use]
    pub fn state_seed(&self) -> Vec<(String, Value)> {
        dedup_last(&self.state)
    }

    /// Binding names, for structural fingerprinting.
    #[must_use]
    pub fn binding_names(&self) -> Vec<(&'static str, &str)> {
        let mut out = Vec::new();
        for (name, _) in &self.decorators {
            out.push(("decorator", name.as_str()));
        }
        for (name, _) in &self.state {
            out.push(("state", name.as_str()));
        }
        for (name, _) in &self.derives {
            out.push(("derive", name.as_str()));
        }
        for (name, _) in &self.resolves {
            out.push(("resolve", name.as_str()));
        }
        out
    }
}

/// Immutable bindings snapshot carried by each route.
#[derive(Clone)]
pub struct ResolvedBindings {
    /// Decorators, innermost definition per name.
    pub decorators: Arc<Vec<(String, DecoratorValue)>>,
    /// Store seed entries.
    pub state: Arc<Vec<(String, Value)>>,
    /// Derive bindings, in declaration order.
    pub derives: Arc<Vec<(String, DeriveFn)>>,
    /// Resolve bindings, in declaration order.
    pub resolves: Arc<Vec<(String, DeriveFn)>>,
}

impl Default for ResolvedBindings {
    fn default() -> Self {
        Self {
            decorators: Arc::new(Vec::new()),
            state: Arc::new(Vec::new()),
            derives: Arc::new(Vec::new()),
            resolves: Arc::new(Vec::new()),
        }
    }
}

fn dedup_last<T: Clone>(items: &[(String, T)]) -> Vec<(String, T)> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut out: Vec<(String, T)> = Vec::new();
    for (name, value) in items {
        if let Some(&at) = index.get(name.as_str()) {
            out[at].1 = value.clone();
        } else {
            index.insert(name.as_str(), out.len());
            out.push((name.clone(), value.clone()));
        }
    }
    out
}
