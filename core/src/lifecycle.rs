//! Lifecycle events and the per-application hook store.
//!
//! A [`LifecycleStore`] keeps one ordered sequence of hook containers per
//! event. Insertion order is execution order; a registration may request
//! the front or back of the sequence, and nothing reorders it afterwards —
//! the runtime never mutates a store.

use crate::checksum::Checksum;
use crate::hook::{HookContainer, HookScope, Position};
use smallvec::SmallVec;
use std::fmt;

/// The fixed set of lifecycle events.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LifecycleEvent {
    /// Application start.
    Start,
    /// Request received, before anything else.
    Request,
    /// Body parsing.
    Parse,
    /// Context transformation, after validation.
    Transform,
    /// Just before the handler.
    BeforeHandle,
    /// Just after the handler.
    AfterHandle,
    /// Conversion of the pending value into a transport response.
    MapResponse,
    /// Response produced (side effects only).
    OnResponse,
    /// Span-tree observation.
    Trace,
    /// Error dispatch.
    Error,
    /// Application stop.
    Stop,
}

impl LifecycleEvent {
    /// Every event, in pipeline order.
    pub const ALL: [LifecycleEvent; 11] = [
        Self::Start,
        Self::Request,
        Self::Parse,
        Self::Transform,
        Self::BeforeHandle,
        Self::AfterHandle,
        Self::MapResponse,
        Self::OnResponse,
        Self::Trace,
        Self::Error,
        Self::Stop,
    ];

    /// The event's registration name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Request => "request",
            Self::Parse => "parse",
            Self::Transform => "transform",
            Self::BeforeHandle => "beforeHandle",
            Self::AfterHandle => "afterHandle",
            Self::MapResponse => "mapResponse",
            Self::OnResponse => "onResponse",
            Self::Trace => "trace",
            Self::Error => "error",
            Self::Stop => "stop",
        }
    }

    /// Look an event up by its registration name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|event| event.as_str() == name)
    }
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

type HookList = SmallVec<[HookContainer; 4]>;

/// Ordered hook containers per lifecycle event.
#[derive(Clone, Default)]
pub struct LifecycleStore {
    start: HookList,
    request: HookList,
    parse: HookList,
    transform: HookList,
    before_handle: HookList,
    after_handle: HookList,
    map_response: HookList,
    on_response: HookList,
    trace: HookList,
    error: HookList,
    stop: HookList,
}

impl LifecycleStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a container at the given position of its event's sequence.
    /// A container whose dedup key is already present is skipped.
    pub fn register(&mut self, container: HookContainer, position: Position) {
        let list = self.list_mut(container.event());
        if let Some(key) = container.dedup_key() {
            if list
                .iter()
                .any(|existing| existing.dedup_key() == Some((key.0, key.1)))
            {
                return;
            }
        }
        match position {
            Position::Before => list.insert(0, container),
            Position::After => list.push(container),
        }
    }

    /// The containers registered for an event, in execution order.
    #[must_use]
    pub fn event(&self, event: LifecycleEvent) -> &[HookContainer] {
        match event {
            LifecycleEvent::Start => &self.start,
            LifecycleEvent::Request => &self.request,
            LifecycleEvent::Parse => &self.parse,
            LifecycleEvent::Transform => &self.transform,
            LifecycleEvent::BeforeHandle => &self.before_handle,
            LifecycleEvent::AfterHandle => &self.after_handle,
            LifecycleEvent::MapResponse => &self.map_response,
            LifecycleEvent::OnResponse => &self.on_response,
            LifecycleEvent::Trace => &self.trace,
            LifecycleEvent::Error => &self.error,
            LifecycleEvent::Stop => &self.stop,
        }
    }

    /// Fold a mounted child's store into this one: `global` stays global,
    /// `scoped` demotes to local (visible to this application's own routes,
    /// not exported again), `local` is dropped. Containers are stamped with
    /// the child's checksum and deduplicated against existing identities.
    pub fn fold_mounted(&mut self, child: &LifecycleStore, checksum: Checksum) {
        for event in LifecycleEvent::ALL {
            for (index, container) in child.event(event).iter().enumerate() {
                let scope = match container.scope {
                    HookScope::Global => HookScope::Global,
                    HookScope::Scoped => HookScope::Local,
                    HookScope::Local => continue,
                };
                let mut folded = container.clone();
                folded.scope = scope;
                stamp_identity(&mut folded, checksum, event, index);
                self.register(folded, Position::After);
            }
        }
    }

    /// Bake this store's non-global containers into a route's inherited
    /// store (used when the declaring application is mounted).
    pub fn bake_into(&self, target: &mut LifecycleStore, checksum: Checksum) {
        for event in LifecycleEvent::ALL {
            for (index, container) in self.event(event).iter().enumerate() {
                if container.scope == HookScope::Global {
                    continue;
                }
                let mut baked = container.clone();
                stamp_identity(&mut baked, checksum, event, index);
                target.register(baked, Position::After);
            }
        }
    }

    /// Number of containers registered for an event.
    #[must_use]
    pub fn len(&self, event: LifecycleEvent) -> usize {
        self.event(event).len()
    }

    /// Whether the store holds no containers at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        LifecycleEvent::ALL
            .into_iter()
            .all(|event| self.event(event).is_empty())
    }

    fn list_mut(&mut self, event: LifecycleEvent) -> &mut HookList {
        match event {
            LifecycleEvent::Start => &mut self.start,
            LifecycleEvent::Request => &mut self.request,
            LifecycleEvent::Parse => &mut self.parse,
            LifecycleEvent::Transform => &mut self.transform,
            LifecycleEvent::BeforeHandle => &mut self.before_handle,
            LifecycleEvent::AfterHandle => &mut self.after_handle,
            LifecycleEvent::MapResponse => &mut self.map_response,
            LifecycleEvent::OnResponse => &mut self.on_response,
            LifecycleEvent::Trace => &mut self.trace,
            LifecycleEvent::Error => &mut self.error,
            LifecycleEvent::Stop => &mut self.stop,
        }
    }
}

/// Stamp a dedup identity derived from the owning application's checksum
/// and the container's position in that application's sequence. Containers
/// that already carry an identity keep it.
fn stamp_identity(
    container: &mut HookContainer,
    checksum: Checksum,
    event: LifecycleEvent,
    index: usize,
) {
    if container.checksum.is_none() {
        container.checksum = Some(checksum);
        if container.subtype.is_none() {
            container.subtype = Some(format!("{}:{index}", event.as_str()));
        }
    }
}

impl fmt::Debug for LifecycleStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("LifecycleStore");
        for event in LifecycleEvent::ALL {
            let len = self.len(event);
            if len > 0 {
                debug.field(event.as_str(), &len);
            }
        }
        debug.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::FingerprintBuilder;
    use crate::hook::{transform_sync, Hook, HookContainer, HookScope};

    fn transform_container(scope: HookScope) -> HookContainer {
        HookContainer::new(Hook::Transform(transform_sync(|_| Ok(()))), scope)
    }

    fn checksum(tag: &str) -> Checksum {
        let mut builder = FingerprintBuilder::new();
        builder.push("name", tag);
        builder.finish()
    }

    #[test]
    fn event_names_round_trip() {
        for event in LifecycleEvent::ALL {
            assert_eq!(LifecycleEvent::from_name(event.as_str()), Some(event));
        }
        assert_eq!(LifecycleEvent::from_name("afterResponse"), None);
    }

    #[test]
    fn position_before_prepends() {
        let mut store = LifecycleStore::new();
        let first = transform_container(HookScope::Local);
        let second = transform_container(HookScope::Global);
        store.register(first, Position::After);
        store.register(second, Position::Before);
        let registered = store.event(LifecycleEvent::Transform);
        assert_eq!(registered[0].scope, HookScope::Global);
        assert_eq!(registered[1].scope, HookScope::Local);
    }

    #[test]
    fn fold_demotes_scoped_and_drops_local() {
        let mut child = LifecycleStore::new();
        child.register(transform_container(HookScope::Global), Position::After);
        child.register(transform_container(HookScope::Scoped), Position::After);
        child.register(transform_container(HookScope::Local), Position::After);

        let mut parent = LifecycleStore::new();
        parent.fold_mounted(&child, checksum("plugin"));

        let folded = parent.event(LifecycleEvent::Transform);
        assert_eq!(folded.len(), 2);
        assert_eq!(folded[0].scope, HookScope::Global);
        assert_eq!(folded[1].scope, HookScope::Local);
    }

    #[test]
    fn fold_twice_deduplicates_by_checksum() {
        let mut child = LifecycleStore::new();
        child.register(transform_container(HookScope::Global), Position::After);

        let mut parent = LifecycleStore::new();
        let id = checksum("plugin");
        parent.fold_mounted(&child, id);
        parent.fold_mounted(&child, id);
        assert_eq!(parent.len(LifecycleEvent::Transform), 1);
    }

    #[test]
    fn bake_keeps_scoped_and_local_only() {
        let mut app = LifecycleStore::new();
        app.register(transform_container(HookScope::Global), Position::After);
        app.register(transform_container(HookScope::Scoped), Position::After);
        app.register(transform_container(HookScope::Local), Position::After);

        let mut inherited = LifecycleStore::new();
        app.bake_into(&mut inherited, checksum("plugin"));
        assert_eq!(inherited.len(LifecycleEvent::Transform), 2);
    }
}
