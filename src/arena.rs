//! Tracker arena - global storage for per-container listener registries.
//!
//! Tracked containers keep their values inline; everything the propagation
//! engine needs lives here, in a global slab keyed by [`TrackerId`]. The split
//! keeps the arena light and lets dependency lists refer to trackers of
//! containers with different value types through one Copy id.
//!
//! A [`Tracker`] is the owning handle: it allocates its slot on creation and
//! frees it on drop, making any outstanding `TrackerId` stale. Stale access
//! returns `None`/defaults rather than panicking, so teardown code can run in
//! any order.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use slab::Slab;

use crate::key::Key;
use crate::metrics;
use crate::registry::ListenerSet;

/// Global tracker arena - stores all tracker listener state.
static TRACKER_ARENA: RwLock<Slab<TrackerMetadata>> = RwLock::new(Slab::new());

/// Allocator for unique listener tokens.
static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

/// Opaque discriminator distinguishing registrations that share a handler.
///
/// A listener is identified by the full (key, handler, token) triple, so one
/// handler can serve many dependents as long as each carries its own token.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct Token(u64);

impl Token {
    /// Wraps a caller-chosen raw token value.
    pub fn new(raw: u64) -> Self {
        Token(raw)
    }

    /// Allocates a process-unique token.
    pub fn unique() -> Self {
        Token(NEXT_TOKEN.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw token value.
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Payload delivered to a change listener.
///
/// `tracker` identifies the container that changed (the stable identity of
/// the tracked view), `key` the slot that changed, and `token` echoes the
/// registration token so a shared handler can route to the right dependent.
#[derive(Clone, Debug)]
pub struct ChangeEvent {
    /// Tracker of the container whose slot changed.
    pub tracker: TrackerId,
    /// The slot that changed.
    pub key: Key,
    /// Token the listener was registered under.
    pub token: Token,
}

/// A change listener callback.
pub type ChangeHandler = Arc<dyn Fn(ChangeEvent) + Send + Sync>;

/// Hook invoked when a tracker transitions between zero and nonzero listeners.
///
/// `true` on the 0 -> 1 transition, `false` on 1 -> 0. This is a notification
/// to the owning container (e.g. to free caches), not a capability query.
pub type WatchHook = Arc<dyn Fn(bool) + Send + Sync>;

/// Listener state for one tracked container, stored in the arena.
#[derive(Default)]
pub(crate) struct TrackerMetadata {
    listeners: RwLock<ListenerSet>,
    watch_hook: RwLock<Option<WatchHook>>,
}

/// Unique identifier for a tracker slot in the arena.
///
/// A zero-cost wrapper around a slab index. When the owning [`Tracker`] is
/// dropped the slot is freed and the id goes stale; stale access returns
/// `None` or a default, never panics.
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct TrackerId(u32);

impl TrackerId {
    pub(crate) fn new(index: u32) -> Self {
        Self(index)
    }

    fn index(self) -> usize {
        self.0 as usize
    }

    /// Access the tracker metadata with a closure (read guard on the arena).
    ///
    /// Returns `None` if the tracker has been dropped (stale access).
    pub(crate) fn with<F, R>(self, f: F) -> Option<R>
    where
        F: FnOnce(&TrackerMetadata) -> R,
    {
        let arena = TRACKER_ARENA.read();
        arena.get(self.index()).map(f)
    }

    /// Registers a listener for `key` under (handler, token).
    ///
    /// Duplicate triples are permitted and produce a second callback; the
    /// scope reconciliation in [`crate::scope`] never creates them.
    pub fn add_listener(self, key: Key, handler: &ChangeHandler, token: Token) {
        let first = self.with(|meta| {
            let mut listeners = meta.listeners.write();
            let was_empty = listeners.is_empty();
            listeners.add(key, Arc::clone(handler), token);
            metrics::listener_added();
            was_empty
        });
        if first == Some(true) {
            self.fire_watch_hook(true);
        }
    }

    /// Removes the first triple matching (key, handler, token).
    ///
    /// Removing an absent listener is a no-op so teardown can call this
    /// unconditionally.
    pub fn remove_listener(self, key: &Key, handler: &ChangeHandler, token: Token) {
        let emptied = self.with(|meta| {
            let mut listeners = meta.listeners.write();
            if listeners.remove(key, handler, token) {
                metrics::listener_removed();
                listeners.is_empty()
            } else {
                false
            }
        });
        if emptied == Some(true) {
            self.fire_watch_hook(false);
        }
    }

    /// Invokes every listener registered for `key`.
    ///
    /// The listener list is snapshotted up front and each entry is re-checked
    /// for membership right before its call, so a listener that adds or
    /// removes listeners mid-notification neither corrupts the iteration nor
    /// resurrects an already-removed entry. A panicking listener is caught
    /// and logged; remaining listeners still run and the panic never reaches
    /// the mutator that triggered the notification.
    pub fn notify(self, key: &Key) {
        let Some(snapshot) = self.with(|meta| meta.listeners.read().snapshot_for(key)) else {
            return;
        };
        for (handler, token) in snapshot {
            let live = self
                .with(|meta| meta.listeners.read().contains(key, &handler, token))
                .unwrap_or(false);
            if !live {
                cov_mark::hit!(notify_skips_removed_listener);
                continue;
            }
            let event = ChangeEvent {
                tracker: self,
                key: key.clone(),
                token,
            };
            if panic::catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
                cov_mark::hit!(listener_fault_isolated);
                tracing::error!(
                    tracker = self.0,
                    key = ?key,
                    "change listener panicked; continuing notification"
                );
            }
        }
    }

    /// Installs the zero/nonzero watch-transition hook for this tracker.
    pub fn set_watch_hook(self, hook: WatchHook) {
        self.with(|meta| {
            *meta.watch_hook.write() = Some(hook);
        });
    }

    /// True while at least one listener is registered.
    pub fn is_watched(self) -> bool {
        self.with(|meta| !meta.listeners.read().is_empty())
            .unwrap_or(false)
    }

    /// Number of currently registered listeners (0 for a stale id).
    pub fn listener_count(self) -> usize {
        self.with(|meta| meta.listeners.read().len()).unwrap_or(0)
    }

    /// Discards per-index listeners at positions `>= len` after a list shrank.
    pub(crate) fn prune_index_listeners(self, len: usize) {
        let emptied = self.with(|meta| {
            let mut listeners = meta.listeners.write();
            let was_empty = listeners.is_empty();
            let dropped = listeners.prune_indices_from(len);
            if dropped > 0 {
                cov_mark::hit!(stale_index_listeners_pruned);
            }
            for _ in 0..dropped {
                metrics::listener_removed();
            }
            !was_empty && listeners.is_empty()
        });
        if emptied == Some(true) {
            self.fire_watch_hook(false);
        }
    }

    fn fire_watch_hook(self, watched: bool) {
        let hook = self.with(|meta| meta.watch_hook.read().clone()).flatten();
        if let Some(hook) = hook {
            hook(watched);
        }
    }
}

/// Owning handle for one arena slot.
///
/// Containers embed a `Tracker`; its drop frees the slot and returns the
/// live-listener metric to balance. Deliberately not `Clone`: two owners of
/// one slot would double-free it.
pub struct Tracker {
    id: TrackerId,
}

impl Tracker {
    /// Allocates a fresh tracker slot.
    pub fn new() -> Self {
        let mut arena = TRACKER_ARENA.write();
        let entry = arena.vacant_entry();
        let id = TrackerId::new(entry.key() as u32);
        entry.insert(TrackerMetadata::default());
        metrics::tracker_created();
        Tracker { id }
    }

    /// The Copy id other parts of the engine address this tracker by.
    pub fn id(&self) -> TrackerId {
        self.id
    }
}

impl Default for Tracker {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Tracker {
    fn drop(&mut self) {
        let mut arena = TRACKER_ARENA.write();
        if arena.contains(self.id.index()) {
            let meta = arena.remove(self.id.index());
            // Listeners that were never unsubscribed die with the tracker;
            // keep the live-listener gauge balanced.
            for _ in 0..meta.listeners.read().len() {
                metrics::listener_removed();
            }
            metrics::tracker_dropped();
        }
    }
}
