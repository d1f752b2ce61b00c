//! Keyed-record change tracker.
//!
//! A [`TrackedRecord`] is the instrumented view of a plain keyed object:
//! reads register the current evaluation as a dependent of the key, writes
//! notify the key's listeners when the value actually changed, and deletes
//! always notify. Values stay inline in the record; only listener state lives
//! in the tracker arena.

use std::collections::HashMap;
use std::sync::Arc;

use crate::arena::{Tracker, TrackerId, WatchHook};
use crate::hash::PackedHashBuilder;
use crate::key::Key;
use crate::manifest::{manifest_for, Manifest, TypeManifest};
use crate::scope::record_access;

/// Instrumented view over a keyed set of values.
pub struct TrackedRecord<T> {
    values: HashMap<Arc<str>, T, PackedHashBuilder>,
    manifest: Option<&'static TypeManifest>,
    tracker: Tracker,
}

impl<T: PartialEq> TrackedRecord<T> {
    /// Wraps the given entries with no computed-key manifest.
    ///
    /// The record is agnostic to value shape; any `PartialEq` value type
    /// works, including an empty entry set.
    pub fn wrap<K, I>(entries: I) -> Self
    where
        K: Into<Arc<str>>,
        I: IntoIterator<Item = (K, T)>,
    {
        TrackedRecord {
            values: entries
                .into_iter()
                .map(|(key, value)| (key.into(), value))
                .collect(),
            manifest: None,
            tracker: Tracker::new(),
        }
    }

    /// Wraps entries under the computed-key manifest declared by `S`.
    ///
    /// The manifest is resolved once per distinct `S` and cached by type
    /// identity. Keys it declares computed hold no storage here: reads of
    /// them register nothing (the derivation's reads of stored keys register
    /// the true dependencies) and writes to them notify nothing (a derived
    /// setter notifies through the stored keys it writes).
    pub fn wrap_typed<S, K, I>(entries: I) -> Self
    where
        S: Manifest,
        K: Into<Arc<str>>,
        I: IntoIterator<Item = (K, T)>,
    {
        let mut record = Self::wrap(entries);
        record.manifest = Some(manifest_for::<S>());
        record
    }

    /// The tracker backing this view.
    pub fn tracker(&self) -> TrackerId {
        self.tracker.id()
    }

    /// Installs the zero/nonzero watch-transition hook.
    pub fn on_watched(&self, hook: WatchHook) {
        self.tracker.id().set_watch_hook(hook);
    }

    /// Reads `key`, registering it with the current evaluation scope.
    ///
    /// An absent key is still registered: a dependent that read nothing today
    /// must hear about the key appearing tomorrow. Computed keys return
    /// `None` and register nothing.
    pub fn get(&self, key: &str) -> Option<&T> {
        if self.is_computed(key) {
            return None;
        }
        match self.values.get_key_value(key) {
            Some((name, value)) => {
                record_access(Key::Prop(name.clone()), self.tracker.id());
                Some(value)
            }
            None => {
                record_access(Key::prop(key), self.tracker.id());
                None
            }
        }
    }

    /// Writes `key`, notifying its listeners when the value changed.
    ///
    /// An equal value is still stored but fires no notification. Writes to
    /// computed keys are not intercepted and store nothing.
    pub fn set(&mut self, key: impl Into<Arc<str>>, value: T) {
        let name: Arc<str> = key.into();
        if self.is_computed(&name) {
            return;
        }
        match self.values.get_mut(&name) {
            Some(slot) => {
                if *slot == value {
                    cov_mark::hit!(unchanged_write_suppressed);
                    *slot = value;
                    return;
                }
                *slot = value;
            }
            None => {
                self.values.insert(Arc::clone(&name), value);
            }
        }
        self.tracker.id().notify(&Key::Prop(name));
    }

    /// Deletes `key` and always notifies it - deletion is itself the change.
    pub fn remove(&mut self, key: &str) -> Option<T> {
        let removed = self.values.remove_entry(key);
        let name = match &removed {
            Some((name, _)) => Arc::clone(name),
            None => Arc::from(key),
        };
        self.tracker.id().notify(&Key::Prop(name));
        removed.map(|(_, value)| value)
    }

    /// True when `key` currently holds a stored value. Registers the key like
    /// a read, since presence is observable state.
    pub fn contains_key(&self, key: &str) -> bool {
        if self.is_computed(key) {
            return false;
        }
        record_access(Key::prop(key), self.tracker.id());
        self.values.contains_key(key)
    }

    /// Iterates the stored key names (not tracked).
    pub fn keys(&self) -> impl Iterator<Item = &Arc<str>> {
        self.values.keys()
    }

    /// Number of stored entries (not tracked).
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True when no entry is stored.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn is_computed(&self, key: &str) -> bool {
        self.manifest.is_some_and(|manifest| manifest.is_computed(key))
    }
}
