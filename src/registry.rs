//! Packed listener storage for one tracker.
//!
//! Listeners are (key, handler, token) triples held in three parallel vectors.
//! Registration and removal are linear scans over small vectors with
//! swap-removal, so no per-listener allocation happens beyond the handler
//! `Arc` the caller already holds. Notification never iterates this storage
//! directly: callers take a [`ListenerSet::snapshot_for`] copy first, then
//! re-check membership per entry, so a listener that mutates the set while
//! being notified cannot invalidate an iteration in progress.

use std::sync::Arc;

use crate::arena::{ChangeHandler, Token};
use crate::key::Key;

/// Packed (key, handler, token) triples for a single tracker.
///
/// A listener is identified by key equality, handler pointer identity
/// (`Arc::ptr_eq`) and token equality. Duplicate triples are permitted at this
/// layer; the scope reconciliation algorithm guarantees well-behaved
/// dependents never register the same key twice on one tracker.
#[derive(Default)]
pub(crate) struct ListenerSet {
    keys: Vec<Key>,
    handlers: Vec<ChangeHandler>,
    tokens: Vec<Token>,
}

impl ListenerSet {
    pub(crate) fn add(&mut self, key: Key, handler: ChangeHandler, token: Token) {
        self.keys.push(key);
        self.handlers.push(handler);
        self.tokens.push(token);
    }

    /// Removes the first matching triple. Returns false when absent (removal
    /// is unconditional cleanup for callers, never an error).
    pub(crate) fn remove(&mut self, key: &Key, handler: &ChangeHandler, token: Token) -> bool {
        match self.position(key, handler, token) {
            Some(at) => {
                self.keys.swap_remove(at);
                self.handlers.swap_remove(at);
                self.tokens.swap_remove(at);
                true
            }
            None => false,
        }
    }

    pub(crate) fn contains(&self, key: &Key, handler: &ChangeHandler, token: Token) -> bool {
        self.position(key, handler, token).is_some()
    }

    /// Clones the (handler, token) pairs registered for `key`, in storage
    /// order. The copy is what notification iterates.
    pub(crate) fn snapshot_for(&self, key: &Key) -> Vec<(ChangeHandler, Token)> {
        let mut out = Vec::new();
        for (at, stored) in self.keys.iter().enumerate() {
            if stored == key {
                out.push((Arc::clone(&self.handlers[at]), self.tokens[at]));
            }
        }
        out
    }

    /// Drops every per-index triple at positions at or beyond `len`.
    ///
    /// Called after a list shrinks; buckets past the new length are stale.
    /// Returns how many triples were discarded.
    pub(crate) fn prune_indices_from(&mut self, len: usize) -> usize {
        let mut dropped = 0;
        let mut at = 0;
        while at < self.keys.len() {
            if matches!(self.keys[at], Key::Index(i) if i >= len) {
                self.keys.swap_remove(at);
                self.handlers.swap_remove(at);
                self.tokens.swap_remove(at);
                dropped += 1;
            } else {
                at += 1;
            }
        }
        dropped
    }

    pub(crate) fn len(&self) -> usize {
        self.keys.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    fn position(&self, key: &Key, handler: &ChangeHandler, token: Token) -> Option<usize> {
        self.keys.iter().enumerate().position(|(at, stored)| {
            stored == key && Arc::ptr_eq(&self.handlers[at], handler) && self.tokens[at] == token
        })
    }
}
