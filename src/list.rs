//! Ordered-sequence change tracker.
//!
//! A [`TrackedList`] carries the record contract specialized for sequences,
//! plus a coarse structural channel: every mutator is expressed as a single
//! logical [`Splice`] `(index, inserted, deleted, removed)` delivered to
//! whole-list structural listeners before any fine-grained notification.
//!
//! Fine-grained policy after a structural change:
//! - pure in-place replacement (`inserted == deleted`): each affected index
//!   is notified individually;
//! - length changed: every index from the splice start through the end of the
//!   longer extent is notified, because index identity (not value identity)
//!   is what listeners bind to, and then per-index listeners stranded beyond
//!   the new length are discarded;
//! - the dedicated length channel fires whenever the length changed.

use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::slice;
use std::sync::Arc;

use crate::arena::{Tracker, TrackerId, WatchHook};
use crate::key::Key;
use crate::scope::record_access;

/// Elements removed by a structural change.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Removed<T> {
    /// Nothing was removed.
    None,
    /// Exactly one element was removed.
    One(T),
    /// Two or more elements were removed, in their original order.
    Many(Vec<T>),
}

impl<T> Removed<T> {
    fn from_vec(mut removed: Vec<T>) -> Self {
        match removed.len() {
            0 => Removed::None,
            1 => Removed::One(removed.pop().expect("len checked")),
            _ => Removed::Many(removed),
        }
    }

    /// The removed elements as a slice, in removal order.
    pub fn as_slice(&self) -> &[T] {
        match self {
            Removed::None => &[],
            Removed::One(value) => slice::from_ref(value),
            Removed::Many(values) => values,
        }
    }

    /// Number of removed elements.
    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    /// True when nothing was removed.
    pub fn is_empty(&self) -> bool {
        matches!(self, Removed::None)
    }

    /// Consumes the payload into a plain vector.
    pub fn into_vec(self) -> Vec<T> {
        match self {
            Removed::None => Vec::new(),
            Removed::One(value) => vec![value],
            Removed::Many(values) => values,
        }
    }
}

/// One logical structural change to a tracked list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Splice<T> {
    /// First index the change touches.
    pub index: usize,
    /// Number of elements inserted at `index`.
    pub inserted: usize,
    /// Number of elements deleted at `index`.
    pub deleted: usize,
    /// The deleted elements themselves.
    pub removed: Removed<T>,
}

/// A whole-list structural listener.
pub type SpliceHandler<T> = Arc<dyn Fn(&Splice<T>) + Send + Sync>;

/// Rejected explicit index operation outside `[0, len)`.
///
/// Index-style writes never grow a list; `set_len` is the one sanctioned
/// growth/shrink path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("index {index} out of bounds for tracked list of length {len}")]
pub struct OutOfBounds {
    /// The rejected index.
    pub index: usize,
    /// List length at the time of the operation.
    pub len: usize,
}

/// Instrumented view over an ordered sequence of values.
pub struct TrackedList<T> {
    items: Vec<T>,
    structural: Vec<SpliceHandler<T>>,
    tracker: Tracker,
}

impl<T: PartialEq> TrackedList<T> {
    /// Wraps the given elements.
    pub fn wrap(items: Vec<T>) -> Self {
        TrackedList {
            items,
            structural: Vec::new(),
            tracker: Tracker::new(),
        }
    }

    /// The tracker backing this view.
    pub fn tracker(&self) -> TrackerId {
        self.tracker.id()
    }

    /// Installs the zero/nonzero watch-transition hook.
    pub fn on_watched(&self, hook: WatchHook) {
        self.tracker.id().set_watch_hook(hook);
    }

    /// Current length, registered with the evaluation scope under the
    /// dedicated length channel.
    pub fn len(&self) -> usize {
        record_access(Key::Length, self.tracker.id());
        self.items.len()
    }

    /// True when the list is empty (registers the length channel).
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reads the element at `index`, registering `(index, tracker)`.
    ///
    /// An out-of-range index yields `None` but is still registered, so a
    /// dependent re-runs when the list later grows over it.
    pub fn get(&self, index: usize) -> Option<&T> {
        record_access(Key::Index(index), self.tracker.id());
        self.items.get(index)
    }

    /// Iterates elements, registering the length channel once and each
    /// visited index individually.
    pub fn iter(&self) -> TrackedIter<'_, T> {
        record_access(Key::Length, self.tracker.id());
        TrackedIter {
            tracker: self.tracker.id(),
            next: 0,
            items: &self.items,
        }
    }

    /// Replaces the element at `index`.
    ///
    /// An in-range write of a different value is one structural change
    /// `(index, 1, 1)` followed by a notification of that index. An equal
    /// value is stored without any event; an out-of-range index is rejected.
    pub fn set(&mut self, index: usize, value: T) -> Result<(), OutOfBounds> {
        let len = self.items.len();
        if index >= len {
            return Err(OutOfBounds { index, len });
        }
        if self.items[index] == value {
            cov_mark::hit!(unchanged_slot_write_suppressed);
            self.items[index] = value;
            return Ok(());
        }
        let old = mem::replace(&mut self.items[index], value);
        let event = Splice {
            index,
            inserted: 1,
            deleted: 1,
            removed: Removed::One(old),
        };
        self.emit(&event, len, len);
        Ok(())
    }

    /// Appends an element.
    pub fn push(&mut self, value: T) {
        let at = self.items.len();
        self.apply_splice(at, 0, vec![value]);
    }

    /// Removes and returns the last element.
    pub fn pop(&mut self) -> Option<T> {
        let len = self.items.len();
        if len == 0 {
            return None;
        }
        self.apply_splice(len - 1, 1, Vec::new()).pop()
    }

    /// Removes and returns the first element.
    pub fn shift(&mut self) -> Option<T> {
        if self.items.is_empty() {
            return None;
        }
        self.apply_splice(0, 1, Vec::new()).pop()
    }

    /// Inserts an element at the front.
    pub fn unshift(&mut self, value: T) {
        self.apply_splice(0, 0, vec![value]);
    }

    /// Removes `delete_count` elements at `start` and inserts `items` there,
    /// returning the removed elements.
    ///
    /// `start` and `delete_count` are clamped to the current extent, matching
    /// splice semantics; the whole mutation is one structural change.
    pub fn splice(&mut self, start: usize, delete_count: usize, items: Vec<T>) -> Vec<T> {
        let len = self.items.len();
        let start = start.min(len);
        let delete_count = delete_count.min(len - start);
        self.apply_splice(start, delete_count, items)
    }

    /// Subscribes a whole-list structural listener.
    pub fn add_structural_listener(&mut self, handler: &SpliceHandler<T>) {
        self.structural.push(Arc::clone(handler));
    }

    /// Unsubscribes a structural listener by handler identity; no-op when
    /// absent.
    pub fn remove_structural_listener(&mut self, handler: &SpliceHandler<T>) {
        if let Some(at) = self
            .structural
            .iter()
            .position(|stored| Arc::ptr_eq(stored, handler))
        {
            self.structural.swap_remove(at);
        }
    }

    fn apply_splice(&mut self, start: usize, delete_count: usize, items: Vec<T>) -> Vec<T> {
        let old_len = self.items.len();
        let inserted = items.len();
        let removed: Vec<T> = self.items.splice(start..start + delete_count, items).collect();
        if inserted == 0 && removed.is_empty() {
            return removed;
        }
        let new_len = self.items.len();
        let event = Splice {
            index: start,
            inserted,
            deleted: removed.len(),
            removed: Removed::from_vec(removed),
        };
        self.emit(&event, old_len, new_len);
        event.removed.into_vec()
    }

    /// Delivers one structural change: structural listeners first, then the
    /// fine-grained per-index and length channels, then stale-bucket pruning.
    fn emit(&mut self, event: &Splice<T>, old_len: usize, new_len: usize) {
        // Snapshot so a listener that unsubscribes a sibling cannot
        // invalidate the iteration in progress.
        let snapshot = self.structural.clone();
        for handler in snapshot {
            if panic::catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
                tracing::error!(
                    index = event.index,
                    inserted = event.inserted,
                    deleted = event.deleted,
                    "structural listener panicked; continuing notification"
                );
            }
        }

        let id = self.tracker.id();
        if event.inserted == event.deleted {
            for index in event.index..event.index + event.inserted {
                id.notify(&Key::Index(index));
            }
        } else {
            // Every subsequent index identity shifted.
            for index in event.index..old_len.max(new_len) {
                id.notify(&Key::Index(index));
            }
        }
        if old_len != new_len {
            id.notify(&Key::Length);
        }
        if new_len < old_len {
            id.prune_index_listeners(new_len);
        }
    }
}

impl<T: PartialEq + Default> TrackedList<T> {
    /// Assigns the length directly - the sole sanctioned growth/shrink path.
    ///
    /// Shrinking produces the same structural shape as the equivalent
    /// trailing splice; growing inserts default-valued slots.
    pub fn set_len(&mut self, len: usize) {
        let current = self.items.len();
        if len < current {
            self.apply_splice(len, current - len, Vec::new());
        } else if len > current {
            let fill = (current..len).map(|_| T::default()).collect();
            self.apply_splice(current, 0, fill);
        }
    }
}

/// Iterator over a tracked list that registers each visited index.
pub struct TrackedIter<'a, T> {
    tracker: TrackerId,
    next: usize,
    items: &'a [T],
}

impl<'a, T> Iterator for TrackedIter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.items.get(self.next)?;
        record_access(Key::Index(self.next), self.tracker);
        self.next += 1;
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let rest = self.items.len() - self.next;
        (rest, Some(rest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::{ChangeHandler, Token};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn shape_log<T>() -> (SpliceHandler<T>, Arc<Mutex<Vec<(usize, usize, usize)>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = log.clone();
        let handler: SpliceHandler<T> = Arc::new(move |splice: &Splice<T>| {
            sink.lock()
                .push((splice.index, splice.inserted, splice.deleted));
        });
        (handler, log)
    }

    #[test]
    fn splice_emits_one_structural_event() {
        let mut list = TrackedList::wrap(vec![1, 5, 3]);
        let (handler, log) = shape_log();
        list.add_structural_listener(&handler);

        let removed = list.splice(2, 1, vec![6, 7]);
        assert_eq!(removed, vec![3]);
        assert_eq!(log.lock().as_slice(), &[(2, 2, 1)]);
        assert_eq!(list.get(2), Some(&6));
        assert_eq!(list.get(3), Some(&7));
    }

    #[test]
    fn single_slot_replace_is_a_one_for_one_splice() {
        let mut list = TrackedList::wrap(vec![1, 2, 3]);
        let (handler, log) = shape_log();
        list.add_structural_listener(&handler);

        list.set(1, 5).unwrap();
        assert_eq!(log.lock().as_slice(), &[(1, 1, 1)]);
    }

    #[test]
    fn removed_payload_shapes() {
        let mut list = TrackedList::wrap(vec![1, 2, 3, 4]);
        let removed_none: Vec<i32> = list.splice(1, 0, vec![9]);
        assert!(removed_none.is_empty());

        let mut list = TrackedList::wrap(vec![1, 2, 3, 4]);
        let (handler, _log) = shape_log::<i32>();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let payload: SpliceHandler<i32> = Arc::new(move |splice| {
            sink.lock().push(splice.removed.clone());
        });
        list.add_structural_listener(&handler);
        list.add_structural_listener(&payload);

        list.push(5);
        list.pop();
        list.splice(0, 2, Vec::new());
        let seen = seen.lock();
        assert_eq!(seen[0], Removed::None);
        assert_eq!(seen[1], Removed::One(5));
        assert_eq!(seen[2], Removed::Many(vec![1, 2]));
    }

    #[test]
    fn length_change_notifies_shifted_indices_and_length() {
        let mut list = TrackedList::wrap(vec![10, 20, 30]);
        let hits = Arc::new(Mutex::new(Vec::new()));
        let sink = hits.clone();
        let handler: ChangeHandler = Arc::new(move |event| {
            sink.lock().push(event.key);
        });
        for index in 0..3 {
            list.tracker()
                .add_listener(Key::Index(index), &handler, Token::new(index as u64));
        }
        list.tracker()
            .add_listener(Key::Length, &handler, Token::new(9));

        // Removing index 1 shifts index 2; index 0 is untouched.
        list.splice(1, 1, Vec::new());
        let hits = hits.lock();
        assert!(hits.contains(&Key::Index(1)));
        assert!(hits.contains(&Key::Index(2)));
        assert!(hits.contains(&Key::Length));
        assert!(!hits.contains(&Key::Index(0)));
    }

    #[test]
    fn shrink_prunes_stale_index_listeners() {
        cov_mark::check!(stale_index_listeners_pruned);
        let mut list = TrackedList::wrap(vec![1, 2, 3]);
        let handler: ChangeHandler = Arc::new(|_| {});
        list.tracker()
            .add_listener(Key::Index(2), &handler, Token::new(1));

        list.set_len(1);
        assert_eq!(list.tracker().listener_count(), 0);
    }

    #[test]
    fn out_of_range_set_is_rejected() {
        let mut list = TrackedList::wrap(vec![1]);
        assert_eq!(
            list.set(3, 9),
            Err(OutOfBounds { index: 3, len: 1 })
        );
        assert_eq!(list.get(3), None);
    }

    #[test]
    fn unchanged_slot_write_fires_nothing() {
        cov_mark::check!(unchanged_slot_write_suppressed);
        let mut list = TrackedList::wrap(vec![7]);
        let (handler, log) = shape_log();
        list.add_structural_listener(&handler);
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let keyed: ChangeHandler = Arc::new(move |_| {
            h.fetch_add(1, Ordering::Relaxed);
        });
        list.tracker()
            .add_listener(Key::Index(0), &keyed, Token::new(1));

        list.set(0, 7).unwrap();
        assert!(log.lock().is_empty());
        assert_eq!(hits.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn set_len_growth_inserts_default_slots() {
        let mut list = TrackedList::wrap(vec![1]);
        let (handler, log) = shape_log();
        list.add_structural_listener(&handler);

        list.set_len(3);
        assert_eq!(log.lock().as_slice(), &[(1, 2, 0)]);
        assert_eq!(list.get(2), Some(&0));
    }

    #[test]
    fn shift_and_unshift_are_front_splices() {
        let mut list = TrackedList::wrap(vec![2, 3]);
        let (handler, log) = shape_log();
        list.add_structural_listener(&handler);

        list.unshift(1);
        assert_eq!(list.shift(), Some(1));
        assert_eq!(log.lock().as_slice(), &[(0, 1, 0), (0, 0, 1)]);
    }

    #[test]
    fn structural_listener_removal_is_noop_when_absent() {
        let mut list = TrackedList::wrap(vec![1]);
        let (handler, log) = shape_log();
        list.remove_structural_listener(&handler);
        list.add_structural_listener(&handler);
        list.remove_structural_listener(&handler);

        list.push(2);
        assert!(log.lock().is_empty());
    }
}
