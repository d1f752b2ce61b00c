//! Evaluation scopes and dependency reconciliation.
//!
//! While a dependent evaluates, every tracked read lands in the accumulator
//! of the innermost scope frame on a thread-local stack. The accumulator
//! starts pre-loaded with the dependent's previous dependency list, all
//! entries unconfirmed; a read of a previously-held dependency confirms it
//! (so it is never torn down and recreated), a read of a new pair is marked
//! fresh. Ending the scope unsubscribes what stayed unconfirmed, subscribes
//! what is fresh, and hands back the compacted list - O(previous + current)
//! overall, correct under arbitrary nesting because frames strictly push and
//! pop.
//!
//! [`Observer`] wraps the begin/end bracket in a drop guard so reconciliation
//! runs even when the evaluated body panics; the panic itself propagates to
//! the caller unchanged.

use std::cell::RefCell;
use std::mem;

use indexmap::map::Entry;
use indexmap::IndexMap;

use crate::arena::{ChangeHandler, Token, TrackerId};
use crate::hash::PackedHashBuilder;
use crate::key::Key;
use crate::metrics;

/// One (key, tracker) pair a dependent read during evaluation.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct Dependency {
    /// The slot that was read.
    pub key: Key,
    /// Tracker of the container the slot lives on.
    pub tracker: TrackerId,
}

/// Ordered, compacted set of a dependent's current dependencies.
///
/// Owned exclusively by one dependent and rebuilt on every re-evaluation.
/// After reconciliation it holds exactly the pairs observed in the most
/// recent round, each backed by exactly one live listener registration for
/// the dependent's (handler, token).
#[derive(Default, Debug)]
pub struct DependencyList {
    entries: Vec<Dependency>,
}

impl DependencyList {
    /// An empty list, for a dependent that has not evaluated yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of dependencies held.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no dependency is held.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates the held dependencies in observation order.
    pub fn iter(&self) -> impl Iterator<Item = &Dependency> {
        self.entries.iter()
    }
}

enum Mark {
    /// Held last round, not seen yet this round.
    Stale,
    /// Held last round and seen again; keep the existing registration.
    Confirmed,
    /// Not held last round; needs a new registration.
    Fresh,
}

enum Frame {
    Tracking(IndexMap<Dependency, Mark, PackedHashBuilder>),
    /// Pushed by [`untracked`]; reads under it register nothing.
    Muted,
}

thread_local! {
    static SCOPE_STACK: RefCell<Vec<Frame>> = const { RefCell::new(Vec::new()) };
}

/// Opens an evaluation scope for a dependent, seeding the accumulator with
/// its previous dependency list.
///
/// Must be balanced by [`end_evaluation`] on the same thread; nesting is
/// allowed and frames restore strictly. Prefer [`Observer::observe`], which
/// guarantees the balance even across panics.
pub fn begin_evaluation(previous: DependencyList) {
    metrics::evaluation_started();
    let mut entries =
        IndexMap::with_capacity_and_hasher(previous.entries.len(), PackedHashBuilder);
    for dep in previous.entries {
        entries.insert(dep, Mark::Stale);
    }
    SCOPE_STACK.with(|stack| stack.borrow_mut().push(Frame::Tracking(entries)));
}

/// Closes the innermost evaluation scope and reconciles subscriptions.
///
/// Dependencies that stayed unconfirmed are unsubscribed from their trackers;
/// fresh ones are subscribed under (`handler`, `token`). Returns the new
/// compacted dependency list for the dependent to keep until its next round.
pub fn end_evaluation(handler: &ChangeHandler, token: Token) -> DependencyList {
    let frame = SCOPE_STACK.with(|stack| stack.borrow_mut().pop());
    let Some(Frame::Tracking(entries)) = frame else {
        debug_assert!(false, "end_evaluation without a matching begin_evaluation");
        return DependencyList::default();
    };

    let mut kept = Vec::with_capacity(entries.len());
    for (dep, mark) in entries {
        match mark {
            Mark::Stale => dep.tracker.remove_listener(&dep.key, handler, token),
            Mark::Confirmed => kept.push(dep),
            Mark::Fresh => {
                dep.tracker.add_listener(dep.key.clone(), handler, token);
                kept.push(dep);
            }
        }
    }
    DependencyList { entries: kept }
}

/// Called by tracked containers on every instrumented read.
pub(crate) fn record_access(key: Key, tracker: TrackerId) {
    SCOPE_STACK.with(|stack| {
        let mut stack = stack.borrow_mut();
        let Some(Frame::Tracking(entries)) = stack.last_mut() else {
            return;
        };
        match entries.entry(Dependency { key, tracker }) {
            Entry::Occupied(mut slot) => {
                if matches!(slot.get(), Mark::Stale) {
                    cov_mark::hit!(dependency_confirmed_in_place);
                    *slot.get_mut() = Mark::Confirmed;
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(Mark::Fresh);
            }
        }
    });
}

/// Runs `body` with dependency capture muted.
///
/// Reads inside register nothing for the enclosing dependent; a nested
/// [`begin_evaluation`] inside `body` still tracks normally for its own
/// scope. This is the one-shot, non-accumulating evaluation form.
pub fn untracked<R>(body: impl FnOnce() -> R) -> R {
    struct PopMuted;
    impl Drop for PopMuted {
        fn drop(&mut self) {
            SCOPE_STACK.with(|stack| {
                stack.borrow_mut().pop();
            });
        }
    }

    SCOPE_STACK.with(|stack| stack.borrow_mut().push(Frame::Muted));
    let _guard = PopMuted;
    body()
}

/// Unconditionally removes every listener in `list` for (`handler`, `token`).
///
/// The teardown path for a dependent that is permanently going away; safe to
/// call with listeners that were already removed elsewhere.
pub fn clear_dependencies(handler: &ChangeHandler, token: Token, list: DependencyList) {
    metrics::dependencies_cleared();
    for dep in list.entries {
        dep.tracker.remove_listener(&dep.key, handler, token);
    }
}

/// A dependent: a change handler plus the dependency list its evaluations
/// maintain.
///
/// `observe` brackets one evaluation; afterwards exactly the (key, tracker)
/// pairs the body read hold live listeners for this observer's (handler,
/// token). Re-running the evaluation in response to a notification is the
/// caller's job (typically via an external batching scheduler); dropping the
/// observer tears every registration down.
pub struct Observer {
    handler: ChangeHandler,
    token: Token,
    deps: DependencyList,
}

impl Observer {
    /// Creates an observer with a process-unique token.
    pub fn new(handler: ChangeHandler) -> Self {
        Self::with_token(handler, Token::unique())
    }

    /// Creates an observer with a caller-chosen token.
    pub fn with_token(handler: ChangeHandler, token: Token) -> Self {
        Observer {
            handler,
            token,
            deps: DependencyList::new(),
        }
    }

    /// Evaluates `body` in a fresh scope and reconciles subscriptions.
    ///
    /// Reconciliation runs on the unwind path too: a panicking body leaves
    /// the observer subscribed to exactly what it read before panicking, and
    /// the panic then propagates unchanged.
    pub fn observe<R>(&mut self, body: impl FnOnce() -> R) -> R {
        struct Reconcile<'a> {
            observer: &'a mut Observer,
        }
        impl Drop for Reconcile<'_> {
            fn drop(&mut self) {
                self.observer.deps =
                    end_evaluation(&self.observer.handler, self.observer.token);
            }
        }

        begin_evaluation(mem::take(&mut self.deps));
        let _guard = Reconcile { observer: self };
        body()
    }

    /// Removes every live registration; the observer can observe again later.
    pub fn disconnect(&mut self) {
        clear_dependencies(&self.handler, self.token, mem::take(&mut self.deps));
    }

    /// Number of dependencies held after the most recent evaluation.
    pub fn dependency_count(&self) -> usize {
        self.deps.len()
    }

    /// The dependencies held after the most recent evaluation.
    pub fn dependencies(&self) -> &DependencyList {
        &self.deps
    }

    /// The token this observer registers listeners under.
    pub fn token(&self) -> Token {
        self.token
    }
}

impl Drop for Observer {
    fn drop(&mut self) {
        if !self.deps.is_empty() {
            self.disconnect();
        }
    }
}
