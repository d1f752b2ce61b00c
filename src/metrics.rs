//! Process-wide instrumentation counters.
//!
//! Diagnostic only: nothing in the engine reads these to make decisions. They
//! move exactly at tracker creation/drop, listener add/remove, evaluation
//! begin, and dependency-clear, which is what makes them usable for leak
//! detection in tests ("after disconnect the live-listener gauge is back
//! where it started").

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

static LIVE_TRACKERS: AtomicUsize = AtomicUsize::new(0);
static LIVE_LISTENERS: AtomicUsize = AtomicUsize::new(0);
static EVALUATIONS_STARTED: AtomicU64 = AtomicU64::new(0);
static DEPENDENCY_CLEARS: AtomicU64 = AtomicU64::new(0);

pub(crate) fn tracker_created() {
    LIVE_TRACKERS.fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn tracker_dropped() {
    LIVE_TRACKERS.fetch_sub(1, Ordering::Relaxed);
}

pub(crate) fn listener_added() {
    LIVE_LISTENERS.fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn listener_removed() {
    LIVE_LISTENERS.fetch_sub(1, Ordering::Relaxed);
}

pub(crate) fn evaluation_started() {
    EVALUATIONS_STARTED.fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn dependencies_cleared() {
    DEPENDENCY_CLEARS.fetch_add(1, Ordering::Relaxed);
}

/// Number of trackers currently alive.
pub fn live_trackers() -> usize {
    LIVE_TRACKERS.load(Ordering::Relaxed)
}

/// Number of listener registrations currently alive across all trackers.
pub fn live_listeners() -> usize {
    LIVE_LISTENERS.load(Ordering::Relaxed)
}

/// Total evaluations begun since process start.
pub fn evaluations_started() -> u64 {
    EVALUATIONS_STARTED.load(Ordering::Relaxed)
}

/// Total dependency-clear teardowns since process start.
pub fn dependency_clears() -> u64 {
    DEPENDENCY_CLEARS.load(Ordering::Relaxed)
}

/// Point-in-time copy of every counter.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Snapshot {
    /// Trackers currently alive.
    pub live_trackers: usize,
    /// Listener registrations currently alive.
    pub live_listeners: usize,
    /// Evaluations begun since process start.
    pub evaluations_started: u64,
    /// Dependency-clear teardowns since process start.
    pub dependency_clears: u64,
}

/// Reads all counters at once (each load is individually atomic).
pub fn snapshot() -> Snapshot {
    Snapshot {
        live_trackers: live_trackers(),
        live_listeners: live_listeners(),
        evaluations_started: evaluations_started(),
        dependency_clears: dependency_clears(),
    }
}
