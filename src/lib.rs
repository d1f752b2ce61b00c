#![deny(missing_docs)]

//! Fine-grained dependency tracking and change propagation for keyed data.
//!
//! This crate is the reactivity kernel of a UI-control stack: it observes
//! reads and writes on keyed containers, records which slots a dependent
//! evaluation touched, and re-notifies that dependent exactly when one of its
//! recorded dependencies changes. Subscribe/unsubscribe is O(1) amortized and
//! teardown leaves no listener behind.
//!
//! # Quick Start
//!
//! ```ignore
//! use propwatch::{Observer, TrackedRecord};
//! use std::sync::Arc;
//!
//! let mut user = TrackedRecord::wrap([("name", "ada".to_string())]);
//!
//! // A dependent: re-run scheduling is up to you (or your batching layer).
//! let mut greeting = Observer::new(Arc::new(|event| {
//!     println!("{:?} changed", event.key);
//! }));
//!
//! // Reads inside observe() become the observer's dependency set.
//! greeting.observe(|| {
//!     let _ = user.get("name");
//! });
//!
//! user.set("name", "grace".to_string()); // listener fires
//! user.set("name", "grace".to_string()); // unchanged: suppressed
//! ```
//!
//! # Core Types
//!
//! - [`TrackedRecord`] - keyed object view: reads register, writes notify on
//!   change, deletes always notify, computed keys (via [`Manifest`]) are
//!   transparent to tracking.
//! - [`TrackedList`] - sequence view: per-index and length channels plus one
//!   coarse [`Splice`] event per structural mutation.
//! - [`Observer`] - a dependent; [`Observer::observe`] brackets an evaluation
//!   and reconciles subscriptions to exactly what was read.
//! - [`Tracker`] / [`TrackerId`] - the listener registry behind every view.
//!
//! # Evaluation scopes
//!
//! Scopes nest on a thread-local stack: an evaluation triggered from inside
//! another dependent's handler cannot corrupt the outer accumulator, and
//! reconciliation runs even when the evaluated body panics. [`untracked`]
//! runs a closure with capture muted for one-shot reads.
//!
//! # What this crate does not do
//!
//! Re-running dependents is the caller's job: listeners fire synchronously on
//! the mutating call, and coalescing bursts of changes into one re-evaluation
//! belongs to an external batching scheduler. There is no rendering, no
//! expression parsing, and no persistence here.

mod arena;
mod hash;
mod key;
mod list;
mod manifest;
mod record;
mod registry;
mod scope;

pub mod metrics;

pub use arena::{ChangeEvent, ChangeHandler, Token, Tracker, TrackerId, WatchHook};
pub use key::Key;
pub use list::{OutOfBounds, Removed, Splice, SpliceHandler, TrackedIter, TrackedList};
pub use manifest::{manifest_for, Manifest, TypeManifest};
pub use record::TrackedRecord;
pub use scope::{
    begin_evaluation, clear_dependencies, end_evaluation, untracked, Dependency, DependencyList,
    Observer,
};
