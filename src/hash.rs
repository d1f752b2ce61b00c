//! Zero-sized hash builder for the crate's internal hash collections.
//!
//! The scope accumulator, the manifest cache and record storage all hash small
//! keys on hot paths. `PackedHashBuilder` wraps foldhash with a fixed seed so
//! those collections carry no per-instance hasher state. HashDoS resistance is
//! not a requirement for any of them.

use std::hash::BuildHasher;

pub use foldhash::fast::{FixedState, FoldHasher};

/// A zero-sized `BuildHasher` backed by foldhash with a constant seed.
///
/// Every instance produces identical hashes, so collections built with it can
/// be compared and rebuilt deterministically in tests.
#[derive(Clone, Copy, Debug, Default)]
pub struct PackedHashBuilder;

impl BuildHasher for PackedHashBuilder {
    type Hasher = FoldHasher<'static>;

    #[inline]
    fn build_hasher(&self) -> Self::Hasher {
        FixedState::with_seed(0x9e37_79b9_7f4a_7c15).build_hasher()
    }
}
