//! Per-type manifests of computed (derived) record keys.
//!
//! Reading a derived key must not register it as a dependency: the derivation
//! reads through to stored keys that register the true dependencies, and a
//! dependent subscribed to the derived key itself would miss invalidation
//! when the underlying state changes via another path. Writes to derived keys
//! are likewise not intercepted; a derived setter is assumed to notify through
//! the stored keys it writes.
//!
//! Which keys are derived is declared once per record type via [`Manifest`]
//! and resolved at wrap time through a cache keyed by `TypeId`, so the
//! declaration is consulted at most once per distinct type.

use std::any::TypeId;
use std::collections::HashSet;
use std::sync::LazyLock;

use papaya::HashMap as PapayaHashMap;

use crate::hash::PackedHashBuilder;

/// Declares, per record type, which keys are computed rather than stored.
pub trait Manifest: 'static {
    /// Names of the computed keys of this type.
    const COMPUTED: &'static [&'static str];
}

/// Resolved manifest for one record type.
pub struct TypeManifest {
    computed: HashSet<&'static str, PackedHashBuilder>,
}

impl TypeManifest {
    /// True when `key` is declared computed for this type.
    pub fn is_computed(&self, key: &str) -> bool {
        self.computed.contains(key)
    }

    /// Number of computed keys declared.
    pub fn len(&self) -> usize {
        self.computed.len()
    }

    /// True when no key is declared computed.
    pub fn is_empty(&self) -> bool {
        self.computed.is_empty()
    }
}

/// Cache: record type -> resolved manifest. Leaked on first resolution so the
/// reference is `'static` and lookups stay lock-free.
static MANIFEST_CACHE: LazyLock<PapayaHashMap<TypeId, &'static TypeManifest>> =
    LazyLock::new(PapayaHashMap::new);

/// Resolves (and caches) the manifest for `S`.
pub fn manifest_for<S: Manifest>() -> &'static TypeManifest {
    let cache = MANIFEST_CACHE.pin();
    *cache.get_or_insert_with(TypeId::of::<S>(), || {
        let mut computed = HashSet::with_hasher(PackedHashBuilder);
        computed.extend(S::COMPUTED.iter().copied());
        Box::leak(Box::new(TypeManifest { computed }))
    })
}
