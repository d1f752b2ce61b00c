//! Keys addressing one observable slot on a tracked container.
//!
//! A record slot is addressed by property name, a list slot by position, and a
//! list's length by the dedicated [`Key::Length`] channel. Numeric-looking
//! property names and true numeric positions address the same slot: an index
//! is an index regardless of how the caller spells it, so [`Key::parse`]
//! normalizes `"3"` to `Key::Index(3)` and `"length"` to `Key::Length`.

use std::fmt;
use std::sync::Arc;

/// Address of one observable slot on a tracked container.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum Key {
    /// A named property on a tracked record.
    Prop(Arc<str>),
    /// A position in a tracked list.
    Index(usize),
    /// The length channel of a tracked list, distinct from every index.
    Length,
}

impl Key {
    /// Builds a property key from a name, verbatim (no index normalization).
    ///
    /// Records use this: a record property literally named `"3"` stays a
    /// property. List callers should go through [`Key::parse`] instead.
    pub fn prop(name: impl Into<Arc<str>>) -> Self {
        Key::Prop(name.into())
    }

    /// Parses a caller-supplied name with list normalization applied.
    ///
    /// `"length"` becomes [`Key::Length`]; a canonical base-10 integer (no
    /// sign, no leading zero except `"0"` itself) becomes [`Key::Index`];
    /// anything else is a plain property key.
    pub fn parse(name: &str) -> Self {
        if name == "length" {
            return Key::Length;
        }
        if let Some(index) = parse_index(name) {
            return Key::Index(index);
        }
        Key::prop(name)
    }

    /// Returns the position when this key addresses a list slot.
    pub fn index(&self) -> Option<usize> {
        match self {
            Key::Index(i) => Some(*i),
            _ => None,
        }
    }
}

impl From<usize> for Key {
    fn from(index: usize) -> Self {
        Key::Index(index)
    }
}

impl From<&str> for Key {
    fn from(name: &str) -> Self {
        Key::parse(name)
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Prop(name) => write!(f, "Prop({name:?})"),
            Key::Index(i) => write!(f, "Index({i})"),
            Key::Length => write!(f, "Length"),
        }
    }
}

fn parse_index(name: &str) -> Option<usize> {
    if name.is_empty() || (name.len() > 1 && name.starts_with('0')) {
        return None;
    }
    if !name.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    name.parse().ok()
}
