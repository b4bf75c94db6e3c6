//! Tag vocabulary and propagation rules (§3, §6.5).
//!
//! Labels are an open set: collaborators must tolerate unknown tokens,
//! so this module does not enumerate every valid label, only the
//! container semantics (an idempotent, order-independent set of short
//! ASCII tags) and a handful of well-known constants used across
//! multiple parsers.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Reserved, frequently-reused label tokens. Parsers are free to push
/// any other short ASCII string; these just save typos at call sites.
pub mod well_known {
    pub const GRAPHICS: &str = "graphics";
    pub const AUDIO: &str = "audio";
    pub const VIDEO: &str = "video";
    pub const FILESYSTEM: &str = "filesystem";
    pub const COMPRESSED: &str = "compressed";
    pub const RESOURCE: &str = "resource";
    pub const ANDROID: &str = "android";
    pub const APPLE: &str = "apple";
    pub const DAHUA: &str = "dahua";
    pub const UNPACKED: &str = "unpacked";
    pub const ANIMATED: &str = "animated";
    pub const APNG: &str = "apng";
    pub const STEREO: &str = "stereo";
    pub const NINEPATCH: &str = "ninepatch";
    pub const ENCRYPTED: &str = "encrypted";
    pub const APK: &str = "apk";
}

/// An unordered, idempotent set of short ASCII tags.
///
/// Backed by a `BTreeSet` so that two label sets built in different
/// insertion orders compare equal and serialize deterministically —
/// label determinism (§8, property 6) must not depend on insertion
/// order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelSet(BTreeSet<String>);

impl LabelSet {
    pub fn new() -> Self {
        LabelSet::default()
    }

    pub fn from_iter<I, S>(iter: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = LabelSet::new();
        for item in iter {
            set.add(item);
        }
        set
    }

    /// Duplicate adds are no-ops (§3 invariant 5).
    pub fn add(&mut self, label: impl Into<String>) -> &mut Self {
        self.0.insert(label.into());
        self
    }

    pub fn merge(&mut self, other: &LabelSet) -> &mut Self {
        for label in &other.0 {
            self.0.insert(label.clone());
        }
        self
    }

    pub fn contains(&self, label: &str) -> bool {
        self.0.contains(label)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl std::fmt::Display for LabelSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{{}}}", self.0.iter().cloned().collect::<Vec<_>>().join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_adds_are_idempotent() {
        let mut labels = LabelSet::new();
        labels.add("zip").add("zip").add("compressed");
        assert_eq!(labels.iter().count(), 2);
    }

    #[test]
    fn insertion_order_does_not_affect_equality() {
        let a = LabelSet::from_iter(["zip", "compressed"]);
        let b = LabelSet::from_iter(["compressed", "zip"]);
        assert_eq!(a, b);
    }
}
