//! Owner-reference diffing
//!
//! References are compared by their `apiVersion/kind/name` key, not by deep
//! equality, so a reference whose controller flag flips is not a change.

use std::collections::BTreeMap;
use topowatch_core::models::OwnerReference;

/// References removed and added between two versions of an object
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OwnerReferenceDiff {
    pub removed: Vec<OwnerReference>,
    pub added: Vec<OwnerReference>,
}

impl OwnerReferenceDiff {
    #[must_use]
    pub fn between(old: &[OwnerReference], new: &[OwnerReference]) -> Self {
        let old = by_key(old);
        let new = by_key(new);
        Self {
            removed: missing_from(&old, &new),
            added: missing_from(&new, &old),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.added.is_empty()
    }
}

fn by_key(references: &[OwnerReference]) -> BTreeMap<String, &OwnerReference> {
    references
        .iter()
        .map(|reference| (reference.unique_key(), reference))
        .collect()
}

// items in `a` but not in `b`
fn missing_from(
    a: &BTreeMap<String, &OwnerReference>,
    b: &BTreeMap<String, &OwnerReference>,
) -> Vec<OwnerReference> {
    a.iter()
        .filter(|(key, _)| !b.contains_key(*key))
        .map(|(_, reference)| (*reference).clone())
        .collect()
}

/// Reference keys, for log fields
#[must_use]
pub fn reference_keys(references: &[OwnerReference]) -> Vec<String> {
    references.iter().map(OwnerReference::unique_key).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference(name: &str) -> OwnerReference {
        OwnerReference::new("apps/v1", "ReplicaSet", name)
    }

    #[test]
    fn test_diff_removed_and_added() {
        let diff = OwnerReferenceDiff::between(
            &[reference("a"), reference("b")],
            &[reference("b"), reference("c")],
        );
        assert_eq!(diff.removed, vec![reference("a")]);
        assert_eq!(diff.added, vec![reference("c")]);
        assert!(!diff.is_empty());
    }

    #[test]
    fn test_diff_ignores_non_key_fields() {
        let mut flagged = reference("a");
        flagged.controller = Some(true);
        flagged.uid = "1234".to_string();

        let diff = OwnerReferenceDiff::between(&[reference("a")], &[flagged]);
        assert!(diff.is_empty());
    }

    #[test]
    fn test_diff_key_includes_kind() {
        let diff = OwnerReferenceDiff::between(
            &[OwnerReference::new("apps/v1", "ReplicaSet", "a")],
            &[OwnerReference::new("apps/v1", "StatefulSet", "a")],
        );
        assert_eq!(diff.removed.len(), 1);
        assert_eq!(diff.added.len(), 1);
    }

    #[test]
    fn test_diff_empty_sides() {
        assert!(OwnerReferenceDiff::between(&[], &[]).is_empty());

        let diff = OwnerReferenceDiff::between(&[], &[reference("p1")]);
        assert!(diff.removed.is_empty());
        assert_eq!(reference_keys(&diff.added), vec!["apps/v1/ReplicaSet/p1"]);
    }
}
