//! Identity-keyed set difference
//!
//! Desired and applied state are compared on an explicit key rather than full
//! structural equality, so fields the engine never sees (names, timestamps,
//! descriptions) cannot produce spurious add/remove pairs.

use std::collections::HashSet;
use std::hash::Hash;

/// Elements of `left` whose key does not occur in `right`.
///
/// Order of `left` is preserved. O(|left| + |right|).
pub fn difference<T, K, F>(left: &[T], right: &[T], key: F) -> Vec<T>
where
    T: Clone,
    K: Eq + Hash,
    F: Fn(&T) -> K,
{
    let present: HashSet<K> = right.iter().map(&key).collect();
    left.iter()
        .filter(|item| !present.contains(&key(*item)))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Item {
        id: u32,
        label: &'static str,
    }

    fn item(id: u32, label: &'static str) -> Item {
        Item { id, label }
    }

    #[test]
    fn test_difference_by_key() {
        let a = vec![item(1, "a"), item(2, "b"), item(3, "c")];
        let b = vec![item(2, "b"), item(4, "d")];

        let only_a = difference(&a, &b, |i| i.id);
        assert_eq!(only_a, vec![item(1, "a"), item(3, "c")]);

        let only_b = difference(&b, &a, |i| i.id);
        assert_eq!(only_b, vec![item(4, "d")]);
    }

    #[test]
    fn test_payload_changes_are_not_differences() {
        let applied = vec![item(1, "old label")];
        let desired = vec![item(1, "new label")];

        assert!(difference(&desired, &applied, |i| i.id).is_empty());
        assert!(difference(&applied, &desired, |i| i.id).is_empty());
    }

    #[test]
    fn test_partition_reconstructs_target() {
        let applied = vec![item(1, ""), item(2, ""), item(5, "")];
        let desired = vec![item(2, ""), item(3, ""), item(4, ""), item(5, "")];

        let to_add = difference(&desired, &applied, |i| i.id);
        let to_remove = difference(&applied, &desired, |i| i.id);

        let mut result: Vec<Item> = applied
            .iter()
            .filter(|i| !to_remove.iter().any(|r| r.id == i.id))
            .cloned()
            .collect();
        result.extend(to_add);

        let mut got: Vec<u32> = result.iter().map(|i| i.id).collect();
        got.sort_unstable();
        assert_eq!(got, vec![2, 3, 4, 5]);
    }

    #[test]
    fn test_empty_inputs() {
        let empty: Vec<Item> = Vec::new();
        let some = vec![item(1, "x")];

        assert_eq!(difference(&some, &empty, |i| i.id), some);
        assert!(difference(&empty, &some, |i| i.id).is_empty());
    }
}
