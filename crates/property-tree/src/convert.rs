//! Conversions from a node's children into plain containers
//!
//! These look only at the direct children of a node and only at their
//! values; keys are ignored except by [`union`].

use crate::tree::{parse_value, PropertyTree};
use crate::{Error, Result};
use std::str::FromStr;

/// Collect the value of every direct child, in order, into any container
///
/// ```rust,ignore
/// let values: Vec<i32> = to_sequence(&tree)?;
/// let unique: BTreeSet<String> = to_sequence(&tree)?;
/// ```
pub fn to_sequence<C, T>(tree: &PropertyTree) -> Result<C>
where
    C: FromIterator<T>,
    T: FromStr,
{
    tree.children()
        .map(|(_, child)| parse_value(&child.data()))
        .collect()
}

/// Collect the values of exactly `N` direct children into an array
///
/// Fails with [`Error::SizeMismatch`] before parsing anything when the node
/// does not have exactly `N` children.
pub fn to_array<T: FromStr, const N: usize>(tree: &PropertyTree) -> Result<[T; N]> {
    let actual = tree.len();
    if actual != N {
        return Err(Error::SizeMismatch {
            expected: N,
            actual,
        });
    }

    let values: Vec<T> = to_sequence(tree)?;
    values.try_into().map_err(|values: Vec<T>| Error::SizeMismatch {
        expected: N,
        actual: values.len(),
    })
}

/// A new tree holding copies of `a`'s children followed by `b`'s children
///
/// Same-key children from both sides are kept as separate siblings and the
/// result has no value of its own.
pub fn union(a: &PropertyTree, b: &PropertyTree) -> PropertyTree {
    let result = PropertyTree::new();
    for (key, child) in a.children().chain(b.children()) {
        result.push_back(key, &child);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TreeBuilder;
    use std::collections::VecDeque;

    #[test]
    fn test_to_sequence() {
        let tree = TreeBuilder::new().item(1).item(2).item(3).build();
        let values: Vec<i32> = to_sequence(&tree).unwrap();
        assert_eq!(values, vec![1, 2, 3]);

        let values: VecDeque<String> = to_sequence(&tree).unwrap();
        assert_eq!(values.front().map(String::as_str), Some("1"));
    }

    #[test]
    fn test_to_sequence_uses_values_not_keys() {
        let tree = TreeBuilder::new()
            .entry("x", 10)
            .entry("y", 20)
            .build();
        let values: Vec<u8> = to_sequence(&tree).unwrap();
        assert_eq!(values, vec![10, 20]);
    }

    #[test]
    fn test_to_sequence_conversion_error() {
        let tree = TreeBuilder::new().item(1).item("two").build();
        let result: Result<Vec<i32>> = to_sequence(&tree);
        assert!(matches!(result, Err(Error::Conversion { value, .. }) if value == "two"));
    }

    #[test]
    fn test_to_array() {
        let tree = TreeBuilder::new().item(1).item(2).item(3).build();
        let array: [i32; 3] = to_array(&tree).unwrap();
        assert_eq!(array, [1, 2, 3]);
    }

    #[test]
    fn test_to_array_size_mismatch() {
        let tree = TreeBuilder::new().item(1).item(2).build();
        assert!(matches!(
            to_array::<i32, 3>(&tree),
            Err(Error::SizeMismatch {
                expected: 3,
                actual: 2
            })
        ));
        assert!(matches!(
            to_array::<i32, 1>(&tree),
            Err(Error::SizeMismatch {
                expected: 1,
                actual: 2
            })
        ));
    }

    #[test]
    fn test_union_concatenates() {
        let expected = TreeBuilder::new()
            .entry("key1", 1)
            .entry("key2", 2)
            .entry("key3", 3)
            .entry("key4", 4)
            .build();
        let a = TreeBuilder::new().entry("key1", 1).entry("key2", 2).build();
        let b = TreeBuilder::new().entry("key3", 3).entry("key4", 4).build();

        assert_eq!(union(&a, &b), expected);
    }

    #[test]
    fn test_union_keeps_duplicate_keys() {
        let a = TreeBuilder::with_value("a").entry("k", 1).build();
        let b = TreeBuilder::with_value("b").entry("k", 2).entry("m", 3).build();

        let merged = union(&a, &b);
        assert_eq!(merged.len(), a.len() + b.len());
        assert_eq!(merged.count("k"), 2);
        assert_eq!(merged.data(), "");
        assert!(!merged.shares_storage_with(&a));

        merged.put("k", 9).unwrap();
        assert_eq!(a.get::<i32>("k").unwrap(), 1);
    }
}
