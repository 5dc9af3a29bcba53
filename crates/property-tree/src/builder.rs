//! Fluent construction of property trees
//!
//! A tree like
//!
//! ```text
//! key1 value1
//! key2
//! {
//!     key3 12345
//!     ""
//!     {
//!         key4 "value4 with spaces"
//!     }
//!     "" 10
//!     "" 11
//! }
//! ```
//!
//! is written as
//!
//! ```rust,ignore
//! TreeBuilder::new()
//!     .entry("key1", "value1")
//!     .child("key2", TreeBuilder::new()
//!         .entry("key3", 12345)
//!         .item_tree(TreeBuilder::new().entry("key4", "value4 with spaces"))
//!         .item(10)
//!         .item(11))
//!     .build()
//! ```

use crate::PropertyTree;
use std::fmt;
use tracing::warn;

/// Chainable builder over a fresh [`PropertyTree`]
#[derive(Debug, Default)]
pub struct TreeBuilder {
    tree: PropertyTree,
}

impl TreeBuilder {
    /// Start from an empty tree
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a tree whose root holds `value`
    pub fn with_value(value: impl fmt::Display) -> Self {
        Self {
            tree: PropertyTree::with_value(value),
        }
    }

    /// Add a node holding `value` at `path` (never replaces)
    pub fn entry(self, path: &str, value: impl fmt::Display) -> Self {
        if let Err(e) = self.tree.add(path, value) {
            warn!("Skipping builder entry at '{}': {}", path, e);
        }
        self
    }

    /// Add the tree built by `child` at `path` (never replaces)
    pub fn child(self, path: &str, child: TreeBuilder) -> Self {
        if let Err(e) = self.tree.add_child(path, &child.tree) {
            warn!("Skipping builder child at '{}': {}", path, e);
        }
        self
    }

    /// Append an unnamed node holding `value`
    pub fn item(self, value: impl fmt::Display) -> Self {
        self.tree.push_back("", &PropertyTree::with_value(value));
        self
    }

    /// Append the tree built by `child` without a key
    pub fn item_tree(self, child: TreeBuilder) -> Self {
        self.tree.push_back("", &child.tree);
        self
    }

    pub fn build(self) -> PropertyTree {
        self.tree
    }
}

impl From<TreeBuilder> for PropertyTree {
    fn from(builder: TreeBuilder) -> Self {
        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_matches_manual_construction() {
        let manual = PropertyTree::new();
        manual.add("key1", "value1").unwrap();

        let inner = PropertyTree::new();
        inner.add("key3", 12345).unwrap();
        let nested = PropertyTree::new();
        nested.add("key4", "value4 with spaces").unwrap();
        inner.push_back("", &nested);
        inner.add("key5", "value5").unwrap();
        for n in [10, 11, 12] {
            inner.push_back("", &PropertyTree::with_value(n));
        }
        manual.add_child("key2", &inner).unwrap();

        let built = TreeBuilder::new()
            .entry("key1", "value1")
            .child(
                "key2",
                TreeBuilder::new()
                    .entry("key3", 12345)
                    .item_tree(TreeBuilder::new().entry("key4", "value4 with spaces"))
                    .entry("key5", "value5")
                    .item(10)
                    .item(11)
                    .item(12),
            )
            .build();

        assert_eq!(manual, built);
    }

    #[test]
    fn test_builder_root_value() {
        let tree = TreeBuilder::with_value("root").entry("one", 1).build();
        assert_eq!(tree.data(), "root");
        assert_eq!(tree.get::<i32>("one").unwrap(), 1);
        assert!(tree.is_root());
    }
}
