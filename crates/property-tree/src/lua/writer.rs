//! Lua table writer
//!
//! Trees are printed as a single assignment:
//!
//! ```text
//! root = {
//!     ['key'] = 'value',
//!     'arrayElement1',
//!     ['nested'] = {
//!         ['a'] = 'b',
//!     },
//! }
//! ```
//!
//! A Lua table slot holds either a scalar or a table, never both, so a tree
//! is only writable when no node below the root has a value and children at
//! the same time. The root value is the variable name and must be present.
//! This is checked over the whole tree before a single byte is written.

use crate::{Error, PropertyTree, Result};
use std::io::Write;
use std::path::Path;
use tracing::debug;

/// Spaces per nesting level
pub const DEFAULT_INDENT: usize = 4;

/// Writer configuration
#[derive(Debug, Clone)]
pub struct LuaWriter {
    indent: usize,
}

impl Default for LuaWriter {
    fn default() -> Self {
        Self {
            indent: DEFAULT_INDENT,
        }
    }
}

/// Pending output while rendering
enum Step {
    Node(PropertyTree, usize),
    Entry(String, PropertyTree, usize),
    Close(usize),
    Separator,
}

impl LuaWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of spaces per nesting level
    pub fn indent(mut self, spaces: usize) -> Self {
        self.indent = spaces;
        self
    }

    /// Render the tree to a string after checking that it is writable
    pub fn render(&self, tree: &PropertyTree) -> Result<String> {
        verify(tree)?;

        let mut out = String::new();
        out.push_str(&tree.data());
        out.push_str(" = ");

        let mut pending = vec![Step::Node(tree.clone(), 0)];
        while let Some(step) = pending.pop() {
            match step {
                Step::Node(node, depth) => {
                    if node.is_empty() {
                        push_quoted(&mut out, &node.data());
                        continue;
                    }
                    out.push_str("{\n");
                    pending.push(Step::Close(depth));
                    for (key, child) in node.children().rev() {
                        pending.push(Step::Entry(key, child, depth + 1));
                    }
                }
                Step::Entry(key, child, depth) => {
                    self.pad(&mut out, depth);
                    if !key.is_empty() {
                        out.push('[');
                        push_quoted(&mut out, &key);
                        out.push_str("] = ");
                    }
                    pending.push(Step::Separator);
                    pending.push(Step::Node(child, depth));
                }
                Step::Close(depth) => {
                    self.pad(&mut out, depth);
                    out.push('}');
                }
                Step::Separator => out.push_str(",\n"),
            }
        }
        out.push('\n');
        Ok(out)
    }

    /// Write the tree to `sink`; nothing is written if the tree is rejected
    pub fn write<W: Write>(&self, sink: &mut W, tree: &PropertyTree) -> Result<()> {
        let text = self.render(tree)?;
        sink.write_all(text.as_bytes())
            .and_then(|_| sink.flush())
            .map_err(|source| Error::Io {
                file: String::new(),
                source,
            })
    }

    /// Write the tree to a file
    ///
    /// The tree is checked before the file is opened, so a rejected tree
    /// leaves no file behind.
    pub fn write_file(&self, path: impl AsRef<Path>, tree: &PropertyTree) -> Result<()> {
        let path = path.as_ref();
        let file = path.display().to_string();
        let text = self.render(tree).map_err(|e| e.with_file(&file))?;

        debug!("Writing Lua table '{}' to {}", tree.data(), file);
        let mut handle = std::fs::File::create(path).map_err(|source| Error::FileOpen {
            file: file.clone(),
            source,
        })?;
        handle
            .write_all(text.as_bytes())
            .and_then(|_| handle.flush())
            .map_err(|source| Error::Io { file, source })
    }

    fn pad(&self, out: &mut String, depth: usize) {
        out.extend(std::iter::repeat(' ').take(self.indent * depth));
    }
}

/// Check that a tree can be written as a Lua table
///
/// Fails with [`Error::UnrepresentableTree`] naming the first offending node
/// in depth-first order: a root without a value, or a non-root node holding
/// both a value and children.
pub fn verify(tree: &PropertyTree) -> Result<()> {
    match first_violation(tree) {
        Some(at) => {
            debug!("Tree is not representable as a Lua table at '{}'", at);
            Err(Error::UnrepresentableTree {
                file: String::new(),
                path: at,
            })
        }
        None => Ok(()),
    }
}

fn first_violation(root: &PropertyTree) -> Option<String> {
    if !root.has_value() {
        return Some(String::new());
    }

    // path labels, each with the index of its parent's label
    let mut labels = Vec::new();
    let mut pending = Vec::new();
    push_children(root, None, &mut labels, &mut pending);
    while let Some((node, label)) = pending.pop() {
        if node.has_value() && !node.is_empty() {
            return Some(label_path(&labels, label));
        }
        push_children(&node, label, &mut labels, &mut pending);
    }
    None
}

/// Queue the children of `node` so the first child is visited next
fn push_children(
    node: &PropertyTree,
    parent: Option<usize>,
    labels: &mut Vec<(String, Option<usize>)>,
    pending: &mut Vec<(PropertyTree, Option<usize>)>,
) {
    for (position, (key, child)) in node.children().enumerate().rev() {
        let label = if key.is_empty() {
            format!("[{}]", position)
        } else {
            key
        };
        labels.push((label, parent));
        pending.push((child, Some(labels.len() - 1)));
    }
}

fn label_path(labels: &[(String, Option<usize>)], mut at: Option<usize>) -> String {
    let mut parts = Vec::new();
    while let Some(index) = at {
        let (label, parent) = &labels[index];
        parts.push(label.as_str());
        at = *parent;
    }
    parts.reverse();
    parts.join(".")
}

fn push_quoted(out: &mut String, text: &str) {
    out.push('\'');
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\0' => out.push_str("\\000"),
            c => out.push(c),
        }
    }
    out.push('\'');
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TreeBuilder;

    #[test]
    fn test_render_layout() {
        let tree = TreeBuilder::with_value("root")
            .entry("key", "value")
            .item("arrayElement1")
            .child("nested", TreeBuilder::new().entry("a", "b"))
            .build();

        let text = LuaWriter::new().render(&tree).unwrap();
        assert_eq!(
            text,
            "root = {\n    ['key'] = 'value',\n    'arrayElement1',\n    ['nested'] = {\n        ['a'] = 'b',\n    },\n}\n"
        );
    }

    #[test]
    fn test_render_scalar_root() {
        let tree = PropertyTree::with_value("root");
        assert_eq!(LuaWriter::new().render(&tree).unwrap(), "root = 'root'\n");
    }

    #[test]
    fn test_custom_indent() {
        let tree = TreeBuilder::with_value("t").entry("a", 1).build();
        let text = LuaWriter::new().indent(2).render(&tree).unwrap();
        assert_eq!(text, "t = {\n  ['a'] = '1',\n}\n");
    }

    #[test]
    fn test_quotes_are_escaped() {
        let tree = TreeBuilder::with_value("root")
            .entry("it's", "a\\b\nc")
            .build();
        let text = LuaWriter::new().render(&tree).unwrap();
        assert!(text.contains(r"['it\'s'] = 'a\\b\nc',"));
    }

    #[test]
    fn test_root_without_value_is_rejected() {
        let tree = TreeBuilder::new().entry("a", 1).build();
        assert!(matches!(
            verify(&tree),
            Err(Error::UnrepresentableTree { path, .. }) if path.is_empty()
        ));
    }

    #[test]
    fn test_value_with_children_is_rejected() {
        let tree = TreeBuilder::with_value("root")
            .entry("ok", 1)
            .child("bad", TreeBuilder::with_value("v").entry("x", 1))
            .child("worse", TreeBuilder::with_value("w").entry("y", 1))
            .build();
        assert!(matches!(
            verify(&tree),
            Err(Error::UnrepresentableTree { path, .. }) if path == "bad"
        ));

        let mut sink = Vec::new();
        assert!(LuaWriter::new().write(&mut sink, &tree).is_err());
        assert!(sink.is_empty());
    }

    #[test]
    fn test_root_may_hold_value_and_children() {
        let tree = TreeBuilder::with_value("root")
            .item_tree(TreeBuilder::new().item(1))
            .build();
        assert!(verify(&tree).is_ok());
    }

    #[test]
    fn test_violation_path_names_array_positions() {
        let tree = TreeBuilder::with_value("root")
            .child(
                "list",
                TreeBuilder::new()
                    .item(1)
                    .item_tree(TreeBuilder::with_value("x").item(2)),
            )
            .build();
        assert!(matches!(
            verify(&tree),
            Err(Error::UnrepresentableTree { path, .. }) if path == "list.[1]"
        ));
    }

    #[test]
    fn test_deep_tree_is_checked_and_rendered() {
        let tree = PropertyTree::with_value("root");
        let mut tip = tree.clone();
        for _ in 0..50_000 {
            tip = tip.put("n", "").unwrap();
        }
        tip.put_value("leaf");

        let text = LuaWriter::new().indent(0).render(&tree).unwrap();
        assert!(text.starts_with("root = {\n['n'] = {\n"));
        assert!(text.contains("['n'] = 'leaf',\n},\n"));
        assert_eq!(text.matches('{').count(), 50_000);

        tip.put("child", 1).unwrap();
        match verify(&tree) {
            Err(Error::UnrepresentableTree { path, .. }) => {
                assert_eq!(path.split('.').count(), 50_000);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
