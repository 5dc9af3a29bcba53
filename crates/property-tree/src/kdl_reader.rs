//! KDL document reader
//!
//! Parses KDL documents into a [`PropertyTree`]. KDL allows repeated node
//! names and keeps node order, so nothing is lost on the way in.
//!
//! # KDL Mapping
//!
//! - Node name becomes the child key
//! - A single argument becomes the node value
//! - Several arguments become unnamed children, one per argument
//! - Properties become keyed children, after the arguments
//! - Child nodes become children, after the properties
//!
//! # Example
//!
//! ```kdl
//! app {
//!     listen "0.0.0.0" port=8080
//!     listen "::" port=8081
//!     position 1.0 2.0 3.0
//! }
//! ```
//!
//! Maps to paths:
//! - `app.listen` with value `0.0.0.0` and child `port` = `8080`
//! - `app.listen[1]` with value `::` and child `port` = `8081`
//! - `app.position` with three unnamed children

use crate::tree::Node;
use crate::{Error, PropertyTree, Result};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::debug;

/// KDL document reader
pub struct KdlReader;

impl KdlReader {
    /// Parse a KDL file into a tree
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<PropertyTree> {
        let path = path.as_ref();
        let file = path.display().to_string();
        debug!("Reading KDL document {}", file);
        let mut handle = File::open(path).map_err(|source| Error::FileOpen {
            file: file.clone(),
            source,
        })?;
        let mut content = String::new();
        handle
            .read_to_string(&mut content)
            .map_err(|source| Error::Io {
                file: file.clone(),
                source,
            })?;
        Self::from_string(&content).map_err(|err| err.with_file(file))
    }

    /// Parse a KDL string into a tree
    pub fn from_string(content: &str) -> Result<PropertyTree> {
        let doc: kdl::KdlDocument = content.parse().map_err(|source| Error::KdlParse {
            file: String::new(),
            source,
        })?;

        let children = doc
            .nodes()
            .iter()
            .map(|node| (node.name().value().to_string(), Self::parse_node(node)))
            .collect();

        Ok(PropertyTree::from_node(Node {
            value: String::new(),
            children,
        }))
    }

    /// Parse a KDL node into a tree node
    fn parse_node(node: &kdl::KdlNode) -> Node {
        let mut tree_node = Node::default();

        let args: Vec<&kdl::KdlEntry> = node.entries().iter().filter(|e| e.name().is_none()).collect();
        let props = node.entries().iter().filter(|e| e.name().is_some());

        if let [single] = args.as_slice() {
            tree_node.value = Self::kdl_value_to_text(single.value());
        } else {
            for arg in &args {
                tree_node
                    .children
                    .push((String::new(), leaf(Self::kdl_value_to_text(arg.value()))));
            }
        }

        for prop in props {
            if let Some(name) = prop.name() {
                tree_node.children.push((
                    name.value().to_string(),
                    leaf(Self::kdl_value_to_text(prop.value())),
                ));
            }
        }

        if let Some(children) = node.children() {
            for child_node in children.nodes() {
                tree_node.children.push((
                    child_node.name().value().to_string(),
                    Self::parse_node(child_node),
                ));
            }
        }

        tree_node
    }

    /// Textual form of a KDL value; null becomes the empty string
    fn kdl_value_to_text(kdl_val: &kdl::KdlValue) -> String {
        match kdl_val {
            kdl::KdlValue::String(s) => s.clone(),
            kdl::KdlValue::Integer(i) => i.to_string(),
            kdl::KdlValue::Float(f) => f.to_string(),
            kdl::KdlValue::Bool(b) => b.to_string(),
            kdl::KdlValue::Null => String::new(),
        }
    }
}

fn leaf(value: String) -> Node {
    Node {
        value,
        children: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple() {
        let kdl = r#"
            app {
                name "Crossing"
                version 1
            }
        "#;

        let tree = KdlReader::from_string(kdl).unwrap();
        assert_eq!(tree.get::<String>("app.name").unwrap(), "Crossing");
        assert_eq!(tree.get::<i64>("app.version").unwrap(), 1);
    }

    #[test]
    fn test_duplicate_nodes_keep_order() {
        let kdl = r#"
            listen "0.0.0.0" port=8080
            listen "::" port=8081
        "#;

        let tree = KdlReader::from_string(kdl).unwrap();
        assert_eq!(tree.count("listen"), 2);
        assert_eq!(tree.get::<String>("listen").unwrap(), "0.0.0.0");
        assert_eq!(tree.get::<u16>("listen[1].port").unwrap(), 8081);
    }

    #[test]
    fn test_parse_array_value() {
        let kdl = r#"
            position 1.5 2.5 3.5
        "#;

        let tree = KdlReader::from_string(kdl).unwrap();
        let values: Vec<f64> = crate::to_sequence(&tree.get_child("position").unwrap()).unwrap();
        assert_eq!(values, vec![1.5, 2.5, 3.5]);
    }

    #[test]
    fn test_parse_bool() {
        // KDL v2 uses #true and #false for booleans
        let kdl = r#"
            config enabled=#true debug=#false
        "#;

        let tree = KdlReader::from_string(kdl).unwrap();
        assert!(tree.get::<bool>("config.enabled").unwrap());
        assert!(!tree.get::<bool>("config.debug").unwrap());
    }

    #[test]
    fn test_parse_error() {
        assert!(matches!(
            KdlReader::from_string("node {"),
            Err(Error::KdlParse { .. })
        ));
    }

    #[test]
    fn test_file_parse_error_names_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.kdl");
        std::fs::write(&path, "node {").unwrap();

        let err = KdlReader::from_file(&path).unwrap_err();
        let name = path.display().to_string();
        assert!(matches!(err, Error::KdlParse { .. }));
        assert_eq!(err.file(), Some(name.as_str()));
        assert!(err.to_string().starts_with(&name));
    }

    #[test]
    fn test_open_and_read_failures_differ() {
        let dir = tempfile::tempdir().unwrap();

        let err = KdlReader::from_file(dir.path().join("absent.kdl")).unwrap_err();
        assert!(matches!(err, Error::FileOpen { .. }));

        // A directory opens but cannot be read as text
        let err = KdlReader::from_file(dir.path()).unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
        assert_eq!(err.file(), Some(dir.path().display().to_string().as_str()));
    }
}
