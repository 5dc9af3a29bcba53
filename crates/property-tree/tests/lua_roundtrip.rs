//! Lua codec tests
//!
//! Verifies that:
//! 1. Writing then reading reproduces any writable tree, except that the
//!    root value becomes the root variable name
//! 2. File entry points annotate errors with the file name
//! 3. Rejected trees never produce output

use property_tree::lua::{self, LuaReader, LuaWriter};
use property_tree::{Error, PropertyTree, TreeBuilder};
use std::fs;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Values, a nested table and an array under one root
fn fixture() -> PropertyTree {
    TreeBuilder::with_value("root")
        .entry("one", "1")
        .entry("color", "blue")
        .child("subtree", TreeBuilder::new().entry("leave", "leave1"))
        .child("array", TreeBuilder::new().item(1).item(2).item(3))
        .build()
}

#[test]
fn test_roundtrip_fixture() {
    init_tracing();
    let tree = fixture();
    let text = lua::write_lua_string(&tree).unwrap();
    let back = lua::read_lua(&text, "root").unwrap();
    assert_eq!(back, tree);
}

#[test]
fn test_roundtrip_replaces_root_value_with_name() {
    let tree = TreeBuilder::with_value("settings")
        .entry("b", "2")
        .entry("a", "1")
        .build();
    let text = lua::write_lua_string(&tree).unwrap();
    assert!(text.starts_with("settings = {"));

    let back = lua::read_lua(&text, "settings").unwrap();
    assert_eq!(back.data(), "settings");
    assert_eq!(back, tree);
}

#[test]
fn test_roundtrip_mixed_order_and_nesting() {
    let tree = TreeBuilder::with_value("root")
        .entry("zeta", "last letter")
        .item("first item")
        .child(
            "nested",
            TreeBuilder::new()
                .entry("y", "")
                .item_tree(TreeBuilder::new().entry("deep", "it's \"quoted\"\nand\\slashed"))
                .entry("x", "1.5"),
        )
        .item("second item")
        .entry("alpha", "true")
        .entry("10", "numeric-looking key")
        .build();

    let text = lua::write_lua_string(&tree).unwrap();
    let back = lua::read_lua(&text, "root").unwrap();
    assert_eq!(back, tree, "written form was:\n{}", text);
}

#[test]
fn test_roundtrip_keeps_order_of_escaped_keys() {
    let tree = TreeBuilder::with_value("root")
        .entry("z", "1")
        .entry("a\0b", "2")
        .entry("nul\u{0}7", "3")
        .entry("b", "4")
        .build();

    let text = lua::write_lua_string(&tree).unwrap();
    assert!(text.contains(r"['a\000b'] = '2',"));

    let back = lua::read_lua(&text, "root").unwrap();
    let keys: Vec<String> = back.children().map(|(key, _)| key).collect();
    assert_eq!(keys, vec!["z", "a\0b", "nul\u{0}7", "b"]);
    assert_eq!(back, tree);
}

#[test]
fn test_roundtrip_with_custom_indent() {
    let tree = fixture();
    let text = LuaWriter::new().indent(1).render(&tree).unwrap();
    let back = LuaReader::new().read_str(&text, "root").unwrap();
    assert_eq!(back, tree);
}

#[test]
fn test_file_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tree.lua");

    let tree = fixture();
    lua::write_lua_file(&path, &tree).unwrap();
    let back = lua::read_lua_file(&path, "root").unwrap();
    assert_eq!(back, tree);
}

#[test]
fn test_missing_file_is_open_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.lua");

    let err = lua::read_lua_file(&path, "root").unwrap_err();
    assert!(matches!(err, Error::FileOpen { .. }));
    assert_eq!(err.file(), Some(path.display().to_string().as_str()));
}

#[test]
fn test_file_errors_carry_file_name() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.lua");
    let name = path.display().to_string();

    fs::write(&path, "root = { ").unwrap();
    let err = lua::read_lua_file(&path, "root").unwrap_err();
    assert!(matches!(err, Error::Script { .. }));
    assert_eq!(err.file(), Some(name.as_str()));

    fs::write(&path, "other = {}").unwrap();
    let err = lua::read_lua_file(&path, "root").unwrap_err();
    assert!(matches!(err, Error::RootNotFound { .. }));
    assert!(err.to_string().starts_with(&name));

    fs::write(&path, "root = { [true] = 1 }").unwrap();
    let err = lua::read_lua_file(&path, "root").unwrap_err();
    assert!(matches!(err, Error::UnsupportedKeyType { .. }));
    assert_eq!(err.file(), Some(name.as_str()));
}

#[test]
fn test_in_memory_errors_have_empty_file() {
    let err = lua::read_lua("root = { f = print }", "root").unwrap_err();
    assert!(matches!(err, Error::UnsupportedValueType { .. }));
    assert_eq!(err.file(), Some(""));
}

#[test]
fn test_rejected_tree_writes_nothing() {
    let tree = TreeBuilder::with_value("root")
        .child("node", TreeBuilder::with_value("value").entry("child", 1))
        .build();

    let mut sink = Vec::new();
    let err = lua::write_lua(&mut sink, &tree).unwrap_err();
    assert!(matches!(err, Error::UnrepresentableTree { .. }));
    assert!(sink.is_empty());

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rejected.lua");
    let err = lua::write_lua_file(&path, &tree).unwrap_err();
    assert!(matches!(err, Error::UnrepresentableTree { .. }));
    assert_eq!(err.file(), Some(path.display().to_string().as_str()));
    assert!(!path.exists());
}

#[test]
fn test_root_without_value_is_rejected() {
    let tree = TreeBuilder::new().entry("a", "b").build();
    assert!(matches!(
        lua::write_lua_string(&tree),
        Err(Error::UnrepresentableTree { .. })
    ));
}

#[test]
fn test_hand_written_lua() {
    let source = r#"
        -- window settings
        local scale = 2
        window = {
            title = "Crossing",
            size = { 640 * scale, 480 * scale },
            fullscreen = false,
            ["log level"] = "debug";
        }
    "#;

    let tree = lua::read_lua(source, "window").unwrap();
    let keys: Vec<String> = tree.children().map(|(key, _)| key).collect();
    assert_eq!(keys, vec!["title", "size", "fullscreen", "log level"]);

    let size: [u32; 2] = property_tree::to_array(&tree.get_child("size").unwrap()).unwrap();
    assert_eq!(size, [1280, 960]);
    assert!(!tree.get::<bool>("fullscreen").unwrap());
    assert_eq!(tree.find("log level").unwrap().data(), "debug");
}
