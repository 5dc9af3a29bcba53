//! Lua table codec
//!
//! Reads trees from Lua source that assigns a table to a global variable and
//! writes trees back as such an assignment.
//!
//! # Mapping
//!
//! - String keys become child keys; numeric keys become their textual form
//! - Array elements (`{ 'a', 'b' }`) become children with the empty key
//! - Strings, numbers and booleans become node values, always as text
//! - The root node's value is the name of the global variable
//!
//! Child order follows the order fields were written in the constructor
//! assigned to the root variable. Entries added by later statements follow,
//! array elements first and then the rest sorted by key.
//!
//! Lua tables cannot hold two entries with the same key, so a tree with
//! duplicate named siblings keeps only the last of them after a round trip.
//!
//! A table may appear several times in the result, but a table that
//! contains itself, or nesting deeper than [`MAX_DEPTH`], is rejected.
//!
//! # Example
//!
//! ```rust,ignore
//! use property_tree::lua;
//!
//! let tree = lua::read_lua("settings = { width = 640, tags = { 'a', 'b' } }", "settings")?;
//! assert_eq!(tree.get::<u32>("width")?, 640);
//!
//! let text = lua::write_lua_string(&tree)?;
//! ```

mod layout;
mod reader;
mod writer;

pub use reader::{LuaReader, MAX_DEPTH};
pub use writer::{verify, LuaWriter, DEFAULT_INDENT};

use crate::{PropertyTree, Result};
use std::io::Write;
use std::path::Path;

/// Read the table in global `root` from Lua source
pub fn read_lua(source: &str, root: &str) -> Result<PropertyTree> {
    LuaReader::new().read_str(source, root)
}

/// Read the table in global `root` from a Lua file
pub fn read_lua_file(path: impl AsRef<Path>, root: &str) -> Result<PropertyTree> {
    LuaReader::new().read_file(path, root)
}

/// Write a tree as Lua source to `sink`
pub fn write_lua<W: Write>(sink: &mut W, tree: &PropertyTree) -> Result<()> {
    LuaWriter::new().write(sink, tree)
}

/// Render a tree as Lua source
pub fn write_lua_string(tree: &PropertyTree) -> Result<String> {
    LuaWriter::new().render(tree)
}

/// Write a tree as Lua source to a file
pub fn write_lua_file(path: impl AsRef<Path>, tree: &PropertyTree) -> Result<()> {
    LuaWriter::new().write_file(path, tree)
}
