//! Ordered property trees for configuration and data files
//!
//! This crate provides:
//! - **PropertyTree**: a tree of textual values whose children are ordered
//!   and may repeat keys, addressed by dotted paths
//! - **Shared handles**: every handle into a tree keeps the whole tree alive
//!   and sees edits made through any other handle
//! - **Converters**: children into sequences, fixed arrays and unions
//! - **Lua codec**: read Lua table assignments, write trees back as Lua
//! - **KDL reader**: parse KDL documents into trees
//!
//! # Example
//!
//! ```rust,ignore
//! use property_tree::{lua, PropertyTree};
//!
//! let tree = lua::read_lua_file("config/app.lua", "app")?;
//!
//! // Access values by path
//! let depth = tree.get::<u32>("scene.world.depth")?;
//!
//! // Handles are live views into the same tree
//! let world = tree.get_child("scene.world")?;
//! world.put("depth", depth + 1)?;
//! assert_eq!(tree.get::<u32>("scene.world.depth")?, depth + 1);
//!
//! lua::write_lua_file("config/app.lua", &tree)?;
//! ```

mod builder;
mod convert;
mod error;
mod kdl_reader;
pub mod lua;
mod path;
mod tree;

pub use builder::TreeBuilder;
pub use convert::{to_array, to_sequence, union};
pub use error::{Error, Result};
pub use kdl_reader::KdlReader;
pub use path::{IntoPath, Path, Segment, DEFAULT_SEPARATOR};
pub use tree::{Children, NodeId, PropertyTree};

// Re-export mlua for downstream crates
pub use mlua;
