//! Lua table reader
//!
//! The source is executed in a fresh, sandboxed Lua VM. The global named by
//! the root key is then walked recursively into a tree. The VM lives only for
//! the duration of one read and is dropped on every exit path.

use super::layout::{self, FieldKey, TableLayout};
use crate::tree::Node;
use crate::{Error, PropertyTree, Result};
use mlua::prelude::*;
use mlua::{LuaOptions, StdLib};
use std::collections::{HashMap, HashSet};
use std::ffi::c_void;
use std::io::Read;
use std::path::Path;
use tracing::{debug, trace};

/// Globals from the base library that reach outside the VM
const UNSAFE_GLOBALS: [&str; 2] = ["dofile", "loadfile"];

/// Deepest table nesting the reader follows
pub const MAX_DEPTH: usize = 200;

/// Reader configuration
#[derive(Debug, Clone, Default)]
pub struct LuaReader {
    memory_limit: Option<usize>,
}

impl LuaReader {
    /// Reader with no memory ceiling
    pub fn new() -> Self {
        Self::default()
    }

    /// Cap the memory the Lua VM may allocate while evaluating the source
    pub fn memory_limit(mut self, bytes: usize) -> Self {
        self.memory_limit = Some(bytes);
        self
    }

    /// Read the table stored in global `root` after running `source`
    ///
    /// The root node's value is set to `root`, mirroring the writer, which
    /// uses the root value as the variable name.
    pub fn read_str(&self, source: &str, root: &str) -> Result<PropertyTree> {
        self.read_source(source, root, "")
    }

    /// Read from any byte stream holding Lua source
    pub fn read<R: Read>(&self, mut reader: R, root: &str) -> Result<PropertyTree> {
        let mut source = String::new();
        reader
            .read_to_string(&mut source)
            .map_err(|source| Error::Io {
                file: String::new(),
                source,
            })?;
        self.read_source(&source, root, "")
    }

    /// Read a Lua file; every error is annotated with the file name
    pub fn read_file(&self, path: impl AsRef<Path>, root: &str) -> Result<PropertyTree> {
        let path = path.as_ref();
        let file = path.display().to_string();
        debug!("Reading Lua table '{}' from {}", root, file);

        let mut handle = std::fs::File::open(path).map_err(|source| Error::FileOpen {
            file: file.clone(),
            source,
        })?;
        let mut source = String::new();
        handle
            .read_to_string(&mut source)
            .map_err(|source| Error::Io {
                file: file.clone(),
                source,
            })?;

        self.read_source(&source, root, &file)
    }

    fn read_source(&self, source: &str, root: &str, file: &str) -> Result<PropertyTree> {
        let script = |e: LuaError| Error::Script {
            file: file.to_string(),
            message: e.to_string(),
        };

        let lua = self.sandbox().map_err(script)?;
        let chunk_name = if file.is_empty() {
            "=(buffer)".to_string()
        } else {
            format!("@{}", file)
        };

        trace!("Evaluating {} bytes of Lua source", source.len());
        lua.load(source).set_name(chunk_name).exec().map_err(script)?;

        let value: LuaValue = lua.globals().get(root).map_err(script)?;
        let node = match value {
            LuaValue::Nil => {
                return Err(Error::RootNotFound {
                    file: file.to_string(),
                    root: root.to_string(),
                })
            }
            LuaValue::Table(table) => {
                let layout = layout::scan_root(source, root);
                if layout.is_none() {
                    debug!("No constructor layout for '{}', using key order", root);
                }
                read_table(&table, layout.as_ref(), &mut HashSet::new())
                    .map_err(|e| e.with_file(file))?
            }
            LuaValue::String(_)
            | LuaValue::Integer(_)
            | LuaValue::Number(_)
            | LuaValue::Boolean(_) => Node::default(),
            other => {
                return Err(Error::UnsupportedValueType {
                    file: file.to_string(),
                    found: other.type_name().to_string(),
                })
            }
        };

        let tree = PropertyTree::from_node(Node {
            value: root.to_string(),
            children: node.children,
        });
        debug!("Read Lua table '{}' with {} top-level entries", root, tree.len());
        Ok(tree)
    }

    fn sandbox(&self) -> LuaResult<Lua> {
        let lua = Lua::new_with(
            StdLib::TABLE | StdLib::STRING | StdLib::MATH,
            LuaOptions::default(),
        )?;
        if let Some(limit) = self.memory_limit {
            lua.set_memory_limit(limit)?;
        }
        let globals = lua.globals();
        for name in UNSAFE_GLOBALS {
            globals.raw_set(name, LuaValue::Nil)?;
        }
        Ok(lua)
    }
}

/// How a table entry is found again from a constructor layout
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum EntryKey {
    Int(i64),
    Name(String),
    Float(String),
}

fn entry_key(key: &LuaValue) -> Result<EntryKey> {
    match key {
        LuaValue::Integer(i) => Ok(EntryKey::Int(*i)),
        LuaValue::Number(n) => Ok(EntryKey::Float(format_number(*n))),
        LuaValue::String(s) => s
            .to_str()
            .map(|s| EntryKey::Name((*s).to_owned()))
            .map_err(|_| Error::UnsupportedKeyType {
                file: String::new(),
                found: "non UTF-8 string".to_string(),
            }),
        other => Err(Error::UnsupportedKeyType {
            file: String::new(),
            found: other.type_name().to_string(),
        }),
    }
}

/// Read one table; `open` holds the tables on the path from the root
fn read_table(
    table: &LuaTable,
    layout: Option<&TableLayout>,
    open: &mut HashSet<*const c_void>,
) -> Result<Node> {
    let pointer = table.to_pointer();
    if !open.insert(pointer) {
        return Err(Error::UnsupportedValueType {
            file: String::new(),
            found: "recursive table".to_string(),
        });
    }
    if open.len() > MAX_DEPTH {
        return Err(Error::UnsupportedValueType {
            file: String::new(),
            found: format!("table nested deeper than {} levels", MAX_DEPTH),
        });
    }

    let node = read_entries(table, layout, open);
    open.remove(&pointer);
    node
}

fn read_entries(
    table: &LuaTable,
    layout: Option<&TableLayout>,
    open: &mut HashSet<*const c_void>,
) -> Result<Node> {
    let mut entries = Vec::new();
    for pair in table.pairs::<LuaValue, LuaValue>() {
        let (key, value) = pair.map_err(|e| Error::Script {
            file: String::new(),
            message: e.to_string(),
        })?;
        entries.push((entry_key(&key)?, value));
    }

    // integer keys 1..=n with no gap are array elements and lose their key
    let integers: HashSet<i64> = entries
        .iter()
        .filter_map(|(key, _)| match key {
            EntryKey::Int(i) => Some(*i),
            _ => None,
        })
        .collect();
    let mut sequence_len = 0;
    while integers.contains(&(sequence_len + 1)) {
        sequence_len += 1;
    }
    let in_sequence =
        |key: &EntryKey| matches!(key, EntryKey::Int(i) if (1..=sequence_len).contains(i));

    let mut order: Vec<(usize, Option<&TableLayout>)> = Vec::with_capacity(entries.len());
    let mut placed = vec![false; entries.len()];

    if let Some(layout) = layout {
        let index: HashMap<&EntryKey, usize> = entries
            .iter()
            .enumerate()
            .map(|(i, (key, _))| (key, i))
            .collect();
        let mut position = 0;
        for (field, nested) in &layout.fields {
            let key = match field {
                FieldKey::Positional => {
                    position += 1;
                    EntryKey::Int(position)
                }
                FieldKey::Index(i) => EntryKey::Int(*i),
                FieldKey::Name(name) => EntryKey::Name(name.clone()),
                FieldKey::Unknown => continue,
            };
            if let Some(&i) = index.get(&key) {
                if !placed[i] {
                    placed[i] = true;
                    order.push((i, nested.as_ref()));
                }
            }
        }
    }

    // whatever the layout did not place: array part first, then by key text
    let mut rest: Vec<usize> = (0..entries.len()).filter(|i| !placed[*i]).collect();
    rest.sort_by_key(|i| {
        let key = &entries[*i].0;
        match key {
            EntryKey::Int(n) if in_sequence(key) => (false, *n, String::new()),
            _ => (true, 0, key_text(key)),
        }
    });
    order.extend(rest.into_iter().map(|i| (i, None)));

    let mut node = Node::default();
    for (i, nested) in order {
        let (key, value) = &entries[i];
        let child = match value {
            LuaValue::Table(t) => read_table(t, nested, open)?,
            LuaValue::String(s) => Node {
                value: s
                    .to_str()
                    .map(|s| (*s).to_owned())
                    .map_err(|_| Error::UnsupportedValueType {
                        file: String::new(),
                        found: "non UTF-8 string".to_string(),
                    })?,
                children: Vec::new(),
            },
            LuaValue::Integer(n) => leaf(n.to_string()),
            LuaValue::Number(n) => leaf(format_number(*n)),
            LuaValue::Boolean(b) => leaf(b.to_string()),
            other => {
                return Err(Error::UnsupportedValueType {
                    file: String::new(),
                    found: other.type_name().to_string(),
                })
            }
        };
        let child_key = if in_sequence(key) {
            String::new()
        } else {
            key_text(key)
        };
        node.children.push((child_key, child));
    }
    Ok(node)
}

fn leaf(value: String) -> Node {
    Node {
        value,
        children: Vec::new(),
    }
}

fn key_text(key: &EntryKey) -> String {
    match key {
        EntryKey::Int(i) => i.to_string(),
        EntryKey::Name(name) => name.clone(),
        EntryKey::Float(text) => text.clone(),
    }
}

/// Floats print in their shortest round-trip form, so `1.0` reads as `1`
fn format_number(n: f64) -> String {
    n.to_string()
}
