//! Ordered, duplicate-key property tree with shared handles
//!
//! The tree provides:
//! - A textual value on every node, parsed and formatted on demand
//! - Ordered children where several siblings may share a key
//! - Path-based access that creates missing ancestors on insertion
//! - Handles into interior nodes that keep the whole tree alive
//!
//! All nodes of one tree live in a single [`Storage`] arena behind an
//! `Rc<RefCell<_>>`. A [`PropertyTree`] is a handle made of that shared
//! storage and the id of the node it designates, so cloning a handle never
//! copies nodes and edits through one handle are seen by every other handle
//! into the same storage. Handles are single-threaded.
//!
//! Each slot counts the handles designating it. A subtree removed from its
//! parent is reclaimed right away, except for nodes that a handle still
//! designates: those stay readable, with everything below them, until their
//! last handle is dropped.

use crate::path::{IntoPath, Path, Segment};
use crate::{Error, Result};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;
use tracing::trace;

/// Identifier of a node inside its storage arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

impl NodeId {
    /// The topmost node of every storage
    pub const ROOT: NodeId = NodeId(0);

    /// Get the raw slot index
    pub fn index(&self) -> usize {
        self.0
    }
}

/// A node in the arena
#[derive(Debug, Default)]
struct Slot {
    value: String,
    children: VecDeque<(String, NodeId)>,
    /// Positions into `children` sorted by key, built on first use
    sorted: Option<Vec<usize>>,
    /// Live handles designating this node
    handles: Cell<usize>,
    /// Removed from its parent, kept only for its handles
    detached: bool,
}

/// Backing storage shared by all handles into one tree
///
/// Freed slots go to a free list and are reused by later insertions.
#[derive(Debug, Default)]
pub struct Storage {
    slots: Vec<Slot>,
    free: Vec<NodeId>,
}

/// Owned subtree built by the readers before it enters a storage
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Node {
    pub(crate) value: String,
    pub(crate) children: Vec<(String, Node)>,
}

impl Storage {
    fn with_root(value: String) -> Self {
        let mut storage = Self::default();
        storage.alloc(value);
        storage
    }

    fn slot(&self, id: NodeId) -> &Slot {
        &self.slots[id.0]
    }

    fn slot_mut(&mut self, id: NodeId) -> &mut Slot {
        &mut self.slots[id.0]
    }

    /// Mutable children of a node; drops the cached key order
    fn children_mut(&mut self, id: NodeId) -> &mut VecDeque<(String, NodeId)> {
        let slot = self.slot_mut(id);
        slot.sorted = None;
        &mut slot.children
    }

    fn alloc(&mut self, value: String) -> NodeId {
        let slot = Slot {
            value,
            ..Default::default()
        };
        match self.free.pop() {
            Some(id) => {
                self.slots[id.0] = slot;
                id
            }
            None => {
                self.slots.push(slot);
                NodeId(self.slots.len() - 1)
            }
        }
    }

    /// Reclaim a subtree that left the tree
    ///
    /// Nodes designated by a handle are marked detached instead, together
    /// with everything below them.
    fn release(&mut self, id: NodeId) {
        let mut pending = vec![id];
        while let Some(id) = pending.pop() {
            let slot = self.slot_mut(id);
            if slot.handles.get() > 0 {
                slot.detached = true;
                continue;
            }
            pending.extend(slot.children.drain(..).map(|(_, child)| child));
            *slot = Slot::default();
            self.free.push(id);
        }
    }

    fn add_handle(&self, id: NodeId) {
        let handles = &self.slot(id).handles;
        handles.set(handles.get() + 1);
    }

    fn drop_handle(&mut self, id: NodeId) {
        let slot = self.slot(id);
        let remaining = slot.handles.get().saturating_sub(1);
        slot.handles.set(remaining);
        if remaining == 0 && slot.detached {
            trace!("Reclaiming detached node {}", id.0);
            self.release(id);
        }
    }

    /// First child matching the segment key, or the indexed one among duplicates
    fn find_child(&self, parent: NodeId, segment: &Segment) -> Option<NodeId> {
        self.slot(parent)
            .children
            .iter()
            .filter(|(key, _)| *key == segment.key)
            .nth(segment.index.unwrap_or(0))
            .map(|(_, id)| *id)
    }

    fn resolve(&self, from: NodeId, path: &Path) -> Option<NodeId> {
        path.segments()
            .iter()
            .try_fold(from, |node, segment| self.find_child(node, segment))
    }

    /// Walk `segments` from `from`, appending every missing plain segment
    fn force_path(&mut self, from: NodeId, segments: &[Segment], whole: &Path) -> Result<NodeId> {
        let mut node = from;
        for segment in segments {
            node = match self.find_child(node, segment) {
                Some(child) => child,
                None if segment.index.is_none() => {
                    trace!("Creating intermediate node '{}' for {}", segment.key, whole);
                    let child = self.alloc(String::new());
                    self.children_mut(node)
                        .push_back((segment.key.clone(), child));
                    child
                }
                None => return Err(Error::PathNotFound(whole.to_string())),
            };
        }
        Ok(node)
    }

    /// Copy the subtree at `id` of `src` into this storage
    fn copy_from(&mut self, src: &Storage, id: NodeId) -> NodeId {
        let top = self.alloc(src.slot(id).value.clone());
        let mut pending = vec![(id, top)];
        while let Some((from, to)) = pending.pop() {
            let mut children = VecDeque::with_capacity(src.slot(from).children.len());
            for (key, child) in &src.slot(from).children {
                let copy = self.alloc(src.slot(*child).value.clone());
                pending.push((*child, copy));
                children.push_back((key.clone(), copy));
            }
            self.slot_mut(to).children = children;
        }
        top
    }

    /// A standalone storage holding a copy of the subtree at `id` as its root
    fn extract(&self, id: NodeId) -> Storage {
        let mut snapshot = Storage::default();
        snapshot.copy_from(self, id);
        snapshot
    }

    /// Overwrite `target` in place with a copy of the root of `src`
    fn assign(&mut self, target: NodeId, src: &Storage) {
        let content = self.copy_from(src, NodeId::ROOT);
        self.overwrite(target, content);
    }

    /// Move the value and children of the unattached `content` into `target`
    fn overwrite(&mut self, target: NodeId, content: NodeId) {
        let value = std::mem::take(&mut self.slot_mut(content).value);
        let children = std::mem::take(&mut self.slot_mut(content).children);
        let old = std::mem::replace(self.children_mut(target), children);
        self.slot_mut(target).value = value;
        self.release(content);
        for (_, child) in old {
            self.release(child);
        }
    }

    /// Recursive; the readers that build a `Node` bound its depth
    fn import(&mut self, node: Node) -> NodeId {
        let id = self.alloc(node.value);
        let children = node
            .children
            .into_iter()
            .map(|(key, child)| (key, self.import(child)))
            .collect();
        self.slot_mut(id).children = children;
        id
    }

    fn sorted_positions(&mut self, id: NodeId) -> Vec<usize> {
        let slot = self.slot_mut(id);
        if slot.sorted.is_none() {
            let mut positions: Vec<usize> = (0..slot.children.len()).collect();
            // stable: siblings with equal keys keep insertion order
            positions.sort_by(|a, b| slot.children[*a].0.cmp(&slot.children[*b].0));
            slot.sorted = Some(positions);
        }
        slot.sorted.clone().unwrap_or_default()
    }

    fn nodes_equal(&self, a: NodeId, other: &Storage, b: NodeId) -> bool {
        let mut pending = vec![(a, b)];
        while let Some((a, b)) = pending.pop() {
            let (left, right) = (self.slot(a), other.slot(b));
            if left.value != right.value || left.children.len() != right.children.len() {
                return false;
            }
            for ((left_key, left_id), (right_key, right_id)) in
                left.children.iter().zip(right.children.iter())
            {
                if left_key != right_key {
                    return false;
                }
                pending.push((*left_id, *right_id));
            }
        }
        true
    }

    fn write_debug_form(&self, f: &mut fmt::Formatter<'_>, id: NodeId) -> fmt::Result {
        enum Step<'a> {
            Node(NodeId, usize),
            Key(&'a str, usize),
            Close(usize),
            Newline,
        }

        fn tabs(f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
            (0..depth).try_for_each(|_| f.write_str("\t"))
        }

        let mut pending = vec![Step::Node(id, 0)];
        while let Some(step) = pending.pop() {
            match step {
                Step::Node(id, depth) => {
                    let slot = self.slot(id);
                    tabs(f, depth)?;
                    writeln!(f, "{}", slot.value)?;
                    tabs(f, depth)?;
                    writeln!(f, "{{")?;
                    pending.push(Step::Close(depth));
                    for (key, child) in slot.children.iter().rev() {
                        pending.push(Step::Newline);
                        pending.push(Step::Node(*child, depth + 1));
                        pending.push(Step::Key(key, depth));
                    }
                }
                Step::Key(key, depth) => {
                    tabs(f, depth)?;
                    writeln!(f, "{} =", key)?;
                }
                Step::Close(depth) => {
                    tabs(f, depth)?;
                    f.write_str("}")?;
                }
                Step::Newline => writeln!(f)?,
            }
        }
        Ok(())
    }
}

/// Parse a node value, retrying with surrounding whitespace stripped
pub(crate) fn parse_value<T: FromStr>(value: &str) -> Result<T> {
    value
        .parse::<T>()
        .or_else(|_| value.trim().parse::<T>())
        .map_err(|_| Error::Conversion {
            value: value.to_string(),
            target: std::any::type_name::<T>(),
        })
}

/// A handle on one node of a property tree
///
/// `Clone` shares the underlying storage; use [`PropertyTree::deep_clone`]
/// for an independent copy. Equality is structural: values and children
/// (keys and subtrees, in order) must match.
pub struct PropertyTree {
    storage: Rc<RefCell<Storage>>,
    id: NodeId,
}

impl Default for PropertyTree {
    fn default() -> Self {
        Self::new()
    }
}

impl PropertyTree {
    /// Create an empty tree with no value and no children
    pub fn new() -> Self {
        Self::with_value("")
    }

    /// Create a tree whose root holds `value`
    pub fn with_value(value: impl fmt::Display) -> Self {
        Self::owning(Storage::with_root(value.to_string()))
    }

    /// First handle on the root of a fresh storage
    fn owning(storage: Storage) -> Self {
        storage.add_handle(NodeId::ROOT);
        Self {
            storage: Rc::new(RefCell::new(storage)),
            id: NodeId::ROOT,
        }
    }

    pub(crate) fn from_node(node: Node) -> Self {
        let tree = Self::new();
        {
            let mut storage = tree.storage.borrow_mut();
            let content = storage.import(node);
            storage.overwrite(NodeId::ROOT, content);
        }
        tree
    }

    /// Standalone copy of the designated subtree
    fn snapshot(&self) -> Storage {
        self.storage.borrow().extract(self.id)
    }

    fn at(&self, id: NodeId) -> Self {
        self.storage.borrow().add_handle(id);
        Self {
            storage: Rc::clone(&self.storage),
            id,
        }
    }

    /// Id of the designated node inside its storage
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Handle on the topmost node of the backing storage
    pub fn root(&self) -> Self {
        self.at(NodeId::ROOT)
    }

    // ------------------------------------------------------------------
    // Sharing
    // ------------------------------------------------------------------

    /// Number of handles currently holding the backing storage
    pub fn share_count(&self) -> usize {
        Rc::strong_count(&self.storage)
    }

    /// Whether this handle designates the topmost node of its storage
    pub fn is_root(&self) -> bool {
        self.id == NodeId::ROOT
    }

    /// Whether both handles are backed by the same storage instance
    pub fn shares_storage_with(&self, other: &PropertyTree) -> bool {
        Rc::ptr_eq(&self.storage, &other.storage)
    }

    /// Copy the designated subtree into a new, unshared storage
    pub fn deep_clone(&self) -> Self {
        Self::owning(self.snapshot())
    }

    // ------------------------------------------------------------------
    // Own value
    // ------------------------------------------------------------------

    /// Raw text of this node's value (empty when it holds none)
    pub fn data(&self) -> String {
        self.storage.borrow().slot(self.id).value.clone()
    }

    /// Whether this node holds a non-empty value
    pub fn has_value(&self) -> bool {
        !self.storage.borrow().slot(self.id).value.is_empty()
    }

    /// Parse this node's value
    pub fn get_value<T: FromStr>(&self) -> Result<T> {
        parse_value(&self.storage.borrow().slot(self.id).value)
    }

    /// Replace this node's value; children are untouched
    pub fn put_value(&self, value: impl fmt::Display) {
        self.storage.borrow_mut().slot_mut(self.id).value = value.to_string();
    }

    // ------------------------------------------------------------------
    // Path access
    // ------------------------------------------------------------------

    /// Handle on the node at `path`
    ///
    /// Each segment picks the first child with a matching key unless it
    /// carries an explicit index.
    pub fn get_child(&self, path: impl IntoPath) -> Result<Self> {
        let path = path.into_path()?;
        let id = self
            .storage
            .borrow()
            .resolve(self.id, &path)
            .ok_or_else(|| Error::PathNotFound(path.to_string()))?;
        Ok(self.at(id))
    }

    /// Like [`PropertyTree::get_child`] but yields `None` instead of failing
    pub fn get_child_optional(&self, path: impl IntoPath) -> Option<Self> {
        self.get_child(path).ok()
    }

    /// The node at `path`, or a handle sharing `default` when there is none
    pub fn get_child_or(&self, path: impl IntoPath, default: &PropertyTree) -> Self {
        self.get_child_optional(path)
            .unwrap_or_else(|| default.clone())
    }

    /// Set the subtree at `path` to a copy of `value`
    ///
    /// Missing ancestors are created. An existing node at `path` is
    /// overwritten in place, so other handles on it see the new content,
    /// and its previous descendants are discarded. The empty path
    /// overwrites this node.
    pub fn put_child(&self, path: impl IntoPath, value: &PropertyTree) -> Result<Self> {
        let path = path.into_path()?;
        let snapshot = value.snapshot();
        let mut storage = self.storage.borrow_mut();

        let id = match path.split_last() {
            None => {
                storage.assign(self.id, &snapshot);
                self.id
            }
            Some((parents, last)) => {
                let parent = storage.force_path(self.id, parents, &path)?;
                match storage.find_child(parent, last) {
                    Some(existing) => {
                        storage.assign(existing, &snapshot);
                        existing
                    }
                    None if last.index.is_none() => {
                        let id = storage.copy_from(&snapshot, NodeId::ROOT);
                        storage
                            .children_mut(parent)
                            .push_back((last.key.clone(), id));
                        id
                    }
                    None => return Err(Error::PathNotFound(path.to_string())),
                }
            }
        };
        drop(storage);
        Ok(self.at(id))
    }

    /// Append a copy of `value` at `path`, next to any existing same-key sibling
    ///
    /// Never replaces; duplicate keys are the expected outcome.
    pub fn add_child(&self, path: impl IntoPath, value: &PropertyTree) -> Result<Self> {
        let path = path.into_path()?;
        let snapshot = value.snapshot();
        let (parents, last) = path
            .split_last()
            .ok_or_else(|| Error::InvalidPath("cannot add a child at the empty path".to_string()))?;

        let mut storage = self.storage.borrow_mut();
        let parent = storage.force_path(self.id, parents, &path)?;
        let id = storage.copy_from(&snapshot, NodeId::ROOT);
        storage
            .children_mut(parent)
            .push_back((last.key.clone(), id));
        drop(storage);
        Ok(self.at(id))
    }

    /// Parse the value at `path`
    pub fn get<T: FromStr>(&self, path: impl IntoPath) -> Result<T> {
        self.get_child(path)?.get_value()
    }

    /// Parse the value at `path`, `None` if it is missing or does not parse
    pub fn get_optional<T: FromStr>(&self, path: impl IntoPath) -> Option<T> {
        self.get(path).ok()
    }

    /// Parse the value at `path`, falling back to `default`
    pub fn get_or<T: FromStr>(&self, path: impl IntoPath, default: T) -> T {
        self.get_optional(path).unwrap_or(default)
    }

    /// Set the value at `path`, creating the node and its ancestors if needed
    ///
    /// An existing node keeps its children; only its value changes.
    pub fn put(&self, path: impl IntoPath, value: impl fmt::Display) -> Result<Self> {
        let path = path.into_path()?;
        let value = value.to_string();
        let mut storage = self.storage.borrow_mut();

        if let Some(existing) = storage.resolve(self.id, &path) {
            storage.slot_mut(existing).value = value;
            drop(storage);
            return Ok(self.at(existing));
        }

        // the empty path always resolves, so there is a last segment here
        let Some((parents, last)) = path.split_last() else {
            return Err(Error::PathNotFound(path.to_string()));
        };
        if last.index.is_some() {
            return Err(Error::PathNotFound(path.to_string()));
        }
        let parent = storage.force_path(self.id, parents, &path)?;
        let id = storage.alloc(value);
        storage
            .children_mut(parent)
            .push_back((last.key.clone(), id));
        drop(storage);
        Ok(self.at(id))
    }

    /// Append a new node holding `value` at `path`
    pub fn add(&self, path: impl IntoPath, value: impl fmt::Display) -> Result<Self> {
        self.add_child(path, &PropertyTree::with_value(value))
    }

    // ------------------------------------------------------------------
    // Direct children
    // ------------------------------------------------------------------

    /// Number of direct children
    pub fn len(&self) -> usize {
        self.storage.borrow().slot(self.id).children.len()
    }

    /// Whether this node has no children
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn front(&self) -> Option<(String, Self)> {
        let storage = self.storage.borrow();
        let (key, id) = storage.slot(self.id).children.front()?;
        Some((key.clone(), self.at(*id)))
    }

    pub fn back(&self) -> Option<(String, Self)> {
        let storage = self.storage.borrow();
        let (key, id) = storage.slot(self.id).children.back()?;
        Some((key.clone(), self.at(*id)))
    }

    /// Prepend a copy of `value` under `key`
    pub fn push_front(&self, key: impl Into<String>, value: &PropertyTree) -> Self {
        let snapshot = value.snapshot();
        let mut storage = self.storage.borrow_mut();
        let id = storage.copy_from(&snapshot, NodeId::ROOT);
        storage.children_mut(self.id).push_front((key.into(), id));
        drop(storage);
        self.at(id)
    }

    /// Append a copy of `value` under `key`
    pub fn push_back(&self, key: impl Into<String>, value: &PropertyTree) -> Self {
        let snapshot = value.snapshot();
        let mut storage = self.storage.borrow_mut();
        let id = storage.copy_from(&snapshot, NodeId::ROOT);
        storage.children_mut(self.id).push_back((key.into(), id));
        drop(storage);
        self.at(id)
    }

    /// Detach the first child; the returned handle keeps it readable
    pub fn pop_front(&self) -> Option<(String, Self)> {
        let (key, id) = self
            .storage
            .borrow_mut()
            .children_mut(self.id)
            .pop_front()?;
        Some((key, self.detached(id)))
    }

    /// Detach the last child; the returned handle keeps it readable
    pub fn pop_back(&self) -> Option<(String, Self)> {
        let (key, id) = self
            .storage
            .borrow_mut()
            .children_mut(self.id)
            .pop_back()?;
        Some((key, self.detached(id)))
    }

    /// Handle on a node just removed from its parent
    fn detached(&self, id: NodeId) -> Self {
        let handle = self.at(id);
        self.storage.borrow_mut().release(id);
        handle
    }

    /// Reverse the order of the direct children
    pub fn reverse(&self) {
        self.storage
            .borrow_mut()
            .children_mut(self.id)
            .make_contiguous()
            .reverse();
    }

    /// Number of direct children with `key`
    pub fn count(&self, key: &str) -> usize {
        self.storage
            .borrow()
            .slot(self.id)
            .children
            .iter()
            .filter(|(k, _)| k == key)
            .count()
    }

    /// Remove every direct child with `key`, returning how many were removed
    pub fn erase(&self, key: &str) -> usize {
        let mut storage = self.storage.borrow_mut();
        let children = std::mem::take(storage.children_mut(self.id));
        let (kept, removed): (VecDeque<_>, VecDeque<_>) =
            children.into_iter().partition(|(k, _)| k != key);
        *storage.children_mut(self.id) = kept;
        for (_, id) in &removed {
            storage.release(*id);
        }
        removed.len()
    }

    /// Remove all direct children; the value is kept
    pub fn clear(&self) {
        let mut storage = self.storage.borrow_mut();
        let removed = std::mem::take(storage.children_mut(self.id));
        for (_, id) in removed {
            storage.release(id);
        }
    }

    /// First direct child with `key`
    pub fn find(&self, key: &str) -> Option<Self> {
        self.get_child_optional(Path::from_segments([Segment::new(key)]))
    }

    /// Direct children in insertion order; `.rev()` walks them backwards
    pub fn children(&self) -> Children {
        let ids: Vec<(String, NodeId)> = self
            .storage
            .borrow()
            .slot(self.id)
            .children
            .iter()
            .cloned()
            .collect();
        self.handles(ids)
    }

    /// Direct children sorted by key, same-key siblings in insertion order
    pub fn ordered_children(&self) -> Children {
        let ids: Vec<(String, NodeId)> = {
            let mut storage = self.storage.borrow_mut();
            let positions = storage.sorted_positions(self.id);
            let children = &storage.slot(self.id).children;
            positions
                .into_iter()
                .map(|position| children[position].clone())
                .collect()
        };
        self.handles(ids)
    }

    fn handles(&self, ids: Vec<(String, NodeId)>) -> Children {
        let items: Vec<_> = ids
            .into_iter()
            .map(|(key, id)| (key, self.at(id)))
            .collect();
        Children {
            inner: items.into_iter(),
        }
    }
}

impl Clone for PropertyTree {
    fn clone(&self) -> Self {
        self.at(self.id)
    }
}

impl Drop for PropertyTree {
    fn drop(&mut self) {
        if let Ok(mut storage) = self.storage.try_borrow_mut() {
            storage.drop_handle(self.id);
        }
    }
}

impl PartialEq for PropertyTree {
    fn eq(&self, other: &Self) -> bool {
        let left = self.storage.borrow();
        let right = other.storage.borrow();
        left.nodes_equal(self.id, &right, other.id)
    }
}

impl fmt::Debug for PropertyTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "PropertyTree")?;
        fmt::Display::fmt(self, f)
    }
}

/// Indented debugging form: value, then each child as `key =` and its subtree
impl fmt::Display for PropertyTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.storage.borrow().write_debug_form(f, self.id)
    }
}

impl From<&str> for PropertyTree {
    fn from(value: &str) -> Self {
        Self::with_value(value)
    }
}

impl From<String> for PropertyTree {
    fn from(value: String) -> Self {
        Self::with_value(value)
    }
}

/// Snapshot iterator over `(key, handle)` pairs of direct children
///
/// Taken when the iterator is created; later mutation of the parent does not
/// affect it, but edits through the yielded handles are live.
#[derive(Debug)]
pub struct Children {
    inner: std::vec::IntoIter<(String, PropertyTree)>,
}

impl Iterator for Children {
    type Item = (String, PropertyTree);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl DoubleEndedIterator for Children {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.inner.next_back()
    }
}

impl ExactSizeIterator for Children {}
