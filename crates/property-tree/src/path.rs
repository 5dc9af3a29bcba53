//! Paths used to navigate from a node to one of its descendants
//!
//! A path is a list of segments. Each segment names a child key and may carry
//! an explicit index to pick the n-th child among siblings sharing that key.
//! In string form segments are joined by a separator (`.` by default) and an
//! index is written as a `[n]` suffix:
//!
//! ```text
//! server.listen[1].port
//! ```

use crate::{Error, Result};
use std::fmt;

/// Default separator between path segments
pub const DEFAULT_SEPARATOR: char = '.';

/// One step of a path
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Segment {
    /// Child key to match
    pub key: String,
    /// Which of the children with `key` to select (0-based); the first when `None`
    pub index: Option<usize>,
}

impl Segment {
    /// A segment that matches the first child with `key`
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            index: None,
        }
    }

    /// A segment that matches the `index`-th child with `key`
    pub fn indexed(key: impl Into<String>, index: usize) -> Self {
        Self {
            key: key.into(),
            index: Some(index),
        }
    }

    fn parse(raw: &str, whole: &str) -> Result<Self> {
        let Some(open) = raw.rfind('[') else {
            return Ok(Self::new(raw));
        };
        let Some(inner) = raw[open + 1..].strip_suffix(']') else {
            return Err(Error::InvalidPath(format!(
                "unterminated index in segment '{}' of '{}'",
                raw, whole
            )));
        };
        let index = inner.parse::<usize>().map_err(|_| {
            Error::InvalidPath(format!("bad index '{}' in segment '{}' of '{}'", inner, raw, whole))
        })?;
        Ok(Self::indexed(&raw[..open], index))
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index {
            Some(index) => write!(f, "{}[{}]", self.key, index),
            None => write!(f, "{}", self.key),
        }
    }
}

/// A locator relative to some node
///
/// The empty path designates the node itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Path {
    segments: Vec<Segment>,
    separator: char,
}

impl Default for Path {
    fn default() -> Self {
        Self {
            segments: Vec::new(),
            separator: DEFAULT_SEPARATOR,
        }
    }
}

impl Path {
    /// The empty path
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a path using the default separator
    pub fn parse(path: &str) -> Result<Self> {
        Self::with_separator(path, DEFAULT_SEPARATOR)
    }

    /// Parse a path split on `separator`
    pub fn with_separator(path: &str, separator: char) -> Result<Self> {
        let segments = if path.is_empty() {
            Vec::new()
        } else {
            path.split(separator)
                .map(|raw| Segment::parse(raw, path))
                .collect::<Result<Vec<_>>>()?
        };
        Ok(Self {
            segments,
            separator,
        })
    }

    /// Build a path from segments without any string parsing
    ///
    /// This is the way to reach keys that contain the separator or brackets.
    pub fn from_segments(segments: impl IntoIterator<Item = Segment>) -> Self {
        Self {
            segments: segments.into_iter().collect(),
            separator: DEFAULT_SEPARATOR,
        }
    }

    /// Append a plain key segment
    pub fn push(&mut self, key: impl Into<String>) {
        self.segments.push(Segment::new(key));
    }

    /// Append a segment
    pub fn push_segment(&mut self, segment: Segment) {
        self.segments.push(segment);
    }

    /// A copy of this path with `key` appended
    pub fn join(&self, key: impl Into<String>) -> Self {
        let mut path = self.clone();
        path.push(key);
        path
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn separator(&self) -> char {
        self.separator
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Split into all but the last segment and the last segment
    pub fn split_last(&self) -> Option<(&[Segment], &Segment)> {
        self.segments
            .split_last()
            .map(|(last, parents)| (parents, last))
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                write!(f, "{}", self.separator)?;
            }
            write!(f, "{}", segment)?;
        }
        Ok(())
    }
}

/// Conversion into a [`Path`], so tree operations accept `&str` directly
pub trait IntoPath {
    fn into_path(self) -> Result<Path>;
}

impl IntoPath for Path {
    fn into_path(self) -> Result<Path> {
        Ok(self)
    }
}

impl IntoPath for &Path {
    fn into_path(self) -> Result<Path> {
        Ok(self.clone())
    }
}

impl IntoPath for &str {
    fn into_path(self) -> Result<Path> {
        Path::parse(self)
    }
}

impl IntoPath for &String {
    fn into_path(self) -> Result<Path> {
        Path::parse(self)
    }
}

impl IntoPath for String {
    fn into_path(self) -> Result<Path> {
        Path::parse(&self)
    }
}
