//! Error types for the property tree and its codecs

use thiserror::Error;

/// Result type for property tree operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while navigating, converting or serializing a tree
///
/// Codec variants carry the file they came from. The file is empty when the
/// codec worked on an in-memory buffer.
#[derive(Error, Debug)]
pub enum Error {
    /// No child matched a path segment
    #[error("Path not found: {0}")]
    PathNotFound(String),

    /// A path segment could not be parsed
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// A node value could not be parsed into the requested type
    #[error("Conversion error: cannot convert {value:?} to {target}")]
    Conversion { value: String, target: &'static str },

    /// A node did not have the number of children a fixed container needs
    #[error("Size mismatch: expected {expected} children, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    /// A Lua table key was neither a string nor a number
    #[error("{}: Support only string or number keys, got {found}", shown(.file))]
    UnsupportedKeyType { file: String, found: String },

    /// A Lua table value was not a table, string, number or boolean
    #[error(
        "{}: The value type must be number or boolean or table or string, got {found}",
        shown(.file)
    )]
    UnsupportedValueType { file: String, found: String },

    /// The requested root variable is nil after evaluation
    #[error("{}: Root key not found: {root}", shown(.file))]
    RootNotFound { file: String, root: String },

    /// The Lua runtime rejected the source text
    #[error("{}: {message}", shown(.file))]
    Script { file: String, message: String },

    /// The tree holds data that has no Lua table representation
    #[error(
        "{}: ptree contains data that cannot be represented in a Lua table (at {})",
        shown(.file),
        shown_path(.path)
    )]
    UnrepresentableTree { file: String, path: String },

    /// A file could not be opened
    #[error("{}: cannot open file", shown(.file))]
    FileOpen {
        file: String,
        #[source]
        source: std::io::Error,
    },

    /// Reading or writing an opened file failed
    #[error("{}: I/O error: {source}", shown(.file))]
    Io {
        file: String,
        #[source]
        source: std::io::Error,
    },

    /// KDL parsing error
    #[error("{}: KDL parse error: {source}", shown(.file))]
    KdlParse {
        file: String,
        #[source]
        source: kdl::KdlError,
    },
}

impl Error {
    /// The file a codec error is annotated with, if this is a codec error
    pub fn file(&self) -> Option<&str> {
        match self {
            Error::UnsupportedKeyType { file, .. }
            | Error::UnsupportedValueType { file, .. }
            | Error::RootNotFound { file, .. }
            | Error::Script { file, .. }
            | Error::UnrepresentableTree { file, .. }
            | Error::FileOpen { file, .. }
            | Error::Io { file, .. }
            | Error::KdlParse { file, .. } => Some(file),
            _ => None,
        }
    }

    /// Re-annotate a codec error with the file it originated from
    ///
    /// Non-codec errors are returned unchanged.
    pub fn with_file(mut self, name: impl Into<String>) -> Self {
        match &mut self {
            Error::UnsupportedKeyType { file, .. }
            | Error::UnsupportedValueType { file, .. }
            | Error::RootNotFound { file, .. }
            | Error::Script { file, .. }
            | Error::UnrepresentableTree { file, .. }
            | Error::FileOpen { file, .. }
            | Error::Io { file, .. }
            | Error::KdlParse { file, .. } => *file = name.into(),
            _ => {}
        }
        self
    }
}

fn shown(file: &str) -> &str {
    if file.is_empty() {
        "<unspecified file>"
    } else {
        file
    }
}

fn shown_path(path: &str) -> &str {
    if path.is_empty() {
        "<root>"
    } else {
        path
    }
}
