//! Error types for the storage engine.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for engine operations.
///
/// Every operation returns its own value; nothing is parked in shared state.
#[derive(Error, Debug)]
pub enum Error {
    /// Group, dataset, file or session absent on a read, open or close
    #[error("Not found: {0}")]
    NotFound(String),

    /// Exclusive create hit an existing file or link
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Non-trailing dimensions (or rank) disagree with an existing dataset
    #[error("Shape mismatch for {name}: expected {expected}, got {actual}")]
    ShapeMismatch {
        name: String,
        expected: String,
        actual: String,
    },

    /// Slice write below the last written index
    #[error("Slice {index} of {name} is below the last written slice {last}")]
    OrderViolation { name: String, index: usize, last: usize },

    /// Operation not defined for this element type (text slicing, interpolation)
    #[error("Unsupported type for {op}: {ty}")]
    TypeUnsupported { op: &'static str, ty: String },

    /// Stored element type differs from the requested one
    #[error("Type mismatch for {name}: expected {expected}, got {actual}")]
    TypeMismatch {
        name: String,
        expected: String,
        actual: String,
    },

    /// Slice range outside the current extent
    #[error("Slices {start}..{end} out of range for {name} (extent {extent})")]
    OutOfRange {
        name: String,
        start: usize,
        end: usize,
        extent: usize,
    },

    /// The backing store rejected an operation
    #[error("Backing store failure: {0}")]
    BackingStore(String),

    /// Buffer could not be sized or allocated
    #[error("Allocation failure: {0}")]
    Allocation(String),

    /// Illegal or unsafe path string
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Object reference id does not resolve to a live object
    #[error("Object {0} not found")]
    ObjectNotFound(u32),

    /// Write through an object whose slice index is not bound yet
    #[error("Object {0} has no bound slice index")]
    ObjectNotBound(u32),

    /// Session id refers to a closed registry entry
    #[error("Session {0} is closed")]
    SessionClosed(usize),

    /// Archive file does not start with the expected magic bytes
    #[error("Invalid archive file: expected IDSAR magic bytes")]
    InvalidMagic,

    /// Unsupported archive format version
    #[error("Unsupported archive version: {0}")]
    UnsupportedVersion(u16),

    /// Archive is truncated
    #[error("Unexpected end of file at position {0}")]
    UnexpectedEof(u64),

    /// Archive content is structurally invalid
    #[error("Invalid file structure: {0}")]
    InvalidStructure(String),

    /// File missing on disk
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// UTF-8 conversion error
    #[error("Invalid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

impl Error {
    /// Create a not-found error.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Create an invalid structure error.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidStructure(msg.into())
    }

    /// Create a backing store error.
    pub fn store(msg: impl Into<String>) -> Self {
        Self::BackingStore(msg.into())
    }

    /// True for errors a reader treats as data absence.
    pub fn is_absence(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::FileNotFound(_))
    }
}

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = Error::InvalidMagic;
        assert!(e.to_string().contains("magic"));

        let e = Error::OrderViolation { name: "psi".into(), index: 1, last: 3 };
        assert!(e.to_string().contains("psi"));
        assert!(e.to_string().contains('3'));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "test");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_absence() {
        assert!(Error::not_found("x").is_absence());
        assert!(!Error::store("x").is_absence());
    }
}
