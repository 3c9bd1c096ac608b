//! Error and Result types for hydralog operations.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// A convenience `Result` type for hydralog operations.
pub type Result<T> = std::result::Result<T, HydraError>;

/// The error type for log file operations.
#[derive(Debug, Error)]
pub enum HydraError {
    /// First line of the file is not a recognizable magic comment.
    #[error("missing or malformed magic line: {0:?}")]
    BadMagic(String),

    /// Magic line names a format this library does not speak.
    #[error("unknown log format: {0:?}")]
    UnknownFormat(String),

    /// A `#%` or `#:` header line could not be parsed.
    #[error("malformed header: {0}")]
    Header(String),

    /// A required `#%` metadata key was absent.
    #[error("missing required metadata key: {0}")]
    MissingMetadata(&'static str),

    /// A field declaration was invalid or duplicated.
    #[error("invalid field declaration: {0}")]
    FieldDecl(String),

    /// The tick counter field of a record could not be decoded.
    #[error("malformed tick counter: {0:?}")]
    BadCounter(String),

    /// The tick counter decreased, which the format forbids.
    #[error("tick counter went backwards: {prev} -> {next}")]
    CounterRegression {
        /// Counter value before the offending record.
        prev: u64,
        /// Counter value the offending record carries.
        next: u64,
    },

    /// A stored value contained a control character other than `\n`.
    #[error("control character {byte:#04x} in field value")]
    ControlChar {
        /// The offending byte.
        byte: u8,
    },

    /// A record line carried more fields than the header declares.
    #[error("record has {got} fields but the header declares {declared}")]
    FieldCount {
        /// Fields found on the record line.
        got: usize,
        /// Fields declared by the `#:` header line.
        declared: usize,
    },

    /// A continuation line targeted a column outside the field vector.
    #[error("continuation column {column} outside declared fields (1..={fields})")]
    ContinuationColumn {
        /// 1-based column the continuation line indents to.
        column: usize,
        /// Number of declared fields.
        fields: usize,
    },

    /// A record field was accessed that the record does not carry.
    #[error("no such field in record: {0:?}")]
    NoSuchField(String),

    /// Another process holds the write lock on the file.
    #[error("file is being written by another process: {}", .0.display())]
    Locked(PathBuf),

    /// `create` was pointed at a path that already exists.
    #[error("refusing to overwrite existing file: {}", .0.display())]
    AlreadyExists(PathBuf),

    /// The byte source cannot rewind to the requested address.
    #[error("source does not support rewinding")]
    Unseekable,

    /// Transient I/O condition; the operation can be retried as-is.
    #[error("interrupted, try again")]
    Again,

    /// Record bytes were not valid UTF-8.
    #[error("invalid UTF-8 in record data")]
    Utf8(#[from] std::str::Utf8Error),

    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
