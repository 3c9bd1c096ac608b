//! hydralog - codec and merge engine for append-only TSV log files.
//!
//! This crate reads, writes, seeks and merges the human-readable,
//! tab-separated log formats `tsv0` and `tsv1`: one record per line,
//! differential tick counters in the first column, optional continuation
//! lines for multi-line values, and a self-describing comment header.
//!
//! # Components
//!
//! - [`StreamLineIter`]: bidirectional line iteration over buffers,
//!   seekable handles and streams, with bounded chunk caching
//! - [`Reader`]: header parsing, record decoding, auto-indexed time seeks
//! - [`Writer`]: deterministic emission with monotonic-derived timestamps
//!   and an exclusive advisory write lock
//! - [`MergeReader`]: timestamp-ordered k-way merge over several readers
//! - [`LogRecord`]: the decoded record with typed reserved accessors
//!
//! # Example
//!
//! ```rust,ignore
//! use hydralog::{Reader, Writer, WriterOptions};
//!
//! let mut writer = Writer::create("app.tsv", WriterOptions::default())?;
//! writer.info("service started")?;
//! writer.warn("low disk space")?;
//! drop(writer);
//!
//! let mut reader = Reader::open("app.tsv")?;
//! while let Some(record) = reader.next()? {
//!     println!("{record}");
//! }
//! ```
//!
//! The library is single-threaded and cooperative: readers and writers
//! are not internally synchronized, and only the line iterator's chunk
//! loads touch the operating system.

#![deny(missing_docs)]

pub mod cache;
pub mod codec;
pub mod error;
pub mod line;
pub mod merge;
pub mod reader;
pub mod record;
pub mod writer;

pub use cache::{RecentSet, SlidingArray};
pub use codec::{FieldSpec, Format, HeaderSpec};
pub use error::{HydraError, Result};
pub use line::{Line, LineIterOptions, StreamLineIter};
pub use merge::MergeReader;
pub use reader::{Reader, ReaderOptions};
pub use record::LogRecord;
pub use writer::{Writer, WriterOptions};
