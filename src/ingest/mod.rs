//! Incremental file ingestion.
//!
//! Each monitored source is a pair of files maintained by the upstream
//! platform: an append-only data file of pipe-delimited records, and a small
//! "flag" pointer file naming the data file plus the inclusive line range
//! that is new since the last poll. Ingestion is stateless on our side — the
//! upstream writer owns the flag state, and every cycle resolves it fresh.
//!
//! - [`cursor`]: flag-file resolution into a [`Cursor`] line window
//! - [`extract`]: schema-driven decoding of a window into [`Record`]s
//! - [`engine`]: per-cycle orchestration across all configured sources

mod cursor;
mod engine;
mod extract;

pub use cursor::{resolve, Cursor};
pub use engine::{CycleStats, IngestEngine, SourceSpec};
pub use extract::{extract, FieldValue, Record};

use std::path::PathBuf;

use thiserror::Error;

use crate::schema::UnknownSourceKind;

/// Errors raised on the ingestion path.
///
/// All of these are contained to one source for one cycle: the engine logs
/// them, bumps the ingest error counter, and moves on to the next source.
#[derive(Debug, Error)]
pub enum IngestError {
    /// A configured source names a schema that is not registered.
    #[error(transparent)]
    UnknownSourceKind(#[from] UnknownSourceKind),

    /// The flag file could not be opened or read.
    #[error("flag file '{path}' unreadable: {source}")]
    FlagFileUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The flag file's first line does not have the expected shape.
    #[error("flag file '{path}' malformed: {reason}")]
    FlagFileMalformed { path: PathBuf, reason: String },

    /// The advertised line range is not usable.
    #[error("flag file '{path}' advertises an invalid range: {reason}")]
    FlagRangeInvalid { path: PathBuf, reason: String },

    /// The data file named by the flag file could not be opened or read.
    #[error("data file '{path}' unreadable: {source}")]
    DataFileUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A line in the window has the wrong number of `|`-delimited tokens.
    ///
    /// A shifted or misaligned file is unsafe to keep parsing, so this aborts
    /// the whole extraction for the cursor — the caller sees zero records.
    #[error("line {line}: expected {expected} fields, got {got}")]
    FieldCountMismatch {
        line: u64,
        expected: usize,
        got: usize,
    },
}
