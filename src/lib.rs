//! Bulk ingest of the Majestic Million domain ranking CSV into PostgreSQL.
//!
//! - Header stage: raw CSV header -> target columns -> permutation.
//! - Producer: decodes and reshapes records into a bounded channel.
//! - Consumer: a single `COPY domain_ranking (...) FROM STDIN` fed by [`RowSource`].
//! - Reporter: samples the producer counter and redraws one progress line.
//!
//! Data shape:
//! - `Row` is a `Vec<String>` in [`TARGET_COLUMNS`] order.
//! - The whole ingest is one COPY statement, so it commits or rolls back as a unit.
#![cfg_attr(docsrs, feature(doc_cfg))]
//
mod codec;
pub mod config;
pub mod copy;
pub mod count;
pub mod db;
#[cfg(feature = "fast_local")]
mod fast;
pub mod ingest;
mod io;
pub mod logging;
pub mod producer;
pub mod progress;
pub mod schema;
pub mod source;

#[cfg(feature = "fast_local")]
pub use crate::fast::count_lines_local;
pub use crate::io::{build_csv_reader, reader_from_path, Compression, SourceMeta};

pub use crate::config::Config;
pub use crate::copy::{copy_rows, stream_rows, CopySink, PgCopySink, RowEncoder};
pub use crate::count::{count_rows, CountMode};
pub use crate::ingest::{run, IngestReport};
pub use crate::producer::Producer;
pub use crate::progress::{ProgressHandle, ProgressReporter};
pub use crate::schema::{
    build_permutation, map_headers, normalize_header, Permutation, Row, HEADER_ALIASES,
    TARGET_COLUMNS, TARGET_TABLE,
};
pub use crate::source::RowSource;

use thiserror::Error;

/// Error type returned by this crate.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("POSTGRES_URI is not set")]
    MissingDatabaseUrl,
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("unknown CSV header: {0}")]
    UnknownHeader(String),
    #[error("target column {0} not found in CSV header")]
    MissingColumn(String),
    #[error("record at line {line} has {found} fields, expected {expected}")]
    ShortRecord {
        line: u64,
        expected: usize,
        found: usize,
    },
    #[error("ingest cancelled")]
    Cancelled,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Csv(#[from] csv_async::Error),
    #[error("encoding COPY payload: {0}")]
    Encode(#[from] csv::Error),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type IngestResult<T> = std::result::Result<T, IngestError>;
