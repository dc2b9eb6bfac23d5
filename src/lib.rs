//! Streaming ingestion of semicolon-separated air-quality sensor exports.
//!
//! - Transport: local files or any `AsyncRead`, gzip/zstd, legacy charsets.
//! - Rows are validated one at a time; valid readings are written to a
//!   [`ReadingStore`] in batches, rejected rows come back in the summary and
//!   can be rendered as an error report.
//! - Stored readings are queried through [`ReadingsService`], which caches
//!   aggregate results.
//!
//! Data shape:
//! - `RawRow`: header/value pairs exactly as read
//! - `NormalizedReading { date, time, 13 optional measurements }`
#![cfg_attr(docsrs, feature(doc_cfg))]
//
pub mod cache;
mod codec;
pub mod config;
pub mod constants;
pub mod ingest;
mod io;
pub mod jobs;
pub mod parse;
pub mod query;
pub mod reading;
pub mod report;
pub mod store;
pub mod upload;
pub mod validate;

pub use crate::cache::{Cache, MemoryCache};
pub use crate::config::Config;
pub use crate::ingest::{IngestionSummary, Ingestor, Progress};
pub use crate::io::{build_reader, is_csv_upload, reader_from_path, UploadMeta};
pub use crate::jobs::{Job, JobId, JobRegistry, JobStatus};
pub use crate::query::{QueryError, ReadingsService};
pub use crate::reading::{Measurement, NormalizedReading, RawRow, RowValidationResult};
pub use crate::report::{generate_error_report, ReportDirectory};
pub use crate::store::{MemoryStore, ReadingStore, StoreError};
pub use crate::upload::{UploadOutcome, UploadService};
pub use crate::validate::validate_row;

use thiserror::Error;

/// Errors that stop an ingestion run. Invalid rows never do.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Csv(#[from] csv_async::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type IngestResult<T> = std::result::Result<T, IngestError>;
