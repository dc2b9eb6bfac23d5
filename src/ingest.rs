use crate::config::IngestConfig;
use crate::constants::{CSV_SEPARATOR, READ_BUFFER_CAPACITY, ROW_INDEX_OFFSET};
use crate::reading::{NormalizedReading, RawRow, RowValidationResult};
use crate::store::ReadingStore;
use crate::validate::validate_row;
use crate::IngestResult;
use crc32fast::Hasher as Crc32;
use csv_async::{AsyncReaderBuilder, StringRecord};
use std::sync::Arc;
use tokio::io::AsyncRead;
use tracing::{debug, info};

/// Result of ingesting one file.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestionSummary {
    pub total_rows: usize,
    /// Rows written to the store.
    pub valid_rows: usize,
    pub invalid_rows: usize,
    /// Rejected rows in file order.
    pub rejected: Vec<RowValidationResult>,
    pub batches_written: usize,
    /// CRC32 over the raw data rows.
    pub fingerprint: u32,
}

/// Counters reported after every batch write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Progress {
    pub rows_seen: usize,
    pub rows_written: usize,
}

/// Streams a CSV upload through validation into a [`ReadingStore`].
#[derive(Clone)]
pub struct Ingestor {
    store: Arc<dyn ReadingStore>,
    batch_size: usize,
}

impl Ingestor {
    pub fn new(store: Arc<dyn ReadingStore>, config: &IngestConfig) -> Self {
        Self {
            store,
            batch_size: config.batch_size.max(1),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn store(&self) -> &Arc<dyn ReadingStore> {
        &self.store
    }

    pub async fn ingest<R>(&self, reader: R) -> IngestResult<IngestionSummary>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        self.ingest_with_progress(reader, |_| {}).await
    }

    /// Ingest `reader`, calling `on_batch` after each successful write.
    ///
    /// Row problems end up in the summary. A read, parse or store error stops
    /// the run; batches already written stay written.
    pub async fn ingest_with_progress<R, F>(
        &self,
        reader: R,
        mut on_batch: F,
    ) -> IngestResult<IngestionSummary>
    where
        R: AsyncRead + Unpin + Send + 'static,
        F: FnMut(Progress) + Send,
    {
        let mut rdr = AsyncReaderBuilder::new()
            .delimiter(CSV_SEPARATOR)
            .has_headers(true)
            .flexible(true)
            .buffer_capacity(READ_BUFFER_CAPACITY)
            .create_reader(reader);

        let headers = rdr.headers().await?.clone();
        info!(columns = headers.len(), batch_size = self.batch_size, "ingestion started");

        let mut record = StringRecord::new();
        let mut pending: Vec<NormalizedReading> = Vec::with_capacity(self.batch_size);
        let mut rejected = Vec::new();
        let mut crc = Crc32::new();
        let mut progress = Progress::default();
        let mut batches_written = 0usize;

        while rdr.read_record(&mut record).await? {
            // file line of the record; blank lines are skipped by the reader
            let row_index = record
                .position()
                .map(|p| p.line() as usize)
                .unwrap_or(progress.rows_seen + ROW_INDEX_OFFSET);
            progress.rows_seen += 1;

            for (fi, field) in record.iter().enumerate() {
                if fi > 0 {
                    crc.update(&[0x1f]);
                }
                crc.update(field.as_bytes());
            }
            crc.update(&[0x1e]);

            let raw = RawRow::from_record(headers.iter(), record.iter());
            let result = validate_row(raw, row_index);
            match result.reading {
                Some(reading) => pending.push(reading),
                None => {
                    debug!(row = row_index, errors = ?result.errors, "row rejected");
                    rejected.push(result);
                }
            }

            if pending.len() >= self.batch_size {
                self.flush(&mut pending, &mut progress).await?;
                batches_written += 1;
                on_batch(progress);
            }
        }

        if !pending.is_empty() {
            self.flush(&mut pending, &mut progress).await?;
            batches_written += 1;
            on_batch(progress);
        }

        let summary = IngestionSummary {
            total_rows: progress.rows_seen,
            valid_rows: progress.rows_written,
            invalid_rows: rejected.len(),
            rejected,
            batches_written,
            fingerprint: crc.finalize(),
        };
        info!(
            total = summary.total_rows,
            valid = summary.valid_rows,
            invalid = summary.invalid_rows,
            batches = summary.batches_written,
            fingerprint = %format!("{:08x}", summary.fingerprint),
            "ingestion finished"
        );
        Ok(summary)
    }

    async fn flush(
        &self,
        pending: &mut Vec<NormalizedReading>,
        progress: &mut Progress,
    ) -> IngestResult<()> {
        self.store.insert_batch(pending).await?;
        progress.rows_written += pending.len();
        debug!(rows = pending.len(), written = progress.rows_written, "batch written");
        pending.clear();
        Ok(())
    }
}
