use crate::ingest::{IngestionSummary, Ingestor};
use crate::report::{generate_error_report, ReportDirectory, ReportError, ReportHandle};
use serde::Serialize;
use thiserror::Error;
use tokio::io::AsyncRead;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error(transparent)]
    Ingest(#[from] crate::IngestError),
    #[error(transparent)]
    Report(#[from] ReportError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RowCounts {
    pub total_rows: usize,
    pub valid_rows: usize,
    pub invalid_rows: usize,
}

impl From<&IngestionSummary> for RowCounts {
    fn from(s: &IngestionSummary) -> Self {
        Self {
            total_rows: s.total_rows,
            valid_rows: s.valid_rows,
            invalid_rows: s.invalid_rows,
        }
    }
}

/// What the caller of an upload gets back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadOutcome {
    pub message: String,
    pub summary: RowCounts,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_report: Option<ReportHandle>,
}

/// Ingests an upload and publishes an error report when rows were rejected.
#[derive(Clone)]
pub struct UploadService {
    ingestor: Ingestor,
    reports: ReportDirectory,
}

impl UploadService {
    pub fn new(ingestor: Ingestor, reports: ReportDirectory) -> Self {
        Self { ingestor, reports }
    }

    pub fn reports(&self) -> &ReportDirectory {
        &self.reports
    }

    pub async fn upload<R>(&self, reader: R) -> Result<UploadOutcome, UploadError>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let summary = self.ingestor.ingest(reader).await?;

        let error_report = if summary.invalid_rows > 0 {
            let report = generate_error_report(&summary.rejected);
            Some(self.reports.publish(&report).await?)
        } else {
            None
        };

        let message = if summary.invalid_rows > 0 {
            "Data processed with validation errors"
        } else {
            "Data processed successfully"
        };

        Ok(UploadOutcome {
            message: message.to_string(),
            summary: RowCounts::from(&summary),
            error_report,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IngestConfig;
    use crate::store::MemoryStore;
    use std::io::Cursor;
    use std::sync::Arc;
    use std::time::Duration;

    fn service(dir: &std::path::Path) -> UploadService {
        let ingestor = Ingestor::new(Arc::new(MemoryStore::new()), &IngestConfig::default());
        UploadService::new(ingestor, ReportDirectory::new(dir, Duration::from_secs(300)))
    }

    #[tokio::test]
    async fn clean_upload_has_no_report() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = service(dir.path())
            .upload(Cursor::new("Date;Time;CO(GT)\n10/03/2004;18.00.00;2,6\n"))
            .await
            .unwrap();

        assert_eq!(outcome.message, "Data processed successfully");
        assert_eq!(outcome.summary.valid_rows, 1);
        assert!(outcome.error_report.is_none());
    }

    #[tokio::test]
    async fn rejected_rows_publish_a_report() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path());
        let outcome = svc
            .upload(Cursor::new("Date;Time;CO(GT)\n10/03/2004;18.00.00;2,6\nx;y;1\n"))
            .await
            .unwrap();

        assert_eq!(outcome.message, "Data processed with validation errors");
        assert_eq!(
            outcome.summary,
            RowCounts {
                total_rows: 2,
                valid_rows: 1,
                invalid_rows: 1
            }
        );
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["summary"]["invalidRows"], 1);
        assert!(json["errorReport"]["downloadPath"].is_string());

        let handle = outcome.error_report.unwrap();
        let body = String::from_utf8(svc.reports().download(&handle.file_name).await.unwrap()).unwrap();
        assert_eq!(body.lines().count(), 2);
    }
}
