//! Error reports for rejected rows.
//!
//! [`generate_error_report`] renders rejected rows back in the upload format.
//! [`ReportDirectory`] publishes a report as a file that is deleted a while
//! after it has been downloaded.

use crate::constants::{
    CSV_SEPARATOR, DATE_COLUMN, ERROR_DOWNLOAD_ROUTE, ERROR_REPORT_HEADERS, TIME_COLUMN,
};
use crate::reading::{Measurement, RowValidationResult};
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Render rejected rows with their raw values and error reasons.
///
/// Returns an empty string when there is nothing to report.
pub fn generate_error_report(rejected: &[RowValidationResult]) -> String {
    if rejected.is_empty() {
        return String::new();
    }

    let sep = char::from(CSV_SEPARATOR).to_string();
    let mut lines = Vec::with_capacity(rejected.len() + 1);
    lines.push(ERROR_REPORT_HEADERS.join(&sep));

    for row in rejected {
        let mut values = Vec::with_capacity(ERROR_REPORT_HEADERS.len());
        values.push(row.row_index.to_string());
        values.push(quote_raw(row.original.get_or_empty(DATE_COLUMN)));
        values.push(quote_raw(row.original.get_or_empty(TIME_COLUMN)));
        for m in Measurement::ALL {
            values.push(quote_raw(row.original.get_or_empty(m.column())));
        }
        values.push(format!("\"{}\"", row.errors.join("; ")));
        lines.push(values.join(&sep));
    }

    lines.join("\n")
}

// Quote values holding the separator, a quote or a line break.
fn quote_raw(value: &str) -> String {
    let sep = char::from(CSV_SEPARATOR);
    if value.contains([sep, '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Error file not found or has expired: {0}")]
    NotFound(String),
    #[error("invalid report name: {0}")]
    InvalidName(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Reference to a published report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportHandle {
    pub file_name: String,
    pub download_path: String,
}

#[derive(Debug, Clone)]
pub struct ReportDirectory {
    dir: PathBuf,
    cleanup_delay: Duration,
}

impl ReportDirectory {
    pub fn new(dir: impl Into<PathBuf>, cleanup_delay: Duration) -> Self {
        Self {
            dir: dir.into(),
            cleanup_delay,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `report` to a fresh file and return how to fetch it.
    pub async fn publish(&self, report: &str) -> Result<ReportHandle, ReportError> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        let file_name = format!(
            "validation_errors_{millis}_{:08x}.csv",
            crc32fast::hash(report.as_bytes())
        );
        tokio::fs::write(self.dir.join(&file_name), report).await?;
        info!(file = %file_name, bytes = report.len(), "error report published");

        Ok(ReportHandle {
            download_path: format!("{ERROR_DOWNLOAD_ROUTE}/{file_name}"),
            file_name,
        })
    }

    /// Read a published report and schedule its removal.
    pub async fn download(&self, file_name: &str) -> Result<Vec<u8>, ReportError> {
        let path = self.resolve(file_name)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(ReportError::NotFound(file_name.to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        let delay = self.cleanup_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            match tokio::fs::remove_file(&path).await {
                Ok(()) => debug!(path = %path.display(), "error report removed"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), error = %e, "failed to remove error report"),
            }
        });

        Ok(bytes)
    }

    fn resolve(&self, file_name: &str) -> Result<PathBuf, ReportError> {
        let plain = !file_name.is_empty()
            && !file_name.contains(['/', '\\'])
            && file_name != "."
            && !file_name.contains("..");
        if !plain {
            return Err(ReportError::InvalidName(file_name.to_string()));
        }
        Ok(self.dir.join(file_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reading::RawRow;
    use crate::validate::validate_row;

    fn rejected_row() -> RowValidationResult {
        let raw = RawRow::from_record(
            ["Date", "Time", "CO(GT)", "T"],
            ["31/02/2004", "18.00.00", "2,6", "-200"],
        );
        validate_row(raw, 3)
    }

    #[test]
    fn empty_input_gives_empty_report() {
        assert_eq!(generate_error_report(&[]), "");
    }

    #[test]
    fn report_has_fixed_header_and_raw_values() {
        let report = generate_error_report(&[rejected_row()]);
        let mut lines = report.lines();

        assert_eq!(
            lines.next().unwrap(),
            "Row_Index;Date;Time;CO(GT);PT08.S1(CO);NMHC(GT);C6H6(GT);PT08.S2(NMHC);NOx(GT);PT08.S3(NOx);NO2(GT);PT08.S4(NO2);PT08.S5(O3);T;RH;AH;Error_Reasons"
        );
        let fields: Vec<_> = lines.next().unwrap().split(';').collect();
        assert_eq!(fields.len(), 17);
        assert_eq!(&fields[..4], &["3", "31/02/2004", "18.00.00", "2,6"]);
        assert_eq!(fields[13], "-200");
        assert_eq!(fields[14], "");
        assert_eq!(
            fields[16],
            "\"Date is required and must be in DD/MM/YYYY format\""
        );
        assert!(lines.next().is_none());
        assert!(!report.ends_with('\n'));
    }

    #[test]
    fn errors_are_joined_in_one_quoted_field() {
        let row = validate_row(RawRow::default(), 9);
        let report = generate_error_report(&[row]);
        let last = report.lines().nth(1).unwrap().rsplit(';').next().unwrap().to_string();
        assert!(last.starts_with('"') && last.ends_with('"'));
        assert!(report.contains("DD/MM/YYYY format; Time is required"));
    }

    #[tokio::test]
    async fn quoted_upload_values_read_back_as_one_field() {
        let raw = RawRow::from_record(
            ["Date", "Time", "CO(GT)", "T"],
            ["bad", "18.00.00", "2;6", "say \"hi\""],
        );
        let report = generate_error_report(&[validate_row(raw, 2)]);

        let mut rdr = csv_async::AsyncReaderBuilder::new()
            .delimiter(CSV_SEPARATOR)
            .create_reader(std::io::Cursor::new(report.into_bytes()));
        let mut record = csv_async::StringRecord::new();
        assert!(rdr.read_record(&mut record).await.unwrap());
        assert_eq!(record.len(), 17);
        assert_eq!(&record[3], "2;6");
        assert_eq!(&record[13], "say \"hi\"");
        assert_eq!(&record[16], "Date is required and must be in DD/MM/YYYY format");
    }

    #[test]
    fn report_is_deterministic() {
        let rows = vec![rejected_row(), validate_row(RawRow::default(), 4)];
        assert_eq!(generate_error_report(&rows), generate_error_report(&rows));
    }

    #[tokio::test]
    async fn publish_then_download() {
        let dir = tempfile::tempdir().unwrap();
        let reports = ReportDirectory::new(dir.path().join("uploads"), Duration::from_secs(300));

        let handle = reports.publish("a;b").await.unwrap();
        assert!(handle.file_name.starts_with("validation_errors_"));
        assert!(handle.file_name.ends_with(".csv"));
        assert_eq!(
            handle.download_path,
            format!("/api/readings/download-error/{}", handle.file_name)
        );

        let bytes = reports.download(&handle.file_name).await.unwrap();
        assert_eq!(bytes, b"a;b");
    }

    #[tokio::test]
    async fn downloaded_report_is_removed_after_delay() {
        let dir = tempfile::tempdir().unwrap();
        let reports = ReportDirectory::new(dir.path(), Duration::from_millis(20));
        let handle = reports.publish("x").await.unwrap();

        reports.download(&handle.file_name).await.unwrap();
        let path = dir.path().join(&handle.file_name);
        assert!(path.exists());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!path.exists());
        assert!(matches!(
            reports.download(&handle.file_name).await,
            Err(ReportError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn traversal_names_are_rejected() {
        let reports = ReportDirectory::new("./uploads", Duration::from_secs(1));
        for name in ["../secret.csv", "a/b.csv", "", "..\\x"] {
            assert!(matches!(
                reports.download(name).await,
                Err(ReportError::InvalidName(_))
            ));
        }
    }
}
