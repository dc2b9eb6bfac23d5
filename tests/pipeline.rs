use airq_ingest::config::IngestConfig;
use airq_ingest::store::{
    AggregateQuery, BucketStats, DateRange, Page, RangeQuery, SeriesPoint, StoreError, StoreResult,
};
use airq_ingest::{
    generate_error_report, IngestError, Ingestor, Measurement, MemoryStore, NormalizedReading,
    ReadingStore, ReportDirectory, UploadService,
};
use async_trait::async_trait;
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const HEADER: &str = "Date;Time;CO(GT);PT08.S1(CO);NMHC(GT);C6H6(GT);PT08.S2(NMHC);NOx(GT);PT08.S3(NOx);NO2(GT);PT08.S4(NO2);PT08.S5(O3);T;RH;AH;;";

/// Records batch sizes; fails the write numbered `fail_on` (1-based).
#[derive(Default)]
struct RecordingStore {
    batches: Mutex<Vec<usize>>,
    fail_on: Option<usize>,
}

#[async_trait]
impl ReadingStore for RecordingStore {
    async fn count(&self) -> StoreResult<u64> {
        Ok(self.batches.lock().unwrap().iter().sum::<usize>() as u64)
    }

    async fn insert_batch(&self, readings: &[NormalizedReading]) -> StoreResult<()> {
        let mut batches = self.batches.lock().unwrap();
        if self.fail_on == Some(batches.len() + 1) {
            return Err(StoreError::Backend("disk full".into()));
        }
        batches.push(readings.len());
        Ok(())
    }

    async fn query_range(&self, query: &RangeQuery) -> StoreResult<Page<SeriesPoint>> {
        Ok(Page {
            items: Vec::new(),
            page: query.page,
            limit: query.limit,
            total: 0,
        })
    }

    async fn aggregate(&self, _query: &AggregateQuery) -> StoreResult<Vec<BucketStats>> {
        Ok(Vec::new())
    }

    async fn date_bounds(&self) -> StoreResult<Option<DateRange>> {
        Ok(None)
    }
}

fn valid_rows(n: usize) -> String {
    let mut body = format!("{HEADER}\n");
    for i in 0..n {
        let (day, hour) = (1 + (i / 24) % 28, i % 24);
        body.push_str(&format!(
            "{day:02}/03/2004;{hour}.00.00;2,6;1360;150;11,9;1046;166;1056;113;1692;1268;13,6;48,9;0,7578;;\n"
        ));
    }
    body
}

#[tokio::test]
async fn mixed_file_reports_only_the_bad_row() -> anyhow::Result<()> {
    let row2 = "31/02/2004;19.00.00;2;1292;112;9,4;955;103;1174;92;1559;972;13,3;47,7;0,7255;;";
    let body = format!(
        "{HEADER}\n\
         10/03/2004;18.00.00;2,6;1360;150;11,9;1046;166;1056;113;1692;1268;13,6;48,9;0,7578;;\n\
         {row2}\n\
         10/03/2004;20.00.00;-200;1402;88;9,0;939;131;1140;114;1555;1074;11,9;54,0;0,7502;;\n"
    );

    let store = Arc::new(MemoryStore::new());
    let ingestor = Ingestor::new(store.clone(), &IngestConfig::default());
    let summary = ingestor.ingest(Cursor::new(body)).await?;

    assert_eq!(
        (summary.total_rows, summary.valid_rows, summary.invalid_rows),
        (3, 2, 1)
    );

    let stored = store.snapshot().await;
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[1].get(Measurement::Co), None);
    assert_eq!(stored[1].get(Measurement::Temperature), Some(11.9));

    let report = generate_error_report(&summary.rejected);
    let lines: Vec<&str> = report.lines().collect();
    assert_eq!(lines.len(), 2);

    let fields: Vec<&str> = lines[1].split(';').collect();
    assert_eq!(fields[0], "3");
    let original: Vec<&str> = row2.split(';').take(15).collect();
    assert_eq!(&fields[1..16], &original[..]);
    assert!(fields[16].contains("Date"));
    Ok(())
}

#[tokio::test]
async fn valid_rows_are_written_in_bounded_batches() -> anyhow::Result<()> {
    let store = Arc::new(RecordingStore::default());
    let ingestor = Ingestor::new(store.clone(), &IngestConfig { batch_size: 1000 });

    let summary = ingestor.ingest(Cursor::new(valid_rows(2500))).await?;

    assert_eq!(summary.valid_rows, 2500);
    assert_eq!(*store.batches.lock().unwrap(), vec![1000, 1000, 500]);
    Ok(())
}

#[tokio::test]
async fn store_failure_aborts_and_keeps_earlier_batches() -> anyhow::Result<()> {
    let store = Arc::new(RecordingStore {
        fail_on: Some(2),
        ..Default::default()
    });
    let ingestor = Ingestor::new(store.clone(), &IngestConfig { batch_size: 1000 });

    let err = ingestor
        .ingest(Cursor::new(valid_rows(2500)))
        .await
        .unwrap_err();

    assert!(matches!(err, IngestError::Store(StoreError::Backend(_))));
    assert_eq!(*store.batches.lock().unwrap(), vec![1000]);
    Ok(())
}

#[tokio::test]
async fn all_invalid_file_writes_nothing() -> anyhow::Result<()> {
    let store = Arc::new(RecordingStore::default());
    let ingestor = Ingestor::new(store.clone(), &IngestConfig::default());
    let body = format!("{HEADER}\n2004-03-10;18.00.00;1\n10/03/2004;25.00.00;1\n");

    let summary = ingestor.ingest(Cursor::new(body)).await?;

    assert_eq!(summary.invalid_rows, 2);
    assert_eq!(summary.batches_written, 0);
    assert!(store.batches.lock().unwrap().is_empty());
    Ok(())
}

#[tokio::test]
async fn upload_publishes_downloadable_report() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let ingestor = Ingestor::new(Arc::new(MemoryStore::new()), &IngestConfig::default());
    let uploads = UploadService::new(
        ingestor,
        ReportDirectory::new(dir.path(), Duration::from_secs(300)),
    );

    let body = format!("{HEADER}\n10/03/2004;18.00.00;2,6\n;;\n");
    let outcome = uploads.upload(Cursor::new(body)).await?;

    assert_eq!(outcome.summary.invalid_rows, 1);
    let handle = outcome.error_report.expect("report published");
    let bytes = uploads.reports().download(&handle.file_name).await?;
    let text = String::from_utf8(bytes)?;
    assert!(text.starts_with("Row_Index;Date;Time;"));
    assert!(text.lines().nth(1).unwrap().starts_with("3;;;"));
    Ok(())
}
