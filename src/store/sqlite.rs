use super::{
    AggregateQuery, BucketStats, DateRange, Granularity, Page, RangeQuery, ReadingStore,
    SeriesPoint, StoreError, StoreResult,
};
use crate::reading::{Measurement, NormalizedReading, TimeOfDay};
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::{QueryBuilder, Row, Sqlite};
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS readings (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    date DATE NOT NULL,
    time TEXT NOT NULL,
    co REAL,
    pt08_s1_co REAL,
    nmhc REAL,
    c6h6 REAL,
    pt08_s2_nmhc REAL,
    nox REAL,
    pt08_s3_nox REAL,
    no2 REAL,
    pt08_s4_no2 REAL,
    pt08_s5_o3 REAL,
    temperature REAL,
    relative_humidity REAL,
    absolute_humidity REAL,
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP
)";

const INDEXES: [&str; 2] = [
    "CREATE INDEX IF NOT EXISTS idx_readings_date ON readings (date)",
    "CREATE INDEX IF NOT EXISTS idx_readings_date_time ON readings (date, time)",
];

// 15 bound values per row; stays under SQLite's default variable limit.
const ROWS_PER_STATEMENT: usize = 2000;

/// Readings persisted in a SQLite database.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connect to `database_url` (e.g. `sqlite://readings.db` or
    /// `sqlite::memory:`), creating the file and schema when missing.
    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        // A single connection keeps `sqlite::memory:` databases shared.
        let max_connections = if database_url.contains(":memory:") { 1 } else { 4 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect_with(options)
            .await?;

        sqlx::query(SCHEMA).execute(&pool).await?;
        for index in INDEXES {
            sqlx::query(index).execute(&pool).await?;
        }

        Ok(Self { pool })
    }

    fn push_filters(
        builder: &mut QueryBuilder<'_, Sqlite>,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) {
        builder.push(" WHERE 1 = 1");
        if let Some(start) = start {
            builder.push(" AND date >= ").push_bind(start);
        }
        if let Some(end) = end {
            builder.push(" AND date <= ").push_bind(end);
        }
    }
}

fn bucket_expr(granularity: Granularity) -> &'static str {
    match granularity {
        Granularity::Hourly => "strftime('%Y-%m-%d %H:00', date || ' ' || time)",
        Granularity::Daily => "strftime('%Y-%m-%d', date)",
        Granularity::Monthly => "strftime('%Y-%m', date)",
    }
}

fn time_of_day(raw: String) -> StoreResult<TimeOfDay> {
    TimeOfDay::try_from(raw.clone())
        .map_err(|e| StoreError::Backend(format!("bad stored time '{raw}': {e}")))
}

#[async_trait]
impl ReadingStore for SqliteStore {
    async fn count(&self) -> StoreResult<u64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM readings")
            .fetch_one(&self.pool)
            .await?;
        Ok(n as u64)
    }

    async fn insert_batch(&self, readings: &[NormalizedReading]) -> StoreResult<()> {
        if readings.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for chunk in readings.chunks(ROWS_PER_STATEMENT) {
            let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new("INSERT INTO readings (date, time");
            for m in Measurement::ALL {
                builder.push(", ").push(m.name());
            }
            builder.push(") ");
            builder.push_values(chunk, |mut row, reading| {
                row.push_bind(reading.date).push_bind(reading.time.to_string());
                for m in Measurement::ALL {
                    row.push_bind(reading.get(m));
                }
            });
            builder.build().execute(&mut *tx).await?;
        }
        tx.commit().await?;

        debug!(rows = readings.len(), "sqlite batch committed");
        Ok(())
    }

    async fn query_range(&self, query: &RangeQuery) -> StoreResult<Page<SeriesPoint>> {
        let mut count: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT COUNT(*) FROM readings");
        Self::push_filters(&mut count, query.start, query.end);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        // Column names come from the closed Measurement set, never from input.
        let mut select: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
            "SELECT id, date, time, {} AS value FROM readings",
            query.parameter.name()
        ));
        Self::push_filters(&mut select, query.start, query.end);
        select
            .push(" ORDER BY date ASC, time ASC, id ASC LIMIT ")
            .push_bind(i64::from(query.limit))
            .push(" OFFSET ")
            .push_bind(query.offset() as i64);

        let rows = select.build().fetch_all(&self.pool).await?;
        let items = rows
            .iter()
            .map(|row| -> StoreResult<SeriesPoint> {
                let id: i64 = row.try_get("id")?;
                let time: String = row.try_get("time")?;
                Ok(SeriesPoint {
                    id: id as u64,
                    date: row.try_get("date")?,
                    time: time_of_day(time)?,
                    value: row.try_get("value")?,
                })
            })
            .collect::<StoreResult<Vec<_>>>()?;

        Ok(Page {
            items,
            page: query.page,
            limit: query.limit,
            total: total as u64,
        })
    }

    async fn aggregate(&self, query: &AggregateQuery) -> StoreResult<Vec<BucketStats>> {
        let column = query.parameter.name();
        let bucket = bucket_expr(query.granularity);
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
            "SELECT {bucket} AS bucket, AVG({column}) AS avg, MIN({column}) AS min, \
             MAX({column}) AS max, COUNT({column}) AS count FROM readings"
        ));
        Self::push_filters(&mut builder, query.start, query.end);
        builder.push(format!(" AND {column} IS NOT NULL GROUP BY bucket ORDER BY bucket ASC"));

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| -> StoreResult<BucketStats> {
                let count: i64 = row.try_get("count")?;
                Ok(BucketStats {
                    bucket: row.try_get("bucket")?,
                    avg: row.try_get("avg")?,
                    min: row.try_get("min")?,
                    max: row.try_get("max")?,
                    count: count as u64,
                })
            })
            .collect()
    }

    async fn date_bounds(&self) -> StoreResult<Option<DateRange>> {
        let row = sqlx::query("SELECT MIN(date) AS start, MAX(date) AS end FROM readings")
            .fetch_one(&self.pool)
            .await?;
        let start: Option<NaiveDate> = row.try_get("start")?;
        let end: Option<NaiveDate> = row.try_get("end")?;
        Ok(start.zip(end).map(|(start, end)| DateRange { start, end }))
    }
}
