//! Persistence seam for readings.
//!
//! The ingestion pipeline only needs [`ReadingStore::insert_batch`]; the query
//! side uses the range, aggregate and bounds operations. [`MemoryStore`] keeps
//! everything in process, `SqliteStore` (feature `sqlite`) persists to SQLite.

mod memory;
#[cfg(feature = "sqlite")]
mod sqlite;

pub use memory::MemoryStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

use crate::reading::{Measurement, NormalizedReading, TimeOfDay};
use async_trait::async_trait;
use chrono::{NaiveDate, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage backend error: {0}")]
    Backend(String),
    #[cfg(feature = "sqlite")]
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// A page request over the readings of one parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeQuery {
    pub parameter: Measurement,
    /// Inclusive lower bound.
    pub start: Option<NaiveDate>,
    /// Inclusive upper bound.
    pub end: Option<NaiveDate>,
    /// 1-based.
    pub page: u32,
    pub limit: u32,
}

impl RangeQuery {
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.limit)
    }
}

/// One reading projected onto a single parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub id: u64,
    pub date: NaiveDate,
    pub time: TimeOfDay,
    pub value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub limit: u32,
    /// Matching rows across all pages.
    pub total: u64,
}

/// Time-bucketing unit for statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Hourly,
    #[default]
    Daily,
    Monthly,
}

impl Granularity {
    pub fn as_str(self) -> &'static str {
        match self {
            Granularity::Hourly => "hourly",
            Granularity::Daily => "daily",
            Granularity::Monthly => "monthly",
        }
    }

    /// Label of the bucket holding a reading taken at `date` `time`.
    pub fn bucket(self, date: NaiveDate, time: TimeOfDay) -> String {
        match self {
            Granularity::Hourly => {
                format!("{} {:02}:00", date.format("%Y-%m-%d"), time.as_naive().hour())
            }
            Granularity::Daily => date.format("%Y-%m-%d").to_string(),
            Granularity::Monthly => date.format("%Y-%m").to_string(),
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid aggregation type '{0}'. Must be: hourly, daily, or monthly")]
pub struct UnknownGranularity(pub String);

impl FromStr for Granularity {
    type Err = UnknownGranularity;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hourly" => Ok(Granularity::Hourly),
            "daily" => Ok(Granularity::Daily),
            "monthly" => Ok(Granularity::Monthly),
            other => Err(UnknownGranularity(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateQuery {
    pub parameter: Measurement,
    pub granularity: Granularity,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

/// Statistics over the non-empty values of one bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketStats {
    pub bucket: String,
    pub avg: f64,
    pub min: f64,
    pub max: f64,
    pub count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

#[async_trait]
pub trait ReadingStore: Send + Sync {
    async fn count(&self) -> StoreResult<u64>;

    /// Persist one batch as a single write.
    async fn insert_batch(&self, readings: &[NormalizedReading]) -> StoreResult<()>;

    async fn query_range(&self, query: &RangeQuery) -> StoreResult<Page<SeriesPoint>>;

    async fn aggregate(&self, query: &AggregateQuery) -> StoreResult<Vec<BucketStats>>;

    /// Earliest and latest reading dates, `None` when empty.
    async fn date_bounds(&self) -> StoreResult<Option<DateRange>>;
}

pub(crate) fn in_range(date: NaiveDate, start: Option<NaiveDate>, end: Option<NaiveDate>) -> bool {
    start.map_or(true, |s| date >= s) && end.map_or(true, |e| date <= e)
}
