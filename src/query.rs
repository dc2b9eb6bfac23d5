//! Dashboard queries over stored readings, with string arguments validated
//! the way they arrive from request parameters.

use crate::cache::Cache;
use crate::config::QueryConfig;
use crate::constants::CACHE_TTL;
use crate::reading::{Measurement, UnknownParameter};
use crate::store::{
    AggregateQuery, BucketStats, DateRange, Granularity, Page, RangeQuery, ReadingStore,
    SeriesPoint, StoreError, UnknownGranularity,
};
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum QueryError {
    #[error(transparent)]
    UnknownParameter(#[from] UnknownParameter),
    #[error(transparent)]
    InvalidAggregation(#[from] UnknownGranularity),
    #[error("Invalid pagination parameters: page {page}, limit {limit}")]
    InvalidPagination { page: u32, limit: u32 },
    #[error("Invalid date '{0}', expected YYYY-MM-DD")]
    InvalidDate(String),
    #[error("Start date {start} is after end date {end}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type QueryResult<T> = std::result::Result<T, QueryError>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSummary {
    pub total_records: u64,
    pub date_range: Option<DateRange>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterStatistics {
    pub parameter: Measurement,
    pub aggregation: Granularity,
    pub buckets: Vec<BucketStats>,
}

pub struct ReadingsService {
    store: Arc<dyn ReadingStore>,
    cache: Arc<dyn Cache>,
    config: QueryConfig,
    cache_ttl: Duration,
}

impl ReadingsService {
    pub fn new(store: Arc<dyn ReadingStore>, cache: Arc<dyn Cache>, config: QueryConfig) -> Self {
        Self {
            store,
            cache,
            config,
            cache_ttl: CACHE_TTL,
        }
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn available_parameters(&self) -> Vec<&'static str> {
        Measurement::PARAMETERS.iter().map(|m| m.name()).collect()
    }

    /// One page of a parameter's time series, ordered by date and time.
    pub async fn time_series(
        &self,
        parameter: &str,
        start: Option<&str>,
        end: Option<&str>,
        page: Option<u32>,
        limit: Option<u32>,
    ) -> QueryResult<Page<SeriesPoint>> {
        let parameter: Measurement = parameter.parse()?;
        let (start, end) = parse_bounds(start, end)?;

        let page = page.unwrap_or(1);
        let limit = limit.unwrap_or(self.config.default_limit);
        if page < 1 || limit < 1 || limit > self.config.max_limit {
            return Err(QueryError::InvalidPagination { page, limit });
        }

        let query = RangeQuery {
            parameter,
            start,
            end,
            page,
            limit,
        };
        Ok(self.store.query_range(&query).await?)
    }

    /// Per-bucket statistics for a parameter. `aggregation` defaults to daily.
    pub async fn statistics(
        &self,
        parameter: &str,
        aggregation: Option<&str>,
        start: Option<&str>,
        end: Option<&str>,
    ) -> QueryResult<ParameterStatistics> {
        let parameter: Measurement = parameter.parse()?;
        let granularity = match aggregation {
            Some(a) => a.parse::<Granularity>()?,
            None => Granularity::default(),
        };
        let (start, end) = parse_bounds(start, end)?;

        let key = format!(
            "stats:{parameter}:{granularity}:{}:{}",
            start.map(|d| d.to_string()).unwrap_or_default(),
            end.map(|d| d.to_string()).unwrap_or_default()
        );
        if let Some(hit) = self.cached::<ParameterStatistics>(&key).await {
            return Ok(hit);
        }

        let buckets = self
            .store
            .aggregate(&AggregateQuery {
                parameter,
                granularity,
                start,
                end,
            })
            .await?;
        let stats = ParameterStatistics {
            parameter,
            aggregation: granularity,
            buckets,
        };
        self.remember(&key, &stats).await;
        Ok(stats)
    }

    pub async fn data_summary(&self) -> QueryResult<DataSummary> {
        const KEY: &str = "summary";
        if let Some(hit) = self.cached::<DataSummary>(KEY).await {
            return Ok(hit);
        }

        let summary = DataSummary {
            total_records: self.store.count().await?,
            date_range: self.store.date_bounds().await?,
        };
        self.remember(KEY, &summary).await;
        Ok(summary)
    }

    async fn cached<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.cache.get(key).await?;
        match serde_json::from_str(&raw) {
            Ok(value) => {
                debug!(key, "cache hit");
                Some(value)
            }
            Err(e) => {
                warn!(key, error = %e, "discarding unreadable cache entry");
                None
            }
        }
    }

    async fn remember<T: Serialize>(&self, key: &str, value: &T) {
        match serde_json::to_string(value) {
            Ok(raw) => self.cache.set(key, raw, self.cache_ttl).await,
            Err(e) => warn!(key, error = %e, "value not cacheable"),
        }
    }
}

fn parse_bounds(
    start: Option<&str>,
    end: Option<&str>,
) -> QueryResult<(Option<NaiveDate>, Option<NaiveDate>)> {
    let start = start.map(parse_query_date).transpose()?;
    let end = end.map(parse_query_date).transpose()?;
    if let (Some(start), Some(end)) = (start, end) {
        if start > end {
            return Err(QueryError::InvalidRange { start, end });
        }
    }
    Ok((start, end))
}

fn parse_query_date(raw: &str) -> QueryResult<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| QueryError::InvalidDate(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::reading::{NormalizedReading, TimeOfDay};
    use crate::store::MemoryStore;

    async fn service() -> (Arc<MemoryStore>, ReadingsService) {
        let store = Arc::new(MemoryStore::new());
        let mut readings = Vec::new();
        for (day, hour, co) in [(10, 18, 2.0), (10, 19, 4.0), (11, 0, 1.0)] {
            let mut r = NormalizedReading::new(
                NaiveDate::from_ymd_opt(2004, 3, day).unwrap(),
                TimeOfDay::from_hms(hour, 0, 0).unwrap(),
            );
            r.set(Measurement::Co, co);
            readings.push(r);
        }
        store.insert_batch(&readings).await.unwrap();

        let svc = ReadingsService::new(
            store.clone(),
            Arc::new(MemoryCache::default()),
            QueryConfig::default(),
        );
        (store, svc)
    }

    #[tokio::test]
    async fn lists_parameters_in_public_order() {
        let (_, svc) = service().await;
        let params = svc.available_parameters();
        assert_eq!(params.len(), 13);
        assert_eq!(&params[..3], &["co", "nmhc", "c6h6"]);
    }

    #[tokio::test]
    async fn time_series_validates_arguments() {
        let (_, svc) = service().await;

        assert!(matches!(
            svc.time_series("ozone", None, None, None, None).await,
            Err(QueryError::UnknownParameter(_))
        ));
        assert!(matches!(
            svc.time_series("co", None, None, Some(0), None).await,
            Err(QueryError::InvalidPagination { .. })
        ));
        assert!(matches!(
            svc.time_series("co", None, None, None, Some(10_001)).await,
            Err(QueryError::InvalidPagination { .. })
        ));
        assert!(matches!(
            svc.time_series("co", Some("10/03/2004"), None, None, None).await,
            Err(QueryError::InvalidDate(_))
        ));
        assert!(matches!(
            svc.time_series("co", Some("2004-03-11"), Some("2004-03-10"), None, None).await,
            Err(QueryError::InvalidRange { .. })
        ));
    }

    #[tokio::test]
    async fn time_series_defaults_and_filters() {
        let (_, svc) = service().await;
        let page = svc.time_series("co", None, None, None, None).await.unwrap();
        assert_eq!(page.page, 1);
        assert_eq!(page.limit, 1000);
        assert_eq!(page.total, 3);

        let day = svc
            .time_series("co", Some("2004-03-10"), Some("2004-03-10"), None, None)
            .await
            .unwrap();
        let values: Vec<_> = day.items.iter().map(|p| p.value).collect();
        assert_eq!(values, vec![Some(2.0), Some(4.0)]);
    }

    #[tokio::test]
    async fn statistics_default_to_daily_and_reject_unknown_aggregation() {
        let (_, svc) = service().await;
        let stats = svc.statistics("co", None, None, None).await.unwrap();
        assert_eq!(stats.aggregation, Granularity::Daily);
        assert_eq!(stats.buckets.len(), 2);
        assert_eq!(stats.buckets[0].avg, 3.0);

        assert!(matches!(
            svc.statistics("co", Some("weekly"), None, None).await,
            Err(QueryError::InvalidAggregation(_))
        ));
    }

    #[tokio::test]
    async fn summary_is_served_from_cache_until_ttl() {
        let (store, svc) = service().await;
        let first = svc.data_summary().await.unwrap();
        assert_eq!(first.total_records, 3);
        assert_eq!(
            first.date_range.unwrap().start,
            NaiveDate::from_ymd_opt(2004, 3, 10).unwrap()
        );

        let mut extra = NormalizedReading::new(
            NaiveDate::from_ymd_opt(2004, 4, 1).unwrap(),
            TimeOfDay::from_hms(0, 0, 0).unwrap(),
        );
        extra.set(Measurement::Co, 1.0);
        store.insert_batch(&[extra]).await.unwrap();

        assert_eq!(svc.data_summary().await.unwrap(), first);
    }

    #[tokio::test]
    async fn empty_store_summary_has_no_range() {
        let svc = ReadingsService::new(
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryCache::default()),
            QueryConfig::default(),
        )
        .with_cache_ttl(Duration::from_secs(1));
        let summary = svc.data_summary().await.unwrap();
        assert_eq!(summary.total_records, 0);
        assert!(summary.date_range.is_none());
        assert_eq!(
            serde_json::to_value(&summary).unwrap()["totalRecords"],
            0
        );
    }
}
