use super::{
    in_range, AggregateQuery, BucketStats, DateRange, Page, RangeQuery, ReadingStore,
    SeriesPoint, StoreResult,
};
use crate::reading::NormalizedReading;
use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

/// Readings held in process memory, ids assigned in insertion order from 1.
#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: RwLock<Vec<(u64, NormalizedReading)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every stored reading, in insertion order.
    pub async fn snapshot(&self) -> Vec<NormalizedReading> {
        self.rows.read().await.iter().map(|(_, r)| r.clone()).collect()
    }
}

#[async_trait]
impl ReadingStore for MemoryStore {
    async fn count(&self) -> StoreResult<u64> {
        Ok(self.rows.read().await.len() as u64)
    }

    async fn insert_batch(&self, readings: &[NormalizedReading]) -> StoreResult<()> {
        let mut rows = self.rows.write().await;
        let mut next_id = rows.last().map_or(1, |(id, _)| id + 1);
        rows.reserve(readings.len());
        for reading in readings {
            rows.push((next_id, reading.clone()));
            next_id += 1;
        }
        Ok(())
    }

    async fn query_range(&self, query: &RangeQuery) -> StoreResult<Page<SeriesPoint>> {
        let rows = self.rows.read().await;
        let mut matching: Vec<&(u64, NormalizedReading)> = rows
            .iter()
            .filter(|(_, r)| in_range(r.date, query.start, query.end))
            .collect();
        matching.sort_by(|(ia, a), (ib, b)| {
            (a.date, a.time, ia).cmp(&(b.date, b.time, ib))
        });

        let total = matching.len() as u64;
        let items = matching
            .into_iter()
            .skip(query.offset() as usize)
            .take(query.limit as usize)
            .map(|(id, r)| SeriesPoint {
                id: *id,
                date: r.date,
                time: r.time,
                value: r.get(query.parameter),
            })
            .collect();

        Ok(Page {
            items,
            page: query.page,
            limit: query.limit,
            total,
        })
    }

    async fn aggregate(&self, query: &AggregateQuery) -> StoreResult<Vec<BucketStats>> {
        let rows = self.rows.read().await;
        let mut buckets: BTreeMap<String, (f64, f64, f64, u64)> = BTreeMap::new();

        for (_, r) in rows.iter().filter(|(_, r)| in_range(r.date, query.start, query.end)) {
            let Some(value) = r.get(query.parameter) else {
                continue;
            };
            let entry = buckets
                .entry(query.granularity.bucket(r.date, r.time))
                .or_insert((0.0, f64::INFINITY, f64::NEG_INFINITY, 0));
            entry.0 += value;
            entry.1 = entry.1.min(value);
            entry.2 = entry.2.max(value);
            entry.3 += 1;
        }

        Ok(buckets
            .into_iter()
            .map(|(bucket, (sum, min, max, count))| BucketStats {
                bucket,
                avg: sum / count as f64,
                min,
                max,
                count,
            })
            .collect())
    }

    async fn date_bounds(&self) -> StoreResult<Option<DateRange>> {
        let rows = self.rows.read().await;
        let start = rows.iter().map(|(_, r)| r.date).min();
        let end = rows.iter().map(|(_, r)| r.date).max();
        Ok(start.zip(end).map(|(start, end)| DateRange { start, end }))
    }
}
