//! Bounded in-memory point store.
//!
//! Keeps the most recent samples of each series in a ring. When a series is
//! full the oldest sample is evicted.

use super::PointSink;
use crate::core::config::StorageConfig;
use crate::core::{MetricPoint, Result};
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

/// One stored sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Epoch seconds
    pub timestamp: u32,
    /// Sample value
    pub value: f64,
}

/// Per-series ring buffers keyed by metric path.
#[derive(Debug)]
pub struct MemoryStore {
    series: DashMap<String, VecDeque<Sample>>,
    max_points_per_series: usize,
    received: AtomicU64,
    evicted: AtomicU64,
}

impl MemoryStore {
    /// Create a store retaining at most `max_points_per_series` per path.
    pub fn new(max_points_per_series: usize) -> Self {
        Self {
            series: DashMap::new(),
            max_points_per_series: max_points_per_series.max(1),
            received: AtomicU64::new(0),
            evicted: AtomicU64::new(0),
        }
    }

    /// Create a store from configuration.
    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(config.max_points_per_series)
    }

    /// Number of distinct series.
    pub fn series_count(&self) -> usize {
        self.series.len()
    }

    /// Samples accepted since start.
    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    /// Samples dropped to make room for newer ones.
    pub fn evicted(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }

    /// Stored samples of `path`, oldest first.
    pub fn samples(&self, path: &str) -> Vec<Sample> {
        self.series
            .get(path)
            .map(|ring| ring.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Most recent sample of `path`.
    pub fn latest(&self, path: &str) -> Option<Sample> {
        self.series.get(path).and_then(|ring| ring.back().copied())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::from_config(&StorageConfig::default())
    }
}

#[async_trait::async_trait]
impl PointSink for MemoryStore {
    async fn set(&self, point: &MetricPoint) -> Result<()> {
        let sample = Sample {
            timestamp: point.timestamp,
            value: point.value,
        };

        // Avoid allocating the key for series that already exist.
        let evicted = match self.series.get_mut(point.path.as_str()) {
            Some(mut ring) => push_bounded(&mut ring, sample, self.max_points_per_series),
            None => {
                let mut ring = self.series.entry(point.path.clone()).or_default();
                push_bounded(&mut ring, sample, self.max_points_per_series)
            },
        };
        if evicted {
            self.evicted.fetch_add(1, Ordering::Relaxed);
        }

        self.received.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

fn push_bounded(ring: &mut VecDeque<Sample>, sample: Sample, capacity: usize) -> bool {
    let full = ring.len() >= capacity;
    if full {
        ring.pop_front();
    }
    ring.push_back(sample);
    full
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_and_read_back() {
        let store = MemoryStore::new(8);
        store.set(&MetricPoint::new("a.b", 1.5, 100)).await.unwrap();
        store.set(&MetricPoint::new("a.b", 2.5, 110)).await.unwrap();
        store.set(&MetricPoint::new("a.c", 7.0, 100)).await.unwrap();

        assert_eq!(store.series_count(), 2);
        assert_eq!(store.received(), 3);
        assert_eq!(
            store.samples("a.b"),
            vec![
                Sample { timestamp: 100, value: 1.5 },
                Sample { timestamp: 110, value: 2.5 },
            ]
        );
        assert_eq!(store.latest("a.c"), Some(Sample { timestamp: 100, value: 7.0 }));
        assert!(store.samples("missing").is_empty());
    }

    #[tokio::test]
    async fn test_oldest_sample_evicted() {
        let store = MemoryStore::new(2);
        for ts in 1..=5 {
            store.set(&MetricPoint::new("m", f64::from(ts), ts)).await.unwrap();
        }

        let timestamps: Vec<u32> = store.samples("m").iter().map(|s| s.timestamp).collect();
        assert_eq!(timestamps, vec![4, 5]);
        assert_eq!(store.evicted(), 3);
    }
}
