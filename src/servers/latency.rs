//! Request counters and latency histogram for `GET /metrics`.

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Upper bounds of the latency buckets, in milliseconds
pub const LATENCY_BUCKETS_MS: [f64; 12] = [
    0.25, 0.5, 1.0, 2.0, 5.0, 10.0, 20.0, 50.0, 100.0, 200.0, 500.0, 1000.0,
];

#[derive(Debug, Default)]
pub struct ServiceMetrics {
    requests: AtomicU64,
    successes: AtomicU64,
    /// One counter per bucket plus the overflow bucket
    buckets: [AtomicU64; LATENCY_BUCKETS_MS.len() + 1],
    latency_micros_total: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    errors: Mutex<BTreeMap<&'static str, u64>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LatencyBucket {
    /// `None` for the overflow bucket
    pub le_ms: Option<f64>,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub requests: u64,
    pub successes: u64,
    pub errors: BTreeMap<&'static str, u64>,
    pub mean_latency_ms: f64,
    pub latency_histogram: Vec<LatencyBucket>,
    pub cache_hits: u64,
    pub cache_misses: u64,
}

impl ServiceMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&self, latency: Duration) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.successes.fetch_add(1, Ordering::Relaxed);
        self.observe(latency);
    }

    pub fn record_error(&self, kind: &'static str, latency: Duration) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.observe(latency);
        let mut errors = self.errors.lock().unwrap_or_else(|p| p.into_inner());
        *errors.entry(kind).or_insert(0) += 1;
    }

    pub fn record_cache(&self, hit: bool) {
        let counter = if hit { &self.cache_hits } else { &self.cache_misses };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn observe(&self, latency: Duration) {
        let ms = latency.as_secs_f64() * 1000.0;
        let index = LATENCY_BUCKETS_MS
            .iter()
            .position(|bound| ms <= *bound)
            .unwrap_or(LATENCY_BUCKETS_MS.len());
        self.buckets[index].fetch_add(1, Ordering::Relaxed);
        self.latency_micros_total
            .fetch_add(latency.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let requests = self.requests.load(Ordering::Relaxed);
        let total_micros = self.latency_micros_total.load(Ordering::Relaxed);
        let latency_histogram = self
            .buckets
            .iter()
            .enumerate()
            .map(|(i, count)| LatencyBucket {
                le_ms: LATENCY_BUCKETS_MS.get(i).copied(),
                count: count.load(Ordering::Relaxed),
            })
            .collect();
        MetricsSnapshot {
            requests,
            successes: self.successes.load(Ordering::Relaxed),
            errors: self.errors.lock().unwrap_or_else(|p| p.into_inner()).clone(),
            mean_latency_ms: if requests == 0 {
                0.0
            } else {
                total_micros as f64 / requests as f64 / 1000.0
            },
            latency_histogram,
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
        }
    }
}
