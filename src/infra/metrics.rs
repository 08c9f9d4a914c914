//! Lock-free metrics collection and periodic reporting
//!
//! Uses atomics for hot-path operations to avoid mutex contention.
//! All counter updates are lock-free; reporting is the only operation
//! that needs synchronization (via atomic swap).
//!
//! NOTE: All atomics use Relaxed ordering intentionally. These are statistical
//! counters only; occupancy decisions never read them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Prometheus-style exponential bucket boundaries (microseconds)
/// Buckets: ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, ≤25600, ≤51200, >51200
const BUCKET_BOUNDS: [u64; 10] = [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200];
const NUM_BUCKETS: usize = 11;

/// Compute bucket index for a latency value using binary search
#[inline]
fn bucket_index(latency_us: u64) -> usize {
    BUCKET_BOUNDS.partition_point(|&bound| bound < latency_us)
}

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

/// Swap all buckets to zero and return their values
#[inline]
fn swap_buckets(buckets: &[AtomicU64; NUM_BUCKETS]) -> [u64; NUM_BUCKETS] {
    let mut result = [0u64; NUM_BUCKETS];
    for (i, bucket) in buckets.iter().enumerate() {
        result[i] = bucket.swap(0, Ordering::Relaxed);
    }
    result
}

/// Compute percentile from histogram buckets
/// Returns the upper bound of the bucket containing the percentile
fn percentile_from_buckets(buckets: &[u64; NUM_BUCKETS], percentile: f64) -> u64 {
    let total: u64 = buckets.iter().sum();
    if total == 0 {
        return 0;
    }

    let target = ((total as f64 * percentile).ceil() as u64).max(1);
    let mut cumulative = 0u64;

    // Upper bounds for each bucket (last bucket uses 2x the previous bound)
    const BUCKET_UPPER_BOUNDS: [u64; NUM_BUCKETS] =
        [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200, 102400];

    for (i, &count) in buckets.iter().enumerate() {
        cumulative += count;
        if cumulative >= target {
            return BUCKET_UPPER_BOUNDS[i];
        }
    }
    BUCKET_UPPER_BOUNDS[NUM_BUCKETS - 1]
}

/// Lock-free metrics collector
///
/// All recording operations are lock-free using atomics.
/// The `report()` method atomically swaps periodic counters to get a snapshot.
pub struct Metrics {
    /// Check-ins accepted (monotonic)
    check_ins_total: AtomicU64,
    /// Check-outs processed (monotonic)
    check_outs_total: AtomicU64,
    /// Sessions removed by lazy expiry (monotonic)
    sessions_expired_total: AtomicU64,
    /// Current number of active sessions (gauge, set by the occupancy store)
    occupancy: AtomicU64,
    /// Visits written to the ledger (monotonic)
    visits_recorded_total: AtomicU64,
    /// Persistence failures surfaced to callers (monotonic)
    store_errors_total: AtomicU64,
    /// Listing rows whose highlight fell back to none (monotonic)
    highlights_degraded_total: AtomicU64,
    /// HTTP requests served (monotonic)
    requests_total: AtomicU64,
    /// Requests since last report (reset on report)
    requests_since_report: AtomicU64,
    /// Sum of request latencies in microseconds (reset on report)
    latency_sum_us: AtomicU64,
    /// Max request latency in microseconds (reset on report)
    latency_max_us: AtomicU64,
    /// Request latency histogram buckets (reset on report)
    latency_buckets: [AtomicU64; NUM_BUCKETS],
    /// Sum of all request latencies in microseconds (monotonic, for scrapes)
    latency_total_us: AtomicU64,
    /// Request latency histogram buckets (monotonic, for scrapes)
    latency_cumulative_buckets: [AtomicU64; NUM_BUCKETS],
    /// Last report time (only accessed from reporter)
    last_report_time: parking_lot::Mutex<Instant>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            check_ins_total: AtomicU64::new(0),
            check_outs_total: AtomicU64::new(0),
            sessions_expired_total: AtomicU64::new(0),
            occupancy: AtomicU64::new(0),
            visits_recorded_total: AtomicU64::new(0),
            store_errors_total: AtomicU64::new(0),
            highlights_degraded_total: AtomicU64::new(0),
            requests_total: AtomicU64::new(0),
            requests_since_report: AtomicU64::new(0),
            latency_sum_us: AtomicU64::new(0),
            latency_max_us: AtomicU64::new(0),
            latency_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            latency_total_us: AtomicU64::new(0),
            latency_cumulative_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            last_report_time: parking_lot::Mutex::new(Instant::now()),
        }
    }

    #[inline]
    pub fn record_check_in(&self) {
        self.check_ins_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_check_out(&self) {
        self.check_outs_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_sessions_expired(&self, count: usize) {
        self.sessions_expired_total.fetch_add(count as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn set_occupancy(&self, count: usize) {
        self.occupancy.store(count as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_visit_recorded(&self) {
        self.visits_recorded_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_store_error(&self) {
        self.store_errors_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_highlight_degraded(&self) {
        self.highlights_degraded_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a served request with given latency (lock-free)
    #[inline]
    pub fn record_request(&self, latency_us: u64) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        self.requests_since_report.fetch_add(1, Ordering::Relaxed);
        self.latency_sum_us.fetch_add(latency_us, Ordering::Relaxed);

        let bucket = bucket_index(latency_us);
        self.latency_buckets[bucket].fetch_add(1, Ordering::Relaxed);
        self.latency_total_us.fetch_add(latency_us, Ordering::Relaxed);
        self.latency_cumulative_buckets[bucket].fetch_add(1, Ordering::Relaxed);

        update_atomic_max(&self.latency_max_us, latency_us);
    }

    #[inline]
    pub fn check_ins_total(&self) -> u64 {
        self.check_ins_total.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn check_outs_total(&self) -> u64 {
        self.check_outs_total.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn sessions_expired_total(&self) -> u64 {
        self.sessions_expired_total.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn occupancy(&self) -> u64 {
        self.occupancy.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn visits_recorded_total(&self) -> u64 {
        self.visits_recorded_total.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn store_errors_total(&self) -> u64 {
        self.store_errors_total.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn highlights_degraded_total(&self) -> u64 {
        self.highlights_degraded_total.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn requests_total(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    /// Read the all-time request latency histogram
    ///
    /// Unaffected by `report()`, so scrapes and the periodic log line both
    /// see every request.
    pub fn request_histogram(&self) -> RequestHistogram {
        let mut buckets = [0u64; NUM_BUCKETS];
        for (i, bucket) in self.latency_cumulative_buckets.iter().enumerate() {
            buckets[i] = bucket.load(Ordering::Relaxed);
        }
        RequestHistogram {
            buckets,
            sum_us: self.latency_total_us.load(Ordering::Relaxed),
        }
    }

    /// Generate metrics summary and reset periodic counters
    ///
    /// This is the only method that resets counters. It uses atomic swap
    /// to get a consistent snapshot while allowing concurrent updates.
    pub fn report(&self) -> MetricsSummary {
        let requests_count = self.requests_since_report.swap(0, Ordering::Relaxed);
        let latency_sum = self.latency_sum_us.swap(0, Ordering::Relaxed);
        let max_latency = self.latency_max_us.swap(0, Ordering::Relaxed);
        let lat_buckets = swap_buckets(&self.latency_buckets);

        let elapsed = {
            let mut last = self.last_report_time.lock();
            let elapsed = last.elapsed();
            *last = Instant::now();
            elapsed
        };

        let requests_per_sec = if elapsed.as_secs_f64() > 0.0 {
            requests_count as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };
        let avg_latency = if requests_count > 0 { latency_sum / requests_count } else { 0 };

        MetricsSummary {
            check_ins_total: self.check_ins_total.load(Ordering::Relaxed),
            check_outs_total: self.check_outs_total.load(Ordering::Relaxed),
            sessions_expired_total: self.sessions_expired_total.load(Ordering::Relaxed),
            occupancy: self.occupancy.load(Ordering::Relaxed),
            visits_recorded_total: self.visits_recorded_total.load(Ordering::Relaxed),
            store_errors_total: self.store_errors_total.load(Ordering::Relaxed),
            highlights_degraded_total: self.highlights_degraded_total.load(Ordering::Relaxed),
            requests_total: self.requests_total.load(Ordering::Relaxed),
            requests_per_sec,
            avg_latency_us: avg_latency,
            max_latency_us: max_latency,
            lat_buckets,
            lat_p50_us: percentile_from_buckets(&lat_buckets, 0.50),
            lat_p95_us: percentile_from_buckets(&lat_buckets, 0.95),
            lat_p99_us: percentile_from_buckets(&lat_buckets, 0.99),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Number of histogram buckets (exported for Prometheus formatting)
pub const METRICS_NUM_BUCKETS: usize = NUM_BUCKETS;

/// Exported bucket bounds for Prometheus formatting
pub const METRICS_BUCKET_BOUNDS: [u64; 10] = BUCKET_BOUNDS;

/// Cumulative request latency histogram
#[derive(Debug, Clone, Copy)]
pub struct RequestHistogram {
    /// Per-bucket counts, same bounds as `MetricsSummary::lat_buckets`
    pub buckets: [u64; NUM_BUCKETS],
    pub sum_us: u64,
}

impl RequestHistogram {
    #[inline]
    pub fn count(&self) -> u64 {
        self.buckets.iter().sum()
    }
}

#[derive(Debug)]
pub struct MetricsSummary {
    pub check_ins_total: u64,
    pub check_outs_total: u64,
    pub sessions_expired_total: u64,
    pub occupancy: u64,
    pub visits_recorded_total: u64,
    pub store_errors_total: u64,
    pub highlights_degraded_total: u64,
    pub requests_total: u64,
    pub requests_per_sec: f64,
    pub avg_latency_us: u64,
    pub max_latency_us: u64,
    /// Request latency histogram buckets
    /// Bounds: ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, ≤25600, ≤51200, >51200 µs
    pub lat_buckets: [u64; NUM_BUCKETS],
    pub lat_p50_us: u64,
    pub lat_p95_us: u64,
    pub lat_p99_us: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            occupancy = %self.occupancy,
            check_ins = %self.check_ins_total,
            check_outs = %self.check_outs_total,
            expired = %self.sessions_expired_total,
            visits_recorded = %self.visits_recorded_total,
            store_errors = %self.store_errors_total,
            requests_total = %self.requests_total,
            requests_per_sec = format!("{:.1}", self.requests_per_sec),
            avg_latency_us = %self.avg_latency_us,
            p99_us = %self.lat_p99_us,
            "metrics"
        );
    }
}
