//! Prometheus text exposition for gateway metrics
//!
//! Served at GET /metrics by the HTTP surface. Every series carries a `site`
//! label taken from config.

use crate::infra::metrics::{Metrics, RequestHistogram, METRICS_BUCKET_BOUNDS, METRICS_NUM_BUCKETS};
use std::fmt::Write;

/// Prometheus metric type
enum MetricType {
    Counter,
    Gauge,
}

impl MetricType {
    fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "counter",
            MetricType::Gauge => "gauge",
        }
    }
}

/// Write a simple metric (counter or gauge) with site label
fn write_metric(
    output: &mut String,
    name: &str,
    help: &str,
    typ: MetricType,
    site: &str,
    val: u64,
) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} {}", typ.as_str());
    let _ = writeln!(output, "{name}{{site=\"{site}\"}} {val}");
}

/// Write a histogram metric with buckets, sum, and count
fn write_histogram(output: &mut String, name: &str, help: &str, site: &str, histogram: &RequestHistogram) {
    let buckets = &histogram.buckets;
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} histogram");

    let mut cumulative = 0u64;
    for (i, &bound) in METRICS_BUCKET_BOUNDS.iter().enumerate() {
        cumulative += buckets[i];
        let _ = writeln!(output, "{name}_bucket{{site=\"{site}\",le=\"{bound}\"}} {cumulative}");
    }
    cumulative += buckets[METRICS_NUM_BUCKETS - 1];
    let _ = writeln!(output, "{name}_bucket{{site=\"{site}\",le=\"+Inf\"}} {cumulative}");

    let _ = writeln!(output, "{name}_sum{{site=\"{site}\"}} {}", histogram.sum_us);
    let _ = writeln!(output, "{name}_count{{site=\"{site}\"}} {}", histogram.count());
}

/// Format metrics in Prometheus text exposition format
///
/// `occupancy` is passed in rather than read from the gauge so the scrape
/// reflects sessions that expired since the last touch. Scrapes only read;
/// the periodic window behind `Metrics::report` is left alone.
pub fn format_prometheus_metrics(
    metrics: &Metrics,
    occupancy: usize,
    capacity: usize,
    site_id: &str,
) -> String {
    let mut output = String::with_capacity(2048);

    write_occupancy_metrics(&mut output, site_id, metrics, occupancy, capacity);
    write_ledger_metrics(&mut output, site_id, metrics);
    write_request_metrics(&mut output, site_id, metrics);

    output
}

fn write_occupancy_metrics(
    output: &mut String,
    site: &str,
    metrics: &Metrics,
    occupancy: usize,
    capacity: usize,
) {
    write_metric(
        output,
        "checkin_occupancy",
        "Users currently checked in",
        MetricType::Gauge,
        site,
        occupancy as u64,
    );
    write_metric(
        output,
        "checkin_capacity",
        "Configured venue capacity",
        MetricType::Gauge,
        site,
        capacity as u64,
    );
    write_metric(
        output,
        "checkin_check_ins_total",
        "Check-ins accepted",
        MetricType::Counter,
        site,
        metrics.check_ins_total(),
    );
    write_metric(
        output,
        "checkin_check_outs_total",
        "Check-outs that removed a session",
        MetricType::Counter,
        site,
        metrics.check_outs_total(),
    );
    write_metric(
        output,
        "checkin_sessions_expired_total",
        "Sessions removed by timeout",
        MetricType::Counter,
        site,
        metrics.sessions_expired_total(),
    );
}

fn write_ledger_metrics(output: &mut String, site: &str, metrics: &Metrics) {
    write_metric(
        output,
        "checkin_visits_recorded_total",
        "Visits written to the ledger",
        MetricType::Counter,
        site,
        metrics.visits_recorded_total(),
    );
    write_metric(
        output,
        "checkin_store_errors_total",
        "Ledger persistence failures",
        MetricType::Counter,
        site,
        metrics.store_errors_total(),
    );
    write_metric(
        output,
        "checkin_highlights_degraded_total",
        "Listing rows whose payment highlight could not be computed",
        MetricType::Counter,
        site,
        metrics.highlights_degraded_total(),
    );
}

fn write_request_metrics(output: &mut String, site: &str, metrics: &Metrics) {
    write_metric(
        output,
        "checkin_http_requests_total",
        "HTTP requests served",
        MetricType::Counter,
        site,
        metrics.requests_total(),
    );
    write_histogram(
        output,
        "checkin_http_request_latency_us",
        "HTTP request handling latency in microseconds",
        site,
        &metrics.request_histogram(),
    );
}
