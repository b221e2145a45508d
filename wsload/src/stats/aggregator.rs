use metrics::{counter, gauge};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// Per-window view of the counters.
///
/// `successes`, `errors` and `abnormal_closes` are deltas since the previous
/// snapshot. `open_connections` is the live gauge at sampling time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub successes: u64,
    pub errors: u64,
    pub abnormal_closes: u64,
    pub open_connections: i64,
}

impl Snapshot {
    /// Attempts completed during the window.
    pub fn completed(&self) -> u64 {
        self.successes + self.errors
    }
}

/// Owns every shared counter in the process.
///
/// All mutation goes through single atomic instructions, so callers on any
/// task never block and no update is lost between a read and a reset.
#[derive(Debug, Default)]
pub struct MetricsAggregator {
    successes: AtomicU64,
    errors: AtomicU64,
    abnormal_closes: AtomicU64,
    open_connections: AtomicI64,
}

impl MetricsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&self) {
        self.successes.fetch_add(1, Ordering::Relaxed);
        counter!("wsload_requests_total", "outcome" => "success").increment(1);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        counter!("wsload_requests_total", "outcome" => "error").increment(1);
    }

    /// Count a persistent connection that ended abnormally.
    pub fn record_abnormal_close(&self) {
        self.abnormal_closes.fetch_add(1, Ordering::Relaxed);
        counter!("wsload_sessions_closed_total", "kind" => "abnormal").increment(1);
    }

    /// Count a persistent connection that ended gracefully.
    pub fn record_graceful_close(&self) {
        counter!("wsload_sessions_closed_total", "kind" => "graceful").increment(1);
    }

    pub fn connection_opened(&self) {
        self.open_connections.fetch_add(1, Ordering::Relaxed);
        gauge!("wsload_connections_open").increment(1.0);
    }

    pub fn connection_closed(&self) {
        self.open_connections.fetch_sub(1, Ordering::Relaxed);
        gauge!("wsload_connections_open").decrement(1.0);
    }

    /// Increment the gauge and return a guard that decrements it on drop.
    pub fn track_connection(self: &Arc<Self>) -> OpenConnection {
        self.connection_opened();
        OpenConnection {
            metrics: Arc::clone(self),
        }
    }

    pub fn open_connections(&self) -> i64 {
        self.open_connections.load(Ordering::Relaxed)
    }

    /// Read-and-reset the window counters, read the gauge.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            successes: self.successes.swap(0, Ordering::AcqRel),
            errors: self.errors.swap(0, Ordering::AcqRel),
            abnormal_closes: self.abnormal_closes.swap(0, Ordering::AcqRel),
            open_connections: self.open_connections.load(Ordering::Acquire),
        }
    }
}

/// Gauge membership for one open connection.
#[derive(Debug)]
pub struct OpenConnection {
    metrics: Arc<MetricsAggregator>,
}

impl Drop for OpenConnection {
    fn drop(&mut self) {
        self.metrics.connection_closed();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_resets_counters_but_not_gauge() {
        let metrics = MetricsAggregator::new();
        metrics.record_success();
        metrics.record_success();
        metrics.record_error();
        metrics.connection_opened();
        metrics.connection_opened();
        metrics.connection_closed();

        let first = metrics.snapshot();
        assert_eq!(first.successes, 2);
        assert_eq!(first.errors, 1);
        assert_eq!(first.open_connections, 1);

        let second = metrics.snapshot();
        assert_eq!(second.successes, 0);
        assert_eq!(second.errors, 0);
        assert_eq!(second.open_connections, 1, "gauge must survive a snapshot");
    }

    #[test]
    fn test_open_connection_guard_decrements_once() {
        let metrics = Arc::new(MetricsAggregator::new());
        let guard = metrics.track_connection();
        assert_eq!(metrics.open_connections(), 1);
        drop(guard);
        assert_eq!(metrics.open_connections(), 0);
    }

    #[test]
    fn test_abnormal_closes_are_separate_from_request_errors() {
        let metrics = MetricsAggregator::new();
        metrics.record_abnormal_close();
        metrics.record_graceful_close();

        let snap = metrics.snapshot();
        assert_eq!(snap.abnormal_closes, 1);
        assert_eq!(snap.errors, 0);
        assert_eq!(snap.completed(), 0);
    }

    #[test]
    fn test_exported_gauge_follows_opens_and_closes() {
        let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        let held = metrics::with_local_recorder(&recorder, || {
            let metrics = Arc::new(MetricsAggregator::new());
            let a = metrics.track_connection();
            let b = metrics.track_connection();
            let c = metrics.track_connection();
            drop(b);
            drop(a);
            assert_eq!(metrics.open_connections(), 1);
            c
        });

        let rendered = handle.render();
        assert!(
            rendered.lines().any(|line| line == "wsload_connections_open 1"),
            "unexpected exposition: {}",
            rendered
        );
        drop(held);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_increments_are_not_lost() {
        let metrics = Arc::new(MetricsAggregator::new());
        let sampler_metrics = Arc::clone(&metrics);

        // Sample concurrently with the writers; the sum of all deltas must
        // still match what was recorded.
        let sampler = tokio::spawn(async move {
            let mut total = 0u64;
            for _ in 0..50 {
                total += sampler_metrics.snapshot().completed();
                tokio::task::yield_now().await;
            }
            total
        });

        let mut writers = Vec::new();
        for i in 0..16 {
            let metrics = Arc::clone(&metrics);
            writers.push(tokio::spawn(async move {
                for j in 0..1000 {
                    if (i + j) % 3 == 0 {
                        metrics.record_error();
                    } else {
                        metrics.record_success();
                    }
                }
            }));
        }
        for writer in writers {
            writer.await.unwrap();
        }

        let sampled = sampler.await.unwrap();
        let remainder = metrics.snapshot().completed();
        assert_eq!(sampled + remainder, 16 * 1000);
    }
}
