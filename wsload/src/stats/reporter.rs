use super::aggregator::{MetricsAggregator, Snapshot};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Which side of the test is reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportStyle {
    /// The load generator distinguishes successes from errors.
    Client,
    /// The callee only counts handled requests.
    Server,
}

impl ReportStyle {
    pub fn format(&self, snap: &Snapshot) -> String {
        match self {
            ReportStyle::Client => format!(
                "requests-per-second={} errors-per-second={} open-connections={}",
                snap.successes, snap.errors, snap.open_connections
            ),
            ReportStyle::Server => format!(
                "requests-per-second={} open-connections={}",
                snap.successes, snap.open_connections
            ),
        }
    }
}

/// Takes one snapshot per window and optionally logs it.
///
/// Snapshots are taken even when printing is disabled so that every window
/// starts from zero.
pub struct Reporter {
    metrics: Arc<MetricsAggregator>,
    style: ReportStyle,
    window: Duration,
    enabled: bool,
}

impl Reporter {
    pub fn new(metrics: Arc<MetricsAggregator>, style: ReportStyle, enabled: bool) -> Self {
        Self {
            metrics,
            style,
            window: Duration::from_secs(1),
            enabled,
        }
    }

    /// Take a snapshot and emit it; returns what was sampled.
    pub fn tick(&self) -> Snapshot {
        let snap = self.metrics.snapshot();
        if self.enabled {
            info!("{}", self.style.format(&snap));
            if snap.abnormal_closes > 0 {
                warn!("abnormal-closes={}", snap.abnormal_closes);
            }
        }
        snap
    }

    pub async fn run(self, shutdown: CancellationToken) {
        let start = tokio::time::Instant::now() + self.window;
        let mut interval = tokio::time::interval_at(start, self.window);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    self.tick();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_line_format() {
        let snap = Snapshot {
            successes: 5,
            errors: 2,
            abnormal_closes: 0,
            open_connections: 10,
        };
        assert_eq!(
            ReportStyle::Client.format(&snap),
            "requests-per-second=5 errors-per-second=2 open-connections=10"
        );
    }

    #[test]
    fn test_server_line_omits_errors() {
        let snap = Snapshot {
            successes: 7,
            errors: 3,
            abnormal_closes: 0,
            open_connections: 0,
        };
        assert_eq!(
            ReportStyle::Server.format(&snap),
            "requests-per-second=7 open-connections=0"
        );
    }

    #[test]
    fn test_tick_resets_even_when_disabled() {
        let metrics = Arc::new(MetricsAggregator::new());
        let reporter = Reporter::new(Arc::clone(&metrics), ReportStyle::Client, false);

        metrics.record_success();
        assert_eq!(reporter.tick().successes, 1);
        assert_eq!(reporter.tick().successes, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_samples_once_per_window() {
        let metrics = Arc::new(MetricsAggregator::new());
        let reporter = Reporter::new(Arc::clone(&metrics), ReportStyle::Client, false);
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(reporter.run(shutdown.clone()));

        metrics.record_success();
        tokio::time::sleep(Duration::from_millis(1500)).await;
        // The first window has been sampled and reset.
        assert_eq!(metrics.snapshot().successes, 0);

        shutdown.cancel();
        handle.await.unwrap();
    }
}
