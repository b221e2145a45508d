//! Fixed-rate request pacing
//!
//! `RequestPacer` issues R independent `/sleep` attempts per window. In burst
//! mode the whole batch is spawned at the window tick; in spread mode R
//! workers each fire once per window at a random offset. Either way an
//! attempt never waits for an earlier one to finish.

use crate::config::PacingMode;
use crate::stats::MetricsAggregator;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Result of one request attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    /// The endpoint answered with something other than 200.
    Status(u16),
    /// No response: connect, write, read or timeout failure.
    Transport(String),
}

impl AttemptOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, AttemptOutcome::Success)
    }
}

/// The thing being load-tested.
#[async_trait]
pub trait Endpoint: Send + Sync + 'static {
    async fn call(&self, seq: u64) -> AttemptOutcome;
}

/// `POST /sleep` over a pooled reqwest client.
pub struct HttpSleepEndpoint {
    client: reqwest::Client,
    url: String,
}

impl HttpSleepEndpoint {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Endpoint for HttpSleepEndpoint {
    async fn call(&self, _seq: u64) -> AttemptOutcome {
        let response = match self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "application/json")
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return AttemptOutcome::Transport(e.to_string()),
        };

        let status = response.status();
        // Drain the body so the connection returns to the pool.
        let _ = response.bytes().await;

        if status == reqwest::StatusCode::OK {
            AttemptOutcome::Success
        } else {
            AttemptOutcome::Status(status.as_u16())
        }
    }
}

pub struct RequestPacer<E: Endpoint> {
    endpoint: Arc<E>,
    rate: u32,
    window: Duration,
    mode: PacingMode,
    metrics: Arc<MetricsAggregator>,
    seq: Arc<AtomicU64>,
    shutdown: CancellationToken,
}

impl<E: Endpoint> RequestPacer<E> {
    pub fn new(
        endpoint: E,
        rate: u32,
        mode: PacingMode,
        metrics: Arc<MetricsAggregator>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            endpoint: Arc::new(endpoint),
            rate,
            window: Duration::from_secs(1),
            mode,
            metrics,
            seq: Arc::new(AtomicU64::new(0)),
            shutdown,
        }
    }

    /// Attempts dispatched so far.
    pub fn issued(&self) -> u64 {
        self.seq.load(Ordering::Relaxed)
    }

    /// Spawn one window's worth of attempts without waiting for them.
    pub fn dispatch_batch(&self) -> u32 {
        for _ in 0..self.rate {
            let seq = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
            let endpoint = Arc::clone(&self.endpoint);
            let metrics = Arc::clone(&self.metrics);
            tokio::spawn(async move {
                attempt(endpoint.as_ref(), &metrics, seq).await;
            });
        }
        self.rate
    }

    pub async fn run(self: Arc<Self>) {
        info!(rate = self.rate, mode = ?self.mode, "starting request pacer");
        match self.mode {
            PacingMode::Burst => self.run_burst().await,
            PacingMode::Spread => self.run_spread().await,
        }
        debug!(issued = self.issued(), "request pacer stopped");
    }

    async fn run_burst(&self) {
        if self.rate == 0 {
            self.shutdown.cancelled().await;
            return;
        }
        let mut interval = tokio::time::interval(self.window);
        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                _ = interval.tick() => {
                    self.dispatch_batch();
                }
            }
        }
    }

    async fn run_spread(&self) {
        let mut workers = JoinSet::new();
        for _ in 0..self.rate {
            workers.spawn(spread_worker(
                Arc::clone(&self.endpoint),
                Arc::clone(&self.metrics),
                Arc::clone(&self.seq),
                self.window,
                self.shutdown.clone(),
            ));
        }
        self.shutdown.cancelled().await;
        while workers.join_next().await.is_some() {}
    }
}

/// One attempt per window at a random offset inside it.
///
/// The attempt runs on its own task, so a call slower than the window never
/// delays the next window's schedule.
async fn spread_worker<E: Endpoint>(
    endpoint: Arc<E>,
    metrics: Arc<MetricsAggregator>,
    seq: Arc<AtomicU64>,
    window: Duration,
    shutdown: CancellationToken,
) {
    let mut window_start = Instant::now();
    loop {
        let offset = window.mul_f64(rand::random::<f64>());

        tokio::select! {
            biased;
            _ = shutdown.cancelled() => return,
            _ = tokio::time::sleep_until(window_start + offset) => {}
        }

        let n = seq.fetch_add(1, Ordering::Relaxed) + 1;
        let endpoint = Arc::clone(&endpoint);
        let metrics = Arc::clone(&metrics);
        tokio::spawn(async move {
            attempt(endpoint.as_ref(), &metrics, n).await;
        });

        window_start += window;
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => return,
            _ = tokio::time::sleep_until(window_start) => {}
        }
    }
}

/// Run one exchange and record exactly one outcome.
async fn attempt<E: Endpoint + ?Sized>(
    endpoint: &E,
    metrics: &MetricsAggregator,
    seq: u64,
) -> AttemptOutcome {
    let outcome = endpoint.call(seq).await;
    match &outcome {
        AttemptOutcome::Success => {
            metrics.record_success();
            debug!(seq, "sleep: request succeeded");
        }
        AttemptOutcome::Status(code) => {
            metrics.record_error();
            debug!(seq, code, "sleep: unexpected status");
        }
        AttemptOutcome::Transport(error) => {
            metrics.record_error();
            warn!(seq, error = %error, "sleep: failed to send request");
        }
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    /// Endpoint with a fixed latency and a fixed answer.
    struct FakeEndpoint {
        latency: Duration,
        outcome: AttemptOutcome,
        in_flight: AtomicUsize,
        peak_in_flight: AtomicUsize,
    }

    impl FakeEndpoint {
        fn new(latency: Duration, outcome: AttemptOutcome) -> Self {
            Self {
                latency,
                outcome,
                in_flight: AtomicUsize::new(0),
                peak_in_flight: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Endpoint for FakeEndpoint {
        async fn call(&self, _seq: u64) -> AttemptOutcome {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.latency).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.outcome.clone()
        }
    }

    fn pacer(
        rate: u32,
        mode: PacingMode,
        endpoint: FakeEndpoint,
    ) -> (Arc<RequestPacer<FakeEndpoint>>, Arc<MetricsAggregator>, CancellationToken) {
        let metrics = Arc::new(MetricsAggregator::new());
        let shutdown = CancellationToken::new();
        let pacer = Arc::new(RequestPacer::new(
            endpoint,
            rate,
            mode,
            Arc::clone(&metrics),
            shutdown.clone(),
        ));
        (pacer, metrics, shutdown)
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_rate_is_independent_of_latency() {
        // Each call takes three windows; dispatch must not wait for them.
        let endpoint = FakeEndpoint::new(Duration::from_secs(3), AttemptOutcome::Success);
        let (pacer, metrics, shutdown) = pacer(5, PacingMode::Burst, endpoint);
        let runner = tokio::spawn(Arc::clone(&pacer).run());

        // Ticks at t = 0, 1, ..., 9.
        tokio::time::sleep(Duration::from_millis(9500)).await;
        assert_eq!(pacer.issued(), 50);
        assert!(pacer.endpoint.peak_in_flight.load(Ordering::SeqCst) >= 15);

        shutdown.cancel();
        runner.await.unwrap();

        // Let the in-flight attempts land; every one is counted once.
        tokio::time::sleep(Duration::from_secs(4)).await;
        let snap = metrics.snapshot();
        assert_eq!(snap.successes + snap.errors, 50);
        assert_eq!(snap.errors, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_endpoint_records_one_error_per_attempt() {
        let endpoint = FakeEndpoint::new(Duration::from_millis(50), AttemptOutcome::Status(500));
        let (pacer, metrics, shutdown) = pacer(5, PacingMode::Burst, endpoint);
        let runner = tokio::spawn(Arc::clone(&pacer).run());

        // Sample mid-window, after each batch has completed.
        tokio::time::sleep(Duration::from_millis(500)).await;
        for _ in 0..3 {
            let snap = metrics.snapshot();
            assert_eq!(snap.errors, 5);
            assert_eq!(snap.successes, 0);
            tokio::time::sleep(Duration::from_secs(1)).await;
        }

        shutdown.cancel();
        runner.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_failures_are_errors() {
        let endpoint = FakeEndpoint::new(
            Duration::from_millis(10),
            AttemptOutcome::Transport("connection refused".to_string()),
        );
        let (pacer, metrics, shutdown) = pacer(3, PacingMode::Burst, endpoint);
        let runner = tokio::spawn(Arc::clone(&pacer).run());

        tokio::time::sleep(Duration::from_millis(500)).await;
        let snap = metrics.snapshot();
        assert_eq!(snap.errors, 3);
        assert_eq!(snap.successes, 0);

        shutdown.cancel();
        runner.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_rate_issues_nothing() {
        let endpoint = FakeEndpoint::new(Duration::from_millis(10), AttemptOutcome::Success);
        let (pacer, metrics, shutdown) = pacer(0, PacingMode::Burst, endpoint);
        let runner = tokio::spawn(Arc::clone(&pacer).run());

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(pacer.issued(), 0);
        assert_eq!(metrics.snapshot().completed(), 0);

        shutdown.cancel();
        runner.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_spread_workers_fire_once_per_window() {
        let endpoint = FakeEndpoint::new(Duration::from_millis(100), AttemptOutcome::Success);
        let (pacer, metrics, shutdown) = pacer(4, PacingMode::Spread, endpoint);
        let runner = tokio::spawn(Arc::clone(&pacer).run());

        tokio::time::sleep(Duration::from_secs(10)).await;
        let completed = metrics.snapshot().completed();
        // Four workers, ten windows; a late call may push one window back.
        assert!(
            (32..=40).contains(&completed),
            "completed {} attempts",
            completed
        );
        assert!(pacer.issued() <= 44);

        shutdown.cancel();
        runner.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_spread_rate_is_independent_of_latency() {
        // Each call takes three windows.
        let endpoint = FakeEndpoint::new(Duration::from_secs(3), AttemptOutcome::Success);
        let (pacer, metrics, shutdown) = pacer(4, PacingMode::Spread, endpoint);
        let runner = tokio::spawn(Arc::clone(&pacer).run());

        tokio::time::sleep(Duration::from_secs(30)).await;
        let issued = pacer.issued();
        assert!((118..=124).contains(&issued), "issued {} attempts", issued);
        assert!(pacer.endpoint.peak_in_flight.load(Ordering::SeqCst) >= 8);

        shutdown.cancel();
        runner.await.unwrap();

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(metrics.snapshot().completed(), issued);
    }
}
