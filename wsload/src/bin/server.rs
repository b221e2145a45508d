use anyhow::Context;
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use wsload::cli::ServerArgs;
use wsload::server::{self, AppState};
use wsload::shutdown::cancel_on_signal;
use wsload::stats::{MetricsAggregator, ReportStyle, Reporter};
use wsload::telemetry::init_tracing;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = ServerArgs::parse();
    init_tracing(args.verbose);

    let config = args.into_config().context("invalid server configuration")?;
    info!(
        "Loaded configuration: host={}, port={}, sleep_latency={:?}, sleep_status={}",
        config.host, config.port, config.sleep.latency, config.sleep.status
    );

    // Must be installed before the aggregator records anything.
    let prometheus = PrometheusBuilder::new()
        .install_recorder()
        .context("failed to install Prometheus recorder")?;

    let shutdown = CancellationToken::new();
    cancel_on_signal(shutdown.clone());

    let metrics = Arc::new(MetricsAggregator::new());
    let drain_limit = config.keepalive.write_wait * 2;
    let bind_addr = config.bind_addr();
    let reporter = Reporter::new(Arc::clone(&metrics), ReportStyle::Server, config.show_metrics);

    let state = AppState::new(config)
        .with_metrics(Arc::clone(&metrics))
        .with_shutdown(shutdown.clone())
        .with_prometheus(prometheus);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    let reporter_task = tokio::spawn(reporter.run(shutdown.clone()));
    server::serve(listener, state).await.context("server error")?;
    let _ = reporter_task.await;

    // Upgraded sockets outlive the HTTP server; give them time to send 1001.
    let drained = tokio::time::timeout(drain_limit, async {
        while metrics.open_connections() > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    if drained.is_err() {
        warn!(
            open_connections = metrics.open_connections(),
            "websocket sessions still open at exit"
        );
    }

    info!("wsload server stopped");
    Ok(())
}
