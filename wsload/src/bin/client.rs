use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;
use wsload::LoadGenerator;
use wsload::cli::ClientArgs;
use wsload::shutdown::cancel_on_signal;
use wsload::telemetry::init_tracing;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = ClientArgs::parse();
    init_tracing(args.verbose);

    let config = args.into_config().context("invalid client configuration")?;
    info!(
        "Loaded configuration: addr={}, ws={}, sleep={}",
        config.addr, config.connections, config.rate
    );

    let shutdown = CancellationToken::new();
    cancel_on_signal(shutdown.clone());

    LoadGenerator::new(config)
        .run(shutdown)
        .await
        .context("load generator failed")?;

    info!("wsload client stopped");
    Ok(())
}
