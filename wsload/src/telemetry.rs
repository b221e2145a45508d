use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Default filter when `RUST_LOG` is unset.
pub fn default_filter(verbose: bool) -> &'static str {
    if verbose {
        "wsload=debug,tower_http=debug"
    } else {
        "wsload=info,tower_http=info"
    }
}

/// Install the global subscriber. `RUST_LOG` wins over the verbosity toggle.
pub fn init_tracing(verbose: bool) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(verbose).into()))
        .with(tracing_subscriber::fmt::layer())
        .init();
}
