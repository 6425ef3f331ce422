use tracing_subscriber::{fmt::SubscriberBuilder, EnvFilter};

use crate::util::env::env_flag;

/// Fallback filter shared by the populate binaries when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "info,gog_populate=debug,actix_web=info,reqwest=warn";

/// Sets up the global tracing subscriber with a fmt formatter and env filter.
///
/// `RUST_LOG` wins over `default_filter`. Set `LOG_NO_ANSI=1` when shipping logs
/// to a collector that chokes on colour codes.
pub fn init_tracing(default_filter: &str) -> Result<(), anyhow::Error> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    SubscriberBuilder::default()
        .with_env_filter(filter)
        .with_ansi(!env_flag("LOG_NO_ANSI", false))
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {}", e))
}
