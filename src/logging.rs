//! Tracing setup for the daemon.

use crate::config::LogConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the global subscriber. A CLI override wins over the configured
/// level; `RUST_LOG` wins over both.
pub fn init(config: &LogConfig, override_level: Option<&str>) {
    let level = override_level.unwrap_or(&config.level);

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
