pub mod config;
pub mod error;
pub mod handlers;
pub mod logging;
pub mod metrics;
pub mod server;
pub mod signals;

use config::LoggingConfig;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize tracing/logging
///
/// `RUST_LOG` takes precedence over the configured level. Calling this more
/// than once keeps the first subscriber.
pub fn init_tracing(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.level));

    let registry = tracing_subscriber::registry().with(filter);
    let result = if config.format == "json" {
        registry.with(fmt::layer().json().with_target(true)).try_init()
    } else {
        registry.with(fmt::layer().with_target(true)).try_init()
    };

    if let Err(e) = result {
        eprintln!("Warning: tracing already initialized: {}", e);
    }
}
