use anyhow::Result;
use colored::Colorize;
use log_engine::{config::Config, server};
use tracing::info;

/// Execute the serve command
///
/// Runs the HTTP API in the foreground until SIGTERM or Ctrl+C.
pub async fn execute(cfg: Config) -> Result<()> {
    println!(
        "{}",
        format!(
            "Starting log engine on {}:{}...",
            cfg.server.host, cfg.server.port
        )
        .green()
    );
    info!("Serving log database {}", cfg.database.path);

    server::start_server(cfg).await
}
