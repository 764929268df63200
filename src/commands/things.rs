use anyhow::Result;
use colored::Colorize;
use log_engine::config::Config;
use log_engine::logging::LogEngine;

/// Execute the things command
///
/// Lists every thing that has at least one stored entry.
pub async fn execute(cfg: Config) -> Result<()> {
    let engine = LogEngine::open(cfg.database).await;
    let result = engine.fetch_things().wait().await;
    engine.shutdown().await;
    let things = result?;

    if things.is_empty() {
        println!("{}", "No things have log entries".yellow());
        return Ok(());
    }

    println!("{}", format!("{} things with log entries", things.len()).bold());
    for thing in things {
        println!("  {}", thing.to_string().cyan());
    }

    Ok(())
}
