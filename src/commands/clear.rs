use anyhow::Result;
use clap::Args;
use colored::Colorize;
use log_engine::config::Config;
use log_engine::logging::{LogEngine, ThingId};
use std::io::{self, BufRead, Write};
use tracing::info;

/// Delete log entries
#[derive(Debug, Clone, Args)]
pub struct ClearArgs {
    /// Only remove the entries of this thing
    #[arg(short, long)]
    pub thing: Option<ThingId>,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

/// Execute the clear command
pub async fn execute(cfg: Config, args: ClearArgs) -> Result<()> {
    let scope = match args.thing {
        Some(thing) => format!("all log entries of thing {}", thing),
        None => format!("ALL log entries in {}", cfg.database.path),
    };

    if !args.yes && !confirm(&scope)? {
        println!("{}", "Aborted".yellow());
        return Ok(());
    }

    let engine = LogEngine::open(cfg.database).await;
    match args.thing {
        Some(thing) => engine.remove_thing_logs(thing),
        None => engine.clear_database(),
    }
    engine.wait_for_idle().await;
    let stats = engine.stats();
    engine.shutdown().await;

    if stats.jobs_executed == 0 || stats.job_errors > 0 {
        anyhow::bail!("Failed to delete {}", scope);
    }

    info!("Deleted {}", scope);
    println!("{}", format!("✓ Deleted {}", scope).green());
    Ok(())
}

fn confirm(scope: &str) -> Result<bool> {
    print!("Delete {}? [y/N] ", scope);
    io::stdout().flush()?;

    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(is_yes(&answer))
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_yes() {
        assert!(is_yes("y\n"));
        assert!(is_yes(" YES "));
        assert!(!is_yes(""));
        assert!(!is_yes("no"));
    }
}
