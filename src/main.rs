use anyhow::Result;
use clap::Parser;

mod cli;
mod commands;

use log_engine::{config, init_tracing};

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();
    let command = args.get_command();

    if let cli::Commands::Version = &command {
        println!("Log Engine v{}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    // Config subcommands report their own load errors
    if let cli::Commands::Config { action } = &command {
        return match action {
            cli::ConfigCommands::Show => commands::config::show(&args.config),
            cli::ConfigCommands::Validate => commands::config::validate(&args.config),
        };
    }

    let cfg = config::load_config(&args.config)?;
    init_tracing(&cfg.logging);

    match command {
        cli::Commands::Serve => commands::serve::execute(cfg).await?,
        cli::Commands::Logs(logs_args) => commands::logs::execute(cfg, logs_args).await?,
        cli::Commands::Things => commands::things::execute(cfg).await?,
        cli::Commands::Clear(clear_args) => commands::clear::execute(cfg, clear_args).await?,
        cli::Commands::Config { .. } | cli::Commands::Version => {}
    }

    Ok(())
}
