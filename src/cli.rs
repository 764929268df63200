use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "log-engine", version, about = "Smart home log history")]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml", global = true)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Serve the log API over HTTP (default)
    Serve,

    /// Query stored log entries
    Logs(crate::commands::logs::LogsArgs),

    /// List things that have log entries
    Things,

    /// Delete log entries
    Clear(crate::commands::clear::ClearArgs),

    /// Configuration management commands
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },

    /// Show version information
    Version,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigCommands {
    /// Display current configuration (with secrets masked)
    Show,

    /// Validate configuration file
    Validate,
}

impl Cli {
    /// Get the command to execute, defaulting to Serve if none provided
    pub fn get_command(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Serve)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_command_is_serve() {
        let cli = Cli {
            config: PathBuf::from("config.toml"),
            command: None,
        };

        assert!(matches!(cli.get_command(), Commands::Serve));
    }

    #[test]
    fn test_cli_parsing_logs_filters() {
        let args = vec![
            "log-engine",
            "logs",
            "--source",
            "events,states",
            "--limit",
            "5",
            "--value",
            "42",
        ];
        let cli = Cli::try_parse_from(args).unwrap();

        match cli.get_command() {
            Commands::Logs(logs) => {
                assert_eq!(logs.source.len(), 2);
                assert_eq!(logs.limit, 5);
                assert_eq!(logs.value, vec!["42".to_string()]);
            }
            _ => panic!("Expected Logs command"),
        }
    }

    #[test]
    fn test_cli_rejects_unknown_source() {
        let args = vec!["log-engine", "logs", "--source", "lamps"];
        assert!(Cli::try_parse_from(args).is_err());
    }

    #[test]
    fn test_cli_parsing_clear_thing() {
        let args = vec![
            "log-engine",
            "clear",
            "--thing",
            "6a7c4f10-7c3d-4b0c-9bde-1f7d1b4f3a11",
            "--yes",
        ];
        let cli = Cli::try_parse_from(args).unwrap();

        match cli.get_command() {
            Commands::Clear(clear) => {
                assert!(clear.yes);
                assert!(clear.thing.is_some());
            }
            _ => panic!("Expected Clear command"),
        }
    }

    #[test]
    fn test_cli_parsing_config_show() {
        let args = vec!["log-engine", "-c", "custom.toml", "config", "show"];
        let cli = Cli::try_parse_from(args).unwrap();

        assert_eq!(cli.config, PathBuf::from("custom.toml"));
        assert!(matches!(
            cli.get_command(),
            Commands::Config {
                action: ConfigCommands::Show
            }
        ));
    }
}
