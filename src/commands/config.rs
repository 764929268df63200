use anyhow::Result;
use colored::Colorize;
use log_engine::config::{self, Config};
use std::path::Path;
use tracing::info;

/// Execute the config show command
///
/// Displays the current configuration with the database password masked
pub fn show(path: &Path) -> Result<()> {
    println!("{}", "Loading configuration...".yellow());
    info!("Loading configuration for display");

    let cfg = config::load_config(path)?;
    let sanitized = sanitize_secrets(&cfg);

    println!("{}", "Current Configuration:".green().bold());
    println!();

    let toml_string = toml::to_string_pretty(&sanitized)?;
    println!("{}", toml_string);

    Ok(())
}

/// Execute the config validate command
pub fn validate(path: &Path) -> Result<()> {
    println!("{}", "Validating configuration...".yellow());
    info!("Validating configuration file {}", path.display());

    let cfg = config::load_config(path)?;
    let db = &cfg.database;

    println!("{}", "✓ Configuration is valid".green());
    println!();
    println!("{}", "Summary:".bold());
    println!("  Database: {} ({})", db.path, db.driver);
    match db.max_entries_limit() {
        Some(max) => println!(
            "  Max Entries: {} (trim {} at a time)",
            max,
            db.effective_trim_size()
        ),
        None => println!("  Max Entries: unlimited"),
    }
    println!(
        "  Queue: {} jobs, flood limit {}",
        db.max_queue_length, db.flood_limit
    );
    println!("  Listen: {}:{}", cfg.server.host, cfg.server.port);

    Ok(())
}

fn sanitize_secrets(cfg: &Config) -> Config {
    let mut sanitized = cfg.clone();
    sanitized.database.password = sanitized.database.password.as_deref().map(mask_secret);
    sanitized
}

/// Shows the first 3 and last 2 characters, "***" for anything shorter than 8
fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() < 8 {
        return "***".to_string();
    }

    let prefix: String = chars[..3].iter().collect();
    let suffix: String = chars[chars.len() - 2..].iter().collect();
    format!("{}...{}", prefix, suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_secret() {
        assert_eq!(mask_secret("hunter2hunter2"), "hun...r2");
        assert_eq!(mask_secret("short"), "***");
        assert_eq!(mask_secret(""), "***");
    }

    #[test]
    fn test_sanitize_secrets_masks_password() {
        let mut cfg = Config::default();
        cfg.database.password = Some("correct-horse-battery".to_string());

        let sanitized = sanitize_secrets(&cfg);
        assert_eq!(sanitized.database.password.as_deref(), Some("cor...ry"));
        assert_eq!(sanitized.database.path, cfg.database.path);
    }

    #[test]
    fn test_sanitize_secrets_without_password() {
        let sanitized = sanitize_secrets(&Config::default());
        assert!(sanitized.database.password.is_none());
    }
}
