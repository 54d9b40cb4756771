//! Configuration view and validation commands: `feedback-desk config`.

use std::path::Path;

use anyhow::Result;
use feedback_desk::config::AppConfig;

use super::super::ConfigCommands;

const MASK: &str = "********";

fn mask(secret: &mut String) {
    if !secret.is_empty() {
        *secret = MASK.to_string();
    }
}

fn generate_secret() -> String {
    format!(
        "{}{}",
        uuid::Uuid::new_v4().simple(),
        uuid::Uuid::new_v4().simple()
    )
}

pub fn cmd_config(config_path: &Path, command: Option<ConfigCommands>) -> Result<()> {
    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Feedback Desk Configuration");
            println!("===========================");
            println!();

            if config_path.exists() {
                println!("Config file: {}", config_path.display());
            } else {
                println!("No config file at {} (using defaults)", config_path.display());
            }
            println!();

            let mut config = AppConfig::resolve(config_path)?;
            mask(&mut config.tokens.access_secret);
            mask(&mut config.tokens.refresh_secret);
            mask(&mut config.admin.registration_secret);

            println!("Effective values (with env overrides):");
            println!();
            print!("{}", toml::to_string_pretty(&config)?);
            println!();
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            let config = AppConfig::resolve(config_path)?;
            let problems = config.validate();

            if problems.is_empty() {
                println!("Configuration is valid.");
                println!();
            } else {
                println!("Configuration problems:");
                for problem in &problems {
                    println!("  - {}", problem);
                }
                println!();
                anyhow::bail!("Configuration has {} problem(s)", problems.len());
            }
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                println!("Config already exists at {}", config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }
            if let Some(parent) = config_path.parent()
                && !parent.as_os_str().is_empty()
                && !parent.exists()
            {
                std::fs::create_dir_all(parent)?;
            }

            let mut config = AppConfig::default();
            config.tokens.access_secret = generate_secret();
            config.tokens.refresh_secret = generate_secret();
            config.admin.registration_secret = generate_secret();
            config.save(config_path)?;

            println!("Created {}", config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [server] host, port, db_path, dev_mode");
            println!("  - [tokens] secrets and lifetimes");
            println!("  - [admin] registration_secret (share it with new admins)");
            println!("  - [blobs] root, public_path");
            println!("  - [feedback] bulk_reset_enabled");
            println!("  - [logging] filter, format");
            println!();
        }
    }

    Ok(())
}
