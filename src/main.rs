use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cmd;

#[derive(Parser)]
#[command(name = "feedback-desk")]
#[command(version, about = "Faculty feedback backend")]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, global = true, env = "FEEDBACK_CONFIG", default_value = "feedback.toml")]
    pub config: PathBuf,

    /// Log at debug level regardless of the configured filter
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server
    Serve {
        /// Address to bind (overrides server.host)
        #[arg(long)]
        host: Option<String>,

        /// Port to serve on (overrides server.port)
        #[arg(short, long)]
        port: Option<u16>,

        /// Database path (overrides server.db_path)
        #[arg(long)]
        db_path: Option<PathBuf>,

        /// Enable dev mode (permissive CORS for a local frontend)
        #[arg(long)]
        dev: bool,
    },
    /// Create the database and run migrations, then exit
    InitDb {
        /// Database path (overrides server.db_path)
        #[arg(long)]
        db_path: Option<PathBuf>,
    },
    /// Reopen every submitted feedback form with all scores cleared
    ResetFeedback {
        /// Database path (overrides server.db_path)
        #[arg(long)]
        db_path: Option<PathBuf>,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show the effective configuration (secrets masked)
    Show,
    /// Validate configuration and list any problems
    Validate,
    /// Write a feedback.toml with defaults and freshly generated secrets
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match &cli.command {
        Commands::Serve {
            host,
            port,
            db_path,
            dev,
        } => {
            let overrides = cmd::ServeOverrides {
                host: host.clone(),
                port: *port,
                db_path: db_path.clone(),
                dev: *dev,
            };
            cmd::cmd_serve(&cli.config, overrides, cli.verbose).await?;
        }
        Commands::InitDb { db_path } => cmd::cmd_init_db(&cli.config, db_path.clone())?,
        Commands::ResetFeedback { db_path } => {
            cmd::cmd_reset_feedback(&cli.config, db_path.clone(), cli.verbose)?
        }
        Commands::Config { command } => cmd::cmd_config(&cli.config, command.clone())?,
    }

    Ok(())
}
