//! Database maintenance commands: `feedback-desk init-db` and
//! `feedback-desk reset-feedback`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use feedback_desk::config::AppConfig;
use feedback_desk::errors::FeedbackError;
use feedback_desk::feedback::db::FeedbackDb;
use feedback_desk::feedback::submission::bulk_reset_locked;

fn open_db(db_path: &Path) -> Result<FeedbackDb> {
    if let Some(parent) = db_path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).context("Failed to create database directory")?;
    }
    FeedbackDb::new(db_path).context("Failed to initialize feedback database")
}

pub fn cmd_init_db(config_path: &Path, db_path: Option<PathBuf>) -> Result<()> {
    let config = AppConfig::resolve(config_path)?;
    let db_path = db_path.unwrap_or(config.server.db_path);
    open_db(&db_path)?;
    println!("Feedback database initialized at {}", db_path.display());
    Ok(())
}

/// Runs the same reset as `PATCH /api/admin/feedback/reset`, without going
/// through HTTP. `feedback.bulk_reset_enabled` does not apply here.
pub fn cmd_reset_feedback(config_path: &Path, db_path: Option<PathBuf>, verbose: bool) -> Result<()> {
    let config = super::load_config_with_logging(config_path, verbose)?;
    let db_path = db_path.unwrap_or(config.server.db_path);
    let db = open_db(&db_path)?;

    match bulk_reset_locked(&db) {
        Ok(count) => {
            println!("Reset {} feedback form(s).", count);
            Ok(())
        }
        Err(FeedbackError::NotFound(_)) => {
            println!("No attempted feedback forms to reset.");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
