//! CLI command implementations.
//!
//! Each submodule owns one or more related `Commands` variants:
//!
//! | Module          | Commands handled                                   |
//! |-----------------|-----------------------------------------------------|
//! | `serve`         | `Serve`                                            |
//! | `db`            | `InitDb`, `ResetFeedback`                          |
//! | `config`        | `Config`                                           |

pub mod config;
pub mod db;
pub mod serve;

pub use config::cmd_config;
pub use db::{cmd_init_db, cmd_reset_feedback};
pub use serve::{ServeOverrides, cmd_serve};

use std::path::Path;

use anyhow::Result;
use feedback_desk::config::AppConfig;
use feedback_desk::logging::init_tracing;

/// Load `feedback.toml` (or defaults), apply `FEEDBACK_*` variables, then
/// install the tracing subscriber.
pub(crate) fn load_config_with_logging(config_path: &Path, verbose: bool) -> Result<AppConfig> {
    let mut config = AppConfig::resolve(config_path)?;
    if verbose {
        config.logging.filter = "debug".to_string();
    }
    init_tracing(&config.logging)?;
    Ok(config)
}
