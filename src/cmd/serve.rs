//! HTTP server command: `feedback-desk serve`.

use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::info;

/// CLI flags that take precedence over file and environment settings.
#[derive(Debug, Default)]
pub struct ServeOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub db_path: Option<PathBuf>,
    pub dev: bool,
}

pub async fn cmd_serve(config_path: &Path, overrides: ServeOverrides, verbose: bool) -> Result<()> {
    let mut config = super::load_config_with_logging(config_path, verbose)?;

    if let Some(host) = overrides.host {
        config.server.host = host;
    }
    if let Some(port) = overrides.port {
        config.server.port = port;
    }
    if let Some(db_path) = overrides.db_path {
        config.server.db_path = db_path;
    }
    if overrides.dev {
        config.server.dev_mode = true;
    }

    info!(
        db_path = %config.server.db_path.display(),
        blob_root = %config.blobs.root.display(),
        dev_mode = config.server.dev_mode,
        "Starting feedback backend"
    );
    feedback_desk::feedback::server::start_server(config).await
}
