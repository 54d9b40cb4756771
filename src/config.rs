//! Configuration for the feedback backend.
//!
//! Settings are layered: `feedback.toml` (or built-in defaults) first, then
//! `FEEDBACK_*` environment variables, then CLI flags applied by the caller.
//! Token secrets are carried in [`TokenConfig`] and handed to the token service
//! at construction time; nothing reads the environment after startup.
//!
//! # Configuration File Format
//!
//! ```toml
//! [server]
//! host = "127.0.0.1"
//! port = 8000
//! db_path = "data/feedback.db"
//! dev_mode = false
//!
//! [tokens]
//! access_secret = "change-me"
//! refresh_secret = "change-me-too"
//! access_ttl_secs = 86400
//! refresh_ttl_secs = 864000
//!
//! [admin]
//! registration_secret = "shared-out-of-band"
//!
//! [blobs]
//! root = "data/blobs"
//! public_path = "/blobs"
//!
//! [feedback]
//! bulk_reset_enabled = true
//!
//! [logging]
//! filter = "info"
//! format = "pretty"
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Secrets shorter than this are reported by [`AppConfig::validate`].
pub const MIN_SECRET_LENGTH: usize = 16;

/// HTTP listener and database location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    /// Permissive CORS for a local frontend dev server
    #[serde(default)]
    pub dev_mode: bool,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_db_path() -> PathBuf {
    PathBuf::from("data/feedback.db")
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            db_path: default_db_path(),
            dev_mode: false,
        }
    }
}

/// Signing material and lifetimes for access and refresh tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenConfig {
    #[serde(default)]
    pub access_secret: String,
    #[serde(default)]
    pub refresh_secret: String,
    #[serde(default = "default_access_ttl")]
    pub access_ttl_secs: u64,
    #[serde(default = "default_refresh_ttl")]
    pub refresh_ttl_secs: u64,
}

fn default_access_ttl() -> u64 {
    24 * 60 * 60
}

fn default_refresh_ttl() -> u64 {
    10 * 24 * 60 * 60
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            access_secret: String::new(),
            refresh_secret: String::new(),
            access_ttl_secs: default_access_ttl(),
            refresh_ttl_secs: default_refresh_ttl(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdminConfig {
    /// Shared secret required to register a new admin
    #[serde(default)]
    pub registration_secret: String,
}

/// Local blob store for faculty images.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobConfig {
    #[serde(default = "default_blob_root")]
    pub root: PathBuf,
    /// URL prefix under which stored blobs are served
    #[serde(default = "default_public_path")]
    pub public_path: String,
}

fn default_blob_root() -> PathBuf {
    PathBuf::from("data/blobs")
}

fn default_public_path() -> String {
    "/blobs".to_string()
}

impl Default for BlobConfig {
    fn default() -> Self {
        Self {
            root: default_blob_root(),
            public_path: default_public_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackConfig {
    /// Expose the admin bulk-reset endpoint. The CLI command ignores this.
    #[serde(default = "default_bulk_reset_enabled")]
    pub bulk_reset_enabled: bool,
}

fn default_bulk_reset_enabled() -> bool {
    true
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            bulk_reset_enabled: default_bulk_reset_enabled(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            _ => anyhow::bail!("Invalid log format '{}'. Valid values: pretty, json", s),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. "info" or "feedback_desk=debug,tower_http=info"
    #[serde(default = "default_log_filter")]
    pub filter: String,
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            format: LogFormat::default(),
        }
    }
}

/// The complete feedback.toml configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub tokens: TokenConfig,
    #[serde(default)]
    pub admin: AdminConfig,
    #[serde(default)]
    pub blobs: BlobConfig,
    #[serde(default)]
    pub feedback: FeedbackConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse feedback.toml")
    }

    /// Returns default configuration if the file doesn't exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).context("Failed to serialize feedback.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// File (or defaults) followed by the process environment.
    pub fn resolve(path: &Path) -> Result<Self> {
        let mut config = Self::load_or_default(path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply `FEEDBACK_*` overrides obtained through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("FEEDBACK_HOST") {
            self.server.host = v;
        }
        if let Some(v) = lookup("FEEDBACK_PORT") {
            self.server.port = v.parse().context("Invalid FEEDBACK_PORT")?;
        }
        if let Some(v) = lookup("FEEDBACK_DB_PATH") {
            self.server.db_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("FEEDBACK_ACCESS_TOKEN_SECRET") {
            self.tokens.access_secret = v;
        }
        if let Some(v) = lookup("FEEDBACK_REFRESH_TOKEN_SECRET") {
            self.tokens.refresh_secret = v;
        }
        if let Some(v) = lookup("FEEDBACK_ACCESS_TOKEN_TTL_SECS") {
            self.tokens.access_ttl_secs = v
                .parse()
                .context("Invalid FEEDBACK_ACCESS_TOKEN_TTL_SECS")?;
        }
        if let Some(v) = lookup("FEEDBACK_REFRESH_TOKEN_TTL_SECS") {
            self.tokens.refresh_ttl_secs = v
                .parse()
                .context("Invalid FEEDBACK_REFRESH_TOKEN_TTL_SECS")?;
        }
        if let Some(v) = lookup("FEEDBACK_REGISTRATION_SECRET") {
            self.admin.registration_secret = v;
        }
        if let Some(v) = lookup("FEEDBACK_BLOB_ROOT") {
            self.blobs.root = PathBuf::from(v);
        }
        if let Some(v) = lookup("FEEDBACK_BULK_RESET_ENABLED") {
            self.feedback.bulk_reset_enabled = v != "false" && v != "0";
        }
        if let Some(v) = lookup("FEEDBACK_LOG") {
            self.logging.filter = v;
        }
        if let Some(v) = lookup("FEEDBACK_LOG_FORMAT") {
            self.logging.format = v.parse()?;
        }
        Ok(())
    }

    /// Validate the configuration and return any problems.
    ///
    /// An empty list means the server can start.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        for (name, secret) in [
            ("tokens.access_secret", &self.tokens.access_secret),
            ("tokens.refresh_secret", &self.tokens.refresh_secret),
            ("admin.registration_secret", &self.admin.registration_secret),
        ] {
            if secret.is_empty() {
                problems.push(format!("{} is not set", name));
            } else if secret.len() < MIN_SECRET_LENGTH {
                problems.push(format!(
                    "{} is shorter than {} characters",
                    name, MIN_SECRET_LENGTH
                ));
            }
        }

        if !self.tokens.access_secret.is_empty()
            && self.tokens.access_secret == self.tokens.refresh_secret
        {
            problems.push("tokens.access_secret and tokens.refresh_secret must differ".to_string());
        }
        if self.tokens.access_ttl_secs == 0 {
            problems.push("tokens.access_ttl_secs must be greater than zero".to_string());
        }
        if self.tokens.refresh_ttl_secs < self.tokens.access_ttl_secs {
            problems.push(
                "tokens.refresh_ttl_secs should not be shorter than tokens.access_ttl_secs"
                    .to_string(),
            );
        }
        if !self.blobs.public_path.starts_with('/') {
            problems.push(format!(
                "blobs.public_path '{}' must start with '/'",
                self.blobs.public_path
            ));
        }

        problems
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn valid_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.tokens.access_secret = "a".repeat(32);
        config.tokens.refresh_secret = "r".repeat(32);
        config.admin.registration_secret = "s".repeat(20);
        config
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.db_path, PathBuf::from("data/feedback.db"));
        assert_eq!(config.tokens.access_ttl_secs, 86_400);
        assert_eq!(config.tokens.refresh_ttl_secs, 864_000);
        assert!(config.feedback.bulk_reset_enabled);
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn test_parse_partial_file_keeps_defaults() {
        let config = AppConfig::parse(
            r#"
            [server]
            port = 9100

            [tokens]
            access_secret = "abc"
            "#,
        )
        .unwrap();
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.tokens.access_secret, "abc");
        assert_eq!(config.tokens.refresh_ttl_secs, 864_000);
    }

    #[test]
    fn test_parse_invalid_toml() {
        let result = AppConfig::parse("[server\nport = ");
        assert!(result.is_err());
    }

    #[test]
    fn test_env_overrides_file_values() {
        let mut config = AppConfig::default();
        let env: HashMap<&str, &str> = HashMap::from([
            ("FEEDBACK_PORT", "9000"),
            ("FEEDBACK_ACCESS_TOKEN_SECRET", "from-env"),
            ("FEEDBACK_BULK_RESET_ENABLED", "false"),
            ("FEEDBACK_LOG_FORMAT", "JSON"),
        ]);
        config
            .apply_env(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.tokens.access_secret, "from-env");
        assert!(!config.feedback.bulk_reset_enabled);
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_env_invalid_port_is_error() {
        let mut config = AppConfig::default();
        let result = config.apply_env(|k| (k == "FEEDBACK_PORT").then(|| "eighty".to_string()));
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_reports_missing_secrets() {
        let problems = AppConfig::default().validate();
        assert!(problems.iter().any(|p| p.contains("tokens.access_secret")));
        assert!(problems.iter().any(|p| p.contains("tokens.refresh_secret")));
        assert!(problems.iter().any(|p| p.contains("admin.registration_secret")));
    }

    #[test]
    fn test_validate_rejects_shared_token_secret() {
        let mut config = valid_config();
        config.tokens.refresh_secret = config.tokens.access_secret.clone();
        let problems = config.validate();
        assert!(problems.iter().any(|p| p.contains("must differ")));
    }

    #[test]
    fn test_validate_accepts_complete_config() {
        assert!(valid_config().validate().is_empty());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feedback.toml");
        let config = valid_config();
        config.save(&path).unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded.tokens.access_secret, config.tokens.access_secret);
        assert_eq!(loaded.server.port, config.server.port);
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load_or_default(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(config.server.port, 8000);
    }
}
