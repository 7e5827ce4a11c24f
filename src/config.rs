use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Invitation lifetime used when none (or a non-positive one) is configured
pub const DEFAULT_INVITE_TTL_DAYS: i64 = 7;

/// Main configuration structure for the review workflow engine
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReviewConfig {
    /// Invitation issuing settings
    pub invitations: InvitationConfig,
    /// Outbound notification settings
    pub notifications: NotificationConfig,
    /// Logging settings
    pub observability: ObservabilityConfig,
    /// Database settings (optional)
    pub database: Option<DatabaseConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InvitationConfig {
    /// Days until an invitation expires; unset or non-positive means 7
    pub ttl_days: Option<i64>,
    /// Prefix the invitation token is appended to in outbound messages
    pub accept_url: String,
}

impl InvitationConfig {
    pub fn effective_ttl_days(&self) -> i64 {
        match self.ttl_days {
            Some(days) if days > 0 => days,
            _ => DEFAULT_INVITE_TTL_DAYS,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NotificationConfig {
    /// Sender address stamped on outbound notifications
    pub from_address: String,
    /// Prepended to every subject line
    pub subject_prefix: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level
    pub log_level: String,
    /// Emit JSON lines instead of human-readable output
    pub json_logs: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Database URL (SQLite file path or connection string)
    pub url: String,
    /// Maximum connections in pool
    pub max_connections: u32,
    /// Enable automatic migrations
    pub auto_migrate: bool,
}

impl Default for InvitationConfig {
    fn default() -> Self {
        Self {
            ttl_days: Some(DEFAULT_INVITE_TTL_DAYS),
            accept_url: "http://localhost:3000/invites/accept?token=".to_string(),
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            from_address: "no-reply@qa-review.local".to_string(),
            subject_prefix: "[QA Review]".to_string(),
        }
    }
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            invitations: InvitationConfig::default(),
            notifications: NotificationConfig::default(),
            observability: ObservabilityConfig {
                log_level: "info".to_string(),
                json_logs: true,
            },
            database: Some(DatabaseConfig {
                url: "sqlite://.qa-review/qa-review.db".to_string(),
                max_connections: 5,
                auto_migrate: true,
            }),
        }
    }
}

impl ReviewConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Default values
    /// 2. Configuration file (qa-review.toml)
    /// 3. Environment variables (prefixed with QA_REVIEW__, `__` between sections)
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new("qa-review.toml"))
    }

    /// Same as [`ReviewConfig::load`] with an explicit file location
    pub fn load_from(path: &Path) -> Result<Self> {
        let defaults = Config::try_from(&ReviewConfig::default())?;
        let mut builder = Config::builder().add_source(defaults);

        if path.exists() {
            builder = builder.add_source(File::from(path));
        }

        // Override with environment variables
        builder = builder.add_source(
            Environment::with_prefix("QA_REVIEW")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        Ok(config.try_deserialize()?)
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml_content = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_content)?;
        Ok(())
    }

    /// Load .env file if it exists
    pub fn load_env_file() -> Result<()> {
        Self::load_env_file_from(Path::new(".env"))
    }

    /// Same as [`ReviewConfig::load_env_file`] with an explicit file location
    pub fn load_env_file_from(path: &Path) -> Result<()> {
        if path.exists() {
            dotenvy::from_path(path)?;
            tracing::info!(path = %path.display(), "Loaded environment variables from .env file");
        }
        Ok(())
    }
}

/// Global configuration instance
static CONFIG: std::sync::LazyLock<Result<ReviewConfig, anyhow::Error>> =
    std::sync::LazyLock::new(|| {
        // Load .env file first
        if let Err(e) = ReviewConfig::load_env_file() {
            tracing::warn!(error = %e, "Ignoring unreadable .env file");
        }
        ReviewConfig::load()
    });

/// Get the global configuration
pub fn config() -> Result<&'static ReviewConfig> {
    CONFIG
        .as_ref()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ttl_falls_back_to_seven_days() {
        let mut invitations = InvitationConfig::default();
        assert_eq!(invitations.effective_ttl_days(), 7);

        invitations.ttl_days = None;
        assert_eq!(invitations.effective_ttl_days(), 7);

        invitations.ttl_days = Some(0);
        assert_eq!(invitations.effective_ttl_days(), 7);

        invitations.ttl_days = Some(-3);
        assert_eq!(invitations.effective_ttl_days(), 7);

        invitations.ttl_days = Some(14);
        assert_eq!(invitations.effective_ttl_days(), 14);
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("qa-review.toml");
        std::fs::write(
            &path,
            "[invitations]\nttl_days = 3\naccept_url = \"https://qa.example.com/join/\"\n",
        )
        .unwrap();

        let loaded = ReviewConfig::load_from(&path).unwrap();
        assert_eq!(loaded.invitations.effective_ttl_days(), 3);
        assert_eq!(loaded.invitations.accept_url, "https://qa.example.com/join/");
        assert_eq!(loaded.notifications.subject_prefix, "[QA Review]");
    }

    #[test]
    fn saved_file_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("saved.toml");
        let mut original = ReviewConfig::default();
        original.invitations.ttl_days = Some(10);
        original.save_to_file(&path).unwrap();

        let loaded = ReviewConfig::load_from(&path).unwrap();
        assert_eq!(loaded.invitations.ttl_days, Some(10));
        assert_eq!(loaded.database.map(|d| d.max_connections), Some(5));
    }

    #[test]
    fn env_file_is_optional_but_must_parse() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        assert!(ReviewConfig::load_env_file_from(&path).is_ok());

        std::fs::write(&path, "QA_REVIEW_UNUSED='unterminated\n").unwrap();
        assert!(ReviewConfig::load_env_file_from(&path).is_err());
    }
}
