//! Health checks for `tgwatch doctor`.
//!
//! This module defines the common check structures plus the configuration
//! and Bot API checks. Database checks live in `storage`.

use crate::api::BotApi;
use crate::config::{Config, token_format_ok};
use serde::Serialize;

/// High-level category for a health check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckCategory {
    Config,
    Database,
    Api,
}

impl std::fmt::Display for CheckCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config => write!(f, "Config"),
            Self::Database => write!(f, "Database"),
            Self::Api => write!(f, "Bot API"),
        }
    }
}

/// Status for an individual health check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Pass,
    Warning,
    Error,
}

impl CheckStatus {
    /// Whether the check is healthy enough for continued operation.
    #[must_use]
    pub const fn is_ok(self) -> bool {
        matches!(self, Self::Pass)
    }
}

/// Single health check result.
#[derive(Debug, Clone, Serialize)]
pub struct HealthCheck {
    pub category: CheckCategory,
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl HealthCheck {
    fn pass(category: CheckCategory, name: &str, message: impl Into<String>) -> Self {
        Self {
            category,
            name: name.to_string(),
            status: CheckStatus::Pass,
            message: message.into(),
            suggestion: None,
        }
    }

    fn fail(
        category: CheckCategory,
        name: &str,
        status: CheckStatus,
        message: impl Into<String>,
        suggestion: &str,
    ) -> Self {
        Self {
            category,
            name: name.to_string(),
            status,
            message: message.into(),
            suggestion: Some(suggestion.to_string()),
        }
    }
}

/// Table row counts for reporting.
#[derive(Debug, Clone, Serialize)]
pub struct TableStat {
    pub name: String,
    pub rows: i64,
}

/// Aggregated doctor output.
#[derive(Debug, Clone, Serialize)]
pub struct DoctorReport {
    pub checks: Vec<HealthCheck>,
    pub passed: usize,
    pub warnings: usize,
    pub errors: usize,
}

impl DoctorReport {
    #[must_use]
    pub fn new(checks: Vec<HealthCheck>) -> Self {
        let count = |status| checks.iter().filter(|c| c.status == status).count();
        let passed = count(CheckStatus::Pass);
        let warnings = count(CheckStatus::Warning);
        let errors = count(CheckStatus::Error);
        Self {
            checks,
            passed,
            warnings,
            errors,
        }
    }

    #[must_use]
    pub const fn is_healthy(&self) -> bool {
        self.errors == 0
    }
}

/// Checks that need no network: token presence/format and data paths.
#[must_use]
pub fn config_checks(config: &Config) -> Vec<HealthCheck> {
    let mut checks = Vec::new();

    checks.push(match config.telegram.token.as_deref() {
        None => HealthCheck::fail(
            CheckCategory::Config,
            "Bot token",
            CheckStatus::Error,
            "No token configured",
            "Run `tgwatch token --set <TOKEN>` or set TGWATCH_TOKEN.",
        ),
        Some(token) if !token_format_ok(token) => HealthCheck::fail(
            CheckCategory::Config,
            "Bot token",
            CheckStatus::Warning,
            "Token does not look like <digits>:<secret>",
            "Copy the token exactly as issued by @BotFather.",
        ),
        Some(token) => HealthCheck::pass(
            CheckCategory::Config,
            "Bot token",
            crate::config::mask_token(token),
        ),
    });

    let log_dir = config.log_dir();
    checks.push(if log_dir.is_dir() {
        HealthCheck::pass(
            CheckCategory::Config,
            "Log directory",
            log_dir.display().to_string(),
        )
    } else {
        HealthCheck::fail(
            CheckCategory::Config,
            "Log directory",
            CheckStatus::Warning,
            format!("{} does not exist yet", log_dir.display()),
            "It is created on the first `tgwatch monitor` run.",
        )
    });

    checks
}

/// Reported in place of the database checks when no store exists yet.
#[must_use]
pub fn missing_database_check(path: &std::path::Path) -> HealthCheck {
    HealthCheck::fail(
        CheckCategory::Database,
        "Database file",
        CheckStatus::Warning,
        format!("{} does not exist yet", path.display()),
        "Run `tgwatch monitor` to start collecting.",
    )
}

/// Live `getMe` against the configured API.
pub async fn api_check(api: &BotApi) -> HealthCheck {
    match api.get_me().await {
        Ok(me) => HealthCheck::pass(
            CheckCategory::Api,
            "getMe",
            format!("@{} (id {})", me.username.as_deref().unwrap_or("?"), me.id),
        ),
        Err(err) => {
            let status = if err.is_transient() {
                CheckStatus::Warning
            } else {
                CheckStatus::Error
            };
            HealthCheck::fail(
                CheckCategory::Api,
                "getMe",
                status,
                err.to_string(),
                err.suggestion().unwrap_or("Check network access to the Bot API."),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_status_is_ok() {
        assert!(CheckStatus::Pass.is_ok());
        assert!(!CheckStatus::Warning.is_ok());
        assert!(!CheckStatus::Error.is_ok());
    }

    #[test]
    fn test_report_counts() {
        let report = DoctorReport::new(vec![
            HealthCheck::pass(CheckCategory::Database, "a", "ok"),
            HealthCheck::fail(CheckCategory::Api, "b", CheckStatus::Warning, "slow", "retry"),
            HealthCheck::fail(CheckCategory::Config, "c", CheckStatus::Error, "bad", "fix"),
        ]);
        assert_eq!(report.passed, 1);
        assert_eq!(report.warnings, 1);
        assert_eq!(report.errors, 1);
        assert!(!report.is_healthy());
    }

    #[test]
    fn test_config_checks_missing_token() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.paths.data_dir = Some(dir.path().to_path_buf());
        let checks = config_checks(&config);
        let token = checks.iter().find(|c| c.name == "Bot token").unwrap();
        assert_eq!(token.status, CheckStatus::Error);
        assert!(token.suggestion.is_some());
    }

    #[test]
    fn test_config_checks_masks_token() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("logs")).unwrap();
        let mut config = Config::default();
        config.paths.data_dir = Some(dir.path().to_path_buf());
        config.telegram.token = Some("123456789:AAExampleSecretValue_1234".to_string());

        let checks = config_checks(&config);
        assert!(checks.iter().all(|c| c.status.is_ok()));
        let token = checks.iter().find(|c| c.name == "Bot token").unwrap();
        assert!(!token.message.contains("SecretValue"));
    }
}
