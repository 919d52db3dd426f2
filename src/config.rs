//! Configuration system for tgwatch.
//!
//! Provides layered configuration from multiple sources:
//!
//! 1. **Compiled defaults** - Sensible defaults built into the binary
//! 2. **User config file** - `~/.config/tgwatch/config.toml`
//!    (or the path in `TGWATCH_CONFIG`)
//! 3. **Environment variables** - `TGWATCH_*` prefix
//! 4. **CLI arguments** - Highest priority, always wins
//!
//! The bot token is looked up in the same order and finally in the token
//! file (`<data_dir>/token`), which `tgwatch token --set` writes.
//!
//! # Example Configuration File
//!
//! ```toml
//! [telegram]
//! api_base = "https://api.telegram.org"
//! poll_timeout = 30
//! retry_delay_secs = 3
//!
//! [paths]
//! data_dir = "~/.local/share/tgwatch"
//!
//! [search]
//! message_limit = 50
//! search_limit = 50
//!
//! [output]
//! format = "text"
//! colors = true
//! ```

use crate::api::DEFAULT_API_BASE;
use crate::error::{Result, WatchError};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, info, warn};

static TOKEN_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^\d{3,}:[A-Za-z0-9_-]{20,}$").ok());

/// Main configuration structure for tgwatch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub telegram: TelegramConfig,
    pub paths: PathsConfig,
    pub search: SearchConfig,
    pub output: OutputConfig,
}

/// Bot API and polling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    /// Bot token. Prefer the token file over putting it here.
    /// Environment variable: `TGWATCH_TOKEN`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Bot API server.
    /// Environment variable: `TGWATCH_API_BASE`
    pub api_base: String,

    /// Server-side long-poll wait in seconds.
    /// Environment variable: `TGWATCH_POLL_TIMEOUT`
    pub poll_timeout: u64,

    /// Pause after a failed poll, in seconds.
    pub retry_delay_secs: u64,

    /// Pause between successful polls, in milliseconds.
    pub idle_delay_ms: u64,
}

/// Filesystem locations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Root for the database, logs and token file.
    /// Environment variable: `TGWATCH_DATA_DIR`
    pub data_dir: Option<PathBuf>,

    /// Path to the `SQLite` database file.
    /// Environment variable: `TGWATCH_DB`
    pub db: Option<PathBuf>,

    /// Path to the token file.
    pub token_file: Option<PathBuf>,
}

/// Read-side limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Default number of messages shown for a user.
    pub message_limit: usize,

    /// Default number of keyword search hits.
    /// Environment variable: `TGWATCH_LIMIT`
    pub search_limit: usize,
}

/// Output formatting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Default output format: text or json.
    /// Environment variable: `TGWATCH_FORMAT`
    pub format: String,

    /// Enable colored output. Disabled by `NO_COLOR` or `TGWATCH_NO_COLOR`.
    pub colors: bool,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            token: None,
            api_base: DEFAULT_API_BASE.to_string(),
            poll_timeout: 30,
            retry_delay_secs: 3,
            idle_delay_ms: 100,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            message_limit: 50,
            search_limit: 50,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: "text".to_string(),
            colors: true,
        }
    }
}

impl Config {
    /// Load configuration from the config file and the environment.
    ///
    /// The token file is consulted last, only when no token was configured.
    #[must_use]
    pub fn load() -> Self {
        let mut config = Self::default();

        if let Some(user_config) = Self::user_config_path().and_then(|p| Self::load_from_file(&p))
        {
            config.merge(user_config);
        }

        config.apply_overrides(|key| std::env::var(key).ok());

        if config.telegram.token.is_none() {
            config.telegram.token = TokenStore::new(config.token_file()).load().ok().flatten();
        }

        debug!(
            data_dir = %config.data_dir().display(),
            api_base = %config.telegram.api_base,
            has_token = config.telegram.token.is_some(),
            "Configuration loaded"
        );
        config
    }

    /// Load configuration from a specific file.
    #[must_use]
    pub fn load_from_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            debug!("Config file not found: {}", path.display());
            return None;
        }

        match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => {
                    info!("Loaded config from: {}", path.display());
                    Some(config)
                }
                Err(e) => {
                    warn!("Failed to parse config file {}: {}", path.display(), e);
                    None
                }
            },
            Err(e) => {
                warn!("Failed to read config file {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Get the path to the user configuration file.
    #[must_use]
    pub fn user_config_path() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("TGWATCH_CONFIG") {
            return Some(PathBuf::from(path));
        }
        dirs::config_dir().map(|p| p.join("tgwatch").join("config.toml"))
    }

    /// Apply `TGWATCH_*` overrides read through `get`.
    fn apply_overrides(&mut self, get: impl Fn(&str) -> Option<String>) {
        if let Some(token) = get("TGWATCH_TOKEN").filter(|t| !t.trim().is_empty()) {
            self.telegram.token = Some(token.trim().to_string());
        }
        if let Some(base) = get("TGWATCH_API_BASE") {
            self.telegram.api_base = base;
        }
        if let Some(timeout) = get("TGWATCH_POLL_TIMEOUT").and_then(|v| v.parse().ok()) {
            self.telegram.poll_timeout = timeout;
        }

        if let Some(dir) = get("TGWATCH_DATA_DIR") {
            self.paths.data_dir = Some(PathBuf::from(dir));
        }
        if let Some(db) = get("TGWATCH_DB") {
            self.paths.db = Some(PathBuf::from(db));
        }

        if let Some(limit) = get("TGWATCH_LIMIT").and_then(|v| v.parse().ok()) {
            self.search.search_limit = limit;
        }

        if let Some(format) = get("TGWATCH_FORMAT") {
            self.output.format = format;
        }
        if get("TGWATCH_NO_COLOR").is_some() || get("NO_COLOR").is_some() {
            self.output.colors = false;
        }
    }

    /// Merge another config into this one (other takes precedence).
    fn merge(&mut self, other: Self) {
        if other.telegram.token.is_some() {
            self.telegram.token = other.telegram.token;
        }
        self.telegram.api_base = other.telegram.api_base;
        self.telegram.poll_timeout = other.telegram.poll_timeout;
        self.telegram.retry_delay_secs = other.telegram.retry_delay_secs;
        self.telegram.idle_delay_ms = other.telegram.idle_delay_ms;

        if other.paths.data_dir.is_some() {
            self.paths.data_dir = other.paths.data_dir;
        }
        if other.paths.db.is_some() {
            self.paths.db = other.paths.db;
        }
        if other.paths.token_file.is_some() {
            self.paths.token_file = other.paths.token_file;
        }

        self.search.message_limit = other.search.message_limit;
        self.search.search_limit = other.search.search_limit;

        self.output.format = other.output.format;
        self.output.colors = other.output.colors;
    }

    /// Data directory, using the platform default if not configured.
    #[must_use]
    pub fn data_dir(&self) -> PathBuf {
        self.paths
            .data_dir
            .clone()
            .unwrap_or_else(crate::default_data_dir)
    }

    /// Database path, `<data_dir>/tgwatch.db` unless configured.
    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.paths
            .db
            .clone()
            .unwrap_or_else(|| self.data_dir().join(crate::DEFAULT_DB_NAME))
    }

    /// Operation log directory.
    #[must_use]
    pub fn log_dir(&self) -> PathBuf {
        self.data_dir().join("logs")
    }

    /// Export directory.
    #[must_use]
    pub fn export_dir(&self) -> PathBuf {
        self.data_dir().join("exports")
    }

    /// Token file path.
    #[must_use]
    pub fn token_file(&self) -> PathBuf {
        self.paths
            .token_file
            .clone()
            .unwrap_or_else(|| self.data_dir().join("token"))
    }

    /// The configured token or [`WatchError::MissingToken`].
    ///
    /// # Errors
    ///
    /// Returns an error when no token is configured anywhere.
    pub fn require_token(&self) -> Result<&str> {
        self.telegram
            .token
            .as_deref()
            .ok_or(WatchError::MissingToken)
    }

    /// Write the configuration to `path`, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be written.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| WatchError::path_error("create directory", parent, e))?;
        }
        let mut copy = self.clone();
        copy.telegram.token = None;
        let content = toml::to_string_pretty(&copy).map_err(|e| WatchError::ConfigError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        std::fs::write(path, content).map_err(|e| WatchError::path_error("write", path, e))?;
        info!("Saved config to: {}", path.display());
        Ok(())
    }

    /// Generate a default configuration file content.
    #[must_use]
    pub fn default_config_content() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

/// Token file with owner-only permissions.
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    #[must_use]
    pub const fn new(path: PathBuf) -> Self {
        Self { path }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Read the stored token; `None` if there is no file or it is empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read.
    pub fn load(&self) -> Result<Option<String>> {
        if !self.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.path)
            .map_err(|e| WatchError::path_error("read", &self.path, e))?;
        let token = content.trim();
        Ok((!token.is_empty()).then(|| token.to_string()))
    }

    /// Store a token, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is blank or the file cannot be written.
    pub fn save(&self, token: &str) -> Result<()> {
        let token = token.trim();
        if token.is_empty() {
            return Err(WatchError::invalid_argument("token is empty"));
        }
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| WatchError::path_error("create directory", parent, e))?;
        }
        std::fs::write(&self.path, token)
            .map_err(|e| WatchError::path_error("write", &self.path, e))?;
        restrict_permissions(&self.path)?;
        info!("Saved token to: {}", self.path.display());
        Ok(())
    }

    /// Delete the token file. Returns whether a file was removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be removed.
    pub fn clear(&self) -> Result<bool> {
        if !self.exists() {
            return Ok(false);
        }
        std::fs::remove_file(&self.path)
            .map_err(|e| WatchError::path_error("remove", &self.path, e))?;
        Ok(true)
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| WatchError::path_error("set permissions on", path, e))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

/// Whether `token` has the `<bot id>:<secret>` shape issued by `BotFather`.
#[must_use]
pub fn token_format_ok(token: &str) -> bool {
    TOKEN_PATTERN
        .as_ref()
        .is_some_and(|pattern| pattern.is_match(token))
}

/// Mask a token for display: first 7 and last 4 characters.
#[must_use]
pub fn mask_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() <= 11 {
        return "***".to_string();
    }
    let head: String = chars[..7].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}***{tail}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.telegram.poll_timeout, 30);
        assert_eq!(config.telegram.retry_delay_secs, 3);
        assert_eq!(config.telegram.api_base, DEFAULT_API_BASE);
        assert_eq!(config.search.message_limit, 50);
        assert!(config.output.colors);
    }

    #[test]
    fn test_config_merge() {
        let mut base = Config::default();
        let mut other = Config::default();
        other.search.search_limit = 10;
        other.paths.db = Some(PathBuf::from("/custom/watch.db"));

        base.merge(other);

        assert_eq!(base.search.search_limit, 10);
        assert_eq!(base.db_path(), PathBuf::from("/custom/watch.db"));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("TGWATCH_TOKEN", " 123:abc "),
            ("TGWATCH_DATA_DIR", "/tmp/tgw"),
            ("TGWATCH_POLL_TIMEOUT", "5"),
            ("TGWATCH_LIMIT", "not-a-number"),
            ("NO_COLOR", "1"),
        ]);
        let mut config = Config::default();
        config.apply_overrides(|k| env.get(k).map(|v| (*v).to_string()));

        assert_eq!(config.telegram.token.as_deref(), Some("123:abc"));
        assert_eq!(config.telegram.poll_timeout, 5);
        assert_eq!(config.search.search_limit, 50);
        assert!(!config.output.colors);
        assert_eq!(config.db_path(), PathBuf::from("/tmp/tgw/tgwatch.db"));
        assert_eq!(config.log_dir(), PathBuf::from("/tmp/tgw/logs"));
        assert_eq!(config.token_file(), PathBuf::from("/tmp/tgw/token"));
    }

    #[test]
    fn test_saved_config_omits_token() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = Config::default();
        config.telegram.token = Some("123456789:secret".to_string());
        config.save_to(&path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(!content.contains("secret"));
        let loaded = Config::load_from_file(&path).unwrap();
        assert_eq!(loaded.telegram.poll_timeout, 30);
    }

    #[test]
    fn test_default_config_content() {
        let content = Config::default_config_content();
        assert!(content.contains("[telegram]"));
        assert!(content.contains("[paths]"));
        assert!(content.contains("[search]"));
        assert!(content.contains("[output]"));
    }

    #[test]
    fn test_token_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(dir.path().join("token"));
        assert_eq!(store.load().unwrap(), None);

        store.save("  123456:abcdef\n").unwrap();
        assert_eq!(store.load().unwrap().as_deref(), Some("123456:abcdef"));

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(store.path()).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }

        assert!(store.clear().unwrap());
        assert!(!store.clear().unwrap());
        assert!(store.save("   ").is_err());
    }

    #[test]
    fn test_token_format() {
        assert!(token_format_ok("123456789:AAExampleSecretValue_1234"));
        assert!(!token_format_ok("not a token"));
        assert!(!token_format_ok("123456789:short"));
    }

    #[test]
    fn test_mask_token() {
        assert_eq!(mask_token("short"), "***");
        assert_eq!(mask_token("12345678901"), "***");
        assert_eq!(
            mask_token("123456789:AAExampleSecretValue_1234"),
            "1234567***1234"
        );
    }
}
