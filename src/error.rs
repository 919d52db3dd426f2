//! Custom error types for tgwatch.
//!
//! The taxonomy follows how each failure is recovered: transport failures
//! are retried by the monitor, validation failures skip a single update,
//! storage failures drop one record on the write path and surface on the
//! read path, and authentication failures are left to the caller.

use std::path::PathBuf;
use thiserror::Error;

/// Primary error type for tgwatch operations.
#[derive(Error, Debug)]
pub enum WatchError {
    // =========================================================================
    // Transport Errors
    // =========================================================================
    /// Request could not be completed or the response could not be read.
    #[error("Transport error: {message}")]
    Transport { message: String },

    /// HTTP client failure. The request URL is stripped before wrapping
    /// because it embeds the bot token.
    #[error("HTTP error: {0}")]
    Http(reqwest::Error),

    /// The Bot API answered with `ok: false`.
    #[error("Bot API error{}: {description}", .code.map_or_else(String::new, |c| format!(" {c}")))]
    Api {
        code: Option<i64>,
        description: String,
    },

    // =========================================================================
    // Authentication Errors
    // =========================================================================
    /// The bot token was rejected.
    #[error("Authentication failed: {reason}")]
    Authentication { reason: String },

    /// No bot token is configured.
    #[error(
        "No bot token configured. Pass --token, set TGWATCH_TOKEN, or run 'tgwatch token --set <TOKEN>'."
    )]
    MissingToken,

    // =========================================================================
    // Update Validation Errors
    // =========================================================================
    /// An update could not be turned into a write request.
    #[error("Invalid update: {reason}")]
    Validation { reason: String },

    // =========================================================================
    // Database Errors
    // =========================================================================
    /// Database file not found.
    #[error("No database found at {path}. Run 'tgwatch monitor' to start collecting.")]
    DatabaseNotFound { path: PathBuf },

    /// Database schema is newer than this binary understands.
    #[error("Database schema version {found} is newer than supported version {expected}")]
    SchemaMismatch { expected: i32, found: i32 },

    /// Database operation failed.
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    // =========================================================================
    // File System Errors
    // =========================================================================
    /// I/O error with path context.
    #[error("Failed to {operation} '{path}': {source}")]
    PathError {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Configuration file parsing error.
    #[error("Invalid configuration in '{path}': {reason}")]
    ConfigError { path: PathBuf, reason: String },

    // =========================================================================
    // CLI Errors
    // =========================================================================
    /// Invalid command-line or console argument.
    #[error("Invalid argument: {reason}")]
    InvalidArgument { reason: String },
}

/// Result type alias for tgwatch operations.
pub type Result<T> = std::result::Result<T, WatchError>;

impl From<reqwest::Error> for WatchError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(err.without_url())
    }
}

impl WatchError {
    /// Create a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create a validation error.
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
        }
    }

    /// Create an invalid argument error.
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            reason: reason.into(),
        }
    }

    /// Create a database not found error.
    pub fn database_not_found(path: impl Into<PathBuf>) -> Self {
        Self::DatabaseNotFound { path: path.into() }
    }

    /// Create a path error with context.
    pub fn path_error(
        operation: &'static str,
        path: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        Self::PathError {
            operation,
            path: path.into(),
            source,
        }
    }

    /// Whether the polling loop should retry after this error.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. } | Self::Http(_) | Self::Api { .. } | Self::JsonError(_)
        )
    }

    /// Get a suggestion for how to fix this error, if applicable.
    #[must_use]
    pub const fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::MissingToken => Some("Create a bot with @BotFather and copy the token it gives you."),
            Self::Authentication { .. } => {
                Some("Check the token with 'tgwatch validate' or replace it with 'tgwatch token --set'.")
            }
            Self::DatabaseNotFound { .. } => {
                Some("Run 'tgwatch monitor' once to create the database.")
            }
            Self::SchemaMismatch { .. } => Some("Upgrade tgwatch to a newer release."),
            Self::Transport { .. } | Self::Http(_) => {
                Some("Check network connectivity to the Bot API server.")
            }
            _ => None,
        }
    }
}

// =============================================================================
// CLI Error Formatting Utilities
// =============================================================================

use colored::Colorize;

/// Format a structured CLI error with explanation and suggestions.
#[must_use]
pub fn format_error(title: &str, explanation: &str, suggestions: &[&str]) -> String {
    use std::fmt::Write;

    let mut output = format!("{} {}", "✗".red().bold(), title.bold());

    if !explanation.is_empty() {
        let _ = write!(output, "\n\n   {explanation}");
    }

    if !suggestions.is_empty() {
        output.push_str("\n\n   ");
        if suggestions.len() == 1 {
            let _ = write!(output, "{} {}", "Hint:".cyan(), suggestions[0]);
        } else {
            let _ = write!(output, "{}:", "Try".cyan());
            for suggestion in suggestions {
                let _ = write!(output, "\n     {} {}", "•".dimmed(), suggestion);
            }
        }
    }

    output
}

/// Calculate the Levenshtein edit distance between two strings.
#[must_use]
pub fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let a_len = a_chars.len();
    let b_len = b_chars.len();

    if a_len == 0 {
        return b_len;
    }
    if b_len == 0 {
        return a_len;
    }

    let mut prev_row: Vec<usize> = (0..=b_len).collect();
    let mut curr_row: Vec<usize> = vec![0; b_len + 1];

    for (i, a_char) in a_chars.iter().enumerate() {
        curr_row[0] = i + 1;

        for (j, b_char) in b_chars.iter().enumerate() {
            let cost = usize::from(a_char != b_char);
            curr_row[j + 1] = (prev_row[j + 1] + 1)
                .min(curr_row[j] + 1)
                .min(prev_row[j] + cost);
        }

        std::mem::swap(&mut prev_row, &mut curr_row);
    }

    prev_row[b_len]
}

/// Find the closest candidate within `max_distance` edits (default 2).
///
/// Exact matches are not returned.
#[must_use]
pub fn find_closest_match<'a>(
    input: &str,
    candidates: &[&'a str],
    max_distance: Option<usize>,
) -> Option<&'a str> {
    let max_dist = max_distance.unwrap_or(2);
    let input_lower = input.to_lowercase();

    candidates
        .iter()
        .map(|&candidate| {
            let distance = levenshtein_distance(&input_lower, &candidate.to_lowercase());
            (candidate, distance)
        })
        .filter(|(_, distance)| *distance <= max_dist && *distance > 0)
        .min_by_key(|(_, distance)| *distance)
        .map(|(candidate, _)| candidate)
}

/// Console command names, used for "did you mean" hints.
pub const VALID_CONSOLE_COMMANDS: &[&str] = &[
    "user",
    "history",
    "messages",
    "search-users",
    "search",
    "stats",
    "bot",
    "logs",
    "help",
    "quit",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = WatchError::database_not_found("/path/to/db");
        assert!(err.to_string().contains("/path/to/db"));
    }

    #[test]
    fn test_api_error_display_includes_code() {
        let err = WatchError::Api {
            code: Some(409),
            description: "Conflict: terminated by other getUpdates request".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("409"));
        assert!(text.contains("Conflict"));

        let err = WatchError::Api {
            code: None,
            description: "Bad Request".to_string(),
        };
        assert_eq!(err.to_string(), "Bot API error: Bad Request");
    }

    #[test]
    fn test_transient_classification() {
        assert!(WatchError::transport("connection reset").is_transient());
        assert!(
            WatchError::Api {
                code: Some(502),
                description: "Bad Gateway".into()
            }
            .is_transient()
        );
        assert!(!WatchError::validation("missing chat id").is_transient());
        assert!(!WatchError::Storage(rusqlite::Error::InvalidQuery).is_transient());
    }

    #[test]
    fn test_error_suggestions() {
        assert!(WatchError::MissingToken.suggestion().is_some());
        assert!(WatchError::validation("x").suggestion().is_none());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: WatchError = io_err.into();
        assert!(matches!(err, WatchError::IoError(_)));
    }

    #[test]
    fn test_from_rusqlite_error() {
        let err: WatchError = rusqlite::Error::InvalidQuery.into();
        assert!(matches!(err, WatchError::Storage(_)));
    }

    #[test]
    fn levenshtein_basics() {
        assert_eq!(levenshtein_distance("hello", "hello"), 0);
        assert_eq!(levenshtein_distance("cat", "cats"), 1);
        assert_eq!(levenshtein_distance("", "abc"), 3);
    }

    #[test]
    fn find_closest_console_command() {
        assert_eq!(
            find_closest_match("serch", VALID_CONSOLE_COMMANDS, None),
            Some("search")
        );
        assert_eq!(find_closest_match("stats", VALID_CONSOLE_COMMANDS, None), None);
        assert_eq!(find_closest_match("zzzzzz", VALID_CONSOLE_COMMANDS, None), None);
    }
}
