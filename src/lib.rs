//! tgwatch - Telegram bot update collector
//!
//! Long-polls the Telegram Bot API, normalizes every message the bot can
//! see, and keeps users, username changes, messages, chats and per-chat
//! activity in a local `SQLite` database.
//!
//! # Modules
//!
//! - [`api`] - Bot API client (`getMe`, `getUpdates`)
//! - [`normalize`] - Raw update to typed write request
//! - [`monitor`] - Polling loop with offset tracking and cancellation
//! - [`storage`] - `SQLite` schema and queries
//! - [`query`] - Read-side lookups for the CLI and console
//! - [`repl`] - Interactive console
//! - [`display`] - Terminal rendering

pub mod api;
pub mod cli;
pub mod config;
pub mod display;
pub mod doctor;
pub mod error;
pub mod export;
pub mod logging;
pub mod model;
pub mod monitor;
pub mod normalize;
pub mod query;
pub mod repl;
pub mod storage;

pub use api::{BotApi, BotIdentity, RawUpdate, UpdateSource};
pub use cli::*;
pub use config::Config;
pub use error::{Result, WatchError, format_error};
pub use model::*;
pub use monitor::{Monitor, MonitorConfig, MonitorSummary};
pub use query::QueryFacade;
pub use storage::Storage;

/// Default database filename
pub const DEFAULT_DB_NAME: &str = "tgwatch.db";

/// Console history filename inside the data directory
pub const HISTORY_FILE_NAME: &str = "console_history";

/// Get the default data directory for tgwatch
#[must_use]
pub fn default_data_dir() -> std::path::PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("tgwatch")
}

/// Format an integer with thousands separators.
#[must_use]
pub fn format_number(value: i64) -> String {
    let abs = value.unsigned_abs().to_string();
    let mut out = String::with_capacity(abs.len() + abs.len() / 3);

    for (idx, ch) in abs.chars().rev().enumerate() {
        if idx > 0 && idx % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }

    let mut formatted: String = out.chars().rev().collect();
    if value < 0 {
        formatted.insert(0, '-');
    }
    formatted
}

#[cfg(test)]
mod tests {
    use super::format_number;

    #[test]
    fn format_number_adds_separators() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(12_345_678), "12,345,678");
        assert_eq!(format_number(-12_345), "-12,345");
    }
}
