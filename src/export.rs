//! JSON export of the whole store.

use crate::error::{Result, WatchError};
use crate::model::{Statistics, StoredChat, StoredMessage, UserActivity, UserProfile, UsernameChange};
use crate::storage::{Storage, now_timestamp};
use chrono::Local;
use serde::Serialize;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

/// Full snapshot of the store.
#[derive(Debug, Serialize)]
pub struct ExportDocument {
    pub exported_at: String,
    pub tool_version: &'static str,
    pub statistics: Statistics,
    pub users: Vec<UserProfile>,
    pub username_history: Vec<UsernameChange>,
    pub chats: Vec<StoredChat>,
    pub messages: Vec<StoredMessage>,
    pub user_activity: Vec<UserActivity>,
}

impl ExportDocument {
    /// Read everything from `storage`.
    ///
    /// # Errors
    ///
    /// Returns an error if any table cannot be read.
    pub fn collect(storage: &Storage) -> Result<Self> {
        Ok(Self {
            exported_at: now_timestamp(),
            tool_version: env!("CARGO_PKG_VERSION"),
            statistics: storage.get_statistics()?,
            users: storage.all_users()?,
            username_history: storage.all_username_history()?,
            chats: storage.all_chats()?,
            messages: storage.all_messages()?,
            user_activity: storage.all_activity()?,
        })
    }

    /// Serialize as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn write_to(&self, writer: impl Write) -> Result<()> {
        let mut writer = BufWriter::new(writer);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }
}

/// Default export location: `<dir>/tgwatch_export_<YYYYmmdd_HHMMSS>.json`.
#[must_use]
pub fn default_export_path(dir: &Path) -> PathBuf {
    dir.join(format!(
        "tgwatch_export_{}.json",
        Local::now().format("%Y%m%d_%H%M%S")
    ))
}

/// Export the store to `path`, creating parent directories.
///
/// # Errors
///
/// Returns an error if reading the store or writing the file fails.
pub fn export_to_file(storage: &Storage, path: &Path) -> Result<Statistics> {
    let document = ExportDocument::collect(storage)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| WatchError::path_error("create directory", parent, e))?;
    }
    let file = std::fs::File::create(path).map_err(|e| WatchError::path_error("create", path, e))?;
    document.write_to(file)?;
    info!(path = %path.display(), messages = document.statistics.messages, "Exported store");
    Ok(document.statistics)
}
