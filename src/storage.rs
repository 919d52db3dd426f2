//! `SQLite` storage for collected users, messages and chats.
//!
//! The monitor owns the single writing connection. Readers open their own
//! connections; WAL mode gives them a consistent snapshot while the
//! monitor keeps writing.

use crate::doctor::{CheckCategory, CheckStatus, HealthCheck, TableStat};
use crate::error::{Result, WatchError};
use crate::format_number;
use crate::model::{
    ChatRecord, IngestRecord, MediaType, MessageRecord, Statistics, StoredChat, StoredMessage,
    UserActivity, UserMatch, UserProfile, UserRecord, UsernameChange,
};
use chrono::Local;
use rusqlite::functions::FunctionFlags;
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

const SCHEMA_VERSION: i32 = 1;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Tables that make up the on-disk contract, in dependency order.
pub const DATA_TABLES: &[&str] = &[
    "users",
    "username_history",
    "messages",
    "chats",
    "user_activity",
];

const MESSAGE_COLUMNS: &str = "m.message_id, m.chat_id, m.user_id, m.username, m.first_name, \
     m.message_text, m.message_date, m.media_type, m.forwarded_from, m.reply_to_message_id, c.title";

/// Current local time as stored in observation columns.
#[must_use]
pub fn now_timestamp() -> String {
    Local::now().format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
}

/// `SQLite` storage manager
#[derive(Debug)]
pub struct Storage {
    conn: Connection,
}

impl Storage {
    /// Open or create the database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(db_path.as_ref())?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
            ",
        )?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        register_functions(&conn)?;

        let storage = Self { conn };
        storage.migrate()?;
        debug!(path = %db_path.as_ref().display(), "Opened database");
        Ok(storage)
    }

    /// Open a database that must already exist (read-side commands).
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::DatabaseNotFound`] when the file is missing, or
    /// an error if it cannot be opened.
    pub fn open_existing(db_path: impl AsRef<Path>) -> Result<Self> {
        let path = db_path.as_ref();
        if !path.exists() {
            return Err(WatchError::database_not_found(path));
        }
        Self::open(path)
    }

    /// Open an in-memory database (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be initialized.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
            ",
        )?;
        register_functions(&conn)?;
        let storage = Self { conn };
        storage.migrate()?;
        Ok(storage)
    }

    /// Get a reference to the underlying database connection.
    #[must_use]
    pub const fn connection(&self) -> &Connection {
        &self.conn
    }

    fn migrate(&self) -> Result<()> {
        let current_version = self.get_schema_version();

        if current_version > SCHEMA_VERSION {
            return Err(WatchError::SchemaMismatch {
                expected: SCHEMA_VERSION,
                found: current_version,
            });
        }

        if current_version < SCHEMA_VERSION {
            info!(
                "Migrating database from version {} to {}",
                current_version, SCHEMA_VERSION
            );
            self.create_schema()?;
            self.set_schema_version(SCHEMA_VERSION)?;
        }

        Ok(())
    }

    fn get_schema_version(&self) -> i32 {
        let result: rusqlite::Result<i32> = self.conn.query_row(
            "SELECT value FROM meta WHERE key = 'schema_version'",
            [],
            |row| {
                let value: String = row.get(0)?;
                Ok(value.parse().unwrap_or(0))
            },
        );

        // Treat missing schema table as version 0.
        result.unwrap_or_default()
    }

    fn set_schema_version(&self, version: i32) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO meta (key, value) VALUES ('schema_version', ?)",
            params![version.to_string()],
        )?;
        Ok(())
    }

    fn create_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r"
            CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS users (
                user_id INTEGER PRIMARY KEY,
                first_name TEXT,
                last_name TEXT,
                current_username TEXT,
                is_bot INTEGER NOT NULL DEFAULT 0,
                language_code TEXT,
                first_seen TEXT NOT NULL,
                last_seen TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_users_username ON users(current_username);

            -- Append-only
            CREATE TABLE IF NOT EXISTS username_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                username TEXT,
                previous_username TEXT,
                changed_at TEXT NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(user_id)
            );
            CREATE INDEX IF NOT EXISTS idx_username_history_user ON username_history(user_id);

            CREATE TABLE IF NOT EXISTS messages (
                message_id INTEGER NOT NULL,
                chat_id INTEGER NOT NULL,
                user_id INTEGER NOT NULL,
                username TEXT,
                first_name TEXT,
                message_text TEXT NOT NULL DEFAULT '',
                message_date TEXT NOT NULL,
                media_type TEXT,
                forwarded_from INTEGER,
                reply_to_message_id INTEGER,
                PRIMARY KEY (message_id, chat_id)
            );
            CREATE INDEX IF NOT EXISTS idx_messages_user ON messages(user_id, message_date);
            CREATE INDEX IF NOT EXISTS idx_messages_date ON messages(message_date);

            CREATE TABLE IF NOT EXISTS chats (
                chat_id INTEGER PRIMARY KEY,
                chat_type TEXT,
                title TEXT,
                username TEXT,
                description TEXT,
                member_count INTEGER,
                first_seen TEXT NOT NULL,
                last_updated TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS user_activity (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                chat_id INTEGER NOT NULL,
                chat_title TEXT,
                status TEXT NOT NULL DEFAULT 'active',
                first_seen TEXT NOT NULL,
                last_seen TEXT NOT NULL,
                message_count INTEGER NOT NULL DEFAULT 0,
                UNIQUE (user_id, chat_id)
            );
            ",
        )?;

        Ok(())
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Insert or refresh a user, appending to the username history when the
    /// observed username differs from the stored one.
    ///
    /// # Errors
    ///
    /// Returns an error if any statement fails; nothing is written then.
    pub fn upsert_user(&mut self, user: &UserRecord) -> Result<()> {
        let tx = self.conn.transaction()?;
        upsert_user_in(&tx, user, &now_timestamp())?;
        tx.commit()?;
        Ok(())
    }

    /// Insert or fully replace the message row for `(message_id, chat_id)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn upsert_message(&mut self, message: &MessageRecord) -> Result<()> {
        let tx = self.conn.transaction()?;
        upsert_message_in(&tx, message)?;
        tx.commit()?;
        Ok(())
    }

    /// Insert or update a chat, refreshing `last_updated`.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn upsert_chat(&mut self, chat: &ChatRecord) -> Result<()> {
        let tx = self.conn.transaction()?;
        upsert_chat_in(&tx, chat, &now_timestamp())?;
        tx.commit()?;
        Ok(())
    }

    /// Count one message for the `(user_id, chat_id)` pair.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn record_activity(
        &mut self,
        user_id: i64,
        chat_id: i64,
        chat_title: Option<&str>,
    ) -> Result<()> {
        let tx = self.conn.transaction()?;
        record_activity_in(&tx, user_id, chat_id, chat_title, &now_timestamp())?;
        tx.commit()?;
        Ok(())
    }

    /// Apply every write for one update in a single transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if any write fails; the whole update is rolled back.
    pub fn ingest(&mut self, record: &IngestRecord) -> Result<()> {
        let now = now_timestamp();
        let tx = self.conn.transaction()?;
        upsert_user_in(&tx, &record.user, &now)?;
        upsert_chat_in(&tx, &record.chat, &now)?;
        upsert_message_in(&tx, &record.message)?;
        record_activity_in(
            &tx,
            record.user.user_id,
            record.chat.chat_id,
            record.chat.title.as_deref(),
            &now,
        )?;
        tx.commit()?;
        Ok(())
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Case-insensitive substring search over current and past usernames.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn search_usernames(&self, query: &str) -> Result<Vec<UserMatch>> {
        let pattern = like_pattern(query.trim().trim_start_matches('@'));
        let mut stmt = self.conn.prepare(
            r"
            SELECT DISTINCT u.user_id, u.first_name, u.current_username
            FROM users u
            LEFT JOIN username_history uh ON u.user_id = uh.user_id
            WHERE fold_case(u.current_username) LIKE ?1 ESCAPE '\'
               OR fold_case(uh.username) LIKE ?1 ESCAPE '\'
               OR fold_case(uh.previous_username) LIKE ?1 ESCAPE '\'
            ORDER BY u.user_id
            ",
        )?;

        let matches = stmt
            .query_map(params![pattern], |row| {
                Ok(UserMatch {
                    user_id: row.get(0)?,
                    first_name: row.get(1)?,
                    current_username: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(matches)
    }

    /// Fetch a stored user profile.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_user(&self, user_id: i64) -> Result<Option<UserProfile>> {
        let user = self
            .conn
            .query_row(
                "SELECT user_id, first_name, last_name, current_username, is_bot, language_code,
                        first_seen, last_seen
                 FROM users WHERE user_id = ?",
                params![user_id],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    /// Messages sent by a user, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_user_messages(&self, user_id: i64, limit: usize) -> Result<Vec<StoredMessage>> {
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS}
             FROM messages m
             LEFT JOIN chats c ON m.chat_id = c.chat_id
             WHERE m.user_id = ?
             ORDER BY m.message_date DESC, m.message_id DESC
             LIMIT ?"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let messages = stmt
            .query_map(params![user_id, limit_to_i64(limit)], message_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(messages)
    }

    /// Username changes for a user, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_username_history(&self, user_id: i64) -> Result<Vec<UsernameChange>> {
        let mut stmt = self.conn.prepare(
            "SELECT user_id, username, previous_username, changed_at
             FROM username_history
             WHERE user_id = ?
             ORDER BY changed_at DESC, id DESC",
        )?;
        let history = stmt
            .query_map(params![user_id], history_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(history)
    }

    /// Case-insensitive substring search over message text, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn search_messages(&self, keyword: &str, limit: usize) -> Result<Vec<StoredMessage>> {
        let sql = format!(
            r"SELECT {MESSAGE_COLUMNS}
             FROM messages m
             LEFT JOIN chats c ON m.chat_id = c.chat_id
             WHERE fold_case(m.message_text) LIKE ? ESCAPE '\'
             ORDER BY m.message_date DESC, m.message_id DESC
             LIMIT ?"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let messages = stmt
            .query_map(
                params![like_pattern(keyword), limit_to_i64(limit)],
                message_from_row,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(messages)
    }

    /// Per-chat activity for a user, most recently active first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_user_activity(&self, user_id: i64) -> Result<Vec<UserActivity>> {
        let mut stmt = self.conn.prepare(
            "SELECT user_id, chat_id, chat_title, status, first_seen, last_seen, message_count
             FROM user_activity
             WHERE user_id = ?
             ORDER BY last_seen DESC",
        )?;
        let activity = stmt
            .query_map(params![user_id], activity_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(activity)
    }

    /// Store-wide counts in a single query.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_statistics(&self) -> Result<Statistics> {
        let query = r"
            SELECT
                (SELECT COUNT(*) FROM users) AS users,
                (SELECT COUNT(*) FROM messages) AS messages,
                (SELECT COUNT(*) FROM chats) AS chats,
                (SELECT COUNT(*) FROM username_history) AS username_changes
        ";

        Ok(self.conn.query_row(query, [], |row| {
            Ok(Statistics {
                users: row.get(0)?,
                messages: row.get(1)?,
                chats: row.get(2)?,
                username_changes: row.get(3)?,
            })
        })?)
    }

    // =========================================================================
    // Export
    // =========================================================================

    /// All users ordered by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn all_users(&self) -> Result<Vec<UserProfile>> {
        let mut stmt = self.conn.prepare(
            "SELECT user_id, first_name, last_name, current_username, is_bot, language_code,
                    first_seen, last_seen
             FROM users ORDER BY user_id",
        )?;
        let users = stmt
            .query_map([], user_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(users)
    }

    /// All username changes in insertion order.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn all_username_history(&self) -> Result<Vec<UsernameChange>> {
        let mut stmt = self.conn.prepare(
            "SELECT user_id, username, previous_username, changed_at
             FROM username_history ORDER BY id",
        )?;
        let history = stmt
            .query_map([], history_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(history)
    }

    /// All messages in chronological order.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn all_messages(&self) -> Result<Vec<StoredMessage>> {
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS}
             FROM messages m
             LEFT JOIN chats c ON m.chat_id = c.chat_id
             ORDER BY m.message_date, m.chat_id, m.message_id"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let messages = stmt
            .query_map([], message_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(messages)
    }

    /// All chats ordered by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn all_chats(&self) -> Result<Vec<StoredChat>> {
        let mut stmt = self.conn.prepare(
            "SELECT chat_id, chat_type, title, username, description, member_count,
                    first_seen, last_updated
             FROM chats ORDER BY chat_id",
        )?;
        let chats = stmt
            .query_map([], |row| {
                Ok(StoredChat {
                    chat_id: row.get(0)?,
                    chat_type: row.get(1)?,
                    title: row.get(2)?,
                    username: row.get(3)?,
                    description: row.get(4)?,
                    member_count: row.get(5)?,
                    first_seen: row.get(6)?,
                    last_updated: row.get(7)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(chats)
    }

    /// All activity aggregates.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn all_activity(&self) -> Result<Vec<UserActivity>> {
        let mut stmt = self.conn.prepare(
            "SELECT user_id, chat_id, chat_title, status, first_seen, last_seen, message_count
             FROM user_activity ORDER BY user_id, chat_id",
        )?;
        let activity = stmt
            .query_map([], activity_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(activity)
    }

    // =========================================================================
    // Health checks
    // =========================================================================

    /// Run database health checks for `tgwatch doctor`.
    #[must_use]
    pub fn database_health_checks(&self) -> Vec<HealthCheck> {
        vec![
            self.check_integrity(),
            self.check_schema_version(),
            self.check_orphaned_history(),
            self.check_table_stats(),
        ]
    }

    /// Row counts for every data table.
    ///
    /// # Errors
    ///
    /// Returns an error if any count query fails.
    pub fn database_table_stats(&self) -> Result<Vec<TableStat>> {
        DATA_TABLES
            .iter()
            .map(|table| {
                Ok(TableStat {
                    name: (*table).to_string(),
                    rows: self.table_row_count(table)?,
                })
            })
            .collect()
    }

    fn check_integrity(&self) -> HealthCheck {
        match self
            .conn
            .query_row("PRAGMA integrity_check", [], |row| row.get::<_, String>(0))
        {
            Ok(result) if result == "ok" => HealthCheck {
                category: CheckCategory::Database,
                name: "PRAGMA integrity_check".to_string(),
                status: CheckStatus::Pass,
                message: "ok".to_string(),
                suggestion: None,
            },
            Ok(result) => HealthCheck {
                category: CheckCategory::Database,
                name: "PRAGMA integrity_check".to_string(),
                status: CheckStatus::Error,
                message: format!("Integrity check failed: {result}"),
                suggestion: Some("Restore the database from a backup or an export.".to_string()),
            },
            Err(err) => HealthCheck {
                category: CheckCategory::Database,
                name: "PRAGMA integrity_check".to_string(),
                status: CheckStatus::Error,
                message: format!("Integrity check failed: {err}"),
                suggestion: None,
            },
        }
    }

    fn check_schema_version(&self) -> HealthCheck {
        let current = self.get_schema_version();
        let (status, suggestion) = if current == SCHEMA_VERSION {
            (CheckStatus::Pass, None)
        } else {
            (
                CheckStatus::Error,
                Some("Reopen the database with a matching tgwatch release.".to_string()),
            )
        };
        HealthCheck {
            category: CheckCategory::Database,
            name: "Schema version".to_string(),
            status,
            message: format!("schema_version={current}, expected={SCHEMA_VERSION}"),
            suggestion,
        }
    }

    fn check_orphaned_history(&self) -> HealthCheck {
        let sql = "SELECT COUNT(*) FROM username_history uh
                   LEFT JOIN users u ON uh.user_id = u.user_id
                   WHERE u.user_id IS NULL";
        match self.conn.query_row(sql, [], |row| row.get::<_, i64>(0)) {
            Ok(0) => HealthCheck {
                category: CheckCategory::Database,
                name: "Username history references".to_string(),
                status: CheckStatus::Pass,
                message: "0 orphaned rows".to_string(),
                suggestion: None,
            },
            Ok(count) => HealthCheck {
                category: CheckCategory::Database,
                name: "Username history references".to_string(),
                status: CheckStatus::Warning,
                message: format!("{count} rows reference unknown users"),
                suggestion: Some("The rows were written outside tgwatch; they are kept as-is.".to_string()),
            },
            Err(err) => HealthCheck {
                category: CheckCategory::Database,
                name: "Username history references".to_string(),
                status: CheckStatus::Error,
                message: format!("Query failed: {err}"),
                suggestion: None,
            },
        }
    }

    fn check_table_stats(&self) -> HealthCheck {
        match self.database_table_stats() {
            Ok(stats) => HealthCheck {
                category: CheckCategory::Database,
                name: "Table stats".to_string(),
                status: CheckStatus::Pass,
                message: format_table_stats(&stats),
                suggestion: None,
            },
            Err(err) => HealthCheck {
                category: CheckCategory::Database,
                name: "Table stats".to_string(),
                status: CheckStatus::Error,
                message: format!("Failed to collect table stats: {err}"),
                suggestion: None,
            },
        }
    }

    fn table_row_count(&self, table: &str) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {table}");
        Ok(self.conn.query_row(&sql, [], |row| row.get(0))?)
    }
}

fn upsert_user_in(conn: &Connection, user: &UserRecord, now: &str) -> rusqlite::Result<()> {
    let stored: Option<Option<String>> = conn
        .query_row(
            "SELECT current_username FROM users WHERE user_id = ?",
            params![user.user_id],
            |row| row.get(0),
        )
        .optional()?;

    match stored {
        None => {
            conn.execute(
                "INSERT INTO users
                 (user_id, first_name, last_name, current_username, is_bot, language_code, first_seen, last_seen)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
                params![
                    user.user_id,
                    user.first_name,
                    user.last_name,
                    user.username,
                    user.is_bot,
                    user.language_code,
                    now,
                ],
            )?;
        }
        Some(current) => {
            if current != user.username {
                debug!(
                    user_id = user.user_id,
                    from = ?current,
                    to = ?user.username,
                    "Username changed"
                );
                conn.execute(
                    "INSERT INTO username_history (user_id, username, previous_username, changed_at)
                     VALUES (?, ?, ?, ?)",
                    params![user.user_id, user.username, current, now],
                )?;
            }
            conn.execute(
                "UPDATE users
                 SET last_name = ?1,
                     is_bot = ?2,
                     language_code = ?3,
                     current_username = ?4,
                     last_seen = MAX(COALESCE(last_seen, ?5), ?5)
                 WHERE user_id = ?6",
                params![
                    user.last_name,
                    user.is_bot,
                    user.language_code,
                    user.username,
                    now,
                    user.user_id,
                ],
            )?;
        }
    }

    Ok(())
}

fn upsert_message_in(conn: &Connection, message: &MessageRecord) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO messages
         (message_id, chat_id, user_id, username, first_name, message_text, message_date,
          media_type, forwarded_from, reply_to_message_id)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            message.message_id,
            message.chat_id,
            message.user_id,
            message.username,
            message.first_name,
            message.message_text,
            message.message_date,
            message.media_type.as_db_str(),
            message.forwarded_from,
            message.reply_to_message_id,
        ],
    )?;
    Ok(())
}

fn upsert_chat_in(conn: &Connection, chat: &ChatRecord, now: &str) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO chats
         (chat_id, chat_type, title, username, description, member_count, first_seen, last_updated)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
         ON CONFLICT(chat_id) DO UPDATE SET
             chat_type = COALESCE(excluded.chat_type, chats.chat_type),
             title = COALESCE(excluded.title, chats.title),
             username = COALESCE(excluded.username, chats.username),
             description = COALESCE(excluded.description, chats.description),
             member_count = COALESCE(excluded.member_count, chats.member_count),
             last_updated = excluded.last_updated",
        params![
            chat.chat_id,
            chat.chat_type,
            chat.title,
            chat.username,
            chat.description,
            chat.member_count,
            now,
        ],
    )?;
    Ok(())
}

fn record_activity_in(
    conn: &Connection,
    user_id: i64,
    chat_id: i64,
    chat_title: Option<&str>,
    now: &str,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO user_activity
         (user_id, chat_id, chat_title, status, first_seen, last_seen, message_count)
         VALUES (?1, ?2, ?3, 'active', ?4, ?4, 1)
         ON CONFLICT(user_id, chat_id) DO UPDATE SET
             message_count = user_activity.message_count + 1,
             last_seen = MAX(user_activity.last_seen, excluded.last_seen),
             chat_title = COALESCE(excluded.chat_title, user_activity.chat_title)",
        params![user_id, chat_id, chat_title, now],
    )?;
    Ok(())
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserProfile> {
    Ok(UserProfile {
        user_id: row.get(0)?,
        first_name: row.get(1)?,
        last_name: row.get(2)?,
        current_username: row.get(3)?,
        is_bot: row.get(4)?,
        language_code: row.get(5)?,
        first_seen: row.get(6)?,
        last_seen: row.get(7)?,
    })
}

fn history_from_row(row: &Row<'_>) -> rusqlite::Result<UsernameChange> {
    Ok(UsernameChange {
        user_id: row.get(0)?,
        username: row.get(1)?,
        previous_username: row.get(2)?,
        changed_at: row.get(3)?,
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<StoredMessage> {
    let media: Option<String> = row.get(7)?;
    Ok(StoredMessage {
        message_id: row.get(0)?,
        chat_id: row.get(1)?,
        user_id: row.get(2)?,
        username: row.get(3)?,
        first_name: row.get(4)?,
        message_text: row.get(5)?,
        message_date: row.get(6)?,
        media_type: MediaType::from_db_str(media.as_deref()),
        forwarded_from: row.get(8)?,
        reply_to_message_id: row.get(9)?,
        chat_title: row.get(10)?,
    })
}

fn activity_from_row(row: &Row<'_>) -> rusqlite::Result<UserActivity> {
    Ok(UserActivity {
        user_id: row.get(0)?,
        chat_id: row.get(1)?,
        chat_title: row.get(2)?,
        status: row.get(3)?,
        first_seen: row.get(4)?,
        last_seen: row.get(5)?,
        message_count: row.get(6)?,
    })
}

/// Lower-cased `%needle%` with LIKE metacharacters escaped by `\`.
/// `fold_case(text)`: Unicode lowercase. The built-in `LOWER()` only folds
/// ASCII, so search patterns and columns must go through the same function.
fn register_functions(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        "fold_case",
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let text: Option<String> = ctx.get(0)?;
            Ok(text.map(|t| t.to_lowercase()))
        },
    )
}

fn like_pattern(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for ch in needle.to_lowercase().chars() {
        if matches!(ch, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}

fn format_table_stats(stats: &[TableStat]) -> String {
    stats
        .iter()
        .map(|stat| format!("{}: {} rows", stat.name, format_number(stat.rows)))
        .collect::<Vec<_>>()
        .join("\n")
}

fn limit_to_i64(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}
