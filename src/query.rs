//! Read-only lookups over the store, used by the CLI and the console.

use crate::error::{Result, WatchError};
use crate::model::{Statistics, StoredMessage, UserActivity, UserMatch, UserProfile, UsernameChange};
use crate::storage::Storage;
use serde::Serialize;

/// Preview length for message text in lookups and keyword search.
pub const PREVIEW_CHARS: usize = 100;

/// Preview length in the message history view.
pub const HISTORY_PREVIEW_CHARS: usize = 150;

/// Recent messages fetched for a user lookup.
pub const LOOKUP_MESSAGE_LIMIT: usize = 10;

/// Everything known about one user.
#[derive(Debug, Clone, Serialize)]
pub struct UserReport {
    pub user_id: i64,
    pub profile: Option<UserProfile>,
    pub username_history: Vec<UsernameChange>,
    pub recent_messages: Vec<StoredMessage>,
    pub activity: Vec<UserActivity>,
}

impl UserReport {
    /// Whether the store holds anything at all for this user.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.profile.is_none()
            && self.username_history.is_empty()
            && self.recent_messages.is_empty()
            && self.activity.is_empty()
    }
}

/// Query entry point. Holds its own read connection.
pub struct QueryFacade {
    storage: Storage,
}

impl QueryFacade {
    #[must_use]
    pub const fn new(storage: Storage) -> Self {
        Self { storage }
    }

    /// Profile, username history, recent messages and per-chat activity.
    ///
    /// # Errors
    ///
    /// Returns an error if any underlying query fails.
    pub fn user_report(&self, user_id: i64) -> Result<UserReport> {
        Ok(UserReport {
            user_id,
            profile: self.user_profile(user_id)?,
            username_history: self.storage.get_username_history(user_id)?,
            recent_messages: self
                .storage
                .get_user_messages(user_id, LOOKUP_MESSAGE_LIMIT)?,
            activity: self.storage.get_user_activity(user_id)?,
        })
    }

    /// Stored profile, or `None` for a user never seen.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn user_profile(&self, user_id: i64) -> Result<Option<UserProfile>> {
        self.storage.get_user(user_id)
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn user_messages(&self, user_id: i64, limit: usize) -> Result<Vec<StoredMessage>> {
        self.storage.get_user_messages(user_id, limit)
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn username_history(&self, user_id: i64) -> Result<Vec<UsernameChange>> {
        self.storage.get_username_history(user_id)
    }

    /// # Errors
    ///
    /// Returns [`WatchError::InvalidArgument`] for a blank query, or an
    /// error if the query fails.
    pub fn search_usernames(&self, query: &str) -> Result<Vec<UserMatch>> {
        if query.trim().trim_start_matches('@').is_empty() {
            return Err(WatchError::invalid_argument("username query is empty"));
        }
        self.storage.search_usernames(query)
    }

    /// # Errors
    ///
    /// Returns [`WatchError::InvalidArgument`] for a blank keyword, or an
    /// error if the query fails.
    pub fn search_messages(&self, keyword: &str, limit: usize) -> Result<Vec<StoredMessage>> {
        if keyword.trim().is_empty() {
            return Err(WatchError::invalid_argument("keyword is empty"));
        }
        self.storage.search_messages(keyword, limit)
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn statistics(&self) -> Result<Statistics> {
        self.storage.get_statistics()
    }
}

/// Parse a user id typed by the operator. Only decimal digits are accepted.
///
/// # Errors
///
/// Returns [`WatchError::InvalidArgument`] for anything else.
pub fn parse_user_id(input: &str) -> Result<i64> {
    let input = input.trim();
    if input.is_empty() || !input.bytes().all(|b| b.is_ascii_digit()) {
        return Err(WatchError::invalid_argument(format!(
            "invalid user id '{input}': expected digits only"
        )));
    }
    input
        .parse()
        .map_err(|_| WatchError::invalid_argument(format!("user id '{input}' is out of range")))
}

/// Single-line preview: newlines flattened, cut at `max_chars` characters
/// with a trailing `...` when cut.
#[must_use]
pub fn truncate_text(text: &str, max_chars: usize) -> String {
    let text = text.replace(['\n', '\r'], " ");
    if text.chars().count() <= max_chars {
        text
    } else {
        let truncated: String = text.chars().take(max_chars).collect();
        format!("{truncated}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ChatRecord, IngestRecord, MediaType, MessageRecord, UserRecord};

    fn facade_with_alice() -> QueryFacade {
        let mut storage = Storage::open_memory().unwrap();
        storage
            .ingest(&IngestRecord {
                user: UserRecord {
                    user_id: 1,
                    first_name: Some("Alice".into()),
                    last_name: None,
                    username: Some("alice".into()),
                    is_bot: false,
                    language_code: None,
                },
                chat: ChatRecord {
                    chat_id: 100,
                    chat_type: Some("group".into()),
                    title: Some("Lobby".into()),
                    username: None,
                    description: None,
                    member_count: None,
                },
                message: MessageRecord {
                    message_id: 1,
                    chat_id: 100,
                    user_id: 1,
                    username: Some("alice".into()),
                    first_name: Some("Alice".into()),
                    message_text: "meeting at noon".into(),
                    message_date: "2024-01-01T12:00:00".into(),
                    media_type: MediaType::None,
                    forwarded_from: None,
                    reply_to_message_id: None,
                },
            })
            .unwrap();
        QueryFacade::new(storage)
    }

    #[test]
    fn user_report_collects_everything() {
        let facade = facade_with_alice();
        let report = facade.user_report(1).unwrap();
        assert!(!report.is_empty());
        assert_eq!(report.recent_messages.len(), 1);
        assert_eq!(report.recent_messages[0].chat_title.as_deref(), Some("Lobby"));
        assert_eq!(report.activity[0].message_count, 1);

        assert!(facade.user_report(2).unwrap().is_empty());
    }

    #[test]
    fn blank_queries_are_rejected() {
        let facade = facade_with_alice();
        assert!(facade.search_usernames(" @ ").is_err());
        assert!(facade.search_messages("   ", 10).is_err());
        assert_eq!(facade.search_messages("NOON", 10).unwrap().len(), 1);
    }

    #[test]
    fn keyword_whitespace_is_part_of_the_match() {
        let facade = facade_with_alice();
        assert_eq!(facade.search_messages(" at noon", 10).unwrap().len(), 1);
        assert!(facade.search_messages("noon ", 10).unwrap().is_empty());
        assert!(facade.search_messages(" meeting", 10).unwrap().is_empty());
    }

    #[test]
    fn parse_user_id_accepts_digits_only() {
        assert_eq!(parse_user_id(" 12345 ").unwrap(), 12345);
        assert!(parse_user_id("-5").is_err());
        assert!(parse_user_id("12a").is_err());
        assert!(parse_user_id("").is_err());
        assert!(parse_user_id("99999999999999999999").is_err());
    }

    #[test]
    fn truncate_text_cuts_on_chars() {
        assert_eq!(truncate_text("short", 10), "short");
        assert_eq!(truncate_text("line1\nline2", 20), "line1 line2");
        assert_eq!(truncate_text("abcdef", 3), "abc...");
        assert_eq!(truncate_text("ééééé", 2), "éé...");
    }
}
