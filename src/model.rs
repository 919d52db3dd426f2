//! Data models for collected Telegram data.
//!
//! Write requests (`*Record`) are produced by the normalizer and consumed by
//! storage. Row types are what the read side hands back to the console.

use serde::{Deserialize, Serialize};

/// Media attached to a message. Classification is first-match-wins in
/// declaration order: photo, video, document.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    #[default]
    None,
    Photo,
    Video,
    Document,
}

impl MediaType {
    /// Column value. `None` is stored as SQL NULL.
    #[must_use]
    pub const fn as_db_str(self) -> Option<&'static str> {
        match self {
            Self::None => None,
            Self::Photo => Some("photo"),
            Self::Video => Some("video"),
            Self::Document => Some("document"),
        }
    }

    /// Parse a column value; unknown or NULL values map to `None`.
    #[must_use]
    pub fn from_db_str(value: Option<&str>) -> Self {
        match value {
            Some("photo") => Self::Photo,
            Some("video") => Self::Video,
            Some("document") => Self::Document,
            _ => Self::None,
        }
    }
}

impl std::fmt::Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Photo => write!(f, "photo"),
            Self::Video => write!(f, "video"),
            Self::Document => write!(f, "document"),
        }
    }
}

/// Sender identity as observed on a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub user_id: i64,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub username: Option<String>,
    pub is_bot: bool,
    pub language_code: Option<String>,
}

/// Chat metadata as observed on a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRecord {
    pub chat_id: i64,
    pub chat_type: Option<String>,
    pub title: Option<String>,
    pub username: Option<String>,
    pub description: Option<String>,
    pub member_count: Option<i64>,
}

/// A message keyed by `(message_id, chat_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub message_id: i64,
    pub chat_id: i64,
    pub user_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub message_text: String,
    /// Local-time ISO-8601 string, stored and sorted as text.
    pub message_date: String,
    pub media_type: MediaType,
    pub forwarded_from: Option<i64>,
    pub reply_to_message_id: Option<i64>,
}

/// Everything one update writes, applied atomically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestRecord {
    pub user: UserRecord,
    pub chat: ChatRecord,
    pub message: MessageRecord,
}

impl IngestRecord {
    /// Label used in console and log output: `@username`, or the user id.
    #[must_use]
    pub fn sender_label(&self) -> String {
        self.user
            .username
            .as_ref()
            .map_or_else(|| self.user.user_id.to_string(), |u| format!("@{u}"))
    }

    /// Chat title, or the chat id when the chat has none (private chats).
    #[must_use]
    pub fn chat_label(&self) -> String {
        self.chat
            .title
            .clone()
            .unwrap_or_else(|| self.chat.chat_id.to_string())
    }
}

/// A stored user profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: i64,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub current_username: Option<String>,
    pub is_bot: bool,
    pub language_code: Option<String>,
    pub first_seen: String,
    pub last_seen: String,
}

/// One username transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsernameChange {
    pub user_id: i64,
    /// Username after the change; `None` when it was removed.
    pub username: Option<String>,
    /// Username before the change; `None` when there was none.
    pub previous_username: Option<String>,
    pub changed_at: String,
}

/// Username search hit. `current_username` is always the live value even
/// when the match came from history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserMatch {
    pub user_id: i64,
    pub first_name: Option<String>,
    pub current_username: Option<String>,
}

/// A stored message joined with its chat title.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub message_id: i64,
    pub chat_id: i64,
    pub user_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub message_text: String,
    pub message_date: String,
    pub media_type: MediaType,
    pub forwarded_from: Option<i64>,
    pub reply_to_message_id: Option<i64>,
    pub chat_title: Option<String>,
}

/// A stored chat.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredChat {
    pub chat_id: i64,
    pub chat_type: Option<String>,
    pub title: Option<String>,
    pub username: Option<String>,
    pub description: Option<String>,
    pub member_count: Option<i64>,
    pub first_seen: String,
    pub last_updated: String,
}

/// Per `(user_id, chat_id)` activity aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserActivity {
    pub user_id: i64,
    pub chat_id: i64,
    pub chat_title: Option<String>,
    pub status: String,
    pub first_seen: String,
    pub last_seen: String,
    pub message_count: i64,
}

/// Store-wide counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statistics {
    pub users: i64,
    pub messages: i64,
    pub chats: i64,
    pub username_changes: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_type_db_mapping() {
        assert_eq!(MediaType::None.as_db_str(), None);
        assert_eq!(MediaType::Video.as_db_str(), Some("video"));
        assert_eq!(MediaType::from_db_str(Some("document")), MediaType::Document);
        assert_eq!(MediaType::from_db_str(Some("sticker")), MediaType::None);
        assert_eq!(MediaType::from_db_str(None), MediaType::None);
    }

    #[test]
    fn labels_fall_back_to_ids() {
        let record = IngestRecord {
            user: UserRecord {
                user_id: 42,
                first_name: Some("Ann".into()),
                last_name: None,
                username: None,
                is_bot: false,
                language_code: None,
            },
            chat: ChatRecord {
                chat_id: -100,
                chat_type: Some("group".into()),
                title: None,
                username: None,
                description: None,
                member_count: None,
            },
            message: MessageRecord {
                message_id: 1,
                chat_id: -100,
                user_id: 42,
                username: None,
                first_name: Some("Ann".into()),
                message_text: String::new(),
                message_date: "1970-01-01T00:00:00".into(),
                media_type: MediaType::None,
                forwarded_from: None,
                reply_to_message_id: None,
            },
        };
        assert_eq!(record.sender_label(), "42");
        assert_eq!(record.chat_label(), "-100");
    }
}
