//! Raw update -> write request.
//!
//! Only the fields tgwatch stores are decoded; everything else in the update
//! is ignored. Nested optional structures that are absent decode to `None`.

use crate::api::RawUpdate;
use crate::error::{Result, WatchError};
use crate::model::{ChatRecord, IngestRecord, MediaType, MessageRecord, UserRecord};
use chrono::{DateTime, Local};
use serde::Deserialize;

/// Storage format for `message_date`.
pub const MESSAGE_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

#[derive(Debug, Deserialize)]
struct WireUpdate {
    message: Option<serde_json::Value>,
    edited_message: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    message_id: Option<i64>,
    date: Option<i64>,
    chat: Option<WireChat>,
    from: Option<WireUser>,
    text: Option<String>,
    caption: Option<String>,
    photo: Option<serde_json::Value>,
    video: Option<serde_json::Value>,
    document: Option<serde_json::Value>,
    forward_from: Option<WireUser>,
    reply_to_message: Option<WireReply>,
}

#[derive(Debug, Deserialize)]
struct WireChat {
    id: Option<i64>,
    #[serde(rename = "type")]
    kind: Option<String>,
    title: Option<String>,
    username: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireUser {
    id: Option<i64>,
    #[serde(default)]
    is_bot: bool,
    first_name: Option<String>,
    last_name: Option<String>,
    username: Option<String>,
    language_code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireReply {
    message_id: Option<i64>,
}

/// Turn one update into the writes it implies.
///
/// Returns `Ok(None)` for updates that carry no message (channel posts,
/// callback queries, membership changes and so on).
///
/// # Errors
///
/// Returns [`WatchError::Validation`] when the message cannot be decoded or
/// lacks its id, `chat.id` or `from.id`. Such updates are skipped.
pub fn normalize(update: &RawUpdate) -> Result<Option<IngestRecord>> {
    let wire: WireUpdate = serde_json::from_value(update.body.clone())
        .map_err(|err| WatchError::validation(format!("update {}: {err}", update.update_id)))?;

    let Some(body) = wire.message.or(wire.edited_message) else {
        return Ok(None);
    };

    let message: WireMessage = serde_json::from_value(body)
        .map_err(|err| WatchError::validation(format!("update {}: {err}", update.update_id)))?;

    normalize_message(message).map(Some).map_err(|reason| {
        WatchError::validation(format!("update {}: {reason}", update.update_id))
    })
}

fn normalize_message(message: WireMessage) -> std::result::Result<IngestRecord, &'static str> {
    let message_id = message.message_id.ok_or("missing message_id")?;
    let chat = message.chat.ok_or("missing chat")?;
    let chat_id = chat.id.ok_or("missing chat.id")?;
    let from = message.from.ok_or("missing from")?;
    let user_id = from.id.ok_or("missing from.id")?;

    let media_type = if message.photo.is_some() {
        MediaType::Photo
    } else if message.video.is_some() {
        MediaType::Video
    } else if message.document.is_some() {
        MediaType::Document
    } else {
        MediaType::None
    };

    let record = MessageRecord {
        message_id,
        chat_id,
        user_id,
        username: from.username.clone(),
        first_name: from.first_name.clone(),
        message_text: message.text.or(message.caption).unwrap_or_default(),
        message_date: format_unix_date(message.date.unwrap_or(0)),
        media_type,
        forwarded_from: message.forward_from.and_then(|u| u.id),
        reply_to_message_id: message.reply_to_message.and_then(|r| r.message_id),
    };

    Ok(IngestRecord {
        user: UserRecord {
            user_id,
            first_name: from.first_name,
            last_name: from.last_name,
            username: from.username,
            is_bot: from.is_bot,
            language_code: from.language_code,
        },
        chat: ChatRecord {
            chat_id,
            chat_type: chat.kind,
            title: chat.title,
            username: chat.username,
            description: chat.description,
            member_count: None,
        },
        message: record,
    })
}

/// Unix seconds -> local-time ISO-8601 without offset.
#[must_use]
pub fn format_unix_date(secs: i64) -> String {
    DateTime::from_timestamp(secs, 0)
        .unwrap_or_default()
        .with_timezone(&Local)
        .format(MESSAGE_DATE_FORMAT)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(body: serde_json::Value) -> RawUpdate {
        RawUpdate {
            update_id: body["update_id"].as_i64().unwrap_or(1),
            body,
        }
    }

    fn group_message(extra: serde_json::Value) -> serde_json::Value {
        let mut message = json!({
            "message_id": 7,
            "date": 1_700_000_000,
            "chat": {"id": -100, "type": "supergroup", "title": "Lobby"},
            "from": {"id": 1, "is_bot": false, "first_name": "Alice", "username": "alice", "language_code": "en"},
            "text": "hello"
        });
        if let (Some(target), Some(source)) = (message.as_object_mut(), extra.as_object()) {
            for (k, v) in source {
                if v.is_null() {
                    target.remove(k);
                } else {
                    target.insert(k.clone(), v.clone());
                }
            }
        }
        json!({"update_id": 5, "message": message})
    }

    #[test]
    fn normalizes_plain_text_message() {
        let record = normalize(&raw(group_message(json!({})))).unwrap().unwrap();
        assert_eq!(record.user.user_id, 1);
        assert_eq!(record.user.username.as_deref(), Some("alice"));
        assert_eq!(record.chat.chat_id, -100);
        assert_eq!(record.chat.title.as_deref(), Some("Lobby"));
        assert_eq!(record.message.message_id, 7);
        assert_eq!(record.message.message_text, "hello");
        assert_eq!(record.message.media_type, MediaType::None);
        assert_eq!(record.message.forwarded_from, None);
        assert_eq!(record.message.reply_to_message_id, None);
        assert_eq!(record.message.message_date, format_unix_date(1_700_000_000));
    }

    #[test]
    fn update_without_message_is_skipped() {
        let update = raw(json!({"update_id": 3, "callback_query": {"id": "x"}}));
        assert!(normalize(&update).unwrap().is_none());
    }

    #[test]
    fn missing_chat_id_is_rejected() {
        let update = raw(group_message(json!({"chat": {"type": "group", "title": "No id"}})));
        let err = normalize(&update).unwrap_err();
        assert!(matches!(err, WatchError::Validation { .. }));
        assert!(err.to_string().contains("chat.id"));
    }

    #[test]
    fn missing_sender_or_id_is_rejected() {
        assert!(normalize(&raw(group_message(json!({"from": null})))).is_err());
        assert!(normalize(&raw(group_message(json!({"message_id": null})))).is_err());
    }

    #[test]
    fn photo_wins_over_document() {
        let update = raw(group_message(json!({
            "photo": [{"file_id": "p"}],
            "document": {"file_id": "d"}
        })));
        let record = normalize(&update).unwrap().unwrap();
        assert_eq!(record.message.media_type, MediaType::Photo);
    }

    #[test]
    fn video_wins_over_document() {
        let update = raw(group_message(json!({
            "video": {"file_id": "v"},
            "document": {"file_id": "d"}
        })));
        let record = normalize(&update).unwrap().unwrap();
        assert_eq!(record.message.media_type, MediaType::Video);
    }

    #[test]
    fn caption_used_when_text_absent() {
        let update = raw(group_message(json!({
            "text": null,
            "caption": "look at this",
            "document": {"file_id": "d"}
        })));
        let record = normalize(&update).unwrap().unwrap();
        assert_eq!(record.message.message_text, "look at this");
        assert_eq!(record.message.media_type, MediaType::Document);
    }

    #[test]
    fn nested_optionals_extracted() {
        let update = raw(group_message(json!({
            "forward_from": {"id": 99, "is_bot": false, "first_name": "Orig"},
            "reply_to_message": {"message_id": 3, "chat": {"id": -100}}
        })));
        let record = normalize(&update).unwrap().unwrap();
        assert_eq!(record.message.forwarded_from, Some(99));
        assert_eq!(record.message.reply_to_message_id, Some(3));

        let update = raw(group_message(json!({"forward_from": {}, "reply_to_message": {}})));
        let record = normalize(&update).unwrap().unwrap();
        assert_eq!(record.message.forwarded_from, None);
        assert_eq!(record.message.reply_to_message_id, None);
    }

    #[test]
    fn edited_message_is_normalized() {
        let mut body = group_message(json!({"text": "fixed typo"}));
        let message = body["message"].take();
        let update = raw(json!({"update_id": 6, "edited_message": message}));
        let record = normalize(&update).unwrap().unwrap();
        assert_eq!(record.message.message_id, 7);
        assert_eq!(record.message.message_text, "fixed typo");
    }

    #[test]
    fn missing_date_falls_back_to_epoch() {
        let record = normalize(&raw(group_message(json!({"date": null}))))
            .unwrap()
            .unwrap();
        assert_eq!(record.message.message_date, format_unix_date(0));
    }

    #[test]
    fn malformed_message_body_is_validation_error() {
        let update = raw(json!({"update_id": 8, "message": {"message_id": "seven"}}));
        assert!(matches!(
            normalize(&update).unwrap_err(),
            WatchError::Validation { .. }
        ));
    }
}
