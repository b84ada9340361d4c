use crate::models::chat::Conversation;
use crate::models::employee::EmployeeId;
use chrono::{ DateTime, Utc };
use serde::{ Deserialize, Serialize };
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

pub const EVENT_MESSAGE_NEW: &str = "message:new";
pub const EVENT_CONVERSATION_UPDATED: &str = "conversation:updated";
pub const EVENT_MESSAGE_SEEN: &str = "message:seen";
pub const EVENT_PONG: &str = "pong";
pub const EVENT_ERROR: &str = "error";

#[derive(Serialize, Deserialize, Debug)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "ping")]
    Ping,
}

/// Frame pushed to a connected session.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ServerFrame {
    pub event: String,
    pub data: JsonValue,
}

impl ServerFrame {
    pub fn new(event: &str, data: JsonValue) -> Self {
        Self { event: event.to_string(), data }
    }

    pub fn error(message: &str) -> Self {
        Self::new(EVENT_ERROR, serde_json::json!({ "message": message }))
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub conversation_id: String,
    pub last_message_text: String,
    pub last_message_at: DateTime<Utc>,
    pub last_message_from: Option<EmployeeId>,
    pub unread_counts: BTreeMap<EmployeeId, u64>,
}

impl From<&Conversation> for ConversationSummary {
    fn from(conv: &Conversation) -> Self {
        Self {
            conversation_id: conv.id.clone(),
            last_message_text: conv.last_message_text.clone(),
            last_message_at: conv.last_message_at,
            last_message_from: conv.last_message_from.clone(),
            unread_counts: conv.unread_counts.clone(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SeenPayload {
    pub conversation_id: String,
    pub seen_by: EmployeeId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ping_frame_parses() {
        let msg: ClientMessage = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Ping));
    }

    #[test]
    fn unread_counts_serialize_as_plain_map() {
        let mut unread_counts = BTreeMap::new();
        unread_counts.insert("a".to_string(), 0);
        unread_counts.insert("b".to_string(), 3);
        let summary = ConversationSummary {
            conversation_id: "c1".into(),
            last_message_text: "hi".into(),
            last_message_at: Utc::now(),
            last_message_from: Some("a".into()),
            unread_counts,
        };
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["unreadCounts"]["b"], 3);
        assert_eq!(json["conversationId"], "c1");
    }
}
