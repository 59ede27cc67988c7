use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

mod server;

pub use server::{ConnectionId, Replier, ServerSocket, SocketError, Subscription};

use crate::store::{ChatMessage, iso_millis};

pub const WEBSOCKET_CHANNEL_URL: &str = "/socket";

/// Events a client sends over the websocket, one JSON object per text frame:
/// `{"event": "join", "data": "alice"}`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    /// Claim a username for this connection.
    Join(String),
    Message {
        message: String,
    },
    Typing {
        #[serde(rename = "isTyping")]
        is_typing: bool,
    },
}

/// Events the server broadcasts, framed the same way as [`ClientEvent`].
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    UserJoined(Announcement),
    UserLeft(Announcement),
    UsersList(Vec<ConnectedUser>),
    Message(ChatMessage),
    UserTyping(TypingIndicator),
    /// Only ever sent to the connection whose event was refused.
    Error { message: String },
}

/// Human readable notice that someone joined or left.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Announcement {
    pub username: String,
    pub message: String,
    #[serde(with = "iso_millis")]
    pub timestamp: DateTime<Utc>,
}

/// A websocket connection that has joined with a username.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedUser {
    pub id: Uuid,
    pub username: String,
    #[serde(with = "iso_millis")]
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TypingIndicator {
    pub username: String,
    pub is_typing: bool,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parses_client_frames() {
        let join: ClientEvent =
            serde_json::from_value(json!({ "event": "join", "data": "alice" })).unwrap();
        assert_eq!(join, ClientEvent::Join("alice".to_string()));

        let typing: ClientEvent =
            serde_json::from_value(json!({ "event": "typing", "data": { "isTyping": true } }))
                .unwrap();
        assert_eq!(typing, ClientEvent::Typing { is_typing: true });

        let message: ClientEvent =
            serde_json::from_value(json!({ "event": "message", "data": { "message": "hi" } }))
                .unwrap();
        assert_eq!(
            message,
            ClientEvent::Message {
                message: "hi".to_string()
            }
        );
    }

    #[test]
    fn rejects_unknown_events() {
        assert!(serde_json::from_value::<ClientEvent>(json!({ "event": "shout", "data": "x" })).is_err());
    }

    #[test]
    fn server_events_use_kebab_case_names() {
        let value = serde_json::to_value(ServerEvent::UserTyping(TypingIndicator {
            username: "bob".to_string(),
            is_typing: false,
        }))
        .unwrap();

        assert_eq!(
            value,
            json!({ "event": "user-typing", "data": { "username": "bob", "isTyping": false } })
        );

        let value = serde_json::to_value(ServerEvent::UsersList(vec![])).unwrap();
        assert_eq!(value, json!({ "event": "users-list", "data": [] }));
    }
}
