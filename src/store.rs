use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::validate::trim;

/// Number of entries kept per list unless configured otherwise.
pub const DEFAULT_HISTORY_LIMIT: usize = 100;

/// Current time truncated to what the wire format carries.
pub fn now_millis() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// Timestamps on the wire look like `2024-05-01T12:30:05.584Z`.
pub mod iso_millis {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(D::Error::custom)
    }
}

/// A chat message, as stored by the HTTP API and as broadcast over the websocket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: i64,
    pub username: String,
    pub message: String,
    #[serde(with = "iso_millis")]
    pub timestamp: DateTime<Utc>,
}

/// A user that joined through the HTTP API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinedUser {
    pub id: i64,
    pub username: String,
    #[serde(with = "iso_millis")]
    pub joined_at: DateTime<Utc>,
}

/// Hands out millisecond-timestamp ids, bumped past the previous id when the clock hasn't moved.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdSequence {
    last: i64,
}

impl IdSequence {
    pub fn next(&mut self, now: DateTime<Utc>) -> i64 {
        self.last = now.timestamp_millis().max(self.last + 1);
        self.last
    }
}

#[derive(Debug)]
struct StoreInner {
    limit: usize,
    ids: IdSequence,
    messages: VecDeque<ChatMessage>,
    users: VecDeque<JoinedUser>,
}

fn push_capped<T>(list: &mut VecDeque<T>, item: T, limit: usize) {
    list.push_back(item);
    while list.len() > limit {
        list.pop_front();
    }
}

/// In-memory message and user lists shared by the HTTP handlers.
///
/// Both lists keep only the newest `limit` entries. Nothing survives a restart.
#[derive(Clone, Debug)]
pub struct ChatStore {
    inner: Arc<Mutex<StoreInner>>,
}

impl Default for ChatStore {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}

impl ChatStore {
    pub fn new(limit: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(StoreInner {
                limit,
                ids: IdSequence::default(),
                messages: VecDeque::new(),
                users: VecDeque::new(),
            })),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        self.lock().messages.iter().cloned().collect()
    }

    pub fn users(&self) -> Vec<JoinedUser> {
        self.lock().users.iter().cloned().collect()
    }

    #[instrument(skip(self))]
    pub fn push_message(&self, username: &str, message: &str) -> ChatMessage {
        let now = now_millis();
        let mut inner = self.lock();

        let msg = ChatMessage {
            id: inner.ids.next(now),
            username: trim(username).to_string(),
            message: trim(message).to_string(),
            timestamp: now,
        };

        let limit = inner.limit;
        push_capped(&mut inner.messages, msg.clone(), limit);
        debug!(stored = inner.messages.len(), "Stored message");

        msg
    }

    #[instrument(skip(self))]
    pub fn join(&self, username: &str) -> JoinedUser {
        let now = now_millis();
        let mut inner = self.lock();

        let user = JoinedUser {
            id: inner.ids.next(now),
            username: trim(username).to_string(),
            joined_at: now,
        };

        let limit = inner.limit;
        push_capped(&mut inner.users, user.clone(), limit);
        debug!(stored = inner.users.len(), "Stored user");

        user
    }
}
