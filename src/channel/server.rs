use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tokio::sync::broadcast::{Receiver, Sender, error::RecvError};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::channel::{Announcement, ClientEvent, ConnectedUser, ServerEvent, TypingIndicator};
use crate::error::ApiError;
use crate::store::{ChatMessage, IdSequence, now_millis};
use crate::validate;

pub type ConnectionId = Uuid;

/// Replies a connection may have queued before further ones are dropped.
const REPLY_CAPACITY: usize = 16;

/// Why a client event was refused. The text is sent back to that client as an `error` event.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SocketError {
    #[error(transparent)]
    Username(#[from] ApiError),
    #[error("Message cannot be empty or longer than 1000 characters")]
    InvalidMessage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Audience {
    Everyone,
    AllExcept(ConnectionId),
}

impl Audience {
    fn includes(self, id: ConnectionId) -> bool {
        match self {
            Self::Everyone => true,
            Self::AllExcept(skip) => skip != id,
        }
    }
}

#[derive(Debug, Clone)]
struct Envelope {
    audience: Audience,
    event: ServerEvent,
}

#[derive(Debug, Default)]
struct Registry {
    /// Kept in join order; a re-join replaces the entry in place.
    users: Vec<ConnectedUser>,
    ids: IdSequence,
}

impl Registry {
    fn get(&self, id: ConnectionId) -> Option<&ConnectedUser> {
        self.users.iter().find(|user| user.id == id)
    }
}

/// Sends events to a single connection without going through the shared broadcast buffer.
#[derive(Debug, Clone)]
pub struct Replier {
    id: ConnectionId,
    tx: mpsc::Sender<ServerEvent>,
}

impl Replier {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queues `event` for this connection. Dropped when the connection already has a full backlog.
    pub fn send(&self, event: ServerEvent) {
        if let Err(err) = self.tx.try_send(event) {
            debug!(connection = %self.id, "Dropping reply: {err}");
        }
    }
}

/// A single connection's view of the broadcast stream, plus its private replies.
#[derive(Debug)]
pub struct Subscription {
    id: ConnectionId,
    rx: Receiver<Envelope>,
    replies_tx: mpsc::Sender<ServerEvent>,
    replies_rx: mpsc::Receiver<ServerEvent>,
}

impl Subscription {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn replier(&self) -> Replier {
        Replier {
            id: self.id,
            tx: self.replies_tx.clone(),
        }
    }

    /// Waits for the next event addressed to this connection.
    ///
    /// Broadcasts dropped because this subscriber fell behind are skipped. Returns `None` once
    /// every [`ServerSocket`] handle is gone.
    pub async fn recv(&mut self) -> Option<ServerEvent> {
        loop {
            tokio::select! {
                Some(event) = self.replies_rx.recv() => return Some(event),
                broadcast = self.rx.recv() => match broadcast {
                    Ok(envelope) if envelope.audience.includes(self.id) => {
                        return Some(envelope.event);
                    }
                    Ok(_) => continue,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(connection = %self.id, skipped, "Connection fell behind, events dropped");
                    }
                    Err(RecvError::Closed) => return None,
                },
            }
        }
    }
}

/// Tracks connected websockets, maps them to usernames and fans events out to all of them.
#[derive(Clone)]
pub struct ServerSocket {
    registry: Arc<Mutex<Registry>>,
    sender: Sender<Envelope>,
}

impl std::fmt::Debug for ServerSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerSocket")
            .field("users", &self.lock().users.len())
            .field("receivers", &self.sender.receiver_count())
            .finish()
    }
}

impl Default for ServerSocket {
    fn default() -> Self {
        Self::new(64)
    }
}

impl ServerSocket {
    /// `capacity` is how many events each connection may lag behind before it starts missing some.
    pub fn new(capacity: usize) -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry::default())),
            sender: Sender::new(capacity),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, audience: Audience, event: ServerEvent) {
        if let Err(err) = self.sender.send(Envelope { audience, event }) {
            debug!(
                "Failed to send event because there are no receivers: {:?}",
                err.0.event
            );
        }
    }

    /// Registers a new connection. It receives broadcasts from now on but has no username until it joins.
    pub fn connect(&self) -> Subscription {
        let id = Uuid::new_v4();
        debug!(connection = %id, "New connection");

        let (replies_tx, replies_rx) = mpsc::channel(REPLY_CAPACITY);

        Subscription {
            id,
            rx: self.sender.subscribe(),
            replies_tx,
            replies_rx,
        }
    }

    /// Snapshot of the joined connections, in join order.
    pub fn users(&self) -> Vec<ConnectedUser> {
        self.lock().users.clone()
    }

    /// Dispatches a parsed client event.
    pub fn handle(&self, id: ConnectionId, event: ClientEvent) -> Result<(), SocketError> {
        match event {
            ClientEvent::Join(username) => self.join(id, &username),
            ClientEvent::Message { message } => self.send_message(id, &message),
            ClientEvent::Typing { is_typing } => {
                self.typing(id, is_typing);
                Ok(())
            }
        }
    }

    #[instrument(skip(self))]
    pub fn join(&self, id: ConnectionId, username: &str) -> Result<(), SocketError> {
        validate::username_rules(username)?;

        let username = validate::trim(username).to_string();
        let now = now_millis();
        let mut registry = self.lock();

        let user = ConnectedUser {
            id,
            username: username.clone(),
            joined_at: now,
        };
        match registry.users.iter_mut().find(|u| u.id == id) {
            Some(existing) => *existing = user,
            None => registry.users.push(user),
        }

        // Emitted under the lock so concurrent joins can't reorder their users-list snapshots.
        self.emit(
            Audience::Everyone,
            ServerEvent::UserJoined(Announcement {
                message: format!("{username} joined the chat"),
                username: username.clone(),
                timestamp: now,
            }),
        );
        self.emit(Audience::Everyone, ServerEvent::UsersList(registry.users.clone()));

        info!("{username} joined the chat");

        Ok(())
    }

    /// Broadcasts a chat message from a joined connection. Connections that haven't joined are ignored.
    #[instrument(skip(self))]
    pub fn send_message(&self, id: ConnectionId, text: &str) -> Result<(), SocketError> {
        let mut registry = self.lock();

        let Some(username) = registry.get(id).map(|user| user.username.clone()) else {
            debug!("Ignoring message from connection that hasn't joined");
            return Ok(());
        };

        if !validate::message_text_ok(text) {
            return Err(SocketError::InvalidMessage);
        }

        let now = now_millis();
        let message = ChatMessage {
            id: registry.ids.next(now),
            username,
            message: validate::trim(text).to_string(),
            timestamp: now,
        };
        drop(registry);

        debug!("Message from {}: {}", message.username, message.message);
        self.emit(Audience::Everyone, ServerEvent::Message(message));

        Ok(())
    }

    /// Tells everyone but the sender whether the sender is typing.
    #[instrument(skip(self))]
    pub fn typing(&self, id: ConnectionId, is_typing: bool) {
        let Some(username) = self.lock().get(id).map(|user| user.username.clone()) else {
            return;
        };

        self.emit(
            Audience::AllExcept(id),
            ServerEvent::UserTyping(TypingIndicator {
                username,
                is_typing,
            }),
        );
    }

    /// Forgets the connection and, if it had joined, announces that it left.
    #[instrument(skip(self))]
    pub fn disconnect(&self, id: ConnectionId) {
        let mut registry = self.lock();

        let Some(pos) = registry.users.iter().position(|user| user.id == id) else {
            debug!("Connection closed before joining");
            return;
        };
        let user = registry.users.remove(pos);

        self.emit(
            Audience::Everyone,
            ServerEvent::UserLeft(Announcement {
                message: format!("{} left the chat", user.username),
                username: user.username.clone(),
                timestamp: now_millis(),
            }),
        );
        self.emit(Audience::Everyone, ServerEvent::UsersList(registry.users.clone()));

        info!("{} disconnected", user.username);
    }
}
