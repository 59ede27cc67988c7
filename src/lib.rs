//! Minimal realtime chat server on Axum.
//!
//! Two independent front ends share one process:
//!
//! - a JSON HTTP API ([`api`]) to post and list messages and to join as a user, backed by
//!   in-memory lists that only keep the newest entries;
//! - a websocket ([`WEBSOCKET_CHANNEL_URL`]) where clients join with a username and every
//!   connected client receives messages, join/leave notices and typing indicators.
//!
//! Messages posted over HTTP are not broadcast to websockets and vice versa.
//!
//! ## Usage
//!
//! ```no_run
//! use chat_socket::{AppState, app};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let state = AppState::new(100, 64);
//!
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await?;
//! axum::serve(listener, app(state)).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Websocket protocol
//!
//! Every text frame is one JSON object `{"event": <name>, "data": <payload>}`.
//!
//! Clients send `join` (data: the username), `message` (data: `{"message": "..."}`) and
//! `typing` (data: `{"isTyping": true}`). The server answers with `user-joined`, `user-left`,
//! `users-list`, `message`, `user-typing` and, to the offending client only, `error`.
//!
//! If you build your own router, mount the socket with [`SocketRoute`]:
//!
//! ```
//! use axum::Router;
//! use chat_socket::{AppState, SocketRoute, handlers::connect_to_websocket};
//!
//! let app: Router = Router::new()
//!     .socket_route(connect_to_websocket)
//!     .with_state(AppState::new(100, 64));
//! ```

pub mod api;
pub mod channel;
pub mod config;
pub mod error;
pub mod handlers;
pub mod store;
pub mod validate;

use axum::{Router, extract::FromRef};
use tower_http::trace::TraceLayer;

pub use crate::channel::*;
pub use crate::error::ApiError;
pub use crate::store::{ChatMessage, ChatStore, JoinedUser};

/// Shared state of the whole server.
#[derive(Clone, Debug, Default, FromRef)]
pub struct AppState {
    pub store: ChatStore,
    pub server_socket: ServerSocket,
}

impl AppState {
    pub fn new(history_limit: usize, broadcast_capacity: usize) -> Self {
        Self {
            store: ChatStore::new(history_limit),
            server_socket: ServerSocket::new(broadcast_capacity),
        }
    }
}

/// Trait to extend the Axum router
pub trait SocketRoute<S>
where
    S: Clone + Send + Sync + 'static,
{
    /// Add the websocket route to the Axum router
    fn socket_route<H, T>(self, handler: H) -> Self
    where
        H: axum::handler::Handler<T, S>,
        T: 'static;
}

impl<S> SocketRoute<S> for Router<S>
where
    S: Clone + Send + Sync + 'static,
    ServerSocket: FromRef<S>,
{
    fn socket_route<H, T>(self, handler: H) -> Self
    where
        H: axum::handler::Handler<T, S>,
        T: 'static,
    {
        use axum::routing::get;

        self.route(WEBSOCKET_CHANNEL_URL, get(handler))
    }
}

/// The complete application: HTTP API, websocket route, JSON 404s and request tracing.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(api::router())
        .socket_route(handlers::connect_to_websocket)
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn not_found() -> ApiError {
    ApiError::NotFound
}
