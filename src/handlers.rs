use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, warn};

use crate::channel::{ClientEvent, Replier, ServerEvent, ServerSocket, Subscription};

/// Axum handler for [`WEBSOCKET_CHANNEL_URL`](crate::WEBSOCKET_CHANNEL_URL).
///
/// The connection is subscribed before the upgrade response goes out, so a client never misses
/// events sent right after its handshake.
///
/// ```ignore
/// let app = Router::new()
///     .socket_route(connect_to_websocket)
///     .with_state(state);
/// ```
pub async fn connect_to_websocket(
    ws: WebSocketUpgrade,
    State(socket): State<ServerSocket>,
) -> Response {
    let subscription = socket.connect();

    ws.on_upgrade(move |websocket| handle_websocket(websocket, socket, subscription))
}

/// Drives one websocket connection until the client goes away.
///
/// Broadcasts addressed to this connection are forwarded by a separate task, while this one reads
/// client events. When either side stops, the connection is disconnected from `socket`.
pub async fn handle_websocket(
    ws: WebSocket,
    socket: ServerSocket,
    mut subscription: Subscription,
) {
    let (mut ws_tx, mut ws_rx) = ws.split();
    let id = subscription.id();
    let replier = subscription.replier();

    let mut forward = tokio::spawn(async move {
        while let Some(event) = subscription.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(err) => {
                    warn!("Failed to serialize event: {err}");
                    continue;
                }
            };

            if ws_tx.send(Message::text(text)).await.is_err() {
                return; // disconnected.
            }
        }
    });

    loop {
        tokio::select! {
            msg = ws_rx.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    debug!("Received Text: {text}");
                    handle_text(&socket, &replier, text.as_str());
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(err)) => {
                    debug!("WebSocket error: {err}");
                    break;
                }
                Some(Ok(_)) => (),
            },
            _ = &mut forward => break,
        }
    }

    forward.abort();
    socket.disconnect(id);
}

fn handle_text(socket: &ServerSocket, replier: &Replier, text: &str) {
    let id = replier.id();

    let event: ClientEvent = match serde_json::from_str(text) {
        Ok(event) => event,
        Err(err) => {
            warn!(connection = %id, "Ignoring malformed frame: {err}");
            return;
        }
    };

    if let Err(err) = socket.handle(id, event) {
        warn!(connection = %id, "Refused event: {err}");
        replier.send(ServerEvent::Error {
            message: err.to_string(),
        });
    }
}
