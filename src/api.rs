//! JSON HTTP API: list and post messages, list and join users.

use axum::{
    Json, Router,
    extract::{FromRef, State, rejection::JsonRejection},
    routing::{get, post},
};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::ApiError;
use crate::store::{ChatMessage, ChatStore, JoinedUser};
use crate::validate;

pub const MESSAGES_URL: &str = "/api/messages";
pub const USERS_URL: &str = "/api/users";
pub const JOIN_URL: &str = "/api/users/join";

/// Routes of the HTTP API. Mount it on any router whose state can hand out a [`ChatStore`].
pub fn router<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
    ChatStore: FromRef<S>,
{
    Router::new()
        .route(MESSAGES_URL, get(list_messages).post(post_message))
        .route(USERS_URL, get(list_users))
        .route(JOIN_URL, post(join))
}

/// Unwraps a JSON body, which must be an object or an array. A request without a JSON content
/// type counts as an empty object.
fn body(payload: Result<Json<Value>, JsonRejection>) -> Result<Value, ApiError> {
    match payload {
        Ok(Json(body)) => {
            if let Err(err) = validate::body_shape(&body) {
                warn!("Invalid JSON received: top-level {body}");
                return Err(err);
            }
            if body.as_object().is_some_and(|fields| !fields.is_empty()) {
                debug!("Request body: {body}");
            }
            Ok(body)
        }
        Err(JsonRejection::MissingJsonContentType(_)) => Ok(Value::Object(Default::default())),
        Err(rejection) => {
            warn!("Invalid JSON received: {}", rejection.body_text());
            Err(ApiError::InvalidJson)
        }
    }
}

async fn list_messages(State(store): State<ChatStore>) -> Json<Vec<ChatMessage>> {
    Json(store.messages())
}

async fn post_message(
    State(store): State<ChatStore>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<ChatMessage>, ApiError> {
    let body = body(payload)?;
    let (username, message) = validate::message_body(&body)?;

    Ok(Json(store.push_message(username, message)))
}

async fn list_users(State(store): State<ChatStore>) -> Json<Vec<JoinedUser>> {
    Json(store.users())
}

async fn join(
    State(store): State<ChatStore>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<JoinedUser>, ApiError> {
    let body = body(payload)?;
    let username = validate::join_body(&body)?;

    let user = store.join(username);
    info!("{} joined via HTTP", user.username);

    Ok(Json(user))
}
