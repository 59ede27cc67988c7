//! Input rules for usernames and message texts.
//!
//! Request bodies arrive as loosely typed JSON, so presence, type, blankness and length are
//! checked in that order and the first failure wins. Lengths count UTF-16 code units and
//! blankness uses the ECMAScript whitespace set, so limits agree with browser clients.

use serde_json::Value;

use crate::error::ApiError;

pub const USERNAME_MIN_CHARS: usize = 2;
pub const USERNAME_MAX_CHARS: usize = 20;
pub const MESSAGE_MAX_CHARS: usize = 1000;

/// Absent, `null`, `false`, zero and the empty string all count as "not provided".
fn is_missing(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) | Some(Value::Bool(false)) => true,
        Some(Value::Number(n)) => n.as_f64() == Some(0.0),
        Some(Value::String(s)) => s.is_empty(),
        Some(_) => false,
    }
}

fn char_len(s: &str) -> usize {
    s.encode_utf16().count()
}

/// ECMAScript `WhiteSpace` and `LineTerminator`: Unicode `White_Space` minus U+0085, plus U+FEFF.
fn is_js_whitespace(c: char) -> bool {
    (c.is_whitespace() && c != '\u{85}') || c == '\u{FEFF}'
}

/// Strips leading and trailing whitespace the way `String.prototype.trim` does.
pub fn trim(s: &str) -> &str {
    s.trim_matches(is_js_whitespace)
}

/// Only objects and arrays are accepted as top-level request bodies.
pub fn body_shape(body: &Value) -> Result<(), ApiError> {
    match body {
        Value::Object(_) | Value::Array(_) => Ok(()),
        _ => Err(ApiError::InvalidJson),
    }
}

/// Validates a `POST /api/messages` body and returns `(username, message)` untrimmed.
pub fn message_body(body: &Value) -> Result<(&str, &str), ApiError> {
    let username = body.get("username");
    let message = body.get("message");

    if is_missing(username) || is_missing(message) {
        return Err(ApiError::MessageFieldsRequired);
    }

    let (Some(username), Some(message)) = (
        username.and_then(Value::as_str),
        message.and_then(Value::as_str),
    ) else {
        return Err(ApiError::MessageFieldsNotStrings);
    };

    if trim(username).is_empty() || trim(message).is_empty() {
        return Err(ApiError::MessageFieldsEmpty);
    }

    if char_len(username) > USERNAME_MAX_CHARS || char_len(message) > MESSAGE_MAX_CHARS {
        return Err(ApiError::MessageFieldsTooLong);
    }

    Ok((username, message))
}

/// Validates a `POST /api/users/join` body and returns the untrimmed username.
pub fn join_body(body: &Value) -> Result<&str, ApiError> {
    let username = body.get("username");

    if is_missing(username) {
        return Err(ApiError::UsernameRequired);
    }

    let username = username
        .and_then(Value::as_str)
        .ok_or(ApiError::UsernameNotString)?;

    username_rules(username)?;

    Ok(username)
}

/// Blankness and length rules shared by HTTP joins and websocket joins.
pub fn username_rules(username: &str) -> Result<(), ApiError> {
    if trim(username).is_empty() {
        return Err(ApiError::UsernameEmpty);
    }

    let len = char_len(username);
    if !(USERNAME_MIN_CHARS..=USERNAME_MAX_CHARS).contains(&len) {
        return Err(ApiError::UsernameLength);
    }

    Ok(())
}

/// Whether a websocket chat text is postable: not blank, at most [`MESSAGE_MAX_CHARS`] code units.
pub fn message_text_ok(text: &str) -> bool {
    !trim(text).is_empty() && char_len(text) <= MESSAGE_MAX_CHARS
}
