//! Error response interpretation.
//!
//! A failed response becomes one or more user-visible messages. JSON bodies
//! are searched for `error`, `message`, then `detail`; a list under that key
//! is treated as field validation errors. Plain-text bodies are used as-is.
//! When nothing usable is found the status code picks a default.

use serde_json::Value;

/// Fallback for statuses without a dedicated default.
pub const FALLBACK_MESSAGE: &str = "Some error occurred";

/// Message reported when the request never got a response.
pub const NETWORK_ERROR_MESSAGE: &str = "Network error";

/// Body of a failed response, as far as it could be read.
#[derive(Clone, Debug, PartialEq)]
pub enum ErrorBody {
    /// Parsed JSON document.
    Json(Value),
    /// Raw text.
    Text(String),
    /// Body missing or unreadable.
    Unreadable,
}

impl ErrorBody {
    /// Interpret raw body bytes using the response content type.
    #[must_use]
    pub fn from_bytes(content_type: Option<&str>, bytes: &[u8]) -> Self {
        let is_json = content_type.is_some_and(|ct| ct.contains("application/json"));
        if is_json {
            if let Ok(value) = serde_json::from_slice::<Value>(bytes) {
                return Self::Json(value);
            }
        }
        match std::str::from_utf8(bytes) {
            Ok(text) => Self::Text(text.to_string()),
            Err(_) => Self::Unreadable,
        }
    }
}

/// Default message for a status code.
#[must_use]
pub fn default_message(status: u16) -> &'static str {
    match status {
        400 => "Bad request",
        401 => "Unauthorized",
        404 => "Object not found",
        500 => "Internal server error",
        _ => FALLBACK_MESSAGE,
    }
}

/// User-visible messages for a failed response. Never empty.
#[must_use]
pub fn error_messages(status: u16, body: &ErrorBody) -> Vec<String> {
    let detail = match body {
        ErrorBody::Json(value) => ["error", "message", "detail"]
            .iter()
            .filter_map(|key| value.get(*key))
            .find(|v| is_truthy(v))
            .cloned(),
        ErrorBody::Text(text) if !text.trim().is_empty() => Some(Value::String(text.clone())),
        _ => None,
    };

    let messages: Vec<String> = match detail {
        None => Vec::new(),
        Some(Value::Array(items)) => items.iter().map(validation_message).collect(),
        Some(Value::String(text)) => vec![text],
        Some(other) => vec![other.to_string()],
    };

    if messages.is_empty() {
        vec![default_message(status).to_string()]
    } else {
        messages
    }
}

/// Render one validation error item.
///
/// Items look like `{"type": "missing", "loc": ["body", "name"], "msg": "..."}`.
#[must_use]
pub fn validation_message(item: &Value) -> String {
    let Value::Object(fields) = item else {
        return value_text(item);
    };

    let loc = fields.get("loc").and_then(Value::as_array);
    let loc_at = |i: usize| loc.and_then(|l| l.get(i)).map(value_text);
    let text = fields
        .get("msg")
        .or_else(|| fields.get("message"))
        .filter(|v| is_truthy(v))
        .map(value_text);
    let kind = fields.get("type").and_then(Value::as_str);

    if kind == Some("missing") {
        let field = loc_at(1).or_else(|| loc_at(0)).unwrap_or_default();
        return format!("Missing field {field}");
    }
    if let Some(text) = text {
        return text;
    }
    if loc.is_some() {
        let field = loc_at(1)
            .or_else(|| kind.map(str::to_string))
            .or_else(|| loc_at(0))
            .unwrap_or_default();
        return format!("Field {field} is invalid");
    }
    item.to_string()
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_defaults() {
        assert_eq!(error_messages(400, &ErrorBody::Unreadable), ["Bad request"]);
        assert_eq!(error_messages(401, &ErrorBody::Unreadable), ["Unauthorized"]);
        assert_eq!(error_messages(404, &ErrorBody::Unreadable), ["Object not found"]);
        assert_eq!(
            error_messages(500, &ErrorBody::Unreadable),
            ["Internal server error"]
        );
        assert_eq!(error_messages(418, &ErrorBody::Unreadable), [FALLBACK_MESSAGE]);
    }

    #[test]
    fn json_key_precedence() {
        let body = ErrorBody::Json(json!({"detail": "d", "message": "m", "error": "e"}));
        assert_eq!(error_messages(400, &body), ["e"]);
        let body = ErrorBody::Json(json!({"detail": "d", "message": "m"}));
        assert_eq!(error_messages(400, &body), ["m"]);
        let body = ErrorBody::Json(json!({"detail": "Dag not found"}));
        assert_eq!(error_messages(404, &body), ["Dag not found"]);
    }

    #[test]
    fn empty_values_fall_through() {
        let body = ErrorBody::Json(json!({"error": "", "message": null, "detail": "d"}));
        assert_eq!(error_messages(400, &body), ["d"]);
        let body = ErrorBody::Json(json!({"error": ""}));
        assert_eq!(error_messages(404, &body), ["Object not found"]);
    }

    #[test]
    fn text_body_used_verbatim() {
        let body = ErrorBody::Text("upstream timeout".into());
        assert_eq!(error_messages(502, &body), ["upstream timeout"]);
        assert_eq!(
            error_messages(500, &ErrorBody::Text("  ".into())),
            ["Internal server error"]
        );
    }

    #[test]
    fn validation_list_unpacked() {
        let body = ErrorBody::Json(json!({"detail": [
            {"type": "missing", "loc": ["body", "dag_name"], "msg": "Field required"},
            {"type": "value_error", "loc": ["body", "page"], "msg": "bad page"},
            {"type": "int_parsing", "loc": ["body", "position_x"]},
            "plain text",
        ]}));
        assert_eq!(
            error_messages(422, &body),
            [
                "Missing field dag_name",
                "bad page",
                "Field position_x is invalid",
                "plain text"
            ]
        );
    }

    #[test]
    fn validation_item_without_loc_or_msg() {
        assert_eq!(validation_message(&json!({"code": 3})), r#"{"code":3}"#);
        assert_eq!(validation_message(&json!({"message": "nope"})), "nope");
        assert_eq!(validation_message(&json!(12)), "12");
    }

    #[test]
    fn validation_loc_with_numeric_index() {
        let item = json!({"type": "missing", "loc": ["body", 0]});
        assert_eq!(validation_message(&item), "Missing field 0");
        let item = json!({"type": "too_short", "loc": ["query"]});
        assert_eq!(validation_message(&item), "Field too_short is invalid");
    }

    #[test]
    fn empty_validation_list_uses_default() {
        let body = ErrorBody::Json(json!({"detail": []}));
        assert_eq!(error_messages(400, &body), ["Bad request"]);
    }

    #[test]
    fn non_string_detail_rendered_as_json() {
        let body = ErrorBody::Json(json!({"detail": {"reason": "locked"}}));
        assert_eq!(error_messages(409, &body), [r#"{"reason":"locked"}"#]);
    }

    #[test]
    fn body_from_bytes_respects_content_type() {
        assert_eq!(
            ErrorBody::from_bytes(Some("application/json"), br#"{"detail":"x"}"#),
            ErrorBody::Json(json!({"detail": "x"}))
        );
        assert_eq!(
            ErrorBody::from_bytes(Some("text/plain"), br#"{"detail":"x"}"#),
            ErrorBody::Text(r#"{"detail":"x"}"#.into())
        );
        assert_eq!(
            ErrorBody::from_bytes(Some("application/json"), b"oops"),
            ErrorBody::Text("oops".into())
        );
        assert_eq!(ErrorBody::from_bytes(None, &[0xff, 0xfe]), ErrorBody::Unreadable);
    }
}
