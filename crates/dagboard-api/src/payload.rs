//! Request bodies.
//!
//! The encoding is chosen explicitly per call. Supplying files always means
//! multipart; every non-file multipart field is sent as JSON text.

use serde_json::{Map, Value};

/// One uploaded file of a multipart body.
#[derive(Clone, Debug)]
pub struct FilePart {
    /// Form field name.
    pub field: String,
    /// File name reported to the server.
    pub file_name: String,
    /// MIME type, `application/octet-stream` when unknown.
    pub mime: String,
    /// File content.
    pub bytes: Vec<u8>,
}

impl FilePart {
    /// File part with an unknown MIME type.
    #[must_use]
    pub fn new(field: impl Into<String>, file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            field: field.into(),
            file_name: file_name.into(),
            mime: "application/octet-stream".to_string(),
            bytes,
        }
    }

    /// Set the MIME type.
    #[must_use]
    pub fn with_mime(mut self, mime: impl Into<String>) -> Self {
        self.mime = mime.into();
        self
    }
}

/// Request body encoding.
#[derive(Clone, Debug, Default)]
pub enum Payload {
    /// No body.
    #[default]
    Empty,
    /// `application/json` body.
    Json(Value),
    /// `application/x-www-form-urlencoded` body.
    Form(Vec<(String, String)>),
    /// `multipart/form-data` body.
    Multipart {
        /// Plain fields, each encoded as JSON text.
        fields: Map<String, Value>,
        /// Uploaded files.
        files: Vec<FilePart>,
    },
}

impl Payload {
    /// URL-encoded form from string pairs.
    #[must_use]
    pub fn form<K: Into<String>, V: Into<String>>(pairs: impl IntoIterator<Item = (K, V)>) -> Self {
        Self::Form(pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }

    /// Body carrying `data` plus `files`.
    ///
    /// Non-empty `files` force multipart; otherwise `data` is sent as JSON.
    #[must_use]
    pub fn with_files(data: Map<String, Value>, files: Vec<FilePart>) -> Self {
        if files.is_empty() {
            Self::Json(Value::Object(data))
        } else {
            Self::Multipart {
                fields: data,
                files,
            }
        }
    }
}

/// Per-request options.
#[derive(Clone, Debug)]
pub struct RequestOptions {
    /// Body to send.
    pub payload: Payload,
    /// Attach the stored bearer token and apply the forced-logout rule.
    pub secure: bool,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            payload: Payload::Empty,
            secure: true,
        }
    }
}

impl RequestOptions {
    /// Authenticated request with a JSON body.
    #[must_use]
    pub fn json(body: Value) -> Self {
        Self {
            payload: Payload::Json(body),
            ..Self::default()
        }
    }

    /// Authenticated request with the given payload.
    #[must_use]
    pub fn payload(payload: Payload) -> Self {
        Self {
            payload,
            ..Self::default()
        }
    }

    /// Do not attach credentials.
    #[must_use]
    pub fn insecure(mut self) -> Self {
        self.secure = false;
        self
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
    fn files_force_multipart() {
        let mut data = Map::new();
        let _ = data.insert("name".into(), json!("icons"));
        let payload = Payload::with_files(data, vec![FilePart::new("file", "a.svg", vec![1])]);
        assert!(matches!(payload, Payload::Multipart { .. }));
    }

    #[test]
    fn no_files_stays_json() {
        let payload = Payload::with_files(Map::new(), Vec::new());
        assert!(matches!(payload, Payload::Json(Value::Object(_))));
    }

    #[test]
    fn form_from_pairs() {
        let Payload::Form(pairs) = Payload::form([("username", "admin"), ("password", "pw")]) else {
            panic!("expected form payload");
        };
        assert_eq!(pairs[0], ("username".to_string(), "admin".to_string()));
    }

    #[test]
    fn options_default_to_secure() {
        assert!(RequestOptions::default().secure);
        assert!(!RequestOptions::default().insecure().secure);
    }

    #[test]
    fn file_part_mime() {
        let part = FilePart::new("f", "x.png", Vec::new()).with_mime("image/png");
        assert_eq!(part.mime, "image/png");
    }
}
