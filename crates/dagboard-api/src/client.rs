//! The HTTP client.
//!
//! [`ApiClient`] owns the `reqwest::Client`, the server origin and handles to
//! the shared [`ClientStorage`] and [`MessageCenter`]. All requests go
//! through [`ApiClient::request`], which applies the error contract:
//!
//! - network failure: report "Network error", return [`ApiError::Network`]
//! - 401 on an authenticated request: report the message, remember the
//!   current path as the post-login redirect, clear the session, emit
//!   [`SessionEvent::LoginRequired`], return [`ApiError::Unauthorized`]
//! - any other non-2xx: report every extracted message, return
//!   [`ApiError::Status`]

use std::sync::Arc;
use std::time::Duration;

use dagboard_auth::ClientStorage;
use dagboard_core::MessageCenter;
use dagboard_settings::DagboardSettings;
use parking_lot::RwLock;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::multipart;
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, warn};
use url::Url;

use crate::errors::{ApiError, Result};
use crate::payload::{Payload, RequestOptions};
use crate::problem::{self, ErrorBody, NETWORK_ERROR_MESSAGE};

/// Session transitions observed by the client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    /// A login succeeded.
    LoggedIn {
        /// Username.
        user: String,
        /// Where the caller should navigate next.
        redirect: String,
    },
    /// The user logged out.
    LoggedOut,
    /// The server rejected the token; the caller should show the login view.
    LoginRequired {
        /// Path that will be restored after the next login.
        redirect: String,
    },
}

/// Authenticated HTTP client for the dagboard API.
pub struct ApiClient {
    http: reqwest::Client,
    origin: Url,
    storage: Arc<ClientStorage>,
    messages: Arc<MessageCenter>,
    current_path: RwLock<String>,
    session_tx: broadcast::Sender<SessionEvent>,
}

impl ApiClient {
    /// Client for `origin` with a per-request timeout.
    pub fn new(
        origin: Url,
        timeout: Duration,
        storage: Arc<ClientStorage>,
        messages: Arc<MessageCenter>,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Build(e.to_string()))?;
        let (session_tx, _) = broadcast::channel(16);
        Ok(Self {
            http,
            origin,
            storage,
            messages,
            current_path: RwLock::new("/".to_string()),
            session_tx,
        })
    }

    /// Client configured from loaded settings.
    pub fn from_settings(
        settings: &DagboardSettings,
        storage: Arc<ClientStorage>,
        messages: Arc<MessageCenter>,
    ) -> Result<Self> {
        let origin = settings.server.origin_url()?;
        Self::new(origin, settings.server.request_timeout(), storage, messages)
    }

    /// Server origin.
    pub fn origin(&self) -> &Url {
        &self.origin
    }

    /// Shared client state.
    pub fn storage(&self) -> &Arc<ClientStorage> {
        &self.storage
    }

    /// Shared message sink.
    pub fn messages(&self) -> &Arc<MessageCenter> {
        &self.messages
    }

    /// Record the view the user is on; restored after a forced re-login.
    pub fn set_current_path(&self, path: impl Into<String>) {
        *self.current_path.write() = path.into();
    }

    /// The view the user is on.
    pub fn current_path(&self) -> String {
        self.current_path.read().clone()
    }

    /// Subscribe to session transitions.
    pub fn subscribe_session(&self) -> broadcast::Receiver<SessionEvent> {
        self.session_tx.subscribe()
    }

    pub(crate) fn emit(&self, event: SessionEvent) {
        let _ = self.session_tx.send(event);
    }

    /// Absolute URL for an API path.
    pub fn url(&self, path: &str) -> Result<Url> {
        Ok(self.origin.join(path)?)
    }

    /// Send a request and apply the error contract.
    ///
    /// Returns the response only when its status is 2xx.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        options: RequestOptions,
    ) -> Result<Response> {
        let url = self.url(path)?;
        let mut builder = self
            .http
            .request(method.clone(), url)
            .header(ACCEPT, "application/json");
        if options.secure {
            if let Some(token) = self.storage.token() {
                builder = builder.bearer_auth(token);
            }
        }
        builder = attach_payload(builder, options.payload)?;

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) if e.is_builder() => return Err(ApiError::Build(e.to_string())),
            Err(e) => {
                warn!(method = %method, path, error = %e, "request failed");
                let _ = self.messages.error(NETWORK_ERROR_MESSAGE);
                return Err(ApiError::Network(e));
            }
        };

        let status = response.status();
        debug!(method = %method, path, status = status.as_u16(), "response received");
        if status.is_success() {
            return Ok(response);
        }
        Err(self.fail(response, options.secure).await)
    }

    async fn fail(&self, response: Response, secure: bool) -> ApiError {
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let body = match response.bytes().await {
            Ok(bytes) => ErrorBody::from_bytes(content_type.as_deref(), &bytes),
            Err(e) => {
                warn!(status, error = %e, "failed to read error body");
                ErrorBody::Unreadable
            }
        };
        let messages = problem::error_messages(status, &body);

        if status == 401 && secure {
            let message = messages.join("; ");
            let _ = self.messages.error(message.clone());
            self.force_logout();
            return ApiError::Unauthorized { message };
        }

        for message in &messages {
            let _ = self.messages.error(message.clone());
        }
        warn!(status, messages = ?messages, "request rejected");
        ApiError::Status { status, messages }
    }

    fn force_logout(&self) {
        let redirect = self.current_path();
        if let Err(e) = self.storage.set_redirect(&redirect) {
            warn!(error = %e, "failed to persist redirect");
        }
        if let Err(e) = self.storage.clear_session() {
            warn!(error = %e, "failed to clear session");
        }
        self.emit(SessionEvent::LoginRequired { redirect });
    }

    /// `GET` and decode a JSON body.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self
            .request(Method::GET, path, RequestOptions::default())
            .await?;
        decode(response).await
    }

    /// `GET` a plain-text body.
    pub async fn get_text(&self, path: &str) -> Result<String> {
        let response = self
            .request(Method::GET, path, RequestOptions::default())
            .await?;
        response
            .text()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }

    /// Send a JSON body and decode the JSON answer.
    pub async fn send_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Value,
    ) -> Result<T> {
        let response = self
            .request(method, path, RequestOptions::json(body))
            .await?;
        decode(response).await
    }

    /// Send a request and discard the answer body.
    pub async fn send(&self, method: Method, path: &str, options: RequestOptions) -> Result<()> {
        let _ = self.request(method, path, options).await?;
        Ok(())
    }
}

fn attach_payload(builder: RequestBuilder, payload: Payload) -> Result<RequestBuilder> {
    Ok(match payload {
        Payload::Empty => builder,
        Payload::Json(value) => builder.json(&value),
        Payload::Form(pairs) => builder.form(&pairs),
        Payload::Multipart { fields, files } => {
            let mut form = multipart::Form::new();
            for (key, value) in fields {
                form = form.text(key, value.to_string());
            }
            for file in files {
                let part = multipart::Part::bytes(file.bytes)
                    .file_name(file.file_name)
                    .mime_str(&file.mime)
                    .map_err(|e| ApiError::Build(e.to_string()))?;
                form = form.part(file.field, part);
            }
            builder.multipart(form)
        }
    })
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
    let bytes = response
        .bytes()
        .await
        .map_err(|e| ApiError::Decode(e.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|e| ApiError::Decode(e.to_string()))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::FilePart;
    use assert_matches::assert_matches;
    use serde_json::{Map, json};
    use wiremock::matchers::{body_json, body_string, body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> ApiClient {
        ApiClient::new(
            Url::parse(&server.uri()).unwrap(),
            Duration::from_secs(5),
            Arc::new(ClientStorage::in_memory()),
            Arc::new(MessageCenter::default()),
        )
        .unwrap()
    }

    fn texts(client: &ApiClient) -> Vec<String> {
        client.messages().messages().into_iter().map(|m| m.text).collect()
    }

    // ── Success paths ────────────────────────────────────────────────

    #[tokio::test]
    async fn get_json_attaches_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/dags"))
            .and(header("authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 1}])))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        client.storage().set_credentials("admin", "tok").unwrap();
        let dags: Vec<Value> = client.get_json("/api/dags").await.unwrap();
        assert_eq!(dags, vec![json!({"id": 1})]);
    }

    #[tokio::test]
    async fn insecure_request_omits_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/system/info"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let client = client_for(&server);
        client.storage().set_credentials("admin", "tok").unwrap();
        client
            .send(
                Method::GET,
                "/api/system/info",
                RequestOptions::default().insecure(),
            )
            .await
            .unwrap();

        let received = server.received_requests().await.unwrap();
        assert!(received[0].headers.get("authorization").is_none());
    }

    #[tokio::test]
    async fn json_payload_is_sent_as_json() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/api/dags/3"))
            .and(body_json(json!({"params": {"a": 1}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let answer: Value = client
            .send_json(Method::PUT, "/api/dags/3", json!({"params": {"a": 1}}))
            .await
            .unwrap();
        assert_eq!(answer, json!({"ok": true}));
    }

    #[tokio::test]
    async fn form_payload_is_url_encoded() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/token"))
            .and(header("content-type", "application/x-www-form-urlencoded"))
            .and(body_string("username=admin&password=p%26w"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        client
            .send(
                Method::POST,
                "/api/token",
                RequestOptions::payload(Payload::form([("username", "admin"), ("password", "p&w")])),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn multipart_fields_are_json_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/upload"))
            .and(body_string_contains(r#"{"x":1}"#))
            .and(body_string_contains(r#""icons""#))
            .and(body_string_contains("filename=\"a.txt\""))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let mut data = Map::new();
        let _ = data.insert("meta".into(), json!({"x": 1}));
        let _ = data.insert("name".into(), json!("icons"));
        let payload = Payload::with_files(data, vec![FilePart::new("file", "a.txt", b"hi".to_vec())]);

        let client = client_for(&server);
        client
            .send(Method::POST, "/api/upload", RequestOptions::payload(payload))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn get_text_returns_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/errors/runtime/e1.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string("Traceback..."))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let text = client.get_text("/api/errors/runtime/e1.txt").await.unwrap();
        assert_eq!(text, "Traceback...");
    }

    // ── Error contract ───────────────────────────────────────────────

    #[tokio::test]
    async fn status_error_reports_detail() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/api/dags/9"))
            .respond_with(
                ResponseTemplate::new(404).set_body_json(json!({"detail": "Dag not found"})),
            )
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client
            .send(Method::DELETE, "/api/dags/9", RequestOptions::default())
            .await
            .unwrap_err();
        assert_matches!(err, ApiError::Status { status: 404, ref messages } if messages == &["Dag not found"]);
        assert_eq!(texts(&client), ["Dag not found"]);
    }

    #[tokio::test]
    async fn validation_errors_become_separate_messages() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/dags/add"))
            .respond_with(ResponseTemplate::new(422).set_body_json(json!({"detail": [
                {"type": "missing", "loc": ["body", "dag_name"], "msg": "Field required"},
                {"type": "value_error", "loc": ["body", "page"], "msg": "bad page"},
            ]})))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client
            .send(
                Method::POST,
                "/api/dags/add",
                RequestOptions::json(json!({})),
            )
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(422));
        assert_eq!(texts(&client), ["Missing field dag_name", "bad page"]);
    }

    #[tokio::test]
    async fn empty_500_uses_default_message() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client.get_json::<Value>("/api/dags").await.unwrap_err();
        assert_eq!(err.status(), Some(500));
        assert_eq!(texts(&client), ["Internal server error"]);
    }

    #[tokio::test]
    async fn unauthorized_forces_logout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(401).set_body_json(json!({"detail": "Token expired"})),
            )
            .mount(&server)
            .await;

        let client = client_for(&server);
        client.storage().set_credentials("admin", "tok").unwrap();
        client.set_current_path("/dags/main");
        let mut session = client.subscribe_session();

        let err = client.get_json::<Value>("/api/dags").await.unwrap_err();
        assert_matches!(err, ApiError::Unauthorized { ref message } if message == "Token expired");
        assert!(client.storage().token().is_none());
        assert_eq!(client.storage().redirect().as_deref(), Some("/dags/main"));
        assert_eq!(texts(&client), ["Token expired"]);
        assert_eq!(
            session.try_recv().unwrap(),
            SessionEvent::LoginRequired {
                redirect: "/dags/main".into()
            }
        );
    }

    #[tokio::test]
    async fn unauthorized_without_credentials_keeps_session() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client = client_for(&server);
        client.storage().set_credentials("admin", "tok").unwrap();
        let err = client
            .send(
                Method::POST,
                "/api/token",
                RequestOptions::default().insecure(),
            )
            .await
            .unwrap_err();
        assert_matches!(err, ApiError::Status { status: 401, .. });
        assert_eq!(client.storage().token().as_deref(), Some("tok"));
        assert_eq!(texts(&client), ["Unauthorized"]);
    }

    #[tokio::test]
    async fn network_failure_reports_network_error() {
        let client = ApiClient::new(
            Url::parse("http://127.0.0.1:1").unwrap(),
            Duration::from_secs(2),
            Arc::new(ClientStorage::in_memory()),
            Arc::new(MessageCenter::default()),
        )
        .unwrap();

        let err = client.get_json::<Value>("/api/dags").await.unwrap_err();
        assert_matches!(err, ApiError::Network(_));
        assert_eq!(texts(&client), [NETWORK_ERROR_MESSAGE]);
    }

    #[tokio::test]
    async fn undecodable_success_body_is_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client.get_json::<Value>("/api/dags").await.unwrap_err();
        assert_matches!(err, ApiError::Decode(_));
    }

    #[test]
    fn url_joins_against_origin() {
        let client = ApiClient::new(
            Url::parse("http://dash.local:8000").unwrap(),
            Duration::from_secs(1),
            Arc::new(ClientStorage::in_memory()),
            Arc::new(MessageCenter::default()),
        )
        .unwrap();
        assert_eq!(
            client.url("/api/list/pins").unwrap().as_str(),
            "http://dash.local:8000/api/list/pins"
        );
    }
}
