//! Login and logout.

use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::client::{ApiClient, SessionEvent};
use crate::errors::{ApiError, Result};
use crate::payload::{Payload, RequestOptions};
use reqwest::Method;

/// Where to go when no redirect was stored.
pub const DEFAULT_REDIRECT: &str = "/";

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Result of a successful login.
#[derive(Clone, Debug, PartialEq)]
pub struct LoginOutcome {
    /// Logged-in username.
    pub user: String,
    /// `/api/me/` profile.
    pub profile: Value,
    /// Path to navigate to.
    pub redirect: String,
}

impl ApiClient {
    /// Exchange credentials for a token and load the user profile.
    ///
    /// A rejected login reports the server message and leaves any stored
    /// session untouched.
    pub async fn login(&self, username: &str, password: &str) -> Result<LoginOutcome> {
        let options = RequestOptions::payload(Payload::form([
            ("username", username),
            ("password", password),
        ]))
        .insecure();
        let token: TokenResponse = {
            let response = self.request(Method::POST, "/api/token", options).await?;
            response
                .json()
                .await
                .map_err(|e| ApiError::Decode(e.to_string()))?
        };

        self.storage().set_credentials(username, &token.access_token)?;
        let _ = self.messages().success("Login successful");

        let profile: Value = self.get_json("/api/me/").await?;
        self.storage().set_user_data(profile.clone())?;

        let redirect = self
            .storage()
            .take_redirect()?
            .unwrap_or_else(|| DEFAULT_REDIRECT.to_string());
        info!(user = username, redirect = %redirect, "logged in");
        self.emit(SessionEvent::LoggedIn {
            user: username.to_string(),
            redirect: redirect.clone(),
        });

        Ok(LoginOutcome {
            user: username.to_string(),
            profile,
            redirect,
        })
    }

    /// Forget the token, user and profile.
    pub fn logout(&self) -> Result<()> {
        if let Err(e) = self.storage().clear_session() {
            warn!(error = %e, "failed to persist logout");
            return Err(e.into());
        }
        info!("logged out");
        self.emit(SessionEvent::LoggedOut);
        Ok(())
    }

    /// Whether a token is stored.
    pub fn is_logged_in(&self) -> bool {
        self.storage().token().is_some()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use assert_matches::assert_matches;
    use dagboard_auth::ClientStorage;
    use dagboard_core::MessageCenter;
    use serde_json::json;
    use tempfile::TempDir;
    use url::Url;
    use wiremock::matchers::{body_string, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_with(server: &MockServer, storage: ClientStorage) -> ApiClient {
        ApiClient::new(
            Url::parse(&server.uri()).unwrap(),
            Duration::from_secs(5),
            Arc::new(storage),
            Arc::new(MessageCenter::default()),
        )
        .unwrap()
    }

    async fn mount_login(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/api/token"))
            .and(body_string("username=admin&password=secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "tok-1",
                "token_type": "bearer"
            })))
            .expect(1)
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/me/"))
            .and(header("authorization", "Bearer tok-1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"username": "admin", "role": "admin"})),
            )
            .expect(1)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn login_persists_and_defaults_redirect() {
        let server = MockServer::start().await;
        mount_login(&server).await;
        let dir = TempDir::new().unwrap();
        let state_path = dir.path().join("state.json");
        let client = client_with(&server, ClientStorage::open(&state_path));
        let mut session = client.subscribe_session();

        let outcome = client.login("admin", "secret").await.unwrap();
        assert_eq!(outcome.redirect, "/");
        assert_eq!(outcome.profile["role"], "admin");
        assert!(client.is_logged_in());

        let reopened = ClientStorage::open(&state_path);
        assert_eq!(reopened.token().as_deref(), Some("tok-1"));
        assert_eq!(reopened.user().as_deref(), Some("admin"));
        assert_eq!(reopened.user_data().unwrap()["username"], "admin");
        assert_matches!(session.try_recv().unwrap(), SessionEvent::LoggedIn { .. });
    }

    #[tokio::test]
    async fn login_consumes_stored_redirect() {
        let server = MockServer::start().await;
        mount_login(&server).await;
        let storage = ClientStorage::in_memory();
        storage.set_redirect("/dags/main").unwrap();
        let client = client_with(&server, storage);

        let outcome = client.login("admin", "secret").await.unwrap();
        assert_eq!(outcome.redirect, "/dags/main");
        assert!(client.storage().redirect().is_none());
    }

    #[tokio::test]
    async fn rejected_login_reports_detail() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/token"))
            .respond_with(
                ResponseTemplate::new(401)
                    .set_body_json(json!({"detail": "Incorrect username or password"})),
            )
            .mount(&server)
            .await;
        let client = client_with(&server, ClientStorage::in_memory());

        let err = client.login("admin", "wrong").await.unwrap_err();
        assert_eq!(err.status(), Some(401));
        assert!(!client.is_logged_in());
        let texts: Vec<String> = client
            .messages()
            .messages()
            .into_iter()
            .map(|m| m.text)
            .collect();
        assert_eq!(texts, ["Incorrect username or password"]);
    }

    #[tokio::test]
    async fn logout_clears_session() {
        let server = MockServer::start().await;
        let client = client_with(&server, ClientStorage::in_memory());
        client.storage().set_credentials("admin", "tok").unwrap();
        let mut session = client.subscribe_session();

        client.logout().unwrap();
        assert!(!client.is_logged_in());
        assert!(client.storage().user().is_none());
        assert_eq!(session.try_recv().unwrap(), SessionEvent::LoggedOut);
    }
}
