//! Authentication service
//!
//! Thin layer over the [`SessionManager`] that the UI surfaces talk to:
//! login/register/logout, restore on launch, and proactive refresh when
//! the access token is about to lapse.

use api_client::agent::{AgentError, RegisterRequest};
use api_client::session::{
    is_token_expiring_soon, SessionManager, SessionManagerError, StoredAccount,
};
use chrono::Duration;
use thiserror::Error;

/// How close to expiry a token may get before we refresh it proactively
const REFRESH_THRESHOLD_MINUTES: i64 = 2;

/// Errors that can occur during auth operations
#[derive(Debug, Error)]
pub enum AuthError {
    /// Wrong email or password
    #[error("Invalid email or password")]
    InvalidCredentials,

    /// The account exists but is suspended or deactivated
    #[error("Account is suspended or deactivated")]
    AccountDisabled,

    /// Session manager error
    #[error("Session error: {0}")]
    Session(#[from] SessionManagerError),
}

/// Result type for auth operations
pub type Result<T> = std::result::Result<T, AuthError>;

/// Authentication service backing the login and account screens
pub struct AuthService {
    manager: SessionManager,
}

impl AuthService {
    /// Create an auth service over the given session manager
    pub fn new(manager: SessionManager) -> Self {
        Self { manager }
    }

    /// Login with email and password
    pub async fn login(&self, email: &str, password: &str) -> Result<StoredAccount> {
        match self.manager.login(email, password).await {
            Ok(account) => Ok(account),
            Err(SessionManagerError::Agent(AgentError::Api(e)))
                if e.status() == 403
                    || e.code() == "AccountSuspended"
                    || e.code() == "AccountDeactivated" =>
            {
                Err(AuthError::AccountDisabled)
            }
            Err(SessionManagerError::Agent(AgentError::Api(e)))
                if e.status() == 401 || e.status() == 400 =>
            {
                Err(AuthError::InvalidCredentials)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Register a new account
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        name: &str,
    ) -> Result<StoredAccount> {
        let request = RegisterRequest {
            email: email.to_string(),
            password: password.to_string(),
            name: name.to_string(),
            organization: None,
        };

        Ok(self.manager.register(request).await?)
    }

    /// Restore the previous session on app launch
    ///
    /// Returns `Ok(None)` when there is no session to restore and the
    /// login screen should be shown.
    pub async fn restore(&self) -> Result<Option<StoredAccount>> {
        Ok(self.manager.resume().await?)
    }

    /// Logout the current account
    pub async fn logout(&self) -> Result<()> {
        Ok(self.manager.logout().await?)
    }

    /// Refresh the token pair if the access token expires soon
    ///
    /// Surfaces call this before long-lived operations so the token
    /// doesn't lapse mid-flight.
    pub async fn ensure_fresh_token(&self) -> Result<()> {
        let Some(agent) = self.manager.current_agent().await else {
            return Ok(());
        };

        let needs_refresh = agent
            .session()
            .map(|s| {
                is_token_expiring_soon(
                    &s.access_token,
                    Duration::minutes(REFRESH_THRESHOLD_MINUTES),
                )
            })
            .unwrap_or(false);

        if needs_refresh {
            tracing::debug!("access token expiring soon, refreshing");
            self.manager.refresh_session().await?;
        }

        Ok(())
    }

    /// Access the underlying session manager
    pub fn manager(&self) -> &SessionManager {
        &self.manager
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn service_for(server: &MockServer, dir: &TempDir) -> AuthService {
        let manager = SessionManager::new(dir.path().join("accounts.json"), server.uri())
            .await
            .unwrap();
        AuthService::new(manager)
    }

    fn auth_body(user_id: &str) -> serde_json::Value {
        serde_json::json!({
            "accessToken": "access_tok",
            "refreshToken": "refresh_tok",
            "user": {
                "id": user_id,
                "email": "alice@example.com",
                "name": "Alice"
            }
        })
    }

    #[tokio::test]
    async fn test_login_stores_account() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();

        Mock::given(method("POST"))
            .and(path("/auth/login"))
            .respond_with(ResponseTemplate::new(200).set_body_json(auth_body("usr_1")))
            .mount(&server)
            .await;

        let service = service_for(&server, &dir).await;
        let account = service.login("alice@example.com", "password").await.unwrap();

        assert_eq!(account.user_id, "usr_1");
        assert!(account.has_tokens());
        assert!(service.manager().current_agent().await.is_some());
    }

    #[tokio::test]
    async fn test_bad_credentials_are_reported_as_such() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();

        Mock::given(method("POST"))
            .and(path("/auth/login"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "error": "InvalidCredentials",
                "message": "Invalid email or password"
            })))
            .mount(&server)
            .await;

        let service = service_for(&server, &dir).await;
        let result = service.login("alice@example.com", "wrong").await;

        assert!(matches!(result, Err(AuthError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn test_restore_without_stored_session() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();

        let service = service_for(&server, &dir).await;
        assert!(service.restore().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_ensure_fresh_token_without_session_is_noop() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();

        let service = service_for(&server, &dir).await;
        service.ensure_fresh_token().await.unwrap();
    }

    #[tokio::test]
    async fn test_logout_clears_current_session() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();

        Mock::given(method("POST"))
            .and(path("/auth/login"))
            .respond_with(ResponseTemplate::new(200).set_body_json(auth_body("usr_1")))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/auth/logout"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;

        let service = service_for(&server, &dir).await;
        service.login("alice@example.com", "password").await.unwrap();
        service.logout().await.unwrap();

        assert!(service.manager().current_agent().await.is_none());
        let accounts = service.manager().list_accounts().await.unwrap();
        assert_eq!(accounts.len(), 1);
        assert!(!accounts[0].has_tokens());
    }
}
