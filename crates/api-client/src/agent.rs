//! ApiAgent - authenticated client for the incident-management backend
//!
//! The agent owns the live session, attaches the bearer token to every
//! request, and implements the 401 recovery flow: refresh the token pair
//! once and replay the request, or declare the session expired.
//!
//! # Example
//!
//! ```rust,no_run
//! use api_client::ApiAgent;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let agent = ApiAgent::new("https://api.opswatch.example")?;
//!
//!     let session = agent.login("alice@example.com", "password").await?;
//!     println!("Logged in as: {}", session.user.email);
//!
//!     let me = agent.me().await?;
//!     println!("Role: {:?}", me.role);
//!
//!     Ok(())
//! }
//! ```

use crate::rest::{ApiError, ApiRequest, RestClient, RestClientConfig};
use crate::session::{is_token_expired, AuthSession, SessionError};
use crate::types::User;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use thiserror::Error;

/// Errors that can occur during agent operations
#[derive(Debug, Error)]
pub enum AgentError {
    /// Session error
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// API error
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// No active session
    #[error("No active session - please login first")]
    NoSession,

    /// Session expired beyond recovery; the caller should redirect to login
    #[error("Session expired - please login again")]
    SessionExpired,

    /// Service error
    #[error("Service error: {0}")]
    Service(String),
}

/// Result type for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

/// Login request parameters
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    /// Email address
    pub email: String,
    /// Password
    pub password: String,
}

/// Registration request parameters
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    /// Email address
    pub email: String,
    /// Password
    pub password: String,
    /// Display name
    pub name: String,
    /// Optional organization to join
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
}

/// Response from `/auth/login` and `/auth/register`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    /// Access token
    pub access_token: String,
    /// Refresh token
    pub refresh_token: String,
    /// The authenticated user
    pub user: User,
}

/// Response from `/auth/refresh`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    /// New access token
    pub access_token: String,
    /// New refresh token (rotated)
    pub refresh_token: String,
    /// Updated user, if the server includes it
    pub user: Option<User>,
}

/// Session event types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// Session created (login or register)
    Create,
    /// Session updated (token refresh)
    Update,
    /// Session expired; tokens are gone for good
    Expired,
    /// Network error during a session operation
    NetworkError,
}

/// Callback function type for session events
pub type SessionCallback = Arc<dyn Fn(SessionEvent, &AuthSession) + Send + Sync>;

/// Authenticated agent for the incident-management API
///
/// The agent keeps the current [`AuthSession`] and a [`RestClient`] whose
/// bearer header tracks the access token. Authenticated calls go through
/// [`ApiAgent::execute_authed`], which handles the refresh-and-replay
/// cycle on a 401.
pub struct ApiAgent {
    /// Backend base URL
    base_url: String,
    /// HTTP client carrying the bearer header
    client: RestClient,
    /// Current session data
    session: Arc<RwLock<Option<AuthSession>>>,
    /// Session event callback
    session_callback: Option<SessionCallback>,
}

impl ApiAgent {
    /// Create a new agent with default configuration
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let base_url = base_url.into();
        let config = RestClientConfig::new(base_url.clone());
        Self::with_config(config)
    }

    /// Create a new agent with custom client configuration
    pub fn with_config(config: RestClientConfig) -> Result<Self> {
        let base_url = config.base_url.clone();
        let client = RestClient::new(config);

        Ok(Self {
            base_url,
            client,
            session: Arc::new(RwLock::new(None)),
            session_callback: None,
        })
    }

    /// Set a callback for session events
    ///
    /// The callback fires on login, token refresh, and expiry so callers
    /// can persist the rotated tokens.
    pub fn set_session_callback<F>(&mut self, callback: F)
    where
        F: Fn(SessionEvent, &AuthSession) + Send + Sync + 'static,
    {
        self.session_callback = Some(Arc::new(callback));
    }

    /// Login with email and password
    pub async fn login(
        &self,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<AuthSession> {
        let request = LoginRequest {
            email: email.into(),
            password: password.into(),
        };

        let api_request = ApiRequest::post("/auth/login")
            .json_body(&request)
            .map_err(|e| AgentError::Service(e.to_string()))?;

        let response: AuthResponse = self.client.execute(api_request).await.map(|r| r.data)?;

        let session = AuthSession {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            user: response.user,
            active: true,
        };

        self.install_session(session.clone());
        self.fire_callback(SessionEvent::Create, &session);

        Ok(session)
    }

    /// Register a new account
    pub async fn register(&self, request: RegisterRequest) -> Result<AuthSession> {
        let api_request = ApiRequest::post("/auth/register")
            .json_body(&request)
            .map_err(|e| AgentError::Service(e.to_string()))?;

        let response: AuthResponse = self.client.execute(api_request).await.map(|r| r.data)?;

        let session = AuthSession {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            user: response.user,
            active: true,
        };

        self.install_session(session.clone());
        self.fire_callback(SessionEvent::Create, &session);

        Ok(session)
    }

    /// Resume a session from stored session data
    ///
    /// If the access token is already expired the agent refreshes first
    /// instead of installing a token the backend would reject.
    pub async fn resume_session(&self, session: AuthSession) -> Result<()> {
        if is_token_expired(&session.access_token) {
            self.refresh_session_internal(session).await?;
        } else {
            self.install_session(session);
        }

        Ok(())
    }

    /// Refresh the current session's token pair
    pub async fn refresh_session(&self) -> Result<()> {
        let current = self
            .session
            .read()
            .unwrap()
            .clone()
            .ok_or(AgentError::NoSession)?;

        self.refresh_session_internal(current).await
    }

    /// Exchange the refresh token for a rotated pair
    async fn refresh_session_internal(&self, session: AuthSession) -> Result<()> {
        // The refresh token rides as bearer on this one request
        let api_request = ApiRequest::post("/auth/refresh")
            .header("Authorization", format!("Bearer {}", session.refresh_token));

        let response: RefreshResponse = match self.client.execute(api_request).await {
            Ok(r) => r.data,
            Err(e) if e.is_unauthorized() => {
                tracing::warn!(user = %session.user.id, "refresh token rejected, session expired");
                self.clear_session();
                self.fire_callback(SessionEvent::Expired, &session);
                return Err(AgentError::SessionExpired);
            }
            Err(e) => {
                if e.is_network_error() {
                    self.fire_callback(SessionEvent::NetworkError, &session);
                }
                return Err(e.into());
            }
        };

        let new_session = AuthSession {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            user: response.user.unwrap_or(session.user),
            active: true,
        };

        self.install_session(new_session.clone());
        self.fire_callback(SessionEvent::Update, &new_session);

        Ok(())
    }

    /// Logout: tell the server, then clear local state
    ///
    /// The server call is best effort; local tokens are cleared even if
    /// the request fails.
    pub async fn logout(&self) {
        let had_session = self.has_session();

        if had_session {
            let request = ApiRequest::post("/auth/logout");
            if let Err(e) = self.client.execute::<serde_json::Value>(request).await {
                tracing::debug!("logout request failed: {}", e);
            }
        }

        self.clear_session();
    }

    /// Fetch the current user from `/auth/me`
    pub async fn me(&self) -> Result<User> {
        let response = self.execute_authed::<User>(ApiRequest::get("/auth/me")).await?;
        Ok(response.data)
    }

    /// Execute an authenticated request with 401 recovery
    ///
    /// On a 401 the agent refreshes the token pair once and replays the
    /// request. A failed refresh surfaces [`AgentError::SessionExpired`],
    /// the signal the UI turns into a logout redirect.
    pub async fn execute_authed<T>(&self, request: ApiRequest) -> Result<crate::rest::ApiResponse<T>>
    where
        T: for<'de> Deserialize<'de>,
    {
        if !self.has_session() {
            return Err(AgentError::NoSession);
        }

        match self.client.execute::<T>(request.clone()).await {
            Ok(response) => Ok(response),
            Err(e) if e.is_unauthorized() => {
                tracing::debug!(path = %request.path, "401 response, attempting token refresh");
                self.refresh_session().await?;
                Ok(self.client.execute::<T>(request).await?)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Authenticated GET
    pub async fn get_authed<T>(&self, path: impl Into<String>) -> Result<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        Ok(self.execute_authed(ApiRequest::get(path)).await?.data)
    }

    /// Authenticated POST with a JSON body
    pub async fn post_authed<B, T>(&self, path: impl Into<String>, body: &B) -> Result<T>
    where
        B: Serialize,
        T: for<'de> Deserialize<'de>,
    {
        let request = ApiRequest::post(path)
            .json_body(body)
            .map_err(|e| AgentError::Service(e.to_string()))?;
        Ok(self.execute_authed(request).await?.data)
    }

    /// Authenticated PATCH with a JSON body
    pub async fn patch_authed<B, T>(&self, path: impl Into<String>, body: &B) -> Result<T>
    where
        B: Serialize,
        T: for<'de> Deserialize<'de>,
    {
        let request = ApiRequest::patch(path)
            .json_body(body)
            .map_err(|e| AgentError::Service(e.to_string()))?;
        Ok(self.execute_authed(request).await?.data)
    }

    /// Install a session and point the bearer header at its access token
    fn install_session(&self, session: AuthSession) {
        self.client.set_bearer(Some(&session.access_token));
        let mut current = self.session.write().unwrap();
        *current = Some(session);
    }

    /// Drop the session and the bearer header
    fn clear_session(&self) {
        self.client.set_bearer(None);
        let mut current = self.session.write().unwrap();
        *current = None;
    }

    fn fire_callback(&self, event: SessionEvent, session: &AuthSession) {
        if let Some(ref callback) = self.session_callback {
            callback(event, session);
        }
    }

    /// Get the current session data
    pub fn session(&self) -> Option<AuthSession> {
        self.session.read().unwrap().clone()
    }

    /// Check if there's an active session
    pub fn has_session(&self) -> bool {
        self.session.read().unwrap().is_some()
    }

    /// Get the current user's id
    pub fn user_id(&self) -> Option<String> {
        self.session
            .read()
            .unwrap()
            .as_ref()
            .map(|s| s.user.id.clone())
    }

    /// Get the current user's email
    pub fn email(&self) -> Option<String> {
        self.session
            .read()
            .unwrap()
            .as_ref()
            .map(|s| s.user.email.clone())
    }

    /// Token provider for the WebSocket channel
    ///
    /// Re-reads the live session on every call, so reconnects pick up a
    /// refreshed access token.
    pub fn token_provider(&self) -> crate::ws::TokenProvider {
        let session = self.session.clone();
        Arc::new(move || {
            session
                .read()
                .unwrap()
                .as_ref()
                .map(|s| s.access_token.clone())
        })
    }

    /// Get the backend base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Get a reference to the underlying REST client
    pub fn client(&self) -> &RestClient {
        &self.client
    }
}
