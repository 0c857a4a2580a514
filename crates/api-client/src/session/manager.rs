//! Multi-account session manager
//!
//! Owns the on-disk account store and the live [`ApiAgent`] for the
//! currently-selected account. Rotated token pairs coming out of the
//! agent's session events are written back to disk so a restart resumes
//! where the last run left off.

use super::{is_session_expired, AuthSession, SessionError, StoredAccount};
use crate::agent::{AgentError, ApiAgent, RegisterRequest, SessionEvent};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use storage::{PersistedState, PersistenceConfig, PersistenceError};
use thiserror::Error;
use tokio::sync::RwLock;

/// Errors that can occur in the session manager
#[derive(Debug, Error)]
pub enum SessionManagerError {
    /// Session error
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Agent error
    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),

    /// Persistence error
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    /// Account not found
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    /// No account is currently selected
    #[error("No current account")]
    NoCurrentAccount,

    /// Invalid operation
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
}

/// Result type for session manager operations
pub type Result<T> = std::result::Result<T, SessionManagerError>;

/// The persisted account store
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountStore {
    /// All known accounts, with or without live tokens
    #[serde(default)]
    pub accounts: Vec<StoredAccount>,

    /// The user id of the currently-selected account
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_user_id: Option<String>,
}

impl AccountStore {
    /// Find an account by user id
    pub fn find(&self, user_id: &str) -> Option<&StoredAccount> {
        self.accounts.iter().find(|a| a.user_id == user_id)
    }

    /// Insert or replace an account, keyed by user id
    pub fn upsert(&mut self, account: StoredAccount) {
        if let Some(existing) = self
            .accounts
            .iter_mut()
            .find(|a| a.user_id == account.user_id)
        {
            *existing = account;
        } else {
            self.accounts.push(account);
        }
    }
}

/// Manages stored accounts and the agent for the active one
///
/// One manager instance backs all the app's surfaces; each surface asks
/// it for the current agent rather than running its own token lifecycle.
pub struct SessionManager {
    /// Backend base URL used for new logins
    base_url: String,
    /// On-disk account store
    storage: Arc<PersistedState<AccountStore>>,
    /// Agent for the currently-selected account
    agent: Arc<RwLock<Option<Arc<ApiAgent>>>>,
}

impl SessionManager {
    /// Create a manager backed by the given store file
    pub async fn new(path: impl Into<PathBuf>, base_url: impl Into<String>) -> Result<Self> {
        let config = PersistenceConfig::new(path).version(1).backups(true, 2);
        let storage = PersistedState::new(config);
        storage.init().await?;

        Ok(Self {
            base_url: base_url.into(),
            storage: Arc::new(storage),
            agent: Arc::new(RwLock::new(None)),
        })
    }

    /// Build an agent wired to persist token rotations for this store
    fn make_agent(&self) -> Result<Arc<ApiAgent>> {
        let mut agent = ApiAgent::new(self.base_url.clone())?;

        let storage = self.storage.clone();
        let base_url = self.base_url.clone();

        agent.set_session_callback(move |event, session| {
            let storage = storage.clone();
            let user_id = session.user.id.clone();

            match event {
                // Login and register persist inline via select(); writing
                // here too would race a logout that follows immediately
                SessionEvent::Create => {}
                SessionEvent::Update => {
                    let account = session.to_stored_account(base_url.clone());
                    tokio::spawn(async move {
                        let result = storage.update(|store| store.upsert(account)).await;
                        if let Err(e) = result {
                            tracing::warn!(user = %user_id, "failed to persist session tokens: {}", e);
                        }
                    });
                }
                SessionEvent::Expired => {
                    tokio::spawn(async move {
                        let result = storage
                            .update(|store| {
                                if let Some(account) =
                                    store.accounts.iter_mut().find(|a| a.user_id == user_id)
                                {
                                    account.access_token = None;
                                    account.refresh_token = None;
                                }
                            })
                            .await;
                        if let Err(e) = result {
                            tracing::warn!("failed to clear expired session tokens: {}", e);
                        }
                    });
                }
                SessionEvent::NetworkError => {}
            }
        });

        Ok(Arc::new(agent))
    }

    /// Login and select the resulting account
    pub async fn login(
        &self,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<StoredAccount> {
        let agent = self.make_agent()?;
        let session = agent.login(email, password).await?;

        let account = self.select(agent, &session).await?;
        Ok(account)
    }

    /// Register a new account and select it
    pub async fn register(&self, request: RegisterRequest) -> Result<StoredAccount> {
        let agent = self.make_agent()?;
        let session = agent.register(request).await?;

        let account = self.select(agent, &session).await?;
        Ok(account)
    }

    /// Resume the previously-selected account, if any
    ///
    /// Returns `Ok(None)` when there is nothing to resume: no selected
    /// account, no stored tokens, or a session the backend has since
    /// expired. In the expired case the stale tokens are cleared so the
    /// next launch doesn't retry them.
    pub async fn resume(&self) -> Result<Option<StoredAccount>> {
        let store = self.storage.get().await?;

        let Some(user_id) = store.current_user_id.clone() else {
            return Ok(None);
        };

        let Some(account) = store.find(&user_id).cloned() else {
            return Ok(None);
        };

        if !account.has_tokens() || is_session_expired(&account) {
            self.clear_tokens(&user_id).await?;
            return Ok(None);
        }

        let agent = self.make_agent()?;
        match agent.resume_session(account.to_auth_session()?).await {
            Ok(()) => {}
            Err(AgentError::SessionExpired) => {
                // Tokens already cleared by the Expired event
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        }

        // A resume that didn't refresh fires no event; persist explicitly
        let session = agent.session().ok_or(SessionManagerError::InvalidOperation(
            "agent has no session after resume".to_string(),
        ))?;
        let account = self.select(agent, &session).await?;

        Ok(Some(account))
    }

    /// Switch to another stored account
    ///
    /// The target must still hold a token pair; switching never prompts
    /// for credentials.
    pub async fn switch_account(&self, user_id: &str) -> Result<StoredAccount> {
        let store = self.storage.get().await?;

        let account = store
            .find(user_id)
            .cloned()
            .ok_or_else(|| SessionManagerError::AccountNotFound(user_id.to_string()))?;

        if !account.has_tokens() {
            return Err(SessionManagerError::InvalidOperation(format!(
                "account {} has no stored tokens, login required",
                user_id
            )));
        }

        let agent = self.make_agent()?;
        agent.resume_session(account.to_auth_session()?).await?;

        let session = agent.session().ok_or(SessionManagerError::InvalidOperation(
            "agent has no session after switch".to_string(),
        ))?;
        let account = self.select(agent, &session).await?;

        Ok(account)
    }

    /// Logout the current account
    ///
    /// The account entry stays in the store with its tokens cleared so
    /// the account picker can still show it.
    pub async fn logout(&self) -> Result<()> {
        let agent = self.agent.write().await.take();

        if let Some(agent) = agent {
            let user_id = agent.user_id();
            agent.logout().await;

            if let Some(user_id) = user_id {
                self.clear_tokens(&user_id).await?;
            }
        }

        self.storage
            .update(|store| store.current_user_id = None)
            .await?;

        Ok(())
    }

    /// Logout every stored account
    pub async fn logout_all(&self) -> Result<()> {
        if let Some(agent) = self.agent.write().await.take() {
            agent.logout().await;
        }

        self.storage
            .update(|store| {
                for account in &mut store.accounts {
                    account.access_token = None;
                    account.refresh_token = None;
                }
                store.current_user_id = None;
            })
            .await?;

        Ok(())
    }

    /// Remove an account from the store entirely
    pub async fn remove_account(&self, user_id: &str) -> Result<()> {
        let current = self.current_user_id().await?;
        if current.as_deref() == Some(user_id) {
            self.logout().await?;
        }

        self.storage
            .update(|store| store.accounts.retain(|a| a.user_id != user_id))
            .await?;

        Ok(())
    }

    /// Force a token refresh on the current agent
    pub async fn refresh_session(&self) -> Result<()> {
        let agent = self
            .current_agent()
            .await
            .ok_or(SessionManagerError::NoCurrentAccount)?;

        agent.refresh_session().await?;
        Ok(())
    }

    /// Get the agent for the currently-selected account
    pub async fn current_agent(&self) -> Option<Arc<ApiAgent>> {
        self.agent.read().await.clone()
    }

    /// Get the currently-selected account, if any
    pub async fn current_account(&self) -> Result<Option<StoredAccount>> {
        let store = self.storage.get().await?;
        Ok(store
            .current_user_id
            .as_deref()
            .and_then(|id| store.find(id))
            .cloned())
    }

    /// List all stored accounts
    pub async fn list_accounts(&self) -> Result<Vec<StoredAccount>> {
        Ok(self.storage.get().await?.accounts)
    }

    /// Get a stored account by user id
    pub async fn get_account(&self, user_id: &str) -> Result<Option<StoredAccount>> {
        Ok(self.storage.get().await?.find(user_id).cloned())
    }

    /// Get the currently-selected user id
    async fn current_user_id(&self) -> Result<Option<String>> {
        Ok(self.storage.get().await?.current_user_id)
    }

    /// Persist an account from a live session and make it current
    async fn select(
        &self,
        agent: Arc<ApiAgent>,
        session: &AuthSession,
    ) -> Result<StoredAccount> {
        let account = session.to_stored_account(self.base_url.clone());
        let stored = account.clone();

        self.storage
            .update(|store| {
                store.upsert(account);
                store.current_user_id = Some(stored.user_id.clone());
            })
            .await?;

        let mut current = self.agent.write().await;
        *current = Some(agent);

        Ok(stored)
    }

    /// Clear the stored tokens for an account, keeping the entry
    async fn clear_tokens(&self, user_id: &str) -> Result<()> {
        self.storage
            .update(|store| {
                if let Some(account) = store.accounts.iter_mut().find(|a| a.user_id == user_id) {
                    account.access_token = None;
                    account.refresh_token = None;
                }
            })
            .await?;

        Ok(())
    }
}
