//! Notification service
//!
//! Merges the REST notification list with notifications pushed over the
//! WebSocket channel, keeping one deduplicated, newest-first feed plus
//! an unread count for the badge.

use api_client::agent::{AgentError, ApiAgent};
use api_client::rest::ApiRequest;
use api_client::types::Notification;
use api_client::ws::{NotificationStream, WsEvent};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

/// Errors that can occur during notification operations
#[derive(Debug, Error)]
pub enum NotificationError {
    /// Agent error
    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),
}

/// Result type for notification operations
pub type Result<T> = std::result::Result<T, NotificationError>;

/// Notification service backing the notification feed and badge
pub struct NotificationService {
    agent: Arc<ApiAgent>,
    feed: RwLock<Vec<Notification>>,
}

impl NotificationService {
    /// Create a notification service over the given agent
    pub fn new(agent: Arc<ApiAgent>) -> Self {
        Self {
            agent,
            feed: RwLock::new(Vec::new()),
        }
    }

    /// Fetch the notification list from the backend, replacing the feed
    pub async fn refresh(&self) -> Result<Vec<Notification>> {
        let response = self
            .agent
            .execute_authed::<Vec<Notification>>(ApiRequest::get("/notifications"))
            .await?;

        let mut notifications = response.data;
        notifications.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let mut feed = self.feed.write().await;
        *feed = notifications.clone();

        Ok(notifications)
    }

    /// Ingest a notification pushed over the WebSocket channel
    ///
    /// Duplicates (same id) are dropped so a REST refresh racing the
    /// push doesn't double-count.
    pub async fn ingest(&self, notification: Notification) {
        let mut feed = self.feed.write().await;

        if feed.iter().any(|n| n.id == notification.id) {
            return;
        }

        let position = feed
            .iter()
            .position(|n| n.created_at <= notification.created_at)
            .unwrap_or(feed.len());
        feed.insert(position, notification);
    }

    /// Current feed, newest first
    pub async fn feed(&self) -> Vec<Notification> {
        self.feed.read().await.clone()
    }

    /// Number of unread notifications
    pub async fn unread_count(&self) -> usize {
        self.feed.read().await.iter().filter(|n| !n.read).count()
    }

    /// Mark one notification as read
    pub async fn mark_read(&self, id: &str) -> Result<()> {
        let request = ApiRequest::post(format!("/notifications/{}/read", id));
        self.agent
            .execute_authed::<serde_json::Value>(request)
            .await?;

        let mut feed = self.feed.write().await;
        if let Some(notification) = feed.iter_mut().find(|n| n.id == id) {
            notification.read = true;
        }

        Ok(())
    }

    /// Drain a WebSocket stream into the feed
    ///
    /// Runs until the stream is closed; callers usually spawn it. A
    /// reconnect triggers a REST refresh to pick up anything missed
    /// while disconnected.
    pub async fn pump(&self, mut stream: NotificationStream) {
        let mut was_disconnected = false;

        while let Some(event) = stream.next_event().await {
            self.handle_stream_event(event, &mut was_disconnected).await;
        }
    }

    async fn handle_stream_event(&self, event: WsEvent, was_disconnected: &mut bool) {
        match event {
            WsEvent::Notification(notification) => self.ingest(notification).await,
            WsEvent::Connected => {
                if *was_disconnected {
                    if let Err(e) = self.refresh().await {
                        tracing::warn!("feed refresh after reconnect failed: {}", e);
                    }
                    *was_disconnected = false;
                }
            }
            WsEvent::Disconnected => {
                *was_disconnected = true;
            }
        }
    }

    /// Mark every notification as read
    pub async fn mark_all_read(&self) -> Result<()> {
        let request = ApiRequest::post("/notifications/read-all");
        self.agent
            .execute_authed::<serde_json::Value>(request)
            .await?;

        let mut feed = self.feed.write().await;
        for notification in feed.iter_mut() {
            notification.read = true;
        }

        Ok(())
    }
}
