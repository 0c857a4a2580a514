//! Opswatch API Client Library
//!
//! This crate provides the typed client for the incident-management backend:
//! the REST client, token/session lifecycle management, and the WebSocket
//! notification channel.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod agent;
pub mod rest;
pub mod session;
pub mod types;
pub mod ws;

pub use agent::{AgentError, ApiAgent, SessionEvent};
pub use rest::{ApiError, ApiRequest, ApiResponse, RestClient, RestClientConfig};
pub use session::{AuthSession, StoredAccount};
pub use types::{Incident, IncidentStatus, Notification, Severity, Subscription, User};
pub use ws::{NotificationStream, WsConfig, WsEvent};
