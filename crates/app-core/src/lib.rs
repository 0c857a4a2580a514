//! Opswatch Core Business Logic
//!
//! Platform-agnostic services the UI layers sit on: authentication over
//! the session manager, incidents, notifications, and billing. Each
//! service wraps the shared [`ApiAgent`](api_client::ApiAgent) and adds
//! the app-side state the backend doesn't keep for us.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod auth;
pub mod billing;
pub mod incidents;
pub mod notifications;

pub use auth::{AuthError, AuthService};
pub use billing::{BillingError, BillingService};
pub use incidents::{IncidentError, IncidentFilter, IncidentService, NewIncident};
pub use notifications::{NotificationError, NotificationService};
