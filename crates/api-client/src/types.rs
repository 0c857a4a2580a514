//! Wire types mirrored from the incident-management API
//!
//! These are plain DTOs; the server owns their lifecycle and all
//! invariants. Unknown enum values coming off the wire deserialize to
//! fallback variants instead of failing, since the backend can ship new
//! values ahead of the client.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An authenticated user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// User id
    pub id: String,

    /// Email address
    pub email: String,

    /// Display name
    pub name: String,

    /// Role within the organization (e.g., "admin", "responder")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    /// Organization the user belongs to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
}

/// Incident severity, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Unrecognized severity from a newer server, ordered lowest
    Unknown,
    /// Informational or minor impact
    Low,
    /// Degraded but functional
    Medium,
    /// Major functionality impacted
    High,
    /// Full outage or data loss risk
    Critical,
}

// Manual impl because `#[serde(other)]` must sit on the last variant, but
// `Unknown` must stay first so the derived `Ord` ranks it lowest.
impl<'de> Deserialize<'de> for Severity {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Ok(match value.as_str() {
            "low" => Severity::Low,
            "medium" => Severity::Medium,
            "high" => Severity::High,
            "critical" => Severity::Critical,
            _ => Severity::Unknown,
        })
    }
}

impl Severity {
    /// Wire representation of this severity
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Unknown => "unknown",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

/// Incident lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IncidentStatus {
    /// Newly reported, nobody on it yet
    Open,
    /// A responder has taken ownership
    Acknowledged,
    /// Fixed, pending closure
    Resolved,
    /// Closed out
    Closed,
    /// Unrecognized status from a newer server
    #[serde(other)]
    Unknown,
}

impl IncidentStatus {
    /// Wire representation of this status
    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentStatus::Open => "open",
            IncidentStatus::Acknowledged => "acknowledged",
            IncidentStatus::Resolved => "resolved",
            IncidentStatus::Closed => "closed",
            IncidentStatus::Unknown => "unknown",
        }
    }
}

/// An incident as returned by `/incidents`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Incident {
    /// Incident id
    pub id: String,

    /// Short summary
    pub title: String,

    /// Longer description (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Severity
    pub severity: Severity,

    /// Current status
    pub status: IncidentStatus,

    /// When the incident was created
    pub created_at: DateTime<Utc>,

    /// When the incident was last updated
    pub updated_at: DateTime<Utc>,
}

/// Kinds of pushed notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NotificationKind {
    /// A new incident was created
    IncidentCreated,
    /// An incident changed (status, severity, assignment)
    IncidentUpdated,
    /// An incident was resolved
    IncidentResolved,
    /// Product/system announcement
    System,
    /// Unknown notification kind from a newer server
    #[serde(other)]
    Unknown,
}

impl NotificationKind {
    /// Convert from the wire reason string
    pub fn from_kind(kind: &str) -> Self {
        match kind {
            "incident-created" => NotificationKind::IncidentCreated,
            "incident-updated" => NotificationKind::IncidentUpdated,
            "incident-resolved" => NotificationKind::IncidentResolved,
            "system" => NotificationKind::System,
            _ => NotificationKind::Unknown,
        }
    }
}

/// A notification from `/notifications` or the WebSocket channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// Notification id
    pub id: String,

    /// Notification kind
    #[serde(rename = "type")]
    pub kind: NotificationKind,

    /// Severity of the underlying event
    pub severity: Severity,

    /// Human-readable message
    pub message: String,

    /// Related incident, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub incident_id: Option<String>,

    /// Whether the notification has been read
    pub read: bool,

    /// When the notification was created
    pub created_at: DateTime<Utc>,
}

/// Subscription plan tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    /// Free tier
    Free,
    /// Team tier
    Team,
    /// Enterprise tier
    Enterprise,
    /// Unknown tier from a newer server
    #[serde(other)]
    Unknown,
}

/// The organization's billing subscription
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    /// Plan tier
    pub plan: PlanTier,

    /// Seat count, if the plan is seat-based
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seats: Option<u32>,

    /// Next renewal date
    #[serde(skip_serializing_if = "Option::is_none")]
    pub renews_at: Option<DateTime<Utc>>,
}
