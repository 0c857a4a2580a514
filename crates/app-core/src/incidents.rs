//! Incident service
//!
//! Listing, filtering, and lifecycle transitions for incidents. All
//! calls go through the shared agent so the token lifecycle is handled
//! in one place.

use api_client::agent::{AgentError, ApiAgent};
use api_client::rest::ApiRequest;
use api_client::types::{Incident, IncidentStatus, Severity};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur during incident operations
#[derive(Debug, Error)]
pub enum IncidentError {
    /// Agent error
    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),
}

/// Result type for incident operations
pub type Result<T> = std::result::Result<T, IncidentError>;

/// Filter for listing incidents
#[derive(Debug, Clone, Default)]
pub struct IncidentFilter {
    /// Only incidents with this status
    pub status: Option<IncidentStatus>,
    /// Only incidents at or above this severity
    pub min_severity: Option<Severity>,
    /// Pagination cursor from a previous page
    pub cursor: Option<String>,
    /// Page size
    pub limit: Option<u32>,
}

impl IncidentFilter {
    /// Filter by status
    pub fn with_status(mut self, status: IncidentStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Filter by minimum severity
    pub fn with_min_severity(mut self, severity: Severity) -> Self {
        self.min_severity = Some(severity);
        self
    }

    /// Set the pagination cursor
    pub fn with_cursor(mut self, cursor: impl Into<String>) -> Self {
        self.cursor = Some(cursor.into());
        self
    }

    /// Set the page size
    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    fn apply(&self, mut request: ApiRequest) -> ApiRequest {
        if let Some(status) = self.status {
            request = request.param("status", status.as_str());
        }
        if let Some(severity) = self.min_severity {
            request = request.param("minSeverity", severity.as_str());
        }
        if let Some(ref cursor) = self.cursor {
            request = request.param("cursor", cursor.clone());
        }
        if let Some(limit) = self.limit {
            request = request.param("limit", limit.to_string());
        }
        request
    }
}

/// One page of incidents
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentPage {
    /// Incidents in this page
    pub incidents: Vec<Incident>,
    /// Cursor for the next page, if any
    pub cursor: Option<String>,
}

/// Parameters for reporting a new incident
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewIncident {
    /// Short summary
    pub title: String,
    /// Longer description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Severity
    pub severity: Severity,
}

#[derive(Debug, Serialize)]
struct StatusUpdate {
    status: IncidentStatus,
}

/// Incident service backing the incident list and detail screens
pub struct IncidentService {
    agent: Arc<ApiAgent>,
}

impl IncidentService {
    /// Create an incident service over the given agent
    pub fn new(agent: Arc<ApiAgent>) -> Self {
        Self { agent }
    }

    /// List incidents matching the filter
    pub async fn list(&self, filter: &IncidentFilter) -> Result<IncidentPage> {
        let request = filter.apply(ApiRequest::get("/incidents"));
        let response = self.agent.execute_authed::<IncidentPage>(request).await?;
        Ok(response.data)
    }

    /// Fetch one incident by id
    pub async fn get(&self, id: &str) -> Result<Incident> {
        Ok(self.agent.get_authed(format!("/incidents/{}", id)).await?)
    }

    /// Report a new incident
    pub async fn create(&self, incident: NewIncident) -> Result<Incident> {
        Ok(self.agent.post_authed("/incidents", &incident).await?)
    }

    /// Take ownership of an incident
    pub async fn acknowledge(&self, id: &str) -> Result<Incident> {
        self.set_status(id, IncidentStatus::Acknowledged).await
    }

    /// Mark an incident resolved
    pub async fn resolve(&self, id: &str) -> Result<Incident> {
        self.set_status(id, IncidentStatus::Resolved).await
    }

    /// Close an incident out
    pub async fn close(&self, id: &str) -> Result<Incident> {
        self.set_status(id, IncidentStatus::Closed).await
    }

    async fn set_status(&self, id: &str, status: IncidentStatus) -> Result<Incident> {
        Ok(self
            .agent
            .patch_authed(format!("/incidents/{}", id), &StatusUpdate { status })
            .await?)
    }
}
