//! REST client implementation
//!
//! Request/response types, error classification, retry with exponential
//! backoff, and the `reqwest`-backed HTTP client that attaches the bearer
//! token to every request.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::time::sleep;

// =============================================================================
// Error Types
// =============================================================================

/// API error with HTTP status, server error code, and message
///
/// Network-level failures (DNS, timeout, connection reset) are reported
/// with status 0.
///
/// # Examples
/// ```
/// use api_client::rest::ApiError;
///
/// let error = ApiError::new(404, "NotFound", "Incident not found");
/// assert_eq!(error.status(), 404);
/// assert!(!error.is_network_error());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    /// HTTP status code
    status: u16,
    /// Error code (e.g., "InvalidRequest", "NotFound")
    code: String,
    /// Human-readable error message
    message: String,
}

impl ApiError {
    /// Create a new API error
    pub fn new(status: u16, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
        }
    }

    /// Get the HTTP status code
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Get the server error code
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Get the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Check if this error represents an authentication failure
    pub fn is_unauthorized(&self) -> bool {
        self.status == 401
    }

    /// Check if this is a transient failure that is worth retrying
    pub fn is_network_error(&self) -> bool {
        matches!(
            self.status,
            0 | 1 | 408 | 425 | 429 | 500 | 502 | 503 | 504 | 522 | 524
        )
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "API error {}: {} - {}",
            self.status, self.code, self.message
        )
    }
}

impl std::error::Error for ApiError {}

/// Standard error response body from the backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Error code
    pub error: String,
    /// Error message
    pub message: String,
}

// =============================================================================
// Request / Response Types
// =============================================================================

/// HTTP method for API requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    /// GET request
    Get,
    /// POST request
    Post,
    /// PATCH request
    Patch,
    /// DELETE request
    Delete,
}

impl HttpMethod {
    /// Method name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }
}

/// A request to an API endpoint
#[derive(Debug, Clone)]
pub struct ApiRequest {
    /// HTTP method
    pub method: HttpMethod,
    /// Endpoint path (e.g., "/auth/login")
    pub path: String,
    /// Query parameters
    pub params: HashMap<String, String>,
    /// Request headers
    pub headers: HashMap<String, String>,
    /// JSON request body
    pub body: Option<Vec<u8>>,
}

impl ApiRequest {
    /// Create a new GET request
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            path: path.into(),
            params: HashMap::new(),
            headers: HashMap::new(),
            body: None,
        }
    }

    /// Create a new POST request
    pub fn post(path: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Post,
            path: path.into(),
            params: HashMap::new(),
            headers: HashMap::new(),
            body: None,
        }
    }

    /// Create a new PATCH request
    pub fn patch(path: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Patch,
            ..Self::get(path)
        }
    }

    /// Create a new DELETE request
    pub fn delete(path: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Delete,
            ..Self::get(path)
        }
    }

    /// Add a query parameter
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Add a header
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Set the request body from a JSON-serializable value
    pub fn json_body<T: Serialize>(mut self, value: &T) -> Result<Self, serde_json::Error> {
        self.body = Some(serde_json::to_vec(value)?);
        Ok(self)
    }
}

/// A typed response from an API endpoint
#[derive(Debug, Clone)]
pub struct ApiResponse<T> {
    /// HTTP status code
    pub status: u16,
    /// Response headers
    pub headers: HashMap<String, String>,
    /// Response data
    pub data: T,
}

impl<T> ApiResponse<T> {
    /// Create a new response
    pub fn new(status: u16, headers: HashMap<String, String>, data: T) -> Self {
        Self {
            status,
            headers,
            data,
        }
    }

    /// Get a header value
    pub fn header(&self, key: &str) -> Option<&String> {
        self.headers.get(key)
    }

    /// Check if the response is successful (2xx status)
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

// =============================================================================
// Client Configuration
// =============================================================================

/// Configuration for the REST client
#[derive(Debug, Clone)]
pub struct RestClientConfig {
    /// Base service URL (e.g., "https://api.opswatch.example")
    pub base_url: String,
    /// Request timeout
    pub timeout: Duration,
    /// User agent string
    pub user_agent: String,
    /// Custom headers to include in all requests
    pub default_headers: HashMap<String, String>,
}

impl Default for RestClientConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.opswatch.example".to_string(),
            timeout: Duration::from_secs(30),
            user_agent: format!("Opswatch/{}", env!("CARGO_PKG_VERSION")),
            default_headers: HashMap::new(),
        }
    }
}

impl RestClientConfig {
    /// Create a new config with a base URL
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    /// Set the timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the user agent
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Add a default header
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.insert(key.into(), value.into());
        self
    }
}

// =============================================================================
// Retry Logic with Exponential Backoff
// =============================================================================

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts
    pub max_retries: usize,
    /// Initial delay between retries
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Backoff multiplier (e.g., 2.0 for exponential backoff)
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Create a new retry configuration
    pub fn new(max_retries: usize) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    /// Set the initial delay
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set the maximum delay
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set the backoff multiplier
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Calculate the delay for a given retry attempt
    pub(crate) fn calculate_delay(&self, attempt: usize) -> Duration {
        let delay_ms = self.initial_delay.as_millis() as f64
            * self.backoff_multiplier.powi(attempt as i32);

        let delay = Duration::from_millis(delay_ms as u64);

        if delay > self.max_delay {
            self.max_delay
        } else {
            delay
        }
    }
}

/// Retry an async operation with a configurable retry policy
///
/// # Arguments
/// * `config` - Retry configuration
/// * `should_retry` - Function to determine if an error should be retried
/// * `operation` - The async operation to retry
pub async fn retry<F, Fut, T, E>(
    config: RetryConfig,
    should_retry: impl Fn(&E) -> bool,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempts = 0;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(err) => {
                attempts += 1;

                if !should_retry(&err) {
                    return Err(err);
                }

                if attempts > config.max_retries {
                    return Err(err);
                }

                let delay = config.calculate_delay(attempts - 1);
                sleep(delay).await;
            }
        }
    }
}

/// Convenience wrapper retrying only transient network errors
pub async fn network_retry<F, Fut, T>(max_retries: usize, operation: F) -> Result<T, ApiError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    let config = RetryConfig::new(max_retries);
    retry(config, |err: &ApiError| err.is_network_error(), operation).await
}

// =============================================================================
// REST Client
// =============================================================================

use reqwest::{Client as ReqwestClient, Response as ReqwestResponse};

/// HTTP client for the incident-management API
///
/// The client holds an optional bearer token behind a shared lock; the
/// session layer swaps it on login, refresh, and logout, and every request
/// issued afterwards carries the new token.
///
/// # Examples
/// ```
/// use api_client::rest::{RestClient, RestClientConfig, ApiRequest};
///
/// async fn example() -> Result<(), Box<dyn std::error::Error>> {
///     let config = RestClientConfig::new("https://api.opswatch.example");
///     let client = RestClient::new(config);
///
///     let request = ApiRequest::get("/incidents").param("status", "open");
///     let response = client.execute::<serde_json::Value>(request).await?;
///
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct RestClient {
    /// HTTP client
    client: ReqwestClient,
    /// Configuration
    config: RestClientConfig,
    /// Current Authorization header value, swapped by the session layer
    auth_header: Arc<RwLock<Option<String>>>,
}

impl RestClient {
    /// Create a new REST client
    pub fn new(config: RestClientConfig) -> Self {
        let client = ReqwestClient::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            config,
            auth_header: Arc::new(RwLock::new(None)),
        }
    }

    /// Install a bearer token, replacing any previous one
    pub fn set_bearer(&self, token: Option<&str>) {
        let mut auth = self.auth_header.write().unwrap();
        *auth = token.map(|t| format!("Bearer {}", t));
    }

    /// Whether a bearer token is currently installed
    pub fn has_bearer(&self) -> bool {
        self.auth_header.read().unwrap().is_some()
    }

    /// Execute a request and deserialize the JSON response
    pub async fn execute<T>(&self, request: ApiRequest) -> Result<ApiResponse<T>, ApiError>
    where
        T: for<'de> Deserialize<'de>,
    {
        let url = format!("{}{}", self.config.base_url, request.path);

        let mut req = match request.method {
            HttpMethod::Get => self.client.get(&url),
            HttpMethod::Post => self.client.post(&url),
            HttpMethod::Patch => self.client.patch(&url),
            HttpMethod::Delete => self.client.delete(&url),
        };

        for (key, value) in &request.params {
            req = req.query(&[(key, value)]);
        }

        for (key, value) in &self.config.default_headers {
            req = req.header(key, value);
        }

        for (key, value) in &request.headers {
            req = req.header(key, value);
        }

        // Per-request Authorization wins over the installed bearer
        if !request.headers.contains_key("Authorization") {
            let auth = self.auth_header.read().unwrap().clone();
            if let Some(auth) = auth {
                req = req.header("Authorization", auth);
            }
        }

        if let Some(body) = &request.body {
            req = req
                .header("Content-Type", "application/json")
                .body(body.clone());
        }

        let response = req
            .send()
            .await
            .map_err(|e| ApiError::new(0, "NetworkError", format!("Request failed: {}", e)))?;

        self.parse_response(response).await
    }

    /// Execute a request, retrying transient failures
    pub async fn execute_with_retry<T>(
        &self,
        request: ApiRequest,
        max_retries: usize,
    ) -> Result<ApiResponse<T>, ApiError>
    where
        T: for<'de> Deserialize<'de>,
    {
        network_retry(max_retries, || self.execute(request.clone())).await
    }

    async fn parse_response<T>(
        &self,
        response: ReqwestResponse,
    ) -> Result<ApiResponse<T>, ApiError>
    where
        T: for<'de> Deserialize<'de>,
    {
        let status = response.status().as_u16();

        let mut headers = HashMap::new();
        for (key, value) in response.headers() {
            if let Ok(value_str) = value.to_str() {
                headers.insert(key.to_string(), value_str.to_string());
            }
        }

        if !response.status().is_success() {
            let error_body = response.text().await.unwrap_or_default();

            if let Ok(body) = serde_json::from_str::<ErrorBody>(&error_body) {
                return Err(ApiError::new(status, body.error, body.message));
            } else {
                return Err(ApiError::new(
                    status,
                    "Unknown",
                    format!("HTTP {}: {}", status, error_body),
                ));
            }
        }

        let body = response
            .text()
            .await
            .map_err(|e| ApiError::new(0, "ParseError", format!("Failed to read response: {}", e)))?;

        // Allow empty 204-style bodies for unit responses
        let data: T = if body.is_empty() {
            serde_json::from_str("null")
                .map_err(|e| ApiError::new(0, "ParseError", format!("Empty response: {}", e)))?
        } else {
            serde_json::from_str(&body)
                .map_err(|e| ApiError::new(0, "ParseError", format!("Failed to parse JSON: {}", e)))?
        };

        Ok(ApiResponse::new(status, headers, data))
    }

    /// Get the client configuration
    pub fn config(&self) -> &RestClientConfig {
        &self.config
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_network() {
        let error = ApiError::new(503, "ServiceUnavailable", "Service is down");
        assert_eq!(error.status(), 503);
        assert_eq!(error.code(), "ServiceUnavailable");
        assert_eq!(error.message(), "Service is down");
        assert!(error.is_network_error());
        assert!(!error.is_unauthorized());
    }

    #[test]
    fn test_api_error_application() {
        let error = ApiError::new(400, "InvalidRequest", "Bad input");
        assert_eq!(error.status(), 400);
        assert!(!error.is_network_error());
    }

    #[test]
    fn test_api_error_unauthorized() {
        let error = ApiError::new(401, "Unauthorized", "Token expired");
        assert!(error.is_unauthorized());
        assert!(!error.is_network_error());
    }

    #[test]
    fn test_request_get_builder() {
        let req = ApiRequest::get("/incidents")
            .param("status", "open")
            .param("severity", "critical")
            .header("X-Client", "web");

        assert_eq!(req.method, HttpMethod::Get);
        assert_eq!(req.path, "/incidents");
        assert_eq!(req.params.get("status"), Some(&"open".to_string()));
        assert_eq!(req.headers.get("X-Client"), Some(&"web".to_string()));
    }

    #[test]
    fn test_request_json_body() {
        #[derive(Serialize)]
        struct Login {
            email: String,
        }

        let req = ApiRequest::post("/auth/login")
            .json_body(&Login { email: "alice@example.com".to_string() })
            .unwrap();

        assert_eq!(req.method, HttpMethod::Post);
        let body_str = String::from_utf8(req.body.unwrap()).unwrap();
        assert!(body_str.contains("alice@example.com"));
    }

    #[test]
    fn test_patch_and_delete_builders() {
        let patch = ApiRequest::patch("/incidents/inc_1");
        assert_eq!(patch.method, HttpMethod::Patch);
        assert_eq!(patch.path, "/incidents/inc_1");

        let delete = ApiRequest::delete("/incidents/inc_1");
        assert_eq!(delete.method, HttpMethod::Delete);
        assert_eq!(delete.path, "/incidents/inc_1");
    }

    #[test]
    fn test_response_helpers() {
        let mut headers = HashMap::new();
        headers.insert("content-type".to_string(), "application/json".to_string());

        let response = ApiResponse::new(200, headers, "data");

        assert!(response.is_success());
        assert_eq!(
            response.header("content-type"),
            Some(&"application/json".to_string())
        );
    }

    #[test]
    fn test_client_config_builder() {
        let config = RestClientConfig::new("https://custom.server")
            .with_timeout(Duration::from_secs(60))
            .with_user_agent("CustomAgent/1.0")
            .with_header("X-Custom", "value");

        assert_eq!(config.base_url, "https://custom.server");
        assert_eq!(config.timeout, Duration::from_secs(60));
        assert_eq!(config.user_agent, "CustomAgent/1.0");
        assert_eq!(
            config.default_headers.get("X-Custom"),
            Some(&"value".to_string())
        );
    }

    #[test]
    fn test_set_bearer() {
        let client = RestClient::new(RestClientConfig::default());
        assert!(!client.has_bearer());

        client.set_bearer(Some("token123"));
        assert!(client.has_bearer());

        client.set_bearer(None);
        assert!(!client.has_bearer());
    }

    #[test]
    fn test_http_method_as_str() {
        assert_eq!(HttpMethod::Get.as_str(), "GET");
        assert_eq!(HttpMethod::Post.as_str(), "POST");
        assert_eq!(HttpMethod::Patch.as_str(), "PATCH");
        assert_eq!(HttpMethod::Delete.as_str(), "DELETE");
    }
}
