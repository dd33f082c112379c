//! Shared HTTP plumbing for geocoder backends.

use reqwest::{Client, StatusCode};
use std::time::Duration;
use url::Url;

use super::types::GeocodeError;

/// Build the HTTP client shared by all backends.
pub fn build_client(user_agent: &str, timeout: Duration) -> Result<Client, GeocodeError> {
    Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .build()
        .map_err(|e| GeocodeError::Rejected(format!("Failed to create HTTP client: {}", e)))
}

/// Parse a configured endpoint and append a path segment.
pub fn endpoint(base: &str, path: &str) -> Result<Url, GeocodeError> {
    let url = format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'));
    Url::parse(&url).map_err(|e| GeocodeError::Rejected(format!("invalid endpoint '{}': {}", url, e)))
}

/// Map a non-success HTTP status to a geocoder error. `None` for success.
pub fn classify_status(status: StatusCode) -> Option<GeocodeError> {
    if status.is_success() {
        return None;
    }
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Some(GeocodeError::RateLimited);
    }
    if status.is_server_error() || status == StatusCode::REQUEST_TIMEOUT {
        return Some(GeocodeError::Transient(format!("HTTP {}", status)));
    }
    Some(GeocodeError::Rejected(format!("HTTP {}", status)))
}

impl From<reqwest::Error> for GeocodeError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() || e.is_connect() || e.is_request() {
            GeocodeError::Transient(e.to_string())
        } else if e.is_decode() {
            GeocodeError::InvalidResponse(e.to_string())
        } else if let Some(status) = e.status() {
            classify_status(status).unwrap_or_else(|| GeocodeError::Transient(e.to_string()))
        } else {
            GeocodeError::Transient(e.to_string())
        }
    }
}

/// GET a URL and decode its JSON body.
pub async fn get_json(client: &Client, url: Url) -> Result<serde_json::Value, GeocodeError> {
    let response = client.get(url).send().await?;
    if let Some(err) = classify_status(response.status()) {
        return Err(err);
    }
    let body = response.bytes().await?;
    serde_json::from_slice(&body).map_err(|e| GeocodeError::InvalidResponse(e.to_string()))
}

/// Coordinates arrive as numbers or numeric strings depending on the backend.
pub fn parse_coordinate(value: &serde_json::Value) -> Option<f64> {
    let v = match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }?;
    v.is_finite().then_some(v)
}
