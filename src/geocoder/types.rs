//! Geocoder capability and shared types.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A single geocoding request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeocodeQuery {
    pub text: String,
    /// Lowercase ISO alpha-2
    pub country: Option<String>,
    pub language: Option<String>,
}

impl GeocodeQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn with_country(mut self, country: Option<&str>) -> Self {
        self.country = country.map(str::to_string);
        self
    }

    pub fn with_language(mut self, language: Option<&str>) -> Self {
        self.language = language.map(str::to_string);
        self
    }
}

/// The best match a backend found for a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub formatted_line: String,
    pub lat: f64,
    pub lon: f64,
    pub place_id: Option<String>,
    /// Country as reported by the backend (code or name)
    pub country: Option<String>,
    pub raw: Option<serde_json::Value>,
}

/// Errors a backend can report for one call.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeocodeError {
    /// HTTP 429 or provider quota signal
    #[error("rate limited")]
    RateLimited,

    /// 5xx, timeouts, connection failures
    #[error("transient failure: {0}")]
    Transient(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Request refused for a reason retrying will not fix (4xx, bad key)
    #[error("request rejected: {0}")]
    Rejected(String),
}

impl GeocodeError {
    /// Whether retrying the same call may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, GeocodeError::RateLimited | GeocodeError::Transient(_))
    }
}

/// Outcome of one attempt against one backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    Empty,
    RateLimited,
    Error,
}

impl AttemptOutcome {
    pub fn of(result: &Result<Option<Candidate>, GeocodeError>) -> Self {
        match result {
            Ok(Some(_)) => AttemptOutcome::Success,
            Ok(None) => AttemptOutcome::Empty,
            Err(GeocodeError::RateLimited) => AttemptOutcome::RateLimited,
            Err(_) => AttemptOutcome::Error,
        }
    }
}

/// Backend adapter capability.
#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Name recorded as `geocoder` on results
    fn name(&self) -> &str;

    /// Provenance prefix for provider-based canonical ids
    fn id_prefix(&self) -> &str {
        crate::models::provider_prefix(self.name())
    }

    /// `Ok(None)` means the backend answered but found nothing.
    async fn geocode(&self, query: &GeocodeQuery) -> Result<Option<Candidate>, GeocodeError>;
}

/// Built-in backends, selectable from configuration.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum GeocoderKind {
    Nominatim,
    Arcgis,
}

impl GeocoderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GeocoderKind::Nominatim => "nominatim",
            GeocoderKind::Arcgis => "arcgis",
        }
    }
}

impl fmt::Display for GeocoderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GeocoderKind {
    type Err = GeocodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "nominatim" => Ok(GeocoderKind::Nominatim),
            "arcgis" => Ok(GeocoderKind::Arcgis),
            other => Err(GeocodeError::Rejected(format!("unknown geocoder '{}'", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_classification() {
        let c = Candidate {
            formatted_line: "x".into(),
            lat: 0.0,
            lon: 0.0,
            place_id: None,
            country: None,
            raw: None,
        };
        assert_eq!(AttemptOutcome::of(&Ok(Some(c))), AttemptOutcome::Success);
        assert_eq!(AttemptOutcome::of(&Ok(None)), AttemptOutcome::Empty);
        assert_eq!(
            AttemptOutcome::of(&Err(GeocodeError::RateLimited)),
            AttemptOutcome::RateLimited
        );
        assert_eq!(
            AttemptOutcome::of(&Err(GeocodeError::Transient("502".into()))),
            AttemptOutcome::Error
        );
    }

    #[test]
    fn test_retryable() {
        assert!(GeocodeError::RateLimited.is_retryable());
        assert!(GeocodeError::Transient("timeout".into()).is_retryable());
        assert!(!GeocodeError::Rejected("403".into()).is_retryable());
        assert!(!GeocodeError::InvalidResponse("bad json".into()).is_retryable());
    }

    #[test]
    fn test_kind_parse() {
        assert_eq!("Nominatim".parse::<GeocoderKind>(), Ok(GeocoderKind::Nominatim));
        assert_eq!(GeocoderKind::Arcgis.to_string(), "arcgis");
        assert!("bing".parse::<GeocoderKind>().is_err());
    }
}
