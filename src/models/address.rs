//! Address input model.

use serde::{Deserialize, Serialize};

use crate::country::country_code;
use crate::normalize::{clean, normalize};

/// Structured address components, as produced by an address parser.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressComponents {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub house: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub house_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub road: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postcode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    /// Lowercase ISO alpha-2 when resolvable, otherwise as parsed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    /// Parts that could not be classified
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remarks: Vec<String>,
}

impl AddressComponents {
    pub fn is_empty(&self) -> bool {
        self.house.is_none()
            && self.house_number.is_none()
            && self.road.is_none()
            && self.postcode.is_none()
            && self.city.is_none()
            && self.state.is_none()
            && self.country.is_none()
            && self.remarks.is_empty()
    }

    /// `house_number road` as a single street line
    pub fn street(&self) -> Option<String> {
        match (&self.house_number, &self.road) {
            (Some(n), Some(r)) => Some(format!("{} {}", n, r)),
            (None, Some(r)) => Some(r.clone()),
            (Some(n), None) => Some(n.clone()),
            (None, None) => None,
        }
    }

    /// Components in postal order, skipping empty ones
    pub fn parts(&self) -> Vec<&str> {
        let mut parts: Vec<&str> = self.remarks.iter().map(String::as_str).collect();
        for value in [
            &self.house,
            &self.house_number,
            &self.road,
            &self.postcode,
            &self.city,
            &self.state,
            &self.country,
        ]
        .into_iter()
        .flatten()
        {
            parts.push(value.as_str());
        }
        parts
    }

    /// Named component columns, unset ones blank.
    pub fn fields(&self) -> Vec<(String, String)> {
        let opt = |v: &Option<String>| v.clone().unwrap_or_default();
        vec![
            ("house".to_string(), opt(&self.house)),
            ("house_number".to_string(), opt(&self.house_number)),
            ("road".to_string(), opt(&self.road)),
            ("postcode".to_string(), opt(&self.postcode)),
            ("city".to_string(), opt(&self.city)),
            ("state".to_string(), opt(&self.state)),
            ("country".to_string(), opt(&self.country)),
            ("remarks".to_string(), self.remarks.join("; ")),
        ]
    }

    /// Normalized, order-stable representation used for component hashing.
    pub fn identity_string(&self) -> String {
        let country = self
            .country
            .as_deref()
            .map(|c| country_code(c).unwrap_or(c).to_string());
        [
            &self.house,
            &self.house_number,
            &self.road,
            &self.postcode,
            &self.city,
            &self.state,
            &country,
        ]
        .into_iter()
        .map(|v| v.as_deref().map(normalize).unwrap_or_default())
        .collect::<Vec<_>>()
        .join("|")
    }
}

/// An address as handed to the resolver. Built per request, never persisted
/// directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Address {
    pub original_line: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub components: Option<AddressComponents>,
}

impl Address {
    pub fn new(original_line: &str, country: Option<&str>, language: Option<&str>) -> Self {
        Self {
            original_line: clean(original_line),
            country: country.and_then(country_code).map(str::to_string),
            language: language
                .map(|l| l.trim().to_lowercase())
                .filter(|l| !l.is_empty()),
            components: None,
        }
    }

    pub fn with_components(mut self, components: Option<AddressComponents>) -> Self {
        self.components = components.filter(|c| !c.is_empty());
        self
    }

    /// Country hint, falling back to the parsed country component
    pub fn country(&self) -> Option<&str> {
        self.country.as_deref().or_else(|| {
            self.components
                .as_ref()
                .and_then(|c| c.country.as_deref())
                .and_then(country_code)
        })
    }

    /// Components joined in postal order, or the cleaned input line.
    pub fn formatted_line(&self) -> String {
        match &self.components {
            Some(c) => {
                let parts = c.parts();
                if parts.is_empty() {
                    self.original_line.clone()
                } else {
                    parts.join(", ")
                }
            }
            None => self.original_line.clone(),
        }
    }
}
