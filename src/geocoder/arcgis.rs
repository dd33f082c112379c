//! ArcGIS World Geocoding Service backend.

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;
use url::Url;

use super::http::{endpoint, get_json, parse_coordinate};
use super::types::{Candidate, GeocodeError, GeocodeQuery, Geocoder};

pub struct ArcGis {
    client: Client,
    find_url: Url,
    api_key: Option<String>,
}

impl ArcGis {
    pub fn new(client: Client, base_url: &str, api_key: Option<String>) -> Result<Self, GeocodeError> {
        Ok(Self {
            client,
            find_url: endpoint(base_url, "findAddressCandidates")?,
            api_key,
        })
    }

    fn request_url(&self, query: &GeocodeQuery) -> Url {
        let mut url = self.find_url.clone();
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("SingleLine", &query.text)
                .append_pair("f", "json")
                .append_pair("maxLocations", "1")
                .append_pair("outFields", "*");
            if let Some(country) = &query.country {
                pairs.append_pair("sourceCountry", &country.to_uppercase());
            }
            if let Some(language) = &query.language {
                pairs.append_pair("langCode", language);
            }
            if let Some(key) = &self.api_key {
                pairs.append_pair("token", key);
            }
        }
        url
    }
}

/// ArcGIS reports errors in a 200 body: `{"error": {"code": 498, ...}}`.
fn body_error(body: &serde_json::Value) -> Option<GeocodeError> {
    let error = body.get("error")?;
    let code = error.get("code").and_then(|c| c.as_u64()).unwrap_or(0);
    let message = error
        .get("message")
        .and_then(|m| m.as_str())
        .unwrap_or("unknown error")
        .to_string();
    Some(match code {
        429 => GeocodeError::RateLimited,
        500..=599 => GeocodeError::Transient(format!("{}: {}", code, message)),
        _ => GeocodeError::Rejected(format!("{}: {}", code, message)),
    })
}

pub(crate) fn parse_find_response(body: serde_json::Value) -> Result<Option<Candidate>, GeocodeError> {
    if let Some(err) = body_error(&body) {
        return Err(err);
    }
    let candidates = body
        .get("candidates")
        .and_then(|c| c.as_array())
        .ok_or_else(|| GeocodeError::InvalidResponse("missing candidates".to_string()))?;
    let Some(raw) = candidates.first() else {
        return Ok(None);
    };

    let formatted_line = raw
        .get("address")
        .and_then(|a| a.as_str())
        .filter(|a| !a.trim().is_empty())
        .ok_or_else(|| GeocodeError::InvalidResponse("candidate without address".to_string()))?
        .to_string();
    let location = raw
        .get("location")
        .ok_or_else(|| GeocodeError::InvalidResponse("candidate without location".to_string()))?;
    let (Some(lon), Some(lat)) = (
        location.get("x").and_then(parse_coordinate),
        location.get("y").and_then(parse_coordinate),
    ) else {
        return Err(GeocodeError::InvalidResponse(format!("invalid location {}", location)));
    };

    let attributes = raw.get("attributes");
    let country = attributes
        .and_then(|a| a.get("Country"))
        .and_then(|c| c.as_str())
        .filter(|c| !c.is_empty())
        .map(str::to_string);

    Ok(Some(Candidate {
        formatted_line,
        lat,
        lon,
        // ArcGIS has no stable place identifiers
        place_id: None,
        country,
        raw: Some(raw.clone()),
    }))
}

#[async_trait]
impl Geocoder for ArcGis {
    fn name(&self) -> &str {
        "arcgis"
    }

    async fn geocode(&self, query: &GeocodeQuery) -> Result<Option<Candidate>, GeocodeError> {
        let url = self.request_url(query);
        debug!("ArcGIS lookup: {}", query.text);
        let body = get_json(&self.client, url).await?;
        parse_find_response(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_candidate() {
        let body = json!({
            "spatialReference": {"wkid": 4326},
            "candidates": [{
                "address": "251 Little Falls Dr, Wilmington, Delaware, 19808",
                "location": {"x": -75.6896, "y": 39.7394},
                "score": 100,
                "attributes": {"Country": "USA"}
            }]
        });
        let candidate = parse_find_response(body).unwrap().unwrap();
        assert_eq!(candidate.lon, -75.6896);
        assert_eq!(candidate.lat, 39.7394);
        assert_eq!(candidate.country.as_deref(), Some("USA"));
        assert_eq!(candidate.place_id, None);
    }

    #[test]
    fn test_parse_empty() {
        assert_eq!(parse_find_response(json!({"candidates": []})).unwrap(), None);
    }

    #[test]
    fn test_body_errors() {
        assert_eq!(
            parse_find_response(json!({"error": {"code": 429, "message": "quota"}})),
            Err(GeocodeError::RateLimited)
        );
        assert!(matches!(
            parse_find_response(json!({"error": {"code": 498, "message": "Invalid token"}})),
            Err(GeocodeError::Rejected(_))
        ));
        assert!(matches!(
            parse_find_response(json!({"error": {"code": 503}})),
            Err(GeocodeError::Transient(_))
        ));
    }
}
