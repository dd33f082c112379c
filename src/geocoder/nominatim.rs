//! OpenStreetMap Nominatim backend.
//!
//! Usage policy: max 1 request per second and an identifying User-Agent,
//! both enforced by the chain and the shared client.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use super::http::{endpoint, get_json, parse_coordinate};
use super::types::{Candidate, GeocodeError, GeocodeQuery, Geocoder};

pub struct Nominatim {
    client: Client,
    search_url: Url,
}

#[derive(Debug, Deserialize)]
struct NominatimPlace {
    display_name: String,
    lat: serde_json::Value,
    lon: serde_json::Value,
    osm_type: Option<String>,
    osm_id: Option<i64>,
    #[serde(default)]
    address: Option<NominatimAddress>,
}

#[derive(Debug, Deserialize)]
struct NominatimAddress {
    country_code: Option<String>,
}

impl Nominatim {
    pub fn new(client: Client, base_url: &str) -> Result<Self, GeocodeError> {
        Ok(Self {
            client,
            search_url: endpoint(base_url, "search")?,
        })
    }

    fn request_url(&self, query: &GeocodeQuery) -> Url {
        let mut url = self.search_url.clone();
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("q", &query.text)
                .append_pair("format", "jsonv2")
                .append_pair("addressdetails", "1")
                .append_pair("limit", "1");
            if let Some(country) = &query.country {
                pairs.append_pair("countrycodes", country);
            }
            if let Some(language) = &query.language {
                pairs.append_pair("accept-language", language);
            }
        }
        url
    }
}

/// Stable place id from the OSM object: `N123`, `W123`, `R123`.
fn osm_place_id(osm_type: Option<&str>, osm_id: Option<i64>) -> Option<String> {
    let id = osm_id?;
    let prefix = match osm_type? {
        "node" | "N" => 'N',
        "way" | "W" => 'W',
        "relation" | "R" => 'R',
        _ => return None,
    };
    Some(format!("{}{}", prefix, id))
}

/// Turn a Nominatim search response (JSON array) into the first candidate.
pub(crate) fn parse_search_response(body: serde_json::Value) -> Result<Option<Candidate>, GeocodeError> {
    let hits = match body {
        serde_json::Value::Array(hits) => hits,
        other => {
            return Err(GeocodeError::InvalidResponse(format!(
                "expected array, got {}",
                other
            )))
        }
    };
    let Some(raw) = hits.into_iter().next() else {
        return Ok(None);
    };

    let place: NominatimPlace = serde_json::from_value(raw.clone())
        .map_err(|e| GeocodeError::InvalidResponse(e.to_string()))?;
    let (Some(lat), Some(lon)) = (parse_coordinate(&place.lat), parse_coordinate(&place.lon)) else {
        return Err(GeocodeError::InvalidResponse(format!(
            "invalid coordinates ({}, {})",
            place.lat, place.lon
        )));
    };

    Ok(Some(Candidate {
        formatted_line: place.display_name,
        lat,
        lon,
        place_id: osm_place_id(place.osm_type.as_deref(), place.osm_id),
        country: place.address.and_then(|a| a.country_code),
        raw: Some(raw),
    }))
}

#[async_trait]
impl Geocoder for Nominatim {
    fn name(&self) -> &str {
        "nominatim"
    }

    async fn geocode(&self, query: &GeocodeQuery) -> Result<Option<Candidate>, GeocodeError> {
        let url = self.request_url(query);
        debug!("Nominatim lookup: {}", query.text);
        let body = get_json(&self.client, url).await?;
        parse_search_response(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    #[test]
    fn test_request_url() {
        let client = super::super::http::build_client("test", Duration::from_secs(1)).unwrap();
        let nominatim = Nominatim::new(client, "https://nominatim.example.org").unwrap();
        let query = GeocodeQuery::new("Cowley Road, Cambridge")
            .with_country(Some("gb"))
            .with_language(Some("en"));
        let url = nominatim.request_url(&query);
        assert_eq!(url.path(), "/search");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("q".into(), "Cowley Road, Cambridge".into())));
        assert!(pairs.contains(&("countrycodes".into(), "gb".into())));
        assert!(pairs.contains(&("accept-language".into(), "en".into())));
    }

    #[test]
    fn test_parse_hit() {
        let body = json!([{
            "place_id": 123,
            "osm_type": "way",
            "osm_id": 147396531,
            "lat": "52.2197",
            "lon": "0.1406",
            "display_name": "Cowley Road, Chesterton, Cambridge, CB4 0WS, United Kingdom",
            "address": {"country_code": "gb", "city": "Cambridge"}
        }]);
        let candidate = parse_search_response(body).unwrap().unwrap();
        assert_eq!(candidate.place_id.as_deref(), Some("W147396531"));
        assert_eq!(candidate.country.as_deref(), Some("gb"));
        assert_eq!(candidate.lat, 52.2197);
        assert!(candidate.raw.is_some());
    }

    #[test]
    fn test_parse_empty_and_invalid() {
        assert_eq!(parse_search_response(json!([])).unwrap(), None);
        assert!(parse_search_response(json!({"error": "x"})).is_err());
        assert!(parse_search_response(json!([{"display_name": "x", "lat": "a", "lon": "b"}])).is_err());
    }
}
