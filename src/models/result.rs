//! Geocoding result, the persisted unit of work.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::address::{Address, AddressComponents};
use super::entity::{Entity, ADDRESS_SCHEMA};
use super::region::RegionPath;
use crate::country::country_code;
use crate::error::{Error, Result};
use crate::geocoder::Candidate;
use crate::normalize::{derive_key, fingerprint, namespaced_fingerprint, normalize};
use crate::regions::RegionResolver;

/// How `canonical_id` is derived.
///
/// Both schemes exist in cached data, so neither is assumed canonical; the
/// active one is configuration and `ensure_canonical_id` migrates entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum IdentityScheme {
    /// `addr-{provider}-{place id}`
    #[default]
    ProviderId,
    /// `addr-{country}-{hash of normalized components}`
    ComponentHash,
}

/// Short provenance prefix used in provider-based ids.
pub fn provider_prefix(geocoder: &str) -> &str {
    match geocoder {
        "nominatim" => "osm",
        other => other,
    }
}

/// `addr-{cc}-{fingerprint}` of the input line. Pure function of the
/// normalized line and country.
pub fn make_address_id(original_line: &str, country: Option<&str>) -> Option<String> {
    namespaced_fingerprint(original_line, country).map(|fp| format!("addr-{}", fp))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeocodingResult {
    pub address_id: String,
    pub canonical_id: String,
    pub original_line: String,
    pub result_line: String,
    /// Lowercase ISO alpha-2, empty when unknown
    #[serde(default)]
    pub country: String,
    #[serde(alias = "latitude")]
    pub lat: f64,
    #[serde(alias = "longitude")]
    pub lon: f64,
    pub geocoder: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geocoder_place_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geocoder_raw: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub components: Option<AddressComponents>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<RegionPath>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_key: Option<String>,
    pub ts: DateTime<Utc>,
}

impl GeocodingResult {
    /// Build a result from a geocoder candidate.
    pub fn from_candidate(
        address: &Address,
        candidate: Candidate,
        geocoder: &str,
        scheme: IdentityScheme,
    ) -> Result<Self> {
        let country = address
            .country()
            .or_else(|| candidate.country.as_deref().and_then(country_code))
            .unwrap_or_default()
            .to_string();

        // hint only, as in the cache key
        let address_id = make_address_id(&address.original_line, address.country.as_deref())
            .ok_or_else(|| Error::Input("empty address line".to_string()))?;

        let mut result = Self {
            address_id,
            canonical_id: String::new(),
            original_line: address.original_line.clone(),
            result_line: candidate.formatted_line,
            country,
            lat: candidate.lat,
            lon: candidate.lon,
            geocoder: geocoder.to_string(),
            geocoder_place_id: candidate.place_id,
            geocoder_raw: candidate.raw,
            components: address.components.clone(),
            region: None,
            cache_key: None,
            ts: Utc::now(),
        };
        result.canonical_id = result.compute_canonical_id(scheme);
        Ok(result)
    }

    pub fn compute_canonical_id(&self, scheme: IdentityScheme) -> String {
        match (scheme, self.geocoder_place_id.as_deref()) {
            (IdentityScheme::ProviderId, Some(place_id)) if !normalize(place_id).is_empty() => {
                format!(
                    "addr-{}-{}",
                    provider_prefix(&self.geocoder),
                    normalize(place_id).replace(' ', "-")
                )
            }
            _ => self.component_hash_id(),
        }
    }

    fn component_hash_id(&self) -> String {
        let identity = match &self.components {
            Some(c) if !c.is_empty() => c.identity_string(),
            _ => normalize(&self.result_line),
        };
        let fp = fingerprint(&identity);
        if self.country.is_empty() {
            format!("addr-{}", fp)
        } else {
            format!("addr-{}-{}", self.country, fp)
        }
    }

    /// Recompute `canonical_id` with the given scheme. Returns whether it changed.
    pub fn ensure_canonical_id(&mut self, scheme: IdentityScheme) -> bool {
        let id = self.compute_canonical_id(scheme);
        if id == self.canonical_id {
            return false;
        }
        self.canonical_id = id;
        true
    }

    /// Derive `cache_key` when it is not already set.
    pub fn apply_cache_key(&mut self, prefix: &str) -> Option<&str> {
        if self.cache_key.is_none() {
            let country = (!self.country.is_empty()).then_some(self.country.as_str());
            self.cache_key = derive_key(&self.original_line, country, true, prefix);
        }
        self.cache_key.as_deref()
    }

    /// Look up region codes for the result's coordinates. Returns whether the
    /// stored region changed.
    pub fn apply_region(&mut self, resolver: &RegionResolver) -> bool {
        let region = resolver.resolve(self.lon, self.lat);
        if region == self.region {
            return false;
        }
        self.region = region;
        true
    }

    /// Whether this result carries an actual answer worth persisting.
    pub fn is_storable(&self) -> bool {
        !self.address_id.is_empty()
            && !self.result_line.trim().is_empty()
            && self.lat.is_finite()
            && self.lon.is_finite()
    }

    pub fn to_row(&self) -> ResultRow {
        let region = self.region.as_ref();
        let id = |level: u8| region.and_then(|r| r.get(level)).map(|e| e.code.clone());
        let name = |level: u8| {
            region
                .and_then(|r| r.get(level))
                .map(|e| e.name.clone())
                .filter(|n| !n.is_empty())
        };
        ResultRow {
            cache_key: self.cache_key.clone(),
            address_id: self.address_id.clone(),
            canonical_id: self.canonical_id.clone(),
            original_line: self.original_line.clone(),
            result_line: self.result_line.clone(),
            country: self.country.clone(),
            lat: self.lat,
            lon: self.lon,
            geocoder: self.geocoder.clone(),
            geocoder_place_id: self.geocoder_place_id.clone(),
            geocoder_raw: self.geocoder_raw.as_ref().map(|v| v.to_string()),
            nuts0_id: id(0),
            nuts0: name(0),
            nuts1_id: id(1),
            nuts1: name(1),
            nuts2_id: id(2),
            nuts2: name(2),
            nuts3_id: id(3),
            nuts3: name(3),
            ts: Some(self.ts),
        }
    }

    pub fn from_row(row: ResultRow) -> Result<Self> {
        if row.address_id.trim().is_empty() {
            return Err(Error::Input("missing address_id".to_string()));
        }
        let geocoder_raw = match row.geocoder_raw.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => Some(
                serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string())),
            ),
            _ => None,
        };
        let region = RegionPath::from_codes([
            (0, row.nuts0_id),
            (1, row.nuts1_id),
            (2, row.nuts2_id),
            (3, row.nuts3_id),
        ])
        .map(|mut path| {
            for (level, name) in [(0u8, row.nuts0), (1, row.nuts1), (2, row.nuts2), (3, row.nuts3)] {
                if let (Some(entry), Some(name)) =
                    (path.entries.iter_mut().find(|e| e.level == level), name)
                {
                    entry.name = name;
                }
            }
            path
        });
        let country = country_code(&row.country)
            .map(str::to_string)
            .unwrap_or_else(|| row.country.trim().to_lowercase());

        Ok(Self {
            address_id: row.address_id,
            canonical_id: row.canonical_id,
            original_line: row.original_line,
            result_line: row.result_line,
            country,
            lat: row.lat,
            lon: row.lon,
            geocoder: row.geocoder,
            geocoder_place_id: row.geocoder_place_id.filter(|s| !s.trim().is_empty()),
            geocoder_raw,
            components: None,
            region,
            cache_key: row.cache_key.filter(|s| !s.trim().is_empty()),
            ts: row.ts.unwrap_or_else(Utc::now),
        })
    }

    /// Graph-entity encoding: an `Address` entity identified by `canonical_id`.
    pub fn to_entity(&self) -> Entity {
        let mut entity = Entity::new(self.canonical_id.clone(), ADDRESS_SCHEMA);
        entity.add("full", self.result_line.clone());
        entity.add("country", self.country.clone());
        entity.add("latitude", self.lat.to_string());
        entity.add("longitude", self.lon.to_string());
        if let Some(c) = &self.components {
            if let Some(street) = c.street() {
                entity.add("street", street);
            }
            if let Some(city) = &c.city {
                entity.add("city", city.clone());
            }
            if let Some(postcode) = &c.postcode {
                entity.add("postalCode", postcode.clone());
            }
            if let Some(state) = &c.state {
                entity.add("state", state.clone());
            }
            for remark in &c.remarks {
                entity.add("remarks", remark.clone());
            }
        }
        if let Some(region) = self.region.as_ref().and_then(|r| r.deepest()) {
            if !region.name.is_empty() {
                entity.add("region", region.name.clone());
            }
        }
        if let Some(place_id) = &self.geocoder_place_id {
            match self.geocoder.as_str() {
                "nominatim" => entity.add("osmId", place_id.clone()),
                "google" => entity.add("googlePlaceId", place_id.clone()),
                _ => {}
            }
        }
        entity
    }
}

/// Flat tabular encoding of a [`GeocodingResult`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultRow {
    #[serde(default)]
    pub cache_key: Option<String>,
    pub address_id: String,
    pub canonical_id: String,
    pub original_line: String,
    pub result_line: String,
    #[serde(default)]
    pub country: String,
    pub lat: f64,
    pub lon: f64,
    pub geocoder: String,
    #[serde(default)]
    pub geocoder_place_id: Option<String>,
    #[serde(default)]
    pub geocoder_raw: Option<String>,
    #[serde(default)]
    pub nuts0_id: Option<String>,
    #[serde(default)]
    pub nuts0: Option<String>,
    #[serde(default)]
    pub nuts1_id: Option<String>,
    #[serde(default)]
    pub nuts1: Option<String>,
    #[serde(default)]
    pub nuts2_id: Option<String>,
    #[serde(default)]
    pub nuts2: Option<String>,
    #[serde(default)]
    pub nuts3_id: Option<String>,
    #[serde(default)]
    pub nuts3: Option<String>,
    #[serde(default)]
    pub ts: Option<DateTime<Utc>>,
}

impl ResultRow {
    /// Ordered `(column, value)` pairs. `geocoder_raw` is only included on
    /// request (cache exports); pipeline output leaves it out.
    pub fn fields(&self, include_raw: bool) -> Vec<(String, String)> {
        let opt = |v: &Option<String>| v.clone().unwrap_or_default();
        let mut fields = vec![
            ("cache_key".into(), opt(&self.cache_key)),
            ("address_id".into(), self.address_id.clone()),
            ("canonical_id".into(), self.canonical_id.clone()),
            ("original_line".into(), self.original_line.clone()),
            ("result_line".into(), self.result_line.clone()),
            ("country".into(), self.country.clone()),
            ("lat".into(), self.lat.to_string()),
            ("lon".into(), self.lon.to_string()),
            ("geocoder".into(), self.geocoder.clone()),
            ("geocoder_place_id".into(), opt(&self.geocoder_place_id)),
            ("nuts0_id".into(), opt(&self.nuts0_id)),
            ("nuts0".into(), opt(&self.nuts0)),
            ("nuts1_id".into(), opt(&self.nuts1_id)),
            ("nuts1".into(), opt(&self.nuts1)),
            ("nuts2_id".into(), opt(&self.nuts2_id)),
            ("nuts2".into(), opt(&self.nuts2)),
            ("nuts3_id".into(), opt(&self.nuts3_id)),
            ("nuts3".into(), opt(&self.nuts3)),
            (
                "ts".into(),
                self.ts.map(|ts| ts.to_rfc3339()).unwrap_or_default(),
            ),
        ];
        if include_raw {
            fields.insert(10, ("geocoder_raw".into(), opt(&self.geocoder_raw)));
        }
        fields
    }
}
