//! Runtime configuration.
//!
//! Loaded from an optional TOML file, then overridden by `ADDRGEO_*`
//! environment variables. Every field has a default so an empty file (or no
//! file at all) is a valid configuration.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::geocoder::GeocoderKind;
use crate::models::IdentityScheme;

const ENV_PREFIX: &str = "ADDRGEO_";

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct Config {
    pub user_agent: String,
    /// HTTP timeout for geocoder requests, in seconds
    pub default_timeout: u64,
    /// Minimum delay between two calls to the same geocoder
    pub min_delay_seconds: f64,
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    /// Geocoders in preference order
    pub geocoders: Vec<GeocoderKind>,
    pub identity_scheme: IdentityScheme,
    pub cache: CacheConfig,
    pub regions: RegionConfig,
    pub nominatim: EndpointConfig,
    pub arcgis: EndpointConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct CacheConfig {
    /// `memory:` or a sled database path (optionally `sled://` prefixed),
    /// relative paths resolve against the working directory
    pub uri: String,
    pub prefix: String,
    pub bulk_batch_size: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct RegionConfig {
    pub boundary_data: PathBuf,
    pub memo_capacity: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EndpointConfig {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            user_agent: format!("addrgeo v{}", env!("CARGO_PKG_VERSION")),
            default_timeout: 10,
            min_delay_seconds: 0.5,
            max_retries: 5,
            backoff_base_ms: 1000,
            backoff_max_ms: 30_000,
            geocoders: vec![GeocoderKind::Nominatim],
            identity_scheme: IdentityScheme::default(),
            cache: CacheConfig::default(),
            regions: RegionConfig::default(),
            nominatim: EndpointConfig {
                url: "https://nominatim.openstreetmap.org".to_string(),
                api_key: None,
            },
            arcgis: EndpointConfig {
                url: "https://geocode.arcgis.com/arcgis/rest/services/World/GeocodeServer"
                    .to_string(),
                api_key: None,
            },
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            uri: "sled://addrgeo-cache".to_string(),
            prefix: "addrgeo".to_string(),
            bulk_batch_size: 1000,
        }
    }
}

impl Default for RegionConfig {
    fn default() -> Self {
        Self {
            boundary_data: PathBuf::from("NUTS_RG_01M_2021_4326.geojson"),
            memo_capacity: 1_000_000,
        }
    }
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            api_key: None,
        }
    }
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load the file (if any) and apply environment overrides on top.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load_from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply `ADDRGEO_*` overrides. The lookup is injected for testability.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));

        if let Some(v) = var("USER_AGENT") {
            self.user_agent = v;
        }
        if let Some(v) = var("CACHE_URI") {
            self.cache.uri = v;
        }
        if let Some(v) = var("CACHE_PREFIX") {
            self.cache.prefix = v;
        }
        if let Some(v) = var("BOUNDARY_DATA") {
            self.regions.boundary_data = PathBuf::from(v);
        }
        if let Some(v) = var("DEFAULT_TIMEOUT") {
            self.default_timeout = parse_env("DEFAULT_TIMEOUT", &v)?;
        }
        if let Some(v) = var("MIN_DELAY_SECONDS") {
            self.min_delay_seconds = parse_env("MIN_DELAY_SECONDS", &v)?;
        }
        if let Some(v) = var("MAX_RETRIES") {
            self.max_retries = parse_env("MAX_RETRIES", &v)?;
        }
        if let Some(v) = var("GEOCODERS") {
            self.geocoders = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| {
                    s.parse::<GeocoderKind>().map_err(|_| {
                        Error::Config(format!("{}GEOCODERS: unknown geocoder '{}'", ENV_PREFIX, s))
                    })
                })
                .collect::<Result<Vec<_>>>()?;
        }
        if let Some(v) = var("NOMINATIM_URL") {
            self.nominatim.url = v;
        }
        if let Some(v) = var("ARCGIS_URL") {
            self.arcgis.url = v;
        }
        if let Some(v) = var("ARCGIS_API_KEY") {
            self.arcgis.api_key = Some(v);
        }

        self.validate()
    }

    pub fn validate(&self) -> Result<()> {
        self.min_delay()?;
        if self.cache.prefix.is_empty() || self.cache.prefix.contains('/') {
            return Err(Error::Config(format!(
                "cache prefix must be non-empty and must not contain '/', got '{}'",
                self.cache.prefix
            )));
        }
        if self.cache.bulk_batch_size == 0 {
            return Err(Error::Config("cache.bulk_batch_size must be > 0".to_string()));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout)
    }

    pub fn min_delay(&self) -> Result<Duration> {
        Duration::try_from_secs_f64(self.min_delay_seconds).map_err(|e| {
            Error::Config(format!(
                "min_delay_seconds must be a non-negative number of seconds, got {}: {}",
                self.min_delay_seconds, e
            ))
        })
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        Error::Config(format!(
            "{}{}: invalid value '{}'",
            ENV_PREFIX, name, value
        ))
    })
}
