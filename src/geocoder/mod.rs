pub mod arcgis;
pub mod chain;
pub mod http;
pub mod nominatim;
pub mod types;

#[cfg(test)]
pub(crate) mod mock;

pub use arcgis::ArcGis;
pub use chain::{AttemptReport, ChainHit, ChainReport, ChainSettings, GeocoderChain};
pub use nominatim::Nominatim;
pub use types::{AttemptOutcome, Candidate, GeocodeError, GeocodeQuery, Geocoder, GeocoderKind};

use std::sync::Arc;
use tracing::info;

use crate::config::Config;

/// Instantiate the configured backends, in preference order, sharing one
/// HTTP client.
pub fn build_geocoders(
    kinds: &[GeocoderKind],
    config: &Config,
) -> Result<Vec<Arc<dyn Geocoder>>, GeocodeError> {
    let client = http::build_client(&config.user_agent, config.timeout())?;
    let mut geocoders: Vec<Arc<dyn Geocoder>> = Vec::with_capacity(kinds.len());

    for kind in kinds {
        let geocoder: Arc<dyn Geocoder> = match kind {
            GeocoderKind::Nominatim => Arc::new(Nominatim::new(client.clone(), &config.nominatim.url)?),
            GeocoderKind::Arcgis => Arc::new(ArcGis::new(
                client.clone(),
                &config.arcgis.url,
                config.arcgis.api_key.clone(),
            )?),
        };
        geocoders.push(geocoder);
    }

    info!(
        "Geocoders: {}",
        kinds.iter().map(|k| k.as_str()).collect::<Vec<_>>().join(", ")
    );
    Ok(geocoders)
}

/// Chain over the configured backends.
pub fn build_chain(kinds: &[GeocoderKind], config: &Config) -> crate::error::Result<GeocoderChain> {
    let settings = ChainSettings::from_config(config)?;
    let geocoders = build_geocoders(kinds, config)?;
    Ok(GeocoderChain::new(geocoders, settings))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_in_order() {
        let config = Config::default();
        let geocoders =
            build_geocoders(&[GeocoderKind::Arcgis, GeocoderKind::Nominatim], &config).unwrap();
        let names: Vec<&str> = geocoders.iter().map(|g| g.name()).collect();
        assert_eq!(names, vec!["arcgis", "nominatim"]);
    }

    #[test]
    fn test_bad_endpoint_is_rejected() {
        let mut config = Config::default();
        config.nominatim.url = "not a url".to_string();
        assert!(build_geocoders(&[GeocoderKind::Nominatim], &config).is_err());
    }
}
