//! End-to-end resolution against a stub geocoder and a synthetic UK
//! boundary dataset.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use addrgeo::cache::ResultCache;
use addrgeo::geocoder::{Candidate, ChainSettings, GeocodeError, GeocodeQuery, Geocoder, GeocoderChain};
use addrgeo::models::IdentityScheme;
use addrgeo::parser::HeuristicParser;
use addrgeo::regions::dataset::rect;
use addrgeo::regions::{BoundaryDataset, Region, RegionResolver};
use addrgeo::resolve::{Orchestrator, OrchestratorSettings, ResolveOptions};

/// Answers every query like Nominatim answers for Cowley Road.
#[derive(Default)]
struct CowleyRoad {
    calls: AtomicUsize,
}

#[async_trait]
impl Geocoder for CowleyRoad {
    fn name(&self) -> &str {
        "nominatim"
    }

    async fn geocode(&self, _query: &GeocodeQuery) -> Result<Option<Candidate>, GeocodeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Some(Candidate {
            formatted_line: "Cowley Road, Chesterton, Cambridge, Cambridgeshire, England, CB4 0WS, United Kingdom"
                .to_string(),
            lat: 52.2197,
            lon: 0.1406,
            place_id: Some("W147396531".to_string()),
            country: Some("gb".to_string()),
            raw: Some(json!({"osm_type": "way", "osm_id": 147396531})),
        }))
    }
}

fn uk_regions() -> Arc<RegionResolver> {
    let dataset = BoundaryDataset::from_regions(vec![
        Region::new("UK", 0, "United Kingdom", rect(-8.0, 49.0, 2.0, 59.0)),
        Region::new("UKH", 1, "East of England", rect(-1.0, 51.8, 2.0, 53.0)),
        Region::new("UKH1", 2, "East Anglia", rect(-0.5, 52.0, 2.0, 53.0)),
        Region::new("UKH12", 3, "Cambridgeshire CC", rect(-0.5, 52.0, 0.5, 52.7)),
        Region::new("UKI", 1, "London", rect(-0.6, 51.2, 0.4, 51.7)),
        Region::new("UKI3", 2, "Inner London - West", rect(-0.6, 51.2, 0.4, 51.7)),
        Region::new("UKI31", 3, "Camden and City of London", rect(-0.6, 51.2, 0.4, 51.7)),
    ]);
    Arc::new(RegionResolver::new(Arc::new(dataset), 10_000))
}

#[tokio::test]
async fn test_cowley_road_end_to_end() {
    let stub = Arc::new(CowleyRoad::default());
    let chain = GeocoderChain::new(vec![stub.clone() as Arc<dyn Geocoder>], ChainSettings::immediate(0));
    let orchestrator = Orchestrator::new(
        Arc::new(chain),
        Arc::new(ResultCache::in_memory("addrgeo")),
        Some(Arc::new(HeuristicParser)),
        Some(uk_regions()),
        OrchestratorSettings {
            identity_scheme: IdentityScheme::ProviderId,
        },
    );
    let opts = ResolveOptions {
        apply_regions: true,
        ..Default::default()
    };
    let line = "Cowley Road, Cambridge, CB4 0WS, United Kingdom";

    let result = orchestrator
        .resolve_line(line, Some("gb"), None, &opts)
        .await
        .unwrap()
        .expect("address resolves");

    assert_eq!(result.country, "gb");
    assert!(result.result_line.contains("Cambridge"));
    assert_eq!(result.geocoder, "nominatim");
    assert_eq!(result.canonical_id, "addr-osm-w147396531");
    assert!(result.address_id.starts_with("addr-gb-"));

    let region = result.region.as_ref().expect("region applied");
    assert_eq!(region.get(0).map(|e| e.code.as_str()), Some("UK"));
    assert_eq!(region.path(), "UK/UKH/UKH1/UKH12");
    assert_eq!(stub.calls.load(Ordering::SeqCst), 1);

    let again = orchestrator
        .resolve_line(line, Some("gb"), None, &opts)
        .await
        .unwrap()
        .expect("cached");
    assert_eq!(stub.calls.load(Ordering::SeqCst), 1);
    assert_eq!(again, result);

    let entries: Vec<_> = orchestrator.cache().iterate(None).collect();
    assert_eq!(entries.len(), 1);
}

#[tokio::test]
async fn test_cache_only_miss_makes_no_calls() {
    let stub = Arc::new(CowleyRoad::default());
    let chain = GeocoderChain::new(vec![stub.clone() as Arc<dyn Geocoder>], ChainSettings::immediate(0));
    let orchestrator = Orchestrator::new(
        Arc::new(chain),
        Arc::new(ResultCache::in_memory("addrgeo")),
        None,
        None,
        OrchestratorSettings::default(),
    );
    let opts = ResolveOptions {
        cache_only: true,
        ..Default::default()
    };
    let result = orchestrator
        .resolve_line("Cowley Road, Cambridge", Some("gb"), None, &opts)
        .await
        .unwrap();
    assert!(result.is_none());
    assert_eq!(stub.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_region_lookup_outside_dataset() {
    let resolver = uk_regions();
    assert!(resolver.resolve(2.35, 48.85).is_none());
    let london = resolver.resolve(-0.12, 51.5).unwrap();
    assert_eq!(london.path(), "UK/UKI/UKI3/UKI31");
}
