//! Address resolution: cache lookup, parsing, geocoding, region tagging.

use std::sync::Arc;
use tracing::debug;

use crate::cache::ResultCache;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::geocoder::{GeocodeQuery, GeocoderChain};
use crate::models::{Address, AddressComponents, Entity, GeocodingResult, IdentityScheme};
use crate::normalize::derive_key;
use crate::parser::{AddressParser, HeuristicParser};
use crate::regions::RegionResolver;

/// Per-call switches.
#[derive(Debug, Clone, Copy)]
pub struct ResolveOptions {
    pub use_cache: bool,
    /// Never call a geocoder; misses resolve to nothing
    pub cache_only: bool,
    pub apply_regions: bool,
    /// Emit geocoded `Address` entities under their canonical id
    pub rewrite_ids: bool,
    /// Recompute canonical ids of cached results with the active scheme
    pub ensure_ids: bool,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            use_cache: true,
            cache_only: false,
            apply_regions: false,
            rewrite_ids: false,
            ensure_ids: false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct OrchestratorSettings {
    pub identity_scheme: IdentityScheme,
}

impl OrchestratorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            identity_scheme: config.identity_scheme,
        }
    }
}

pub struct Orchestrator {
    chain: Arc<GeocoderChain>,
    cache: Arc<ResultCache>,
    parser: Option<Arc<dyn AddressParser>>,
    resolver: Option<Arc<RegionResolver>>,
    settings: OrchestratorSettings,
}

impl Orchestrator {
    pub fn new(
        chain: Arc<GeocoderChain>,
        cache: Arc<ResultCache>,
        parser: Option<Arc<dyn AddressParser>>,
        resolver: Option<Arc<RegionResolver>>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            chain,
            cache,
            parser,
            resolver,
            settings,
        }
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    fn region_resolver(&self, opts: &ResolveOptions) -> Result<Option<&RegionResolver>> {
        if !opts.apply_regions {
            return Ok(None);
        }
        match &self.resolver {
            Some(resolver) => Ok(Some(resolver)),
            None => Err(Error::Config(
                "region lookup requested but no boundary dataset is loaded".to_string(),
            )),
        }
    }

    /// Resolve one address line. `Ok(None)` means no geocoder found it (or the
    /// cache did not have it in cache-only mode).
    pub async fn resolve_line(
        &self,
        line: &str,
        country: Option<&str>,
        language: Option<&str>,
        opts: &ResolveOptions,
    ) -> Result<Option<GeocodingResult>> {
        let regions = self.region_resolver(opts)?;
        let address = Address::new(line, country, language);
        if address.original_line.is_empty() {
            debug!("Skipping empty address line");
            return Ok(None);
        }
        let scheme = self.settings.identity_scheme;

        let key = derive_key(
            &address.original_line,
            address.country.as_deref(),
            opts.use_cache,
            self.cache.prefix(),
        );

        if let Some(key) = &key {
            if let Some(mut hit) = self.cache.get(key)? {
                debug!("Cache hit {} for '{}'", key, address.original_line);
                let mut changed = false;
                if let Some(regions) = regions {
                    if hit.region.is_none() {
                        changed |= hit.apply_region(regions);
                    }
                }
                if opts.ensure_ids {
                    changed |= hit.ensure_canonical_id(scheme);
                }
                if hit.cache_key.as_deref() != Some(key.as_str()) {
                    hit.cache_key = Some(key.clone());
                    changed = true;
                }
                if changed {
                    self.cache.put(key, &hit)?;
                }
                return Ok(Some(hit));
            }
        }

        if opts.cache_only {
            debug!("Cache miss for '{}' (cache only)", address.original_line);
            return Ok(None);
        }

        let components = self.parser.as_ref().and_then(|p| {
            p.parse(
                &address.original_line,
                address.country.as_deref(),
                address.language.as_deref(),
            )
        });
        let address = address.with_components(components);

        let query = GeocodeQuery::new(address.original_line.clone())
            .with_country(address.country())
            .with_language(address.language.as_deref());

        let Some(hit) = self.chain.geocode(&query).await else {
            return Ok(None);
        };

        let mut result = GeocodingResult::from_candidate(&address, hit.candidate, &hit.geocoder, scheme)?;
        if let Some(regions) = regions {
            result.apply_region(regions);
        }
        if let Some(key) = key {
            result.cache_key = Some(key.clone());
            self.cache.put(&key, &result)?;
        }
        Ok(Some(result))
    }

    /// Geocode the addresses of an entity.
    ///
    /// An `Address` entity is replaced by its geocoded version. Any other
    /// entity with `address` values is returned with `addressEntity` links,
    /// preceded by one `Address` entity per resolved value. Unresolvable
    /// input passes through unchanged.
    pub async fn resolve_entity(&self, entity: &Entity, opts: &ResolveOptions) -> Result<Vec<Entity>> {
        let country = entity.first("country");

        if entity.is_address() {
            let Some(line) = address_line(entity) else {
                return Ok(vec![entity.clone()]);
            };
            return match self.resolve_line(&line, country, None, opts).await? {
                Some(result) => {
                    let mut geocoded = result.to_entity();
                    if !opts.rewrite_ids {
                        geocoded.id = entity.id.clone();
                    }
                    Ok(vec![geocoded])
                }
                None => Ok(vec![entity.clone()]),
            };
        }

        let lines = entity.get("address");
        if lines.is_empty() {
            return Ok(vec![entity.clone()]);
        }

        let mut out = Vec::with_capacity(lines.len() + 1);
        let mut subject = entity.clone();
        for line in lines {
            if let Some(result) = self.resolve_line(line, country, None, opts).await? {
                let address = result.to_entity();
                subject.add("addressEntity", address.id.clone());
                if !out.iter().any(|e: &Entity| e.id == address.id) {
                    out.push(address);
                }
            }
        }
        out.push(subject);
        Ok(out)
    }

    /// Results for the address lines of an entity, in input order.
    /// Unresolvable lines are skipped.
    pub async fn resolve_entity_results(
        &self,
        entity: &Entity,
        opts: &ResolveOptions,
    ) -> Result<Vec<GeocodingResult>> {
        let country = entity.first("country");
        let lines = if entity.is_address() {
            address_line(entity).into_iter().collect()
        } else {
            entity.get("address").to_vec()
        };
        let mut out = Vec::with_capacity(lines.len());
        for line in &lines {
            if let Some(result) = self.resolve_line(line, country, None, opts).await? {
                out.push(result);
            }
        }
        Ok(out)
    }

    fn parser(&self) -> &dyn AddressParser {
        match &self.parser {
            Some(parser) => parser.as_ref(),
            None => &HeuristicParser,
        }
    }

    pub fn format_line(&self, line: &str, country: Option<&str>, language: Option<&str>) -> String {
        self.parser().format_line(line, country, language)
    }

    pub fn parse_components(
        &self,
        line: &str,
        country: Option<&str>,
        language: Option<&str>,
    ) -> Option<AddressComponents> {
        self.parser().parse(line, country, language)
    }
}

/// Line for an `Address` entity: `full`, else its parts joined.
fn address_line(entity: &Entity) -> Option<String> {
    if let Some(full) = entity.first("full") {
        return Some(full.to_string());
    }
    let parts: Vec<&str> = ["street", "postalCode", "city", "region", "state", "country"]
        .iter()
        .filter_map(|p| entity.first(p))
        .collect();
    (!parts.is_empty()).then(|| parts.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geocoder::mock::{candidate, MockGeocoder};
    use crate::geocoder::{ChainSettings, Geocoder};
    use crate::models::ADDRESS_SCHEMA;
    use crate::regions::dataset::rect;
    use crate::regions::{BoundaryDataset, Region};

    const LINE: &str = "Cowley Road, Cambridge, CB4 0WS, United Kingdom";

    fn resolver() -> Arc<RegionResolver> {
        let dataset = BoundaryDataset::from_regions(vec![
            Region::new("UK", 0, "United Kingdom", rect(-8.0, 49.0, 2.0, 59.0)),
            Region::new("UKH", 1, "East of England", rect(-1.0, 51.0, 2.0, 53.0)),
            Region::new("UKH1", 2, "East Anglia", rect(-0.5, 52.0, 2.0, 53.0)),
            Region::new("UKH12", 3, "Cambridgeshire CC", rect(-0.5, 52.0, 0.5, 52.7)),
        ]);
        Arc::new(RegionResolver::new(Arc::new(dataset), 1000))
    }

    fn orchestrator(backends: Vec<Arc<MockGeocoder>>) -> Orchestrator {
        let chain = GeocoderChain::new(
            backends.into_iter().map(|b| b as Arc<dyn Geocoder>).collect(),
            ChainSettings::immediate(0),
        );
        Orchestrator::new(
            Arc::new(chain),
            Arc::new(ResultCache::in_memory("geo")),
            Some(Arc::new(HeuristicParser)),
            Some(resolver()),
            OrchestratorSettings::default(),
        )
    }

    fn cowley() -> Arc<MockGeocoder> {
        Arc::new(MockGeocoder::succeeding(
            "nominatim",
            candidate("Cowley Road, Chesterton, Cambridge, CB4 0WS, United Kingdom", 52.2197, 0.1406),
        ))
    }

    #[tokio::test]
    async fn test_second_lookup_hits_cache() {
        let backend = cowley();
        let orch = orchestrator(vec![backend.clone()]);
        let opts = ResolveOptions::default();

        let first = orch.resolve_line(LINE, Some("gb"), None, &opts).await.unwrap().unwrap();
        let second = orch.resolve_line(LINE, Some("gb"), None, &opts).await.unwrap().unwrap();
        assert_eq!(backend.calls(), 1);
        assert_eq!(first, second);
        assert_eq!(first.country, "gb");
        assert!(first.cache_key.as_deref().unwrap().starts_with("geo/gb-"));

        // formatting noise maps to the same entry
        orch.resolve_line("  cowley road;cambridge CB4-0WS united kingdom", Some("GB"), None, &opts)
            .await
            .unwrap();
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn test_without_cache_always_geocodes() {
        let backend = cowley();
        let orch = orchestrator(vec![backend.clone()]);
        let opts = ResolveOptions {
            use_cache: false,
            ..Default::default()
        };
        orch.resolve_line(LINE, Some("gb"), None, &opts).await.unwrap();
        orch.resolve_line(LINE, Some("gb"), None, &opts).await.unwrap();
        assert_eq!(backend.calls(), 2);
        assert_eq!(orch.cache().iterate(None).count(), 0);
    }

    #[tokio::test]
    async fn test_cache_only_never_calls_out() {
        let backend = cowley();
        let orch = orchestrator(vec![backend.clone()]);
        let opts = ResolveOptions {
            cache_only: true,
            ..Default::default()
        };
        assert!(orch.resolve_line(LINE, Some("gb"), None, &opts).await.unwrap().is_none());
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn test_fallback_records_backend() {
        let empty = Arc::new(MockGeocoder::empty("nominatim"));
        let backup = Arc::new(MockGeocoder::succeeding(
            "arcgis",
            candidate("Cowley Rd, Cambridge, CB4 0WS", 52.2197, 0.1406),
        ));
        let orch = orchestrator(vec![empty, backup]);
        let result = orch
            .resolve_line(LINE, Some("gb"), None, &ResolveOptions::default())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result.geocoder, "arcgis");
        assert_eq!(result.canonical_id, "addr-arcgis-n1");
    }

    #[tokio::test]
    async fn test_no_result_is_not_cached() {
        let orch = orchestrator(vec![Arc::new(MockGeocoder::empty("nominatim"))]);
        let result = orch
            .resolve_line(LINE, Some("gb"), None, &ResolveOptions::default())
            .await
            .unwrap();
        assert!(result.is_none());
        assert_eq!(orch.cache().iterate(None).count(), 0);
    }

    #[tokio::test]
    async fn test_regions_applied_on_miss_and_hit() {
        let backend = cowley();
        let orch = orchestrator(vec![backend.clone()]);

        let plain = orch
            .resolve_line(LINE, Some("gb"), None, &ResolveOptions::default())
            .await
            .unwrap()
            .unwrap();
        assert!(plain.region.is_none());

        let opts = ResolveOptions {
            apply_regions: true,
            ..Default::default()
        };
        let tagged = orch.resolve_line(LINE, Some("gb"), None, &opts).await.unwrap().unwrap();
        assert_eq!(tagged.region.unwrap().path(), "UK/UKH/UKH1/UKH12");
        assert_eq!(backend.calls(), 1);

        // the refreshed entry was written back
        let key = plain.cache_key.unwrap();
        assert!(orch.cache().get(&key).unwrap().unwrap().region.is_some());
    }

    #[tokio::test]
    async fn test_regions_require_dataset() {
        let chain = GeocoderChain::new(vec![cowley() as Arc<dyn Geocoder>], ChainSettings::immediate(0));
        let orch = Orchestrator::new(
            Arc::new(chain),
            Arc::new(ResultCache::in_memory("geo")),
            None,
            None,
            OrchestratorSettings::default(),
        );
        let opts = ResolveOptions {
            apply_regions: true,
            ..Default::default()
        };
        assert!(matches!(
            orch.resolve_line(LINE, None, None, &opts).await,
            Err(Error::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_ensure_ids_migrates_cached_entry() {
        let orch = orchestrator(vec![cowley()]);
        let first = orch
            .resolve_line(LINE, Some("gb"), None, &ResolveOptions::default())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.canonical_id, "addr-osm-n1");

        let hashed = Orchestrator {
            settings: OrchestratorSettings {
                identity_scheme: IdentityScheme::ComponentHash,
            },
            ..orch
        };
        let opts = ResolveOptions {
            ensure_ids: true,
            ..Default::default()
        };
        let migrated = hashed.resolve_line(LINE, Some("gb"), None, &opts).await.unwrap().unwrap();
        assert!(migrated.canonical_id.starts_with("addr-gb-"));
        assert_eq!(migrated.address_id, first.address_id);
    }

    #[tokio::test]
    async fn test_subject_entity_gets_address_links() {
        let orch = orchestrator(vec![cowley()]);
        let mut company = Entity::new("acme", "Company");
        company.add("name", "ACME Ltd");
        company.add("address", LINE);
        company.add("country", "gb");

        let out = orch
            .resolve_entity(&company, &ResolveOptions::default())
            .await
            .unwrap();
        assert_eq!(out.len(), 2);
        let address = &out[0];
        assert_eq!(address.schema, ADDRESS_SCHEMA);
        assert_eq!(address.id, "addr-osm-n1");
        let subject = &out[1];
        assert_eq!(subject.id, "acme");
        assert_eq!(subject.get("addressEntity"), &["addr-osm-n1".to_string()]);
    }

    #[tokio::test]
    async fn test_address_entity_ids() {
        let orch = orchestrator(vec![cowley()]);
        let mut address = Entity::new("addr-original", ADDRESS_SCHEMA);
        address.add("full", LINE);

        let kept = orch
            .resolve_entity(&address, &ResolveOptions::default())
            .await
            .unwrap();
        assert_eq!(kept[0].id, "addr-original");
        assert!(kept[0].first("full").unwrap().contains("Cambridge"));

        let opts = ResolveOptions {
            rewrite_ids: true,
            ..Default::default()
        };
        let rewritten = orch.resolve_entity(&address, &opts).await.unwrap();
        assert_eq!(rewritten[0].id, "addr-osm-n1");
    }

    #[tokio::test]
    async fn test_entity_results() {
        let orch = orchestrator(vec![cowley()]);
        let mut company = Entity::new("acme", "Company");
        company.add("address", LINE);
        company.add("address", "Cowley Rd, Cambridge");
        company.add("country", "gb");

        let results = orch
            .resolve_entity_results(&company, &ResolveOptions::default())
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].original_line, LINE);
        assert_eq!(results[1].country, "gb");

        let person = Entity::new("p1", "Person");
        let none = orch
            .resolve_entity_results(&person, &ResolveOptions::default())
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_entity_without_address_passes_through() {
        let orch = orchestrator(vec![cowley()]);
        let person = Entity::new("p1", "Person");
        let out = orch
            .resolve_entity(&person, &ResolveOptions::default())
            .await
            .unwrap();
        assert_eq!(out, vec![person]);
    }
}
