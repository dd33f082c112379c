//! Coordinate to region-hierarchy lookups.

use hashbrown::HashMap;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::dataset::{BoundaryDataset, Region};
use super::index::RegionIndex;
use super::pivot::PivotIndex;
use crate::config::RegionConfig;
use crate::error::Result;
use crate::models::{RegionEntry, RegionPath};

/// Coordinates are rounded to this many decimals before lookup, matching the
/// precision of the boundary data.
const PRECISION: f64 = 1_000_000.0;

type MemoKey = (i64, i64);

/// Resolves coordinates to region paths. Immutable after construction apart
/// from its memo tables; share it via `Arc`.
pub struct RegionResolver {
    dataset: Arc<BoundaryDataset>,
    index: RegionIndex,
    pivot: PivotIndex,
    memo: Mutex<HashMap<MemoKey, Option<RegionPath>>>,
    memo_capacity: usize,
    paths: Mutex<HashMap<String, Option<String>>>,
    names: Mutex<HashMap<String, Option<String>>>,
    scans: AtomicUsize,
}

impl RegionResolver {
    pub fn new(dataset: Arc<BoundaryDataset>, memo_capacity: usize) -> Self {
        let index = RegionIndex::build(&dataset);
        let pivot = PivotIndex::build(&dataset, &index);
        info!(
            "Region resolver ready: {} regions, {} parent links",
            dataset.len(),
            pivot.len()
        );
        Self {
            dataset,
            index,
            pivot,
            memo: Mutex::new(HashMap::new()),
            memo_capacity: memo_capacity.max(1),
            paths: Mutex::new(HashMap::new()),
            names: Mutex::new(HashMap::new()),
            scans: AtomicUsize::new(0),
        }
    }

    pub fn load<P: AsRef<Path>>(path: P, memo_capacity: usize) -> Result<Self> {
        let dataset = BoundaryDataset::load(path)?;
        Ok(Self::new(Arc::new(dataset), memo_capacity))
    }

    pub fn from_config(config: &RegionConfig) -> Result<Self> {
        Self::load(&config.boundary_data, config.memo_capacity)
    }

    pub fn dataset(&self) -> &BoundaryDataset {
        &self.dataset
    }

    /// Region path for a coordinate, `None` when the point lies outside the
    /// dataset or the lookup is inconsistent.
    pub fn resolve(&self, lon: f64, lat: f64) -> Option<RegionPath> {
        if !lon.is_finite() || !lat.is_finite() {
            error!("Invalid coordinates ({}, {})", lon, lat);
            return None;
        }
        let key = ((lon * PRECISION).round() as i64, (lat * PRECISION).round() as i64);

        if let Some(hit) = self.memo.lock().get(&key) {
            return hit.clone();
        }

        let path = self.scan(key);

        let mut memo = self.memo.lock();
        if memo.len() >= self.memo_capacity {
            debug!("Region memo full ({} entries), clearing", memo.len());
            memo.clear();
        }
        memo.insert(key, path.clone());
        path
    }

    fn scan(&self, key: MemoKey) -> Option<RegionPath> {
        self.scans.fetch_add(1, Ordering::Relaxed);
        let (lon, lat) = (key.0 as f64 / PRECISION, key.1 as f64 / PRECISION);
        let matches = self.index.containing(lon, lat);

        if matches.is_empty() {
            debug!("No region contains ({}, {})", lon, lat);
            return None;
        }

        let expected = self.dataset.levels().len();
        if matches.len() < expected {
            let codes: Vec<&str> = matches.iter().map(|r| r.code.as_str()).collect();
            error!(
                "Point ({}, {}) matches {} regions ({:?}), expected {}",
                lon,
                lat,
                matches.len(),
                codes,
                expected
            );
            return None;
        }

        let deepest = deepest_match(&matches)?;

        let mut countries: Vec<&str> = matches.iter().map(|r| r.country.as_str()).collect();
        countries.sort_unstable();
        countries.dedup();
        if countries.len() > 1 {
            error!(
                "Point ({}, {}) matches regions in several countries: {:?}; using {}",
                lon, lat, countries, deepest.code
            );
        }
        if matches.len() > expected {
            warn!(
                "Point ({}, {}) matches {} regions, expected {}; using {}",
                lon,
                lat,
                matches.len(),
                expected,
                deepest.code
            );
        }

        self.path_for(&deepest.code)
    }

    /// Path for a region code via the pivot index, with names.
    fn path_for(&self, code: &str) -> Option<RegionPath> {
        let chain = self.pivot.ancestors(code);
        let first = self.dataset.get(chain.first()?)?;
        let mut path = RegionPath::new(first.country.clone());
        for code in chain {
            if let Some(region) = self.dataset.get(&code) {
                path.set(RegionEntry {
                    level: region.level,
                    code,
                    name: region.name.clone(),
                });
            }
        }
        (!path.is_empty()).then_some(path)
    }

    /// Display name of a region code
    pub fn name_for_code(&self, code: &str) -> Option<String> {
        if let Some(hit) = self.names.lock().get(code) {
            return hit.clone();
        }
        let name = self.dataset.get(code).map(|r| r.name.clone());
        self.names.lock().insert(code.to_string(), name.clone());
        name
    }

    /// `UK/UKH/UKH1/UKH12` style path of a code
    pub fn ancestor_path_for_code(&self, code: &str) -> Option<String> {
        if let Some(hit) = self.paths.lock().get(code) {
            return hit.clone();
        }
        let path = self
            .dataset
            .get(code)
            .map(|_| self.pivot.ancestors(code).join("/"));
        self.paths.lock().insert(code.to_string(), path.clone());
        path
    }

    /// Number of dataset scans performed (memo misses)
    pub fn scan_count(&self) -> usize {
        self.scans.load(Ordering::Relaxed)
    }

    pub fn memo_len(&self) -> usize {
        self.memo.lock().len()
    }
}

/// Highest-level match; ties go to the greatest code.
fn deepest_match(matches: &[Arc<Region>]) -> Option<&Arc<Region>> {
    matches.iter().max_by(|a, b| (a.level, &a.code).cmp(&(b.level, &b.code)))
}
