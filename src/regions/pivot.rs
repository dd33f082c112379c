//! Parent/child relation between region levels.
//!
//! Each region at level n+1 gets one parent at level n. Parents are chosen by
//! code prefix among the regions around the child's interior point, then by
//! geometric containment of that point, then by code prefix over the whole
//! parent level.

use geo::Contains;
use hashbrown::HashMap;
use rayon::prelude::*;
use std::sync::Arc;
use tracing::{info, warn};

use super::dataset::{BoundaryDataset, Region};
use super::index::RegionIndex;

#[derive(Debug, Default)]
pub struct PivotIndex {
    parents: HashMap<String, String>,
    /// Precomputed chains for the finest level
    chains: HashMap<String, Vec<String>>,
}

impl PivotIndex {
    pub fn build(dataset: &BoundaryDataset, index: &RegionIndex) -> Self {
        let levels = dataset.levels();
        let mut parents = HashMap::new();

        for pair in levels.windows(2) {
            let (parent_level, child_level) = (pair[0], pair[1]);
            let parent_regions: Vec<&Arc<Region>> = dataset.at_level(parent_level).collect();
            let children: Vec<&Arc<Region>> = dataset.at_level(child_level).collect();

            let found: Vec<(String, Option<String>)> = children
                .par_iter()
                .map(|child| {
                    let parent = find_parent(child, parent_level, index, &parent_regions);
                    (child.code.clone(), parent)
                })
                .collect();

            let mut orphans = 0usize;
            for (child, parent) in found {
                match parent {
                    Some(parent) => {
                        parents.insert(child, parent);
                    }
                    None => {
                        warn!("No parent at level {} for region {}", parent_level, child);
                        orphans += 1;
                    }
                }
            }
            info!(
                "Pivot level {} -> {}: {} children, {} without parent",
                parent_level,
                child_level,
                children.len(),
                orphans
            );
        }

        let mut pivot = Self {
            parents,
            chains: HashMap::new(),
        };
        if let Some(&finest) = levels.last() {
            let chains: HashMap<String, Vec<String>> = dataset
                .at_level(finest)
                .map(|r| (r.code.clone(), pivot.walk(&r.code)))
                .collect();
            pivot.chains = chains;
        }
        pivot
    }

    pub fn parent(&self, code: &str) -> Option<&str> {
        self.parents.get(code).map(String::as_str)
    }

    /// Chain from the coarsest ancestor down to `code` itself.
    pub fn ancestors(&self, code: &str) -> Vec<String> {
        match self.chains.get(code) {
            Some(chain) => chain.clone(),
            None => self.walk(code),
        }
    }

    fn walk(&self, code: &str) -> Vec<String> {
        let mut chain = vec![code.to_string()];
        let mut current = code;
        while let Some(parent) = self.parents.get(current) {
            // guard against cycles in malformed data
            if chain.iter().any(|c| c == parent) {
                break;
            }
            chain.push(parent.clone());
            current = parent;
        }
        chain.reverse();
        chain
    }

    pub fn len(&self) -> usize {
        self.parents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }
}

fn find_parent(
    child: &Region,
    parent_level: u8,
    index: &RegionIndex,
    parent_regions: &[&Arc<Region>],
) -> Option<String> {
    if let Some(point) = child.interior_point() {
        let candidates: Vec<Arc<Region>> = index
            .candidates(point.x(), point.y())
            .into_iter()
            .filter(|r| r.level == parent_level)
            .collect();

        if let Some(parent) = candidates.iter().find(|r| child.code.starts_with(&r.code)) {
            return Some(parent.code.clone());
        }
        if let Some(parent) = candidates.iter().find(|r| r.geometry.contains(&point)) {
            return Some(parent.code.clone());
        }
    }

    parent_regions
        .iter()
        .filter(|r| child.code.starts_with(&r.code))
        .max_by_key(|r| r.code.len())
        .map(|r| r.code.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regions::dataset::rect;

    fn dataset() -> BoundaryDataset {
        BoundaryDataset::from_regions(vec![
            Region::new("UK", 0, "United Kingdom", rect(-8.0, 49.0, 2.0, 59.0)),
            Region::new("UKH", 1, "East of England", rect(-1.0, 51.0, 2.0, 53.0)),
            Region::new("UKH1", 2, "East Anglia", rect(-0.5, 52.0, 2.0, 53.0)),
            Region::new("UKH12", 3, "Cambridgeshire CC", rect(-0.5, 52.0, 0.5, 52.7)),
            // code does not share the parent's prefix; found by containment
            Region::new("ZZ9", 1, "Odd", rect(-7.0, 55.0, -6.0, 56.0)),
            // outside every level-0 region but prefix matches
            Region::new("UKX", 1, "Detached", rect(20.0, 20.0, 21.0, 21.0)),
        ])
    }

    #[test]
    fn test_ancestors() {
        let dataset = dataset();
        let index = RegionIndex::build(&dataset);
        let pivot = PivotIndex::build(&dataset, &index);

        assert_eq!(pivot.ancestors("UKH12"), vec!["UK", "UKH", "UKH1", "UKH12"]);
        assert_eq!(pivot.ancestors("UKH1"), vec!["UK", "UKH", "UKH1"]);
        assert_eq!(pivot.ancestors("UK"), vec!["UK"]);
        assert_eq!(pivot.parent("ZZ9"), Some("UK"));
        assert_eq!(pivot.parent("UKX"), Some("UK"));
    }
}
