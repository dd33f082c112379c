//! Spatial index for fast region lookups.

use geo::{Contains, Point};
use rstar::{RTree, RTreeObject, AABB};
use std::sync::Arc;
use tracing::info;

use super::dataset::{BoundaryDataset, Region};

/// Wrapper for R-tree indexing of regions
#[derive(Clone)]
pub struct IndexedRegion {
    pub region: Arc<Region>,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for IndexedRegion {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

impl IndexedRegion {
    pub fn new(region: Arc<Region>) -> Option<Self> {
        let (min_x, min_y, max_x, max_y) = region.bbox()?;
        Some(Self {
            region,
            envelope: AABB::from_corners([min_x, min_y], [max_x, max_y]),
        })
    }
}

/// R-tree over region envelopes, refined with exact containment.
pub struct RegionIndex {
    tree: RTree<IndexedRegion>,
}

impl RegionIndex {
    pub fn build(dataset: &BoundaryDataset) -> Self {
        info!("Building spatial index for {} regions...", dataset.len());

        let indexed: Vec<IndexedRegion> = dataset
            .regions()
            .iter()
            .cloned()
            .filter_map(IndexedRegion::new)
            .collect();
        let tree = RTree::bulk_load(indexed);

        info!("Spatial index built with {} entries", tree.size());
        Self { tree }
    }

    /// Regions whose bounding box contains the point
    pub fn candidates(&self, lon: f64, lat: f64) -> Vec<Arc<Region>> {
        let query_envelope = AABB::from_point([lon, lat]);
        self.tree
            .locate_in_envelope_intersecting(&query_envelope)
            .map(|ir| Arc::clone(&ir.region))
            .collect()
    }

    /// Regions whose geometry contains the point
    pub fn containing(&self, lon: f64, lat: f64) -> Vec<Arc<Region>> {
        let point = Point::new(lon, lat);
        let query_envelope = AABB::from_point([lon, lat]);

        // envelope candidates first, then exact containment
        self.tree
            .locate_in_envelope_intersecting(&query_envelope)
            .filter(|ir| ir.region.geometry.contains(&point))
            .map(|ir| Arc::clone(&ir.region))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regions::dataset::rect;
    use geo::{LineString, MultiPolygon, Polygon};

    #[test]
    fn test_envelope_vs_exact() {
        // L-shaped region: bbox covers (3, 3) but the polygon does not
        let l_shape = MultiPolygon::new(vec![Polygon::new(
            LineString::from(vec![(0.0, 0.0), (4.0, 0.0), (4.0, 1.0), (1.0, 1.0), (1.0, 4.0), (0.0, 4.0), (0.0, 0.0)]),
            vec![],
        )]);
        let dataset = BoundaryDataset::from_regions(vec![
            Region::new("AA", 0, "L", l_shape),
            Region::new("BB", 0, "Box", rect(10.0, 10.0, 11.0, 11.0)),
        ]);
        let index = RegionIndex::build(&dataset);
        assert_eq!(index.len(), 2);

        assert_eq!(index.candidates(3.0, 3.0).len(), 1);
        assert!(index.containing(3.0, 3.0).is_empty());
        assert_eq!(index.containing(0.5, 3.0)[0].code, "AA");
        assert!(index.containing(50.0, 50.0).is_empty());
    }
}
