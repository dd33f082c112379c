//! Hierarchical region lookup (NUTS-style) for coordinates.
//!
//! Loads a boundary dataset, indexes it with an R-tree and links levels
//! through a pivot index of parent codes.

pub mod dataset;
pub mod index;
pub mod pivot;
pub mod resolver;

pub use dataset::{BoundaryDataset, Region};
pub use index::RegionIndex;
pub use pivot::PivotIndex;
pub use resolver::RegionResolver;
