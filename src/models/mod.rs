//! Core data models for address resolution.

pub mod address;
pub mod entity;
pub mod region;
pub mod result;

pub use address::{Address, AddressComponents};
pub use entity::{Entity, ADDRESS_SCHEMA};
pub use region::{level_for_code, RegionEntry, RegionPath, NUTS_LEVELS};
pub use result::{make_address_id, provider_prefix, GeocodingResult, IdentityScheme, ResultRow};
