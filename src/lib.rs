//! addrgeo - cached address geocoding with NUTS region lookup
//!
//! Shared library behind the `addrgeo` binary: address normalization and
//! cache keys, a fallback chain of HTTP geocoders, a persistent result cache
//! and a point-in-polygon region resolver.

pub mod cache;
pub mod config;
pub mod country;
pub mod error;
pub mod geocoder;
pub mod io;
pub mod logging;
pub mod models;
pub mod normalize;
pub mod parser;
pub mod regions;
pub mod resolve;
pub mod worker;

pub use error::{Error, Result};
pub use models::{Address, Entity, GeocodingResult, RegionPath};
pub use resolve::{Orchestrator, ResolveOptions};
