use thiserror::Error;

use crate::geocoder::GeocodeError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Cache store error: {0}")]
    Store(#[from] sled::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    Input(String),

    #[error("Boundary dataset error: {0}")]
    Dataset(String),

    #[error("Geocoder error: {0}")]
    Geocode(#[from] GeocodeError),
}

pub type Result<T> = std::result::Result<T, Error>;
