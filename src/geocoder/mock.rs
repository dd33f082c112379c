//! Scripted geocoder for tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::types::{Candidate, GeocodeError, GeocodeQuery, Geocoder};

type Response = Result<Option<Candidate>, GeocodeError>;

pub struct MockGeocoder {
    name: String,
    script: Mutex<VecDeque<Response>>,
    fallback: Response,
    calls: AtomicUsize,
}

impl MockGeocoder {
    pub fn new(name: &str, fallback: Response) -> Self {
        Self {
            name: name.to_string(),
            script: Mutex::new(VecDeque::new()),
            fallback,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn succeeding(name: &str, candidate: Candidate) -> Self {
        Self::new(name, Ok(Some(candidate)))
    }

    pub fn empty(name: &str) -> Self {
        Self::new(name, Ok(None))
    }

    pub fn failing(name: &str, error: GeocodeError) -> Self {
        Self::new(name, Err(error))
    }

    /// Responses returned (in order) before falling back
    pub fn with_script(self, responses: Vec<Response>) -> Self {
        self.script.lock().extend(responses);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

pub fn candidate(line: &str, lat: f64, lon: f64) -> Candidate {
    Candidate {
        formatted_line: line.to_string(),
        lat,
        lon,
        place_id: Some("N1".to_string()),
        country: None,
        raw: None,
    }
}

#[async_trait]
impl Geocoder for MockGeocoder {
    fn name(&self) -> &str {
        &self.name
    }

    async fn geocode(&self, _query: &GeocodeQuery) -> Result<Option<Candidate>, GeocodeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self.script.lock().pop_front();
        scripted.unwrap_or_else(|| self.fallback.clone())
    }
}
