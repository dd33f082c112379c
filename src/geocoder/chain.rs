//! Ordered geocoder chain with per-backend throttling and retries.
//!
//! Backends are tried in preference order; the first success wins. Empty
//! answers and errors advance to the next backend. An exhausted chain is a
//! valid "no result", not an error. The chain knows nothing about caching.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, warn};

use super::types::{AttemptOutcome, Candidate, GeocodeError, GeocodeQuery, Geocoder};
use crate::config::Config;
use crate::error::Result;

#[derive(Debug, Clone)]
pub struct ChainSettings {
    /// Minimum delay between consecutive calls to one backend
    pub min_delay: Duration,
    /// Retries per backend for rate-limited / transient failures
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl Default for ChainSettings {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_millis(500),
            max_retries: 5,
            backoff_base: Duration::from_secs(1),
            backoff_max: Duration::from_secs(30),
        }
    }
}

impl ChainSettings {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            min_delay: config.min_delay()?,
            max_retries: config.max_retries,
            backoff_base: Duration::from_millis(config.backoff_base_ms),
            backoff_max: Duration::from_millis(config.backoff_max_ms),
        })
    }

    /// No waiting at all (tests, replay backends)
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            min_delay: Duration::ZERO,
            max_retries,
            backoff_base: Duration::ZERO,
            backoff_max: Duration::ZERO,
        }
    }

    /// Exponential backoff before retry number `retry` (0-based)
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry);
        self.backoff_base.saturating_mul(factor).min(self.backoff_max)
    }
}

/// One backend plus its rate-limiter state.
struct Slot {
    geocoder: Arc<dyn Geocoder>,
    /// Earliest instant the next call may start
    next_call: Mutex<Option<Instant>>,
}

impl Slot {
    /// Reserve the next call and return how long to wait for it. The lock is
    /// never held across an await.
    fn reserve(&self, min_delay: Duration) -> Duration {
        let mut next = self.next_call.lock();
        let now = Instant::now();
        let at = match *next {
            Some(t) if t > now => t,
            _ => now,
        };
        *next = Some(at + min_delay);
        at - now
    }
}

/// First successful answer and the backend that produced it.
#[derive(Debug, Clone)]
pub struct ChainHit {
    pub geocoder: String,
    pub candidate: Candidate,
}

#[derive(Debug, Clone)]
pub struct AttemptReport {
    pub geocoder: String,
    pub outcome: AttemptOutcome,
    pub calls: u32,
    pub error: Option<GeocodeError>,
}

#[derive(Debug, Clone, Default)]
pub struct ChainReport {
    pub attempts: Vec<AttemptReport>,
}

impl ChainReport {
    pub fn total_calls(&self) -> u32 {
        self.attempts.iter().map(|a| a.calls).sum()
    }
}

pub struct GeocoderChain {
    slots: Vec<Slot>,
    settings: ChainSettings,
}

impl GeocoderChain {
    pub fn new(geocoders: Vec<Arc<dyn Geocoder>>, settings: ChainSettings) -> Self {
        let slots = geocoders
            .into_iter()
            .map(|geocoder| Slot {
                geocoder,
                next_call: Mutex::new(None),
            })
            .collect();
        Self { slots, settings }
    }

    pub fn names(&self) -> Vec<&str> {
        self.slots.iter().map(|s| s.geocoder.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn settings(&self) -> &ChainSettings {
        &self.settings
    }

    pub async fn geocode(&self, query: &GeocodeQuery) -> Option<ChainHit> {
        self.geocode_with_report(query).await.0
    }

    pub async fn geocode_with_report(&self, query: &GeocodeQuery) -> (Option<ChainHit>, ChainReport) {
        let mut report = ChainReport::default();

        for slot in &self.slots {
            let (attempt, candidate) = self.try_backend(slot, query).await;
            let geocoder = attempt.geocoder.clone();
            report.attempts.push(attempt);

            if let Some(candidate) = candidate {
                debug!("{} resolved '{}'", geocoder, query.text);
                return (Some(ChainHit { geocoder, candidate }), report);
            }
        }

        debug!(
            "No geocoder found a result for '{}' ({} backends tried)",
            query.text,
            report.attempts.len()
        );
        (None, report)
    }

    async fn try_backend(&self, slot: &Slot, query: &GeocodeQuery) -> (AttemptReport, Option<Candidate>) {
        let name = slot.geocoder.name().to_string();
        let mut calls = 0u32;

        loop {
            let wait = slot.reserve(self.settings.min_delay);
            if !wait.is_zero() {
                sleep(wait).await;
            }

            calls += 1;
            let result = slot.geocoder.geocode(query).await;
            let outcome = AttemptOutcome::of(&result);

            let report = |outcome, error| AttemptReport {
                geocoder: name.clone(),
                outcome,
                calls,
                error,
            };

            match result {
                Ok(Some(candidate)) if is_usable(&candidate) => {
                    return (report(outcome, None), Some(candidate));
                }
                Ok(Some(candidate)) => {
                    debug!(
                        "{} returned an unusable candidate ({:?}, {}, {}), treating as empty",
                        name, candidate.formatted_line, candidate.lat, candidate.lon
                    );
                    return (report(AttemptOutcome::Empty, None), None);
                }
                Ok(None) => return (report(outcome, None), None),
                Err(e) if e.is_retryable() && calls <= self.settings.max_retries => {
                    let delay = self.settings.backoff(calls - 1);
                    warn!(
                        "{} failed: {} (retry {}/{} in {:?})",
                        name, e, calls, self.settings.max_retries, delay
                    );
                    if !delay.is_zero() {
                        sleep(delay).await;
                    }
                }
                Err(e) => {
                    warn!("{} gave up after {} call(s): {}", name, calls, e);
                    return (report(AttemptOutcome::Error, Some(e)), None);
                }
            }
        }
    }
}

fn is_usable(candidate: &Candidate) -> bool {
    !candidate.formatted_line.trim().is_empty() && candidate.lat.is_finite() && candidate.lon.is_finite()
}
