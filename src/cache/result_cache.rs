//! Typed geocoding-result cache over a [`KvStore`].
//!
//! Values are JSON-encoded [`GeocodingResult`]s. Entries never expire; every
//! read deserializes a fresh owned copy.

use std::sync::Arc;
use tracing::{debug, error, info};

use super::store::{open_store, KvPair, KvStore, MemoryStore};
use crate::config::CacheConfig;
use crate::error::{Error, Result};
use crate::models::GeocodingResult;

pub struct ResultCache {
    store: Arc<dyn KvStore>,
    prefix: String,
    batch_size: usize,
}

impl ResultCache {
    pub fn new(store: Arc<dyn KvStore>, prefix: impl Into<String>, batch_size: usize) -> Self {
        Self {
            store,
            prefix: prefix.into(),
            batch_size: batch_size.max(1),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Result<Self> {
        let store = open_store(&config.uri)?;
        Ok(Self::new(store, config.prefix.clone(), config.bulk_batch_size))
    }

    pub fn in_memory(prefix: &str) -> Self {
        Self::new(Arc::new(MemoryStore::new()), prefix, 1000)
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn get(&self, key: &str) -> Result<Option<GeocodingResult>> {
        match self.store.get(key.as_bytes())? {
            Some(bytes) => {
                let result = serde_json::from_slice(&bytes)?;
                Ok(Some(result))
            }
            None => Ok(None),
        }
    }

    /// Store a result. Returns `false` (and writes nothing) for results that
    /// carry no actual answer.
    pub fn put(&self, key: &str, result: &GeocodingResult) -> Result<bool> {
        if !result.is_storable() {
            debug!("Refusing to cache empty result for {}", key);
            return Ok(false);
        }
        let value = serde_json::to_vec(result)?;
        self.store.put(key.as_bytes(), &value)?;
        Ok(true)
    }

    pub fn delete(&self, key: &str) -> Result<()> {
        self.store.delete(key.as_bytes())
    }

    /// Buffered writer for bulk population.
    pub fn bulk(&self) -> BulkWriter<'_> {
        BulkWriter {
            cache: self,
            buffer: Vec::with_capacity(self.batch_size),
            written: 0,
            refused: 0,
        }
    }

    /// All entries under `prefix` (the cache prefix when `None`). Each call
    /// starts a new pass; undecodable entries come back as `Err` items.
    pub fn iterate<'a>(
        &'a self,
        prefix: Option<&str>,
    ) -> impl Iterator<Item = Result<(String, GeocodingResult)>> + 'a {
        let prefix = match prefix {
            Some(p) => p.to_string(),
            None => format!("{}/", self.prefix),
        };
        self.store.iterate(prefix.as_bytes()).map(|item| -> Result<(String, GeocodingResult)> {
            let (k, v) = item?;
            let key = String::from_utf8(k)
                .map_err(|e| Error::Input(format!("non UTF-8 cache key: {}", e)))?;
            let result: GeocodingResult = serde_json::from_slice(&v)
                .map_err(|e| Error::Input(format!("corrupt cache entry {}: {}", key, e)))?;
            Ok((key, result))
        })
    }

    pub fn flush(&self) -> Result<()> {
        self.store.flush()
    }
}

/// Accumulates writes and flushes them every `batch_size` entries.
///
/// Call [`BulkWriter::finish`] to flush and get the count. A writer dropped
/// without `finish` still flushes, logging any failure.
pub struct BulkWriter<'a> {
    cache: &'a ResultCache,
    buffer: Vec<KvPair>,
    written: usize,
    refused: usize,
}

impl<'a> BulkWriter<'a> {
    pub fn put(&mut self, key: &str, result: &GeocodingResult) -> Result<()> {
        if !result.is_storable() {
            debug!("Refusing to cache empty result for {}", key);
            self.refused += 1;
            return Ok(());
        }
        self.buffer
            .push((key.as_bytes().to_vec(), serde_json::to_vec(result)?));

        if self.buffer.len() >= self.cache.batch_size {
            self.flush()?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let entries = std::mem::take(&mut self.buffer);
        let count = entries.len();
        debug!("Flushing {} cache entries", count);
        self.cache.store.apply_batch(entries)?;
        self.written += count;
        Ok(())
    }

    /// Flush remaining entries and return the total written.
    pub fn finish(mut self) -> Result<usize> {
        self.flush()?;
        self.cache.flush()?;
        if self.refused > 0 {
            info!("Skipped {} empty results", self.refused);
        }
        Ok(self.written)
    }

    pub fn written(&self) -> usize {
        self.written
    }
}

impl Drop for BulkWriter<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            error!("Failed to flush cache writes: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geocoder::mock::candidate;
    use crate::models::{Address, IdentityScheme};

    fn result(line: &str) -> GeocodingResult {
        let address = Address::new(line, Some("gb"), None);
        GeocodingResult::from_candidate(
            &address,
            candidate("Cowley Road, Cambridge", 52.2197, 0.1406),
            "nominatim",
            IdentityScheme::ProviderId,
        )
        .unwrap()
    }

    #[test]
    fn test_put_get() {
        let cache = ResultCache::in_memory("geo");
        let r = result("Cowley Road, Cambridge");
        assert!(cache.put("geo/gb-1", &r).unwrap());
        assert_eq!(cache.get("geo/gb-1").unwrap(), Some(r));
        assert_eq!(cache.get("geo/gb-2").unwrap(), None);
    }

    #[test]
    fn test_refuses_empty_results() {
        let cache = ResultCache::in_memory("geo");
        let mut r = result("Cowley Road");
        r.result_line = " ".to_string();
        assert!(!cache.put("geo/x", &r).unwrap());
        assert_eq!(cache.get("geo/x").unwrap(), None);

        r.result_line = "x".to_string();
        r.lat = f64::NAN;
        assert!(!cache.put("geo/x", &r).unwrap());
    }

    #[test]
    fn test_bulk_flushes_per_batch() {
        let cache = ResultCache::new(Arc::new(MemoryStore::new()), "geo", 2);
        let mut bulk = cache.bulk();
        for i in 0..3 {
            bulk.put(&format!("geo/{}", i), &result(&format!("line {}", i)))
                .unwrap();
        }
        assert_eq!(bulk.written(), 2);
        assert_eq!(bulk.finish().unwrap(), 3);
        assert_eq!(cache.iterate(None).count(), 3);
    }

    #[test]
    fn test_bulk_flushes_on_drop() {
        let cache = ResultCache::in_memory("geo");
        {
            let mut bulk = cache.bulk();
            bulk.put("geo/a", &result("a street")).unwrap();
        }
        assert!(cache.get("geo/a").unwrap().is_some());
    }

    #[test]
    fn test_iterate_surfaces_corrupt_entries() {
        let store = Arc::new(MemoryStore::new());
        let cache = ResultCache::new(store.clone(), "geo", 10);
        cache.put("geo/a", &result("a street")).unwrap();
        store.put(b"geo/b", b"not json").unwrap();
        store.put(b"elsewhere/c", b"{}").unwrap();

        let items: Vec<_> = cache.iterate(None).collect();
        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert!(matches!(items[1], Err(Error::Input(_))));

        // a second pass sees the same entries
        assert_eq!(cache.iterate(Some("geo/a")).count(), 1);
    }
}
