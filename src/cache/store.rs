//! Key-value store backends for the result cache.

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::error::Result;

pub type KvPair = (Vec<u8>, Vec<u8>);
pub type KvIter<'a> = Box<dyn Iterator<Item = Result<KvPair>> + 'a>;

/// Byte-oriented store. Implementations must be safe to share across
/// workers.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;
    fn put(&self, key: &[u8], value: &[u8]) -> Result<()>;
    fn delete(&self, key: &[u8]) -> Result<()>;

    /// Entries whose key starts with `prefix`, in key order.
    fn iterate<'a>(&'a self, prefix: &[u8]) -> KvIter<'a>;

    /// Write many entries at once.
    fn apply_batch(&self, entries: Vec<KvPair>) -> Result<()>;

    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

/// In-process store, lost on exit.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.entries.write().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.entries.write().remove(key);
        Ok(())
    }

    fn iterate<'a>(&'a self, prefix: &[u8]) -> KvIter<'a> {
        // snapshot, so callers may write while iterating
        let snapshot: Vec<KvPair> = self
            .entries
            .read()
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Box::new(snapshot.into_iter().map(Ok))
    }

    fn apply_batch(&self, entries: Vec<KvPair>) -> Result<()> {
        let mut map = self.entries.write();
        for (k, v) in entries {
            map.insert(k, v);
        }
        Ok(())
    }
}

/// On-disk store backed by sled.
pub struct SledStore {
    db: sled::Db,
}

impl SledStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = sled::open(path.as_ref())?;
        info!("Opened cache store at {}", path.as_ref().display());
        Ok(Self { db })
    }
}

impl KvStore for SledStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.db.get(key)?.map(|v| v.to_vec()))
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.db.insert(key, value)?;
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.db.remove(key)?;
        Ok(())
    }

    fn iterate<'a>(&'a self, prefix: &[u8]) -> KvIter<'a> {
        Box::new(
            self.db
                .scan_prefix(prefix)
                .map(|item| item.map(|(k, v)| (k.to_vec(), v.to_vec())).map_err(crate::error::Error::from)),
        )
    }

    fn apply_batch(&self, entries: Vec<KvPair>) -> Result<()> {
        let mut batch = sled::Batch::default();
        for (k, v) in entries {
            batch.insert(k, v);
        }
        self.db.apply_batch(batch)?;
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }
}

/// Open a store from a URI: `memory:` or a sled path (`sled://` optional).
pub fn open_store(uri: &str) -> Result<Arc<dyn KvStore>> {
    let uri = uri.trim();
    if uri.is_empty() || uri == "memory:" || uri == "memory://" {
        info!("Using in-memory cache store");
        return Ok(Arc::new(MemoryStore::new()));
    }
    let path = uri.strip_prefix("sled://").unwrap_or(uri);
    Ok(Arc::new(SledStore::open(path)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn exercise(store: &dyn KvStore) {
        store.put(b"geo/a", b"1").unwrap();
        store.put(b"geo/b", b"2").unwrap();
        store.put(b"other/c", b"3").unwrap();
        assert_eq!(store.get(b"geo/a").unwrap(), Some(b"1".to_vec()));
        assert_eq!(store.get(b"geo/z").unwrap(), None);

        let keys: Vec<Vec<u8>> = store
            .iterate(b"geo/")
            .map(|item| item.unwrap().0)
            .collect();
        assert_eq!(keys, vec![b"geo/a".to_vec(), b"geo/b".to_vec()]);

        store
            .apply_batch(vec![(b"geo/c".to_vec(), b"4".to_vec()), (b"geo/a".to_vec(), b"5".to_vec())])
            .unwrap();
        assert_eq!(store.iterate(b"geo/").count(), 3);
        assert_eq!(store.get(b"geo/a").unwrap(), Some(b"5".to_vec()));

        store.delete(b"geo/a").unwrap();
        assert_eq!(store.get(b"geo/a").unwrap(), None);
        assert_eq!(store.iterate(b"").count(), 3);
    }

    #[test]
    fn test_memory_store() {
        exercise(&MemoryStore::new());
    }

    #[test]
    fn test_sled_store() {
        let dir = TempDir::new().unwrap();
        exercise(&SledStore::open(dir.path()).unwrap());
    }

    #[test]
    fn test_open_store_uris() {
        let store = open_store("memory:").unwrap();
        store.put(b"k", b"v").unwrap();
        assert_eq!(store.get(b"k").unwrap(), Some(b"v".to_vec()));

        let dir = TempDir::new().unwrap();
        let uri = format!("sled://{}", dir.path().join("db").display());
        let store = open_store(&uri).unwrap();
        store.put(b"k", b"v").unwrap();
        assert_eq!(store.iterate(b"k").count(), 1);
    }
}
