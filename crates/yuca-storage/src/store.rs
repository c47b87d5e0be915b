// RocksDB-backed configuration store
// One instance per node; owned exclusively by the replication layer

use std::path::Path;
use std::sync::Arc;

use rocksdb::{BlockBasedOptions, ColumnFamily, ColumnFamilyDescriptor, DB, Options};
use tracing::{debug, info};

use crate::error::StorageError;

// Column family names
const CF_CONFIG: &str = "config";
const CF_META: &str = "meta";

// RocksDB performance tuning constants
/// Write buffer size: 64MB for better write throughput
const WRITE_BUFFER_SIZE: usize = 64 * 1024 * 1024;
/// Maximum number of write buffers for write stall prevention
const MAX_WRITE_BUFFER_NUMBER: i32 = 3;
/// Block cache size: 256MB for read optimization
const BLOCK_CACHE_SIZE: usize = 256 * 1024 * 1024;
/// Bloom filter bits per key for faster lookups
const BLOOM_FILTER_BITS_PER_KEY: f64 = 10.0;

/// Durable key-value store for configuration entries.
///
/// Concurrent reads overlapping an in-flight write are safe without
/// external locking; RocksDB provides the isolation. A successful [`put`]
/// is durable across a crash.
///
/// [`put`]: ConfigStore::put
pub struct ConfigStore {
    db: Arc<DB>,
}

impl ConfigStore {
    /// Open (or create) the store at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_write_buffer_size(WRITE_BUFFER_SIZE);
        db_opts.set_max_write_buffer_number(MAX_WRITE_BUFFER_NUMBER);
        db_opts.set_compression_type(rocksdb::DBCompressionType::Lz4);

        // Block-based table options with block cache for read performance
        let mut block_opts = BlockBasedOptions::default();
        let cache = rocksdb::Cache::new_lru_cache(BLOCK_CACHE_SIZE);
        block_opts.set_block_cache(&cache);
        block_opts.set_bloom_filter(BLOOM_FILTER_BITS_PER_KEY, false);

        let mut cf_opts = Options::default();
        cf_opts.set_write_buffer_size(WRITE_BUFFER_SIZE);
        cf_opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        cf_opts.set_block_based_table_factory(&block_opts);

        let cfs = vec![
            ColumnFamilyDescriptor::new(CF_CONFIG, cf_opts.clone()),
            ColumnFamilyDescriptor::new(CF_META, cf_opts),
        ];

        let db = DB::open_cf_descriptors(&db_opts, path, cfs)?;

        info!("config store opened");
        Ok(Self { db: Arc::new(db) })
    }

    /// Column families are created during open; a missing handle means the
    /// database is corrupted beyond what this process can recover.
    fn cf_config(&self) -> &ColumnFamily {
        self.db
            .cf_handle(CF_CONFIG)
            .expect("CF_CONFIG must exist - database may be corrupted")
    }

    fn cf_meta(&self) -> &ColumnFamily {
        self.db
            .cf_handle(CF_META)
            .expect("CF_META must exist - database may be corrupted")
    }

    /// Store `value` under `key`. Storing under an empty key is a silent
    /// no-op, never an error.
    pub fn put(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        if key.is_empty() {
            return Ok(());
        }

        self.db.put_cf(self.cf_config(), key.as_bytes(), value)?;
        debug!(key, "stored config entry");
        Ok(())
    }

    /// Fetch the value stored under `key`.
    pub fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        match self.db.get_cf(self.cf_config(), key.as_bytes())? {
            Some(value) => Ok(value),
            None => Err(StorageError::NotFound {
                key: key.to_string(),
            }),
        }
    }

    /// Remove `key` from the store. Deleting an absent key succeeds.
    pub fn delete(&self, key: &str) -> Result<(), StorageError> {
        if key.is_empty() {
            return Ok(());
        }

        self.db.delete_cf(self.cf_config(), key.as_bytes())?;
        debug!(key, "deleted config entry");
        Ok(())
    }

    /// Enumerate all stored keys.
    ///
    /// Order is whatever the engine yields; callers must not depend on it.
    pub fn list_keys(&self) -> Result<Vec<String>, StorageError> {
        let mut keys = Vec::new();
        let iter = self
            .db
            .iterator_cf(self.cf_config(), rocksdb::IteratorMode::Start);

        for item in iter {
            let (key, _) = item?;
            let key = String::from_utf8(key.to_vec())
                .map_err(|e| StorageError::Corrupt(format!("non-utf8 key: {}", e)))?;
            keys.push(key);
        }

        Ok(keys)
    }

    /// Dump the full contents of the store as raw key/value pairs.
    ///
    /// Snapshot primitive for the replicated state machine.
    pub fn export(&self) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError> {
        let mut pairs = Vec::new();
        let iter = self
            .db
            .iterator_cf(self.cf_config(), rocksdb::IteratorMode::Start);

        for item in iter {
            let (key, value) = item?;
            pairs.push((key.to_vec(), value.to_vec()));
        }

        Ok(pairs)
    }

    /// Replace the full contents of the store with `pairs`.
    ///
    /// Restore primitive for snapshot installation: existing entries are
    /// cleared first so the result is exactly the snapshot state.
    pub fn import(&self, pairs: Vec<(Vec<u8>, Vec<u8>)>) -> Result<(), StorageError> {
        let mut batch = rocksdb::WriteBatch::default();
        let iter = self
            .db
            .iterator_cf(self.cf_config(), rocksdb::IteratorMode::Start);
        for item in iter {
            let (key, _) = item?;
            batch.delete_cf(self.cf_config(), &key);
        }
        self.db.write(batch)?;

        let mut batch = rocksdb::WriteBatch::default();
        for (key, value) in &pairs {
            batch.put_cf(self.cf_config(), key, value);
        }
        self.db.write(batch)?;

        info!(entries = pairs.len(), "restored store contents");
        Ok(())
    }

    /// Read a bookkeeping record from the meta column family.
    pub fn get_meta(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.db.get_cf(self.cf_meta(), key)?)
    }

    /// Write a bookkeeping record to the meta column family.
    pub fn put_meta(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        self.db.put_cf(self.cf_meta(), key, value)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_temp() -> (tempfile::TempDir, ConfigStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::open(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn test_put_get_round_trip() {
        let (_dir, store) = open_temp();

        store.put("database.url", b"postgres://db:5432").unwrap();
        let value = store.get("database.url").unwrap();

        assert_eq!(value, b"postgres://db:5432");
    }

    #[test]
    fn test_get_missing_key_is_not_found() {
        let (_dir, store) = open_temp();

        let err = store.get("absent").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_empty_key_put_is_noop() {
        let (_dir, store) = open_temp();

        store.put("", b"ignored").unwrap();

        assert!(store.list_keys().unwrap().is_empty());
    }

    #[test]
    fn test_delete_removes_key_from_listing() {
        let (_dir, store) = open_temp();

        store.put("a", b"1").unwrap();
        store.put("b", b"2").unwrap();
        store.delete("a").unwrap();

        assert!(store.get("a").unwrap_err().is_not_found());
        assert_eq!(store.list_keys().unwrap(), vec!["b".to_string()]);
    }

    #[test]
    fn test_delete_absent_key_succeeds() {
        let (_dir, store) = open_temp();

        store.delete("never-stored").unwrap();
    }

    #[test]
    fn test_overwrite_updates_value() {
        let (_dir, store) = open_temp();

        store.put("feature.flag", b"off").unwrap();
        store.put("feature.flag", b"on").unwrap();

        assert_eq!(store.get("feature.flag").unwrap(), b"on");
        assert_eq!(store.list_keys().unwrap().len(), 1);
    }

    #[test]
    fn test_values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = ConfigStore::open(dir.path()).unwrap();
            store.put("persisted", b"yes").unwrap();
        }

        let store = ConfigStore::open(dir.path()).unwrap();
        assert_eq!(store.get("persisted").unwrap(), b"yes");
    }

    #[test]
    fn test_export_import_replaces_contents() {
        let (_dir, source) = open_temp();
        source.put("k1", b"v1").unwrap();
        source.put("k2", b"v2").unwrap();

        let (_dir2, target) = open_temp();
        target.put("stale", b"old").unwrap();

        target.import(source.export().unwrap()).unwrap();

        let mut keys = target.list_keys().unwrap();
        keys.sort();
        assert_eq!(keys, vec!["k1".to_string(), "k2".to_string()]);
        assert_eq!(target.get("k1").unwrap(), b"v1");
        assert!(target.get("stale").unwrap_err().is_not_found());
    }

    #[test]
    fn test_meta_round_trip() {
        let (_dir, store) = open_temp();

        assert!(store.get_meta(b"last_applied").unwrap().is_none());
        store.put_meta(b"last_applied", b"{\"index\":7}").unwrap();
        assert_eq!(
            store.get_meta(b"last_applied").unwrap().unwrap(),
            b"{\"index\":7}"
        );
    }
}
