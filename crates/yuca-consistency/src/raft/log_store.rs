// RocksDB-backed raft log store
// Owns the consensus log directory; keys are big-endian log indexes so the
// engine's byte order matches log order

#![allow(clippy::result_large_err)]

use std::fmt::Debug;
use std::ops::RangeBounds;
use std::path::Path;
use std::sync::Arc;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use openraft::storage::{LogFlushed, LogState, RaftLogStorage};
use openraft::{
    Entry, ErrorSubject, ErrorVerb, LogId, OptionalSend, RaftLogReader, StorageError, Vote,
};
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, Options};
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::types::{NodeId, TypeConfig};

const CF_LOGS: &str = "logs";
const CF_STATE: &str = "state";

const KEY_VOTE: &[u8] = b"vote";
const KEY_LAST_PURGED: &[u8] = b"last_purged";

fn vote_error(
    e: impl std::error::Error + Send + Sync + 'static,
    verb: ErrorVerb,
) -> StorageError<NodeId> {
    StorageError::from_io_error(
        ErrorSubject::Vote,
        verb,
        std::io::Error::other(e.to_string()),
    )
}

fn log_error(
    e: impl std::error::Error + Send + Sync + 'static,
    verb: ErrorVerb,
) -> StorageError<NodeId> {
    StorageError::from_io_error(
        ErrorSubject::Logs,
        verb,
        std::io::Error::other(e.to_string()),
    )
}

/// Cached bookkeeping, kept in sync with the persisted state column family.
#[derive(Clone, Copy, Default)]
struct LogBookkeeping {
    vote: Option<Vote<NodeId>>,
    last_log_id: Option<LogId<NodeId>>,
    last_purged: Option<LogId<NodeId>>,
}

/// Raft log storage on a dedicated RocksDB instance.
pub struct LogStore {
    db: Arc<DB>,
    meta: RwLock<LogBookkeeping>,
}

impl LogStore {
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError<NodeId>> {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_compression_type(rocksdb::DBCompressionType::Lz4);

        let cfs = vec![
            ColumnFamilyDescriptor::new(CF_LOGS, Options::default()),
            ColumnFamilyDescriptor::new(CF_STATE, Options::default()),
        ];

        let db =
            DB::open_cf_descriptors(&db_opts, path, cfs).map_err(|e| log_error(e, ErrorVerb::Read))?;

        let store = Self {
            db: Arc::new(db),
            meta: RwLock::new(LogBookkeeping::default()),
        };
        store.reload_bookkeeping().await?;

        info!("raft log store opened");
        Ok(store)
    }

    async fn reload_bookkeeping(&self) -> Result<(), StorageError<NodeId>> {
        let vote = match self
            .db
            .get_cf(self.cf_state(), KEY_VOTE)
            .map_err(|e| vote_error(e, ErrorVerb::Read))?
        {
            Some(bytes) => {
                Some(serde_json::from_slice(&bytes).map_err(|e| vote_error(e, ErrorVerb::Read))?)
            }
            None => None,
        };

        let last_purged = match self
            .db
            .get_cf(self.cf_state(), KEY_LAST_PURGED)
            .map_err(|e| log_error(e, ErrorVerb::Read))?
        {
            Some(bytes) => {
                Some(serde_json::from_slice(&bytes).map_err(|e| log_error(e, ErrorVerb::Read))?)
            }
            None => None,
        };

        // The newest entry, if any, carries the last log id.
        let mut iter = self.db.raw_iterator_cf(self.cf_logs());
        iter.seek_to_last();
        let last_log_id = match iter.value() {
            Some(bytes) => Some(Self::decode_entry(bytes)?.log_id),
            None => last_purged,
        };

        *self.meta.write().await = LogBookkeeping {
            vote,
            last_log_id,
            last_purged,
        };
        Ok(())
    }

    /// Column families are created at open; a missing handle means the log
    /// database is corrupted beyond recovery.
    fn cf_logs(&self) -> &ColumnFamily {
        self.db
            .cf_handle(CF_LOGS)
            .expect("CF_LOGS must exist - log database may be corrupted")
    }

    fn cf_state(&self) -> &ColumnFamily {
        self.db
            .cf_handle(CF_STATE)
            .expect("CF_STATE must exist - log database may be corrupted")
    }

    /// Big-endian keys so lexicographic order equals index order.
    fn index_key(index: u64) -> Vec<u8> {
        let mut buf = Vec::with_capacity(8);
        buf.write_u64::<BigEndian>(index)
            .expect("writing to a Vec cannot fail");
        buf
    }

    #[allow(dead_code)]
    fn decode_index(bytes: &[u8]) -> u64 {
        std::io::Cursor::new(bytes)
            .read_u64::<BigEndian>()
            .unwrap_or(0)
    }

    fn encode_entry(entry: &Entry<TypeConfig>) -> Result<Vec<u8>, StorageError<NodeId>> {
        serde_json::to_vec(entry).map_err(|e| log_error(e, ErrorVerb::Write))
    }

    fn decode_entry(bytes: &[u8]) -> Result<Entry<TypeConfig>, StorageError<NodeId>> {
        serde_json::from_slice(bytes).map_err(|e| log_error(e, ErrorVerb::Read))
    }
}

impl RaftLogReader<TypeConfig> for LogStore {
    async fn try_get_log_entries<RB: RangeBounds<u64> + Clone + Debug + OptionalSend>(
        &mut self,
        range: RB,
    ) -> Result<Vec<Entry<TypeConfig>>, StorageError<NodeId>> {
        let start = match range.start_bound() {
            std::ops::Bound::Included(&n) => n,
            std::ops::Bound::Excluded(&n) => n + 1,
            std::ops::Bound::Unbounded => 0,
        };
        let end = match range.end_bound() {
            std::ops::Bound::Included(&n) => n + 1,
            std::ops::Bound::Excluded(&n) => n,
            std::ops::Bound::Unbounded => u64::MAX,
        };

        let end_key = Self::index_key(end);
        let mut entries = Vec::new();

        let mut iter = self.db.raw_iterator_cf(self.cf_logs());
        iter.seek(Self::index_key(start));
        while iter.valid() {
            if let (Some(key), Some(value)) = (iter.key(), iter.value()) {
                if key >= end_key.as_slice() {
                    break;
                }
                entries.push(Self::decode_entry(value)?);
            }
            iter.next();
        }

        debug!("read {} log entries from range {:?}", entries.len(), range);
        Ok(entries)
    }
}

impl RaftLogStorage<TypeConfig> for LogStore {
    type LogReader = Self;

    async fn get_log_state(&mut self) -> Result<LogState<TypeConfig>, StorageError<NodeId>> {
        let meta = *self.meta.read().await;
        Ok(LogState {
            last_purged_log_id: meta.last_purged,
            last_log_id: meta.last_log_id,
        })
    }

    async fn save_vote(&mut self, vote: &Vote<NodeId>) -> Result<(), StorageError<NodeId>> {
        let bytes = serde_json::to_vec(vote).map_err(|e| vote_error(e, ErrorVerb::Write))?;
        self.db
            .put_cf(self.cf_state(), KEY_VOTE, &bytes)
            .map_err(|e| vote_error(e, ErrorVerb::Write))?;

        self.meta.write().await.vote = Some(*vote);
        debug!("saved vote: {:?}", vote);
        Ok(())
    }

    async fn read_vote(&mut self) -> Result<Option<Vote<NodeId>>, StorageError<NodeId>> {
        Ok(self.meta.read().await.vote)
    }

    async fn get_log_reader(&mut self) -> Self::LogReader {
        // Arc<DB> makes this a cheap handle over the same log database.
        LogStore {
            db: self.db.clone(),
            meta: RwLock::new(*self.meta.read().await),
        }
    }

    async fn append<I>(
        &mut self,
        entries: I,
        callback: LogFlushed<TypeConfig>,
    ) -> Result<(), StorageError<NodeId>>
    where
        I: IntoIterator<Item = Entry<TypeConfig>> + OptionalSend,
        I::IntoIter: OptionalSend,
    {
        let entries: Vec<_> = entries.into_iter().collect();
        if entries.is_empty() {
            callback.log_io_completed(Ok(()));
            return Ok(());
        }

        let mut batch = rocksdb::WriteBatch::default();
        let mut last_log_id = None;
        for entry in &entries {
            batch.put_cf(
                self.cf_logs(),
                Self::index_key(entry.log_id.index),
                Self::encode_entry(entry)?,
            );
            last_log_id = Some(entry.log_id);
        }

        self.db
            .write(batch)
            .map_err(|e| log_error(e, ErrorVerb::Write))?;

        if let Some(log_id) = last_log_id {
            self.meta.write().await.last_log_id = Some(log_id);
        }

        debug!("appended {} log entries", entries.len());
        callback.log_io_completed(Ok(()));
        Ok(())
    }

    async fn truncate(&mut self, log_id: LogId<NodeId>) -> Result<(), StorageError<NodeId>> {
        // Drop every entry after log_id; log_id itself stays.
        let mut batch = rocksdb::WriteBatch::default();
        let mut iter = self.db.raw_iterator_cf(self.cf_logs());
        iter.seek(Self::index_key(log_id.index + 1));
        while iter.valid() {
            if let Some(key) = iter.key() {
                batch.delete_cf(self.cf_logs(), key);
            }
            iter.next();
        }

        self.db
            .write(batch)
            .map_err(|e| log_error(e, ErrorVerb::Write))?;

        self.meta.write().await.last_log_id = Some(log_id);
        debug!("truncated log after index {}", log_id.index);
        Ok(())
    }

    async fn purge(&mut self, log_id: LogId<NodeId>) -> Result<(), StorageError<NodeId>> {
        // Drop every entry up to and including log_id.
        let end_key = Self::index_key(log_id.index + 1);

        let mut batch = rocksdb::WriteBatch::default();
        let mut iter = self.db.raw_iterator_cf(self.cf_logs());
        iter.seek_to_first();
        while iter.valid() {
            if let Some(key) = iter.key() {
                if key >= end_key.as_slice() {
                    break;
                }
                batch.delete_cf(self.cf_logs(), key);
            }
            iter.next();
        }

        let purged_bytes =
            serde_json::to_vec(&log_id).map_err(|e| log_error(e, ErrorVerb::Write))?;
        batch.put_cf(self.cf_state(), KEY_LAST_PURGED, &purged_bytes);

        self.db
            .write(batch)
            .map_err(|e| log_error(e, ErrorVerb::Write))?;

        self.meta.write().await.last_purged = Some(log_id);
        debug!("purged log up to index {}", log_id.index);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_key_round_trip() {
        let index = 98765u64;
        assert_eq!(LogStore::decode_index(&LogStore::index_key(index)), index);
    }

    #[test]
    fn test_index_key_preserves_ordering() {
        let indices = [0u64, 1, 255, 256, 70000, u64::MAX];
        let keys: Vec<_> = indices.iter().map(|&i| LogStore::index_key(i)).collect();

        for pair in keys.windows(2) {
            assert!(pair[0] < pair[1], "key encoding must preserve index order");
        }
    }

    #[tokio::test]
    async fn test_vote_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let vote = Vote::new(7, 3);

        {
            let mut store = LogStore::open(dir.path()).await.unwrap();
            store.save_vote(&vote).await.unwrap();
        }

        let mut store = LogStore::open(dir.path()).await.unwrap();
        assert_eq!(store.read_vote().await.unwrap(), Some(vote));
    }
}
