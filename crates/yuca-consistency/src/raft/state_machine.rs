// Replicated state machine
// The single point where committed log entries become storage mutations

use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;

use openraft::storage::{RaftSnapshotBuilder, RaftStateMachine, Snapshot};
use openraft::{
    BasicNode, Entry, EntryPayload, ErrorSubject, ErrorVerb, LogId, OptionalSend, SnapshotMeta,
    StorageError, StoredMembership,
};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use yuca_storage::ConfigStore;

use super::request::{Command, CommandResponse};
use super::types::{NodeId, TypeConfig};

// Meta keys in the config store's bookkeeping column family
const KEY_LAST_APPLIED: &[u8] = b"last_applied";
const KEY_LAST_MEMBERSHIP: &[u8] = b"last_membership";

const SNAPSHOT_EXT: &str = "snap";

/// Helper to create StorageError for state machine operations
fn sm_error(
    e: impl std::error::Error + Send + Sync + 'static,
    verb: ErrorVerb,
) -> StorageError<NodeId> {
    StorageError::from_io_error(
        ErrorSubject::StateMachine,
        verb,
        std::io::Error::other(e.to_string()),
    )
}

/// On-disk snapshot file: raft metadata plus the serialized store dump.
#[derive(Serialize, Deserialize)]
struct SnapshotFile {
    meta: SnapshotMeta<NodeId, BasicNode>,
    data: Vec<u8>,
}

/// State machine applying committed commands to the [`ConfigStore`].
///
/// The consensus layer invokes `apply` strictly one call at a time, in
/// increasing log-index order; no additional synchronization is layered on
/// top of that contract. Snapshots capture the full store contents and are
/// persisted under the snapshot directory, pruned to the configured
/// retention count.
pub struct KvStateMachine {
    store: Arc<ConfigStore>,
    snapshot_dir: PathBuf,
    snapshot_retain: usize,
    /// Last applied log ID
    last_applied: RwLock<Option<LogId<NodeId>>>,
    /// Last membership configuration
    last_membership: RwLock<StoredMembership<NodeId, BasicNode>>,
}

impl KvStateMachine {
    pub async fn new(
        store: Arc<ConfigStore>,
        snapshot_dir: PathBuf,
        snapshot_retain: usize,
    ) -> Result<Self, StorageError<NodeId>> {
        std::fs::create_dir_all(&snapshot_dir).map_err(|e| sm_error(e, ErrorVerb::Write))?;

        let sm = Self {
            store,
            snapshot_dir,
            snapshot_retain,
            last_applied: RwLock::new(None),
            last_membership: RwLock::new(StoredMembership::default()),
        };

        sm.load_applied_state().await?;

        info!("state machine initialized");
        Ok(sm)
    }

    /// Direct access to the underlying store, for the read path.
    pub fn store(&self) -> Arc<ConfigStore> {
        self.store.clone()
    }

    /// Reload the persisted applied-state bookkeeping on startup.
    async fn load_applied_state(&self) -> Result<(), StorageError<NodeId>> {
        if let Some(bytes) = self
            .store
            .get_meta(KEY_LAST_APPLIED)
            .map_err(|e| sm_error(e, ErrorVerb::Read))?
        {
            let log_id: LogId<NodeId> =
                serde_json::from_slice(&bytes).map_err(|e| sm_error(e, ErrorVerb::Read))?;
            *self.last_applied.write().await = Some(log_id);
        }

        if let Some(bytes) = self
            .store
            .get_meta(KEY_LAST_MEMBERSHIP)
            .map_err(|e| sm_error(e, ErrorVerb::Read))?
        {
            let membership: StoredMembership<NodeId, BasicNode> =
                serde_json::from_slice(&bytes).map_err(|e| sm_error(e, ErrorVerb::Read))?;
            *self.last_membership.write().await = membership;
        }

        Ok(())
    }

    async fn save_last_applied(&self, log_id: LogId<NodeId>) -> Result<(), StorageError<NodeId>> {
        let bytes = serde_json::to_vec(&log_id).map_err(|e| sm_error(e, ErrorVerb::Write))?;
        self.store
            .put_meta(KEY_LAST_APPLIED, &bytes)
            .map_err(|e| sm_error(e, ErrorVerb::Write))?;

        *self.last_applied.write().await = Some(log_id);
        Ok(())
    }

    async fn save_membership(
        &self,
        membership: StoredMembership<NodeId, BasicNode>,
    ) -> Result<(), StorageError<NodeId>> {
        let bytes = serde_json::to_vec(&membership).map_err(|e| sm_error(e, ErrorVerb::Write))?;
        self.store
            .put_meta(KEY_LAST_MEMBERSHIP, &bytes)
            .map_err(|e| sm_error(e, ErrorVerb::Write))?;

        *self.last_membership.write().await = membership;
        Ok(())
    }

    /// Apply one command to the store.
    ///
    /// An engine failure is reported through the response, visible to the
    /// node that originated the write; later entries keep applying.
    fn apply_command(&self, cmd: &Command) -> CommandResponse {
        if cmd.key.is_empty() {
            return CommandResponse::success();
        }

        let result = if cmd.is_tombstone() {
            self.store.delete(&cmd.key)
        } else {
            self.store.put(&cmd.key, cmd.value.as_deref().unwrap_or(&[]))
        };

        match result {
            Ok(()) => {
                debug!(key = %cmd.key, tombstone = cmd.is_tombstone(), "applied command");
                CommandResponse::success()
            }
            Err(e) => {
                error!(key = %cmd.key, "failed to apply command: {}", e);
                CommandResponse::failure(format!("failed to apply {}: {}", cmd.key, e))
            }
        }
    }

    /// Write a snapshot file and prune old ones down to the retention count.
    fn persist_snapshot(
        &self,
        meta: &SnapshotMeta<NodeId, BasicNode>,
        data: &[u8],
    ) -> Result<(), StorageError<NodeId>> {
        let file = SnapshotFile {
            meta: meta.clone(),
            data: data.to_vec(),
        };
        let bytes = serde_json::to_vec(&file).map_err(|e| sm_error(e, ErrorVerb::Write))?;

        let path = self
            .snapshot_dir
            .join(format!("{}.{}", meta.snapshot_id, SNAPSHOT_EXT));
        std::fs::write(&path, bytes).map_err(|e| sm_error(e, ErrorVerb::Write))?;

        self.prune_snapshots();
        Ok(())
    }

    /// Best-effort pruning; a failure to remove an old snapshot never fails
    /// the snapshot that was just written.
    fn prune_snapshots(&self) {
        let Ok(entries) = std::fs::read_dir(&self.snapshot_dir) else {
            return;
        };

        let mut snapshots: Vec<(PathBuf, std::time::SystemTime)> = entries
            .flatten()
            .filter(|e| e.path().extension().is_some_and(|ext| ext == SNAPSHOT_EXT))
            .filter_map(|e| {
                let modified = e.metadata().ok()?.modified().ok()?;
                Some((e.path(), modified))
            })
            .collect();

        snapshots.sort_by(|a, b| b.1.cmp(&a.1));

        for (path, _) in snapshots.into_iter().skip(self.snapshot_retain) {
            if let Err(e) = std::fs::remove_file(&path) {
                warn!(path = %path.display(), "failed to prune snapshot: {}", e);
            }
        }
    }

    /// Load the most recent snapshot file, if any.
    fn load_latest_snapshot(&self) -> Result<Option<SnapshotFile>, StorageError<NodeId>> {
        let entries =
            std::fs::read_dir(&self.snapshot_dir).map_err(|e| sm_error(e, ErrorVerb::Read))?;

        let mut latest: Option<SnapshotFile> = None;
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.extension().is_some_and(|ext| ext == SNAPSHOT_EXT) {
                continue;
            }

            let bytes = std::fs::read(&path).map_err(|e| sm_error(e, ErrorVerb::Read))?;
            let file: SnapshotFile = match serde_json::from_slice(&bytes) {
                Ok(file) => file,
                Err(e) => {
                    warn!(path = %path.display(), "skipping unreadable snapshot: {}", e);
                    continue;
                }
            };

            if latest
                .as_ref()
                .is_none_or(|l| file.meta.last_log_id > l.meta.last_log_id)
            {
                latest = Some(file);
            }
        }

        Ok(latest)
    }
}

impl RaftSnapshotBuilder<TypeConfig> for KvStateMachine {
    async fn build_snapshot(&mut self) -> Result<Snapshot<TypeConfig>, StorageError<NodeId>> {
        let last_applied = *self.last_applied.read().await;
        let last_membership = self.last_membership.read().await.clone();

        let snapshot_id = format!(
            "snapshot-{}-{}",
            last_applied.map(|l| l.index).unwrap_or(0),
            chrono::Utc::now().timestamp_millis()
        );

        let meta = SnapshotMeta {
            last_log_id: last_applied,
            last_membership,
            snapshot_id,
        };

        let pairs = self
            .store
            .export()
            .map_err(|e| sm_error(e, ErrorVerb::Read))?;
        let data = serde_json::to_vec(&pairs).map_err(|e| sm_error(e, ErrorVerb::Write))?;

        self.persist_snapshot(&meta, &data)?;

        info!(
            snapshot_id = %meta.snapshot_id,
            entries = pairs.len(),
            "built snapshot"
        );

        Ok(Snapshot {
            meta,
            snapshot: Box::new(Cursor::new(data)),
        })
    }
}

impl RaftStateMachine<TypeConfig> for KvStateMachine {
    type SnapshotBuilder = Self;

    async fn applied_state(
        &mut self,
    ) -> Result<(Option<LogId<NodeId>>, StoredMembership<NodeId, BasicNode>), StorageError<NodeId>>
    {
        let last_applied = *self.last_applied.read().await;
        let last_membership = self.last_membership.read().await.clone();
        Ok((last_applied, last_membership))
    }

    async fn apply<I>(&mut self, entries: I) -> Result<Vec<CommandResponse>, StorageError<NodeId>>
    where
        I: IntoIterator<Item = Entry<TypeConfig>> + OptionalSend,
        I::IntoIter: OptionalSend,
    {
        let mut responses = Vec::new();

        for entry in entries {
            let log_id = entry.log_id;

            let response = match entry.payload {
                EntryPayload::Normal(cmd) => self.apply_command(&cmd),
                EntryPayload::Membership(membership) => {
                    let stored = StoredMembership::new(Some(log_id), membership);
                    self.save_membership(stored).await?;
                    CommandResponse::success()
                }
                EntryPayload::Blank => CommandResponse::success(),
            };

            self.save_last_applied(log_id).await?;
            responses.push(response);
        }

        Ok(responses)
    }

    async fn get_snapshot_builder(&mut self) -> Self::SnapshotBuilder {
        KvStateMachine {
            store: self.store.clone(),
            snapshot_dir: self.snapshot_dir.clone(),
            snapshot_retain: self.snapshot_retain,
            last_applied: RwLock::new(*self.last_applied.read().await),
            last_membership: RwLock::new(self.last_membership.read().await.clone()),
        }
    }

    async fn begin_receiving_snapshot(
        &mut self,
    ) -> Result<Box<Cursor<Vec<u8>>>, StorageError<NodeId>> {
        Ok(Box::new(Cursor::new(Vec::new())))
    }

    async fn install_snapshot(
        &mut self,
        meta: &SnapshotMeta<NodeId, BasicNode>,
        snapshot: Box<Cursor<Vec<u8>>>,
    ) -> Result<(), StorageError<NodeId>> {
        let data = snapshot.into_inner();

        if !data.is_empty() {
            let pairs: Vec<(Vec<u8>, Vec<u8>)> =
                serde_json::from_slice(&data).map_err(|e| sm_error(e, ErrorVerb::Read))?;
            self.store
                .import(pairs)
                .map_err(|e| sm_error(e, ErrorVerb::Write))?;
        }

        self.persist_snapshot(meta, &data)?;

        if let Some(log_id) = meta.last_log_id {
            self.save_last_applied(log_id).await?;
        }
        self.save_membership(meta.last_membership.clone()).await?;

        info!(snapshot_id = %meta.snapshot_id, "installed snapshot");
        Ok(())
    }

    async fn get_current_snapshot(
        &mut self,
    ) -> Result<Option<Snapshot<TypeConfig>>, StorageError<NodeId>> {
        let Some(file) = self.load_latest_snapshot()? else {
            return Ok(None);
        };

        Ok(Some(Snapshot {
            meta: file.meta,
            snapshot: Box::new(Cursor::new(file.data)),
        }))
    }
}
