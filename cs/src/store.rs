//! Core ClusterStore implementation

use fs2::FileExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{StoreError, StoreResult};

const STATE_FILE: &str = "state.json";
const LOCK_FILE: &str = ".lock";

/// Current wall-clock time in unix milliseconds
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// A time-bound claim designating one member as the primary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderRecord {
    /// Member name holding the lease
    pub name: String,
    /// When the lease was first acquired (unix ms)
    pub acquired_at: i64,
    /// When the lease lapses unless renewed (unix ms)
    pub expires_at: i64,
}

impl LeaderRecord {
    pub fn is_expired_at(&self, now: i64) -> bool {
        now >= self.expires_at
    }
}

/// Everything the store knows about one cluster scope
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterState {
    /// Bumped on every applied write
    pub version: u64,
    /// Cluster-wide dynamic configuration
    pub config: Option<Value>,
    /// Bumped only when `config` changes
    pub config_version: u64,
    /// Current leader lease, possibly expired
    pub leader: Option<LeaderRecord>,
}

impl ClusterState {
    /// Leader whose lease has not lapsed at `now`
    pub fn live_leader_at(&self, now: i64) -> Option<&LeaderRecord> {
        self.leader.as_ref().filter(|l| !l.is_expired_at(now))
    }

    pub fn live_leader(&self) -> Option<&LeaderRecord> {
        self.live_leader_at(now_ms())
    }
}

/// Result of a write attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Update {
    /// Whether the write changed anything
    pub applied: bool,
    /// Store version after the attempt
    pub version: u64,
}

/// Held lock on the scope directory; released on drop
struct LockGuard {
    file: File,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

/// File-backed coordination store for a single cluster scope
///
/// ```text
/// <base>/
/// └── <scope>/
///     ├── .lock        # fs2 advisory lock
///     └── state.json   # ClusterState
/// ```
#[derive(Debug, Clone)]
pub struct ClusterStore {
    dir: PathBuf,
    scope: String,
}

impl ClusterStore {
    /// Open or create the store for `scope` under `base`
    pub fn open(base: impl AsRef<Path>, scope: &str) -> StoreResult<Self> {
        let dir = base.as_ref().join(scope);
        fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;
        debug!(?dir, scope, "Opened cluster store");
        Ok(Self {
            dir,
            scope: scope.to_string(),
        })
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    fn state_path(&self) -> PathBuf {
        self.dir.join(STATE_FILE)
    }

    fn lock(&self, exclusive: bool) -> StoreResult<LockGuard> {
        let path = self.dir.join(LOCK_FILE);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|e| StoreError::io(&path, e))?;
        let locked = if exclusive {
            FileExt::lock_exclusive(&file)
        } else {
            FileExt::lock_shared(&file)
        };
        locked.map_err(|e| StoreError::io(&path, e))?;
        Ok(LockGuard { file })
    }

    fn read_state(&self) -> StoreResult<ClusterState> {
        let path = self.state_path();
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(ClusterState::default()),
            Err(e) => return Err(StoreError::io(&path, e)),
        };
        serde_json::from_str(&content).map_err(|source| StoreError::Corrupt { path, source })
    }

    fn write_state(&self, state: &ClusterState) -> StoreResult<()> {
        let path = self.state_path();
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_vec_pretty(state).map_err(|source| StoreError::Corrupt {
            path: path.clone(),
            source,
        })?;

        let mut file = File::create(&tmp).map_err(|e| StoreError::io(&tmp, e))?;
        file.write_all(&json).map_err(|e| StoreError::io(&tmp, e))?;
        file.sync_all().map_err(|e| StoreError::io(&tmp, e))?;
        fs::rename(&tmp, &path).map_err(|e| StoreError::io(&path, e))?;
        Ok(())
    }

    /// Read the whole cluster state
    pub fn load(&self) -> StoreResult<ClusterState> {
        let _guard = self.lock(false)?;
        self.read_state()
    }

    /// Read only the store version (cheap change detection)
    pub fn version(&self) -> StoreResult<u64> {
        Ok(self.load()?.version)
    }

    /// Apply `f` under the exclusive lock, persisting if it reports a change
    fn update<F>(&self, f: F) -> StoreResult<Update>
    where
        F: FnOnce(&mut ClusterState) -> StoreResult<bool>,
    {
        let _guard = self.lock(true)?;
        let mut state = self.read_state()?;
        if !f(&mut state)? {
            return Ok(Update {
                applied: false,
                version: state.version,
            });
        }
        state.version += 1;
        self.write_state(&state)?;
        Ok(Update {
            applied: true,
            version: state.version,
        })
    }

    /// Replace the cluster configuration
    ///
    /// With `expected = Some(v)` the write only happens if the stored
    /// `config_version` is still `v`. Writing an identical config is a no-op.
    pub fn set_config(&self, config: Value, expected: Option<u64>) -> StoreResult<Update> {
        let update = self.update(|state| {
            if let Some(expected) = expected
                && state.config_version != expected
            {
                return Err(StoreError::Conflict {
                    expected,
                    actual: state.config_version,
                });
            }
            if state.config.as_ref() == Some(&config) {
                return Ok(false);
            }
            state.config = Some(config);
            state.config_version += 1;
            Ok(true)
        })?;
        if update.applied {
            info!(scope = %self.scope, version = update.version, "Cluster config updated");
        }
        Ok(update)
    }

    /// Claim the leader lease for `name`
    ///
    /// Succeeds when there is no leader, the lease has lapsed, or `name`
    /// already holds it (in which case it is renewed).
    pub fn acquire_leader(&self, name: &str, ttl: Duration) -> StoreResult<Update> {
        let now = now_ms();
        self.update(|state| {
            let acquired_at = match state.live_leader_at(now) {
                Some(leader) if leader.name != name => return Ok(false),
                Some(leader) => leader.acquired_at,
                None => now,
            };
            state.leader = Some(LeaderRecord {
                name: name.to_string(),
                acquired_at,
                expires_at: now + ttl.as_millis() as i64,
            });
            Ok(true)
        })
    }

    /// Renew the lease, only if `name` still holds it
    pub fn update_leader(&self, name: &str, ttl: Duration) -> StoreResult<Update> {
        let now = now_ms();
        self.update(|state| match state.leader.as_mut() {
            Some(leader) if leader.name == name && !leader.is_expired_at(now) => {
                leader.expires_at = now + ttl.as_millis() as i64;
                Ok(true)
            }
            _ => Ok(false),
        })
    }

    /// Release the lease, only if `name` holds it
    pub fn delete_leader(&self, name: &str) -> StoreResult<Update> {
        let update = self.update(|state| match &state.leader {
            Some(leader) if leader.name == name => {
                state.leader = None;
                Ok(true)
            }
            _ => Ok(false),
        })?;
        if update.applied {
            info!(scope = %self.scope, name, "Leader record deleted");
        }
        Ok(update)
    }

    /// Drop whatever lease exists (operator override)
    pub fn remove_leader(&self) -> StoreResult<Update> {
        self.update(|state| Ok(state.leader.take().is_some()))
    }
}
