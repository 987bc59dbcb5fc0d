//! Snapshot persistence: version-tagged JSON written atomically.
//!
//! `write_atomic` writes to `path.tmp`, fsyncs, then renames onto `path`;
//! an advisory `path.lock` file excludes concurrent writers. Loading
//! rebuilds the spatial index; a parse failure leaves the world empty so
//! the caller can bootstrap instead.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use grimbox_domain::{EntityId, Position, SessionId, Spell};

use crate::game::GameState;
use crate::session::SessionRegistry;

/// Current snapshot format version. Older versions load with defaults
/// for missing fields; unknown fields are ignored.
pub const SNAPSHOT_VERSION: u32 = 1;

/// The durable part of a session: enough to rebind a returning player.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub id: SessionId,
    pub player: EntityId,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Everything a restart needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub state: GameState,
    #[serde(default)]
    pub sessions: Vec<SessionSnapshot>,
    #[serde(default)]
    pub spells: Vec<Spell>,
    /// Seed the world was generated from, for PCG continuity
    #[serde(default)]
    pub world_seed: u64,
    /// Spawn tile for new players
    pub entry: Position,
}

impl Snapshot {
    /// Capture a snapshot from state held under the world read lock.
    /// Copies only; no I/O happens here.
    pub fn capture(
        state: &GameState,
        sessions: &SessionRegistry,
        spells: Vec<Spell>,
        world_seed: u64,
        entry: Position,
    ) -> Self {
        let sessions = sessions
            .iter_sessions()
            .into_iter()
            .map(|session| SessionSnapshot {
                id: session.id,
                player: session.player,
                created_at: session.created_at,
                expires_at: session.expires_at(),
            })
            .collect();
        Self {
            version: SNAPSHOT_VERSION,
            saved_at: Utc::now(),
            state: state.clone(),
            sessions,
            spells,
            world_seed,
            entry,
        }
    }
}

/// Guard for the advisory writer lock; removes the lock file on drop.
struct LockFile {
    path: PathBuf,
}

impl LockFile {
    fn acquire(snapshot_path: &Path) -> Result<Self> {
        let path = lock_path(snapshot_path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating data dir {}", parent.display()))?;
        }
        OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .with_context(|| {
                format!(
                    "another writer holds the snapshot lock {}",
                    path.display()
                )
            })?;
        Ok(Self { path })
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), %err, "failed to remove lock file");
        }
    }
}

fn lock_path(snapshot_path: &Path) -> PathBuf {
    let mut path = snapshot_path.as_os_str().to_owned();
    path.push(".lock");
    PathBuf::from(path)
}

fn tmp_path(snapshot_path: &Path) -> PathBuf {
    let mut path = snapshot_path.as_os_str().to_owned();
    path.push(".tmp");
    PathBuf::from(path)
}

/// Write the snapshot atomically: tmp file, fsync, rename. The advisory
/// lock file excludes concurrent writers for the duration.
pub fn write_atomic(snapshot: &Snapshot, path: &Path) -> Result<()> {
    let _lock = LockFile::acquire(path)?;

    let bytes = serde_json::to_vec_pretty(snapshot).context("serializing snapshot")?;
    let tmp = tmp_path(path);
    {
        let mut file = File::create(&tmp)
            .with_context(|| format!("creating {}", tmp.display()))?;
        file.write_all(&bytes)
            .with_context(|| format!("writing {}", tmp.display()))?;
        file.sync_all()
            .with_context(|| format!("fsync {}", tmp.display()))?;
    }
    fs::rename(&tmp, path)
        .with_context(|| format!("renaming {} over {}", tmp.display(), path.display()))?;

    tracing::debug!(path = %path.display(), bytes = bytes.len(), "snapshot written");
    Ok(())
}

/// Load and reconstruct a snapshot. The spatial index is derived state
/// and is rebuilt here.
pub fn load(path: &Path) -> Result<Snapshot> {
    let bytes =
        fs::read(path).with_context(|| format!("reading snapshot {}", path.display()))?;
    let mut snapshot: Snapshot =
        serde_json::from_slice(&bytes).context("parsing snapshot")?;
    if snapshot.version > SNAPSHOT_VERSION {
        anyhow::bail!(
            "snapshot version {} is newer than supported {}",
            snapshot.version,
            SNAPSHOT_VERSION
        );
    }
    snapshot.state.world.rebuild_spatial_index();
    Ok(snapshot)
}
