//! Pool Data Source - snapshot ingest and change notification
//!
//! Snapshots are read from JSON files written by an external indexer. Each
//! publish produces a new immutable `PoolSnapshot` behind an `Arc` and wakes
//! every subscriber through a watch channel.

use alloy_primitives::BlockNumber;
use chrono::{DateTime, Utc};
use eyre::{eyre, Result, WrapErr};
use serde::Deserialize;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::validation::{parse_pools, ValidationReport};
use crate::tokens::{Pool, PoolMap};

// ============================================
// SNAPSHOT
// ============================================

/// Immutable view of all pools known at one point in time
#[derive(Debug, Clone)]
pub struct PoolSnapshot {
    pub chain: String,
    pub pools: Arc<PoolMap>,
    /// Increases by one per publish. 0 means nothing has been published yet.
    pub version: u64,
}

/// Cheap identity of a snapshot used as a memoization key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SnapshotIdentity {
    pub version: u64,
    pools_ptr: usize,
}

impl PoolSnapshot {
    pub fn empty(chain: impl Into<String>) -> Self {
        Self {
            chain: chain.into(),
            pools: Arc::new(PoolMap::new()),
            version: 0,
        }
    }

    pub fn identity(&self) -> SnapshotIdentity {
        SnapshotIdentity {
            version: self.version,
            pools_ptr: Arc::as_ptr(&self.pools) as usize,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Pool> {
        self.pools.values()
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    /// True once the source has published at least once
    pub fn is_loaded(&self) -> bool {
        self.version > 0
    }
}

// ============================================
// DATA SOURCE
// ============================================

/// Single writer for pool snapshots
pub struct PoolDataSource {
    tx: watch::Sender<Arc<PoolSnapshot>>,
}

impl PoolDataSource {
    /// Start with an empty, unpublished snapshot for `chain`
    pub fn new(chain: impl Into<String>) -> Self {
        let (tx, _rx) = watch::channel(Arc::new(PoolSnapshot::empty(chain)));
        Self { tx }
    }

    pub fn current(&self) -> Arc<PoolSnapshot> {
        Arc::clone(&self.tx.borrow())
    }

    pub fn selected_chain(&self) -> String {
        self.tx.borrow().chain.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<PoolSnapshot>> {
        self.tx.subscribe()
    }

    /// Replace the current snapshot and notify subscribers
    pub fn publish(&self, chain: impl Into<String>, pools: PoolMap) -> Arc<PoolSnapshot> {
        let version = self.tx.borrow().version + 1;
        let snapshot = Arc::new(PoolSnapshot {
            chain: chain.into(),
            pools: Arc::new(pools),
            version,
        });

        info!(
            chain = %snapshot.chain,
            pools = snapshot.len(),
            version,
            "Published pool snapshot"
        );

        self.tx.send_replace(Arc::clone(&snapshot));
        snapshot
    }
}

// ============================================
// SNAPSHOT FILES
// ============================================

/// Block stamp carried by a snapshot file
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BlockStamp {
    pub number: BlockNumber,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// A parsed and validated snapshot file
#[derive(Debug, Clone)]
pub struct LoadedSnapshot {
    pub chain: Option<String>,
    pub block: Option<BlockStamp>,
    pub pools: PoolMap,
    pub report: ValidationReport,
}

/// Parse snapshot JSON. Only an unparseable document or a missing `pools`
/// field is an error; bad records inside are skipped and reported.
pub fn parse_snapshot(json: &str) -> Result<LoadedSnapshot> {
    let root: Value = serde_json::from_str(json).wrap_err("Snapshot is not valid JSON")?;

    let raw_pools = root
        .get("pools")
        .ok_or_else(|| eyre!("Snapshot has no pools field"))?;

    let chain = root.get("chain").and_then(Value::as_str).map(String::from);

    let block = match root.get("block") {
        None | Some(Value::Null) => None,
        Some(raw) => match serde_json::from_value::<BlockStamp>(raw.clone()) {
            Ok(stamp) => Some(stamp),
            Err(e) => {
                warn!("Ignoring malformed block stamp: {}", e);
                None
            }
        },
    };

    let mut report = ValidationReport::default();
    let pools = parse_pools(raw_pools, &mut report);

    Ok(LoadedSnapshot {
        chain,
        block,
        pools,
        report,
    })
}

pub fn load_snapshot_file<P: AsRef<Path>>(path: P) -> Result<LoadedSnapshot> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .wrap_err_with(|| format!("Failed to read snapshot {}", path.display()))?;
    let loaded = parse_snapshot(&content)?;

    if loaded.report.is_clean() {
        debug!("Loaded {}: {}", path.display(), loaded.report.summary());
    } else {
        warn!("Loaded {} with issues: {}", path.display(), loaded.report.summary());
    }

    Ok(loaded)
}

/// Re-reads a snapshot file whenever its modification time changes
#[derive(Debug)]
pub struct SnapshotWatcher {
    path: PathBuf,
    last_modified: Option<SystemTime>,
}

impl SnapshotWatcher {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            last_modified: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the file if it changed since the last successful poll.
    /// Returns `Ok(None)` when nothing changed.
    pub fn poll(&mut self) -> Result<Option<LoadedSnapshot>> {
        let modified = fs::metadata(&self.path)
            .and_then(|m| m.modified())
            .wrap_err_with(|| format!("Cannot stat snapshot {}", self.path.display()))?;

        if self.last_modified == Some(modified) {
            return Ok(None);
        }

        let loaded = load_snapshot_file(&self.path)?;
        self.last_modified = Some(modified);
        Ok(Some(loaded))
    }
}
