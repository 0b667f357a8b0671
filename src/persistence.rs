//! Snapshot of mining state between batches.
//!
//! The snapshot is a versioned JSON document: clusters with their templates and
//! members, the trie as flat bucket records, and the last assigned line id. It is
//! written to a sibling temp file and renamed into place so a crash mid-write
//! leaves the previous snapshot intact. Loading never fails hard: a missing,
//! unreadable, malformed or inconsistent snapshot means a cold start.

use crate::registry::{Cluster, ClusterRegistry, LineId};
use crate::template::{Template, Token};
use crate::trie::{TrieIndex, TrieKey, TriePath, MAX_ANCHOR_DEPTH};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Bump whenever the on-disk layout changes incompatibly.
pub const SNAPSHOT_VERSION: u32 = 1;

pub const SNAPSHOT_FILE_NAME: &str = "logspell_state.json";

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("cannot create state directory '{path}': {source}")]
    CreateDir { path: PathBuf, source: std::io::Error },
    #[error("failed to serialize snapshot: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to write snapshot '{path}': {source}")]
    Write { path: PathBuf, source: std::io::Error },
}

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotFile {
    version: u32,
    anchor_depth: usize,
    max_line_id: LineId,
    clusters: Vec<ClusterRecord>,
    trie: Vec<TrieRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ClusterRecord {
    /// `null` marks a wildcard position.
    template: Vec<Option<String>>,
    line_ids: Vec<LineId>,
}

#[derive(Debug, Serialize, Deserialize)]
struct TrieRecord {
    length: usize,
    path: Vec<Option<String>>,
    clusters: Vec<usize>,
}

fn encode_token(token: &Token) -> Option<String> {
    match token {
        Token::Literal(s) => Some(s.clone()),
        Token::Wildcard => None,
    }
}

fn decode_token(raw: &Option<String>) -> Token {
    raw.as_ref().map_or(Token::Wildcard, |s| Token::Literal(s.clone()))
}

fn encode_key(key: &TrieKey) -> Option<String> {
    match key {
        TrieKey::Literal(s) => Some(s.clone()),
        TrieKey::Wildcard => None,
    }
}

fn decode_key(raw: &Option<String>) -> TrieKey {
    raw.as_ref().map_or(TrieKey::Wildcard, |s| TrieKey::Literal(s.clone()))
}

/// Restored state handed to the miner at the start of a run.
#[derive(Debug, Clone)]
pub struct PersistedState {
    pub clusters: Vec<Cluster>,
    pub trie: TrieIndex,
    pub max_line_id: LineId,
}

impl PersistedState {
    pub fn empty(anchor_depth: usize) -> Self {
        Self {
            clusters: Vec::new(),
            trie: TrieIndex::new(anchor_depth),
            max_line_id: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    pub fn into_registry(self, tau: f64) -> Result<ClusterRegistry, crate::registry::RegistryError> {
        ClusterRegistry::from_parts(self.clusters, self.trie, tau)
    }
}

/// File-backed snapshot location.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    /// Store using the default file name inside `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        Self { path: dir.join(SNAPSHOT_FILE_NAME) }
    }

    pub fn at(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes the registry atomically (temp file, fsync, rename).
    pub fn save(&self, registry: &ClusterRegistry) -> Result<(), PersistError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| PersistError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let snapshot = SnapshotFile {
            version: SNAPSHOT_VERSION,
            anchor_depth: registry.trie().anchor_depth(),
            max_line_id: registry.max_line_id(),
            clusters: registry
                .clusters()
                .iter()
                .map(|c| ClusterRecord {
                    template: c.template.tokens().iter().map(encode_token).collect(),
                    line_ids: c.line_ids.clone(),
                })
                .collect(),
            trie: registry
                .trie()
                .paths()
                .into_iter()
                .map(|p| TrieRecord {
                    length: p.length,
                    path: p.keys.iter().map(encode_key).collect(),
                    clusters: p.clusters,
                })
                .collect(),
        };
        let bytes = serde_json::to_vec(&snapshot)?;

        let tmp = self.path.with_extension("json.tmp");
        let write = |path: &Path| -> std::io::Result<()> {
            let mut file = std::fs::File::create(path)?;
            file.write_all(&bytes)?;
            file.sync_all()
        };
        write(&tmp).map_err(|source| PersistError::Write { path: tmp.clone(), source })?;
        std::fs::rename(&tmp, &self.path).map_err(|source| {
            let _ = std::fs::remove_file(&tmp);
            PersistError::Write { path: self.path.clone(), source }
        })?;

        tracing::debug!(
            path = %self.path.display(),
            clusters = registry.len(),
            max_line_id = registry.max_line_id(),
            "snapshot saved"
        );
        Ok(())
    }

    /// Loads the snapshot, or empty state on any problem.
    ///
    /// `anchor_depth` is the depth the caller wants to index with; a snapshot written
    /// with another depth, or whose trie disagrees with its templates, has its trie
    /// rebuilt from the cluster templates.
    pub fn load(&self, anchor_depth: usize) -> PersistedState {
        let anchor_depth = anchor_depth.min(MAX_ANCHOR_DEPTH);
        match self.try_load(anchor_depth) {
            Ok(state) => state,
            Err(reason) => {
                tracing::warn!(path = %self.path.display(), reason = %reason, "snapshot unusable, starting fresh");
                PersistedState::empty(anchor_depth)
            }
        }
    }

    fn try_load(&self, anchor_depth: usize) -> Result<PersistedState, String> {
        let content = match std::fs::read(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "no snapshot, cold start");
                return Ok(PersistedState::empty(anchor_depth));
            }
            Err(e) => return Err(format!("read failed: {e}")),
        };

        let file: SnapshotFile =
            serde_json::from_slice(&content).map_err(|e| format!("malformed snapshot: {e}"))?;
        if file.version != SNAPSHOT_VERSION {
            return Err(format!(
                "version mismatch (found {}, expected {SNAPSHOT_VERSION})",
                file.version
            ));
        }
        if file.anchor_depth > MAX_ANCHOR_DEPTH {
            return Err(format!("anchor depth {} out of range", file.anchor_depth));
        }

        let clusters: Vec<Cluster> = file
            .clusters
            .iter()
            .map(|r| Cluster {
                template: Template::new(r.template.iter().map(decode_token).collect()),
                line_ids: r.line_ids.clone(),
            })
            .collect();

        let mut seen = std::collections::HashSet::new();
        for (id, cluster) in clusters.iter().enumerate() {
            if cluster.line_ids.is_empty() {
                return Err(format!("cluster {id} has no members"));
            }
            if let Some(dup) = cluster.line_ids.iter().find(|l| !seen.insert(**l)) {
                return Err(format!("line id {dup} appears in more than one place"));
            }
        }
        for record in &file.trie {
            if let Some(bad) = record.clusters.iter().find(|id| **id >= clusters.len()) {
                return Err(format!("trie references missing cluster {bad}"));
            }
        }

        let derived = TrieIndex::from_templates(
            anchor_depth,
            clusters.iter().enumerate().map(|(id, c)| (id, &c.template)),
        );
        let trie = if file.anchor_depth == anchor_depth {
            let paths: Vec<TriePath> = file
                .trie
                .iter()
                .map(|r| TriePath {
                    length: r.length,
                    keys: r.path.iter().map(decode_key).collect(),
                    clusters: r.clusters.clone(),
                })
                .collect();
            let stored = TrieIndex::from_paths(anchor_depth, &paths);
            if stored == derived {
                stored
            } else {
                tracing::warn!("stored trie disagrees with cluster templates, rebuilding");
                derived
            }
        } else {
            tracing::info!(
                stored = file.anchor_depth,
                requested = anchor_depth,
                "anchor depth changed, rebuilding trie"
            );
            derived
        };

        let max_line_id = clusters
            .iter()
            .flat_map(|c| c.line_ids.iter().copied())
            .max()
            .unwrap_or(0);
        if max_line_id != file.max_line_id {
            tracing::warn!(
                stored = file.max_line_id,
                recomputed = max_line_id,
                "stored max line id disagrees with cluster membership, using recomputed value"
            );
        }

        tracing::info!(
            path = %self.path.display(),
            clusters = clusters.len(),
            max_line_id,
            "snapshot loaded"
        );
        Ok(PersistedState { clusters, trie, max_line_id })
    }
}
