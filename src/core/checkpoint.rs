use super::errors::OrchestratorError;
use super::findings::FindingStore;
use super::models::{Profile, Target};
use crate::utils::fs::atomic_write;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const STATE_FILE: &str = "state.json";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunCheckpoint {
    pub target: Target,
    pub completed_stages: Vec<String>,
    /// Profile each completed stage ran under.
    #[serde(default)]
    pub profiles: BTreeMap<String, Profile>,
    pub last_updated: DateTime<Utc>,
}

impl RunCheckpoint {
    pub fn new(target: Target) -> Self {
        Self {
            target,
            completed_stages: Vec::new(),
            profiles: BTreeMap::new(),
            last_updated: Utc::now(),
        }
    }

    pub fn is_completed(&self, stage: &str) -> bool {
        self.completed_stages.iter().any(|s| s == stage)
    }

    pub fn completed_profile(&self, stage: &str) -> Option<Profile> {
        self.profiles.get(stage).copied()
    }

    /// `stage` completed under a profile covering `profile`. Stages saved
    /// without a profile count as covering any.
    pub fn satisfies(&self, stage: &str, profile: Profile) -> bool {
        self.is_completed(stage)
            && self
                .completed_profile(stage)
                .is_none_or(|done| done.covers(profile))
    }

    pub fn mark_completed(&mut self, stage: &str, profile: Profile) {
        if !self.is_completed(stage) {
            self.completed_stages.push(stage.to_string());
        }
        self.profiles.insert(stage.to_string(), profile);
        self.last_updated = Utc::now();
    }
}

/// Checkpoint and findings share one file so a stage commit is a single
/// rename on disk.
/// Checkpoint and findings, persisted together as `state.json`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunSnapshot {
    pub checkpoint: RunCheckpoint,
    pub findings: FindingStore,
}

pub fn state_path(workspace: &Path) -> PathBuf {
    workspace.join(STATE_FILE)
}

impl RunSnapshot {
    /// Loads the snapshot for `target`, or `None` when the workspace has none.
    pub fn load(target: &Target) -> Result<Option<Self>, OrchestratorError> {
        let path = state_path(&target.workspace_path);
        let raw = match std::fs::read(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(OrchestratorError::CheckpointCorrupt {
                    path,
                    reason: e.to_string(),
                });
            }
        };

        let snapshot: RunSnapshot =
            serde_json::from_slice(&raw).map_err(|e| OrchestratorError::CheckpointCorrupt {
                path: path.clone(),
                reason: e.to_string(),
            })?;

        if snapshot.checkpoint.target.normalized != target.normalized
            || snapshot.findings.target() != target.normalized
        {
            return Err(OrchestratorError::CheckpointCorrupt {
                path,
                reason: format!(
                    "checkpoint belongs to {} instead of {}",
                    snapshot.checkpoint.target.normalized, target.normalized
                ),
            });
        }

        tracing::debug!(
            "Loaded checkpoint from {:?}: {} completed stages, {} findings",
            path,
            snapshot.checkpoint.completed_stages.len(),
            snapshot.findings.len()
        );
        Ok(Some(snapshot))
    }

    /// Replaces `state.json` atomically.
    pub fn save(&self) -> Result<(), OrchestratorError> {
        let workspace = &self.checkpoint.target.workspace_path;
        let path = state_path(workspace);
        let json = serde_json::to_vec_pretty(self).map_err(|e| OrchestratorError::CheckpointCorrupt {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        atomic_write(&path, &json).map_err(|source| OrchestratorError::WorkspaceUnwritable {
            path: workspace.clone(),
            source,
        })
    }
}
