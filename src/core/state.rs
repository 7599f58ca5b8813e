use super::checkpoint::{RunCheckpoint, RunSnapshot};
use super::errors::AdapterFailure;
use super::findings::FindingStore;
use super::models::{StageState, Target};
use serde::{Deserialize, Serialize};

/// Everything a stage may read. Owned by the orchestrator and lent to stages;
/// only the orchestrator mutates it.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub target: Target,
    pub store: FindingStore,
    pub checkpoint: RunCheckpoint,
}

impl RunContext {
    pub fn fresh(target: Target) -> Self {
        Self {
            store: FindingStore::new(&target.normalized),
            checkpoint: RunCheckpoint::new(target.clone()),
            target,
        }
    }

    pub fn from_snapshot(target: Target, snapshot: RunSnapshot) -> Self {
        Self {
            target,
            store: snapshot.findings,
            checkpoint: snapshot.checkpoint,
        }
    }

    pub fn snapshot(&self) -> RunSnapshot {
        RunSnapshot {
            checkpoint: self.checkpoint.clone(),
            findings: self.store.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueKind {
    Degraded,
    Fatal,
}

/// A degraded or fatal condition surfaced in the run summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageIssue {
    pub stage: String,
    pub kind: IssueKind,
    pub tool: String,
    pub subject: String,
    pub error_kind: String,
    pub message: String,
}

impl StageIssue {
    pub fn from_failure(stage: &str, kind: IssueKind, failure: &AdapterFailure) -> Self {
        Self {
            stage: stage.to_string(),
            kind,
            tool: failure.tool.clone(),
            subject: failure.subject.clone(),
            error_kind: failure.error.kind().to_string(),
            message: failure.error.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageReport {
    pub name: String,
    pub state: StageState,
    pub findings_added: usize,
    pub findings_skipped_duplicate: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    PartialFailure,
    Interrupted,
}

impl RunStatus {
    /// 0 success, 2 partial failure, 130 interrupted.
    pub fn exit_code(&self) -> i32 {
        match self {
            RunStatus::Success => 0,
            RunStatus::PartialFailure => 2,
            RunStatus::Interrupted => 130,
        }
    }
}

/// Outcome of one orchestrator run, consumed by the reporters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub target: String,
    pub stages: Vec<StageReport>,
    pub issues: Vec<StageIssue>,
    pub interrupted: bool,
    pub persisted: bool,
}

impl RunSummary {
    pub fn state_of(&self, stage: &str) -> Option<StageState> {
        self.stages.iter().find(|s| s.name == stage).map(|s| s.state)
    }

    pub fn status(&self) -> RunStatus {
        if self.interrupted {
            return RunStatus::Interrupted;
        }
        let incomplete = self
            .stages
            .iter()
            .any(|s| matches!(s.state, StageState::Failed | StageState::Pending));
        if incomplete || !self.persisted {
            RunStatus::PartialFailure
        } else {
            RunStatus::Success
        }
    }

    pub fn has_fatal(&self) -> bool {
        self.issues.iter().any(|i| i.kind == IssueKind::Fatal)
    }

    pub fn degraded_count(&self) -> usize {
        self.issues.iter().filter(|i| i.kind == IssueKind::Degraded).count()
    }
}
