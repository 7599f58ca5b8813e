use super::checkpoint::RunSnapshot;
use super::errors::{OrchestratorError, StageError};
use super::events::{emit, Event};
use super::models::{Profile, StageState, Target};
use super::stage::{StageDefinition, StageRunner};
use super::state::{IssueKind, RunContext, RunSummary, StageIssue, StageReport};
use std::collections::{HashMap, HashSet};

/// Which stages are eligible to run at all.
#[derive(Debug, Clone)]
pub struct Selection {
    pub profile: Profile,
    /// Explicit stage subset; replaces profile membership when set.
    pub only: Option<Vec<String>>,
    pub exclude: Vec<String>,
}

impl Selection {
    pub fn profile(profile: Profile) -> Self {
        Self {
            profile,
            only: None,
            exclude: Vec::new(),
        }
    }

    /// Exclusions win, then the explicit subset, then profile membership.
    pub fn includes(&self, stage: &StageDefinition) -> bool {
        if self.exclude.iter().any(|s| s == &stage.name) {
            return false;
        }
        match &self.only {
            Some(only) => only.iter().any(|s| s == &stage.name),
            None => stage.runs_in(self.profile),
        }
    }
}

/// Runs a validated stage graph for one target, committing after each stage.
pub struct Orchestrator {
    stages: Vec<StageDefinition>,
    selection: Selection,
    force_rerun: bool,
    runner: StageRunner,
}

impl Orchestrator {
    /// Validates the graph (unique names, known dependencies, no cycles,
    /// known names in the selection) and fixes the execution order.
    pub fn new(
        stages: Vec<StageDefinition>,
        selection: Selection,
        force_rerun: bool,
        runner: StageRunner,
    ) -> Result<Self, OrchestratorError> {
        let known: HashSet<&str> = stages.iter().map(|s| s.name.as_str()).collect();
        if let Some(only) = &selection.only {
            for name in only.iter().chain(selection.exclude.iter()) {
                if !known.contains(name.as_str()) {
                    return Err(OrchestratorError::InvalidPipeline(format!("unknown stage: {}", name)));
                }
            }
        }
        let stages = dependency_order(stages)?;
        Ok(Self {
            stages,
            selection,
            force_rerun,
            runner,
        })
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name.as_str()).collect()
    }

    /// Context for `target`: the persisted one when resuming and present,
    /// otherwise an empty one.
    pub fn prepare_context(target: Target, resume: bool) -> Result<RunContext, OrchestratorError> {
        if resume {
            if let Some(snapshot) = RunSnapshot::load(&target)? {
                tracing::info!(
                    "Resuming {}: completed stages {:?}",
                    target.normalized,
                    snapshot.checkpoint.completed_stages
                );
                return Ok(RunContext::from_snapshot(target, snapshot));
            }
            tracing::info!("No checkpoint for {}, starting fresh", target.normalized);
        }
        Ok(RunContext::fresh(target))
    }

    /// Runs every eligible stage in dependency order.
    ///
    /// Stages that are disabled, unselected or already completed under a
    /// covering profile are skipped. A stage runs once all of its
    /// dependencies are Completed or Skipped; otherwise it stays Pending.
    /// Each completed stage is merged into `ctx` and saved before the next
    /// one starts. Shutdown stops after the current stage, which goes back
    /// to Pending. Never fails: problems end up in the returned summary.
    pub async fn run(&self, ctx: &mut RunContext) -> RunSummary {
        let events = self.runner.events.as_ref();
        let profile = self.selection.profile;
        let mut states: HashMap<String, StageState> = HashMap::new();
        let mut reports: HashMap<String, StageReport> = HashMap::new();
        let mut issues: Vec<StageIssue> = Vec::new();
        let mut interrupted = false;
        let mut persisted = true;

        for stage in &self.stages {
            let initial = if !stage.enabled {
                self.skip(stage, "disabled in configuration");
                StageState::Skipped
            } else if !self.selection.includes(stage) {
                self.skip(stage, "not selected");
                StageState::Skipped
            } else if !self.force_rerun && ctx.checkpoint.satisfies(&stage.name, profile) {
                self.skip(stage, "completed in a previous run");
                StageState::Skipped
            } else {
                let outgrown = ctx.checkpoint.completed_profile(&stage.name).filter(|_| !self.force_rerun);
                if let Some(previous) = outgrown {
                    tracing::warn!(
                        "{} was completed under the {} profile; running it again for {}",
                        stage.name,
                        previous,
                        profile
                    );
                }
                StageState::Pending
            };
            states.insert(stage.name.clone(), initial);
        }

        emit(
            events,
            Event::PipelineStarted {
                target: ctx.target.normalized.clone(),
                stages: self
                    .stages
                    .iter()
                    .filter(|s| states[&s.name] == StageState::Pending)
                    .map(|s| s.name.clone())
                    .collect(),
            },
        );

        for stage in &self.stages {
            if states[&stage.name] != StageState::Pending {
                continue;
            }
            if self.runner.is_shutting_down() {
                interrupted = true;
                break;
            }

            let blockers: Vec<String> = stage
                .depends_on
                .iter()
                .filter(|dep| !states[dep.as_str()].unblocks_dependents())
                .cloned()
                .collect();
            if !blockers.is_empty() {
                tracing::warn!("{} stays pending, waiting on {:?}", stage.name, blockers);
                emit(
                    events,
                    Event::StageBlocked {
                        stage: stage.name.clone(),
                        waiting_on: blockers,
                    },
                );
                continue;
            }

            states.insert(stage.name.clone(), StageState::Running);
            tracing::info!("Stage {} running", stage.name);

            let next = match stage.run(ctx, &self.runner).await {
                Ok(outcome) => {
                    for failure in &outcome.adapter_errors {
                        issues.push(StageIssue::from_failure(&stage.name, IssueKind::Degraded, failure));
                    }
                    let added = ctx.store.extend(outcome.findings);
                    ctx.checkpoint.mark_completed(&stage.name, profile);
                    reports.insert(
                        stage.name.clone(),
                        StageReport {
                            name: stage.name.clone(),
                            state: StageState::Completed,
                            findings_added: added,
                            findings_skipped_duplicate: outcome.findings_skipped_duplicate,
                        },
                    );
                    if let Err(e) = ctx.snapshot().save() {
                        tracing::error!("Could not persist {}: {}", stage.name, e);
                        persisted = false;
                    }
                    emit(
                        events,
                        Event::StageFinished {
                            stage: stage.name.clone(),
                            state: StageState::Completed,
                            added,
                        },
                    );
                    StageState::Completed
                }
                Err(StageError::Fatal { stage: name, failures }) => {
                    tracing::error!("Stage {} failed; its dependents will not run", name);
                    for failure in &failures {
                        issues.push(StageIssue::from_failure(&name, IssueKind::Fatal, failure));
                    }
                    emit(
                        events,
                        Event::StageFinished {
                            stage: name,
                            state: StageState::Failed,
                            added: 0,
                        },
                    );
                    StageState::Failed
                }
                Err(StageError::Cancelled { .. }) => {
                    interrupted = true;
                    StageState::Pending
                }
            };
            states.insert(stage.name.clone(), next);

            if interrupted || !persisted {
                break;
            }
        }

        if persisted {
            if let Err(e) = ctx.snapshot().save() {
                tracing::error!("Final persistence failed: {}", e);
                persisted = false;
            }
        }

        emit(events, Event::PipelineFinished { interrupted });

        let stages = self
            .stages
            .iter()
            .map(|s| {
                reports.remove(&s.name).unwrap_or_else(|| StageReport {
                    name: s.name.clone(),
                    state: states[&s.name],
                    findings_added: 0,
                    findings_skipped_duplicate: 0,
                })
            })
            .collect();

        RunSummary {
            target: ctx.target.normalized.clone(),
            stages,
            issues,
            interrupted,
            persisted,
        }
    }

    fn skip(&self, stage: &StageDefinition, reason: &str) {
        tracing::info!("Stage {} skipped: {}", stage.name, reason);
        emit(
            self.runner.events.as_ref(),
            Event::StageSkipped {
                stage: stage.name.clone(),
                reason: reason.to_string(),
            },
        );
    }
}

/// Stable topological order: declaration order wherever dependencies allow.
fn dependency_order(stages: Vec<StageDefinition>) -> Result<Vec<StageDefinition>, OrchestratorError> {
    let mut names = HashSet::new();
    for stage in &stages {
        if !names.insert(stage.name.clone()) {
            return Err(OrchestratorError::InvalidPipeline(format!("duplicate stage: {}", stage.name)));
        }
    }
    for stage in &stages {
        if let Some(dep) = stage.depends_on.iter().find(|d| !names.contains(*d)) {
            return Err(OrchestratorError::InvalidPipeline(format!(
                "stage {} depends on unknown stage {}",
                stage.name, dep
            )));
        }
    }

    let mut remaining: Vec<Option<StageDefinition>> = stages.into_iter().map(Some).collect();
    let mut placed: HashSet<String> = HashSet::new();
    let mut ordered = Vec::with_capacity(remaining.len());

    while ordered.len() < remaining.len() {
        let ready = remaining.iter().position(|slot| {
            slot.as_ref()
                .is_some_and(|s| s.depends_on.iter().all(|d| placed.contains(d)))
        });
        let Some(idx) = ready else {
            let cyclic: Vec<String> = remaining.iter().flatten().map(|s| s.name.clone()).collect();
            return Err(OrchestratorError::InvalidPipeline(format!(
                "dependency cycle among {:?}",
                cyclic
            )));
        };
        if let Some(stage) = remaining[idx].take() {
            placed.insert(stage.name.clone());
            ordered.push(stage);
        }
    }

    Ok(ordered)
}
