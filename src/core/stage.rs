use super::errors::{AdapterError, AdapterFailure, StageError};
use super::events::{emit, Event, EventSender};
use super::findings::{Finding, FindingKey};
use super::models::Profile;
use super::state::RunContext;
use crate::plugins::types::{Invocation, InvocationEnv, ToolAdapter};
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};

pub const RAW_DIR: &str = "raw";

/// A named pipeline step: the adapters it runs, the stages it waits on and
/// the profiles it belongs to.
pub struct StageDefinition {
    pub name: String,
    pub depends_on: Vec<String>,
    pub profiles: Vec<Profile>,
    pub adapters: Vec<Arc<dyn ToolAdapter>>,
    pub enabled: bool,
}

impl std::fmt::Debug for StageDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageDefinition")
            .field("name", &self.name)
            .field("depends_on", &self.depends_on)
            .field("profiles", &self.profiles)
            .field("adapters", &self.adapters.iter().map(|a| a.name()).collect::<Vec<_>>())
            .field("enabled", &self.enabled)
            .finish()
    }
}

/// What a stage produced, ready to be committed.
#[derive(Debug, Default)]
pub struct StageOutcome {
    /// New findings, already de-duplicated against the store and each other.
    pub findings: Vec<Finding>,
    pub findings_added: usize,
    pub findings_skipped_duplicate: usize,
    pub adapter_errors: Vec<AdapterFailure>,
}

impl StageOutcome {
    pub fn is_degraded(&self) -> bool {
        !self.adapter_errors.is_empty()
    }
}

/// Execution settings shared by every stage of a run.
#[derive(Clone)]
pub struct StageRunner {
    pub workers: usize,
    pub grace: Duration,
    pub shutdown: watch::Receiver<bool>,
    pub events: Option<EventSender>,
}

impl StageRunner {
    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }
}

#[derive(Default)]
struct AdapterTally {
    invocations: usize,
    outright_failures: usize,
    planning_failed_outright: bool,
}

impl AdapterTally {
    fn failed_outright(&self) -> bool {
        self.planning_failed_outright
            || (self.invocations > 0 && self.outright_failures == self.invocations)
    }
}

/// Resolves once shutdown was requested and the grace period has passed.
async fn grace_expired(mut shutdown: watch::Receiver<bool>, grace: Duration) {
    let requested = shutdown.wait_for(|stop| *stop).await.is_ok();
    if !requested {
        std::future::pending::<()>().await;
    }
    tokio::time::sleep(grace).await;
}

impl StageDefinition {
    /// Member of `profile` by default, before any `--stages` override.
    pub fn runs_in(&self, profile: Profile) -> bool {
        self.profiles.contains(&profile)
    }

    /// Plans every adapter against `ctx`, runs all invocations on at most
    /// `runner.workers` concurrent tasks and merges their findings.
    ///
    /// Findings already in the store or repeated within the stage are
    /// counted as duplicates and dropped. Adapter failures degrade the
    /// outcome; the stage is [`StageError::Fatal`] only when every adapter
    /// failed outright. Shutdown yields [`StageError::Cancelled`] and the
    /// partial results are discarded. Nothing is written to `ctx`.
    pub async fn run(&self, ctx: &RunContext, runner: &StageRunner) -> Result<StageOutcome, StageError> {
        let env = InvocationEnv {
            workspace: ctx.target.workspace_path.clone(),
            raw_dir: ctx.target.workspace_path.join(RAW_DIR).join(&self.name),
        };

        if let Err(e) = tokio::fs::create_dir_all(&env.raw_dir).await {
            tracing::warn!("{}: could not create {:?}: {}", self.name, env.raw_dir, e);
        }

        let mut outcome = StageOutcome::default();
        let mut tallies: Vec<AdapterTally> = self.adapters.iter().map(|_| AdapterTally::default()).collect();
        let mut jobs: Vec<(usize, Invocation)> = Vec::new();

        for (idx, adapter) in self.adapters.iter().enumerate() {
            match adapter.plan(ctx) {
                Ok(invocations) => {
                    if invocations.is_empty() {
                        tracing::info!("{}: {} has nothing to do for {}", self.name, adapter.name(), ctx.target.normalized);
                    }
                    tallies[idx].invocations = invocations.len();
                    jobs.extend(invocations.into_iter().map(|inv| (idx, inv)));
                }
                Err(error) => {
                    tracing::warn!("{}: {} could not plan: {}", self.name, adapter.name(), error);
                    tallies[idx].planning_failed_outright = error.is_outright();
                    self.record_failure(&mut outcome, runner, adapter.name(), &ctx.target.normalized, error);
                }
            }
        }

        emit(
            runner.events.as_ref(),
            Event::StageStarted {
                stage: self.name.clone(),
                invocations: jobs.len(),
            },
        );
        tracing::info!("{}: running {} invocations with {} workers", self.name, jobs.len(), runner.workers);

        let semaphore = Arc::new(Semaphore::new(runner.workers.max(1)));
        let mut handles = Vec::with_capacity(jobs.len());
        let mut subjects = Vec::with_capacity(jobs.len());

        for (idx, invocation) in jobs {
            let adapter = Arc::clone(&self.adapters[idx]);
            let semaphore = Arc::clone(&semaphore);
            let shutdown = runner.shutdown.clone();
            let grace = runner.grace;
            let env = env.clone();
            subjects.push((idx, invocation.subject.clone()));

            handles.push(tokio::spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return Err(AdapterError::Cancelled),
                };
                let stopping = *shutdown.borrow();
                if stopping {
                    return Err(AdapterError::Cancelled);
                }
                tokio::select! {
                    result = adapter.invoke(&invocation, &env) => result,
                    _ = grace_expired(shutdown, grace) => Err(AdapterError::Cancelled),
                }
            }));
        }

        let results = join_all(handles).await;

        let mut seen: HashSet<FindingKey> = HashSet::new();
        for ((idx, subject), joined) in subjects.into_iter().zip(results) {
            let adapter = &self.adapters[idx];
            let result = joined.unwrap_or_else(|e| Err(AdapterError::Spawn(format!("task aborted: {}", e))));

            emit(
                runner.events.as_ref(),
                Event::InvocationFinished {
                    stage: self.name.clone(),
                    tool: adapter.name().to_string(),
                    subject: subject.clone(),
                    ok: result.is_ok(),
                },
            );

            match result {
                Ok(findings) => {
                    for finding in findings {
                        let key = finding.key();
                        if ctx.store.contains(&key) || !seen.insert(key) {
                            outcome.findings_skipped_duplicate += 1;
                        } else {
                            outcome.findings.push(finding);
                        }
                    }
                }
                Err(AdapterError::Cancelled) => {}
                Err(error) => {
                    if error.is_outright() {
                        tallies[idx].outright_failures += 1;
                    }
                    self.record_failure(&mut outcome, runner, adapter.name(), &subject, error);
                }
            }
        }

        if runner.is_shutting_down() {
            tracing::warn!("{}: interrupted, discarding partial results", self.name);
            return Err(StageError::Cancelled {
                stage: self.name.clone(),
            });
        }

        if !self.adapters.is_empty() && tallies.iter().all(AdapterTally::failed_outright) {
            return Err(StageError::Fatal {
                stage: self.name.clone(),
                failures: outcome.adapter_errors,
            });
        }

        outcome.findings_added = outcome.findings.len();
        tracing::info!(
            "{}: {} new findings, {} duplicates, {} adapter errors",
            self.name,
            outcome.findings_added,
            outcome.findings_skipped_duplicate,
            outcome.adapter_errors.len()
        );
        Ok(outcome)
    }

    fn record_failure(
        &self,
        outcome: &mut StageOutcome,
        runner: &StageRunner,
        tool: &str,
        subject: &str,
        error: AdapterError,
    ) {
        tracing::warn!("{}: {} failed for {}: {}", self.name, tool, subject, error);
        let failure = AdapterFailure {
            tool: tool.to_string(),
            subject: subject.to_string(),
            error,
        };
        emit(runner.events.as_ref(), Event::AdapterFailed(failure.clone()));
        outcome.adapter_errors.push(failure);
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::core::models::{Proto, Target};
    use crate::plugins::types::{ParsedOutput, string_args};
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::atomic::Ordering;

    fn ctx(dir: &Path) -> RunContext {
        RunContext::fresh(Target::normalize("example.com", dir).unwrap())
    }

    fn port(host: &str, port: u16) -> Finding {
        Finding::OpenPort { host: host.to_string(), port, proto: Proto::Tcp }
    }

    #[tokio::test]
    async fn test_merges_and_dedups_across_adapters() {
        let dir = tempfile::tempdir().unwrap();
        let (_tx, rx) = watch::channel(false);
        let naabu = FakeAdapter::ok("naabu", vec![port("example.com", 443), port("example.com", 80)]);
        let nmap = FakeAdapter::ok("nmap", vec![port("example.com", 443), port("example.com", 22)]);
        let stage = stage("ports", &[], vec![Arc::new(naabu), Arc::new(nmap)]);

        let outcome = stage.run(&ctx(dir.path()), &runner(rx)).await.unwrap();
        assert_eq!(outcome.findings_added, 3);
        assert_eq!(outcome.findings_skipped_duplicate, 1);
        let keys: HashSet<_> = outcome.findings.iter().map(Finding::key).collect();
        assert_eq!(keys.len(), 3);
    }

    #[tokio::test]
    async fn test_skips_findings_already_in_store() {
        let dir = tempfile::tempdir().unwrap();
        let (_tx, rx) = watch::channel(false);
        let mut ctx = ctx(dir.path());
        ctx.store.insert(port("example.com", 443));

        let stage = stage("ports", &[], vec![Arc::new(FakeAdapter::ok("naabu", vec![port("example.com", 443)]))]);
        let outcome = stage.run(&ctx, &runner(rx)).await.unwrap();
        assert_eq!(outcome.findings_added, 0);
        assert_eq!(outcome.findings_skipped_duplicate, 1);
    }

    #[tokio::test]
    async fn test_partial_failure_is_degraded() {
        let dir = tempfile::tempdir().unwrap();
        let (_tx, rx) = watch::channel(false);
        let ok = FakeAdapter::ok("naabu", vec![port("example.com", 80)]);
        let missing = FakeAdapter::failing(
            "nmap",
            AdapterError::ExecutableNotFound { executable: "nmap".into() },
        );
        let stage = stage("ports", &[], vec![Arc::new(ok), Arc::new(missing)]);

        let outcome = stage.run(&ctx(dir.path()), &runner(rx)).await.unwrap();
        assert!(outcome.is_degraded());
        assert_eq!(outcome.adapter_errors[0].tool, "nmap");
        assert_eq!(outcome.findings_added, 1);
    }

    #[tokio::test]
    async fn test_all_adapters_missing_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let (_tx, rx) = watch::channel(false);
        let a = FakeAdapter::failing("naabu", AdapterError::ExecutableNotFound { executable: "naabu".into() });
        let b = FakeAdapter::failing("nmap", AdapterError::ExecutableNotFound { executable: "nmap".into() });
        let stage = stage("ports", &[], vec![Arc::new(a), Arc::new(b)]);

        let err = stage.run(&ctx(dir.path()), &runner(rx)).await.unwrap_err();
        match err {
            StageError::Fatal { stage, failures } => {
                assert_eq!(stage, "ports");
                assert_eq!(failures.len(), 2);
            }
            other => panic!("expected fatal, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_plan_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let (_tx, rx) = watch::channel(false);
        let mut idle = FakeAdapter::ok("subfinder", vec![]);
        idle.subjects.clear();
        let stage = stage("subdomains", &[], vec![Arc::new(idle)]);

        let outcome = stage.run(&ctx(dir.path()), &runner(rx)).await.unwrap();
        assert_eq!(outcome.findings_added, 0);
        assert!(!outcome.is_degraded());
    }

    #[tokio::test]
    async fn test_shutdown_cancels_stage() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, rx) = watch::channel(false);
        let mut slow = FakeAdapter::ok("httpx", vec![Finding::Subdomain { host: "a.example.com".into() }]);
        slow.delay = Duration::from_secs(30);
        let stage = stage("http_probe", &[], vec![Arc::new(slow)]);

        let ctx = ctx(dir.path());
        let runner = runner(rx);
        let run = stage.run(&ctx, &runner);
        let trigger = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            tx.send(true).unwrap();
        };
        let start = std::time::Instant::now();
        let (result, _) = tokio::join!(run, trigger);

        assert!(matches!(result, Err(StageError::Cancelled { .. })));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_worker_pool_bounds_concurrency() {
        let dir = tempfile::tempdir().unwrap();
        let (_tx, rx) = watch::channel(false);
        let mut busy = FakeAdapter::ok("httpx", vec![]);
        busy.subjects = (0..6).map(|i| format!("h{i}.example.com")).collect();
        busy.delay = Duration::from_millis(100);
        let calls = busy.call_count();
        let peak = Arc::clone(&busy.peak);
        let stage = stage("http_probe", &[], vec![Arc::new(busy)]);

        let mut runner = runner(rx);
        runner.workers = 2;
        let start = std::time::Instant::now();
        stage.run(&ctx(dir.path()), &runner).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 6);
        assert_eq!(peak.load(Ordering::SeqCst), 2);
        // Six 100ms invocations two at a time take at least three rounds.
        assert!(start.elapsed() >= Duration::from_millis(300));
    }

    struct Sleeper;

    #[async_trait]
    impl ToolAdapter for Sleeper {
        fn name(&self) -> &'static str {
            "sleeper"
        }
        fn executable(&self) -> &str {
            "sleep"
        }
        fn timeout(&self) -> Duration {
            Duration::from_secs(1)
        }
        fn plan(&self, _ctx: &RunContext) -> Result<Vec<Invocation>, AdapterError> {
            Ok(vec![Invocation::new("example.com", string_args(&["5"]))])
        }
        fn parse_output(&self, _raw: &[u8]) -> ParsedOutput {
            ParsedOutput::default()
        }
    }

    #[tokio::test]
    async fn test_timeout_degrades_instead_of_aborting() {
        let dir = tempfile::tempdir().unwrap();
        let (_tx, rx) = watch::channel(false);
        let stage = stage("ports", &[], vec![Arc::new(Sleeper)]);
        let ctx = ctx(dir.path());
        std::fs::create_dir_all(&ctx.target.workspace_path).unwrap();

        let start = std::time::Instant::now();
        let outcome = stage.run(&ctx, &runner(rx)).await.unwrap();
        let elapsed = start.elapsed();

        assert!(elapsed >= Duration::from_millis(900));
        assert!(elapsed < Duration::from_secs(3));
        assert!(outcome.is_degraded());
        assert_eq!(
            outcome.adapter_errors[0].error,
            AdapterError::Timeout { after: Duration::from_secs(1) }
        );
    }
}
