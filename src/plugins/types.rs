use async_trait::async_trait;
use crate::config::types::{GlobalConfig, ToolConfig};
use crate::core::errors::AdapterError;
use crate::core::findings::Finding;
use crate::core::models::{Profile, TargetKind};
use crate::core::state::RunContext;
use crate::executors::command::{execute, CommandResult};
use crate::utils::fs::{atomic_write, file_token};
use std::path::PathBuf;
use std::time::Duration;

/// One planned execution of an adapter's executable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// What this run covers (a URL, a host batch); used in logs and issues.
    pub subject: String,
    pub args: Vec<String>,
    pub stdin: Option<String>,
    /// Tools that cannot print results to stdout write here instead.
    pub output_file: Option<PathBuf>,
}

impl Invocation {
    pub fn new(subject: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            subject: subject.into(),
            args,
            stdin: None,
            output_file: None,
        }
    }

    pub fn with_stdin(mut self, input: String) -> Self {
        self.stdin = Some(input);
        self
    }

    pub fn with_output_file(mut self, path: PathBuf) -> Self {
        self.output_file = Some(path);
        self
    }
}

/// Where an invocation runs and where its raw output is archived.
#[derive(Debug, Clone)]
pub struct InvocationEnv {
    pub workspace: PathBuf,
    pub raw_dir: PathBuf,
}

#[derive(Debug, Default, PartialEq)]
pub struct ParsedOutput {
    pub findings: Vec<Finding>,
    /// Non-empty lines the parser did not recognize.
    pub skipped: usize,
}

/// One external tool wrapped for a stage: how to plan its invocations from
/// the current findings and how to read its output.
#[async_trait]
pub trait ToolAdapter: Send + Sync {
    /// Tool name used in issues, events and raw output file names.
    fn name(&self) -> &'static str;

    fn executable(&self) -> &str;

    fn timeout(&self) -> Duration;

    /// Builds the invocations for this run from the findings gathered so far.
    /// An empty plan means the adapter has nothing to do for this target.
    fn plan(&self, ctx: &RunContext) -> Result<Vec<Invocation>, AdapterError>;

    /// Findings in `raw`, plus the count of lines that were not understood.
    fn parse_output(&self, raw: &[u8]) -> ParsedOutput;

    /// Runs one planned invocation: archives its raw output, then parses
    /// stdout or the invocation's output file into findings. Output that
    /// yields nothing but unrecognized lines is a `ParseFailure`.
    async fn invoke(&self, invocation: &Invocation, env: &InvocationEnv) -> Result<Vec<Finding>, AdapterError> {
        if let Some(path) = &invocation.output_file {
            // Never parse a file left behind by an earlier run.
            let _ = tokio::fs::remove_file(path).await;
        }

        let result = execute(
            self.executable(),
            &invocation.args,
            invocation.stdin.as_deref(),
            &env.workspace,
            self.timeout(),
        )
        .await?;
        archive_output(self.name(), &invocation.subject, &result, env);
        let result = result.into_success()?;

        tracing::debug!(
            "{} finished for {} in {}ms",
            self.name(),
            invocation.subject,
            result.duration_ms
        );

        let raw = match &invocation.output_file {
            Some(path) => match tokio::fs::read(path).await {
                Ok(raw) => raw,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
                Err(e) => return Err(AdapterError::Spawn(format!("reading {:?}: {}", path, e))),
            },
            None => result.stdout,
        };

        let parsed = self.parse_output(&raw);
        if parsed.findings.is_empty() && parsed.skipped > 0 {
            return Err(AdapterError::ParseFailure {
                skipped: parsed.skipped,
            });
        }
        if parsed.skipped > 0 {
            tracing::debug!(
                "{} skipped {} unrecognized lines for {}",
                self.name(),
                parsed.skipped,
                invocation.subject
            );
        }
        Ok(parsed.findings)
    }
}

/// Writes stdout and stderr of one process to the stage's raw directory,
/// whether or not it succeeded.
pub fn archive_output(tool: &str, subject: &str, result: &CommandResult, env: &InvocationEnv) {
    let stem = format!("{}_{}", tool, file_token(subject));
    for (ext, bytes) in [("stdout", &result.stdout), ("stderr", &result.stderr)] {
        if let Err(e) = atomic_write(env.raw_dir.join(format!("{}.{}", stem, ext)), bytes) {
            tracing::warn!("Could not archive {} output of {}: {}", ext, tool, e);
        }
    }
}

/// Applies `parse` to every non-blank line. `None` counts the line as
/// skipped; `Some(vec![])` accepts it without producing findings.
pub fn parse_lines<F>(raw: &[u8], mut parse: F) -> ParsedOutput
where
    F: FnMut(&str) -> Option<Vec<Finding>>,
{
    let text = String::from_utf8_lossy(raw);
    let mut out = ParsedOutput::default();
    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        match parse(line) {
            Some(findings) => out.findings.extend(findings),
            None => out.skipped += 1,
        }
    }
    out
}

/// Splits `items` into stdin payloads of at most `size` lines each.
pub fn batches(items: &[String], size: usize) -> Vec<String> {
    items
        .chunks(size.max(1))
        .map(|chunk| {
            let mut payload = chunk.join("\n");
            payload.push('\n');
            payload
        })
        .collect()
}

pub fn string_args(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

/// The target itself followed by every discovered subdomain.
pub fn scan_hosts(ctx: &RunContext) -> Vec<String> {
    let mut hosts = vec![ctx.target.normalized.clone()];
    hosts.extend(
        ctx.store
            .subdomains()
            .filter(|h| *h != ctx.target.normalized)
            .map(str::to_string),
    );
    hosts
}

/// Live URLs without a trailing slash; `https://<target>` when nothing was
/// found live and the target is a single host.
pub fn web_roots(ctx: &RunContext) -> Vec<String> {
    let mut roots: Vec<String> = ctx
        .store
        .live_urls()
        .map(|url| url.trim_end_matches('/').to_string())
        .collect();
    roots.sort();
    roots.dedup();
    if roots.is_empty() && ctx.target.kind != TargetKind::Cidr {
        roots.push(format!("https://{}", ctx.target.normalized));
    }
    roots
}

/// Resolved per-run settings of one tool section.
/// Executable, timeout and extra arguments of one tool for the active profile.
#[derive(Debug, Clone)]
pub struct ToolSettings {
    pub executable: String,
    pub timeout: Duration,
    pub batch_size: usize,
    extra_args: Result<Vec<String>, AdapterError>,
}

impl ToolSettings {
    pub fn resolve(tool: &ToolConfig, default_executable: &str, config: &GlobalConfig, profile: Profile) -> Self {
        Self {
            executable: tool.executable(default_executable),
            timeout: tool.timeout(profile, &config.timeouts),
            batch_size: config.concurrency.batch_size,
            extra_args: tool.extra_args(),
        }
    }

    /// `base` followed by the configured extra arguments.
    pub fn args(&self, mut base: Vec<String>) -> Result<Vec<String>, AdapterError> {
        base.extend(self.extra_args.clone()?);
        Ok(base)
    }
}
