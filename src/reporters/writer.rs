use crate::core::findings::{Finding, FindingStore};
use crate::core::models::{Profile, Proto};
use crate::core::state::RunSummary;
use crate::utils::fs::atomic_write;
use anyhow::{Context, Result};
use minijinja::{context, Environment};
use serde::Serialize;
use std::path::{Path, PathBuf};

const MARKDOWN_TEMPLATE: &str = include_str!("../../report_templates/report.md.j2");

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    Md,
    Json,
    Csv,
}

impl ReportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ReportFormat::Md => "md",
            ReportFormat::Json => "json",
            ReportFormat::Csv => "csv",
        }
    }
}

/// Renders the report for a finished (or interrupted) run and writes it
/// atomically into the workspace.
pub fn write_report(
    format: ReportFormat,
    summary: &RunSummary,
    store: &FindingStore,
    profile: Profile,
    workspace: &Path,
) -> Result<PathBuf> {
    let rendered = match format {
        ReportFormat::Md => render_markdown(summary, store, profile)?,
        ReportFormat::Json => render_json(summary, store, profile)?,
        ReportFormat::Csv => render_csv(store)?,
    };

    let path = workspace.join(format!("report.{}", format.extension()));
    atomic_write(&path, rendered.as_bytes())
        .with_context(|| format!("Failed to write report: {:?}", path))?;
    tracing::info!("Report written to {:?}", path);
    Ok(path)
}

fn of_kind<'a>(store: &'a FindingStore, kind: &str) -> Vec<&'a Finding> {
    store.iter().filter(|f| f.kind() == kind).collect()
}

fn render_markdown(summary: &RunSummary, store: &FindingStore, profile: Profile) -> Result<String> {
    let mut env = Environment::new();
    env.add_template("report.md", MARKDOWN_TEMPLATE)?;
    let template = env.get_template("report.md")?;

    let status = summary.status();
    let rendered = template.render(context! {
        target => &summary.target,
        generated_at => chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        profile => profile.to_string(),
        status => &status,
        exit_code => status.exit_code(),
        interrupted => summary.interrupted,
        total_findings => store.len(),
        stages => &summary.stages,
        issues => &summary.issues,
        subdomains => of_kind(store, "subdomain"),
        ports => of_kind(store, "open_port"),
        live_hosts => of_kind(store, "live_host"),
        endpoints => of_kind(store, "endpoint"),
        parameters => of_kind(store, "parameter"),
        screenshots => of_kind(store, "screenshot"),
        version => env!("CARGO_PKG_VERSION")
    })?;
    Ok(rendered)
}

#[derive(Serialize)]
struct JsonReport<'a> {
    generated_at: chrono::DateTime<chrono::Utc>,
    profile: Profile,
    status: crate::core::state::RunStatus,
    exit_code: i32,
    #[serde(flatten)]
    summary: &'a RunSummary,
    findings: Vec<&'a Finding>,
}

fn render_json(summary: &RunSummary, store: &FindingStore, profile: Profile) -> Result<String> {
    let status = summary.status();
    let report = JsonReport {
        generated_at: chrono::Utc::now(),
        profile,
        exit_code: status.exit_code(),
        status,
        summary,
        findings: store.iter().collect(),
    };
    serde_json::to_string_pretty(&report).context("Failed to serialize JSON report")
}

#[derive(Serialize)]
struct CsvRow<'a> {
    kind: &'static str,
    host: Option<&'a str>,
    port: Option<u16>,
    proto: Option<Proto>,
    url: Option<&'a str>,
    status_code: Option<u16>,
    title: Option<&'a str>,
    detail: String,
}

impl<'a> From<&'a Finding> for CsvRow<'a> {
    fn from(finding: &'a Finding) -> Self {
        let mut row = CsvRow {
            kind: finding.kind(),
            host: None,
            port: None,
            proto: None,
            url: None,
            status_code: None,
            title: None,
            detail: String::new(),
        };
        match finding {
            Finding::Subdomain { host } => row.host = Some(host.as_str()),
            Finding::OpenPort { host, port, proto } => {
                row.host = Some(host.as_str());
                row.port = Some(*port);
                row.proto = Some(*proto);
            }
            Finding::LiveHost { url, status_code, title, tech } => {
                row.url = Some(url.as_str());
                row.status_code = *status_code;
                row.title = title.as_deref();
                row.detail = tech.join(";");
            }
            Finding::Endpoint { url, source } => {
                row.url = Some(url.as_str());
                row.detail = source.clone();
            }
            Finding::Parameter { url, name } => {
                row.url = Some(url.as_str());
                row.detail = name.clone();
            }
            Finding::Screenshot { url, file_path } => {
                row.url = Some(url.as_str());
                row.detail = file_path.display().to_string();
            }
        }
        row
    }
}

/// One row per finding, every kind sharing the same columns.
fn render_csv(store: &FindingStore) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    if store.is_empty() {
        writer.write_record(["kind", "host", "port", "proto", "url", "status_code", "title", "detail"])?;
    }
    for finding in store.iter() {
        writer.serialize(CsvRow::from(finding))?;
    }
    let bytes = writer.into_inner().map_err(|e| anyhow::anyhow!("Failed to flush CSV: {}", e))?;
    Ok(String::from_utf8(bytes)?)
}
