use crate::core::findings::FindingStore;
use crate::core::models::StageState;
use crate::core::state::{IssueKind, RunStatus, RunSummary};
use colored::*;
use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, Color, ContentArrangement, Table};
use std::path::Path;

const FINDING_KINDS: &[(&str, &str)] = &[
    ("subdomain", "Subdomains"),
    ("open_port", "Open ports"),
    ("live_host", "Live hosts"),
    ("endpoint", "Endpoints"),
    ("parameter", "Parameters"),
    ("screenshot", "Screenshots"),
];

fn new_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

fn state_cell(state: StageState) -> Cell {
    let cell = Cell::new(state.to_string());
    match state {
        StageState::Completed => cell.fg(Color::Green),
        StageState::Failed => cell.fg(Color::Red),
        StageState::Pending => cell.fg(Color::Yellow),
        StageState::Running | StageState::Skipped => cell.fg(Color::DarkGrey),
    }
}

pub fn stage_table(summary: &RunSummary) -> String {
    let mut table = new_table();
    table.set_header(vec![
        Cell::new("Stage").add_attribute(Attribute::Bold),
        Cell::new("State").add_attribute(Attribute::Bold),
        Cell::new("New").add_attribute(Attribute::Bold),
        Cell::new("Duplicates").add_attribute(Attribute::Bold),
    ]);
    for stage in &summary.stages {
        table.add_row(vec![
            Cell::new(&stage.name),
            state_cell(stage.state),
            Cell::new(stage.findings_added),
            Cell::new(stage.findings_skipped_duplicate),
        ]);
    }
    table.to_string()
}

pub fn findings_table(store: &FindingStore) -> String {
    let mut table = new_table();
    table.set_header(vec![
        Cell::new("Type").add_attribute(Attribute::Bold),
        Cell::new("Count").add_attribute(Attribute::Bold),
    ]);
    for (kind, label) in FINDING_KINDS {
        table.add_row(vec![Cell::new(label), Cell::new(store.count_kind(kind))]);
    }
    table.to_string()
}

pub fn print_summary(summary: &RunSummary, store: &FindingStore, report: Option<&Path>) {
    let rule = "═══════════════════════════════════════";
    let (headline, color) = match summary.status() {
        RunStatus::Success => ("AutoScope Run Complete", "green"),
        RunStatus::PartialFailure => ("AutoScope Run Finished With Failures", "yellow"),
        RunStatus::Interrupted => ("AutoScope Run Interrupted", "yellow"),
    };

    println!("\n{}", rule.color(color).bold());
    println!("{}", headline.color(color).bold());
    println!("{}", rule.color(color).bold());

    println!("\n{}: {}", "Target".cyan().bold(), summary.target);
    println!("\n{}\n{}", "Stages:".yellow().bold(), stage_table(summary));
    println!("\n{}\n{}", "Findings:".yellow().bold(), findings_table(store));

    if !summary.issues.is_empty() {
        let fatal = if summary.has_fatal() { "fatal issues present, " } else { "" };
        println!(
            "\n{} ({}{} degraded)",
            "Issues:".yellow().bold(),
            fatal,
            summary.degraded_count()
        );
        for issue in &summary.issues {
            let tag = match issue.kind {
                IssueKind::Fatal => "fatal".red().bold(),
                IssueKind::Degraded => "degraded".yellow(),
            };
            println!(
                "  • [{}] {} / {} ({}): {}",
                tag, issue.stage, issue.tool, issue.subject, issue.message
            );
        }
    }

    if !summary.persisted {
        println!("\n{}", "Run state could not be saved; --resume will not see this run.".red().bold());
    }
    if summary.interrupted {
        println!("\n{}", "Re-run with --resume to continue.".yellow());
    }
    if let Some(path) = report {
        println!("\n{}", format!("Report written to {}", path.display()).green().dimmed());
    }
}
