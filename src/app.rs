use crate::{
    cli::args::Cli,
    config::ConfigLoader,
    core::{
        models::Target,
        scheduler::Orchestrator,
        stage::StageRunner,
    },
    executors::toolchain,
    organizers::layout,
    plugins::registry,
    reporters::writer,
    ui::{printer, progress},
    utils::logging,
};
use anyhow::{Context, Result};
use std::io::IsTerminal;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

/// Runs the pipeline for the CLI target and returns the process exit code.
/// Errors are startup failures: nothing was scanned.
pub async fn run(cli: Cli) -> Result<i32> {
    let start_time = std::time::Instant::now();

    let level = logging::level_from_cli(&cli);
    logging::init(level)?;

    let profile = cli.effective_profile();
    let selection = cli.selection();
    tracing::info!("Starting autoscope for target: {} ({} profile)", cli.target, profile);

    let mut config = ConfigLoader::load_with_custom_path(cli.config.as_deref())?;
    if let Some(output) = &cli.output {
        config.output.base_dir = output.clone();
    }
    tracing::info!(
        "Configuration loaded with {} workers, batches of {}",
        config.concurrency.workers,
        config.concurrency.batch_size
    );

    let target = Target::normalize(&cli.target, &config.output.base_dir)
        .with_context(|| format!("Invalid target: {:?}", cli.target))?;
    layout::prepare_workspace(&target)?;
    tracing::info!("Workspace: {:?}", target.workspace_path);

    let stages = registry::build_pipeline(&config, profile);
    registry::log_pipeline_summary(&stages);
    let selected = stages.iter().filter(|s| s.enabled && selection.includes(s));
    let missing = toolchain::missing_tools(&registry::executables(selected));
    if !missing.is_empty() {
        let names: Vec<&str> = missing.iter().map(|(tool, _)| *tool).collect();
        eprintln!("warning: missing tools: {}", names.join(", "));
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let runner = StageRunner {
        workers: config.concurrency.workers,
        grace: Duration::from_secs(config.concurrency.shutdown_grace_secs),
        shutdown: shutdown_rx,
        events: Some(events_tx),
    };

    let orchestrator = Orchestrator::new(stages, selection, cli.force_rerun, runner)?;
    let mut ctx = Orchestrator::prepare_context(target, cli.resume)?;

    let visible = !cli.verbose && !cli.debug && std::io::stderr().is_terminal();
    let progress_task = tokio::spawn(progress::run(events_rx, visible));

    let signal_task = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received; finishing in-flight work before stopping");
            let _ = shutdown_tx.send(true);
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("Second interrupt, exiting immediately");
                std::process::exit(130);
            }
        }
    });

    let summary = orchestrator.run(&mut ctx).await;
    signal_task.abort();
    // Closes the event channel so the progress task can finish.
    drop(orchestrator);
    if let Err(e) = progress_task.await {
        tracing::debug!("Progress display ended abnormally: {}", e);
    }

    let report = match writer::write_report(cli.report, &summary, &ctx.store, profile, &ctx.target.workspace_path) {
        Ok(path) => Some(path),
        Err(e) => {
            tracing::error!("Report generation failed: {:#}", e);
            None
        }
    };

    printer::print_summary(&summary, &ctx.store, report.as_deref());
    tracing::info!("Finished in {}s", start_time.elapsed().as_secs());

    let mut code = summary.status().exit_code();
    if report.is_none() && code == 0 {
        code = 2;
    }
    Ok(code)
}
