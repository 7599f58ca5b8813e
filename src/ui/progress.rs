use crate::core::events::{Event, EventReceiver};
use crate::core::models::StageState;
use colored::*;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::collections::HashMap;
use std::time::Duration;

/// Terminal progress fed by orchestrator events: one bar for the pipeline,
/// one spinner per running stage.
pub struct ProgressView {
    multi: MultiProgress,
    overall: ProgressBar,
    stages: HashMap<String, ProgressBar>,
    failures: usize,
}

impl ProgressView {
    pub fn new(visible: bool) -> Self {
        let target = if visible {
            ProgressDrawTarget::stderr()
        } else {
            ProgressDrawTarget::hidden()
        };
        let multi = MultiProgress::with_draw_target(target);
        let overall = multi.add(ProgressBar::new(0));
        if let Ok(style) = ProgressStyle::with_template("{prefix:.bold} [{bar:30.cyan/blue}] {pos}/{len} stages {msg}") {
            overall.set_style(style.progress_chars("=> "));
        }
        overall.set_prefix("autoscope");

        Self {
            multi,
            overall,
            stages: HashMap::new(),
            failures: 0,
        }
    }

    pub fn handle(&mut self, event: Event) {
        match event {
            Event::PipelineStarted { target, stages } => {
                self.overall.set_length(stages.len() as u64);
                self.overall.set_message(target);
            }
            Event::StageStarted { stage, invocations } => {
                let bar = self.multi.add(ProgressBar::new(invocations as u64));
                if let Ok(style) = ProgressStyle::with_template("  {spinner:.green} {prefix:<16} {pos}/{len} {msg}") {
                    bar.set_style(style);
                }
                bar.set_prefix(stage.clone());
                bar.enable_steady_tick(Duration::from_millis(120));
                self.stages.insert(stage, bar);
            }
            Event::InvocationFinished { stage, tool, ok, .. } => {
                if let Some(bar) = self.stages.get(&stage) {
                    bar.inc(1);
                    if !ok {
                        bar.set_message(format!("{} failed", tool).red().to_string());
                    }
                }
            }
            Event::StageFinished { stage, state, added } => {
                if let Some(bar) = self.stages.remove(&stage) {
                    let line = match state {
                        StageState::Completed => format!("{} {} (+{} findings)", "✓".green(), stage, added),
                        _ => format!("{} {} {}", "✗".red(), stage, state),
                    };
                    bar.finish_and_clear();
                    let _ = self.multi.println(line);
                }
                self.overall.inc(1);
            }
            Event::StageSkipped { stage, reason } => {
                let _ = self.multi.println(format!("{} {} skipped: {}", "-".dimmed(), stage, reason));
            }
            Event::StageBlocked { stage, waiting_on } => {
                let _ = self
                    .multi
                    .println(format!("{} {} blocked on {}", "!".yellow(), stage, waiting_on.join(", ")));
            }
            Event::AdapterFailed(_) => {
                self.failures += 1;
            }
            Event::PipelineFinished { interrupted } => {
                for (_, bar) in self.stages.drain() {
                    bar.finish_and_clear();
                }
                if interrupted {
                    self.overall.abandon_with_message("interrupted".yellow().to_string());
                } else {
                    self.overall.finish_with_message("done");
                }
            }
        }
    }

    pub fn failures(&self) -> usize {
        self.failures
    }
}

/// Drains `events` until every sender is gone.
pub async fn run(mut events: EventReceiver, visible: bool) -> usize {
    let mut view = ProgressView::new(visible);
    while let Some(event) = events.recv().await {
        view.handle(event);
    }
    view.failures()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::{AdapterError, AdapterFailure};
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_consumes_events_until_closed() {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(rx, false));

        tx.send(Event::PipelineStarted { target: "example.com".into(), stages: vec!["ports".into()] }).unwrap();
        tx.send(Event::StageStarted { stage: "ports".into(), invocations: 2 }).unwrap();
        for ok in [true, false] {
            tx.send(Event::InvocationFinished {
                stage: "ports".into(),
                tool: "naabu".into(),
                subject: "batch-1".into(),
                ok,
            })
            .unwrap();
        }
        tx.send(Event::AdapterFailed(AdapterFailure {
            tool: "naabu".into(),
            subject: "batch-1".into(),
            error: AdapterError::Timeout { after: Duration::from_secs(60) },
        }))
        .unwrap();
        tx.send(Event::StageFinished { stage: "ports".into(), state: StageState::Completed, added: 3 }).unwrap();
        tx.send(Event::PipelineFinished { interrupted: false }).unwrap();
        drop(tx);

        assert_eq!(task.await.unwrap(), 1);
    }

    #[test]
    fn test_overall_bar_tracks_stages() {
        let mut view = ProgressView::new(false);
        view.handle(Event::PipelineStarted { target: "example.com".into(), stages: vec!["a".into(), "b".into()] });
        view.handle(Event::StageStarted { stage: "a".into(), invocations: 0 });
        view.handle(Event::StageFinished { stage: "a".into(), state: StageState::Failed, added: 0 });
        assert_eq!(view.overall.position(), 1);
        assert_eq!(view.overall.length(), Some(2));
        assert!(view.stages.is_empty());
    }
}
