use super::errors::AdapterFailure;
use super::models::StageState;
use tokio::sync::mpsc;

pub type EventSender = mpsc::UnboundedSender<Event>;
pub type EventReceiver = mpsc::UnboundedReceiver<Event>;

#[derive(Debug, Clone)]
pub enum Event {
    PipelineStarted { target: String, stages: Vec<String> },
    StageStarted { stage: String, invocations: usize },
    InvocationFinished { stage: String, tool: String, subject: String, ok: bool },
    StageFinished { stage: String, state: StageState, added: usize },
    StageSkipped { stage: String, reason: String },
    StageBlocked { stage: String, waiting_on: Vec<String> },
    AdapterFailed(AdapterFailure),
    PipelineFinished { interrupted: bool },
}

/// Sends to an optional listener; a closed or absent receiver is ignored.
pub fn emit(sender: Option<&EventSender>, event: Event) {
    if let Some(sender) = sender {
        let _ = sender.send(event);
    }
}
