use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use super::PipelineState;

/// End-of-run counts handed to `EventSink::on_complete`
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub state: PipelineState,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Receiver of pipeline progress. Every method defaults to doing nothing.
///
/// Calls happen on the pipeline task, so implementations must return quickly.
pub trait EventSink: Send + Sync {
    /// `current` items of `total` are done
    fn on_progress(&self, _current: usize, _total: usize) {}

    fn on_log(&self, _message: &str) {}

    fn on_status(&self, _status: &str) {}

    fn on_state(&self, _state: PipelineState) {}

    fn on_complete(&self, _summary: &RunSummary) {}
}

/// Discards every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {}

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    Progress { current: usize, total: usize },
    Log(String),
    Status(String),
    State(PipelineState),
    Complete(RunSummary),
}

/// Forwards events over an unbounded channel; a dropped receiver is ignored
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: UnboundedSender<PipelineEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, UnboundedReceiver<PipelineEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, event: PipelineEvent) {
        let _ = self.tx.send(event);
    }
}

impl EventSink for ChannelSink {
    fn on_progress(&self, current: usize, total: usize) {
        self.send(PipelineEvent::Progress { current, total });
    }

    fn on_log(&self, message: &str) {
        self.send(PipelineEvent::Log(message.to_string()));
    }

    fn on_status(&self, status: &str) {
        self.send(PipelineEvent::Status(status.to_string()));
    }

    fn on_state(&self, state: PipelineState) {
        self.send(PipelineEvent::State(state));
    }

    fn on_complete(&self, summary: &RunSummary) {
        self.send(PipelineEvent::Complete(summary.clone()));
    }
}
