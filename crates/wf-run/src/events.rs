//! Run lifecycle events.
//!
//! The scheduler notifies an [`EventSink`] when resources start and finish.
//! Emission is synchronous and fire-and-forget: a sink must return
//! promptly and must never block scheduling. Each event carries a severity
//! so sinks can route to the right destination without knowing the
//! payload.

use wf_core::results::NodeStatus;
use wf_core::unique_id::UniqueId;

/// Event severity, used by sinks to route output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Debug,
    Info,
    Warn,
    Error,
}

/// A scheduler lifecycle notification.
#[derive(Debug, Clone)]
pub enum RunEvent {
    /// Execution is starting over `selected` resources
    RunStarted { selected: usize },

    /// A resource's callback was dispatched
    NodeStarted { unique_id: UniqueId },

    /// A resource reached a terminal state
    NodeFinished {
        unique_id: UniqueId,
        status: NodeStatus,
        execution_time: f64,
    },

    /// The run completed
    RunFinished { elapsed: f64, success: bool },
}

impl RunEvent {
    /// Severity of this event.
    pub fn severity(&self) -> Severity {
        match self {
            RunEvent::NodeStarted { .. } => Severity::Debug,
            RunEvent::NodeFinished { status, .. } => match status {
                NodeStatus::Error | NodeStatus::Fail => Severity::Error,
                NodeStatus::Warn => Severity::Warn,
                _ => Severity::Info,
            },
            RunEvent::RunStarted { .. } => Severity::Info,
            RunEvent::RunFinished { success, .. } => {
                if *success {
                    Severity::Info
                } else {
                    Severity::Error
                }
            }
        }
    }
}

/// Receiver of scheduler lifecycle events.
pub trait EventSink: Send + Sync {
    /// Handle one event. Must not block.
    fn emit(&self, event: &RunEvent);
}

/// Sink that forwards events to the `log` facade.
#[derive(Debug, Default)]
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&self, event: &RunEvent) {
        let level = match event.severity() {
            Severity::Debug => log::Level::Debug,
            Severity::Info => log::Level::Info,
            Severity::Warn => log::Level::Warn,
            Severity::Error => log::Level::Error,
        };
        match event {
            RunEvent::RunStarted { selected } => {
                log::log!(level, "running {} resources", selected)
            }
            RunEvent::NodeStarted { unique_id } => {
                log::log!(level, "started {}", unique_id)
            }
            RunEvent::NodeFinished {
                unique_id,
                status,
                execution_time,
            } => {
                log::log!(level, "{} {} in {:.2}s", unique_id, status, execution_time)
            }
            RunEvent::RunFinished { elapsed, success } => {
                log::log!(level, "run finished in {:.2}s (success: {})", elapsed, success)
            }
        }
    }
}

/// Sink that discards everything. Useful in tests.
#[derive(Debug, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: &RunEvent) {}
}
