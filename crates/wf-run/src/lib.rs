//! wf-run - Concurrent DAG execution for Wrenflow
//!
//! The scheduler walks a dependency graph with a bounded worker pool,
//! invoking each selected resource's run-callback exactly once, in an
//! order consistent with the graph, and propagating upstream failures
//! downstream as skips. Readiness is computed by a single coordinator;
//! the only shared mutable state is owned by it.

pub mod events;
pub mod scheduler;

pub use events::{EventSink, LogSink, NullSink, RunEvent, Severity};
pub use scheduler::{NodeRunner, ScheduleOptions, Scheduler};
