//! The DAG scheduler.
//!
//! One coordinator task owns every piece of mutable scheduling state: the
//! per-node state map, the in-degree counts, and the ordered ready set.
//! Workers are plain tokio tasks; they receive an owned manifest handle and
//! a runner, execute one resource, and report back through the join set.
//! A node transitions pending -> running -> terminal exactly once, and all
//! transitions happen on the coordinator.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio::task::JoinSet;

use wf_core::graph::Graph;
use wf_core::manifest::Manifest;
use wf_core::resource::Resource;
use wf_core::results::{NodeResult, NodeStatus, RunResult};
use wf_core::unique_id::UniqueId;

use crate::events::{EventSink, NullSink, RunEvent};

/// Per-resource execution callback: compile and run one resource.
#[async_trait]
pub trait NodeRunner: Send + Sync {
    /// Execute one resource to a terminal outcome. Errors are reported
    /// through the returned result's status, never by panicking.
    async fn run(&self, resource: &Resource) -> NodeResult;
}

/// Scheduler configuration.
#[derive(Debug, Clone, Default)]
pub struct ScheduleOptions {
    /// Worker pool size; 0 derives from available parallelism
    pub threads: usize,

    /// Stop dispatching after the first error/fail outcome
    pub fail_fast: bool,

    /// External cancellation flag; when set, running callbacks finish but
    /// nothing new starts and the remainder is recorded as skipped
    pub cancel: Option<Arc<AtomicBool>>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum NodeState {
    Pending,
    Running,
    Terminal(NodeStatus),
}

/// Executes a selection of resources in graph order.
pub struct Scheduler {
    manifest: Arc<Manifest>,
    opts: ScheduleOptions,
    sink: Arc<dyn EventSink>,
}

impl Scheduler {
    /// Create a scheduler over an assembled manifest.
    pub fn new(manifest: Arc<Manifest>, opts: ScheduleOptions) -> Self {
        Self {
            manifest,
            opts,
            sink: Arc::new(NullSink),
        }
    }

    /// Attach an event sink for lifecycle notifications.
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    fn cancelled(&self) -> bool {
        self.opts
            .cancel
            .as_ref()
            .map(|flag| flag.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    fn thread_count(&self) -> usize {
        if self.opts.threads > 0 {
            self.opts.threads
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        }
    }

    /// Run every selected resource exactly once, respecting the graph.
    ///
    /// Resources carrying a parse error enter pre-marked as `error`; their
    /// transitive dependents are skipped without their callbacks ever
    /// being invoked. Unrelated subgraphs proceed normally.
    pub async fn execute(
        &self,
        graph: &Graph,
        selection: &BTreeSet<UniqueId>,
        runner: Arc<dyn NodeRunner>,
    ) -> RunResult {
        let started = Instant::now();
        let threads = self.thread_count();

        // Execution set: selected, enabled, executable, present in the graph.
        let exec_set: BTreeSet<UniqueId> = selection
            .iter()
            .filter(|id| graph.contains(id))
            .filter(|id| {
                self.manifest
                    .get(id)
                    .map(|r| r.enabled && r.kind.is_executable())
                    .unwrap_or(false)
            })
            .cloned()
            .collect();

        self.sink.emit(&RunEvent::RunStarted {
            selected: exec_set.len(),
        });

        let mut state: HashMap<UniqueId, NodeState> = exec_set
            .iter()
            .map(|id| (id.clone(), NodeState::Pending))
            .collect();
        let mut indegree: HashMap<UniqueId, usize> = exec_set
            .iter()
            .map(|id| {
                let n = graph
                    .dependencies(id)
                    .into_iter()
                    .filter(|d| exec_set.contains(d))
                    .count();
                (id.clone(), n)
            })
            .collect();
        let mut ready: BTreeSet<UniqueId> = BTreeSet::new();
        let mut results: Vec<NodeResult> = Vec::with_capacity(exec_set.len());

        // Structural failures recorded at parse time enter the run
        // pre-marked; their callbacks are never invoked.
        for id in &exec_set {
            let Some(message) = self.manifest.get(id).and_then(|r| r.parse_error.clone()) else {
                continue;
            };
            let result = NodeResult::new(id.clone(), NodeStatus::Error, Some(message), 0.0);
            self.finish_node(&result, &mut state);
            results.push(result);
            self.skip_descendants(graph, id, &exec_set, &mut state, &mut ready, &mut results);
        }

        for id in &exec_set {
            if state[id] == NodeState::Pending && indegree[id] == 0 {
                ready.insert(id.clone());
            }
        }

        let mut join_set: JoinSet<(UniqueId, NodeResult)> = JoinSet::new();
        let mut task_ids: HashMap<tokio::task::Id, UniqueId> = HashMap::new();
        let mut running = 0usize;
        let mut stopped = false;

        loop {
            if !stopped && self.cancelled() {
                stopped = true;
            }

            // Dispatch in id order while pool capacity remains. Ties among
            // simultaneously-ready nodes always break deterministically.
            while !stopped && running < threads {
                let Some(id) = ready.pop_first() else { break };
                state.insert(id.clone(), NodeState::Running);
                self.sink.emit(&RunEvent::NodeStarted {
                    unique_id: id.clone(),
                });

                let manifest = Arc::clone(&self.manifest);
                let runner = Arc::clone(&runner);
                let node_id = id.clone();
                let handle = join_set.spawn(async move {
                    let result = match manifest.get(&id) {
                        Some(resource) => runner.run(resource).await,
                        None => NodeResult::new(
                            id.clone(),
                            NodeStatus::Error,
                            Some("resource missing from manifest".to_string()),
                            0.0,
                        ),
                    };
                    (id, result)
                });
                task_ids.insert(handle.id(), node_id);
                running += 1;
            }

            if running == 0 {
                break;
            }

            match join_set.join_next_with_id().await {
                Some(Ok((task_id, (id, mut result)))) => {
                    task_ids.remove(&task_id);
                    running -= 1;
                    // The coordinator's id is authoritative for bookkeeping.
                    result.unique_id = id.clone();
                    self.finish_node(&result, &mut state);
                    let failed = result.status.is_failure();
                    results.push(result);

                    if failed {
                        self.skip_descendants(
                            graph, &id, &exec_set, &mut state, &mut ready, &mut results,
                        );
                        if self.opts.fail_fast {
                            stopped = true;
                        }
                    } else {
                        for dependent in graph.dependents(&id) {
                            if state.get(&dependent) != Some(&NodeState::Pending) {
                                continue;
                            }
                            if let Some(n) = indegree.get_mut(&dependent) {
                                *n = n.saturating_sub(1);
                                if *n == 0 {
                                    ready.insert(dependent);
                                }
                            }
                        }
                    }
                }
                Some(Err(join_err)) => {
                    running -= 1;
                    let Some(id) = task_ids.remove(&join_err.id()) else {
                        log::error!("untracked execution task failed: {}", join_err);
                        continue;
                    };
                    // A panicking callback still yields a terminal outcome
                    // for its node, so the rest of the run can proceed.
                    let result = NodeResult::new(
                        id.clone(),
                        NodeStatus::Error,
                        Some(format!("execution task panicked: {}", join_err)),
                        0.0,
                    );
                    self.finish_node(&result, &mut state);
                    results.push(result);
                    self.skip_descendants(
                        graph, &id, &exec_set, &mut state, &mut ready, &mut results,
                    );
                    if self.opts.fail_fast {
                        stopped = true;
                    }
                }
                None => break,
            }
        }

        // Whatever never started is a skip, not an error.
        let mut remaining: Vec<UniqueId> = state
            .iter()
            .filter(|(_, s)| **s == NodeState::Pending)
            .map(|(id, _)| id.clone())
            .collect();
        remaining.sort();
        for id in remaining {
            let reason = if stopped {
                "not started before the run was stopped"
            } else {
                "upstream resource did not complete"
            };
            let result = NodeResult::skipped(id, reason);
            self.finish_node(&result, &mut state);
            results.push(result);
        }

        let elapsed = started.elapsed().as_secs_f64();
        let run_result = RunResult::new(results, elapsed);
        self.sink.emit(&RunEvent::RunFinished {
            elapsed,
            success: run_result.success(),
        });
        run_result
    }

    /// Record a terminal transition and notify the sink.
    fn finish_node(&self, result: &NodeResult, state: &mut HashMap<UniqueId, NodeState>) {
        let prev = state.insert(
            result.unique_id.clone(),
            NodeState::Terminal(result.status),
        );
        debug_assert!(
            !matches!(prev, Some(NodeState::Terminal(_))),
            "node {} reached a terminal state twice",
            result.unique_id
        );
        self.sink.emit(&RunEvent::NodeFinished {
            unique_id: result.unique_id.clone(),
            status: result.status,
            execution_time: result.execution_time,
        });
    }

    /// Mark every pending transitive dependent of `failed` as skipped.
    fn skip_descendants(
        &self,
        graph: &Graph,
        failed: &UniqueId,
        exec_set: &BTreeSet<UniqueId>,
        state: &mut HashMap<UniqueId, NodeState>,
        ready: &mut BTreeSet<UniqueId>,
        results: &mut Vec<NodeResult>,
    ) {
        for descendant in graph.descendants(failed) {
            if !exec_set.contains(&descendant) {
                continue;
            }
            if state.get(&descendant) != Some(&NodeState::Pending) {
                continue;
            }
            ready.remove(&descendant);
            let result = NodeResult::skipped(
                descendant,
                format!("upstream failure of {}", failed),
            );
            self.finish_node(&result, state);
            results.push(result);
        }
    }
}

#[cfg(test)]
#[path = "scheduler_test.rs"]
mod tests;
