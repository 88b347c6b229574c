//! Pass Planner
//!
//! Schedules the operations of one execution pass:
//! - Readiness tracking against the dependency graph
//! - Parallel slot management, with one operation at a time per nested workflow
//! - Failure propagation to downstream operations
//! - Per-operation status and timing

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::time::Instant;

use indexmap::IndexMap;
use log::{debug, info};

use crate::error::EngineError;

use super::validator::DependencyGraph;

/// Status of an operation during a pass.
#[derive(Debug, Clone, PartialEq)]
pub enum OpStatus {
    /// Waiting for dependencies
    Pending,
    /// Entry point is executing
    Running,
    /// Finished and outputs published
    Done,
    /// Resolution or execution failed
    Failed(EngineError),
    /// Never attempted because an upstream operation failed or is disabled
    Unresolved { blocked_by: String },
    /// Switched off in its workflow
    Disabled,
}

impl OpStatus {
    /// True once the operation can no longer change this pass.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OpStatus::Pending | OpStatus::Running)
    }
}

impl fmt::Display for OpStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpStatus::Pending => write!(f, "pending"),
            OpStatus::Running => write!(f, "running"),
            OpStatus::Done => write!(f, "done"),
            OpStatus::Failed(err) => write!(f, "failed: {}", err),
            OpStatus::Unresolved { blocked_by } => {
                write!(f, "unresolved (blocked by {})", blocked_by)
            }
            OpStatus::Disabled => write!(f, "disabled"),
        }
    }
}

/// Execution metrics for a single operation.
#[derive(Debug, Clone)]
pub struct OpMetrics {
    /// When the operation started executing
    pub start_time: Option<Instant>,
    /// When the operation finished
    pub end_time: Option<Instant>,
    /// Duration in milliseconds
    pub duration_ms: Option<u128>,
    /// Current status
    pub status: OpStatus,
}

impl OpMetrics {
    fn new() -> Self {
        Self {
            start_time: None,
            end_time: None,
            duration_ms: None,
            status: OpStatus::Pending,
        }
    }

    fn finish(&mut self, status: OpStatus) {
        let now = Instant::now();
        self.end_time = Some(now);
        if let Some(start) = self.start_time {
            self.duration_ms = Some(now.duration_since(start).as_millis());
        }
        self.status = status;
    }
}

/// Tracks which operations of a pass may run next.
///
/// The planner tracks:
/// - Topological order of the pass
/// - Direct dependencies and dependents of each operation
/// - Nested workflows each operation drives
/// - How many operations are running against the parallel limit
/// - Metrics for every operation
///
/// Disabled operations are settled when the planner is created, so their
/// dependents are already unresolved before the first operation starts.
pub struct PassPlanner {
    order: Vec<String>,
    dependencies: HashMap<String, Vec<String>>,
    dependents: HashMap<String, Vec<String>>,
    nested: HashMap<String, Vec<String>>,
    metrics: HashMap<String, OpMetrics>,
    running_count: usize,
    max_parallel: usize,
}

impl PassPlanner {
    /// Creates a planner for one pass.
    ///
    /// # Arguments
    ///
    /// * `graph` - Dependency graph of the workflow
    /// * `order` - Topological order from the same graph
    /// * `max_parallel` - Maximum concurrent operations (at least 1)
    pub fn new(graph: &DependencyGraph, order: Vec<String>, max_parallel: usize) -> Self {
        let max_parallel = max_parallel.max(1);
        info!(
            "Planning pass: {} operations, {} parallel slots",
            order.len(),
            max_parallel
        );

        let mut dependencies = HashMap::new();
        let mut dependents = HashMap::new();
        let mut nested = HashMap::new();
        let mut metrics = HashMap::new();
        for name in &order {
            dependencies.insert(name.clone(), graph.dependencies(name));
            dependents.insert(name.clone(), graph.dependents(name));
            nested.insert(name.clone(), graph.nested_workflows(name).to_vec());
            metrics.insert(name.clone(), OpMetrics::new());
        }

        let mut planner = Self {
            order,
            dependencies,
            dependents,
            nested,
            metrics,
            running_count: 0,
            max_parallel,
        };

        let disabled: Vec<String> = planner
            .order
            .iter()
            .filter(|name| !graph.is_enabled(name))
            .cloned()
            .collect();
        for name in disabled {
            info!("Operation '{}' is disabled, skipping", name);
            if let Some(metrics) = planner.metrics.get_mut(&name) {
                metrics.status = OpStatus::Disabled;
            }
            planner.block_downstream(&name);
        }

        planner
    }

    fn status_of(&self, name: &str) -> Option<&OpStatus> {
        self.metrics.get(name).map(|m| &m.status)
    }

    fn nested_of(&self, name: &str) -> &[String] {
        self.nested.get(name).map_or(&[][..], Vec::as_slice)
    }

    /// Returns operations that may start now, in topological order.
    ///
    /// An operation is ready if:
    /// - It is still pending
    /// - Every dependency is done
    /// - No running or already chosen operation drives one of its nested workflows
    /// - A parallel slot is free for it
    pub fn ready_operations(&self) -> Vec<String> {
        let free = self.max_parallel.saturating_sub(self.running_count);
        if free == 0 {
            return Vec::new();
        }

        let mut claimed: HashSet<&str> = self
            .order
            .iter()
            .filter(|name| self.status_of(name) == Some(&OpStatus::Running))
            .flat_map(|name| self.nested_of(name))
            .map(String::as_str)
            .collect();

        let mut ready = Vec::new();
        for name in &self.order {
            if ready.len() == free {
                break;
            }
            if self.status_of(name) != Some(&OpStatus::Pending) {
                continue;
            }
            let deps_done = self.dependencies.get(name).map_or(true, |deps| {
                deps.iter().all(|d| self.status_of(d) == Some(&OpStatus::Done))
            });
            if !deps_done {
                continue;
            }

            let targets = self.nested_of(name);
            if let Some(busy) = targets.iter().find(|t| claimed.contains(t.as_str())) {
                debug!("Operation '{}' waits for nested workflow '{}'", name, busy);
                continue;
            }
            claimed.extend(targets.iter().map(String::as_str));
            ready.push(name.clone());
        }
        ready
    }

    pub fn mark_running(&mut self, name: &str) {
        if let Some(metrics) = self.metrics.get_mut(name) {
            metrics.start_time = Some(Instant::now());
            metrics.status = OpStatus::Running;
            self.running_count += 1;
            debug!(
                "Operation '{}' started ({}/{} slots)",
                name, self.running_count, self.max_parallel
            );
        }
    }

    fn release(&mut self, name: &str) {
        if self.status_of(name) == Some(&OpStatus::Running) {
            self.running_count = self.running_count.saturating_sub(1);
        }
    }

    pub fn mark_done(&mut self, name: &str) {
        self.release(name);
        if let Some(metrics) = self.metrics.get_mut(name) {
            metrics.finish(OpStatus::Done);
        }
    }

    /// Marks an operation failed and every pending operation downstream of
    /// it unresolved. Returns the names that were blocked.
    pub fn mark_failed(&mut self, name: &str, error: EngineError) -> Vec<String> {
        self.release(name);
        if let Some(metrics) = self.metrics.get_mut(name) {
            metrics.finish(OpStatus::Failed(error));
        }
        self.block_downstream(name)
    }

    fn block_downstream(&mut self, name: &str) -> Vec<String> {
        let mut blocked = Vec::new();
        let mut queue: VecDeque<String> = VecDeque::from([name.to_string()]);
        while let Some(current) = queue.pop_front() {
            let next: Vec<String> = self.dependents.get(&current).cloned().unwrap_or_default();
            for dependent in next {
                if let Some(metrics) = self.metrics.get_mut(&dependent) {
                    if metrics.status == OpStatus::Pending {
                        metrics.status = OpStatus::Unresolved {
                            blocked_by: name.to_string(),
                        };
                        blocked.push(dependent.clone());
                        queue.push_back(dependent);
                    }
                }
            }
        }
        blocked
    }

    /// True while some operation is pending or running.
    pub fn has_work_remaining(&self) -> bool {
        self.metrics.values().any(|m| !m.status.is_terminal())
    }

    /// Returns the current progress as (finished, total).
    pub fn progress(&self) -> (usize, usize) {
        let finished = self.metrics.values().filter(|m| m.status.is_terminal()).count();
        (finished, self.order.len())
    }

    pub fn running_count(&self) -> usize {
        self.running_count
    }

    pub fn status(&self, name: &str) -> Option<&OpStatus> {
        self.status_of(name)
    }

    pub fn metrics(&self) -> &HashMap<String, OpMetrics> {
        &self.metrics
    }

    /// Final statuses in execution order.
    pub fn into_statuses(mut self) -> IndexMap<String, OpStatus> {
        self.order
            .iter()
            .map(|name| {
                let status = self
                    .metrics
                    .remove(name)
                    .map_or(OpStatus::Pending, |m| m.status);
                (name.clone(), status)
            })
            .collect()
    }
}
