//! Workflow Execution Engine
//!
//! The core engine that runs execution passes over a workflow:
//! - Dependency ordering and cycle rejection before anything runs
//! - Input resolution immediately before each operation
//! - Sequential or bounded-parallel scheduling
//! - Failure isolation to the failing operation's dependents
//! - A shared registry of workflows for nested execution

use std::fmt;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, MutexGuard, PoisonError, RwLock};
use std::thread;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use log::{debug, error, info, warn};

use crate::environment::{PluginHandle, PluginManager};
use crate::error::{EngineError, Result};
use crate::monitoring::{EventType, ExecutionTimeline};
use crate::namespace::Uri;
use crate::workflow::{
    DependencyGraph, OpIo, OpStatus, Operation, PassPlanner, Value, Workflow, WorkflowHandle,
};

use super::resolver::Resolver;
use super::step::run_operation;

/// An operation ready to run, detached from its workflow.
struct Job {
    name: String,
    op: Box<dyn Operation>,
    io: OpIo,
}

/// A job after its entry point returned.
struct Finished {
    name: String,
    op: Box<dyn Operation>,
    io: OpIo,
    result: Result<()>,
}

impl Job {
    fn run(mut self) -> Finished {
        let result = run_operation(&self.name, self.op.as_mut(), &mut self.io);
        Finished {
            name: self.name,
            op: self.op,
            io: self.io,
            result,
        }
    }
}

/// Outcome of one execution pass.
#[derive(Debug, Clone)]
pub struct PassReport {
    pub workflow: String,
    pub started_at: DateTime<Utc>,
    /// Topological order the pass followed; empty if it was aborted
    pub order: Vec<String>,
    /// Terminal status of every operation, in execution order
    pub statuses: IndexMap<String, OpStatus>,
    /// Structural error that stopped the pass before anything ran
    pub aborted: Option<EngineError>,
    pub timeline: ExecutionTimeline,
}

impl PassReport {
    fn aborted(
        workflow: &str,
        started_at: DateTime<Utc>,
        graph: &DependencyGraph,
        err: EngineError,
        timeline: ExecutionTimeline,
    ) -> Self {
        let members: Vec<String> = match &err {
            EngineError::CyclicDependency { path } => path.clone(),
            _ => Vec::new(),
        };
        let blocked_by = members.first().cloned().unwrap_or_default();

        let statuses = graph
            .nodes()
            .iter()
            .map(|name| {
                let status = if members.contains(name) {
                    OpStatus::Failed(err.clone())
                } else {
                    OpStatus::Unresolved {
                        blocked_by: blocked_by.clone(),
                    }
                };
                (name.clone(), status)
            })
            .collect();

        Self {
            workflow: workflow.to_string(),
            started_at,
            order: Vec::new(),
            statuses,
            aborted: Some(err),
            timeline,
        }
    }

    pub fn status(&self, operation: &str) -> Option<&OpStatus> {
        self.statuses.get(operation)
    }

    /// True if the pass ran and every enabled operation is done.
    pub fn is_success(&self) -> bool {
        self.aborted.is_none()
            && self
                .statuses
                .values()
                .all(|s| matches!(s, OpStatus::Done | OpStatus::Disabled))
    }

    /// Failed operations with their errors.
    pub fn failures(&self) -> Vec<(&str, &EngineError)> {
        self.statuses
            .iter()
            .filter_map(|(name, status)| match status {
                OpStatus::Failed(err) => Some((name.as_str(), err)),
                _ => None,
            })
            .collect()
    }

    /// Operations skipped because something upstream failed.
    pub fn unresolved(&self) -> Vec<&str> {
        self.statuses
            .iter()
            .filter(|(_, status)| matches!(status, OpStatus::Unresolved { .. }))
            .map(|(name, _)| name.as_str())
            .collect()
    }

    pub fn done(&self) -> Vec<&str> {
        self.statuses
            .iter()
            .filter(|(_, status)| **status == OpStatus::Done)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Operations switched off in their workflow.
    pub fn disabled(&self) -> Vec<&str> {
        self.statuses
            .iter()
            .filter(|(_, status)| **status == OpStatus::Disabled)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// One-line summary, e.g. `"3 done, 1 failed, 1 unresolved"`.
    pub fn summary(&self) -> String {
        let mut text = format!(
            "{} done, {} failed, {} unresolved",
            self.done().len(),
            self.failures().len(),
            self.unresolved().len()
        );
        let disabled = self.disabled().len();
        if disabled > 0 {
            text.push_str(&format!(", {} disabled", disabled));
        }
        text
    }
}

impl fmt::Display for PassReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Pass over '{}' ({})", self.workflow, self.summary())?;
        if let Some(err) = &self.aborted {
            writeln!(f, "  aborted: {}", err)?;
        }
        for (name, status) in &self.statuses {
            writeln!(f, "  {}: {}", name, status)?;
        }
        Ok(())
    }
}

/// Workflow execution engine.
///
/// Cheap to clone: clones share the plugin manager and the workflow
/// registry, which is how operations drive nested workflows. The clone
/// handed to an operation also remembers which workflows are mid-pass
/// above it, so a nested loop is reported as a cycle.
///
/// # Example
///
/// ```rust,no_run
/// use opflow::execution::Engine;
/// use opflow::workflow::Workflow;
///
/// let mut engine = Engine::new();
/// engine.set_max_parallel(4);
///
/// let mut workflow = Workflow::new("main");
/// let report = engine.execute(&mut workflow);
/// println!("{}", report.summary());
/// ```
#[derive(Clone)]
pub struct Engine {
    plugins: PluginHandle,
    workflows: Arc<RwLock<IndexMap<String, WorkflowHandle>>>,
    max_parallel: usize,
    active: Vec<String>,
}

impl Engine {
    /// Creates a sequential engine with no plugins and no workflows.
    pub fn new() -> Self {
        Self::with_plugins(PluginManager::new().into_handle())
    }

    pub fn with_plugins(plugins: PluginHandle) -> Self {
        Self {
            plugins,
            workflows: Arc::new(RwLock::new(IndexMap::new())),
            max_parallel: 1,
            active: Vec::new(),
        }
    }

    /// Sets the maximum number of operations run at once.
    ///
    /// Clamped to `1..=num_cpus::get()`; `1` runs strictly in order on the
    /// calling thread.
    pub fn set_max_parallel(&mut self, max: usize) {
        self.max_parallel = max.clamp(1, num_cpus::get().max(1));
    }

    pub fn max_parallel(&self) -> usize {
        self.max_parallel
    }

    pub fn plugins(&self) -> &PluginHandle {
        &self.plugins
    }

    /// Reads a plugin output slot.
    pub fn read_plugin(&self, uri: &Uri) -> Result<Value> {
        let plugins = self.plugins.read().unwrap_or_else(PoisonError::into_inner);
        plugins.read(uri)
    }

    /// Makes a workflow reachable by name for `EntireWorkflow` inputs.
    pub fn register_workflow(&self, handle: WorkflowHandle) {
        let mut workflows = self.workflows.write().unwrap_or_else(PoisonError::into_inner);
        if workflows
            .insert(handle.name().to_string(), handle)
            .is_some()
        {
            debug!("Replaced registered workflow");
        }
    }

    pub fn unregister_workflow(&self, name: &str) -> Option<WorkflowHandle> {
        let mut workflows = self.workflows.write().unwrap_or_else(PoisonError::into_inner);
        workflows.shift_remove(name)
    }

    pub fn workflow(&self, name: &str) -> Option<WorkflowHandle> {
        let workflows = self.workflows.read().unwrap_or_else(PoisonError::into_inner);
        workflows.get(name).cloned()
    }

    /// Registered workflow names in registration order.
    pub fn workflow_names(&self) -> Vec<String> {
        let workflows = self.workflows.read().unwrap_or_else(PoisonError::into_inner);
        workflows.keys().cloned().collect()
    }

    /// Clone for the operations of a pass over `workflow`.
    fn within(&self, workflow: &str) -> Self {
        let mut engine = self.clone();
        engine.active.push(workflow.to_string());
        engine
    }

    /// Locks a shared workflow for a pass driven from this engine.
    ///
    /// # Returns
    ///
    /// * `Err(CyclicDependency)` - The workflow is already mid-pass further up
    ///   this chain of nested passes
    /// * `Err(WorkflowBusy)` - Some unrelated caller holds the workflow
    pub(crate) fn lock_workflow<'a>(
        &self,
        handle: &'a WorkflowHandle,
    ) -> Result<MutexGuard<'a, Workflow>> {
        if self.active.iter().any(|name| name == handle.name()) {
            let mut path = self.active.clone();
            path.push(handle.name().to_string());
            return Err(EngineError::CyclicDependency { path });
        }
        handle.try_lock()
    }

    /// Runs one pass over a shared workflow.
    ///
    /// Fails with `CyclicDependency` if the workflow is already running a
    /// pass that led here, or `WorkflowBusy` if someone else holds it.
    pub fn execute_handle(&self, handle: &WorkflowHandle) -> Result<PassReport> {
        let mut workflow = self.lock_workflow(handle)?;
        Ok(self.execute(&mut workflow))
    }

    /// Runs one execution pass.
    ///
    /// The pass:
    /// 1. Clears every output and every cached input value
    /// 2. Orders operations, aborting on a cycle before anything runs
    /// 3. Resolves and runs each operation once its dependencies are done
    /// 4. Marks dependents of a failed operation unresolved
    ///
    /// # Returns
    ///
    /// The status of every operation. Failures are reported, never raised.
    pub fn execute(&self, workflow: &mut Workflow) -> PassReport {
        let started_at = Utc::now();
        let mut timeline = ExecutionTimeline::new();

        info!(
            "Starting pass over '{}' ({} operations, max parallel: {})",
            workflow.name(),
            workflow.len(),
            self.max_parallel
        );

        workflow.clear_pass_state();

        let graph = DependencyGraph::build(workflow);
        let order = match graph.topological_order() {
            Ok(order) => order,
            Err(err) => {
                error!("Pass over '{}' aborted: {}", workflow.name(), err);
                return PassReport::aborted(workflow.name(), started_at, &graph, err, timeline);
            }
        };

        let mut planner = PassPlanner::new(&graph, order.clone(), self.max_parallel);
        let (tx, rx): (Sender<Finished>, Receiver<Finished>) = channel();

        loop {
            let ready = planner.ready_operations();

            if ready.is_empty() {
                if planner.running_count() == 0 {
                    break;
                }
                match rx.recv() {
                    Ok(finished) => finish(workflow, &mut planner, &mut timeline, finished),
                    Err(e) => {
                        error!("Failed to receive operation completion: {}", e);
                        break;
                    }
                }
                continue;
            }

            for name in ready {
                planner.mark_running(&name);
                timeline.add_event(name.as_str(), EventType::Started);

                let job = match self.prepare(workflow, &name) {
                    Ok(job) => job,
                    Err(err) => {
                        fail(&mut planner, &mut timeline, &name, err);
                        continue;
                    }
                };

                if self.max_parallel <= 1 {
                    let finished = job.run();
                    finish(workflow, &mut planner, &mut timeline, finished);
                } else {
                    let tx = tx.clone();
                    thread::spawn(move || {
                        if let Err(e) = tx.send(job.run()) {
                            error!("Failed to send completion signal: {}", e);
                        }
                    });
                }
            }
        }

        let report = PassReport {
            workflow: workflow.name().to_string(),
            started_at,
            order,
            statuses: planner.into_statuses(),
            aborted: None,
            timeline,
        };
        info!(
            "Pass over '{}' finished in {} ms: {}",
            report.workflow,
            report.timeline.total().as_millis(),
            report.summary()
        );
        report
    }

    /// Resolves inputs of `name` and detaches it for execution.
    fn prepare(&self, workflow: &mut Workflow, name: &str) -> Result<Job> {
        let mut resolver = Resolver::new(self, workflow);
        let inputs = resolver.resolve_operation(name);
        let resolved = resolver.into_resolved();
        workflow.cache_inputs(resolved);
        let inputs = inputs?;

        let schema = workflow.operation(name)?.schema().clone();
        for spec in schema.inputs.iter().filter(|spec| spec.required) {
            if inputs.get(&spec.name).map_or(true, Value::is_none) {
                return Err(EngineError::UnresolvedInput {
                    operation: name.to_string(),
                    input: spec.name.clone(),
                    reason: "required input has no value".to_string(),
                });
            }
        }

        let op = workflow.take_op(name)?;
        let io = OpIo::new(name, inputs, &schema.output_names(), self.within(workflow.name()));
        Ok(Job {
            name: name.to_string(),
            op,
            io,
        })
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

/// Returns a finished operation to its workflow and publishes its outputs.
fn finish(
    workflow: &mut Workflow,
    planner: &mut PassPlanner,
    timeline: &mut ExecutionTimeline,
    finished: Finished,
) {
    let Finished {
        name,
        op,
        io,
        result,
    } = finished;

    if let Err(err) = workflow.restore_op(&name, op) {
        warn!("Could not return operation '{}' to its workflow: {}", name, err);
    }

    let published = result.and_then(|()| workflow.publish_outputs(&name, io.into_outputs()));
    match published {
        Ok(()) => {
            info!("Operation '{}' done", name);
            planner.mark_done(&name);
            timeline.add_event(name, EventType::Done);
        }
        Err(err) => fail(planner, timeline, &name, err),
    }
}

fn fail(planner: &mut PassPlanner, timeline: &mut ExecutionTimeline, name: &str, err: EngineError) {
    error!("Operation '{}' failed: {}", name, err);
    timeline.add_event(name, EventType::Failed);
    for blocked in planner.mark_failed(name, err) {
        warn!("Operation '{}' unresolved: blocked by '{}'", blocked, name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operations::batch::BatchFromFiles;
    use crate::testing::{Double, Emit, Explode, FailOn, Nap, Pass, RunNested};
    use crate::workflow::{DataType, Locator};

    fn reference(uri: &str) -> Locator {
        Locator::reference(uri).unwrap()
    }

    /// `a` emits 10, `b` doubles it.
    fn doubling() -> Workflow {
        let mut wf = Workflow::new("W");
        wf.add_operation("a", "Emit", Box::new(Emit::new(10))).unwrap();
        wf.add_operation("b", "Double", Box::new(Double)).unwrap();
        wf.set_input("b", "y", reference("a.outputs.x")).unwrap();
        wf
    }

    #[test]
    fn test_end_to_end_doubling() {
        let engine = Engine::new();
        let mut wf = doubling();

        let report = engine.execute(&mut wf);

        assert!(report.is_success(), "{}", report);
        assert_eq!(report.status("a"), Some(&OpStatus::Done));
        assert_eq!(report.status("b"), Some(&OpStatus::Done));
        assert_eq!(wf.output_value("a", "x").unwrap(), Some(&Value::Int(10)));
        assert_eq!(wf.output_value("b", "z").unwrap(), Some(&Value::Int(20)));
        assert_eq!(report.summary(), "2 done, 0 failed, 0 unresolved");
    }

    #[test]
    fn test_order_respects_references() {
        let engine = Engine::new();
        let mut wf = Workflow::new("reverse");
        wf.add_operation("last", "Double", Box::new(Double)).unwrap();
        wf.add_operation("middle", "Pass", Box::new(Pass)).unwrap();
        wf.add_operation("first", "Emit", Box::new(Emit::new(4))).unwrap();
        wf.set_input("middle", "input", reference("first.outputs.x")).unwrap();
        wf.set_input("last", "y", reference("middle.outputs.out")).unwrap();

        let report = engine.execute(&mut wf);

        assert_eq!(report.order, vec!["first", "middle", "last"]);
        let keys: Vec<&String> = report.statuses.keys().collect();
        assert_eq!(keys, vec!["first", "middle", "last"]);
        assert_eq!(wf.output_value("last", "z").unwrap(), Some(&Value::Int(8)));

        let events: Vec<&str> = report
            .timeline
            .events()
            .iter()
            .filter(|e| e.event_type == EventType::Started)
            .map(|e| e.operation.as_str())
            .collect();
        assert_eq!(events, vec!["first", "middle", "last"]);
    }

    #[test]
    fn test_repeated_pass_is_deterministic() {
        let engine = Engine::new();
        let mut wf = doubling();

        let first = engine.execute(&mut wf);
        let z1 = wf.output_value("b", "z").unwrap().cloned();
        let second = engine.execute(&mut wf);
        let z2 = wf.output_value("b", "z").unwrap().cloned();

        assert_eq!(first.statuses, second.statuses);
        assert_eq!(first.order, second.order);
        assert_eq!(z1, z2);
    }

    #[test]
    fn test_no_stale_outputs_after_failure() {
        let engine = Engine::new();
        let mut wf = Workflow::new("stale");
        wf.add_operation("check", "FailOn", Box::new(FailOn::new("bad")))
            .unwrap();
        wf.add_operation("after", "Pass", Box::new(Pass)).unwrap();
        wf.set_input("check", "input", Locator::literal("good")).unwrap();
        wf.set_input("after", "input", reference("check.outputs.out")).unwrap();

        let report = engine.execute(&mut wf);
        assert!(report.is_success());
        assert_eq!(
            wf.output_value("after", "out").unwrap(),
            Some(&Value::from("good"))
        );

        wf.set_input("check", "input", Locator::literal("bad")).unwrap();
        let report = engine.execute(&mut wf);

        assert!(matches!(report.status("check"), Some(OpStatus::Failed(_))));
        assert_eq!(
            report.status("after"),
            Some(&OpStatus::Unresolved {
                blocked_by: "check".into()
            })
        );
        assert_eq!(wf.output_value("check", "out").unwrap(), None);
        assert_eq!(wf.output_value("after", "out").unwrap(), None);
    }

    #[test]
    fn test_cycle_aborts_before_running() {
        let engine = Engine::new();
        let mut wf = Workflow::new("cycle");
        wf.add_operation("free", "Emit", Box::new(Emit::new(1))).unwrap();
        for name in ["a", "b", "c"] {
            wf.add_operation(name, "Pass", Box::new(Pass)).unwrap();
        }
        wf.set_input("a", "input", reference("c.outputs.out")).unwrap();
        wf.set_input("b", "input", reference("a.outputs.out")).unwrap();
        wf.set_input("c", "input", reference("b.outputs.out")).unwrap();

        let report = engine.execute(&mut wf);

        assert!(matches!(
            report.aborted,
            Some(EngineError::CyclicDependency { .. })
        ));
        assert!(report.done().is_empty());
        assert!(report.timeline.is_empty());
        for name in ["a", "b", "c"] {
            assert!(matches!(report.status(name), Some(OpStatus::Failed(_))));
        }
        assert!(matches!(
            report.status("free"),
            Some(OpStatus::Unresolved { .. })
        ));
        assert_eq!(wf.output_value("free", "x").unwrap(), None);
    }

    #[test]
    fn test_removed_operation_invalidates_reference() {
        let engine = Engine::new();
        let mut wf = doubling();
        assert!(engine.execute(&mut wf).is_success());

        wf.remove_operation("a").unwrap();
        let report = engine.execute(&mut wf);

        match report.status("b") {
            Some(OpStatus::Failed(EngineError::InvalidUri { .. })) => {}
            other => panic!("unexpected status: {:?}", other),
        }
        assert_eq!(wf.output_value("b", "z").unwrap(), None);
    }

    #[test]
    fn test_typed_literal_inputs() {
        let engine = Engine::new();
        let mut wf = Workflow::new("typed");
        wf.add_operation("d", "Double", Box::new(Double)).unwrap();

        wf.set_input("d", "y", Locator::typed(DataType::Integer, "42"))
            .unwrap();
        assert!(engine.execute(&mut wf).is_success());
        assert_eq!(wf.output_value("d", "z").unwrap(), Some(&Value::Int(84)));

        wf.set_input("d", "y", Locator::typed(DataType::Integer, "abc"))
            .unwrap();
        let report = engine.execute(&mut wf);
        assert!(matches!(
            report.status("d"),
            Some(OpStatus::Failed(EngineError::TypeCoercion { .. }))
        ));
    }

    #[test]
    fn test_required_input_without_source() {
        let engine = Engine::new();
        let mut wf = Workflow::new("missing");
        wf.add_operation("d", "Double", Box::new(Double)).unwrap();

        let report = engine.execute(&mut wf);
        assert!(matches!(
            report.status("d"),
            Some(OpStatus::Failed(EngineError::UnresolvedInput { .. }))
        ));
        assert!(!wf.operation("d").unwrap().is_running());
    }

    #[test]
    fn test_own_input_cycle_fails_at_resolution() {
        let engine = Engine::new();
        let mut wf = Workflow::new("self");
        wf.add_operation("p", "Pass", Box::new(Pass)).unwrap();
        wf.add_operation("q", "Emit", Box::new(Emit::new(1))).unwrap();
        wf.set_input("p", "input", reference("p.inputs.input")).unwrap();

        let report = engine.execute(&mut wf);
        assert!(report.aborted.is_none());
        assert!(matches!(
            report.status("p"),
            Some(OpStatus::Failed(EngineError::CyclicDependency { .. }))
        ));
        assert_eq!(report.status("q"), Some(&OpStatus::Done));
    }

    #[test]
    fn test_panic_fails_only_that_operation() {
        let engine = Engine::new();
        let mut wf = Workflow::new("panic");
        wf.add_operation("boom", "Explode", Box::new(Explode)).unwrap();
        wf.add_operation("after", "Pass", Box::new(Pass)).unwrap();
        wf.add_operation("other", "Emit", Box::new(Emit::new(3))).unwrap();
        wf.set_input("after", "input", reference("boom.outputs.out")).unwrap();

        let report = engine.execute(&mut wf);

        assert!(matches!(
            report.status("boom"),
            Some(OpStatus::Failed(EngineError::OperationRuntime { .. }))
        ));
        assert_eq!(report.unresolved(), vec!["after"]);
        assert_eq!(report.status("other"), Some(&OpStatus::Done));
        assert!(!wf.operation("boom").unwrap().is_running());
    }

    #[test]
    fn test_parallel_pass_matches_sequential() {
        let build = || {
            let mut wf = Workflow::new("wide");
            wf.add_operation("src", "Emit", Box::new(Emit::new(5))).unwrap();
            for name in ["d1", "d2", "d3"] {
                wf.add_operation(name, "Double", Box::new(Double)).unwrap();
                wf.set_input(name, "y", reference("src.outputs.x")).unwrap();
            }
            wf.add_operation("sink", "Double", Box::new(Double)).unwrap();
            wf.set_input("sink", "y", reference("d3.outputs.z")).unwrap();
            wf
        };

        let sequential = Engine::new();
        let mut parallel = Engine::new();
        parallel.set_max_parallel(4);

        let mut wf_seq = build();
        let mut wf_par = build();
        let seq = sequential.execute(&mut wf_seq);
        let par = parallel.execute(&mut wf_par);

        assert!(par.is_success(), "{}", par);
        assert_eq!(seq.statuses, par.statuses);
        for name in ["d1", "d2", "d3", "sink"] {
            assert_eq!(
                wf_seq.output_value(name, "z").unwrap(),
                wf_par.output_value(name, "z").unwrap()
            );
        }
        assert_eq!(wf_par.output_value("sink", "z").unwrap(), Some(&Value::Int(20)));
    }

    #[test]
    fn test_max_parallel_is_clamped() {
        let mut engine = Engine::new();
        engine.set_max_parallel(0);
        assert_eq!(engine.max_parallel(), 1);
        engine.set_max_parallel(usize::MAX);
        assert_eq!(engine.max_parallel(), num_cpus::get());
    }

    #[test]
    fn test_execute_handle_busy() {
        let engine = Engine::new();
        let handle = WorkflowHandle::new(doubling());

        let report = engine.execute_handle(&handle).unwrap();
        assert!(report.is_success());

        let guard = handle.lock();
        assert!(matches!(
            engine.execute_handle(&handle),
            Err(EngineError::WorkflowBusy(_))
        ));
        drop(guard);
    }

    #[test]
    fn test_workflow_registry() {
        let engine = Engine::new();
        engine.register_workflow(WorkflowHandle::new(Workflow::new("one")));
        engine.register_workflow(WorkflowHandle::new(Workflow::new("two")));

        let clone = engine.clone();
        assert_eq!(clone.workflow_names(), vec!["one", "two"]);
        assert!(clone.unregister_workflow("one").is_some());
        assert!(engine.workflow("one").is_none());
        assert!(engine.workflow("two").is_some());
    }

    #[test]
    fn test_nested_self_reference_fails() {
        let engine = Engine::new();
        let mut wf = Workflow::new("outer");
        wf.add_operation("p", "Pass", Box::new(Pass)).unwrap();
        wf.set_input("p", "input", Locator::workflow("outer")).unwrap();

        let report = engine.execute(&mut wf);
        assert!(matches!(
            report.status("p"),
            Some(OpStatus::Failed(EngineError::CyclicDependency { .. }))
        ));
    }

    #[test]
    fn test_nested_loop_across_workflows_is_cycle() {
        let engine = Engine::new();
        for (name, target) in [("outer", "inner"), ("inner", "outer")] {
            let mut wf = Workflow::new(name);
            wf.add_operation("run", "RunNested", Box::new(RunNested)).unwrap();
            wf.set_input("run", "workflow", Locator::workflow(target)).unwrap();
            engine.register_workflow(WorkflowHandle::new(wf));
        }

        let outer = engine.workflow("outer").unwrap();
        let report = engine.execute_handle(&outer).unwrap();

        let expected = vec!["outer".to_string(), "inner".to_string(), "outer".to_string()];
        match report.status("run") {
            Some(OpStatus::Failed(EngineError::CyclicDependency { path })) => {
                assert_eq!(path, &expected)
            }
            other => panic!("unexpected status: {:?}", other),
        }
        assert!(engine.workflow("inner").unwrap().try_lock().is_ok());
    }

    #[test]
    fn test_parallel_operations_share_nested_workflow() {
        let mut inner = Workflow::new("inner");
        inner.add_operation("nap", "Nap", Box::new(Nap::new(100))).unwrap();
        inner.set_input("nap", "input", Locator::literal(0i64)).unwrap();
        inner
            .connect_input("n", &Uri::parse("nap.inputs.input").unwrap())
            .unwrap();
        inner
            .connect_output("out", &Uri::parse("nap.outputs.out").unwrap())
            .unwrap();

        let mut engine = Engine::new();
        engine.register_workflow(WorkflowHandle::new(inner));
        // Bypass the CPU clamp so the pass really runs on worker threads.
        engine.max_parallel = 2;

        let mut wf = Workflow::new("outer");
        for (name, file) in [("b1", "first"), ("b2", "second")] {
            wf.add_operation(name, "BatchFromFiles", Box::new(BatchFromFiles))
                .unwrap();
            wf.set_input(name, "workflow", Locator::workflow("inner")).unwrap();
            wf.set_input(name, "input_name", Locator::literal("n")).unwrap();
            wf.set_input(name, "file_list", Locator::literal(vec![Value::from(file)]))
                .unwrap();
        }

        let report = engine.execute(&mut wf);

        assert!(report.is_success(), "{}", report);
        for (name, file) in [("b1", "first"), ("b2", "second")] {
            let outputs = wf.output_value(name, "batch_outputs").unwrap().unwrap();
            assert!(outputs.to_string().contains(file), "{}", outputs);
        }
    }

    #[test]
    fn test_disabled_operation_blocks_dependents() {
        let engine = Engine::new();
        let mut wf = doubling();
        wf.add_operation("c", "Emit", Box::new(Emit::new(7))).unwrap();
        wf.set_op_enabled("a", false).unwrap();

        let report = engine.execute(&mut wf);

        assert!(!report.is_success());
        assert_eq!(report.status("a"), Some(&OpStatus::Disabled));
        assert_eq!(
            report.status("b"),
            Some(&OpStatus::Unresolved {
                blocked_by: "a".into()
            })
        );
        assert_eq!(report.status("c"), Some(&OpStatus::Done));
        assert_eq!(report.disabled(), vec!["a"]);
        assert_eq!(report.summary(), "1 done, 0 failed, 1 unresolved, 1 disabled");
        assert_eq!(wf.output_value("a", "x").unwrap(), None);

        wf.set_op_enabled("a", true).unwrap();
        assert!(engine.execute(&mut wf).is_success());
        assert_eq!(wf.output_value("b", "z").unwrap(), Some(&Value::Int(20)));
    }

    #[test]
    fn test_disabled_leaf_still_succeeds() {
        let engine = Engine::new();
        let mut wf = doubling();
        wf.set_op_enabled("b", false).unwrap();

        let report = engine.execute(&mut wf);
        assert!(report.is_success(), "{}", report);
        assert_eq!(report.status("b"), Some(&OpStatus::Disabled));
    }
}
