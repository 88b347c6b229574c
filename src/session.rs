//! Session Facade
//!
//! The entry point for consumers (the CLI, or any front end): owns an
//! engine and an operation registry, names workflows, and saves or loads
//! the whole state to a workflow-state file.
//!
//! # Example
//!
//! ```
//! use opflow::Session;
//! use opflow::workflow::{DataType, Locator};
//!
//! let mut session = Session::with_builtins();
//! session.add_workflow("main").unwrap();
//! session.add_operation("main", "c", "Constant").unwrap();
//! session.add_operation("main", "s", "Scale").unwrap();
//! session.set_input("main", "c", "value", Locator::typed(DataType::Integer, "4")).unwrap();
//! session.set_input("main", "s", "x", Locator::reference("c.outputs.value").unwrap()).unwrap();
//!
//! let report = session.execute("main").unwrap();
//! assert!(report.is_success());
//! ```

use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLockReadGuard, RwLockWriteGuard};

use log::{info, warn};

use crate::environment::{OperationRegistry, PluginManager};
use crate::error::{EngineError, Result};
use crate::execution::{BatchReport, BatchSource, Engine, PassReport};
use crate::namespace::{is_valid_segment, Uri};
use crate::operations::{builtin_plugins, builtin_registry};
use crate::workflow::{
    load_state_file, save_state_file, FormatVersion, Locator, PluginSpec, StateFile, Value,
    Workflow, WorkflowHandle, WorkflowSpec,
};

/// Outcome of [`Session::load`].
#[derive(Debug, Clone, PartialEq)]
pub struct LoadReport {
    /// Format version declared by the file
    pub version: FormatVersion,
    pub workflows: usize,
    pub operations: usize,
    pub plugins: usize,
    /// Non-fatal problems: compatibility notes and skipped entries
    pub warnings: Vec<String>,
}

impl LoadReport {
    fn note(&mut self, message: String) {
        warn!("{}", message);
        self.warnings.push(message);
    }
}

/// Workflows, operation types and plugins of one user session.
pub struct Session {
    engine: Engine,
    registry: OperationRegistry,
}

impl Session {
    /// Creates a session over an explicit registry and plugin manager.
    pub fn new(registry: OperationRegistry, plugins: PluginManager) -> Self {
        Self {
            engine: Engine::with_plugins(plugins.into_handle()),
            registry,
        }
    }

    /// A session with the built-in operations and plugins.
    pub fn with_builtins() -> Self {
        let mut plugins = PluginManager::new();
        builtin_plugins(&mut plugins);
        Self::new(builtin_registry(), plugins)
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut Engine {
        &mut self.engine
    }

    pub fn registry(&self) -> &OperationRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut OperationRegistry {
        &mut self.registry
    }

    fn plugins(&self) -> RwLockReadGuard<'_, PluginManager> {
        self.engine
            .plugins()
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn plugins_mut(&self) -> RwLockWriteGuard<'_, PluginManager> {
        self.engine
            .plugins()
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Creates an empty workflow.
    pub fn add_workflow(&mut self, name: &str) -> Result<WorkflowHandle> {
        if !is_valid_segment(name) {
            return Err(EngineError::invalid_uri(name, "workflow name is not a valid segment"));
        }
        if self.engine.workflow(name).is_some() {
            return Err(EngineError::invalid_uri(name, "a workflow with this name already exists"));
        }

        let handle = WorkflowHandle::new(Workflow::new(name));
        self.engine.register_workflow(handle.clone());
        info!("Added workflow '{}'", name);
        Ok(handle)
    }

    pub fn remove_workflow(&mut self, name: &str) -> Result<()> {
        self.engine
            .unregister_workflow(name)
            .map(|_| info!("Removed workflow '{}'", name))
            .ok_or_else(|| EngineError::invalid_uri(name, "no workflow with this name"))
    }

    pub fn workflow(&self, name: &str) -> Result<WorkflowHandle> {
        self.engine
            .workflow(name)
            .ok_or_else(|| EngineError::invalid_uri(name, "no workflow with this name"))
    }

    pub fn workflow_names(&self) -> Vec<String> {
        self.engine.workflow_names()
    }

    /// Adds a new operation of a registered, enabled type.
    pub fn add_operation(&mut self, workflow: &str, tag: &str, type_name: &str) -> Result<Uri> {
        let op = self.registry.create(type_name)?;
        let handle = self.workflow(workflow)?;
        let mut wf = handle.try_lock()?;
        wf.add_operation(tag, type_name, op)
    }

    pub fn remove_operation(&mut self, workflow: &str, tag: &str) -> Result<()> {
        let handle = self.workflow(workflow)?;
        let mut wf = handle.try_lock()?;
        wf.remove_operation(tag)
    }

    /// Switches one operation of a workflow back on.
    pub fn enable_op(&mut self, workflow: &str, tag: &str) -> Result<()> {
        self.set_op_enabled(workflow, tag, true)
    }

    /// Switches one operation of a workflow off; passes skip it and
    /// report its dependents unresolved.
    pub fn disable_op(&mut self, workflow: &str, tag: &str) -> Result<()> {
        self.set_op_enabled(workflow, tag, false)
    }

    fn set_op_enabled(&mut self, workflow: &str, tag: &str, enabled: bool) -> Result<()> {
        let handle = self.workflow(workflow)?;
        let mut wf = handle.try_lock()?;
        wf.set_op_enabled(tag, enabled)
    }

    pub fn set_input(
        &mut self,
        workflow: &str,
        tag: &str,
        input: &str,
        locator: Locator,
    ) -> Result<()> {
        let handle = self.workflow(workflow)?;
        let mut wf = handle.try_lock()?;
        wf.set_input(tag, input, locator)
    }

    /// Exposes `uri` (an input slot, e.g. `"scale.inputs.x"`) as `alias`.
    pub fn connect_workflow_input(&mut self, workflow: &str, alias: &str, uri: &str) -> Result<()> {
        let uri = Uri::parse(uri)?;
        let handle = self.workflow(workflow)?;
        let mut wf = handle.try_lock()?;
        wf.connect_input(alias, &uri)
    }

    /// Exposes `uri` (an output slot) as `alias`.
    pub fn connect_workflow_output(&mut self, workflow: &str, alias: &str, uri: &str) -> Result<()> {
        let uri = Uri::parse(uri)?;
        let handle = self.workflow(workflow)?;
        let mut wf = handle.try_lock()?;
        wf.connect_output(alias, &uri)
    }

    pub fn execute(&self, workflow: &str) -> Result<PassReport> {
        self.engine.execute_handle(&self.workflow(workflow)?)
    }

    pub fn run_batch(&self, workflow: &str, alias: &str, values: Vec<Value>) -> Result<BatchReport> {
        self.run_batch_from(workflow, alias, &BatchSource::Values(values))
    }

    pub fn run_batch_from(
        &self,
        workflow: &str,
        alias: &str,
        source: &BatchSource,
    ) -> Result<BatchReport> {
        self.engine
            .run_batch_handle(&self.workflow(workflow)?, alias, source)
    }

    pub fn add_plugin(&mut self, tag: &str, type_name: &str) -> Result<Uri> {
        self.plugins_mut().add_plugin(tag, type_name)
    }

    pub fn set_plugin_input(&mut self, tag: &str, input: &str, value: Value) -> Result<()> {
        self.plugins_mut().set_input(tag, input, value)
    }

    pub fn start_plugin(&mut self, tag: &str) -> Result<()> {
        self.plugins_mut().start(tag)
    }

    pub fn stop_plugin(&mut self, tag: &str) -> Result<()> {
        self.plugins_mut().stop(tag)
    }

    pub fn remove_plugin(&mut self, tag: &str) -> Result<()> {
        self.plugins_mut().remove_plugin(tag)
    }

    /// Captures flags, workflows and plugins as a state document.
    pub fn snapshot(&self) -> Result<StateFile> {
        let mut state = StateFile::new();
        state.operation_enable_flags = self.registry.enable_flags();

        for name in self.workflow_names() {
            let handle = self.workflow(&name)?;
            let wf = handle.try_lock()?;
            state.workflows.insert(name, WorkflowSpec::from_workflow(&wf));
        }

        let plugins = self.plugins();
        for tag in plugins.plugin_names() {
            let spec = PluginSpec {
                type_name: plugins.plugin_type(&tag)?.to_string(),
                inputs: plugins.inputs(&tag)?,
            };
            state.plugins.insert(tag, spec);
        }
        Ok(state)
    }

    /// Saves the session, appending `.wfl` if needed.
    pub fn save(&self, path: &Path) -> Result<PathBuf> {
        save_state_file(&self.snapshot()?, path)
    }

    /// Loads a state file into this session.
    ///
    /// Enable flags are applied first, then plugins, then workflows.
    /// Entries that cannot be rebuilt are skipped and listed in the
    /// report's warnings; a workflow with an existing name replaces it.
    pub fn load(&mut self, path: &Path) -> Result<LoadReport> {
        let state = load_state_file(path)?;

        let mut report = LoadReport {
            version: FormatVersion::EARLIEST,
            workflows: 0,
            operations: 0,
            plugins: 0,
            warnings: Vec::new(),
        };

        match state.version() {
            Ok(version) => report.version = version,
            Err(err) => report.note(format!("{}; assuming {}", err, FormatVersion::EARLIEST)),
        }
        if let Some(message) = report.version.compatibility_warning() {
            report.note(message);
        }

        self.registry.apply_flags(&state.operation_enable_flags);

        self.load_plugins(&state, &mut report);

        for (name, spec) in &state.workflows {
            if !is_valid_segment(name) {
                report.note(format!("Skipping workflow '{}': invalid name", name));
                continue;
            }
            if self.engine.unregister_workflow(name).is_some() {
                report.note(format!("Workflow '{}' replaced by loaded definition", name));
            }

            let workflow = self.build_workflow(name, spec, &mut report);
            self.engine.register_workflow(WorkflowHandle::new(workflow));
            report.workflows += 1;
        }

        info!(
            "Loaded {} workflows, {} operations, {} plugins from {} ({} warnings)",
            report.workflows,
            report.operations,
            report.plugins,
            path.display(),
            report.warnings.len()
        );
        Ok(report)
    }

    fn load_plugins(&mut self, state: &StateFile, report: &mut LoadReport) {
        let mut plugins = self.plugins_mut();
        for (tag, spec) in &state.plugins {
            if plugins.plugin_names().contains(tag) {
                if let Err(err) = plugins.remove_plugin(tag) {
                    report.note(format!("Skipping plugin '{}': {}", tag, err));
                    continue;
                }
            }
            if let Err(err) = plugins.add_plugin(tag, &spec.type_name) {
                report.note(format!("Skipping plugin '{}': {}", tag, err));
                continue;
            }
            for (input, value) in &spec.inputs {
                if let Err(err) = plugins.set_input(tag, input, value.clone()) {
                    report.note(format!("Plugin '{}' input '{}' ignored: {}", tag, input, err));
                }
            }
            report.plugins += 1;
        }
    }

    fn build_workflow(&self, name: &str, spec: &WorkflowSpec, report: &mut LoadReport) -> Workflow {
        let mut workflow = Workflow::new(name);

        for (tag, op_spec) in &spec.operations {
            let added = self
                .registry
                .create(&op_spec.type_name)
                .and_then(|op| workflow.add_operation(tag, &op_spec.type_name, op));
            if let Err(err) = added {
                report.note(format!("Skipping operation '{}.{}': {}", name, tag, err));
                continue;
            }
            if !op_spec.enabled {
                if let Err(err) = workflow.set_op_enabled(tag, false) {
                    report.note(format!("Operation '{}.{}' left enabled: {}", name, tag, err));
                }
            }

            for (input, locator) in &op_spec.inputs {
                if let Err(err) = workflow.set_input(tag, input, locator.clone()) {
                    report.note(format!(
                        "Operation '{}.{}' input '{}' ignored: {}",
                        name, tag, input, err
                    ));
                }
            }
            report.operations += 1;
        }

        for (inputs, aliases) in [(true, &spec.inputs), (false, &spec.outputs)] {
            for (alias, target) in aliases {
                let connected = Uri::parse(target).and_then(|uri| {
                    if inputs {
                        workflow.connect_input(alias, &uri)
                    } else {
                        workflow.connect_output(alias, &uri)
                    }
                });
                if let Err(err) = connected {
                    report.note(format!("Workflow '{}' alias '{}' dropped: {}", name, alias, err));
                }
            }
        }

        workflow
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::with_builtins()
    }
}
