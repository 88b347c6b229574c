//! Workflow Data Model
//!
//! A workflow is a namespace of operations. Every operation `tag` owns a
//! fixed slot layout:
//!
//! ```text
//! tag
//! ├── inputs
//! │   ├── <input name>    (InputSlot: locator + cached value)
//! │   └── ...
//! └── outputs
//!     ├── <output name>   (value produced in the current pass)
//!     └── ...
//! ```
//!
//! Workflow-level aliases map a public name to an input or output slot so
//! the workflow can be driven as a unit (batch runs, nested execution).

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};

use indexmap::IndexMap;
use log::{debug, info, warn};

use crate::error::{EngineError, Result};
use crate::namespace::{is_valid_segment, Namespace, Uri};

use super::locator::{DataType, InputSlot, Locator};
use super::operation::{Operation, Schema};
use super::value::Value;

/// Name of the group node holding input slots.
pub const INPUTS_GROUP: &str = "inputs";

/// Name of the group node holding output slots.
pub const OUTPUTS_GROUP: &str = "outputs";

/// An operation instance registered in a workflow.
pub struct OperationNode {
    type_name: String,
    schema: Schema,
    op: Option<Box<dyn Operation>>,
    enabled: bool,
}

impl OperationNode {
    /// Registered type identifier (e.g. `"Scale"`).
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// True while the operation's entry point is executing.
    pub fn is_running(&self) -> bool {
        self.op.is_none()
    }

    /// Disabled operations are skipped by every pass.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

impl fmt::Debug for OperationNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationNode")
            .field("type_name", &self.type_name)
            .field("schema", &self.schema)
            .field("running", &self.is_running())
            .field("enabled", &self.enabled)
            .finish()
    }
}

/// Payload of a workflow namespace node.
#[derive(Debug)]
pub enum OpNode {
    Operation(OperationNode),
    InputGroup,
    OutputGroup,
    Input(InputSlot),
    /// Output value; `None` until produced in the current pass
    Output(Option<Value>),
}

impl OpNode {
    pub fn kind(&self) -> &'static str {
        match self {
            OpNode::Operation(_) => "operation",
            OpNode::InputGroup => "input group",
            OpNode::OutputGroup => "output group",
            OpNode::Input(_) => "input slot",
            OpNode::Output(_) => "output slot",
        }
    }
}

fn op_uri(tag: &str) -> Result<Uri> {
    let uri = Uri::parse(tag)?;
    if uri.len() != 1 {
        return Err(EngineError::invalid_uri(
            tag,
            "operations are addressed by a single segment",
        ));
    }
    Ok(uri)
}

fn slot_uri(tag: &str, group: &str, name: &str) -> Result<Uri> {
    Uri::from_segments([tag, group, name])
}

/// A named collection of operations plus workflow-level aliases.
#[derive(Debug)]
pub struct Workflow {
    name: String,
    tree: Namespace<OpNode>,
    wf_inputs: IndexMap<String, Uri>,
    wf_outputs: IndexMap<String, Uri>,
}

impl Workflow {
    /// Creates an empty workflow.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tree: Namespace::new(),
            wf_inputs: IndexMap::new(),
            wf_outputs: IndexMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The underlying namespace.
    pub fn tree(&self) -> &Namespace<OpNode> {
        &self.tree
    }

    /// Number of operations.
    pub fn len(&self) -> usize {
        self.operation_names().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Operation tags in insertion order.
    pub fn operation_names(&self) -> Vec<String> {
        self.tree.children(&Uri::root()).unwrap_or_default()
    }

    /// Suggests an unused operation tag based on `prefix`.
    pub fn unique_operation_name(&self, prefix: &str) -> Result<String> {
        self.tree.unique_name(&Uri::root(), prefix)
    }

    /// Adds an operation under `tag` and creates its slot nodes.
    ///
    /// Each input slot starts with the default locator from the schema.
    pub fn add_operation(
        &mut self,
        tag: &str,
        type_name: &str,
        op: Box<dyn Operation>,
    ) -> Result<Uri> {
        let uri = op_uri(tag)?;
        if self.tree.exists(&uri) {
            return Err(EngineError::invalid_uri(
                tag,
                "an operation with this name already exists",
            ));
        }

        let schema = op.schema();
        schema.validate()?;

        let inputs_uri = uri.child(INPUTS_GROUP)?;
        let outputs_uri = uri.child(OUTPUTS_GROUP)?;

        self.tree.insert(
            &uri,
            OpNode::Operation(OperationNode {
                type_name: type_name.to_string(),
                schema: schema.clone(),
                op: Some(op),
                enabled: true,
            }),
        )?;
        self.tree.insert(&inputs_uri, OpNode::InputGroup)?;
        for spec in &schema.inputs {
            self.tree.insert(
                &inputs_uri.child(&spec.name)?,
                OpNode::Input(InputSlot::new(spec.default.clone())),
            )?;
        }
        self.tree.insert(&outputs_uri, OpNode::OutputGroup)?;
        for spec in &schema.outputs {
            self.tree
                .insert(&outputs_uri.child(&spec.name)?, OpNode::Output(None))?;
        }

        debug!(
            "Added operation '{}' ({}) to workflow '{}'",
            tag, type_name, self.name
        );
        Ok(uri)
    }

    /// Removes an operation and its slots.
    ///
    /// Aliases pointing into the removed subtree are dropped. Locators in
    /// other operations that reference it are left alone and fail on the
    /// next resolution.
    pub fn remove_operation(&mut self, tag: &str) -> Result<()> {
        let uri = op_uri(tag)?;
        let removed = self.tree.remove(&uri)?;

        let workflow = &self.name;
        for (kind, aliases) in [("input", &mut self.wf_inputs), ("output", &mut self.wf_outputs)] {
            aliases.retain(|alias, target| {
                let keep = !target.starts_with(&uri);
                if !keep {
                    warn!(
                        "Workflow '{}': {} alias '{}' dropped with operation '{}'",
                        workflow, kind, alias, tag
                    );
                }
                keep
            });
        }

        info!(
            "Removed operation '{}' from workflow '{}' ({} nodes)",
            tag,
            self.name,
            removed.len()
        );
        Ok(())
    }

    /// Returns a node by URI.
    pub fn node(&self, uri: &Uri) -> Result<&OpNode> {
        self.tree.lookup(uri)
    }

    pub fn operation(&self, tag: &str) -> Result<&OperationNode> {
        match self.tree.lookup(&op_uri(tag)?)? {
            OpNode::Operation(node) => Ok(node),
            other => Err(EngineError::invalid_uri(
                tag,
                format!("expected an operation, found {}", other.kind()),
            )),
        }
    }

    fn operation_mut(&mut self, tag: &str) -> Result<&mut OperationNode> {
        match self.tree.lookup_mut(&op_uri(tag)?)? {
            OpNode::Operation(node) => Ok(node),
            other => Err(EngineError::invalid_uri(
                tag,
                format!("expected an operation, found {}", other.kind()),
            )),
        }
    }

    /// Switches one operation on or off without removing it.
    ///
    /// A disabled operation is skipped by the next pass and everything
    /// downstream of it is reported unresolved.
    pub fn set_op_enabled(&mut self, tag: &str, enabled: bool) -> Result<()> {
        self.operation_mut(tag)?.enabled = enabled;
        info!(
            "Workflow '{}': operation '{}' {}",
            self.name,
            tag,
            if enabled { "enabled" } else { "disabled" }
        );
        Ok(())
    }

    pub fn is_op_enabled(&self, tag: &str) -> Result<bool> {
        Ok(self.operation(tag)?.enabled)
    }

    /// Sets the locator of one input slot. Clears its cached value.
    pub fn set_input(&mut self, tag: &str, input: &str, locator: Locator) -> Result<()> {
        let uri = slot_uri(tag, INPUTS_GROUP, input)?;
        match self.tree.lookup_mut(&uri)? {
            OpNode::Input(slot) => {
                debug!("Workflow '{}': {} <- {}", self.name, uri, locator);
                slot.set_locator(locator);
                Ok(())
            }
            other => Err(EngineError::invalid_uri(
                &uri,
                format!("expected an input slot, found {}", other.kind()),
            )),
        }
    }

    /// Returns the input slot at `uri`.
    pub fn input_slot(&self, uri: &Uri) -> Result<&InputSlot> {
        match self.tree.lookup(uri)? {
            OpNode::Input(slot) => Ok(slot),
            other => Err(EngineError::invalid_uri(
                uri,
                format!("expected an input slot, found {}", other.kind()),
            )),
        }
    }

    /// Locator of one input.
    pub fn input_locator(&self, tag: &str, input: &str) -> Result<&Locator> {
        Ok(self.input_slot(&slot_uri(tag, INPUTS_GROUP, input)?)?.locator())
    }

    /// Input names and slot URIs of an operation, in schema order.
    pub fn input_slots(&self, tag: &str) -> Result<Vec<(String, Uri)>> {
        let group = op_uri(tag)?.child(INPUTS_GROUP)?;
        let names = self.tree.children(&group)?;
        names
            .into_iter()
            .map(|name| -> Result<(String, Uri)> {
                let uri = group.child(&name)?;
                Ok((name, uri))
            })
            .collect()
    }

    /// Input names and locators of an operation, in schema order.
    pub fn input_locators(&self, tag: &str) -> Result<Vec<(String, &Locator)>> {
        self.input_slots(tag)?
            .into_iter()
            .map(|(name, uri)| -> Result<(String, &Locator)> {
                Ok((name, self.input_slot(&uri)?.locator()))
            })
            .collect()
    }

    /// Value produced for one output in the current pass.
    pub fn output_value(&self, tag: &str, output: &str) -> Result<Option<&Value>> {
        let uri = slot_uri(tag, OUTPUTS_GROUP, output)?;
        match self.tree.lookup(&uri)? {
            OpNode::Output(value) => Ok(value.as_ref()),
            other => Err(EngineError::invalid_uri(
                &uri,
                format!("expected an output slot, found {}", other.kind()),
            )),
        }
    }

    /// Tag of the operation owning `uri`, if it belongs to this workflow.
    pub fn owner_of(&self, uri: &Uri) -> Option<String> {
        let tag = uri.first()?;
        match self.tree.lookup(&Uri::from_segments([tag]).ok()?) {
            Ok(OpNode::Operation(_)) => Some(tag.to_string()),
            _ => None,
        }
    }

    /// Exposes an input slot as workflow input `alias`.
    ///
    /// The target must be an existing input slot at call time.
    pub fn connect_input(&mut self, alias: &str, uri: &Uri) -> Result<()> {
        self.connect(alias, uri, true)
    }

    /// Exposes an output slot as workflow output `alias`.
    pub fn connect_output(&mut self, alias: &str, uri: &Uri) -> Result<()> {
        self.connect(alias, uri, false)
    }

    fn connect(&mut self, alias: &str, uri: &Uri, input: bool) -> Result<()> {
        if !is_valid_segment(alias) {
            return Err(EngineError::invalid_uri(alias, "alias is not a valid name"));
        }

        let node = self.tree.lookup(uri)?;
        let matches = match node {
            OpNode::Input(_) => input,
            OpNode::Output(_) => !input,
            _ => false,
        };
        if !matches {
            let expected = if input { "input slot" } else { "output slot" };
            return Err(EngineError::invalid_uri(
                uri,
                format!("expected an {}, found {}", expected, node.kind()),
            ));
        }

        let aliases = if input {
            &mut self.wf_inputs
        } else {
            &mut self.wf_outputs
        };
        aliases.insert(alias.to_string(), uri.clone());
        debug!("Workflow '{}': alias '{}' -> {}", self.name, alias, uri);
        Ok(())
    }

    /// Removes a workflow input alias, returning its target.
    pub fn break_input(&mut self, alias: &str) -> Option<Uri> {
        self.wf_inputs.shift_remove(alias)
    }

    /// Removes a workflow output alias, returning its target.
    pub fn break_output(&mut self, alias: &str) -> Option<Uri> {
        self.wf_outputs.shift_remove(alias)
    }

    pub fn wf_inputs(&self) -> &IndexMap<String, Uri> {
        &self.wf_inputs
    }

    pub fn wf_outputs(&self) -> &IndexMap<String, Uri> {
        &self.wf_outputs
    }

    /// Assigns `value` to the input behind workflow input `alias`.
    ///
    /// A filesystem locator keeps its source when given text; a literal
    /// keeps its declared type. Anything else becomes an auto literal.
    pub fn set_wf_input(&mut self, alias: &str, value: Value) -> Result<()> {
        let uri = self
            .wf_inputs
            .get(alias)
            .cloned()
            .ok_or_else(|| EngineError::invalid_uri(alias, "unknown workflow input alias"))?;

        match self.tree.lookup_mut(&uri)? {
            OpNode::Input(slot) => {
                let locator = match (slot.locator(), value) {
                    (Locator::Filesystem { .. }, Value::Str(path)) => Locator::Filesystem { path },
                    (Locator::Literal { data_type, .. }, value) => Locator::Literal {
                        data_type: *data_type,
                        value,
                    },
                    (_, value) => Locator::Literal {
                        data_type: DataType::Auto,
                        value,
                    },
                };
                slot.set_locator(locator);
                Ok(())
            }
            other => Err(EngineError::invalid_uri(
                &uri,
                format!("expected an input slot, found {}", other.kind()),
            )),
        }
    }

    /// Snapshot of the workflow outputs; absent values read as `none`.
    pub fn wf_output_values(&self) -> IndexMap<String, Value> {
        self.wf_outputs
            .iter()
            .map(|(alias, uri)| {
                let value = match self.tree.lookup(uri) {
                    Ok(OpNode::Output(Some(value))) => value.clone(),
                    _ => Value::None,
                };
                (alias.clone(), value)
            })
            .collect()
    }

    /// Human-readable summary of one operation and its slots.
    pub fn description(&self, tag: &str) -> Result<String> {
        let node = self.operation(tag)?;
        let schema = node.schema();

        let mut text = format!("{} ({})\n", tag, node.type_name());
        if !schema.description.is_empty() {
            text.push_str(&format!("  {}\n", schema.description));
        }
        text.push_str("  inputs:\n");
        for spec in &schema.inputs {
            let locator = self.input_locator(tag, &spec.name)?;
            let marker = if spec.required { " (required)" } else { "" };
            text.push_str(&format!("    {}{}: {}\n", spec.name, marker, locator));
            if !spec.doc.is_empty() {
                text.push_str(&format!("      {}\n", spec.doc));
            }
        }
        text.push_str("  outputs:\n");
        for spec in &schema.outputs {
            text.push_str(&format!("    {}: {}\n", spec.name, spec.doc));
        }
        Ok(text)
    }

    /// Resets every output to absent and every input cache to unresolved.
    pub(crate) fn clear_pass_state(&mut self) {
        for node in self.tree.payloads_mut() {
            match node {
                OpNode::Output(value) => *value = None,
                OpNode::Input(slot) => slot.clear_cache(),
                _ => {}
            }
        }
    }

    /// Stores freshly resolved input values.
    pub(crate) fn cache_inputs(&mut self, resolved: Vec<(Uri, Value)>) {
        for (uri, value) in resolved {
            if let Ok(OpNode::Input(slot)) = self.tree.lookup_mut(&uri) {
                slot.cache(value);
            }
        }
    }

    /// Moves the operation object out for execution.
    pub(crate) fn take_op(&mut self, tag: &str) -> Result<Box<dyn Operation>> {
        self.operation_mut(tag)?.op.take().ok_or_else(|| {
            EngineError::OperationRuntime {
                operation: tag.to_string(),
                message: "operation is already running".to_string(),
            }
        })
    }

    /// Returns the operation object after execution.
    pub(crate) fn restore_op(&mut self, tag: &str, op: Box<dyn Operation>) -> Result<()> {
        self.operation_mut(tag)?.op = Some(op);
        Ok(())
    }

    /// Writes produced outputs back into their slot nodes.
    pub(crate) fn publish_outputs(
        &mut self,
        tag: &str,
        outputs: IndexMap<String, Option<Value>>,
    ) -> Result<()> {
        for (name, value) in outputs {
            let uri = slot_uri(tag, OUTPUTS_GROUP, &name)?;
            self.tree.replace(&uri, OpNode::Output(value))?;
        }
        Ok(())
    }
}

/// Shared, lockable workflow.
///
/// This is the value an `EntireWorkflow` input resolves to. Locking is
/// non-blocking in the engine so a workflow cannot be re-entered by its
/// own pass.
#[derive(Clone)]
pub struct WorkflowHandle {
    name: String,
    inner: Arc<Mutex<Workflow>>,
}

impl WorkflowHandle {
    pub fn new(workflow: Workflow) -> Self {
        Self {
            name: workflow.name().to_string(),
            inner: Arc::new(Mutex::new(workflow)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Blocks until the workflow is available.
    pub fn lock(&self) -> MutexGuard<'_, Workflow> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Locks without waiting; fails with `WorkflowBusy` if held.
    pub fn try_lock(&self) -> Result<MutexGuard<'_, Workflow>> {
        match self.inner.try_lock() {
            Ok(guard) => Ok(guard),
            Err(TryLockError::Poisoned(poisoned)) => Ok(poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => Err(EngineError::WorkflowBusy(self.name.clone())),
        }
    }

    /// True if both handles share the same workflow.
    pub fn ptr_eq(&self, other: &WorkflowHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl PartialEq for WorkflowHandle {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for WorkflowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("WorkflowHandle").field(&self.name).finish()
    }
}
