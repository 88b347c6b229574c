//! Input Resolution
//!
//! Turns the locators of an operation's inputs into values at the moment
//! the operation is about to run. References to other input slots are
//! followed recursively; a chain that returns to a slot it is still
//! resolving is reported as a cycle.

use indexmap::IndexMap;
use log::debug;

use crate::error::{EngineError, Result};
use crate::namespace::Uri;
use crate::workflow::{coerce, Locator, OpNode, Value, Workflow};

use super::engine::Engine;

/// Resolves input locators against one workflow for one pass.
pub struct Resolver<'a> {
    engine: &'a Engine,
    workflow: &'a Workflow,
    resolved: Vec<(Uri, Value)>,
}

impl<'a> Resolver<'a> {
    pub fn new(engine: &'a Engine, workflow: &'a Workflow) -> Self {
        Self {
            engine,
            workflow,
            resolved: Vec::new(),
        }
    }

    /// Resolves every input of operation `tag`, keyed by input name.
    ///
    /// Slots resolved along the way (including other operations' inputs
    /// reached through references) are collected for caching.
    pub fn resolve_operation(&mut self, tag: &str) -> Result<IndexMap<String, Value>> {
        let mut values = IndexMap::new();
        for (name, uri) in self.workflow.input_slots(tag)? {
            let mut visiting = Vec::new();
            let value = self
                .resolve_input(&uri, &mut visiting)
                .map_err(|err| annotate(tag, &name, err))?;
            values.insert(name, value);
        }
        Ok(values)
    }

    /// Resolves the input slot at `uri`.
    pub fn resolve_input(&mut self, uri: &Uri, visiting: &mut Vec<Uri>) -> Result<Value> {
        let workflow = self.workflow;

        if visiting.contains(uri) {
            let mut path: Vec<String> = visiting.iter().map(ToString::to_string).collect();
            path.push(uri.to_string());
            return Err(EngineError::CyclicDependency { path });
        }

        let slot = workflow.input_slot(uri)?;
        if let Some(value) = slot.cached() {
            return Ok(value.clone());
        }
        if let Some((_, value)) = self.resolved.iter().find(|(done, _)| done == uri) {
            return Ok(value.clone());
        }

        visiting.push(uri.clone());
        let result = self.resolve_locator(slot.locator(), visiting);
        visiting.pop();

        let value = result?;
        debug!("Resolved {} = {}", uri, value);
        self.resolved.push((uri.clone(), value.clone()));
        Ok(value)
    }

    fn resolve_locator(&mut self, locator: &Locator, visiting: &mut Vec<Uri>) -> Result<Value> {
        match locator {
            Locator::None => Ok(Value::None),
            Locator::Literal { data_type, value } => coerce(value.clone(), *data_type),
            Locator::Filesystem { path } => Ok(Value::Str(path.clone())),
            Locator::Workflow { uri, data_type } => {
                let value = self.resolve_reference(uri, visiting)?;
                coerce(value, *data_type)
            }
            Locator::Plugin { uri } => self.engine.read_plugin(uri),
            Locator::EntireWorkflow { name } => {
                if name == self.workflow.name() {
                    return Err(EngineError::CyclicDependency {
                        path: vec![name.clone(), name.clone()],
                    });
                }
                self.engine
                    .workflow(name)
                    .map(Value::Workflow)
                    .ok_or_else(|| EngineError::invalid_uri(name, "no workflow with this name"))
            }
            Locator::Batch { data_type, values } => values
                .iter()
                .map(|value| coerce(value.clone(), *data_type))
                .collect::<Result<Vec<_>>>()
                .map(Value::List),
        }
    }

    fn resolve_reference(&mut self, uri: &Uri, visiting: &mut Vec<Uri>) -> Result<Value> {
        let workflow = self.workflow;

        match workflow.node(uri)? {
            OpNode::Output(Some(value)) => Ok(value.clone()),
            OpNode::Output(None) => Err(EngineError::UnresolvedInput {
                operation: workflow.owner_of(uri).unwrap_or_default(),
                input: uri.to_string(),
                reason: "output has not been produced in this pass".to_string(),
            }),
            OpNode::Input(_) => self.resolve_input(uri, visiting),
            OpNode::OutputGroup => {
                let mut map = IndexMap::new();
                for name in workflow.tree().children(uri)? {
                    let value = match workflow.node(&uri.child(&name)?)? {
                        OpNode::Output(Some(value)) => value.clone(),
                        _ => Value::None,
                    };
                    map.insert(name, value);
                }
                Ok(Value::Map(map))
            }
            other => Err(EngineError::invalid_uri(
                uri,
                format!("cannot read a value from {}", other.kind()),
            )),
        }
    }

    /// Values resolved so far, for caching in the workflow.
    pub fn into_resolved(self) -> Vec<(Uri, Value)> {
        self.resolved
    }
}

fn annotate(tag: &str, input: &str, err: EngineError) -> EngineError {
    match err {
        EngineError::UnresolvedInput { reason, .. } => EngineError::UnresolvedInput {
            operation: tag.to_string(),
            input: input.to_string(),
            reason,
        },
        other => other,
    }
}
