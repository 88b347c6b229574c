//! Plugin Instances
//!
//! Plugins are long-lived objects with the same slot layout as operations
//! (`tag.inputs.*`, `tag.outputs.*`) but their own lifecycle: they are
//! started and stopped explicitly and are never re-created by a pass.
//! Operations read plugin outputs through `PluginReference` locators.

use std::fmt;
use std::sync::{Arc, RwLock};

use indexmap::IndexMap;
use log::{debug, info, warn};

use crate::error::{EngineError, OpError, Result};
use crate::namespace::{Namespace, Uri};
use crate::workflow::{Locator, Schema, Value, INPUTS_GROUP, OUTPUTS_GROUP};

/// A long-lived, URI-addressable object.
pub trait Plugin: Send + Sync {
    fn schema(&self) -> Schema;

    /// Starts the plugin with its current input values.
    fn start(&mut self, inputs: &IndexMap<String, Value>) -> std::result::Result<(), OpError>;

    fn stop(&mut self);

    /// Current value of a declared output, if any.
    fn output(&self, name: &str) -> Option<Value>;
}

/// Constructor for a registered plugin type.
pub type PluginFactory = fn() -> Box<dyn Plugin>;

/// Shared plugin manager, held by every engine clone.
pub type PluginHandle = Arc<RwLock<PluginManager>>;

/// A plugin object plus its run state.
pub struct PluginInstance {
    type_name: String,
    plugin: Box<dyn Plugin>,
    running: bool,
}

impl PluginInstance {
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn is_running(&self) -> bool {
        self.running
    }
}

impl fmt::Debug for PluginInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginInstance")
            .field("type_name", &self.type_name)
            .field("running", &self.running)
            .finish()
    }
}

/// Payload of a plugin namespace node.
#[derive(Debug)]
pub enum PluginNode {
    Plugin(PluginInstance),
    InputGroup,
    OutputGroup,
    Input(Value),
    Output,
}

/// Registered plugin types and live plugin instances.
#[derive(Default)]
pub struct PluginManager {
    catalog: IndexMap<String, PluginFactory>,
    tree: Namespace<PluginNode>,
}

fn plugin_error(tag: &str, message: impl Into<String>) -> EngineError {
    EngineError::Plugin {
        name: tag.to_string(),
        message: message.into(),
    }
}

fn tag_uri(tag: &str) -> Result<Uri> {
    let uri = Uri::parse(tag)?;
    if uri.len() != 1 {
        return Err(EngineError::invalid_uri(
            tag,
            "plugins are addressed by a single segment",
        ));
    }
    Ok(uri)
}

impl PluginManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps the manager for sharing between engines.
    pub fn into_handle(self) -> PluginHandle {
        Arc::new(RwLock::new(self))
    }

    pub fn register(&mut self, type_name: impl Into<String>, factory: PluginFactory) {
        self.catalog.insert(type_name.into(), factory);
    }

    pub fn is_registered(&self, type_name: &str) -> bool {
        self.catalog.contains_key(type_name)
    }

    pub fn plugin_types(&self) -> Vec<&str> {
        self.catalog.keys().map(String::as_str).collect()
    }

    /// Plugin instance tags in creation order.
    pub fn plugin_names(&self) -> Vec<String> {
        self.tree.children(&Uri::root()).unwrap_or_default()
    }

    /// Creates a stopped instance of `type_name` under `tag`.
    ///
    /// Inputs start from the literal defaults of the plugin schema.
    pub fn add_plugin(&mut self, tag: &str, type_name: &str) -> Result<Uri> {
        let factory = self
            .catalog
            .get(type_name)
            .copied()
            .ok_or_else(|| EngineError::UnknownType(type_name.to_string()))?;

        let uri = tag_uri(tag)?;
        if self.tree.exists(&uri) {
            return Err(EngineError::invalid_uri(tag, "a plugin with this name already exists"));
        }

        let plugin = factory();
        let schema = plugin.schema();
        schema.validate()?;

        let inputs_uri = uri.child(INPUTS_GROUP)?;
        let outputs_uri = uri.child(OUTPUTS_GROUP)?;
        self.tree.insert(
            &uri,
            PluginNode::Plugin(PluginInstance {
                type_name: type_name.to_string(),
                plugin,
                running: false,
            }),
        )?;
        self.tree.insert(&inputs_uri, PluginNode::InputGroup)?;
        for spec in &schema.inputs {
            let default = match &spec.default {
                Locator::Literal { value, .. } => value.clone(),
                _ => Value::None,
            };
            self.tree
                .insert(&inputs_uri.child(&spec.name)?, PluginNode::Input(default))?;
        }
        self.tree.insert(&outputs_uri, PluginNode::OutputGroup)?;
        for spec in &schema.outputs {
            self.tree
                .insert(&outputs_uri.child(&spec.name)?, PluginNode::Output)?;
        }

        info!("Added plugin '{}' ({})", tag, type_name);
        Ok(uri)
    }

    /// Stops (if needed) and removes a plugin instance.
    pub fn remove_plugin(&mut self, tag: &str) -> Result<()> {
        if self.is_running(tag)? {
            self.stop(tag)?;
        }
        self.tree.remove(&tag_uri(tag)?)?;
        info!("Removed plugin '{}'", tag);
        Ok(())
    }

    fn instance(&self, tag: &str) -> Result<&PluginInstance> {
        match self.tree.lookup(&tag_uri(tag)?)? {
            PluginNode::Plugin(instance) => Ok(instance),
            _ => Err(EngineError::invalid_uri(tag, "not a plugin")),
        }
    }

    fn instance_mut(&mut self, tag: &str) -> Result<&mut PluginInstance> {
        match self.tree.lookup_mut(&tag_uri(tag)?)? {
            PluginNode::Plugin(instance) => Ok(instance),
            _ => Err(EngineError::invalid_uri(tag, "not a plugin")),
        }
    }

    pub fn plugin_type(&self, tag: &str) -> Result<&str> {
        Ok(self.instance(tag)?.type_name())
    }

    pub fn is_running(&self, tag: &str) -> Result<bool> {
        Ok(self.instance(tag)?.is_running())
    }

    /// Sets one input value. Takes effect at the next `start`.
    pub fn set_input(&mut self, tag: &str, input: &str, value: Value) -> Result<()> {
        let uri = Uri::from_segments([tag, INPUTS_GROUP, input])?;
        match self.tree.lookup_mut(&uri)? {
            PluginNode::Input(slot) => {
                debug!("Plugin input {} <- {}", uri, value);
                *slot = value;
                Ok(())
            }
            _ => Err(EngineError::invalid_uri(&uri, "not a plugin input")),
        }
    }

    /// Current input values, in schema order.
    pub fn inputs(&self, tag: &str) -> Result<IndexMap<String, Value>> {
        let group = tag_uri(tag)?.child(INPUTS_GROUP)?;
        let mut values = IndexMap::new();
        for name in self.tree.children(&group)? {
            if let PluginNode::Input(value) = self.tree.lookup(&group.child(&name)?)? {
                values.insert(name, value.clone());
            }
        }
        Ok(values)
    }

    pub fn start(&mut self, tag: &str) -> Result<()> {
        let inputs = self.inputs(tag)?;
        let instance = self.instance_mut(tag)?;
        if instance.running {
            warn!("Plugin '{}' is already running", tag);
            return Ok(());
        }
        instance
            .plugin
            .start(&inputs)
            .map_err(|err| plugin_error(tag, err.to_string()))?;
        instance.running = true;
        info!("Started plugin '{}'", tag);
        Ok(())
    }

    pub fn stop(&mut self, tag: &str) -> Result<()> {
        let instance = self.instance_mut(tag)?;
        if instance.running {
            instance.plugin.stop();
            instance.running = false;
            info!("Stopped plugin '{}'", tag);
        }
        Ok(())
    }

    /// Reads the output slot at `uri` (`tag.outputs.name`).
    ///
    /// Fails if the node is not a plugin output or the plugin is stopped.
    /// An output the plugin has not produced yet reads as `none`.
    pub fn read(&self, uri: &Uri) -> Result<Value> {
        match self.tree.lookup(uri)? {
            PluginNode::Output => {}
            _ => return Err(EngineError::invalid_uri(uri, "not a plugin output")),
        }

        let tag = uri.first().unwrap_or_default();
        let instance = self.instance(tag)?;
        if !instance.running {
            return Err(plugin_error(tag, "plugin is not running"));
        }

        let name = uri.last().unwrap_or_default();
        Ok(instance.plugin.output(name).unwrap_or(Value::None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Echoes its `value` input while running.
    struct Echo {
        value: Option<Value>,
    }

    impl Plugin for Echo {
        fn schema(&self) -> Schema {
            Schema::new()
                .input_with_default("value", "value to hold", Locator::literal(1))
                .output("value", "held value")
        }

        fn start(&mut self, inputs: &IndexMap<String, Value>) -> std::result::Result<(), OpError> {
            self.value = inputs.get("value").cloned();
            Ok(())
        }

        fn stop(&mut self) {
            self.value = None;
        }

        fn output(&self, _name: &str) -> Option<Value> {
            self.value.clone()
        }
    }

    fn echo() -> Box<dyn Plugin> {
        Box::new(Echo { value: None })
    }

    fn manager() -> PluginManager {
        let mut manager = PluginManager::new();
        manager.register("Echo", echo);
        manager.add_plugin("src", "Echo").unwrap();
        manager
    }

    fn out() -> Uri {
        Uri::parse("src.outputs.value").unwrap()
    }

    #[test]
    fn test_add_plugin_uses_defaults() {
        let manager = manager();
        assert_eq!(manager.plugin_names(), vec!["src"]);
        assert_eq!(manager.inputs("src").unwrap()["value"], Value::Int(1));
        assert_eq!(manager.plugin_type("src").unwrap(), "Echo");
    }

    #[test]
    fn test_unknown_type_and_duplicate() {
        let mut manager = manager();
        assert!(matches!(
            manager.add_plugin("other", "Nope"),
            Err(EngineError::UnknownType(_))
        ));
        assert!(manager.add_plugin("src", "Echo").is_err());
    }

    #[test]
    fn test_read_requires_running() {
        let mut manager = manager();
        assert!(matches!(manager.read(&out()), Err(EngineError::Plugin { .. })));

        manager.set_input("src", "value", Value::from("hello")).unwrap();
        manager.start("src").unwrap();
        assert_eq!(manager.read(&out()).unwrap(), Value::from("hello"));

        manager.stop("src").unwrap();
        assert!(!manager.is_running("src").unwrap());
        assert!(manager.read(&out()).is_err());
    }

    #[test]
    fn test_read_rejects_non_output() {
        let mut manager = manager();
        manager.start("src").unwrap();
        let input = Uri::parse("src.inputs.value").unwrap();
        assert!(matches!(manager.read(&input), Err(EngineError::InvalidUri { .. })));
    }

    #[test]
    fn test_remove_running_plugin() {
        let mut manager = manager();
        manager.start("src").unwrap();
        manager.remove_plugin("src").unwrap();
        assert!(manager.plugin_names().is_empty());
        assert!(manager.read(&out()).is_err());
    }
}
