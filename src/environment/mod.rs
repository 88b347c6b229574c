//! Environment Module
//!
//! Process-scoped state that surrounds workflow execution: which
//! operation types exist and are enabled, and the long-lived plugin
//! instances operations can read from.

pub mod plugins;
pub mod registry;

pub use plugins::{Plugin, PluginFactory, PluginHandle, PluginInstance, PluginManager, PluginNode};
pub use registry::{OperationFactory, OperationRegistry, RegisteredOperation, OPS_CONFIG_PATH};
