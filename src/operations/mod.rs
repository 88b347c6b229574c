//! Built-in Operations
//!
//! A small catalog of domain-neutral operations and plugins so that a
//! fresh session can build and run useful workflows, including nested
//! batch execution.
//!
//! # Categories
//!
//! - `BASIC`: constants and arithmetic ([`basic`])
//! - `IO`: file metadata ([`files`])
//! - `EXECUTION`: batch drivers over nested workflows ([`batch`])

pub mod basic;
pub mod batch;
pub mod files;
pub mod plugins;

use crate::environment::{OperationRegistry, PluginManager};

pub const BASIC: &str = "BASIC";
pub const IO: &str = "IO";
pub const EXECUTION: &str = "EXECUTION";

/// A registry holding every built-in operation type, all enabled.
pub fn builtin_registry() -> OperationRegistry {
    let mut registry = OperationRegistry::new();
    registry.register(BASIC, "Constant", || Box::new(basic::Constant));
    registry.register(BASIC, "Scale", || Box::new(basic::Scale));
    registry.register(BASIC, "Add", || Box::new(basic::Add));
    registry.register(IO, "FileInfo", || Box::new(files::FileInfo));
    registry.register(EXECUTION, "BatchFromFiles", || Box::new(batch::BatchFromFiles));
    registry.register(EXECUTION, "BatchFromDirectory", || {
        Box::new(batch::BatchFromDirectory)
    });
    registry
}

/// Registers the built-in plugin types.
pub fn builtin_plugins(manager: &mut PluginManager) {
    manager.register("StaticValue", plugins::StaticValue::boxed);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_catalog() {
        let registry = builtin_registry();
        let names: Vec<(&str, &str)> = registry
            .catalog()
            .map(|e| (e.category.as_str(), e.name.as_str()))
            .collect();

        assert_eq!(names.len(), 6);
        assert!(names.contains(&("BASIC", "Scale")));
        assert!(names.contains(&("EXECUTION", "BatchFromDirectory")));
        for entry in registry.catalog() {
            assert!((entry.factory)().schema().validate().is_ok(), "{}", entry.name);
        }
    }

    #[test]
    fn test_builtin_plugins() {
        let mut manager = PluginManager::new();
        builtin_plugins(&mut manager);
        assert_eq!(manager.plugin_types(), vec!["StaticValue"]);
    }
}
