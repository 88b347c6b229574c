//! Operation Registry
//!
//! Maps operation type names to constructors and tracks which types are
//! administratively enabled. Enable flags have an explicit load/save
//! lifecycle against a small YAML file.
//!
//! # Flags File Resolution
//!
//! The default flags file is resolved in the following order:
//! 1. `$OPFLOW_OPS_CONFIG`, if set
//! 2. `$HOME/.opflow/ops.yaml` (or `%USERPROFILE%` on Windows)
//! 3. `ops.yaml` in the current directory

use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use log::{debug, info, warn};
use once_cell::sync::Lazy;

use crate::error::{EngineError, Result};
use crate::workflow::Operation;

/// Lazily-resolved default path of the operation flags file.
pub static OPS_CONFIG_PATH: Lazy<PathBuf> = Lazy::new(|| {
    if let Some(path) = std::env::var_os("OPFLOW_OPS_CONFIG") {
        return PathBuf::from(path);
    }

    let home = std::env::var_os("HOME").or_else(|| std::env::var_os("USERPROFILE"));
    match home {
        Some(home) => PathBuf::from(home).join(".opflow").join("ops.yaml"),
        None => PathBuf::from("ops.yaml"),
    }
});

/// Constructor for a registered operation type.
pub type OperationFactory = fn() -> Box<dyn Operation>;

/// One registered operation type.
#[derive(Debug, Clone)]
pub struct RegisteredOperation {
    pub name: String,
    /// Grouping used in listings, e.g. `"BASIC"`
    pub category: String,
    pub factory: OperationFactory,
}

/// Operation types known to a session and their enable flags.
///
/// Types are enabled when registered. Flags for unregistered names are
/// kept and written back by [`enable_flags`](Self::enable_flags), so a
/// flags file written by a richer build survives a round trip.
#[derive(Debug, Clone, Default)]
pub struct OperationRegistry {
    entries: IndexMap<String, RegisteredOperation>,
    flags: IndexMap<String, bool>,
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        category: impl Into<String>,
        name: impl Into<String>,
        factory: OperationFactory,
    ) {
        let name = name.into();
        self.flags.entry(name.clone()).or_insert(true);
        self.entries.insert(
            name.clone(),
            RegisteredOperation {
                name,
                category: category.into(),
                factory,
            },
        );
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.is_registered(name) && self.flags.get(name).copied().unwrap_or(true)
    }

    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> Result<()> {
        if !self.is_registered(name) {
            return Err(EngineError::UnknownType(name.to_string()));
        }
        self.flags.insert(name.to_string(), enabled);
        debug!(
            "Operation type '{}' {}",
            name,
            if enabled { "enabled" } else { "disabled" }
        );
        Ok(())
    }

    /// Builds a new instance of an enabled type.
    pub fn create(&self, name: &str) -> Result<Box<dyn Operation>> {
        let entry = self
            .entries
            .get(name)
            .ok_or_else(|| EngineError::UnknownType(name.to_string()))?;
        if !self.is_enabled(name) {
            return Err(EngineError::OperationDisabled(name.to_string()));
        }
        Ok((entry.factory)())
    }

    /// Registered types in registration order.
    pub fn catalog(&self) -> impl Iterator<Item = &RegisteredOperation> {
        self.entries.values()
    }

    /// Flags of every registered type, then any kept for unknown names.
    pub fn enable_flags(&self) -> IndexMap<String, bool> {
        let mut flags: IndexMap<String, bool> = self
            .entries
            .keys()
            .map(|name| (name.clone(), self.is_enabled(name)))
            .collect();
        for (name, enabled) in &self.flags {
            flags.entry(name.clone()).or_insert(*enabled);
        }
        flags
    }

    /// Applies flags read from a state or flags file.
    pub fn apply_flags(&mut self, flags: &IndexMap<String, bool>) {
        for (name, enabled) in flags {
            if !self.is_registered(name) {
                debug!("Flag for unknown operation type '{}' kept as-is", name);
            }
            self.flags.insert(name.clone(), *enabled);
        }
    }

    /// Loads flags from `path`. A missing file leaves every flag unchanged.
    pub fn load_flags(&mut self, path: &Path) -> Result<()> {
        if !path.exists() {
            debug!("No operation flags file at {}", path.display());
            return Ok(());
        }

        let content =
            fs::read_to_string(path).map_err(|e| EngineError::state_file(path.display(), e))?;
        let flags: IndexMap<String, bool> =
            serde_yaml::from_str(&content).map_err(|e| EngineError::state_file(path.display(), e))?;

        self.apply_flags(&flags);
        info!("Loaded {} operation flags from {}", flags.len(), path.display());
        Ok(())
    }

    /// Writes every flag to `path`.
    pub fn save_flags(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .map_err(|e| EngineError::state_file(parent.display(), e))?;
            }
        }

        let yaml = serde_yaml::to_string(&self.enable_flags())
            .map_err(|e| EngineError::state_file(path.display(), e))?;
        fs::write(path, yaml).map_err(|e| EngineError::state_file(path.display(), e))?;

        let disabled = self.enable_flags().values().filter(|on| !**on).count();
        if disabled > 0 {
            warn!("{} operation types are disabled", disabled);
        }
        info!("Saved operation flags to {}", path.display());
        Ok(())
    }
}
