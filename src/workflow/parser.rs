//! State File Format
//!
//! Reads and writes the YAML workflow-state file. The file records enable
//! flags, every workflow (operations, input locators and aliases) and
//! every plugin instance. Rebuilding live objects from it is the
//! session's job; this module only handles the document.

use std::cmp::Ordering;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::namespace::Uri;

use super::locator::Locator;
use super::model::Workflow;
use super::value::Value;

/// Extension appended to state files saved without it.
pub const CANONICAL_EXTENSION: &str = "wfl";

/// `major.minor.patch` version of the state file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FormatVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl FormatVersion {
    /// Version written by this build.
    pub const CURRENT: FormatVersion = FormatVersion {
        major: 1,
        minor: 1,
        patch: 0,
    };

    /// Assumed when a file carries no version.
    pub const EARLIEST: FormatVersion = FormatVersion {
        major: 0,
        minor: 0,
        patch: 0,
    };

    /// Parses `"1.2.3"`; missing trailing parts read as 0.
    pub fn parse(text: &str) -> Result<Self> {
        let invalid = || {
            EngineError::state_file(
                "FORMAT_VERSION",
                format!("'{}' is not a major.minor.patch version", text),
            )
        };

        let parts: Vec<&str> = text.trim().split('.').collect();
        if parts.is_empty() || parts.len() > 3 {
            return Err(invalid());
        }

        let mut numbers = [0u32; 3];
        for (slot, part) in numbers.iter_mut().zip(&parts) {
            *slot = part.parse().map_err(|_| invalid())?;
        }

        Ok(Self {
            major: numbers[0],
            minor: numbers[1],
            patch: numbers[2],
        })
    }

    /// Warning text if a file of this version predates the running format.
    ///
    /// Only major and minor count; patch releases never change the layout.
    pub fn compatibility_warning(&self) -> Option<String> {
        let current = Self::CURRENT;
        match (self.major, self.minor).cmp(&(current.major, current.minor)) {
            Ordering::Less => Some(format!(
                "state file format {} is older than {}; loading anyway",
                self, current
            )),
            _ => None,
        }
    }
}

impl fmt::Display for FormatVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

fn enabled_by_default() -> bool {
    true
}

/// One operation in a saved workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationSpec {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    #[serde(default)]
    pub inputs: IndexMap<String, Locator>,
}

/// A saved workflow: operations by URI plus alias maps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSpec {
    #[serde(default)]
    pub operations: IndexMap<String, OperationSpec>,
    #[serde(default)]
    pub inputs: IndexMap<String, String>,
    #[serde(default)]
    pub outputs: IndexMap<String, String>,
}

impl WorkflowSpec {
    /// Captures the structure of a live workflow.
    pub fn from_workflow(workflow: &Workflow) -> Self {
        let operations = workflow
            .operation_names()
            .into_iter()
            .filter_map(|name| {
                let node = workflow.operation(&name).ok()?;
                let inputs = workflow
                    .input_locators(&name)
                    .unwrap_or_default()
                    .into_iter()
                    .map(|(input, locator)| (input, locator.clone()))
                    .collect();
                let spec = OperationSpec {
                    type_name: node.type_name().to_string(),
                    enabled: node.is_enabled(),
                    inputs,
                };
                Some((name, spec))
            })
            .collect();

        let aliases = |map: &IndexMap<String, Uri>| -> IndexMap<String, String> {
            map.iter()
                .map(|(alias, uri)| (alias.clone(), uri.to_string()))
                .collect()
        };

        Self {
            operations,
            inputs: aliases(workflow.wf_inputs()),
            outputs: aliases(workflow.wf_outputs()),
        }
    }
}

/// A saved plugin instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginSpec {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub inputs: IndexMap<String, Value>,
}

/// The whole state document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateFile {
    #[serde(
        rename = "FORMAT_VERSION",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub format_version: Option<String>,

    #[serde(rename = "SAVED_AT", default, skip_serializing_if = "Option::is_none")]
    pub saved_at: Option<DateTime<Utc>>,

    #[serde(rename = "OPERATION_ENABLE_FLAGS", default)]
    pub operation_enable_flags: IndexMap<String, bool>,

    #[serde(rename = "WORKFLOWS", default)]
    pub workflows: IndexMap<String, WorkflowSpec>,

    #[serde(rename = "PLUGINS", default)]
    pub plugins: IndexMap<String, PluginSpec>,
}

impl StateFile {
    /// An empty document stamped with the current version and time.
    pub fn new() -> Self {
        Self {
            format_version: Some(FormatVersion::CURRENT.to_string()),
            saved_at: Some(Utc::now()),
            ..Self::default()
        }
    }

    /// Declared format version, or the earliest one if absent.
    pub fn version(&self) -> Result<FormatVersion> {
        match &self.format_version {
            Some(text) => FormatVersion::parse(text),
            None => Ok(FormatVersion::EARLIEST),
        }
    }
}

/// Appends the canonical extension unless `path` already has it.
pub fn canonical_path(path: &Path) -> PathBuf {
    if path.extension().map_or(false, |ext| ext == CANONICAL_EXTENSION) {
        return path.to_path_buf();
    }
    let mut text = path.as_os_str().to_owned();
    text.push(".");
    text.push(CANONICAL_EXTENSION);
    PathBuf::from(text)
}

/// Reads a state file.
///
/// # Arguments
///
/// * `path` - Path to the state file, used as given
///
/// # Returns
///
/// * `Ok(StateFile)` - The parsed document
/// * `Err(StateFile)` - The file is unreadable or not a state document
pub fn load_state_file(path: &Path) -> Result<StateFile> {
    info!("Loading state file: {}", path.display());

    let content =
        fs::read_to_string(path).map_err(|e| EngineError::state_file(path.display(), e))?;
    debug!("State file loaded ({} bytes)", content.len());

    let state: StateFile =
        serde_yaml::from_str(&content).map_err(|e| EngineError::state_file(path.display(), e))?;

    info!(
        "Parsed {} workflows, {} plugins",
        state.workflows.len(),
        state.plugins.len()
    );
    Ok(state)
}

/// Writes a state file, returning the path actually written.
pub fn save_state_file(state: &StateFile, path: &Path) -> Result<PathBuf> {
    let path = canonical_path(path);
    let yaml =
        serde_yaml::to_string(state).map_err(|e| EngineError::state_file(path.display(), e))?;
    fs::write(&path, yaml).map_err(|e| EngineError::state_file(path.display(), e))?;
    info!("State saved to: {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Double, Emit};
    use crate::workflow::DataType;
    use tempfile::tempdir;

    #[test]
    fn test_version_parse_and_display() {
        let version = FormatVersion::parse("1.0.2").unwrap();
        assert_eq!(version.to_string(), "1.0.2");
        assert_eq!(FormatVersion::parse("2").unwrap().to_string(), "2.0.0");
        assert!(FormatVersion::parse("1.x").is_err());
        assert!(FormatVersion::parse("1.2.3.4").is_err());
    }

    #[test]
    fn test_compatibility_warning() {
        assert!(FormatVersion::parse("1.0.9").unwrap().compatibility_warning().is_some());
        assert!(FormatVersion::EARLIEST.compatibility_warning().is_some());
        assert!(FormatVersion::CURRENT.compatibility_warning().is_none());
        assert!(FormatVersion::parse("1.1.7").unwrap().compatibility_warning().is_none());
        assert!(FormatVersion::parse("2.0.0").unwrap().compatibility_warning().is_none());
    }

    #[test]
    fn test_missing_version_is_earliest() {
        let state: StateFile = serde_yaml::from_str("WORKFLOWS: {}\n").unwrap();
        assert_eq!(state.version().unwrap(), FormatVersion::EARLIEST);
    }

    #[test]
    fn test_operation_enabled_defaults_to_true() {
        let spec: OperationSpec = serde_yaml::from_str("type: Scale\n").unwrap();
        assert!(spec.enabled);
        assert!(spec.inputs.is_empty());
    }

    #[test]
    fn test_canonical_path() {
        assert_eq!(canonical_path(Path::new("run.wfl")), PathBuf::from("run.wfl"));
        assert_eq!(canonical_path(Path::new("run")), PathBuf::from("run.wfl"));
        assert_eq!(
            canonical_path(Path::new("dir/run.yaml")),
            PathBuf::from("dir/run.yaml.wfl")
        );
    }

    #[test]
    fn test_workflow_spec_from_workflow() {
        let mut wf = Workflow::new("main");
        wf.add_operation("a", "Emit", Box::new(Emit::new(1))).unwrap();
        wf.add_operation("b", "Double", Box::new(Double)).unwrap();
        wf.set_input("b", "y", Locator::reference("a.outputs.x").unwrap())
            .unwrap();
        wf.connect_output("result", &Uri::parse("b.outputs.z").unwrap())
            .unwrap();
        wf.set_op_enabled("a", false).unwrap();

        let spec = WorkflowSpec::from_workflow(&wf);
        let names: Vec<&String> = spec.operations.keys().collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(spec.operations["b"].type_name, "Double");
        assert!(!spec.operations["a"].enabled);
        assert!(spec.operations["b"].enabled);
        assert_eq!(
            spec.operations["b"].inputs["y"],
            Locator::reference("a.outputs.x").unwrap()
        );
        assert_eq!(spec.outputs["result"], "b.outputs.z");
    }

    #[test]
    fn test_state_file_round_trip() {
        let dir = tempdir().unwrap();

        let mut state = StateFile::new();
        state.operation_enable_flags.insert("Scale".into(), false);
        let mut spec = WorkflowSpec::default();
        let mut inputs = IndexMap::new();
        inputs.insert("x".to_string(), Locator::typed(DataType::Integer, "3"));
        spec.operations.insert(
            "scale".into(),
            OperationSpec {
                type_name: "Scale".into(),
                enabled: false,
                inputs,
            },
        );
        state.workflows.insert("main".into(), spec);

        let written = save_state_file(&state, &dir.path().join("session")).unwrap();
        assert_eq!(written.extension().unwrap(), "wfl");

        let text = fs::read_to_string(&written).unwrap();
        assert!(text.contains("FORMAT_VERSION"));
        assert!(text.contains("OPERATION_ENABLE_FLAGS"));

        let loaded = load_state_file(&written).unwrap();
        assert_eq!(loaded.version().unwrap(), FormatVersion::CURRENT);
        assert_eq!(loaded, state);
    }

    #[test]
    fn test_load_errors_are_state_errors() {
        let dir = tempdir().unwrap();
        let missing = load_state_file(&dir.path().join("nope.wfl"));
        assert!(matches!(missing, Err(EngineError::StateFile { .. })));

        let bad = dir.path().join("bad.wfl");
        fs::write(&bad, "WORKFLOWS: [1, 2]").unwrap();
        assert!(matches!(
            load_state_file(&bad),
            Err(EngineError::StateFile { .. })
        ));
    }
}
