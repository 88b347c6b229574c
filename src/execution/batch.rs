//! Batch Driver
//!
//! Re-runs a workflow once per value of an input sequence. Each pass
//! assigns the next value to a workflow input alias, executes the
//! workflow, and records what went in and what came out. A failed pass
//! is recorded and the batch moves on.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use log::{debug, info, warn};

use crate::error::{EngineError, Result};
use crate::workflow::{Value, Workflow, WorkflowHandle};

use super::engine::{Engine, PassReport};

/// Where the per-pass values of a batch come from.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchSource {
    /// Explicit values, used in order
    Values(Vec<Value>),
    /// Files in `dir` matching the glob `pattern`, sorted by path
    Directory { dir: PathBuf, pattern: String },
}

impl BatchSource {
    /// A batch over a list of file paths.
    pub fn files<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        BatchSource::Values(paths.into_iter().map(|p| Value::Str(p.into())).collect())
    }

    pub fn directory(dir: impl Into<PathBuf>, pattern: impl Into<String>) -> Self {
        BatchSource::Directory {
            dir: dir.into(),
            pattern: pattern.into(),
        }
    }

    /// The values of the batch, in pass order.
    pub fn values(&self) -> Result<Vec<Value>> {
        match self {
            BatchSource::Values(values) => Ok(values.clone()),
            BatchSource::Directory { dir, pattern } => Ok(list_directory(dir, pattern)?
                .into_iter()
                .map(|path| Value::Str(path.to_string_lossy().into_owned()))
                .collect()),
        }
    }
}

/// Lists regular files in `dir` matching `pattern`, sorted.
fn list_directory(dir: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    let source_error = |message: String| EngineError::BatchSource {
        path: dir.display().to_string(),
        message,
    };

    if !dir.is_dir() {
        return Err(source_error("not a directory".to_string()));
    }

    let full = dir.join(pattern);
    let full = full
        .to_str()
        .ok_or_else(|| source_error("path is not valid UTF-8".to_string()))?;

    let entries = glob::glob(full).map_err(|e| source_error(e.to_string()))?;

    let mut files = Vec::new();
    for entry in entries {
        match entry {
            Ok(path) if path.is_file() => files.push(path),
            Ok(_) => {}
            Err(e) => warn!("Skipping unreadable batch entry: {}", e),
        }
    }
    files.sort();

    debug!(
        "Batch source {} / {}: {} files",
        dir.display(),
        pattern,
        files.len()
    );
    Ok(files)
}

/// Snapshot of one batch pass.
#[derive(Debug, Clone)]
pub struct BatchEntry {
    /// Position of the pass in the batch, from 0
    pub index: usize,
    /// Workflow input alias and the value assigned to it
    pub inputs: IndexMap<String, Value>,
    /// Workflow outputs after the pass; absent values read as `none`
    pub outputs: IndexMap<String, Value>,
    pub report: PassReport,
}

/// Ordered results of a batch, one entry per input value.
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub workflow: String,
    pub alias: String,
    pub entries: Vec<BatchEntry>,
}

impl BatchReport {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Indices of passes where something failed or was skipped.
    pub fn failed_passes(&self) -> Vec<usize> {
        self.entries
            .iter()
            .filter(|entry| !entry.report.is_success())
            .map(|entry| entry.index)
            .collect()
    }

    /// Input snapshots as a list of maps.
    pub fn inputs_list(&self) -> Value {
        Value::List(
            self.entries
                .iter()
                .map(|entry| Value::Map(entry.inputs.clone()))
                .collect(),
        )
    }

    /// Output snapshots as a list of maps.
    pub fn outputs_list(&self) -> Value {
        Value::List(
            self.entries
                .iter()
                .map(|entry| Value::Map(entry.outputs.clone()))
                .collect(),
        )
    }
}

impl Engine {
    /// Runs `workflow` once per value of `source`.
    ///
    /// # Arguments
    ///
    /// * `workflow` - The workflow to drive
    /// * `alias` - Workflow input alias receiving each value
    /// * `source` - Values, or a directory listing producing them
    ///
    /// # Returns
    ///
    /// * `Ok(BatchReport)` - One entry per value, in order, even if passes failed
    /// * `Err` - Unknown alias or unreadable source; no pass has run
    pub fn run_batch(
        &self,
        workflow: &mut Workflow,
        alias: &str,
        source: &BatchSource,
    ) -> Result<BatchReport> {
        if !workflow.wf_inputs().contains_key(alias) {
            return Err(EngineError::invalid_uri(
                alias,
                format!("workflow '{}' has no input alias with this name", workflow.name()),
            ));
        }

        let values = source.values()?;
        let total = values.len();
        info!(
            "Starting batch over '{}': {} passes on input '{}'",
            workflow.name(),
            total,
            alias
        );

        let mut entries = Vec::with_capacity(total);
        for (index, value) in values.into_iter().enumerate() {
            info!("Batch pass {} / {}", index + 1, total);

            workflow.set_wf_input(alias, value.clone())?;
            let report = self.execute(workflow);
            if !report.is_success() {
                warn!(
                    "Batch pass {} of '{}' incomplete: {}",
                    index + 1,
                    workflow.name(),
                    report.summary()
                );
            }

            let mut inputs = IndexMap::new();
            inputs.insert(alias.to_string(), value);
            entries.push(BatchEntry {
                index,
                inputs,
                outputs: workflow.wf_output_values(),
                report,
            });
        }

        let batch = BatchReport {
            workflow: workflow.name().to_string(),
            alias: alias.to_string(),
            entries,
        };
        info!(
            "Batch over '{}' finished: {} passes, {} incomplete",
            batch.workflow,
            batch.len(),
            batch.failed_passes().len()
        );
        Ok(batch)
    }

    /// Runs a batch over a shared workflow, e.g. one received as an input.
    pub fn run_batch_handle(
        &self,
        handle: &WorkflowHandle,
        alias: &str,
        source: &BatchSource,
    ) -> Result<BatchReport> {
        let mut workflow = self.lock_workflow(handle)?;
        self.run_batch(&mut workflow, alias, source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::namespace::Uri;
    use crate::testing::{Double, FailOn};
    use crate::workflow::{DataType, Locator};
    use std::fs;
    use tempfile::tempdir;

    fn uri(text: &str) -> Uri {
        Uri::parse(text).unwrap()
    }

    /// Copies `path` to output `result`, refusing `b.tif`.
    fn file_workflow() -> Workflow {
        let mut wf = Workflow::new("files");
        wf.add_operation("check", "FailOn", Box::new(FailOn::new("b.tif")))
            .unwrap();
        wf.set_input("check", "input", Locator::path("placeholder")).unwrap();
        wf.connect_input("path", &uri("check.inputs.input")).unwrap();
        wf.connect_output("result", &uri("check.outputs.out")).unwrap();
        wf
    }

    #[test]
    fn test_batch_keeps_order_through_failure() {
        let engine = Engine::new();
        let mut wf = file_workflow();

        let batch = engine
            .run_batch(&mut wf, "path", &BatchSource::files(["a.tif", "b.tif", "c.tif"]))
            .unwrap();

        assert_eq!(batch.len(), 3);
        assert_eq!(batch.failed_passes(), vec![1]);

        let used: Vec<&Value> = batch.entries.iter().map(|e| &e.inputs["path"]).collect();
        assert_eq!(
            used,
            vec![&Value::from("a.tif"), &Value::from("b.tif"), &Value::from("c.tif")]
        );
        assert_eq!(batch.entries[0].outputs["result"], Value::from("a.tif"));
        assert_eq!(batch.entries[1].outputs["result"], Value::None);
        assert_eq!(batch.entries[2].outputs["result"], Value::from("c.tif"));
    }

    #[test]
    fn test_unknown_alias_runs_nothing() {
        let engine = Engine::new();
        let mut wf = file_workflow();

        let err = engine
            .run_batch(&mut wf, "nope", &BatchSource::files(["a.tif"]))
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidUri { .. }));
        assert_eq!(wf.output_value("check", "out").unwrap(), None);
    }

    #[test]
    fn test_typed_alias_coerces_each_value() {
        let engine = Engine::new();
        let mut wf = Workflow::new("numbers");
        wf.add_operation("d", "Double", Box::new(Double)).unwrap();
        wf.set_input("d", "y", Locator::typed(DataType::Integer, "0"))
            .unwrap();
        wf.connect_input("n", &uri("d.inputs.y")).unwrap();
        wf.connect_output("twice", &uri("d.outputs.z")).unwrap();

        let source = BatchSource::Values(vec![Value::from("1"), Value::from("2")]);
        let batch = engine.run_batch(&mut wf, "n", &source).unwrap();

        assert_eq!(
            batch.outputs_list(),
            Value::List(vec![
                Value::Map(IndexMap::from([("twice".to_string(), Value::Int(2))])),
                Value::Map(IndexMap::from([("twice".to_string(), Value::Int(4))])),
            ])
        );
        assert!(batch.failed_passes().is_empty());
    }

    #[test]
    fn test_directory_source_is_sorted_and_filtered() {
        let dir = tempdir().unwrap();
        for name in ["c.tif", "a.tif", "notes.txt", "b.tif"] {
            fs::write(dir.path().join(name), "data").unwrap();
        }
        fs::create_dir(dir.path().join("d.tif")).unwrap();

        let values = BatchSource::directory(dir.path(), "*.tif").values().unwrap();
        let names: Vec<String> = values
            .iter()
            .map(|v| {
                Path::new(v.as_str().unwrap())
                    .file_name()
                    .unwrap()
                    .to_string_lossy()
                    .into_owned()
            })
            .collect();
        assert_eq!(names, vec!["a.tif", "b.tif", "c.tif"]);
    }

    #[test]
    fn test_directory_batch_runs_each_file() {
        let dir = tempdir().unwrap();
        for name in ["x.tif", "b.tif"] {
            fs::write(dir.path().join(name), "data").unwrap();
        }

        let engine = Engine::new();
        let mut wf = file_workflow();
        let batch = engine
            .run_batch(&mut wf, "path", &BatchSource::directory(dir.path(), "*.tif"))
            .unwrap();

        assert_eq!(batch.len(), 2);
        assert!(batch.inputs_list().to_string().contains("x.tif"));
    }

    #[test]
    fn test_missing_directory_is_source_error() {
        let engine = Engine::new();
        let mut wf = file_workflow();
        let err = engine
            .run_batch(
                &mut wf,
                "path",
                &BatchSource::directory("/definitely/not/here", "*.tif"),
            )
            .unwrap_err();
        assert!(matches!(err, EngineError::BatchSource { .. }));
    }

    #[test]
    fn test_batch_on_busy_handle() {
        let engine = Engine::new();
        let handle = WorkflowHandle::new(file_workflow());
        let _guard = handle.lock();

        let err = engine
            .run_batch_handle(&handle, "path", &BatchSource::files(["a.tif"]))
            .unwrap_err();
        assert!(matches!(err, EngineError::WorkflowBusy(_)));
    }
}
