//! Batch Operations
//!
//! Operations that drive another workflow through the batch driver. The
//! nested workflow arrives as an `EntireWorkflow` input; each file path
//! is fed to one of its input aliases and every pass's inputs and outputs
//! are collected into two ordered lists.

use crate::error::OpError;
use crate::execution::BatchSource;
use crate::workflow::{DataType, Locator, OpIo, Operation, Schema};

const BATCH_INPUTS_DOC: &str = "list of maps of input alias to the value used";
const BATCH_OUTPUTS_DOC: &str = "list of maps of every workflow output for each pass";

fn nested_inputs(schema: Schema) -> Schema {
    schema
        .required_input("workflow", "the workflow to run once per file")
        .required_input(
            "input_name",
            "workflow input alias that receives each file path",
        )
        .output("batch_inputs", BATCH_INPUTS_DOC)
        .output("batch_outputs", BATCH_OUTPUTS_DOC)
}

/// Runs the nested workflow over `source` and publishes the snapshots.
fn drive(io: &mut OpIo, source: BatchSource) -> Result<(), OpError> {
    let workflow = io.input_workflow("workflow")?;
    let alias = io.input_str("input_name")?.to_string();

    let batch = io.engine().run_batch_handle(&workflow, &alias, &source)?;

    io.set_output("batch_inputs", batch.inputs_list())?;
    io.set_output("batch_outputs", batch.outputs_list())
}

/// Re-runs a workflow once per path of a file list.
pub struct BatchFromFiles;

impl Operation for BatchFromFiles {
    fn schema(&self) -> Schema {
        nested_inputs(
            Schema::new()
                .with_description("Runs a workflow once for each path in a list.")
                .required_input("file_list", "list of file paths"),
        )
    }

    fn run(&mut self, io: &mut OpIo) -> Result<(), OpError> {
        let files = io.input_list("file_list")?.to_vec();
        drive(io, BatchSource::Values(files))
    }
}

/// Re-runs a workflow once per file of a directory matching a pattern.
pub struct BatchFromDirectory;

impl Operation for BatchFromDirectory {
    fn schema(&self) -> Schema {
        nested_inputs(
            Schema::new()
                .with_description("Runs a workflow once for each matching file in a directory.")
                .required_input("dir_path", "directory holding the batch files")
                .input_with_default(
                    "pattern",
                    "glob pattern selecting files, e.g. *.tif",
                    Locator::typed(DataType::String, "*.tif"),
                ),
        )
    }

    fn run(&mut self, io: &mut OpIo) -> Result<(), OpError> {
        let source = BatchSource::directory(io.input_str("dir_path")?, io.input_str("pattern")?);
        drive(io, source)
    }
}
