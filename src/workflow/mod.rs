//! Workflow Definition Module
//!
//! Data structures for building workflows out of operations, wiring their
//! inputs through locators, and checking and planning execution order.
//!
//! # Structure
//!
//! - [`value`]: Dynamic values carried between operations
//! - [`locator`]: Input locators and type coercion
//! - [`operation`]: The operation contract (schema plus entry point)
//! - [`model`]: Workflows, their namespace and shared handles
//! - [`validator`]: Dependency graph, cycle detection and lint rules
//! - [`planner`]: Per-pass status tracking and readiness
//! - [`parser`]: State file reading and writing

pub mod locator;
pub mod model;
pub mod operation;
pub mod parser;
pub mod planner;
pub mod validator;
pub mod value;

pub use locator::{coerce, DataType, InputSlot, Locator, LocatorSpec, Source};
pub use model::{OpNode, OperationNode, Workflow, WorkflowHandle, INPUTS_GROUP, OUTPUTS_GROUP};
pub use operation::{InputSpec, OpIo, Operation, OutputSpec, Schema};
pub use parser::{
    canonical_path, load_state_file, save_state_file, FormatVersion, OperationSpec, PluginSpec,
    StateFile, WorkflowSpec,
};
pub use planner::{OpMetrics, OpStatus, PassPlanner};
pub use validator::{lint_workflow, quick_validate, validate_workflow, DependencyGraph, LintIssue};
pub use value::Value;
