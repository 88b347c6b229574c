//! OpFlow - Dataflow Engine for Operation Graphs
//!
//! Builds workflows out of named operations whose inputs are described by
//! deferred references ("locators") instead of direct links, then runs
//! them in dependency order, once per pass, isolating failures to the
//! dependents of the operation that failed.
//!
//! # Architecture
//!
//! The library is organized into these modules:
//!
//! - [`namespace`]: Dot-delimited URIs and the arena tree they address
//! - [`workflow`]: Values, locators, the operation contract, workflows,
//!   dependency analysis and the state file format
//! - [`execution`]: Pass engine, input resolution and the batch driver
//! - [`environment`]: Operation registry with enable flags, plugin instances
//! - [`operations`]: Built-in operations and plugins
//! - [`monitoring`]: Per-pass execution timeline
//! - [`session`]: Consumer facade with save/load
//!
//! # Example
//!
//! ```rust
//! use opflow::Session;
//! use opflow::workflow::{DataType, Locator, Value};
//!
//! fn main() -> Result<(), opflow::EngineError> {
//!     let mut session = Session::with_builtins();
//!     session.add_workflow("main")?;
//!     session.add_operation("main", "scale", "Scale")?;
//!     session.set_input("main", "scale", "x", Locator::typed(DataType::Integer, "0"))?;
//!     session.connect_workflow_input("main", "x", "scale.inputs.x")?;
//!     session.connect_workflow_output("main", "y", "scale.outputs.y")?;
//!
//!     // One pass per value
//!     let batch = session.run_batch("main", "x", vec![Value::Int(1), Value::Int(2)])?;
//!     assert_eq!(batch.len(), 2);
//!     Ok(())
//! }
//! ```

pub mod environment;
pub mod error;
pub mod execution;
pub mod monitoring;
pub mod namespace;
pub mod operations;
pub mod session;
pub mod workflow;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use error::{EngineError, OpError, Result};
pub use execution::{BatchReport, BatchSource, Engine, PassReport};
pub use namespace::Uri;
pub use session::{LoadReport, Session};
pub use workflow::{Locator, OpIo, Operation, Schema, Value, Workflow, WorkflowHandle};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "OpFlow";
