//! Workflow Execution Module
//!
//! Runs execution passes over workflows and drives repeated passes for
//! batch processing.
//!
//! # Architecture
//!
//! - [`engine`]: Pass orchestration, scheduling and pass reports
//! - [`resolver`]: Cycle-guarded resolution of input locators
//! - [`step`]: Invocation of a single operation entry point
//! - [`batch`]: Batch driver over value lists and directory listings

pub mod batch;
pub mod engine;
pub mod resolver;
pub mod step;

pub use batch::{BatchEntry, BatchReport, BatchSource};
pub use engine::{Engine, PassReport};
pub use resolver::Resolver;
