//! Pass Monitoring Module
//!
//! Tracks per-operation timing during execution passes.
//!
//! # Components
//!
//! - [`ExecutionTimeline`]: Operation start/end events, durations and charts

pub mod timeline;

pub use timeline::{EventType, ExecutionTimeline, OperationSpan, TimelineEvent};
