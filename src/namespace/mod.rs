//! URI Namespace Module
//!
//! Addresses every operation, slot and plugin instance by a dot-delimited
//! URI.
//!
//! # Structure
//!
//! - [`uri`]: The `Uri` value type and segment rules
//! - [`tree`]: Arena-indexed tree holding payloads by URI

pub mod tree;
pub mod uri;

pub use tree::{Namespace, NodeId};
pub use uri::{is_valid_segment, Uri, DELIMITER};
