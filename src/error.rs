//! Engine Error Types
//!
//! Every fallible engine call returns [`EngineError`]. Operation entry points
//! report [`OpError`], which the engine wraps as
//! [`EngineError::OperationRuntime`] for the failing node.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T, E = EngineError> = std::result::Result<T, E>;

/// Errors raised by the namespace, resolver, engine and persistence layers.
///
/// Payloads are plain text so the error can be cloned into per-operation
/// statuses and pass reports.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("invalid URI '{uri}': {reason}")]
    InvalidUri { uri: String, reason: String },

    #[error("cannot coerce {value} to {target}")]
    TypeCoercion { value: String, target: String },

    #[error("cyclic dependency: {}", .path.join(" -> "))]
    CyclicDependency { path: Vec<String> },

    #[error("operation '{operation}' failed: {message}")]
    OperationRuntime { operation: String, message: String },

    #[error("operation type '{0}' is disabled")]
    OperationDisabled(String),

    #[error("input '{input}' of '{operation}' is unresolved: {reason}")]
    UnresolvedInput {
        operation: String,
        input: String,
        reason: String,
    },

    #[error("unknown type: '{0}'")]
    UnknownType(String),

    #[error("workflow '{0}' is busy with another pass")]
    WorkflowBusy(String),

    #[error("plugin '{name}': {message}")]
    Plugin { name: String, message: String },

    #[error("batch source '{path}': {message}")]
    BatchSource { path: String, message: String },

    #[error("state file '{path}': {message}")]
    StateFile { path: String, message: String },
}

impl EngineError {
    /// Shorthand for [`EngineError::InvalidUri`].
    pub fn invalid_uri(uri: impl ToString, reason: impl Into<String>) -> Self {
        Self::InvalidUri {
            uri: uri.to_string(),
            reason: reason.into(),
        }
    }

    /// Shorthand for [`EngineError::StateFile`].
    pub fn state_file(path: impl ToString, message: impl ToString) -> Self {
        Self::StateFile {
            path: path.to_string(),
            message: message.to_string(),
        }
    }

    /// True for errors that abort a whole pass rather than a single node.
    pub fn is_structural(&self) -> bool {
        matches!(self, Self::InvalidUri { .. } | Self::CyclicDependency { .. })
    }
}

/// Errors returned from an operation's entry point.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OpError {
    #[error("input '{0}' is not declared by this operation")]
    MissingInput(String),

    #[error("input '{name}' expected {expected}, found {found}")]
    InputType {
        name: String,
        expected: String,
        found: String,
    },

    #[error("output '{0}' is not declared by this operation")]
    UnknownOutput(String),

    #[error("{0}")]
    Failed(String),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl OpError {
    /// Builds a [`OpError::Failed`] from any displayable message.
    pub fn failed(message: impl ToString) -> Self {
        Self::Failed(message.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cyclic_dependency_display() {
        let err = EngineError::CyclicDependency {
            path: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "cyclic dependency: a -> b -> a");
    }

    #[test]
    fn test_invalid_uri_helper() {
        let err = EngineError::invalid_uri("op.inputs.x", "segment 'x' not found");
        assert!(matches!(err, EngineError::InvalidUri { .. }));
        assert!(err.to_string().contains("op.inputs.x"));
        assert!(err.is_structural());
    }

    #[test]
    fn test_runtime_error_is_not_structural() {
        let err = EngineError::OperationRuntime {
            operation: "scale".into(),
            message: "boom".into(),
        };
        assert!(!err.is_structural());
    }

    #[test]
    fn test_op_error_from_engine_error() {
        let err: OpError = EngineError::WorkflowBusy("inner".into()).into();
        assert_eq!(err.to_string(), "workflow 'inner' is busy with another pass");
    }
}
