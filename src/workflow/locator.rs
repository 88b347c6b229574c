//! Input Locators
//!
//! A locator describes where an operation input's value comes from before
//! that value exists. Each source kind is one variant carrying only the
//! payload it needs; the serialized form is the flat
//! `{source, declared_type, value}` record used in state files.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::namespace::Uri;

use super::value::Value;

/// Source kind tag, as written in state files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    None,
    Literal,
    FilesystemPath,
    WorkflowReference,
    PluginReference,
    EntireWorkflow,
    BatchSequence,
}

/// Declared value type applied during resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    None,
    #[default]
    Auto,
    String,
    Integer,
    Float,
    Boolean,
    List,
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::None => "none",
            DataType::Auto => "auto",
            DataType::String => "string",
            DataType::Integer => "integer",
            DataType::Float => "float",
            DataType::Boolean => "boolean",
            DataType::List => "list",
        };
        write!(f, "{}", name)
    }
}

/// Deferred reference filling one operation input.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "LocatorSpec", into = "LocatorSpec")]
pub enum Locator {
    /// Always resolves to `Value::None`
    #[default]
    None,
    /// A value given directly, coerced to `data_type`
    Literal { data_type: DataType, value: Value },
    /// A path handed to the operation as text; the engine performs no I/O
    Filesystem { path: String },
    /// An output slot, input slot or output group in the same workflow
    Workflow { uri: Uri, data_type: DataType },
    /// An output slot of a plugin instance
    Plugin { uri: Uri },
    /// A handle to another workflow, for nested execution
    EntireWorkflow { name: String },
    /// A list of values, one per batch element
    Batch { data_type: DataType, values: Vec<Value> },
}

impl Locator {
    /// Literal with automatic typing.
    pub fn literal(value: impl Into<Value>) -> Self {
        Locator::Literal {
            data_type: DataType::Auto,
            value: value.into(),
        }
    }

    /// Literal coerced to `data_type` on resolution.
    pub fn typed(data_type: DataType, value: impl Into<Value>) -> Self {
        Locator::Literal {
            data_type,
            value: value.into(),
        }
    }

    pub fn path(path: impl Into<String>) -> Self {
        Locator::Filesystem { path: path.into() }
    }

    /// Reference to a slot in the same workflow, e.g. `"scale.outputs.y"`.
    pub fn reference(uri: &str) -> Result<Self> {
        Ok(Locator::Workflow {
            uri: Uri::parse(uri)?,
            data_type: DataType::Auto,
        })
    }

    /// Reference to a plugin output slot, e.g. `"source.outputs.value"`.
    pub fn plugin(uri: &str) -> Result<Self> {
        Ok(Locator::Plugin {
            uri: Uri::parse(uri)?,
        })
    }

    pub fn workflow(name: impl Into<String>) -> Self {
        Locator::EntireWorkflow { name: name.into() }
    }

    pub fn batch(data_type: DataType, values: Vec<Value>) -> Self {
        Locator::Batch { data_type, values }
    }

    pub fn source(&self) -> Source {
        match self {
            Locator::None => Source::None,
            Locator::Literal { .. } => Source::Literal,
            Locator::Filesystem { .. } => Source::FilesystemPath,
            Locator::Workflow { .. } => Source::WorkflowReference,
            Locator::Plugin { .. } => Source::PluginReference,
            Locator::EntireWorkflow { .. } => Source::EntireWorkflow,
            Locator::Batch { .. } => Source::BatchSequence,
        }
    }

    pub fn declared_type(&self) -> DataType {
        match self {
            Locator::Literal { data_type, .. }
            | Locator::Workflow { data_type, .. }
            | Locator::Batch { data_type, .. } => *data_type,
            _ => DataType::Auto,
        }
    }

    /// Target URI for reference sources.
    pub fn target(&self) -> Option<&Uri> {
        match self {
            Locator::Workflow { uri, .. } | Locator::Plugin { uri } => Some(uri),
            _ => None,
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::None => write!(f, "none"),
            Locator::Literal { data_type, value } => write!(f, "literal({}): {}", data_type, value),
            Locator::Filesystem { path } => write!(f, "path: {}", path),
            Locator::Workflow { uri, data_type } => write!(f, "ref({}): {}", data_type, uri),
            Locator::Plugin { uri } => write!(f, "plugin: {}", uri),
            Locator::EntireWorkflow { name } => write!(f, "workflow: {}", name),
            Locator::Batch { data_type, values } => {
                write!(f, "batch({}): {} values", data_type, values.len())
            }
        }
    }
}

/// Flat serialized form of a [`Locator`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocatorSpec {
    pub source: Source,
    #[serde(default)]
    pub declared_type: DataType,
    #[serde(default)]
    pub value: Value,
}

fn text_payload(source: Source, value: Value) -> Result<String> {
    match value {
        Value::Str(text) => Ok(text),
        other => Err(EngineError::TypeCoercion {
            value: other.to_string(),
            target: format!("{:?} payload (string)", source),
        }),
    }
}

impl TryFrom<LocatorSpec> for Locator {
    type Error = EngineError;

    fn try_from(spec: LocatorSpec) -> Result<Self> {
        let LocatorSpec {
            source,
            declared_type,
            value,
        } = spec;

        Ok(match source {
            Source::None => Locator::None,
            Source::Literal => Locator::Literal {
                data_type: declared_type,
                value,
            },
            Source::FilesystemPath => Locator::Filesystem {
                path: text_payload(source, value)?,
            },
            Source::WorkflowReference => Locator::Workflow {
                uri: Uri::parse(&text_payload(source, value)?)?,
                data_type: declared_type,
            },
            Source::PluginReference => Locator::Plugin {
                uri: Uri::parse(&text_payload(source, value)?)?,
            },
            Source::EntireWorkflow => Locator::EntireWorkflow {
                name: text_payload(source, value)?,
            },
            Source::BatchSequence => Locator::Batch {
                data_type: declared_type,
                values: match value {
                    Value::List(items) => items,
                    Value::None => Vec::new(),
                    scalar => vec![scalar],
                },
            },
        })
    }
}

impl From<Locator> for LocatorSpec {
    fn from(locator: Locator) -> Self {
        let source = locator.source();
        let declared_type = locator.declared_type();
        let value = match locator {
            Locator::None => Value::None,
            Locator::Literal { value, .. } => value,
            Locator::Filesystem { path } => Value::Str(path),
            Locator::Workflow { uri, .. } | Locator::Plugin { uri } => Value::Str(uri.to_string()),
            Locator::EntireWorkflow { name } => Value::Str(name),
            Locator::Batch { values, .. } => Value::List(values),
        };
        LocatorSpec {
            source,
            declared_type,
            value,
        }
    }
}

/// Converts `value` to `target`.
///
/// # Coercion rules
///
/// - `auto` keeps the value, `none` discards it
/// - `string` renders scalars as text
/// - `integer` accepts integers, integral floats and numeric text
/// - `float` accepts integers, floats and numeric text
/// - `boolean` accepts booleans, `0`/`1` and `true/false/yes/no` text
/// - `list` keeps lists, maps none to an empty list and wraps scalars
pub fn coerce(value: Value, target: DataType) -> Result<Value> {
    let fail = |value: &Value| EngineError::TypeCoercion {
        value: format!("{} '{}'", value.type_name(), value),
        target: target.to_string(),
    };

    match target {
        DataType::Auto => Ok(value),
        DataType::None => Ok(Value::None),
        DataType::String => match value {
            Value::Str(_) => Ok(value),
            Value::Bool(_) | Value::Int(_) | Value::Float(_) => Ok(Value::Str(value.to_string())),
            other => Err(fail(&other)),
        },
        DataType::Integer => match value {
            Value::Int(_) => Ok(value),
            Value::Float(x)
                if x.is_finite()
                    && x.fract() == 0.0
                    && x >= i64::MIN as f64
                    && x < i64::MAX as f64 =>
            {
                Ok(Value::Int(x as i64))
            }
            Value::Str(ref text) => text
                .trim()
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|_| fail(&value)),
            other => Err(fail(&other)),
        },
        DataType::Float => match value {
            Value::Float(_) => Ok(value),
            Value::Int(i) => Ok(Value::Float(i as f64)),
            Value::Str(ref text) => text
                .trim()
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|_| fail(&value)),
            other => Err(fail(&other)),
        },
        DataType::Boolean => match value {
            Value::Bool(_) => Ok(value),
            Value::Int(0) => Ok(Value::Bool(false)),
            Value::Int(1) => Ok(Value::Bool(true)),
            Value::Str(ref text) => match text.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" => Ok(Value::Bool(true)),
                "false" | "no" | "0" => Ok(Value::Bool(false)),
                _ => Err(fail(&value)),
            },
            other => Err(fail(&other)),
        },
        DataType::List => match value {
            Value::List(_) => Ok(value),
            Value::None => Ok(Value::List(Vec::new())),
            Value::Map(_) => Err(fail(&value)),
            scalar => Ok(Value::List(vec![scalar])),
        },
    }
}

/// An operation input: its locator plus the value resolved this pass.
#[derive(Debug, Clone, Default)]
pub struct InputSlot {
    locator: Locator,
    cached: Option<Value>,
}

impl InputSlot {
    pub fn new(locator: Locator) -> Self {
        Self {
            locator,
            cached: None,
        }
    }

    pub fn locator(&self) -> &Locator {
        &self.locator
    }

    /// Replaces the locator and drops any cached value.
    pub fn set_locator(&mut self, locator: Locator) {
        self.locator = locator;
        self.cached = None;
    }

    pub fn cached(&self) -> Option<&Value> {
        self.cached.as_ref()
    }

    pub fn is_resolved(&self) -> bool {
        self.cached.is_some()
    }

    pub(crate) fn cache(&mut self, value: Value) {
        self.cached = Some(value);
    }

    pub(crate) fn clear_cache(&mut self) {
        self.cached = None;
    }
}
