//! Operation Contract
//!
//! Any type that declares a fixed input/output [`Schema`] and implements a
//! single `run` entry point is an [`Operation`]. The entry point sees its
//! resolved inputs and declared outputs through [`OpIo`] and never learns
//! where an input value came from.

use indexmap::IndexMap;

use crate::error::{EngineError, OpError, Result};
use crate::execution::Engine;
use crate::namespace::is_valid_segment;

use super::locator::Locator;
use super::model::WorkflowHandle;
use super::value::Value;

/// Declaration of one operation input.
#[derive(Debug, Clone, PartialEq)]
pub struct InputSpec {
    pub name: String,
    pub doc: String,
    /// Locator installed when the operation is added to a workflow
    pub default: Locator,
    /// Resolving to `Value::None` fails the operation before it runs
    pub required: bool,
}

/// Declaration of one operation output.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputSpec {
    pub name: String,
    pub doc: String,
}

/// Fixed input/output names of an operation type.
///
/// # Example
///
/// ```
/// use opflow::workflow::{DataType, Locator, Schema};
///
/// let schema = Schema::new()
///     .required_input("x", "value to scale")
///     .input_with_default("factor", "multiplier", Locator::typed(DataType::Float, 1.0))
///     .output("y", "scaled value");
///
/// assert_eq!(schema.input_names(), vec!["x", "factor"]);
/// assert!(schema.validate().is_ok());
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    pub description: String,
    pub inputs: Vec<InputSpec>,
    pub outputs: Vec<OutputSpec>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Optional input with no default source.
    pub fn input(self, name: impl Into<String>, doc: impl Into<String>) -> Self {
        self.push_input(name, doc, Locator::None, false)
    }

    /// Input that must resolve to a value other than `none`.
    pub fn required_input(self, name: impl Into<String>, doc: impl Into<String>) -> Self {
        self.push_input(name, doc, Locator::None, true)
    }

    /// Optional input with a default locator.
    pub fn input_with_default(
        self,
        name: impl Into<String>,
        doc: impl Into<String>,
        default: Locator,
    ) -> Self {
        self.push_input(name, doc, default, false)
    }

    /// Required input with a default locator.
    pub fn required_with_default(
        self,
        name: impl Into<String>,
        doc: impl Into<String>,
        default: Locator,
    ) -> Self {
        self.push_input(name, doc, default, true)
    }

    fn push_input(
        mut self,
        name: impl Into<String>,
        doc: impl Into<String>,
        default: Locator,
        required: bool,
    ) -> Self {
        self.inputs.push(InputSpec {
            name: name.into(),
            doc: doc.into(),
            default,
            required,
        });
        self
    }

    pub fn output(mut self, name: impl Into<String>, doc: impl Into<String>) -> Self {
        self.outputs.push(OutputSpec {
            name: name.into(),
            doc: doc.into(),
        });
        self
    }

    pub fn input_names(&self) -> Vec<&str> {
        self.inputs.iter().map(|i| i.name.as_str()).collect()
    }

    pub fn output_names(&self) -> Vec<&str> {
        self.outputs.iter().map(|o| o.name.as_str()).collect()
    }

    pub fn input_spec(&self, name: &str) -> Option<&InputSpec> {
        self.inputs.iter().find(|i| i.name == name)
    }

    /// Checks that every name is a valid URI segment and unique per side.
    pub fn validate(&self) -> Result<()> {
        let names = self
            .inputs
            .iter()
            .map(|i| ("inputs", i.name.as_str()))
            .chain(self.outputs.iter().map(|o| ("outputs", o.name.as_str())));

        let mut seen = std::collections::HashSet::new();
        for (group, name) in names {
            if !is_valid_segment(name) {
                return Err(EngineError::invalid_uri(
                    format!("{}.{}", group, name),
                    "slot names must be valid URI segments",
                ));
            }
            if !seen.insert((group, name)) {
                return Err(EngineError::invalid_uri(
                    format!("{}.{}", group, name),
                    "slot declared twice",
                ));
            }
        }
        Ok(())
    }
}

/// A unit of computation with a fixed schema.
///
/// `schema` is read once when the operation is added to a workflow.
/// `run` is called at most once per pass, possibly on a worker thread.
pub trait Operation: Send {
    fn schema(&self) -> Schema;

    fn run(&mut self, io: &mut OpIo) -> Result<(), OpError>;
}

/// Inputs and outputs handed to an operation's entry point.
pub struct OpIo {
    operation: String,
    inputs: IndexMap<String, Value>,
    outputs: IndexMap<String, Option<Value>>,
    engine: Engine,
}

impl OpIo {
    /// Builds the I/O context for one invocation.
    ///
    /// `outputs` lists the declared output names; all start absent.
    pub fn new(
        operation: impl Into<String>,
        inputs: IndexMap<String, Value>,
        outputs: &[&str],
        engine: Engine,
    ) -> Self {
        Self {
            operation: operation.into(),
            inputs,
            outputs: outputs.iter().map(|name| (name.to_string(), None)).collect(),
            engine,
        }
    }

    /// Name of the operation being run.
    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Engine running this pass, for driving nested workflows.
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn inputs(&self) -> &IndexMap<String, Value> {
        &self.inputs
    }

    pub fn input(&self, name: &str) -> Result<&Value, OpError> {
        self.inputs
            .get(name)
            .ok_or_else(|| OpError::MissingInput(name.to_string()))
    }

    fn typed<'a, T>(
        &'a self,
        name: &str,
        expected: &str,
        pick: impl FnOnce(&'a Value) -> Option<T>,
    ) -> Result<T, OpError> {
        let value = self.input(name)?;
        pick(value).ok_or_else(|| OpError::InputType {
            name: name.to_string(),
            expected: expected.to_string(),
            found: value.type_name().to_string(),
        })
    }

    pub fn input_i64(&self, name: &str) -> Result<i64, OpError> {
        self.typed(name, "integer", Value::as_i64)
    }

    pub fn input_f64(&self, name: &str) -> Result<f64, OpError> {
        self.typed(name, "number", Value::as_f64)
    }

    pub fn input_bool(&self, name: &str) -> Result<bool, OpError> {
        self.typed(name, "boolean", Value::as_bool)
    }

    pub fn input_str(&self, name: &str) -> Result<&str, OpError> {
        self.typed(name, "string", Value::as_str)
    }

    pub fn input_list(&self, name: &str) -> Result<&[Value], OpError> {
        self.typed(name, "list", Value::as_list)
    }

    pub fn input_workflow(&self, name: &str) -> Result<WorkflowHandle, OpError> {
        self.typed(name, "workflow", |v| v.as_workflow().cloned())
    }

    /// Publishes a value on a declared output.
    pub fn set_output(&mut self, name: &str, value: impl Into<Value>) -> Result<(), OpError> {
        match self.outputs.get_mut(name) {
            Some(slot) => {
                *slot = Some(value.into());
                Ok(())
            }
            None => Err(OpError::UnknownOutput(name.to_string())),
        }
    }

    pub fn output(&self, name: &str) -> Option<&Value> {
        self.outputs.get(name).and_then(Option::as_ref)
    }

    pub(crate) fn into_outputs(self) -> IndexMap<String, Option<Value>> {
        self.outputs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn io_with(inputs: Vec<(&str, Value)>) -> OpIo {
        let inputs = inputs
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        OpIo::new("sample", inputs, &["out"], Engine::new())
    }

    #[test]
    fn test_schema_builder_order() {
        let schema = Schema::new()
            .input("a", "first")
            .required_input("b", "second")
            .output("c", "result");

        assert_eq!(schema.input_names(), vec!["a", "b"]);
        assert_eq!(schema.output_names(), vec!["c"]);
        assert!(schema.input_spec("b").unwrap().required);
        assert!(!schema.input_spec("a").unwrap().required);
    }

    #[test]
    fn test_schema_validate_rejects_bad_names() {
        let schema = Schema::new().input("bad name", "");
        assert!(schema.validate().is_err());

        let schema = Schema::new().input("x", "").input("x", "");
        assert!(schema.validate().is_err());

        // Same name on both sides lives under different groups
        let schema = Schema::new().input("x", "").output("x", "");
        assert!(schema.validate().is_ok());
    }

    #[test]
    fn test_typed_inputs() {
        let io = io_with(vec![("n", Value::Int(4)), ("s", Value::from("hi"))]);

        assert_eq!(io.input_i64("n").unwrap(), 4);
        assert_eq!(io.input_f64("n").unwrap(), 4.0);
        assert_eq!(io.input_str("s").unwrap(), "hi");
        assert!(matches!(io.input_i64("s"), Err(OpError::InputType { .. })));
        assert!(matches!(io.input("zzz"), Err(OpError::MissingInput(_))));
    }

    #[test]
    fn test_set_output_only_declared() {
        let mut io = io_with(vec![]);

        io.set_output("out", 7i64).unwrap();
        assert_eq!(io.output("out"), Some(&Value::Int(7)));
        assert!(matches!(
            io.set_output("other", 1i64),
            Err(OpError::UnknownOutput(_))
        ));

        let outputs = io.into_outputs();
        assert_eq!(outputs.len(), 1);
    }
}
