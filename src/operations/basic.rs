//! Constants and arithmetic.

use crate::error::OpError;
use crate::workflow::{DataType, Locator, OpIo, Operation, Schema, Value};

/// Publishes its input unchanged.
pub struct Constant;

impl Operation for Constant {
    fn schema(&self) -> Schema {
        Schema::new()
            .with_description("Outputs the value it is given.")
            .input("value", "any value")
            .output("value", "the same value")
    }

    fn run(&mut self, io: &mut OpIo) -> Result<(), OpError> {
        let value = io.input("value")?.clone();
        io.set_output("value", value)
    }
}

/// `y = x * factor`.
pub struct Scale;

impl Operation for Scale {
    fn schema(&self) -> Schema {
        Schema::new()
            .with_description("Multiplies a number by a factor.")
            .required_input("x", "number to scale")
            .input_with_default(
                "factor",
                "multiplier",
                Locator::typed(DataType::Float, 1.0),
            )
            .output("y", "scaled number")
    }

    fn run(&mut self, io: &mut OpIo) -> Result<(), OpError> {
        let y = combine(io, "x", "factor", i64::checked_mul, |a, b| a * b)?;
        io.set_output("y", y)
    }
}

/// `sum = a + b`.
pub struct Add;

impl Operation for Add {
    fn schema(&self) -> Schema {
        Schema::new()
            .with_description("Adds two numbers.")
            .required_input("a", "first number")
            .required_input("b", "second number")
            .output("sum", "a + b")
    }

    fn run(&mut self, io: &mut OpIo) -> Result<(), OpError> {
        let sum = combine(io, "a", "b", i64::checked_add, |a, b| a + b)?;
        io.set_output("sum", sum)
    }
}

/// Applies an arithmetic operator to two numeric inputs.
///
/// Two integers give an integer (overflow is an error); any float makes
/// the result a float.
fn combine(
    io: &OpIo,
    left: &str,
    right: &str,
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
) -> Result<Value, OpError> {
    match (io.input(left)?, io.input(right)?) {
        (Value::Int(a), Value::Int(b)) => int_op(*a, *b).map(Value::Int).ok_or_else(|| {
            OpError::failed(format!("integer overflow combining {} and {}", a, b))
        }),
        _ => Ok(Value::Float(float_op(
            io.input_f64(left)?,
            io.input_f64(right)?,
        ))),
    }
}
