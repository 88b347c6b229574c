//! Small operations shared by unit tests.

use crate::error::OpError;
use crate::workflow::{OpIo, Operation, Schema, Value};

/// Publishes a fixed value on output `x`.
pub struct Emit {
    value: Value,
}

impl Emit {
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
        }
    }
}

impl Operation for Emit {
    fn schema(&self) -> Schema {
        Schema::new().output("x", "emitted value")
    }

    fn run(&mut self, io: &mut OpIo) -> Result<(), OpError> {
        io.set_output("x", self.value.clone())
    }
}

/// `z = y * 2` for integer `y`.
pub struct Double;

impl Operation for Double {
    fn schema(&self) -> Schema {
        Schema::new()
            .required_input("y", "integer to double")
            .output("z", "doubled value")
    }

    fn run(&mut self, io: &mut OpIo) -> Result<(), OpError> {
        let y = io.input_i64("y")?;
        io.set_output("z", y * 2)
    }
}

/// Copies optional input `input` to output `out`.
pub struct Pass;

impl Operation for Pass {
    fn schema(&self) -> Schema {
        Schema::new()
            .input("input", "any value")
            .output("out", "the same value")
    }

    fn run(&mut self, io: &mut OpIo) -> Result<(), OpError> {
        let value = io.input("input")?.clone();
        io.set_output("out", value)
    }
}

/// Fails whenever its input equals `trigger`, otherwise copies it.
pub struct FailOn {
    trigger: Value,
}

impl FailOn {
    pub fn new(trigger: impl Into<Value>) -> Self {
        Self {
            trigger: trigger.into(),
        }
    }
}

impl Operation for FailOn {
    fn schema(&self) -> Schema {
        Schema::new().input("input", "value to check").output("out", "copied value")
    }

    fn run(&mut self, io: &mut OpIo) -> Result<(), OpError> {
        let value = io.input("input")?.clone();
        if value == self.trigger {
            return Err(OpError::failed(format!("refusing {}", value)));
        }
        io.set_output("out", value)
    }
}

/// Panics inside its entry point.
pub struct Explode;

impl Operation for Explode {
    fn schema(&self) -> Schema {
        Schema::new().output("out", "never written")
    }

    fn run(&mut self, _io: &mut OpIo) -> Result<(), OpError> {
        panic!("explode operation always panics");
    }
}

/// Sleeps, then copies `input` to `out`.
pub struct Nap {
    millis: u64,
}

impl Nap {
    pub fn new(millis: u64) -> Self {
        Self { millis }
    }
}

impl Operation for Nap {
    fn schema(&self) -> Schema {
        Schema::new()
            .input("input", "any value")
            .output("out", "the same value")
    }

    fn run(&mut self, io: &mut OpIo) -> Result<(), OpError> {
        std::thread::sleep(std::time::Duration::from_millis(self.millis));
        let value = io.input("input")?.clone();
        io.set_output("out", value)
    }
}

/// Runs one pass of the workflow on input `workflow`, failing with the
/// first error of that pass.
pub struct RunNested;

impl Operation for RunNested {
    fn schema(&self) -> Schema {
        Schema::new()
            .required_input("workflow", "workflow to run")
            .output("summary", "summary of the nested pass")
    }

    fn run(&mut self, io: &mut OpIo) -> Result<(), OpError> {
        let workflow = io.input_workflow("workflow")?;
        let report = io.engine().execute_handle(&workflow)?;
        if let Some((_, err)) = report.failures().first() {
            return Err(OpError::Engine((*err).clone()));
        }
        io.set_output("summary", report.summary())
    }
}
