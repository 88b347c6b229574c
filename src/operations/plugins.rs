//! Built-in plugin types.

use indexmap::IndexMap;

use crate::environment::Plugin;
use crate::error::OpError;
use crate::workflow::{Schema, Value};

/// Holds the value it was started with and serves it as output `value`.
#[derive(Debug, Default)]
pub struct StaticValue {
    value: Option<Value>,
}

impl StaticValue {
    pub fn boxed() -> Box<dyn Plugin> {
        Box::new(Self::default())
    }
}

impl Plugin for StaticValue {
    fn schema(&self) -> Schema {
        Schema::new()
            .with_description("Serves a fixed value while running.")
            .input("value", "value to serve")
            .output("value", "the served value")
    }

    fn start(&mut self, inputs: &IndexMap<String, Value>) -> Result<(), OpError> {
        self.value = Some(inputs.get("value").cloned().unwrap_or_default());
        Ok(())
    }

    fn stop(&mut self) {
        self.value = None;
    }

    fn output(&self, name: &str) -> Option<Value> {
        match name {
            "value" => self.value.clone(),
            _ => None,
        }
    }
}
