//! Single Operation Execution
//!
//! Handles one invocation of an operation's entry point:
//! - Calls `run` with the prepared inputs and outputs
//! - Converts returned errors into engine errors
//! - Contains panics so one operation cannot take down the pass

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

use log::{debug, error};

use crate::error::{EngineError, OpError};
use crate::workflow::{OpIo, Operation};

/// Executes a single operation.
///
/// # Arguments
///
/// * `name` - Operation tag, used in logs and errors
/// * `op` - The operation object
/// * `io` - Resolved inputs and empty declared outputs
///
/// # Returns
///
/// * `Ok(())` - The entry point returned normally; outputs are in `io`
/// * `Err(CyclicDependency)` - The entry point tried to re-enter a workflow
///   whose pass led to it
/// * `Err(OperationRuntime)` - The entry point returned any other error or panicked
pub fn run_operation(name: &str, op: &mut dyn Operation, io: &mut OpIo) -> Result<(), EngineError> {
    let started = Instant::now();
    debug!("Running operation '{}' with {} inputs", name, io.inputs().len());

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| op.run(io)));

    match outcome {
        Ok(Ok(())) => {
            debug!(
                "Operation '{}' finished in {} ms",
                name,
                started.elapsed().as_millis()
            );
            Ok(())
        }
        Ok(Err(OpError::Engine(err @ EngineError::CyclicDependency { .. }))) => Err(err),
        Ok(Err(err)) => Err(EngineError::OperationRuntime {
            operation: name.to_string(),
            message: err.to_string(),
        }),
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!("Operation '{}' panicked: {}", name, message);
            Err(EngineError::OperationRuntime {
                operation: name.to_string(),
                message: format!("panicked: {}", message),
            })
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        text.to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
