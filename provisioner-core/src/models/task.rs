//! Task queue data model

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Task type executing one provisioning step
pub const PROVISION_STEP_TASK: &str = "provisionStep";
/// Argument naming the step to execute
pub const STEP_NAME_ARG: &str = "stepName";
/// Argument naming the instance to execute against
pub const INSTANCE_ID_ARG: &str = "instanceID";

/// Named unit of asynchronous work with string arguments
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Task {
    /// Handler selector
    pub task_type: String,
    /// Handler arguments
    pub args: HashMap<String, String>,
}

impl Task {
    pub fn new(task_type: impl Into<String>, args: HashMap<String, String>) -> Self {
        Self {
            task_type: task_type.into(),
            args,
        }
    }

    /// Build a `provisionStep` task for the given step and instance
    pub fn provision_step(step_name: impl Into<String>, instance_id: impl Into<String>) -> Self {
        let mut args = HashMap::new();
        args.insert(STEP_NAME_ARG.to_string(), step_name.into());
        args.insert(INSTANCE_ID_ARG.to_string(), instance_id.into());
        Self::new(PROVISION_STEP_TASK, args)
    }

    pub fn arg(&self, name: &str) -> Option<&str> {
        self.args.get(name).map(String::as_str)
    }
}
