//! Failure reporting for provisioning steps

use crate::models::{Instance, InstanceStatus};
use crate::store::{InstanceStore, StoreError};
use crate::workflow::errors::{ProvisionError, StepFault};
use std::sync::Arc;

/// Escalation policy for a failure that could not be recorded.
///
/// Returning an ordinary error here would let the caller believe the failure
/// was persisted, so implementations must not return.
pub trait DoubleFaultHandler: Send + Sync {
    fn escalate(&self, instance: &Instance, write_error: &StoreError) -> !;
}

/// Logs the double fault and terminates the process
#[derive(Debug, Clone, Copy)]
pub struct TerminateProcess {
    exit_code: i32,
}

impl TerminateProcess {
    pub fn new(exit_code: i32) -> Self {
        Self { exit_code }
    }
}

impl DoubleFaultHandler for TerminateProcess {
    fn escalate(&self, instance: &Instance, write_error: &StoreError) -> ! {
        tracing::error!(
            instance_id = %instance.instance_id,
            status = ?instance.status,
            status_reason = %instance.status_reason,
            error = %write_error,
            "error persisting instance with updated status"
        );
        std::process::exit(self.exit_code)
    }
}

/// Converts step faults into recorded instance state and caller-facing errors
pub struct FailureReporter {
    store: Arc<dyn InstanceStore>,
    double_fault: Arc<dyn DoubleFaultHandler>,
}

impl FailureReporter {
    pub fn new(store: Arc<dyn InstanceStore>, double_fault: Arc<dyn DoubleFaultHandler>) -> Self {
        Self {
            store,
            double_fault,
        }
    }

    /// Mark a loaded instance as failed and persist the reason.
    ///
    /// A failed write escalates through the [`DoubleFaultHandler`] and never
    /// returns.
    pub async fn report_instance_failure(
        &self,
        instance: &mut Instance,
        step_name: &str,
        fault: StepFault,
    ) -> ProvisionError {
        let error = ProvisionError::StepFailed {
            step_name: step_name.to_string(),
            instance_id: instance.instance_id.clone(),
            recorded: true,
            fault,
        };

        instance.status = InstanceStatus::ProvisioningFailed;
        instance.status_reason = error.to_string();

        tracing::warn!(
            step = step_name,
            instance_id = %instance.instance_id,
            kind = ?error.kind(),
            reason = %instance.status_reason,
            "provisioning step failed"
        );

        if let Err(write_error) = self.store.write(instance).await {
            self.double_fault.escalate(instance, &write_error);
        }

        error
    }

    /// Build the error for a fault raised before the instance could be loaded
    pub fn report_lookup_failure(
        &self,
        instance_id: &str,
        step_name: &str,
        fault: StepFault,
    ) -> ProvisionError {
        let error = ProvisionError::StepFailed {
            step_name: step_name.to_string(),
            instance_id: instance_id.to_string(),
            recorded: false,
            fault,
        };

        tracing::warn!(
            step = step_name,
            instance_id = instance_id,
            kind = ?error.kind(),
            "provisioning step failed before instance was loaded"
        );

        error
    }
}
