//! Provisioning fault taxonomy

use crate::codec::CodecError;
use crate::queue::QueueError;
use crate::store::StoreError;
use thiserror::Error;

/// Classification of a provisioning fault
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    MissingArgument,
    StoreRead,
    InstanceNotFound,
    ModuleNotFound,
    ContextDecode,
    ParamsDecode,
    ProvisionerUnavailable,
    StepNotFound,
    StepExecution,
    ContextEncode,
    Persistence,
    Enqueue,
}

/// A fault raised while executing one provisioning step.
///
/// The `Display` output is the detail appended to the failure message.
#[derive(Debug, Error)]
pub enum StepFault {
    #[error("error loading persisted instance: {0}")]
    StoreRead(#[source] StoreError),

    #[error("instance does not exist in the data store")]
    InstanceNotFound,

    #[error("no module was found for handling service \"{0}\"")]
    ModuleNotFound(String),

    #[error("error decoding provisioningContext from persisted instance: {0}")]
    ContextDecode(#[source] CodecError),

    #[error("error decoding provisioningParameters from persisted instance: {0}")]
    ParamsDecode(#[source] CodecError),

    #[error("error retrieving provisioner for service \"{service_id}\": {source:#}")]
    ProvisionerUnavailable {
        service_id: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("provisioner does not know how to process step \"{0}\"")]
    StepNotFound(String),

    #[error("error executing provisioning step: {0:#}")]
    StepExecution(#[source] anyhow::Error),

    #[error("error encoding modified provisioningContext: {0}")]
    ContextEncode(#[source] CodecError),

    #[error("error persisting instance: {0}")]
    Persistence(#[source] StoreError),

    #[error("error enqueing next step \"{next_step}\": {source}")]
    Enqueue {
        next_step: String,
        #[source]
        source: QueueError,
    },
}

impl StepFault {
    pub fn kind(&self) -> FaultKind {
        match self {
            StepFault::StoreRead(_) => FaultKind::StoreRead,
            StepFault::InstanceNotFound => FaultKind::InstanceNotFound,
            StepFault::ModuleNotFound(_) => FaultKind::ModuleNotFound,
            StepFault::ContextDecode(_) => FaultKind::ContextDecode,
            StepFault::ParamsDecode(_) => FaultKind::ParamsDecode,
            StepFault::ProvisionerUnavailable { .. } => FaultKind::ProvisionerUnavailable,
            StepFault::StepNotFound(_) => FaultKind::StepNotFound,
            StepFault::StepExecution(_) => FaultKind::StepExecution,
            StepFault::ContextEncode(_) => FaultKind::ContextEncode,
            StepFault::Persistence(_) => FaultKind::Persistence,
            StepFault::Enqueue { .. } => FaultKind::Enqueue,
        }
    }
}

/// Error returned to the task queue for one `provisionStep` invocation
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// The task was malformed; nothing was touched
    #[error("missing required argument \"{0}\"")]
    MissingArgument(&'static str),

    /// A step-level fault. When `recorded` is set the same text was
    /// persisted as the instance's status reason.
    #[error("error executing provisioning step \"{step_name}\" for instance \"{instance_id}\": {fault}")]
    StepFailed {
        step_name: String,
        instance_id: String,
        recorded: bool,
        #[source]
        fault: StepFault,
    },
}

impl ProvisionError {
    pub fn kind(&self) -> FaultKind {
        match self {
            ProvisionError::MissingArgument(_) => FaultKind::MissingArgument,
            ProvisionError::StepFailed { fault, .. } => fault.kind(),
        }
    }

    /// Malformed tasks will never succeed on redelivery
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ProvisionError::MissingArgument(_))
    }

    /// Whether the failure was durably recorded on the instance
    pub fn is_recorded(&self) -> bool {
        matches!(self, ProvisionError::StepFailed { recorded: true, .. })
    }
}
