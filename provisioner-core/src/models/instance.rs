//! Provisioning instance data model

use crate::codec::{decode_value, encode_value, Codec, CodecError};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Lifecycle status of a service instance
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    /// Steps are still being executed
    Provisioning,
    /// The step chain ended successfully
    Provisioned,
    /// A fault was recorded while executing a step
    ProvisioningFailed,
    /// Teardown is in progress
    Deprovisioning,
    /// Teardown failed
    DeprovisioningFailed,
}

impl InstanceStatus {
    /// Whether no further provisioning step should reference the instance
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            InstanceStatus::Provisioned | InstanceStatus::ProvisioningFailed
        )
    }
}

/// Durable record of a resource under provisioning
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Instance {
    /// Stable unique identifier
    pub instance_id: String,
    /// Service type governing this instance
    pub service_id: String,
    /// Current lifecycle status
    pub status: InstanceStatus,
    /// Diagnostic set alongside a failure transition
    #[serde(default)]
    pub status_reason: String,
    /// Encoded provisioning context, evolved by each step
    #[serde(default)]
    pub encoded_provisioning_context: Vec<u8>,
    /// Encoded provisioning parameters, supplied at creation
    #[serde(default)]
    pub encoded_provisioning_parameters: Vec<u8>,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl Instance {
    /// Create a new instance in provisioning status with an empty context
    pub fn new(instance_id: impl Into<String>, service_id: impl Into<String>) -> Self {
        Self {
            instance_id: instance_id.into(),
            service_id: service_id.into(),
            status: InstanceStatus::Provisioning,
            status_reason: String::new(),
            encoded_provisioning_context: Vec::new(),
            encoded_provisioning_parameters: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Decode the provisioning context, falling back to `empty` when none was stored yet
    pub fn provisioning_context<T, F>(&self, codec: &dyn Codec, empty: F) -> Result<T, CodecError>
    where
        T: DeserializeOwned,
        F: FnOnce() -> T,
    {
        if self.encoded_provisioning_context.is_empty() {
            return Ok(empty());
        }
        decode_value(codec, &self.encoded_provisioning_context)
    }

    /// Encode and store a new provisioning context (in memory only)
    pub fn set_provisioning_context<T: Serialize>(
        &mut self,
        context: &T,
        codec: &dyn Codec,
    ) -> Result<(), CodecError> {
        self.encoded_provisioning_context = encode_value(codec, context)?;
        Ok(())
    }

    /// Decode the provisioning parameters, falling back to `empty` when none were supplied
    pub fn provisioning_parameters<T, F>(
        &self,
        codec: &dyn Codec,
        empty: F,
    ) -> Result<T, CodecError>
    where
        T: DeserializeOwned,
        F: FnOnce() -> T,
    {
        if self.encoded_provisioning_parameters.is_empty() {
            return Ok(empty());
        }
        decode_value(codec, &self.encoded_provisioning_parameters)
    }

    /// Encode and store provisioning parameters
    pub fn set_provisioning_parameters<T: Serialize>(
        &mut self,
        parameters: &T,
        codec: &dyn Codec,
    ) -> Result<(), CodecError> {
        self.encoded_provisioning_parameters = encode_value(codec, parameters)?;
        Ok(())
    }
}
