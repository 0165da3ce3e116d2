//! Demo service module
//!
//! Simulates a three step provisioning chain (`allocate` -> `configure` ->
//! `verify`) so the engine can be exercised without a cloud backend.

use anyhow::{bail, Result};
use async_trait::async_trait;
use provisioner_core::workflow::{LinearProvisioner, Module, Provisioner, Step};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const DEMO_SERVICE_ID: &str = "demo";

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct DemoContext {
    pub resource_id: Option<String>,
    pub endpoint: Option<String>,
    #[serde(default)]
    pub verified: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DemoParameters {
    #[serde(default = "default_name")]
    pub name: String,
    /// Step that should fail, for exercising failure handling
    #[serde(default)]
    pub fail_at: Option<String>,
    #[serde(default = "default_latency_ms")]
    pub latency_ms: u64,
}

fn default_name() -> String {
    "demo-resource".to_string()
}

fn default_latency_ms() -> u64 {
    200
}

impl Default for DemoParameters {
    fn default() -> Self {
        Self {
            name: default_name(),
            fail_at: None,
            latency_ms: default_latency_ms(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum DemoAction {
    Allocate,
    Configure,
    Verify,
}

struct DemoStep {
    name: &'static str,
    action: DemoAction,
}

impl DemoStep {
    /// Pretend to call out to a backend, giving up when the scope is cancelled
    async fn simulate_call(&self, scope: &CancellationToken, latency: Duration) -> Result<()> {
        tokio::select! {
            _ = scope.cancelled() => bail!("step \"{}\" cancelled", self.name),
            _ = tokio::time::sleep(latency) => Ok(()),
        }
    }
}

#[async_trait]
impl Step<DemoContext, DemoParameters> for DemoStep {
    fn name(&self) -> &str {
        self.name
    }

    async fn execute(
        &self,
        scope: &CancellationToken,
        mut context: DemoContext,
        parameters: &DemoParameters,
    ) -> Result<DemoContext> {
        self.simulate_call(scope, Duration::from_millis(parameters.latency_ms))
            .await?;

        if parameters.fail_at.as_deref() == Some(self.name) {
            bail!("simulated failure in \"{}\"", self.name);
        }

        match self.action {
            DemoAction::Allocate => {
                context.resource_id = Some(format!("{}-{}", parameters.name, uuid::Uuid::new_v4()));
            }
            DemoAction::Configure => {
                let Some(resource_id) = &context.resource_id else {
                    bail!("no resource has been allocated");
                };
                context.endpoint = Some(format!("https://{}.demo.local", resource_id));
            }
            DemoAction::Verify => {
                if context.endpoint.is_none() {
                    bail!("resource has no endpoint to verify");
                }
                context.verified = true;
            }
        }

        tracing::debug!(step = self.name, ?context, "demo step completed");
        Ok(context)
    }
}

/// Module registering the demo service
pub struct DemoModule;

impl Module for DemoModule {
    type Context = DemoContext;
    type Parameters = DemoParameters;

    fn service_id(&self) -> &str {
        DEMO_SERVICE_ID
    }

    fn new_provisioning_context(&self) -> DemoContext {
        DemoContext::default()
    }

    fn new_provisioning_parameters(&self) -> DemoParameters {
        DemoParameters::default()
    }

    fn provisioner(&self) -> Result<Arc<dyn Provisioner<DemoContext, DemoParameters>>> {
        let steps: Vec<Arc<dyn Step<DemoContext, DemoParameters>>> = vec![
            Arc::new(DemoStep {
                name: "allocate",
                action: DemoAction::Allocate,
            }),
            Arc::new(DemoStep {
                name: "configure",
                action: DemoAction::Configure,
            }),
            Arc::new(DemoStep {
                name: "verify",
                action: DemoAction::Verify,
            }),
        ];
        Ok(Arc::new(LinearProvisioner::new(steps)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast() -> DemoParameters {
        DemoParameters {
            latency_ms: 1,
            ..DemoParameters::default()
        }
    }

    #[tokio::test]
    async fn test_demo_chain() {
        let provisioner = DemoModule.provisioner().unwrap();
        let scope = CancellationToken::new();
        let params = fast();

        let mut context = DemoContext::default();
        let mut step_name = provisioner.first_step_name();
        while let Some(name) = step_name {
            let step = provisioner.get_step(&name).unwrap();
            context = step.execute(&scope, context, &params).await.unwrap();
            step_name = provisioner.next_step_name(&name);
        }

        assert!(context.verified);
        assert!(context.endpoint.unwrap().ends_with(".demo.local"));
    }

    #[tokio::test]
    async fn test_demo_failure_injection() {
        let provisioner = DemoModule.provisioner().unwrap();
        let params = DemoParameters {
            fail_at: Some("allocate".to_string()),
            ..fast()
        };

        let step = provisioner.get_step("allocate").unwrap();
        let err = step
            .execute(&CancellationToken::new(), DemoContext::default(), &params)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("simulated failure"));
    }

    #[tokio::test]
    async fn test_demo_step_honours_cancellation() {
        let provisioner = DemoModule.provisioner().unwrap();
        let scope = CancellationToken::new();
        scope.cancel();

        let step = provisioner.get_step("allocate").unwrap();
        let params = DemoParameters {
            latency_ms: 60_000,
            ..DemoParameters::default()
        };
        let err = step
            .execute(&scope, DemoContext::default(), &params)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("cancelled"));
    }
}
