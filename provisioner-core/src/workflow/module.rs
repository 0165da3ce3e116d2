//! Service modules, provisioners and steps

use crate::models::Instance;
use crate::workflow::errors::StepFault;
use crate::workflow::runner::StepRunner;
use anyhow::{bail, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// A single named unit of provisioning logic
#[async_trait]
pub trait Step<C, P>: Send + Sync
where
    C: Send + 'static,
    P: Send + Sync + 'static,
{
    /// Name, unique within the owning provisioner
    fn name(&self) -> &str;

    /// Transform the provisioning context.
    ///
    /// `scope` is cancelled when the invocation ends or times out; long
    /// running work should watch it.
    async fn execute(&self, scope: &CancellationToken, context: C, parameters: &P) -> Result<C>;
}

/// Holder of a service's step graph
pub trait Provisioner<C, P>: Send + Sync
where
    C: Send + 'static,
    P: Send + Sync + 'static,
{
    /// Entry point of the chain
    fn first_step_name(&self) -> Option<String>;

    fn get_step(&self, name: &str) -> Option<Arc<dyn Step<C, P>>>;

    /// Successor of `current`, `None` when the chain ends there
    fn next_step_name(&self, current: &str) -> Option<String>;
}

/// Provisioner running its steps in declaration order
pub struct LinearProvisioner<C, P> {
    steps: Vec<Arc<dyn Step<C, P>>>,
}

impl<C, P> LinearProvisioner<C, P>
where
    C: Send + 'static,
    P: Send + Sync + 'static,
{
    /// Build from an ordered list of steps; names must be unique
    pub fn new(steps: Vec<Arc<dyn Step<C, P>>>) -> Result<Self> {
        let mut seen = HashSet::new();
        for step in &steps {
            if !seen.insert(step.name().to_string()) {
                bail!("duplicate step name \"{}\"", step.name());
            }
        }
        Ok(Self { steps })
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.name() == name)
    }
}

impl<C, P> Provisioner<C, P> for LinearProvisioner<C, P>
where
    C: Send + 'static,
    P: Send + Sync + 'static,
{
    fn first_step_name(&self) -> Option<String> {
        self.steps.first().map(|s| s.name().to_string())
    }

    fn get_step(&self, name: &str) -> Option<Arc<dyn Step<C, P>>> {
        self.position(name).map(|i| self.steps[i].clone())
    }

    fn next_step_name(&self, current: &str) -> Option<String> {
        let index = self.position(current)?;
        self.steps.get(index + 1).map(|s| s.name().to_string())
    }
}

/// Per-service bundle of state schemas and a provisioner
pub trait Module: Send + Sync + 'static {
    type Context: Serialize + DeserializeOwned + Send + Sync + 'static;
    type Parameters: Serialize + DeserializeOwned + Send + Sync + 'static;

    /// Service type this module handles
    fn service_id(&self) -> &str;

    /// Context for an instance that has not run any step yet
    fn new_provisioning_context(&self) -> Self::Context;

    /// Parameters for an instance created without any
    fn new_provisioning_parameters(&self) -> Self::Parameters;

    fn provisioner(&self) -> Result<Arc<dyn Provisioner<Self::Context, Self::Parameters>>>;
}

/// Object-safe view of a [`Module`] stored in the registry
#[async_trait]
pub trait RegisteredModule: Send + Sync {
    fn service_id(&self) -> &str;

    fn first_step_name(&self) -> Result<Option<String>>;

    /// Execute one step against `instance` using the module's typed state
    async fn run_step(
        &self,
        runner: &StepRunner,
        instance: &mut Instance,
        step_name: &str,
        scope: &CancellationToken,
    ) -> Result<(), StepFault>;
}

#[async_trait]
impl<M: Module> RegisteredModule for M {
    fn service_id(&self) -> &str {
        Module::service_id(self)
    }

    fn first_step_name(&self) -> Result<Option<String>> {
        Ok(self.provisioner()?.first_step_name())
    }

    async fn run_step(
        &self,
        runner: &StepRunner,
        instance: &mut Instance,
        step_name: &str,
        scope: &CancellationToken,
    ) -> Result<(), StepFault> {
        runner.execute_step(self, instance, step_name, scope).await
    }
}

/// Lookup table from service ID to module
#[derive(Default)]
pub struct ModuleRegistry {
    modules: DashMap<String, Arc<dyn RegisteredModule>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a module under its service ID, replacing any previous one
    pub fn register<M: Module>(&self, module: M) {
        let service_id = Module::service_id(&module).to_string();
        tracing::debug!(service_id = %service_id, "registered service module");
        self.modules.insert(service_id, Arc::new(module));
    }

    pub fn get(&self, service_id: &str) -> Option<Arc<dyn RegisteredModule>> {
        self.modules.get(service_id).map(|entry| entry.value().clone())
    }

    pub fn service_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.modules.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    struct Named(&'static str);

    #[async_trait]
    impl Step<u32, ()> for Named {
        fn name(&self) -> &str {
            self.0
        }

        async fn execute(&self, _scope: &CancellationToken, context: u32, _: &()) -> Result<u32> {
            Ok(context + 1)
        }
    }

    fn chain(names: &[&'static str]) -> Vec<Arc<dyn Step<u32, ()>>> {
        names
            .iter()
            .map(|n| Arc::new(Named(*n)) as Arc<dyn Step<u32, ()>>)
            .collect()
    }

    #[test]
    fn test_linear_successors() {
        let provisioner =
            LinearProvisioner::new(chain(&["createResource", "waitForReady", "tag"])).unwrap();

        assert_eq!(
            provisioner.first_step_name().as_deref(),
            Some("createResource")
        );
        assert_eq!(
            provisioner.next_step_name("createResource").as_deref(),
            Some("waitForReady")
        );
        assert_eq!(provisioner.next_step_name("waitForReady").as_deref(), Some("tag"));
        assert_eq!(provisioner.next_step_name("tag"), None);
        assert_eq!(provisioner.next_step_name("unknown"), None);
        assert!(provisioner.get_step("waitForReady").is_some());
        assert!(provisioner.get_step("unknown").is_none());
    }

    #[test]
    fn test_duplicate_step_names_rejected() {
        let result = LinearProvisioner::new(chain(&["a", "b", "a"]));
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_provisioner_has_no_first_step() {
        let provisioner = LinearProvisioner::new(chain(&[])).unwrap();
        assert_eq!(provisioner.first_step_name(), None);
    }

    #[derive(Default, Serialize, Deserialize)]
    struct Empty {}

    struct Svc(&'static str);

    impl Module for Svc {
        type Context = Empty;
        type Parameters = Empty;

        fn service_id(&self) -> &str {
            self.0
        }

        fn new_provisioning_context(&self) -> Empty {
            Empty::default()
        }

        fn new_provisioning_parameters(&self) -> Empty {
            Empty::default()
        }

        fn provisioner(&self) -> Result<Arc<dyn Provisioner<Empty, Empty>>> {
            bail!("not available")
        }
    }

    #[test]
    fn test_registry_lookup() {
        let registry = ModuleRegistry::new();
        registry.register(Svc("svcB"));
        registry.register(Svc("svcA"));

        assert_eq!(registry.service_ids(), vec!["svcA", "svcB"]);
        let module = registry.get("svcA").unwrap();
        assert_eq!(module.service_id(), "svcA");
        assert!(module.first_step_name().is_err());
        assert!(registry.get("svcC").is_none());
    }
}
