//! Provisioning step execution

use crate::codec::Codec;
use crate::models::{Instance, InstanceStatus, Task, INSTANCE_ID_ARG, STEP_NAME_ARG};
use crate::queue::{TaskHandler, TaskQueue};
use crate::store::InstanceStore;
use crate::workflow::errors::{ProvisionError, StepFault};
use crate::workflow::failure::{DoubleFaultHandler, FailureReporter};
use crate::workflow::module::{Module, ModuleRegistry, Step};
use anyhow::{anyhow, Context};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Executes one `provisionStep` task at a time against the instance store.
///
/// Each invocation loads the instance, runs the named step, persists the new
/// context and then either enqueues the successor step or marks the instance
/// provisioned. Persisting always happens before the successor is enqueued,
/// so a crash in between stalls the chain rather than repeating a step.
///
/// Invocations are not idempotent: a redelivered task re-runs its step with
/// whatever side effects the step has.
pub struct StepRunner {
    store: Arc<dyn InstanceStore>,
    queue: Arc<dyn TaskQueue>,
    modules: Arc<ModuleRegistry>,
    codec: Arc<dyn Codec>,
    reporter: FailureReporter,
    step_timeout: Option<Duration>,
}

impl StepRunner {
    pub fn new(
        store: Arc<dyn InstanceStore>,
        queue: Arc<dyn TaskQueue>,
        modules: Arc<ModuleRegistry>,
        codec: Arc<dyn Codec>,
        double_fault: Arc<dyn DoubleFaultHandler>,
    ) -> Self {
        let reporter = FailureReporter::new(store.clone(), double_fault);
        Self {
            store,
            queue,
            modules,
            codec,
            reporter,
            step_timeout: None,
        }
    }

    /// Bound every step execution; expiry cancels the step's scope
    pub fn with_step_timeout(mut self, step_timeout: Option<Duration>) -> Self {
        self.step_timeout = step_timeout;
        self
    }

    /// Execute the step named in `args` for the instance named in `args`
    pub async fn run(
        &self,
        parent: &CancellationToken,
        args: &HashMap<String, String>,
    ) -> Result<(), ProvisionError> {
        let scope = parent.child_token();
        // Cancels the scope on every exit path, unwinding included
        let _release = scope.clone().drop_guard();

        let step_name = required_arg(args, STEP_NAME_ARG)?;
        let instance_id = required_arg(args, INSTANCE_ID_ARG)?;

        let mut instance = match self.store.get(instance_id).await {
            Ok(Some(instance)) => instance,
            Ok(None) => {
                return Err(self.reporter.report_lookup_failure(
                    instance_id,
                    step_name,
                    StepFault::InstanceNotFound,
                ))
            }
            Err(e) => {
                return Err(self.reporter.report_lookup_failure(
                    instance_id,
                    step_name,
                    StepFault::StoreRead(e),
                ))
            }
        };

        tracing::debug!(
            step = step_name,
            instance_id = %instance.instance_id,
            service_id = %instance.service_id,
            "executing provisioning step"
        );

        let Some(module) = self.modules.get(&instance.service_id) else {
            let fault = StepFault::ModuleNotFound(instance.service_id.clone());
            return Err(self
                .reporter
                .report_instance_failure(&mut instance, step_name, fault)
                .await);
        };

        match module
            .run_step(self, &mut instance, step_name, &scope)
            .await
        {
            Ok(()) => Ok(()),
            Err(fault) => Err(self
                .reporter
                .report_instance_failure(&mut instance, step_name, fault)
                .await),
        }
    }

    /// Typed half of [`StepRunner::run`], entered through the module registry
    pub(crate) async fn execute_step<M: Module>(
        &self,
        module: &M,
        instance: &mut Instance,
        step_name: &str,
        scope: &CancellationToken,
    ) -> Result<(), StepFault> {
        let codec = self.codec.as_ref();

        let context = instance
            .provisioning_context(codec, || module.new_provisioning_context())
            .map_err(StepFault::ContextDecode)?;
        let parameters = instance
            .provisioning_parameters(codec, || module.new_provisioning_parameters())
            .map_err(StepFault::ParamsDecode)?;

        let provisioner =
            module
                .provisioner()
                .map_err(|source| StepFault::ProvisionerUnavailable {
                    service_id: instance.service_id.clone(),
                    source,
                })?;

        let step = provisioner
            .get_step(step_name)
            .ok_or_else(|| StepFault::StepNotFound(step_name.to_string()))?;

        let updated = self
            .execute_bounded(step.as_ref(), scope, context, &parameters)
            .await
            .map_err(StepFault::StepExecution)?;

        instance
            .set_provisioning_context(&updated, codec)
            .map_err(StepFault::ContextEncode)?;

        match provisioner.next_step_name(step.name()) {
            Some(next_step) => {
                self.store
                    .write(instance)
                    .await
                    .map_err(StepFault::Persistence)?;

                let task = Task::provision_step(next_step.as_str(), instance.instance_id.as_str());
                if let Err(source) = self.queue.submit(task).await {
                    return Err(StepFault::Enqueue { next_step, source });
                }

                tracing::info!(
                    step = step_name,
                    next_step = %next_step,
                    instance_id = %instance.instance_id,
                    "enqueued next provisioning step"
                );
            }
            None => {
                instance.status = InstanceStatus::Provisioned;
                self.store
                    .write(instance)
                    .await
                    .map_err(StepFault::Persistence)?;

                tracing::info!(
                    step = step_name,
                    instance_id = %instance.instance_id,
                    "instance provisioned"
                );
            }
        }

        Ok(())
    }

    async fn execute_bounded<C, P>(
        &self,
        step: &dyn Step<C, P>,
        scope: &CancellationToken,
        context: C,
        parameters: &P,
    ) -> anyhow::Result<C>
    where
        C: Send + 'static,
        P: Send + Sync + 'static,
    {
        let Some(limit) = self.step_timeout else {
            return step.execute(scope, context, parameters).await;
        };

        match tokio::time::timeout(limit, step.execute(scope, context, parameters)).await {
            Ok(result) => result,
            Err(_) => {
                scope.cancel();
                Err(anyhow!("step timed out after {:?}", limit))
            }
        }
    }

    /// Persist a freshly created instance and enqueue the first step of its chain
    pub async fn start_provisioning(&self, instance: Instance) -> anyhow::Result<String> {
        if instance.status != InstanceStatus::Provisioning {
            return Err(anyhow!(
                "instance \"{}\" is {:?}, expected Provisioning",
                instance.instance_id,
                instance.status
            ));
        }

        let module = self.modules.get(&instance.service_id).ok_or_else(|| {
            anyhow!(
                "no module was found for handling service \"{}\"",
                instance.service_id
            )
        })?;

        let first_step = module
            .first_step_name()
            .with_context(|| {
                format!(
                    "error retrieving provisioner for service \"{}\"",
                    instance.service_id
                )
            })?
            .ok_or_else(|| {
                anyhow!(
                    "provisioner for service \"{}\" has no steps",
                    instance.service_id
                )
            })?;

        self.store
            .write(&instance)
            .await
            .context("Failed to persist new instance")?;

        self.queue
            .submit(Task::provision_step(
                first_step.as_str(),
                instance.instance_id.as_str(),
            ))
            .await
            .with_context(|| format!("Failed to enqueue first step \"{}\"", first_step))?;

        tracing::info!(
            instance_id = %instance.instance_id,
            service_id = %instance.service_id,
            step = %first_step,
            "provisioning started"
        );

        Ok(first_step)
    }
}

#[async_trait]
impl TaskHandler for StepRunner {
    async fn handle(
        &self,
        scope: &CancellationToken,
        args: &HashMap<String, String>,
    ) -> anyhow::Result<()> {
        self.run(scope, args).await?;
        Ok(())
    }
}

fn required_arg<'a>(
    args: &'a HashMap<String, String>,
    name: &'static str,
) -> Result<&'a str, ProvisionError> {
    match args.get(name) {
        Some(value) if !value.is_empty() => Ok(value.as_str()),
        _ => Err(ProvisionError::MissingArgument(name)),
    }
}
