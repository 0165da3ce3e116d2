//! Shared test doubles for step runner tests

#![allow(dead_code)]

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use provisioner_core::codec::{Codec, CodecError, JsonCodec};
use provisioner_core::models::{Instance, Task};
use provisioner_core::queue::{QueueError, TaskQueue};
use provisioner_core::store::{InstanceStore, MemoryInstanceStore, StoreError};
use provisioner_core::workflow::{
    DoubleFaultHandler, LinearProvisioner, Module, ModuleRegistry, Provisioner, Step, StepRunner,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

pub const SERVICE_ID: &str = "svcA";

#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq)]
pub struct VmContext {
    pub resource_id: Option<String>,
    pub completed_steps: Vec<String>,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq)]
pub struct VmParameters {
    pub location: String,
}

/// What a scripted step does when executed
#[derive(Debug, Clone)]
pub enum Behavior {
    Succeed,
    Fail(&'static str),
    WaitForCancel,
    FailIfCancelled,
}

/// Observations shared by every step of a module
#[derive(Clone, Default)]
pub struct Probe {
    executed: Arc<Mutex<Vec<String>>>,
    scopes: Arc<Mutex<Vec<CancellationToken>>>,
}

impl Probe {
    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }

    pub fn scopes(&self) -> Vec<CancellationToken> {
        self.scopes.lock().unwrap().clone()
    }
}

struct ScriptedStep {
    name: &'static str,
    behavior: Behavior,
    probe: Probe,
}

#[async_trait]
impl Step<VmContext, VmParameters> for ScriptedStep {
    fn name(&self) -> &str {
        self.name
    }

    async fn execute(
        &self,
        scope: &CancellationToken,
        mut context: VmContext,
        parameters: &VmParameters,
    ) -> Result<VmContext> {
        self.probe
            .executed
            .lock()
            .unwrap()
            .push(self.name.to_string());
        self.probe.scopes.lock().unwrap().push(scope.clone());

        match &self.behavior {
            Behavior::Succeed => {}
            Behavior::Fail(msg) => return Err(anyhow!("{}", msg)),
            Behavior::WaitForCancel => {
                scope.cancelled().await;
                bail!("cancelled");
            }
            Behavior::FailIfCancelled => {
                if scope.is_cancelled() {
                    bail!("scope already cancelled");
                }
            }
        }

        context
            .resource_id
            .get_or_insert_with(|| format!("vm-{}", parameters.location));
        context.completed_steps.push(self.name.to_string());
        Ok(context)
    }
}

/// Module whose provisioner runs scripted steps in order
pub struct VmModule {
    pub service_id: &'static str,
    pub steps: Vec<(&'static str, Behavior)>,
    pub provisioner_error: Option<&'static str>,
    pub probe: Probe,
}

impl VmModule {
    pub fn new(steps: Vec<(&'static str, Behavior)>) -> Self {
        Self {
            service_id: SERVICE_ID,
            steps,
            provisioner_error: None,
            probe: Probe::default(),
        }
    }

    /// createResource -> waitForReady
    pub fn two_step() -> Self {
        Self::new(vec![
            ("createResource", Behavior::Succeed),
            ("waitForReady", Behavior::Succeed),
        ])
    }
}

impl Module for VmModule {
    type Context = VmContext;
    type Parameters = VmParameters;

    fn service_id(&self) -> &str {
        self.service_id
    }

    fn new_provisioning_context(&self) -> VmContext {
        VmContext::default()
    }

    fn new_provisioning_parameters(&self) -> VmParameters {
        VmParameters::default()
    }

    fn provisioner(&self) -> Result<Arc<dyn Provisioner<VmContext, VmParameters>>> {
        if let Some(msg) = self.provisioner_error {
            bail!("{}", msg);
        }
        let steps = self
            .steps
            .iter()
            .map(|(name, behavior)| {
                Arc::new(ScriptedStep {
                    name: *name,
                    behavior: behavior.clone(),
                    probe: self.probe.clone(),
                }) as Arc<dyn Step<VmContext, VmParameters>>
            })
            .collect();
        Ok(Arc::new(LinearProvisioner::new(steps)?))
    }
}

/// Memory store that counts calls and injects failures
#[derive(Default)]
pub struct RecordingStore {
    pub inner: MemoryInstanceStore,
    pub reads: AtomicUsize,
    pub writes: AtomicUsize,
    pub fail_reads: AtomicBool,
    /// Number of upcoming writes to reject
    pub failing_writes: AtomicUsize,
    pub fail_all_writes: AtomicBool,
}

impl RecordingStore {
    pub async fn seed(&self, instance: &Instance) {
        self.inner.write(instance).await.unwrap();
    }

    pub async fn load(&self, instance_id: &str) -> Instance {
        self.inner.get(instance_id).await.unwrap().unwrap()
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InstanceStore for RecordingStore {
    async fn get(&self, instance_id: &str) -> Result<Option<Instance>, StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("connection refused".to_string()));
        }
        self.inner.get(instance_id).await
    }

    async fn write(&self, instance: &Instance) -> Result<(), StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.fail_all_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("disk full".to_string()));
        }
        let remaining = self.failing_writes.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_writes.store(remaining - 1, Ordering::SeqCst);
            return Err(StoreError::Backend("write conflict".to_string()));
        }
        self.inner.write(instance).await
    }
}

/// Queue that records submissions instead of running them
#[derive(Default)]
pub struct RecordingQueue {
    pub submitted: Mutex<Vec<Task>>,
    pub fail: AtomicBool,
}

impl RecordingQueue {
    pub fn submitted(&self) -> Vec<Task> {
        self.submitted.lock().unwrap().clone()
    }
}

#[async_trait]
impl TaskQueue for RecordingQueue {
    async fn submit(&self, task: Task) -> Result<(), QueueError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(QueueError::Backend("broker unreachable".to_string()));
        }
        self.submitted.lock().unwrap().push(task);
        Ok(())
    }
}

/// Codec whose encoder is broken
pub struct EncodeFailingCodec;

impl Codec for EncodeFailingCodec {
    fn encode(&self, _value: &serde_json::Value) -> Result<Vec<u8>, CodecError> {
        Err(CodecError::Malformed("encoder offline".to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> Result<serde_json::Value, CodecError> {
        JsonCodec.decode(bytes)
    }
}

pub struct PanicOnDoubleFault;

impl DoubleFaultHandler for PanicOnDoubleFault {
    fn escalate(&self, instance: &Instance, write_error: &StoreError) -> ! {
        panic!(
            "double fault for instance {}: {}",
            instance.instance_id, write_error
        )
    }
}

pub struct Harness {
    pub store: Arc<RecordingStore>,
    pub queue: Arc<RecordingQueue>,
    pub probe: Probe,
    pub runner: StepRunner,
}

impl Harness {
    pub fn new(module: VmModule) -> Self {
        Self::with_codec(module, Arc::new(JsonCodec))
    }

    pub fn with_codec(module: VmModule, codec: Arc<dyn Codec>) -> Self {
        let store = Arc::new(RecordingStore::default());
        let queue = Arc::new(RecordingQueue::default());
        let probe = module.probe.clone();
        let registry = Arc::new(ModuleRegistry::new());
        registry.register(module);

        let runner = StepRunner::new(
            store.clone(),
            queue.clone(),
            registry,
            codec,
            Arc::new(PanicOnDoubleFault),
        );

        Self {
            store,
            queue,
            probe,
            runner,
        }
    }

    /// Seed instance `instance_id` of `svcA` with parameters located in eastus
    pub async fn seed(&self, instance_id: &str) -> Instance {
        let mut instance = Instance::new(instance_id, SERVICE_ID);
        instance
            .set_provisioning_parameters(
                &VmParameters {
                    location: "eastus".to_string(),
                },
                &JsonCodec,
            )
            .unwrap();
        self.store.seed(&instance).await;
        instance
    }

    pub fn context_of(&self, instance: &Instance) -> VmContext {
        instance
            .provisioning_context(&JsonCodec, VmContext::default)
            .unwrap()
    }
}

pub fn args(step_name: &str, instance_id: &str) -> HashMap<String, String> {
    Task::provision_step(step_name, instance_id).args
}
