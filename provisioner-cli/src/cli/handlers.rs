//! Command handlers

use crate::cli::demo::DemoModule;
use anyhow::{anyhow, Context, Result};
use provisioner_core::codec::JsonCodec;
use provisioner_core::models::{Configuration, Instance, PROVISION_STEP_TASK};
use provisioner_core::queue::AsyncEngine;
use provisioner_core::services::init_logging;
use provisioner_core::store::{InstanceStore, JsonFileInstanceStore};
use provisioner_core::workflow::{ModuleRegistry, StepRunner, TerminateProcess};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Load and validate configuration, then initialize logging
pub fn load_configuration(path: Option<PathBuf>) -> Result<Configuration> {
    let path = match path {
        Some(path) => path,
        None => Configuration::default_config_path()?,
    };

    let config = Configuration::load_from_file(&path).context("Failed to load configuration")?;

    if let Err(errors) = config.validate() {
        return Err(anyhow!("Invalid configuration: {}", errors.join("; ")));
    }

    init_logging(config.log_level).map_err(|e| anyhow!(e.to_string()))?;

    Ok(config)
}

fn build_registry() -> Arc<ModuleRegistry> {
    let registry = Arc::new(ModuleRegistry::new());
    registry.register(DemoModule);
    registry
}

fn open_store(config: &Configuration) -> Result<Arc<JsonFileInstanceStore>> {
    let store = JsonFileInstanceStore::new(&config.store_path).with_context(|| {
        format!(
            "Failed to open instance store {}",
            config.store_path.display()
        )
    })?;
    Ok(Arc::new(store))
}

/// Handle provision command
pub async fn handle_provision(
    config: Configuration,
    instance_id: Option<String>,
    service: String,
    params: Option<String>,
    json: bool,
) -> Result<()> {
    let store = open_store(&config)?;
    let engine = Arc::new(AsyncEngine::new());
    let runner = Arc::new(
        StepRunner::new(
            store.clone(),
            Arc::new(engine.submitter()),
            build_registry(),
            Arc::new(JsonCodec),
            Arc::new(TerminateProcess::new(config.double_fault_exit_code)),
        )
        .with_step_timeout(config.step_timeout()),
    );
    engine.register_handler(PROVISION_STEP_TASK, runner.clone());

    let instance_id = instance_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    if store.get(&instance_id).await?.is_some() {
        return Err(anyhow!("Instance '{}' already exists", instance_id));
    }

    let mut instance = Instance::new(instance_id.clone(), service);
    if let Some(params) = params {
        let value: serde_json::Value =
            serde_json::from_str(&params).context("Failed to parse --params as JSON")?;
        instance
            .set_provisioning_parameters(&value, &JsonCodec)
            .context("Failed to encode provisioning parameters")?;
    }

    let first_step = runner
        .start_provisioning(instance)
        .await
        .context("Failed to start provisioning")?;
    if !json {
        println!("Provisioning '{}' starting at step '{}'", instance_id, first_step);
    }

    let shutdown = CancellationToken::new();
    let worker = {
        let engine = engine.clone();
        let shutdown = shutdown.clone();
        let worker_count = config.worker_count;
        tokio::spawn(async move { engine.run(worker_count, shutdown).await })
    };

    tokio::select! {
        _ = engine.wait_idle() => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!(instance_id = %instance_id, "interrupted, cancelling in-flight steps");
        }
    }
    shutdown.cancel();
    worker.await.context("Task engine panicked")??;

    print_instance(store.as_ref(), &instance_id, json).await
}

/// Handle status command
pub async fn handle_status(config: Configuration, instance_id: String, json: bool) -> Result<()> {
    let store = open_store(&config)?;
    print_instance(store.as_ref(), &instance_id, json).await
}

/// Handle services command
pub fn handle_services() {
    for service_id in build_registry().service_ids() {
        println!("{}", service_id);
    }
}

async fn print_instance(store: &dyn InstanceStore, instance_id: &str, json: bool) -> Result<()> {
    let instance = store
        .get(instance_id)
        .await?
        .ok_or_else(|| anyhow!("Instance '{}' not found", instance_id))?;

    if json {
        let context: serde_json::Value = instance
            .provisioning_context(&JsonCodec, || serde_json::Value::Null)
            .context("Failed to decode provisioning context")?;
        let output = serde_json::json!({
            "instance_id": instance.instance_id,
            "service_id": instance.service_id,
            "status": instance.status,
            "status_reason": instance.status_reason,
            "provisioning_context": context,
            "created_at": instance.created_at,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("Instance: {}", instance.instance_id);
        println!("   Service: {}", instance.service_id);
        println!("   Status: {:?}", instance.status);
        if !instance.status_reason.is_empty() {
            println!("   Reason: {}", instance.status_reason);
        }
    }

    Ok(())
}
