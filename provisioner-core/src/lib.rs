//! # Provisioner Core Library
//!
//! Step execution core of the asynchronous provisioning workflow: instance
//! models, state codec, module registry, instance stores, task queue and the
//! step runner that moves an instance through its provisioning chain.

pub mod codec;
pub mod models;
pub mod queue;
pub mod services;
pub mod store;
pub mod workflow;
