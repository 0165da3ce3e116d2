//! Data models for the provisioner

pub mod configuration;
pub mod instance;
pub mod task;

pub use configuration::*;
pub use instance::*;
pub use task::*;
