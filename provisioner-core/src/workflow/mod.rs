//! Provisioning workflow execution

pub mod errors;
pub mod failure;
pub mod module;
pub mod runner;

pub use errors::*;
pub use failure::*;
pub use module::*;
pub use runner::*;
