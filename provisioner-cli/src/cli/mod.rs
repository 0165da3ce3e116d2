//! CLI command handling

pub mod demo;
pub mod handlers;
