//! Logging service

use crate::models::LogLevel;
use tracing_subscriber::EnvFilter;

fn level_filter(level: &LogLevel) -> &'static str {
    match level {
        LogLevel::Error => "provisioner_core=error,provisioner=error",
        LogLevel::Warn => "provisioner_core=warn,provisioner=warn",
        LogLevel::Info => "provisioner_core=info,provisioner=info",
        LogLevel::Debug => "provisioner_core=debug,provisioner=debug",
        LogLevel::Trace => "provisioner_core=trace,provisioner=trace",
    }
}

/// Initialize logging with the specified level; `RUST_LOG` takes precedence when set
pub fn init_logging(level: LogLevel) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level_filter(&level)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()?;

    Ok(())
}
