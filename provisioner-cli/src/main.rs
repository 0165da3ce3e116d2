mod cli;

use anyhow::Result;
use clap::{Parser, Subcommand};
use cli::handlers;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "provisioner")]
#[command(version)]
#[command(about = "Drive service instances through their provisioning steps")]
struct Cli {
    /// Path to configuration file (default: <config dir>/provisioner/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an instance and run its provisioning chain to completion
    ///
    /// Examples:
    ///   provisioner provision --service demo --params '{"name": "web"}'
    ///   provisioner provision my-instance --service demo --params '{"name": "web", "fail_at": "configure"}'
    Provision {
        /// Instance ID (a random UUID when omitted)
        instance_id: Option<String>,

        /// Service type handling the instance
        #[arg(short, long, default_value = "demo")]
        service: String,

        /// Provisioning parameters as a JSON object
        #[arg(short, long)]
        params: Option<String>,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Show a stored instance
    Status {
        /// Instance ID
        instance_id: String,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// List registered service types
    Services,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = handlers::load_configuration(cli.config)?;

    match cli.command {
        Commands::Provision {
            instance_id,
            service,
            params,
            json,
        } => {
            handlers::handle_provision(config, instance_id, service, params, json).await?;
        }
        Commands::Status { instance_id, json } => {
            handlers::handle_status(config, instance_id, json).await?;
        }
        Commands::Services => {
            handlers::handle_services();
        }
    }

    Ok(())
}
