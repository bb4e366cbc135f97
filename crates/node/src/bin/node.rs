// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use clap::{Parser, Subcommand};
use cofhe_config::NodeConfig;
use cofhe_node::{run_cofhe_node, run_compute_node, run_setup_node};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "node", version, about = "CoFHE node launcher")]
struct Cli {
    #[command(subcommand)]
    role: Role,

    /// Optional YAML configuration file; COFHE_* environment variables
    /// override it.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Role {
    /// Trusted dealer: key generation, share distribution, Beaver triples,
    /// network registry.
    #[command(name = "setup_node")]
    Setup { self_host: String, self_port: u16 },

    /// Threshold decryption party.
    #[command(name = "cofhe_node")]
    Cofhe {
        self_host: String,
        self_port: u16,
        setup_host: String,
        setup_port: u16,
    },

    /// Homomorphic compute service.
    #[command(name = "compute_node")]
    Compute {
        self_host: String,
        self_port: u16,
        setup_host: String,
        setup_port: u16,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = NodeConfig::load(cli.config.as_deref())?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.server_threads)
        .enable_all()
        .build()?;

    runtime.block_on(async move {
        match cli.role {
            Role::Setup {
                self_host,
                self_port,
            } => run_setup_node(config, self_host, self_port).await,
            Role::Cofhe {
                self_host,
                self_port,
                setup_host,
                setup_port,
            } => run_cofhe_node(config, self_host, self_port, setup_host, setup_port).await,
            Role::Compute {
                self_host,
                self_port,
                setup_host,
                setup_port,
            } => run_compute_node(config, self_host, self_port, setup_host, setup_port).await,
        }
    })
}
