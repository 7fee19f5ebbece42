// SPDX-License-Identifier: MIT OR Apache-2.0
//! `NodeShade` - headless host for shader node graphs
//!
//! Loads a graph document (or builds a demo graph from the declared shaders
//! and assets), runs it for a number of frames against in-memory
//! collaborators and logs each frame's evaluation report.
//!
//! ## Usage
//!
//! `nodeshade [config.ron]`
//!
//! Without a config file the defaults are used. `RUST_LOG` overrides the
//! configured log filter.

mod config;
mod host;

use config::HostConfig;
use host::Host;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

fn init_logging(default_filter: &str) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn main() {
    let config_path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = match &config_path {
        Some(path) => HostConfig::load(path),
        None => Ok(HostConfig::default()),
    };

    let default_filter = config
        .as_ref()
        .map_or_else(|_| HostConfig::default().log_filter, |c| c.log_filter.clone());
    init_logging(&default_filter);

    tracing::info!("Starting NodeShade v{}", env!("CARGO_PKG_VERSION"));

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            if let Some(path) = &config_path {
                tracing::error!("Failed to load {}: {e}", path.display());
            }
            std::process::exit(1);
        }
    };

    let mut host = match Host::new(config) {
        Ok(host) => host,
        Err(e) => {
            tracing::error!("Failed to set up the graph: {e}");
            std::process::exit(1);
        }
    };

    match host.run() {
        Ok(last) => tracing::info!(
            "Finished: {} UI nodes, last frame ready={:?}",
            host.editor().node_count(),
            last.and_then(|report| report.ready)
        ),
        Err(e) => {
            tracing::error!("Host failed: {e}");
            std::process::exit(1);
        }
    }
}
