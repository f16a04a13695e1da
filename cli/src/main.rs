//! lsp-rocks - bridge between an editor and its projects' language servers.
//!
//! # Architecture
//!
//! ```text
//! editor <-stdio JSON-RPC-> rpc::serve -> LspRocks -> LanguageClient* <-stdio-> servers
//!                 ^                           |
//!                 +---- editor::EditorBridge <+
//! ```
//!
//! The process lives as long as the editor keeps its end of stdin open. On
//! EOF or Ctrl-C every language server is shut down before exiting.

mod editor;
mod logging;
mod rpc;

use std::future;
use std::panic;
use std::sync::Arc;

use anyhow::Result;
use rocks_config::RocksConfig;
use rocks_engine::descriptors::ConfigProvider;
use rocks_engine::{EngineOptions, LspRocks, PathLookup, ServerRegistry};
use rocks_lsp::ProcessLauncher;

use crate::editor::EditorBridge;
use crate::logging::Logging;
use crate::rpc::EditorEndpoint;

fn install_panic_hook() {
    let previous = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        tracing::error!("panic: {info}");
        previous(info);
    }));
}

/// Load the config before logging exists; report problems once it does.
fn load_config() -> (RocksConfig, Option<String>) {
    let Some(path) = RocksConfig::path() else {
        return (RocksConfig::default(), None);
    };
    match RocksConfig::load_from(&path) {
        Ok(config) => (config.unwrap_or_default(), None),
        Err(e) => (RocksConfig::default(), Some(e.to_string())),
    }
}

/// Resolves on Ctrl-C; never when the signal cannot be watched.
async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Cannot listen for Ctrl-C: {e}");
        future::pending::<()>().await;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let (config, config_warning) = load_config();
    let logging = Logging::init(&config.log);
    install_panic_hook();
    if let Some(warning) = config_warning {
        tracing::warn!("{warning}; using defaults");
    }
    tracing::info!(version = env!("CARGO_PKG_VERSION"), pid = std::process::id(), "Starting");

    let registry = ServerRegistry::new(&ConfigProvider::new(&config), Arc::new(PathLookup));
    let (endpoint, writer) = EditorEndpoint::spawn(tokio::io::stdout());
    let editor = Arc::new(EditorBridge::new(Arc::clone(&endpoint)));
    let rocks = LspRocks::new(
        registry,
        editor,
        Arc::new(ProcessLauncher),
        Arc::new(logging),
        EngineOptions::from_config(&config),
    );

    tokio::select! {
        () = rpc::serve(tokio::io::stdin(), &endpoint, &rocks) => {}
        () = interrupted() => tracing::info!("Interrupted"),
    }

    rocks.shutdown().await;
    writer.abort();
    tracing::info!("Exiting");
    Ok(())
}
