#![doc = include_str!("../README.md")]

mod server;

use anyhow::Context;
use clap::Parser;
use server::{
    Generator,
    config::{CliArgs, ServerConfig},
    lifecycle::LifecycleController,
    service::{listener::serve, rollover::PersistOnRollover},
    startup::prepare,
    telemetry::init_telemetry,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = ServerConfig::try_from(args)?;

    let providers = init_telemetry(config.verbose, config.log_json)?;
    let result = run(config).await;
    if let Err(e) = &result {
        tracing::error!("Service exited with error: {e:#}");
    }
    providers.shutdown();
    result
}

async fn run(config: ServerConfig) -> anyhow::Result<()> {
    if cfg!(debug_assertions) {
        tracing::info!("Starting with config: {config:#?}");
    }

    let store = config.progress_store();
    let resume = prepare(&config, &store)?;

    let generator: Arc<Generator> = Arc::new(Generator::with_hook(
        resume.base,
        resume.counter,
        resume.increment,
        PersistOnRollover::new(store.clone()),
    ));

    let listener = TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;
    tracing::info!(
        "Starting transaction ID service on {}",
        config.listen_addr
    );

    let shutdown = CancellationToken::new();
    let controller = LifecycleController::new(Arc::clone(&generator), store, shutdown.clone());
    let lifecycle = tokio::spawn(controller.clone().run());

    if let Err(e) = serve(listener, generator, shutdown, config.shutdown_timeout).await {
        // The accept loop is gone; still leave an exact resume point behind.
        if let Err(persist) = controller.stop_and_persist() {
            tracing::error!("Shutdown after accept failure was not persisted: {persist:#}");
        }
        return Err(e);
    }

    match lifecycle.await.context("lifecycle task panicked")? {
        Ok(Some(snapshot)) => tracing::info!(%snapshot, "Service shut down successfully"),
        Ok(None) => tracing::info!("Service shut down successfully"),
        Err(e) => return Err(e),
    }
    Ok(())
}
