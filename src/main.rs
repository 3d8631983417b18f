// src/main.rs

//! # udpt Main Entry Point
//!
//! Loads configuration, sets up logging, opens the variable store, registers
//! the engine's variables, starts the control surface and hands control to
//! the dispatcher until the process is terminated.

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use udpt::config::AppConfig;
use udpt::cycle::BroadcastCycle;
use udpt::dispatcher::{Engine, Handles};
use udpt::event;
use udpt::interfaces::SystemInterfaces;
use udpt::network::UdpBroadcaster;
use udpt::store::{ConfigStore, MemoryStore, Store};
use udpt::template::TemplateRenderer;
use udpt::timer::TimerManager;
use udpt::web;

/// Resolves when the process receives SIGINT or SIGTERM.
async fn termination() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::error!("Failed to listen for SIGTERM: {}", err);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C signal: {}", err);
        }
    }
}

/// The main entry point.
///
/// Any startup failure (store, render buffer, registration, initial timer)
/// ends the process with a non-zero status. Once the dispatcher runs, only a
/// termination signal ends it; an in-flight broadcast cycle is abandoned.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let app_config = match AppConfig::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Error loading configuration: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize tracing subscriber for logging with environment filter and max level.
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&app_config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_max_level(tracing::Level::TRACE)
        .with_writer(std::io::stderr) // Log to stderr
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("setting default tracing subscriber")?;

    tracing::info!("udpt starting with configuration: {:?}", app_config);

    let (events_tx, events_rx) = event::channel();
    let store = Arc::new(MemoryStore::open(events_tx.clone()).context("opening variable store")?);
    let shared: Arc<dyn Store> = store.clone();

    let cycle = BroadcastCycle::new(
        Box::new(TemplateRenderer::new(Arc::clone(&shared))),
        Box::new(SystemInterfaces),
        Box::new(UdpBroadcaster),
    )
    .context("allocating render buffer")?;

    let mut config_store = ConfigStore::new(shared);
    let handles = Handles::register(&mut config_store, &app_config.vars, &app_config.seeds)
        .context("registering variables")?;

    let mut engine = Engine::new(
        config_store,
        handles,
        app_config.template.clone(),
        TimerManager::new(events_tx),
        cycle,
    );
    engine.start().context("arming broadcast timer")?;

    // Shutdown signal channel for the control surface.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut control_task = None;
    if let Some(addr) = &app_config.control_addr {
        let addr: SocketAddr = addr
            .parse()
            .with_context(|| format!("invalid control address {addr}"))?;
        let control_store = Arc::clone(&store);
        control_task = Some(tokio::spawn(async move {
            if let Err(e) = web::start_server(addr, control_store, shutdown_rx).await {
                tracing::error!("Control surface exited with error: {}", e);
            }
        }));
    }

    tokio::select! {
        _ = engine.run(events_rx) => {
            tracing::info!("Dispatcher stopped.");
        }
        _ = termination() => {
            tracing::warn!("Termination signal received, abandoning any in-flight cycle");
        }
    }

    if shutdown_tx.send(true).is_err() {
        tracing::debug!("Control surface already gone");
    }
    if let Some(task) = control_task {
        if let Err(e) = task.await {
            tracing::error!("Control surface task failed: {}", e);
        }
    }
    drop(store);

    tracing::info!("udpt terminated.");
    std::process::exit(1);
}
