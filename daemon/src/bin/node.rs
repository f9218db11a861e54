//! Coordination node entrypoint: parses configuration, wires the three
//! engines together, starts the background loops (heartbeat, tail, apply,
//! deadlock detection, metrics) and the HTTP shim, then waits for a
//! shutdown signal.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use log::{error, info};

use coord_daemon::api::CoreApi;
use coord_daemon::applier::StateApplier;
use coord_daemon::cache_engine::CacheEngine;
use coord_daemon::config::{Cli, NodeConfig, DEADLOCK_DETECTION_INTERVAL, HEARTBEAT_INTERVAL, METRICS_INTERVAL, TAIL_POLL_INTERVAL};
use coord_daemon::lock_manager::LockManager;
use coord_daemon::log_backend::{HttpLogBackend, InMemoryLogBackend, LogBackend};
use coord_daemon::metrics::MetricsMirror;
use coord_daemon::replicator::LogReplicator;
use coord_daemon::transport::{HttpPeerTransport, PeerTransport};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Arc::new(NodeConfig::from(cli));

    let level: log::LevelFilter = config.log_level.parse().unwrap_or(log::LevelFilter::Info);
    coord_common::logging::init(&config.node_id, level, None)?;

    info!(
        "starting coordination node {} (peers: {:?}, http_port: {})",
        config.node_id, config.peers, config.http_port
    );

    let prometheus = match coord_daemon::metrics::install() {
        Ok(handle) => Some(handle),
        Err(e) => {
            error!("failed to install prometheus recorder: {e}");
            None
        }
    };

    let transport: Arc<dyn PeerTransport> = Arc::new(HttpPeerTransport::new(config.clone()));
    let backend: Arc<dyn LogBackend> = match &config.log_backend_url {
        Some(url) => Arc::new(HttpLogBackend::new(url.clone())),
        None => InMemoryLogBackend::new(),
    };

    let replicator = Arc::new(LogReplicator::new(config.clone(), backend, transport.clone()));
    let lock_manager = Arc::new(LockManager::new(config.clone(), replicator.clone(), transport.clone()));
    let cache_engine = Arc::new(CacheEngine::new(config.clone(), transport.clone()));
    let api = Arc::new(CoreApi::new(replicator.clone(), lock_manager.clone(), cache_engine.clone()));

    spawn_loop("heartbeat", HEARTBEAT_INTERVAL, {
        let replicator = replicator.clone();
        move || {
            let replicator = replicator.clone();
            async move {
                replicator.run_election_timer().await;
                replicator.broadcast_heartbeat().await;
                Ok::<(), String>(())
            }
        }
    });

    spawn_loop("tail", TAIL_POLL_INTERVAL, {
        let replicator = replicator.clone();
        move || {
            let replicator = replicator.clone();
            async move { replicator.tail_once().await.map_err(|e| e.to_string()) }
        }
    });

    tokio::spawn({
        let lock_manager = lock_manager.clone();
        let replicator = replicator.clone();
        let applier = StateApplier::new(lock_manager);
        async move { applier.run(&replicator).await }
    });

    spawn_loop("deadlock-detection", DEADLOCK_DETECTION_INTERVAL, {
        let lock_manager = lock_manager.clone();
        move || {
            let lock_manager = lock_manager.clone();
            async move {
                lock_manager.run_deadlock_detection().await;
                Ok::<(), String>(())
            }
        }
    });

    let mirror = Arc::new(MetricsMirror::new(cache_engine.clone(), lock_manager.clone()));
    spawn_loop("metrics", METRICS_INTERVAL, move || {
        let mirror = mirror.clone();
        async move {
            mirror.tick();
            Ok::<(), String>(())
        }
    });

    let bind_addr = format!("127.0.0.1:{}", config.http_port);
    let (handle, server) = coord_daemon::http::start(&bind_addr, api, prometheus)?;

    tokio::select! {
        result = server => {
            if let Err(e) = result {
                error!("http shim exited with error: {e}");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("received shutdown signal");
            handle.stop(true).await;
        }
    }

    Ok(())
}

/// Spawns a background task that runs `make_future()` every `interval`,
/// logging and continuing past errors rather than ever letting the loop
/// die — no background loop may unwind on a transient failure.
fn spawn_loop<F, Fut, E>(name: &'static str, interval: Duration, mut make_future: F)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: std::future::Future<Output = Result<(), E>> + Send,
    E: std::fmt::Display,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            if let Err(e) = make_future().await {
                error!("{name} loop iteration failed: {e}");
            }
        }
    });
}
