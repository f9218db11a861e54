//! End-to-end scenarios spanning more than one `LockManager`/`StateApplier`
//! pair cooperating over a single shared log backend — the things a
//! single-module unit test can't exercise.

use std::sync::Arc;

use coord_common::wire::{Command, LockMode};
use coord_daemon::applier::StateApplier;
use coord_daemon::config::NodeConfig;
use coord_daemon::lock_manager::LockManager;
use coord_daemon::log_backend::{InMemoryLogBackend, LogBackend};
use coord_daemon::replicator::LogReplicator;
use coord_daemon::transport::MockPeerTransport;

fn node(node_id: &str, peers: Vec<&str>) -> (Arc<LogReplicator>, Arc<LockManager>) {
    let config = Arc::new(NodeConfig {
        node_id: node_id.to_string(),
        peers: peers.into_iter().map(String::from).collect(),
        http_port: 8000,
        log_backend_url: None,
        docker_env: false,
        log_level: "info".into(),
    });
    let backend: Arc<dyn LogBackend> = InMemoryLogBackend::new();
    let transport = Arc::new(MockPeerTransport::new());
    let replicator = Arc::new(LogReplicator::new(config.clone(), backend, transport.clone()));
    let lock_manager = Arc::new(LockManager::new(config, replicator.clone(), transport));
    (replicator, lock_manager)
}

/// Two independent `LockManager`s, each driven by its own `StateApplier`,
/// applying the *same* sequence of log entries must converge to identical
/// lock state — this is the determinism property every node in the real
/// deployment depends on, since each node tails the shared external log
/// independently.
#[tokio::test]
async fn two_nodes_applying_the_same_log_converge_to_identical_state() {
    let shared_backend: Arc<dyn LogBackend> = InMemoryLogBackend::new();

    shared_backend
        .append(coord_common::wire::LogEntry {
            term: 1,
            command: Command::AcquireLock {
                resource: "r1".into(),
                owner: "nodeA".into(),
                mode: LockMode::Exclusive,
            },
            timestamp: 0.0,
        })
        .await
        .unwrap();
    shared_backend
        .append(coord_common::wire::LogEntry {
            term: 1,
            command: Command::AcquireLock {
                resource: "r1".into(),
                owner: "nodeB".into(),
                mode: LockMode::Exclusive,
            },
            timestamp: 0.1,
        })
        .await
        .unwrap();
    shared_backend
        .append(coord_common::wire::LogEntry {
            term: 1,
            command: Command::ReleaseLock {
                resource: "r1".into(),
                owner: "nodeA".into(),
            },
            timestamp: 0.2,
        })
        .await
        .unwrap();

    let config_a = Arc::new(NodeConfig {
        node_id: "nodeA".into(),
        peers: vec![],
        http_port: 8000,
        log_backend_url: None,
        docker_env: false,
        log_level: "info".into(),
    });
    let config_b = Arc::new(NodeConfig {
        node_id: "nodeB".into(),
        peers: vec![],
        http_port: 8001,
        log_backend_url: None,
        docker_env: false,
        log_level: "info".into(),
    });
    let transport_a = Arc::new(MockPeerTransport::new());
    let transport_b = Arc::new(MockPeerTransport::new());

    let replicator_a = Arc::new(LogReplicator::new(config_a.clone(), shared_backend.clone(), transport_a.clone()));
    let replicator_b = Arc::new(LogReplicator::new(config_b.clone(), shared_backend.clone(), transport_b.clone()));

    let lock_manager_a = Arc::new(LockManager::new(config_a, replicator_a.clone(), transport_a));
    let lock_manager_b = Arc::new(LockManager::new(config_b, replicator_b.clone(), transport_b));

    let applier_a = StateApplier::new(lock_manager_a.clone());
    let applier_b = StateApplier::new(lock_manager_b.clone());

    // Subscribe before tailing so every published entry is observed.
    let mut rx_a = replicator_a.subscribe_tail();
    let mut rx_b = replicator_b.subscribe_tail();

    replicator_a.tail_once().await.unwrap();
    replicator_b.tail_once().await.unwrap();

    while let Ok((index, entry)) = rx_a.try_recv() {
        applier_a.apply(index, &entry.command).await;
    }
    while let Ok((index, entry)) = rx_b.try_recv() {
        applier_b.apply(index, &entry.command).await;
    }

    let snapshot_a = lock_manager_a.snapshot().await;
    let snapshot_b = lock_manager_b.snapshot().await;

    assert_eq!(snapshot_a.len(), snapshot_b.len());
    let (mode_a, holders_a, _) = snapshot_a.get("r1").unwrap();
    let (mode_b, holders_b, _) = snapshot_b.get("r1").unwrap();
    assert_eq!(mode_a, mode_b);
    assert_eq!(holders_a, holders_b);
    assert_eq!(holders_a, &vec!["nodeB".to_string()]);
}

/// A deadlock between two resources held on the same node resolves after
/// one `run_deadlock_detection` pass: exactly one victim is released.
#[tokio::test]
async fn deadlock_cycle_is_broken_after_one_detection_pass() {
    let (replicator, lock_manager) = node("node1", vec![]);
    replicator.receive_heartbeat("node1", 1).await;

    lock_manager.apply_acquire("r1", "a", LockMode::Exclusive).await;
    lock_manager.apply_acquire("r2", "b", LockMode::Exclusive).await;
    lock_manager.apply_acquire("r2", "a", LockMode::Exclusive).await;
    lock_manager.apply_acquire("r1", "b", LockMode::Exclusive).await;

    assert!(!lock_manager.wait_for_edges().await.is_empty());

    lock_manager.run_deadlock_detection().await;

    let entries = replicator.log_range(0, 100).await.unwrap();
    let release_count = entries
        .iter()
        .filter(|e| matches!(&e.command, Command::ReleaseLock { .. }))
        .count();
    assert_eq!(release_count, 1);
}
