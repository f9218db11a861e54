//! Node configuration: environment defaults, CLI overrides, and the timing
//! constants every background loop and peer-facing timeout is built from.

use std::time::Duration;

use clap::Parser;

/// Heartbeat is sent at this cadence by the leader.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_millis(1_000);
/// A follower that has not heard from the leader within this window starts
/// an election.
pub const T_FAILOVER: Duration = Duration::from_millis(3_000);
/// `StateApplier`'s log-tail poll cadence.
pub const TAIL_POLL_INTERVAL: Duration = Duration::from_millis(500);
/// `LockManager`'s deadlock-detection sweep cadence (leader only).
pub const DEADLOCK_DETECTION_INTERVAL: Duration = Duration::from_millis(5_000);
/// Metrics flush/describe cadence.
pub const METRICS_INTERVAL: Duration = Duration::from_millis(10_000);

/// `PeerTransport`/`HttpLogBackend` connect timeout.
pub const PEER_CONNECT_TIMEOUT: Duration = Duration::from_millis(2_000);
/// `PeerTransport`/`HttpLogBackend` total request timeout.
pub const PEER_REQUEST_TIMEOUT: Duration = Duration::from_millis(5_000);
/// Max idle pooled connections kept per peer host.
pub const PEER_POOL_MAX_IDLE_PER_HOST: usize = 8;

#[derive(Parser, Debug, Clone)]
#[command(name = "coord-node", about = "Distributed lock/cache coordination node")]
pub struct Cli {
    /// This node's identifier, e.g. "node1". Defaults to $NODE_ID.
    #[arg(long, env = "NODE_ID")]
    pub node_id: String,

    /// Comma-separated peer node ids, e.g. "node2,node3". Defaults to $PEERS.
    #[arg(long, env = "PEERS", value_delimiter = ',', default_value = "")]
    pub peers: Vec<String>,

    /// Port the HTTP shim listens on. Defaults to $HTTP_PORT or 8000.
    #[arg(long, env = "HTTP_PORT", default_value_t = 8000)]
    pub http_port: u16,

    /// Base URL of the external ordered-log backend. If unset, an
    /// in-memory backend is used (single-process / test mode).
    #[arg(long, env = "LOG_BACKEND_URL")]
    pub log_backend_url: Option<String>,

    /// When set, peer addresses resolve to the peer's node id as hostname
    /// (container DNS) instead of `localhost:<derived-port>`.
    #[arg(long, env = "DOCKER_ENV", default_value_t = false)]
    pub docker_env: bool,

    /// Log level.
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub node_id: String,
    pub peers: Vec<String>,
    pub http_port: u16,
    pub log_backend_url: Option<String>,
    pub docker_env: bool,
    pub log_level: String,
}

impl From<Cli> for NodeConfig {
    fn from(cli: Cli) -> Self {
        let peers = cli
            .peers
            .into_iter()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();
        NodeConfig {
            node_id: cli.node_id,
            peers,
            http_port: cli.http_port,
            log_backend_url: cli.log_backend_url,
            docker_env: cli.docker_env,
            log_level: cli.log_level,
        }
    }
}

impl NodeConfig {
    /// Resolves `peer_id` to a base URL, following the same
    /// DOCKER_ENV-aware convention as the peer transport address rules:
    /// inside Docker, peers are addressed by node id over container DNS on
    /// a fixed coordinator port; outside Docker, every peer listens on
    /// `localhost` at `8000 + <numeric suffix of node id>`.
    pub fn peer_base_url(&self, peer_id: &str) -> String {
        if self.docker_env {
            format!("http://{peer_id}:8000")
        } else {
            let suffix: u32 = peer_id
                .trim_start_matches(|c: char| !c.is_ascii_digit())
                .parse()
                .unwrap_or(0);
            format!("http://localhost:{}", 8000 + suffix)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(docker: bool) -> NodeConfig {
        NodeConfig {
            node_id: "node1".into(),
            peers: vec!["node2".into(), "node3".into()],
            http_port: 8001,
            log_backend_url: None,
            docker_env: docker,
            log_level: "info".into(),
        }
    }

    #[test]
    fn docker_env_addresses_peers_by_hostname() {
        let cfg = config(true);
        assert_eq!(cfg.peer_base_url("node2"), "http://node2:8000");
    }

    #[test]
    fn non_docker_env_derives_port_from_node_suffix() {
        let cfg = config(false);
        assert_eq!(cfg.peer_base_url("node2"), "http://localhost:8002");
        assert_eq!(cfg.peer_base_url("node13"), "http://localhost:8013");
    }

    #[test]
    fn cli_drops_blank_peer_entries() {
        let cli = Cli {
            node_id: "node1".into(),
            peers: vec!["node2".into(), "".into(), " node3 ".into()],
            http_port: 8000,
            log_backend_url: None,
            docker_env: false,
            log_level: "info".into(),
        };
        let cfg: NodeConfig = cli.into();
        assert_eq!(cfg.peers, vec!["node2".to_string(), "node3".to_string()]);
    }
}
