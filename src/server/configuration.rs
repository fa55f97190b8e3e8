use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::errors::{new_err, Result};

pub const DEFAULT_ROOT_PATH: &str = "/coordinator";

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct ElectionTimings {
    /// Ttl of the lease the leader claim is bound to.
    pub lease_ttl: Duration,
    /// Bound of every store request issued by the campaign.
    pub request_timeout: Duration,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
    /// How long `Server::close` waits for the campaign to resign.
    pub close_grace_period: Duration,
    /// Store reachability attempts at startup before giving up.
    pub startup_retries: u32,
}

impl Default for ElectionTimings {
    fn default() -> Self {
        ElectionTimings {
            lease_ttl: Duration::from_secs(3),
            request_timeout: Duration::from_secs(5),
            backoff_base: Duration::from_millis(100),
            backoff_cap: Duration::from_secs(3),
            close_grace_period: Duration::from_secs(3),
            startup_retries: 5,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct ServerConfig {
    /// Unique member name.
    pub name: String,
    pub cluster_id: u64,
    /// Advertised client endpoints. The first one is the leader address.
    pub client_urls: Vec<String>,
    /// Advertised intra-cluster endpoints.
    pub peer_urls: Vec<String>,
    pub data_dir: PathBuf,
    /// Key prefix of this cluster in the store.
    pub root_path: String,
    pub timings: ElectionTimings,
}

impl ServerConfig {
    pub fn new(name: &str, client_urls: Vec<String>, peer_urls: Vec<String>) -> ServerConfig {
        let cluster_id = 1;
        ServerConfig {
            name: name.to_string(),
            cluster_id,
            client_urls,
            peer_urls,
            data_dir: PathBuf::from(format!("default.{}", name)),
            root_path: format!("{}/{}", DEFAULT_ROOT_PATH, cluster_id),
            timings: ElectionTimings::default(),
        }
    }

    /// Configuration of the `index`-th member of a local test cluster.
    pub fn new_test(index: u32) -> ServerConfig {
        let client_port = 12379 + index * 10;
        let peer_port = client_port + 1;

        let mut config = ServerConfig::new(
            &format!("node{}", index),
            vec![format!("http://127.0.0.1:{}", client_port)],
            vec![format!("http://127.0.0.1:{}", peer_port)],
        );
        config.data_dir = env::temp_dir().join(format!("coordinator-test-{}-{}", std::process::id(), index));
        config
    }

    pub fn new_test_multi(count: u32) -> Vec<ServerConfig> {
        (1..=count).map(ServerConfig::new_test).collect()
    }

    /// Well-known key whose value names the current leader.
    pub fn claim_key(&self) -> String {
        format!("{}/leader", self.root_path.trim_end_matches('/'))
    }

    pub fn advertise_addr(&self) -> String {
        self.client_urls.first().cloned().unwrap_or_default()
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return new_err("Invalid configuration".to_string(), "empty member name".to_string());
        }
        if self.client_urls.is_empty() {
            return new_err(
                "Invalid configuration".to_string(),
                format!("no client urls for {}", self.name),
            );
        }
        if !self.root_path.starts_with('/') {
            return new_err(
                "Invalid configuration".to_string(),
                format!("root path '{}' must start with '/'", self.root_path),
            );
        }

        let timings = &self.timings;
        if timings.lease_ttl < Duration::from_millis(3) {
            return new_err(
                "Invalid configuration".to_string(),
                format!("lease ttl {:?} is too short", timings.lease_ttl),
            );
        }
        if timings.request_timeout == Duration::from_secs(0) || timings.backoff_base == Duration::from_secs(0) {
            return new_err(
                "Invalid configuration".to_string(),
                "request timeout and backoff base must be positive".to_string(),
            );
        }
        if timings.startup_retries == 0 {
            return new_err(
                "Invalid configuration".to_string(),
                "at least one startup attempt is required".to_string(),
            );
        }

        Ok(())
    }
}
