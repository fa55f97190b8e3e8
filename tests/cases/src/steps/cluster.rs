use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use coordinator::{Server, ServerConfig};
use coordinator_modules::{MemoryStore, MemoryStoreClient};

use crate::steps;

pub type CaseServer = Arc<Server<MemoryStoreClient>>;

pub struct CaseCluster {
    pub store: MemoryStore,
    pub servers: Vec<CaseServer>,
    run_handles: Vec<Option<JoinHandle<()>>>,
}

pub fn start_cluster(count: u32) -> CaseCluster {
    let store = MemoryStore::new();
    let mut cluster = CaseCluster {
        store,
        servers: Vec::new(),
        run_handles: Vec::new(),
    };

    for mut config in ServerConfig::new_test_multi(count) {
        config.timings = steps::case_timings();
        cluster.add_server(config);
    }

    cluster
}

impl CaseCluster {
    pub fn add_server(&mut self, config: ServerConfig) {
        let peer = self
            .store
            .add_member(&config.name, config.peer_urls.clone(), config.client_urls.clone());
        let server = Arc::new(Server::new(config, self.store.client(peer.id)).expect("valid config"));

        let run_server = server.clone();
        let handle = thread::spawn(move || {
            if let Err(err) = run_server.run() {
                error!("{}", err);
            }
        });

        self.servers.push(server);
        self.run_handles.push(Some(handle));
    }

    pub fn server(&self, name: &str) -> CaseServer {
        self.servers
            .iter()
            .find(|server| server.name() == name)
            .cloned()
            .unwrap_or_else(|| panic!("no server {}", name))
    }

    pub fn leaders(&self) -> Vec<String> {
        self.servers
            .iter()
            .filter(|server| server.is_leader())
            .map(|server| server.name().to_string())
            .collect()
    }

    /// Waits for exactly one leader other than `excluded` and returns it.
    pub fn wait_for_leader_except(&self, excluded: &[&str], timeout: Duration) -> CaseServer {
        let found = steps::wait_until(timeout, || {
            let leaders = self.leaders();
            leaders.len() == 1 && !excluded.contains(&leaders[0].as_str())
        });
        if !found {
            panic!("no single leader elected, leaders: {:?}", self.leaders());
        }

        let leader = self.server(&self.leaders()[0]);
        info!("--Leader: {}", leader.name());
        leader
    }

    pub fn wait_for_leader(&self) -> CaseServer {
        self.wait_for_leader_except(&[], steps::failover_timeout())
    }

    /// Checks the single-leader property for `millis`.
    pub fn assert_single_leader_for(&self, millis: u64) {
        let checks = millis / 20;
        for _ in 0..checks {
            let leaders = self.leaders();
            assert!(leaders.len() <= 1, "more than one leader: {:?}", leaders);
            steps::sleep(20);
        }
    }

    /// Cuts the server off the store without stopping it.
    pub fn partition(&self, name: &str) {
        info!("--Partition {}", name);
        self.server(name).store().set_available(false);
    }

    pub fn close_server(&mut self, name: &str) {
        info!("--Close {}", name);
        let position = self
            .servers
            .iter()
            .position(|server| server.name() == name)
            .unwrap_or_else(|| panic!("no server {}", name));

        self.servers[position].close();
        self.join_server(position);
    }

    /// True once the server's `run` has returned.
    pub fn is_stopped(&self, name: &str) -> bool {
        self.servers
            .iter()
            .position(|server| server.name() == name)
            .and_then(|position| self.run_handles[position].as_ref())
            .map_or(true, |handle| handle.is_finished())
    }

    fn join_server(&mut self, position: usize) {
        if let Some(handle) = self.run_handles[position].take() {
            handle.join().expect("server thread does not panic");
        }
    }

    pub fn terminate(mut self) {
        for server in &self.servers {
            server.close();
        }
        for position in 0..self.servers.len() {
            self.join_server(position);
        }
    }
}
