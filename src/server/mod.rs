use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::common::{self, Worker};
use crate::election::backoff::ExponentialBackoff;
use crate::election::campaign::{run_election_campaign, CampaignParams};
use crate::election::status::{LeadershipSnapshot, LeadershipStatus};
use crate::election::watcher::{watch_claim_key, ClaimWatcherParams};
use crate::election::{ClaimEvent, LeaderClaim};
use crate::errors::{new_err, Result, StoreError};
use crate::lease::{LeaseKeeper, LeaseRenewal};
use crate::membership::MembershipManager;
use crate::server::configuration::ServerConfig;
use crate::store::{ConsensusStore, MemberId};

pub mod configuration;

/// One coordination process: campaigns for leadership over the consensus
/// store and answers leadership and membership queries.
#[derive(Debug)]
pub struct Server<S: ConsensusStore> {
    config: ServerConfig,
    store: S,
    claim_key: String,
    status: LeadershipStatus,
    running: AtomicBool,
    closed: AtomicBool,
    shutdown_tx: Sender<()>,
    shutdown_rx: Receiver<()>,
    workers: Mutex<Option<ServerWorkers>>,
}

#[derive(Debug)]
struct ServerWorkers {
    campaign: Worker,
    campaign_done_rx: Receiver<()>,
    lease_renewal: LeaseRenewal,
    claim_watcher: Worker,
}

impl ServerWorkers {
    /// Never returns while the lease is still being renewed, even when the
    /// campaign is left behind.
    fn stop(self, grace_period: Duration) {
        self.campaign.terminate();
        match self.campaign_done_rx.recv_timeout(grace_period) {
            Err(RecvTimeoutError::Timeout) => {
                warn!("Campaign did not resign within {:?}, leaving it behind", grace_period)
            }
            _ => self.campaign.join(),
        }
        self.lease_renewal.shutdown();

        self.claim_watcher.terminate();
        self.claim_watcher.join();
    }
}

impl<S: ConsensusStore> Server<S> {
    pub fn new(config: ServerConfig, store: S) -> Result<Server<S>> {
        config.validate()?;

        let (shutdown_tx, shutdown_rx): (Sender<()>, Receiver<()>) = crossbeam_channel::bounded(1);

        Ok(Server {
            claim_key: config.claim_key(),
            config,
            store,
            status: LeadershipStatus::new(),
            running: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            shutdown_tx,
            shutdown_rx,
            workers: Mutex::new(None),
        })
    }

    /// Starts campaigning and blocks until `close` is called or this process
    /// is removed from the cluster. Fails when the store cannot be reached
    /// at startup.
    pub fn run(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return new_err(format!("Server {} is closed", self.config.name), String::new());
        }
        if self.running.swap(true, Ordering::SeqCst) {
            return new_err(format!("Server {} is already running", self.config.name), String::new());
        }

        if !self.wait_for_store()? {
            return Ok(());
        }

        let timings = self.config.timings;
        let (claim_event_tx, claim_event_rx): (Sender<ClaimEvent>, Receiver<ClaimEvent>) =
            crossbeam_channel::unbounded();
        let (campaign_done_tx, campaign_done_rx): (Sender<()>, Receiver<()>) = crossbeam_channel::bounded(0);

        let claim_watcher = common::run_worker(
            "claim-watcher",
            watch_claim_key,
            ClaimWatcherParams {
                store: self.store.clone(),
                claim_key: self.claim_key.clone(),
                request_timeout: timings.request_timeout,
                backoff: ExponentialBackoff::new(timings.backoff_base, timings.backoff_cap),
                claim_event_tx,
            },
        );

        let lease_keeper = LeaseKeeper::new(self.store.clone(), timings.request_timeout);
        let lease_renewal = lease_keeper.renewal();
        let campaign = common::run_worker(
            "election-campaign",
            run_election_campaign,
            CampaignParams {
                store: self.store.clone(),
                member_id: self.store.member_id(),
                name: self.config.name.clone(),
                addr: self.config.advertise_addr(),
                claim_key: self.claim_key.clone(),
                timings,
                status: self.status.clone(),
                claim_event_rx,
                lease_keeper,
                campaign_done_tx,
            },
        );

        *self.workers.lock() = Some(ServerWorkers {
            campaign,
            campaign_done_rx: campaign_done_rx.clone(),
            lease_renewal,
            claim_watcher,
        });
        info!("Server {} started", self.config.name);

        // close() may have run before the workers were registered
        if self.closed.load(Ordering::SeqCst) {
            self.stop_workers();
            return Ok(());
        }

        select!(
            recv(self.shutdown_rx) -> _ => {},
            recv(campaign_done_rx) -> _ => {
                info!("Server {} campaign ended", self.config.name);
                self.close();
            },
        );

        info!("Server {} stopped", self.config.name);
        Ok(())
    }

    /// Resigns leadership and stops all workers. Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Server {} closing", self.config.name);

        self.stop_workers();

        let _ = self.shutdown_tx.try_send(());
    }

    fn stop_workers(&self) {
        let workers = self.workers.lock().take();
        if let Some(workers) = workers {
            workers.stop(self.config.timings.close_grace_period);
        }
    }

    /// Probes the store with bounded retries. Returns false when the server
    /// was closed while waiting.
    fn wait_for_store(&self) -> Result<bool> {
        let timings = self.config.timings;
        let mut backoff = ExponentialBackoff::new(timings.backoff_base, timings.backoff_cap);
        let mut last_error = String::new();

        for attempt in 1..=timings.startup_retries {
            match self.store.list_members(timings.request_timeout) {
                Ok(members) => {
                    if !members.iter().any(|peer| peer.id == self.store.member_id()) {
                        warn!(
                            "Server {} (member {}) is not in the member list",
                            self.config.name,
                            self.store.member_id()
                        );
                    }
                    return Ok(true);
                }
                Err(err) => {
                    warn!(
                        "Server {}: store check {}/{} failed: {}",
                        self.config.name, attempt, timings.startup_retries, err
                    );
                    last_error = err.to_string();
                }
            }

            if attempt < timings.startup_retries
                && common::wait_or_terminate(&self.shutdown_rx, backoff.next_delay())
            {
                return Ok(false);
            }
        }

        new_err(
            format!("Server {} cannot reach the consensus store", self.config.name),
            last_error,
        )
    }

    /// True while this process holds the leader claim. Never blocks; may lag
    /// behind the store by up to one renewal interval.
    pub fn is_leader(&self) -> bool {
        !self.closed.load(Ordering::SeqCst) && self.status.current().is_leader()
    }

    pub fn snapshot(&self) -> Arc<LeadershipSnapshot> {
        self.status.current()
    }

    /// Reads the current claim from the store. Empty during failover.
    pub fn leader(&self) -> std::result::Result<Option<LeaderClaim>, StoreError> {
        self.leader_with_timeout(self.config.timings.request_timeout)
    }

    /// Same as `leader`, with a caller-chosen store timeout.
    pub fn leader_with_timeout(&self, timeout: Duration) -> std::result::Result<Option<LeaderClaim>, StoreError> {
        let value = self.store.get(&self.claim_key, timeout)?;

        Ok(match ClaimEvent::from_value(value.as_deref()) {
            ClaimEvent::Claimed(claim) => Some(claim),
            _ => None,
        })
    }

    /// Address of the current leader, for redirecting clients.
    pub fn leader_addr(&self) -> std::result::Result<Option<String>, StoreError> {
        Ok(self.leader()?.map(|claim| claim.addr))
    }

    /// Confirms against the store that this process still owns the claim.
    /// Use before leader-only actions that must not act on a stale view.
    pub fn verify_leadership(&self) -> std::result::Result<bool, StoreError> {
        let snapshot = self.status.current();
        if !self.is_leader() {
            return Ok(false);
        }
        let stored = self.leader()?;

        Ok(stored.is_some() && stored == snapshot.leader)
    }

    pub fn membership(&self) -> MembershipManager<S> {
        MembershipManager::new(self.store.clone(), self.config.timings.request_timeout)
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn member_id(&self) -> MemberId {
        self.store.member_id()
    }

    pub fn addr(&self) -> String {
        self.config.advertise_addr()
    }

    pub fn endpoints(&self) -> &[String] {
        &self.config.client_urls
    }

    pub fn claim_key(&self) -> &str {
        &self.claim_key
    }
}

impl<S: ConsensusStore> Drop for Server<S> {
    fn drop(&mut self) {
        self.close();
    }
}
