use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use std::cmp;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::common::{self, Worker};
use crate::errors::StoreError;
use crate::lease::renewal::{renew_lease, RenewLeaseParams};
use crate::store::{ConsensusStore, LeaseId};

mod renewal;

/// Consecutive failed renewals after which the lease is given up.
pub const MAX_CONSECUTIVE_RENEWAL_FAILURES: u32 = 2;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Display)]
pub enum LeaseState {
    None,
    Pending,
    #[display(fmt = "Active lease {} (ttl {:?})", lease_id, ttl)]
    Active { lease_id: LeaseId, ttl: Duration },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Display)]
pub enum LeaseLossReason {
    /// Renewals kept failing with transient errors.
    RenewalFailed,

    /// The store no longer knows the lease.
    Expired,

    /// This process was removed from the cluster.
    MemberRemoved,
}

/// Sent once per lost lease, before the renewal worker stops.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Display)]
#[display(fmt = "Lease {} lost: {}", lease_id, reason)]
pub struct LeaseLost {
    pub lease_id: LeaseId,
    pub reason: LeaseLossReason,
}

/// Handle on the renewal worker that can stop it from another thread. Once
/// shut down, the keeper grants no further leases.
#[derive(Clone, Debug)]
pub struct LeaseRenewal {
    slot: Arc<Mutex<RenewalSlot>>,
    state: Arc<Mutex<LeaseState>>,
}

#[derive(Debug, Default)]
struct RenewalSlot {
    worker: Option<Worker>,
    shut_down: bool,
}

impl LeaseRenewal {
    fn new() -> LeaseRenewal {
        LeaseRenewal {
            slot: Arc::new(Mutex::new(RenewalSlot::default())),
            state: Arc::new(Mutex::new(LeaseState::None)),
        }
    }

    /// Stops renewing for good. Returns once the renewal worker has exited.
    pub fn shutdown(&self) {
        let worker = {
            let mut slot = self.slot.lock();
            slot.shut_down = true;
            slot.worker.take()
        };
        stop_worker(worker, &self.state);
    }

    pub fn is_shut_down(&self) -> bool {
        self.slot.lock().shut_down
    }

    fn take_worker(&self) -> Option<Worker> {
        self.slot.lock().worker.take()
    }
}

fn stop_worker(worker: Option<Worker>, state: &Mutex<LeaseState>) {
    if let Some(worker) = worker {
        worker.terminate();
        worker.join();
    }

    let mut state = state.lock();
    if let LeaseState::Active { lease_id, .. } = *state {
        debug!("Lease {} released", lease_id);
    }
    *state = LeaseState::None;
}

/// Owns at most one store lease at a time and keeps it alive with a renewal
/// worker ticking every ttl/3.
#[derive(Debug)]
pub struct LeaseKeeper<S: ConsensusStore> {
    store: S,
    request_timeout: Duration,
    state: Arc<Mutex<LeaseState>>,
    renewal: LeaseRenewal,
    lease_lost_tx: Sender<LeaseLost>,
    lease_lost_rx: Receiver<LeaseLost>,
}

impl<S: ConsensusStore> LeaseKeeper<S> {
    pub fn new(store: S, request_timeout: Duration) -> LeaseKeeper<S> {
        let (lease_lost_tx, lease_lost_rx): (Sender<LeaseLost>, Receiver<LeaseLost>) =
            crossbeam_channel::unbounded();
        let renewal = LeaseRenewal::new();

        LeaseKeeper {
            store,
            request_timeout,
            state: renewal.state.clone(),
            renewal,
            lease_lost_tx,
            lease_lost_rx,
        }
    }

    /// Grants a fresh lease and starts renewing it. Any previously held lease
    /// is released first.
    pub fn acquire(&mut self, ttl: Duration) -> Result<LeaseId, StoreError> {
        self.release();
        if self.renewal.is_shut_down() {
            return Err(StoreError::Unavailable("lease renewal is shut down".to_string()));
        }

        let renewal_interval = ttl / 3;
        // a grant slower than the renewal interval leaves too little of the ttl
        let grant_timeout = cmp::min(self.request_timeout, renewal_interval);

        *self.state.lock() = LeaseState::Pending;
        let granted_at = Instant::now();
        let lease_id = match self.store.grant_lease(ttl, grant_timeout) {
            Ok(lease_id) => lease_id,
            Err(err) => {
                *self.state.lock() = LeaseState::None;
                return Err(err);
            }
        };

        let mut slot = self.renewal.slot.lock();
        if slot.shut_down {
            *self.state.lock() = LeaseState::None;
            return Err(StoreError::Unavailable("lease renewal is shut down".to_string()));
        }
        *self.state.lock() = LeaseState::Active { lease_id, ttl };
        slot.worker = Some(common::run_worker(
            "lease-renewal",
            renew_lease,
            RenewLeaseParams {
                store: self.store.clone(),
                lease_id,
                ttl,
                granted_at,
                renewal_interval,
                request_timeout: self.request_timeout,
                state: self.state.clone(),
                lease_lost_tx: self.lease_lost_tx.clone(),
            },
        ));
        drop(slot);

        debug!("Lease {} granted with ttl {:?}", lease_id, ttl);
        Ok(lease_id)
    }

    /// Stops renewing. The lease is not revoked: it expires in the store
    /// on its own.
    pub fn release(&mut self) {
        stop_worker(self.renewal.take_worker(), &self.state);

        // notices about a lease we no longer hold
        while self.lease_lost_rx.try_recv().is_ok() {}
    }

    /// Handle for stopping renewal from outside the owning thread.
    pub fn renewal(&self) -> LeaseRenewal {
        self.renewal.clone()
    }

    pub fn state(&self) -> LeaseState {
        *self.state.lock()
    }

    pub fn active_lease(&self) -> Option<LeaseId> {
        match self.state() {
            LeaseState::Active { lease_id, .. } => Some(lease_id),
            _ => None,
        }
    }

    pub fn lease_lost_rx(&self) -> &Receiver<LeaseLost> {
        &self.lease_lost_rx
    }
}

impl<S: ConsensusStore> Drop for LeaseKeeper<S> {
    fn drop(&mut self) {
        self.release();
    }
}
