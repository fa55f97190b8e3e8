use crossbeam_channel::{Receiver, Sender};
use std::cmp;

use crate::common;
use crate::election::backoff::ExponentialBackoff;
use crate::election::status::{LeadershipSnapshot, LeadershipStatus};
use crate::election::{CampaignState, ClaimEvent, LeaderClaim};
use crate::errors::StoreError;
use crate::lease::{LeaseKeeper, LeaseLossReason};
use crate::server::configuration::ElectionTimings;
use crate::store::{ConsensusStore, MemberId, PutOutcome};

#[derive(Debug)]
pub struct CampaignParams<S: ConsensusStore> {
    pub store: S,
    pub member_id: MemberId,
    pub name: String,
    pub addr: String,
    pub claim_key: String,
    pub timings: ElectionTimings,
    pub status: LeadershipStatus,
    pub claim_event_rx: Receiver<ClaimEvent>,
    /// Built by the caller, which keeps its `LeaseRenewal` handle.
    pub lease_keeper: LeaseKeeper<S>,
    /// Dropped when the campaign exits.
    pub campaign_done_tx: Sender<()>,
}

/// Campaign worker: runs the election state machine until termination is
/// requested or this process leaves the cluster, then resigns.
pub fn run_election_campaign<S: ConsensusStore>(
    params: CampaignParams<S>,
    terminate_worker_rx: Receiver<()>,
) {
    info!("Election campaign worker started for {}", params.name);

    let campaign_done_tx = params.campaign_done_tx.clone();
    let mut campaign = Campaign::new(params);
    campaign.run(&terminate_worker_rx);

    info!("Election campaign worker stopped for {}", campaign.name);
    drop(campaign_done_tx);
}

struct Campaign<S: ConsensusStore> {
    store: S,
    member_id: MemberId,
    name: String,
    addr: String,
    claim_key: String,
    timings: ElectionTimings,
    status: LeadershipStatus,
    claim_event_rx: Receiver<ClaimEvent>,
    lease_keeper: LeaseKeeper<S>,
    backoff: ExponentialBackoff,
    own_claim: Option<LeaderClaim>,
    leader: Option<LeaderClaim>,
    published_state: Option<CampaignState>,
}

impl<S: ConsensusStore> Campaign<S> {
    fn new(params: CampaignParams<S>) -> Campaign<S> {
        let timings = params.timings;
        Campaign {
            lease_keeper: params.lease_keeper,
            store: params.store,
            member_id: params.member_id,
            name: params.name,
            addr: params.addr,
            claim_key: params.claim_key,
            timings,
            status: params.status,
            claim_event_rx: params.claim_event_rx,
            backoff: ExponentialBackoff::new(timings.backoff_base, timings.backoff_cap),
            own_claim: None,
            leader: None,
            published_state: None,
        }
    }

    fn run(&mut self, terminate_worker_rx: &Receiver<()>) {
        let mut state = CampaignState::Idle;
        loop {
            self.publish(state);
            state = match state {
                CampaignState::Idle => self.resolve_claim(terminate_worker_rx),
                CampaignState::Following => self.follow(terminate_worker_rx),
                CampaignState::Campaigning => self.campaign(terminate_worker_rx),
                CampaignState::Leading => self.lead(terminate_worker_rx),
                CampaignState::Resigning => {
                    self.resign();
                    self.publish(CampaignState::Idle);
                    return;
                }
                CampaignState::Removed => {
                    self.resign();
                    return;
                }
            };
        }
    }

    fn publish(&mut self, state: CampaignState) {
        if self.published_state != Some(state) {
            info!("{} campaign state changed to {}", self.name, state);
            self.published_state = Some(state);
        }
        self.status.publish(LeadershipSnapshot {
            state,
            leader: self.leader.clone(),
        });
    }

    /// Idle: reads the claim key and decides whom to follow.
    fn resolve_claim(&mut self, terminate_worker_rx: &Receiver<()>) -> CampaignState {
        loop {
            match self.store.get(&self.claim_key, self.timings.request_timeout) {
                Ok(value) => {
                    self.backoff.reset();
                    return self.on_claim_value(value.as_deref());
                }
                Err(err) => {
                    if let Some(next) = self.on_store_error(err, terminate_worker_rx) {
                        return next;
                    }
                }
            }
        }
    }

    fn on_claim_value(&mut self, value: Option<&[u8]>) -> CampaignState {
        match ClaimEvent::from_value(value) {
            ClaimEvent::Vacant => {
                self.leader = None;
                CampaignState::Campaigning
            }
            ClaimEvent::Claimed(claim) => {
                if self.is_own(&claim) {
                    self.leader = Some(claim);
                    return CampaignState::Leading;
                }
                debug!("{} follows {}", self.name, claim);
                self.leader = Some(claim);
                self.lease_keeper.release();
                CampaignState::Following
            }
            ClaimEvent::Unreadable => {
                self.leader = None;
                self.lease_keeper.release();
                CampaignState::Following
            }
        }
    }

    fn follow(&mut self, terminate_worker_rx: &Receiver<()>) -> CampaignState {
        let claim_event_rx = self.claim_event_rx.clone();
        loop {
            select!(
                recv(terminate_worker_rx) -> _ => return CampaignState::Resigning,
                recv(claim_event_rx) -> event => match event {
                    Ok(ClaimEvent::Vacant) => {
                        info!("{}: leader claim vacated", self.name);
                        self.leader = None;
                        return CampaignState::Campaigning
                    },
                    Ok(ClaimEvent::Claimed(claim)) => {
                        if self.is_own(&claim) {
                            self.leader = Some(claim);
                            return CampaignState::Leading
                        }
                        if self.leader.as_ref() != Some(&claim) {
                            self.leader = Some(claim);
                            self.publish(CampaignState::Following);
                        }
                    },
                    Ok(ClaimEvent::Unreadable) => {},
                    Err(_) => {
                        error!("{}: claim watcher stopped", self.name);
                        return CampaignState::Resigning
                    }
                },
            );
        }
    }

    fn campaign(&mut self, terminate_worker_rx: &Receiver<()>) -> CampaignState {
        loop {
            match self.try_claim() {
                Ok(PutOutcome::Created) => {
                    self.backoff.reset();
                    self.leader = self.own_claim.clone();
                    info!("{} won the election", self.name);
                    return CampaignState::Leading;
                }
                Ok(PutOutcome::Conflict) => {
                    self.backoff.reset();
                    debug!("{} lost the election race", self.name);
                    return CampaignState::Idle;
                }
                Err(StoreError::LeaseNotFound(lease_id)) => {
                    debug!("Lease {} expired before the claim was written", lease_id);
                    self.lease_keeper.release();
                    if common::wait_or_terminate(terminate_worker_rx, self.backoff.next_delay()) {
                        return CampaignState::Resigning;
                    }
                }
                Err(err) if err.is_transient() => {
                    warn!("{}: claim write failed: {}", self.name, err);
                    // the write may have been applied even though the response was lost
                    if let Ok(Some(value)) = self.store.get(&self.claim_key, self.timings.request_timeout) {
                        self.backoff.reset();
                        return self.on_claim_value(Some(&value));
                    }
                    if common::wait_or_terminate(terminate_worker_rx, self.backoff.next_delay()) {
                        return CampaignState::Resigning;
                    }
                }
                Err(err) => {
                    if let Some(next) = self.on_store_error(err, terminate_worker_rx) {
                        return next;
                    }
                }
            }
        }
    }

    fn try_claim(&mut self) -> Result<PutOutcome, StoreError> {
        let claim = match self.current_claim() {
            Some(claim) => claim,
            None => {
                let lease_id = self.lease_keeper.acquire(self.timings.lease_ttl)?;
                let claim = LeaderClaim {
                    member_id: self.member_id,
                    name: self.name.clone(),
                    addr: self.addr.clone(),
                    lease_id,
                };
                self.own_claim = Some(claim.clone());
                claim
            }
        };

        self.store.put_if_absent(
            &self.claim_key,
            &claim.encode(),
            claim.lease_id,
            self.timings.request_timeout,
        )
    }

    fn lead(&mut self, terminate_worker_rx: &Receiver<()>) -> CampaignState {
        let lease_lost_rx = self.lease_keeper.lease_lost_rx().clone();
        let claim_event_rx = self.claim_event_rx.clone();
        let lease_id = match self.current_claim() {
            Some(claim) => Some(claim.lease_id),
            None => return CampaignState::Campaigning,
        };
        loop {
            select!(
                recv(terminate_worker_rx) -> _ => return CampaignState::Resigning,
                recv(lease_lost_rx) -> lost => {
                    if let Ok(lost) = lost {
                        if Some(lost.lease_id) != lease_id {
                            trace!("Ignoring loss of previous lease {}", lost.lease_id);
                            continue
                        }
                        warn!("{} lost leadership: {}", self.name, lost);
                        self.leader = None;
                        if lost.reason == LeaseLossReason::MemberRemoved {
                            return CampaignState::Removed
                        }
                        return CampaignState::Campaigning
                    }
                },
                recv(claim_event_rx) -> event => match event {
                    Ok(ClaimEvent::Claimed(ref claim)) if self.is_own(claim) => {},
                    Ok(_) => {
                        // events may predate our own claim, so the store decides
                        if !self.claim_still_owned() {
                            warn!("{}: leader claim is no longer ours", self.name);
                            return CampaignState::Idle
                        }
                    },
                    Err(_) => {
                        error!("{}: claim watcher stopped", self.name);
                        return CampaignState::Resigning
                    }
                },
            );
        }
    }

    fn claim_still_owned(&self) -> bool {
        match self.store.get(&self.claim_key, self.timings.request_timeout) {
            Ok(Some(value)) => match LeaderClaim::decode(&value) {
                Ok(claim) => self.is_own(&claim),
                Err(_) => false,
            },
            Ok(None) => false,
            Err(err) => {
                // the lease keeper reports a real loss
                debug!("{}: cannot verify claim: {}", self.name, err);
                true
            }
        }
    }

    /// Best-effort cleanup on shutdown: stops renewing the lease, then
    /// deletes the claim if it is still ours.
    fn resign(&mut self) {
        let claim = self.current_claim();
        self.lease_keeper.release();

        if let Some(claim) = claim {
            let timeout = cmp::min(self.timings.request_timeout, self.timings.close_grace_period);
            match self.store.delete_if_value(&self.claim_key, &claim.encode(), timeout) {
                Ok(true) => info!("{} resigned leadership", self.name),
                Ok(false) => trace!("{}: nothing to resign", self.name),
                Err(err) => debug!("{}: cannot delete leader claim: {}", self.name, err),
            }
        }
        self.own_claim = None;
        self.leader = None;
        if let Some(CampaignState::Removed) = self.published_state {
            self.status.publish(LeadershipSnapshot {
                state: CampaignState::Removed,
                leader: None,
            });
        }
    }

    /// Returns the next state when the error ends the current step, or None
    /// when the step should be retried.
    fn on_store_error(
        &mut self,
        err: StoreError,
        terminate_worker_rx: &Receiver<()>,
    ) -> Option<CampaignState> {
        if let StoreError::MemberRemoved(id) = err {
            warn!("{} (member {}) was removed from the cluster", self.name, id);
            return Some(CampaignState::Removed);
        }

        let delay = self.backoff.next_delay();
        warn!("{}: store request failed, retrying in {:?}: {}", self.name, delay, err);
        if common::wait_or_terminate(terminate_worker_rx, delay) {
            return Some(CampaignState::Resigning);
        }
        None
    }

    fn current_claim(&self) -> Option<LeaderClaim> {
        let lease_id = self.lease_keeper.active_lease()?;
        self.own_claim
            .as_ref()
            .filter(|claim| claim.lease_id == lease_id)
            .cloned()
    }

    fn is_own(&self, claim: &LeaderClaim) -> bool {
        self.current_claim().as_ref() == Some(claim)
    }
}
