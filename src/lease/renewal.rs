use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use std::cmp;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::errors::StoreError;
use crate::lease::{LeaseLossReason, LeaseLost, LeaseState, MAX_CONSECUTIVE_RENEWAL_FAILURES};
use crate::store::{ConsensusStore, LeaseId};

#[derive(Debug)]
pub struct RenewLeaseParams<S: ConsensusStore> {
    pub store: S,
    pub lease_id: LeaseId,
    pub ttl: Duration,
    /// When the grant request was sent. The store cannot expire the lease
    /// earlier than one ttl after this.
    pub granted_at: Instant,
    pub renewal_interval: Duration,
    pub request_timeout: Duration,
    pub state: Arc<Mutex<LeaseState>>,
    pub lease_lost_tx: Sender<LeaseLost>,
}

/// Renewal worker. The lease counts as lost once it goes one ttl without a
/// successful renewal, whatever the store answers in between.
pub fn renew_lease<S: ConsensusStore>(params: RenewLeaseParams<S>, terminate_worker_rx: Receiver<()>) {
    trace!("Lease {} renewal worker started", params.lease_id);

    let ticker = crossbeam_channel::tick(params.renewal_interval);
    let mut expires_at = params.granted_at + params.ttl;
    let mut consecutive_failures = 0;
    loop {
        let deadline = crossbeam_channel::at(expires_at);
        let loss = select!(
            recv(terminate_worker_rx) -> _ => break,
            recv(deadline) -> _ => {
                warn!("Lease {} was not renewed within {:?}", params.lease_id, params.ttl);
                Some(LeaseLossReason::RenewalFailed)
            },
            recv(ticker) -> _ => {
                let sent_at = Instant::now();
                let timeout = keep_alive_timeout(
                    params.request_timeout,
                    params.renewal_interval,
                    expires_at.saturating_duration_since(sent_at),
                );
                let result = params.store.keep_alive(params.lease_id, timeout);
                let renewed = result.is_ok();
                match check_renewal(params.lease_id, result, &mut consecutive_failures) {
                    Some(reason) => Some(reason),
                    None if renewed => {
                        expires_at = sent_at + params.ttl;
                        None
                    }
                    None if Instant::now() >= expires_at => Some(LeaseLossReason::RenewalFailed),
                    None => None,
                }
            },
        );

        if let Some(reason) = loss {
            *params.state.lock() = LeaseState::None;

            let lost = LeaseLost { lease_id: params.lease_id, reason };
            warn!("{}", lost);
            if params.lease_lost_tx.send(lost).is_err() {
                debug!("Lease {} owner is gone", params.lease_id);
            }
            break;
        }
    }

    trace!("Lease {} renewal worker stopped", params.lease_id);
}

/// A single keep-alive never outlasts the renewal interval or the time the
/// lease has left.
fn keep_alive_timeout(request_timeout: Duration, renewal_interval: Duration, remaining: Duration) -> Duration {
    cmp::min(cmp::min(request_timeout, renewal_interval), remaining)
}

fn check_renewal(
    lease_id: LeaseId,
    result: Result<(), StoreError>,
    consecutive_failures: &mut u32,
) -> Option<LeaseLossReason> {
    match result {
        Ok(()) => {
            *consecutive_failures = 0;
            trace!("Lease {} renewed", lease_id);
            None
        }
        Err(StoreError::LeaseNotFound(_)) => Some(LeaseLossReason::Expired),
        Err(StoreError::MemberRemoved(_)) => Some(LeaseLossReason::MemberRemoved),
        Err(err) => {
            *consecutive_failures += 1;
            warn!(
                "Lease {} renewal failed ({} in a row): {}",
                lease_id, consecutive_failures, err
            );
            if *consecutive_failures >= MAX_CONSECUTIVE_RENEWAL_FAILURES {
                Some(LeaseLossReason::RenewalFailed)
            } else {
                None
            }
        }
    }
}
