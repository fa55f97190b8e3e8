use crossbeam_channel::{Receiver, Sender};
use std::time::Duration;

use crate::common;
use crate::election::backoff::ExponentialBackoff;
use crate::election::ClaimEvent;
use crate::errors::StoreError;
use crate::store::{ConsensusStore, Watch, WatchEvent};

#[derive(Debug)]
pub struct ClaimWatcherParams<S: ConsensusStore> {
    pub store: S,
    pub claim_key: String,
    pub request_timeout: Duration,
    pub backoff: ExponentialBackoff,
    pub claim_event_tx: Sender<ClaimEvent>,
}

enum WatchExit {
    Stop,
    Restart,
}

/// Keeps a watch on the claim key open and forwards every change to the
/// campaign. After each (re)start the current value is forwarded as well,
/// so a deletion that happened while no watch was open is not lost.
pub fn watch_claim_key<S: ConsensusStore>(
    params: ClaimWatcherParams<S>,
    terminate_worker_rx: Receiver<()>,
) {
    info!("Claim watcher worker started for '{}'", params.claim_key);

    let mut backoff = params.backoff;
    loop {
        let exit = match open_watch(&params) {
            Ok(watch) => {
                backoff.reset();
                forward_events(&params, &watch, &terminate_worker_rx)
            }
            Err(StoreError::MemberRemoved(id)) => {
                info!("Member {} removed, claim watcher gives up", id);
                WatchExit::Stop
            }
            Err(err) => {
                let delay = backoff.next_delay();
                warn!("Cannot watch '{}', retrying in {:?}: {}", params.claim_key, delay, err);
                if common::wait_or_terminate(&terminate_worker_rx, delay) {
                    WatchExit::Stop
                } else {
                    WatchExit::Restart
                }
            }
        };

        if let WatchExit::Stop = exit {
            break;
        }
    }

    info!("Claim watcher worker stopped");
}

fn open_watch<S: ConsensusStore>(params: &ClaimWatcherParams<S>) -> Result<Watch, StoreError> {
    let watch = params.store.watch(&params.claim_key)?;
    let current = params.store.get(&params.claim_key, params.request_timeout)?;

    let _ = forward(params, ClaimEvent::from_value(current.as_deref()));

    Ok(watch)
}

fn forward_events<S: ConsensusStore>(
    params: &ClaimWatcherParams<S>,
    watch: &Watch,
    terminate_worker_rx: &Receiver<()>,
) -> WatchExit {
    loop {
        select!(
            recv(terminate_worker_rx) -> _ => return WatchExit::Stop,
            recv(watch.events_rx()) -> event => {
                let claim_event = match event {
                    Ok(WatchEvent::Updated(value)) => ClaimEvent::from_value(Some(&value)),
                    Ok(WatchEvent::Deleted) => ClaimEvent::Vacant,
                    Err(_) => {
                        debug!("Watch on '{}' ended by the store", params.claim_key);
                        return WatchExit::Restart
                    }
                };
                if !forward(params, claim_event) {
                    return WatchExit::Stop
                }
            },
        );
    }
}

fn forward<S: ConsensusStore>(params: &ClaimWatcherParams<S>, event: ClaimEvent) -> bool {
    trace!("Claim event {:?}", event);
    if params.claim_event_tx.send(event).is_err() {
        debug!("Campaign is gone, claim events are no longer consumed");
        return false;
    }
    true
}
