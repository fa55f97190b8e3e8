use serde::{Deserialize, Serialize};

use crate::store::{LeaseId, MemberId};

pub mod backoff;
pub mod campaign;
pub mod status;
pub mod watcher;

/// States of the election campaign of one process.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Display)]
pub enum CampaignState {
    /// Resolving who holds the claim key.
    Idle,

    /// Another process leads; the claim key is watched.
    Following,

    /// Trying to create the claim key.
    Campaigning,

    /// This process owns the claim key.
    Leading,

    /// Graceful shutdown in progress.
    Resigning,

    /// This process is no longer a cluster member and stopped campaigning.
    Removed,
}

/// Value stored under the claim key by the current leader.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize, Display)]
#[display(fmt = "{} (member {}) at {}, lease {}", name, member_id, addr, lease_id)]
pub struct LeaderClaim {
    pub member_id: MemberId,
    pub name: String,
    /// Advertised client address, used by followers to redirect clients.
    pub addr: String,
    pub lease_id: LeaseId,
}

impl LeaderClaim {
    pub fn encode(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("leader claim is serializable")
    }

    pub fn decode(value: &[u8]) -> Result<LeaderClaim, serde_json::Error> {
        serde_json::from_slice(value)
    }
}

/// Change of the claim key as seen by the claim watcher.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ClaimEvent {
    Claimed(LeaderClaim),

    /// The key holds a value that is not a valid claim.
    Unreadable,

    Vacant,
}

impl ClaimEvent {
    pub fn from_value(value: Option<&[u8]>) -> ClaimEvent {
        match value {
            None => ClaimEvent::Vacant,
            Some(value) => match LeaderClaim::decode(value) {
                Ok(claim) => ClaimEvent::Claimed(claim),
                Err(err) => {
                    warn!("Cannot decode leader claim: {}", err);
                    ClaimEvent::Unreadable
                }
            },
        }
    }
}
