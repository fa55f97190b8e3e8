use parking_lot::RwLock;
use std::sync::Arc;

use crate::election::{CampaignState, LeaderClaim};

/// Immutable view of the campaign, replaced as a whole on every transition.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LeadershipSnapshot {
    pub state: CampaignState,

    /// Last leader known to this process. Can be empty during failover.
    pub leader: Option<LeaderClaim>,
}

impl LeadershipSnapshot {
    pub fn is_leader(&self) -> bool {
        self.state == CampaignState::Leading
    }
}

impl Default for LeadershipSnapshot {
    fn default() -> Self {
        LeadershipSnapshot {
            state: CampaignState::Idle,
            leader: None,
        }
    }
}

/// Publication point of the current `LeadershipSnapshot`. The campaign worker
/// is the only writer; readers get a shared pointer and never a partial value.
#[derive(Clone, Debug, Default)]
pub struct LeadershipStatus {
    snapshot: Arc<RwLock<Arc<LeadershipSnapshot>>>,
}

impl LeadershipStatus {
    pub fn new() -> LeadershipStatus {
        LeadershipStatus::default()
    }

    pub fn current(&self) -> Arc<LeadershipSnapshot> {
        self.snapshot.read().clone()
    }

    pub(crate) fn publish(&self, snapshot: LeadershipSnapshot) {
        *self.snapshot.write() = Arc::new(snapshot);
    }
}
