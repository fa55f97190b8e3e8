#![warn(missing_debug_implementations, unsafe_code)]

//! Leader election and cluster membership on top of a replicated consensus
//! store. Each process runs a [`Server`]: it campaigns for a lease-bound claim
//! key, follows whoever holds it otherwise, and exposes name-based membership
//! operations over the store's member list.

#[macro_use]
extern crate log;
#[macro_use]
extern crate crossbeam_channel;
#[macro_use]
extern crate derive_more;

mod common;
mod election;
mod errors;
mod lease;
mod membership;
mod server;
mod store;

pub use common::{run_worker, wait_or_terminate, Worker};
pub use election::backoff::ExponentialBackoff;
pub use election::status::{LeadershipSnapshot, LeadershipStatus};
pub use election::{CampaignState, ClaimEvent, LeaderClaim};
pub use errors::{new_err, CoordinatorError, MembershipError, Result, StoreError};
pub use lease::{
    LeaseKeeper, LeaseLossReason, LeaseLost, LeaseRenewal, LeaseState, MAX_CONSECUTIVE_RENEWAL_FAILURES,
};
pub use membership::MembershipManager;
pub use server::configuration::{ElectionTimings, ServerConfig, DEFAULT_ROOT_PATH};
pub use server::Server;
pub use store::{ConsensusStore, LeaseId, MemberId, Peer, PutOutcome, Watch, WatchEvent};
