use crossbeam_channel::Receiver;
use std::time::Duration;

use crate::errors::StoreError;

#[cfg(test)]
pub(crate) mod mock;

/// Identifier assigned by the store when a process joins the cluster.
/// Any value, zero included, is a valid id.
pub type MemberId = u64;

pub type LeaseId = u64;

/// Cluster member as recorded by the consensus store.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Display)]
#[display(fmt = "Member {} ({})", name, id)]
pub struct Peer {
    pub id: MemberId,
    pub name: String,
    pub peer_urls: Vec<String>,
    pub client_urls: Vec<String>,
}

/// Result of an atomic create.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Display)]
pub enum PutOutcome {
    /// The key was absent and now holds the value.
    Created,

    /// The key already existed. Nothing was written.
    Conflict,
}

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum WatchEvent {
    Updated(Vec<u8>),
    Deleted,
}

/// Stream of changes of a single key. The stream is infinite until the
/// `Watch` is dropped, which cancels it. A disconnected channel means the
/// store ended the watch; a new one may be opened at any time.
#[derive(Debug)]
pub struct Watch {
    events_rx: Receiver<WatchEvent>,
}

impl Watch {
    pub fn new(events_rx: Receiver<WatchEvent>) -> Watch {
        Watch { events_rx }
    }

    pub fn events_rx(&self) -> &Receiver<WatchEvent> {
        &self.events_rx
    }
}

/// Client side of the replicated consensus store. Every call is bounded by
/// the caller-supplied timeout and reports `StoreError::Timeout` when it
/// expires.
pub trait ConsensusStore: Clone + Send + Sync + 'static {
    /// Creates `key` bound to `lease_id` unless it already exists.
    fn put_if_absent(
        &self,
        key: &str,
        value: &[u8],
        lease_id: LeaseId,
        timeout: Duration,
    ) -> Result<PutOutcome, StoreError>;

    fn get(&self, key: &str, timeout: Duration) -> Result<Option<Vec<u8>>, StoreError>;

    /// Deletes `key` only if it currently holds `expected`. Returns whether a
    /// delete happened.
    fn delete_if_value(
        &self,
        key: &str,
        expected: &[u8],
        timeout: Duration,
    ) -> Result<bool, StoreError>;

    fn watch(&self, key: &str) -> Result<Watch, StoreError>;

    fn grant_lease(&self, ttl: Duration, timeout: Duration) -> Result<LeaseId, StoreError>;

    /// Extends the lease by its ttl. Must be called more often than ttl/2.
    fn keep_alive(&self, lease_id: LeaseId, timeout: Duration) -> Result<(), StoreError>;

    /// Voting members in insertion order.
    fn list_members(&self, timeout: Duration) -> Result<Vec<Peer>, StoreError>;

    fn remove_member(&self, id: MemberId, timeout: Duration) -> Result<(), StoreError>;

    /// Id of the member this client acts for.
    fn member_id(&self) -> MemberId;
}
