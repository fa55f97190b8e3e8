use std::time::Duration;

use crate::errors::{MembershipError, StoreError};
use crate::store::{ConsensusStore, Peer};


/// Name-based view of the store's member list. Nothing is cached: every call
/// reads the current list from the store.
#[derive(Clone, Debug)]
pub struct MembershipManager<S: ConsensusStore> {
    store: S,
    request_timeout: Duration,
}

impl<S: ConsensusStore> MembershipManager<S> {
    pub fn new(store: S, request_timeout: Duration) -> MembershipManager<S> {
        MembershipManager {
            store,
            request_timeout,
        }
    }

    /// Current voting members in store order.
    pub fn list(&self) -> Result<Vec<Peer>, StoreError> {
        self.store.list_members(self.request_timeout)
    }

    pub fn find_by_name(&self, name: &str) -> Result<Option<Peer>, StoreError> {
        let members = self.list()?;

        Ok(members.into_iter().find(|peer| peer.name == name))
    }

    /// Removes the member called `name`. A member removed concurrently by
    /// someone else is reported as `NotFound`, same as an unknown name.
    pub fn remove_by_name(&self, name: &str) -> Result<Peer, MembershipError> {
        let peer = match self.find_by_name(name)? {
            Some(peer) => peer,
            None => {
                debug!("Member {} is not in the cluster", name);
                return Err(MembershipError::NotFound(name.to_string()));
            }
        };

        match self.store.remove_member(peer.id, self.request_timeout) {
            Ok(()) => {
                info!("{} removed from the cluster", peer);
                Ok(peer)
            }
            Err(StoreError::MemberNotFound(id)) => {
                debug!("Member {} ({}) was already removed", name, id);
                Err(MembershipError::NotFound(name.to_string()))
            }
            Err(err) => Err(MembershipError::Store(err)),
        }
    }
}
