use crossbeam_channel::Sender;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::errors::StoreError;
use crate::store::{ConsensusStore, LeaseId, MemberId, Peer, PutOutcome, Watch, WatchEvent};

/// Store double for unit tests. Leases never expire on their own; tests
/// expire them explicitly.
#[derive(Clone, Debug)]
pub struct MockStore {
    member_id: MemberId,
    state: Arc<Mutex<MockState>>,
}

#[derive(Debug, Default)]
struct MockState {
    keys: HashMap<String, (Vec<u8>, LeaseId)>,
    leases: HashSet<LeaseId>,
    next_lease_id: LeaseId,
    members: Vec<Peer>,
    watchers: HashMap<String, Vec<Sender<WatchEvent>>>,
    unavailable: bool,
    hang_keep_alives: bool,
    slow_deletes: bool,
    keep_alive_calls: u32,
    longest_keep_alive_timeout: Duration,
    put_calls: u32,
    fail_puts: u32,
}

impl MockStore {
    pub fn new(member_id: MemberId) -> MockStore {
        MockStore {
            member_id,
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    /// Client of the same store acting for another member.
    pub fn client(&self, member_id: MemberId) -> MockStore {
        MockStore {
            member_id,
            state: self.state.clone(),
        }
    }

    pub fn add_member(&self, id: MemberId, name: &str) {
        self.state.lock().members.push(Peer {
            id,
            name: name.to_string(),
            peer_urls: vec![format!("http://{}:2380", name)],
            client_urls: vec![format!("http://{}:2379", name)],
        });
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().unavailable = unavailable;
    }

    /// Makes the next `count` puts time out after being applied.
    pub fn fail_puts_after_apply(&self, count: u32) {
        self.state.lock().fail_puts = count;
    }

    /// Keep-alives block for their whole timeout, then time out.
    pub fn hang_keep_alives(&self, hang: bool) {
        self.state.lock().hang_keep_alives = hang;
    }

    /// Compare-and-delete blocks for its whole timeout, then times out.
    pub fn slow_deletes(&self, slow: bool) {
        self.state.lock().slow_deletes = slow;
    }

    pub fn expire_lease(&self, lease_id: LeaseId) {
        let mut state = self.state.lock();
        state.leases.remove(&lease_id);
        let bound: Vec<String> = state
            .keys
            .iter()
            .filter(|(_, (_, lease))| *lease == lease_id)
            .map(|(key, _)| key.clone())
            .collect();
        for key in bound {
            state.keys.remove(&key);
            state.notify(&key, WatchEvent::Deleted);
        }
    }

    pub fn put_raw(&self, key: &str, value: &[u8]) {
        let mut state = self.state.lock();
        state.keys.insert(key.to_string(), (value.to_vec(), 0));
        state.notify(key, WatchEvent::Updated(value.to_vec()));
    }

    pub fn value(&self, key: &str) -> Option<Vec<u8>> {
        self.state.lock().keys.get(key).map(|(value, _)| value.clone())
    }

    pub fn keep_alive_calls(&self) -> u32 {
        self.state.lock().keep_alive_calls
    }

    pub fn longest_keep_alive_timeout(&self) -> Duration {
        self.state.lock().longest_keep_alive_timeout
    }

    pub fn put_calls(&self) -> u32 {
        self.state.lock().put_calls
    }

    fn check(&self, state: &MockState) -> Result<(), StoreError> {
        if state.unavailable {
            return Err(StoreError::Unavailable("mock store is down".to_string()));
        }
        if !state.members.is_empty() && !state.members.iter().any(|m| m.id == self.member_id) {
            return Err(StoreError::MemberRemoved(self.member_id));
        }
        Ok(())
    }
}

impl MockState {
    fn notify(&mut self, key: &str, event: WatchEvent) {
        if let Some(watchers) = self.watchers.get_mut(key) {
            watchers.retain(|tx| tx.send(event.clone()).is_ok());
        }
    }
}

impl ConsensusStore for MockStore {
    fn put_if_absent(
        &self,
        key: &str,
        value: &[u8],
        lease_id: LeaseId,
        _timeout: Duration,
    ) -> Result<PutOutcome, StoreError> {
        let mut state = self.state.lock();
        self.check(&state)?;
        state.put_calls += 1;
        if !state.leases.contains(&lease_id) {
            return Err(StoreError::LeaseNotFound(lease_id));
        }
        if state.keys.contains_key(key) {
            return Ok(PutOutcome::Conflict);
        }
        state.keys.insert(key.to_string(), (value.to_vec(), lease_id));
        state.notify(key, WatchEvent::Updated(value.to_vec()));

        if state.fail_puts > 0 {
            state.fail_puts -= 1;
            return Err(StoreError::Timeout("put response lost".to_string()));
        }
        Ok(PutOutcome::Created)
    }

    fn get(&self, key: &str, _timeout: Duration) -> Result<Option<Vec<u8>>, StoreError> {
        let state = self.state.lock();
        self.check(&state)?;
        Ok(state.keys.get(key).map(|(value, _)| value.clone()))
    }

    fn delete_if_value(
        &self,
        key: &str,
        expected: &[u8],
        timeout: Duration,
    ) -> Result<bool, StoreError> {
        let mut state = self.state.lock();
        self.check(&state)?;
        if state.slow_deletes {
            drop(state);
            thread::sleep(timeout);
            return Err(StoreError::Timeout("delete".to_string()));
        }
        let owned = matches!(state.keys.get(key), Some((value, _)) if value.as_slice() == expected);
        if owned {
            state.keys.remove(key);
            state.notify(key, WatchEvent::Deleted);
        }
        Ok(owned)
    }

    fn watch(&self, key: &str) -> Result<Watch, StoreError> {
        let mut state = self.state.lock();
        self.check(&state)?;
        let (events_tx, events_rx) = crossbeam_channel::unbounded();
        state
            .watchers
            .entry(key.to_string())
            .or_insert_with(Vec::new)
            .push(events_tx);
        Ok(Watch::new(events_rx))
    }

    fn grant_lease(&self, _ttl: Duration, _timeout: Duration) -> Result<LeaseId, StoreError> {
        let mut state = self.state.lock();
        self.check(&state)?;
        state.next_lease_id += 1;
        let lease_id = state.next_lease_id;
        state.leases.insert(lease_id);
        Ok(lease_id)
    }

    fn keep_alive(&self, lease_id: LeaseId, timeout: Duration) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        state.keep_alive_calls += 1;
        state.longest_keep_alive_timeout = state.longest_keep_alive_timeout.max(timeout);
        self.check(&state)?;
        if state.hang_keep_alives {
            drop(state);
            thread::sleep(timeout);
            return Err(StoreError::Timeout("keep-alive".to_string()));
        }
        if !state.leases.contains(&lease_id) {
            return Err(StoreError::LeaseNotFound(lease_id));
        }
        Ok(())
    }

    fn list_members(&self, _timeout: Duration) -> Result<Vec<Peer>, StoreError> {
        let state = self.state.lock();
        if state.unavailable {
            return Err(StoreError::Unavailable("mock store is down".to_string()));
        }
        Ok(state.members.clone())
    }

    fn remove_member(&self, id: MemberId, _timeout: Duration) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        if state.unavailable {
            return Err(StoreError::Unavailable("mock store is down".to_string()));
        }
        let before = state.members.len();
        state.members.retain(|m| m.id != id);
        if state.members.len() == before {
            return Err(StoreError::MemberNotFound(id));
        }
        Ok(())
    }

    fn member_id(&self) -> MemberId {
        self.member_id
    }
}
