use coordinator::{ConsensusStore, LeaseId, MemberId, Peer, PutOutcome, StoreError, Watch, WatchEvent};
use crossbeam_channel::Sender;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::{Duration, Instant};


const LEASE_REAPER_INTERVAL: Duration = Duration::from_millis(10);

/// In-process consensus store shared by all members of a local cluster.
/// Leases expire on their own: bound keys are deleted and watchers notified
/// once a lease is not renewed within its ttl.
#[derive(Clone, Debug)]
pub struct MemoryStore {
    state: Arc<Mutex<StoreState>>,
}

#[derive(Debug, Default)]
struct StoreState {
    keys: HashMap<String, KeyEntry>,
    leases: HashMap<LeaseId, LeaseEntry>,
    last_lease_id: LeaseId,
    members: Vec<Peer>,
    removed_members: HashSet<MemberId>,
    watchers: HashMap<String, Vec<Watcher>>,
}

#[derive(Debug)]
struct KeyEntry {
    value: Vec<u8>,
    lease_id: LeaseId,
}

#[derive(Debug)]
struct LeaseEntry {
    ttl: Duration,
    deadline: Instant,
    keys: HashSet<String>,
}

#[derive(Debug)]
struct Watcher {
    member_id: MemberId,
    events_tx: Sender<WatchEvent>,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        let state = Arc::new(Mutex::new(StoreState::default()));
        run_lease_reaper(Arc::downgrade(&state));

        MemoryStore { state }
    }

    /// Registers a member. Adding a name twice returns the existing member.
    pub fn add_member(&self, name: &str, peer_urls: Vec<String>, client_urls: Vec<String>) -> Peer {
        let mut state = self.state.lock();
        if let Some(peer) = state.members.iter().find(|peer| peer.name == name) {
            return peer.clone();
        }

        let id = loop {
            let id = rand::random::<MemberId>();
            if !state.members.iter().any(|peer| peer.id == id) && !state.removed_members.contains(&id) {
                break id;
            }
        };
        let peer = Peer {
            id,
            name: name.to_string(),
            peer_urls,
            client_urls,
        };
        info!("{} joined the store", peer);
        state.members.push(peer.clone());

        peer
    }

    /// Client acting for `member_id`.
    pub fn client(&self, member_id: MemberId) -> MemoryStoreClient {
        MemoryStoreClient {
            member_id,
            store: self.clone(),
            available: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Current value of `key`, bypassing any client.
    pub fn value(&self, key: &str) -> Option<Vec<u8>> {
        let mut state = self.state.lock();
        state.expire_leases(Instant::now());
        state.keys.get(key).map(|entry| entry.value.clone())
    }

    pub fn lease_count(&self) -> usize {
        let mut state = self.state.lock();
        state.expire_leases(Instant::now());
        state.leases.len()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        MemoryStore::new()
    }
}

fn run_lease_reaper(state: Weak<Mutex<StoreState>>) {
    let spawned = thread::Builder::new()
        .name("store-lease-reaper".to_string())
        .spawn(move || loop {
            thread::sleep(LEASE_REAPER_INTERVAL);
            match state.upgrade() {
                Some(state) => state.lock().expire_leases(Instant::now()),
                None => break,
            }
        });

    if let Err(err) = spawned {
        // leases still expire lazily on every store call
        warn!("Cannot start lease reaper: {}", err);
    }
}

impl StoreState {
    fn expire_leases(&mut self, now: Instant) {
        let expired: Vec<LeaseId> = self
            .leases
            .iter()
            .filter(|(_, lease)| lease.deadline <= now)
            .map(|(lease_id, _)| *lease_id)
            .collect();

        for lease_id in expired {
            if let Some(lease) = self.leases.remove(&lease_id) {
                debug!("Lease {} expired, deleting {} key(s)", lease_id, lease.keys.len());
                for key in lease.keys {
                    self.keys.remove(&key);
                    self.notify(&key, WatchEvent::Deleted);
                }
            }
        }
    }

    fn notify(&mut self, key: &str, event: WatchEvent) {
        if let Some(watchers) = self.watchers.get_mut(key) {
            watchers.retain(|watcher| watcher.events_tx.send(event.clone()).is_ok());
        }
    }

    fn remove_key(&mut self, key: &str) {
        if let Some(entry) = self.keys.remove(key) {
            if let Some(lease) = self.leases.get_mut(&entry.lease_id) {
                lease.keys.remove(key);
            }
            self.notify(key, WatchEvent::Deleted);
        }
    }
}

/// Handle of one member on a `MemoryStore`. A removed member gets
/// `MemberRemoved` from every call; an unavailable client gets `Unavailable`.
#[derive(Clone, Debug)]
pub struct MemoryStoreClient {
    member_id: MemberId,
    store: MemoryStore,
    available: Arc<AtomicBool>,
}

impl MemoryStoreClient {
    /// Cuts this client (and its clones) off the store, or reconnects it.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    fn lock(&self) -> Result<parking_lot::MutexGuard<'_, StoreState>, StoreError> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(format!(
                "member {} is cut off the store",
                self.member_id
            )));
        }

        let mut state = self.store.state.lock();
        if state.removed_members.contains(&self.member_id) {
            return Err(StoreError::MemberRemoved(self.member_id));
        }
        state.expire_leases(Instant::now());

        Ok(state)
    }
}

impl ConsensusStore for MemoryStoreClient {
    fn put_if_absent(
        &self,
        key: &str,
        value: &[u8],
        lease_id: LeaseId,
        _timeout: Duration,
    ) -> Result<PutOutcome, StoreError> {
        let mut state = self.lock()?;
        if !state.leases.contains_key(&lease_id) {
            return Err(StoreError::LeaseNotFound(lease_id));
        }
        if state.keys.contains_key(key) {
            return Ok(PutOutcome::Conflict);
        }

        state.keys.insert(
            key.to_string(),
            KeyEntry {
                value: value.to_vec(),
                lease_id,
            },
        );
        if let Some(lease) = state.leases.get_mut(&lease_id) {
            lease.keys.insert(key.to_string());
        }
        state.notify(key, WatchEvent::Updated(value.to_vec()));

        Ok(PutOutcome::Created)
    }

    fn get(&self, key: &str, _timeout: Duration) -> Result<Option<Vec<u8>>, StoreError> {
        let state = self.lock()?;

        Ok(state.keys.get(key).map(|entry| entry.value.clone()))
    }

    fn delete_if_value(
        &self,
        key: &str,
        expected: &[u8],
        _timeout: Duration,
    ) -> Result<bool, StoreError> {
        let mut state = self.lock()?;
        let matches = state
            .keys
            .get(key)
            .map_or(false, |entry| entry.value.as_slice() == expected);
        if matches {
            state.remove_key(key);
        }

        Ok(matches)
    }

    fn watch(&self, key: &str) -> Result<Watch, StoreError> {
        let mut state = self.lock()?;
        let (events_tx, events_rx) = crossbeam_channel::unbounded();
        state
            .watchers
            .entry(key.to_string())
            .or_insert_with(Vec::new)
            .push(Watcher {
                member_id: self.member_id,
                events_tx,
            });

        Ok(Watch::new(events_rx))
    }

    fn grant_lease(&self, ttl: Duration, _timeout: Duration) -> Result<LeaseId, StoreError> {
        let mut state = self.lock()?;
        state.last_lease_id += 1;
        let lease_id = state.last_lease_id;
        state.leases.insert(
            lease_id,
            LeaseEntry {
                ttl,
                deadline: Instant::now() + ttl,
                keys: HashSet::new(),
            },
        );
        trace!("Lease {} granted to member {} (ttl {:?})", lease_id, self.member_id, ttl);

        Ok(lease_id)
    }

    fn keep_alive(&self, lease_id: LeaseId, _timeout: Duration) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        match state.leases.get_mut(&lease_id) {
            Some(lease) => {
                lease.deadline = Instant::now() + lease.ttl;
                Ok(())
            }
            None => Err(StoreError::LeaseNotFound(lease_id)),
        }
    }

    fn list_members(&self, _timeout: Duration) -> Result<Vec<Peer>, StoreError> {
        let state = self.lock()?;

        Ok(state.members.clone())
    }

    fn remove_member(&self, id: MemberId, _timeout: Duration) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        let position = state
            .members
            .iter()
            .position(|peer| peer.id == id)
            .ok_or(StoreError::MemberNotFound(id))?;

        let peer = state.members.remove(position);
        state.removed_members.insert(id);
        for watchers in state.watchers.values_mut() {
            watchers.retain(|watcher| watcher.member_id != id);
        }
        info!("{} removed by member {}", peer, self.member_id);

        Ok(())
    }

    fn member_id(&self) -> MemberId {
        self.member_id
    }
}
