//! Accession loading with one in-flight load per accession.
//!
//! The first caller for a key becomes the leader and runs the provider. Callers that
//! arrive while the load is running subscribe to it and receive the leader's
//! structure when it finishes, so a burst of requests for one accession parses the
//! file once. If the leader fails, waiters wake up and retry; one of them becomes
//! the next leader. There is no timeout: a stalled provider stalls every waiter for
//! that accession.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use crate::domain::ParsingOptions;
use crate::error::KiraError;
use crate::reader::StructureProvider;
use crate::structure::Structure;

#[derive(Debug)]
enum LoadOutcome {
    Loaded(Arc<Structure>),
    Failed,
}

#[derive(Debug)]
pub struct PendingLoad {
    outcome: Mutex<Option<LoadOutcome>>,
    ready: Condvar,
    waiters: AtomicUsize,
}

impl PendingLoad {
    fn new() -> Self {
        Self {
            outcome: Mutex::new(None),
            ready: Condvar::new(),
            waiters: AtomicUsize::new(0),
        }
    }

    /// Blocks until the leader finishes. `None` means the leader failed.
    pub fn wait(&self) -> Option<Arc<Structure>> {
        self.waiters.fetch_add(1, Ordering::SeqCst);
        let mut outcome = lock(&self.outcome);
        while outcome.is_none() {
            outcome = self
                .ready
                .wait(outcome)
                .unwrap_or_else(PoisonError::into_inner);
        }
        self.waiters.fetch_sub(1, Ordering::SeqCst);
        match outcome.as_ref() {
            Some(LoadOutcome::Loaded(structure)) => Some(Arc::clone(structure)),
            _ => None,
        }
    }

    pub fn waiters(&self) -> usize {
        self.waiters.load(Ordering::SeqCst)
    }

    fn publish(&self, result: LoadOutcome) {
        *lock(&self.outcome) = Some(result);
        self.ready.notify_all();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug)]
pub enum LoadTicket<'a> {
    Leader(LoadGuard<'a>),
    Follower(Arc<PendingLoad>),
}

/// Registry of accessions currently being loaded.
#[derive(Debug, Default)]
pub struct InFlightLoads {
    loads: Mutex<HashMap<String, Arc<PendingLoad>>>,
}

impl InFlightLoads {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `key` unless a load is already running, in which case the caller
    /// gets a handle to wait on. Check and insert happen under one lock.
    pub fn try_begin_load(&self, key: &str) -> LoadTicket<'_> {
        let mut loads = lock(&self.loads);
        if let Some(pending) = loads.get(key) {
            return LoadTicket::Follower(Arc::clone(pending));
        }
        let pending = Arc::new(PendingLoad::new());
        loads.insert(key.to_string(), Arc::clone(&pending));
        LoadTicket::Leader(LoadGuard {
            registry: self,
            key: key.to_string(),
            pending,
            outcome: None,
        })
    }

    fn end_load(&self, key: &str) {
        lock(&self.loads).remove(key);
    }

    pub fn is_loading(&self, key: &str) -> bool {
        lock(&self.loads).contains_key(key)
    }

    /// Snapshot of the keys currently in flight.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = lock(&self.loads).keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn waiters(&self, key: &str) -> usize {
        lock(&self.loads)
            .get(key)
            .map(|pending| pending.waiters())
            .unwrap_or(0)
    }
}

/// Held by the leader for the duration of a load. Dropping it deregisters the key
/// and wakes every waiter, on success, error or unwind alike.
#[derive(Debug)]
pub struct LoadGuard<'a> {
    registry: &'a InFlightLoads,
    key: String,
    pending: Arc<PendingLoad>,
    outcome: Option<Arc<Structure>>,
}

impl LoadGuard<'_> {
    pub fn complete(mut self, structure: Arc<Structure>) {
        self.outcome = Some(structure);
    }
}

impl Drop for LoadGuard<'_> {
    fn drop(&mut self) {
        self.registry.end_load(&self.key);
        let outcome = match self.outcome.take() {
            Some(structure) => LoadOutcome::Loaded(structure),
            None => LoadOutcome::Failed,
        };
        self.pending.publish(outcome);
    }
}

pub struct AccessionLoader<P: StructureProvider> {
    provider: P,
    in_flight: InFlightLoads,
}

impl<P: StructureProvider> AccessionLoader<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            in_flight: InFlightLoads::new(),
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn in_flight(&self) -> &InFlightLoads {
        &self.in_flight
    }

    /// Full structure for `code`; the code is case-insensitive.
    pub fn load(&self, code: &str, options: &ParsingOptions) -> Result<Arc<Structure>, KiraError> {
        let key = code.trim().to_lowercase();
        loop {
            match self.in_flight.try_begin_load(&key) {
                LoadTicket::Leader(guard) => {
                    tracing::info!(pdb = %key, "loading structure");
                    let structure = self
                        .provider
                        .parse_accession(&key, options)
                        .map_err(|err| KiraError::Load {
                            accession: key.clone(),
                            message: err.to_string(),
                        })?;
                    let structure = Arc::new(structure);
                    guard.complete(Arc::clone(&structure));
                    return Ok(structure);
                }
                LoadTicket::Follower(pending) => {
                    tracing::debug!(pdb = %key, "waiting for in-flight load");
                    if let Some(structure) = pending.wait() {
                        return Ok(structure);
                    }
                    tracing::debug!(pdb = %key, "in-flight load failed, retrying");
                }
            }
        }
    }
}
