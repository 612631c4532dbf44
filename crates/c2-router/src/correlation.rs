//! Correlation registry for in-flight service calls
//!
//! Maps a correlation key to the single waiter that issued the call. Each
//! entry is a one-shot slot: it is filled at most once and removed as soon
//! as it is filled, cancelled, or its handle is dropped.
//!
//! The map is split into independently locked shards selected by key hash,
//! so replies for unrelated calls do not contend on one lock. No operation
//! waits while holding a shard lock.

#![warn(missing_docs)]

use std::collections::hash_map::{Entry, HashMap, RandomState};
use std::fmt;
use std::hash::{BuildHasher, Hash};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, error};

/// Correlation registry errors
#[derive(Debug, Error)]
pub enum CorrelationError {
    /// Key is already bound to an in-flight call
    #[error("Duplicate correlation key: {0}")]
    DuplicateKey(String),
}

struct Slot<T> {
    generation: u64,
    tx: oneshot::Sender<T>,
}

type Shard<K, T> = Mutex<HashMap<K, Slot<T>>>;

/// Registry of callers waiting for a correlated reply
pub struct CorrelationRegistry<K, T>
where
    K: Eq + Hash + Clone + fmt::Debug,
{
    shards: Box<[Shard<K, T>]>,
    hasher: RandomState,
    next_generation: AtomicU64,
}

impl<K, T> CorrelationRegistry<K, T>
where
    K: Eq + Hash + Clone + fmt::Debug,
{
    /// Shard count used by [`CorrelationRegistry::new`]
    pub const DEFAULT_SHARDS: usize = 16;

    /// Create a registry with the default shard count
    pub fn new() -> Self {
        Self::with_shards(Self::DEFAULT_SHARDS)
    }

    /// Create a registry with `shards` lock domains (at least one)
    pub fn with_shards(shards: usize) -> Self {
        let shards = (0..shards.max(1))
            .map(|_| Mutex::new(HashMap::new()))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            shards,
            hasher: RandomState::new(),
            next_generation: AtomicU64::new(0),
        }
    }

    fn shard(&self, key: &K) -> MutexGuard<'_, HashMap<K, Slot<T>>> {
        let index = (self.hasher.hash_one(key) % self.shards.len() as u64) as usize;
        self.shards[index]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Bind `key` to a new waiting slot.
    ///
    /// Fails with [`CorrelationError::DuplicateKey`] if the key is already
    /// in flight; the existing entry is left untouched.
    pub fn register(self: &Arc<Self>, key: K) -> Result<PendingReply<K, T>, CorrelationError> {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();

        match self.shard(&key).entry(key.clone()) {
            Entry::Occupied(_) => {
                error!(key = ?key, "correlation key already in flight");
                return Err(CorrelationError::DuplicateKey(format!("{:?}", key)));
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Slot { generation, tx });
            }
        }

        Ok(PendingReply {
            key,
            generation,
            rx,
            registry: Arc::clone(self),
        })
    }

    /// Hand `payload` to the caller waiting on `key`.
    ///
    /// Returns false, dropping the payload, when nobody is waiting: the key
    /// was never registered, was already fulfilled, timed out or was
    /// cancelled.
    pub fn deliver(&self, key: &K, payload: T) -> bool {
        let slot = self.shard(key).remove(key);

        match slot {
            Some(slot) => {
                if slot.tx.send(payload).is_ok() {
                    true
                } else {
                    debug!(key = ?key, "waiter went away before its reply arrived");
                    false
                }
            }
            None => {
                debug!(key = ?key, "dropping reply with no waiting caller");
                false
            }
        }
    }

    /// Remove the entry for `key` whatever its state. Idempotent.
    ///
    /// Returns whether an entry was removed.
    pub fn cancel(&self, key: &K) -> bool {
        self.shard(key).remove(key).is_some()
    }

    /// Remove `key` only if it still belongs to the handle of `generation`
    fn release(&self, key: &K, generation: u64) {
        let mut shard = self.shard(key);
        if shard
            .get(key)
            .is_some_and(|slot| slot.generation == generation)
        {
            shard.remove(key);
        }
    }

    /// Check whether `key` is in flight
    pub fn contains(&self, key: &K) -> bool {
        self.shard(key).contains_key(key)
    }

    /// Number of in-flight entries across all shards
    pub fn len(&self) -> usize {
        self.shards
            .iter()
            .map(|shard| shard.lock().unwrap_or_else(PoisonError::into_inner).len())
            .sum()
    }

    /// Check if no call is in flight
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of lock shards
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }
}

impl<K, T> Default for CorrelationRegistry<K, T>
where
    K: Eq + Hash + Clone + fmt::Debug,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, T> fmt::Debug for CorrelationRegistry<K, T>
where
    K: Eq + Hash + Clone + fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CorrelationRegistry")
            .field("shards", &self.shards.len())
            .field("in_flight", &self.len())
            .finish()
    }
}

/// Handle owned by the caller of one in-flight request.
///
/// Dropping the handle releases its registry entry, so an abandoned caller
/// never leaves a slot behind.
pub struct PendingReply<K, T>
where
    K: Eq + Hash + Clone + fmt::Debug,
{
    key: K,
    generation: u64,
    rx: oneshot::Receiver<T>,
    registry: Arc<CorrelationRegistry<K, T>>,
}

impl<K, T> PendingReply<K, T>
where
    K: Eq + Hash + Clone + fmt::Debug,
{
    /// Key this handle is waiting on
    pub fn key(&self) -> &K {
        &self.key
    }

    /// Wait for the reply.
    ///
    /// Resolves to `None` if the entry was cancelled before a reply arrived.
    pub async fn wait(mut self) -> Option<T> {
        (&mut self.rx).await.ok()
    }
}

impl<K, T> Drop for PendingReply<K, T>
where
    K: Eq + Hash + Clone + fmt::Debug,
{
    fn drop(&mut self) {
        self.registry.release(&self.key, self.generation);
    }
}

impl<K, T> fmt::Debug for PendingReply<K, T>
where
    K: Eq + Hash + Clone + fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingReply")
            .field("key", &self.key)
            .field("generation", &self.generation)
            .finish()
    }
}
