use std::collections::VecDeque;
use std::fmt;

use spiralstream_common::{InstanceId, PoolId, PoolKind};

/// Instances that can live in an [`ObjectPool`].
pub trait Poolable {
    /// Clear transient state (transform, velocity, enable flags) before the
    /// instance goes idle.
    fn reset(&mut self);
}

/// Lifecycle state of one pool entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Idle,
    Active,
}

/// Errors raised when a pool is constructed with unusable parameters.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    #[error("{kind} pool capacity must be at least 1")]
    ZeroCapacity { kind: PoolKind },
}

/// Running counters for one pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub constructed: u64,
    pub acquired: u64,
    pub released: u64,
    pub exhausted: u64,
    pub invalid_releases: u64,
}

struct Entry<T> {
    instance: T,
    state: EntryState,
    generation: u32,
}

/// Bounded recycling container for one kind of instance.
///
/// Instances are constructed lazily through the factory until `capacity`
/// exist; after that only idle instances are handed out. The pool never
/// grows past its capacity: `constructed == idle + active <= capacity`.
/// Every pool gets a process-unique [`PoolId`] and only honours handles
/// carrying it.
pub struct ObjectPool<T: Poolable> {
    id: PoolId,
    kind: PoolKind,
    capacity: usize,
    entries: Vec<Entry<T>>,
    idle: VecDeque<u32>,
    active: usize,
    factory: Box<dyn FnMut() -> T>,
    stats: PoolStats,
}

impl<T: Poolable> ObjectPool<T> {
    /// Create an empty pool. Fails when `capacity` is zero.
    pub fn new(
        kind: PoolKind,
        capacity: usize,
        factory: impl FnMut() -> T + 'static,
    ) -> Result<Self, PoolError> {
        if capacity == 0 {
            return Err(PoolError::ZeroCapacity { kind });
        }
        Ok(Self {
            id: PoolId::next(),
            kind,
            capacity,
            entries: Vec::new(),
            idle: VecDeque::new(),
            active: 0,
            factory: Box::new(factory),
            stats: PoolStats::default(),
        })
    }

    /// Construct up to `count` idle instances ahead of time, never exceeding
    /// capacity. Returns how many were built.
    pub fn prewarm(&mut self, count: usize) -> usize {
        let mut built = 0;
        while built < count && self.entries.len() < self.capacity {
            let slot = self.construct();
            self.idle.push_back(slot);
            built += 1;
        }
        if built > 0 {
            tracing::debug!(kind = %self.kind, built, "pool prewarmed");
        }
        built
    }

    /// Hand out an instance, constructing one if none is idle and capacity
    /// allows. Returns `None` when the pool is exhausted.
    pub fn acquire(&mut self) -> Option<InstanceId> {
        let slot = match self.idle.pop_front() {
            Some(slot) => slot,
            None if self.entries.len() < self.capacity => self.construct(),
            None => {
                self.stats.exhausted += 1;
                tracing::debug!(kind = %self.kind, capacity = self.capacity, "pool exhausted");
                return None;
            }
        };

        let entry = &mut self.entries[slot as usize];
        entry.generation = entry.generation.wrapping_add(1);
        entry.state = EntryState::Active;
        self.active += 1;
        self.stats.acquired += 1;
        Some(InstanceId::new(self.id, self.kind, slot, entry.generation))
    }

    /// Return an instance to the pool.
    ///
    /// Foreign, stale or already idle handles are ignored with a warning and
    /// leave the bookkeeping untouched. Returns whether the release happened.
    pub fn release(&mut self, id: InstanceId) -> bool {
        if !self.owns(id) {
            self.stats.invalid_releases += 1;
            tracing::warn!(pool = %self.id, kind = %self.kind, %id, "release of instance owned by another pool ignored");
            return false;
        }
        let Some(entry) = self.entries.get_mut(id.slot as usize) else {
            self.stats.invalid_releases += 1;
            tracing::warn!(kind = %self.kind, %id, "release of unknown instance ignored");
            return false;
        };
        if entry.generation != id.generation || entry.state != EntryState::Active {
            self.stats.invalid_releases += 1;
            tracing::warn!(kind = %self.kind, %id, "release of idle or stale instance ignored");
            return false;
        }

        entry.instance.reset();
        entry.state = EntryState::Idle;
        self.active -= 1;
        self.idle.push_back(id.slot);
        self.stats.released += 1;
        true
    }

    /// Release every active instance. Returns the handles that were active.
    pub fn release_all(&mut self) -> Vec<InstanceId> {
        let ids: Vec<InstanceId> = self.iter_active().map(|(id, _)| id).collect();
        for id in &ids {
            self.release(*id);
        }
        ids
    }

    /// Whether `id` refers to a currently active instance of this pool.
    pub fn is_active(&self, id: InstanceId) -> bool {
        self.entry(id).is_some()
    }

    /// Borrow an active instance.
    pub fn get(&self, id: InstanceId) -> Option<&T> {
        self.entry(id).map(|e| &e.instance)
    }

    /// Mutably borrow an active instance.
    pub fn get_mut(&mut self, id: InstanceId) -> Option<&mut T> {
        if !self.owns(id) {
            return None;
        }
        self.entries
            .get_mut(id.slot as usize)
            .filter(|e| e.state == EntryState::Active && e.generation == id.generation)
            .map(|e| &mut e.instance)
    }

    /// Iterate over all active instances.
    pub fn iter_active(&self) -> impl Iterator<Item = (InstanceId, &T)> {
        let (pool, kind) = (self.id, self.kind);
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.state == EntryState::Active)
            .map(move |(slot, e)| {
                (InstanceId::new(pool, kind, slot as u32, e.generation), &e.instance)
            })
    }

    pub fn id(&self) -> PoolId {
        self.id
    }

    pub fn kind(&self) -> PoolKind {
        self.kind
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn active_count(&self) -> usize {
        self.active
    }

    pub fn idle_count(&self) -> usize {
        self.idle.len()
    }

    /// Number of instances ever built by the factory.
    pub fn constructed_count(&self) -> usize {
        self.entries.len()
    }

    pub fn stats(&self) -> PoolStats {
        self.stats
    }

    fn construct(&mut self) -> u32 {
        let slot = self.entries.len() as u32;
        let instance = (self.factory)();
        self.entries.push(Entry {
            instance,
            state: EntryState::Idle,
            generation: 0,
        });
        self.stats.constructed += 1;
        slot
    }

    /// Whether `id` was issued by this pool, regardless of its state.
    fn owns(&self, id: InstanceId) -> bool {
        id.pool == self.id && id.kind == self.kind
    }

    fn entry(&self, id: InstanceId) -> Option<&Entry<T>> {
        if !self.owns(id) {
            return None;
        }
        self.entries
            .get(id.slot as usize)
            .filter(|e| e.state == EntryState::Active && e.generation == id.generation)
    }
}

impl<T: Poolable> fmt::Debug for ObjectPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectPool")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("capacity", &self.capacity)
            .field("active", &self.active)
            .field("idle", &self.idle.len())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}
