use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use spiralstream_common::InstanceId;

/// Work to perform once a timer comes due.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeferredAction {
    ReleaseProjectile(InstanceId),
}

impl DeferredAction {
    /// The instance the action operates on.
    pub fn target(&self) -> InstanceId {
        match self {
            Self::ReleaseProjectile(id) => *id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deferred {
    pub due_tick: u64,
    /// Cancelled together with everything else its owner scheduled.
    pub owner: InstanceId,
    pub action: DeferredAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

/// Min-heap of actions keyed by due tick.
///
/// Cancelled entries stay in the heap and are skipped when popped. Entries
/// due on the same tick pop in scheduling order.
#[derive(Debug, Default)]
pub struct DeferredQueue {
    heap: BinaryHeap<Reverse<(u64, u64)>>,
    pending: HashMap<u64, Deferred>,
    next_seq: u64,
}

impl DeferredQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, due_tick: u64, owner: InstanceId, action: DeferredAction) -> TimerId {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Reverse((due_tick, seq)));
        self.pending.insert(
            seq,
            Deferred {
                due_tick,
                owner,
                action,
            },
        );
        TimerId(seq)
    }

    pub fn cancel(&mut self, id: TimerId) -> Option<Deferred> {
        self.pending.remove(&id.0)
    }

    /// Cancel everything `owner` scheduled, returned in due order.
    pub fn cancel_owned_by(&mut self, owner: InstanceId) -> Vec<Deferred> {
        self.cancel_where(|d| d.owner == owner)
    }

    /// Cancel every action operating on `target`.
    pub fn cancel_target(&mut self, target: InstanceId) -> usize {
        self.cancel_where(|d| d.action.target() == target).len()
    }

    /// Remove and return every action due at or before `now`, in due order.
    pub fn pop_due(&mut self, now: u64) -> Vec<Deferred> {
        let mut due = Vec::new();
        while let Some(&Reverse((tick, seq))) = self.heap.peek() {
            if tick > now {
                break;
            }
            self.heap.pop();
            if let Some(entry) = self.pending.remove(&seq) {
                due.push(entry);
            }
        }
        due
    }

    /// Live (uncancelled) entries.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn clear(&mut self) {
        self.heap.clear();
        self.pending.clear();
    }

    fn cancel_where(&mut self, pred: impl Fn(&Deferred) -> bool) -> Vec<Deferred> {
        let mut keys: Vec<(u64, u64)> = self
            .pending
            .iter()
            .filter(|(_, d)| pred(*d))
            .map(|(&seq, d)| (d.due_tick, seq))
            .collect();
        keys.sort_unstable();
        keys.into_iter()
            .filter_map(|(_, seq)| self.pending.remove(&seq))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spiralstream_common::PoolKind;

    fn enemy(slot: u32) -> InstanceId {
        InstanceId::unowned(PoolKind::Enemy, slot, 1)
    }

    fn shot(slot: u32) -> DeferredAction {
        DeferredAction::ReleaseProjectile(InstanceId::unowned(PoolKind::Projectile, slot, 1))
    }

    #[test]
    fn pops_in_due_then_schedule_order() {
        let mut q = DeferredQueue::new();
        q.schedule(10, enemy(0), shot(0));
        q.schedule(5, enemy(0), shot(1));
        q.schedule(5, enemy(1), shot(2));

        assert!(q.pop_due(4).is_empty());
        let due: Vec<_> = q.pop_due(5).into_iter().map(|d| d.action).collect();
        assert_eq!(due, vec![shot(1), shot(2)]);
        assert_eq!(q.len(), 1);
        assert_eq!(q.pop_due(100).len(), 1);
        assert!(q.is_empty());
    }

    #[test]
    fn cancelled_entries_never_fire() {
        let mut q = DeferredQueue::new();
        let id = q.schedule(3, enemy(0), shot(0));
        assert!(q.cancel(id).is_some());
        assert!(q.cancel(id).is_none());
        assert!(q.pop_due(3).is_empty());
    }

    #[test]
    fn cancel_owned_by_leaves_other_owners() {
        let mut q = DeferredQueue::new();
        q.schedule(8, enemy(0), shot(0));
        q.schedule(2, enemy(0), shot(1));
        q.schedule(4, enemy(1), shot(2));

        let cancelled: Vec<_> = q
            .cancel_owned_by(enemy(0))
            .into_iter()
            .map(|d| d.action)
            .collect();
        assert_eq!(cancelled, vec![shot(1), shot(0)]);
        assert_eq!(q.len(), 1);
        assert_eq!(q.pop_due(10)[0].action, shot(2));
    }

    #[test]
    fn cancel_target_matches_action_instance() {
        let mut q = DeferredQueue::new();
        q.schedule(8, enemy(0), shot(0));
        q.schedule(9, enemy(0), shot(1));
        assert_eq!(q.cancel_target(shot(0).target()), 1);
        assert_eq!(q.len(), 1);
    }
}
