// Deterministic timer queue over virtual time.
//
// Time is a `Duration` since engine start. Nothing here reads a clock: the
// host advances time explicitly and drains due timers in deadline order, so
// tests can drive the whole engine without sleeping.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use super::model::RiskTier;

/// Annunciation generation. Bumped on every state change; timers tagged with
/// an older epoch are stale.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Epoch(u64);

impl Epoch {
    pub const ZERO: Epoch = Epoch(0);

    pub fn next(self) -> Self {
        Epoch(self.0 + 1)
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerId(u64);

#[derive(Debug, Clone, PartialEq)]
pub struct Fired<K> {
    pub id: TimerId,
    pub deadline: Duration,
    pub epoch: Option<Epoch>,
    pub key: K,
}

#[derive(Debug, Clone)]
struct Entry<K> {
    epoch: Option<Epoch>,
    key: K,
}

pub struct Scheduler<K> {
    now: Duration,
    next_id: u64,
    /// Ordered by deadline, then by insertion (ids are monotonic).
    queue: BTreeMap<(Duration, TimerId), Entry<K>>,
    index: HashMap<TimerId, Duration>,
}

impl<K> Default for Scheduler<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K> Scheduler<K> {
    pub fn new() -> Self {
        Self {
            now: Duration::ZERO,
            next_id: 0,
            queue: BTreeMap::new(),
            index: HashMap::new(),
        }
    }

    pub fn now(&self) -> Duration {
        self.now
    }

    pub fn schedule_after(&mut self, delay: Duration, epoch: Option<Epoch>, key: K) -> TimerId {
        self.schedule_at(self.now + delay, epoch, key)
    }

    /// Deadlines in the past are clamped to `now`.
    pub fn schedule_at(&mut self, deadline: Duration, epoch: Option<Epoch>, key: K) -> TimerId {
        let deadline = deadline.max(self.now);
        let id = TimerId(self.next_id);
        self.next_id += 1;
        self.queue.insert((deadline, id), Entry { epoch, key });
        self.index.insert(id, deadline);
        id
    }

    /// Returns false when the timer already fired or was cancelled.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        match self.index.remove(&id) {
            Some(deadline) => self.queue.remove(&(deadline, id)).is_some(),
            None => false,
        }
    }

    /// Cancel every timer tagged with an epoch older than `epoch`. Untagged
    /// timers survive.
    pub fn cancel_before(&mut self, epoch: Epoch) -> usize {
        self.cancel_matching(|e, _| e.is_some_and(|e| e < epoch))
    }

    pub fn cancel_matching(&mut self, mut pred: impl FnMut(Option<Epoch>, &K) -> bool) -> usize {
        let doomed: Vec<(Duration, TimerId)> = self
            .queue
            .iter()
            .filter(|(_, entry)| pred(entry.epoch, &entry.key))
            .map(|(slot, _)| *slot)
            .collect();
        for slot in &doomed {
            self.queue.remove(slot);
            self.index.remove(&slot.1);
        }
        doomed.len()
    }

    pub fn deadline(&self, id: TimerId) -> Option<Duration> {
        self.index.get(&id).copied()
    }

    pub fn is_pending(&self, id: TimerId) -> bool {
        self.index.contains_key(&id)
    }

    pub fn next_deadline(&self) -> Option<Duration> {
        self.queue.keys().next().map(|(deadline, _)| *deadline)
    }

    pub fn pending_keys(&self) -> impl Iterator<Item = &K> {
        self.queue.values().map(|entry| &entry.key)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Pop the earliest timer due at or before `now`, moving the clock to its
    /// deadline. Equal deadlines fire in scheduling order.
    pub fn pop_due(&mut self, now: Duration) -> Option<Fired<K>> {
        let (&(deadline, id), _) = self.queue.iter().next()?;
        if deadline > now {
            return None;
        }
        let entry = self.queue.remove(&(deadline, id))?;
        self.index.remove(&id);
        self.now = self.now.max(deadline);
        Some(Fired {
            id,
            deadline,
            epoch: entry.epoch,
            key: entry.key,
        })
    }

    /// Move the clock forward without firing anything. Never moves backwards.
    pub fn advance_to(&mut self, now: Duration) {
        self.now = self.now.max(now);
    }
}

/// Every timer the engine schedules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timer {
    PollWarmup,
    PollInterval,
    TestExpiry(RiskTier),
    Tone { tier: RiskTier, index: usize },
    PatternRepeat(RiskTier),
    PassEnded,
}

pub type EngineScheduler = Scheduler<Timer>;
