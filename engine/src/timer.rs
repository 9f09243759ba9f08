use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::time::Duration;

pub const ONE_SECOND: Duration = Duration::from_secs(1);

/// Periods shorter than this are rounded up so a periodic timer can never
/// fire twice at the same instant.
const MIN_PERIOD: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(u64);

impl TimerHandle {
    pub fn id(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    Once,
    Every(Duration),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fired<P> {
    pub handle: TimerHandle,
    pub purpose: P,
    /// Virtual instant the timer was due at (not when it was polled).
    pub at: Duration,
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    handle: TimerHandle,
    deadline: Duration,
    cadence: Cadence,
}

/// Virtual-time scheduler with at most one pending timer per purpose.
///
/// The owner moves the clock forward and drains due timers one at a time with
/// [`TimerService::pop_due`]. Handling a firing may cancel or re-arm other
/// timers; anything cancelled that way is gone before the next pop, even if
/// it was due at the same instant.
#[derive(Debug, Clone)]
pub struct TimerService<P> {
    now: Duration,
    next_id: u64,
    // (deadline, handle id) keeps ties in arming order.
    queue: BTreeMap<(Duration, u64), P>,
    slots: HashMap<P, Slot>,
}

impl<P> Default for TimerService<P>
where
    P: Copy + Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<P> TimerService<P>
where
    P: Copy + Eq + Hash,
{
    pub fn new() -> Self {
        Self {
            now: Duration::ZERO,
            next_id: 1,
            queue: BTreeMap::new(),
            slots: HashMap::new(),
        }
    }

    pub fn now(&self) -> Duration {
        self.now
    }

    /// Single-shot timer due `delay` from now. Replaces any pending timer of
    /// the same purpose.
    pub fn after(&mut self, purpose: P, delay: Duration) -> TimerHandle {
        self.arm(purpose, delay, Cadence::Once)
    }

    /// Periodic timer, first due one `period` from now. Replaces any pending
    /// timer of the same purpose.
    pub fn every(&mut self, purpose: P, period: Duration) -> TimerHandle {
        let period = period.max(MIN_PERIOD);
        self.arm(purpose, period, Cadence::Every(period))
    }

    pub fn every_second(&mut self, purpose: P) -> TimerHandle {
        self.every(purpose, ONE_SECOND)
    }

    fn arm(&mut self, purpose: P, delay: Duration, cadence: Cadence) -> TimerHandle {
        self.cancel_purpose(purpose);

        let handle = TimerHandle(self.next_id);
        self.next_id += 1;
        let deadline = self.now.saturating_add(delay);

        self.queue.insert((deadline, handle.0), purpose);
        self.slots.insert(
            purpose,
            Slot {
                handle,
                deadline,
                cadence,
            },
        );
        handle
    }

    /// Returns `false` when the handle already fired (single-shot), was
    /// cancelled, or was replaced by a newer timer of the same purpose.
    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        let purpose = self
            .slots
            .iter()
            .find(|(_, slot)| slot.handle == handle)
            .map(|(purpose, _)| *purpose);

        match purpose {
            Some(purpose) => self.cancel_purpose(purpose),
            None => false,
        }
    }

    pub fn cancel_purpose(&mut self, purpose: P) -> bool {
        let Some(slot) = self.slots.remove(&purpose) else {
            return false;
        };
        self.queue.remove(&(slot.deadline, slot.handle.0));
        true
    }

    /// Cancels every pending timer whose purpose fails `keep`.
    pub fn retain(&mut self, mut keep: impl FnMut(P) -> bool) -> Vec<P> {
        let doomed: Vec<P> = self
            .slots
            .keys()
            .copied()
            .filter(|purpose| !keep(*purpose))
            .collect();
        for purpose in &doomed {
            self.cancel_purpose(*purpose);
        }
        doomed
    }

    pub fn is_armed(&self, purpose: P) -> bool {
        self.slots.contains_key(&purpose)
    }

    pub fn handle_of(&self, purpose: P) -> Option<TimerHandle> {
        self.slots.get(&purpose).map(|slot| slot.handle)
    }

    pub fn pending(&self) -> usize {
        self.slots.len()
    }

    pub fn next_deadline(&self) -> Option<Duration> {
        self.queue.keys().next().map(|(deadline, _)| *deadline)
    }

    /// Pops the earliest timer due at or before `until`, moving the clock to
    /// its deadline. Periodic timers are re-armed at `deadline + period`.
    pub fn pop_due(&mut self, until: Duration) -> Option<Fired<P>> {
        let (&(deadline, id), _) = self.queue.first_key_value()?;
        if deadline > until {
            return None;
        }
        let purpose = self.queue.remove(&(deadline, id))?;
        let handle = TimerHandle(id);
        self.now = self.now.max(deadline);

        let cadence = self.slots.get(&purpose).map(|slot| slot.cadence);
        match cadence {
            Some(Cadence::Every(period)) => {
                let next = deadline.saturating_add(period);
                self.queue.insert((next, id), purpose);
                self.slots.insert(
                    purpose,
                    Slot {
                        handle,
                        deadline: next,
                        cadence: Cadence::Every(period),
                    },
                );
            }
            Some(Cadence::Once) | None => {
                self.slots.remove(&purpose);
            }
        }

        Some(Fired {
            handle,
            purpose,
            at: deadline,
        })
    }

    /// Moves the clock forward without firing anything. Call after draining
    /// [`TimerService::pop_due`] for the same instant.
    pub fn settle(&mut self, until: Duration) {
        self.now = self.now.max(until);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum Purpose {
        A,
        B,
    }

    fn drain(timers: &mut TimerService<Purpose>, until: Duration) -> Vec<Fired<Purpose>> {
        let mut fired = Vec::new();
        while let Some(f) = timers.pop_due(until) {
            fired.push(f);
        }
        timers.settle(until);
        fired
    }

    #[test]
    fn single_shot_fires_once_no_earlier_than_requested() {
        let mut timers = TimerService::new();
        let handle = timers.after(Purpose::A, Duration::from_millis(700));

        assert!(drain(&mut timers, Duration::from_millis(699)).is_empty());

        let fired = drain(&mut timers, Duration::from_millis(700));
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].handle, handle);
        assert_eq!(fired[0].at, Duration::from_millis(700));

        assert!(drain(&mut timers, Duration::from_secs(10)).is_empty());
        assert!(!timers.is_armed(Purpose::A));
    }

    #[test]
    fn rearming_a_purpose_replaces_the_previous_timer() {
        let mut timers = TimerService::new();
        let first = timers.after(Purpose::A, Duration::from_secs(1));
        let second = timers.after(Purpose::A, Duration::from_secs(2));

        assert_ne!(first, second);
        assert_eq!(timers.pending(), 1);
        assert!(!timers.cancel(first));

        let fired = drain(&mut timers, Duration::from_secs(5));
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].handle, second);
    }

    #[test]
    fn periodic_timer_keeps_its_handle_and_cadence() {
        let mut timers = TimerService::new();
        let handle = timers.every_second(Purpose::B);

        let fired = drain(&mut timers, Duration::from_millis(3500));
        let at: Vec<_> = fired.iter().map(|f| f.at.as_secs()).collect();
        assert_eq!(at, vec![1, 2, 3]);
        assert!(fired.iter().all(|f| f.handle == handle));
        assert_eq!(timers.next_deadline(), Some(Duration::from_secs(4)));
    }

    #[test]
    fn cancelling_while_draining_suppresses_a_timer_due_at_the_same_instant() {
        let mut timers = TimerService::new();
        timers.after(Purpose::A, Duration::from_secs(1));
        timers.after(Purpose::B, Duration::from_secs(1));

        let first = timers.pop_due(Duration::from_secs(1)).expect("A is due");
        assert_eq!(first.purpose, Purpose::A);
        assert!(timers.cancel_purpose(Purpose::B));
        assert_eq!(timers.pop_due(Duration::from_secs(1)), None);
    }

    #[test]
    fn retain_cancels_everything_rejected() {
        let mut timers = TimerService::new();
        timers.every_second(Purpose::A);
        timers.after(Purpose::B, Duration::from_secs(7));

        let cancelled = timers.retain(|p| p == Purpose::B);
        assert_eq!(cancelled, vec![Purpose::A]);
        assert!(timers.is_armed(Purpose::B));
        assert!(!timers.is_armed(Purpose::A));
    }
}
