//! Time-ordered timer list.
//!
//! Timers live in an arena and are linked into a doubly linked ring by
//! index. Slot 0 is the sentinel head: it is never scheduled, and its
//! `next`/`prev` always point into the live ring (or at itself when the ring
//! is empty). Scheduled timers are kept in ascending expiry order; timers
//! with equal expiry stay in the order they were scheduled.
//!
//! Insertion walks the ring from the head, so it is O(n) in the number of
//! scheduled timers. Unlinking is O(1).

use crate::router::error::TimerError;
use crate::router::id::TimerId;
use std::time::{Duration, Instant};

const HEAD: usize = 0;

/// Bound on how long a loop may block when no timer is scheduled.
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(1);

struct TimerNode<T> {
    prev: usize,
    next: usize,
    expires: Option<Instant>,
    generation: u32,
    live: bool,
    payload: Option<T>,
}

impl<T> TimerNode<T> {
    fn vacant() -> Self {
        Self {
            prev: HEAD,
            next: HEAD,
            expires: None,
            generation: 0,
            live: false,
            payload: None,
        }
    }
}

/// Arena-backed sorted timer ring. `T` is the callback payload each timer
/// carries.
pub struct TimerList<T> {
    nodes: Vec<TimerNode<T>>,
    free: Vec<usize>,
    scheduled: usize,
    max_wait: Duration,
}

impl<T> TimerList<T> {
    pub fn new() -> Self {
        Self::with_max_wait(DEFAULT_MAX_WAIT)
    }

    pub fn with_max_wait(max_wait: Duration) -> Self {
        let mut head = TimerNode::vacant();
        head.live = true;
        Self {
            nodes: vec![head],
            free: Vec::new(),
            scheduled: 0,
            max_wait,
        }
    }

    /// Create an unscheduled timer carrying `payload`.
    pub fn create(&mut self, payload: T) -> TimerId {
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                self.nodes.push(TimerNode::vacant());
                self.nodes.len() - 1
            }
        };
        let node = &mut self.nodes[index];
        node.live = true;
        node.expires = None;
        node.payload = Some(payload);
        TimerId {
            index: index as u32,
            generation: node.generation,
        }
    }

    /// Destroy a timer, unlinking it first if it is scheduled.
    ///
    /// Returns the payload if it was not checked out at the time.
    pub fn destroy(&mut self, id: TimerId) -> Result<Option<T>, TimerError> {
        let index = self.check(id)?;
        if self.is_linked(index) {
            self.unlink(index);
        }
        let node = &mut self.nodes[index];
        node.live = false;
        node.generation = node.generation.wrapping_add(1);
        let payload = node.payload.take();
        self.free.push(index);
        Ok(payload)
    }

    /// Schedule `id` to expire at `expires`, replacing any earlier schedule.
    pub fn schedule_at(&mut self, id: TimerId, expires: Instant) -> Result<(), TimerError> {
        let index = self.check(id)?;
        if self.is_linked(index) {
            self.unlink(index);
        }

        // Stop at the first timer that expires strictly later, so equal
        // expiries keep their scheduling order.
        let mut prev = HEAD;
        let mut trav = self.nodes[HEAD].next;
        while trav != HEAD && self.nodes[trav].expires.is_some_and(|e| e <= expires) {
            prev = trav;
            trav = self.nodes[trav].next;
        }

        let node = &mut self.nodes[index];
        node.expires = Some(expires);
        node.prev = prev;
        node.next = trav;
        self.nodes[prev].next = index;
        self.nodes[trav].prev = index;
        self.scheduled += 1;
        Ok(())
    }

    /// Schedule `id` to expire `delay` after `now`.
    pub fn schedule_after(
        &mut self,
        id: TimerId,
        now: Instant,
        delay: Duration,
    ) -> Result<(), TimerError> {
        self.schedule_at(id, now + delay)
    }

    /// Unlink `id` if scheduled. Returns whether it was scheduled.
    pub fn unschedule(&mut self, id: TimerId) -> Result<bool, TimerError> {
        let index = self.check(id)?;
        if self.is_linked(index) {
            self.unlink(index);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Whether `id` is currently scheduled. Destroyed timers are not.
    pub fn is_scheduled(&self, id: TimerId) -> bool {
        self.check(id).is_ok_and(|index| self.is_linked(index))
    }

    /// Whether `id` still refers to a live timer.
    pub fn contains(&self, id: TimerId) -> bool {
        self.check(id).is_ok()
    }

    /// Expiry of `id`, if scheduled.
    pub fn expiry(&self, id: TimerId) -> Option<Instant> {
        let index = self.check(id).ok()?;
        if self.is_linked(index) {
            self.nodes[index].expires
        } else {
            None
        }
    }

    /// Earliest scheduled expiry.
    pub fn first_expiry(&self) -> Option<Instant> {
        let first = self.nodes[HEAD].next;
        if first == HEAD {
            None
        } else {
            self.nodes[first].expires
        }
    }

    /// Unlink and return the earliest timer if it has expired by `now`.
    pub fn pop_expired(&mut self, now: Instant) -> Option<TimerId> {
        let first = self.nodes[HEAD].next;
        if first == HEAD || self.nodes[first].expires.is_some_and(|e| e > now) {
            return None;
        }
        self.unlink(first);
        Some(TimerId {
            index: first as u32,
            generation: self.nodes[first].generation,
        })
    }

    /// Fire every timer that has expired by `now`, earliest first.
    ///
    /// Each timer is unlinked before `fire` sees it, so `fire` may
    /// reschedule, unschedule, or destroy any timer, including that one.
    /// Returns the number of timers fired.
    pub fn run(&mut self, now: Instant, mut fire: impl FnMut(&mut Self, TimerId)) -> usize {
        let mut fired = 0;
        while let Some(id) = self.pop_expired(now) {
            fire(self, id);
            fired += 1;
        }
        fired
    }

    /// How long a loop may block before the next timer is due.
    ///
    /// Zero if a timer is already overdue; the configured maximum wait if
    /// nothing is scheduled.
    pub fn next_delay(&self, now: Instant) -> Duration {
        match self.first_expiry() {
            None => self.max_wait,
            Some(expires) => expires.saturating_duration_since(now),
        }
    }

    pub fn max_wait(&self) -> Duration {
        self.max_wait
    }

    pub fn set_max_wait(&mut self, max_wait: Duration) {
        self.max_wait = max_wait;
    }

    /// Number of scheduled timers.
    pub fn len(&self) -> usize {
        self.scheduled
    }

    pub fn is_empty(&self) -> bool {
        self.scheduled == 0
    }

    /// Scheduled timers in firing order.
    pub fn scheduled_ids(&self) -> Vec<TimerId> {
        let mut ids = Vec::with_capacity(self.scheduled);
        let mut trav = self.nodes[HEAD].next;
        while trav != HEAD {
            ids.push(TimerId {
                index: trav as u32,
                generation: self.nodes[trav].generation,
            });
            trav = self.nodes[trav].next;
        }
        ids
    }

    pub fn payload(&self, id: TimerId) -> Option<&T> {
        let index = self.check(id).ok()?;
        self.nodes[index].payload.as_ref()
    }

    pub fn payload_mut(&mut self, id: TimerId) -> Option<&mut T> {
        let index = self.check(id).ok()?;
        self.nodes[index].payload.as_mut()
    }

    /// Check the payload out while its callback runs.
    pub fn take_payload(&mut self, id: TimerId) -> Option<T> {
        let index = self.check(id).ok()?;
        self.nodes[index].payload.take()
    }

    /// Return a checked-out payload. Dropped if the timer was destroyed in
    /// the meantime.
    pub fn restore_payload(&mut self, id: TimerId, payload: T) {
        if let Ok(index) = self.check(id) {
            self.nodes[index].payload = Some(payload);
        }
    }

    fn check(&self, id: TimerId) -> Result<usize, TimerError> {
        let index = id.index();
        match self.nodes.get(index) {
            Some(node) if index != HEAD && node.live && node.generation == id.generation => {
                Ok(index)
            }
            _ => Err(TimerError::Stale(id)),
        }
    }

    fn is_linked(&self, index: usize) -> bool {
        let node = &self.nodes[index];
        node.expires.is_some() && self.nodes[node.prev].next == index
    }

    fn unlink(&mut self, index: usize) {
        let (prev, next) = (self.nodes[index].prev, self.nodes[index].next);
        self.nodes[prev].next = next;
        self.nodes[next].prev = prev;
        let node = &mut self.nodes[index];
        node.prev = HEAD;
        node.next = HEAD;
        node.expires = None;
        self.scheduled -= 1;
    }

    /// Walk the ring in both directions and verify order and link symmetry.
    #[cfg(test)]
    fn assert_invariants(&self) {
        let mut count = 0;
        let mut trav = self.nodes[HEAD].next;
        let mut last: Option<Instant> = None;
        while trav != HEAD {
            let node = &self.nodes[trav];
            assert!(node.live, "dead timer {trav} in ring");
            assert_eq!(self.nodes[node.next].prev, trav, "broken back link");
            let expires = node.expires.expect("linked timer without expiry");
            if let Some(last) = last {
                assert!(last <= expires, "ring out of order");
            }
            last = Some(expires);
            count += 1;
            assert!(count <= self.nodes.len(), "ring does not return to head");
            trav = node.next;
        }
        assert_eq!(count, self.scheduled);
        assert!(self.nodes[HEAD].expires.is_none(), "head must never be scheduled");
    }
}

impl<T> Default for TimerList<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn fire_all(list: &mut TimerList<&'static str>, now: Instant) -> Vec<&'static str> {
        let mut order = Vec::new();
        list.run(now, |list, id| order.push(*list.payload(id).unwrap()));
        order
    }

    #[test]
    fn test_equal_expiry_fires_in_insertion_order() {
        let t0 = Instant::now();
        let mut list = TimerList::new();
        let a = list.create("A");
        let b = list.create("B");
        let c = list.create("C");
        list.schedule_after(a, t0, ms(50)).unwrap();
        list.schedule_after(b, t0, ms(10)).unwrap();
        list.schedule_after(c, t0, ms(10)).unwrap();
        list.assert_invariants();

        assert_eq!(fire_all(&mut list, t0 + ms(60)), vec!["B", "C", "A"]);
        assert!(list.is_empty());
        list.assert_invariants();
    }

    #[test]
    fn test_run_only_fires_expired() {
        let t0 = Instant::now();
        let mut list = TimerList::new();
        let early = list.create("early");
        let late = list.create("late");
        list.schedule_after(early, t0, ms(5)).unwrap();
        list.schedule_after(late, t0, ms(500)).unwrap();

        assert_eq!(fire_all(&mut list, t0 + ms(5)), vec!["early"]);
        assert!(list.is_scheduled(late));
        assert!(!list.is_scheduled(early));
        assert_eq!(list.next_delay(t0 + ms(100)), ms(400));
    }

    #[test]
    fn test_unschedule_twice_is_noop() {
        let t0 = Instant::now();
        let mut list = TimerList::new();
        let a = list.create("a");
        list.schedule_after(a, t0, ms(1)).unwrap();
        assert_eq!(list.unschedule(a), Ok(true));
        assert_eq!(list.unschedule(a), Ok(false));
        assert!(list.is_empty());
        list.assert_invariants();
    }

    #[test]
    fn test_reschedule_moves_without_duplicating() {
        let t0 = Instant::now();
        let mut list = TimerList::new();
        let a = list.create("a");
        let b = list.create("b");
        list.schedule_after(a, t0, ms(10)).unwrap();
        list.schedule_after(b, t0, ms(20)).unwrap();
        list.schedule_after(a, t0, ms(30)).unwrap();
        list.assert_invariants();
        assert_eq!(list.len(), 2);
        assert_eq!(list.scheduled_ids(), vec![b, a]);
    }

    #[test]
    fn test_callback_may_reschedule_itself() {
        let t0 = Instant::now();
        let mut list = TimerList::new();
        let a = list.create("a");
        list.schedule_after(a, t0, ms(10)).unwrap();
        let mut fired = 0;
        list.run(t0 + ms(10), |list, id| {
            fired += 1;
            list.schedule_after(id, t0 + ms(10), ms(10)).unwrap();
        });
        assert_eq!(fired, 1);
        assert_eq!(list.expiry(a), Some(t0 + ms(20)));
        list.assert_invariants();
    }

    #[test]
    fn test_destroy_scheduled_timer_unlinks() {
        let t0 = Instant::now();
        let mut list = TimerList::new();
        let a = list.create("a");
        let b = list.create("b");
        list.schedule_after(a, t0, ms(1)).unwrap();
        list.schedule_after(b, t0, ms(2)).unwrap();
        assert_eq!(list.destroy(a), Ok(Some("a")));
        list.assert_invariants();
        assert_eq!(list.scheduled_ids(), vec![b]);
    }

    #[test]
    fn test_stale_handle_is_an_error() {
        let t0 = Instant::now();
        let mut list = TimerList::new();
        let a = list.create("a");
        list.destroy(a).unwrap();
        assert_eq!(list.schedule_after(a, t0, ms(1)), Err(TimerError::Stale(a)));
        assert_eq!(list.unschedule(a), Err(TimerError::Stale(a)));
        assert!(!list.is_scheduled(a));

        // The slot is reused under a new generation; the old handle stays dead.
        let b = list.create("b");
        assert_eq!(a.index(), b.index());
        assert!(list.contains(b));
        assert!(!list.contains(a));
    }

    #[test]
    fn test_next_delay_bounds() {
        let t0 = Instant::now();
        let mut list: TimerList<()> = TimerList::with_max_wait(ms(250));
        assert_eq!(list.next_delay(t0), ms(250));
        let a = list.create(());
        list.schedule_at(a, t0).unwrap();
        assert_eq!(list.next_delay(t0 + ms(5)), Duration::ZERO);
    }

    #[test]
    fn test_payload_checkout() {
        let mut list = TimerList::new();
        let a = list.create(String::from("cb"));
        let payload = list.take_payload(a).unwrap();
        assert!(list.payload(a).is_none());
        list.restore_payload(a, payload);
        assert_eq!(list.payload(a).map(String::as_str), Some("cb"));
    }

    #[derive(Debug, Clone)]
    enum Op {
        Schedule(usize, u64),
        Unschedule(usize),
        Destroy(usize),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            4 => (0..8usize, 0..100u64).prop_map(|(i, d)| Op::Schedule(i, d)),
            1 => (0..8usize).prop_map(Op::Unschedule),
            1 => (0..8usize).prop_map(Op::Destroy),
        ]
    }

    proptest! {
        #[test]
        fn prop_ring_stays_sorted(ops in prop::collection::vec(op_strategy(), 1..80)) {
            let t0 = Instant::now();
            let mut list = TimerList::new();
            let ids: Vec<_> = (0..8).map(|i| list.create(i)).collect();
            for op in ops {
                match op {
                    Op::Schedule(i, d) => { let _ = list.schedule_after(ids[i], t0, ms(d)); }
                    Op::Unschedule(i) => { let _ = list.unschedule(ids[i]); }
                    Op::Destroy(i) => { let _ = list.destroy(ids[i]); }
                }
                list.assert_invariants();
            }
            let mut seen = std::collections::HashSet::new();
            for id in list.scheduled_ids() {
                prop_assert!(seen.insert(id), "duplicate entry {:?}", id);
            }
        }

        #[test]
        fn prop_fires_in_expiry_then_insertion_order(
            delays in prop::collection::vec(0..20u64, 1..40)
        ) {
            let t0 = Instant::now();
            let mut list = TimerList::new();
            for (seq, &d) in delays.iter().enumerate() {
                let id = list.create((d, seq));
                list.schedule_after(id, t0, ms(d)).unwrap();
            }
            let mut fired = Vec::new();
            list.run(t0 + ms(20), |list, id| fired.push(*list.payload(id).unwrap()));
            prop_assert_eq!(fired.len(), delays.len());
            for pair in fired.windows(2) {
                prop_assert!(pair[0] < pair[1], "{:?} fired before {:?}", pair[0], pair[1]);
            }
        }
    }
}
