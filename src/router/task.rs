//! Stride scheduler for cooperative tasks.
//!
//! Each task holds `tickets`. Its stride is `STRIDE1 / tickets` and its pass
//! advances by one stride every time it runs. The scheduler always runs the
//! runnable task with the smallest pass, breaking ties by task id, so over
//! time every task's share of runs is proportional to its tickets.
//!
//! Running a task takes it off the run list. The task re-arms itself (or is
//! re-armed by a timer or another element) with [`Scheduler::schedule`].

use crate::router::error::TaskError;
use crate::router::id::TaskId;
use std::collections::BTreeSet;

/// Pass increment of a task holding one ticket.
pub const STRIDE1: u64 = 1 << 16;

/// Largest ticket count a task may hold.
pub const MAX_TICKETS: u32 = 1 << 15;

/// Tickets a task gets unless configured otherwise.
pub const DEFAULT_TICKETS: u32 = 1 << 10;

struct TaskSlot<T> {
    generation: u32,
    live: bool,
    tickets: u32,
    stride: u64,
    pass: u64,
    scheduled: bool,
    payload: Option<T>,
}

pub struct Scheduler<T> {
    slots: Vec<TaskSlot<T>>,
    free: Vec<usize>,
    /// Runnable tasks keyed by `(pass, id)`.
    run_list: BTreeSet<(u64, TaskId)>,
    /// Pass of the most recently run task. Tasks joining the run list start
    /// no earlier than this.
    global_pass: u64,
    registered: usize,
}

impl<T> Scheduler<T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            run_list: BTreeSet::new(),
            global_pass: 0,
            registered: 0,
        }
    }

    /// Register an unscheduled task.
    pub fn register(&mut self, payload: T, tickets: u32) -> Result<TaskId, TaskError> {
        let stride = stride_for(tickets)?;
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                self.slots.push(TaskSlot {
                    generation: 0,
                    live: false,
                    tickets: 0,
                    stride: 0,
                    pass: 0,
                    scheduled: false,
                    payload: None,
                });
                self.slots.len() - 1
            }
        };
        let slot = &mut self.slots[index];
        slot.live = true;
        slot.tickets = tickets;
        slot.stride = stride;
        slot.pass = self.global_pass;
        slot.scheduled = false;
        slot.payload = Some(payload);
        self.registered += 1;
        Ok(TaskId {
            index: index as u32,
            generation: slot.generation,
        })
    }

    /// Remove a task, taking it off the run list if needed.
    pub fn unregister(&mut self, id: TaskId) -> Result<Option<T>, TaskError> {
        let index = self.check(id)?;
        if self.slots[index].scheduled {
            self.remove_from_run_list(index, id);
        }
        let slot = &mut self.slots[index];
        slot.live = false;
        slot.generation = slot.generation.wrapping_add(1);
        let payload = slot.payload.take();
        self.free.push(index);
        self.registered -= 1;
        Ok(payload)
    }

    /// Put a task on the run list. Returns `false` if it already was.
    pub fn schedule(&mut self, id: TaskId) -> Result<bool, TaskError> {
        let index = self.check(id)?;
        let slot = &mut self.slots[index];
        if slot.scheduled {
            return Ok(false);
        }
        slot.pass = slot.pass.max(self.global_pass);
        slot.scheduled = true;
        self.run_list.insert((slot.pass, id));
        Ok(true)
    }

    /// Take a task off the run list. Returns whether it was on it.
    pub fn unschedule(&mut self, id: TaskId) -> Result<bool, TaskError> {
        let index = self.check(id)?;
        if !self.slots[index].scheduled {
            return Ok(false);
        }
        self.remove_from_run_list(index, id);
        Ok(true)
    }

    pub fn is_scheduled(&self, id: TaskId) -> bool {
        self.check(id).is_ok_and(|index| self.slots[index].scheduled)
    }

    pub fn contains(&self, id: TaskId) -> bool {
        self.check(id).is_ok()
    }

    pub fn tickets(&self, id: TaskId) -> Option<u32> {
        self.check(id).ok().map(|index| self.slots[index].tickets)
    }

    /// Change a task's share. A scheduled task keeps its place.
    pub fn set_tickets(&mut self, id: TaskId, tickets: u32) -> Result<(), TaskError> {
        let index = self.check(id)?;
        let stride = stride_for(tickets)?;
        let slot = &mut self.slots[index];
        slot.tickets = tickets;
        slot.stride = stride;
        Ok(())
    }

    /// Take the next task off the run list and charge it one stride.
    pub fn pop_next(&mut self) -> Option<TaskId> {
        let (pass, id) = self.run_list.pop_first()?;
        let slot = &mut self.slots[id.index()];
        slot.scheduled = false;
        slot.pass = pass + slot.stride;
        self.global_pass = pass;
        Some(id)
    }

    /// Run the next runnable task, if any.
    ///
    /// The task is off the run list while `run` sees it, so `run` may
    /// reschedule or unregister it.
    pub fn run_once(&mut self, run: impl FnOnce(&mut Self, TaskId)) -> Option<TaskId> {
        let id = self.pop_next()?;
        run(self, id);
        Some(id)
    }

    /// Number of runnable tasks.
    pub fn runnable(&self) -> usize {
        self.run_list.len()
    }

    /// Number of registered tasks.
    pub fn len(&self) -> usize {
        self.registered
    }

    pub fn is_empty(&self) -> bool {
        self.registered == 0
    }

    pub fn global_pass(&self) -> u64 {
        self.global_pass
    }

    pub fn payload(&self, id: TaskId) -> Option<&T> {
        let index = self.check(id).ok()?;
        self.slots[index].payload.as_ref()
    }

    pub fn payload_mut(&mut self, id: TaskId) -> Option<&mut T> {
        let index = self.check(id).ok()?;
        self.slots[index].payload.as_mut()
    }

    pub fn take_payload(&mut self, id: TaskId) -> Option<T> {
        let index = self.check(id).ok()?;
        self.slots[index].payload.take()
    }

    pub fn restore_payload(&mut self, id: TaskId, payload: T) {
        if let Ok(index) = self.check(id) {
            self.slots[index].payload = Some(payload);
        }
    }

    fn check(&self, id: TaskId) -> Result<usize, TaskError> {
        match self.slots.get(id.index()) {
            Some(slot) if slot.live && slot.generation == id.generation => Ok(id.index()),
            _ => Err(TaskError::Stale(id)),
        }
    }

    fn remove_from_run_list(&mut self, index: usize, id: TaskId) {
        let slot = &mut self.slots[index];
        self.run_list.remove(&(slot.pass, id));
        slot.scheduled = false;
    }
}

impl<T> Default for Scheduler<T> {
    fn default() -> Self {
        Self::new()
    }
}

fn stride_for(tickets: u32) -> Result<u64, TaskError> {
    if tickets == 0 || tickets > MAX_TICKETS {
        return Err(TaskError::InvalidTickets {
            got: tickets,
            max: MAX_TICKETS,
        });
    }
    Ok(STRIDE1 / u64::from(tickets))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// Run `passes` times; every task reschedules itself after running.
    fn run_round_robin(sched: &mut Scheduler<usize>, passes: usize) -> Vec<usize> {
        let mut counts = vec![0; sched.len()];
        for _ in 0..passes {
            sched.run_once(|sched, id| {
                counts[*sched.payload(id).unwrap()] += 1;
                sched.schedule(id).unwrap();
            });
        }
        counts
    }

    #[test]
    fn test_equal_tickets_run_in_turn() {
        let mut sched = Scheduler::new();
        let ids: Vec<_> = (0..3)
            .map(|i| sched.register(i, DEFAULT_TICKETS).unwrap())
            .collect();
        for &id in &ids {
            sched.schedule(id).unwrap();
        }
        let order: Vec<_> = (0..6)
            .map(|_| {
                let id = sched.pop_next().unwrap();
                sched.schedule(id).unwrap();
                id
            })
            .collect();
        assert_eq!(order, vec![ids[0], ids[1], ids[2], ids[0], ids[1], ids[2]]);
    }

    #[test]
    fn test_tickets_give_proportional_share() {
        let mut sched = Scheduler::new();
        let heavy = sched.register(0, 1024).unwrap();
        let light = sched.register(1, 512).unwrap();
        sched.schedule(heavy).unwrap();
        sched.schedule(light).unwrap();
        let counts = run_round_robin(&mut sched, 3000);
        assert!((counts[0] as i64 - 2000).abs() <= 1, "{counts:?}");
        assert!((counts[1] as i64 - 1000).abs() <= 1, "{counts:?}");
    }

    #[test]
    fn test_running_unschedules() {
        let mut sched = Scheduler::new();
        let id = sched.register((), DEFAULT_TICKETS).unwrap();
        assert!(sched.schedule(id).unwrap());
        assert!(!sched.schedule(id).unwrap());
        assert_eq!(sched.runnable(), 1);
        assert_eq!(sched.run_once(|_, _| {}), Some(id));
        assert!(!sched.is_scheduled(id));
        assert_eq!(sched.run_once(|_, _| {}), None);
    }

    #[test]
    fn test_sleeper_joins_at_global_pass() {
        let mut sched = Scheduler::new();
        let busy = sched.register(0, DEFAULT_TICKETS).unwrap();
        let sleeper = sched.register(1, DEFAULT_TICKETS).unwrap();
        sched.schedule(busy).unwrap();
        run_round_robin(&mut sched, 100);

        // After waking, the sleeper alternates with the busy task instead of
        // running 100 times in a row to catch up.
        sched.schedule(sleeper).unwrap();
        let counts = run_round_robin(&mut sched, 10);
        assert_eq!(counts, vec![5, 5]);
    }

    #[test]
    fn test_unschedule_and_unregister() {
        let mut sched = Scheduler::new();
        let a = sched.register("a", DEFAULT_TICKETS).unwrap();
        let b = sched.register("b", DEFAULT_TICKETS).unwrap();
        sched.schedule(a).unwrap();
        sched.schedule(b).unwrap();
        assert!(sched.unschedule(a).unwrap());
        assert!(!sched.unschedule(a).unwrap());
        assert_eq!(sched.unregister(b), Ok(Some("b")));
        assert_eq!(sched.runnable(), 0);
        assert_eq!(sched.len(), 1);
        assert_eq!(sched.schedule(b), Err(TaskError::Stale(b)));
        assert!(!sched.is_scheduled(b));
    }

    #[test]
    fn test_invalid_tickets() {
        let mut sched = Scheduler::new();
        assert!(matches!(
            sched.register((), 0),
            Err(TaskError::InvalidTickets { got: 0, .. })
        ));
        let id = sched.register((), 1).unwrap();
        assert!(sched.set_tickets(id, MAX_TICKETS + 1).is_err());
        sched.set_tickets(id, MAX_TICKETS).unwrap();
        assert_eq!(sched.tickets(id), Some(MAX_TICKETS));
    }

    #[test]
    fn test_unregister_during_run() {
        let mut sched = Scheduler::new();
        let id = sched.register((), DEFAULT_TICKETS).unwrap();
        sched.schedule(id).unwrap();
        sched.run_once(|sched, id| {
            sched.unregister(id).unwrap();
        });
        assert!(sched.is_empty());
        assert!(!sched.contains(id));
    }

    proptest! {
        #[test]
        fn prop_equal_tickets_are_fair(n in 1usize..8, rounds in 1usize..50) {
            let mut sched = Scheduler::new();
            for i in 0..n {
                let id = sched.register(i, DEFAULT_TICKETS).unwrap();
                sched.schedule(id).unwrap();
            }
            let passes = n * rounds + n / 2;
            let counts = run_round_robin(&mut sched, passes);
            let expected = passes / n;
            for count in counts {
                prop_assert!(count == expected || count == expected + 1,
                    "count {} expected about {}", count, expected);
            }
        }
    }
}
