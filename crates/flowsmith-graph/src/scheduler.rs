//! Delayed-task queue with cancel-and-reschedule semantics.
//!
//! The editor has a handful of debounced jobs (history snapshots, the settled
//! selection view). Each job kind has at most one pending deadline; scheduling
//! it again replaces the deadline. The owner drives the queue with
//! [`Scheduler::take_due`] using its clock.

use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct Scheduler<K: Ord + Copy> {
    deadlines: BTreeMap<K, u64>,
}

impl<K: Ord + Copy> Default for Scheduler<K> {
    fn default() -> Self {
        Self {
            deadlines: BTreeMap::new(),
        }
    }
}

impl<K: Ord + Copy> Scheduler<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `task` at `now + delay_ms`, replacing any pending deadline.
    pub fn schedule(&mut self, task: K, now: u64, delay_ms: u64) {
        self.deadlines.insert(task, now.saturating_add(delay_ms));
    }

    /// Returns `true` if the task was pending.
    pub fn cancel(&mut self, task: K) -> bool {
        self.deadlines.remove(&task).is_some()
    }

    pub fn is_pending(&self, task: K) -> bool {
        self.deadlines.contains_key(&task)
    }

    /// Remove and return the tasks whose deadline has passed, earliest first.
    pub fn take_due(&mut self, now: u64) -> Vec<K> {
        let mut due: Vec<(u64, K)> = self
            .deadlines
            .iter()
            .filter(|(_, at)| **at <= now)
            .map(|(k, at)| (*at, *k))
            .collect();
        due.sort();
        for (_, task) in &due {
            self.deadlines.remove(task);
        }
        due.into_iter().map(|(_, k)| k).collect()
    }

    /// Remove and return every pending task, earliest first.
    pub fn drain(&mut self) -> Vec<K> {
        self.take_due(u64::MAX)
    }

    pub fn next_deadline(&self) -> Option<u64> {
        self.deadlines.values().min().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
    enum Job {
        A,
        B,
    }

    #[test]
    fn reschedule_replaces_deadline() {
        let mut s = Scheduler::new();
        s.schedule(Job::A, 0, 1000);
        s.schedule(Job::A, 200, 500);
        assert_eq!(s.next_deadline(), Some(700));
        assert!(s.take_due(699).is_empty());
        assert_eq!(s.take_due(700), vec![Job::A]);
        assert!(!s.is_pending(Job::A));
    }

    #[test]
    fn due_tasks_in_deadline_order() {
        let mut s = Scheduler::new();
        s.schedule(Job::A, 0, 300);
        s.schedule(Job::B, 0, 100);
        assert_eq!(s.take_due(1000), vec![Job::B, Job::A]);
    }

    #[test]
    fn cancel_and_drain() {
        let mut s = Scheduler::new();
        s.schedule(Job::A, 0, 10);
        s.schedule(Job::B, 0, 10_000);
        assert!(s.cancel(Job::A));
        assert!(!s.cancel(Job::A));
        assert_eq!(s.drain(), vec![Job::B]);
        assert_eq!(s.next_deadline(), None);
    }
}
