//! Deadline-keyed scheduled work, drained by the engine each tick.
//!
//! Replaces ad-hoc timer callbacks: everything that "fires later" (match
//! phase transitions, journal auto-save) goes through one queue ordered by
//! monotonic deadline, so scheduled work can never interleave with a
//! handler mid-flight.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use uuid::Uuid;

/// Work scheduled for a future tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Task {
    /// Countdown finished; the match goes active
    MatchStart(Uuid),
    /// Timed match duration elapsed
    MatchEnd(Uuid),
    /// Post-end grace elapsed; clear the match slot
    MatchClear(Uuid),
    /// Periodic journal save when unsaved events exist
    JournalAutosave,
}

#[derive(Debug, PartialEq, Eq)]
struct Scheduled {
    deadline: u64,
    seq: u64,
    task: Task,
}

impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.deadline, self.seq).cmp(&(other.deadline, other.seq))
    }
}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Min-heap of scheduled tasks; ties break in scheduling order
#[derive(Debug, Default)]
pub struct TaskQueue {
    heap: BinaryHeap<Reverse<Scheduled>>,
    seq: u64,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, deadline: u64, task: Task) {
        self.seq += 1;
        self.heap.push(Reverse(Scheduled {
            deadline,
            seq: self.seq,
            task,
        }));
    }

    /// Pop the next task whose deadline has passed
    pub fn pop_due(&mut self, now: u64) -> Option<Task> {
        if self.heap.peek().is_some_and(|Reverse(s)| s.deadline <= now) {
            self.heap.pop().map(|Reverse(s)| s.task)
        } else {
            None
        }
    }

    /// Drop scheduled transitions for a match that no longer exists
    pub fn cancel_match(&mut self, match_id: Uuid) {
        let remaining: Vec<Reverse<Scheduled>> = self
            .heap
            .drain()
            .filter(|Reverse(s)| {
                !matches!(
                    &s.task,
                    Task::MatchStart(id) | Task::MatchEnd(id) | Task::MatchClear(id)
                        if *id == match_id
                )
            })
            .collect();
        self.heap = remaining.into_iter().collect();
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tasks_fire_in_deadline_order() {
        let mut q = TaskQueue::new();
        let m = Uuid::new_v4();
        q.schedule(300, Task::MatchClear(m));
        q.schedule(100, Task::MatchStart(m));
        q.schedule(200, Task::MatchEnd(m));

        assert_eq!(q.pop_due(50), None);
        assert_eq!(q.pop_due(300), Some(Task::MatchStart(m)));
        assert_eq!(q.pop_due(300), Some(Task::MatchEnd(m)));
        assert_eq!(q.pop_due(300), Some(Task::MatchClear(m)));
        assert_eq!(q.pop_due(1000), None);
    }

    #[test]
    fn equal_deadlines_fire_in_schedule_order() {
        let mut q = TaskQueue::new();
        q.schedule(100, Task::JournalAutosave);
        let m = Uuid::new_v4();
        q.schedule(100, Task::MatchStart(m));

        assert_eq!(q.pop_due(100), Some(Task::JournalAutosave));
        assert_eq!(q.pop_due(100), Some(Task::MatchStart(m)));
    }

    #[test]
    fn cancel_match_keeps_unrelated_tasks() {
        let mut q = TaskQueue::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        q.schedule(100, Task::MatchStart(a));
        q.schedule(150, Task::JournalAutosave);
        q.schedule(200, Task::MatchEnd(b));

        q.cancel_match(a);

        assert_eq!(q.pop_due(1000), Some(Task::JournalAutosave));
        assert_eq!(q.pop_due(1000), Some(Task::MatchEnd(b)));
        assert!(q.is_empty());
    }
}
