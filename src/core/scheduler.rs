//! Timer entries for one-shot and repeating page tasks.
//!
//! Each component owns a [`Scheduler`] keyed by its own task type. Tasks are
//! never fired on their own: the owner asks for the next due task with
//! [`Scheduler::pop_due`] whenever the clock has moved, so handlers can schedule
//! or cancel further tasks between firings.

use crate::core::clock::{saturating_add, to_chrono};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Smallest repeat interval accepted; shorter intervals are raised to this.
const MIN_INTERVAL_MS: i64 = 1;

/// Cancellation token for a scheduled task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TaskId(u64);

#[derive(Debug, Clone)]
struct Entry<T> {
    id: TaskId,
    due: DateTime<Utc>,
    every: Option<chrono::Duration>,
    task: T,
}

/// A task handed back by [`Scheduler::pop_due`].
#[derive(Debug, Clone, PartialEq)]
pub struct DueTask<T> {
    pub id: TaskId,
    /// When the task was due (not when it was popped)
    pub due: DateTime<Utc>,
    pub task: T,
}

/// Ordered set of pending timer entries.
#[derive(Debug, Clone)]
pub struct Scheduler<T> {
    entries: Vec<Entry<T>>,
    next_id: u64,
}

impl<T> Default for Scheduler<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            next_id: 1,
        }
    }
}

impl<T: Clone> Scheduler<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire `task` once, `delay` after `now`.
    pub fn schedule_once(&mut self, now: DateTime<Utc>, delay: Duration, task: T) -> TaskId {
        self.insert(saturating_add(now, to_chrono(delay)), None, task)
    }

    /// Fire `task` every `interval`, first at `now + interval`.
    pub fn schedule_repeating(&mut self, now: DateTime<Utc>, interval: Duration, task: T) -> TaskId {
        let every = to_chrono(interval).max(chrono::Duration::milliseconds(MIN_INTERVAL_MS));
        self.insert(saturating_add(now, every), Some(every), task)
    }

    fn insert(&mut self, due: DateTime<Utc>, every: Option<chrono::Duration>, task: T) -> TaskId {
        let id = TaskId(self.next_id);
        self.next_id += 1;
        self.entries.push(Entry {
            id,
            due,
            every,
            task,
        });
        id
    }

    /// Cancel a task. Returns false if it had already fired or been cancelled.
    pub fn cancel(&mut self, id: TaskId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.id != id);
        self.entries.len() != before
    }

    /// Cancel every pending one-shot task, leaving repeating ones armed.
    pub fn cancel_one_shots(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| e.every.is_some());
        before - self.entries.len()
    }

    pub fn is_scheduled(&self, id: TaskId) -> bool {
        self.entries.iter().any(|e| e.id == id)
    }

    /// Earliest trigger time among pending tasks.
    pub fn next_due(&self) -> Option<DateTime<Utc>> {
        self.entries.iter().map(|e| e.due).min()
    }

    /// Take the earliest task due at or before `now`.
    ///
    /// Ties go to the task scheduled first. Repeating tasks are re-armed one
    /// interval after their due time, so a late poll catches up one firing at
    /// a time. A repeating task whose next firing would fall past the latest
    /// representable instant fires this last time and is dropped.
    pub fn pop_due(&mut self, now: DateTime<Utc>) -> Option<DueTask<T>> {
        let index = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.due <= now)
            .min_by_key(|(_, e)| (e.due, e.id))
            .map(|(i, _)| i)?;

        let rearm = self.entries[index]
            .every
            .and_then(|every| self.entries[index].due.checked_add_signed(every));

        match rearm {
            Some(next) => {
                let entry = &mut self.entries[index];
                let fired = DueTask {
                    id: entry.id,
                    due: entry.due,
                    task: entry.task.clone(),
                };
                entry.due = next;
                Some(fired)
            }
            None => {
                let entry = self.entries.swap_remove(index);
                Some(DueTask {
                    id: entry.id,
                    due: entry.due,
                    task: entry.task,
                })
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_one_shot_fires_once() {
        let mut scheduler = Scheduler::new();
        scheduler.schedule_once(t0(), Duration::from_secs(30), "save");

        assert!(scheduler.pop_due(t0() + chrono::Duration::seconds(29)).is_none());

        let fired = scheduler
            .pop_due(t0() + chrono::Duration::seconds(30))
            .unwrap();
        assert_eq!(fired.task, "save");
        assert!(scheduler.is_empty());
    }

    #[test]
    fn test_due_order_and_ties() {
        let mut scheduler = Scheduler::new();
        scheduler.schedule_once(t0(), Duration::from_secs(60), "b");
        scheduler.schedule_once(t0(), Duration::from_secs(30), "a");
        scheduler.schedule_once(t0(), Duration::from_secs(60), "c");

        let later = t0() + chrono::Duration::minutes(5);
        let order: Vec<_> = std::iter::from_fn(|| scheduler.pop_due(later))
            .map(|d| d.task)
            .collect();
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_repeating_rearms_from_due_time() {
        let mut scheduler = Scheduler::new();
        scheduler.schedule_repeating(t0(), Duration::from_secs(25), "proof");

        let now = t0() + chrono::Duration::seconds(60);
        assert_eq!(
            scheduler.pop_due(now).unwrap().due,
            t0() + chrono::Duration::seconds(25)
        );
        assert_eq!(
            scheduler.pop_due(now).unwrap().due,
            t0() + chrono::Duration::seconds(50)
        );
        assert!(scheduler.pop_due(now).is_none());
        assert_eq!(
            scheduler.next_due(),
            Some(t0() + chrono::Duration::seconds(75))
        );
    }

    #[test]
    fn test_cancel_and_cancel_one_shots() {
        let mut scheduler = Scheduler::new();
        let rotation = scheduler.schedule_repeating(t0(), Duration::from_secs(25), "proof");
        scheduler.schedule_once(t0(), Duration::from_secs(120), "pricing");
        scheduler.schedule_once(t0(), Duration::from_secs(5), "personalize");

        assert_eq!(scheduler.cancel_one_shots(), 2);
        assert!(scheduler.is_scheduled(rotation));
        assert!(scheduler.cancel(rotation));
        assert!(!scheduler.cancel(rotation));
        assert!(scheduler.is_empty());
    }

    #[test]
    fn test_zero_interval_is_raised() {
        let mut scheduler = Scheduler::new();
        scheduler.schedule_repeating(t0(), Duration::ZERO, "spin");

        let now = t0() + chrono::Duration::milliseconds(3);
        let fired = std::iter::from_fn(|| scheduler.pop_due(now)).count();
        assert_eq!(fired, 3);
    }

    #[test]
    fn test_out_of_range_delays_saturate() {
        let mut scheduler = Scheduler::new();
        scheduler.schedule_once(t0(), Duration::from_secs(u64::MAX), "never");
        let flush = scheduler.schedule_repeating(t0(), Duration::from_secs(10_000_000_000_000), "flush");

        assert_eq!(scheduler.next_due(), Some(DateTime::<Utc>::MAX_UTC));
        assert!(scheduler.pop_due(t0() + chrono::Duration::days(365)).is_none());

        let order: Vec<_> = std::iter::from_fn(|| scheduler.pop_due(DateTime::<Utc>::MAX_UTC))
            .map(|d| d.task)
            .collect();
        assert_eq!(order, vec!["never", "flush"]);
        assert!(!scheduler.is_scheduled(flush));
        assert!(scheduler.is_empty());
    }
}
