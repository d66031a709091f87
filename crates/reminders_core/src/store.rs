//! crates/reminders_core/src/store.rs
//!
//! The in-memory reminder collection of one user.
//!
//! Every mutation leaves the collection sorted by ascending due date and brings the
//! reminder's pending notifications back in step (cancel, then schedule again).
//! Mutations addressed to an unknown id do nothing and return `None`.

use crate::domain::{Reminder, ReminderPatch};
use crate::ports::Clock;
use crate::recurrence::{advance, CatchUp};
use crate::scheduler::ReminderNotifier;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

/// What `complete` did to the reminder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Completion {
    /// No recurrence rule: the reminder is done for good.
    Completed,
    /// The rule moved the reminder to its next occurrence; it stays active.
    Rescheduled { next_due: DateTime<Utc> },
}

pub struct ReminderStore<N> {
    reminders: Vec<Reminder>,
    notifier: N,
    clock: Arc<dyn Clock>,
    catch_up: CatchUp,
}

impl<N: ReminderNotifier> ReminderStore<N> {
    pub fn new(notifier: N, clock: Arc<dyn Clock>, catch_up: CatchUp) -> Self {
        Self {
            reminders: Vec::new(),
            notifier,
            clock,
            catch_up,
        }
    }

    /// Replaces the whole collection and rebuilds every pending notification.
    pub fn load(&mut self, reminders: Vec<Reminder>) {
        for old in &self.reminders {
            self.notifier.cancel(&old.id);
        }
        self.reminders = reminders;
        self.sort();
        for reminder in &self.reminders {
            if reminder.is_active() {
                self.notifier.schedule(reminder);
            }
        }
    }

    pub fn add(&mut self, reminder: Reminder) -> &Reminder {
        let id = reminder.id.clone();
        self.reminders.push(reminder);
        self.sort();
        self.resync(&id);
        // The id was just pushed, so the lookup cannot miss.
        &self.reminders[self.position(&id).unwrap_or_default()]
    }

    pub fn update(&mut self, id: &str, patch: &ReminderPatch) -> Option<Reminder> {
        let index = self.position(id)?;
        let updated = self.reminders[index].patched(patch);
        self.reminders[index] = updated.clone();
        self.sort();
        self.resync(id);
        Some(updated)
    }

    pub fn delete(&mut self, id: &str) -> Option<Reminder> {
        let index = self.position(id)?;
        let removed = self.reminders.remove(index);
        self.notifier.cancel(id);
        Some(removed)
    }

    pub fn complete(&mut self, id: &str) -> Option<Completion> {
        let index = self.position(id)?;
        let next = self.completed_version(&self.reminders[index]);
        let outcome = if next.completed {
            Completion::Completed
        } else {
            Completion::Rescheduled {
                next_due: next.due_at,
            }
        };
        self.reminders[index] = next;
        self.sort();
        self.resync(id);
        Some(outcome)
    }

    /// Moves the due date. Goes through the same path as any other due-date edit.
    pub fn snooze(&mut self, id: &str, until: DateTime<Utc>) -> Option<Reminder> {
        self.update(id, &ReminderPatch::due_at(until))
    }

    /// The record `complete` would leave behind, without touching the store.
    pub fn completion_preview(&self, id: &str) -> Option<Reminder> {
        self.get(id).map(|r| self.completed_version(r))
    }

    pub fn get(&self, id: &str) -> Option<&Reminder> {
        self.reminders.iter().find(|r| r.id == id)
    }

    /// All reminders, earliest due first.
    pub fn list(&self) -> &[Reminder] {
        &self.reminders
    }

    pub fn upcoming(&self, now: DateTime<Utc>) -> Vec<&Reminder> {
        self.reminders
            .iter()
            .filter(|r| r.is_active() && r.due_at > now)
            .collect()
    }

    pub fn overdue(&self, now: DateTime<Utc>) -> Vec<&Reminder> {
        self.reminders
            .iter()
            .filter(|r| r.is_active() && r.due_at <= now)
            .collect()
    }

    /// Reminders due in `[start, end)`, e.g. one month of a calendar grid.
    pub fn due_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<&Reminder> {
        self.reminders
            .iter()
            .filter(|r| r.due_at >= start && r.due_at < end)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.reminders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reminders.is_empty()
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    pub fn notifier_mut(&mut self) -> &mut N {
        &mut self.notifier
    }

    fn completed_version(&self, reminder: &Reminder) -> Reminder {
        let mut next = reminder.clone();
        let Some(rule) = reminder.recurrence else {
            next.completed = true;
            return next;
        };

        match advance(reminder.due_at, &rule, self.catch_up, self.clock.now()) {
            Some(due_at) => {
                next.due_at = due_at;
                next.completed = false;
            }
            None => {
                warn!(reminder_id = %reminder.id, "Next occurrence is out of range, completing for good");
                next.completed = true;
            }
        }
        next
    }

    fn resync(&mut self, id: &str) {
        let Some(reminder) = self.get(id) else {
            return;
        };
        if reminder.is_active() {
            let reminder = reminder.clone();
            self.notifier.schedule(&reminder);
        } else {
            self.notifier.cancel(id);
        }
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.reminders.iter().position(|r| r.id == id)
    }

    fn sort(&mut self) {
        self.reminders.sort_by(|a, b| {
            a.due_at
                .cmp(&b.due_at)
                .then_with(|| a.title.cmp(&b.title))
                .then_with(|| a.id.cmp(&b.id))
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::domain::{Frequency, RecurrenceRule};
    use crate::ports::NotificationSink;
    use crate::scheduler::tests::{reminder, start, ScreenSink};
    use crate::scheduler::{LeadTime, NotificationScheduler};
    use chrono::{Duration, TimeZone};

    type Store = ReminderStore<NotificationScheduler<Arc<ScreenSink>>>;

    fn store_with(catch_up: CatchUp) -> (Store, Arc<ScreenSink>, ManualClock) {
        let sink = Arc::new(ScreenSink::default());
        let clock = ManualClock::new(start());
        let scheduler = NotificationScheduler::new(sink.clone(), Arc::new(clock.clone()));
        let store = ReminderStore::new(scheduler, Arc::new(clock.clone()), catch_up);
        (store, sink, clock)
    }

    fn store() -> (Store, Arc<ScreenSink>, ManualClock) {
        store_with(CatchUp::OnePeriod)
    }

    fn ids(store: &Store) -> Vec<&str> {
        store.list().iter().map(|r| r.id.as_str()).collect()
    }

    #[test]
    fn keeps_reminders_sorted_by_due_date() {
        let (mut store, _, _) = store();
        store.add(reminder("late", start() + Duration::days(5)));
        store.add(reminder("early", start() + Duration::days(1)));
        store.add(reminder("middle", start() + Duration::days(3)));
        assert_eq!(ids(&store), vec!["early", "middle", "late"]);

        store.update("early", &ReminderPatch::due_at(start() + Duration::days(9)));
        assert_eq!(ids(&store), vec!["middle", "late", "early"]);
    }

    #[test]
    fn add_schedules_notifications() {
        let (mut store, _, _) = store();
        store.add(reminder("a", start() + Duration::days(10)));
        assert_eq!(store.notifier().pending_for("a"), LeadTime::ALL.to_vec());
    }

    #[test]
    fn update_reschedules_from_new_due_date() {
        let (mut store, _, _) = store();
        store.add(reminder("a", start() + Duration::days(10)));

        store.update("a", &ReminderPatch::due_at(start() + Duration::hours(2)));

        assert_eq!(store.notifier().pending_for("a"), vec![LeadTime::ThirtyMinutes]);
        assert_eq!(store.notifier().pending_len(), 1);
    }

    #[test]
    fn delete_cancels_pending_and_visible_notifications() {
        let (mut store, sink, clock) = store();
        store.add(reminder("a", start() + Duration::days(10)));
        clock.advance(Duration::days(3));
        store.notifier_mut().drain_due();
        assert_eq!(sink.query("a").len(), 1);

        let removed = store.delete("a");

        assert_eq!(removed.map(|r| r.id), Some("a".to_string()));
        assert_eq!(store.notifier().pending_len(), 0);
        assert!(sink.query("a").is_empty());
    }

    #[test]
    fn unknown_ids_are_no_ops() {
        let (mut store, _, _) = store();
        store.add(reminder("a", start() + Duration::days(1)));

        assert!(store.update("missing", &ReminderPatch::default()).is_none());
        assert!(store.delete("missing").is_none());
        assert!(store.complete("missing").is_none());
        assert!(store.snooze("missing", start()).is_none());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn completing_without_rule_is_terminal_and_repeatable() {
        let (mut store, _, _) = store();
        store.add(reminder("a", start() + Duration::days(10)));

        assert_eq!(store.complete("a"), Some(Completion::Completed));
        assert_eq!(store.complete("a"), Some(Completion::Completed));

        assert!(store.get("a").unwrap().completed);
        assert!(store.notifier().pending_for("a").is_empty());
    }

    #[test]
    fn completing_weekly_reminder_moves_it_one_week() {
        let (mut store, _, clock) = store();
        let due = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        clock.set(due - Duration::days(1));
        let mut weekly = reminder("w", due);
        weekly.recurrence = Some(RecurrenceRule::every(Frequency::Weekly));
        store.add(weekly);

        let outcome = store.complete("w");

        let next_due = Utc.with_ymd_and_hms(2024, 1, 8, 0, 0, 0).unwrap();
        assert_eq!(outcome, Some(Completion::Rescheduled { next_due }));
        let stored = store.get("w").unwrap();
        assert!(!stored.completed);
        assert_eq!(stored.due_at, next_due);
        assert_eq!(store.notifier().pending_for("w"), LeadTime::ALL.to_vec());
    }

    #[test]
    fn overdue_recurrence_follows_catch_up_policy() {
        let due = start() - Duration::weeks(3);
        let mut weekly = reminder("d", due);
        weekly.recurrence = Some(RecurrenceRule::every(Frequency::Weekly));

        let (mut one_period, _, _) = store_with(CatchUp::OnePeriod);
        one_period.add(weekly.clone());
        one_period.complete("d");
        assert_eq!(one_period.get("d").unwrap().due_at, start() - Duration::weeks(2));
        assert_eq!(one_period.overdue(start()).len(), 1);

        let (mut skip, _, _) = store_with(CatchUp::SkipMissed);
        skip.add(weekly);
        skip.complete("d");
        assert_eq!(skip.get("d").unwrap().due_at, start() + Duration::weeks(1));
        assert_eq!(skip.upcoming(start()).len(), 1);
    }

    #[test]
    fn completion_preview_leaves_store_untouched() {
        let (mut store, _, _) = store();
        store.add(reminder("a", start() + Duration::days(2)));

        let preview = store.completion_preview("a").unwrap();

        assert!(preview.completed);
        assert!(!store.get("a").unwrap().completed);
    }

    #[test]
    fn snooze_moves_due_date_and_reschedules() {
        let (mut store, _, clock) = store();
        store.add(reminder("a", start() + Duration::minutes(20)));
        assert!(store.notifier().pending_for("a").is_empty());

        clock.advance(Duration::minutes(25));
        let until = clock.now() + Duration::hours(1);
        store.snooze("a", until);

        assert_eq!(store.get("a").unwrap().due_at, until);
        assert_eq!(store.notifier().pending_for("a"), vec![LeadTime::ThirtyMinutes]);
    }

    #[test]
    fn load_rebuilds_the_scheduled_set() {
        let (mut store, _, _) = store();
        store.add(reminder("old", start() + Duration::days(10)));

        let mut done = reminder("done", start() + Duration::days(10));
        done.completed = true;
        store.load(vec![reminder("new", start() + Duration::days(2)), done]);

        assert!(store.notifier().pending_for("old").is_empty());
        assert!(store.notifier().pending_for("done").is_empty());
        assert_eq!(store.notifier().pending_for("new").len(), 2);
    }

    #[test]
    fn due_between_is_half_open() {
        let (mut store, _, _) = store();
        store.add(reminder("a", start()));
        store.add(reminder("b", start() + Duration::days(1)));

        let hits = store.due_between(start(), start() + Duration::days(1));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "a");
    }
}
