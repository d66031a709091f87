//! crates/reminders_core/src/scheduler.rs
//!
//! Lead-time notifications for reminders.
//!
//! Pending notifications live in a min-heap ordered by fire time. Nothing fires on
//! its own: a single loop in the service calls `drain_due` periodically, which keeps
//! long delays independent of any suspended process timer.

use crate::domain::{Reminder, ValidationError};
use crate::ports::{Clock, NotificationSink};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::Arc;
use tracing::{debug, warn};

/// How long before the due date a notification fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadTime {
    OneWeek,
    ThreeDays,
    OneDay,
    ThirtyMinutes,
}

impl LeadTime {
    pub const ALL: [LeadTime; 4] = [
        LeadTime::OneWeek,
        LeadTime::ThreeDays,
        LeadTime::OneDay,
        LeadTime::ThirtyMinutes,
    ];

    /// The lead time closest to the due date.
    pub const SHORTEST: LeadTime = LeadTime::ThirtyMinutes;

    pub fn offset(self) -> Duration {
        match self {
            LeadTime::OneWeek => Duration::days(7),
            LeadTime::ThreeDays => Duration::days(3),
            LeadTime::OneDay => Duration::days(1),
            LeadTime::ThirtyMinutes => Duration::minutes(30),
        }
    }

    pub fn body(self) -> &'static str {
        match self {
            LeadTime::OneWeek => "Due in 1 week",
            LeadTime::ThreeDays => "Due in 3 days",
            LeadTime::OneDay => "Due tomorrow",
            LeadTime::ThirtyMinutes => "Due in 30 minutes",
        }
    }
}

/// Checks a snooze length in minutes. A snooze has to outlast the shortest lead
/// time, otherwise the reminder comes back with nothing left to fire.
pub fn snooze_length(minutes: i64) -> Result<Duration, ValidationError> {
    let shortest = LeadTime::SHORTEST.offset();
    let length = Duration::try_minutes(minutes).ok_or(ValidationError::SnoozeOutOfRange)?;
    if length <= shortest {
        return Err(ValidationError::SnoozeTooShort(shortest.num_minutes()));
    }
    Ok(length)
}

/// The due date a snooze of `minutes` from `now` lands on.
pub fn snooze_until(now: DateTime<Utc>, minutes: i64) -> Result<DateTime<Utc>, ValidationError> {
    now.checked_add_signed(snooze_length(minutes)?)
        .ok_or(ValidationError::SnoozeOutOfRange)
}

/// Buttons offered on a delivered notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationAction {
    Snooze,
    Open,
}

/// A notification as handed to the sink. `tag` is the reminder id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub tag: String,
    pub title: String,
    pub body: String,
    pub lead_time: LeadTime,
    pub fire_at: DateTime<Utc>,
    pub actions: Vec<NotificationAction>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct Pending {
    fire_at: DateTime<Utc>,
    reminder_id: String,
    lead_time: LeadTime,
    title: String,
}

impl Pending {
    fn into_notification(self) -> Notification {
        Notification {
            body: self.lead_time.body().to_string(),
            tag: self.reminder_id,
            title: self.title,
            lead_time: self.lead_time,
            fire_at: self.fire_at,
            actions: vec![NotificationAction::Snooze, NotificationAction::Open],
        }
    }
}

/// The seam the reminder store uses to keep notifications in step with its records.
pub trait ReminderNotifier {
    /// Replaces whatever is pending for this reminder. Returns how many entries were queued.
    fn schedule(&mut self, reminder: &Reminder) -> usize;

    /// Drops everything pending for the reminder and dismisses its visible notification.
    fn cancel(&mut self, reminder_id: &str);
}

pub struct NotificationScheduler<S> {
    queue: BinaryHeap<Reverse<Pending>>,
    sink: S,
    clock: Arc<dyn Clock>,
}

impl<S: NotificationSink> NotificationScheduler<S> {
    pub fn new(sink: S, clock: Arc<dyn Clock>) -> Self {
        Self {
            queue: BinaryHeap::new(),
            sink,
            clock,
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn schedule(&mut self, reminder: &Reminder) -> usize {
        // Cancel first so two timer sets never coexist for one id.
        self.cancel(&reminder.id);

        if !self.sink.is_available() {
            debug!(reminder_id = %reminder.id, "Notifications unavailable, nothing scheduled");
            return 0;
        }
        if !reminder.is_active() {
            return 0;
        }

        let now = self.clock.now();
        if reminder.due_at <= now {
            return 0;
        }

        let mut queued = 0;
        for lead_time in LeadTime::ALL {
            let fire_at = reminder.due_at - lead_time.offset();
            if fire_at > now {
                self.queue.push(Reverse(Pending {
                    fire_at,
                    reminder_id: reminder.id.clone(),
                    lead_time,
                    title: reminder.title.clone(),
                }));
                queued += 1;
            }
        }
        debug!(reminder_id = %reminder.id, queued, "Scheduled reminder notifications");
        queued
    }

    pub fn cancel(&mut self, reminder_id: &str) {
        self.queue.retain(|Reverse(p)| p.reminder_id != reminder_id);
        if !self.sink.query(reminder_id).is_empty() {
            self.sink.close(reminder_id);
        }
    }

    /// Delivers every notification whose fire time has been reached.
    pub fn drain_due(&mut self) -> Vec<Notification> {
        let now = self.clock.now();
        let mut delivered = Vec::new();

        while self.queue.peek().is_some_and(|Reverse(p)| p.fire_at <= now) {
            let Some(Reverse(pending)) = self.queue.pop() else {
                break;
            };
            let notification = pending.into_notification();
            match self.sink.show(&notification) {
                Ok(()) => delivered.push(notification),
                Err(e) => warn!(tag = %notification.tag, "Failed to show notification: {}", e),
            }
        }
        delivered
    }

    pub fn next_fire_at(&self) -> Option<DateTime<Utc>> {
        self.queue.peek().map(|Reverse(p)| p.fire_at)
    }

    /// Lead times still pending for a reminder, earliest first.
    pub fn pending_for(&self, reminder_id: &str) -> Vec<LeadTime> {
        let mut pending: Vec<&Pending> = self
            .queue
            .iter()
            .map(|Reverse(p)| p)
            .filter(|p| p.reminder_id == reminder_id)
            .collect();
        pending.sort();
        pending.into_iter().map(|p| p.lead_time).collect()
    }

    pub fn pending_len(&self) -> usize {
        self.queue.len()
    }
}

impl<S: NotificationSink> ReminderNotifier for NotificationScheduler<S> {
    fn schedule(&mut self, reminder: &Reminder) -> usize {
        NotificationScheduler::schedule(self, reminder)
    }

    fn cancel(&mut self, reminder_id: &str) {
        NotificationScheduler::cancel(self, reminder_id)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::ports::PortResult;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    /// A sink that remembers what is on screen.
    #[derive(Default)]
    pub(crate) struct ScreenSink {
        pub denied: AtomicBool,
        pub visible: Mutex<Vec<Notification>>,
    }

    impl NotificationSink for Arc<ScreenSink> {
        fn is_available(&self) -> bool {
            !self.denied.load(Ordering::SeqCst)
        }

        fn show(&self, notification: &Notification) -> PortResult<()> {
            let mut visible = self.visible.lock().unwrap();
            visible.retain(|n| n.tag != notification.tag);
            visible.push(notification.clone());
            Ok(())
        }

        fn query(&self, tag: &str) -> Vec<Notification> {
            self.visible
                .lock()
                .unwrap()
                .iter()
                .filter(|n| n.tag == tag)
                .cloned()
                .collect()
        }

        fn close(&self, tag: &str) {
            self.visible.lock().unwrap().retain(|n| n.tag != tag);
        }
    }

    pub(crate) fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    pub(crate) fn reminder(id: &str, due_at: DateTime<Utc>) -> Reminder {
        Reminder {
            id: id.to_string(),
            title: format!("Reminder {}", id),
            description: String::new(),
            due_at,
            category: "other".to_string(),
            recurrence: None,
            completed: false,
            created_at: start(),
        }
    }

    fn scheduler() -> (NotificationScheduler<Arc<ScreenSink>>, Arc<ScreenSink>, ManualClock) {
        let sink = Arc::new(ScreenSink::default());
        let clock = ManualClock::new(start());
        let scheduler = NotificationScheduler::new(sink.clone(), Arc::new(clock.clone()));
        (scheduler, sink, clock)
    }

    #[test]
    fn schedules_every_lead_time_in_the_future() {
        let (mut scheduler, _, _) = scheduler();
        let queued = scheduler.schedule(&reminder("a", start() + Duration::days(10)));

        assert_eq!(queued, 4);
        assert_eq!(scheduler.pending_for("a"), LeadTime::ALL.to_vec());
    }

    #[test]
    fn skips_lead_times_already_passed() {
        let (mut scheduler, _, _) = scheduler();
        scheduler.schedule(&reminder("a", start() + Duration::days(2)));

        assert_eq!(
            scheduler.pending_for("a"),
            vec![LeadTime::OneDay, LeadTime::ThirtyMinutes]
        );
    }

    #[test]
    fn rescheduling_does_not_duplicate() {
        let (mut scheduler, _, _) = scheduler();
        let r = reminder("a", start() + Duration::days(10));
        scheduler.schedule(&r);
        scheduler.schedule(&r);

        assert_eq!(scheduler.pending_for("a"), LeadTime::ALL.to_vec());
        assert_eq!(scheduler.pending_len(), 4);
    }

    #[test]
    fn cancel_clears_pending_and_visible() {
        let (mut scheduler, sink, clock) = scheduler();
        scheduler.schedule(&reminder("a", start() + Duration::days(10)));
        clock.advance(Duration::days(3));
        assert_eq!(scheduler.drain_due().len(), 1);
        assert_eq!(sink.query("a").len(), 1);

        scheduler.cancel("a");

        assert!(scheduler.pending_for("a").is_empty());
        assert!(sink.query("a").is_empty());
    }

    #[test]
    fn drain_delivers_in_order_with_lead_text() {
        let (mut scheduler, sink, clock) = scheduler();
        scheduler.schedule(&reminder("a", start() + Duration::days(10)));
        scheduler.schedule(&reminder("b", start() + Duration::days(4)));

        clock.advance(Duration::days(3) + Duration::hours(1));
        let delivered = scheduler.drain_due();

        let bodies: Vec<(&str, &str)> = delivered
            .iter()
            .map(|n| (n.tag.as_str(), n.body.as_str()))
            .collect();
        assert_eq!(
            bodies,
            vec![("b", "Due in 3 days"), ("a", "Due in 1 week"), ("b", "Due tomorrow")]
        );
        // One visible notification per tag, the latest wins.
        assert_eq!(sink.query("b").len(), 1);
        assert_eq!(sink.query("b")[0].body, "Due tomorrow");
        assert_eq!(
            sink.query("a")[0].actions,
            vec![NotificationAction::Snooze, NotificationAction::Open]
        );
        assert_eq!(
            scheduler.next_fire_at(),
            Some(start() + Duration::days(4) - Duration::minutes(30))
        );
    }

    #[test]
    fn unavailable_sink_is_a_silent_no_op() {
        let (mut scheduler, sink, _) = scheduler();
        sink.denied.store(true, Ordering::SeqCst);

        assert_eq!(scheduler.schedule(&reminder("a", start() + Duration::days(10))), 0);
        assert_eq!(scheduler.pending_len(), 0);
    }

    #[test]
    fn completed_or_past_reminders_are_not_scheduled() {
        let (mut scheduler, _, _) = scheduler();
        let mut done = reminder("a", start() + Duration::days(10));
        done.completed = true;

        assert_eq!(scheduler.schedule(&done), 0);
        assert_eq!(scheduler.schedule(&reminder("b", start() - Duration::minutes(1))), 0);
        assert_eq!(scheduler.next_fire_at(), None);
    }

    #[test]
    fn a_snooze_must_outlast_the_shortest_lead_time() {
        assert_eq!(snooze_length(30), Err(ValidationError::SnoozeTooShort(30)));
        assert_eq!(snooze_length(-5), Err(ValidationError::SnoozeTooShort(30)));
        assert_eq!(snooze_length(i64::MAX), Err(ValidationError::SnoozeOutOfRange));
        assert_eq!(snooze_until(start(), 45), Ok(start() + Duration::minutes(45)));
    }

    #[test]
    fn a_snoozed_reminder_still_has_a_notification_to_fire() {
        let (mut scheduler, _, clock) = scheduler();
        let mut snoozed = reminder("a", start() + Duration::hours(1));
        scheduler.schedule(&snoozed);
        clock.advance(Duration::minutes(31));
        assert_eq!(scheduler.drain_due().len(), 1);

        snoozed.due_at = snooze_until(clock.now(), 31).unwrap();
        assert_eq!(scheduler.schedule(&snoozed), 1);

        clock.advance(Duration::minutes(1));
        assert_eq!(scheduler.drain_due()[0].lead_time, LeadTime::ThirtyMinutes);
    }
}
