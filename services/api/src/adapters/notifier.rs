//! services/api/src/adapters/notifier.rs
//!
//! The notification surface of one user. Implements the `NotificationSink` port by
//! publishing show/dismiss events on a broadcast channel; every open WebSocket of
//! the user subscribes to it and forwards the events to the browser.

use reminders_core::ports::{NotificationSink, PortResult};
use reminders_core::scheduler::Notification;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tracing::debug;

const CHANNEL_CAPACITY: usize = 64;

/// What subscribers receive.
#[derive(Debug, Clone, PartialEq)]
pub enum NotificationEvent {
    Shown(Notification),
    Dismissed { tag: String },
}

struct Inner {
    /// The service-wide switch (`NOTIFICATIONS_ENABLED`).
    enabled: bool,
    /// The user's own preference.
    user_enabled: AtomicBool,
    sender: broadcast::Sender<NotificationEvent>,
    visible: Mutex<Vec<Notification>>,
}

/// Cheap to clone; all clones share the same channel and visible set.
#[derive(Clone)]
pub struct BroadcastNotifier {
    inner: Arc<Inner>,
}

impl BroadcastNotifier {
    pub fn new(enabled: bool, user_enabled: bool) -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                enabled,
                user_enabled: AtomicBool::new(user_enabled),
                sender,
                visible: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NotificationEvent> {
        self.inner.sender.subscribe()
    }

    /// How many sockets are listening.
    pub fn subscriber_count(&self) -> usize {
        self.inner.sender.receiver_count()
    }

    pub fn set_user_enabled(&self, enabled: bool) {
        self.inner.user_enabled.store(enabled, Ordering::SeqCst);
    }

    /// Everything currently shown, e.g. to replay it to a client that just connected.
    pub fn visible(&self) -> Vec<Notification> {
        self.lock_visible().clone()
    }

    fn lock_visible(&self) -> std::sync::MutexGuard<'_, Vec<Notification>> {
        self.inner.visible.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn publish(&self, event: NotificationEvent) {
        // An error only means nobody is connected right now.
        if self.inner.sender.send(event).is_err() {
            debug!("No subscribers for the notification event");
        }
    }
}

impl NotificationSink for BroadcastNotifier {
    fn is_available(&self) -> bool {
        self.inner.enabled && self.inner.user_enabled.load(Ordering::SeqCst)
    }

    fn show(&self, notification: &Notification) -> PortResult<()> {
        {
            let mut visible = self.lock_visible();
            visible.retain(|n| n.tag != notification.tag);
            visible.push(notification.clone());
        }
        self.publish(NotificationEvent::Shown(notification.clone()));
        Ok(())
    }

    fn query(&self, tag: &str) -> Vec<Notification> {
        self.lock_visible()
            .iter()
            .filter(|n| n.tag == tag)
            .cloned()
            .collect()
    }

    fn close(&self, tag: &str) {
        let removed = {
            let mut visible = self.lock_visible();
            let before = visible.len();
            visible.retain(|n| n.tag != tag);
            before != visible.len()
        };
        if removed {
            self.publish(NotificationEvent::Dismissed {
                tag: tag.to_string(),
            });
        }
    }
}
