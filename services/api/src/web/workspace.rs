//! services/api/src/web/workspace.rs
//!
//! A user's in-memory working set: the reminder store (with its notification
//! scheduler) and the cart. Loaded from the database on first use and kept in
//! step with it afterwards.
//!
//! Every mutation is persistence-first: the next record is computed from the
//! current state, written through the `DatabaseService`, and only applied in
//! memory once the write succeeded. A failed write leaves the workspace as it was.

use crate::adapters::notifier::BroadcastNotifier;
use crate::config::Config;
use crate::error::{HttpError, HttpResult};
use chrono::{DateTime, Utc};
use reminders_core::cart::{AddOutcome, Cart, CartItem, CartItemUpdate, CartLine, LineUpdate, Order};
use reminders_core::domain::{Reminder, ReminderDraft, ReminderPatch, UserPreferences, ValidationError};
use reminders_core::ports::{Clock, DatabaseService, NotificationSink, PortResult};
use reminders_core::scheduler::{snooze_until, Notification, NotificationScheduler};
use reminders_core::store::{Completion, ReminderStore};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

pub type UserScheduler = NotificationScheduler<BroadcastNotifier>;

pub struct UserWorkspace {
    pub user_id: Uuid,
    pub reminders: ReminderStore<UserScheduler>,
    pub cart: Cart,
    notifier: BroadcastNotifier,
}

impl UserWorkspace {
    /// Reads the user's reminders, cart and orders and schedules what is pending.
    pub async fn load(
        db: &dyn DatabaseService,
        config: &Config,
        clock: Arc<dyn Clock>,
        user_id: Uuid,
    ) -> PortResult<Self> {
        let reminders = db.list_reminders(user_id).await?;
        let lines = db.get_cart(user_id).await?;
        let orders = db.list_orders(user_id).await?;
        let prefs = db.get_preferences(user_id).await?;

        let notifier = BroadcastNotifier::new(config.notifications_enabled, prefs.notifications_enabled);
        let scheduler = NotificationScheduler::new(notifier.clone(), clock.clone());
        let mut store = ReminderStore::new(scheduler, clock, config.catch_up);
        store.load(reminders);

        let mut cart = Cart::new();
        cart.restore(lines, orders);

        info!(
            "Loaded workspace for user {}: {} reminders, {} pending notifications",
            user_id,
            store.len(),
            store.notifier().pending_len()
        );
        Ok(Self {
            user_id,
            reminders: store,
            cart,
            notifier,
        })
    }

    pub fn notifier(&self) -> &BroadcastNotifier {
        &self.notifier
    }

    /// True when reloading from the database would rebuild this workspace exactly.
    pub fn is_idle(&self) -> bool {
        self.reminders.notifier().pending_len() == 0
            && self.notifier.visible().is_empty()
            && self.notifier.subscriber_count() == 0
    }

    fn existing(&self, id: &str) -> HttpResult<&Reminder> {
        self.reminders
            .get(id)
            .ok_or_else(|| HttpError::not_found("Reminder"))
    }

    //==== Reminders ====//

    pub async fn create_reminder(
        &mut self,
        db: &dyn DatabaseService,
        draft: ReminderDraft,
        now: DateTime<Utc>,
    ) -> HttpResult<Reminder> {
        let reminder = draft.into_reminder(now)?;
        db.insert_reminder(self.user_id, &reminder).await?;
        Ok(self.reminders.add(reminder).clone())
    }

    pub async fn update_reminder(
        &mut self,
        db: &dyn DatabaseService,
        id: &str,
        patch: &ReminderPatch,
    ) -> HttpResult<Reminder> {
        let next = self.existing(id)?.patched(patch);
        if next.title.is_empty() {
            return Err(ValidationError::MissingTitle.into());
        }
        db.update_reminder(self.user_id, &next).await?;
        self.reminders
            .update(id, patch)
            .ok_or_else(|| HttpError::not_found("Reminder"))
    }

    pub async fn delete_reminder(&mut self, db: &dyn DatabaseService, id: &str) -> HttpResult<Reminder> {
        self.existing(id)?;
        db.delete_reminder(self.user_id, id).await?;
        self.reminders
            .delete(id)
            .ok_or_else(|| HttpError::not_found("Reminder"))
    }

    /// Completes the reminder, or moves it to its next occurrence when it repeats.
    pub async fn complete_reminder(
        &mut self,
        db: &dyn DatabaseService,
        id: &str,
    ) -> HttpResult<(Completion, Reminder)> {
        let next = self
            .reminders
            .completion_preview(id)
            .ok_or_else(|| HttpError::not_found("Reminder"))?;
        db.update_reminder(self.user_id, &next).await?;

        // Apply exactly the record that was persisted.
        let patch = ReminderPatch {
            due_at: Some(next.due_at),
            completed: Some(next.completed),
            ..Default::default()
        };
        let applied = self
            .reminders
            .update(id, &patch)
            .ok_or_else(|| HttpError::not_found("Reminder"))?;
        let outcome = if applied.completed {
            Completion::Completed
        } else {
            Completion::Rescheduled {
                next_due: applied.due_at,
            }
        };
        debug!("Reminder {} completed: {:?}", id, outcome);
        Ok((outcome, applied))
    }

    /// Snoozes the reminder for `minutes` from `now`.
    pub async fn snooze_for(
        &mut self,
        db: &dyn DatabaseService,
        id: &str,
        minutes: i64,
        now: DateTime<Utc>,
    ) -> HttpResult<Reminder> {
        let until = snooze_until(now, minutes)?;
        self.snooze_reminder(db, id, until).await
    }

    pub async fn snooze_reminder(
        &mut self,
        db: &dyn DatabaseService,
        id: &str,
        until: DateTime<Utc>,
    ) -> HttpResult<Reminder> {
        let next = self.existing(id)?.patched(&ReminderPatch::due_at(until));
        db.update_reminder(self.user_id, &next).await?;
        self.reminders
            .snooze(id, until)
            .ok_or_else(|| HttpError::not_found("Reminder"))
    }

    //==== Notifications ====//

    /// Shows every notification whose fire time has passed.
    pub fn drain_due(&mut self) -> Vec<Notification> {
        self.reminders.notifier_mut().drain_due()
    }

    /// Persists the preferences and brings the schedule in line with the
    /// notification switch.
    pub async fn save_preferences(
        &mut self,
        db: &dyn DatabaseService,
        prefs: &UserPreferences,
    ) -> HttpResult<()> {
        db.save_preferences(self.user_id, prefs).await?;
        let was_available = self.notifier.is_available();
        self.notifier.set_user_enabled(prefs.notifications_enabled);
        let now_available = self.notifier.is_available();
        if was_available != now_available {
            // Rescheduling on an unavailable sink only cancels.
            let current = self.reminders.list().to_vec();
            self.reminders.load(current);
            info!(
                "Notifications for user {} are now {}",
                self.user_id,
                if now_available { "on" } else { "off" }
            );
        }
        Ok(())
    }

    /// Replaces the preferences. An omitted avatar keeps the stored one.
    pub async fn update_preferences(
        &mut self,
        db: &dyn DatabaseService,
        mut prefs: UserPreferences,
    ) -> HttpResult<UserPreferences> {
        if prefs.avatar_url.is_none() {
            prefs.avatar_url = db.get_preferences(self.user_id).await?.avatar_url;
        }
        self.save_preferences(db, &prefs).await?;
        Ok(prefs)
    }

    pub async fn set_avatar(
        &mut self,
        db: &dyn DatabaseService,
        url: String,
    ) -> HttpResult<UserPreferences> {
        let mut prefs = db.get_preferences(self.user_id).await?;
        prefs.avatar_url = Some(url);
        self.save_preferences(db, &prefs).await?;
        Ok(prefs)
    }

    //==== Cart ====//

    pub async fn add_to_cart(
        &mut self,
        db: &dyn DatabaseService,
        item: CartItem,
        now: DateTime<Utc>,
    ) -> HttpResult<AddOutcome> {
        let mut next = self.cart.clone();
        let outcome = next.add_item(item, now)?;
        if !matches!(outcome, AddOutcome::Ignored(_)) {
            db.save_cart(self.user_id, next.lines()).await?;
            self.cart = next;
        }
        Ok(outcome)
    }

    pub async fn update_cart_item(
        &mut self,
        db: &dyn DatabaseService,
        line_id: Uuid,
        update: &CartItemUpdate,
    ) -> HttpResult<LineUpdate> {
        let mut next = self.cart.clone();
        let result = next
            .update_item(line_id, update)?
            .ok_or_else(|| HttpError::not_found("Cart item"))?;
        db.save_cart(self.user_id, next.lines()).await?;
        self.cart = next;
        Ok(result)
    }

    pub async fn remove_cart_item(
        &mut self,
        db: &dyn DatabaseService,
        line_id: Uuid,
    ) -> HttpResult<CartLine> {
        let mut next = self.cart.clone();
        let removed = next
            .remove_item(line_id)
            .ok_or_else(|| HttpError::not_found("Cart item"))?;
        db.save_cart(self.user_id, next.lines()).await?;
        self.cart = next;
        Ok(removed)
    }

    pub async fn clear_cart(&mut self, db: &dyn DatabaseService) -> HttpResult<()> {
        db.save_cart(self.user_id, &[]).await?;
        self.cart.clear();
        Ok(())
    }

    /// Turns the cart into an order, optionally linked to one of the user's reminders.
    ///
    /// A retry after a partial failure saves the same order again, which the
    /// database drops by its idempotency key. A key that already placed an order
    /// returns that order.
    pub async fn checkout(
        &mut self,
        db: &dyn DatabaseService,
        reminder_id: Option<String>,
        idempotency_key: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> HttpResult<Order> {
        if let Some(placed) = idempotency_key.and_then(|key| self.cart.order_by_key(key)) {
            debug!(
                "Checkout {} was already placed as order {}",
                placed.idempotency_key, placed.id
            );
            return Ok(placed.clone());
        }
        if let Some(id) = &reminder_id {
            self.existing(id)?;
        }
        let order = self.cart.prepare_checkout(reminder_id, idempotency_key, now)?;
        db.save_order(self.user_id, &order).await?;
        db.save_cart(self.user_id, &[]).await?;
        info!(
            "User {} placed order {} ({} lines, total {:.2})",
            self.user_id,
            order.id,
            order.lines.len(),
            order.total
        );
        Ok(self.cart.commit_checkout(order).clone())
    }
}
