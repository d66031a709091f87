//! services/api/src/adapters/memory_db.rs
//!
//! An in-process implementation of the `DatabaseService` port. It backs the
//! service when `DATABASE_URL=memory` and every service-level test.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reminders_core::cart::{CartLine, Order};
use reminders_core::domain::{
    Reminder, ReminderType, SavedRecipe, User, UserCredentials, UserPreferences,
};
use reminders_core::ports::{DatabaseService, PortError, PortResult};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    users: HashMap<String, UserCredentials>,
    sessions: HashMap<String, (Uuid, DateTime<Utc>)>,
    reminders: HashMap<Uuid, Vec<Reminder>>,
    reminder_types: HashMap<Uuid, Vec<ReminderType>>,
    orders: HashMap<Uuid, Vec<Order>>,
    recipes: HashMap<Uuid, Vec<SavedRecipe>>,
    preferences: HashMap<Uuid, UserPreferences>,
    carts: HashMap<Uuid, Vec<CartLine>>,
}

/// A `DatabaseService` that keeps every table in memory.
#[derive(Default)]
pub struct MemoryDb {
    tables: RwLock<Tables>,
    cart_save_failures: AtomicUsize,
}

impl MemoryDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` cart writes fail.
    #[cfg(test)]
    pub fn fail_cart_saves(&self, count: usize) {
        self.cart_save_failures.store(count, Ordering::SeqCst);
    }
}

#[async_trait]
impl DatabaseService for MemoryDb {
    async fn create_user_with_email(&self, email: &str, hashed_password: &str) -> PortResult<User> {
        let mut tables = self.tables.write().await;
        if tables.users.contains_key(email) {
            return Err(PortError::Unexpected(format!("Email {} is already registered", email)));
        }
        let user_id = Uuid::new_v4();
        tables.users.insert(
            email.to_string(),
            UserCredentials {
                user_id,
                email: email.to_string(),
                hashed_password: hashed_password.to_string(),
            },
        );
        Ok(User {
            user_id,
            email: Some(email.to_string()),
        })
    }

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials> {
        self.tables
            .read()
            .await
            .users
            .get(email)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("User {} not found", email)))
    }

    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        self.tables
            .write()
            .await
            .sessions
            .insert(session_id.to_string(), (user_id, expires_at));
        Ok(())
    }

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid> {
        match self.tables.read().await.sessions.get(session_id) {
            Some((user_id, expires_at)) if *expires_at > Utc::now() => Ok(*user_id),
            _ => Err(PortError::Unauthorized),
        }
    }

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()> {
        self.tables.write().await.sessions.remove(session_id);
        Ok(())
    }

    async fn list_reminders(&self, user_id: Uuid) -> PortResult<Vec<Reminder>> {
        let mut reminders = self
            .tables
            .read()
            .await
            .reminders
            .get(&user_id)
            .cloned()
            .unwrap_or_default();
        reminders.sort_by_key(|r| r.due_at);
        Ok(reminders)
    }

    async fn insert_reminder(&self, user_id: Uuid, reminder: &Reminder) -> PortResult<()> {
        self.tables
            .write()
            .await
            .reminders
            .entry(user_id)
            .or_default()
            .push(reminder.clone());
        Ok(())
    }

    async fn update_reminder(&self, user_id: Uuid, reminder: &Reminder) -> PortResult<()> {
        let mut tables = self.tables.write().await;
        let slot = tables
            .reminders
            .get_mut(&user_id)
            .and_then(|rows| rows.iter_mut().find(|r| r.id == reminder.id))
            .ok_or_else(|| PortError::NotFound(format!("Reminder {} not found", reminder.id)))?;
        *slot = reminder.clone();
        Ok(())
    }

    async fn delete_reminder(&self, user_id: Uuid, reminder_id: &str) -> PortResult<()> {
        if let Some(rows) = self.tables.write().await.reminders.get_mut(&user_id) {
            rows.retain(|r| r.id != reminder_id);
        }
        Ok(())
    }

    async fn list_reminder_types(&self, user_id: Uuid) -> PortResult<Vec<ReminderType>> {
        let mut types = self
            .tables
            .read()
            .await
            .reminder_types
            .get(&user_id)
            .cloned()
            .unwrap_or_default();
        types.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(types)
    }

    async fn add_reminder_type(&self, user_id: Uuid, name: &str) -> PortResult<ReminderType> {
        let mut tables = self.tables.write().await;
        let types = tables.reminder_types.entry(user_id).or_default();
        if let Some(existing) = types.iter().find(|t| t.name == name) {
            return Ok(existing.clone());
        }
        let reminder_type = ReminderType {
            id: Uuid::new_v4(),
            name: name.to_string(),
        };
        types.push(reminder_type.clone());
        Ok(reminder_type)
    }

    async fn delete_reminder_type(&self, user_id: Uuid, type_id: Uuid) -> PortResult<()> {
        let mut tables = self.tables.write().await;
        let types = tables.reminder_types.entry(user_id).or_default();
        let before = types.len();
        types.retain(|t| t.id != type_id);
        if types.len() == before {
            return Err(PortError::NotFound(format!("Reminder type {} not found", type_id)));
        }
        Ok(())
    }

    async fn list_orders(&self, user_id: Uuid) -> PortResult<Vec<Order>> {
        let mut orders = self
            .tables
            .read()
            .await
            .orders
            .get(&user_id)
            .cloned()
            .unwrap_or_default();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn save_order(&self, user_id: Uuid, order: &Order) -> PortResult<()> {
        let mut tables = self.tables.write().await;
        let orders = tables.orders.entry(user_id).or_default();
        if !orders.iter().any(|o| o.idempotency_key == order.idempotency_key) {
            orders.push(order.clone());
        }
        Ok(())
    }

    async fn list_saved_recipes(&self, user_id: Uuid) -> PortResult<Vec<SavedRecipe>> {
        let mut recipes = self
            .tables
            .read()
            .await
            .recipes
            .get(&user_id)
            .cloned()
            .unwrap_or_default();
        recipes.sort_by(|a, b| b.saved_at.cmp(&a.saved_at));
        Ok(recipes)
    }

    async fn save_recipe(&self, user_id: Uuid, recipe: &SavedRecipe) -> PortResult<()> {
        self.tables
            .write()
            .await
            .recipes
            .entry(user_id)
            .or_default()
            .push(recipe.clone());
        Ok(())
    }

    async fn delete_saved_recipe(&self, user_id: Uuid, recipe_id: Uuid) -> PortResult<()> {
        let mut tables = self.tables.write().await;
        let recipes = tables.recipes.entry(user_id).or_default();
        let before = recipes.len();
        recipes.retain(|r| r.id != recipe_id);
        if recipes.len() == before {
            return Err(PortError::NotFound(format!("Recipe {} not found", recipe_id)));
        }
        Ok(())
    }

    async fn get_preferences(&self, user_id: Uuid) -> PortResult<UserPreferences> {
        Ok(self
            .tables
            .read()
            .await
            .preferences
            .get(&user_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn save_preferences(&self, user_id: Uuid, prefs: &UserPreferences) -> PortResult<()> {
        self.tables
            .write()
            .await
            .preferences
            .insert(user_id, prefs.clone());
        Ok(())
    }

    async fn get_cart(&self, user_id: Uuid) -> PortResult<Vec<CartLine>> {
        Ok(self
            .tables
            .read()
            .await
            .carts
            .get(&user_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn save_cart(&self, user_id: Uuid, lines: &[CartLine]) -> PortResult<()> {
        let failing = self
            .cart_save_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(PortError::Unexpected("Cart write failed".to_string()));
        }
        self.tables
            .write()
            .await
            .carts
            .insert(user_id, lines.to_vec());
        Ok(())
    }
}
