//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `DatabaseService` port from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reminders_core::cart::{CartLine, Order};
use reminders_core::domain::{
    RecurrenceRule, Recipe, Reminder, ReminderType, SavedRecipe, User, UserCredentials,
    UserPreferences,
};
use reminders_core::ports::{DatabaseService, PortError, PortResult};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `DatabaseService` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

fn not_found_or_unexpected(e: sqlx::Error, what: impl FnOnce() -> String) -> PortError {
    match e {
        sqlx::Error::RowNotFound => PortError::NotFound(what()),
        _ => unexpected(e),
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct UserRecord {
    user_id: Uuid,
    email: String,
}

#[derive(FromRow)]
struct CredentialsRecord {
    user_id: Uuid,
    email: String,
    hashed_password: String,
}
impl CredentialsRecord {
    fn to_domain(self) -> UserCredentials {
        UserCredentials {
            user_id: self.user_id,
            email: self.email,
            hashed_password: self.hashed_password,
        }
    }
}

#[derive(FromRow)]
struct ReminderRecord {
    id: String,
    title: String,
    description: String,
    due_at: DateTime<Utc>,
    category: String,
    recurrence: Option<Json<RecurrenceRule>>,
    completed: bool,
    created_at: DateTime<Utc>,
}
impl ReminderRecord {
    fn to_domain(self) -> Reminder {
        Reminder {
            id: self.id,
            title: self.title,
            description: self.description,
            due_at: self.due_at,
            category: self.category,
            recurrence: self.recurrence.map(|Json(rule)| rule),
            completed: self.completed,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct ReminderTypeRecord {
    id: Uuid,
    name: String,
}
impl ReminderTypeRecord {
    fn to_domain(self) -> ReminderType {
        ReminderType {
            id: self.id,
            name: self.name,
        }
    }
}

#[derive(FromRow)]
struct OrderRecord {
    id: Uuid,
    idempotency_key: Uuid,
    lines: Json<Vec<CartLine>>,
    total: f64,
    reminder_id: Option<String>,
    created_at: DateTime<Utc>,
}
impl OrderRecord {
    fn to_domain(self) -> Order {
        Order {
            id: self.id,
            idempotency_key: self.idempotency_key,
            lines: self.lines.0,
            total: self.total,
            reminder_id: self.reminder_id,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct SavedRecipeRecord {
    id: Uuid,
    recipe: Json<Recipe>,
    saved_at: DateTime<Utc>,
}
impl SavedRecipeRecord {
    fn to_domain(self) -> SavedRecipe {
        SavedRecipe {
            id: self.id,
            recipe: self.recipe.0,
            saved_at: self.saved_at,
        }
    }
}

//=========================================================================================
// `DatabaseService` Trait Implementation
//=========================================================================================

#[async_trait]
impl DatabaseService for DbAdapter {
    async fn create_user_with_email(&self, email: &str, hashed_password: &str) -> PortResult<User> {
        let record = sqlx::query_as::<_, UserRecord>(
            "INSERT INTO users (user_id, email, hashed_password) VALUES ($1, $2, $3) RETURNING user_id, email",
        )
        .bind(Uuid::new_v4())
        .bind(email)
        .bind(hashed_password)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(User {
            user_id: record.user_id,
            email: Some(record.email),
        })
    }

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials> {
        let record = sqlx::query_as::<_, CredentialsRecord>(
            "SELECT user_id, email, hashed_password FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| not_found_or_unexpected(e, || format!("User {} not found", email)))?;
        Ok(record.to_domain())
    }

    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        sqlx::query("INSERT INTO auth_sessions (id, user_id, expires_at) VALUES ($1, $2, $3)")
            .bind(session_id)
            .bind(user_id)
            .bind(expires_at)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid> {
        let user_id: Option<Uuid> = sqlx::query_scalar(
            "SELECT user_id FROM auth_sessions WHERE id = $1 AND expires_at > now()",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        user_id.ok_or(PortError::Unauthorized)
    }

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()> {
        sqlx::query("DELETE FROM auth_sessions WHERE id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn list_reminders(&self, user_id: Uuid) -> PortResult<Vec<Reminder>> {
        let records = sqlx::query_as::<_, ReminderRecord>(
            "SELECT id, title, description, due_at, category, recurrence, completed, created_at \
             FROM reminders WHERE user_id = $1 ORDER BY due_at ASC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn insert_reminder(&self, user_id: Uuid, reminder: &Reminder) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO reminders (id, user_id, title, description, due_at, category, recurrence, completed, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(&reminder.id)
        .bind(user_id)
        .bind(&reminder.title)
        .bind(&reminder.description)
        .bind(reminder.due_at)
        .bind(&reminder.category)
        .bind(reminder.recurrence.map(Json))
        .bind(reminder.completed)
        .bind(reminder.created_at)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }

    async fn update_reminder(&self, user_id: Uuid, reminder: &Reminder) -> PortResult<()> {
        let result = sqlx::query(
            "UPDATE reminders SET title = $3, description = $4, due_at = $5, category = $6, \
             recurrence = $7, completed = $8 WHERE id = $1 AND user_id = $2",
        )
        .bind(&reminder.id)
        .bind(user_id)
        .bind(&reminder.title)
        .bind(&reminder.description)
        .bind(reminder.due_at)
        .bind(&reminder.category)
        .bind(reminder.recurrence.map(Json))
        .bind(reminder.completed)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;

        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Reminder {} not found", reminder.id)));
        }
        Ok(())
    }

    async fn delete_reminder(&self, user_id: Uuid, reminder_id: &str) -> PortResult<()> {
        sqlx::query("DELETE FROM reminders WHERE id = $1 AND user_id = $2")
            .bind(reminder_id)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn list_reminder_types(&self, user_id: Uuid) -> PortResult<Vec<ReminderType>> {
        let records = sqlx::query_as::<_, ReminderTypeRecord>(
            "SELECT id, name FROM reminder_types WHERE user_id = $1 ORDER BY name ASC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn add_reminder_type(&self, user_id: Uuid, name: &str) -> PortResult<ReminderType> {
        // An existing name is returned as-is rather than duplicated.
        let record = sqlx::query_as::<_, ReminderTypeRecord>(
            "INSERT INTO reminder_types (id, user_id, name) VALUES ($1, $2, $3) \
             ON CONFLICT (user_id, name) DO UPDATE SET name = EXCLUDED.name \
             RETURNING id, name",
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(name)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.to_domain())
    }

    async fn delete_reminder_type(&self, user_id: Uuid, type_id: Uuid) -> PortResult<()> {
        let result = sqlx::query("DELETE FROM reminder_types WHERE id = $1 AND user_id = $2")
            .bind(type_id)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Reminder type {} not found", type_id)));
        }
        Ok(())
    }

    async fn list_orders(&self, user_id: Uuid) -> PortResult<Vec<Order>> {
        let records = sqlx::query_as::<_, OrderRecord>(
            "SELECT id, idempotency_key, lines, total, reminder_id, created_at \
             FROM orders WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn save_order(&self, user_id: Uuid, order: &Order) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO orders (id, user_id, idempotency_key, lines, total, reminder_id, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) ON CONFLICT (idempotency_key) DO NOTHING",
        )
        .bind(order.id)
        .bind(user_id)
        .bind(order.idempotency_key)
        .bind(Json(&order.lines))
        .bind(order.total)
        .bind(&order.reminder_id)
        .bind(order.created_at)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }

    async fn list_saved_recipes(&self, user_id: Uuid) -> PortResult<Vec<SavedRecipe>> {
        let records = sqlx::query_as::<_, SavedRecipeRecord>(
            "SELECT id, recipe, saved_at FROM saved_recipes WHERE user_id = $1 ORDER BY saved_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn save_recipe(&self, user_id: Uuid, recipe: &SavedRecipe) -> PortResult<()> {
        sqlx::query("INSERT INTO saved_recipes (id, user_id, recipe, saved_at) VALUES ($1, $2, $3, $4)")
            .bind(recipe.id)
            .bind(user_id)
            .bind(Json(&recipe.recipe))
            .bind(recipe.saved_at)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn delete_saved_recipe(&self, user_id: Uuid, recipe_id: Uuid) -> PortResult<()> {
        let result = sqlx::query("DELETE FROM saved_recipes WHERE id = $1 AND user_id = $2")
            .bind(recipe_id)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Recipe {} not found", recipe_id)));
        }
        Ok(())
    }

    async fn get_preferences(&self, user_id: Uuid) -> PortResult<UserPreferences> {
        let data: Option<Json<UserPreferences>> =
            sqlx::query_scalar("SELECT data FROM preferences WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(unexpected)?;
        Ok(data.map(|Json(p)| p).unwrap_or_default())
    }

    async fn save_preferences(&self, user_id: Uuid, prefs: &UserPreferences) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO preferences (user_id, data) VALUES ($1, $2) \
             ON CONFLICT (user_id) DO UPDATE SET data = EXCLUDED.data",
        )
        .bind(user_id)
        .bind(Json(prefs))
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }

    async fn get_cart(&self, user_id: Uuid) -> PortResult<Vec<CartLine>> {
        let lines: Option<Json<Vec<CartLine>>> =
            sqlx::query_scalar("SELECT lines FROM carts WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(unexpected)?;
        Ok(lines.map(|Json(l)| l).unwrap_or_default())
    }

    async fn save_cart(&self, user_id: Uuid, lines: &[CartLine]) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO carts (user_id, lines, updated_at) VALUES ($1, $2, now()) \
             ON CONFLICT (user_id) DO UPDATE SET lines = EXCLUDED.lines, updated_at = now()",
        )
        .bind(user_id)
        .bind(Json(lines))
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }
}
