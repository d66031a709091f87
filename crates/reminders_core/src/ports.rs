//! crates/reminders_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific external implementations like databases or APIs.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::cart::{CartLine, Order};
use crate::domain::{
    Reminder, ReminderType, SavedRecipe, User, UserCredentials, UserPreferences, ValidationError,
};
use crate::scheduler::Notification;

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Invalid input: {0}")]
    Validation(#[from] ValidationError),
    #[error("{provider}: {message}")]
    Provider { provider: String, message: String },
    #[error("{provider}: request timed out")]
    Timeout { provider: String },
    #[error("{provider}: empty response")]
    EmptyResponse { provider: String },
    #[error("The response did not match the expected shape: {0}")]
    InvalidResponse(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

impl PortError {
    pub fn provider(provider: impl Into<String>, message: impl ToString) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.to_string(),
        }
    }
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Persistence Port
//=========================================================================================

#[async_trait]
pub trait DatabaseService: Send + Sync {
    // --- Auth Methods ---
    async fn create_user_with_email(
        &self,
        email: &str,
        hashed_password: &str,
    ) -> PortResult<User>;

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials>;

    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()>;

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid>;

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()>;

    // --- Reminders ---
    async fn list_reminders(&self, user_id: Uuid) -> PortResult<Vec<Reminder>>;

    async fn insert_reminder(&self, user_id: Uuid, reminder: &Reminder) -> PortResult<()>;

    /// Overwrites the stored record with the same id. `NotFound` if it does not exist.
    async fn update_reminder(&self, user_id: Uuid, reminder: &Reminder) -> PortResult<()>;

    async fn delete_reminder(&self, user_id: Uuid, reminder_id: &str) -> PortResult<()>;

    // --- Reminder Type Vocabulary ---
    async fn list_reminder_types(&self, user_id: Uuid) -> PortResult<Vec<ReminderType>>;

    async fn add_reminder_type(&self, user_id: Uuid, name: &str) -> PortResult<ReminderType>;

    async fn delete_reminder_type(&self, user_id: Uuid, type_id: Uuid) -> PortResult<()>;

    // --- Orders ---
    async fn list_orders(&self, user_id: Uuid) -> PortResult<Vec<Order>>;

    /// Stores the order once. Saving the same idempotency key again is a no-op.
    async fn save_order(&self, user_id: Uuid, order: &Order) -> PortResult<()>;

    // --- Saved Recipes ---
    async fn list_saved_recipes(&self, user_id: Uuid) -> PortResult<Vec<SavedRecipe>>;

    async fn save_recipe(&self, user_id: Uuid, recipe: &SavedRecipe) -> PortResult<()>;

    async fn delete_saved_recipe(&self, user_id: Uuid, recipe_id: Uuid) -> PortResult<()>;

    // --- Singletons ---
    async fn get_preferences(&self, user_id: Uuid) -> PortResult<UserPreferences>;

    async fn save_preferences(&self, user_id: Uuid, prefs: &UserPreferences) -> PortResult<()>;

    async fn get_cart(&self, user_id: Uuid) -> PortResult<Vec<CartLine>>;

    async fn save_cart(&self, user_id: Uuid, lines: &[CartLine]) -> PortResult<()>;
}

//=========================================================================================
// Blob Storage Port
//=========================================================================================

#[async_trait]
pub trait BlobStorage: Send + Sync {
    /// Stores an avatar image and returns the public URL it can be fetched from.
    async fn upload_avatar(
        &self,
        user_id: Uuid,
        data: Bytes,
        content_type: &str,
    ) -> PortResult<String>;
}

//=========================================================================================
// Generative AI Port
//=========================================================================================

/// A prompt plus, optionally, the JSON schema the answer must follow.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub prompt: String,
    pub schema: Option<serde_json::Value>,
}

impl CompletionRequest {
    pub fn text(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            schema: None,
        }
    }

    pub fn json(prompt: impl Into<String>, schema: serde_json::Value) -> Self {
        Self {
            prompt: prompt.into(),
            schema: Some(schema),
        }
    }
}

#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Short provider name used to tag errors and log lines.
    fn provider(&self) -> &str;

    /// Whether the provider enforces `CompletionRequest::schema` natively.
    fn supports_structured_output(&self) -> bool {
        false
    }

    /// Returns the raw text of the completion.
    async fn complete(&self, request: &CompletionRequest) -> PortResult<String>;
}

//=========================================================================================
// Local Notification Port
//=========================================================================================

/// The surface notifications are displayed on. One visible notification per tag.
pub trait NotificationSink: Send + Sync {
    /// False when the user has not granted (or has disabled) notifications.
    fn is_available(&self) -> bool;

    /// Displays a notification, replacing any visible one with the same tag.
    fn show(&self, notification: &Notification) -> PortResult<()>;

    /// Visible notifications carrying `tag`.
    fn query(&self, tag: &str) -> Vec<Notification>;

    /// Dismisses every visible notification carrying `tag`.
    fn close(&self, tag: &str);
}

//=========================================================================================
// Clock Port
//=========================================================================================

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}
