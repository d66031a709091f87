//! crates/reminders_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs carry serde derives so the service can hand them to the client
//! as-is, but they know nothing about any database or transport.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::num::NonZeroU32;
use uuid::Uuid;

//=========================================================================================
// Reminders
//=========================================================================================

/// How often a recurring reminder comes back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

/// "Every `interval` units of `frequency`". A zero interval cannot be constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurrenceRule {
    pub frequency: Frequency,
    pub interval: NonZeroU32,
}

impl RecurrenceRule {
    pub fn new(frequency: Frequency, interval: NonZeroU32) -> Self {
        Self { frequency, interval }
    }

    /// Shorthand for an interval of one.
    pub fn every(frequency: Frequency) -> Self {
        Self::new(frequency, NonZeroU32::MIN)
    }
}

/// A user-scheduled task or event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reminder {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub due_at: DateTime<Utc>,
    pub category: String,
    #[serde(default)]
    pub recurrence: Option<RecurrenceRule>,
    #[serde(default)]
    pub completed: bool,
    pub created_at: DateTime<Utc>,
}

impl Reminder {
    /// An active reminder is one that can still produce notifications.
    pub fn is_active(&self) -> bool {
        !self.completed
    }

    /// Returns a copy with the patch applied. Fields absent from the patch are kept.
    pub fn patched(&self, patch: &ReminderPatch) -> Reminder {
        let mut next = self.clone();
        if let Some(title) = &patch.title {
            next.title = title.trim().to_string();
        }
        if let Some(description) = &patch.description {
            next.description = description.clone();
        }
        if let Some(due_at) = patch.due_at {
            next.due_at = due_at;
        }
        if let Some(category) = &patch.category {
            next.category = category.clone();
        }
        if let Some(recurrence) = patch.recurrence {
            next.recurrence = recurrence;
        }
        if let Some(completed) = patch.completed {
            next.completed = completed;
        }
        next
    }
}

/// The payload used to create a reminder, either typed by a user or produced by
/// the assistant from natural language.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReminderDraft {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub due_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub recurrence: Option<RecurrenceRule>,
}

/// The category used when a draft does not name one.
pub const DEFAULT_CATEGORY: &str = "other";

/// Reasons user input is rejected before anything is stored.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("A reminder needs a title")]
    MissingTitle,
    #[error("A reminder needs a due date")]
    MissingDueDate,
    #[error("Unsupported file type '{0}'")]
    UnsupportedFileType(String),
    #[error("A snooze must be longer than {0} minutes")]
    SnoozeTooShort(i64),
    #[error("The snooze length is out of range")]
    SnoozeOutOfRange,
}

impl ReminderDraft {
    /// Checks the required fields without building anything.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.title.trim().is_empty() {
            return Err(ValidationError::MissingTitle);
        }
        if self.due_at.is_none() {
            return Err(ValidationError::MissingDueDate);
        }
        Ok(())
    }

    /// Validates the draft and turns it into a fresh, active reminder.
    pub fn into_reminder(self, now: DateTime<Utc>) -> Result<Reminder, ValidationError> {
        self.validate()?;
        let due_at = self.due_at.ok_or(ValidationError::MissingDueDate)?;
        let category = self
            .category
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| DEFAULT_CATEGORY.to_string());

        Ok(Reminder {
            id: Uuid::new_v4().to_string(),
            title: self.title.trim().to_string(),
            description: self.description,
            due_at,
            category,
            recurrence: self.recurrence,
            completed: false,
            created_at: now,
        })
    }
}

/// A partial update. `recurrence: Some(None)` clears the rule, `None` leaves it alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReminderPatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub due_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub recurrence: Option<Option<RecurrenceRule>>,
    #[serde(default)]
    pub completed: Option<bool>,
}

impl ReminderPatch {
    pub fn due_at(due_at: DateTime<Utc>) -> Self {
        Self {
            due_at: Some(due_at),
            ..Default::default()
        }
    }
}

/// Keeps an explicit JSON `null` apart from a missing field.
fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// An entry of a user's reminder category vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderType {
    pub id: Uuid,
    pub name: String,
}

/// Categories offered to a user who has not defined any yet.
pub const DEFAULT_REMINDER_TYPES: [&str; 6] =
    ["birthday", "anniversary", "holiday", "appointment", "bill", "other"];

//=========================================================================================
// Users and preferences
//=========================================================================================

// Represents a user - used throughout app
#[derive(Debug, Clone)]
pub struct User {
    pub user_id: Uuid,
    pub email: Option<String>,
}

// Only used internally for login/signup - contains sensitive data
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user_id: Uuid,
    pub email: String,
    pub hashed_password: String,
}

// Represents a browser login session (auth cookie)
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub id: String,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

/// The per-user singleton settings record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserPreferences {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub dietary_restrictions: Vec<String>,
    #[serde(default = "default_true")]
    pub notifications_enabled: bool,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

fn default_true() -> bool {
    true
}

impl Default for UserPreferences {
    fn default() -> Self {
        Self {
            display_name: None,
            location: None,
            dietary_restrictions: Vec::new(),
            notifications_enabled: true,
            avatar_url: None,
        }
    }
}

//=========================================================================================
// Recipes and vendors
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ingredient {
    pub name: String,
    #[serde(default)]
    pub quantity: String,
}

/// A recipe as produced by the assistant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub servings: Option<u32>,
    pub ingredients: Vec<Ingredient>,
    pub steps: Vec<String>,
}

/// A recipe the user chose to keep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedRecipe {
    pub id: Uuid,
    pub recipe: Recipe,
    pub saved_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VendorRecommendation {
    pub name: String,
    #[serde(default)]
    pub specialty: String,
    #[serde(default)]
    pub price_range: String,
    #[serde(default)]
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap()
    }

    #[test]
    fn draft_without_title_is_rejected() {
        let draft = ReminderDraft {
            title: "   ".to_string(),
            due_at: Some(now()),
            ..Default::default()
        };
        assert_eq!(draft.into_reminder(now()), Err(ValidationError::MissingTitle));
    }

    #[test]
    fn draft_without_due_date_is_rejected() {
        let draft = ReminderDraft {
            title: "Dentist".to_string(),
            ..Default::default()
        };
        assert_eq!(draft.validate(), Err(ValidationError::MissingDueDate));
    }

    #[test]
    fn draft_falls_back_to_default_category() {
        let reminder = ReminderDraft {
            title: " Dentist ".to_string(),
            due_at: Some(now()),
            category: Some("  ".to_string()),
            ..Default::default()
        }
        .into_reminder(now())
        .unwrap();

        assert_eq!(reminder.title, "Dentist");
        assert_eq!(reminder.category, DEFAULT_CATEGORY);
        assert!(reminder.is_active());
    }

    #[test]
    fn patch_distinguishes_null_from_missing_recurrence() {
        let cleared: ReminderPatch = serde_json::from_str(r#"{"recurrence": null}"#).unwrap();
        assert_eq!(cleared.recurrence, Some(None));

        let untouched: ReminderPatch = serde_json::from_str(r#"{"title": "x"}"#).unwrap();
        assert_eq!(untouched.recurrence, None);
    }

    #[test]
    fn zero_interval_does_not_deserialize() {
        let rule = serde_json::from_str::<RecurrenceRule>(r#"{"frequency":"WEEKLY","interval":0}"#);
        assert!(rule.is_err());
    }
}
