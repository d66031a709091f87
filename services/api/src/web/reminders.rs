//! services/api/src/web/reminders.rs
//!
//! REST handlers for reminders and the reminder-type vocabulary.

use crate::error::{HttpError, HttpResult};
use crate::web::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use reminders_core::domain::{
    Reminder, ReminderDraft, ReminderPatch, ReminderType, DEFAULT_REMINDER_TYPES,
};
use reminders_core::store::Completion;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Debug, Clone, Copy, Default, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ReminderView {
    #[default]
    All,
    /// Active reminders due from now on.
    Upcoming,
    /// Active reminders whose due date has passed.
    Overdue,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListRemindersQuery {
    #[serde(default)]
    pub view: Option<ReminderView>,
    /// Start of a due-date window (inclusive). Needs `to`.
    pub from: Option<DateTime<Utc>>,
    /// End of a due-date window (exclusive). Needs `from`.
    pub to: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
pub struct CompleteResponse {
    pub outcome: Completion,
    pub reminder: Reminder,
}

#[derive(Deserialize, ToSchema)]
pub struct SnoozeRequest {
    /// Defaults to the server's configured snooze length. Must be more than 30.
    pub minutes: Option<i64>,
}

#[derive(Deserialize, ToSchema)]
pub struct ParseRequest {
    pub text: String,
}

#[derive(Deserialize, ToSchema)]
pub struct NewReminderType {
    pub name: String,
}

//=========================================================================================
// Reminder Handlers
//=========================================================================================

/// GET /reminders - List the user's reminders, earliest due first
#[utoipa::path(
    get,
    path = "/reminders",
    params(ListRemindersQuery),
    responses(
        (status = 200, description = "The matching reminders"),
        (status = 400, description = "Incomplete due-date window"),
        (status = 401, description = "Not logged in")
    )
)]
pub async fn list_reminders_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Query(query): Query<ListRemindersQuery>,
) -> HttpResult<Json<Vec<Reminder>>> {
    let workspace = state.workspace(user_id).await?;
    let ws = workspace.lock().await;
    let now = state.clock.now();

    let reminders: Vec<Reminder> = match (query.from, query.to) {
        (Some(from), Some(to)) => ws.reminders.due_between(from, to).into_iter().cloned().collect(),
        (None, None) => match query.view.unwrap_or_default() {
            ReminderView::All => ws.reminders.list().to_vec(),
            ReminderView::Upcoming => ws.reminders.upcoming(now).into_iter().cloned().collect(),
            ReminderView::Overdue => ws.reminders.overdue(now).into_iter().cloned().collect(),
        },
        _ => return Err(HttpError::bad_request("Both `from` and `to` are required")),
    };
    Ok(Json(reminders))
}

/// POST /reminders - Create a reminder
#[utoipa::path(
    post,
    path = "/reminders",
    request_body(content_type = "application/json", description = "A reminder draft: title, due_at, optional description, category and recurrence."),
    responses(
        (status = 201, description = "Reminder created"),
        (status = 400, description = "Missing title or due date")
    )
)]
pub async fn create_reminder_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Json(draft): Json<ReminderDraft>,
) -> HttpResult<impl IntoResponse> {
    let workspace = state.workspace(user_id).await?;
    let mut ws = workspace.lock().await;
    let reminder = ws
        .create_reminder(state.db.as_ref(), draft, state.clock.now())
        .await?;
    info!("User {} created reminder {}", user_id, reminder.id);
    Ok((StatusCode::CREATED, Json(reminder)))
}

/// PATCH /reminders/{id} - Update some fields of a reminder
#[utoipa::path(
    patch,
    path = "/reminders/{id}",
    params(("id" = String, Path, description = "Reminder id")),
    request_body(content_type = "application/json", description = "Any subset of title, description, due_at, category, recurrence (null clears it) and completed."),
    responses(
        (status = 200, description = "The updated reminder"),
        (status = 404, description = "Unknown reminder")
    )
)]
pub async fn update_reminder_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(id): Path<String>,
    Json(patch): Json<ReminderPatch>,
) -> HttpResult<Json<Reminder>> {
    let workspace = state.workspace(user_id).await?;
    let mut ws = workspace.lock().await;
    let reminder = ws.update_reminder(state.db.as_ref(), &id, &patch).await?;
    Ok(Json(reminder))
}

/// DELETE /reminders/{id}
#[utoipa::path(
    delete,
    path = "/reminders/{id}",
    params(("id" = String, Path, description = "Reminder id")),
    responses(
        (status = 204, description = "Reminder deleted"),
        (status = 404, description = "Unknown reminder")
    )
)]
pub async fn delete_reminder_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(id): Path<String>,
) -> HttpResult<StatusCode> {
    let workspace = state.workspace(user_id).await?;
    let mut ws = workspace.lock().await;
    ws.delete_reminder(state.db.as_ref(), &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /reminders/{id}/complete - Complete a reminder, or advance a repeating one
#[utoipa::path(
    post,
    path = "/reminders/{id}/complete",
    params(("id" = String, Path, description = "Reminder id")),
    responses(
        (status = 200, description = "`completed`, or `rescheduled` with the next due date"),
        (status = 404, description = "Unknown reminder")
    )
)]
pub async fn complete_reminder_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(id): Path<String>,
) -> HttpResult<Json<CompleteResponse>> {
    let workspace = state.workspace(user_id).await?;
    let mut ws = workspace.lock().await;
    let (outcome, reminder) = ws.complete_reminder(state.db.as_ref(), &id).await?;
    Ok(Json(CompleteResponse { outcome, reminder }))
}

/// POST /reminders/{id}/snooze - Push the due date a few minutes into the future
#[utoipa::path(
    post,
    path = "/reminders/{id}/snooze",
    params(("id" = String, Path, description = "Reminder id")),
    request_body = SnoozeRequest,
    responses(
        (status = 200, description = "The snoozed reminder"),
        (status = 400, description = "Snooze no longer than the 30-minute notice, or out of range"),
        (status = 404, description = "Unknown reminder")
    )
)]
pub async fn snooze_reminder_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(id): Path<String>,
    Json(req): Json<SnoozeRequest>,
) -> HttpResult<Json<Reminder>> {
    let minutes = req.minutes.unwrap_or(state.config.snooze_minutes);
    let workspace = state.workspace(user_id).await?;
    let mut ws = workspace.lock().await;
    let reminder = ws
        .snooze_for(state.db.as_ref(), &id, minutes, state.clock.now())
        .await?;
    Ok(Json(reminder))
}

/// POST /reminders/parse - Turn a sentence into a reminder draft (nothing is saved)
#[utoipa::path(
    post,
    path = "/reminders/parse",
    request_body = ParseRequest,
    responses(
        (status = 200, description = "The draft the assistant extracted"),
        (status = 400, description = "Empty text"),
        (status = 502, description = "Every AI provider failed")
    )
)]
pub async fn parse_reminder_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ParseRequest>,
) -> HttpResult<Json<ReminderDraft>> {
    if req.text.trim().is_empty() {
        return Err(HttpError::bad_request("Nothing to parse"));
    }
    let draft = state
        .assistant
        .parse_reminder(&req.text, state.clock.now())
        .await?;
    Ok(Json(draft))
}

//=========================================================================================
// Reminder Type Handlers
//=========================================================================================

/// GET /reminder-types - The user's categories, seeded with defaults on first use
#[utoipa::path(
    get,
    path = "/reminder-types",
    responses((status = 200, description = "The user's reminder categories"))
)]
pub async fn list_reminder_types_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> HttpResult<Json<Vec<ReminderType>>> {
    let mut types = state.db.list_reminder_types(user_id).await?;
    if types.is_empty() {
        for name in DEFAULT_REMINDER_TYPES {
            state.db.add_reminder_type(user_id, name).await?;
        }
        types = state.db.list_reminder_types(user_id).await?;
    }
    Ok(Json(types))
}

/// POST /reminder-types - Add a category
#[utoipa::path(
    post,
    path = "/reminder-types",
    request_body = NewReminderType,
    responses(
        (status = 201, description = "The category (existing names are returned as-is)"),
        (status = 400, description = "Empty name")
    )
)]
pub async fn add_reminder_type_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Json(req): Json<NewReminderType>,
) -> HttpResult<impl IntoResponse> {
    let name = req.name.trim().to_lowercase();
    if name.is_empty() {
        return Err(HttpError::bad_request("A reminder type needs a name"));
    }
    let reminder_type = state.db.add_reminder_type(user_id, &name).await?;
    Ok((StatusCode::CREATED, Json(reminder_type)))
}

/// DELETE /reminder-types/{id}
#[utoipa::path(
    delete,
    path = "/reminder-types/{id}",
    params(("id" = Uuid, Path, description = "Reminder type id")),
    responses(
        (status = 204, description = "Category deleted"),
        (status = 404, description = "Unknown category")
    )
)]
pub async fn delete_reminder_type_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(id): Path<Uuid>,
) -> HttpResult<StatusCode> {
    state.db.delete_reminder_type(user_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
