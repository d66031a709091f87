//! services/api/src/web/preferences.rs
//!
//! REST handlers for the per-user preferences record and the avatar upload.

use crate::error::{HttpError, HttpResult};
use crate::web::state::AppState;
use axum::{
    extract::{Multipart, State},
    Extension, Json,
};
use reminders_core::domain::UserPreferences;
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

const MAX_AVATAR_BYTES: usize = 5 * 1024 * 1024;

/// GET /preferences
#[utoipa::path(
    get,
    path = "/preferences",
    responses((status = 200, description = "The user's preferences, defaults when never saved"))
)]
pub async fn get_preferences_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> HttpResult<Json<UserPreferences>> {
    Ok(Json(state.db.get_preferences(user_id).await?))
}

/// PUT /preferences - Replace the preferences
///
/// The avatar is only changed through the upload endpoint; an omitted
/// `avatar_url` keeps the current one.
#[utoipa::path(
    put,
    path = "/preferences",
    request_body(content_type = "application/json", description = "display_name, location, dietary_restrictions, notifications_enabled."),
    responses((status = 200, description = "The saved preferences"))
)]
pub async fn update_preferences_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Json(prefs): Json<UserPreferences>,
) -> HttpResult<Json<UserPreferences>> {
    let workspace = state.workspace(user_id).await?;
    let mut ws = workspace.lock().await;
    let saved = ws.update_preferences(state.db.as_ref(), prefs).await?;
    Ok(Json(saved))
}

/// POST /preferences/avatar - Upload a profile picture
///
/// Accepts a multipart/form-data request with a single image part.
#[utoipa::path(
    post,
    path = "/preferences/avatar",
    request_body(content_type = "multipart/form-data", description = "The image to upload."),
    responses(
        (status = 200, description = "The preferences with the new avatar_url"),
        (status = 400, description = "Missing file, not an image, or too large")
    )
)]
pub async fn upload_avatar_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    mut multipart: Multipart,
) -> HttpResult<Json<UserPreferences>> {
    let field = multipart
        .next_field()
        .await
        .map_err(|e| HttpError::bad_request(format!("Failed to read multipart data: {}", e)))?
        .ok_or_else(|| HttpError::bad_request("Multipart form must include a file"))?;

    let content_type = field
        .content_type()
        .unwrap_or("application/octet-stream")
        .to_string();
    let data = field.bytes().await.map_err(|e| {
        error!("Failed to read avatar bytes: {}", e);
        HttpError::bad_request("Failed to read file bytes")
    })?;
    if data.len() > MAX_AVATAR_BYTES {
        return Err(HttpError::bad_request("Avatar images are limited to 5 MB"));
    }

    let url = state.blobs.upload_avatar(user_id, data, &content_type).await?;

    let workspace = state.workspace(user_id).await?;
    let mut ws = workspace.lock().await;
    let prefs = ws.set_avatar(state.db.as_ref(), url).await?;
    Ok(Json(prefs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use reminders_core::ports::NotificationSink;
    use crate::adapters::memory_db::MemoryDb;
    use crate::web::test_support::{state_with, ScriptedCompletions};
    use crate::web::workspace::tests::start;
    use axum::body::Body;
    use axum::extract::FromRequest;
    use axum::http::{header::CONTENT_TYPE, Request, StatusCode};
    use reminders_core::clock::ManualClock;

    const BOUNDARY: &str = "avatar-boundary";

    fn state() -> Arc<AppState> {
        state_with(
            Arc::new(MemoryDb::new()),
            ManualClock::new(start()),
            ScriptedCompletions::new(vec![]),
        )
    }

    async fn multipart(content_type: &str, data: &[u8]) -> Multipart {
        let mut body = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"avatar\"; filename=\"me\"\r\nContent-Type: {ct}\r\n\r\n",
            b = BOUNDARY,
            ct = content_type
        )
        .into_bytes();
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());

        let request = Request::builder()
            .method("POST")
            .uri("/preferences/avatar")
            .header(CONTENT_TYPE, format!("multipart/form-data; boundary={}", BOUNDARY))
            .body(Body::from(body))
            .unwrap();
        Multipart::from_request(request, &()).await.unwrap()
    }

    #[tokio::test]
    async fn an_uploaded_avatar_is_stored_in_the_preferences() {
        let state = state();
        let user_id = Uuid::new_v4();

        let Json(prefs) = upload_avatar_handler(
            State(state.clone()),
            Extension(user_id),
            multipart("image/png", b"\x89PNG fake").await,
        )
        .await
        .unwrap();

        let url = prefs.avatar_url.unwrap();
        assert!(url.starts_with("http://localhost:3000/avatars/"));
        assert!(url.ends_with(".png"));
        let Json(stored) = get_preferences_handler(State(state), Extension(user_id))
            .await
            .unwrap();
        assert_eq!(stored.avatar_url, Some(url));
    }

    #[tokio::test]
    async fn only_images_are_accepted_as_avatars() {
        let state = state();
        let user_id = Uuid::new_v4();

        let err = upload_avatar_handler(
            State(state.clone()),
            Extension(user_id),
            multipart("text/plain", b"hello").await,
        )
        .await
        .unwrap_err();

        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(state.db.get_preferences(user_id).await.unwrap().avatar_url, None);
    }

    #[tokio::test]
    async fn saving_preferences_keeps_an_omitted_avatar() {
        let state = state();
        let user_id = Uuid::new_v4();
        upload_avatar_handler(
            State(state.clone()),
            Extension(user_id),
            multipart("image/jpeg", b"jpeg").await,
        )
        .await
        .unwrap();
        let before = state.db.get_preferences(user_id).await.unwrap().avatar_url;

        let update = UserPreferences {
            display_name: Some("Ana".to_string()),
            notifications_enabled: false,
            ..Default::default()
        };
        let Json(saved) = update_preferences_handler(State(state.clone()), Extension(user_id), Json(update))
            .await
            .unwrap();

        assert!(before.is_some());
        assert_eq!(saved.avatar_url, before);
        assert_eq!(saved.display_name.as_deref(), Some("Ana"));
        let workspace = state.workspace(user_id).await.unwrap();
        assert!(!workspace.lock().await.notifier().is_available());
    }
}
