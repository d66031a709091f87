//! services/api/src/web/ws_handler.rs
//!
//! The notification channel of a logged-in user. Forwards the user's notification
//! events to the browser and applies the actions the user takes on them.

use crate::error::{HttpError, HttpResult};
use crate::web::{
    protocol::{ClientMessage, ServerMessage},
    state::{AppState, SharedWorkspace},
};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
    Extension,
};
use futures::{
    stream::{SplitSink, StreamExt},
    SinkExt,
};
use reminders_core::ports::NotificationSink;
use reminders_core::scheduler::NotificationAction;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};
use uuid::Uuid;

type WsSender = SplitSink<WebSocket, Message>;

/// The handler for upgrading HTTP requests to WebSocket connections.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, app_state, user_id))
}

async fn send(sender: &mut WsSender, message: &ServerMessage) -> bool {
    match serde_json::to_string(message) {
        Ok(json) => sender.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            error!("Failed to serialize server message: {}", e);
            true
        }
    }
}

async fn handle_socket(socket: WebSocket, app_state: Arc<AppState>, user_id: Uuid) {
    info!("New notification channel for user: {}", user_id);
    let (mut sender, mut receiver) = socket.split();

    // --- 1. Subscribe and replay what is already on screen ---
    let workspace = match app_state.workspace(user_id).await {
        Ok(workspace) => workspace,
        Err(e) => {
            error!("Failed to load workspace for user {}: {}", user_id, e.message);
            let message = ServerMessage::Error {
                message: "Failed to load your reminders.".to_string(),
            };
            let _ = send(&mut sender, &message).await;
            return;
        }
    };
    let (mut events, visible) = {
        let ws = workspace.lock().await;
        (ws.notifier().subscribe(), ws.notifier().visible())
    };
    for notification in visible {
        if !send(&mut sender, &ServerMessage::Notification { notification }).await {
            return;
        }
    }

    // --- 2. Main Message Loop ---
    loop {
        tokio::select! {
            event = events.recv() => {
                let message: ServerMessage = match event {
                    Ok(event) => event.into(),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Notification channel of user {} lagged by {} events", user_id, skipped);
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };
                if !send(&mut sender, &message).await {
                    break;
                }
            }
            incoming = receiver.next() => {
                let text = match incoming {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        warn!("WebSocket error for user {}: {}", user_id, e);
                        break;
                    }
                };
                let reply = match serde_json::from_str::<ClientMessage>(text.as_str()) {
                    Ok(ClientMessage::NotificationAction { reminder_id, action }) => {
                        match apply_action(&app_state, &workspace, &reminder_id, action).await {
                            Ok(reply) => reply,
                            Err(e) => Some(ServerMessage::Error { message: e.message }),
                        }
                    }
                    Err(e) => Some(ServerMessage::Error {
                        message: format!("Unrecognised message: {}", e),
                    }),
                };
                if let Some(reply) = reply {
                    if !send(&mut sender, &reply).await {
                        break;
                    }
                }
            }
        }
    }

    info!("Notification channel closed for user: {}", user_id);
}

/// Applies a notification action. Snoozing replies through the dismissal the
/// reschedule triggers; opening replies with the reminder itself.
async fn apply_action(
    app_state: &AppState,
    workspace: &SharedWorkspace,
    reminder_id: &str,
    action: NotificationAction,
) -> HttpResult<Option<ServerMessage>> {
    let mut ws = workspace.lock().await;
    match action {
        NotificationAction::Snooze => {
            let reminder = ws
                .snooze_for(
                    app_state.db.as_ref(),
                    reminder_id,
                    app_state.config.snooze_minutes,
                    app_state.clock.now(),
                )
                .await?;
            info!("Reminder {} snoozed until {}", reminder.id, reminder.due_at);
            Ok(None)
        }
        NotificationAction::Open => {
            let reminder = ws
                .reminders
                .get(reminder_id)
                .cloned()
                .ok_or_else(|| HttpError::not_found("Reminder"))?;
            ws.notifier().close(reminder_id);
            Ok(Some(ServerMessage::Reminder { reminder }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory_db::MemoryDb;
    use crate::adapters::notifier::NotificationEvent;
    use crate::web::test_support::{state_with, ScriptedCompletions};
    use crate::web::workspace::tests::start;
    use axum::http::StatusCode;
    use chrono::Duration;
    use reminders_core::clock::ManualClock;
    use reminders_core::domain::ReminderDraft;
    use reminders_core::ports::Clock;

    /// A reminder due in an hour whose 30-minute notification is on screen.
    async fn shown_reminder() -> (Arc<AppState>, ManualClock, SharedWorkspace, String) {
        let clock = ManualClock::new(start());
        let state = state_with(
            Arc::new(MemoryDb::new()),
            clock.clone(),
            ScriptedCompletions::new(vec![]),
        );
        let workspace = state.workspace(Uuid::new_v4()).await.unwrap();
        let id = {
            let mut ws = workspace.lock().await;
            let draft = ReminderDraft {
                title: "Pick up cake".to_string(),
                due_at: Some(start() + Duration::hours(1)),
                ..Default::default()
            };
            let reminder = ws
                .create_reminder(state.db.as_ref(), draft, start())
                .await
                .unwrap();
            clock.advance(Duration::minutes(31));
            assert_eq!(ws.drain_due().len(), 1);
            reminder.id
        };
        (state, clock, workspace, id)
    }

    #[tokio::test]
    async fn snooze_dismisses_and_reschedules() {
        let (state, clock, workspace, id) = shown_reminder().await;
        let mut events = workspace.lock().await.notifier().subscribe();

        let reply = apply_action(&state, &workspace, &id, NotificationAction::Snooze)
            .await
            .unwrap();

        assert!(reply.is_none());
        assert_eq!(
            events.recv().await.unwrap(),
            NotificationEvent::Dismissed { tag: id.clone() }
        );
        let ws = workspace.lock().await;
        assert!(ws.notifier().visible().is_empty());
        let snoozed = ws.reminders.get(&id).unwrap();
        assert_eq!(
            snoozed.due_at,
            clock.now() + Duration::minutes(state.config.snooze_minutes)
        );
        assert!(!ws.reminders.notifier().pending_for(&id).is_empty());
        assert_eq!(state.db.list_reminders(ws.user_id).await.unwrap()[0].due_at, snoozed.due_at);
    }

    #[tokio::test]
    async fn open_returns_the_reminder_and_closes_its_notification() {
        let (state, _, workspace, id) = shown_reminder().await;

        let reply = apply_action(&state, &workspace, &id, NotificationAction::Open)
            .await
            .unwrap();

        let Some(ServerMessage::Reminder { reminder }) = reply else {
            panic!("expected the reminder, got {:?}", reply);
        };
        assert_eq!(reminder.id, id);
        let ws = workspace.lock().await;
        assert!(ws.notifier().query(&id).is_empty());
        assert_eq!(ws.reminders.get(&id).unwrap().due_at, reminder.due_at);
    }

    #[tokio::test]
    async fn actions_on_unknown_reminders_are_not_found() {
        let (state, _, workspace, _) = shown_reminder().await;

        for action in [NotificationAction::Snooze, NotificationAction::Open] {
            let err = apply_action(&state, &workspace, "missing", action)
                .await
                .unwrap_err();
            assert_eq!(err.status, StatusCode::NOT_FOUND);
        }
        assert_eq!(workspace.lock().await.notifier().visible().len(), 1);
    }
}
