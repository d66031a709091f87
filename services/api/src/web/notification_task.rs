//! services/api/src/web/notification_task.rs
//!
//! The background task that fires due notifications. It only ever touches the
//! notification surface; reminder records are changed by handlers alone.

use crate::web::state::AppState;
use std::sync::Arc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Shows every due notification of every loaded workspace. Returns how many fired.
pub async fn drain_all(app_state: &AppState) -> usize {
    let mut fired = 0;
    for workspace in app_state.loaded_workspaces().await {
        let mut ws = workspace.lock().await;
        let shown = ws.drain_due();
        if !shown.is_empty() {
            debug!("Fired {} notifications for user {}", shown.len(), ws.user_id);
        }
        fired += shown.len();
    }
    fired
}

/// Ticks every `NOTIFICATION_TICK_SECS` until the token is cancelled.
pub async fn notification_loop(app_state: Arc<AppState>, token: CancellationToken) {
    let mut ticker = tokio::time::interval(app_state.config.notification_tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(
        "Notification loop started (every {:?})",
        app_state.config.notification_tick
    );

    loop {
        tokio::select! {
            _ = token.cancelled() => {
                info!("Notification loop stopped.");
                break;
            }
            _ = ticker.tick() => {
                drain_all(&app_state).await;
                app_state.evict_idle().await;
            }
        }
    }
}
