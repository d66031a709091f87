//! services/api/src/web/state.rs
//!
//! Defines the application's shared state and the registry of per-user workspaces.

use crate::config::Config;
use crate::error::HttpResult;
use crate::web::workspace::UserWorkspace;
use reminders_core::assistant::Assistant;
use reminders_core::ports::{BlobStorage, Clock, DatabaseService, PortError};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};
use tracing::debug;
use uuid::Uuid;

pub type SharedWorkspace = Arc<Mutex<UserWorkspace>>;

/// Filled by the first request that needs the workspace.
type WorkspaceSlot = Arc<OnceCell<SharedWorkspace>>;

//=========================================================================================
// AppState (Shared Across All Connections)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
pub struct AppState {
    pub db: Arc<dyn DatabaseService>,
    pub config: Arc<Config>,
    pub assistant: Assistant,
    pub blobs: Arc<dyn BlobStorage>,
    pub clock: Arc<dyn Clock>,
    workspaces: Mutex<HashMap<Uuid, WorkspaceSlot>>,
}

impl AppState {
    pub fn new(
        db: Arc<dyn DatabaseService>,
        config: Arc<Config>,
        assistant: Assistant,
        blobs: Arc<dyn BlobStorage>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            db,
            config,
            assistant,
            blobs,
            clock,
            workspaces: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the user's workspace, loading it from the database on first use.
    ///
    /// The registry lock only covers finding the user's slot. Concurrent first
    /// requests for one user wait on the same load; other users are not blocked.
    /// A failed load leaves the slot empty for the next request to retry.
    pub async fn workspace(&self, user_id: Uuid) -> HttpResult<SharedWorkspace> {
        let slot = self
            .workspaces
            .lock()
            .await
            .entry(user_id)
            .or_default()
            .clone();
        let shared = slot
            .get_or_try_init(|| async {
                let loaded =
                    UserWorkspace::load(self.db.as_ref(), &self.config, self.clock.clone(), user_id)
                        .await?;
                Ok::<_, PortError>(Arc::new(Mutex::new(loaded)))
            })
            .await?;
        Ok(shared.clone())
    }

    /// Every workspace loaded so far.
    pub async fn loaded_workspaces(&self) -> Vec<SharedWorkspace> {
        self.workspaces
            .lock()
            .await
            .values()
            .filter_map(|slot| slot.get().cloned())
            .collect()
    }

    /// Drops the workspaces nobody is using that hold nothing a reload would not
    /// rebuild: no pending or visible notifications and no open socket. Returns
    /// how many were dropped.
    pub async fn evict_idle(&self) -> usize {
        let mut workspaces = self.workspaces.lock().await;
        let before = workspaces.len();
        workspaces.retain(|_, slot| {
            // Someone is between finding the slot and using the workspace.
            if Arc::strong_count(slot) > 1 {
                return true;
            }
            let Some(shared) = slot.get() else {
                return false;
            };
            if Arc::strong_count(shared) > 1 {
                return true;
            }
            match shared.try_lock() {
                Ok(ws) => !ws.is_idle(),
                Err(_) => true,
            }
        });
        let evicted = before - workspaces.len();
        if evicted > 0 {
            debug!("Evicted {} idle workspaces", evicted);
        }
        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory_db::MemoryDb;
    use crate::web::test_support::{state_with, ScriptedCompletions};
    use crate::web::workspace::tests::start;
    use chrono::Duration;
    use reminders_core::clock::ManualClock;
    use reminders_core::domain::ReminderDraft;

    fn state() -> Arc<AppState> {
        state_with(
            Arc::new(MemoryDb::new()),
            ManualClock::new(start()),
            ScriptedCompletions::new(vec![]),
        )
    }

    #[tokio::test]
    async fn concurrent_first_requests_share_one_workspace() {
        let state = state();
        let user_id = Uuid::new_v4();

        let (first, second) = tokio::join!(state.workspace(user_id), state.workspace(user_id));

        assert!(Arc::ptr_eq(&first.unwrap(), &second.unwrap()));
        assert_eq!(state.loaded_workspaces().await.len(), 1);
    }

    #[tokio::test]
    async fn a_stuck_load_does_not_block_other_users() {
        let state = state();
        let stuck = state
            .workspaces
            .lock()
            .await
            .entry(Uuid::new_v4())
            .or_default()
            .clone();
        let hanging = tokio::spawn(async move {
            stuck.get_or_init(std::future::pending).await;
        });
        tokio::task::yield_now().await;

        let other = tokio::time::timeout(
            std::time::Duration::from_secs(1),
            state.workspace(Uuid::new_v4()),
        )
        .await
        .unwrap();
        assert!(other.is_ok());
        let loaded =
            tokio::time::timeout(std::time::Duration::from_secs(1), state.loaded_workspaces())
                .await
                .unwrap();
        assert_eq!(loaded.len(), 1);
        hanging.abort();
    }

    #[tokio::test]
    async fn only_idle_workspaces_are_evicted() {
        let state = state();
        let idle = Uuid::new_v4();
        let scheduled = Uuid::new_v4();
        let in_use = Uuid::new_v4();

        state.workspace(idle).await.unwrap();
        {
            let workspace = state.workspace(scheduled).await.unwrap();
            let mut ws = workspace.lock().await;
            let draft = ReminderDraft {
                title: "Vet appointment".to_string(),
                due_at: Some(start() + Duration::days(2)),
                ..Default::default()
            };
            ws.create_reminder(state.db.as_ref(), draft, start())
                .await
                .unwrap();
        }
        let held = state.workspace(in_use).await.unwrap();

        assert_eq!(state.evict_idle().await, 1);
        assert_eq!(state.loaded_workspaces().await.len(), 2);

        drop(held);
        assert_eq!(state.evict_idle().await, 1);

        let kept = state.workspace(scheduled).await.unwrap();
        assert_eq!(kept.lock().await.reminders.len(), 1);
        // An evicted user is loaded again on the next request.
        state.workspace(idle).await.unwrap();
        assert_eq!(state.loaded_workspaces().await.len(), 2);
    }
}
