//! services/api/src/web/test_support.rs
//!
//! Builders shared by the service tests.

use crate::adapters::blob::LocalBlobStore;
use crate::adapters::memory_db::MemoryDb;
use crate::web::state::AppState;
use crate::web::workspace::tests::test_config;
use async_trait::async_trait;
use reminders_core::assistant::Assistant;
use reminders_core::clock::ManualClock;
use reminders_core::ports::{CompletionRequest, CompletionService, PortError, PortResult};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Answers completions from a queue and records the prompts it was given.
pub struct ScriptedCompletions {
    answers: Mutex<VecDeque<PortResult<String>>>,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedCompletions {
    pub fn new(answers: Vec<PortResult<String>>) -> Arc<Self> {
        Arc::new(Self {
            answers: Mutex::new(answers.into()),
            prompts: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl CompletionService for ScriptedCompletions {
    fn provider(&self) -> &str {
        "scripted"
    }

    fn supports_structured_output(&self) -> bool {
        true
    }

    async fn complete(&self, request: &CompletionRequest) -> PortResult<String> {
        self.prompts.lock().unwrap().push(request.prompt.clone());
        self.answers
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(PortError::provider("scripted", "no answer left")))
    }
}

pub fn state_with(
    db: Arc<MemoryDb>,
    clock: ManualClock,
    completions: Arc<ScriptedCompletions>,
) -> Arc<AppState> {
    let config = test_config();
    let blobs = LocalBlobStore::new(std::env::temp_dir().join("avatars"), config.public_base_url.clone());
    Arc::new(AppState::new(
        db,
        Arc::new(config),
        Assistant::new(completions),
        Arc::new(blobs),
        Arc::new(clock),
    ))
}
