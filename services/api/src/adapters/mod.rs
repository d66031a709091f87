pub mod blob;
pub mod db;
pub mod gemini;
pub mod memory_db;
pub mod notifier;
pub mod openai_llm;

pub use blob::LocalBlobStore;
pub use db::DbAdapter;
pub use gemini::GeminiAdapter;
pub use memory_db::MemoryDb;
pub use notifier::{BroadcastNotifier, NotificationEvent};
pub use openai_llm::OpenAiCompletionAdapter;
