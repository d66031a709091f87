pub mod auth;
pub mod cart;
pub mod middleware;
pub mod notification_task;
pub mod preferences;
pub mod protocol;
pub mod recipes;
pub mod reminders;
pub mod rest;
pub mod state;
pub mod workspace;
pub mod ws_handler;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export what the binary needs to assemble the server.
pub use middleware::require_auth;
pub use notification_task::notification_loop;
pub use rest::{router, ApiDoc};
pub use ws_handler::ws_handler;
