//! services/api/src/web/protocol.rs
//!
//! Defines the WebSocket message protocol between the browser client and the API
//! server. The socket carries reminder notifications; everything else goes
//! through the REST API.

use crate::adapters::notifier::NotificationEvent;
use reminders_core::domain::Reminder;
use reminders_core::scheduler::{Notification, NotificationAction};
use serde::{Deserialize, Serialize};

//=========================================================================================
// Messages Sent FROM the Client (Browser) TO the Server
//=========================================================================================

#[derive(Deserialize, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// The user pressed one of a notification's action buttons.
    /// The notification's tag is the reminder id.
    NotificationAction {
        reminder_id: String,
        action: NotificationAction,
    },
}

//=========================================================================================
// Messages Sent FROM the Server TO the Client (Browser)
//=========================================================================================

#[derive(Serialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Display this notification, replacing any visible one with the same tag.
    Notification { notification: Notification },

    /// Remove the visible notification with this tag.
    Dismiss { tag: String },

    /// Answer to an `open` action: the reminder the client should focus.
    Reminder { reminder: Reminder },

    /// Reports a failed action to the client.
    Error { message: String },
}

impl From<NotificationEvent> for ServerMessage {
    fn from(event: NotificationEvent) -> Self {
        match event {
            NotificationEvent::Shown(notification) => ServerMessage::Notification { notification },
            NotificationEvent::Dismissed { tag } => ServerMessage::Dismiss { tag },
        }
    }
}
