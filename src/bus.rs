use crate::chat::{ConnectionStatus, Message, MessageStatus};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum SessionEvent {
    /// A message was appended to a conversation log
    MessageAppended {
        session_id: String,
        message: Message,
    },

    /// The delivery status of a locally authored message changed
    MessageStatusChanged {
        session_id: String,
        message_id: String,
        status: MessageStatus,
    },

    /// The assistant started or stopped composing a reply
    TypingChanged { session_id: String, is_typing: bool },

    /// The connection to the assistant endpoint changed state
    ConnectionChanged {
        session_id: String,
        status: ConnectionStatus,
    },

    /// A user-facing error was raised (single slot, overwrites the previous one)
    ErrorRaised { session_id: String, error: String },

    /// The error slot was acknowledged and emptied
    ErrorCleared { session_id: String },

    /// The conversation log was cleared and re-seeded
    Cleared { session_id: String },
}

impl SessionEvent {
    pub fn session_id(&self) -> &str {
        match self {
            SessionEvent::MessageAppended { session_id, .. }
            | SessionEvent::MessageStatusChanged { session_id, .. }
            | SessionEvent::TypingChanged { session_id, .. }
            | SessionEvent::ConnectionChanged { session_id, .. }
            | SessionEvent::ErrorRaised { session_id, .. }
            | SessionEvent::ErrorCleared { session_id }
            | SessionEvent::Cleared { session_id } => session_id,
        }
    }
}

pub struct EventBus {
    tx: broadcast::Sender<SessionEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(100);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: SessionEvent) {
        // We ignore the error if there are no receivers
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
