use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Greeting seeded into every empty conversation before the first user turn.
pub const WELCOME_TEXT: &str = "Hello! I'm LISA, your intelligent assistant for machine maintenance and support. How can I help you today?";

/// Upper bound on user-entered message length, matching the input box limit.
pub const MAX_MESSAGE_LEN: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Assistant,
}

/// Delivery state of a locally authored message. Transitions only move
/// forward (`Sending -> Sent -> Delivered`), except for the jump to `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Sending,
    Sent,
    Delivered,
    Failed,
}

impl MessageStatus {
    fn rank(self) -> u8 {
        match self {
            MessageStatus::Sending => 0,
            MessageStatus::Sent => 1,
            MessageStatus::Delivered => 2,
            MessageStatus::Failed => 3,
        }
    }

    /// Whether a transition to `next` is allowed.
    pub fn can_advance_to(self, next: MessageStatus) -> bool {
        next == MessageStatus::Failed || next.rank() > self.rank()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_time_ms: Option<u64>,
    #[serde(default)]
    pub is_welcome_message: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub text: String,
    pub sender: Sender,
    pub timestamp: DateTime<Utc>,
    pub status: MessageStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MessageMetadata>,
}

impl Message {
    fn fresh_id(prefix: &str) -> String {
        format!("{}_{}", prefix, Uuid::new_v4().simple())
    }

    /// A locally authored message, echoed optimistically before any server
    /// acknowledgment.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            id: Self::fresh_id("msg"),
            text: text.into(),
            sender: Sender::User,
            timestamp: Utc::now(),
            status: MessageStatus::Sent,
            metadata: None,
        }
    }

    pub fn assistant(text: impl Into<String>, metadata: Option<MessageMetadata>) -> Self {
        Self {
            id: Self::fresh_id("bot"),
            text: text.into(),
            sender: Sender::Assistant,
            timestamp: Utc::now(),
            status: MessageStatus::Delivered,
            metadata,
        }
    }

    pub fn welcome() -> Self {
        let mut msg = Self::assistant(
            WELCOME_TEXT,
            Some(MessageMetadata {
                is_welcome_message: true,
                ..Default::default()
            }),
        );
        msg.id = Self::fresh_id("welcome");
        msg
    }

    pub fn is_welcome(&self) -> bool {
        self.metadata
            .as_ref()
            .map(|m| m.is_welcome_message)
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Connected,
    Connecting,
    Disconnected,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_only_advances_forward() {
        assert!(MessageStatus::Sending.can_advance_to(MessageStatus::Sent));
        assert!(MessageStatus::Sent.can_advance_to(MessageStatus::Delivered));
        assert!(!MessageStatus::Delivered.can_advance_to(MessageStatus::Sent));
        assert!(!MessageStatus::Sent.can_advance_to(MessageStatus::Sending));
        assert!(!MessageStatus::Sent.can_advance_to(MessageStatus::Sent));
    }

    #[test]
    fn any_status_may_fail() {
        for status in [
            MessageStatus::Sending,
            MessageStatus::Sent,
            MessageStatus::Delivered,
        ] {
            assert!(status.can_advance_to(MessageStatus::Failed));
        }
    }

    #[test]
    fn welcome_message_is_flagged() {
        let msg = Message::welcome();
        assert_eq!(msg.sender, Sender::Assistant);
        assert_eq!(msg.status, MessageStatus::Delivered);
        assert!(msg.is_welcome());
        assert_eq!(msg.text, WELCOME_TEXT);
    }

    #[test]
    fn user_message_starts_as_sent() {
        let msg = Message::user("hello");
        assert_eq!(msg.sender, Sender::User);
        assert_eq!(msg.status, MessageStatus::Sent);
        assert!(!msg.is_welcome());
    }
}
