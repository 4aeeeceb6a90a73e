use crate::bus::{EventBus, SessionEvent};
use crate::chat::{ConnectionStatus, Message, MessageStatus, Sender};
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, TryLockError};
use uuid::Uuid;

/// Snapshot of everything a renderer needs for one session.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ConversationState {
    pub session_id: String,
    pub messages: Vec<Message>,
    pub is_typing: bool,
    pub connection_status: ConnectionStatus,
    pub error: Option<String>,
}

/// Single source of truth for one conversation session.
///
/// All mutation goes through the named methods below; each one publishes a
/// `SessionEvent` so interfaces can re-render. The store itself performs no
/// I/O and the log is never persisted.
pub struct Conversation {
    session_id: String,
    state: Mutex<ConversationState>,
    bus: Arc<EventBus>,
    // Held for the duration of one assistant turn; see Dispatcher::send.
    turn: AsyncMutex<()>,
}

impl Conversation {
    /// Create a fresh session with its own id and a seeded welcome message.
    pub fn new(bus: Arc<EventBus>) -> Self {
        let session_id = format!("session_{}", Uuid::new_v4().simple());
        let convo = Self {
            state: Mutex::new(ConversationState {
                session_id: session_id.clone(),
                messages: Vec::new(),
                is_typing: false,
                connection_status: ConnectionStatus::Disconnected,
                error: None,
            }),
            session_id,
            bus,
            turn: AsyncMutex::new(()),
        };
        convo.seed_welcome();
        convo
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn snapshot(&self) -> ConversationState {
        self.state.lock().unwrap().clone()
    }

    /// Acquire the single assistant-turn slot, or fail if one is outstanding.
    pub fn try_begin_turn(&self) -> Result<tokio::sync::MutexGuard<'_, ()>, TryLockError> {
        self.turn.try_lock()
    }

    fn seed_welcome(&self) {
        let welcome = Message::welcome();
        let seeded = {
            let mut state = self.state.lock().unwrap();
            if state.messages.is_empty() {
                state.messages.push(welcome.clone());
                true
            } else {
                false
            }
        };
        if seeded {
            self.bus.publish(SessionEvent::MessageAppended {
                session_id: self.session_id.clone(),
                message: welcome,
            });
        }
    }

    /// Append a message to the log. The log is append-only; `text`, `sender`
    /// and `timestamp` are never rewritten afterwards.
    pub fn push_message(&self, message: Message) {
        {
            let mut state = self.state.lock().unwrap();
            state.messages.push(message.clone());
        }
        self.bus.publish(SessionEvent::MessageAppended {
            session_id: self.session_id.clone(),
            message,
        });
    }

    /// Advance the delivery status of a locally authored message. Refuses
    /// assistant messages and backwards transitions.
    pub fn update_status(&self, message_id: &str, status: MessageStatus) -> bool {
        let updated = {
            let mut state = self.state.lock().unwrap();
            match state.messages.iter_mut().find(|m| m.id == message_id) {
                Some(msg)
                    if msg.sender == Sender::User && msg.status.can_advance_to(status) =>
                {
                    msg.status = status;
                    true
                }
                _ => false,
            }
        };
        if updated {
            self.bus.publish(SessionEvent::MessageStatusChanged {
                session_id: self.session_id.clone(),
                message_id: message_id.to_string(),
                status,
            });
        }
        updated
    }

    pub fn is_typing(&self) -> bool {
        self.state.lock().unwrap().is_typing
    }

    pub fn set_typing(&self, is_typing: bool) {
        let changed = {
            let mut state = self.state.lock().unwrap();
            let changed = state.is_typing != is_typing;
            state.is_typing = is_typing;
            changed
        };
        if changed {
            self.bus.publish(SessionEvent::TypingChanged {
                session_id: self.session_id.clone(),
                is_typing,
            });
        }
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.state.lock().unwrap().connection_status
    }

    pub fn set_connection_status(&self, status: ConnectionStatus) {
        let changed = {
            let mut state = self.state.lock().unwrap();
            let changed = state.connection_status != status;
            state.connection_status = status;
            changed
        };
        if changed {
            self.bus.publish(SessionEvent::ConnectionChanged {
                session_id: self.session_id.clone(),
                status,
            });
        }
    }

    /// Set the user-facing error slot. A new error overwrites the old one.
    pub fn set_error(&self, error: impl Into<String>) {
        let error = error.into();
        {
            let mut state = self.state.lock().unwrap();
            state.error = Some(error.clone());
        }
        self.bus.publish(SessionEvent::ErrorRaised {
            session_id: self.session_id.clone(),
            error,
        });
    }

    /// The retry affordance: clears the error slot and marks the session
    /// connected again. Does not resend anything.
    pub fn acknowledge_error(&self) {
        let had_error = {
            let mut state = self.state.lock().unwrap();
            state.error.take().is_some()
        };
        if had_error {
            self.bus.publish(SessionEvent::ErrorCleared {
                session_id: self.session_id.clone(),
            });
        }
        self.set_connection_status(ConnectionStatus::Connected);
    }

    /// Empty the log and re-seed the welcome message ("new chat").
    pub fn clear(&self) {
        {
            let mut state = self.state.lock().unwrap();
            state.messages.clear();
            state.error = None;
            state.is_typing = false;
        }
        self.bus.publish(SessionEvent::Cleared {
            session_id: self.session_id.clone(),
        });
        self.seed_welcome();
    }

    /// Trailing window of the log, oldest first, for request context.
    pub fn recent_history(&self, limit: usize) -> Vec<Message> {
        let state = self.state.lock().unwrap();
        let skip = state.messages.len().saturating_sub(limit);
        state.messages.iter().skip(skip).cloned().collect()
    }
}
