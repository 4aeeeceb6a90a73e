use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::info;

use crate::bus::EventBus;
use crate::conversation::Conversation;
use crate::dispatch::{Dispatcher, SendOutcome};

/// Registry of live conversations. Sessions exist only in memory; restarting
/// the process starts everyone from a fresh log.
pub struct Manager {
    bus: Arc<EventBus>,
    dispatcher: Dispatcher,
    sessions: Mutex<HashMap<String, Arc<Conversation>>>,
}

impl Manager {
    pub fn new(bus: Arc<EventBus>, dispatcher: Dispatcher) -> Self {
        Self {
            bus,
            dispatcher,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn create_session(&self) -> Arc<Conversation> {
        let convo = Arc::new(Conversation::new(self.bus.clone()));
        let mut sessions = self.sessions.lock().unwrap();
        sessions.insert(convo.session_id().to_string(), convo.clone());
        info!("Created session {}", convo.session_id());
        convo
    }

    pub fn session(&self, session_id: &str) -> Option<Arc<Conversation>> {
        let sessions = self.sessions.lock().unwrap();
        sessions.get(session_id).cloned()
    }

    /// Route one user turn into a session. `None` means the session id is
    /// unknown.
    pub async fn send(&self, session_id: &str, text: &str) -> Option<SendOutcome> {
        let convo = self.session(session_id)?;
        Some(self.dispatcher.send(&convo, text).await)
    }

    /// Empty a session's log and re-seed the welcome message.
    pub fn clear(&self, session_id: &str) -> bool {
        match self.session(session_id) {
            Some(convo) => {
                convo.clear();
                true
            }
            None => false,
        }
    }

    /// The retry affordance: drop the error notice and mark the session
    /// connected without resending anything.
    pub fn acknowledge_error(&self, session_id: &str) -> bool {
        match self.session(session_id) {
            Some(convo) => {
                convo.acknowledge_error();
                true
            }
            None => false,
        }
    }
}
