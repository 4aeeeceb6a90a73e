use crate::chat::{Message, Sender};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How many trailing messages accompany a query as conversational context.
pub const HISTORY_WINDOW: usize = 10;

/// Platform tag reported in the query context.
pub const PLATFORM: &str = "mobile";

#[derive(Debug, Serialize)]
pub struct AssistantQuery {
    pub query: String,
    pub session_id: String,
    pub user_id: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub conversation_history: Vec<HistoryEntry>,
    pub context: QueryContext,
}

impl AssistantQuery {
    pub fn new(query: &str, session_id: &str, user_id: &str, history: &[Message]) -> Self {
        let skip = history.len().saturating_sub(HISTORY_WINDOW);
        Self {
            query: query.to_string(),
            session_id: session_id.to_string(),
            user_id: user_id.to_string(),
            conversation_history: history[skip..].iter().map(HistoryEntry::from).collect(),
            context: QueryContext::default(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HistoryEntry {
    pub sender: Sender,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl From<&Message> for HistoryEntry {
    fn from(msg: &Message) -> Self {
        Self {
            sender: msg.sender,
            text: msg.text.clone(),
            timestamp: msg.timestamp,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct QueryContext {
    pub platform: &'static str,
    pub app_version: &'static str,
}

impl Default for QueryContext {
    fn default() -> Self {
        Self {
            platform: PLATFORM,
            app_version: env!("CARGO_PKG_VERSION"),
        }
    }
}

/// Reply body as the endpoint actually sends it. Deployments disagree on the
/// name of the text field, so all three spellings are accepted.
#[derive(Debug, Default, Deserialize)]
pub struct RawReply {
    pub response: Option<String>,
    pub answer: Option<String>,
    pub message: Option<String>,
    pub confidence: Option<f64>,
    pub sources: Option<Vec<String>>,
    pub processing_time: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct AssistantReply {
    pub text: String,
    pub confidence: Option<f64>,
    pub sources: Option<Vec<String>>,
    pub processing_time_ms: Option<u64>,
}

impl RawReply {
    /// Returns `None` when no text field is present at all.
    pub fn into_reply(self) -> Option<AssistantReply> {
        let text = self.response.or(self.answer).or(self.message)?;
        Some(AssistantReply {
            text,
            confidence: self.confidence,
            sources: self.sources,
            processing_time_ms: self.processing_time.map(|ms| ms.max(0.0) as u64),
        })
    }
}
