use crate::assistant::{AssistantClient, FallbackResponder};
use crate::chat::{
    ConnectionStatus, Message, MessageMetadata, MessageStatus, MAX_MESSAGE_LEN,
};
use crate::conversation::Conversation;
use serde::Serialize;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Notice placed in the error slot when a round trip fails. The retry
/// affordance clears it without resending.
pub const RETRY_NOTICE: &str =
    "The assistant is currently unreachable. A stored answer was used instead - tap retry once you are back online.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SendOutcome {
    /// The remote assistant answered.
    Delivered,
    /// The round trip failed and a canned reply was substituted.
    Fallback,
    /// Empty or oversized input; nothing changed.
    Ignored,
    /// A turn is already outstanding on this session; nothing changed.
    Busy,
}

/// Drives one user turn end to end: optimistic echo, remote round trip,
/// fallback substitution, typing flag released on every path.
pub struct Dispatcher {
    client: AssistantClient,
    fallback: FallbackResponder,
}

impl Dispatcher {
    pub fn new(client: AssistantClient, fallback: FallbackResponder) -> Self {
        Self { client, fallback }
    }

    pub async fn send(&self, convo: &Conversation, text: &str) -> SendOutcome {
        let text = text.trim();
        if text.is_empty() || text.chars().count() > MAX_MESSAGE_LEN {
            return SendOutcome::Ignored;
        }

        // At most one assistant turn per session. The guard lives until this
        // function returns, whichever branch runs.
        let _turn = match convo.try_begin_turn() {
            Ok(guard) => guard,
            Err(_) => {
                debug!(
                    "Rejecting overlapping send on {}: a turn is outstanding",
                    convo.session_id()
                );
                return SendOutcome::Busy;
            }
        };

        // Context window is the log as it stood before this turn.
        let history = convo.recent_history(crate::assistant::HISTORY_WINDOW);

        let user_msg = Message::user(text);
        let user_msg_id = user_msg.id.clone();
        convo.push_message(user_msg);
        convo.set_typing(true);

        let started = Instant::now();
        let outcome = match self.client.ask(convo.session_id(), text, &history).await {
            Ok(reply) => {
                let elapsed_ms = started.elapsed().as_millis() as u64;
                convo.push_message(Message::assistant(
                    reply.text,
                    Some(MessageMetadata {
                        confidence: reply.confidence,
                        sources: reply.sources,
                        processing_time_ms: Some(reply.processing_time_ms.unwrap_or(elapsed_ms)),
                        is_welcome_message: false,
                    }),
                ));
                convo.set_connection_status(ConnectionStatus::Connected);
                convo.update_status(&user_msg_id, MessageStatus::Delivered);
                info!(
                    "Assistant answered on {} in {}ms",
                    convo.session_id(),
                    elapsed_ms
                );
                SendOutcome::Delivered
            }
            Err(err) => {
                warn!(
                    "Assistant round trip failed on {}: {}",
                    convo.session_id(),
                    err
                );
                let canned = self.fallback.respond(text);
                convo.push_message(Message::assistant(
                    canned.text,
                    Some(MessageMetadata {
                        confidence: Some(canned.confidence),
                        sources: Some(canned.sources),
                        processing_time_ms: Some(started.elapsed().as_millis() as u64),
                        is_welcome_message: false,
                    }),
                ));
                convo.set_connection_status(ConnectionStatus::Disconnected);
                convo.update_status(&user_msg_id, MessageStatus::Failed);
                // An auth challenge is degraded service, not something the
                // user can fix by retrying, so it skips the retry notice.
                if !err.is_auth_required() {
                    convo.set_error(RETRY_NOTICE);
                }
                SendOutcome::Fallback
            }
        };

        convo.set_typing(false);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistant::{AssistantClient, FallbackMode, FallbackResponder};
    use crate::bus::EventBus;
    use crate::chat::Sender;
    use crate::config::Config;
    use axum::{routing::post, Json, Router};
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::Duration;

    fn test_config(assistant_url: String) -> Config {
        Config {
            assistant_url,
            request_timeout: Duration::from_secs(2),
            api_port: 0,
            data_dir: PathBuf::from("."),
            demo_auth: true,
            randomized_fallback: false,
            user_id: "mobile_user".to_string(),
        }
    }

    fn dispatcher(assistant_url: String) -> Dispatcher {
        let client = AssistantClient::new(&test_config(assistant_url)).unwrap();
        Dispatcher::new(client, FallbackResponder::new(FallbackMode::Deterministic))
    }

    fn convo() -> Conversation {
        Conversation::new(Arc::new(EventBus::new()))
    }

    /// Serve `router` on an ephemeral port and return its base URL.
    async fn spawn_stub(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    async fn stub_with_reply(reply: serde_json::Value) -> String {
        let router = Router::new().route(
            "/assistant",
            post(move || {
                let reply = reply.clone();
                async move { Json(reply) }
            }),
        );
        format!("{}/assistant", spawn_stub(router).await)
    }

    #[tokio::test]
    async fn successful_round_trip_appends_both_messages() {
        let url = stub_with_reply(serde_json::json!({
            "response": "Call us.",
            "confidence": 0.9,
            "sources": ["KB"],
        }))
        .await;

        let convo = convo();
        let outcome = dispatcher(url).send(&convo, "contact support").await;
        assert_eq!(outcome, SendOutcome::Delivered);

        let state = convo.snapshot();
        // welcome + user + assistant
        assert_eq!(state.messages.len(), 3);

        let user = &state.messages[1];
        assert_eq!(user.sender, Sender::User);
        assert_eq!(user.text, "contact support");
        assert_eq!(user.status, MessageStatus::Delivered);

        let assistant = &state.messages[2];
        assert_eq!(assistant.sender, Sender::Assistant);
        assert_eq!(assistant.text, "Call us.");
        let meta = assistant.metadata.as_ref().unwrap();
        assert_eq!(meta.confidence, Some(0.9));
        assert_eq!(meta.sources.as_deref(), Some(&["KB".to_string()][..]));

        assert!(!state.is_typing);
        assert_eq!(state.connection_status, ConnectionStatus::Connected);
        assert_eq!(state.error, None);
    }

    #[tokio::test]
    async fn unreachable_endpoint_substitutes_the_fallback() {
        // Nothing listens on this port.
        let convo = convo();
        let outcome = dispatcher("http://127.0.0.1:9/assistant".to_string())
            .send(&convo, "How often should I carry out basic maintenance?")
            .await;
        assert_eq!(outcome, SendOutcome::Fallback);

        let state = convo.snapshot();
        assert_eq!(state.messages.len(), 3);
        let assistant = &state.messages[2];
        assert!(assistant.text.contains("maintenance schedules"));
        assert_eq!(state.messages[1].status, MessageStatus::Failed);
        assert_eq!(state.connection_status, ConnectionStatus::Disconnected);
        assert_eq!(state.error.as_deref(), Some(RETRY_NOTICE));
        assert!(!state.is_typing);
    }

    #[tokio::test]
    async fn auth_challenge_falls_back_without_the_retry_notice() {
        let router = Router::new().route(
            "/assistant",
            post(|| async { axum::http::StatusCode::UNAUTHORIZED }),
        );
        let url = format!("{}/assistant", spawn_stub(router).await);

        let convo = convo();
        let outcome = dispatcher(url).send(&convo, "contact support").await;
        assert_eq!(outcome, SendOutcome::Fallback);

        let state = convo.snapshot();
        assert!(state.messages[2].text.contains("Lisec technical support"));
        assert_eq!(state.connection_status, ConnectionStatus::Disconnected);
        assert_eq!(state.error, None);
        assert!(!state.is_typing);
    }

    #[tokio::test]
    async fn malformed_body_falls_back() {
        let url = stub_with_reply(serde_json::json!({ "confidence": 0.4 })).await;

        let convo = convo();
        let outcome = dispatcher(url).send(&convo, "spare parts please").await;
        assert_eq!(outcome, SendOutcome::Fallback);
        assert!(convo.snapshot().messages[2].text.contains("spare parts"));
    }

    #[tokio::test]
    async fn blank_and_oversized_input_changes_nothing() {
        let url = stub_with_reply(serde_json::json!({ "response": "hi" })).await;
        let dispatcher = dispatcher(url);
        let convo = convo();

        assert_eq!(dispatcher.send(&convo, "   ").await, SendOutcome::Ignored);
        assert_eq!(dispatcher.send(&convo, "").await, SendOutcome::Ignored);
        let oversized = "x".repeat(MAX_MESSAGE_LEN + 1);
        assert_eq!(
            dispatcher.send(&convo, &oversized).await,
            SendOutcome::Ignored
        );

        let state = convo.snapshot();
        assert_eq!(state.messages.len(), 1);
        assert!(!state.is_typing);
    }

    #[tokio::test]
    async fn overlapping_sends_are_rejected() {
        // The stub stalls long enough for a second send to arrive.
        let router = Router::new().route(
            "/assistant",
            post(|| async {
                tokio::time::sleep(Duration::from_millis(300)).await;
                Json(serde_json::json!({ "response": "slow answer" }))
            }),
        );
        let url = format!("{}/assistant", spawn_stub(router).await);

        let dispatcher = Arc::new(dispatcher(url));
        let convo = Arc::new(convo());

        let first = {
            let dispatcher = dispatcher.clone();
            let convo = convo.clone();
            tokio::spawn(async move { dispatcher.send(&convo, "first question").await })
        };

        // Wait until the first turn is visibly in flight.
        while !convo.is_typing() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        assert_eq!(
            dispatcher.send(&convo, "second question").await,
            SendOutcome::Busy
        );
        assert_eq!(first.await.unwrap(), SendOutcome::Delivered);

        let state = convo.snapshot();
        // Only the first turn produced messages: welcome + user + assistant.
        assert_eq!(state.messages.len(), 3);
        assert!(!state.is_typing);
    }

    #[tokio::test]
    async fn history_window_rides_along() {
        use std::sync::Mutex as StdMutex;

        let captured: Arc<StdMutex<Option<serde_json::Value>>> = Arc::new(StdMutex::new(None));
        let captured_clone = captured.clone();
        let router = Router::new().route(
            "/assistant",
            post(move |Json(body): Json<serde_json::Value>| {
                let captured = captured_clone.clone();
                async move {
                    *captured.lock().unwrap() = Some(body);
                    Json(serde_json::json!({ "response": "noted" }))
                }
            }),
        );
        let url = format!("{}/assistant", spawn_stub(router).await);

        let convo = convo();
        dispatcher(url).send(&convo, "hello there").await;

        let body = captured.lock().unwrap().take().unwrap();
        assert_eq!(body["query"], "hello there");
        assert_eq!(body["session_id"], convo.session_id());
        assert_eq!(body["context"]["platform"], "mobile");
        // The welcome message is the only prior context.
        let history = body["conversation_history"].as_array().unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0]["sender"], "assistant");
    }
}
