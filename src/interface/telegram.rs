use crate::{
    bus::SessionEvent,
    chat::{ConnectionStatus, Sender},
    manager::Manager,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use teloxide::{prelude::*, types::ChatAction, utils::command::BotCommands};
use tracing::{error, info};

/// Optional chat surface over Telegram. Each Telegram chat gets its own
/// conversation session; replies and typing windows are mirrored back from
/// the event bus.
#[derive(Clone)]
pub struct TelegramInterface {
    manager: Arc<Manager>,
    chat_sessions: Arc<Mutex<HashMap<i64, String>>>,
    session_chats: Arc<Mutex<HashMap<String, ChatId>>>,
}

#[derive(BotCommands, Clone)]
#[command(
    rename_rule = "lowercase",
    description = "These commands are supported:"
)]
enum Command {
    #[command(description = "Start a conversation with the assistant.")]
    Start,
    #[command(description = "Display this text.")]
    Help,
    #[command(description = "Start a new chat (clears the current conversation).")]
    New,
    #[command(description = "Show the assistant connection status.")]
    Status,
    #[command(description = "Dismiss the connection notice without resending.")]
    Retry,
}

impl TelegramInterface {
    pub fn new(manager: Arc<Manager>) -> Self {
        Self {
            manager,
            chat_sessions: Arc::new(Mutex::new(HashMap::new())),
            session_chats: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Session for a Telegram chat, created on first contact. Returns the
    /// session id and whether it was just created.
    fn ensure_session(&self, chat_id: ChatId) -> (String, bool) {
        {
            let sessions = self.chat_sessions.lock().unwrap();
            if let Some(session_id) = sessions.get(&chat_id.0) {
                return (session_id.clone(), false);
            }
        }

        let convo = self.manager.create_session();
        let session_id = convo.session_id().to_string();
        self.chat_sessions
            .lock()
            .unwrap()
            .insert(chat_id.0, session_id.clone());
        self.session_chats
            .lock()
            .unwrap()
            .insert(session_id.clone(), chat_id);
        (session_id, true)
    }

    fn chat_for_session(&self, session_id: &str) -> Option<ChatId> {
        self.session_chats.lock().unwrap().get(session_id).copied()
    }

    fn session_for_chat(&self, chat_id: ChatId) -> Option<String> {
        self.chat_sessions.lock().unwrap().get(&chat_id.0).cloned()
    }

    pub async fn run(&self) -> anyhow::Result<()> {
        let token = std::env::var("TELOXIDE_TOKEN")
            .or_else(|_| std::env::var("TELEGRAM_BOT_TOKEN"))
            .map_err(|_| anyhow::anyhow!("TELOXIDE_TOKEN or TELEGRAM_BOT_TOKEN not set"))?;

        // Parse whitelist
        let whitelist_str = std::env::var("TELEGRAM_WHITELIST").unwrap_or_default();
        let whitelist: Vec<String> = whitelist_str
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        if whitelist.is_empty() {
            info!("Warning: No TELEGRAM_WHITELIST configured. All users will be denied access.");
        } else {
            info!("Telegram whitelist loaded: {:?}", whitelist);
        }

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(130))
            .connect_timeout(std::time::Duration::from_secs(10))
            .build()?;

        let bot = Bot::with_client(token, client);
        let interface = self.clone();

        info!("Starting Telegram bot...");

        // Mirror conversation events back into Telegram chats.
        let mut bus_rx = self.manager.bus().subscribe();
        let bot_clone = bot.clone();
        let listener = self.clone();

        tokio::spawn(async move {
            while let Ok(event) = bus_rx.recv().await {
                match event {
                    SessionEvent::MessageAppended { session_id, message }
                        if message.sender == Sender::Assistant && !message.is_welcome() =>
                    {
                        let Some(chat_id) = listener.chat_for_session(&session_id) else {
                            continue;
                        };
                        if let Err(e) = bot_clone.send_message(chat_id, &message.text).await {
                            error!("Failed to send reply to Telegram: {}", e);
                        }
                    }
                    SessionEvent::TypingChanged {
                        session_id,
                        is_typing: true,
                    } => {
                        let Some(chat_id) = listener.chat_for_session(&session_id) else {
                            continue;
                        };
                        if let Err(e) =
                            bot_clone.send_chat_action(chat_id, ChatAction::Typing).await
                        {
                            error!("Failed to send typing action: {}", e);
                        }
                    }
                    SessionEvent::ErrorRaised { session_id, error } => {
                        let Some(chat_id) = listener.chat_for_session(&session_id) else {
                            continue;
                        };
                        if let Err(e) = bot_clone.send_message(chat_id, &error).await {
                            error!("Failed to send error notice to Telegram: {}", e);
                        }
                    }
                    _ => {}
                }
            }
        });

        let whitelist_clone = whitelist.clone();

        let handler = Update::filter_message()
            .branch(dptree::entry().filter_command::<Command>().endpoint(
                move |bot, msg, cmd, interface| {
                    answer_command(bot, msg, cmd, interface, whitelist.clone())
                },
            ))
            .branch(dptree::entry().endpoint(move |bot, msg, interface| {
                answer_message(bot, msg, interface, whitelist_clone.clone())
            }));

        Dispatcher::builder(bot, dptree::entry().branch(handler))
            .dependencies(dptree::deps![interface])
            .enable_ctrlc_handler()
            .build()
            .dispatch()
            .await;

        Ok(())
    }
}

fn authorized(whitelist: &[String], msg: &Message) -> bool {
    msg.from()
        .and_then(|user| user.username.clone())
        .map(|username| whitelist.contains(&username))
        .unwrap_or(false)
}

async fn answer_command(
    bot: Bot,
    msg: Message,
    cmd: Command,
    interface: TelegramInterface,
    whitelist: Vec<String>,
) -> ResponseResult<()> {
    if !authorized(&whitelist, &msg) {
        bot.send_message(msg.chat.id, "You are not authorized to use this bot.")
            .await?;
        return Ok(());
    }

    match cmd {
        Command::Start => {
            let (session_id, _) = interface.ensure_session(msg.chat.id);
            // The seeded welcome message is delivered here rather than via
            // the bus listener, which skips welcome-flagged messages.
            if let Some(convo) = interface.manager.session(&session_id) {
                if let Some(welcome) = convo.snapshot().messages.first() {
                    bot.send_message(msg.chat.id, &welcome.text).await?;
                }
            }
        }
        Command::Help => {
            bot.send_message(msg.chat.id, Command::descriptions().to_string())
                .await?;
        }
        Command::New => {
            let (session_id, created) = interface.ensure_session(msg.chat.id);
            if !created {
                interface.manager.clear(&session_id);
            }
            if let Some(convo) = interface.manager.session(&session_id) {
                if let Some(welcome) = convo.snapshot().messages.first() {
                    bot.send_message(msg.chat.id, &welcome.text).await?;
                }
            }
        }
        Command::Status => {
            let status = interface
                .session_for_chat(msg.chat.id)
                .and_then(|session_id| interface.manager.session(&session_id))
                .map(|convo| convo.connection_status());

            let text = match status {
                Some(ConnectionStatus::Connected) => "Connected to the assistant.",
                Some(ConnectionStatus::Connecting) => "Connecting to the assistant...",
                Some(ConnectionStatus::Disconnected) => {
                    "Not connected. Replies may come from stored answers."
                }
                None => "No conversation yet. Send /start to begin.",
            };
            bot.send_message(msg.chat.id, text).await?;
        }
        Command::Retry => {
            let acknowledged = interface
                .session_for_chat(msg.chat.id)
                .map(|session_id| interface.manager.acknowledge_error(&session_id))
                .unwrap_or(false);

            let text = if acknowledged {
                "Notice dismissed. You can keep chatting."
            } else {
                "Nothing to dismiss."
            };
            bot.send_message(msg.chat.id, text).await?;
        }
    };
    Ok(())
}

async fn answer_message(
    bot: Bot,
    msg: Message,
    interface: TelegramInterface,
    whitelist: Vec<String>,
) -> ResponseResult<()> {
    // If it's a text message that wasn't a command
    if let Some(text) = msg.text() {
        if !authorized(&whitelist, &msg) {
            bot.send_message(msg.chat.id, "You are not authorized to use this bot.")
                .await?;
            return Ok(());
        }

        let (session_id, created) = interface.ensure_session(msg.chat.id);
        if created {
            info!("New Telegram conversation {} -> {}", msg.chat.id, session_id);
        }

        match interface.manager.send(&session_id, text).await {
            Some(crate::dispatch::SendOutcome::Busy) => {
                bot.send_message(
                    msg.chat.id,
                    "Still working on your previous question - one moment.",
                )
                .await?;
            }
            Some(_) => {
                // Replies, typing windows and error notices arrive via the
                // bus listener.
            }
            None => {
                error!("Session {} vanished from the manager", session_id);
            }
        }
    }
    Ok(())
}
