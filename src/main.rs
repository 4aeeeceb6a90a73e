use std::sync::Arc;
use tracing::{error, info};

mod api;
mod assistant;
mod auth;
mod bus;
mod chat;
mod config;
mod conversation;
mod dispatch;
mod interface;
mod manager;
mod store;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    if let Err(e) = dotenvy::dotenv() {
        // It's not fatal if .env doesn't exist, but good to know
        info!("No .env file found or failed to load: {}", e);
    }

    // Initialize logging with default filter if RUST_LOG is not set
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    info!("eLISA daemon starting...");

    let config = config::Config::from_env();

    // Only auth and settings are durable; conversation logs stay in memory.
    let db_path = config.data_dir.join("elisa.db");
    info!("Initializing preference store at {}", db_path.display());
    let store = store::Store::new(&db_path).await?;
    store.init().await?;

    let auth = Arc::new(auth::AuthService::new(store, config.demo_auth));
    if let Some(session) = auth.current_session().await? {
        info!("Restored auth session for {}", session.user.email);
    }

    let bus = Arc::new(bus::EventBus::new());

    let fallback_mode = if config.randomized_fallback {
        assistant::FallbackMode::Randomized
    } else {
        assistant::FallbackMode::Deterministic
    };
    let client = assistant::AssistantClient::new(&config)?;
    let dispatcher =
        dispatch::Dispatcher::new(client, assistant::FallbackResponder::new(fallback_mode));

    let manager = Arc::new(manager::Manager::new(bus.clone(), dispatcher));

    // Local HTTP/SSE API for UI shells
    let api_server = api::ApiServer::new(manager.clone(), auth.clone());
    let app = api_server.router();

    info!("Starting API server on port {}", config.api_port);
    let listener =
        tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.api_port)).await?;

    // Initialize Telegram Interface if token is present
    let telegram_interface = {
        if std::env::var("TELOXIDE_TOKEN").is_ok() || std::env::var("TELEGRAM_BOT_TOKEN").is_ok() {
            Some(interface::telegram::TelegramInterface::new(manager.clone()))
        } else {
            info!("No Telegram token found, skipping Telegram bot startup.");
            None
        }
    };

    let telegram_handle = tokio::spawn(async move {
        if let Some(telegram) = telegram_interface {
            if let Err(e) = telegram.run().await {
                error!("Telegram bot stopped with error: {}", e);
            }
        } else {
            std::future::pending::<()>().await;
        }
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
        res = axum::serve(listener, app) => {
            if let Err(e) = res {
                info!("Server stopped with error: {}", e);
            }
        }
        _ = telegram_handle => {
            error!("Telegram handle finished unexpectedly");
        }
    }

    Ok(())
}
