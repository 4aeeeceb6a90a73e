use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

/// Production assistant endpoint, used when no override is configured.
pub const DEFAULT_ASSISTANT_URL: &str = "https://gpt.lisec.com/api/elise-rag-agent";

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_API_PORT: u16 = 3000;

#[derive(Debug, Clone)]
pub struct Config {
    /// POST target for assistant queries.
    pub assistant_url: String,
    /// Upper bound on one assistant round trip before the fallback takes over.
    pub request_timeout: Duration,
    /// Bind port for the local HTTP/SSE API.
    pub api_port: u16,
    /// Directory holding the preference database.
    pub data_dir: PathBuf,
    /// Accept any well-formed credentials instead of a real auth backend.
    pub demo_auth: bool,
    /// Pick fallback replies for uncategorized queries at random instead of
    /// the fixed default entry.
    pub randomized_fallback: bool,
    /// Identifier reported to the assistant endpoint.
    pub user_id: String,
}

impl Config {
    /// Read configuration from the environment. Every knob has a default, so
    /// this never fails; unparseable values are logged and replaced.
    pub fn from_env() -> Self {
        let home_dir = std::env::var("HOME").unwrap_or_else(|_| ".".into());
        let data_dir = std::env::var("ELISA_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(home_dir).join(".elisa"));

        Self {
            assistant_url: std::env::var("ELISA_ASSISTANT_URL")
                .unwrap_or_else(|_| DEFAULT_ASSISTANT_URL.to_string()),
            request_timeout: Duration::from_secs(env_u64(
                "ELISA_REQUEST_TIMEOUT_SECS",
                DEFAULT_REQUEST_TIMEOUT_SECS,
            )),
            api_port: env_u64("ELISA_API_PORT", u64::from(DEFAULT_API_PORT)) as u16,
            data_dir,
            demo_auth: env_flag("ELISA_DEMO_AUTH"),
            randomized_fallback: env_flag("ELISA_FALLBACK_RANDOM"),
            user_id: std::env::var("ELISA_USER_ID").unwrap_or_else(|_| "mobile_user".to_string()),
        }
    }
}

fn env_u64(name: &str, default: u64) -> u64 {
    match std::env::var(name) {
        Ok(raw) => match raw.parse() {
            Ok(value) => value,
            Err(_) => {
                warn!("Ignoring unparseable {}={:?}, using {}", name, raw, default);
                default
            }
        },
        Err(_) => default,
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.trim(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}
