pub mod client;
pub mod fallback;
pub mod protocol;

pub use client::{AssistantClient, AssistantError};
pub use fallback::{FallbackMode, FallbackReply, FallbackResponder};
pub use protocol::{AssistantReply, HISTORY_WINDOW};
