//! Messaging gateway: the channel/message surface the bot drives.
//!
//! The core only depends on this trait. `DiscordGateway` talks to the real
//! platform; `MemoryGateway` backs dry-run mode and tests. Operations are
//! idempotent where the contract requires it (channel/category creation,
//! pinning), and failures are surfaced as errors for the caller to log and
//! carry on — the next poll cycle retries the equivalent operation.

pub mod discord;
pub mod memory;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("HTTP error: {status_code} - {message}")]
    Http { status_code: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

/// Handle to a text channel. The id stays valid for the channel's lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelHandle {
    pub id: String,
    pub name: String,
}

/// Handle to a channel category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryHandle {
    pub id: String,
    pub name: String,
}

/// Handle to a sent message. `update_message` returns a fresh handle; the
/// representation may change but it stays addressable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageHandle {
    pub channel_id: String,
    pub message_id: String,
}

/// A pinned message, with whether this bot authored it.
#[derive(Debug, Clone)]
pub struct PinnedMessage {
    pub handle: MessageHandle,
    pub own: bool,
}

/// Result of `find_or_create_channel`. `created` is true only when the
/// channel did not exist before the call, so one-time setup (topic, pinned
/// details message) runs exactly once per channel lifetime.
#[derive(Debug, Clone)]
pub struct FoundChannel {
    pub channel: ChannelHandle,
    pub created: bool,
}

#[async_trait::async_trait]
pub trait MessagingGateway: Send + Sync {
    /// All text channels visible to the bot.
    async fn list_channels(&self) -> Result<Vec<ChannelHandle>, GatewayError>;

    /// Returns the existing channel whose name matches case-insensitively,
    /// or creates one.
    async fn find_or_create_channel(&self, name: &str) -> Result<FoundChannel, GatewayError>;

    /// Best-effort topic update.
    async fn set_topic(&self, channel: &ChannelHandle, topic: &str) -> Result<(), GatewayError>;

    async fn send_message(
        &self,
        channel: &ChannelHandle,
        text: &str,
    ) -> Result<MessageHandle, GatewayError>;

    /// Edits a message in place.
    async fn update_message(
        &self,
        message: &MessageHandle,
        text: &str,
    ) -> Result<MessageHandle, GatewayError>;

    /// Idempotent pin.
    async fn pin_message(
        &self,
        channel: &ChannelHandle,
        message: &MessageHandle,
    ) -> Result<(), GatewayError>;

    async fn pinned_messages(
        &self,
        channel: &ChannelHandle,
    ) -> Result<Vec<PinnedMessage>, GatewayError>;

    /// Returns the existing category of that name, or creates one.
    async fn get_or_create_category(&self, name: &str) -> Result<CategoryHandle, GatewayError>;

    async fn move_to_category(
        &self,
        category: &CategoryHandle,
        channel: &ChannelHandle,
    ) -> Result<(), GatewayError>;

    async fn delete_channel(&self, channel: &ChannelHandle) -> Result<(), GatewayError>;
}
