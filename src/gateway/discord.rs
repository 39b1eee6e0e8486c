//! Discord REST implementation of the messaging gateway.
//!
//! Plain bot-token REST calls against one guild; no gateway websocket is
//! needed since the bot only writes. Requests are rate limited client-side
//! and failures map onto `GatewayError` for callers to log and move on.

use governor::{Quota, RateLimiter};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::{
    CategoryHandle, ChannelHandle, FoundChannel, GatewayError, MessageHandle, MessagingGateway,
    PinnedMessage,
};

const DISCORD_API_URL: &str = "https://discord.com/api/v10";

const CHANNEL_TYPE_TEXT: u8 = 0;
const CHANNEL_TYPE_CATEGORY: u8 = 4;

// =============================================================================
// Wire format
// =============================================================================

#[derive(Debug, Deserialize)]
struct ChannelRecord {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(rename = "type")]
    kind: u8,
}

#[derive(Debug, Deserialize)]
struct MessageRecord {
    id: String,
    channel_id: String,
    author: AuthorRecord,
}

#[derive(Debug, Deserialize)]
struct AuthorRecord {
    id: String,
}

#[derive(Debug, Deserialize)]
struct UserRecord {
    id: String,
    username: String,
}

// =============================================================================
// Gateway
// =============================================================================

type DirectLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

pub struct DiscordGateway {
    client: Client,
    token: String,
    guild_id: String,
    /// The bot's own user id, used to find its pinned messages.
    self_id: String,
    rate_limiter: Arc<DirectLimiter>,
}

impl DiscordGateway {
    /// Builds the gateway and resolves the bot's own identity.
    pub async fn connect(token: &str, guild_id: &str) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| GatewayError::Network(e.to_string()))?;

        let quota = Quota::per_second(NonZeroU32::new(5).unwrap());

        let gateway = Self {
            client,
            token: token.to_string(),
            guild_id: guild_id.to_string(),
            self_id: String::new(),
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
        };

        let me: UserRecord = gateway.get("/users/@me").await?;
        info!(user = %me.username, id = %me.id, "Connected to Discord");
        Ok(Self {
            self_id: me.id,
            ..gateway
        })
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, GatewayError> {
        self.request(reqwest::Method::GET, path, None).await
    }

    async fn request<T: serde::de::DeserializeOwned>(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<T, GatewayError> {
        let text = self.request_raw(method, path, body).await?;
        serde_json::from_str(&text).map_err(|e| GatewayError::Network(e.to_string()))
    }

    async fn request_raw(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<String, GatewayError> {
        self.rate_limiter.until_ready().await;
        let url = format!("{DISCORD_API_URL}{path}");
        debug!(method = %method, path = %path, "Discord request");

        let mut req = self
            .client
            .request(method, &url)
            .header("Authorization", format!("Bot {}", self.token));
        if let Some(body) = body {
            req = req.json(&body);
        }

        let response = req
            .send()
            .await
            .map_err(|e| GatewayError::Network(e.to_string()))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| GatewayError::Network(e.to_string()))?;

        if !status.is_success() {
            return Err(GatewayError::Http {
                status_code: status.as_u16(),
                message: text,
            });
        }
        Ok(text)
    }

    async fn guild_channels(&self) -> Result<Vec<ChannelRecord>, GatewayError> {
        self.get(&format!("/guilds/{}/channels", self.guild_id)).await
    }
}

#[async_trait::async_trait]
impl MessagingGateway for DiscordGateway {
    async fn list_channels(&self) -> Result<Vec<ChannelHandle>, GatewayError> {
        Ok(self
            .guild_channels()
            .await?
            .into_iter()
            .filter(|c| c.kind == CHANNEL_TYPE_TEXT)
            .map(|c| ChannelHandle {
                id: c.id,
                name: c.name,
            })
            .collect())
    }

    async fn find_or_create_channel(&self, name: &str) -> Result<FoundChannel, GatewayError> {
        if let Some(existing) = self
            .list_channels()
            .await?
            .into_iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
        {
            return Ok(FoundChannel {
                channel: existing,
                created: false,
            });
        }

        let record: ChannelRecord = self
            .request(
                reqwest::Method::POST,
                &format!("/guilds/{}/channels", self.guild_id),
                Some(json!({ "name": name, "type": CHANNEL_TYPE_TEXT })),
            )
            .await?;
        info!(channel = %record.name, id = %record.id, "Created channel");
        Ok(FoundChannel {
            channel: ChannelHandle {
                id: record.id,
                name: record.name,
            },
            created: true,
        })
    }

    async fn set_topic(&self, channel: &ChannelHandle, topic: &str) -> Result<(), GatewayError> {
        self.request_raw(
            reqwest::Method::PATCH,
            &format!("/channels/{}", channel.id),
            Some(json!({ "topic": topic })),
        )
        .await?;
        Ok(())
    }

    async fn send_message(
        &self,
        channel: &ChannelHandle,
        text: &str,
    ) -> Result<MessageHandle, GatewayError> {
        let record: MessageRecord = self
            .request(
                reqwest::Method::POST,
                &format!("/channels/{}/messages", channel.id),
                Some(json!({ "content": text })),
            )
            .await?;
        Ok(MessageHandle {
            channel_id: record.channel_id,
            message_id: record.id,
        })
    }

    async fn update_message(
        &self,
        message: &MessageHandle,
        text: &str,
    ) -> Result<MessageHandle, GatewayError> {
        let record: MessageRecord = self
            .request(
                reqwest::Method::PATCH,
                &format!(
                    "/channels/{}/messages/{}",
                    message.channel_id, message.message_id
                ),
                Some(json!({ "content": text })),
            )
            .await?;
        Ok(MessageHandle {
            channel_id: record.channel_id,
            message_id: record.id,
        })
    }

    async fn pin_message(
        &self,
        channel: &ChannelHandle,
        message: &MessageHandle,
    ) -> Result<(), GatewayError> {
        self.request_raw(
            reqwest::Method::PUT,
            &format!("/channels/{}/pins/{}", channel.id, message.message_id),
            None,
        )
        .await?;
        Ok(())
    }

    async fn pinned_messages(
        &self,
        channel: &ChannelHandle,
    ) -> Result<Vec<PinnedMessage>, GatewayError> {
        let records: Vec<MessageRecord> =
            self.get(&format!("/channels/{}/pins", channel.id)).await?;
        Ok(records
            .into_iter()
            .map(|m| PinnedMessage {
                own: m.author.id == self.self_id,
                handle: MessageHandle {
                    channel_id: m.channel_id,
                    message_id: m.id,
                },
            })
            .collect())
    }

    async fn get_or_create_category(&self, name: &str) -> Result<CategoryHandle, GatewayError> {
        if let Some(existing) = self
            .guild_channels()
            .await?
            .into_iter()
            .filter(|c| c.kind == CHANNEL_TYPE_CATEGORY)
            .find(|c| c.name.eq_ignore_ascii_case(name))
        {
            return Ok(CategoryHandle {
                id: existing.id,
                name: existing.name,
            });
        }

        let record: ChannelRecord = self
            .request(
                reqwest::Method::POST,
                &format!("/guilds/{}/channels", self.guild_id),
                Some(json!({ "name": name, "type": CHANNEL_TYPE_CATEGORY })),
            )
            .await?;
        info!(category = %record.name, "Created category");
        Ok(CategoryHandle {
            id: record.id,
            name: record.name,
        })
    }

    async fn move_to_category(
        &self,
        category: &CategoryHandle,
        channel: &ChannelHandle,
    ) -> Result<(), GatewayError> {
        self.request_raw(
            reqwest::Method::PATCH,
            &format!("/channels/{}", channel.id),
            Some(json!({ "parent_id": category.id })),
        )
        .await?;
        Ok(())
    }

    async fn delete_channel(&self, channel: &ChannelHandle) -> Result<(), GatewayError> {
        self.request_raw(
            reqwest::Method::DELETE,
            &format!("/channels/{}", channel.id),
            None,
        )
        .await?;
        info!(channel = %channel.name, "Deleted channel");
        Ok(())
    }
}
