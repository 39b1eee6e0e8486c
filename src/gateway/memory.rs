//! In-memory messaging gateway.
//!
//! Deterministic stand-in for the real platform, used by tests and by
//! dry-run mode so the whole pipeline can run without credentials.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use tracing::info;

use super::{
    CategoryHandle, ChannelHandle, FoundChannel, GatewayError, MessageHandle, MessagingGateway,
    PinnedMessage,
};

#[derive(Debug, Clone)]
struct StoredMessage {
    id: u64,
    text: String,
    pinned: bool,
    own: bool,
}

#[derive(Debug)]
struct StoredChannel {
    id: u64,
    name: String,
    topic: Option<String>,
    category_id: Option<u64>,
    messages: Vec<StoredMessage>,
}

#[derive(Debug, Default)]
struct Inner {
    channels: Vec<StoredChannel>,
    categories: Vec<(u64, String)>,
}

/// In-memory gateway. Cheap to clone handles out of; all state lives behind
/// one mutex since test and dry-run traffic is tiny.
#[derive(Debug, Default)]
pub struct MemoryGateway {
    inner: Mutex<Inner>,
    next_id: AtomicU64,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn fresh_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    // =========================================================================
    // Test inspection helpers
    // =========================================================================

    /// All message texts in a channel, in send order.
    pub fn messages_in(&self, channel_name: &str) -> Vec<String> {
        let inner = self.inner.lock().unwrap();
        inner
            .channels
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(channel_name))
            .map(|c| c.messages.iter().map(|m| m.text.clone()).collect())
            .unwrap_or_default()
    }

    pub fn channel_names(&self) -> Vec<String> {
        let inner = self.inner.lock().unwrap();
        inner.channels.iter().map(|c| c.name.clone()).collect()
    }

    pub fn topic_of(&self, channel_name: &str) -> Option<String> {
        let inner = self.inner.lock().unwrap();
        inner
            .channels
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(channel_name))
            .and_then(|c| c.topic.clone())
    }

    pub fn pinned_texts(&self, channel_name: &str) -> Vec<String> {
        let inner = self.inner.lock().unwrap();
        inner
            .channels
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(channel_name))
            .map(|c| {
                c.messages
                    .iter()
                    .filter(|m| m.pinned)
                    .map(|m| m.text.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Plants a pinned message authored by someone else, for tests that
    /// exercise the own-pin filter.
    pub fn plant_foreign_pin(&self, channel: &ChannelHandle, text: &str) {
        let id = self.fresh_id();
        let mut inner = self.inner.lock().unwrap();
        if let Some(ch) = inner.channels.iter_mut().find(|c| c.id.to_string() == channel.id) {
            ch.messages.push(StoredMessage {
                id,
                text: text.to_string(),
                pinned: true,
                own: false,
            });
        }
    }
}

fn channel_handle(channel: &StoredChannel) -> ChannelHandle {
    ChannelHandle {
        id: channel.id.to_string(),
        name: channel.name.clone(),
    }
}

#[async_trait::async_trait]
impl MessagingGateway for MemoryGateway {
    async fn list_channels(&self) -> Result<Vec<ChannelHandle>, GatewayError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.channels.iter().map(channel_handle).collect())
    }

    async fn find_or_create_channel(&self, name: &str) -> Result<FoundChannel, GatewayError> {
        let id = self.fresh_id();
        let mut inner = self.inner.lock().unwrap();
        if let Some(existing) = inner
            .channels
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
        {
            return Ok(FoundChannel {
                channel: channel_handle(existing),
                created: false,
            });
        }
        inner.channels.push(StoredChannel {
            id,
            name: name.to_string(),
            topic: None,
            category_id: None,
            messages: Vec::new(),
        });
        info!(channel = name, "Created channel (memory)");
        Ok(FoundChannel {
            channel: ChannelHandle {
                id: id.to_string(),
                name: name.to_string(),
            },
            created: true,
        })
    }

    async fn set_topic(&self, channel: &ChannelHandle, topic: &str) -> Result<(), GatewayError> {
        let mut inner = self.inner.lock().unwrap();
        let ch = inner
            .channels
            .iter_mut()
            .find(|c| c.id.to_string() == channel.id)
            .ok_or_else(|| GatewayError::NotFound(channel.name.clone()))?;
        ch.topic = Some(topic.to_string());
        Ok(())
    }

    async fn send_message(
        &self,
        channel: &ChannelHandle,
        text: &str,
    ) -> Result<MessageHandle, GatewayError> {
        let id = self.fresh_id();
        let mut inner = self.inner.lock().unwrap();
        let ch = inner
            .channels
            .iter_mut()
            .find(|c| c.id.to_string() == channel.id)
            .ok_or_else(|| GatewayError::NotFound(channel.name.clone()))?;
        ch.messages.push(StoredMessage {
            id,
            text: text.to_string(),
            pinned: false,
            own: true,
        });
        Ok(MessageHandle {
            channel_id: channel.id.clone(),
            message_id: id.to_string(),
        })
    }

    async fn update_message(
        &self,
        message: &MessageHandle,
        text: &str,
    ) -> Result<MessageHandle, GatewayError> {
        let mut inner = self.inner.lock().unwrap();
        let ch = inner
            .channels
            .iter_mut()
            .find(|c| c.id.to_string() == message.channel_id)
            .ok_or_else(|| GatewayError::NotFound(message.channel_id.clone()))?;
        let msg = ch
            .messages
            .iter_mut()
            .find(|m| m.id.to_string() == message.message_id)
            .ok_or_else(|| GatewayError::NotFound(message.message_id.clone()))?;
        msg.text = text.to_string();
        Ok(message.clone())
    }

    async fn pin_message(
        &self,
        channel: &ChannelHandle,
        message: &MessageHandle,
    ) -> Result<(), GatewayError> {
        let mut inner = self.inner.lock().unwrap();
        let ch = inner
            .channels
            .iter_mut()
            .find(|c| c.id.to_string() == channel.id)
            .ok_or_else(|| GatewayError::NotFound(channel.name.clone()))?;
        if let Some(msg) = ch
            .messages
            .iter_mut()
            .find(|m| m.id.to_string() == message.message_id)
        {
            msg.pinned = true;
        }
        Ok(())
    }

    async fn pinned_messages(
        &self,
        channel: &ChannelHandle,
    ) -> Result<Vec<PinnedMessage>, GatewayError> {
        let inner = self.inner.lock().unwrap();
        let ch = inner
            .channels
            .iter()
            .find(|c| c.id.to_string() == channel.id)
            .ok_or_else(|| GatewayError::NotFound(channel.name.clone()))?;
        Ok(ch
            .messages
            .iter()
            .filter(|m| m.pinned)
            .map(|m| PinnedMessage {
                handle: MessageHandle {
                    channel_id: channel.id.clone(),
                    message_id: m.id.to_string(),
                },
                own: m.own,
            })
            .collect())
    }

    async fn get_or_create_category(&self, name: &str) -> Result<CategoryHandle, GatewayError> {
        let id = self.fresh_id();
        let mut inner = self.inner.lock().unwrap();
        if let Some((existing_id, existing_name)) = inner
            .categories
            .iter()
            .find(|(_, n)| n.eq_ignore_ascii_case(name))
        {
            return Ok(CategoryHandle {
                id: existing_id.to_string(),
                name: existing_name.clone(),
            });
        }
        inner.categories.push((id, name.to_string()));
        Ok(CategoryHandle {
            id: id.to_string(),
            name: name.to_string(),
        })
    }

    async fn move_to_category(
        &self,
        category: &CategoryHandle,
        channel: &ChannelHandle,
    ) -> Result<(), GatewayError> {
        let mut inner = self.inner.lock().unwrap();
        let ch = inner
            .channels
            .iter_mut()
            .find(|c| c.id.to_string() == channel.id)
            .ok_or_else(|| GatewayError::NotFound(channel.name.clone()))?;
        ch.category_id = category.id.parse().ok();
        Ok(())
    }

    async fn delete_channel(&self, channel: &ChannelHandle) -> Result<(), GatewayError> {
        let mut inner = self.inner.lock().unwrap();
        inner.channels.retain(|c| c.id.to_string() != channel.id);
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn find_or_create_is_idempotent_and_case_insensitive() {
        let gw = MemoryGateway::new();
        let first = gw.find_or_create_channel("van-vs-edm-16-10-15").await.unwrap();
        assert!(first.created);
        let second = gw.find_or_create_channel("VAN-vs-EDM-16-10-15").await.unwrap();
        assert!(!second.created);
        assert_eq!(first.channel.id, second.channel.id);
        assert_eq!(gw.channel_names().len(), 1);
    }

    #[tokio::test]
    async fn update_message_edits_in_place() {
        let gw = MemoryGateway::new();
        let ch = gw.find_or_create_channel("test").await.unwrap().channel;
        let msg = gw.send_message(&ch, "before").await.unwrap();
        gw.update_message(&msg, "after").await.unwrap();
        assert_eq!(gw.messages_in("test"), vec!["after".to_string()]);
    }

    #[tokio::test]
    async fn pinned_messages_distinguish_ownership() {
        let gw = MemoryGateway::new();
        let ch = gw.find_or_create_channel("test").await.unwrap().channel;
        let msg = gw.send_message(&ch, "mine").await.unwrap();
        gw.pin_message(&ch, &msg).await.unwrap();
        gw.plant_foreign_pin(&ch, "theirs");

        let pins = gw.pinned_messages(&ch).await.unwrap();
        assert_eq!(pins.len(), 2);
        assert_eq!(pins.iter().filter(|p| p.own).count(), 1);
    }
}
