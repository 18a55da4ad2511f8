//! Storage and discovery ports.
//!
//! The boosting engine only talks to these traits; `storage::JsonStore` and the
//! `boostbot-postgres` crate implement them.

use async_trait::async_trait;

use crate::{
    domain::{
        ActivityEntry, BoostedPost, Channel, ChannelId, ChannelMode, ChatId, MessageId,
        NewActivity,
    },
    Result,
};

/// Outcome of writing a [`BoostedPost`]. `AlreadyExists` means another writer won the race.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    AlreadyExists,
}

#[async_trait]
pub trait ChannelStore: Send + Sync {
    async fn active_channels(&self) -> Result<Vec<Channel>>;

    async fn channel_by_chat(&self, chat_id: ChatId) -> Result<Option<Channel>>;

    /// The only write the engine performs on channels (permission downgrade).
    async fn set_mode(&self, channel_id: ChannelId, mode: ChannelMode) -> Result<()>;
}

#[async_trait]
pub trait BoostedPostStore: Send + Sync {
    async fn exists(&self, channel_id: ChannelId, post_id: MessageId) -> Result<bool>;

    /// Must enforce uniqueness on `(channel_id, post_id)` atomically.
    async fn insert(&self, record: BoostedPost) -> Result<InsertOutcome>;

    async fn get(&self, channel_id: ChannelId, post_id: MessageId) -> Result<Option<BoostedPost>>;
}

#[async_trait]
pub trait ActivityStore: Send + Sync {
    /// Append one row and commit it before returning.
    async fn append(&self, entry: NewActivity) -> Result<ActivityEntry>;

    /// Newest first.
    async fn recent(&self, channel_id: ChannelId, limit: usize) -> Result<Vec<ActivityEntry>>;
}

/// Best-effort discovery of channel posts.
///
/// Telegram has no "list channel messages" call for bots, so real posts arrive as
/// `channel_post` updates; implementations usually return nothing and only verify access.
#[async_trait]
pub trait PostSource: Send + Sync {
    async fn fetch_new_posts(&self, channel: &Channel, after: Option<MessageId>)
        -> Result<Vec<MessageId>>;
}

/// Discovery that never finds anything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoDiscovery;

#[async_trait]
impl PostSource for NoDiscovery {
    async fn fetch_new_posts(
        &self,
        _channel: &Channel,
        _after: Option<MessageId>,
    ) -> Result<Vec<MessageId>> {
        Ok(Vec::new())
    }
}
