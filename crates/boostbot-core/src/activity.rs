//! Append-only audit trail of boost actions and errors.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Map, Value};

use crate::{
    domain::{ActivityEntry, ActivityType, ChannelId, ErrorKind, MessageId, NewActivity},
    ports::ActivityStore,
    Result,
};

/// Writes one activity row per event: no batching, no dedup.
///
/// Every call stamps the row with the current UTC time and returns only after the
/// store has committed it.
#[derive(Clone)]
pub struct ActivityLogger {
    store: Arc<dyn ActivityStore>,
}

impl ActivityLogger {
    pub fn new(store: Arc<dyn ActivityStore>) -> Self {
        Self { store }
    }

    pub async fn log_reaction_added(
        &self,
        channel_id: ChannelId,
        post_id: MessageId,
        emoji: &str,
    ) -> Result<ActivityEntry> {
        self.append(
            channel_id,
            Some(post_id),
            ActivityType::ReactionAdded,
            json!({ "emoji": emoji }),
        )
        .await
    }

    pub async fn log_boost_completed(
        &self,
        channel_id: ChannelId,
        post_id: MessageId,
        reaction_count: u32,
    ) -> Result<ActivityEntry> {
        self.append(
            channel_id,
            Some(post_id),
            ActivityType::BoostCompleted,
            json!({ "reaction_count": reaction_count }),
        )
        .await
    }

    /// `post_id` is `None` for channel-level errors (e.g. monitoring).
    ///
    /// `details` is merged after `error_type`, so it cannot override the kind.
    pub async fn log_error(
        &self,
        channel_id: ChannelId,
        post_id: Option<MessageId>,
        kind: ErrorKind,
        details: Map<String, Value>,
    ) -> Result<ActivityEntry> {
        let mut payload = Map::new();
        payload.insert(
            "error_type".to_string(),
            Value::String(kind.as_str().to_string()),
        );
        for (k, v) in details {
            if k == "error_type" {
                continue;
            }
            payload.insert(k, v);
        }

        self.append(channel_id, post_id, ActivityType::Error, Value::Object(payload))
            .await
    }

    pub async fn recent(&self, channel_id: ChannelId, limit: usize) -> Result<Vec<ActivityEntry>> {
        self.store.recent(channel_id, limit).await
    }

    async fn append(
        &self,
        channel_id: ChannelId,
        post_id: Option<MessageId>,
        activity_type: ActivityType,
        details: Value,
    ) -> Result<ActivityEntry> {
        self.store
            .append(NewActivity {
                channel_id,
                post_id,
                activity_type,
                details,
                timestamp: Utc::now(),
            })
            .await
    }
}

/// Build a detail map from `(key, value)` pairs.
pub fn details<I, K>(pairs: I) -> Map<String, Value>
where
    I: IntoIterator<Item = (K, Value)>,
    K: Into<String>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v)).collect()
}
