use boostbot_core::{
    domain::{
        ActivityEntry, ActivityType, BoostedPost, Channel, ChannelId, ChannelMode, ChatId,
        MessageId,
    },
    Error, Result,
};
use chrono::{DateTime, Utc};
use sqlx::{types::Json, FromRow};

#[derive(Debug, Clone, FromRow)]
pub struct ChannelRow {
    pub id: i64,
    pub channel_id: i64,
    pub channel_title: String,
    pub mode: String,
    pub reaction_settings: Option<serde_json::Value>,
    pub is_active: bool,
}

impl TryFrom<ChannelRow> for Channel {
    type Error = Error;

    fn try_from(row: ChannelRow) -> Result<Self> {
        let mode = ChannelMode::parse(&row.mode).ok_or_else(|| {
            Error::Storage(format!("channel {} has unknown mode {:?}", row.id, row.mode))
        })?;
        Ok(Channel {
            id: ChannelId(row.id),
            chat_id: ChatId(row.channel_id),
            title: row.channel_title,
            mode,
            reaction_settings: row.reaction_settings,
            is_active: row.is_active,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct BoostedPostRow {
    pub channel_id: i64,
    pub post_id: i32,
    pub boost_timestamp: DateTime<Utc>,
    pub reaction_count: i32,
    pub emojis_used: Json<Vec<String>>,
}

impl TryFrom<BoostedPostRow> for BoostedPost {
    type Error = Error;

    fn try_from(row: BoostedPostRow) -> Result<Self> {
        let reaction_count = u32::try_from(row.reaction_count).map_err(|_| {
            Error::Storage(format!(
                "boosted post {}/{} has negative reaction_count",
                row.channel_id, row.post_id
            ))
        })?;
        Ok(BoostedPost {
            channel_id: ChannelId(row.channel_id),
            post_id: MessageId(row.post_id),
            boost_timestamp: row.boost_timestamp,
            reaction_count,
            emojis_used: row.emojis_used.0,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct ActivityRow {
    pub id: i64,
    pub channel_id: i64,
    pub post_id: Option<i32>,
    pub activity_type: String,
    pub details: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl TryFrom<ActivityRow> for ActivityEntry {
    type Error = Error;

    fn try_from(row: ActivityRow) -> Result<Self> {
        let activity_type = ActivityType::parse(&row.activity_type).ok_or_else(|| {
            Error::Storage(format!(
                "activity {} has unknown type {:?}",
                row.id, row.activity_type
            ))
        })?;
        Ok(ActivityEntry {
            id: row.id,
            channel_id: ChannelId(row.channel_id),
            post_id: row.post_id.map(MessageId),
            activity_type,
            details: row.details,
            timestamp: row.timestamp,
        })
    }
}
