use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Internal (storage) channel id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(pub i64);

/// Telegram chat id (numeric, e.g. `-100...` for channels).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(pub i64);

/// Telegram message id (numeric). Unique within one chat and increasing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub i32);

/// A stable reference to a Telegram message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub chat_id: ChatId,
    pub message_id: MessageId,
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What the bot does for a channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelMode {
    Comment,
    Reaction,
    Both,
}

impl ChannelMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ChannelMode::Comment => "comment",
            ChannelMode::Reaction => "reaction",
            ChannelMode::Both => "both",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "comment" => Some(ChannelMode::Comment),
            "reaction" => Some(ChannelMode::Reaction),
            "both" => Some(ChannelMode::Both),
            _ => None,
        }
    }

    pub fn boosts_reactions(self) -> bool {
        matches!(self, ChannelMode::Reaction | ChannelMode::Both)
    }

    pub fn handles_comments(self) -> bool {
        matches!(self, ChannelMode::Comment | ChannelMode::Both)
    }

    /// Mode to fall back to once the bot has lost reaction rights.
    pub fn without_reactions(self) -> Self {
        match self {
            ChannelMode::Both | ChannelMode::Reaction => ChannelMode::Comment,
            ChannelMode::Comment => ChannelMode::Comment,
        }
    }
}

impl fmt::Display for ChannelMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Channel configuration as seen by the boosting engine.
///
/// `reaction_settings` stays an untyped payload here; it is parsed into
/// [`crate::settings::ReactionSettings`] at the start of every boost.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub id: ChannelId,
    pub chat_id: ChatId,
    pub title: String,
    pub mode: ChannelMode,
    pub reaction_settings: Option<serde_json::Value>,
    pub is_active: bool,
}

impl Channel {
    pub fn message(&self, message_id: MessageId) -> MessageRef {
        MessageRef {
            chat_id: self.chat_id,
            message_id,
        }
    }
}

/// Durable "already boosted" record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoostedPost {
    pub channel_id: ChannelId,
    pub post_id: MessageId,
    pub boost_timestamp: DateTime<Utc>,
    pub reaction_count: u32,
    pub emojis_used: Vec<String>,
}

/// Kind of an activity log row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityType {
    ReactionAdded,
    BoostCompleted,
    Error,
}

impl ActivityType {
    pub fn as_str(self) -> &'static str {
        match self {
            ActivityType::ReactionAdded => "reaction_added",
            ActivityType::BoostCompleted => "boost_completed",
            ActivityType::Error => "error",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "reaction_added" => Some(ActivityType::ReactionAdded),
            "boost_completed" => Some(ActivityType::BoostCompleted),
            "error" => Some(ActivityType::Error),
            _ => None,
        }
    }
}

/// Error taxonomy recorded in `error` activity rows (`details.error_type`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidSettings,
    PermissionError,
    RateLimit,
    UnknownError,
    MonitoringError,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::InvalidSettings => "invalid_settings",
            ErrorKind::PermissionError => "permission_error",
            ErrorKind::RateLimit => "rate_limit",
            ErrorKind::UnknownError => "unknown_error",
            ErrorKind::MonitoringError => "monitoring_error",
        }
    }
}

/// Activity row before it is stored.
#[derive(Clone, Debug, PartialEq)]
pub struct NewActivity {
    pub channel_id: ChannelId,
    pub post_id: Option<MessageId>,
    pub activity_type: ActivityType,
    pub details: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

/// Stored activity row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub id: i64,
    pub channel_id: ChannelId,
    pub post_id: Option<MessageId>,
    pub activity_type: ActivityType,
    pub details: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl ActivityEntry {
    pub fn from_new(id: i64, new: NewActivity) -> Self {
        Self {
            id,
            channel_id: new.channel_id,
            post_id: new.post_id,
            activity_type: new.activity_type,
            details: new.details,
            timestamp: new.timestamp,
        }
    }

    /// `details.error_type` for `error` rows.
    pub fn error_kind(&self) -> Option<&str> {
        if self.activity_type != ActivityType::Error {
            return None;
        }
        self.details.get("error_type").and_then(|v| v.as_str())
    }
}
