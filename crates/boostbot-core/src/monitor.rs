//! Arrival dedup and routing of channel posts into the booster.
//!
//! Two dedup layers are in play: the in-memory high-water mark kept here (per
//! process lifetime) and the durable boosted-post record checked by the booster.
//! The mark only saves work; it never replaces the durable check.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::Mutex;

use crate::{
    activity::{details, ActivityLogger},
    boost::{BoostOutcome, PostBooster},
    domain::{Channel, ChannelId, ErrorKind, MessageId},
    ports::{ChannelStore, NoDiscovery, PostSource},
    scheduler::PeriodicJob,
    Result,
};

/// What happened to one inbound post.
#[derive(Clone, Debug, PartialEq)]
pub enum PostDisposition {
    /// At or below the channel's high-water mark.
    Duplicate,
    /// Mode does not include reactions, or no booster is wired.
    NotRouted,
    Routed(BoostOutcome),
    /// The booster returned an error; it was logged and swallowed.
    Failed,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub channels_scanned: usize,
    pub posts_routed: usize,
    pub channels_failed: usize,
}

pub struct PostMonitorService {
    channels: Arc<dyn ChannelStore>,
    booster: Option<Arc<dyn PostBooster>>,
    source: Arc<dyn PostSource>,
    activity: ActivityLogger,
    last_checked: Mutex<HashMap<ChannelId, MessageId>>,
}

impl PostMonitorService {
    pub fn new(
        channels: Arc<dyn ChannelStore>,
        booster: Option<Arc<dyn PostBooster>>,
        activity: ActivityLogger,
    ) -> Self {
        Self {
            channels,
            booster,
            source: Arc::new(NoDiscovery),
            activity,
            last_checked: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_post_source(mut self, source: Arc<dyn PostSource>) -> Self {
        self.source = source;
        self
    }

    pub async fn last_checked(&self, channel_id: ChannelId) -> Option<MessageId> {
        self.last_checked.lock().await.get(&channel_id).copied()
    }

    /// Route one post. Never returns an error: booster failures are logged here.
    pub async fn process_channel_post(&self, channel: &Channel, post_id: MessageId) -> PostDisposition {
        if !self.advance_mark(channel.id, post_id).await {
            tracing::debug!(channel_id = %channel.id, post_id = %post_id, "duplicate post, skipping");
            return PostDisposition::Duplicate;
        }

        if !channel.mode.boosts_reactions() {
            tracing::debug!(channel_id = %channel.id, mode = %channel.mode, "reactions not enabled for channel");
            return PostDisposition::NotRouted;
        }

        let Some(booster) = &self.booster else {
            tracing::debug!(channel_id = %channel.id, "no booster configured");
            return PostDisposition::NotRouted;
        };

        match booster.boost_post(channel, post_id).await {
            Ok(outcome) => PostDisposition::Routed(outcome),
            Err(e) => {
                tracing::error!(channel_id = %channel.id, post_id = %post_id, "boost failed: {e}");
                PostDisposition::Failed
            }
        }
    }

    /// Periodic fallback sweep over all active channels.
    pub async fn monitor_channels(&self) -> SweepReport {
        let mut report = SweepReport::default();

        let channels = match self.channels.active_channels().await {
            Ok(v) => v,
            Err(e) => {
                tracing::error!("failed to load active channels: {e}");
                return report;
            }
        };

        for channel in channels {
            report.channels_scanned += 1;
            match self.check_channel(&channel).await {
                Ok(routed) => report.posts_routed += routed,
                Err(e) => {
                    report.channels_failed += 1;
                    tracing::error!(channel_id = %channel.id, "error monitoring channel: {e}");
                    if let Err(log_err) = self
                        .activity
                        .log_error(
                            channel.id,
                            None,
                            ErrorKind::MonitoringError,
                            details([("error", json!(e.to_string()))]),
                        )
                        .await
                    {
                        tracing::error!(channel_id = %channel.id, "failed to log monitoring error: {log_err}");
                    }
                }
            }
        }

        tracing::info!(
            channels = report.channels_scanned,
            routed = report.posts_routed,
            failed = report.channels_failed,
            "monitor sweep finished"
        );
        report
    }

    async fn check_channel(&self, channel: &Channel) -> Result<usize> {
        let after = self.last_checked(channel.id).await;
        let mut posts = self.source.fetch_new_posts(channel, after).await?;
        posts.sort();

        let mut routed = 0;
        for post_id in posts {
            if let PostDisposition::Routed(_) = self.process_channel_post(channel, post_id).await {
                routed += 1;
            }
        }
        Ok(routed)
    }

    /// Atomically move the mark forward. `false` when `post_id` is not newer.
    async fn advance_mark(&self, channel_id: ChannelId, post_id: MessageId) -> bool {
        let mut marks = self.last_checked.lock().await;
        match marks.get(&channel_id) {
            Some(last) if post_id <= *last => false,
            _ => {
                marks.insert(channel_id, post_id);
                true
            }
        }
    }
}

#[async_trait]
impl PeriodicJob for PostMonitorService {
    fn name(&self) -> &str {
        "channel-monitor"
    }

    async fn run(&self) {
        self.monitor_channels().await;
    }
}
