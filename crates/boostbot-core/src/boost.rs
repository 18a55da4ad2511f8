//! Reaction boosting for channel posts.
//!
//! [`ReactionBoostService::boost_post`] is a small state machine encoded in control flow:
//! dedup check → config gate → auto-boost gate → validation gate → emoji selection →
//! sequential apply loop (with jittered pauses and retry-after handling) → completion
//! record. Per-emoji failures are logged and never abort the run.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::Utc;
use rand::{seq::SliceRandom, Rng};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::{
    activity::{details, ActivityLogger},
    domain::{BoostedPost, Channel, ErrorKind, MessageId, MessageRef},
    errors::ReactionError,
    messaging::port::ReactionPort,
    ports::{BoostedPostStore, ChannelStore, InsertOutcome},
    settings::{ReactionSettings, SettingsError},
    Result,
};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// How a single `boost_post` call ended.
#[derive(Clone, Debug, PartialEq)]
pub enum BoostOutcome {
    AlreadyBoosted,
    NotConfigured,
    AutoBoostDisabled,
    InvalidSettings(SettingsError),
    Boosted {
        reaction_count: u32,
        emojis: Vec<String>,
    },
    /// Every reaction failed; no record written, the post stays eligible.
    NothingApplied,
    /// Shutdown interrupted the run; no record written.
    Cancelled { applied: u32 },
    /// A concurrent run recorded the post first.
    Superseded { reaction_count: u32 },
}

/// Seam between arrival routing and boosting.
#[async_trait]
pub trait PostBooster: Send + Sync {
    async fn boost_post(&self, channel: &Channel, post_id: MessageId) -> Result<BoostOutcome>;
}

pub struct ReactionBoostService {
    reactor: Arc<dyn ReactionPort>,
    channels: Arc<dyn ChannelStore>,
    boosted: Arc<dyn BoostedPostStore>,
    activity: ActivityLogger,
    max_attempts: u32,
    shutdown: CancellationToken,
}

enum Attempt {
    Applied,
    Failed(ReactionError),
    Cancelled,
}

enum Gate {
    Run(ReactionSettings),
    Stop(BoostOutcome),
}

impl ReactionBoostService {
    pub fn new(
        reactor: Arc<dyn ReactionPort>,
        channels: Arc<dyn ChannelStore>,
        boosted: Arc<dyn BoostedPostStore>,
        activity: ActivityLogger,
    ) -> Self {
        Self {
            reactor,
            channels,
            boosted,
            activity,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Token observed by the inter-reaction pause and the retry-after wait.
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Boost a post if the channel is configured for it.
    pub async fn boost_post(&self, channel: &Channel, post_id: MessageId) -> Result<BoostOutcome> {
        self.run(channel, post_id, false).await
    }

    /// Manual trigger: same as [`Self::boost_post`] but ignores the `auto_boost` flag.
    pub async fn boost_now(&self, channel: &Channel, post_id: MessageId) -> Result<BoostOutcome> {
        self.run(channel, post_id, true).await
    }

    async fn run(&self, channel: &Channel, post_id: MessageId, manual: bool) -> Result<BoostOutcome> {
        tracing::info!(channel_id = %channel.id, post_id = %post_id, "boost requested");

        if self.boosted.exists(channel.id, post_id).await? {
            tracing::info!(channel_id = %channel.id, post_id = %post_id, "already boosted, skipping");
            return Ok(BoostOutcome::AlreadyBoosted);
        }

        let settings = match self.gate(channel, post_id, manual).await? {
            Gate::Run(settings) => settings,
            Gate::Stop(outcome) => return Ok(outcome),
        };

        let emojis = {
            let mut rng = rand::thread_rng();
            select_random_emojis(&settings, &mut rng)
        };
        tracing::info!(channel_id = %channel.id, post_id = %post_id, emojis = ?emojis, "selected emojis");

        let msg = channel.message(post_id);
        let mut used: Vec<String> = Vec::with_capacity(emojis.len());

        for (idx, emoji) in emojis.iter().enumerate() {
            if self.shutdown.is_cancelled() {
                return Ok(self.cancelled(channel, post_id, &used));
            }

            match self.add_reaction_with_retry(msg, emoji).await {
                Attempt::Applied => {
                    used.push(emoji.clone());
                    tracing::info!(channel_id = %channel.id, post_id = %post_id, emoji = %emoji, "reaction added");
                    if let Err(e) = self
                        .activity
                        .log_reaction_added(channel.id, post_id, emoji)
                        .await
                    {
                        tracing::error!(channel_id = %channel.id, post_id = %post_id, "failed to log reaction: {e}");
                    }

                    if idx + 1 < emojis.len() {
                        let delay = {
                            let mut rng = rand::thread_rng();
                            settings.random_delay(&mut rng)
                        };
                        tracing::debug!(delay_secs = delay.as_secs_f64(), "pausing before next reaction");
                        if !self.pause(delay).await {
                            return Ok(self.cancelled(channel, post_id, &used));
                        }
                    }
                }
                Attempt::Failed(err) => {
                    tracing::warn!(channel_id = %channel.id, post_id = %post_id, emoji = %emoji, "reaction failed: {err}");
                    let fatal = matches!(err, ReactionError::Forbidden(_));
                    self.handle_reaction_error(channel, post_id, emoji, err).await;
                    if fatal {
                        // The channel was just downgraded; the remaining emojis would fail the same way.
                        break;
                    }
                }
                Attempt::Cancelled => return Ok(self.cancelled(channel, post_id, &used)),
            }
        }

        if used.is_empty() {
            tracing::warn!(channel_id = %channel.id, post_id = %post_id, "no reactions added");
            return Ok(BoostOutcome::NothingApplied);
        }

        self.complete(channel, post_id, used).await
    }

    async fn gate(&self, channel: &Channel, post_id: MessageId, manual: bool) -> Result<Gate> {
        let Some(raw) = channel.reaction_settings.as_ref() else {
            tracing::warn!(channel_id = %channel.id, "channel has no reaction settings");
            return Ok(Gate::Stop(BoostOutcome::NotConfigured));
        };

        let parsed = ReactionSettings::from_value(raw);
        if let Ok(settings) = &parsed {
            // A mistyped `auto_boost` keeps its default `true`, so only an explicit `false` stops here.
            if !settings.auto_boost && !manual {
                tracing::info!(channel_id = %channel.id, "auto-boost disabled");
                return Ok(Gate::Stop(BoostOutcome::AutoBoostDisabled));
            }
        }

        match parsed.and_then(|s| s.validate().map(|_| s)) {
            Ok(settings) => Ok(Gate::Run(settings)),
            Err(err) => {
                tracing::error!(channel_id = %channel.id, "invalid reaction settings: {err}");
                self.activity
                    .log_error(
                        channel.id,
                        Some(post_id),
                        ErrorKind::InvalidSettings,
                        details([("error", json!(err.to_string()))]),
                    )
                    .await?;
                Ok(Gate::Stop(BoostOutcome::InvalidSettings(err)))
            }
        }
    }

    /// Up to `max_attempts` calls; only rate limits are retried, after exactly the requested wait.
    async fn add_reaction_with_retry(&self, msg: MessageRef, emoji: &str) -> Attempt {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.reactor.set_reaction(msg, emoji).await {
                Ok(()) => return Attempt::Applied,
                Err(ReactionError::RateLimited { retry_after }) if attempt < self.max_attempts => {
                    tracing::warn!(
                        attempt,
                        retry_after_secs = retry_after.as_secs_f64(),
                        "rate limited, retrying"
                    );
                    if !self.pause(retry_after).await {
                        return Attempt::Cancelled;
                    }
                }
                Err(err) => return Attempt::Failed(err),
            }
        }
    }

    async fn handle_reaction_error(
        &self,
        channel: &Channel,
        post_id: MessageId,
        emoji: &str,
        err: ReactionError,
    ) {
        let (kind, extra) = match &err {
            ReactionError::Forbidden(_) => (
                ErrorKind::PermissionError,
                details([("message", json!("Bot is not admin in channel"))]),
            ),
            ReactionError::RateLimited { retry_after } => (
                ErrorKind::RateLimit,
                details([("retry_after", json!(retry_after.as_secs_f64()))]),
            ),
            ReactionError::Other(msg) => (
                ErrorKind::UnknownError,
                details([("error", json!(msg)), ("emoji", json!(emoji))]),
            ),
        };

        if let Err(e) = self
            .activity
            .log_error(channel.id, Some(post_id), kind, extra)
            .await
        {
            tracing::error!(channel_id = %channel.id, "failed to log {}: {e}", kind.as_str());
        }

        if kind == ErrorKind::PermissionError {
            self.disable_reaction_mode(channel).await;
        }
    }

    async fn disable_reaction_mode(&self, channel: &Channel) {
        let next = channel.mode.without_reactions();
        if next == channel.mode {
            return;
        }
        match self.channels.set_mode(channel.id, next).await {
            Ok(()) => tracing::warn!(
                channel_id = %channel.id,
                from = %channel.mode,
                to = %next,
                "reaction mode disabled after permission error"
            ),
            Err(e) => tracing::error!(channel_id = %channel.id, "failed to downgrade channel mode: {e}"),
        }
    }

    async fn complete(
        &self,
        channel: &Channel,
        post_id: MessageId,
        used: Vec<String>,
    ) -> Result<BoostOutcome> {
        let reaction_count = used.len() as u32;
        let record = BoostedPost {
            channel_id: channel.id,
            post_id,
            boost_timestamp: Utc::now(),
            reaction_count,
            emojis_used: used.clone(),
        };

        match self.boosted.insert(record).await? {
            InsertOutcome::Inserted => {}
            InsertOutcome::AlreadyExists => {
                tracing::warn!(channel_id = %channel.id, post_id = %post_id, "post was recorded by a concurrent boost");
                return Ok(BoostOutcome::Superseded { reaction_count });
            }
        }

        self.activity
            .log_boost_completed(channel.id, post_id, reaction_count)
            .await?;
        tracing::info!(channel_id = %channel.id, post_id = %post_id, reaction_count, "boost completed");

        Ok(BoostOutcome::Boosted {
            reaction_count,
            emojis: used,
        })
    }

    fn cancelled(&self, channel: &Channel, post_id: MessageId, used: &[String]) -> BoostOutcome {
        tracing::warn!(
            channel_id = %channel.id,
            post_id = %post_id,
            applied = used.len(),
            "boost cancelled by shutdown"
        );
        BoostOutcome::Cancelled {
            applied: used.len() as u32,
        }
    }

    /// Sleep unless shutdown fires first. Returns `false` when cancelled.
    async fn pause(&self, dur: Duration) -> bool {
        tokio::select! {
            _ = self.shutdown.cancelled() => false,
            _ = tokio::time::sleep(dur) => true,
        }
    }
}

#[async_trait]
impl PostBooster for ReactionBoostService {
    async fn boost_post(&self, channel: &Channel, post_id: MessageId) -> Result<BoostOutcome> {
        ReactionBoostService::boost_post(self, channel, post_id).await
    }
}

/// Shuffle a copy of the pool and take the first `reaction_count`.
pub fn select_random_emojis<R: Rng + ?Sized>(settings: &ReactionSettings, rng: &mut R) -> Vec<String> {
    let mut pool = settings.emojis.clone();
    pool.shuffle(rng);
    pool.truncate(settings.effective_count());
    pool
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::{ActivityType, ChannelId, ChannelMode, ChatId},
        ports::ActivityStore,
        settings::DelaySecs,
        storage::JsonStore,
    };
    use std::collections::{HashSet, VecDeque};
    use std::sync::Mutex;

    /// Scripted reactor: pops one result per call (default `Ok`), records every call.
    #[derive(Default)]
    struct FakeReactor {
        script: Mutex<VecDeque<std::result::Result<(), ReactionError>>>,
        per_emoji: Mutex<Vec<(String, ReactionError)>>,
        always: Mutex<Option<ReactionError>>,
        calls: Mutex<Vec<(MessageRef, String)>>,
        call_times: Mutex<Vec<tokio::time::Instant>>,
    }

    impl FakeReactor {
        fn failing_emoji(emoji: &str, err: ReactionError) -> Self {
            let f = Self::default();
            f.per_emoji.lock().unwrap().push((emoji.to_string(), err));
            f
        }

        fn always(err: ReactionError) -> Self {
            let f = Self::default();
            *f.always.lock().unwrap() = Some(err);
            f
        }

        fn scripted(results: Vec<std::result::Result<(), ReactionError>>) -> Self {
            let f = Self::default();
            *f.script.lock().unwrap() = results.into();
            f
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ReactionPort for FakeReactor {
        async fn set_reaction(
            &self,
            msg: MessageRef,
            emoji: &str,
        ) -> std::result::Result<(), ReactionError> {
            self.calls.lock().unwrap().push((msg, emoji.to_string()));
            self.call_times
                .lock()
                .unwrap()
                .push(tokio::time::Instant::now());
            if let Some(err) = self.always.lock().unwrap().clone() {
                return Err(err);
            }
            if let Some((_, err)) = self
                .per_emoji
                .lock()
                .unwrap()
                .iter()
                .find(|(e, _)| e == emoji)
            {
                return Err(err.clone());
            }
            self.script.lock().unwrap().pop_front().unwrap_or(Ok(()))
        }
    }

    fn settings_json(emojis: &[&str], count: i64, auto_boost: bool) -> serde_json::Value {
        json!({
            "emojis": emojis,
            "reaction_count": count,
            "delay_min": 0,
            "delay_max": 0,
            "auto_boost": auto_boost,
        })
    }

    fn channel(mode: ChannelMode, settings: Option<serde_json::Value>) -> Channel {
        Channel {
            id: ChannelId(1),
            chat_id: ChatId(-1001),
            title: "news".to_string(),
            mode,
            reaction_settings: settings,
            is_active: true,
        }
    }

    async fn setup(
        reactor: Arc<FakeReactor>,
        ch: &Channel,
    ) -> (ReactionBoostService, Arc<JsonStore>) {
        let store = Arc::new(JsonStore::in_memory());
        store.upsert_channel(ch.clone()).await.unwrap();
        let svc = ReactionBoostService::new(
            reactor,
            store.clone(),
            store.clone(),
            ActivityLogger::new(store.clone()),
        );
        (svc, store)
    }

    fn count_rows(rows: &[crate::domain::ActivityEntry], ty: ActivityType) -> usize {
        rows.iter().filter(|r| r.activity_type == ty).count()
    }

    #[tokio::test]
    async fn boosts_once_and_second_call_is_a_no_op() {
        let reactor = Arc::new(FakeReactor::default());
        let ch = channel(
            ChannelMode::Reaction,
            Some(settings_json(&["👍", "🔥", "❤"], 3, true)),
        );
        let (svc, store) = setup(reactor.clone(), &ch).await;

        let first = svc.boost_post(&ch, MessageId(7)).await.unwrap();
        let BoostOutcome::Boosted { reaction_count, .. } = first else {
            panic!("unexpected outcome: {first:?}");
        };
        assert_eq!(reaction_count, 3);
        assert_eq!(reactor.call_count(), 3);
        let record = store.get(ch.id, MessageId(7)).await.unwrap().unwrap();

        let second = svc.boost_post(&ch, MessageId(7)).await.unwrap();
        assert_eq!(second, BoostOutcome::AlreadyBoosted);
        assert_eq!(reactor.call_count(), 3);
        assert_eq!(store.get(ch.id, MessageId(7)).await.unwrap(), Some(record));

        let rows = store.activity_snapshot().await;
        assert_eq!(count_rows(&rows, ActivityType::ReactionAdded), 3);
        assert_eq!(count_rows(&rows, ActivityType::BoostCompleted), 1);
    }

    #[tokio::test]
    async fn one_failing_emoji_does_not_abort_the_rest() {
        let reactor = Arc::new(FakeReactor::failing_emoji(
            "🔥",
            ReactionError::Other("REACTION_INVALID".to_string()),
        ));
        let ch = channel(
            ChannelMode::Both,
            Some(settings_json(&["👍", "🔥", "❤"], 3, true)),
        );
        let (svc, store) = setup(reactor.clone(), &ch).await;

        let outcome = svc.boost_post(&ch, MessageId(8)).await.unwrap();
        assert!(matches!(outcome, BoostOutcome::Boosted { reaction_count: 2, .. }));
        assert_eq!(reactor.call_count(), 3);

        let record = store.get(ch.id, MessageId(8)).await.unwrap().unwrap();
        assert_eq!(record.reaction_count, 2);
        let used: HashSet<_> = record.emojis_used.iter().cloned().collect();
        assert_eq!(
            used,
            HashSet::from(["👍".to_string(), "❤".to_string()])
        );

        let rows = store.activity_snapshot().await;
        assert_eq!(rows.len(), 4);
        assert_eq!(count_rows(&rows, ActivityType::ReactionAdded), 2);
        assert_eq!(count_rows(&rows, ActivityType::BoostCompleted), 1);
        let err = rows
            .iter()
            .find(|r| r.activity_type == ActivityType::Error)
            .unwrap();
        assert_eq!(err.error_kind(), Some("unknown_error"));
        assert_eq!(err.details["emoji"], json!("🔥"));
        assert_eq!(err.details["error"], json!("REACTION_INVALID"));
    }

    #[tokio::test]
    async fn auto_boost_off_touches_nothing() {
        let reactor = Arc::new(FakeReactor::default());
        let ch = channel(
            ChannelMode::Reaction,
            Some(settings_json(&["👍", "🔥"], 2, false)),
        );
        let (svc, store) = setup(reactor.clone(), &ch).await;

        let outcome = svc.boost_post(&ch, MessageId(9)).await.unwrap();
        assert_eq!(outcome, BoostOutcome::AutoBoostDisabled);
        assert_eq!(reactor.call_count(), 0);
        assert!(store.activity_snapshot().await.is_empty());
        assert_eq!(store.boosted_count().await, 0);
    }

    #[tokio::test]
    async fn manual_trigger_ignores_auto_boost_flag() {
        let reactor = Arc::new(FakeReactor::default());
        let ch = channel(
            ChannelMode::Reaction,
            Some(settings_json(&["👍"], 1, false)),
        );
        let (svc, _store) = setup(reactor.clone(), &ch).await;

        let outcome = svc.boost_now(&ch, MessageId(9)).await.unwrap();
        assert!(matches!(outcome, BoostOutcome::Boosted { reaction_count: 1, .. }));
        assert_eq!(reactor.call_count(), 1);
    }

    #[tokio::test]
    async fn missing_settings_is_a_silent_no_op() {
        let reactor = Arc::new(FakeReactor::default());
        let ch = channel(ChannelMode::Reaction, None);
        let (svc, store) = setup(reactor.clone(), &ch).await;

        let outcome = svc.boost_post(&ch, MessageId(1)).await.unwrap();
        assert_eq!(outcome, BoostOutcome::NotConfigured);
        assert_eq!(reactor.call_count(), 0);
        assert!(store.activity_snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn invalid_settings_are_logged_and_not_retried() {
        let reactor = Arc::new(FakeReactor::default());
        let ch = channel(
            ChannelMode::Reaction,
            Some(settings_json(&["a", "b"], 3, true)),
        );
        let (svc, store) = setup(reactor.clone(), &ch).await;

        let outcome = svc.boost_post(&ch, MessageId(2)).await.unwrap();
        assert_eq!(
            outcome,
            BoostOutcome::InvalidSettings(SettingsError::CountExceedsPool)
        );
        assert_eq!(reactor.call_count(), 0);

        let rows = store.activity_snapshot().await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].error_kind(), Some("invalid_settings"));
        assert_eq!(
            rows[0].details["error"],
            json!("Reaction count cannot exceed number of emojis")
        );
    }

    #[tokio::test]
    async fn mistyped_settings_are_reported_like_invalid_ones() {
        let reactor = Arc::new(FakeReactor::default());
        let ch = channel(
            ChannelMode::Reaction,
            Some(json!({ "emojis": ["a"], "reaction_count": "many" })),
        );
        let (svc, store) = setup(reactor.clone(), &ch).await;

        let outcome = svc.boost_post(&ch, MessageId(2)).await.unwrap();
        assert_eq!(
            outcome,
            BoostOutcome::InvalidSettings(SettingsError::CountNotInteger)
        );
        let rows = store.activity_snapshot().await;
        assert_eq!(rows[0].error_kind(), Some("invalid_settings"));
    }

    #[tokio::test]
    async fn auto_boost_off_wins_over_mistyped_settings() {
        let reactor = Arc::new(FakeReactor::default());
        let ch = channel(
            ChannelMode::Reaction,
            Some(json!({
                "emojis": ["a"],
                "reaction_count": "many",
                "auto_boost": false,
            })),
        );
        let (svc, store) = setup(reactor.clone(), &ch).await;

        let outcome = svc.boost_post(&ch, MessageId(2)).await.unwrap();
        assert_eq!(outcome, BoostOutcome::AutoBoostDisabled);
        assert_eq!(reactor.call_count(), 0);
        assert!(store.activity_snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn empty_pool_is_reported_before_a_mistyped_count() {
        let reactor = Arc::new(FakeReactor::default());
        let ch = channel(
            ChannelMode::Reaction,
            Some(json!({ "emojis": [], "reaction_count": "x" })),
        );
        let (svc, store) = setup(reactor, &ch).await;

        let outcome = svc.boost_post(&ch, MessageId(2)).await.unwrap();
        assert_eq!(outcome, BoostOutcome::InvalidSettings(SettingsError::NoEmojis));
        let rows = store.activity_snapshot().await;
        assert_eq!(
            rows[0].details["error"],
            json!("At least one emoji must be selected")
        );
    }

    #[tokio::test]
    async fn oversized_delays_are_rejected_before_any_reaction() {
        let reactor = Arc::new(FakeReactor::default());
        let ch = channel(
            ChannelMode::Reaction,
            Some(json!({
                "emojis": ["a", "b"],
                "reaction_count": 2,
                "delay_min": 1e20,
                "delay_max": 1e20,
                "auto_boost": true,
            })),
        );
        let (svc, store) = setup(reactor.clone(), &ch).await;

        let outcome = svc.boost_post(&ch, MessageId(2)).await.unwrap();
        assert_eq!(
            outcome,
            BoostOutcome::InvalidSettings(SettingsError::DelayTooLarge)
        );
        assert_eq!(reactor.call_count(), 0);
        assert_eq!(store.activity_snapshot().await.len(), 1);
    }

    #[tokio::test]
    async fn permission_error_downgrades_mode_and_writes_no_record() {
        let reactor = Arc::new(FakeReactor::always(ReactionError::Forbidden(
            "bot is not a member of the channel chat".to_string(),
        )));
        let ch = channel(
            ChannelMode::Both,
            Some(settings_json(&["👍", "🔥", "❤"], 3, true)),
        );
        let (svc, store) = setup(reactor.clone(), &ch).await;

        let outcome = svc.boost_post(&ch, MessageId(3)).await.unwrap();
        assert_eq!(outcome, BoostOutcome::NothingApplied);

        let updated = store.channel(ch.id).await.unwrap();
        assert_eq!(updated.mode, ChannelMode::Comment);
        assert_eq!(store.boosted_count().await, 0);

        let rows = store.activity_snapshot().await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].error_kind(), Some("permission_error"));
        // Remaining emojis are skipped once the bot has lost its rights.
        assert_eq!(reactor.call_count(), 1);
    }

    #[tokio::test]
    async fn reaction_mode_also_downgrades_to_comment() {
        let reactor = Arc::new(FakeReactor::always(ReactionError::Forbidden(
            "forbidden".to_string(),
        )));
        let ch = channel(ChannelMode::Reaction, Some(settings_json(&["👍"], 1, true)));
        let (svc, store) = setup(reactor, &ch).await;

        svc.boost_post(&ch, MessageId(3)).await.unwrap();
        assert_eq!(
            store.channel(ch.id).await.unwrap().mode,
            ChannelMode::Comment
        );
    }

    #[tokio::test]
    async fn zero_successes_leave_post_eligible() {
        let reactor = Arc::new(FakeReactor::scripted(vec![
            Err(ReactionError::Other("timeout".to_string())),
            Ok(()),
        ]));
        let ch = channel(ChannelMode::Reaction, Some(settings_json(&["👍"], 1, true)));
        let (svc, store) = setup(reactor.clone(), &ch).await;

        let first = svc.boost_post(&ch, MessageId(4)).await.unwrap();
        assert_eq!(first, BoostOutcome::NothingApplied);
        assert!(!store.exists(ch.id, MessageId(4)).await.unwrap());

        let second = svc.boost_post(&ch, MessageId(4)).await.unwrap();
        assert!(matches!(second, BoostOutcome::Boosted { reaction_count: 1, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_waits_exactly_and_then_succeeds() {
        let wait = Duration::from_secs(5);
        let reactor = Arc::new(FakeReactor::scripted(vec![
            Err(ReactionError::RateLimited { retry_after: wait }),
            Ok(()),
        ]));
        let ch = channel(ChannelMode::Reaction, Some(settings_json(&["👍"], 1, true)));
        let (svc, store) = setup(reactor.clone(), &ch).await;

        let started = tokio::time::Instant::now();
        let outcome = svc.boost_post(&ch, MessageId(5)).await.unwrap();
        assert!(matches!(outcome, BoostOutcome::Boosted { reaction_count: 1, .. }));
        assert_eq!(reactor.call_count(), 2);
        assert!(started.elapsed() >= wait);
        assert!(started.elapsed() < wait * 2);

        let rows = store.activity_snapshot().await;
        assert!(rows.iter().all(|r| r.activity_type != ActivityType::Error));
    }

    #[tokio::test(start_paused = true)]
    async fn pauses_fall_only_between_reactions() {
        let reactor = Arc::new(FakeReactor::default());
        let ch = channel(
            ChannelMode::Reaction,
            Some(json!({
                "emojis": ["👍", "🔥", "❤"],
                "reaction_count": 3,
                "delay_min": 5,
                "delay_max": 5,
                "auto_boost": true,
            })),
        );
        let (svc, _store) = setup(reactor.clone(), &ch).await;

        let started = tokio::time::Instant::now();
        let outcome = svc.boost_post(&ch, MessageId(10)).await.unwrap();
        assert!(matches!(outcome, BoostOutcome::Boosted { reaction_count: 3, .. }));
        assert_eq!(started.elapsed(), Duration::from_secs(10));

        let times = reactor.call_times.lock().unwrap().clone();
        assert_eq!(times.len(), 3);
        assert_eq!(times[0], started);
        for pair in times.windows(2) {
            assert_eq!(pair[1] - pair[0], Duration::from_secs(5));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_gives_up_after_three_attempts() {
        let wait = Duration::from_secs(2);
        let reactor = Arc::new(FakeReactor::always(ReactionError::RateLimited {
            retry_after: wait,
        }));
        let ch = channel(ChannelMode::Reaction, Some(settings_json(&["👍"], 1, true)));
        let (svc, store) = setup(reactor.clone(), &ch).await;

        let outcome = svc.boost_post(&ch, MessageId(6)).await.unwrap();
        assert_eq!(outcome, BoostOutcome::NothingApplied);
        assert_eq!(reactor.call_count(), 3);

        let rows = store.activity_snapshot().await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].error_kind(), Some("rate_limit"));
        assert_eq!(rows[0].details["retry_after"], json!(2.0));
        // Rate limits never downgrade the channel.
        assert_eq!(
            store.channel(ch.id).await.unwrap().mode,
            ChannelMode::Reaction
        );
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_during_pause_writes_no_record() {
        let reactor = Arc::new(FakeReactor::default());
        let ch = channel(
            ChannelMode::Reaction,
            Some(json!({
                "emojis": ["👍", "🔥", "❤"],
                "reaction_count": 3,
                "delay_min": 30,
                "delay_max": 30,
                "auto_boost": true,
            })),
        );
        let store = Arc::new(JsonStore::in_memory());
        store.upsert_channel(ch.clone()).await.unwrap();
        let token = CancellationToken::new();
        let svc = Arc::new(
            ReactionBoostService::new(
                reactor.clone(),
                store.clone(),
                store.clone(),
                ActivityLogger::new(store.clone()),
            )
            .with_shutdown(token.clone()),
        );

        let task = {
            let svc = svc.clone();
            let ch = ch.clone();
            tokio::spawn(async move { svc.boost_post(&ch, MessageId(11)).await })
        };

        tokio::time::sleep(Duration::from_secs(10)).await;
        token.cancel();

        let outcome = task.await.unwrap().unwrap();
        assert_eq!(outcome, BoostOutcome::Cancelled { applied: 1 });
        assert_eq!(reactor.call_count(), 1);
        assert!(!store.exists(ch.id, MessageId(11)).await.unwrap());
        let rows = store.activity_snapshot().await;
        assert_eq!(count_rows(&rows, ActivityType::BoostCompleted), 0);
    }

    #[tokio::test]
    async fn losing_a_concurrent_race_is_reported_not_recorded() {
        let reactor = Arc::new(FakeReactor::default());
        let ch = channel(ChannelMode::Reaction, Some(settings_json(&["👍"], 1, true)));
        let (svc, store) = setup(reactor, &ch).await;

        // Simulate the other writer committing between our check and our insert.
        let svc_complete = svc
            .complete(&ch, MessageId(12), vec!["👍".to_string()])
            .await
            .unwrap();
        assert!(matches!(svc_complete, BoostOutcome::Boosted { .. }));
        let again = svc
            .complete(&ch, MessageId(12), vec!["👍".to_string()])
            .await
            .unwrap();
        assert_eq!(again, BoostOutcome::Superseded { reaction_count: 1 });

        let rows = store.recent(ch.id, 10).await.unwrap();
        assert_eq!(count_rows(&rows, ActivityType::BoostCompleted), 1);
    }

    #[test]
    fn selection_is_a_shuffled_subset_of_the_pool() {
        let settings = ReactionSettings::new(
            ["a", "b", "c", "d"].iter().map(|s| s.to_string()).collect(),
            3,
            DelaySecs::from_secs_f64(0.0).unwrap(),
            DelaySecs::from_secs_f64(0.0).unwrap(),
            true,
        );
        let pool: HashSet<_> = settings.emojis.iter().cloned().collect();

        let mut rng = rand::thread_rng();
        let mut orderings = HashSet::new();
        for _ in 0..200 {
            let picked = select_random_emojis(&settings, &mut rng);
            assert_eq!(picked.len(), 3);
            let unique: HashSet<_> = picked.iter().cloned().collect();
            assert_eq!(unique.len(), 3);
            assert!(unique.is_subset(&pool));
            orderings.insert(picked);
        }
        assert!(orderings.len() > 1);
    }

    #[test]
    fn selection_never_exceeds_the_pool() {
        let settings = ReactionSettings::new(
            vec!["a".to_string(), "b".to_string()],
            5,
            DelaySecs::from_secs_f64(0.0).unwrap(),
            DelaySecs::from_secs_f64(0.0).unwrap(),
            true,
        );
        let picked = select_random_emojis(&settings, &mut rand::thread_rng());
        assert_eq!(picked.len(), 2);
    }
}
