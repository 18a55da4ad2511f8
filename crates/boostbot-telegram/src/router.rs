use std::sync::Arc;

use teloxide::{dispatching::Dispatcher, dptree, prelude::*, types::Message};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use boostbot_core::{
    activity::ActivityLogger,
    boost::{PostBooster, ReactionBoostService},
    config::Config,
    domain::{Channel, ChatId, MessageId},
    messaging::{port::ReactionPort, throttled::ThrottledReactor},
    monitor::PostMonitorService,
    ports::{ActivityStore, BoostedPostStore, ChannelStore},
    scheduler::MonitorScheduler,
};

use crate::{TelegramPostSource, TelegramReactor};

/// Store handles the router wires the services with.
#[derive(Clone)]
pub struct Stores {
    pub channels: Arc<dyn ChannelStore>,
    pub boosted: Arc<dyn BoostedPostStore>,
    pub activity: Arc<dyn ActivityStore>,
}

#[derive(Clone)]
pub struct AppState {
    pub channels: Arc<dyn ChannelStore>,
    pub monitor: Arc<PostMonitorService>,
    /// In-flight post routing; drained on shutdown.
    pub tasks: TaskTracker,
}

pub async fn run_polling(cfg: Arc<Config>, stores: Stores) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.telegram_bot_token.clone());

    match bot.get_me().await {
        Ok(me) => tracing::info!(username = %me.username(), "boostbot started"),
        Err(e) => tracing::warn!("get_me failed: {e}"),
    }

    let shutdown = CancellationToken::new();

    // Spacing calls reduces 429s; retry-after waits are still handled by the boost service.
    let raw_reactor: Arc<dyn ReactionPort> = Arc::new(TelegramReactor::new(bot.clone()));
    let reactor: Arc<dyn ReactionPort> =
        Arc::new(ThrottledReactor::new(raw_reactor, cfg.throttle()));

    let activity = ActivityLogger::new(stores.activity.clone());
    let booster: Arc<dyn PostBooster> = Arc::new(
        ReactionBoostService::new(
            reactor,
            stores.channels.clone(),
            stores.boosted.clone(),
            activity.clone(),
        )
        .with_max_attempts(cfg.reaction_max_attempts)
        .with_shutdown(shutdown.clone()),
    );
    let monitor = Arc::new(
        PostMonitorService::new(stores.channels.clone(), Some(booster), activity)
            .with_post_source(Arc::new(TelegramPostSource::new(bot.clone()))),
    );

    let scheduler = if cfg.monitor_enabled {
        let s = MonitorScheduler::new(monitor.clone(), cfg.monitor_interval);
        s.start().await;
        Some(s)
    } else {
        tracing::info!("periodic monitor disabled");
        None
    };

    let tasks = TaskTracker::new();
    let state = Arc::new(AppState {
        channels: stores.channels.clone(),
        monitor,
        tasks: tasks.clone(),
    });

    let handler = dptree::entry()
        .branch(Update::filter_channel_post().endpoint(handle_channel_post))
        .branch(Update::filter_edited_channel_post().endpoint(ignore_update));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .default_handler(|_upd| async {})
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    tracing::info!("dispatcher stopped, shutting down");
    shutdown.cancel();
    if let Some(s) = scheduler {
        s.stop().await;
    }
    drain(&shutdown, &tasks).await;

    Ok(())
}

/// Route one post on its own task, tracked so shutdown can wait for it.
pub fn spawn_post(
    tasks: &TaskTracker,
    monitor: Arc<PostMonitorService>,
    channel: Channel,
    post_id: MessageId,
) {
    tasks.spawn(async move {
        let disposition = monitor.process_channel_post(&channel, post_id).await;
        tracing::debug!(channel_id = %channel.id, post_id = %post_id, ?disposition, "post processed");
    });
}

/// Cancel in-flight boosts and wait until every tracked task has returned.
pub async fn drain(shutdown: &CancellationToken, tasks: &TaskTracker) {
    shutdown.cancel();
    tasks.close();
    if !tasks.is_empty() {
        tracing::info!(in_flight = tasks.len(), "waiting for in-flight posts");
    }
    tasks.wait().await;
}

/// New channel post: look the channel up and route the post on its own task.
pub async fn handle_channel_post(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let chat_id = ChatId(msg.chat.id.0);
    let post_id = MessageId(msg.id.0);

    let channel = match state.channels.channel_by_chat(chat_id).await {
        Ok(Some(c)) => c,
        Ok(None) => {
            tracing::debug!(chat_id = %chat_id, "post from unregistered channel");
            return Ok(());
        }
        Err(e) => {
            tracing::error!(chat_id = %chat_id, "channel lookup failed: {e}");
            return Ok(());
        }
    };
    if !channel.is_active {
        return Ok(());
    }

    tracing::info!(channel_id = %channel.id, post_id = %post_id, "new channel post");
    spawn_post(&state.tasks, state.monitor.clone(), channel, post_id);

    Ok(())
}

async fn ignore_update() -> ResponseResult<()> {
    Ok(())
}
