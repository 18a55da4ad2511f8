//! JSON-file backed store (in-memory when no path is given).
//!
//! All three store ports share one lock, so check-and-insert on boosted posts is
//! atomic. With a path configured, every mutation reaches disk before the call
//! returns: channels and boosted posts as a snapshot (temp file, then rename),
//! activity rows appended to a sibling `.activity.jsonl` file, one row per line.

use std::{
    collections::{BTreeMap, HashMap},
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::{io::AsyncWriteExt, sync::Mutex};

use crate::{
    domain::{
        ActivityEntry, BoostedPost, Channel, ChannelId, ChannelMode, ChatId, MessageId,
        NewActivity,
    },
    errors::Error,
    ports::{ActivityStore, BoostedPostStore, ChannelStore, InsertOutcome},
    Result,
};

#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    #[serde(default)]
    channels: Vec<Channel>,
    #[serde(default)]
    boosted_posts: Vec<BoostedPost>,
}

#[derive(Debug, Default)]
struct StoreState {
    channels: BTreeMap<ChannelId, Channel>,
    boosted: HashMap<(ChannelId, MessageId), BoostedPost>,
    activity: Vec<ActivityEntry>,
    next_activity_id: i64,
}

impl StoreState {
    fn load(snap: Snapshot, activity: Vec<ActivityEntry>) -> Self {
        let next_activity_id = activity.iter().map(|a| a.id).max().unwrap_or(0) + 1;
        Self {
            channels: snap.channels.into_iter().map(|c| (c.id, c)).collect(),
            boosted: snap
                .boosted_posts
                .into_iter()
                .map(|b| ((b.channel_id, b.post_id), b))
                .collect(),
            activity,
            next_activity_id,
        }
    }

    fn to_snapshot(&self) -> Snapshot {
        let mut boosted_posts: Vec<BoostedPost> = self.boosted.values().cloned().collect();
        boosted_posts.sort_by_key(|b| (b.channel_id, b.post_id));
        Snapshot {
            channels: self.channels.values().cloned().collect(),
            boosted_posts,
        }
    }
}

pub struct JsonStore {
    path: Option<PathBuf>,
    state: Mutex<StoreState>,
}

impl JsonStore {
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: Mutex::new(StoreState {
                next_activity_id: 1,
                ..Default::default()
            }),
        }
    }

    /// Open (or start) a store backed by `path`.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let snap = match tokio::fs::read_to_string(&path).await {
            Ok(txt) if txt.trim().is_empty() => Snapshot::default(),
            Ok(txt) => serde_json::from_str::<Snapshot>(&txt)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Snapshot::default(),
            Err(e) => return Err(e.into()),
        };
        let activity = read_activity(&activity_path(&path)).await?;

        tracing::info!(
            path = %path.display(),
            channels = snap.channels.len(),
            boosted_posts = snap.boosted_posts.len(),
            activity_rows = activity.len(),
            "store opened"
        );

        Ok(Self {
            path: Some(path),
            state: Mutex::new(StoreState::load(snap, activity)),
        })
    }

    /// Insert or replace a channel (bootstrap/admin use).
    pub async fn upsert_channel(&self, channel: Channel) -> Result<()> {
        let mut st = self.state.lock().await;
        let previous = st.channels.insert(channel.id, channel.clone());
        if let Err(e) = self.persist(&st).await {
            match previous {
                Some(prev) => st.channels.insert(channel.id, prev),
                None => st.channels.remove(&channel.id),
            };
            return Err(e);
        }
        Ok(())
    }

    pub async fn channel(&self, id: ChannelId) -> Option<Channel> {
        self.state.lock().await.channels.get(&id).cloned()
    }

    /// All activity rows in insertion order.
    pub async fn activity_snapshot(&self) -> Vec<ActivityEntry> {
        self.state.lock().await.activity.clone()
    }

    pub async fn boosted_count(&self) -> usize {
        self.state.lock().await.boosted.len()
    }

    async fn persist(&self, st: &StoreState) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let body = serde_json::to_vec_pretty(&st.to_snapshot())?;
        let tmp = tmp_path(path);
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }

    async fn append_activity(&self, row: &ActivityEntry) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let mut line = serde_json::to_vec(row)?;
        line.push(b'\n');
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(activity_path(path))
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }
}

async fn read_activity(path: &Path) -> Result<Vec<ActivityEntry>> {
    let txt = match tokio::fs::read_to_string(path).await {
        Ok(txt) => txt,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut rows = Vec::new();
    for (idx, line) in txt.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<ActivityEntry>(line) {
            Ok(row) => rows.push(row),
            // A crash mid-append leaves a torn last line.
            Err(e) => tracing::warn!(
                path = %path.display(),
                line = idx + 1,
                "skipping unreadable activity row: {e}"
            ),
        }
    }
    Ok(rows)
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(suffix);
    path.with_file_name(name)
}

fn tmp_path(path: &Path) -> PathBuf {
    sibling(path, ".tmp")
}

fn activity_path(path: &Path) -> PathBuf {
    sibling(path, ".activity.jsonl")
}

#[async_trait]
impl ChannelStore for JsonStore {
    async fn active_channels(&self) -> Result<Vec<Channel>> {
        let st = self.state.lock().await;
        Ok(st.channels.values().filter(|c| c.is_active).cloned().collect())
    }

    async fn channel_by_chat(&self, chat_id: ChatId) -> Result<Option<Channel>> {
        let st = self.state.lock().await;
        Ok(st.channels.values().find(|c| c.chat_id == chat_id).cloned())
    }

    async fn set_mode(&self, channel_id: ChannelId, mode: ChannelMode) -> Result<()> {
        let mut st = self.state.lock().await;
        let Some(channel) = st.channels.get_mut(&channel_id) else {
            return Err(Error::Storage(format!("channel {channel_id} not found")));
        };
        let previous = channel.mode;
        channel.mode = mode;

        if let Err(e) = self.persist(&st).await {
            if let Some(channel) = st.channels.get_mut(&channel_id) {
                channel.mode = previous;
            }
            return Err(e);
        }
        Ok(())
    }
}

#[async_trait]
impl BoostedPostStore for JsonStore {
    async fn exists(&self, channel_id: ChannelId, post_id: MessageId) -> Result<bool> {
        let st = self.state.lock().await;
        Ok(st.boosted.contains_key(&(channel_id, post_id)))
    }

    async fn insert(&self, record: BoostedPost) -> Result<InsertOutcome> {
        let mut st = self.state.lock().await;
        let key = (record.channel_id, record.post_id);
        if st.boosted.contains_key(&key) {
            return Ok(InsertOutcome::AlreadyExists);
        }
        st.boosted.insert(key, record);

        if let Err(e) = self.persist(&st).await {
            st.boosted.remove(&key);
            return Err(e);
        }
        Ok(InsertOutcome::Inserted)
    }

    async fn get(&self, channel_id: ChannelId, post_id: MessageId) -> Result<Option<BoostedPost>> {
        let st = self.state.lock().await;
        Ok(st.boosted.get(&(channel_id, post_id)).cloned())
    }
}

#[async_trait]
impl ActivityStore for JsonStore {
    async fn append(&self, entry: NewActivity) -> Result<ActivityEntry> {
        let mut st = self.state.lock().await;
        let id = st.next_activity_id;
        let row = ActivityEntry::from_new(id, entry);
        st.activity.push(row.clone());
        st.next_activity_id += 1;

        if let Err(e) = self.append_activity(&row).await {
            st.activity.pop();
            st.next_activity_id -= 1;
            return Err(e);
        }
        Ok(row)
    }

    async fn recent(&self, channel_id: ChannelId, limit: usize) -> Result<Vec<ActivityEntry>> {
        let st = self.state.lock().await;
        Ok(st
            .activity
            .iter()
            .rev()
            .filter(|a| a.channel_id == channel_id)
            .take(limit)
            .cloned()
            .collect())
    }
}
