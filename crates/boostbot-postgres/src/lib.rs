//! Postgres implementation of the boostbot store ports.
//!
//! Uniqueness of `(channel_id, post_id)` is enforced by the schema; inserts use
//! `ON CONFLICT DO NOTHING` so a lost race is reported, not raised.

pub mod models;

use async_trait::async_trait;
use boostbot_core::{
    domain::{
        ActivityEntry, BoostedPost, Channel, ChannelId, ChannelMode, ChatId, MessageId,
        NewActivity,
    },
    ports::{ActivityStore, BoostedPostStore, ChannelStore, InsertOutcome},
    Error, Result,
};
use sqlx::{postgres::PgPoolOptions, types::Json, PgPool};

use crate::models::{ActivityRow, BoostedPostRow, ChannelRow};

fn storage(e: sqlx::Error) -> Error {
    Error::Storage(e.to_string())
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(storage)?;
        Ok(Self { pool })
    }

    /// Apply the embedded migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Storage(format!("migration failed: {e}")))?;
        tracing::info!("database migrations applied");
        Ok(())
    }
}

#[async_trait]
impl ChannelStore for PgStore {
    async fn active_channels(&self) -> Result<Vec<Channel>> {
        let rows = sqlx::query_as::<_, ChannelRow>(
            r#"
            SELECT id, channel_id, channel_title, mode, reaction_settings, is_active
            FROM channels
            WHERE is_active = TRUE
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        rows.into_iter().map(Channel::try_from).collect()
    }

    async fn channel_by_chat(&self, chat_id: ChatId) -> Result<Option<Channel>> {
        let row = sqlx::query_as::<_, ChannelRow>(
            r#"
            SELECT id, channel_id, channel_title, mode, reaction_settings, is_active
            FROM channels
            WHERE channel_id = $1
            "#,
        )
        .bind(chat_id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?;

        row.map(Channel::try_from).transpose()
    }

    async fn set_mode(&self, channel_id: ChannelId, mode: ChannelMode) -> Result<()> {
        let res = sqlx::query(
            r#"
            UPDATE channels
            SET mode = $1, updated_at = NOW()
            WHERE id = $2
            "#,
        )
        .bind(mode.as_str())
        .bind(channel_id.0)
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        if res.rows_affected() == 0 {
            return Err(Error::Storage(format!("channel {channel_id} not found")));
        }
        Ok(())
    }
}

#[async_trait]
impl BoostedPostStore for PgStore {
    async fn exists(&self, channel_id: ChannelId, post_id: MessageId) -> Result<bool> {
        sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM boosted_posts WHERE channel_id = $1 AND post_id = $2
            )
            "#,
        )
        .bind(channel_id.0)
        .bind(post_id.0)
        .fetch_one(&self.pool)
        .await
        .map_err(storage)
    }

    async fn insert(&self, record: BoostedPost) -> Result<InsertOutcome> {
        let reaction_count = i32::try_from(record.reaction_count)
            .map_err(|_| Error::Storage("reaction_count out of range".to_string()))?;

        let res = sqlx::query(
            r#"
            INSERT INTO boosted_posts
                (channel_id, post_id, boost_timestamp, reaction_count, emojis_used)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (channel_id, post_id) DO NOTHING
            "#,
        )
        .bind(record.channel_id.0)
        .bind(record.post_id.0)
        .bind(record.boost_timestamp)
        .bind(reaction_count)
        .bind(Json(&record.emojis_used))
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        if res.rows_affected() == 0 {
            return Ok(InsertOutcome::AlreadyExists);
        }
        Ok(InsertOutcome::Inserted)
    }

    async fn get(&self, channel_id: ChannelId, post_id: MessageId) -> Result<Option<BoostedPost>> {
        let row = sqlx::query_as::<_, BoostedPostRow>(
            r#"
            SELECT channel_id, post_id, boost_timestamp, reaction_count, emojis_used
            FROM boosted_posts
            WHERE channel_id = $1 AND post_id = $2
            "#,
        )
        .bind(channel_id.0)
        .bind(post_id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?;

        row.map(BoostedPost::try_from).transpose()
    }
}

#[async_trait]
impl ActivityStore for PgStore {
    async fn append(&self, entry: NewActivity) -> Result<ActivityEntry> {
        let row = sqlx::query_as::<_, ActivityRow>(
            r#"
            INSERT INTO activity_logs (channel_id, post_id, activity_type, details, timestamp)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, channel_id, post_id, activity_type, details, timestamp
            "#,
        )
        .bind(entry.channel_id.0)
        .bind(entry.post_id.map(|p| p.0))
        .bind(entry.activity_type.as_str())
        .bind(&entry.details)
        .bind(entry.timestamp)
        .fetch_one(&self.pool)
        .await
        .map_err(storage)?;

        row.try_into()
    }

    async fn recent(&self, channel_id: ChannelId, limit: usize) -> Result<Vec<ActivityEntry>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = sqlx::query_as::<_, ActivityRow>(
            r#"
            SELECT id, channel_id, post_id, activity_type, details, timestamp
            FROM activity_logs
            WHERE channel_id = $1
            ORDER BY timestamp DESC, id DESC
            LIMIT $2
            "#,
        )
        .bind(channel_id.0)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        rows.into_iter().map(ActivityEntry::try_from).collect()
    }
}
