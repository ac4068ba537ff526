use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, types::Json};
use tracing::debug;

use crate::domain::ActivityRequest;
use crate::publish::{ActivityPublisher, PublishError, TopicNaming, message_key};

/// キュー経路のアウトボックス。日付ごとのトピック名を付けて `activity_outbox` に積む。
#[derive(Debug, Clone)]
pub struct PgOutboxPublisher {
    pool: PgPool,
    topics: TopicNaming,
}

impl PgOutboxPublisher {
    #[must_use]
    pub fn new(pool: PgPool, topics: TopicNaming) -> Self {
        Self { pool, topics }
    }
}

#[async_trait]
impl ActivityPublisher for PgOutboxPublisher {
    async fn publish(&self, request: &ActivityRequest) -> Result<(), PublishError> {
        let key = message_key(request)?;
        let now = Utc::now();
        let topic = self.topics.topic_at(now);

        sqlx::query(
            r"
            INSERT INTO activity_outbox (topic, message_key, payload, created_at)
            VALUES ($1, $2, $3, $4)
            ",
        )
        .bind(&topic)
        .bind(&key)
        .bind(Json(request))
        .bind(now)
        .execute(&self.pool)
        .await
        .context("failed to append activity to outbox")
        .map_err(PublishError::Unavailable)?;

        debug!(%topic, message_key = %key, "activity appended to outbox");
        Ok(())
    }

    async fn purge_expired(&self, retention: Duration) -> Result<u64> {
        let cutoff = Utc::now() - chrono::Duration::from_std(retention)?;
        let result = sqlx::query("DELETE FROM activity_outbox WHERE created_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .context("failed to purge activity outbox")?;
        Ok(result.rows_affected())
    }
}
