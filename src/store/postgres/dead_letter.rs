use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use sqlx::{PgPool, types::Json};
use uuid::Uuid;

use super::collection::{Inserted, JsonCollection, decode};
use crate::domain::DeadLetter;
use crate::store::DeadLetterDao;

#[derive(Debug, Clone)]
pub struct PgDeadLetterDao {
    collection: JsonCollection<DeadLetter>,
}

impl PgDeadLetterDao {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self {
            collection: JsonCollection::new(pool, "dead_letters"),
        }
    }

    async fn patch(&self, id: Uuid, sql: &'static str, patch: serde_json::Value) -> Result<()> {
        let result = sqlx::query(sql)
            .bind(id)
            .bind(Json(patch))
            .execute(self.collection.pool())
            .await
            .context("failed to update dead letter")?;
        if result.rows_affected() == 0 {
            bail!("dead letter {id} does not exist");
        }
        Ok(())
    }
}

#[async_trait]
impl DeadLetterDao for PgDeadLetterDao {
    async fn insert(&self, letter: &DeadLetter) -> Result<()> {
        if self.collection.insert(letter.id, letter).await? == Inserted::Conflict {
            bail!("dead letter {} already exists", letter.id);
        }
        Ok(())
    }

    /// 複数のレプリカが同時に再送しても同じ行を二重に取らないよう、
    /// `FOR UPDATE SKIP LOCKED` で選んだ行だけを編集中にする。
    /// 落ちたレプリカが編集中のまま残した行は `lease` 経過後に取り直す。
    async fn claim_pending(
        &self,
        limit: u32,
        max_attempts: u32,
        lease: Duration,
    ) -> Result<Vec<DeadLetter>> {
        let now = Utc::now();
        let stale_before = now - chrono::Duration::from_std(lease)?;
        let rows = sqlx::query(
            r#"
            UPDATE dead_letters d
            SET body = d.body || jsonb_build_object('is_editing', TRUE, 'updated_at', $3::JSONB)
            FROM (
                SELECT id
                FROM dead_letters
                WHERE body @> '{"is_completed": false}'
                  AND (body->>'attempts')::BIGINT < $2
                  AND (
                      body @> '{"is_editing": false}'
                      OR (body->>'updated_at')::TIMESTAMPTZ < $4
                  )
                ORDER BY (body->>'created_at')::TIMESTAMPTZ ASC, id ASC
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            ) picked
            WHERE d.id = picked.id
            RETURNING d.body
            "#,
        )
        .bind(i64::from(limit))
        .bind(i64::from(max_attempts))
        .bind(Json(json!(now)))
        .bind(stale_before)
        .fetch_all(self.collection.pool())
        .await
        .context("failed to claim dead letters")?;

        let mut letters = rows
            .iter()
            .map(|row| decode::<DeadLetter>(row, self.collection.table()))
            .collect::<Result<Vec<_>>>()?;
        letters.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(letters)
    }

    async fn mark_completed(&self, id: Uuid) -> Result<()> {
        self.patch(
            id,
            "UPDATE dead_letters SET body = body || $2 WHERE id = $1",
            json!({ "is_completed": true, "is_editing": false, "updated_at": Utc::now() }),
        )
        .await
    }

    async fn release(&self, id: Uuid, error: &str) -> Result<()> {
        self.patch(
            id,
            r"
            UPDATE dead_letters
            SET body = body || $2 || jsonb_build_object('attempts', (body->>'attempts')::BIGINT + 1)
            WHERE id = $1
            ",
            json!({ "is_editing": false, "last_error": error, "updated_at": Utc::now() }),
        )
        .await
    }

    async fn find_by_message_key(&self, message_key: &str) -> Result<Vec<DeadLetter>> {
        self.collection
            .find_many(
                json!({ "message_key": message_key }),
                "(body->>'created_at')::TIMESTAMPTZ ASC, id ASC",
            )
            .await
    }
}
