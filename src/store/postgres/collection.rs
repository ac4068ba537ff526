use std::{collections::HashMap, marker::PhantomData};

use anyhow::{Context, Result};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use sqlx::{PgPool, Row, types::Json};
use uuid::Uuid;

/// `(id UUID, body JSONB)` テーブルを型付きのドキュメントコレクションとして扱う。
///
/// 検索条件は JSONB の包含（`body @> filter`）で表す。
#[derive(Debug, Clone)]
pub struct JsonCollection<T> {
    pool: PgPool,
    table: &'static str,
    _marker: PhantomData<fn() -> T>,
}

/// 挿入結果。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inserted {
    Yes,
    Conflict,
}

impl<T> JsonCollection<T>
where
    T: Serialize + DeserializeOwned + Send + Sync,
{
    #[must_use]
    pub fn new(pool: PgPool, table: &'static str) -> Self {
        Self {
            pool,
            table,
            _marker: PhantomData,
        }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    #[must_use]
    pub fn table(&self) -> &'static str {
        self.table
    }

    /// 一意制約（主キーまたは式インデックス）に衝突した場合は `Conflict` を返す。
    ///
    /// # Errors
    /// シリアライズまたは INSERT に失敗した場合。
    pub async fn insert(&self, id: Uuid, document: &T) -> Result<Inserted> {
        let body = serde_json::to_value(document)
            .with_context(|| format!("failed to serialize {} document", self.table))?;
        let result = sqlx::query(&format!(
            "INSERT INTO {} (id, body) VALUES ($1, $2) ON CONFLICT DO NOTHING",
            self.table
        ))
        .bind(id)
        .bind(Json(body))
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to insert into {}", self.table))?;

        if result.rows_affected() == 0 {
            Ok(Inserted::Conflict)
        } else {
            Ok(Inserted::Yes)
        }
    }

    /// # Errors
    /// シリアライズまたは UPSERT に失敗した場合。
    pub async fn upsert(&self, id: Uuid, document: &T) -> Result<()> {
        let body = serde_json::to_value(document)
            .with_context(|| format!("failed to serialize {} document", self.table))?;
        sqlx::query(&format!(
            "INSERT INTO {} (id, body) VALUES ($1, $2) \
             ON CONFLICT (id) DO UPDATE SET body = EXCLUDED.body",
            self.table
        ))
        .bind(id)
        .bind(Json(body))
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to upsert into {}", self.table))?;
        Ok(())
    }

    /// # Errors
    /// クエリまたはデシリアライズに失敗した場合。
    pub async fn find_one(&self, filter: Value) -> Result<Option<T>> {
        let row = sqlx::query(&format!(
            "SELECT body FROM {} WHERE body @> $1 LIMIT 1",
            self.table
        ))
        .bind(Json(filter))
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("failed to query {}", self.table))?;

        row.map(|row| decode(&row, self.table)).transpose()
    }

    /// `order_by` は `body` を参照する固定の SQL 式。
    ///
    /// # Errors
    /// クエリまたはデシリアライズに失敗した場合。
    pub async fn find_many(&self, filter: Value, order_by: &'static str) -> Result<Vec<T>> {
        let rows = sqlx::query(&format!(
            "SELECT body FROM {} WHERE body @> $1 ORDER BY {order_by}",
            self.table
        ))
        .bind(Json(filter))
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("failed to query {}", self.table))?;

        rows.iter().map(|row| decode(row, self.table)).collect()
    }

    /// # Errors
    /// DELETE に失敗した場合。
    pub async fn delete(&self, id: Uuid) -> Result<u64> {
        let result = sqlx::query(&format!("DELETE FROM {} WHERE id = $1", self.table))
            .bind(id)
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to delete from {}", self.table))?;
        Ok(result.rows_affected())
    }

    /// `key` フィールド（BIGINT として解釈）ごとの件数。
    ///
    /// # Errors
    /// クエリに失敗した場合。
    pub async fn count_by(&self, key: &'static str, values: &[i64]) -> Result<HashMap<i64, i64>> {
        if values.is_empty() {
            return Ok(HashMap::new());
        }
        let rows = sqlx::query(&format!(
            "SELECT (body->>'{key}')::BIGINT AS key, COUNT(*) AS total FROM {} \
             WHERE (body->>'{key}')::BIGINT = ANY($1) GROUP BY 1",
            self.table
        ))
        .bind(values)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("failed to count {} by {key}", self.table))?;

        let mut counts = HashMap::with_capacity(rows.len());
        for row in rows {
            let key: i64 = row.try_get("key")?;
            let total: i64 = row.try_get("total")?;
            counts.insert(key, total);
        }
        Ok(counts)
    }
}

pub(super) fn decode<T: DeserializeOwned>(row: &sqlx::postgres::PgRow, table: &str) -> Result<T> {
    let Json(body): Json<Value> = row.try_get("body")?;
    serde_json::from_value(body).with_context(|| format!("failed to decode {table} document"))
}
