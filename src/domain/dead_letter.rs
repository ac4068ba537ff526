use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::activity::ActivityCategory;

/// 配信できなかったアクティビティの送信経路。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeadLetterChannel {
    Queue,
    Http,
}

/// 再送待ちのアクティビティ。`payload` はシリアライズ済みの要求 JSON。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadLetter {
    pub id: Uuid,
    pub channel: DeadLetterChannel,
    pub category: ActivityCategory,
    pub message_key: String,
    pub payload: String,
    pub is_completed: bool,
    pub is_editing: bool,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DeadLetter {
    /// 再送対象として取得できる状態か。
    ///
    /// 編集中でも `updated_at` が `stale_before` より古ければ、取得したレプリカが
    /// 落ちたとみなして取り直す。
    #[must_use]
    pub fn is_claimable(&self, max_attempts: u32, stale_before: DateTime<Utc>) -> bool {
        !self.is_completed
            && self.attempts < max_attempts
            && (!self.is_editing || self.updated_at < stale_before)
    }
}
