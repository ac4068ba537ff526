//! 会員アクティビティの配信。
//!
//! 配信経路はサービス単位で `queue`（アウトボックス経由のトピック配信）か
//! `http`（member-activity API 呼び出し）を選ぶ。失敗した要求はデッドレターに残す。

pub mod dispatcher;
pub mod topic;

use std::{fmt, str::FromStr, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::ActivityRequest;

pub use dispatcher::ActivityDispatcher;
pub use topic::{TopicNaming, message_key};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishType {
    Queue,
    Http,
}

impl FromStr for PublishType {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_lowercase().as_str() {
            "queue" | "kafka" => Ok(Self::Queue),
            "http" | "feign" => Ok(Self::Http),
            other => Err(anyhow::anyhow!("unknown publish type: {other}")),
        }
    }
}

impl fmt::Display for PublishType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Queue => f.write_str("queue"),
            Self::Http => f.write_str("http"),
        }
    }
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("message key creation failed: {0}")]
    KeyCreation(String),
    #[error("activity queue is throttling publishers")]
    TooManyRequests,
    #[error("activity queue unavailable: {0:#}")]
    Unavailable(#[source] anyhow::Error),
}

/// アウトボックスに積まれるイベント。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEvent {
    pub topic: String,
    pub message_key: String,
    pub payload: ActivityRequest,
    pub created_at: DateTime<Utc>,
}

/// キュー経路の配信先。
#[async_trait]
pub trait ActivityPublisher: Send + Sync {
    async fn publish(&self, request: &ActivityRequest) -> Result<(), PublishError>;

    /// 保持期間を過ぎたイベントを削除し、削除件数を返す。
    async fn purge_expired(&self, retention: Duration) -> anyhow::Result<u64>;
}
