//! API に返す読み取りモデル。
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// timeline サービスが集計する投稿のリアクション件数。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostItemCounts {
    pub like_count: i64,
    pub comment_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostView {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub author_id: i64,
    pub author_name: Option<String>,
    pub author_handle: Option<String>,
    pub author_avatar_url: Option<String>,
    pub view_count: i64,
    pub like_count: i64,
    pub comment_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentView {
    pub id: i64,
    pub content: String,
    pub author_id: i64,
    pub author_name: Option<String>,
    pub author_handle: Option<String>,
    pub post_id: i64,
    pub parent_id: Option<i64>,
    pub depth: i32,
    pub like_count: i64,
    pub children_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<CommentView>,
}

/// 会員ごとのコメント一覧で使う軽量な表現。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentSummary {
    pub id: i64,
    pub content: String,
    pub post_id: i64,
    pub parent_id: Option<i64>,
    pub depth: i32,
    pub like_count: i64,
    pub children_count: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseResult {
    Success,
    Fail,
}

/// dailyfeed の各サービスで共通の成功レスポンス封筒。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerResponse<T> {
    pub status: u16,
    pub result: ResponseResult,
    pub data: T,
}

impl<T> ServerResponse<T> {
    #[must_use]
    pub fn success(status: u16, data: T) -> Self {
        Self {
            status,
            result: ResponseResult::Success,
            data,
        }
    }
}
