//! ドキュメントストアに保存するミラーとリアクション。
//!
//! フィールド名はコレクション上の名前（snake_case）と一致させる。
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 投稿のバージョン付きミラー。更新のたびに新しいドキュメントが追加される。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostDocument {
    pub id: Uuid,
    pub post_pk: i64,
    pub title: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_deleted: bool,
    pub comment_count: i64,
    pub is_current: bool,
    pub version: i32,
}

impl PostDocument {
    /// 新しいバージョンに置き換えられたドキュメントとして印を付ける。
    pub fn supersede(&mut self) {
        self.is_deleted = true;
        self.is_current = false;
    }

    pub fn soft_delete(&mut self) {
        self.is_deleted = true;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentDocument {
    pub id: Uuid,
    pub post_pk: i64,
    pub comment_pk: i64,
    pub parent_pk: Option<i64>,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_deleted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostLikeDocument {
    pub id: Uuid,
    pub post_pk: i64,
    pub member_id: i64,
    pub created_at: DateTime<Utc>,
}

impl PostLikeDocument {
    #[must_use]
    pub fn new(post_pk: i64, member_id: i64) -> Self {
        Self {
            id: Uuid::now_v7(),
            post_pk,
            member_id,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentLikeDocument {
    pub id: Uuid,
    pub comment_pk: i64,
    pub member_id: i64,
    pub created_at: DateTime<Utc>,
}

impl CommentLikeDocument {
    #[must_use]
    pub fn new(comment_pk: i64, member_id: i64) -> Self {
        Self {
            id: Uuid::now_v7(),
            comment_pk,
            member_id,
            created_at: Utc::now(),
        }
    }
}
