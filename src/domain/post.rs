use chrono::{DateTime, Utc};

/// 投稿の永続化済み状態（`posts` テーブル）。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Post {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub author_id: i64,
    pub view_count: i64,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 新規投稿。ID とタイムスタンプはストアが採番する。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPost {
    pub title: String,
    pub content: String,
    pub author_id: i64,
}

impl NewPost {
    #[must_use]
    pub fn new(title: Option<String>, content: String, author_id: i64) -> Self {
        Self {
            title: title.unwrap_or_default(),
            content,
            author_id,
        }
    }
}

impl Post {
    #[must_use]
    pub fn is_author(&self, member_id: i64) -> bool {
        self.author_id == member_id
    }

    /// タイトルと本文を置き換え、更新日時を進める。
    pub fn apply_update(&mut self, title: String, content: String, now: DateTime<Utc>) {
        self.title = title;
        self.content = content;
        self.updated_at = now;
    }
}
