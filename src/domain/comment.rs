use chrono::{DateTime, Utc};

/// 投稿に紐づくコメント（`comments` テーブル）。返信は `parent_id` を持つ。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    pub id: i64,
    pub content: String,
    pub author_id: i64,
    pub post_id: i64,
    pub parent_id: Option<i64>,
    pub depth: i32,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewComment {
    pub content: String,
    pub author_id: i64,
    pub post_id: i64,
    pub parent_id: Option<i64>,
    pub depth: i32,
}

impl NewComment {
    /// 投稿直下のコメント。
    #[must_use]
    pub fn top_level(post_id: i64, author_id: i64, content: String) -> Self {
        Self {
            content,
            author_id,
            post_id,
            parent_id: None,
            depth: 0,
        }
    }

    /// `parent` への返信。深さは親 + 1。
    #[must_use]
    pub fn reply_to(parent: &Comment, author_id: i64, content: String) -> Self {
        Self {
            content,
            author_id,
            post_id: parent.post_id,
            parent_id: Some(parent.id),
            depth: parent.depth + 1,
        }
    }
}

impl Comment {
    #[must_use]
    pub fn is_owned_by(&self, member_id: i64) -> bool {
        self.author_id == member_id
    }

    #[must_use]
    pub fn is_reply(&self) -> bool {
        self.parent_id.is_some()
    }

    pub fn apply_content(&mut self, content: String, now: DateTime<Utc>) {
        self.content = content;
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parent() -> Comment {
        let now = Utc::now();
        Comment {
            id: 10,
            content: "parent".to_string(),
            author_id: 1,
            post_id: 5,
            parent_id: None,
            depth: 0,
            is_deleted: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn reply_inherits_post_and_increments_depth() {
        let reply = NewComment::reply_to(&parent(), 2, "reply".to_string());
        assert_eq!(reply.post_id, 5);
        assert_eq!(reply.parent_id, Some(10));
        assert_eq!(reply.depth, 1);
        assert_eq!(reply.author_id, 2);
    }

    #[test]
    fn top_level_has_no_parent() {
        let comment = NewComment::top_level(5, 2, "hi".to_string());
        assert_eq!(comment.parent_id, None);
        assert_eq!(comment.depth, 0);
    }

    #[test]
    fn ownership_is_by_author() {
        let comment = parent();
        assert!(comment.is_owned_by(1));
        assert!(!comment.is_owned_by(2));
        assert!(!comment.is_reply());
    }
}
