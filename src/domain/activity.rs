//! 会員アクティビティの語彙。member-activity サービスと共有する。
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MemberActivityType {
    PostCreate,
    PostUpdate,
    PostDelete,
    CommentCreate,
    CommentUpdate,
    CommentDelete,
    LikePost,
    LikePostCancel,
    LikeComment,
    LikeCommentCancel,
}

impl MemberActivityType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PostCreate => "POST_CREATE",
            Self::PostUpdate => "POST_UPDATE",
            Self::PostDelete => "POST_DELETE",
            Self::CommentCreate => "COMMENT_CREATE",
            Self::CommentUpdate => "COMMENT_UPDATE",
            Self::CommentDelete => "COMMENT_DELETE",
            Self::LikePost => "LIKE_POST",
            Self::LikePostCancel => "LIKE_POST_CANCEL",
            Self::LikeComment => "LIKE_COMMENT",
            Self::LikeCommentCancel => "LIKE_COMMENT_CANCEL",
        }
    }
}

impl fmt::Display for MemberActivityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityCategory {
    Post,
    Comment,
    PostLike,
    CommentLike,
}

impl ActivityCategory {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Post => "post",
            Self::Comment => "comment",
            Self::PostLike => "post_like",
            Self::CommentLike => "comment_like",
        }
    }
}

impl fmt::Display for ActivityCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 会員アクティビティの記録要求。キュー配信と HTTP 送信の双方で同じ形を使う。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "category", rename_all = "snake_case")]
pub enum ActivityRequest {
    Post {
        member_id: i64,
        post_id: i64,
        activity_type: MemberActivityType,
    },
    Comment {
        member_id: i64,
        post_id: i64,
        comment_id: i64,
        activity_type: MemberActivityType,
    },
    PostLike {
        member_id: i64,
        post_id: i64,
        activity_type: MemberActivityType,
    },
    CommentLike {
        member_id: i64,
        post_id: i64,
        comment_id: i64,
        activity_type: MemberActivityType,
    },
}

impl ActivityRequest {
    #[must_use]
    pub const fn category(&self) -> ActivityCategory {
        match self {
            Self::Post { .. } => ActivityCategory::Post,
            Self::Comment { .. } => ActivityCategory::Comment,
            Self::PostLike { .. } => ActivityCategory::PostLike,
            Self::CommentLike { .. } => ActivityCategory::CommentLike,
        }
    }

    #[must_use]
    pub const fn member_id(&self) -> i64 {
        match self {
            Self::Post { member_id, .. }
            | Self::Comment { member_id, .. }
            | Self::PostLike { member_id, .. }
            | Self::CommentLike { member_id, .. } => *member_id,
        }
    }

    #[must_use]
    pub const fn post_id(&self) -> i64 {
        match self {
            Self::Post { post_id, .. }
            | Self::Comment { post_id, .. }
            | Self::PostLike { post_id, .. }
            | Self::CommentLike { post_id, .. } => *post_id,
        }
    }

    #[must_use]
    pub const fn comment_id(&self) -> Option<i64> {
        match self {
            Self::Comment { comment_id, .. } | Self::CommentLike { comment_id, .. } => {
                Some(*comment_id)
            }
            Self::Post { .. } | Self::PostLike { .. } => None,
        }
    }

    #[must_use]
    pub const fn activity_type(&self) -> MemberActivityType {
        match self {
            Self::Post { activity_type, .. }
            | Self::Comment { activity_type, .. }
            | Self::PostLike { activity_type, .. }
            | Self::CommentLike { activity_type, .. } => *activity_type,
        }
    }
}
