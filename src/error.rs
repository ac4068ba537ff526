use axum::http::StatusCode;
use thiserror::Error;

/// コンテンツ操作の失敗。HTTP ステータスと理由コードに一対一で対応する。
#[derive(Debug, Error)]
pub enum ContentError {
    #[error("post {0} not found")]
    PostNotFound(i64),
    #[error("member {member_id} may not update post {post_id}")]
    PostUpdateForbidden { post_id: i64, member_id: i64 },
    #[error("member {member_id} may not delete post {post_id}")]
    PostDeleteForbidden { post_id: i64, member_id: i64 },
    #[error("member {member_id} already likes post {post_id}")]
    PostLikeAlreadyExists { post_id: i64, member_id: i64 },
    #[error("like on post {post_id} by member {member_id} was already cancelled")]
    PostLikeCancelAlreadyCommitted { post_id: i64, member_id: i64 },

    #[error("comment {0} not found")]
    CommentNotFound(i64),
    #[error("parent comment {0} not found")]
    ParentCommentNotFound(i64),
    #[error("comment depth limit {max_depth} exceeded by parent {parent_id}")]
    CommentDepthLimitExceeded { parent_id: i64, max_depth: i32 },
    #[error("parent comment {parent_id} does not belong to post {post_id}")]
    ParentCommentPostMismatch { parent_id: i64, post_id: i64 },
    #[error("member {member_id} may not modify comment {comment_id}")]
    CommentModificationPermissionDenied { comment_id: i64, member_id: i64 },
    #[error("member {member_id} may not delete comment {comment_id}")]
    CommentDeletionPermissionDenied { comment_id: i64, member_id: i64 },
    #[error("member {member_id} already likes comment {comment_id}")]
    CommentLikeAlreadyExists { comment_id: i64, member_id: i64 },
    #[error("like on comment {comment_id} by member {member_id} was already cancelled")]
    CommentLikeCancelAlreadyCommitted { comment_id: i64, member_id: i64 },

    #[error("member {0} not found")]
    MemberNotFound(i64),
    #[error("missing or malformed member identity")]
    Unauthenticated,
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("too many requests to {0}")]
    TooManyRequests(&'static str),
    #[error("failed to create activity message key: {0}")]
    MessageKeyCreation(String),
    #[error("activity queue unavailable: {0}")]
    ActivityQueueUnavailable(String),
    #[error("remote call to {service} failed: {message}")]
    RemoteCallFailed {
        service: &'static str,
        message: String,
    },

    #[error("storage failure: {0:#}")]
    Storage(#[from] anyhow::Error),
}

impl ContentError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::PostNotFound(_)
            | Self::CommentNotFound(_)
            | Self::ParentCommentNotFound(_)
            | Self::MemberNotFound(_) => StatusCode::NOT_FOUND,
            Self::PostUpdateForbidden { .. }
            | Self::PostDeleteForbidden { .. }
            | Self::CommentModificationPermissionDenied { .. }
            | Self::CommentDeletionPermissionDenied { .. } => StatusCode::FORBIDDEN,
            Self::PostLikeAlreadyExists { .. }
            | Self::PostLikeCancelAlreadyCommitted { .. }
            | Self::CommentLikeAlreadyExists { .. }
            | Self::CommentLikeCancelAlreadyCommitted { .. } => StatusCode::CONFLICT,
            Self::CommentDepthLimitExceeded { .. }
            | Self::ParentCommentPostMismatch { .. }
            | Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::TooManyRequests(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::RemoteCallFailed { .. } => StatusCode::BAD_GATEWAY,
            Self::ActivityQueueUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::MessageKeyCreation(_) | Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// クライアント向けの安定した理由コード。
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::PostNotFound(_) => "POST_NOT_FOUND",
            Self::PostUpdateForbidden { .. } => "POST_UPDATE_FORBIDDEN",
            Self::PostDeleteForbidden { .. } => "POST_DELETE_FORBIDDEN",
            Self::PostLikeAlreadyExists { .. } => "POST_LIKE_ALREADY_EXISTS",
            Self::PostLikeCancelAlreadyCommitted { .. } => "POST_LIKE_CANCEL_ALREADY_COMMITTED",
            Self::CommentNotFound(_) => "COMMENT_NOT_FOUND",
            Self::ParentCommentNotFound(_) => "PARENT_COMMENT_NOT_FOUND",
            Self::CommentDepthLimitExceeded { .. } => "COMMENT_DEPTH_LIMIT_EXCEEDED",
            Self::ParentCommentPostMismatch { .. } => "PARENT_COMMENT_POST_MISMATCH",
            Self::CommentModificationPermissionDenied { .. } => {
                "COMMENT_MODIFICATION_PERMISSION_DENIED"
            }
            Self::CommentDeletionPermissionDenied { .. } => "COMMENT_DELETION_PERMISSION_DENIED",
            Self::CommentLikeAlreadyExists { .. } => "COMMENT_LIKE_ALREADY_EXISTS",
            Self::CommentLikeCancelAlreadyCommitted { .. } => {
                "COMMENT_LIKE_CANCEL_ALREADY_COMMITTED"
            }
            Self::MemberNotFound(_) => "MEMBER_NOT_FOUND",
            Self::Unauthenticated => "UNAUTHENTICATED",
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::TooManyRequests(_) => "TOO_MANY_REQUESTS",
            Self::MessageKeyCreation(_) => "MESSAGE_KEY_CREATION_FAILED",
            Self::ActivityQueueUnavailable(_) => "ACTIVITY_QUEUE_UNAVAILABLE",
            Self::RemoteCallFailed { .. } => "REMOTE_CALL_FAILED",
            Self::Storage(_) => "INTERNAL_ERROR",
        }
    }

    #[must_use]
    pub fn is_server_error(&self) -> bool {
        self.status().is_server_error()
    }
}
