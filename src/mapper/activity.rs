use chrono::Utc;
use uuid::Uuid;

use crate::domain::{ActivityRequest, Comment, DeadLetter, DeadLetterChannel, MemberActivityType};
use crate::publish::message_key;

#[must_use]
pub fn post_activity(
    member_id: i64,
    post_id: i64,
    activity_type: MemberActivityType,
) -> ActivityRequest {
    ActivityRequest::Post {
        member_id,
        post_id,
        activity_type,
    }
}

#[must_use]
pub fn post_like_activity(
    member_id: i64,
    post_id: i64,
    activity_type: MemberActivityType,
) -> ActivityRequest {
    ActivityRequest::PostLike {
        member_id,
        post_id,
        activity_type,
    }
}

#[must_use]
pub fn comment_activity(
    member_id: i64,
    comment: &Comment,
    activity_type: MemberActivityType,
) -> ActivityRequest {
    ActivityRequest::Comment {
        member_id,
        post_id: comment.post_id,
        comment_id: comment.id,
        activity_type,
    }
}

#[must_use]
pub fn comment_like_activity(
    member_id: i64,
    comment: &Comment,
    activity_type: MemberActivityType,
) -> ActivityRequest {
    ActivityRequest::CommentLike {
        member_id,
        post_id: comment.post_id,
        comment_id: comment.id,
        activity_type,
    }
}

/// 配信できなかった要求をデッドレターに変換する。
///
/// キーを作れない要求はカテゴリと ID を連結した代替キーで保存する。
///
/// # Errors
/// 要求のシリアライズに失敗した場合。
pub fn dead_letter_from(
    channel: DeadLetterChannel,
    request: &ActivityRequest,
) -> anyhow::Result<DeadLetter> {
    let payload = serde_json::to_string(request)?;
    let key = message_key(request).unwrap_or_else(|_| {
        format!(
            "{}:{}:{}",
            request.category(),
            request.member_id(),
            request.post_id()
        )
    });
    let now = Utc::now();
    Ok(DeadLetter {
        id: Uuid::now_v7(),
        channel,
        category: request.category(),
        message_key: key,
        payload,
        is_completed: false,
        is_editing: false,
        attempts: 0,
        last_error: None,
        created_at: now,
        updated_at: now,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ActivityCategory;

    #[test]
    fn dead_letter_round_trips_payload() {
        let request = post_like_activity(5, 6, MemberActivityType::LikePostCancel);
        let letter = dead_letter_from(DeadLetterChannel::Http, &request).unwrap();

        assert_eq!(letter.category, ActivityCategory::PostLike);
        assert_eq!(letter.message_key, "post_like:5:6:LIKE_POST_CANCEL");
        assert!(!letter.is_completed && !letter.is_editing);
        let decoded: ActivityRequest = serde_json::from_str(&letter.payload).unwrap();
        assert_eq!(decoded, request);
    }

    #[test]
    fn comment_activity_uses_comment_post() {
        let now = Utc::now();
        let comment = Comment {
            id: 8,
            content: String::new(),
            author_id: 1,
            post_id: 4,
            parent_id: None,
            depth: 0,
            is_deleted: false,
            created_at: now,
            updated_at: now,
        };
        let request = comment_like_activity(9, &comment, MemberActivityType::LikeComment);
        assert_eq!(request.member_id(), 9);
        assert_eq!(request.post_id(), 4);
        assert_eq!(request.comment_id(), Some(8));
    }
}
