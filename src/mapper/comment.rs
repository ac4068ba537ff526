use uuid::Uuid;

use crate::domain::{Comment, CommentDocument, CommentSummary, CommentView, MemberSummary};

#[must_use]
pub fn comment_view(
    comment: &Comment,
    author: Option<&MemberSummary>,
    like_count: i64,
    children_count: i64,
) -> CommentView {
    CommentView {
        id: comment.id,
        content: comment.content.clone(),
        author_id: comment.author_id,
        author_name: author.map(|summary| {
            summary
                .display_name
                .clone()
                .unwrap_or_else(|| summary.member_name.clone())
        }),
        author_handle: author.and_then(|summary| summary.member_handle.clone()),
        post_id: comment.post_id,
        parent_id: comment.parent_id,
        depth: comment.depth,
        like_count,
        children_count,
        created_at: comment.created_at,
        updated_at: comment.updated_at,
        children: Vec::new(),
    }
}

#[must_use]
pub fn comment_summary(comment: &Comment, like_count: i64, children_count: i64) -> CommentSummary {
    CommentSummary {
        id: comment.id,
        content: comment.content.clone(),
        post_id: comment.post_id,
        parent_id: comment.parent_id,
        depth: comment.depth,
        like_count,
        children_count,
        created_at: comment.created_at,
    }
}

/// コメントのミラー。返信なら `parent_pk` を持つ。
#[must_use]
pub fn comment_document_from(comment: &Comment) -> CommentDocument {
    CommentDocument {
        id: Uuid::now_v7(),
        post_pk: comment.post_id,
        comment_pk: comment.id,
        parent_pk: comment.parent_id,
        content: comment.content.clone(),
        created_at: comment.created_at,
        updated_at: comment.updated_at,
        is_deleted: false,
    }
}

/// 本文更新後のミラー。識別子と作成日時は引き継ぐ。
#[must_use]
pub fn comment_document_replacement(previous: &CommentDocument, comment: &Comment) -> CommentDocument {
    CommentDocument {
        id: Uuid::now_v7(),
        post_pk: previous.post_pk,
        comment_pk: previous.comment_pk,
        parent_pk: previous.parent_pk,
        content: comment.content.clone(),
        created_at: previous.created_at,
        updated_at: comment.updated_at,
        is_deleted: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn reply() -> Comment {
        let now = Utc::now();
        Comment {
            id: 21,
            content: "reply".to_string(),
            author_id: 4,
            post_id: 2,
            parent_id: Some(20),
            depth: 1,
            is_deleted: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn reply_document_keeps_parent() {
        let document = comment_document_from(&reply());
        assert_eq!(document.parent_pk, Some(20));
        assert_eq!(document.comment_pk, 21);
        assert_eq!(document.post_pk, 2);
    }

    #[test]
    fn replacement_takes_new_content() {
        let original = reply();
        let document = comment_document_from(&original);
        let mut edited = original.clone();
        edited.apply_content("edited".to_string(), Utc::now());
        let replacement = comment_document_replacement(&document, &edited);
        assert_eq!(replacement.content, "edited");
        assert_eq!(replacement.parent_pk, Some(20));
        assert_eq!(replacement.created_at, document.created_at);
        assert_ne!(replacement.id, document.id);
    }

    #[test]
    fn summary_and_view_carry_counts() {
        let comment = reply();
        let summary = comment_summary(&comment, 3, 1);
        assert_eq!((summary.like_count, summary.children_count), (3, 1));
        let view = comment_view(&comment, None, 2, 0);
        assert_eq!(view.like_count, 2);
        assert!(view.children.is_empty());
    }
}
