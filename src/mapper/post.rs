use uuid::Uuid;

use crate::domain::{MemberSummary, Post, PostDocument, PostItemCounts, PostView};

/// 作成直後の投稿。リアクションはまだ無い。
#[must_use]
pub fn post_view_from_created(post: &Post, author: &MemberSummary) -> PostView {
    post_view(post, Some(author), 0, 0)
}

/// 更新後の投稿。件数は timeline サービスの集計値を使う。
#[must_use]
pub fn post_view_from_updated(
    post: &Post,
    author: Option<&MemberSummary>,
    counts: PostItemCounts,
) -> PostView {
    post_view(post, author, counts.like_count, counts.comment_count)
}

#[must_use]
pub fn post_view(
    post: &Post,
    author: Option<&MemberSummary>,
    like_count: i64,
    comment_count: i64,
) -> PostView {
    PostView {
        id: post.id,
        title: post.title.clone(),
        content: post.content.clone(),
        author_id: post.author_id,
        author_name: author.map(|summary| {
            summary
                .display_name
                .clone()
                .unwrap_or_else(|| summary.member_name.clone())
        }),
        author_handle: author.and_then(|summary| summary.member_handle.clone()),
        author_avatar_url: author.and_then(|summary| summary.avatar_url.clone()),
        view_count: post.view_count,
        like_count,
        comment_count,
        created_at: post.created_at,
        updated_at: post.updated_at,
    }
}

/// 新規投稿の最初のドキュメント（version 1）。
#[must_use]
pub fn post_document_from(post: &Post) -> PostDocument {
    PostDocument {
        id: Uuid::now_v7(),
        post_pk: post.id,
        title: post.title.clone(),
        content: post.content.clone(),
        created_at: post.created_at,
        updated_at: post.updated_at,
        is_deleted: false,
        comment_count: 0,
        is_current: true,
        version: 1,
    }
}

/// `previous` の次のバージョン。本文は更新後の投稿から写す。
#[must_use]
pub fn post_document_next_version(previous: &PostDocument, post: &Post) -> PostDocument {
    PostDocument {
        id: Uuid::now_v7(),
        post_pk: previous.post_pk,
        title: post.title.clone(),
        content: post.content.clone(),
        created_at: previous.created_at,
        updated_at: post.updated_at,
        is_deleted: false,
        comment_count: previous.comment_count,
        is_current: true,
        version: previous.version + 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn post() -> Post {
        let now = Utc::now();
        Post {
            id: 11,
            title: "t".to_string(),
            content: "c".to_string(),
            author_id: 3,
            view_count: 9,
            is_deleted: false,
            created_at: now,
            updated_at: now,
        }
    }

    fn author() -> MemberSummary {
        MemberSummary {
            id: 3,
            member_name: "kim".to_string(),
            display_name: None,
            member_handle: Some("@kim".to_string()),
            avatar_url: None,
        }
    }

    #[test]
    fn created_view_has_zero_counts_and_author() {
        let view = post_view_from_created(&post(), &author());
        assert_eq!(view.like_count, 0);
        assert_eq!(view.comment_count, 0);
        assert_eq!(view.author_name.as_deref(), Some("kim"));
        assert_eq!(view.author_handle.as_deref(), Some("@kim"));
        assert_eq!(view.view_count, 9);
    }

    #[test]
    fn updated_view_uses_timeline_counts() {
        let counts = PostItemCounts {
            like_count: 5,
            comment_count: 2,
        };
        let view = post_view_from_updated(&post(), None, counts);
        assert_eq!(view.like_count, 5);
        assert_eq!(view.comment_count, 2);
        assert_eq!(view.author_name, None);
    }

    #[test]
    fn next_version_copies_state_and_increments() {
        let mut current = post();
        let first = post_document_from(&current);
        assert_eq!(first.version, 1);
        assert!(first.is_current);

        current.apply_update("new".to_string(), "body".to_string(), current.updated_at + Duration::seconds(5));
        let second = post_document_next_version(&first, &current);
        assert_eq!(second.version, 2);
        assert_eq!(second.post_pk, 11);
        assert_eq!(second.title, "new");
        assert_eq!(second.created_at, first.created_at);
        assert_eq!(second.updated_at, current.updated_at);
        assert!(second.is_current && !second.is_deleted);
        assert_ne!(second.id, first.id);
    }
}
