use dailyfeed_content::domain::{
    ActivityRequest, CreateCommentRequest, CreatePostRequest, Member, MemberActivityType,
    UpdateCommentRequest,
};
use dailyfeed_content::error::ContentError;
use dailyfeed_content::publish::PublishType;
use dailyfeed_content::service::{CommentService, PostService};
use dailyfeed_content::store::PageRequest;
use dailyfeed_content::test_support::TestHarness;

struct Fixture {
    harness: TestHarness,
    posts: PostService,
    comments: CommentService,
}

impl Fixture {
    fn new(max_depth: i32) -> Self {
        let harness = TestHarness::new();
        let posts = harness.post_service(PublishType::Queue).unwrap();
        let comments = harness
            .comment_service(PublishType::Queue, max_depth)
            .unwrap();
        Self {
            harness,
            posts,
            comments,
        }
    }

    async fn post(&self, author: i64) -> i64 {
        self.posts
            .create_post(
                &Member::new(author),
                CreatePostRequest {
                    title: Some("post".to_string()),
                    content: "body".to_string(),
                },
                None,
            )
            .await
            .unwrap()
            .id
    }

    async fn comment(&self, author: i64, post_id: i64, parent_id: Option<i64>) -> i64 {
        self.comments
            .create_comment(
                &Member::new(author),
                CreateCommentRequest {
                    post_id,
                    parent_id,
                    content: format!("by {author}"),
                },
                None,
            )
            .await
            .unwrap()
            .id
    }
}

fn page() -> PageRequest {
    PageRequest::new(0, 10).unwrap()
}

#[tokio::test]
async fn test_create_comment_mirrors_and_publishes() {
    let fixture = Fixture::new(3);
    let post_id = fixture.post(1).await;

    let view = fixture
        .comments
        .create_comment(
            &Member::new(2),
            CreateCommentRequest {
                post_id,
                parent_id: None,
                content: "nice".to_string(),
            },
            None,
        )
        .await
        .unwrap();

    assert_eq!(view.depth, 0);
    assert_eq!(view.parent_id, None);
    assert_eq!(view.author_name.as_deref(), Some("Member 2"));
    assert_eq!(fixture.harness.store.comment_document_count().unwrap(), 1);

    let events = fixture.harness.store.outbox_events().unwrap();
    assert_eq!(
        events.last().map(|event| &event.payload),
        Some(&ActivityRequest::Comment {
            member_id: 2,
            post_id,
            comment_id: view.id,
            activity_type: MemberActivityType::CommentCreate,
        })
    );
}

#[tokio::test]
async fn test_comment_on_missing_post_fails() {
    let fixture = Fixture::new(3);

    let error = fixture
        .comments
        .create_comment(
            &Member::new(1),
            CreateCommentRequest {
                post_id: 404,
                parent_id: None,
                content: "hi".to_string(),
            },
            None,
        )
        .await
        .unwrap_err();

    assert!(matches!(error, ContentError::PostNotFound(404)));
}

#[tokio::test]
async fn test_reply_depth_is_limited() {
    let fixture = Fixture::new(2);
    let post_id = fixture.post(1).await;

    let root = fixture.comment(1, post_id, None).await;
    let first = fixture.comment(2, post_id, Some(root)).await;
    let second = fixture.comment(3, post_id, Some(first)).await;
    assert_eq!(
        fixture.comments.get_comment(second, None).await.unwrap().depth,
        2
    );

    let error = fixture
        .comments
        .create_reply(
            &Member::new(4),
            CreateCommentRequest {
                post_id,
                parent_id: Some(second),
                content: "too deep".to_string(),
            },
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(
        error,
        ContentError::CommentDepthLimitExceeded { max_depth: 2, .. }
    ));
}

#[tokio::test]
async fn test_reply_must_target_same_post() {
    let fixture = Fixture::new(3);
    let first_post = fixture.post(1).await;
    let second_post = fixture.post(1).await;
    let root = fixture.comment(1, first_post, None).await;

    let error = fixture
        .comments
        .create_reply(
            &Member::new(2),
            CreateCommentRequest {
                post_id: second_post,
                parent_id: Some(root),
                content: "wrong post".to_string(),
            },
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(error, ContentError::ParentCommentPostMismatch { .. }));

    let missing = fixture
        .comments
        .create_reply(
            &Member::new(2),
            CreateCommentRequest {
                post_id: first_post,
                parent_id: Some(999),
                content: "orphan".to_string(),
            },
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(missing, ContentError::ParentCommentNotFound(999)));

    let no_parent = fixture
        .comments
        .create_reply(
            &Member::new(2),
            CreateCommentRequest {
                post_id: first_post,
                parent_id: None,
                content: "not a reply".to_string(),
            },
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(no_parent, ContentError::InvalidRequest(_)));
}

#[tokio::test]
async fn test_update_comment_replaces_mirror() {
    let fixture = Fixture::new(3);
    let post_id = fixture.post(1).await;
    let comment_id = fixture.comment(2, post_id, None).await;

    let updated = fixture
        .comments
        .update_comment(
            &Member::new(2),
            comment_id,
            UpdateCommentRequest {
                content: "edited".to_string(),
            },
            None,
        )
        .await
        .unwrap();
    assert_eq!(updated.content, "edited");

    let mirror = fixture
        .harness
        .stores
        .comment_documents
        .find_live(comment_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(mirror.content, "edited");
    assert_eq!(fixture.harness.store.comment_document_count().unwrap(), 1);

    let denied = fixture
        .comments
        .update_comment(
            &Member::new(3),
            comment_id,
            UpdateCommentRequest {
                content: "hijack".to_string(),
            },
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(
        denied,
        ContentError::CommentModificationPermissionDenied { .. }
    ));
}

#[tokio::test]
async fn test_update_without_mirror_leaves_comment_untouched() {
    let fixture = Fixture::new(3);
    let post_id = fixture.post(1).await;
    let comment_id = fixture.comment(2, post_id, None).await;

    let mirror = fixture
        .harness
        .stores
        .comment_documents
        .find_live(comment_id)
        .await
        .unwrap()
        .unwrap();
    fixture
        .harness
        .stores
        .comment_documents
        .delete(mirror.id)
        .await
        .unwrap();

    let error = fixture
        .comments
        .update_comment(
            &Member::new(2),
            comment_id,
            UpdateCommentRequest {
                content: "edited".to_string(),
            },
            None,
        )
        .await
        .unwrap_err();

    assert!(matches!(error, ContentError::CommentNotFound(id) if id == comment_id));
    let stored = fixture.harness.store.raw_comment(comment_id).unwrap().unwrap();
    assert_eq!(stored.content, "by 2");
    assert_eq!(fixture.harness.store.comment_document_count().unwrap(), 0);
}

#[tokio::test]
async fn test_delete_comment_hides_direct_replies() {
    let fixture = Fixture::new(3);
    let post_id = fixture.post(1).await;
    let root = fixture.comment(1, post_id, None).await;
    let reply = fixture.comment(2, post_id, Some(root)).await;
    let other = fixture.comment(3, post_id, None).await;

    let denied = fixture
        .comments
        .delete_comment(&Member::new(2), root, None)
        .await
        .unwrap_err();
    assert!(matches!(
        denied,
        ContentError::CommentDeletionPermissionDenied { .. }
    ));

    assert!(
        fixture
            .comments
            .delete_comment(&Member::new(1), root, None)
            .await
            .unwrap()
    );

    assert!(fixture.harness.store.raw_comment(reply).unwrap().unwrap().is_deleted);
    let error = fixture.comments.get_comment(root, None).await.unwrap_err();
    assert!(matches!(error, ContentError::CommentNotFound(_)));

    let listed = fixture
        .comments
        .comments_by_post(post_id, page(), None)
        .await
        .unwrap();
    assert_eq!(listed.total_elements, 1);
    assert_eq!(listed.content[0].id, other);
}

#[tokio::test]
async fn test_comments_by_post_nests_replies() {
    let fixture = Fixture::new(3);
    let post_id = fixture.post(1).await;
    let root = fixture.comment(1, post_id, None).await;
    let reply = fixture.comment(2, post_id, Some(root)).await;

    let listed = fixture
        .comments
        .comments_by_post(post_id, page(), None)
        .await
        .unwrap();
    assert_eq!(listed.total_elements, 1);
    let top = &listed.content[0];
    assert_eq!(top.id, root);
    assert_eq!(top.children_count, 1);
    assert_eq!(top.children.len(), 1);
    assert_eq!(top.children[0].id, reply);

    let replies = fixture.comments.replies(root, page(), None).await.unwrap();
    assert_eq!(replies.total_elements, 1);
    assert_eq!(replies.content[0].parent_id, Some(root));

    let missing = fixture
        .comments
        .comments_by_post(404, page(), None)
        .await
        .unwrap_err();
    assert!(matches!(missing, ContentError::PostNotFound(404)));
}

#[tokio::test]
async fn test_comments_by_post_groups_replies_per_parent() {
    let fixture = Fixture::new(3);
    let post_id = fixture.post(1).await;
    let first = fixture.comment(1, post_id, None).await;
    let second = fixture.comment(2, post_id, None).await;
    let a = fixture.comment(3, post_id, Some(first)).await;
    let b = fixture.comment(4, post_id, Some(second)).await;
    let c = fixture.comment(5, post_id, Some(first)).await;
    // 孫は直下の返信に含めない
    fixture.comment(1, post_id, Some(a)).await;

    let listed = fixture
        .comments
        .comments_by_post(post_id, page(), None)
        .await
        .unwrap();

    assert_eq!(listed.total_elements, 2);
    let children: Vec<(i64, Vec<i64>)> = listed
        .content
        .iter()
        .map(|view| (view.id, view.children.iter().map(|child| child.id).collect()))
        .collect();
    assert_eq!(children, vec![(first, vec![a, c]), (second, vec![b])]);
    assert_eq!(listed.content[0].children[0].children_count, 1);
}

#[tokio::test]
async fn test_comments_by_member_newest_first() {
    let fixture = Fixture::new(3);
    let post_id = fixture.post(1).await;
    let older = fixture.comment(2, post_id, None).await;
    let newer = fixture.comment(2, post_id, None).await;
    fixture.comment(3, post_id, None).await;

    let written = fixture
        .comments
        .comments_by_member(2, page())
        .await
        .unwrap();
    let ids: Vec<i64> = written.content.iter().map(|comment| comment.id).collect();
    assert_eq!(ids, vec![newer, older]);
}

#[tokio::test]
async fn test_like_and_unlike_comment() {
    let fixture = Fixture::new(3);
    let post_id = fixture.post(1).await;
    let comment_id = fixture.comment(1, post_id, None).await;
    let liker = Member::new(4);

    fixture
        .comments
        .like_comment(&liker, comment_id, None)
        .await
        .unwrap();
    let twice = fixture
        .comments
        .like_comment(&liker, comment_id, None)
        .await
        .unwrap_err();
    assert!(matches!(twice, ContentError::CommentLikeAlreadyExists { .. }));
    assert_eq!(
        fixture
            .comments
            .get_comment(comment_id, None)
            .await
            .unwrap()
            .like_count,
        1
    );

    fixture
        .comments
        .unlike_comment(&liker, comment_id, None)
        .await
        .unwrap();
    let cancelled = fixture
        .comments
        .unlike_comment(&liker, comment_id, None)
        .await
        .unwrap_err();
    assert!(matches!(
        cancelled,
        ContentError::CommentLikeCancelAlreadyCommitted { .. }
    ));

    let events = fixture.harness.store.outbox_events().unwrap();
    let like_events: Vec<&ActivityRequest> = events
        .iter()
        .map(|event| &event.payload)
        .filter(|payload| matches!(payload, ActivityRequest::CommentLike { .. }))
        .collect();
    assert_eq!(like_events.len(), 2);
    assert!(like_events.iter().all(|request| request.member_id() == 4));
}
