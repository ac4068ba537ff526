use std::sync::Arc;

use dailyfeed_content::domain::{
    ActivityRequest, CreatePostRequest, DeadLetterChannel, Member, MemberActivityType,
    UpdatePostRequest,
};
use dailyfeed_content::error::ContentError;
use dailyfeed_content::publish::PublishType;
use dailyfeed_content::store::{KeywordScope, PageRequest, PostSort};
use dailyfeed_content::test_support::{
    FailingDeadLetterDao, RecordingPublisher, StubTimelineApi, TestHarness,
};
use tracing_test::traced_test;

fn create_request(title: &str, content: &str) -> CreatePostRequest {
    CreatePostRequest {
        title: Some(title.to_string()),
        content: content.to_string(),
    }
}

fn update_request(title: &str, content: &str) -> UpdatePostRequest {
    UpdatePostRequest {
        title: title.to_string(),
        content: content.to_string(),
    }
}

#[tokio::test]
async fn test_create_post_publishes_to_outbox() {
    let harness = TestHarness::new();
    let posts = harness.post_service(PublishType::Queue).unwrap();

    let view = posts
        .create_post(&Member::new(1), create_request("hello", "first post"), None)
        .await
        .unwrap();

    assert_eq!(view.title, "hello");
    assert_eq!(view.author_id, 1);
    assert_eq!(view.author_name.as_deref(), Some("Member 1"));
    assert_eq!(view.like_count, 0);

    let events = harness.store.outbox_events().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(
        events[0].payload,
        ActivityRequest::Post {
            member_id: 1,
            post_id: view.id,
            activity_type: MemberActivityType::PostCreate,
        }
    );
    assert!(events[0].topic.starts_with("post-activity-"));
    assert!(harness.activity.sent().is_empty());

    let current = harness
        .stores
        .post_documents
        .find_current(view.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(current.version, 1);
    assert_eq!(current.title, "hello");
}

#[tokio::test]
async fn test_create_post_over_http_forwards_token() {
    let harness = TestHarness::new();
    let posts = harness.post_service(PublishType::Http).unwrap();

    posts
        .create_post(&Member::new(2), create_request("t", "c"), Some("Bearer abc"))
        .await
        .unwrap();

    assert_eq!(harness.activity.sent().len(), 1);
    assert_eq!(harness.activity.tokens(), vec![Some("Bearer abc".to_string())]);
    assert!(harness.store.outbox_events().unwrap().is_empty());
}

#[tokio::test]
async fn test_create_post_requires_known_member() {
    let harness = TestHarness::new();
    let posts = harness.post_service(PublishType::Queue).unwrap();

    let error = posts
        .create_post(&Member::new(99), create_request("t", "c"), None)
        .await
        .unwrap_err();

    assert!(matches!(error, ContentError::MemberNotFound(99)));
    assert!(harness.store.raw_post(1).unwrap().is_none());
}

#[tokio::test]
async fn test_queue_failure_stores_dead_letter_and_succeeds() {
    let publisher = Arc::new(RecordingPublisher::new());
    publisher.set_should_fail(true);
    let harness = TestHarness::new().with_publisher(publisher.clone());
    let posts = harness.post_service(PublishType::Queue).unwrap();

    let view = posts
        .create_post(&Member::new(1), create_request("t", "c"), None)
        .await
        .unwrap();

    let letters = harness.store.dead_letters().unwrap();
    assert_eq!(letters.len(), 1);
    assert_eq!(letters[0].channel, DeadLetterChannel::Queue);
    assert_eq!(letters[0].message_key, format!("post:1:{}:POST_CREATE", view.id));
    assert!(!letters[0].is_completed);
    assert!(publisher.published().is_empty());
}

#[tokio::test]
async fn test_queue_failure_without_dead_letter_store_is_unavailable() {
    let publisher = Arc::new(RecordingPublisher::new());
    publisher.set_should_fail(true);
    let harness = TestHarness::new()
        .with_publisher(publisher)
        .with_dead_letters(Arc::new(FailingDeadLetterDao));
    let posts = harness.post_service(PublishType::Queue).unwrap();

    let error = posts
        .create_post(&Member::new(1), create_request("t", "c"), None)
        .await
        .unwrap_err();

    assert!(matches!(error, ContentError::ActivityQueueUnavailable(_)));
    // 関係モデルへの書き込みは取り消さない
    assert!(harness.store.raw_post(1).unwrap().is_some());
}

#[tokio::test]
async fn test_http_failure_without_dead_letter_store_is_remote_failure() {
    let harness = TestHarness::new().with_dead_letters(Arc::new(FailingDeadLetterDao));
    harness.activity.set_should_fail(true);
    let posts = harness.post_service(PublishType::Http).unwrap();

    let error = posts
        .create_post(&Member::new(1), create_request("t", "c"), None)
        .await
        .unwrap_err();

    assert!(matches!(
        error,
        ContentError::RemoteCallFailed {
            service: "member-activity",
            ..
        }
    ));
}

#[tokio::test]
async fn test_throttled_activity_is_not_dead_lettered() {
    let harness = TestHarness::new();
    harness.activity.set_throttled(true);
    let posts = harness.post_service(PublishType::Http).unwrap();

    let error = posts
        .create_post(&Member::new(1), create_request("t", "c"), None)
        .await
        .unwrap_err();

    assert!(matches!(error, ContentError::TooManyRequests(_)));
    assert!(harness.store.dead_letters().unwrap().is_empty());
}

#[tokio::test]
async fn test_message_key_failure_is_returned_without_dead_letter() {
    let publisher = Arc::new(RecordingPublisher::new());
    publisher.set_key_failure(true);
    let harness = TestHarness::new().with_publisher(publisher.clone());
    let posts = harness.post_service(PublishType::Queue).unwrap();

    let error = posts
        .create_post(&Member::new(1), create_request("t", "c"), None)
        .await
        .unwrap_err();

    assert!(matches!(error, ContentError::MessageKeyCreation(_)));
    assert_eq!(error.reason(), "MESSAGE_KEY_CREATION_FAILED");
    assert!(harness.store.dead_letters().unwrap().is_empty());
    assert!(publisher.published().is_empty());
}

#[tokio::test]
async fn test_update_without_current_document_leaves_post_untouched() {
    let harness = TestHarness::new();
    let posts = harness.post_service(PublishType::Queue).unwrap();
    let author = Member::new(1);
    let created = posts
        .create_post(&author, create_request("old", "body"), None)
        .await
        .unwrap();

    let mut document = harness
        .stores
        .post_documents
        .find_current(created.id)
        .await
        .unwrap()
        .unwrap();
    document.soft_delete();
    harness.stores.post_documents.save(&document).await.unwrap();

    let error = posts
        .update_post(&author, created.id, update_request("new", "changed"), None)
        .await
        .unwrap_err();

    assert!(matches!(error, ContentError::PostNotFound(id) if id == created.id));
    let stored = harness.store.raw_post(created.id).unwrap().unwrap();
    assert_eq!(stored.title, "old");
    assert_eq!(stored.content, "body");
    assert_eq!(
        harness.stores.post_documents.history(created.id).await.unwrap().len(),
        1
    );
}

#[tokio::test]
async fn test_update_post_keeps_version_history() {
    let harness = TestHarness::new()
        .with_timeline(Arc::new(StubTimelineApi::with_counts(4, 2)));
    let posts = harness.post_service(PublishType::Queue).unwrap();
    let author = Member::new(1);

    let created = posts
        .create_post(&author, create_request("v1", "one"), None)
        .await
        .unwrap();
    posts
        .update_post(&author, created.id, update_request("v2", "two"), None)
        .await
        .unwrap();
    let updated = posts
        .update_post(&author, created.id, update_request("v3", "three"), None)
        .await
        .unwrap();

    assert_eq!(updated.title, "v3");
    assert_eq!(updated.like_count, 4);
    assert_eq!(updated.comment_count, 2);

    let history = harness
        .stores
        .post_documents
        .history(created.id)
        .await
        .unwrap();
    let versions: Vec<i32> = history.iter().map(|document| document.version).collect();
    assert_eq!(versions, vec![1, 2, 3]);
    let current: Vec<bool> = history.iter().map(|document| document.is_current).collect();
    assert_eq!(current, vec![false, false, true]);
}

#[tokio::test]
async fn test_update_post_degrades_when_timeline_fails() {
    let timeline = Arc::new(StubTimelineApi::with_counts(7, 7));
    timeline.set_should_fail(true);
    let harness = TestHarness::new().with_timeline(timeline);
    let posts = harness.post_service(PublishType::Queue).unwrap();
    let author = Member::new(1);

    let created = posts
        .create_post(&author, create_request("t", "c"), None)
        .await
        .unwrap();
    let updated = posts
        .update_post(&author, created.id, update_request("t2", "c2"), None)
        .await
        .unwrap();

    assert_eq!(updated.like_count, 0);
    assert_eq!(updated.comment_count, 0);
}

#[tokio::test]
async fn test_only_author_may_update_or_delete() {
    let harness = TestHarness::new();
    let posts = harness.post_service(PublishType::Queue).unwrap();

    let created = posts
        .create_post(&Member::new(1), create_request("t", "c"), None)
        .await
        .unwrap();

    let update = posts
        .update_post(&Member::new(2), created.id, update_request("x", "y"), None)
        .await
        .unwrap_err();
    assert!(matches!(update, ContentError::PostUpdateForbidden { .. }));

    let delete = posts
        .delete_post(&Member::new(2), created.id, None)
        .await
        .unwrap_err();
    assert!(matches!(delete, ContentError::PostDeleteForbidden { .. }));
}

#[tokio::test]
async fn test_delete_post_hides_post_and_document() {
    let harness = TestHarness::new();
    let posts = harness.post_service(PublishType::Queue).unwrap();
    let author = Member::new(1);

    let created = posts
        .create_post(&author, create_request("t", "c"), None)
        .await
        .unwrap();
    assert!(posts.delete_post(&author, created.id, None).await.unwrap());

    let error = posts.get_post(created.id, None).await.unwrap_err();
    assert!(matches!(error, ContentError::PostNotFound(_)));
    assert!(harness.store.raw_post(created.id).unwrap().unwrap().is_deleted);
    assert!(
        harness
            .stores
            .post_documents
            .find_current(created.id)
            .await
            .unwrap()
            .is_none()
    );

    let again = posts.delete_post(&author, created.id, None).await.unwrap_err();
    assert!(matches!(again, ContentError::PostNotFound(_)));
}

#[tokio::test]
async fn test_like_and_unlike_post() {
    let harness = TestHarness::new();
    let posts = harness.post_service(PublishType::Queue).unwrap();

    let created = posts
        .create_post(&Member::new(1), create_request("t", "c"), None)
        .await
        .unwrap();
    let liker = Member::new(3);

    posts.like_post(&liker, created.id, None).await.unwrap();
    let twice = posts.like_post(&liker, created.id, None).await.unwrap_err();
    assert!(matches!(twice, ContentError::PostLikeAlreadyExists { .. }));

    let detail = posts.get_post(created.id, None).await.unwrap();
    assert_eq!(detail.like_count, 1);

    posts.unlike_post(&liker, created.id, None).await.unwrap();
    let cancelled = posts.unlike_post(&liker, created.id, None).await.unwrap_err();
    assert!(matches!(
        cancelled,
        ContentError::PostLikeCancelAlreadyCommitted { .. }
    ));

    let events = harness.store.outbox_events().unwrap();
    let likes: Vec<&ActivityRequest> = events
        .iter()
        .map(|event| &event.payload)
        .filter(|payload| matches!(payload, ActivityRequest::PostLike { .. }))
        .collect();
    assert_eq!(likes.len(), 2);
    assert_eq!(likes[0].member_id(), 3);
}

#[tokio::test]
async fn test_get_post_counts_views() {
    let harness = TestHarness::new();
    let posts = harness.post_service(PublishType::Queue).unwrap();

    let created = posts
        .create_post(&Member::new(1), create_request("t", "c"), None)
        .await
        .unwrap();

    assert_eq!(posts.get_post(created.id, None).await.unwrap().view_count, 1);
    assert_eq!(posts.get_post(created.id, None).await.unwrap().view_count, 2);
}

#[tokio::test]
async fn test_get_post_omits_author_when_member_service_fails() {
    let harness = TestHarness::new();
    let posts = harness.post_service(PublishType::Queue).unwrap();

    let created = posts
        .create_post(&Member::new(1), create_request("t", "c"), None)
        .await
        .unwrap();
    harness.members.set_should_fail(true);

    let detail = posts.get_post(created.id, None).await.unwrap();
    assert_eq!(detail.author_id, 1);
    assert!(detail.author_name.is_none());
}

#[tokio::test]
async fn test_list_search_and_author_pages() {
    let harness = TestHarness::new();
    let posts = harness.post_service(PublishType::Queue).unwrap();

    for (author, title, content) in [
        (1, "Rust weekly", "async traits"),
        (2, "Go notes", "channels in rust style"),
        (1, "Cooking", "pasta"),
    ] {
        posts
            .create_post(&Member::new(author), create_request(title, content), None)
            .await
            .unwrap();
    }

    let page = PageRequest::new(0, 10).unwrap();
    let latest = posts.list_posts(PostSort::Recent, page, None).await.unwrap();
    assert_eq!(latest.total_elements, 3);
    assert_eq!(latest.content[0].title, "Cooking");

    let by_title = posts
        .search_posts("rust", KeywordScope::Title, page, None)
        .await
        .unwrap();
    assert_eq!(by_title.total_elements, 1);
    assert_eq!(by_title.content[0].title, "Rust weekly");

    let by_content = posts
        .search_posts("RUST", KeywordScope::Content, page, None)
        .await
        .unwrap();
    assert_eq!(by_content.total_elements, 1);
    assert_eq!(by_content.content[0].title, "Go notes");

    let by_author = posts.posts_by_author(1, page, None).await.unwrap();
    assert_eq!(by_author.total_elements, 2);
    assert!(by_author.content.iter().all(|post| post.author_id == 1));
}

#[tokio::test]
#[traced_test]
async fn test_spans_record_member_id_only() {
    let harness = TestHarness::new();
    let posts = harness.post_service(PublishType::Queue).unwrap();

    posts
        .create_post(&Member::new(1), create_request("t", "c"), None)
        .await
        .unwrap();

    assert!(logs_contain("create_post{member_id=1}"));
    assert!(!logs_contain("member=Member"));
}
