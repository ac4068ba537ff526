use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum_test::TestServer;
use rstest::rstest;
use serde_json::{Value, json};

use dailyfeed_content::app::{ServiceSettings, build_router};
use dailyfeed_content::test_support::TestHarness;

const MEMBER_ID: HeaderName = HeaderName::from_static("x-member-id");

fn member(id: &'static str) -> HeaderValue {
    HeaderValue::from_static(id)
}

fn create_test_server() -> TestServer {
    let harness = TestHarness::new();
    let registry = harness.registry(ServiceSettings::default()).unwrap();
    TestServer::new(build_router(registry)).unwrap()
}

async fn create_post(server: &TestServer, author: &'static str) -> i64 {
    let response = server
        .post("/api/posts")
        .add_header(MEMBER_ID, member(author))
        .json(&json!({ "title": "hello", "content": "world" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::CREATED);
    response.json::<Value>()["data"]["id"].as_i64().unwrap()
}

async fn create_comment(server: &TestServer, post_id: i64) -> i64 {
    let response = server
        .post("/api/comments")
        .add_header(MEMBER_ID, member("2"))
        .json(&json!({ "postId": post_id, "content": "first!" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::CREATED);
    response.json::<Value>()["data"]["id"].as_i64().unwrap()
}

#[tokio::test]
async fn test_health_endpoints() {
    let server = create_test_server();

    let ready = server.get("/health/ready").await;
    assert_eq!(ready.status_code(), StatusCode::OK);
    assert_eq!(ready.json::<Value>()["status"], "ready");

    let live = server.get("/health/live").await;
    assert_eq!(live.status_code(), StatusCode::OK);
    assert_eq!(live.json::<Value>()["status"], "live");
}

#[tokio::test]
async fn test_metrics_endpoint_exposes_counters() {
    let server = create_test_server();
    create_post(&server, "1").await;

    let response = server.get("/metrics").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert!(response.text().contains("content_posts_created_total"));
}

#[tokio::test]
async fn test_create_post_returns_success_envelope() {
    let server = create_test_server();

    let response = server
        .post("/api/posts")
        .add_header(MEMBER_ID, member("1"))
        .json(&json!({ "title": "hello", "content": "world" }))
        .await;

    assert_eq!(response.status_code(), StatusCode::CREATED);
    let body = response.json::<Value>();
    assert_eq!(body["status"], 201);
    assert_eq!(body["result"], "SUCCESS");
    assert_eq!(body["data"]["title"], "hello");
    assert_eq!(body["data"]["authorId"], 1);
    assert_eq!(body["data"]["authorName"], "Member 1");
}

#[rstest]
#[case::create_post("/api/posts")]
#[case::create_comment("/api/comments")]
#[case::like_post("/api/posts/1/like")]
#[case::like_comment("/api/comments/1/like")]
#[tokio::test]
async fn test_writes_require_member_header(#[case] path: &str) {
    let server = create_test_server();

    let response = server
        .post(path)
        .json(&json!({ "postId": 1, "content": "x" }))
        .await;

    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
    let body = response.json::<Value>();
    assert_eq!(body["result"], "FAIL");
    assert_eq!(body["reason"], "UNAUTHENTICATED");
    assert_eq!(body["path"], path);
}

#[tokio::test]
async fn test_missing_post_reports_reason_and_path() {
    let server = create_test_server();

    let response = server.get("/api/posts/42").await;

    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
    let body = response.json::<Value>();
    assert_eq!(body["status"], 404);
    assert_eq!(body["reason"], "POST_NOT_FOUND");
    assert_eq!(body["message"], "post 42 not found");
    assert_eq!(body["path"], "/api/posts/42");
}

#[tokio::test]
async fn test_post_detail_update_and_delete() {
    let server = create_test_server();
    let post_id = create_post(&server, "1").await;

    let detail = server.get(&format!("/api/posts/{post_id}")).await;
    assert_eq!(detail.status_code(), StatusCode::OK);
    assert_eq!(detail.json::<Value>()["data"]["viewCount"], 1);

    let forbidden = server
        .put(&format!("/api/posts/{post_id}"))
        .add_header(MEMBER_ID, member("2"))
        .json(&json!({ "title": "x", "content": "y" }))
        .await;
    assert_eq!(forbidden.status_code(), StatusCode::FORBIDDEN);
    assert_eq!(forbidden.json::<Value>()["reason"], "POST_UPDATE_FORBIDDEN");

    let updated = server
        .put(&format!("/api/posts/{post_id}"))
        .add_header(MEMBER_ID, member("1"))
        .json(&json!({ "title": "edited", "content": "again" }))
        .await;
    assert_eq!(updated.status_code(), StatusCode::OK);
    assert_eq!(updated.json::<Value>()["data"]["title"], "edited");

    let deleted = server
        .delete(&format!("/api/posts/{post_id}"))
        .add_header(MEMBER_ID, member("1"))
        .await;
    assert_eq!(deleted.status_code(), StatusCode::OK);
    assert_eq!(deleted.json::<Value>()["data"], true);

    let gone = server.get(&format!("/api/posts/{post_id}")).await;
    assert_eq!(gone.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_post_like_statuses() {
    let server = create_test_server();
    let post_id = create_post(&server, "1").await;
    let path = format!("/api/posts/{post_id}/like");

    let liked = server.post(&path).add_header(MEMBER_ID, member("3")).await;
    assert_eq!(liked.status_code(), StatusCode::CREATED);
    assert_eq!(liked.json::<Value>()["data"], true);

    let again = server.post(&path).add_header(MEMBER_ID, member("3")).await;
    assert_eq!(again.status_code(), StatusCode::CONFLICT);
    assert_eq!(again.json::<Value>()["reason"], "POST_LIKE_ALREADY_EXISTS");

    let unliked = server.delete(&path).add_header(MEMBER_ID, member("3")).await;
    assert_eq!(unliked.status_code(), StatusCode::OK);

    let cancelled = server.delete(&path).add_header(MEMBER_ID, member("3")).await;
    assert_eq!(cancelled.status_code(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_comment_like_uses_enveloped_status() {
    let server = create_test_server();
    let post_id = create_post(&server, "1").await;
    let comment_id = create_comment(&server, post_id).await;
    let path = format!("/api/comments/{comment_id}/like");

    let liked = server.post(&path).add_header(MEMBER_ID, member("4")).await;
    assert_eq!(liked.status_code(), StatusCode::OK);
    assert_eq!(liked.json::<Value>()["status"], 201);

    let unliked = server.delete(&path).add_header(MEMBER_ID, member("4")).await;
    assert_eq!(unliked.status_code(), StatusCode::OK);
    assert_eq!(unliked.json::<Value>()["status"], 204);

    let cancelled = server.delete(&path).add_header(MEMBER_ID, member("4")).await;
    assert_eq!(cancelled.status_code(), StatusCode::CONFLICT);
    assert_eq!(
        cancelled.json::<Value>()["reason"],
        "COMMENT_LIKE_CANCEL_ALREADY_COMMITTED"
    );
}

#[tokio::test]
async fn test_comment_routes() {
    let server = create_test_server();
    let post_id = create_post(&server, "1").await;
    let comment_id = create_comment(&server, post_id).await;

    let reply = server
        .post("/api/comments/replies")
        .add_header(MEMBER_ID, member("3"))
        .json(&json!({ "postId": post_id, "parentId": comment_id, "content": "reply" }))
        .await;
    assert_eq!(reply.status_code(), StatusCode::CREATED);
    assert_eq!(reply.json::<Value>()["data"]["depth"], 1);

    let by_post = server.get(&format!("/api/comments/post/{post_id}")).await;
    assert_eq!(by_post.status_code(), StatusCode::OK);
    let body = by_post.json::<Value>();
    assert_eq!(body["data"]["totalElements"], 1);
    assert_eq!(body["data"]["content"][0]["childrenCount"], 1);
    assert_eq!(
        body["data"]["content"][0]["children"]
            .as_array()
            .map(Vec::len),
        Some(1)
    );

    let replies = server
        .get(&format!("/api/comments/{comment_id}/replies"))
        .await;
    assert_eq!(replies.json::<Value>()["data"]["totalElements"], 1);

    let by_member = server.get("/api/comments/member/2").await;
    assert_eq!(by_member.json::<Value>()["data"]["content"][0]["id"], comment_id);

    let edited = server
        .put(&format!("/api/comments/{comment_id}"))
        .add_header(MEMBER_ID, member("2"))
        .json(&json!({ "content": "edited" }))
        .await;
    assert_eq!(edited.status_code(), StatusCode::OK);
    assert_eq!(edited.json::<Value>()["data"]["content"], "edited");

    let deleted = server
        .delete(&format!("/api/comments/{comment_id}"))
        .add_header(MEMBER_ID, member("2"))
        .await;
    assert_eq!(deleted.status_code(), StatusCode::OK);

    let gone = server.get(&format!("/api/comments/{comment_id}")).await;
    assert_eq!(gone.status_code(), StatusCode::NOT_FOUND);
    assert_eq!(gone.json::<Value>()["reason"], "COMMENT_NOT_FOUND");
}

#[tokio::test]
async fn test_list_and_search_posts() {
    let server = create_test_server();
    create_post(&server, "1").await;
    create_post(&server, "2").await;

    let listed = server.get("/api/posts?sort=recent&page=0&size=1").await;
    assert_eq!(listed.status_code(), StatusCode::OK);
    let body = listed.json::<Value>();
    assert_eq!(body["data"]["totalElements"], 2);
    assert_eq!(body["data"]["content"].as_array().map(Vec::len), Some(1));

    let searched = server.get("/api/posts/search?keyword=HELLO&scope=title").await;
    assert_eq!(searched.json::<Value>()["data"]["totalElements"], 2);

    let by_author = server.get("/api/posts/authors/2").await;
    assert_eq!(by_author.json::<Value>()["data"]["totalElements"], 1);
}

#[tokio::test]
async fn test_invalid_page_size_is_bad_request() {
    let server = create_test_server();

    let response = server.get("/api/posts?size=500").await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["reason"], "INVALID_REQUEST");
}

#[rstest]
#[case::post_id_not_a_number("/api/posts/abc", "/api/posts/abc")]
#[case::negative_page("/api/posts?page=-1", "/api/posts")]
#[case::search_size_not_a_number("/api/posts/search?keyword=a&size=ten", "/api/posts/search")]
#[case::comment_id_not_a_number("/api/comments/abc/replies", "/api/comments/abc/replies")]
#[tokio::test]
async fn test_malformed_path_and_query_are_enveloped(#[case] uri: &str, #[case] path: &str) {
    let server = create_test_server();

    let response = server.get(uri).await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    let body = response.json::<Value>();
    assert_eq!(body["status"], 400);
    assert_eq!(body["result"], "FAIL");
    assert_eq!(body["reason"], "INVALID_REQUEST");
    assert_eq!(body["path"], path);
}

#[rstest]
#[case::create_post("/api/posts")]
#[case::create_comment("/api/comments")]
#[tokio::test]
async fn test_malformed_json_body_is_enveloped(#[case] path: &str) {
    let server = create_test_server();

    let response = server
        .post(path)
        .add_header(MEMBER_ID, member("1"))
        .content_type("application/json")
        .bytes("{\"content\": ".into())
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    let body = response.json::<Value>();
    assert_eq!(body["result"], "FAIL");
    assert_eq!(body["reason"], "INVALID_REQUEST");
    assert_eq!(body["path"], path);
}

#[tokio::test]
async fn test_json_body_missing_field_is_enveloped() {
    let server = create_test_server();
    let post_id = create_post(&server, "1").await;

    let response = server
        .put(&format!("/api/posts/{post_id}"))
        .add_header(MEMBER_ID, member("1"))
        .json(&json!({ "title": "only a title" }))
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["reason"], "INVALID_REQUEST");
}
