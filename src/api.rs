pub(crate) mod comment;
pub mod extract;
pub(crate) mod health;
pub(crate) mod metrics;
pub(crate) mod post;
pub mod response;

use axum::{
    Router, middleware,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::app::AppState;

pub(crate) fn router(state: AppState) -> Router {
    Router::new()
        .route("/health/ready", get(health::ready))
        .route("/health/live", get(health::live))
        .route("/metrics", get(metrics::exporter))
        .route("/api/posts", post(post::create).get(post::list))
        .route("/api/posts/search", get(post::search))
        .route("/api/posts/authors/{author_id}", get(post::by_author))
        .route(
            "/api/posts/{post_id}",
            get(post::detail).put(post::update).delete(post::delete),
        )
        .route(
            "/api/posts/{post_id}/like",
            post(post::like).delete(post::unlike),
        )
        .route("/api/comments", post(comment::create))
        .route("/api/comments/replies", post(comment::create_reply))
        .route("/api/comments/post/{post_id}", get(comment::by_post))
        .route("/api/comments/member/{member_id}", get(comment::by_member))
        .route(
            "/api/comments/{comment_id}",
            get(comment::detail)
                .put(comment::update)
                .delete(comment::delete),
        )
        .route("/api/comments/{comment_id}/replies", get(comment::replies))
        .route(
            "/api/comments/{comment_id}/like",
            post(comment::like).delete(comment::unlike),
        )
        .layer(middleware::from_fn(response::attach_error_path))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
