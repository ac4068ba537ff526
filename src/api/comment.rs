use axum::{extract::State, http::StatusCode, response::IntoResponse};

use super::extract::{CurrentMember, ForwardedToken, Json, PageParams, Path, Query};
use super::response::{enveloped, success};
use crate::app::AppState;
use crate::domain::{CreateCommentRequest, UpdateCommentRequest};
use crate::error::ContentError;

/// POST /api/comments
pub(crate) async fn create(
    State(state): State<AppState>,
    CurrentMember(member): CurrentMember,
    token: ForwardedToken,
    Json(request): Json<CreateCommentRequest>,
) -> Result<impl IntoResponse, ContentError> {
    let view = state
        .comments()
        .create_comment(&member, request, token.as_deref())
        .await?;
    Ok(success(StatusCode::CREATED, view))
}

/// POST /api/comments/replies
pub(crate) async fn create_reply(
    State(state): State<AppState>,
    CurrentMember(member): CurrentMember,
    token: ForwardedToken,
    Json(request): Json<CreateCommentRequest>,
) -> Result<impl IntoResponse, ContentError> {
    let view = state
        .comments()
        .create_reply(&member, request, token.as_deref())
        .await?;
    Ok(success(StatusCode::CREATED, view))
}

/// GET /api/comments/{comment_id}
pub(crate) async fn detail(
    State(state): State<AppState>,
    token: ForwardedToken,
    Path(comment_id): Path<i64>,
) -> Result<impl IntoResponse, ContentError> {
    let view = state
        .comments()
        .get_comment(comment_id, token.as_deref())
        .await?;
    Ok(success(StatusCode::OK, view))
}

/// PUT /api/comments/{comment_id}
pub(crate) async fn update(
    State(state): State<AppState>,
    CurrentMember(member): CurrentMember,
    token: ForwardedToken,
    Path(comment_id): Path<i64>,
    Json(request): Json<UpdateCommentRequest>,
) -> Result<impl IntoResponse, ContentError> {
    let view = state
        .comments()
        .update_comment(&member, comment_id, request, token.as_deref())
        .await?;
    Ok(success(StatusCode::OK, view))
}

/// DELETE /api/comments/{comment_id}
pub(crate) async fn delete(
    State(state): State<AppState>,
    CurrentMember(member): CurrentMember,
    token: ForwardedToken,
    Path(comment_id): Path<i64>,
) -> Result<impl IntoResponse, ContentError> {
    let deleted = state
        .comments()
        .delete_comment(&member, comment_id, token.as_deref())
        .await?;
    Ok(success(StatusCode::OK, deleted))
}

/// GET /api/comments/post/{post_id}
pub(crate) async fn by_post(
    State(state): State<AppState>,
    token: ForwardedToken,
    Path(post_id): Path<i64>,
    Query(params): Query<PageParams>,
) -> Result<impl IntoResponse, ContentError> {
    let page = state
        .comments()
        .comments_by_post(post_id, params.page_request()?, token.as_deref())
        .await?;
    Ok(success(StatusCode::OK, page))
}

/// GET /api/comments/member/{member_id}
pub(crate) async fn by_member(
    State(state): State<AppState>,
    Path(member_id): Path<i64>,
    Query(params): Query<PageParams>,
) -> Result<impl IntoResponse, ContentError> {
    let page = state
        .comments()
        .comments_by_member(member_id, params.page_request()?)
        .await?;
    Ok(success(StatusCode::OK, page))
}

/// GET /api/comments/{comment_id}/replies
pub(crate) async fn replies(
    State(state): State<AppState>,
    token: ForwardedToken,
    Path(comment_id): Path<i64>,
    Query(params): Query<PageParams>,
) -> Result<impl IntoResponse, ContentError> {
    let page = state
        .comments()
        .replies(comment_id, params.page_request()?, token.as_deref())
        .await?;
    Ok(success(StatusCode::OK, page))
}

/// POST /api/comments/{comment_id}/like
pub(crate) async fn like(
    State(state): State<AppState>,
    CurrentMember(member): CurrentMember,
    token: ForwardedToken,
    Path(comment_id): Path<i64>,
) -> Result<impl IntoResponse, ContentError> {
    state
        .comments()
        .like_comment(&member, comment_id, token.as_deref())
        .await?;
    Ok(enveloped(StatusCode::CREATED, true))
}

/// DELETE /api/comments/{comment_id}/like
pub(crate) async fn unlike(
    State(state): State<AppState>,
    CurrentMember(member): CurrentMember,
    token: ForwardedToken,
    Path(comment_id): Path<i64>,
) -> Result<impl IntoResponse, ContentError> {
    state
        .comments()
        .unlike_comment(&member, comment_id, token.as_deref())
        .await?;
    Ok(enveloped(StatusCode::NO_CONTENT, true))
}
