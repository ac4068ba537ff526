use axum::{extract::State, http::StatusCode, response::IntoResponse};

use super::extract::{
    CurrentMember, ForwardedToken, Json, ListParams, PageParams, Path, Query, SearchParams,
};
use super::response::success;
use crate::app::AppState;
use crate::domain::{CreatePostRequest, UpdatePostRequest};
use crate::error::ContentError;

/// POST /api/posts
pub(crate) async fn create(
    State(state): State<AppState>,
    CurrentMember(member): CurrentMember,
    token: ForwardedToken,
    Json(request): Json<CreatePostRequest>,
) -> Result<impl IntoResponse, ContentError> {
    let view = state
        .posts()
        .create_post(&member, request, token.as_deref())
        .await?;
    Ok(success(StatusCode::CREATED, view))
}

/// GET /api/posts?sort=&page=&size=
pub(crate) async fn list(
    State(state): State<AppState>,
    token: ForwardedToken,
    Query(params): Query<ListParams>,
) -> Result<impl IntoResponse, ContentError> {
    let page = state
        .posts()
        .list_posts(params.sort()?, params.page_request()?, token.as_deref())
        .await?;
    Ok(success(StatusCode::OK, page))
}

/// GET /api/posts/search?keyword=&scope=&page=&size=
pub(crate) async fn search(
    State(state): State<AppState>,
    token: ForwardedToken,
    Query(params): Query<SearchParams>,
) -> Result<impl IntoResponse, ContentError> {
    let page = state
        .posts()
        .search_posts(
            &params.keyword,
            params.scope()?,
            params.page_request()?,
            token.as_deref(),
        )
        .await?;
    Ok(success(StatusCode::OK, page))
}

/// GET /api/posts/authors/{author_id}
pub(crate) async fn by_author(
    State(state): State<AppState>,
    token: ForwardedToken,
    Path(author_id): Path<i64>,
    Query(params): Query<PageParams>,
) -> Result<impl IntoResponse, ContentError> {
    let page = state
        .posts()
        .posts_by_author(author_id, params.page_request()?, token.as_deref())
        .await?;
    Ok(success(StatusCode::OK, page))
}

/// GET /api/posts/{post_id}
pub(crate) async fn detail(
    State(state): State<AppState>,
    token: ForwardedToken,
    Path(post_id): Path<i64>,
) -> Result<impl IntoResponse, ContentError> {
    let view = state.posts().get_post(post_id, token.as_deref()).await?;
    Ok(success(StatusCode::OK, view))
}

/// PUT /api/posts/{post_id}
pub(crate) async fn update(
    State(state): State<AppState>,
    CurrentMember(member): CurrentMember,
    token: ForwardedToken,
    Path(post_id): Path<i64>,
    Json(request): Json<UpdatePostRequest>,
) -> Result<impl IntoResponse, ContentError> {
    let view = state
        .posts()
        .update_post(&member, post_id, request, token.as_deref())
        .await?;
    Ok(success(StatusCode::OK, view))
}

/// DELETE /api/posts/{post_id}
pub(crate) async fn delete(
    State(state): State<AppState>,
    CurrentMember(member): CurrentMember,
    token: ForwardedToken,
    Path(post_id): Path<i64>,
) -> Result<impl IntoResponse, ContentError> {
    let deleted = state
        .posts()
        .delete_post(&member, post_id, token.as_deref())
        .await?;
    Ok(success(StatusCode::OK, deleted))
}

/// POST /api/posts/{post_id}/like
pub(crate) async fn like(
    State(state): State<AppState>,
    CurrentMember(member): CurrentMember,
    token: ForwardedToken,
    Path(post_id): Path<i64>,
) -> Result<impl IntoResponse, ContentError> {
    state
        .posts()
        .like_post(&member, post_id, token.as_deref())
        .await?;
    Ok(success(StatusCode::CREATED, true))
}

/// DELETE /api/posts/{post_id}/like
pub(crate) async fn unlike(
    State(state): State<AppState>,
    CurrentMember(member): CurrentMember,
    token: ForwardedToken,
    Path(post_id): Path<i64>,
) -> Result<impl IntoResponse, ContentError> {
    state
        .posts()
        .unlike_post(&member, post_id, token.as_deref())
        .await?;
    Ok(success(StatusCode::OK, true))
}
