use std::convert::Infallible;

use axum::{
    extract::{
        FromRequest, FromRequestParts,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::{header::AUTHORIZATION, request::Parts},
};
use serde::Deserialize;

use crate::domain::Member;
use crate::error::ContentError;
use crate::store::{KeywordScope, PageRequest, PostSort};

/// `axum::Json` と同じだが、解析失敗を `INVALID_REQUEST` のエラー封筒で返す。
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ContentError))]
pub struct Json<T>(pub T);

#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ContentError))]
pub struct Path<T>(pub T);

#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ContentError))]
pub struct Query<T>(pub T);

impl From<JsonRejection> for ContentError {
    fn from(rejection: JsonRejection) -> Self {
        Self::InvalidRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ContentError {
    fn from(rejection: PathRejection) -> Self {
        Self::InvalidRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ContentError {
    fn from(rejection: QueryRejection) -> Self {
        Self::InvalidRequest(rejection.body_text())
    }
}

/// ゲートウェイが付与する認証済み会員 ID。
pub const MEMBER_ID_HEADER: &str = "x-member-id";

const DEFAULT_PAGE_SIZE: u32 = 10;
const DEFAULT_SEARCH_PAGE_SIZE: u32 = 20;

/// リクエストを発行した会員。ヘッダーが無い、または正の整数でなければ 401。
#[derive(Debug, Clone)]
pub struct CurrentMember(pub Member);

impl<S: Send + Sync> FromRequestParts<S> for CurrentMember {
    type Rejection = ContentError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let member_id = parts
            .headers
            .get(MEMBER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<i64>().ok())
            .filter(|id| *id > 0)
            .ok_or(ContentError::Unauthenticated)?;
        Ok(Self(Member::new(member_id)))
    }
}

/// 兄弟サービスへそのまま転送する Authorization ヘッダー。
#[derive(Debug, Clone, Default)]
pub struct ForwardedToken(pub Option<String>);

impl ForwardedToken {
    #[must_use]
    pub fn as_deref(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

impl<S: Send + Sync> FromRequestParts<S> for ForwardedToken {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(
            parts
                .headers
                .get(AUTHORIZATION)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string),
        ))
    }
}

fn page_request(
    page: Option<u32>,
    size: Option<u32>,
    default_size: u32,
) -> Result<PageRequest, ContentError> {
    PageRequest::new(page.unwrap_or(0), size.unwrap_or(default_size))
}

fn invalid(error: &anyhow::Error) -> ContentError {
    ContentError::InvalidRequest(error.to_string())
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<u32>,
    pub size: Option<u32>,
}

impl PageParams {
    pub(crate) fn page_request(&self) -> Result<PageRequest, ContentError> {
        page_request(self.page, self.size, DEFAULT_PAGE_SIZE)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListParams {
    pub sort: Option<String>,
    pub page: Option<u32>,
    pub size: Option<u32>,
}

impl ListParams {
    pub(crate) fn sort(&self) -> Result<PostSort, ContentError> {
        self.sort
            .as_deref()
            .map_or(Ok(PostSort::default()), |raw| raw.parse().map_err(|e| invalid(&e)))
    }

    pub(crate) fn page_request(&self) -> Result<PageRequest, ContentError> {
        page_request(self.page, self.size, DEFAULT_PAGE_SIZE)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub keyword: String,
    pub scope: Option<String>,
    pub page: Option<u32>,
    pub size: Option<u32>,
}

impl SearchParams {
    pub(crate) fn scope(&self) -> Result<KeywordScope, ContentError> {
        self.scope
            .as_deref()
            .map_or(Ok(KeywordScope::default()), |raw| raw.parse().map_err(|e| invalid(&e)))
    }

    pub(crate) fn page_request(&self) -> Result<PageRequest, ContentError> {
        page_request(self.page, self.size, DEFAULT_SEARCH_PAGE_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn member_from(header: Option<&str>) -> Result<CurrentMember, ContentError> {
        let mut builder = Request::builder().uri("/api/posts");
        if let Some(value) = header {
            builder = builder.header(MEMBER_ID_HEADER, value);
        }
        let (mut parts, ()) = builder.body(()).unwrap().into_parts();
        CurrentMember::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn member_header_is_required_and_positive() {
        assert_eq!(member_from(Some("42")).await.unwrap().0.id, 42);
        assert!(matches!(
            member_from(None).await,
            Err(ContentError::Unauthenticated)
        ));
        assert!(matches!(
            member_from(Some("-1")).await,
            Err(ContentError::Unauthenticated)
        ));
        assert!(matches!(
            member_from(Some("abc")).await,
            Err(ContentError::Unauthenticated)
        ));
    }

    #[test]
    fn params_apply_defaults_and_bounds() {
        let params = PageParams::default();
        assert_eq!(params.page_request().unwrap().size(), 10);

        let search = SearchParams::default();
        assert_eq!(search.page_request().unwrap().size(), 20);
        assert_eq!(search.scope().unwrap(), KeywordScope::TitleOrContent);

        let oversized = PageParams {
            page: None,
            size: Some(500),
        };
        assert!(oversized.page_request().is_err());

        let list = ListParams {
            sort: Some("bogus".to_string()),
            ..ListParams::default()
        };
        assert!(matches!(list.sort(), Err(ContentError::InvalidRequest(_))));
    }
}
