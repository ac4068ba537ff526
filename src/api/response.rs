use axum::{
    Json,
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::domain::{ResponseResult, ServerResponse};
use crate::error::ContentError;

/// 失敗時のレスポンス封筒。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub status: u16,
    pub result: ResponseResult,
    pub reason: String,
    pub message: String,
    pub path: String,
}

/// レンダリング済みのエラー。パスはミドルウェアで埋める。
#[derive(Debug, Clone)]
struct PendingError {
    status: StatusCode,
    reason: &'static str,
    message: String,
}

impl PendingError {
    fn render(&self, path: &str) -> Response {
        let body = ErrorResponse {
            status: self.status.as_u16(),
            result: ResponseResult::Fail,
            reason: self.reason.to_string(),
            message: self.message.clone(),
            path: path.to_string(),
        };
        (self.status, Json(body)).into_response()
    }
}

impl IntoResponse for ContentError {
    fn into_response(self) -> Response {
        let status = self.status();
        if self.is_server_error() {
            error!(reason = self.reason(), error = %self, "request failed");
        } else {
            warn!(reason = self.reason(), error = %self, "request rejected");
        }

        // 5xx の詳細は外に出さない
        let message = if self.is_server_error() {
            status
                .canonical_reason()
                .unwrap_or("Internal Server Error")
                .to_string()
        } else {
            self.to_string()
        };
        let pending = PendingError {
            status,
            reason: self.reason(),
            message,
        };
        let mut response = pending.render("");
        response.extensions_mut().insert(pending);
        response
    }
}

/// ハンドラが返したエラーにリクエストパスを付ける。
pub(crate) async fn attach_error_path(request: Request, next: Next) -> Response {
    let path = request.uri().path().to_string();
    let response = next.run(request).await;
    match response.extensions().get::<PendingError>() {
        Some(pending) => pending.render(&path),
        None => response,
    }
}

pub(crate) fn success<T: Serialize>(
    status: StatusCode,
    data: T,
) -> (StatusCode, Json<ServerResponse<T>>) {
    (status, Json(ServerResponse::success(status.as_u16(), data)))
}

/// HTTP ステータスは 200 のまま、封筒にだけ `status` を載せる。
pub(crate) fn enveloped<T: Serialize>(
    status: StatusCode,
    data: T,
) -> (StatusCode, Json<ServerResponse<T>>) {
    (
        StatusCode::OK,
        Json(ServerResponse::success(status.as_u16(), data)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_keep_their_message() {
        let response = ContentError::PostNotFound(4).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let pending = response.extensions().get::<PendingError>().unwrap();
        assert_eq!(pending.reason, "POST_NOT_FOUND");
        assert_eq!(pending.message, "post 4 not found");
    }

    #[test]
    fn server_errors_hide_details() {
        let response = ContentError::Storage(anyhow::anyhow!("password=secret")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let pending = response.extensions().get::<PendingError>().unwrap();
        assert_eq!(pending.message, "Internal Server Error");
    }
}
