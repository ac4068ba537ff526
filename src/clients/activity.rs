//! member-activity サービスへアクティビティを送るクライアント。
//!
//! 送信は再試行しない。失敗はディスパッチャがデッドレターとして保存する。

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use tracing::debug;

use super::{ActivityApi, HttpClientConfig, RemoteError, build_client, headers, parse_base_url};
use crate::domain::ActivityRequest;
use crate::publish::message_key;

const SERVICE: &str = "member-activity";

#[derive(Debug, Clone)]
pub struct ActivityClient {
    client: Client,
    base_url: Url,
}

impl ActivityClient {
    /// # Errors
    /// URL のパースまたは HTTP クライアントの構築に失敗した場合。
    pub fn new(base_url: &str, config: &HttpClientConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(config, SERVICE)?,
            base_url: parse_base_url(base_url, SERVICE)?,
        })
    }

    fn endpoint(&self, request: &ActivityRequest) -> Result<Url> {
        let segment = match request {
            ActivityRequest::Post { .. } => "api/member-activities/posts",
            ActivityRequest::Comment { .. } => "api/member-activities/comments",
            ActivityRequest::PostLike { .. } => "api/member-activities/posts/likes",
            ActivityRequest::CommentLike { .. } => "api/member-activities/comments/likes",
        };
        self.base_url
            .join(segment)
            .context("failed to build member-activity URL")
    }
}

#[async_trait]
impl ActivityApi for ActivityClient {
    async fn send(
        &self,
        request: &ActivityRequest,
        token: Option<&str>,
    ) -> Result<(), RemoteError> {
        let failed = |source: anyhow::Error| RemoteError::Failed {
            service: SERVICE,
            source,
        };
        let url = self.endpoint(request).map_err(failed)?;
        let key = message_key(request).map_err(|error| failed(anyhow::Error::new(error)))?;

        let response = self
            .client
            .post(url)
            .headers(headers::activity_headers(token, &key))
            .json(request)
            .send()
            .await
            .context("member-activity request failed")
            .map_err(failed)?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(RemoteError::TooManyRequests(SERVICE));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(failed(anyhow!(
                "member-activity returned error status {status}: {body}"
            )));
        }

        debug!(message_key = %key, "activity delivered over http");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MemberActivityType;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn like_request() -> ActivityRequest {
        ActivityRequest::CommentLike {
            member_id: 2,
            post_id: 3,
            comment_id: 4,
            activity_type: MemberActivityType::LikeComment,
        }
    }

    #[tokio::test]
    async fn send_posts_to_category_endpoint_with_idempotency_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/member-activities/comments/likes"))
            .and(header("idempotency-key", "comment_like:2:3:4:LIKE_COMMENT"))
            .and(body_partial_json(serde_json::json!({
                "category": "comment_like",
                "member_id": 2,
                "activity_type": "LIKE_COMMENT"
            })))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let client = ActivityClient::new(&server.uri(), &HttpClientConfig::default())
            .expect("client");
        client
            .send(&like_request(), Some("Bearer t"))
            .await
            .expect("delivered");
    }

    #[tokio::test]
    async fn send_maps_429_to_too_many_requests() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let client = ActivityClient::new(&server.uri(), &HttpClientConfig::default())
            .expect("client");
        let error = client.send(&like_request(), None).await.expect_err("429");
        assert!(matches!(error, RemoteError::TooManyRequests(_)));
    }

    #[tokio::test]
    async fn send_reports_server_errors_without_retrying() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let client = ActivityClient::new(&server.uri(), &HttpClientConfig::default())
            .expect("client");
        let error = client.send(&like_request(), None).await.expect_err("500");
        assert!(matches!(error, RemoteError::Failed { .. }));
    }
}
