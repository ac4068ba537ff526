//! 兄弟サービス（member / timeline / member-activity）への HTTP クライアント。

pub mod activity;
pub(crate) mod headers;
pub mod member;
pub mod timeline;

use std::{sync::Arc, time::Duration};

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::Config;
use crate::domain::{ActivityRequest, MemberSummary, PostItemCounts, ServerResponse};
use crate::util::retry::{RetryConfig, is_retryable_error, is_retryable_status};

pub use activity::ActivityClient;
pub use member::MemberClient;
pub use timeline::TimelineClient;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("{service} has no such resource")]
    NotFound { service: &'static str },
    #[error("{0} is throttling requests")]
    TooManyRequests(&'static str),
    #[error("{service} request failed: {source:#}")]
    Failed {
        service: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

#[async_trait]
pub trait MemberApi: Send + Sync {
    async fn member_summary(
        &self,
        member_id: i64,
        token: Option<&str>,
    ) -> Result<MemberSummary, RemoteError>;
}

#[async_trait]
pub trait TimelineApi: Send + Sync {
    async fn post_item_counts(
        &self,
        post_id: i64,
        token: Option<&str>,
    ) -> Result<PostItemCounts, RemoteError>;
}

#[async_trait]
pub trait ActivityApi: Send + Sync {
    async fn send(&self, request: &ActivityRequest, token: Option<&str>)
    -> Result<(), RemoteError>;
}

/// サービスが使うリモート呼び出し一式。
#[derive(Clone)]
pub struct RemoteClients {
    pub members: Arc<dyn MemberApi>,
    pub timeline: Arc<dyn TimelineApi>,
    pub activity: Arc<dyn ActivityApi>,
}

impl RemoteClients {
    /// 設定値から HTTP クライアントを構築する。
    ///
    /// # Errors
    /// ベース URL のパースまたはクライアント構築に失敗した場合。
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let http = HttpClientConfig {
            connect_timeout: config.remote_connect_timeout(),
            total_timeout: config.remote_total_timeout(),
            retry: RetryConfig::new(
                config.http_max_retries().max(1),
                config.http_backoff_base_ms(),
                config.http_backoff_cap_ms(),
            ),
        };
        Ok(Self {
            members: Arc::new(MemberClient::new(config.member_service_base_url(), &http)?),
            timeline: Arc::new(TimelineClient::new(
                config.timeline_service_base_url(),
                &http,
            )?),
            activity: Arc::new(ActivityClient::new(
                config.activity_service_base_url(),
                &http,
            )?),
        })
    }
}

/// 各クライアント共通の接続設定。
#[derive(Debug, Clone, Copy)]
pub struct HttpClientConfig {
    pub connect_timeout: Duration,
    pub total_timeout: Duration,
    pub(crate) retry: RetryConfig,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(3),
            total_timeout: Duration::from_secs(10),
            retry: RetryConfig::default(),
        }
    }
}

pub(crate) fn build_client(config: &HttpClientConfig, service: &str) -> anyhow::Result<Client> {
    Client::builder()
        .connect_timeout(config.connect_timeout)
        .timeout(config.total_timeout)
        .build()
        .with_context(|| format!("failed to build {service} HTTP client"))
}

pub(crate) fn parse_base_url(raw: &str, service: &str) -> anyhow::Result<Url> {
    // join で末尾セグメントが落ちないよう、必ず '/' で終わらせる。
    let normalized = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{raw}/")
    };
    Url::parse(&normalized).with_context(|| format!("invalid {service} base URL: {raw}"))
}

/// 再試行付き GET。封筒 `ServerResponse<T>` の `data` を返す。
pub(crate) async fn get_enveloped<T: DeserializeOwned>(
    client: &Client,
    url: Url,
    token: Option<&str>,
    service: &'static str,
    retry: RetryConfig,
) -> Result<T, RemoteError> {
    let mut attempt = 0;

    loop {
        let mut request = client.get(url.clone());
        if let Some(token) = token {
            request = request.header(reqwest::header::AUTHORIZATION, token);
        }

        let (retryable, error) = match request.send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    return response
                        .json::<ServerResponse<T>>()
                        .await
                        .map(|envelope| envelope.data)
                        .map_err(|error| RemoteError::Failed {
                            service,
                            source: anyhow::Error::new(error)
                                .context("failed to deserialize response envelope"),
                        });
                }
                if status == StatusCode::NOT_FOUND {
                    return Err(RemoteError::NotFound { service });
                }
                if status == StatusCode::TOO_MANY_REQUESTS {
                    return Err(RemoteError::TooManyRequests(service));
                }
                let body = response.text().await.unwrap_or_default();
                (
                    is_retryable_status(status),
                    anyhow!("{service} returned error status {status}: {body}"),
                )
            }
            Err(error) => (is_retryable_error(&error), anyhow::Error::new(error)),
        };

        attempt += 1;
        if !retryable || !retry.can_retry(attempt) {
            warn!(service, attempt, error = %error, "remote request failed");
            return Err(RemoteError::Failed {
                service,
                source: error,
            });
        }

        let delay = retry.delay_for_attempt(attempt);
        debug!(
            service,
            attempt,
            delay_ms = delay.as_millis(),
            "remote request failed, retrying after delay"
        );
        tokio::time::sleep(delay).await;
    }
}
