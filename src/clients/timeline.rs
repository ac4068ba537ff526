//! timeline サービスから投稿のリアクション件数を取得するクライアント。

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Url};

use super::{
    HttpClientConfig, RemoteError, TimelineApi, build_client, get_enveloped, parse_base_url,
};
use crate::domain::PostItemCounts;
use crate::util::retry::RetryConfig;

const SERVICE: &str = "timeline";

#[derive(Debug, Clone)]
pub struct TimelineClient {
    client: Client,
    base_url: Url,
    retry: RetryConfig,
}

impl TimelineClient {
    /// # Errors
    /// URL のパースまたは HTTP クライアントの構築に失敗した場合。
    pub fn new(base_url: &str, config: &HttpClientConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(config, SERVICE)?,
            base_url: parse_base_url(base_url, SERVICE)?,
            retry: config.retry,
        })
    }
}

#[async_trait]
impl TimelineApi for TimelineClient {
    async fn post_item_counts(
        &self,
        post_id: i64,
        token: Option<&str>,
    ) -> Result<PostItemCounts, RemoteError> {
        let url = self
            .base_url
            .join(&format!("api/timeline/posts/{post_id}/counts"))
            .context("failed to build timeline counts URL")
            .map_err(|source| RemoteError::Failed {
                service: SERVICE,
                source,
            })?;
        get_enveloped(&self.client, url, token, SERVICE, self.retry).await
    }
}
