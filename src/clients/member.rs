//! member サービスから会員プロフィールの要約を取得するクライアント。

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Url};

use super::{HttpClientConfig, MemberApi, RemoteError, build_client, get_enveloped, parse_base_url};
use crate::domain::MemberSummary;
use crate::util::retry::RetryConfig;

const SERVICE: &str = "member";

#[derive(Debug, Clone)]
pub struct MemberClient {
    client: Client,
    base_url: Url,
    retry: RetryConfig,
}

impl MemberClient {
    /// # Errors
    /// URL のパースまたは HTTP クライアントの構築に失敗した場合。
    pub fn new(base_url: &str, config: &HttpClientConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(config, SERVICE)?,
            base_url: parse_base_url(base_url, SERVICE)?,
            retry: config.retry,
        })
    }

    fn summary_url(&self, member_id: i64) -> Result<Url> {
        self.base_url
            .join(&format!("api/members/{member_id}/summary"))
            .context("failed to build member summary URL")
    }
}

#[async_trait]
impl MemberApi for MemberClient {
    async fn member_summary(
        &self,
        member_id: i64,
        token: Option<&str>,
    ) -> Result<MemberSummary, RemoteError> {
        let url = self
            .summary_url(member_id)
            .map_err(|source| RemoteError::Failed {
                service: SERVICE,
                source,
            })?;
        get_enveloped(&self.client, url, token, SERVICE, self.retry).await
    }
}
