use std::{sync::Arc, time::Instant};

use tracing::{error, info, warn};

use super::{ActivityPublisher, PublishError, PublishType};
use crate::clients::{ActivityApi, RemoteError};
use crate::domain::{ActivityRequest, DeadLetterChannel};
use crate::error::ContentError;
use crate::mapper;
use crate::observability::metrics::Metrics;
use crate::store::DeadLetterDao;

/// 会員アクティビティを設定された経路で配信する。
///
/// 配信に失敗した要求はデッドレターとして保存し、コンテンツ操作自体は成功させる。
/// スロットリング（429）とメッセージキー生成失敗だけは呼び出し元へ返す。
#[derive(Clone)]
pub struct ActivityDispatcher {
    publish_type: PublishType,
    queue: Arc<dyn ActivityPublisher>,
    http: Arc<dyn ActivityApi>,
    dead_letters: Arc<dyn DeadLetterDao>,
    metrics: Arc<Metrics>,
}

impl ActivityDispatcher {
    #[must_use]
    pub fn new(
        publish_type: PublishType,
        queue: Arc<dyn ActivityPublisher>,
        http: Arc<dyn ActivityApi>,
        dead_letters: Arc<dyn DeadLetterDao>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            publish_type,
            queue,
            http,
            dead_letters,
            metrics,
        }
    }

    #[must_use]
    pub fn publish_type(&self) -> PublishType {
        self.publish_type
    }

    /// # Errors
    /// - `TooManyRequests`: 配信先がスロットリング中
    /// - `MessageKeyCreation`: キューのメッセージキーを作れない
    /// - `ActivityQueueUnavailable` / `RemoteCallFailed`: 配信にもデッドレター保存にも失敗
    pub async fn dispatch(
        &self,
        request: ActivityRequest,
        token: Option<&str>,
    ) -> Result<(), ContentError> {
        let started = Instant::now();
        let result = match self.publish_type {
            PublishType::Queue => self.dispatch_queue(&request).await,
            PublishType::Http => self.dispatch_http(&request, token).await,
        };
        self.metrics
            .activity_dispatch_duration
            .observe(started.elapsed().as_secs_f64());
        result
    }

    async fn dispatch_queue(&self, request: &ActivityRequest) -> Result<(), ContentError> {
        match self.queue.publish(request).await {
            Ok(()) => {
                self.metrics
                    .activities_published
                    .with_label_values(&["queue"])
                    .inc();
                Ok(())
            }
            Err(PublishError::KeyCreation(message)) => {
                error!(%message, category = %request.category(), "activity message key creation failed");
                Err(ContentError::MessageKeyCreation(message))
            }
            Err(PublishError::TooManyRequests) => Err(ContentError::TooManyRequests("activity-queue")),
            Err(PublishError::Unavailable(source)) => {
                warn!(error = %source, category = %request.category(), "activity publish failed, storing dead letter");
                self.store_dead_letter(DeadLetterChannel::Queue, request)
                    .await
                    .map_err(|dead_letter_error| {
                        error!(
                            error = %dead_letter_error,
                            "failed to store queue dead letter"
                        );
                        ContentError::ActivityQueueUnavailable(format!("{source:#}"))
                    })
            }
        }
    }

    async fn dispatch_http(
        &self,
        request: &ActivityRequest,
        token: Option<&str>,
    ) -> Result<(), ContentError> {
        match self.http.send(request, token).await {
            Ok(()) => {
                self.metrics
                    .activities_published
                    .with_label_values(&["http"])
                    .inc();
                Ok(())
            }
            Err(RemoteError::TooManyRequests(service)) => Err(ContentError::TooManyRequests(service)),
            Err(remote_error) => {
                warn!(error = %remote_error, category = %request.category(), "activity http call failed, storing dead letter");
                self.store_dead_letter(DeadLetterChannel::Http, request)
                    .await
                    .map_err(|dead_letter_error| {
                        error!(
                            error = %dead_letter_error,
                            "failed to store http dead letter"
                        );
                        ContentError::RemoteCallFailed {
                            service: "member-activity",
                            message: remote_error.to_string(),
                        }
                    })
            }
        }
    }

    async fn store_dead_letter(
        &self,
        channel: DeadLetterChannel,
        request: &ActivityRequest,
    ) -> anyhow::Result<()> {
        let letter = mapper::activity::dead_letter_from(channel, request)?;
        self.dead_letters.insert(&letter).await?;
        self.metrics
            .activities_dead_lettered
            .with_label_values(&[channel_label(channel)])
            .inc();
        info!(
            dead_letter_id = %letter.id,
            message_key = %letter.message_key,
            channel = channel_label(channel),
            "activity stored as dead letter"
        );
        Ok(())
    }
}

pub(crate) fn channel_label(channel: DeadLetterChannel) -> &'static str {
    match channel {
        DeadLetterChannel::Queue => "queue",
        DeadLetterChannel::Http => "http",
    }
}
