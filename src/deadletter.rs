// DeadLetterReplayer: periodically resends activities that could not be delivered
// and purges outbox rows past their retention.

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::clients::ActivityApi;
use crate::domain::{ActivityRequest, DeadLetter, DeadLetterChannel};
use crate::observability::metrics::Metrics;
use crate::publish::{ActivityPublisher, dispatcher::channel_label};
use crate::store::DeadLetterDao;

/// 再送の設定。
#[derive(Debug, Clone)]
pub struct ReplaySettings {
    pub interval: Duration,
    pub batch: u32,
    pub max_attempts: u32,
    /// 編集中のまま放置された行を取り直すまでの猶予
    pub claim_lease: Duration,
    pub outbox_retention: Duration,
    /// http 経路で再送するときの Authorization ヘッダー値
    pub service_token: Option<String>,
}

/// 1 回の再送処理の結果。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayReport {
    pub claimed: usize,
    pub completed: usize,
    pub failed: usize,
    /// 再送はしたが状態を書き戻せなかった件数。リース切れ後に再び取得される。
    pub unsettled: usize,
    pub purged: u64,
}

pub struct DeadLetterReplayer {
    dead_letters: Arc<dyn DeadLetterDao>,
    queue: Arc<dyn ActivityPublisher>,
    http: Arc<dyn ActivityApi>,
    metrics: Arc<Metrics>,
    settings: ReplaySettings,
}

impl DeadLetterReplayer {
    #[must_use]
    pub fn new(
        dead_letters: Arc<dyn DeadLetterDao>,
        queue: Arc<dyn ActivityPublisher>,
        http: Arc<dyn ActivityApi>,
        metrics: Arc<Metrics>,
        settings: ReplaySettings,
    ) -> Self {
        Self {
            dead_letters,
            queue,
            http,
            metrics,
            settings,
        }
    }

    /// Spawn the replay loop. It stops when `cancel_token` is cancelled.
    #[must_use]
    pub fn spawn(self, cancel_token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(cancel_token).await })
    }

    async fn run(self, cancel_token: CancellationToken) {
        info!(
            interval_secs = self.settings.interval.as_secs(),
            batch = self.settings.batch,
            "dead letter replayer started"
        );

        loop {
            tokio::select! {
                () = cancel_token.cancelled() => {
                    info!("dead letter replayer received shutdown signal, stopping");
                    break;
                }
                () = sleep(self.settings.interval) => {
                    match self.tick().await {
                        Ok(report) if report.claimed > 0 || report.purged > 0 => {
                            info!(
                                claimed = report.claimed,
                                completed = report.completed,
                                failed = report.failed,
                                unsettled = report.unsettled,
                                purged = report.purged,
                                "dead letter replay tick finished"
                            );
                        }
                        Ok(_) => debug!("dead letter replay tick had nothing to do"),
                        Err(e) => error!(error = %format!("{e:#}"), "dead letter replay tick failed"),
                    }
                }
            }
        }

        info!("dead letter replayer shutdown complete");
    }

    /// 再送と期限切れアウトボックスの削除を 1 回ずつ行う。
    ///
    /// # Errors
    /// 取得に失敗した場合。個々の再送失敗と状態更新の失敗はエラーにしない。
    pub async fn tick(&self) -> Result<ReplayReport> {
        let mut report = self.replay_once().await?;

        match self
            .queue
            .purge_expired(self.settings.outbox_retention)
            .await
        {
            Ok(purged) => {
                report.purged = purged;
                self.metrics.outbox_purged.inc_by(purged);
            }
            Err(e) => warn!(error = %format!("{e:#}"), "outbox purge failed"),
        }

        Ok(report)
    }

    /// # Errors
    /// デッドレターの取得に失敗した場合。
    pub async fn replay_once(&self) -> Result<ReplayReport> {
        let claimed = self
            .dead_letters
            .claim_pending(
                self.settings.batch,
                self.settings.max_attempts,
                self.settings.claim_lease,
            )
            .await
            .context("failed to claim dead letters")?;

        let mut report = ReplayReport {
            claimed: claimed.len(),
            ..ReplayReport::default()
        };

        for letter in claimed {
            match self.resend(&letter).await {
                Ok(()) => match self.dead_letters.mark_completed(letter.id).await {
                    Ok(()) => {
                        self.metrics.dead_letters_replayed.inc();
                        report.completed += 1;
                        debug!(dead_letter_id = %letter.id, message_key = %letter.message_key, "dead letter replayed");
                    }
                    Err(e) => {
                        report.unsettled += 1;
                        error!(
                            dead_letter_id = %letter.id,
                            error = %format!("{e:#}"),
                            "dead letter resent but could not be marked completed"
                        );
                    }
                },
                Err(e) => {
                    let message = format!("{e:#}");
                    self.metrics.dead_letters_replay_failed.inc();
                    warn!(
                        dead_letter_id = %letter.id,
                        channel = channel_label(letter.channel),
                        attempts = letter.attempts + 1,
                        error = %message,
                        "dead letter replay failed"
                    );
                    if let Err(e) = self.dead_letters.release(letter.id, &message).await {
                        report.unsettled += 1;
                        error!(
                            dead_letter_id = %letter.id,
                            error = %format!("{e:#}"),
                            "failed to release dead letter"
                        );
                    } else {
                        report.failed += 1;
                    }
                }
            }
        }

        Ok(report)
    }

    async fn resend(&self, letter: &DeadLetter) -> Result<()> {
        let request: ActivityRequest = serde_json::from_str(&letter.payload)
            .context("dead letter payload is not an activity request")?;
        match letter.channel {
            DeadLetterChannel::Queue => self.queue.publish(&request).await?,
            DeadLetterChannel::Http => {
                self.http
                    .send(&request, self.settings.service_token.as_deref())
                    .await?;
            }
        }
        Ok(())
    }
}
