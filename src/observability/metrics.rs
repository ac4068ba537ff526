//! Prometheusメトリクス定義。

use prometheus::{
    Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry,
    register_histogram_with_registry, register_int_counter_vec_with_registry,
    register_int_counter_with_registry,
};
use std::sync::Arc;

/// メトリクスコレクター。
#[derive(Debug, Clone)]
pub struct Metrics {
    // カウンター
    pub posts_created: IntCounter,
    pub posts_updated: IntCounter,
    pub posts_deleted: IntCounter,
    pub comments_created: IntCounter,
    pub comments_updated: IntCounter,
    pub comments_deleted: IntCounter,
    /// target = post | comment, action = like | unlike
    pub likes: IntCounterVec,
    /// channel = queue | http
    pub activities_published: IntCounterVec,
    pub activities_dead_lettered: IntCounterVec,
    pub dead_letters_replayed: IntCounter,
    pub dead_letters_replay_failed: IntCounter,
    pub outbox_purged: IntCounter,

    // ヒストグラム
    pub activity_dispatch_duration: Histogram,
}

impl Metrics {
    /// 新しいメトリクスコレクターを作成する。
    ///
    /// # Errors
    /// 同名のメトリクスが既にレジストリにある場合。
    pub fn new(registry: Arc<Registry>) -> Result<Self, prometheus::Error> {
        Ok(Self {
            posts_created: register_int_counter_with_registry!(
                "content_posts_created_total",
                "Total number of posts created",
                registry
            )?,
            posts_updated: register_int_counter_with_registry!(
                "content_posts_updated_total",
                "Total number of posts updated",
                registry
            )?,
            posts_deleted: register_int_counter_with_registry!(
                "content_posts_deleted_total",
                "Total number of posts deleted",
                registry
            )?,
            comments_created: register_int_counter_with_registry!(
                "content_comments_created_total",
                "Total number of comments and replies created",
                registry
            )?,
            comments_updated: register_int_counter_with_registry!(
                "content_comments_updated_total",
                "Total number of comments updated",
                registry
            )?,
            comments_deleted: register_int_counter_with_registry!(
                "content_comments_deleted_total",
                "Total number of comments deleted",
                registry
            )?,
            likes: register_int_counter_vec_with_registry!(
                Opts::new("content_likes_total", "Like and unlike operations"),
                &["target", "action"],
                registry
            )?,
            activities_published: register_int_counter_vec_with_registry!(
                Opts::new(
                    "content_activities_published_total",
                    "Member activities delivered"
                ),
                &["channel"],
                registry
            )?,
            activities_dead_lettered: register_int_counter_vec_with_registry!(
                Opts::new(
                    "content_activities_dead_lettered_total",
                    "Member activities stored as dead letters"
                ),
                &["channel"],
                registry
            )?,
            dead_letters_replayed: register_int_counter_with_registry!(
                "content_dead_letters_replayed_total",
                "Dead letters delivered on replay",
                registry
            )?,
            dead_letters_replay_failed: register_int_counter_with_registry!(
                "content_dead_letters_replay_failed_total",
                "Dead letter replay attempts that failed",
                registry
            )?,
            outbox_purged: register_int_counter_with_registry!(
                "content_outbox_purged_total",
                "Outbox events removed after retention",
                registry
            )?,
            activity_dispatch_duration: register_histogram_with_registry!(
                HistogramOpts::new(
                    "content_activity_dispatch_duration_seconds",
                    "Time spent dispatching a member activity"
                )
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
                registry
            )?,
        })
    }

    /// 独立したレジストリ上のメトリクス。テストや単体利用向け。
    ///
    /// # Errors
    /// 登録に失敗した場合。
    pub fn detached() -> Result<Self, prometheus::Error> {
        Self::new(Arc::new(Registry::new()))
    }
}
