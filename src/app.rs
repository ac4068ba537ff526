pub mod server;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use sqlx::{PgPool, postgres::PgPoolOptions};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::{
    api,
    clients::RemoteClients,
    config::{Config, StoreBackend},
    deadletter::{DeadLetterReplayer, ReplaySettings},
    observability::Telemetry,
    publish::{ActivityDispatcher, PublishType, TopicNaming},
    service::{CommentService, PostService},
    store::{Stores, memory::MemoryStore, postgres},
};

#[derive(Clone)]
pub(crate) struct AppState {
    registry: Arc<ComponentRegistry>,
}

impl AppState {
    pub(crate) fn new(registry: ComponentRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }

    pub(crate) fn telemetry(&self) -> &Telemetry {
        &self.registry.telemetry
    }

    pub(crate) fn posts(&self) -> &PostService {
        &self.registry.posts
    }

    pub(crate) fn comments(&self) -> &CommentService {
        &self.registry.comments
    }

    pub(crate) async fn ping_store(&self) -> Result<()> {
        match &self.registry.pool {
            Some(pool) => postgres::ping(pool).await,
            None => Ok(()),
        }
    }
}

/// サービス単位の振る舞いの設定。
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub post_publish_type: PublishType,
    pub comment_publish_type: PublishType,
    pub max_comment_depth: i32,
    /// `None` なら再送タスクを起動しない
    pub replay: Option<ReplaySettings>,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            post_publish_type: PublishType::Queue,
            comment_publish_type: PublishType::Queue,
            max_comment_depth: 3,
            replay: None,
        }
    }
}

impl ServiceSettings {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let replay = config
            .dead_letter_replay_enabled()
            .then(|| ReplaySettings {
                interval: config.dead_letter_replay_interval(),
                batch: config.dead_letter_replay_batch(),
                max_attempts: config.dead_letter_max_attempts(),
                claim_lease: config.dead_letter_replay_interval() * 2,
                outbox_retention: config.activity_topic_retention(),
                service_token: config.activity_service_token().map(str::to_string),
            });
        Self {
            post_publish_type: config.post_publish_type(),
            comment_publish_type: config.comment_publish_type(),
            max_comment_depth: config.max_comment_depth(),
            replay,
        }
    }
}

pub struct ComponentRegistry {
    telemetry: Telemetry,
    stores: Stores,
    remotes: RemoteClients,
    posts: PostService,
    comments: CommentService,
    replay: Option<ReplaySettings>,
    pool: Option<PgPool>,
}

impl ComponentRegistry {
    /// 構成情報からストアとクライアントを初期化し、アプリケーションの共有レジストリを構築する。
    ///
    /// # Errors
    /// Telemetry の初期化、接続プールの構成、マイグレーション、HTTP クライアント構築のいずれかが失敗した場合。
    pub async fn build(config: Config) -> Result<Self> {
        let telemetry = Telemetry::new()?;
        let remotes = RemoteClients::from_config(&config)?;
        let topics = TopicNaming::new(
            config.activity_topic_prefix(),
            config.activity_topic_date_format(),
        );

        let (stores, pool) = match config.store_backend() {
            StoreBackend::Postgres => {
                let dsn = config
                    .db_dsn()
                    .context("CONTENT_DB_DSN is required for the postgres backend")?;
                let pool = PgPoolOptions::new()
                    .max_connections(config.db_max_connections())
                    .min_connections(config.db_min_connections())
                    .acquire_timeout(config.db_acquire_timeout())
                    .idle_timeout(Some(config.db_idle_timeout()))
                    .max_lifetime(Some(config.db_max_lifetime()))
                    .test_before_acquire(true)
                    .connect_lazy(dsn)
                    .context("failed to configure content_db connection pool")?;
                if config.db_run_migrations() {
                    postgres::migrate(&pool).await?;
                    info!("content schema migrated");
                }
                (Stores::postgres(&pool, topics), Some(pool))
            }
            StoreBackend::Memory => {
                info!("using in-memory content store");
                (Stores::memory(&Arc::new(MemoryStore::new(topics))), None)
            }
        };

        Ok(Self::assemble(
            telemetry,
            stores,
            remotes,
            ServiceSettings::from_config(&config),
            pool,
        ))
    }

    /// 構築済みの部品からレジストリを組み立てる。
    #[must_use]
    pub fn assemble(
        telemetry: Telemetry,
        stores: Stores,
        remotes: RemoteClients,
        settings: ServiceSettings,
        pool: Option<PgPool>,
    ) -> Self {
        let metrics = telemetry.metrics_arc();
        let dispatcher = |publish_type| {
            ActivityDispatcher::new(
                publish_type,
                Arc::clone(&stores.outbox),
                Arc::clone(&remotes.activity),
                Arc::clone(&stores.dead_letters),
                Arc::clone(&metrics),
            )
        };
        let posts = PostService::new(
            stores.clone(),
            remotes.clone(),
            dispatcher(settings.post_publish_type),
            Arc::clone(&metrics),
        );
        let comments = CommentService::new(
            stores.clone(),
            remotes.clone(),
            dispatcher(settings.comment_publish_type),
            Arc::clone(&metrics),
            settings.max_comment_depth,
        );

        Self {
            telemetry,
            stores,
            remotes,
            posts,
            comments,
            replay: settings.replay,
            pool,
        }
    }

    #[must_use]
    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }

    /// 再送タスクを起動する。無効化されていれば `None`。
    #[must_use]
    pub fn spawn_replayer(&self, cancel_token: CancellationToken) -> Option<JoinHandle<()>> {
        let settings = self.replay.clone()?;
        let replayer = DeadLetterReplayer::new(
            Arc::clone(&self.stores.dead_letters),
            Arc::clone(&self.stores.outbox),
            Arc::clone(&self.remotes.activity),
            self.telemetry.metrics_arc(),
            settings,
        );
        Some(replayer.spawn(cancel_token))
    }
}

pub fn build_router(registry: ComponentRegistry) -> Router {
    let state = AppState::new(registry);
    api::router(state)
}
