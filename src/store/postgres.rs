//! Postgres 実装。リレーショナルモデルは通常のテーブル、ドキュメントモデルは
//! `(id UUID, body JSONB)` 形式のコレクションテーブルに保存する。

mod collection;
mod comment;
mod dead_letter;
mod documents;
mod likes;
mod outbox;
mod post;
mod revision;

use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::{Executor, PgPool};

use super::{
    CommentDao, CommentDocumentDao, DeadLetterDao, LikeDao, PostDao, PostDocumentDao, RevisionDao,
    Stores,
};
use crate::publish::{ActivityPublisher, TopicNaming};

pub use collection::JsonCollection;
pub use comment::PgCommentDao;
pub use dead_letter::PgDeadLetterDao;
pub use documents::{PgCommentDocumentDao, PgPostDocumentDao};
pub use likes::PgLikeDao;
pub use outbox::PgOutboxPublisher;
pub use post::PgPostDao;
pub use revision::PgRevisionDao;

const SCHEMA: &str = include_str!("../../migrations/0001_content_schema.sql");

/// スキーマを作成する。各文は `IF NOT EXISTS` なので何度実行してもよい。
///
/// # Errors
/// DDL の実行に失敗した場合。
pub async fn migrate(pool: &PgPool) -> Result<()> {
    pool.execute(SCHEMA)
        .await
        .context("failed to apply content schema")?;
    Ok(())
}

/// 接続確認。readiness プローブから呼ばれる。
///
/// # Errors
/// データベースに到達できない場合。
pub async fn ping(pool: &PgPool) -> Result<()> {
    sqlx::query("SELECT 1")
        .execute(pool)
        .await
        .context("database ping failed")?;
    Ok(())
}

impl Stores {
    #[must_use]
    pub fn postgres(pool: &PgPool, topics: TopicNaming) -> Self {
        Self {
            posts: Arc::new(PgPostDao::new(pool.clone())) as Arc<dyn PostDao>,
            comments: Arc::new(PgCommentDao::new(pool.clone())) as Arc<dyn CommentDao>,
            post_documents: Arc::new(PgPostDocumentDao::new(pool.clone()))
                as Arc<dyn PostDocumentDao>,
            comment_documents: Arc::new(PgCommentDocumentDao::new(pool.clone()))
                as Arc<dyn CommentDocumentDao>,
            revisions: Arc::new(PgRevisionDao::new(pool.clone())) as Arc<dyn RevisionDao>,
            likes: Arc::new(PgLikeDao::new(pool.clone())) as Arc<dyn LikeDao>,
            dead_letters: Arc::new(PgDeadLetterDao::new(pool.clone())) as Arc<dyn DeadLetterDao>,
            outbox: Arc::new(PgOutboxPublisher::new(pool.clone(), topics))
                as Arc<dyn ActivityPublisher>,
        }
    }
}
