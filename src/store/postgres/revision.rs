use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use sqlx::{PgPool, types::Json};
use uuid::Uuid;

use crate::domain::{Comment, CommentDocument, Post, PostDocument};
use crate::store::RevisionDao;

/// 行とドキュメントを同じトランザクションで書き換える。
#[derive(Debug, Clone)]
pub struct PgRevisionDao {
    pool: PgPool,
}

impl PgRevisionDao {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RevisionDao for PgRevisionDao {
    async fn revise_post(
        &self,
        post: &Post,
        superseded: &PostDocument,
        next: &PostDocument,
    ) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("failed to begin transaction")?;

        let updated = sqlx::query(
            r"
            UPDATE posts
            SET title = $2, content = $3, updated_at = $4
            WHERE id = $1 AND NOT is_deleted
            ",
        )
        .bind(post.id)
        .bind(&post.title)
        .bind(&post.content)
        .bind(post.updated_at)
        .execute(&mut *tx)
        .await
        .context("failed to update post")?;
        if updated.rows_affected() == 0 {
            bail!("post {} does not exist", post.id);
        }

        let superseded_rows = sqlx::query("UPDATE post_documents SET body = $2 WHERE id = $1")
            .bind(superseded.id)
            .bind(Json(superseded))
            .execute(&mut *tx)
            .await
            .context("failed to supersede post document")?;
        if superseded_rows.rows_affected() == 0 {
            bail!("post document {} does not exist", superseded.id);
        }

        sqlx::query("INSERT INTO post_documents (id, body) VALUES ($1, $2)")
            .bind(next.id)
            .bind(Json(next))
            .execute(&mut *tx)
            .await
            .context("failed to insert post document version")?;

        tx.commit()
            .await
            .context("failed to commit post revision")?;
        Ok(())
    }

    async fn revise_comment(
        &self,
        comment: &Comment,
        replaced: Uuid,
        mirror: &CommentDocument,
    ) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("failed to begin transaction")?;

        let updated = sqlx::query(
            "UPDATE comments SET content = $2, updated_at = $3 WHERE id = $1 AND NOT is_deleted",
        )
        .bind(comment.id)
        .bind(&comment.content)
        .bind(comment.updated_at)
        .execute(&mut *tx)
        .await
        .context("failed to update comment")?;
        if updated.rows_affected() == 0 {
            bail!("comment {} does not exist", comment.id);
        }

        sqlx::query("DELETE FROM comment_documents WHERE id = $1")
            .bind(replaced)
            .execute(&mut *tx)
            .await
            .context("failed to delete comment document")?;

        sqlx::query("INSERT INTO comment_documents (id, body) VALUES ($1, $2)")
            .bind(mirror.id)
            .bind(Json(mirror))
            .execute(&mut *tx)
            .await
            .context("failed to insert comment document")?;

        tx.commit()
            .await
            .context("failed to commit comment revision")?;
        Ok(())
    }
}
