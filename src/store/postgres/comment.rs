use std::collections::HashMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{PgPool, Row, postgres::PgRow};

use crate::domain::{Comment, NewComment};
use crate::store::{CommentDao, CommentQuery, Page, PageRequest};

#[derive(Debug, Clone)]
pub struct PgCommentDao {
    pool: PgPool,
}

impl PgCommentDao {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn comment_from_row(row: &PgRow) -> Result<Comment> {
    Ok(Comment {
        id: row.try_get("id")?,
        content: row.try_get("content")?,
        author_id: row.try_get("author_id")?,
        post_id: row.try_get("post_id")?,
        parent_id: row.try_get("parent_id")?,
        depth: row.try_get("depth")?,
        is_deleted: row.try_get("is_deleted")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn counts_from_rows(rows: &[PgRow]) -> Result<HashMap<i64, i64>> {
    let mut counts = HashMap::with_capacity(rows.len());
    for row in rows {
        let key: i64 = row.try_get("key")?;
        let total: i64 = row.try_get("total")?;
        counts.insert(key, total);
    }
    Ok(counts)
}

#[async_trait]
impl CommentDao for PgCommentDao {
    async fn insert_comment(&self, comment: &NewComment) -> Result<Comment> {
        let row = sqlx::query(
            r"
            INSERT INTO comments (content, author_id, post_id, parent_id, depth)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, content, author_id, post_id, parent_id, depth, is_deleted, created_at, updated_at
            ",
        )
        .bind(&comment.content)
        .bind(comment.author_id)
        .bind(comment.post_id)
        .bind(comment.parent_id)
        .bind(comment.depth)
        .fetch_one(&self.pool)
        .await
        .context("failed to insert comment")?;

        comment_from_row(&row)
    }

    async fn find_active_comment(&self, comment_id: i64) -> Result<Option<Comment>> {
        let row = sqlx::query(
            r"
            SELECT id, content, author_id, post_id, parent_id, depth, is_deleted, created_at, updated_at
            FROM comments
            WHERE id = $1 AND NOT is_deleted
            ",
        )
        .bind(comment_id)
        .fetch_optional(&self.pool)
        .await
        .context("failed to fetch comment")?;

        row.as_ref().map(comment_from_row).transpose()
    }

    async fn update_comment(&self, comment: &Comment) -> Result<()> {
        sqlx::query("UPDATE comments SET content = $2, updated_at = $3 WHERE id = $1")
            .bind(comment.id)
            .bind(&comment.content)
            .bind(comment.updated_at)
            .execute(&self.pool)
            .await
            .context("failed to update comment")?;
        Ok(())
    }

    async fn soft_delete_with_children(&self, comment_id: i64) -> Result<u64> {
        let result = sqlx::query(
            r"
            UPDATE comments
            SET is_deleted = TRUE, updated_at = NOW()
            WHERE (id = $1 OR parent_id = $1) AND NOT is_deleted
            ",
        )
        .bind(comment_id)
        .execute(&self.pool)
        .await
        .context("failed to soft delete comment")?;
        Ok(result.rows_affected())
    }

    async fn count_active_by_post(&self, post_id: i64) -> Result<i64> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS total FROM comments WHERE post_id = $1 AND NOT is_deleted",
        )
        .bind(post_id)
        .fetch_one(&self.pool)
        .await
        .context("failed to count comments by post")?;
        Ok(row.try_get("total")?)
    }

    async fn comment_counts_by_posts(&self, post_ids: &[i64]) -> Result<HashMap<i64, i64>> {
        if post_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows = sqlx::query(
            r"
            SELECT post_id AS key, COUNT(*) AS total
            FROM comments
            WHERE post_id = ANY($1) AND NOT is_deleted
            GROUP BY post_id
            ",
        )
        .bind(post_ids)
        .fetch_all(&self.pool)
        .await
        .context("failed to count comments by posts")?;
        counts_from_rows(&rows)
    }

    async fn children_counts(&self, comment_ids: &[i64]) -> Result<HashMap<i64, i64>> {
        if comment_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows = sqlx::query(
            r"
            SELECT parent_id AS key, COUNT(*) AS total
            FROM comments
            WHERE parent_id = ANY($1) AND NOT is_deleted
            GROUP BY parent_id
            ",
        )
        .bind(comment_ids)
        .fetch_all(&self.pool)
        .await
        .context("failed to count replies")?;
        counts_from_rows(&rows)
    }

    async fn search_comments(
        &self,
        query: &CommentQuery,
        page: PageRequest,
    ) -> Result<Page<Comment>> {
        let total: i64 = query
            .count_builder()
            .build()
            .fetch_one(&self.pool)
            .await
            .context("failed to count comments")?
            .try_get("total")?;

        if total == 0 {
            return Ok(Page::empty(page));
        }

        let rows = query
            .select_builder(page)
            .build()
            .fetch_all(&self.pool)
            .await
            .context("failed to list comments")?;
        let content = rows
            .iter()
            .map(comment_from_row)
            .collect::<Result<Vec<_>>>()?;

        Ok(Page::new(content, page, total))
    }

    async fn replies_to(&self, parent_ids: &[i64], per_parent: u32) -> Result<Vec<Comment>> {
        if parent_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(
            r"
            SELECT id, content, author_id, post_id, parent_id, depth, is_deleted, created_at, updated_at
            FROM (
                SELECT *,
                       ROW_NUMBER() OVER (PARTITION BY parent_id ORDER BY created_at ASC, id ASC) AS reply_rank
                FROM comments
                WHERE parent_id = ANY($1) AND NOT is_deleted
            ) ranked
            WHERE reply_rank <= $2
            ORDER BY parent_id, created_at ASC, id ASC
            ",
        )
        .bind(parent_ids)
        .bind(i64::from(per_parent))
        .fetch_all(&self.pool)
        .await
        .context("failed to list replies")?;

        rows.iter().map(comment_from_row).collect()
    }
}
