use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{PgPool, Row, postgres::PgRow};

use crate::domain::{NewPost, Post};
use crate::store::{Page, PostDao, PostQuery};

#[derive(Debug, Clone)]
pub struct PgPostDao {
    pool: PgPool,
}

impl PgPostDao {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn post_from_row(row: &PgRow) -> Result<Post> {
    Ok(Post {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        content: row.try_get("content")?,
        author_id: row.try_get("author_id")?,
        view_count: row.try_get("view_count")?,
        is_deleted: row.try_get("is_deleted")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl PostDao for PgPostDao {
    async fn insert_post(&self, post: &NewPost) -> Result<Post> {
        let row = sqlx::query(
            r"
            INSERT INTO posts (title, content, author_id)
            VALUES ($1, $2, $3)
            RETURNING id, title, content, author_id, view_count, is_deleted, created_at, updated_at
            ",
        )
        .bind(&post.title)
        .bind(&post.content)
        .bind(post.author_id)
        .fetch_one(&self.pool)
        .await
        .context("failed to insert post")?;

        post_from_row(&row)
    }

    async fn find_active_post(&self, post_id: i64) -> Result<Option<Post>> {
        let row = sqlx::query(
            r"
            SELECT id, title, content, author_id, view_count, is_deleted, created_at, updated_at
            FROM posts
            WHERE id = $1 AND NOT is_deleted
            ",
        )
        .bind(post_id)
        .fetch_optional(&self.pool)
        .await
        .context("failed to fetch post")?;

        row.as_ref().map(post_from_row).transpose()
    }

    async fn update_post(&self, post: &Post) -> Result<()> {
        sqlx::query(
            r"
            UPDATE posts
            SET title = $2, content = $3, updated_at = $4
            WHERE id = $1
            ",
        )
        .bind(post.id)
        .bind(&post.title)
        .bind(&post.content)
        .bind(post.updated_at)
        .execute(&self.pool)
        .await
        .context("failed to update post")?;
        Ok(())
    }

    async fn increment_view_count(&self, post_id: i64) -> Result<()> {
        sqlx::query("UPDATE posts SET view_count = view_count + 1 WHERE id = $1")
            .bind(post_id)
            .execute(&self.pool)
            .await
            .context("failed to increment view count")?;
        Ok(())
    }

    async fn soft_delete_post(&self, post_id: i64) -> Result<()> {
        sqlx::query("UPDATE posts SET is_deleted = TRUE, updated_at = NOW() WHERE id = $1")
            .bind(post_id)
            .execute(&self.pool)
            .await
            .context("failed to soft delete post")?;
        Ok(())
    }

    async fn soft_delete_posts_by_author(&self, author_id: i64) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE posts SET is_deleted = TRUE, updated_at = NOW() WHERE author_id = $1 AND NOT is_deleted",
        )
        .bind(author_id)
        .execute(&self.pool)
        .await
        .context("failed to soft delete posts by author")?;
        Ok(result.rows_affected())
    }

    async fn count_active_by_author(&self, author_id: i64) -> Result<i64> {
        let row =
            sqlx::query("SELECT COUNT(*) AS total FROM posts WHERE author_id = $1 AND NOT is_deleted")
                .bind(author_id)
                .fetch_one(&self.pool)
                .await
                .context("failed to count posts by author")?;
        Ok(row.try_get("total")?)
    }

    async fn count_all_active(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS total FROM posts WHERE NOT is_deleted")
            .fetch_one(&self.pool)
            .await
            .context("failed to count posts")?;
        Ok(row.try_get("total")?)
    }

    async fn search_posts(&self, query: &PostQuery) -> Result<Page<Post>> {
        let total: i64 = query
            .count_builder()
            .build()
            .fetch_one(&self.pool)
            .await
            .context("failed to count post search results")?
            .try_get("total")?;

        if total == 0 {
            return Ok(Page::empty(query.page()));
        }

        let rows = query
            .select_builder()
            .build()
            .fetch_all(&self.pool)
            .await
            .context("failed to search posts")?;
        let content = rows.iter().map(post_from_row).collect::<Result<Vec<_>>>()?;

        Ok(Page::new(content, query.page(), total))
    }
}
