use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use super::collection::{Inserted, JsonCollection};
use crate::domain::{CommentLikeDocument, PostLikeDocument};
use crate::store::{LikeDao, LikeInsert};

/// いいねは (対象, 会員) の一意インデックスで重複を防ぐ。
#[derive(Debug, Clone)]
pub struct PgLikeDao {
    post_likes: JsonCollection<PostLikeDocument>,
    comment_likes: JsonCollection<CommentLikeDocument>,
}

impl PgLikeDao {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self {
            post_likes: JsonCollection::new(pool.clone(), "post_likes"),
            comment_likes: JsonCollection::new(pool, "comment_likes"),
        }
    }
}

fn like_insert(inserted: Inserted) -> LikeInsert {
    match inserted {
        Inserted::Yes => LikeInsert::Inserted,
        Inserted::Conflict => LikeInsert::Duplicate,
    }
}

#[async_trait]
impl LikeDao for PgLikeDao {
    async fn find_post_like(
        &self,
        post_pk: i64,
        member_id: i64,
    ) -> Result<Option<PostLikeDocument>> {
        self.post_likes
            .find_one(json!({ "post_pk": post_pk, "member_id": member_id }))
            .await
    }

    async fn insert_post_like(&self, like: &PostLikeDocument) -> Result<LikeInsert> {
        Ok(like_insert(self.post_likes.insert(like.id, like).await?))
    }

    async fn delete_post_like(&self, id: Uuid) -> Result<()> {
        self.post_likes.delete(id).await?;
        Ok(())
    }

    async fn count_post_likes(&self, post_pks: &[i64]) -> Result<HashMap<i64, i64>> {
        self.post_likes.count_by("post_pk", post_pks).await
    }

    async fn find_comment_like(
        &self,
        comment_pk: i64,
        member_id: i64,
    ) -> Result<Option<CommentLikeDocument>> {
        self.comment_likes
            .find_one(json!({ "comment_pk": comment_pk, "member_id": member_id }))
            .await
    }

    async fn insert_comment_like(&self, like: &CommentLikeDocument) -> Result<LikeInsert> {
        Ok(like_insert(self.comment_likes.insert(like.id, like).await?))
    }

    async fn delete_comment_like(&self, id: Uuid) -> Result<()> {
        self.comment_likes.delete(id).await?;
        Ok(())
    }

    async fn count_comment_likes(&self, comment_pks: &[i64]) -> Result<HashMap<i64, i64>> {
        self.comment_likes.count_by("comment_pk", comment_pks).await
    }
}
