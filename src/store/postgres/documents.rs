use anyhow::{Result, bail};
use async_trait::async_trait;
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use super::collection::{Inserted, JsonCollection};
use crate::domain::{CommentDocument, PostDocument};
use crate::store::{CommentDocumentDao, PostDocumentDao};

#[derive(Debug, Clone)]
pub struct PgPostDocumentDao {
    collection: JsonCollection<PostDocument>,
}

impl PgPostDocumentDao {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self {
            collection: JsonCollection::new(pool, "post_documents"),
        }
    }
}

#[async_trait]
impl PostDocumentDao for PgPostDocumentDao {
    async fn insert(&self, document: &PostDocument) -> Result<()> {
        if self.collection.insert(document.id, document).await? == Inserted::Conflict {
            bail!("post document {} already exists", document.id);
        }
        Ok(())
    }

    async fn find_current(&self, post_pk: i64) -> Result<Option<PostDocument>> {
        self.collection
            .find_one(json!({ "post_pk": post_pk, "is_current": true, "is_deleted": false }))
            .await
    }

    async fn save(&self, document: &PostDocument) -> Result<()> {
        self.collection.upsert(document.id, document).await
    }

    async fn history(&self, post_pk: i64) -> Result<Vec<PostDocument>> {
        self.collection
            .find_many(json!({ "post_pk": post_pk }), "(body->>'version')::INT ASC")
            .await
    }
}

#[derive(Debug, Clone)]
pub struct PgCommentDocumentDao {
    collection: JsonCollection<CommentDocument>,
}

impl PgCommentDocumentDao {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self {
            collection: JsonCollection::new(pool, "comment_documents"),
        }
    }
}

#[async_trait]
impl CommentDocumentDao for PgCommentDocumentDao {
    async fn insert(&self, document: &CommentDocument) -> Result<()> {
        self.collection.upsert(document.id, document).await
    }

    async fn find_live(&self, comment_pk: i64) -> Result<Option<CommentDocument>> {
        self.collection
            .find_one(json!({ "comment_pk": comment_pk, "is_deleted": false }))
            .await
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        self.collection.delete(id).await?;
        Ok(())
    }
}
