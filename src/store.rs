//! 永続化レイヤ。リレーショナルモデルとドキュメントモデルの両方を DAO トレイトで表す。
//!
//! 本番は Postgres（テーブル + JSONB コレクション）、テストとローカル実行は
//! [`memory::MemoryStore`] を使う。

pub mod memory;
pub mod page;
pub mod postgres;
pub mod query;

use std::{collections::HashMap, sync::Arc, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{
    Comment, CommentDocument, CommentLikeDocument, DeadLetter, NewComment, NewPost, Post,
    PostDocument, PostLikeDocument,
};
use crate::publish::ActivityPublisher;

pub use page::{Page, PageRequest};
pub use query::{CommentQuery, KeywordScope, PostQuery, PostSort};

#[async_trait]
pub trait PostDao: Send + Sync {
    async fn insert_post(&self, post: &NewPost) -> Result<Post>;

    /// 論理削除されていない投稿を取得する。
    async fn find_active_post(&self, post_id: i64) -> Result<Option<Post>>;

    /// タイトル・本文・更新日時を保存する。
    async fn update_post(&self, post: &Post) -> Result<()>;

    async fn increment_view_count(&self, post_id: i64) -> Result<()>;

    async fn soft_delete_post(&self, post_id: i64) -> Result<()>;

    async fn soft_delete_posts_by_author(&self, author_id: i64) -> Result<u64>;

    async fn count_active_by_author(&self, author_id: i64) -> Result<i64>;

    async fn count_all_active(&self) -> Result<i64>;

    async fn search_posts(&self, query: &PostQuery) -> Result<Page<Post>>;
}

#[async_trait]
pub trait CommentDao: Send + Sync {
    async fn insert_comment(&self, comment: &NewComment) -> Result<Comment>;

    async fn find_active_comment(&self, comment_id: i64) -> Result<Option<Comment>>;

    async fn update_comment(&self, comment: &Comment) -> Result<()>;

    /// コメントと直下の返信を一度に論理削除し、影響件数を返す。
    async fn soft_delete_with_children(&self, comment_id: i64) -> Result<u64>;

    async fn count_active_by_post(&self, post_id: i64) -> Result<i64>;

    /// 投稿ごとの有効コメント件数。件数 0 の投稿はマップに含まれない。
    async fn comment_counts_by_posts(&self, post_ids: &[i64]) -> Result<HashMap<i64, i64>>;

    /// コメントごとの有効な返信件数。
    async fn children_counts(&self, comment_ids: &[i64]) -> Result<HashMap<i64, i64>>;

    async fn search_comments(
        &self,
        query: &CommentQuery,
        page: PageRequest,
    ) -> Result<Page<Comment>>;

    /// 複数の親の直下の返信を一度に取得する。親ごとに古い順で先頭 `per_parent` 件まで。
    async fn replies_to(&self, parent_ids: &[i64], per_parent: u32) -> Result<Vec<Comment>>;
}

#[async_trait]
pub trait PostDocumentDao: Send + Sync {
    async fn insert(&self, document: &PostDocument) -> Result<()>;

    /// 現行かつ未削除のドキュメント。
    async fn find_current(&self, post_pk: i64) -> Result<Option<PostDocument>>;

    /// 既存ドキュメントを上書き保存する。
    async fn save(&self, document: &PostDocument) -> Result<()>;

    /// 全バージョンを version 昇順で返す。
    async fn history(&self, post_pk: i64) -> Result<Vec<PostDocument>>;
}

#[async_trait]
pub trait CommentDocumentDao: Send + Sync {
    async fn insert(&self, document: &CommentDocument) -> Result<()>;

    async fn find_live(&self, comment_pk: i64) -> Result<Option<CommentDocument>>;

    async fn delete(&self, id: Uuid) -> Result<()>;
}

/// リレーショナル行とそのドキュメントをまとめて書き換える。
/// どちらかが失敗したらどちらも残さない。
#[async_trait]
pub trait RevisionDao: Send + Sync {
    /// 投稿行を更新し、`superseded` を上書き保存して `next` を挿入する。
    async fn revise_post(
        &self,
        post: &Post,
        superseded: &PostDocument,
        next: &PostDocument,
    ) -> Result<()>;

    /// コメント行を更新し、ミラー `replaced` を `mirror` に差し替える。
    async fn revise_comment(
        &self,
        comment: &Comment,
        replaced: Uuid,
        mirror: &CommentDocument,
    ) -> Result<()>;
}

/// いいね挿入の結果。一意制約違反は `Duplicate` として返す。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LikeInsert {
    Inserted,
    Duplicate,
}

#[async_trait]
pub trait LikeDao: Send + Sync {
    async fn find_post_like(&self, post_pk: i64, member_id: i64)
    -> Result<Option<PostLikeDocument>>;

    async fn insert_post_like(&self, like: &PostLikeDocument) -> Result<LikeInsert>;

    async fn delete_post_like(&self, id: Uuid) -> Result<()>;

    async fn count_post_likes(&self, post_pks: &[i64]) -> Result<HashMap<i64, i64>>;

    async fn find_comment_like(
        &self,
        comment_pk: i64,
        member_id: i64,
    ) -> Result<Option<CommentLikeDocument>>;

    async fn insert_comment_like(&self, like: &CommentLikeDocument) -> Result<LikeInsert>;

    async fn delete_comment_like(&self, id: Uuid) -> Result<()>;

    async fn count_comment_likes(&self, comment_pks: &[i64]) -> Result<HashMap<i64, i64>>;
}

#[async_trait]
pub trait DeadLetterDao: Send + Sync {
    async fn insert(&self, letter: &DeadLetter) -> Result<()>;

    /// 再送対象を最大 `limit` 件取得し、`is_editing` を立てる。
    /// `lease` より長く編集中のままの行も取り直す。
    async fn claim_pending(
        &self,
        limit: u32,
        max_attempts: u32,
        lease: Duration,
    ) -> Result<Vec<DeadLetter>>;

    async fn mark_completed(&self, id: Uuid) -> Result<()>;

    /// 再送失敗。試行回数を増やし、編集中フラグを戻す。
    async fn release(&self, id: Uuid, error: &str) -> Result<()>;

    async fn find_by_message_key(&self, message_key: &str) -> Result<Vec<DeadLetter>>;
}

/// サービスが使うストア一式。
#[derive(Clone)]
pub struct Stores {
    pub posts: Arc<dyn PostDao>,
    pub comments: Arc<dyn CommentDao>,
    pub post_documents: Arc<dyn PostDocumentDao>,
    pub comment_documents: Arc<dyn CommentDocumentDao>,
    pub revisions: Arc<dyn RevisionDao>,
    pub likes: Arc<dyn LikeDao>,
    pub dead_letters: Arc<dyn DeadLetterDao>,
    pub outbox: Arc<dyn ActivityPublisher>,
}

impl Stores {
    /// すべての DAO を一つのメモリストアで賄う。
    #[must_use]
    pub fn memory(store: &Arc<memory::MemoryStore>) -> Self {
        Self {
            posts: Arc::clone(store) as Arc<dyn PostDao>,
            comments: Arc::clone(store) as Arc<dyn CommentDao>,
            post_documents: Arc::clone(store) as Arc<dyn PostDocumentDao>,
            comment_documents: Arc::clone(store) as Arc<dyn CommentDocumentDao>,
            revisions: Arc::clone(store) as Arc<dyn RevisionDao>,
            likes: Arc::clone(store) as Arc<dyn LikeDao>,
            dead_letters: Arc::clone(store) as Arc<dyn DeadLetterDao>,
            outbox: Arc::clone(store) as Arc<dyn ActivityPublisher>,
        }
    }
}
