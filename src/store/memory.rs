//! プロセス内ストア。テストと `CONTENT_STORE_BACKEND=memory` で使う。
//!
//! ロックは `.await` をまたいで保持しない。
use std::{
    collections::{BTreeMap, HashMap},
    sync::{Mutex, MutexGuard},
    time::Duration,
};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use super::{
    CommentDao, CommentDocumentDao, CommentQuery, DeadLetterDao, LikeDao, LikeInsert, Page,
    PageRequest, PostDao, PostDocumentDao, PostQuery, RevisionDao, query::PostStats,
};
use crate::domain::{
    ActivityRequest, Comment, CommentDocument, CommentLikeDocument, DeadLetter, NewComment,
    NewPost, Post, PostDocument, PostLikeDocument,
};
use crate::publish::{ActivityEvent, ActivityPublisher, PublishError, TopicNaming, message_key};

#[derive(Default)]
struct Inner {
    next_post_id: i64,
    next_comment_id: i64,
    posts: BTreeMap<i64, Post>,
    comments: BTreeMap<i64, Comment>,
    post_documents: HashMap<Uuid, PostDocument>,
    comment_documents: HashMap<Uuid, CommentDocument>,
    post_likes: HashMap<Uuid, PostLikeDocument>,
    comment_likes: HashMap<Uuid, CommentLikeDocument>,
    dead_letters: HashMap<Uuid, DeadLetter>,
    outbox: Vec<ActivityEvent>,
}

impl Inner {
    fn post_stats(&self, post_id: i64) -> PostStats {
        let like_count = self
            .post_likes
            .values()
            .filter(|like| like.post_pk == post_id)
            .count();
        let live_comments = self
            .comments
            .values()
            .filter(|comment| comment.post_id == post_id && !comment.is_deleted);
        let (comment_count, last_commented_at) =
            live_comments.fold((0_i64, None), |(count, latest), comment| {
                let latest = match latest {
                    Some(current) if current >= comment.created_at => Some(current),
                    _ => Some(comment.created_at),
                };
                (count + 1, latest)
            });
        PostStats {
            like_count: i64::try_from(like_count).unwrap_or(i64::MAX),
            comment_count,
            last_commented_at,
        }
    }
}

pub struct MemoryStore {
    inner: Mutex<Inner>,
    topics: TopicNaming,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(TopicNaming::default())
    }
}

impl MemoryStore {
    #[must_use]
    pub fn new(topics: TopicNaming) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            topics,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))
    }

    /// アウトボックスに積まれたイベントの複製。
    ///
    /// # Errors
    /// ロックが壊れている場合。
    pub fn outbox_events(&self) -> Result<Vec<ActivityEvent>> {
        Ok(self.lock()?.outbox.clone())
    }

    /// 全デッドレターの複製（作成順）。
    ///
    /// # Errors
    /// ロックが壊れている場合。
    pub fn dead_letters(&self) -> Result<Vec<DeadLetter>> {
        let mut letters: Vec<DeadLetter> = self.lock()?.dead_letters.values().cloned().collect();
        letters.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(letters)
    }

    /// 削除済みを含む投稿の生の状態。
    ///
    /// # Errors
    /// ロックが壊れている場合。
    pub fn raw_post(&self, post_id: i64) -> Result<Option<Post>> {
        Ok(self.lock()?.posts.get(&post_id).cloned())
    }

    /// 削除済みを含むコメントの生の状態。
    ///
    /// # Errors
    /// ロックが壊れている場合。
    pub fn raw_comment(&self, comment_id: i64) -> Result<Option<Comment>> {
        Ok(self.lock()?.comments.get(&comment_id).cloned())
    }

    /// コメントのミラー件数（削除されたものは含まない）。
    ///
    /// # Errors
    /// ロックが壊れている場合。
    pub fn comment_document_count(&self) -> Result<usize> {
        Ok(self.lock()?.comment_documents.len())
    }
}

fn count_of(len: usize) -> i64 {
    i64::try_from(len).unwrap_or(i64::MAX)
}

#[async_trait]
impl PostDao for MemoryStore {
    async fn insert_post(&self, post: &NewPost) -> Result<Post> {
        let mut inner = self.lock()?;
        inner.next_post_id += 1;
        let now = Utc::now();
        let stored = Post {
            id: inner.next_post_id,
            title: post.title.clone(),
            content: post.content.clone(),
            author_id: post.author_id,
            view_count: 0,
            is_deleted: false,
            created_at: now,
            updated_at: now,
        };
        inner.posts.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn find_active_post(&self, post_id: i64) -> Result<Option<Post>> {
        Ok(self
            .lock()?
            .posts
            .get(&post_id)
            .filter(|post| !post.is_deleted)
            .cloned())
    }

    async fn update_post(&self, post: &Post) -> Result<()> {
        let mut inner = self.lock()?;
        let stored = inner
            .posts
            .get_mut(&post.id)
            .ok_or_else(|| anyhow!("post {} does not exist", post.id))?;
        stored.title.clone_from(&post.title);
        stored.content.clone_from(&post.content);
        stored.updated_at = post.updated_at;
        Ok(())
    }

    async fn increment_view_count(&self, post_id: i64) -> Result<()> {
        if let Some(post) = self.lock()?.posts.get_mut(&post_id) {
            post.view_count += 1;
        }
        Ok(())
    }

    async fn soft_delete_post(&self, post_id: i64) -> Result<()> {
        if let Some(post) = self.lock()?.posts.get_mut(&post_id) {
            post.is_deleted = true;
            post.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn soft_delete_posts_by_author(&self, author_id: i64) -> Result<u64> {
        let mut inner = self.lock()?;
        let now = Utc::now();
        let mut affected = 0;
        for post in inner
            .posts
            .values_mut()
            .filter(|post| post.author_id == author_id && !post.is_deleted)
        {
            post.is_deleted = true;
            post.updated_at = now;
            affected += 1;
        }
        Ok(affected)
    }

    async fn count_active_by_author(&self, author_id: i64) -> Result<i64> {
        let inner = self.lock()?;
        Ok(count_of(
            inner
                .posts
                .values()
                .filter(|post| post.author_id == author_id && !post.is_deleted)
                .count(),
        ))
    }

    async fn count_all_active(&self) -> Result<i64> {
        let inner = self.lock()?;
        Ok(count_of(
            inner.posts.values().filter(|post| !post.is_deleted).count(),
        ))
    }

    async fn search_posts(&self, query: &PostQuery) -> Result<Page<Post>> {
        let inner = self.lock()?;
        let mut matched: Vec<(&Post, PostStats)> = inner
            .posts
            .values()
            .filter(|post| query.matches(post))
            .map(|post| (post, inner.post_stats(post.id)))
            .collect();
        matched.sort_by(|a, b| query.compare((a.0, &a.1), (b.0, &b.1)));

        let page = query.page();
        let total = count_of(matched.len());
        let content = matched
            .into_iter()
            .skip(usize::try_from(page.offset()).unwrap_or(usize::MAX))
            .take(usize::try_from(page.limit()).unwrap_or(0))
            .map(|(post, _)| post.clone())
            .collect();
        Ok(Page::new(content, page, total))
    }
}

#[async_trait]
impl CommentDao for MemoryStore {
    async fn insert_comment(&self, comment: &NewComment) -> Result<Comment> {
        let mut inner = self.lock()?;
        if !inner.posts.contains_key(&comment.post_id) {
            return Err(anyhow!("post {} does not exist", comment.post_id));
        }
        inner.next_comment_id += 1;
        let now = Utc::now();
        let stored = Comment {
            id: inner.next_comment_id,
            content: comment.content.clone(),
            author_id: comment.author_id,
            post_id: comment.post_id,
            parent_id: comment.parent_id,
            depth: comment.depth,
            is_deleted: false,
            created_at: now,
            updated_at: now,
        };
        inner.comments.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn find_active_comment(&self, comment_id: i64) -> Result<Option<Comment>> {
        Ok(self
            .lock()?
            .comments
            .get(&comment_id)
            .filter(|comment| !comment.is_deleted)
            .cloned())
    }

    async fn update_comment(&self, comment: &Comment) -> Result<()> {
        let mut inner = self.lock()?;
        let stored = inner
            .comments
            .get_mut(&comment.id)
            .ok_or_else(|| anyhow!("comment {} does not exist", comment.id))?;
        stored.content.clone_from(&comment.content);
        stored.updated_at = comment.updated_at;
        Ok(())
    }

    async fn soft_delete_with_children(&self, comment_id: i64) -> Result<u64> {
        let mut inner = self.lock()?;
        let now = Utc::now();
        let mut affected = 0;
        for comment in inner.comments.values_mut().filter(|comment| {
            !comment.is_deleted
                && (comment.id == comment_id || comment.parent_id == Some(comment_id))
        }) {
            comment.is_deleted = true;
            comment.updated_at = now;
            affected += 1;
        }
        Ok(affected)
    }

    async fn count_active_by_post(&self, post_id: i64) -> Result<i64> {
        let inner = self.lock()?;
        Ok(count_of(
            inner
                .comments
                .values()
                .filter(|comment| comment.post_id == post_id && !comment.is_deleted)
                .count(),
        ))
    }

    async fn comment_counts_by_posts(&self, post_ids: &[i64]) -> Result<HashMap<i64, i64>> {
        let inner = self.lock()?;
        let mut counts = HashMap::new();
        for comment in inner
            .comments
            .values()
            .filter(|comment| !comment.is_deleted && post_ids.contains(&comment.post_id))
        {
            *counts.entry(comment.post_id).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn children_counts(&self, comment_ids: &[i64]) -> Result<HashMap<i64, i64>> {
        let inner = self.lock()?;
        let mut counts = HashMap::new();
        for parent_id in inner
            .comments
            .values()
            .filter(|comment| !comment.is_deleted)
            .filter_map(|comment| comment.parent_id)
            .filter(|parent_id| comment_ids.contains(parent_id))
        {
            *counts.entry(parent_id).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn search_comments(
        &self,
        query: &CommentQuery,
        page: PageRequest,
    ) -> Result<Page<Comment>> {
        let inner = self.lock()?;
        let mut matched: Vec<&Comment> = inner
            .comments
            .values()
            .filter(|comment| query.matches(comment))
            .collect();
        matched.sort_by(|a, b| query.compare(a, b));

        let total = count_of(matched.len());
        let content = matched
            .into_iter()
            .skip(usize::try_from(page.offset()).unwrap_or(usize::MAX))
            .take(usize::try_from(page.limit()).unwrap_or(0))
            .cloned()
            .collect();
        Ok(Page::new(content, page, total))
    }

    async fn replies_to(&self, parent_ids: &[i64], per_parent: u32) -> Result<Vec<Comment>> {
        let inner = self.lock()?;
        let mut replies: Vec<&Comment> = inner
            .comments
            .values()
            .filter(|comment| {
                !comment.is_deleted
                    && comment
                        .parent_id
                        .is_some_and(|parent_id| parent_ids.contains(&parent_id))
            })
            .collect();
        replies.sort_by(|a, b| {
            a.parent_id
                .cmp(&b.parent_id)
                .then(a.created_at.cmp(&b.created_at))
                .then(a.id.cmp(&b.id))
        });

        let limit = usize::try_from(per_parent).unwrap_or(usize::MAX);
        let mut taken: HashMap<i64, usize> = HashMap::new();
        Ok(replies
            .into_iter()
            .filter(|reply| {
                let seen = taken.entry(reply.parent_id.unwrap_or_default()).or_insert(0);
                *seen += 1;
                *seen <= limit
            })
            .cloned()
            .collect())
    }
}

#[async_trait]
impl PostDocumentDao for MemoryStore {
    async fn insert(&self, document: &PostDocument) -> Result<()> {
        let mut inner = self.lock()?;
        if inner.post_documents.contains_key(&document.id) {
            return Err(anyhow!("post document {} already exists", document.id));
        }
        inner.post_documents.insert(document.id, document.clone());
        Ok(())
    }

    async fn find_current(&self, post_pk: i64) -> Result<Option<PostDocument>> {
        Ok(self
            .lock()?
            .post_documents
            .values()
            .find(|document| document.post_pk == post_pk && document.is_current && !document.is_deleted)
            .cloned())
    }

    async fn save(&self, document: &PostDocument) -> Result<()> {
        self.lock()?
            .post_documents
            .insert(document.id, document.clone());
        Ok(())
    }

    async fn history(&self, post_pk: i64) -> Result<Vec<PostDocument>> {
        let mut documents: Vec<PostDocument> = self
            .lock()?
            .post_documents
            .values()
            .filter(|document| document.post_pk == post_pk)
            .cloned()
            .collect();
        documents.sort_by_key(|document| document.version);
        Ok(documents)
    }
}

#[async_trait]
impl CommentDocumentDao for MemoryStore {
    async fn insert(&self, document: &CommentDocument) -> Result<()> {
        self.lock()?
            .comment_documents
            .insert(document.id, document.clone());
        Ok(())
    }

    async fn find_live(&self, comment_pk: i64) -> Result<Option<CommentDocument>> {
        Ok(self
            .lock()?
            .comment_documents
            .values()
            .find(|document| document.comment_pk == comment_pk && !document.is_deleted)
            .cloned())
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        self.lock()?.comment_documents.remove(&id);
        Ok(())
    }
}

/// 検証をすべて済ませてから書き込むので、失敗時は何も変わらない。
#[async_trait]
impl RevisionDao for MemoryStore {
    async fn revise_post(
        &self,
        post: &Post,
        superseded: &PostDocument,
        next: &PostDocument,
    ) -> Result<()> {
        let mut inner = self.lock()?;
        if !inner.posts.get(&post.id).is_some_and(|stored| !stored.is_deleted) {
            return Err(anyhow!("post {} does not exist", post.id));
        }
        if !inner.post_documents.contains_key(&superseded.id) {
            return Err(anyhow!("post document {} does not exist", superseded.id));
        }
        if inner.post_documents.contains_key(&next.id) {
            return Err(anyhow!("post document {} already exists", next.id));
        }

        if let Some(stored) = inner.posts.get_mut(&post.id) {
            stored.title.clone_from(&post.title);
            stored.content.clone_from(&post.content);
            stored.updated_at = post.updated_at;
        }
        inner.post_documents.insert(superseded.id, superseded.clone());
        inner.post_documents.insert(next.id, next.clone());
        Ok(())
    }

    async fn revise_comment(
        &self,
        comment: &Comment,
        replaced: Uuid,
        mirror: &CommentDocument,
    ) -> Result<()> {
        let mut inner = self.lock()?;
        let Some(stored) = inner
            .comments
            .get_mut(&comment.id)
            .filter(|stored| !stored.is_deleted)
        else {
            return Err(anyhow!("comment {} does not exist", comment.id));
        };
        stored.content.clone_from(&comment.content);
        stored.updated_at = comment.updated_at;
        inner.comment_documents.remove(&replaced);
        inner.comment_documents.insert(mirror.id, mirror.clone());
        Ok(())
    }
}

#[async_trait]
impl LikeDao for MemoryStore {
    async fn find_post_like(
        &self,
        post_pk: i64,
        member_id: i64,
    ) -> Result<Option<PostLikeDocument>> {
        Ok(self
            .lock()?
            .post_likes
            .values()
            .find(|like| like.post_pk == post_pk && like.member_id == member_id)
            .cloned())
    }

    async fn insert_post_like(&self, like: &PostLikeDocument) -> Result<LikeInsert> {
        let mut inner = self.lock()?;
        let duplicate = inner
            .post_likes
            .values()
            .any(|existing| existing.post_pk == like.post_pk && existing.member_id == like.member_id);
        if duplicate {
            return Ok(LikeInsert::Duplicate);
        }
        inner.post_likes.insert(like.id, like.clone());
        Ok(LikeInsert::Inserted)
    }

    async fn delete_post_like(&self, id: Uuid) -> Result<()> {
        self.lock()?.post_likes.remove(&id);
        Ok(())
    }

    async fn count_post_likes(&self, post_pks: &[i64]) -> Result<HashMap<i64, i64>> {
        let inner = self.lock()?;
        let mut counts = HashMap::new();
        for like in inner
            .post_likes
            .values()
            .filter(|like| post_pks.contains(&like.post_pk))
        {
            *counts.entry(like.post_pk).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn find_comment_like(
        &self,
        comment_pk: i64,
        member_id: i64,
    ) -> Result<Option<CommentLikeDocument>> {
        Ok(self
            .lock()?
            .comment_likes
            .values()
            .find(|like| like.comment_pk == comment_pk && like.member_id == member_id)
            .cloned())
    }

    async fn insert_comment_like(&self, like: &CommentLikeDocument) -> Result<LikeInsert> {
        let mut inner = self.lock()?;
        let duplicate = inner.comment_likes.values().any(|existing| {
            existing.comment_pk == like.comment_pk && existing.member_id == like.member_id
        });
        if duplicate {
            return Ok(LikeInsert::Duplicate);
        }
        inner.comment_likes.insert(like.id, like.clone());
        Ok(LikeInsert::Inserted)
    }

    async fn delete_comment_like(&self, id: Uuid) -> Result<()> {
        self.lock()?.comment_likes.remove(&id);
        Ok(())
    }

    async fn count_comment_likes(&self, comment_pks: &[i64]) -> Result<HashMap<i64, i64>> {
        let inner = self.lock()?;
        let mut counts = HashMap::new();
        for like in inner
            .comment_likes
            .values()
            .filter(|like| comment_pks.contains(&like.comment_pk))
        {
            *counts.entry(like.comment_pk).or_insert(0) += 1;
        }
        Ok(counts)
    }
}

#[async_trait]
impl DeadLetterDao for MemoryStore {
    async fn insert(&self, letter: &DeadLetter) -> Result<()> {
        self.lock()?.dead_letters.insert(letter.id, letter.clone());
        Ok(())
    }

    async fn claim_pending(
        &self,
        limit: u32,
        max_attempts: u32,
        lease: Duration,
    ) -> Result<Vec<DeadLetter>> {
        let now = Utc::now();
        let stale_before = now - chrono::Duration::from_std(lease)?;
        let mut inner = self.lock()?;
        let mut pending: Vec<&mut DeadLetter> = inner
            .dead_letters
            .values_mut()
            .filter(|letter| letter.is_claimable(max_attempts, stale_before))
            .collect();
        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

        let claimed = pending
            .into_iter()
            .take(usize::try_from(limit).unwrap_or(usize::MAX))
            .map(|letter| {
                letter.is_editing = true;
                letter.updated_at = now;
                letter.clone()
            })
            .collect();
        Ok(claimed)
    }

    async fn mark_completed(&self, id: Uuid) -> Result<()> {
        let mut inner = self.lock()?;
        let letter = inner
            .dead_letters
            .get_mut(&id)
            .ok_or_else(|| anyhow!("dead letter {id} does not exist"))?;
        letter.is_completed = true;
        letter.is_editing = false;
        letter.updated_at = Utc::now();
        Ok(())
    }

    async fn release(&self, id: Uuid, error: &str) -> Result<()> {
        let mut inner = self.lock()?;
        let letter = inner
            .dead_letters
            .get_mut(&id)
            .ok_or_else(|| anyhow!("dead letter {id} does not exist"))?;
        letter.is_editing = false;
        letter.attempts += 1;
        letter.last_error = Some(error.to_string());
        letter.updated_at = Utc::now();
        Ok(())
    }

    async fn find_by_message_key(&self, message_key: &str) -> Result<Vec<DeadLetter>> {
        Ok(self
            .lock()?
            .dead_letters
            .values()
            .filter(|letter| letter.message_key == message_key)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ActivityPublisher for MemoryStore {
    async fn publish(&self, request: &ActivityRequest) -> Result<(), PublishError> {
        let key = message_key(request)?;
        let now = Utc::now();
        let event = ActivityEvent {
            topic: self.topics.topic_at(now),
            message_key: key,
            payload: request.clone(),
            created_at: now,
        };
        self.lock()
            .map_err(PublishError::Unavailable)?
            .outbox
            .push(event);
        Ok(())
    }

    async fn purge_expired(&self, retention: Duration) -> Result<u64> {
        let cutoff = Utc::now() - chrono::Duration::from_std(retention)?;
        let mut inner = self.lock()?;
        let before = inner.outbox.len();
        inner.outbox.retain(|event| event.created_at >= cutoff);
        Ok(u64::try_from(before - inner.outbox.len()).unwrap_or(u64::MAX))
    }
}
