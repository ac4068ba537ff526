use std::{collections::HashMap, sync::Arc};

use chrono::Utc;
use tracing::{error, info, instrument, warn};

use super::{lookup_members, require_member};
use crate::clients::RemoteClients;
use crate::domain::{
    Comment, CommentLikeDocument, CommentSummary, CommentView, CreateCommentRequest, Member,
    MemberActivityType, MemberSummary, NewComment, Post, UpdateCommentRequest,
};
use crate::error::ContentError;
use crate::mapper;
use crate::observability::metrics::Metrics;
use crate::publish::ActivityDispatcher;
use crate::store::{CommentQuery, LikeInsert, Page, PageRequest, Stores, page::MAX_PAGE_SIZE};

/// 投稿のコメント一覧で各コメントに添える返信の上限。
pub const INLINE_REPLY_LIMIT: u32 = MAX_PAGE_SIZE;

/// コメントと返信のユースケース。
#[derive(Clone)]
pub struct CommentService {
    stores: Stores,
    remotes: RemoteClients,
    dispatcher: ActivityDispatcher,
    metrics: Arc<Metrics>,
    max_depth: i32,
}

/// 表示に必要な件数と著者。
struct Enrichment {
    likes: HashMap<i64, i64>,
    children: HashMap<i64, i64>,
    authors: HashMap<i64, MemberSummary>,
}

impl Enrichment {
    fn view(&self, comment: &Comment) -> CommentView {
        mapper::comment::comment_view(
            comment,
            self.authors.get(&comment.author_id),
            self.likes.get(&comment.id).copied().unwrap_or(0),
            self.children.get(&comment.id).copied().unwrap_or(0),
        )
    }
}

impl CommentService {
    #[must_use]
    pub fn new(
        stores: Stores,
        remotes: RemoteClients,
        dispatcher: ActivityDispatcher,
        metrics: Arc<Metrics>,
        max_depth: i32,
    ) -> Self {
        Self {
            stores,
            remotes,
            dispatcher,
            metrics,
            max_depth,
        }
    }

    #[must_use]
    pub fn max_depth(&self) -> i32 {
        self.max_depth
    }

    async fn find_post(&self, post_id: i64) -> Result<Post, ContentError> {
        self.stores
            .posts
            .find_active_post(post_id)
            .await?
            .ok_or(ContentError::PostNotFound(post_id))
    }

    async fn find_live(&self, comment_id: i64) -> Result<Comment, ContentError> {
        self.stores
            .comments
            .find_active_comment(comment_id)
            .await?
            .ok_or(ContentError::CommentNotFound(comment_id))
    }

    /// 投稿直下のコメントを作る。`parent_id` があれば返信として扱う。
    ///
    /// # Errors
    /// 投稿が無い、著者プロフィールを取得できない、保存または配信に失敗した場合。
    #[instrument(skip(self, member, request, token), fields(member_id = member.id, post_id = request.post_id))]
    pub async fn create_comment(
        &self,
        member: &Member,
        request: CreateCommentRequest,
        token: Option<&str>,
    ) -> Result<CommentView, ContentError> {
        if request.parent_id.is_some() {
            return self.create_reply(member, request, token).await;
        }

        let post = self.find_post(request.post_id).await?;
        let author = require_member(self.remotes.members.as_ref(), member.id, token).await?;

        let comment = self
            .stores
            .comments
            .insert_comment(&NewComment::top_level(post.id, member.id, request.content))
            .await?;
        self.mirror_new(&comment).await?;

        self.dispatcher
            .dispatch(
                mapper::activity::comment_activity(
                    member.id,
                    &comment,
                    MemberActivityType::CommentCreate,
                ),
                token,
            )
            .await?;

        self.metrics.comments_created.inc();
        info!(comment_id = comment.id, "comment created");
        Ok(mapper::comment::comment_view(&comment, Some(&author), 0, 0))
    }

    /// # Errors
    /// - `InvalidRequest`: `parent_id` が無い
    /// - `PostNotFound` / `ParentCommentNotFound`
    /// - `CommentDepthLimitExceeded`: 親が最大深さに達している
    /// - `ParentCommentPostMismatch`: 親が別の投稿のコメント
    #[instrument(skip(self, member, request, token), fields(member_id = member.id, post_id = request.post_id))]
    pub async fn create_reply(
        &self,
        member: &Member,
        request: CreateCommentRequest,
        token: Option<&str>,
    ) -> Result<CommentView, ContentError> {
        let parent_id = request.parent_id.ok_or_else(|| {
            ContentError::InvalidRequest("parentId is required for a reply".to_string())
        })?;

        let post = self.find_post(request.post_id).await?;
        let parent = self
            .stores
            .comments
            .find_active_comment(parent_id)
            .await?
            .ok_or(ContentError::ParentCommentNotFound(parent_id))?;
        if parent.depth >= self.max_depth {
            return Err(ContentError::CommentDepthLimitExceeded {
                parent_id,
                max_depth: self.max_depth,
            });
        }
        if parent.post_id != post.id {
            return Err(ContentError::ParentCommentPostMismatch {
                parent_id,
                post_id: post.id,
            });
        }

        let author = require_member(self.remotes.members.as_ref(), member.id, token).await?;

        let reply = self
            .stores
            .comments
            .insert_comment(&NewComment::reply_to(&parent, member.id, request.content))
            .await?;
        self.mirror_new(&reply).await?;

        self.dispatcher
            .dispatch(
                mapper::activity::comment_activity(
                    member.id,
                    &reply,
                    MemberActivityType::CommentCreate,
                ),
                token,
            )
            .await?;

        self.metrics.comments_created.inc();
        info!(comment_id = reply.id, parent_id, depth = reply.depth, "reply created");
        Ok(mapper::comment::comment_view(&reply, Some(&author), 0, 0))
    }

    /// # Errors
    /// - `CommentNotFound`: コメントまたはミラーが無い
    /// - `CommentModificationPermissionDenied`: 作成者ではない
    #[instrument(skip(self, member, request, token), fields(member_id = member.id))]
    pub async fn update_comment(
        &self,
        member: &Member,
        comment_id: i64,
        request: UpdateCommentRequest,
        token: Option<&str>,
    ) -> Result<CommentView, ContentError> {
        let author = require_member(self.remotes.members.as_ref(), member.id, token).await?;

        let mut comment = self.find_live(comment_id).await?;
        if !comment.is_owned_by(member.id) {
            return Err(ContentError::CommentModificationPermissionDenied {
                comment_id,
                member_id: member.id,
            });
        }

        let Some(previous) = self.stores.comment_documents.find_live(comment_id).await? else {
            error!(comment_id, "live comment document missing");
            return Err(ContentError::CommentNotFound(comment_id));
        };

        comment.apply_content(request.content, Utc::now());
        let replacement = mapper::comment::comment_document_replacement(&previous, &comment);
        self.stores
            .revisions
            .revise_comment(&comment, previous.id, &replacement)
            .await?;

        self.dispatcher
            .dispatch(
                mapper::activity::comment_activity(
                    member.id,
                    &comment,
                    MemberActivityType::CommentUpdate,
                ),
                token,
            )
            .await?;

        let likes = self.stores.likes.count_comment_likes(&[comment_id]).await?;
        let children = self.stores.comments.children_counts(&[comment_id]).await?;

        self.metrics.comments_updated.inc();
        info!(comment_id, "comment updated");
        Ok(mapper::comment::comment_view(
            &comment,
            Some(&author),
            likes.get(&comment_id).copied().unwrap_or(0),
            children.get(&comment_id).copied().unwrap_or(0),
        ))
    }

    /// コメントと直下の返信を論理削除する。
    ///
    /// # Errors
    /// - `CommentNotFound`
    /// - `CommentDeletionPermissionDenied`: 作成者ではない
    #[instrument(skip(self, member, token), fields(member_id = member.id))]
    pub async fn delete_comment(
        &self,
        member: &Member,
        comment_id: i64,
        token: Option<&str>,
    ) -> Result<bool, ContentError> {
        let comment = self.find_live(comment_id).await?;
        if !comment.is_owned_by(member.id) {
            return Err(ContentError::CommentDeletionPermissionDenied {
                comment_id,
                member_id: member.id,
            });
        }

        let affected = self
            .stores
            .comments
            .soft_delete_with_children(comment_id)
            .await?;

        match self.stores.comment_documents.find_live(comment_id).await? {
            Some(document) => self.stores.comment_documents.delete(document.id).await?,
            None => warn!(comment_id, "no live comment document to delete"),
        }

        self.dispatcher
            .dispatch(
                mapper::activity::comment_activity(
                    member.id,
                    &comment,
                    MemberActivityType::CommentDelete,
                ),
                token,
            )
            .await?;

        self.metrics.comments_deleted.inc();
        info!(comment_id, affected, "comment deleted");
        Ok(true)
    }

    /// # Errors
    /// - `CommentNotFound`
    /// - `CommentLikeAlreadyExists`: 既にいいね済み
    #[instrument(skip(self, member, token), fields(member_id = member.id))]
    pub async fn like_comment(
        &self,
        member: &Member,
        comment_id: i64,
        token: Option<&str>,
    ) -> Result<(), ContentError> {
        let comment = self.find_live(comment_id).await?;
        let already_exists = ContentError::CommentLikeAlreadyExists {
            comment_id,
            member_id: member.id,
        };
        if self
            .stores
            .likes
            .find_comment_like(comment_id, member.id)
            .await?
            .is_some()
        {
            return Err(already_exists);
        }
        if self
            .stores
            .likes
            .insert_comment_like(&CommentLikeDocument::new(comment_id, member.id))
            .await?
            == LikeInsert::Duplicate
        {
            return Err(already_exists);
        }

        self.dispatcher
            .dispatch(
                mapper::activity::comment_like_activity(
                    member.id,
                    &comment,
                    MemberActivityType::LikeComment,
                ),
                token,
            )
            .await?;

        self.metrics
            .likes
            .with_label_values(&["comment", "like"])
            .inc();
        Ok(())
    }

    /// # Errors
    /// - `CommentNotFound`
    /// - `CommentLikeCancelAlreadyCommitted`: いいねしていない
    #[instrument(skip(self, member, token), fields(member_id = member.id))]
    pub async fn unlike_comment(
        &self,
        member: &Member,
        comment_id: i64,
        token: Option<&str>,
    ) -> Result<(), ContentError> {
        let comment = self.find_live(comment_id).await?;
        let like = self
            .stores
            .likes
            .find_comment_like(comment_id, member.id)
            .await?
            .ok_or(ContentError::CommentLikeCancelAlreadyCommitted {
                comment_id,
                member_id: member.id,
            })?;
        self.stores.likes.delete_comment_like(like.id).await?;

        self.dispatcher
            .dispatch(
                mapper::activity::comment_like_activity(
                    member.id,
                    &comment,
                    MemberActivityType::LikeCommentCancel,
                ),
                token,
            )
            .await?;

        self.metrics
            .likes
            .with_label_values(&["comment", "unlike"])
            .inc();
        Ok(())
    }

    /// # Errors
    /// コメントが無い場合は `CommentNotFound`。
    pub async fn get_comment(
        &self,
        comment_id: i64,
        token: Option<&str>,
    ) -> Result<CommentView, ContentError> {
        let comment = self.find_live(comment_id).await?;
        let enrichment = self.enrich(std::slice::from_ref(&comment), token).await?;
        Ok(enrichment.view(&comment))
    }

    /// 投稿直下のコメント。各コメントに直下の返信を古い順に最大
    /// [`INLINE_REPLY_LIMIT`] 件添える。`childrenCount` は常に全件数なので、
    /// 残りは返信一覧 API でページングして取る。
    ///
    /// # Errors
    /// 投稿が無い場合は `PostNotFound`。
    pub async fn comments_by_post(
        &self,
        post_id: i64,
        page: PageRequest,
        token: Option<&str>,
    ) -> Result<Page<CommentView>, ContentError> {
        self.find_post(post_id).await?;
        let mut top_level = self
            .stores
            .comments
            .search_comments(&CommentQuery::ByPost(post_id), page)
            .await?;
        let comments = std::mem::take(&mut top_level.content);

        let parent_ids: Vec<i64> = comments.iter().map(|comment| comment.id).collect();
        let mut replies: HashMap<i64, Vec<Comment>> = HashMap::new();
        for reply in self
            .stores
            .comments
            .replies_to(&parent_ids, INLINE_REPLY_LIMIT)
            .await?
        {
            if let Some(parent_id) = reply.parent_id {
                replies.entry(parent_id).or_default().push(reply);
            }
        }
        let replies_by_parent: Vec<(Comment, Vec<Comment>)> = comments
            .into_iter()
            .map(|comment| {
                let children = replies.remove(&comment.id).unwrap_or_default();
                (comment, children)
            })
            .collect();

        let all: Vec<Comment> = replies_by_parent
            .iter()
            .flat_map(|(comment, replies)| std::iter::once(comment).chain(replies.iter()))
            .cloned()
            .collect();
        let enrichment = self.enrich(&all, token).await?;

        let views = replies_by_parent
            .iter()
            .map(|(comment, replies)| {
                let mut view = enrichment.view(comment);
                view.children = replies.iter().map(|reply| enrichment.view(reply)).collect();
                view
            })
            .collect();
        Ok(top_level.with_content(views))
    }

    /// # Errors
    /// 親コメントが無い場合は `CommentNotFound`。
    pub async fn replies(
        &self,
        parent_id: i64,
        page: PageRequest,
        token: Option<&str>,
    ) -> Result<Page<CommentView>, ContentError> {
        self.find_live(parent_id).await?;
        let mut replies = self
            .stores
            .comments
            .search_comments(&CommentQuery::ByParent(parent_id), page)
            .await?;
        let comments = std::mem::take(&mut replies.content);
        let enrichment = self.enrich(&comments, token).await?;
        let views = comments.iter().map(|comment| enrichment.view(comment)).collect();
        Ok(replies.with_content(views))
    }

    /// 会員が書いたコメント（新しい順）。
    ///
    /// # Errors
    /// ストアの読み取りに失敗した場合。
    pub async fn comments_by_member(
        &self,
        member_id: i64,
        page: PageRequest,
    ) -> Result<Page<CommentSummary>, ContentError> {
        let mut written = self
            .stores
            .comments
            .search_comments(&CommentQuery::ByAuthor(member_id), page)
            .await?;
        let comments = std::mem::take(&mut written.content);
        let ids: Vec<i64> = comments.iter().map(|comment| comment.id).collect();
        let likes = self.stores.likes.count_comment_likes(&ids).await?;
        let children = self.stores.comments.children_counts(&ids).await?;

        let summaries = comments
            .iter()
            .map(|comment| {
                mapper::comment::comment_summary(
                    comment,
                    likes.get(&comment.id).copied().unwrap_or(0),
                    children.get(&comment.id).copied().unwrap_or(0),
                )
            })
            .collect();
        Ok(written.with_content(summaries))
    }

    async fn mirror_new(&self, comment: &Comment) -> Result<(), ContentError> {
        let document = mapper::comment::comment_document_from(comment);
        if let Err(source) = self.stores.comment_documents.insert(&document).await {
            error!(comment_id = comment.id, document_id = %document.id, error = %source, "comment document insert failed after relational write");
            return Err(ContentError::Storage(source));
        }
        Ok(())
    }

    async fn enrich(
        &self,
        comments: &[Comment],
        token: Option<&str>,
    ) -> Result<Enrichment, ContentError> {
        let ids: Vec<i64> = comments.iter().map(|comment| comment.id).collect();
        let likes = self.stores.likes.count_comment_likes(&ids).await?;
        let children = self.stores.comments.children_counts(&ids).await?;
        let authors = lookup_members(
            self.remotes.members.as_ref(),
            comments.iter().map(|comment| comment.author_id),
            token,
        )
        .await;
        Ok(Enrichment {
            likes,
            children,
            authors,
        })
    }
}
