use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, instrument, warn};

use super::{lookup_members, require_member};
use crate::clients::RemoteClients;
use crate::domain::{
    CreatePostRequest, Member, MemberActivityType, NewPost, Post, PostItemCounts, PostLikeDocument,
    PostView, UpdatePostRequest,
};
use crate::error::ContentError;
use crate::mapper;
use crate::observability::metrics::Metrics;
use crate::publish::ActivityDispatcher;
use crate::store::{KeywordScope, LikeInsert, Page, PageRequest, PostQuery, PostSort, Stores};

/// 投稿のユースケース。
#[derive(Clone)]
pub struct PostService {
    stores: Stores,
    remotes: RemoteClients,
    dispatcher: ActivityDispatcher,
    metrics: Arc<Metrics>,
}

impl PostService {
    #[must_use]
    pub fn new(
        stores: Stores,
        remotes: RemoteClients,
        dispatcher: ActivityDispatcher,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            stores,
            remotes,
            dispatcher,
            metrics,
        }
    }

    async fn find_live(&self, post_id: i64) -> Result<Post, ContentError> {
        self.stores
            .posts
            .find_active_post(post_id)
            .await?
            .ok_or(ContentError::PostNotFound(post_id))
    }

    /// # Errors
    /// 著者プロフィールの取得、保存、アクティビティ配信のいずれかに失敗した場合。
    #[instrument(skip(self, member, request, token), fields(member_id = member.id))]
    pub async fn create_post(
        &self,
        member: &Member,
        request: CreatePostRequest,
        token: Option<&str>,
    ) -> Result<PostView, ContentError> {
        let author = require_member(self.remotes.members.as_ref(), member.id, token).await?;

        let post = self
            .stores
            .posts
            .insert_post(&NewPost::new(request.title, request.content, member.id))
            .await?;

        let document = mapper::post::post_document_from(&post);
        if let Err(source) = self.stores.post_documents.insert(&document).await {
            error!(post_id = post.id, document_id = %document.id, error = %source, "post document insert failed after relational write");
            return Err(ContentError::Storage(source));
        }

        self.dispatcher
            .dispatch(
                mapper::activity::post_activity(member.id, post.id, MemberActivityType::PostCreate),
                token,
            )
            .await?;

        self.metrics.posts_created.inc();
        info!(post_id = post.id, "post created");
        Ok(mapper::post::post_view_from_created(&post, &author))
    }

    /// # Errors
    /// - `PostNotFound`: 投稿または現行ドキュメントが無い
    /// - `PostUpdateForbidden`: 著者ではない
    #[instrument(skip(self, member, request, token), fields(member_id = member.id))]
    pub async fn update_post(
        &self,
        member: &Member,
        post_id: i64,
        request: UpdatePostRequest,
        token: Option<&str>,
    ) -> Result<PostView, ContentError> {
        let mut post = self.find_live(post_id).await?;
        if !post.is_author(member.id) {
            return Err(ContentError::PostUpdateForbidden {
                post_id,
                member_id: member.id,
            });
        }

        let Some(mut current) = self.stores.post_documents.find_current(post_id).await? else {
            error!(post_id, "current post document missing");
            return Err(ContentError::PostNotFound(post_id));
        };

        post.apply_update(request.title, request.content, Utc::now());
        let next = mapper::post::post_document_next_version(&current, &post);
        current.supersede();
        self.stores
            .revisions
            .revise_post(&post, &current, &next)
            .await?;

        let counts = self.item_counts(post_id, token).await;
        let author = self
            .remotes
            .members
            .member_summary(member.id, token)
            .await
            .inspect_err(|error| warn!(member_id = member.id, error = %error, "member summary unavailable"))
            .ok();

        self.dispatcher
            .dispatch(
                mapper::activity::post_activity(member.id, post_id, MemberActivityType::PostUpdate),
                token,
            )
            .await?;

        self.metrics.posts_updated.inc();
        info!(post_id, version = next.version, "post updated");
        Ok(mapper::post::post_view_from_updated(
            &post,
            author.as_ref(),
            counts,
        ))
    }

    /// # Errors
    /// - `PostNotFound`: 投稿が無い
    /// - `PostDeleteForbidden`: 著者ではない
    #[instrument(skip(self, member, token), fields(member_id = member.id))]
    pub async fn delete_post(
        &self,
        member: &Member,
        post_id: i64,
        token: Option<&str>,
    ) -> Result<bool, ContentError> {
        let post = self.find_live(post_id).await?;
        if !post.is_author(member.id) {
            return Err(ContentError::PostDeleteForbidden {
                post_id,
                member_id: member.id,
            });
        }

        self.stores.posts.soft_delete_post(post_id).await?;

        match self.stores.post_documents.find_current(post_id).await? {
            Some(mut document) => {
                document.soft_delete();
                self.stores.post_documents.save(&document).await?;
            }
            None => warn!(post_id, "no current post document to delete"),
        }

        self.dispatcher
            .dispatch(
                mapper::activity::post_activity(member.id, post_id, MemberActivityType::PostDelete),
                token,
            )
            .await?;

        self.metrics.posts_deleted.inc();
        info!(post_id, "post deleted");
        Ok(true)
    }

    /// # Errors
    /// - `PostNotFound`: 投稿が無い
    /// - `PostLikeAlreadyExists`: 既にいいね済み
    #[instrument(skip(self, member, token), fields(member_id = member.id))]
    pub async fn like_post(
        &self,
        member: &Member,
        post_id: i64,
        token: Option<&str>,
    ) -> Result<(), ContentError> {
        let post = self.find_live(post_id).await?;
        let already_exists = ContentError::PostLikeAlreadyExists {
            post_id,
            member_id: member.id,
        };
        if self
            .stores
            .likes
            .find_post_like(post.id, member.id)
            .await?
            .is_some()
        {
            return Err(already_exists);
        }
        if self
            .stores
            .likes
            .insert_post_like(&PostLikeDocument::new(post.id, member.id))
            .await?
            == LikeInsert::Duplicate
        {
            return Err(already_exists);
        }

        self.dispatcher
            .dispatch(
                mapper::activity::post_like_activity(member.id, post.id, MemberActivityType::LikePost),
                token,
            )
            .await?;

        self.metrics.likes.with_label_values(&["post", "like"]).inc();
        Ok(())
    }

    /// # Errors
    /// - `PostNotFound`: 投稿が無い
    /// - `PostLikeCancelAlreadyCommitted`: いいねしていない
    #[instrument(skip(self, member, token), fields(member_id = member.id))]
    pub async fn unlike_post(
        &self,
        member: &Member,
        post_id: i64,
        token: Option<&str>,
    ) -> Result<(), ContentError> {
        let post = self.find_live(post_id).await?;
        let like = self
            .stores
            .likes
            .find_post_like(post.id, member.id)
            .await?
            .ok_or(ContentError::PostLikeCancelAlreadyCommitted {
                post_id,
                member_id: member.id,
            })?;
        self.stores.likes.delete_post_like(like.id).await?;

        self.dispatcher
            .dispatch(
                mapper::activity::post_like_activity(
                    member.id,
                    post.id,
                    MemberActivityType::LikePostCancel,
                ),
                token,
            )
            .await?;

        self.metrics
            .likes
            .with_label_values(&["post", "unlike"])
            .inc();
        Ok(())
    }

    /// 投稿詳細。閲覧数を 1 増やす。
    ///
    /// # Errors
    /// 投稿が無い場合は `PostNotFound`。
    pub async fn get_post(&self, post_id: i64, token: Option<&str>) -> Result<PostView, ContentError> {
        let mut post = self.find_live(post_id).await?;
        self.stores.posts.increment_view_count(post_id).await?;
        post.view_count += 1;

        let mut views = self.views(vec![post], token).await?;
        views.pop().ok_or(ContentError::PostNotFound(post_id))
    }

    /// # Errors
    /// ストアの読み取りに失敗した場合。
    pub async fn list_posts(
        &self,
        sort: PostSort,
        page: PageRequest,
        token: Option<&str>,
    ) -> Result<Page<PostView>, ContentError> {
        self.search(PostQuery::new(page).sort(sort), token).await
    }

    /// # Errors
    /// ストアの読み取りに失敗した場合。
    pub async fn search_posts(
        &self,
        keyword: &str,
        scope: KeywordScope,
        page: PageRequest,
        token: Option<&str>,
    ) -> Result<Page<PostView>, ContentError> {
        self.search(PostQuery::new(page).keyword(scope, keyword), token)
            .await
    }

    /// # Errors
    /// ストアの読み取りに失敗した場合。
    pub async fn posts_by_author(
        &self,
        author_id: i64,
        page: PageRequest,
        token: Option<&str>,
    ) -> Result<Page<PostView>, ContentError> {
        self.search(PostQuery::new(page).authors([author_id]), token)
            .await
    }

    async fn search(
        &self,
        query: PostQuery,
        token: Option<&str>,
    ) -> Result<Page<PostView>, ContentError> {
        let mut page = self.stores.posts.search_posts(&query).await?;
        let posts = std::mem::take(&mut page.content);
        let views = self.views(posts, token).await?;
        Ok(page.with_content(views))
    }

    /// いいね数とコメント数はローカルのストアから数える。著者は取得できた分だけ付ける。
    async fn views(&self, posts: Vec<Post>, token: Option<&str>) -> Result<Vec<PostView>, ContentError> {
        if posts.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<i64> = posts.iter().map(|post| post.id).collect();
        let like_counts = self.stores.likes.count_post_likes(&ids).await?;
        let comment_counts = self.stores.comments.comment_counts_by_posts(&ids).await?;
        let authors = lookup_members(
            self.remotes.members.as_ref(),
            posts.iter().map(|post| post.author_id),
            token,
        )
        .await;

        Ok(posts
            .iter()
            .map(|post| {
                mapper::post::post_view(
                    post,
                    authors.get(&post.author_id),
                    like_counts.get(&post.id).copied().unwrap_or(0),
                    comment_counts.get(&post.id).copied().unwrap_or(0),
                )
            })
            .collect())
    }

    async fn item_counts(&self, post_id: i64, token: Option<&str>) -> PostItemCounts {
        match self.remotes.timeline.post_item_counts(post_id, token).await {
            Ok(counts) => counts,
            Err(error) => {
                warn!(post_id, error = %error, "timeline counts unavailable, using zero counts");
                PostItemCounts::default()
            }
        }
    }
}
