//! 投稿・コメント検索の型付きクエリ。
//!
//! 列とソート順を列挙型で表し、`sqlx::QueryBuilder` へ描画する。値はすべてバインド
//! パラメータとして渡し、SQL 文字列に埋め込まない。同じ述語をメモリ上でも評価できる。
use std::{cmp::Ordering, str::FromStr};

use chrono::{DateTime, Utc};
use sqlx::{Postgres, QueryBuilder};

use super::page::PageRequest;
use crate::domain::{Comment, Post};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostColumn {
    Id,
    Title,
    Content,
    AuthorId,
    ViewCount,
    IsDeleted,
    CreatedAt,
    UpdatedAt,
}

impl PostColumn {
    pub const ALL: [Self; 8] = [
        Self::Id,
        Self::Title,
        Self::Content,
        Self::AuthorId,
        Self::ViewCount,
        Self::IsDeleted,
        Self::CreatedAt,
        Self::UpdatedAt,
    ];

    #[must_use]
    pub const fn qualified(self) -> &'static str {
        match self {
            Self::Id => "p.id",
            Self::Title => "p.title",
            Self::Content => "p.content",
            Self::AuthorId => "p.author_id",
            Self::ViewCount => "p.view_count",
            Self::IsDeleted => "p.is_deleted",
            Self::CreatedAt => "p.created_at",
            Self::UpdatedAt => "p.updated_at",
        }
    }
}

/// キーワード検索の対象列。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeywordScope {
    Title,
    Content,
    #[default]
    TitleOrContent,
}

impl FromStr for KeywordScope {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_lowercase().as_str() {
            "title" => Ok(Self::Title),
            "content" => Ok(Self::Content),
            "all" | "title_or_content" => Ok(Self::TitleOrContent),
            other => Err(anyhow::anyhow!("unknown keyword scope: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PostSort {
    #[default]
    Recent,
    /// 閲覧数 + いいね数 * 2
    Popular,
    MostViewed,
    MostCommented,
    /// 最新コメント時刻（なければ作成時刻）
    RecentActivity,
}

impl FromStr for PostSort {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_lowercase().as_str() {
            "recent" | "latest" => Ok(Self::Recent),
            "popular" => Ok(Self::Popular),
            "most_viewed" | "views" => Ok(Self::MostViewed),
            "most_commented" | "comments" => Ok(Self::MostCommented),
            "recent_activity" | "activity" => Ok(Self::RecentActivity),
            other => Err(anyhow::anyhow!("unknown post sort: {other}")),
        }
    }
}

impl PostSort {
    fn needs_like_counts(self) -> bool {
        matches!(self, Self::Popular)
    }

    fn needs_comment_stats(self) -> bool {
        matches!(self, Self::MostCommented | Self::RecentActivity)
    }

    fn order_by(self) -> &'static str {
        match self {
            Self::Recent => " ORDER BY p.created_at DESC, p.id DESC",
            Self::Popular => {
                " ORDER BY (p.view_count + COALESCE(pl.like_count, 0) * 2) DESC, p.created_at DESC, p.id DESC"
            }
            Self::MostViewed => " ORDER BY p.view_count DESC, p.created_at DESC, p.id DESC",
            Self::MostCommented => {
                " ORDER BY COALESCE(pc.comment_count, 0) DESC, p.created_at DESC, p.id DESC"
            }
            Self::RecentActivity => {
                " ORDER BY COALESCE(pc.last_commented_at, p.created_at) DESC, p.id DESC"
            }
        }
    }
}

/// メモリ上でソートするときに使う投稿ごとの集計値。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PostStats {
    pub like_count: i64,
    pub comment_count: i64,
    pub last_commented_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostQuery {
    keyword: Option<(KeywordScope, String)>,
    author_ids: Vec<i64>,
    post_ids: Vec<i64>,
    created_from: Option<DateTime<Utc>>,
    created_to: Option<DateTime<Utc>>,
    sort: PostSort,
    page: PageRequest,
}

impl PostQuery {
    #[must_use]
    pub fn new(page: PageRequest) -> Self {
        Self {
            keyword: None,
            author_ids: Vec::new(),
            post_ids: Vec::new(),
            created_from: None,
            created_to: None,
            sort: PostSort::default(),
            page,
        }
    }

    #[must_use]
    pub fn keyword(mut self, scope: KeywordScope, keyword: impl Into<String>) -> Self {
        self.keyword = Some((scope, keyword.into()));
        self
    }

    #[must_use]
    pub fn authors(mut self, author_ids: impl IntoIterator<Item = i64>) -> Self {
        self.author_ids = author_ids.into_iter().collect();
        self
    }

    #[must_use]
    pub fn posts(mut self, post_ids: impl IntoIterator<Item = i64>) -> Self {
        self.post_ids = post_ids.into_iter().collect();
        self
    }

    #[must_use]
    pub fn created_between(mut self, from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        self.created_from = Some(from);
        self.created_to = Some(to);
        self
    }

    #[must_use]
    pub fn sort(mut self, sort: PostSort) -> Self {
        self.sort = sort;
        self
    }

    #[must_use]
    pub fn page(&self) -> PageRequest {
        self.page
    }

    #[must_use]
    pub fn sort_order(&self) -> PostSort {
        self.sort
    }

    /// 1 ページ分の投稿を取得する SELECT を組み立てる。
    #[must_use]
    pub fn select_builder(&self) -> QueryBuilder<'static, Postgres> {
        let columns = PostColumn::ALL
            .iter()
            .map(|column| column.qualified())
            .collect::<Vec<_>>()
            .join(", ");
        let mut builder = QueryBuilder::new(format!("SELECT {columns} FROM posts p"));
        if self.sort.needs_like_counts() {
            builder.push(
                " LEFT JOIN (SELECT (body->>'post_pk')::BIGINT AS post_pk, COUNT(*) AS like_count \
                 FROM post_likes GROUP BY 1) pl ON pl.post_pk = p.id",
            );
        }
        if self.sort.needs_comment_stats() {
            builder.push(
                " LEFT JOIN (SELECT post_id, COUNT(*) AS comment_count, MAX(created_at) AS last_commented_at \
                 FROM comments WHERE NOT is_deleted GROUP BY post_id) pc ON pc.post_id = p.id",
            );
        }
        self.push_filters(&mut builder);
        builder.push(self.sort.order_by());
        builder.push(" LIMIT ").push_bind(self.page.limit());
        builder.push(" OFFSET ").push_bind(self.page.offset());
        builder
    }

    /// 条件に一致する投稿件数を数える SELECT を組み立てる。
    #[must_use]
    pub fn count_builder(&self) -> QueryBuilder<'static, Postgres> {
        let mut builder = QueryBuilder::new("SELECT COUNT(*) AS total FROM posts p");
        self.push_filters(&mut builder);
        builder
    }

    fn push_filters(&self, builder: &mut QueryBuilder<'static, Postgres>) {
        builder.push(" WHERE NOT ").push(PostColumn::IsDeleted.qualified());

        if let Some((scope, keyword)) = &self.keyword {
            let pattern = like_pattern(keyword);
            match scope {
                KeywordScope::Title => {
                    builder
                        .push(" AND ")
                        .push(PostColumn::Title.qualified())
                        .push(" ILIKE ")
                        .push_bind(pattern);
                }
                KeywordScope::Content => {
                    builder
                        .push(" AND ")
                        .push(PostColumn::Content.qualified())
                        .push(" ILIKE ")
                        .push_bind(pattern);
                }
                KeywordScope::TitleOrContent => {
                    builder
                        .push(" AND (")
                        .push(PostColumn::Title.qualified())
                        .push(" ILIKE ")
                        .push_bind(pattern.clone())
                        .push(" OR ")
                        .push(PostColumn::Content.qualified())
                        .push(" ILIKE ")
                        .push_bind(pattern)
                        .push(")");
                }
            }
        }

        if !self.author_ids.is_empty() {
            builder
                .push(" AND ")
                .push(PostColumn::AuthorId.qualified())
                .push(" = ANY(")
                .push_bind(self.author_ids.clone())
                .push(")");
        }

        if !self.post_ids.is_empty() {
            builder
                .push(" AND ")
                .push(PostColumn::Id.qualified())
                .push(" = ANY(")
                .push_bind(self.post_ids.clone())
                .push(")");
        }

        if let Some(from) = self.created_from {
            builder
                .push(" AND ")
                .push(PostColumn::CreatedAt.qualified())
                .push(" >= ")
                .push_bind(from);
        }

        if let Some(to) = self.created_to {
            builder
                .push(" AND ")
                .push(PostColumn::CreatedAt.qualified())
                .push(" <= ")
                .push_bind(to);
        }
    }

    /// SQL の WHERE 句と同じ条件をメモリ上で評価する。
    #[must_use]
    pub fn matches(&self, post: &Post) -> bool {
        if post.is_deleted {
            return false;
        }
        if let Some((scope, keyword)) = &self.keyword {
            let needle = keyword.to_lowercase();
            let in_title = post.title.to_lowercase().contains(&needle);
            let in_content = post.content.to_lowercase().contains(&needle);
            let hit = match scope {
                KeywordScope::Title => in_title,
                KeywordScope::Content => in_content,
                KeywordScope::TitleOrContent => in_title || in_content,
            };
            if !hit {
                return false;
            }
        }
        if !self.author_ids.is_empty() && !self.author_ids.contains(&post.author_id) {
            return false;
        }
        if !self.post_ids.is_empty() && !self.post_ids.contains(&post.id) {
            return false;
        }
        if self.created_from.is_some_and(|from| post.created_at < from) {
            return false;
        }
        if self.created_to.is_some_and(|to| post.created_at > to) {
            return false;
        }
        true
    }

    /// ORDER BY と同じ順序で二つの投稿を比較する。
    #[must_use]
    pub fn compare(&self, a: (&Post, &PostStats), b: (&Post, &PostStats)) -> Ordering {
        let (post_a, stats_a) = a;
        let (post_b, stats_b) = b;
        let newest = || {
            post_b
                .created_at
                .cmp(&post_a.created_at)
                .then_with(|| post_b.id.cmp(&post_a.id))
        };
        match self.sort {
            PostSort::Recent => newest(),
            PostSort::Popular => {
                let score_a = post_a.view_count + stats_a.like_count * 2;
                let score_b = post_b.view_count + stats_b.like_count * 2;
                score_b.cmp(&score_a).then_with(newest)
            }
            PostSort::MostViewed => post_b.view_count.cmp(&post_a.view_count).then_with(newest),
            PostSort::MostCommented => stats_b
                .comment_count
                .cmp(&stats_a.comment_count)
                .then_with(newest),
            PostSort::RecentActivity => {
                let active_a = stats_a.last_commented_at.unwrap_or(post_a.created_at);
                let active_b = stats_b.last_commented_at.unwrap_or(post_b.created_at);
                active_b
                    .cmp(&active_a)
                    .then_with(|| post_b.id.cmp(&post_a.id))
            }
        }
    }
}

/// コメント一覧の条件。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentQuery {
    /// 投稿直下のコメント（返信を除く）
    ByPost(i64),
    ByParent(i64),
    ByAuthor(i64),
}

const COMMENT_COLUMNS: &str = "c.id, c.content, c.author_id, c.post_id, c.parent_id, c.depth, c.is_deleted, c.created_at, c.updated_at";

impl CommentQuery {
    #[must_use]
    pub fn select_builder(&self, page: PageRequest) -> QueryBuilder<'static, Postgres> {
        let mut builder = QueryBuilder::new(format!("SELECT {COMMENT_COLUMNS} FROM comments c"));
        self.push_filters(&mut builder);
        builder.push(self.order_by());
        builder.push(" LIMIT ").push_bind(page.limit());
        builder.push(" OFFSET ").push_bind(page.offset());
        builder
    }

    #[must_use]
    pub fn count_builder(&self) -> QueryBuilder<'static, Postgres> {
        let mut builder = QueryBuilder::new("SELECT COUNT(*) AS total FROM comments c");
        self.push_filters(&mut builder);
        builder
    }

    fn push_filters(&self, builder: &mut QueryBuilder<'static, Postgres>) {
        builder.push(" WHERE NOT c.is_deleted");
        match *self {
            Self::ByPost(post_id) => {
                builder
                    .push(" AND c.post_id = ")
                    .push_bind(post_id)
                    .push(" AND c.parent_id IS NULL");
            }
            Self::ByParent(parent_id) => {
                builder.push(" AND c.parent_id = ").push_bind(parent_id);
            }
            Self::ByAuthor(author_id) => {
                builder.push(" AND c.author_id = ").push_bind(author_id);
            }
        }
    }

    fn order_by(&self) -> &'static str {
        match self {
            Self::ByPost(_) | Self::ByParent(_) => " ORDER BY c.created_at ASC, c.id ASC",
            Self::ByAuthor(_) => " ORDER BY c.created_at DESC, c.id DESC",
        }
    }

    #[must_use]
    pub fn matches(&self, comment: &Comment) -> bool {
        if comment.is_deleted {
            return false;
        }
        match *self {
            Self::ByPost(post_id) => comment.post_id == post_id && comment.parent_id.is_none(),
            Self::ByParent(parent_id) => comment.parent_id == Some(parent_id),
            Self::ByAuthor(author_id) => comment.author_id == author_id,
        }
    }

    #[must_use]
    pub fn compare(&self, a: &Comment, b: &Comment) -> Ordering {
        let oldest = a
            .created_at
            .cmp(&b.created_at)
            .then_with(|| a.id.cmp(&b.id));
        match self {
            Self::ByPost(_) | Self::ByParent(_) => oldest,
            Self::ByAuthor(_) => oldest.reverse(),
        }
    }
}

/// ILIKE 用の部分一致パターン。ワイルドカード文字はエスケープする。
fn like_pattern(keyword: &str) -> String {
    let mut escaped = String::with_capacity(keyword.len() + 2);
    escaped.push('%');
    for ch in keyword.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn request() -> PageRequest {
        PageRequest::new(1, 20).unwrap()
    }

    fn post(id: i64, title: &str, content: &str, author_id: i64, views: i64) -> Post {
        let created = Utc.with_ymd_and_hms(2026, 10, 1, 0, 0, 0).unwrap()
            + chrono::Duration::minutes(id);
        Post {
            id,
            title: title.to_string(),
            content: content.to_string(),
            author_id,
            view_count: views,
            is_deleted: false,
            created_at: created,
            updated_at: created,
        }
    }

    #[test]
    fn recent_query_renders_paging_binds() {
        let query = PostQuery::new(request());
        let builder = query.select_builder();
        let sql = builder.sql();
        assert!(sql.starts_with("SELECT p.id, p.title"));
        assert!(sql.contains("WHERE NOT p.is_deleted"));
        assert!(sql.contains("ORDER BY p.created_at DESC, p.id DESC"));
        assert!(sql.ends_with("LIMIT $1 OFFSET $2"));
        assert!(!sql.contains("JOIN"));
    }

    #[test]
    fn title_or_content_keyword_binds_pattern_twice() {
        let query = PostQuery::new(request()).keyword(KeywordScope::TitleOrContent, "rust");
        let builder = query.count_builder();
        assert_eq!(
            builder.sql(),
            "SELECT COUNT(*) AS total FROM posts p WHERE NOT p.is_deleted AND (p.title ILIKE $1 OR p.content ILIKE $2)"
        );
    }

    #[test]
    fn filters_are_combined_in_order() {
        let from = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let to = Utc.with_ymd_and_hms(2026, 12, 31, 0, 0, 0).unwrap();
        let query = PostQuery::new(request())
            .keyword(KeywordScope::Title, "news")
            .authors([1, 2])
            .created_between(from, to);
        let builder = query.count_builder();
        assert_eq!(
            builder.sql(),
            "SELECT COUNT(*) AS total FROM posts p WHERE NOT p.is_deleted AND p.title ILIKE $1 AND p.author_id = ANY($2) AND p.created_at >= $3 AND p.created_at <= $4"
        );
    }

    #[test]
    fn popular_sort_joins_like_counts() {
        let query = PostQuery::new(request()).sort(PostSort::Popular);
        let builder = query.select_builder();
        let sql = builder.sql();
        assert!(sql.contains("FROM post_likes GROUP BY 1) pl"));
        assert!(sql.contains("ORDER BY (p.view_count + COALESCE(pl.like_count, 0) * 2) DESC"));
    }

    #[test]
    fn most_commented_sort_joins_comment_stats() {
        let query = PostQuery::new(request()).sort(PostSort::MostCommented);
        let builder = query.select_builder();
        let sql = builder.sql();
        assert!(sql.contains("FROM comments WHERE NOT is_deleted GROUP BY post_id) pc"));
        assert!(sql.contains("ORDER BY COALESCE(pc.comment_count, 0) DESC"));
    }

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
    }

    #[test]
    fn matches_applies_keyword_scope_case_insensitively() {
        let target = post(1, "Daily Rust", "borrow checker", 1, 0);
        let title_query = PostQuery::new(request()).keyword(KeywordScope::Title, "rust");
        let content_query = PostQuery::new(request()).keyword(KeywordScope::Content, "rust");
        assert!(title_query.matches(&target));
        assert!(!content_query.matches(&target));
    }

    #[test]
    fn matches_excludes_deleted_and_foreign_authors() {
        let mut deleted = post(1, "", "x", 1, 0);
        deleted.is_deleted = true;
        let query = PostQuery::new(request()).authors([2]);
        assert!(!query.matches(&deleted));
        assert!(!query.matches(&post(2, "", "x", 1, 0)));
        assert!(query.matches(&post(3, "", "x", 2, 0)));
    }

    #[test]
    fn popular_compare_weights_likes_twice() {
        let query = PostQuery::new(request()).sort(PostSort::Popular);
        let viewed = post(1, "", "", 1, 5);
        let liked = post(2, "", "", 1, 0);
        let viewed_stats = PostStats::default();
        let liked_stats = PostStats {
            like_count: 3,
            ..PostStats::default()
        };
        assert_eq!(
            query.compare((&liked, &liked_stats), (&viewed, &viewed_stats)),
            Ordering::Less
        );
    }

    #[test]
    fn comment_queries_render_scope() {
        let page = PageRequest::new(0, 10).unwrap();
        let by_post = CommentQuery::ByPost(5).select_builder(page);
        assert!(by_post.sql().contains("c.post_id = $1 AND c.parent_id IS NULL"));
        assert!(by_post.sql().contains("ORDER BY c.created_at ASC"));
        let by_author = CommentQuery::ByAuthor(9).count_builder();
        assert_eq!(
            by_author.sql(),
            "SELECT COUNT(*) AS total FROM comments c WHERE NOT c.is_deleted AND c.author_id = $1"
        );
    }

    #[test]
    fn parse_sort_and_scope() {
        assert_eq!("popular".parse::<PostSort>().unwrap(), PostSort::Popular);
        assert_eq!("TITLE".parse::<KeywordScope>().unwrap(), KeywordScope::Title);
        assert!("sideways".parse::<PostSort>().is_err());
    }
}
