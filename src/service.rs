//! 投稿・コメントのユースケース。
//!
//! 書き込みはリレーショナル → ドキュメント → アクティビティ配信の順に行う。
//! 分散トランザクションは無いため、途中で失敗した場合は両方の ID をログに残す。

pub mod comment;
pub mod post;

use std::collections::{BTreeSet, HashMap};

use futures::future::join_all;
use tracing::warn;

use crate::clients::{MemberApi, RemoteError};
use crate::domain::MemberSummary;
use crate::error::ContentError;

pub use comment::CommentService;
pub use post::PostService;

/// 書き込み系で使う著者プロフィール。取得できなければ操作を失敗させる。
pub(crate) async fn require_member(
    members: &dyn MemberApi,
    member_id: i64,
    token: Option<&str>,
) -> Result<MemberSummary, ContentError> {
    members
        .member_summary(member_id, token)
        .await
        .map_err(|error| member_lookup_error(member_id, error))
}

/// 読み取り系で使う著者プロフィール。取得できなかった会員はマップに含めない。
pub(crate) async fn lookup_members(
    members: &dyn MemberApi,
    member_ids: impl IntoIterator<Item = i64>,
    token: Option<&str>,
) -> HashMap<i64, MemberSummary> {
    let unique: BTreeSet<i64> = member_ids.into_iter().collect();
    let lookups = unique.into_iter().map(|member_id| async move {
        (member_id, members.member_summary(member_id, token).await)
    });

    join_all(lookups)
        .await
        .into_iter()
        .filter_map(|(member_id, result)| match result {
            Ok(summary) => Some((member_id, summary)),
            Err(error) => {
                warn!(member_id, error = %error, "member summary unavailable, omitting author");
                None
            }
        })
        .collect()
}

pub(crate) fn member_lookup_error(member_id: i64, error: RemoteError) -> ContentError {
    match error {
        RemoteError::NotFound { .. } => ContentError::MemberNotFound(member_id),
        RemoteError::TooManyRequests(service) => ContentError::TooManyRequests(service),
        RemoteError::Failed { service, source } => ContentError::RemoteCallFailed {
            service,
            message: format!("{source:#}"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::StubMemberApi;

    #[tokio::test]
    async fn lookup_members_skips_unknown_members() {
        let members = StubMemberApi::with_members([1, 2]);
        let found = lookup_members(&members, [2, 1, 2, 9], None).await;

        assert_eq!(found.len(), 2);
        assert!(found.contains_key(&1));
        assert!(!found.contains_key(&9));
        assert_eq!(members.calls(), 3);
    }

    #[tokio::test]
    async fn require_member_maps_not_found() {
        let members = StubMemberApi::with_members([1]);
        let error = require_member(&members, 5, None).await.unwrap_err();
        assert!(matches!(error, ContentError::MemberNotFound(5)));
    }
}
