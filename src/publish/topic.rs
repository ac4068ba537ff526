use chrono::{DateTime, NaiveDate, Utc};

use super::PublishError;
use crate::domain::ActivityRequest;

/// 日付ごとに切り替わるトピック名の規則。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicNaming {
    prefix: String,
    date_format: String,
}

impl TopicNaming {
    #[must_use]
    pub fn new(prefix: impl Into<String>, date_format: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            date_format: date_format.into(),
        }
    }

    #[must_use]
    pub fn topic_for(&self, date: NaiveDate) -> String {
        format!("{}{}", self.prefix, date.format(&self.date_format))
    }

    #[must_use]
    pub fn topic_at(&self, at: DateTime<Utc>) -> String {
        self.topic_for(at.date_naive())
    }
}

impl Default for TopicNaming {
    fn default() -> Self {
        Self::new("post-activity-", "%Y%m%d")
    }
}

/// アクティビティのメッセージキー。同じ対象への操作は同じキーになる。
///
/// # Errors
/// 識別子が正でない場合は [`PublishError::KeyCreation`]。
pub fn message_key(request: &ActivityRequest) -> Result<String, PublishError> {
    let member_id = request.member_id();
    let post_id = request.post_id();
    if member_id <= 0 || post_id <= 0 {
        return Err(PublishError::KeyCreation(format!(
            "member_id={member_id} post_id={post_id} must be positive"
        )));
    }
    let category = request.category();
    let activity_type = request.activity_type();
    match request.comment_id() {
        Some(comment_id) if comment_id <= 0 => Err(PublishError::KeyCreation(format!(
            "comment_id={comment_id} must be positive"
        ))),
        Some(comment_id) => Ok(format!(
            "{category}:{member_id}:{post_id}:{comment_id}:{activity_type}"
        )),
        None => Ok(format!("{category}:{member_id}:{post_id}:{activity_type}")),
    }
}
