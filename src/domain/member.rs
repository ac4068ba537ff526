use serde::{Deserialize, Serialize};

/// リクエストを発行した会員。上流ゲートウェイで認証済みの識別子のみを保持する。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub id: i64,
}

impl Member {
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self { id }
    }
}

/// member サービスから取得する会員プロフィールの要約。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberSummary {
    pub id: i64,
    pub member_name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub member_handle: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}
