//! リモート呼び出しに付与するヘッダー。

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};

/// Idempotency-Keyヘッダーの名前。
pub(crate) const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";

/// Authorization（あれば）と Idempotency-Key を含むヘッダーを構築する。
///
/// 同じアクティビティの再送は同じキーになるため、受信側で重複を除ける。
pub(crate) fn activity_headers(token: Option<&str>, message_key: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();

    if let Some(token) = token {
        if let Ok(value) = HeaderValue::from_str(token) {
            headers.insert(AUTHORIZATION, value);
        }
    }

    if let Ok(value) = HeaderValue::from_str(message_key) {
        headers.insert(HeaderName::from_static("idempotency-key"), value);
    }

    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn activity_headers_carry_key_and_token() {
        let headers = activity_headers(Some("Bearer abc"), "post:1:2:POST_CREATE");

        assert_eq!(
            headers.get(IDEMPOTENCY_KEY_HEADER).unwrap().to_str().unwrap(),
            "post:1:2:POST_CREATE"
        );
        assert_eq!(
            headers.get(AUTHORIZATION).unwrap().to_str().unwrap(),
            "Bearer abc"
        );
    }

    #[test]
    fn activity_headers_skip_missing_token() {
        let headers = activity_headers(None, "post:1:2:POST_CREATE");
        assert_eq!(headers.len(), 1);
        assert!(headers.get(AUTHORIZATION).is_none());
    }
}
