/// 認証エクストラクター。
///
/// 本人確認は外部の認証サービスが担い、本サービスはそのサービスと
/// 共有する資格情報で署名済みトークンを検証するだけです。トークンの
/// 形式は `<user_id>.<signature>`、署名は `md5(user_id + ":" + secret)`
/// の16進表現です。
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;

use crate::app::AppState;

use super::error::ApiError;

/// 検証済みの呼び出し元識別。
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Identity {
    pub(crate) user_id: String,
    pub(crate) is_admin: bool,
}

impl FromRequestParts<AppState> for Identity {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(ApiError::unauthorized)?;

        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(ApiError::unauthorized)?;

        verify_token(token, state.config().auth_credentials()).ok_or_else(ApiError::unauthorized)
    }
}

/// トークンを検証し、通れば識別情報を返す。
pub(crate) fn verify_token(token: &str, secret: &str) -> Option<Identity> {
    let (user_id, signature) = token.rsplit_once('.')?;
    if user_id.is_empty() {
        return None;
    }

    let expected = format!("{:x}", md5::compute(format!("{user_id}:{secret}")));
    if signature != expected {
        return None;
    }

    Some(Identity {
        user_id: user_id.to_string(),
        is_admin: user_id == "admin",
    })
}

/// 検証を通るトークンを発行する（テストと運用ツール用）。
#[must_use]
pub fn issue_token(user_id: &str, secret: &str) -> String {
    let signature = format!("{:x}", md5::compute(format!("{user_id}:{secret}")));
    format!("{user_id}.{signature}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_token_verifies() {
        let token = issue_token("user-1", "secret");
        let identity = verify_token(&token, "secret").unwrap();
        assert_eq!(identity.user_id, "user-1");
        assert!(!identity.is_admin);
    }

    #[test]
    fn admin_user_is_flagged() {
        let token = issue_token("admin", "secret");
        assert!(verify_token(&token, "secret").unwrap().is_admin);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = issue_token("user-1", "secret");
        assert!(verify_token(&token, "other-secret").is_none());
    }

    #[test]
    fn malformed_tokens_are_rejected() {
        assert!(verify_token("no-dot-here", "secret").is_none());
        assert!(verify_token(".signature-only", "secret").is_none());
        assert!(verify_token("", "secret").is_none());
    }
}
