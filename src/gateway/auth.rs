/// 신원 검증 협력자 경계
/// 실제 인증 제공자는 외부 서비스라 가정하고, 엔진은 검증된 신원만 넘겨받는다
// region:    --- Imports
use async_trait::async_trait;

// endregion: --- Imports

// region:    --- Identity Verifier

/// 인증 오류
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("유효하지 않은 토큰입니다")]
    InvalidToken,
    #[error("토큰 검증에 실패했습니다: {0}")]
    VerifierUnavailable(String),
}

/// 토큰으로부터 사용자 id 를 검증한다
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<i64, AuthError>;
}

/// 앞단 인증 서비스가 발급한 `user-<id>` 형식 토큰을 해석하는 검증기 (개발/테스트용)
pub struct LocalTokenVerifier;

#[async_trait]
impl IdentityVerifier for LocalTokenVerifier {
    async fn verify(&self, token: &str) -> Result<i64, AuthError> {
        let user_id = token
            .strip_prefix("user-")
            .and_then(|raw| raw.parse::<i64>().ok())
            .ok_or(AuthError::InvalidToken)?;
        if user_id <= 0 {
            return Err(AuthError::InvalidToken);
        }
        Ok(user_id)
    }
}

// endregion: --- Identity Verifier
