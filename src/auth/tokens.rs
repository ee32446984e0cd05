use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use uuid::Uuid;

use crate::auth::{AuthConfig, AuthError, AuthResult};

/// What a token is allowed to be used for. A leaked refresh token must not
/// be replayable as an access token, so the purpose check is explicit and
/// independent of the TTLs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenPurpose {
    Access,
    Refresh,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Claims {
    pub user_id: String,
    pub iat: i64,
    pub exp: i64,
    pub purpose: TokenPurpose,
}

#[derive(Debug, Clone)]
pub struct SignedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Stateless HMAC-SHA256 token issuance and verification. Verification is
/// pure: it never consults the credential store.
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    access_token_ttl: Duration,
    refresh_token_ttl: Duration,
}

impl TokenService {
    pub fn from_config(config: &AuthConfig) -> AuthResult<Self> {
        let secret_bytes = config.jwt_secret.as_bytes();
        let encoding_key = EncodingKey::from_secret(secret_bytes);
        let decoding_key = DecodingKey::from_secret(secret_bytes);

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_aud = false;
        // Expiry must be exact: a token is dead at expires_at, not a
        // minute later.
        validation.leeway = 0;

        Ok(Self {
            encoding_key,
            decoding_key,
            validation,
            access_token_ttl: Duration::seconds(config.access_token_ttl_secs),
            refresh_token_ttl: Duration::seconds(config.refresh_token_ttl_secs),
        })
    }

    pub fn issue(
        &self,
        subject: Uuid,
        purpose: TokenPurpose,
        ttl: Duration,
    ) -> AuthResult<SignedToken> {
        let now = Utc::now();
        let expires_at = now + ttl;

        let claims = Claims {
            user_id: subject.to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            purpose,
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)?;

        Ok(SignedToken { token, expires_at })
    }

    pub fn issue_access_token(&self, subject: Uuid) -> AuthResult<SignedToken> {
        self.issue(subject, TokenPurpose::Access, self.access_token_ttl)
    }

    pub fn issue_refresh_token(&self, subject: Uuid) -> AuthResult<SignedToken> {
        self.issue(subject, TokenPurpose::Refresh, self.refresh_token_ttl)
    }

    /// Decode and validate a token, rejecting with [`AuthError::TokenExpired`]
    /// when past `exp` and [`AuthError::TokenInvalid`] for a bad signature,
    /// malformed payload, or purpose mismatch.
    pub fn verify(&self, token: &str, expected_purpose: TokenPurpose) -> AuthResult<Claims> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(
            |err| match err.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::TokenInvalid,
            },
        )?;

        if data.claims.purpose != expected_purpose {
            return Err(AuthError::TokenInvalid);
        }

        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthConfig;

    fn make_test_config() -> AuthConfig {
        AuthConfig {
            jwt_secret: "super-secret-test-key".into(),
            access_token_ttl_secs: 3600,
            refresh_token_ttl_secs: 604800,
            access_cookie_name: "access_token".into(),
            cookie_domain: None,
            cookie_secure: false,
        }
    }

    fn service() -> TokenService {
        TokenService::from_config(&make_test_config()).expect("token service")
    }

    #[test]
    fn issues_and_verifies_access_tokens() {
        let service = service();
        let subject = Uuid::new_v4();

        let signed = service.issue_access_token(subject).expect("issue token");
        let claims = service
            .verify(&signed.token, TokenPurpose::Access)
            .expect("verify token");

        assert_eq!(claims.user_id, subject.to_string());
        assert_eq!(claims.purpose, TokenPurpose::Access);
        assert!(claims.exp > claims.iat);
        assert_eq!(claims.exp, signed.expires_at.timestamp());
    }

    #[test]
    fn rejects_purpose_mismatch_both_ways() {
        let service = service();
        let subject = Uuid::new_v4();

        let refresh = service.issue_refresh_token(subject).expect("issue refresh");
        let err = service
            .verify(&refresh.token, TokenPurpose::Access)
            .expect_err("refresh token must not pass an access check");
        assert!(matches!(err, AuthError::TokenInvalid));

        let access = service.issue_access_token(subject).expect("issue access");
        let err = service
            .verify(&access.token, TokenPurpose::Refresh)
            .expect_err("access token must not pass a refresh check");
        assert!(matches!(err, AuthError::TokenInvalid));
    }

    #[test]
    fn rejects_expired_tokens_as_expired() {
        let service = service();
        let signed = service
            .issue(Uuid::new_v4(), TokenPurpose::Access, Duration::seconds(-10))
            .expect("issue expired token");

        let err = service
            .verify(&signed.token, TokenPurpose::Access)
            .expect_err("expired token must be rejected");
        assert!(matches!(err, AuthError::TokenExpired));
    }

    #[test]
    fn rejects_tampered_signature_as_invalid() {
        let service = service();
        let signed = service
            .issue_access_token(Uuid::new_v4())
            .expect("issue token");

        let mut parts: Vec<String> = signed.token.split('.').map(String::from).collect();
        assert_eq!(parts.len(), 3);
        let sig = parts[2].clone();
        let flipped = if sig.starts_with('A') { "B" } else { "A" };
        parts[2] = format!("{}{}", flipped, &sig[1..]);
        let tampered = parts.join(".");

        let err = service
            .verify(&tampered, TokenPurpose::Access)
            .expect_err("tampered token must be rejected");
        assert!(matches!(err, AuthError::TokenInvalid));
    }

    #[test]
    fn rejects_garbage_as_invalid() {
        let service = service();
        let err = service
            .verify("definitely.not.a-jwt", TokenPurpose::Access)
            .expect_err("garbage must be rejected");
        assert!(matches!(err, AuthError::TokenInvalid));
    }

    #[test]
    fn rejects_token_signed_with_another_secret() {
        let service = service();
        let mut other_config = make_test_config();
        other_config.jwt_secret = "a-different-secret".into();
        let other = TokenService::from_config(&other_config).expect("token service");

        let signed = other
            .issue_access_token(Uuid::new_v4())
            .expect("issue token");
        let err = service
            .verify(&signed.token, TokenPurpose::Access)
            .expect_err("foreign signature must be rejected");
        assert!(matches!(err, AuthError::TokenInvalid));
    }
}
