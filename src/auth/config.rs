use crate::auth::AuthResult;

const DEV_SECRET: &str = "cesizen-secret-key-dev-2024";

/// Authentication configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub access_token_ttl_secs: i64,
    pub refresh_token_ttl_secs: i64,
    pub access_cookie_name: String,
    pub cookie_domain: Option<String>,
    pub cookie_secure: bool,
}

impl AuthConfig {
    pub fn from_env() -> AuthResult<Self> {
        let jwt_secret = std::env::var("CESIZEN_JWT_SECRET").unwrap_or_else(|_| {
            log::warn!("CESIZEN_JWT_SECRET not set, falling back to the development secret");
            DEV_SECRET.into()
        });
        let access_token_ttl_secs = std::env::var("CESIZEN_ACCESS_TOKEN_TTL_SECS")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(60 * 60);
        let refresh_token_ttl_secs = std::env::var("CESIZEN_REFRESH_TOKEN_TTL_SECS")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(7 * 24 * 60 * 60);
        let access_cookie_name = std::env::var("CESIZEN_ACCESS_COOKIE_NAME")
            .unwrap_or_else(|_| "access_token".into());
        let cookie_domain = std::env::var("CESIZEN_COOKIE_DOMAIN").ok();
        let cookie_secure = std::env::var("CESIZEN_COOKIE_SECURE")
            .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "on"))
            .unwrap_or(false);

        Ok(Self {
            jwt_secret,
            access_token_ttl_secs,
            refresh_token_ttl_secs,
            access_cookie_name,
            cookie_domain,
            cookie_secure,
        })
    }
}
