use chrono::Utc;
use rocket::State;
use rocket::http::{Cookie, CookieJar, SameSite};
use rocket::serde::json::Json;
use rocket_okapi::openapi;
use uuid::Uuid;

use crate::auth::responses::{
    LoginRequest, LoginResponse, MessageResponse, RefreshRequest, RefreshResponse,
    RegisterRequest, UserSummary,
};
use crate::auth::tokens::TokenPurpose;
use crate::auth::{AuthConfig, AuthError, AuthState, AuthUser, Role};
use crate::error::{ApiError, CreatedJson};
use crate::rate_limit::guards::{ApiRateLimit, AuthRateLimit};
use crate::store::{NewUser, SharedUserStore, UserRecord};

const MIN_PASSWORD_CHARS: usize = 6;

fn set_access_cookie(cookies: &CookieJar<'_>, config: &AuthConfig, token: &str) {
    let mut cookie = Cookie::new(config.access_cookie_name.clone(), token.to_string());
    cookie.set_http_only(true);
    cookie.set_same_site(SameSite::Lax);
    cookie.set_path("/");
    cookie.set_secure(config.cookie_secure);
    cookie.set_max_age(time::Duration::seconds(config.access_token_ttl_secs));
    if let Some(domain) = &config.cookie_domain {
        cookie.set_domain(domain.clone());
    }
    cookies.add(cookie);
}

fn clear_access_cookie(cookies: &CookieJar<'_>, config: &AuthConfig) {
    let mut removal = Cookie::new(config.access_cookie_name.clone(), "");
    removal.set_path("/");
    cookies.remove(removal);
}

fn issue_session(
    auth: &AuthState,
    cookies: &CookieJar<'_>,
    user: &UserRecord,
) -> Result<LoginResponse, ApiError> {
    let access = auth.token_service.issue_access_token(user.id)?;
    let refresh = auth.token_service.issue_refresh_token(user.id)?;
    set_access_cookie(cookies, &auth.config, &access.token);

    Ok(LoginResponse {
        access_token: access.token,
        access_token_expires_at: access.expires_at,
        refresh_token: refresh.token,
        refresh_token_expires_at: refresh.expires_at,
        user: UserSummary::from(user),
    })
}

/// Create an account and open a session for it.
#[openapi(tag = "Auth")]
#[post("/auth/register", format = "json", data = "<body>")]
pub async fn register(
    _rate: AuthRateLimit,
    auth: &State<AuthState>,
    store: &State<SharedUserStore>,
    cookies: &CookieJar<'_>,
    body: Json<RegisterRequest>,
) -> Result<CreatedJson<LoginResponse>, ApiError> {
    let body = body.into_inner();
    let first_name = body.first_name.trim().to_string();
    let last_name = body.last_name.trim().to_string();
    let email = body.email.trim().to_lowercase();

    if first_name.is_empty() || last_name.is_empty() || email.is_empty() {
        return Err(ApiError::BadRequest(
            "first_name, last_name and email are required".into(),
        ));
    }
    if !email.contains('@') {
        return Err(ApiError::BadRequest("invalid email address".into()));
    }
    if body.password.chars().count() < MIN_PASSWORD_CHARS {
        return Err(ApiError::BadRequest(format!(
            "password must be at least {} characters",
            MIN_PASSWORD_CHARS
        )));
    }

    let password_hash = auth.password_service.hash_password(&body.password)?;
    let record = store
        .insert(NewUser {
            first_name,
            last_name,
            email,
            password_hash,
            role: Role::User,
        })
        .await?;

    log::info!("registered user {}", record.id);
    let response = issue_session(auth, cookies, &record)?;
    Ok(CreatedJson(response))
}

/// Exchange credentials for an access/refresh token pair.
///
/// An unknown email, a wrong password, and a deactivated account all
/// answer with the same 401 so the response does not reveal which part
/// was wrong.
#[openapi(tag = "Auth")]
#[post("/auth/login", format = "json", data = "<body>")]
pub async fn login(
    _rate: AuthRateLimit,
    auth: &State<AuthState>,
    store: &State<SharedUserStore>,
    cookies: &CookieJar<'_>,
    body: Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let body = body.into_inner();
    let email = body.email.trim().to_lowercase();

    let candidate = store.find_by_email(&email).await?;
    let mut user = match candidate {
        Some(user)
            if auth
                .password_service
                .verify_password(&body.password, &user.password_hash)
                && user.is_active =>
        {
            user
        }
        _ => return Err(AuthError::InvalidCredentials.into()),
    };

    let now = Utc::now();
    store.record_login(user.id, now).await?;
    user.last_login_at = Some(now);

    log::info!("user {} logged in", user.id);
    let response = issue_session(auth, cookies, &user)?;
    Ok(Json(response))
}

/// Trade a refresh token for a fresh access token. Refresh tokens are
/// single-purpose: an access token presented here is rejected.
#[openapi(tag = "Auth")]
#[post("/auth/refresh", format = "json", data = "<body>")]
pub async fn refresh(
    _rate: AuthRateLimit,
    auth: &State<AuthState>,
    store: &State<SharedUserStore>,
    body: Json<RefreshRequest>,
) -> Result<Json<RefreshResponse>, ApiError> {
    let Some(token) = body.into_inner().refresh_token else {
        return Err(ApiError::BadRequest("refresh_token is required".into()));
    };

    let claims = auth.token_service.verify(&token, TokenPurpose::Refresh)?;
    let user_id = Uuid::parse_str(&claims.user_id).map_err(|_| AuthError::TokenInvalid)?;

    let user = store
        .find_by_id(user_id)
        .await?
        .ok_or(AuthError::TokenInvalid)?;
    if !user.is_active {
        return Err(AuthError::AccountDisabled.into());
    }

    let access = auth.token_service.issue_access_token(user.id)?;
    Ok(Json(RefreshResponse {
        access_token: access.token,
        access_token_expires_at: access.expires_at,
    }))
}

/// Close the cookie session. Bearer tokens stay valid until they expire.
#[openapi(tag = "Auth")]
#[post("/auth/logout")]
pub async fn logout(
    _rate: ApiRateLimit,
    auth: &State<AuthState>,
    user: AuthUser,
    cookies: &CookieJar<'_>,
) -> Json<MessageResponse> {
    clear_access_cookie(cookies, &auth.config);
    log::info!("user {} logged out", user.id());
    Json(MessageResponse {
        message: "logged out".into(),
    })
}

/// The authenticated account, as the store currently sees it.
#[openapi(tag = "Auth")]
#[get("/auth/me")]
pub async fn me(_rate: ApiRateLimit, user: AuthUser) -> Json<UserSummary> {
    Json(UserSummary::from(&user.user))
}
