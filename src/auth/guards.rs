use rocket::http::Status;
use rocket::request::{FromRequest, Outcome, Request};
use rocket_okapi::r#gen::OpenApiGenerator;
use rocket_okapi::request::{OpenApiFromRequest, RequestHeaderInput};
use uuid::Uuid;

use crate::auth::tokens::{Claims, TokenPurpose};
use crate::auth::{AuthError, AuthResult, AuthState, Role};
use crate::store::{SharedUserStore, UserRecord};

/// Why the gate turned a request away. Stored in request-local state so
/// the 401/403 catchers can report the precise reason.
#[derive(Debug, Default)]
pub struct GateRejection(pub Option<String>);

/// Request guard for any authenticated, active account.
///
/// The access token is taken from the session cookie when present,
/// otherwise from the `Authorization: Bearer` header. The account is
/// re-read from the store on every request, so role changes and
/// deactivation take effect before the token expires.
pub struct AuthUser {
    pub user: UserRecord,
    pub claims: Claims,
}

impl AuthUser {
    pub fn id(&self) -> Uuid {
        self.user.id
    }

    pub fn role(&self) -> Role {
        self.user.role
    }

    pub fn is_admin(&self) -> bool {
        self.user.role.is_admin()
    }
}

fn extract_token(request: &Request<'_>, cookie_name: &str) -> Option<String> {
    if let Some(cookie) = request.cookies().get(cookie_name) {
        return Some(cookie.value().to_string());
    }
    request
        .headers()
        .get_one("Authorization")
        .and_then(|header| header.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
}

async fn authenticate(request: &Request<'_>) -> AuthResult<AuthUser> {
    let auth = request
        .rocket()
        .state::<AuthState>()
        .ok_or_else(|| AuthError::Config("auth state not managed".into()))?;
    let store = request
        .rocket()
        .state::<SharedUserStore>()
        .ok_or_else(|| AuthError::Config("user store not managed".into()))?;

    let token =
        extract_token(request, &auth.config.access_cookie_name).ok_or(AuthError::Unauthorized)?;

    let claims = auth.token_service.verify(&token, TokenPurpose::Access)?;
    let user_id = Uuid::parse_str(&claims.user_id).map_err(|_| AuthError::TokenInvalid)?;

    let user = store
        .find_by_id(user_id)
        .await
        .map_err(|err| AuthError::Store(err.to_string()))?
        .ok_or(AuthError::TokenInvalid)?;

    if !user.is_active {
        return Err(AuthError::AccountDisabled);
    }

    Ok(AuthUser { user, claims })
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AuthUser {
    type Error = AuthError;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        match authenticate(request).await {
            Ok(user) => Outcome::Success(user),
            Err(err) => {
                request.local_cache(|| GateRejection(Some(err.to_string())));
                Outcome::Error((err.status(), err))
            }
        }
    }
}

impl<'a> OpenApiFromRequest<'a> for AuthUser {
    fn from_request_input(
        _gen: &mut OpenApiGenerator,
        _name: String,
        _required: bool,
    ) -> rocket_okapi::Result<RequestHeaderInput> {
        Ok(RequestHeaderInput::None)
    }
}

/// Request guard that additionally requires an admin or super admin role.
pub struct RequireAdmin(pub AuthUser);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for RequireAdmin {
    type Error = AuthError;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let user = match AuthUser::from_request(request).await {
            Outcome::Success(user) => user,
            Outcome::Error(err) => return Outcome::Error(err),
            Outcome::Forward(status) => return Outcome::Forward(status),
        };

        if !user.is_admin() {
            request.local_cache(|| GateRejection(Some("admin privileges required".into())));
            return Outcome::Error((Status::Forbidden, AuthError::Forbidden));
        }

        Outcome::Success(RequireAdmin(user))
    }
}

impl<'a> OpenApiFromRequest<'a> for RequireAdmin {
    fn from_request_input(
        _gen: &mut OpenApiGenerator,
        _name: String,
        _required: bool,
    ) -> rocket_okapi::Result<RequestHeaderInput> {
        Ok(RequestHeaderInput::None)
    }
}
