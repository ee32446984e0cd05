use rocket::State;
use rocket::serde::json::Json;
use rocket_okapi::openapi;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::responses::{MessageResponse, UserSummary};
use crate::auth::{AuthError, RequireAdmin, Role};
use crate::error::ApiError;
use crate::rate_limit::guards::ApiRateLimit;
use crate::store::SharedUserStore;

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct UsersResponse {
    pub users: Vec<UserSummary>,
    pub total: usize,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct UpdateRoleRequest {
    pub role: Role,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct SetActiveRequest {
    pub is_active: bool,
}

fn parse_user_id(id: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(id)
        .map_err(|_| ApiError::BadRequest(format!("'{}' is not a valid user id", id)))
}

/// List every account, oldest first.
#[openapi(tag = "Users")]
#[get("/users")]
pub async fn list_users(
    _rate: ApiRateLimit,
    _admin: RequireAdmin,
    store: &State<SharedUserStore>,
) -> Result<Json<UsersResponse>, ApiError> {
    let records = store.list().await?;
    let users: Vec<UserSummary> = records.iter().map(UserSummary::from).collect();
    let total = users.len();
    Ok(Json(UsersResponse { users, total }))
}

/// Change an account's role. Takes effect on the target's very next
/// request, since the gate re-reads the account every time.
#[openapi(tag = "Users")]
#[patch("/users/<id>/role", format = "json", data = "<body>")]
pub async fn update_user_role(
    _rate: ApiRateLimit,
    admin: RequireAdmin,
    store: &State<SharedUserStore>,
    id: &str,
    body: Json<UpdateRoleRequest>,
) -> Result<Json<UserSummary>, ApiError> {
    let user_id = parse_user_id(id)?;
    let role = body.into_inner().role;

    let updated = store
        .update_role(user_id, role)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("user '{}' not found", id)))?;

    log::info!(
        "user {} set role of {} to {}",
        admin.0.id(),
        user_id,
        role.as_str()
    );
    Ok(Json(UserSummary::from(&updated)))
}

/// Activate or deactivate an account. A deactivated account keeps its
/// record but fails every authenticated request with 401.
#[openapi(tag = "Users")]
#[patch("/users/<id>/active", format = "json", data = "<body>")]
pub async fn set_user_active(
    _rate: ApiRateLimit,
    admin: RequireAdmin,
    store: &State<SharedUserStore>,
    id: &str,
    body: Json<SetActiveRequest>,
) -> Result<Json<UserSummary>, ApiError> {
    let user_id = parse_user_id(id)?;
    let is_active = body.into_inner().is_active;

    let updated = store
        .set_active(user_id, is_active)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("user '{}' not found", id)))?;

    log::info!(
        "user {} set active={} on {}",
        admin.0.id(),
        is_active,
        user_id
    );
    Ok(Json(UserSummary::from(&updated)))
}

/// Delete an account. Admins can delete regular users; removing another
/// admin or super admin takes the super admin role, and nobody can delete
/// their own account.
#[openapi(tag = "Users")]
#[delete("/users/<id>")]
pub async fn delete_user(
    _rate: ApiRateLimit,
    admin: RequireAdmin,
    store: &State<SharedUserStore>,
    id: &str,
) -> Result<Json<MessageResponse>, ApiError> {
    let user_id = parse_user_id(id)?;
    let caller = &admin.0;

    if caller.id() == user_id {
        return Err(ApiError::BadRequest("cannot delete your own account".into()));
    }

    let target = store
        .find_by_id(user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("user '{}' not found", id)))?;

    if target.role.is_admin() && caller.role() != Role::SuperAdmin {
        return Err(AuthError::Forbidden.into());
    }

    store.delete(user_id).await?;
    log::info!("user {} deleted {}", caller.id(), user_id);
    Ok(Json(MessageResponse {
        message: "user deleted".into(),
    }))
}
