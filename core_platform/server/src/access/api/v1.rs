use crate::access::{
    AccessService, AccessServiceError, AccessState, ChangeImpact, Permission, Role,
    RoleModulePermissions, SessionActionMode, UserWithRoles,
};
use crate::auth::CurrentUser;
use crate::web::api::{ApiError, ErrorResponse};
use axum::{
    Extension, Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, patch, post, put},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RoleDto {
    pub id: i32,
    pub name: String,
    pub can_manage_access: bool,
    pub module_ids: Vec<String>,
}

impl From<Role> for RoleDto {
    fn from(role: Role) -> Self {
        Self {
            id: role.id,
            name: role.name,
            can_manage_access: role.can_manage_access,
            module_ids: role.module_ids,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RoleCreatePayload {
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AdminModuleDto {
    pub id: String,
    pub title: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ModuleAccessPayload {
    pub has_access: bool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PermissionItem {
    pub name: String,
    pub is_allowed: bool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PermissionsDto {
    pub role_id: i32,
    pub module_id: String,
    pub permissions: Vec<PermissionItem>,
}

impl From<RoleModulePermissions> for PermissionsDto {
    fn from(value: RoleModulePermissions) -> Self {
        Self {
            role_id: value.role_id,
            module_id: value.module_id,
            permissions: value
                .permissions
                .into_iter()
                .map(|permission| PermissionItem {
                    name: permission.name,
                    is_allowed: permission.is_allowed,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct PermissionsUpdatePayload {
    #[serde(default)]
    pub permissions: Vec<PermissionItem>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UserRolesDto {
    pub id: i32,
    pub username: String,
    pub role_ids: Vec<i32>,
}

impl From<UserWithRoles> for UserRolesDto {
    fn from(value: UserWithRoles) -> Self {
        Self {
            id: value.id,
            username: value.username,
            role_ids: value.role_ids,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UserRolesUpdatePayload {
    #[serde(default)]
    pub role_ids: Vec<i32>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AffectedUserDto {
    pub id: i32,
    pub username: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ChangeImpactDto {
    pub message: String,
    pub affected_users: Vec<AffectedUserDto>,
}

impl From<ChangeImpact> for ChangeImpactDto {
    fn from(impact: ChangeImpact) -> Self {
        Self {
            message: impact.message,
            affected_users: impact
                .affected_users
                .into_iter()
                .map(|user| AffectedUserDto {
                    id: user.id,
                    username: user.username,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SessionActionPayload {
    #[serde(default)]
    pub user_ids: Vec<i32>,
    pub mode: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SessionActionResponse {
    pub status: String,
    pub message: String,
}

impl From<AccessServiceError> for ApiError {
    fn from(err: AccessServiceError) -> Self {
        match err {
            AccessServiceError::Forbidden => ApiError::forbidden(err.to_string()),
            AccessServiceError::DuplicateRole(_) => ApiError::conflict(err.to_string()),
            AccessServiceError::RoleNotFound(_)
            | AccessServiceError::ModuleNotFound(_)
            | AccessServiceError::UserNotFound(_) => ApiError::not_found(err.to_string()),
            AccessServiceError::UnknownSessionMode(_) | AccessServiceError::Validation(_) => {
                ApiError::bad_request(err.to_string())
            }
            AccessServiceError::Database(_) => ApiError::internal(err),
        }
    }
}

/// Creates the access administration router. Every route requires a role
/// that can manage access.
pub fn create_api_router(state: Arc<AccessState>) -> Router {
    Router::new()
        .route(
            "/admin/access/roles",
            get(list_roles_handler).post(create_role_handler),
        )
        .route("/admin/access/roles/{role_id}", delete(delete_role_handler))
        .route("/admin/access/modules", get(list_modules_handler))
        .route(
            "/admin/access/roles/{role_id}/modules/{module_id}",
            patch(update_module_access_handler),
        )
        .route(
            "/admin/access/roles/{role_id}/modules/{module_id}/permissions",
            get(get_permissions_handler).put(update_permissions_handler),
        )
        .route("/admin/access/users", get(list_users_handler))
        .route(
            "/admin/access/users/{user_id}/roles",
            put(update_user_roles_handler),
        )
        .route("/admin/access/session-actions", post(session_action_handler))
        .with_state(state)
}

async fn manager_service<'a>(
    state: &'a AccessState,
    current_user: &CurrentUser,
) -> Result<AccessService<'a>, ApiError> {
    let service = AccessService::new(&state.db);
    service.require_manager(current_user.id).await?;
    Ok(service)
}

#[tracing::instrument(skip(state))]
#[utoipa::path(
    get,
    path = "/admin/access/roles",
    responses(
        (status = 200, description = "Roles ordered by name", body = [RoleDto]),
        (status = 403, description = "Caller cannot manage access", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Access"
)]
pub async fn list_roles_handler(
    State(state): State<Arc<AccessState>>,
    Extension(current_user): Extension<CurrentUser>,
) -> Result<Json<Vec<RoleDto>>, ApiError> {
    let service = manager_service(&state, &current_user).await?;
    let roles = service.list_roles().await?;
    Ok(Json(roles.into_iter().map(RoleDto::from).collect()))
}

#[tracing::instrument(skip(state))]
#[utoipa::path(
    post,
    path = "/admin/access/roles",
    request_body = RoleCreatePayload,
    responses(
        (status = 201, description = "Role created", body = RoleDto),
        (status = 403, description = "Caller cannot manage access", body = ErrorResponse),
        (status = 409, description = "Role name taken", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Access"
)]
pub async fn create_role_handler(
    State(state): State<Arc<AccessState>>,
    Extension(current_user): Extension<CurrentUser>,
    Json(payload): Json<RoleCreatePayload>,
) -> Result<(StatusCode, Json<RoleDto>), ApiError> {
    let service = manager_service(&state, &current_user).await?;
    let role = service.create_role(&payload.name).await?;
    Ok((StatusCode::CREATED, Json(RoleDto::from(role))))
}

#[tracing::instrument(skip(state))]
#[utoipa::path(
    delete,
    path = "/admin/access/roles/{role_id}",
    params(("role_id" = i32, Path, description = "Role id")),
    responses(
        (status = 204, description = "Role deleted"),
        (status = 404, description = "Role not found", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Access"
)]
pub async fn delete_role_handler(
    State(state): State<Arc<AccessState>>,
    Extension(current_user): Extension<CurrentUser>,
    Path(role_id): Path<i32>,
) -> Result<StatusCode, ApiError> {
    let service = manager_service(&state, &current_user).await?;
    service.delete_role(role_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[tracing::instrument(skip(state))]
#[utoipa::path(
    get,
    path = "/admin/access/modules",
    responses((status = 200, description = "Modules in sidebar order", body = [AdminModuleDto])),
    security(("bearer" = [])),
    tag = "Access"
)]
pub async fn list_modules_handler(
    State(state): State<Arc<AccessState>>,
    Extension(current_user): Extension<CurrentUser>,
) -> Result<Json<Vec<AdminModuleDto>>, ApiError> {
    let service = manager_service(&state, &current_user).await?;
    let modules = service.list_modules().await?;
    Ok(Json(
        modules
            .into_iter()
            .map(|module| AdminModuleDto {
                id: module.id,
                title: module.title,
            })
            .collect(),
    ))
}

#[tracing::instrument(skip(state))]
#[utoipa::path(
    patch,
    path = "/admin/access/roles/{role_id}/modules/{module_id}",
    params(
        ("role_id" = i32, Path, description = "Role id"),
        ("module_id" = String, Path, description = "Module id")
    ),
    request_body = ModuleAccessPayload,
    responses(
        (status = 200, description = "Access changed", body = ChangeImpactDto),
        (status = 404, description = "Role or module not found", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Access"
)]
pub async fn update_module_access_handler(
    State(state): State<Arc<AccessState>>,
    Extension(current_user): Extension<CurrentUser>,
    Path((role_id, module_id)): Path<(i32, String)>,
    Json(payload): Json<ModuleAccessPayload>,
) -> Result<Json<ChangeImpactDto>, ApiError> {
    let service = manager_service(&state, &current_user).await?;
    let impact = service
        .update_module_access(role_id, &module_id, payload.has_access)
        .await?;
    Ok(Json(ChangeImpactDto::from(impact)))
}

#[tracing::instrument(skip(state))]
#[utoipa::path(
    get,
    path = "/admin/access/roles/{role_id}/modules/{module_id}/permissions",
    params(
        ("role_id" = i32, Path, description = "Role id"),
        ("module_id" = String, Path, description = "Module id")
    ),
    responses(
        (status = 200, description = "Permission catalogue with role state", body = PermissionsDto),
        (status = 404, description = "Role or module not found", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Access"
)]
pub async fn get_permissions_handler(
    State(state): State<Arc<AccessState>>,
    Extension(current_user): Extension<CurrentUser>,
    Path((role_id, module_id)): Path<(i32, String)>,
) -> Result<Json<PermissionsDto>, ApiError> {
    let service = manager_service(&state, &current_user).await?;
    let permissions = service.get_permissions(role_id, &module_id).await?;
    Ok(Json(PermissionsDto::from(permissions)))
}

#[tracing::instrument(skip(state, payload))]
#[utoipa::path(
    put,
    path = "/admin/access/roles/{role_id}/modules/{module_id}/permissions",
    params(
        ("role_id" = i32, Path, description = "Role id"),
        ("module_id" = String, Path, description = "Module id")
    ),
    request_body = PermissionsUpdatePayload,
    responses(
        (status = 200, description = "Permissions replaced", body = ChangeImpactDto),
        (status = 404, description = "Role or module not found", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Access"
)]
pub async fn update_permissions_handler(
    State(state): State<Arc<AccessState>>,
    Extension(current_user): Extension<CurrentUser>,
    Path((role_id, module_id)): Path<(i32, String)>,
    Json(payload): Json<PermissionsUpdatePayload>,
) -> Result<Json<ChangeImpactDto>, ApiError> {
    let service = manager_service(&state, &current_user).await?;
    let permissions = payload
        .permissions
        .into_iter()
        .map(|item| Permission {
            name: item.name,
            is_allowed: item.is_allowed,
        })
        .collect();
    let impact = service
        .update_permissions(role_id, &module_id, permissions)
        .await?;
    Ok(Json(ChangeImpactDto::from(impact)))
}

#[tracing::instrument(skip(state))]
#[utoipa::path(
    get,
    path = "/admin/access/users",
    responses((status = 200, description = "Users with their role ids", body = [UserRolesDto])),
    security(("bearer" = [])),
    tag = "Access"
)]
pub async fn list_users_handler(
    State(state): State<Arc<AccessState>>,
    Extension(current_user): Extension<CurrentUser>,
) -> Result<Json<Vec<UserRolesDto>>, ApiError> {
    let service = manager_service(&state, &current_user).await?;
    let users = service.list_users_with_roles().await?;
    Ok(Json(users.into_iter().map(UserRolesDto::from).collect()))
}

#[tracing::instrument(skip(state))]
#[utoipa::path(
    put,
    path = "/admin/access/users/{user_id}/roles",
    params(("user_id" = i32, Path, description = "User id")),
    request_body = UserRolesUpdatePayload,
    responses(
        (status = 200, description = "Roles replaced", body = ChangeImpactDto),
        (status = 404, description = "User or role not found", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Access"
)]
pub async fn update_user_roles_handler(
    State(state): State<Arc<AccessState>>,
    Extension(current_user): Extension<CurrentUser>,
    Path(user_id): Path<i32>,
    Json(payload): Json<UserRolesUpdatePayload>,
) -> Result<Json<ChangeImpactDto>, ApiError> {
    let service = manager_service(&state, &current_user).await?;
    let impact = service.update_user_roles(user_id, &payload.role_ids).await?;
    Ok(Json(ChangeImpactDto::from(impact)))
}

#[tracing::instrument(skip(state))]
#[utoipa::path(
    post,
    path = "/admin/access/session-actions",
    request_body = SessionActionPayload,
    responses(
        (status = 202, description = "Advisory accepted", body = SessionActionResponse),
        (status = 400, description = "Unknown mode", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Access"
)]
pub async fn session_action_handler(
    State(state): State<Arc<AccessState>>,
    Extension(current_user): Extension<CurrentUser>,
    Json(payload): Json<SessionActionPayload>,
) -> Result<(StatusCode, Json<SessionActionResponse>), ApiError> {
    manager_service(&state, &current_user).await?;
    let mode = SessionActionMode::parse(&payload.mode)?;
    tracing::info!(
        "Session action {:?} requested for {} users",
        mode,
        payload.user_ids.len()
    );
    Ok((
        StatusCode::ACCEPTED,
        Json(SessionActionResponse {
            status: "accepted".to_string(),
            message: mode.message().to_string(),
        }),
    ))
}
