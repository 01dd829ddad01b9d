use crate::auth::CurrentUser;
use crate::registry::{ModuleView, RegistryService, RegistryServiceError, RegistryState};
use crate::web::api::{ApiError, ErrorResponse};
use axum::{
    Extension, Json, Router,
    extract::State,
    routing::{get, patch},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use utoipa::ToSchema;

/// JSON representation of a platform module for the current user.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ModuleDto {
    pub id: String,
    pub name: String,
    pub title: String,
    /// Client route the module is mounted at
    pub path: String,
    pub order: i32,
    pub is_primary: bool,
    /// Whether any of the user's roles opens the module
    pub has_access: bool,
    /// Permission name to allowed, OR-aggregated across roles
    pub permissions: BTreeMap<String, bool>,
}

impl From<ModuleView> for ModuleDto {
    fn from(view: ModuleView) -> Self {
        Self {
            id: view.id,
            name: view.name,
            title: view.title,
            path: view.path,
            order: view.order,
            is_primary: view.is_primary,
            has_access: view.has_access,
            permissions: view.permissions,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ModulePrimaryUpdate {
    #[serde(default)]
    pub module_id: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ModuleOrderUpdate {
    #[serde(default)]
    pub ordered_ids: Vec<String>,
}

impl From<RegistryServiceError> for ApiError {
    fn from(err: RegistryServiceError) -> Self {
        match err {
            RegistryServiceError::ModuleNotFound(_) => ApiError::not_found(err.to_string()),
            RegistryServiceError::InvalidOrder => ApiError::bad_request(err.to_string()),
            RegistryServiceError::Database(_) => ApiError::internal(err),
        }
    }
}

/// Creates and returns the module registry router.
pub fn create_api_router(state: Arc<RegistryState>) -> Router {
    Router::new()
        .route("/modules", get(list_modules_handler))
        .route("/modules/primary", patch(update_primary_handler))
        .route("/modules/order", patch(update_order_handler))
        .with_state(state)
}

async fn modules_for(
    service: &RegistryService<'_>,
    current_user: &CurrentUser,
) -> Result<Json<Vec<ModuleDto>>, ApiError> {
    let modules = service.list_for_user(current_user.id).await?;
    Ok(Json(modules.into_iter().map(ModuleDto::from).collect()))
}

/// Handler for GET /modules.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    get,
    path = "/modules",
    responses(
        (status = 200, description = "Modules in order with access flags", body = [ModuleDto]),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Modules"
)]
pub async fn list_modules_handler(
    State(state): State<Arc<RegistryState>>,
    Extension(current_user): Extension<CurrentUser>,
) -> Result<Json<Vec<ModuleDto>>, ApiError> {
    modules_for(&RegistryService::new(&state.db), &current_user).await
}

/// Handler for PATCH /modules/primary.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    patch,
    path = "/modules/primary",
    request_body = ModulePrimaryUpdate,
    responses(
        (status = 200, description = "Updated module list", body = [ModuleDto]),
        (status = 404, description = "Module not found", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Modules"
)]
pub async fn update_primary_handler(
    State(state): State<Arc<RegistryState>>,
    Extension(current_user): Extension<CurrentUser>,
    Json(payload): Json<ModulePrimaryUpdate>,
) -> Result<Json<Vec<ModuleDto>>, ApiError> {
    let service = RegistryService::new(&state.db);
    service.set_primary(payload.module_id.as_deref()).await?;
    modules_for(&service, &current_user).await
}

/// Handler for PATCH /modules/order.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    patch,
    path = "/modules/order",
    request_body = ModuleOrderUpdate,
    responses(
        (status = 200, description = "Updated module list", body = [ModuleDto]),
        (status = 400, description = "Ids are not a permutation of all modules", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Modules"
)]
pub async fn update_order_handler(
    State(state): State<Arc<RegistryState>>,
    Extension(current_user): Extension<CurrentUser>,
    Json(payload): Json<ModuleOrderUpdate>,
) -> Result<Json<Vec<ModuleDto>>, ApiError> {
    let service = RegistryService::new(&state.db);
    service.reorder(&payload.ordered_ids).await?;
    modules_for(&service, &current_user).await
}
