use crate::auth::CurrentUser;
use crate::sidebar::{SidebarService, SidebarServiceError, SidebarState};
use crate::web::api::{ApiError, ErrorResponse};
use axum::{
    Extension, Json, Router,
    extract::State,
    routing::{get, put},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SidebarSettingsDto {
    pub modules_order: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SidebarModulesOrderUpdate {
    pub modules_order: Vec<String>,
}

impl From<SidebarServiceError> for ApiError {
    fn from(err: SidebarServiceError) -> Self {
        match err {
            SidebarServiceError::DuplicateIds => ApiError::bad_request(err.to_string()),
            SidebarServiceError::Malformed(_) | SidebarServiceError::Database(_) => {
                ApiError::internal(err)
            }
        }
    }
}

pub fn create_api_router(state: Arc<SidebarState>) -> Router {
    Router::new()
        .route("/user/sidebar-settings", get(get_settings_handler))
        .route(
            "/user/sidebar-settings/modules-order",
            put(save_modules_order_handler),
        )
        .with_state(state)
}

#[tracing::instrument(skip(state))]
#[utoipa::path(
    get,
    path = "/user/sidebar-settings",
    responses((status = 200, description = "Saved sidebar settings", body = SidebarSettingsDto)),
    security(("bearer" = [])),
    tag = "Sidebar"
)]
pub async fn get_settings_handler(
    State(state): State<Arc<SidebarState>>,
    Extension(current_user): Extension<CurrentUser>,
) -> Result<Json<SidebarSettingsDto>, ApiError> {
    let modules_order = SidebarService::new(&state.db)
        .modules_order(current_user.id)
        .await?;
    Ok(Json(SidebarSettingsDto { modules_order }))
}

#[tracing::instrument(skip(state))]
#[utoipa::path(
    put,
    path = "/user/sidebar-settings/modules-order",
    request_body = SidebarModulesOrderUpdate,
    responses(
        (status = 200, description = "Order saved", body = SidebarSettingsDto),
        (status = 400, description = "Duplicate ids", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Sidebar"
)]
pub async fn save_modules_order_handler(
    State(state): State<Arc<SidebarState>>,
    Extension(current_user): Extension<CurrentUser>,
    Json(payload): Json<SidebarModulesOrderUpdate>,
) -> Result<Json<SidebarSettingsDto>, ApiError> {
    let modules_order = SidebarService::new(&state.db)
        .save_modules_order(current_user.id, payload.modules_order)
        .await?;
    Ok(Json(SidebarSettingsDto {
        modules_order: Some(modules_order),
    }))
}
