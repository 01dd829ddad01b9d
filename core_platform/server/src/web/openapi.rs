use axum::Router;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

use crate::web::api::ErrorResponse;
use crate::{access, auth, registry, sidebar, tasks, web};

#[derive(OpenApi)]
#[openapi(
    info(title = "Core Platform API"),
    paths(
        web::health_check_handler,
        web::readiness_handler,
        auth::api::v1::register_handler,
        auth::api::v1::login_handler,
        auth::api::v1::me_handler,
        auth::api::v1::users_handler,
        registry::api::v1::list_modules_handler,
        registry::api::v1::update_primary_handler,
        registry::api::v1::update_order_handler,
        sidebar::api::v1::get_settings_handler,
        sidebar::api::v1::save_modules_order_handler,
        access::api::v1::list_roles_handler,
        access::api::v1::create_role_handler,
        access::api::v1::delete_role_handler,
        access::api::v1::list_modules_handler,
        access::api::v1::update_module_access_handler,
        access::api::v1::get_permissions_handler,
        access::api::v1::update_permissions_handler,
        access::api::v1::list_users_handler,
        access::api::v1::update_user_roles_handler,
        access::api::v1::session_action_handler,
        tasks::api::v1::list_tasks_handler,
        tasks::api::v1::create_task_handler,
        tasks::api::v1::calendar_handler,
        tasks::api::v1::attention_handler,
        tasks::api::v1::badges_handler,
        tasks::api::v1::get_task_handler,
        tasks::api::v1::update_task_handler,
        tasks::api::v1::delete_task_handler,
        tasks::api::v1::complete_task_handler,
        tasks::api::v1::verify_task_handler,
        tasks::api::v1::recurrence_action_handler,
        tasks::api::v1::delete_recurrence_children_handler,
        tasks::api::v1::list_folders_handler,
        tasks::api::v1::create_folder_handler,
        tasks::api::v1::update_folder_handler,
        tasks::api::v1::delete_folder_handler,
    ),
    components(schemas(ErrorResponse)),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

/// Registers the `bearer` scheme referenced by protected operations.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// Swagger UI at `/swagger-ui` serving the document from `/api-docs/openapi.json`.
pub fn create_docs_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
