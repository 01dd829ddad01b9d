use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use migration::MigratorTrait;
use sea_orm::{Database, DatabaseConnection};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::ToSchema;

use crate::access::AccessState;
use crate::auth::{AuthState, FilteredMakeSpan};
use crate::config::{self, Config};
use crate::events::EventPublisher;
use crate::registry::RegistryState;
use crate::sidebar::SidebarState;
use crate::tasks::TaskState;
use crate::web::api::{ApiStates, ErrorResponse};

pub mod api;
pub mod openapi;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db: Arc<DatabaseConnection>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub environment: String,
}

#[tracing::instrument(skip(config))]
pub async fn start_web_server(config: config::Config) -> anyhow::Result<()> {
    let server_address = format!("0.0.0.0:{}", &config.port);
    let listener = tokio::net::TcpListener::bind(&server_address).await?;
    tracing::info!("Web server running on http://{}", server_address);

    let db = Database::connect(&config.db_url).await?;
    migration::Migrator::up(&db, None).await?;
    tracing::info!("Database migrations applied successfully");
    crate::bootstrap::run(&db, &config).await?;
    tracing::info!("Seed data in place");

    let app = build_app(&config, db);
    axum::serve(listener, app).await?;
    Ok(())
}

/// Assembles the full application around an already migrated database.
pub fn build_app(config: &Config, db: DatabaseConnection) -> Router {
    let db = Arc::new(db);
    let states = ApiStates {
        auth: Arc::new(AuthState::from_config(config, db.clone())),
        access: Arc::new(AccessState { db: db.clone() }),
        registry: Arc::new(RegistryState { db: db.clone() }),
        sidebar: Arc::new(SidebarState { db: db.clone() }),
        tasks: Arc::new(TaskState {
            db: db.clone(),
            events: Arc::new(EventPublisher::with_default_handlers()),
            recurrence_horizon_days: config.recurrence_horizon_days,
        }),
    };
    let app_state = Arc::new(AppState {
        config: Arc::new(config.clone()),
        db,
    });

    let public_routes = Router::new()
        .route("/health", get(health_check_handler))
        .route("/ready", get(readiness_handler))
        .with_state(app_state);

    Router::new()
        .merge(api::create_api_router(states))
        .merge(public_routes)
        .merge(openapi::create_docs_router())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http().make_span_with(FilteredMakeSpan))
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any),
                ),
        )
}

/// Handler for GET /health.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up", body = HealthResponse)),
    tag = "Health"
)]
pub async fn health_check_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        environment: state.config.environment.clone(),
    })
}

/// Handler for GET /ready.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    get,
    path = "/ready",
    responses(
        (status = 200, description = "Database reachable", body = HealthResponse),
        (status = 503, description = "Database unreachable", body = ErrorResponse)
    ),
    tag = "Health"
)]
pub async fn readiness_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<HealthResponse>, (StatusCode, Json<ErrorResponse>)> {
    match state.db.ping().await {
        Ok(()) => Ok(Json(HealthResponse {
            status: "ready".to_string(),
            environment: state.config.environment.clone(),
        })),
        Err(err) => {
            tracing::warn!("Readiness check failed: {}", err);
            Err((
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorResponse {
                    error: "NOT_READY".to_string(),
                    message: "Database is unreachable".to_string(),
                }),
            ))
        }
    }
}
