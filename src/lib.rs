use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};
use tower_sessions::{cookie::time, MemoryStore, SessionManagerLayer};
use tracing::{info, warn};

pub mod admin;
pub mod auth;
pub mod config;
pub mod database;

pub use config::AppConfig;
pub use database::Database;

use admin::users::models::normalize_email;
use admin::{
    admin_users_list_handler, create_user, delete_many_users, delete_user, get_user, list_users,
    login, logout, update_user, AdminUserRepository,
};
use database::BoxError;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub config: Arc<AppConfig>,
}

pub async fn create_router(app_state: AppState) -> Router {
    // Create session store and layer
    let session_store = MemoryStore::default();
    let session_layer = SessionManagerLayer::new(session_store)
        .with_secure(app_state.config.environment == "production")
        .with_expiry(tower_sessions::Expiry::OnInactivity(time::Duration::days(1)));

    Router::new()
        .route("/health", get(health_handler))
        .route("/api/admin/login", post(login))
        .route("/api/admin/logout", post(logout))
        .route(
            "/api/admin/users",
            get(list_users).post(create_user).delete(delete_many_users),
        )
        .route(
            "/api/admin/users/:id",
            get(get_user)
                .put(update_user)
                .patch(update_user)
                .delete(delete_user),
        )
        .route("/admin/users", get(admin_users_list_handler))
        .with_state(app_state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(session_layer)
                .layer(CompressionLayer::new())
                .layer(CorsLayer::permissive()),
        )
}

/// Creates the configured first super-admin when no super-admin exists yet.
pub async fn bootstrap_super_admin(app_state: &AppState) -> Result<(), BoxError> {
    let config = &app_state.config;
    let (Some(email), Some(password)) = (
        config.bootstrap_admin_email.as_deref(),
        config.bootstrap_admin_password.as_deref(),
    ) else {
        return Ok(());
    };

    let repo = AdminUserRepository::new(app_state.db.clone());
    if repo.count_super_admins().await? > 0 {
        return Ok(());
    }

    let password_hash = auth::hash_password(password)?;
    match repo
        .bootstrap_super_admin(
            config.bootstrap_admin_firstname.clone(),
            normalize_email(email),
            password_hash,
        )
        .await?
    {
        Some(user) => info!(user_id = user.id, "Bootstrap super admin created"),
        None => warn!("Super admin appeared concurrently, bootstrap skipped"),
    }

    Ok(())
}

async fn health_handler(State(state): State<AppState>) -> Result<&'static str, StatusCode> {
    match state.db.health_check().await {
        Ok(_) => Ok("OK"),
        Err(e) => {
            warn!("Health check failed: {}", e);
            Err(StatusCode::SERVICE_UNAVAILABLE)
        }
    }
}
