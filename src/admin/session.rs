use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use serde_json::json;
use time::Duration;
use tower_sessions::{Expiry, Session};
use tracing::{info, warn};
use validator::Validate;

use crate::admin::error::AdminApiError;
use crate::admin::users::models::{normalize_email, AdminUserResponse, User};
use crate::admin::users::repository::AdminUserRepository;
use crate::admin::validation::ValidatedJson;
use crate::auth::verify_password;
use crate::AppState;

const SESSION_KEY: &str = "admin";

/// What the session remembers about the signed-in admin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminSession {
    pub user_id: i64,
    pub email: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "email must be a valid email address"))]
    pub email: String,
    #[validate(length(min = 1, message = "password is required"))]
    pub password: String,
    #[serde(default)]
    pub remember_me: bool,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user: AdminUserResponse,
}

fn can_sign_in(user: &User) -> bool {
    user.is_active && !user.blocked
}

/// Resolves the acting admin from the session. The account must still be
/// live, active and unblocked; otherwise the request is unauthorized.
pub async fn require_admin(session: &Session, state: &AppState) -> Result<User, AdminApiError> {
    let admin_session: AdminSession = session
        .get(SESSION_KEY)
        .await
        .map_err(|e| AdminApiError::InternalError(format!("Failed to get session: {}", e)))?
        .ok_or(AdminApiError::Unauthorized)?;

    let repo = AdminUserRepository::new(state.db.clone());
    let admin = repo
        .find_one(admin_session.user_id)
        .await
        .map_err(|e| AdminApiError::DatabaseError(format!("Failed to load session user: {}", e)))?
        .ok_or(AdminApiError::Unauthorized)?;

    if !can_sign_in(&admin) {
        warn!(user_id = admin.id, "Session user is no longer allowed in");
        return Err(AdminApiError::Unauthorized);
    }

    Ok(admin)
}

pub async fn login(
    session: Session,
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<LoginRequest>,
) -> Result<Json<LoginResponse>, AdminApiError> {
    let email = normalize_email(&request.email);
    let repo = AdminUserRepository::new(state.db.clone());

    let user = repo
        .find_credentials(&email)
        .await
        .map_err(|e| AdminApiError::DatabaseError(format!("Failed to find user: {}", e)))?;

    let Some(user) = user else {
        warn!("Login attempt for unknown email");
        return Err(AdminApiError::Unauthorized);
    };

    let password_ok = verify_password(&request.password, user.password_hash.as_deref())
        .map_err(|e| AdminApiError::InternalError(format!("Failed to verify password: {}", e)))?;

    if !password_ok || !can_sign_in(&user) {
        warn!(user_id = user.id, "Rejected admin login");
        return Err(AdminApiError::Unauthorized);
    }

    let expiry = if request.remember_me {
        Duration::days(5)
    } else {
        Duration::days(1)
    };
    session.set_expiry(Some(Expiry::OnInactivity(expiry)));

    session
        .insert(
            SESSION_KEY,
            AdminSession {
                user_id: user.id,
                email: user.email.clone(),
            },
        )
        .await
        .map_err(|e| AdminApiError::InternalError(format!("Failed to create session: {}", e)))?;

    info!(user_id = user.id, "Admin signed in");

    Ok(Json(LoginResponse {
        user: AdminUserResponse::from(user),
    }))
}

pub async fn logout(session: Session) -> Result<Json<serde_json::Value>, AdminApiError> {
    session
        .flush()
        .await
        .map_err(|e| AdminApiError::InternalError(format!("Failed to clear session: {}", e)))?;

    Ok(Json(json!({ "success": true })))
}
