use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use tower_sessions::Session;
use tracing::{info, warn};

use crate::admin::error::AdminApiError;
use crate::admin::session::require_admin;
use crate::admin::users::models::{
    normalize_email, AdminCreateUserRequest, AdminUpdateUserRequest, AdminUserResponse,
    DeleteManyUsersRequest, ListFilters, ListUsersQuery, ListUsersResponse, NewAdminUser,
    PageRequest, Sort, User, UserPatch,
};
use crate::admin::users::repository::{AdminUserRepository, MutationOutcome, UpdateOutcome};
use crate::admin::validation::{ValidatedJson, ValidatedQuery};
use crate::auth::hash_password;
use crate::AppState;

const EMAIL_TAKEN: &str = "Email already taken";
const LAST_SUPER_ADMIN: &str = "You must have at least one user with the super admin role";

/// Create a new admin user
pub async fn create_user(
    session: Session,
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<AdminCreateUserRequest>,
) -> Result<(StatusCode, Json<AdminUserResponse>), AdminApiError> {
    let admin = require_admin(&session, &state).await?;
    let repo = AdminUserRepository::new(state.db.clone());

    ensure_roles_exist(&repo, &request.roles).await?;

    let user = repo
        .create(NewAdminUser {
            firstname: request.firstname,
            lastname: request.lastname,
            email: normalize_email(&request.email),
            password_hash: None,
            is_active: false,
            prefered_language: request.prefered_language,
            role_ids: request.roles,
        })
        .await
        .map_err(|e| AdminApiError::DatabaseError(format!("Failed to create user: {}", e)))?
        .ok_or_else(|| AdminApiError::bad_request(EMAIL_TAKEN))?;

    info!(user_id = user.id, actor = admin.id, "Admin user created");

    Ok((StatusCode::CREATED, Json(AdminUserResponse::from(user))))
}

/// List admin users, searching when `_q` is present
pub async fn list_users(
    session: Session,
    State(state): State<AppState>,
    ValidatedQuery(query): ValidatedQuery<ListUsersQuery>,
) -> Result<Json<ListUsersResponse>, AdminApiError> {
    require_admin(&session, &state).await?;

    let response = fetch_user_page(&state, &query).await?;

    Ok(Json(response))
}

/// Shared by the JSON list endpoint and the HTML admin page.
pub(crate) async fn fetch_user_page(
    state: &AppState,
    query: &ListUsersQuery,
) -> Result<ListUsersResponse, AdminApiError> {
    let sort = match query.sort.as_deref() {
        Some(raw) => Sort::parse(raw).ok_or_else(|| {
            AdminApiError::invalid_field(
                "sort",
                "sort must be one of id, firstname, lastname, email, createdAt, updatedAt with :asc or :desc",
            )
        })?,
        None => Sort::default(),
    };

    let page = PageRequest {
        page: query.page.unwrap_or(1),
        page_size: state.config.page_size(query.page_size),
    };
    let filters = ListFilters {
        is_active: query.is_active,
        role_id: query.role,
    };

    let repo = AdminUserRepository::new(state.db.clone());
    let result = match query.search_text() {
        Some(q) => repo.search_page(q, filters, sort, page).await,
        None => repo.find_page(filters, sort, page).await,
    }
    .map_err(|e| AdminApiError::DatabaseError(format!("Failed to list users: {}", e)))?;

    Ok(ListUsersResponse::from(result))
}

/// Fetch one admin user
pub async fn get_user(
    session: Session,
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<Json<AdminUserResponse>, AdminApiError> {
    require_admin(&session, &state).await?;

    let repo = AdminUserRepository::new(state.db.clone());
    let user = repo
        .find_one(user_id)
        .await
        .map_err(|e| AdminApiError::DatabaseError(format!("Failed to find user: {}", e)))?
        .ok_or(AdminApiError::NotFound)?;

    Ok(Json(AdminUserResponse::from(user)))
}

/// Partially update an admin user
pub async fn update_user(
    session: Session,
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    ValidatedJson(request): ValidatedJson<AdminUpdateUserRequest>,
) -> Result<Json<AdminUserResponse>, AdminApiError> {
    let admin = require_admin(&session, &state).await?;
    let repo = AdminUserRepository::new(state.db.clone());

    if let Some((field, message)) = request.clearable_field_errors().into_iter().next() {
        return Err(AdminApiError::invalid_field(field, message));
    }

    repo.find_one(user_id)
        .await
        .map_err(|e| AdminApiError::DatabaseError(format!("Failed to find user: {}", e)))?
        .ok_or(AdminApiError::NotFound)?;

    if let Some(roles) = &request.roles {
        ensure_roles_exist(&repo, roles).await?;
    }

    let password_hash = request
        .password
        .as_deref()
        .map(hash_password)
        .transpose()
        .map_err(|e| AdminApiError::InternalError(format!("Failed to hash password: {}", e)))?;

    let patch = UserPatch {
        firstname: request.firstname,
        lastname: request.lastname,
        email: request.email.as_deref().map(normalize_email),
        password_hash,
        is_active: request.is_active,
        blocked: request.blocked,
        prefered_language: request.prefered_language,
        role_ids: request.roles,
    };

    let outcome = repo
        .update_by_id(user_id, patch)
        .await
        .map_err(|e| AdminApiError::DatabaseError(format!("Failed to update user: {}", e)))?;

    match outcome {
        UpdateOutcome::Updated(user) => {
            info!(user_id, actor = admin.id, "Admin user updated");
            Ok(Json(AdminUserResponse::from(user)))
        }
        UpdateOutcome::NotFound => Err(AdminApiError::NotFound),
        UpdateOutcome::EmailTaken => Err(AdminApiError::bad_request(EMAIL_TAKEN)),
        UpdateOutcome::LastSuperAdmin => {
            warn!(user_id, actor = admin.id, "Refused update of last active super admin");
            Err(AdminApiError::bad_request(
                "You must have at least one active user with the super admin role",
            ))
        }
    }
}

/// Soft-delete one admin user
pub async fn delete_user(
    session: Session,
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<Json<AdminUserResponse>, AdminApiError> {
    let admin = require_admin(&session, &state).await?;

    if admin.id == user_id {
        return Err(AdminApiError::bad_request("Cannot delete your own account"));
    }

    let repo = AdminUserRepository::new(state.db.clone());
    let outcome = repo
        .delete_by_id(user_id, admin.id)
        .await
        .map_err(|e| AdminApiError::DatabaseError(format!("Failed to delete user: {}", e)))?;

    match outcome {
        MutationOutcome::Applied(user) => {
            info!(
                user_id,
                actor = admin.id,
                super_admin = user.is_super_admin(),
                "Admin user deleted"
            );
            Ok(Json(AdminUserResponse::from(user)))
        }
        MutationOutcome::NotFound => Err(AdminApiError::NotFound),
        MutationOutcome::LastSuperAdmin => {
            warn!(user_id, actor = admin.id, "Refused deletion of last super admin");
            Err(AdminApiError::bad_request(LAST_SUPER_ADMIN))
        }
    }
}

/// Soft-delete several admin users at once
pub async fn delete_many_users(
    session: Session,
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<DeleteManyUsersRequest>,
) -> Result<Json<Vec<AdminUserResponse>>, AdminApiError> {
    let admin = require_admin(&session, &state).await?;

    if request.ids.contains(&admin.id) {
        return Err(AdminApiError::bad_request("Cannot delete your own account"));
    }

    let repo = AdminUserRepository::new(state.db.clone());
    let outcome = repo
        .delete_by_ids(request.ids, admin.id)
        .await
        .map_err(|e| AdminApiError::DatabaseError(format!("Failed to delete users: {}", e)))?;

    match outcome {
        MutationOutcome::Applied(users) => {
            let ids: Vec<i64> = users.iter().map(|u| u.id).collect();
            info!(?ids, actor = admin.id, "Admin users deleted");
            Ok(Json(sanitize_all(users)))
        }
        MutationOutcome::NotFound => Ok(Json(Vec::new())),
        MutationOutcome::LastSuperAdmin => {
            warn!(actor = admin.id, "Refused bulk deletion of every super admin");
            Err(AdminApiError::bad_request(LAST_SUPER_ADMIN))
        }
    }
}

async fn ensure_roles_exist(repo: &AdminUserRepository, ids: &[i64]) -> Result<(), AdminApiError> {
    let missing = repo
        .missing_role_ids(ids)
        .await
        .map_err(|e| AdminApiError::DatabaseError(format!("Failed to check roles: {}", e)))?;

    if missing.is_empty() {
        Ok(())
    } else {
        let missing: Vec<String> = missing.iter().map(i64::to_string).collect();
        Err(AdminApiError::invalid_field(
            "roles",
            format!("Some roles do not exist: {}", missing.join(", ")),
        ))
    }
}

fn sanitize_all(users: Vec<User>) -> Vec<AdminUserResponse> {
    users.into_iter().map(AdminUserResponse::from).collect()
}
