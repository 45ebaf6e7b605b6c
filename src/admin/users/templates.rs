use askama::Template;
use axum::{extract::State, response::Html};
use tower_sessions::Session;

use crate::admin::error::AdminApiError;
use crate::admin::session::require_admin;
use crate::admin::users::handlers::fetch_user_page;
use crate::admin::users::models::{AdminUserResponse, ListUsersQuery, Pagination};
use crate::admin::validation::ValidatedQuery;
use crate::AppState;

#[derive(Template)]
#[template(path = "admin/users/list.html")]
pub struct AdminUsersListTemplate {
    pub title: String,
    pub users: Vec<AdminUserResponse>,
    pub pagination: Pagination,
    pub query: String,
    pub admin_email: String,
}

/// Handler for the admin users list page
pub async fn admin_users_list_handler(
    session: Session,
    State(state): State<AppState>,
    ValidatedQuery(query): ValidatedQuery<ListUsersQuery>,
) -> Result<Html<String>, AdminApiError> {
    let admin = require_admin(&session, &state).await?;

    let page = fetch_user_page(&state, &query).await?;

    let template = AdminUsersListTemplate {
        title: "User Administration".to_string(),
        users: page.results,
        pagination: page.pagination,
        query: query.search_text().unwrap_or_default().to_string(),
        admin_email: admin.email,
    };

    template
        .render()
        .map(Html)
        .map_err(|e| AdminApiError::InternalError(format!("Template render error: {}", e)))
}
