use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Role code that grants full administrative privileges.
pub const SUPER_ADMIN_CODE: &str = "super-admin";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Role {
    pub id: i64,
    pub name: String,
    pub code: String,
    pub description: Option<String>,
}

impl Role {
    pub fn is_super_admin(&self) -> bool {
        self.code == SUPER_ADMIN_CODE
    }
}

/// Stored admin user, including fields that must never leave the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub firstname: String,
    pub lastname: Option<String>,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub is_active: bool,
    pub blocked: bool,
    pub prefered_language: Option<String>,
    pub roles: Vec<Role>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn is_super_admin(&self) -> bool {
        self.roles.iter().any(Role::is_super_admin)
    }
}

/// Role as exposed to clients
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoleResponse {
    pub id: i64,
    pub name: String,
    pub code: String,
    pub description: Option<String>,
}

impl From<Role> for RoleResponse {
    fn from(role: Role) -> Self {
        Self {
            id: role.id,
            name: role.name,
            code: role.code,
            description: role.description,
        }
    }
}

/// Sanitized user returned by every admin endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminUserResponse {
    pub id: i64,
    pub firstname: String,
    pub lastname: Option<String>,
    pub email: String,
    pub is_active: bool,
    pub blocked: bool,
    pub prefered_language: Option<String>,
    pub roles: Vec<RoleResponse>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub deleted_by: Option<i64>,
}

impl From<User> for AdminUserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            firstname: user.firstname,
            lastname: user.lastname,
            email: user.email,
            is_active: user.is_active,
            blocked: user.blocked,
            prefered_language: user.prefered_language,
            roles: user.roles.into_iter().map(RoleResponse::from).collect(),
            created_at: user.created_at,
            updated_at: user.updated_at,
            deleted_at: user.deleted_at,
            deleted_by: user.deleted_by,
        }
    }
}

/// Request to create a new admin user
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AdminCreateUserRequest {
    #[serde(deserialize_with = "trimmed")]
    #[validate(length(min = 1, max = 100, message = "firstname must be 1-100 characters"))]
    pub firstname: String,
    #[serde(default, deserialize_with = "trimmed_optional")]
    #[validate(length(max = 100, message = "lastname must be at most 100 characters"))]
    pub lastname: Option<String>,
    #[serde(deserialize_with = "trimmed")]
    #[validate(email(message = "email must be a valid email address"))]
    pub email: String,
    #[validate(length(min = 1, message = "at least one role is required"))]
    pub roles: Vec<i64>,
    #[serde(default, deserialize_with = "trimmed_optional")]
    #[validate(length(min = 2, max = 20, message = "preferedLanguage must be 2-20 characters"))]
    pub prefered_language: Option<String>,
}

/// Partial update of an admin user; absent fields are left untouched.
///
/// `lastname` and `preferedLanguage` distinguish absent (`None`) from an
/// explicit `null` (`Some(None)`), which clears the stored value. Their
/// lengths are checked by [`AdminUpdateUserRequest::clearable_field_errors`].
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AdminUpdateUserRequest {
    #[serde(default, deserialize_with = "trimmed_optional")]
    #[validate(length(min = 1, max = 100, message = "firstname must be 1-100 characters"))]
    pub firstname: Option<String>,
    #[serde(default, deserialize_with = "trimmed_nullable")]
    pub lastname: Option<Option<String>>,
    #[serde(default, deserialize_with = "trimmed_optional")]
    #[validate(email(message = "email must be a valid email address"))]
    pub email: Option<String>,
    #[validate(length(min = 1, message = "at least one role is required"))]
    pub roles: Option<Vec<i64>>,
    #[serde(default, deserialize_with = "trimmed_nullable")]
    pub prefered_language: Option<Option<String>>,
    pub is_active: Option<bool>,
    pub blocked: Option<bool>,
    #[validate(length(min = 8, max = 128, message = "password must be 8-128 characters"))]
    pub password: Option<String>,
}

impl AdminUpdateUserRequest {
    /// Length rules for the fields that can be cleared with `null`, as `(field, message)`.
    pub fn clearable_field_errors(&self) -> Vec<(&'static str, &'static str)> {
        let mut errors = Vec::new();

        if let Some(Some(lastname)) = &self.lastname {
            if lastname.chars().count() > 100 {
                errors.push(("lastname", "lastname must be at most 100 characters"));
            }
        }
        if let Some(Some(language)) = &self.prefered_language {
            if !(2..=20).contains(&language.chars().count()) {
                errors.push(("preferedLanguage", "preferedLanguage must be 2-20 characters"));
            }
        }

        errors
    }
}

fn trimmed<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    Ok(raw.trim().to_string())
}

fn trimmed_optional<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.map(|value| value.trim().to_string()))
}

/// Present fields become `Some`; `null` and blank strings become `Some(None)`.
fn trimmed_nullable<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(Some(
        raw.map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty()),
    ))
}

/// Request body for bulk deletion
#[derive(Debug, Deserialize, Validate)]
pub struct DeleteManyUsersRequest {
    #[validate(length(min = 1, message = "ids must contain at least one id"))]
    pub ids: Vec<i64>,
}

/// Query string accepted by the list endpoint
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ListUsersQuery {
    #[validate(range(min = 1, message = "page must be at least 1"))]
    pub page: Option<u32>,
    #[validate(range(min = 1, message = "pageSize must be at least 1"))]
    pub page_size: Option<u32>,
    pub sort: Option<String>,
    pub is_active: Option<bool>,
    pub role: Option<i64>,
    #[serde(rename = "_q")]
    pub q: Option<String>,
}

impl ListUsersQuery {
    /// Trimmed search text, or `None` when the list should not search.
    pub fn search_text(&self) -> Option<&str> {
        self.q.as_deref().map(str::trim).filter(|q| !q.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    Id,
    Firstname,
    Lastname,
    Email,
    CreatedAt,
    UpdatedAt,
}

impl SortField {
    pub fn column(&self) -> &'static str {
        match self {
            SortField::Id => "id",
            SortField::Firstname => "firstname",
            SortField::Lastname => "lastname",
            SortField::Email => "email",
            SortField::CreatedAt => "created_at",
            SortField::UpdatedAt => "updated_at",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sort {
    pub field: SortField,
    pub descending: bool,
}

impl Default for Sort {
    fn default() -> Self {
        Self {
            field: SortField::CreatedAt,
            descending: true,
        }
    }
}

impl Sort {
    /// Parses `field` or `field:asc|desc`.
    pub fn parse(raw: &str) -> Option<Self> {
        let (field, direction) = match raw.split_once(':') {
            Some((field, direction)) => (field, direction),
            None => (raw, "asc"),
        };

        let field = match field.trim() {
            "id" => SortField::Id,
            "firstname" => SortField::Firstname,
            "lastname" => SortField::Lastname,
            "email" => SortField::Email,
            "createdAt" => SortField::CreatedAt,
            "updatedAt" => SortField::UpdatedAt,
            _ => return None,
        };

        let descending = match direction.trim().to_ascii_lowercase().as_str() {
            "asc" => false,
            "desc" => true,
            _ => return None,
        };

        Some(Self { field, descending })
    }

    pub fn order_by(&self) -> String {
        let direction = if self.descending { "DESC" } else { "ASC" };
        format!("{} {}, id {}", self.field.column(), direction, direction)
    }
}

/// Filters shared by plain listing and search
#[derive(Debug, Clone, Default)]
pub struct ListFilters {
    pub is_active: Option<bool>,
    pub role_id: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub page_size: u32,
}

impl PageRequest {
    pub fn offset(&self) -> i64 {
        i64::from(self.page.saturating_sub(1)) * i64::from(self.page_size)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u32,
    pub page_size: u32,
    pub page_count: u32,
    pub total: u64,
}

impl Pagination {
    pub fn new(request: PageRequest, total: u64) -> Self {
        let page_size = u64::from(request.page_size.max(1));
        let page_count = total.div_ceil(page_size);

        Self {
            page: request.page,
            page_size: request.page_size,
            page_count: u32::try_from(page_count).unwrap_or(u32::MAX),
            total,
        }
    }
}

/// A page of users as returned by the repository
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub results: Vec<T>,
    pub pagination: Pagination,
}

/// Response for the list endpoint
#[derive(Debug, Serialize, Deserialize)]
pub struct ListUsersResponse {
    pub results: Vec<AdminUserResponse>,
    pub pagination: Pagination,
}

impl From<Page<User>> for ListUsersResponse {
    fn from(page: Page<User>) -> Self {
        Self {
            results: page
                .results
                .into_iter()
                .map(AdminUserResponse::from)
                .collect(),
            pagination: page.pagination,
        }
    }
}

/// Normalized input for inserting a user
#[derive(Debug, Clone)]
pub struct NewAdminUser {
    pub firstname: String,
    pub lastname: Option<String>,
    pub email: String,
    pub password_hash: Option<String>,
    pub is_active: bool,
    pub prefered_language: Option<String>,
    pub role_ids: Vec<i64>,
}

/// Normalized partial update
#[derive(Debug, Clone, Default)]
pub struct UserPatch {
    pub firstname: Option<String>,
    /// `Some(None)` clears the column.
    pub lastname: Option<Option<String>>,
    pub email: Option<String>,
    pub password_hash: Option<String>,
    pub is_active: Option<bool>,
    pub blocked: Option<bool>,
    pub prefered_language: Option<Option<String>>,
    pub role_ids: Option<Vec<i64>>,
}

impl UserPatch {
    /// Whether applying the patch could leave no usable super-admin.
    pub fn touches_super_admin_status(&self) -> bool {
        self.role_ids.is_some() || self.is_active == Some(false) || self.blocked == Some(true)
    }
}

/// Emails are compared and stored trimmed and lowercased.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
