use crate::admin::users::models::{
    ListFilters, NewAdminUser, Page, PageRequest, Pagination, Role, Sort, User, UserPatch,
    SUPER_ADMIN_CODE,
};
use crate::database::{BoxError, Database};
use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OptionalExtension, Row};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

const USER_COLUMNS: &str = "id, firstname, lastname, email, password_hash, is_active, blocked, \
     prefered_language, deleted_at, deleted_by, created_at, updated_at";

/// Result of a mutation guarded by the super-admin invariant.
#[derive(Debug)]
pub enum MutationOutcome<T> {
    Applied(T),
    NotFound,
    /// Applying the change would leave no super-admin.
    LastSuperAdmin,
}

/// Result of a partial update.
#[derive(Debug)]
pub enum UpdateOutcome {
    Updated(User),
    NotFound,
    /// Another non-deleted user already has the requested email.
    EmailTaken,
    /// The update would leave no active, unblocked super-admin.
    LastSuperAdmin,
}

pub struct AdminUserRepository {
    db: Arc<Database>,
}

impl AdminUserRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Whether a non-deleted user already uses `email`, optionally ignoring one user.
    pub async fn exists(&self, email: &str, exclude_id: Option<i64>) -> Result<bool, BoxError> {
        let email = email.to_string();

        self.db
            .call(move |conn| Ok(email_taken(conn, &email, exclude_id)?))
            .await
    }

    /// Role ids from `ids` that do not exist.
    pub async fn missing_role_ids(&self, ids: &[i64]) -> Result<Vec<i64>, BoxError> {
        let wanted: BTreeSet<i64> = ids.iter().copied().collect();

        self.db
            .call(move |conn| {
                let mut stmt = conn.prepare("SELECT id FROM roles")?;
                let known = stmt
                    .query_map([], |row| row.get::<_, i64>(0))?
                    .collect::<Result<BTreeSet<_>, _>>()?;

                Ok(wanted.difference(&known).copied().collect())
            })
            .await
    }

    /// Inserts the user and its role links. Returns `None` when a non-deleted
    /// user already has the email.
    pub async fn create(&self, user: NewAdminUser) -> Result<Option<User>, BoxError> {
        self.db
            .call(move |conn| {
                let tx = conn.transaction()?;

                if email_taken(&tx, &user.email, None)? {
                    return Ok(None);
                }

                let inserted = tx.execute(
                    "INSERT INTO users (firstname, lastname, email, password_hash, is_active, prefered_language)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    rusqlite::params![
                        &user.firstname,
                        &user.lastname,
                        &user.email,
                        &user.password_hash,
                        user.is_active,
                        &user.prefered_language
                    ],
                );
                match inserted {
                    Err(e) if is_unique_violation(&e) => return Ok(None),
                    other => other?,
                };
                let user_id = tx.last_insert_rowid();
                replace_roles(&tx, user_id, &user.role_ids)?;

                let created = load_user(&tx, user_id, false)?
                    .ok_or("created user vanished before commit")?;
                tx.commit()?;

                Ok(Some(created))
            })
            .await
    }

    /// Plain paginated listing of non-deleted users.
    pub async fn find_page(
        &self,
        filters: ListFilters,
        sort: Sort,
        page: PageRequest,
    ) -> Result<Page<User>, BoxError> {
        self.db
            .call(move |conn| query_page(conn, None, &filters, sort, page))
            .await
    }

    /// Paginated free-text search over names and email of non-deleted users.
    pub async fn search_page(
        &self,
        q: &str,
        filters: ListFilters,
        sort: Sort,
        page: PageRequest,
    ) -> Result<Page<User>, BoxError> {
        let q = q.to_string();

        self.db
            .call(move |conn| query_page(conn, Some(&q), &filters, sort, page))
            .await
    }

    pub async fn find_one(&self, id: i64) -> Result<Option<User>, BoxError> {
        self.db
            .call(move |conn| Ok(load_user(conn, id, false)?))
            .await
    }

    /// Non-deleted user by email, credentials included. Used by login only.
    pub async fn find_credentials(&self, email: &str) -> Result<Option<User>, BoxError> {
        let email = email.to_string();

        self.db
            .call(move |conn| {
                let id = conn
                    .query_row(
                        "SELECT id FROM users WHERE email = ?1 AND deleted_at IS NULL",
                        [&email],
                        |row| row.get::<_, i64>(0),
                    )
                    .optional()?;

                match id {
                    Some(id) => Ok(load_user(conn, id, false)?),
                    None => Ok(None),
                }
            })
            .await
    }

    pub async fn update_by_id(
        &self,
        id: i64,
        patch: UserPatch,
    ) -> Result<UpdateOutcome, BoxError> {
        self.db
            .call(move |conn| {
                let tx = conn.transaction()?;

                if load_user(&tx, id, false)?.is_none() {
                    return Ok(UpdateOutcome::NotFound);
                }
                if let Some(email) = &patch.email {
                    if email_taken(&tx, email, Some(id))? {
                        return Ok(UpdateOutcome::EmailTaken);
                    }
                }

                let guarded = patch.touches_super_admin_status();
                let usable_before = count_super_admins(&tx, true)?;

                let mut assignments: Vec<&str> = Vec::new();
                let mut values: Vec<Value> = Vec::new();
                if let Some(firstname) = patch.firstname {
                    assignments.push("firstname = ?");
                    values.push(Value::Text(firstname));
                }
                if let Some(lastname) = patch.lastname {
                    assignments.push("lastname = ?");
                    values.push(lastname.map_or(Value::Null, Value::Text));
                }
                if let Some(email) = patch.email {
                    assignments.push("email = ?");
                    values.push(Value::Text(email));
                }
                if let Some(password_hash) = patch.password_hash {
                    assignments.push("password_hash = ?");
                    values.push(Value::Text(password_hash));
                }
                if let Some(is_active) = patch.is_active {
                    assignments.push("is_active = ?");
                    values.push(Value::Integer(i64::from(is_active)));
                }
                if let Some(blocked) = patch.blocked {
                    assignments.push("blocked = ?");
                    values.push(Value::Integer(i64::from(blocked)));
                }
                if let Some(prefered_language) = patch.prefered_language {
                    assignments.push("prefered_language = ?");
                    values.push(prefered_language.map_or(Value::Null, Value::Text));
                }
                assignments.push("updated_at = CURRENT_TIMESTAMP");
                values.push(Value::Integer(id));

                let updated = tx.execute(
                    &format!("UPDATE users SET {} WHERE id = ?", assignments.join(", ")),
                    params_from_iter(values),
                );
                match updated {
                    Err(e) if is_unique_violation(&e) => return Ok(UpdateOutcome::EmailTaken),
                    other => other?,
                };

                if let Some(role_ids) = &patch.role_ids {
                    replace_roles(&tx, id, role_ids)?;
                }

                if guarded && usable_before > 0 && count_super_admins(&tx, true)? == 0 {
                    return Ok(UpdateOutcome::LastSuperAdmin);
                }

                let updated = load_user(&tx, id, false)?.ok_or("updated user vanished")?;
                tx.commit()?;

                Ok(UpdateOutcome::Updated(updated))
            })
            .await
    }

    /// Soft-deletes one user on behalf of `actor_id`.
    pub async fn delete_by_id(
        &self,
        id: i64,
        actor_id: i64,
    ) -> Result<MutationOutcome<User>, BoxError> {
        match self.delete_by_ids(vec![id], actor_id).await? {
            MutationOutcome::Applied(mut deleted) => match deleted.pop() {
                Some(user) => Ok(MutationOutcome::Applied(user)),
                None => Ok(MutationOutcome::NotFound),
            },
            MutationOutcome::NotFound => Ok(MutationOutcome::NotFound),
            MutationOutcome::LastSuperAdmin => Ok(MutationOutcome::LastSuperAdmin),
        }
    }

    /// Soft-deletes every non-deleted user in `ids` within one transaction.
    /// Unknown or already deleted ids are skipped.
    pub async fn delete_by_ids(
        &self,
        ids: Vec<i64>,
        actor_id: i64,
    ) -> Result<MutationOutcome<Vec<User>>, BoxError> {
        let ids: BTreeSet<i64> = ids.into_iter().collect();

        self.db
            .call(move |conn| {
                let tx = conn.transaction()?;

                let mut targets = Vec::with_capacity(ids.len());
                for id in ids {
                    if load_user(&tx, id, false)?.is_some() {
                        targets.push(id);
                    }
                }

                let before = count_super_admins(&tx, false)?;

                for id in &targets {
                    tx.execute(
                        "UPDATE users
                         SET deleted_at = CURRENT_TIMESTAMP, deleted_by = ?1, updated_at = CURRENT_TIMESTAMP
                         WHERE id = ?2 AND deleted_at IS NULL",
                        rusqlite::params![actor_id, id],
                    )?;
                }

                if before > 0 && count_super_admins(&tx, false)? == 0 {
                    return Ok(MutationOutcome::LastSuperAdmin);
                }

                let mut deleted = Vec::with_capacity(targets.len());
                for id in targets {
                    deleted.push(load_user(&tx, id, true)?.ok_or("deleted user vanished")?);
                }
                tx.commit()?;

                Ok(MutationOutcome::Applied(deleted))
            })
            .await
    }

    /// Number of non-deleted users holding the super-admin role.
    pub async fn count_super_admins(&self) -> Result<u64, BoxError> {
        self.db
            .call(|conn| Ok(count_super_admins(conn, false)?))
            .await
    }

    /// Creates the first active super-admin unless one already exists.
    /// Returns `None` when nothing had to be created.
    pub async fn bootstrap_super_admin(
        &self,
        firstname: String,
        email: String,
        password_hash: String,
    ) -> Result<Option<User>, BoxError> {
        self.db
            .call(move |conn| {
                let tx = conn.transaction()?;

                if count_super_admins(&tx, false)? > 0 {
                    return Ok(None);
                }

                let taken = tx
                    .query_row(
                        "SELECT id FROM users WHERE email = ?1 AND deleted_at IS NULL",
                        [&email],
                        |_row| Ok(()),
                    )
                    .optional()?;
                if taken.is_some() {
                    return Err(format!(
                        "bootstrap admin email {} already belongs to a user without the super-admin role",
                        email
                    )
                    .into());
                }

                let role_id: i64 = tx.query_row(
                    "SELECT id FROM roles WHERE code = ?1",
                    [SUPER_ADMIN_CODE],
                    |row| row.get(0),
                )?;

                tx.execute(
                    "INSERT INTO users (firstname, email, password_hash, is_active) VALUES (?1, ?2, ?3, 1)",
                    rusqlite::params![&firstname, &email, &password_hash],
                )?;
                let user_id = tx.last_insert_rowid();
                replace_roles(&tx, user_id, &[role_id])?;

                let created = load_user(&tx, user_id, false)?.ok_or("bootstrap admin vanished")?;
                tx.commit()?;

                Ok(Some(created))
            })
            .await
    }
}

fn query_page(
    conn: &Connection,
    q: Option<&str>,
    filters: &ListFilters,
    sort: Sort,
    page: PageRequest,
) -> Result<Page<User>, BoxError> {
    let mut clauses = vec!["deleted_at IS NULL".to_string()];
    let mut values: Vec<Value> = Vec::new();

    if let Some(q) = q {
        let pattern = format!("%{}%", escape_like(q));
        clauses.push(
            "(firstname LIKE ? ESCAPE '\\' OR lastname LIKE ? ESCAPE '\\' OR email LIKE ? ESCAPE '\\')"
                .to_string(),
        );
        for _ in 0..3 {
            values.push(Value::Text(pattern.clone()));
        }
    }
    if let Some(is_active) = filters.is_active {
        clauses.push("is_active = ?".to_string());
        values.push(Value::Integer(i64::from(is_active)));
    }
    if let Some(role_id) = filters.role_id {
        clauses.push("id IN (SELECT user_id FROM user_roles WHERE role_id = ?)".to_string());
        values.push(Value::Integer(role_id));
    }

    let where_clause = clauses.join(" AND ");

    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM users WHERE {}", where_clause),
        params_from_iter(values.iter()),
        |row| row.get(0),
    )?;

    values.push(Value::Integer(i64::from(page.page_size)));
    values.push(Value::Integer(page.offset()));

    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM users WHERE {} ORDER BY {} LIMIT ? OFFSET ?",
        USER_COLUMNS,
        where_clause,
        sort.order_by()
    ))?;
    let mut users = stmt
        .query_map(params_from_iter(values.iter()), map_user)?
        .collect::<Result<Vec<_>, _>>()?;
    attach_roles(conn, &mut users)?;

    Ok(Page {
        results: users,
        pagination: Pagination::new(page, u64::try_from(total).unwrap_or(0)),
    })
}

fn load_user(conn: &Connection, id: i64, include_deleted: bool) -> rusqlite::Result<Option<User>> {
    let sql = if include_deleted {
        format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS)
    } else {
        format!("SELECT {} FROM users WHERE id = ?1 AND deleted_at IS NULL", USER_COLUMNS)
    };

    let user = conn.query_row(&sql, [id], map_user).optional()?;

    match user {
        Some(user) => {
            let mut users = vec![user];
            attach_roles(conn, &mut users)?;
            Ok(users.pop())
        }
        None => Ok(None),
    }
}

fn attach_roles(conn: &Connection, users: &mut [User]) -> rusqlite::Result<()> {
    if users.is_empty() {
        return Ok(());
    }

    let placeholders = vec!["?"; users.len()].join(", ");
    let mut stmt = conn.prepare(&format!(
        "SELECT ur.user_id, r.id, r.name, r.code, r.description
         FROM user_roles ur JOIN roles r ON r.id = ur.role_id
         WHERE ur.user_id IN ({})
         ORDER BY r.id",
        placeholders
    ))?;

    let mut by_user: HashMap<i64, Vec<Role>> = HashMap::new();
    let rows = stmt.query_map(params_from_iter(users.iter().map(|u| u.id)), |row| {
        Ok((
            row.get::<_, i64>(0)?,
            Role {
                id: row.get(1)?,
                name: row.get(2)?,
                code: row.get(3)?,
                description: row.get(4)?,
            },
        ))
    })?;
    for row in rows {
        let (user_id, role) = row?;
        by_user.entry(user_id).or_default().push(role);
    }

    for user in users.iter_mut() {
        user.roles = by_user.remove(&user.id).unwrap_or_default();
    }

    Ok(())
}

fn replace_roles(conn: &Connection, user_id: i64, role_ids: &[i64]) -> rusqlite::Result<()> {
    conn.execute("DELETE FROM user_roles WHERE user_id = ?1", [user_id])?;

    let unique: BTreeSet<i64> = role_ids.iter().copied().collect();
    let mut stmt = conn.prepare("INSERT INTO user_roles (user_id, role_id) VALUES (?1, ?2)")?;
    for role_id in unique {
        stmt.execute([user_id, role_id])?;
    }

    Ok(())
}

/// Non-deleted super-admins; with `usable_only`, only those that can sign in.
fn count_super_admins(conn: &Connection, usable_only: bool) -> rusqlite::Result<u64> {
    let mut sql = String::from(
        "SELECT COUNT(DISTINCT u.id) FROM users u
         JOIN user_roles ur ON ur.user_id = u.id
         JOIN roles r ON r.id = ur.role_id
         WHERE r.code = ?1 AND u.deleted_at IS NULL",
    );
    if usable_only {
        sql.push_str(" AND u.is_active = 1 AND u.blocked = 0");
    }

    let count: i64 = conn.query_row(&sql, [SUPER_ADMIN_CODE], |row| row.get(0))?;
    Ok(u64::try_from(count).unwrap_or(0))
}

fn email_taken(conn: &Connection, email: &str, exclude_id: Option<i64>) -> rusqlite::Result<bool> {
    let found = conn
        .query_row(
            "SELECT id FROM users
             WHERE email = ?1 AND deleted_at IS NULL AND (?2 IS NULL OR id != ?2)",
            rusqlite::params![email, exclude_id],
            |_row| Ok(()),
        )
        .optional()?;

    Ok(found.is_some())
}

/// The partial unique index on live emails is the only unique constraint a
/// user write can hit.
fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

fn map_user(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        firstname: row.get(1)?,
        lastname: row.get(2)?,
        email: row.get(3)?,
        password_hash: row.get(4)?,
        is_active: row.get::<_, i64>(5)? != 0,
        blocked: row.get::<_, i64>(6)? != 0,
        prefered_language: row.get(7)?,
        roles: Vec::new(),
        deleted_at: row.get::<_, Option<String>>(8)?.map(parse_datetime),
        deleted_by: row.get(9)?,
        created_at: parse_datetime(row.get::<_, String>(10)?),
        updated_at: parse_datetime(row.get::<_, String>(11)?),
    })
}

fn escape_like(q: &str) -> String {
    let mut escaped = String::with_capacity(q.len());
    for c in q.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn parse_datetime(s: String) -> DateTime<Utc> {
    // SQLite stores timestamps as strings, parse them
    // Format: YYYY-MM-DD HH:MM:SS
    chrono::NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|dt| dt.and_utc())
        .unwrap_or_else(Utc::now)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("ada"), "ada");
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
    }

    #[test]
    fn test_unique_violation_detection() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (email TEXT UNIQUE); INSERT INTO t VALUES ('a');")
            .unwrap();

        let err = conn.execute("INSERT INTO t VALUES ('a')", []).unwrap_err();
        assert!(is_unique_violation(&err));

        let err = conn.execute("INSERT INTO missing VALUES ('a')", []).unwrap_err();
        assert!(!is_unique_violation(&err));
    }

    #[test]
    fn test_parse_sqlite_timestamp() {
        let parsed = parse_datetime("2024-03-01 12:30:45".to_string());
        assert_eq!(parsed.to_rfc3339(), "2024-03-01T12:30:45+00:00");
    }
}
