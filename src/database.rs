use rusqlite::Connection;
use rusqlite_migration::{Migrations, M};
use std::sync::{Arc, Mutex};
use tokio::task;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub struct Database {
    connection: Mutex<Connection>,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self, BoxError> {
        let db_path = database_url.strip_prefix("sqlite:").unwrap_or(database_url).to_string();

        // Ensure the data directory exists
        if let Some(parent) = std::path::Path::new(&db_path).parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let connection = task::spawn_blocking(move || -> Result<Connection, BoxError> {
            let conn = Connection::open(&db_path)?;
            conn.pragma_update(None, "foreign_keys", "ON")?;
            Ok(conn)
        })
        .await??;

        Ok(Database {
            connection: Mutex::new(connection),
        })
    }

    pub async fn migrate(&self) -> Result<(), BoxError> {
        let migrations = Migrations::new(vec![M::up(include_str!(
            "../migrations/001_initial_schema.sql"
        ))]);

        let mut conn = self
            .connection
            .lock()
            .map_err(|_| "database connection mutex poisoned")?;
        migrations.to_latest(&mut conn)?;

        Ok(())
    }

    pub async fn health_check(self: &Arc<Self>) -> Result<(), BoxError> {
        self.call(|conn| {
            let _result: i32 = conn.query_row("SELECT 1", [], |row| row.get(0))?;
            Ok(())
        })
        .await
    }

    /// Runs `f` against the connection on the blocking thread pool.
    pub async fn call<F, T>(self: &Arc<Self>, f: F) -> Result<T, BoxError>
    where
        F: FnOnce(&mut Connection) -> Result<T, BoxError> + Send + 'static,
        T: Send + 'static,
    {
        let db = Arc::clone(self);

        task::spawn_blocking(move || -> Result<T, BoxError> {
            let mut conn = db
                .connection
                .lock()
                .map_err(|_| "database connection mutex poisoned")?;
            f(&mut conn)
        })
        .await?
    }
}
