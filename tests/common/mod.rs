use admin_users::{bootstrap_super_admin, config::AppConfig, database::Database, AppState};
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

pub const ADMIN_EMAIL: &str = "admin@example.com";
pub const ADMIN_PASSWORD: &str = "adminpass123";

pub const SUPER_ADMIN_ROLE: i64 = 1;
pub const EDITOR_ROLE: i64 = 2;
#[allow(dead_code)]
pub const AUTHOR_ROLE: i64 = 3;

/// Creates a test app with a fresh database for integration testing.
/// The same router must be reused within a test so sessions survive.
#[allow(dead_code)]
pub async fn create_test_app() -> Router {
    let app_state = create_test_app_state().await;
    admin_users::create_router(app_state).await
}

/// Creates a test app state with a unique temporary database and a bootstrapped super admin
pub async fn create_test_app_state() -> AppState {
    let temp_dir = std::env::temp_dir();
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();

    let test_db_path = temp_dir
        .join(format!("test_admin_users_{}_{}.db", std::process::id(), timestamp))
        .to_string_lossy()
        .to_string();

    let config = Arc::new(AppConfig {
        database_url: test_db_path,
        environment: "test".to_string(),
        bootstrap_admin_email: Some(ADMIN_EMAIL.to_string()),
        bootstrap_admin_password: Some(ADMIN_PASSWORD.to_string()),
        ..AppConfig::default()
    });

    let db = Arc::new(Database::new(&config.database_url).await.unwrap());
    db.migrate().await.unwrap();

    let app_state = AppState { db, config };
    bootstrap_super_admin(&app_state).await.unwrap();

    app_state
}

/// Sends a request and returns the status with the decoded JSON body (`Null` when empty or not JSON).
#[allow(dead_code)]
pub async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    cookie: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().uri(uri).method(method);
    if let Some(cookie) = cookie {
        builder = builder.header("Cookie", cookie);
    }

    let request = match body {
        Some(body) => builder
            .header("Content-Type", "application/json")
            .body(Body::from(serde_json::to_string(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

    (status, json)
}

/// Logs in and returns the session cookie pair to send back.
#[allow(dead_code)]
pub async fn login(app: &Router, email: &str, password: &str) -> String {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/admin/login")
                .method("POST")
                .header("Content-Type", "application/json")
                .body(Body::from(
                    serde_json::json!({ "email": email, "password": password }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK, "login failed for {}", email);

    response
        .headers()
        .get("set-cookie")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.split(';').next())
        .unwrap_or("")
        .to_string()
}

#[allow(dead_code)]
pub async fn login_admin(app: &Router) -> String {
    login(app, ADMIN_EMAIL, ADMIN_PASSWORD).await
}
