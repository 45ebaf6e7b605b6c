mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use tower::ServiceExt;

#[tokio::test]
async fn test_health_endpoint() {
    let app = common::create_test_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_admin_users_page_requires_session() {
    let app = common::create_test_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/admin/users")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_admin_users_page_lists_users() {
    let app = common::create_test_app().await;
    let cookie = common::login_admin(&app).await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/admin/users?_q=admin")
                .header("Cookie", cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let html = String::from_utf8(body.to_vec()).unwrap();

    assert!(html.contains("User Administration"));
    assert!(html.contains(common::ADMIN_EMAIL));
    assert!(html.contains("Super Admin"));
    assert!(!html.contains("argon2"));
}

#[tokio::test]
async fn test_logout_ends_session() {
    let app = common::create_test_app().await;
    let cookie = common::login_admin(&app).await;

    let (status, _) = common::send(&app, "POST", "/api/admin/logout", Some(&cookie), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = common::send(&app, "GET", "/api/admin/users", Some(&cookie), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_bootstrap_is_idempotent() {
    let app_state = common::create_test_app_state().await;

    admin_users::bootstrap_super_admin(&app_state).await.unwrap();

    let repo = admin_users::admin::AdminUserRepository::new(app_state.db.clone());
    assert_eq!(repo.count_super_admins().await.unwrap(), 1);
}
