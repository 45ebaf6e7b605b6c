//! Extractors that deserialize request input and run `validator` rules on it.
//!
//! Both reject with [`AdminApiError`], so malformed input and failed rules
//! share the same 400 response shape.

use axum::async_trait;
use axum::extract::{FromRequest, FromRequestParts, Query, Request};
use axum::http::request::Parts;
use axum::Json;
use serde::de::DeserializeOwned;
use validator::Validate;

use crate::admin::error::AdminApiError;

/// Like `axum::Json<T>`, but the value has also passed `Validate::validate()`.
pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = AdminApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| AdminApiError::Validation {
                message: format!("Invalid JSON: {}", rejection.body_text()),
                details: Default::default(),
            })?;

        value.validate()?;

        Ok(ValidatedJson(value))
    }
}

/// Like `axum::extract::Query<T>`, with validation.
pub struct ValidatedQuery<T>(pub T);

#[async_trait]
impl<S, T> FromRequestParts<S> for ValidatedQuery<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = AdminApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(|rejection| AdminApiError::Validation {
                message: format!("Invalid query string: {}", rejection.body_text()),
                details: Default::default(),
            })?;

        value.validate()?;

        Ok(ValidatedQuery(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::routing::{get, post};
    use axum::Router;
    use serde::Deserialize;
    use tower::ServiceExt;

    #[derive(Debug, Deserialize, Validate)]
    struct TestBody {
        #[validate(length(min = 1, max = 10))]
        name: String,
    }

    #[derive(Debug, Deserialize, Validate)]
    struct TestQuery {
        #[validate(range(min = 1))]
        page: Option<u32>,
    }

    async fn body_handler(ValidatedJson(_body): ValidatedJson<TestBody>) -> &'static str {
        "ok"
    }

    async fn query_handler(ValidatedQuery(_query): ValidatedQuery<TestQuery>) -> &'static str {
        "ok"
    }

    fn app() -> Router {
        Router::new()
            .route("/body", post(body_handler))
            .route("/query", get(query_handler))
    }

    fn json_request(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/body")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn valid_body_passes() {
        let response = app().oneshot(json_request(r#"{"name":"Ada"}"#)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn malformed_json_is_bad_request() {
        let response = app().oneshot(json_request("not json")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn failed_rule_is_bad_request_with_details() {
        let response = app().oneshot(json_request(r#"{"name":""}"#)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(json["details"]["name"].is_array());
    }

    #[tokio::test]
    async fn query_rules_apply() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/query?page=0")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/query?page=abc")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
