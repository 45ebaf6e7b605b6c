use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Map, Value};
use tracing::error;
use validator::ValidationErrors;

#[derive(Debug)]
pub enum AdminApiError {
    Unauthorized,
    NotFound,
    /// Malformed or missing input, with per-field messages.
    Validation {
        message: String,
        details: Map<String, Value>,
    },
    /// Business rule violation such as a duplicate email.
    BadRequest(String),
    DatabaseError(String),
    InternalError(String),
}

impl AdminApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        AdminApiError::BadRequest(message.into())
    }

    pub fn invalid_field(field: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        let mut details = Map::new();
        details.insert(field.to_string(), json!([message.clone()]));

        AdminApiError::Validation { message, details }
    }
}

impl From<ValidationErrors> for AdminApiError {
    fn from(errors: ValidationErrors) -> Self {
        let mut details = Map::new();
        let mut messages = Vec::new();

        for (field, errs) in errors.field_errors() {
            let field_messages: Vec<String> = errs
                .iter()
                .map(|e| {
                    e.message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("{} is invalid ({})", field, e.code))
                })
                .collect();
            messages.extend(field_messages.iter().cloned());
            details.insert(field.to_string(), json!(field_messages));
        }

        let message = if messages.is_empty() {
            "Validation failed".to_string()
        } else {
            messages.sort();
            messages.join("; ")
        };

        AdminApiError::Validation { message, details }
    }
}

impl IntoResponse for AdminApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AdminApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                json!({ "error": "Unauthorized" }),
            ),
            AdminApiError::NotFound => (
                StatusCode::NOT_FOUND,
                json!({ "error": "User does not exist" }),
            ),
            AdminApiError::Validation { message, details } => (
                StatusCode::BAD_REQUEST,
                json!({ "error": message, "details": details }),
            ),
            AdminApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
            AdminApiError::DatabaseError(msg) | AdminApiError::InternalError(msg) => {
                error!("Admin API failure: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "Internal server error" }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use validator::Validate;

    #[derive(Debug, Deserialize, Validate)]
    struct SampleInput {
        #[validate(email(message = "email must be a valid email address"))]
        email: String,
    }

    #[test]
    fn test_validation_errors_carry_field_details() {
        let errors = SampleInput {
            email: "nope".to_string(),
        }
        .validate()
        .unwrap_err();

        match AdminApiError::from(errors) {
            AdminApiError::Validation { message, details } => {
                assert_eq!(message, "email must be a valid email address");
                assert_eq!(details["email"][0], "email must be a valid email address");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            AdminApiError::NotFound.into_response().status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AdminApiError::bad_request("Email already taken")
                .into_response()
                .status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AdminApiError::invalid_field("sort", "bad sort")
                .into_response()
                .status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AdminApiError::DatabaseError("boom".to_string())
                .into_response()
                .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
