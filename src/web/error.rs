//! JSON error responses for the HTTP API.

use std::collections::BTreeMap;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;
use tracing::error;
use ts_rs::TS;

use crate::registrar::RegistrarError;

/// Body of every non-2xx API response.
#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ApiErrorBody {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, String>,
}

/// An HTTP status plus a machine-readable code and a human-readable message.
#[derive(Debug, Clone)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ApiErrorBody,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ApiErrorBody {
                code: code.to_owned(),
                message: message.into(),
                fields: BTreeMap::new(),
            },
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "bad_request", message)
    }

    /// A 400 pointing at a single request field.
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        let mut err = Self::new(
            StatusCode::BAD_REQUEST,
            "validation_failed",
            format!("{field}: {message}"),
        );
        err.body.fields.insert(field.to_owned(), message);
        err
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthorized", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, "forbidden", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, "conflict", message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", message)
    }

    fn with_code(mut self, code: &str) -> Self {
        self.body.code = code.to_owned();
        self
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

impl From<RegistrarError> for ApiError {
    fn from(err: RegistrarError) -> Self {
        let message = err.to_string();
        match err {
            RegistrarError::StudentNotFound(_) => {
                ApiError::not_found(message).with_code("student_not_found")
            }
            RegistrarError::CourseNotFound(_) => {
                ApiError::not_found(message).with_code("course_not_found")
            }
            RegistrarError::InvoiceNotFound(_) => {
                ApiError::not_found(message).with_code("invoice_not_found")
            }
            RegistrarError::NotEnrolled => ApiError::not_found(message).with_code("not_enrolled"),
            RegistrarError::NotWaitlisted => {
                ApiError::not_found(message).with_code("not_waitlisted")
            }
            RegistrarError::StudentInactive { .. } => {
                ApiError::conflict(message).with_code("student_inactive")
            }
            RegistrarError::CourseFull { .. } => ApiError::conflict(message).with_code("course_full"),
            RegistrarError::AlreadyEnrolled => {
                ApiError::conflict(message).with_code("already_enrolled")
            }
            RegistrarError::AlreadyCompleted => {
                ApiError::conflict(message).with_code("already_completed")
            }
            RegistrarError::AlreadyWaitlisted => {
                ApiError::conflict(message).with_code("already_waitlisted")
            }
            RegistrarError::SeatsAvailable { .. } => {
                ApiError::conflict(message).with_code("seats_available")
            }
            RegistrarError::CapacityBelowEnrollment { .. } => {
                ApiError::conflict(message).with_code("capacity_below_enrollment")
            }
            RegistrarError::NotGradable { .. } => {
                ApiError::conflict(message).with_code("not_gradable")
            }
            RegistrarError::InvoiceClosed { .. } => {
                ApiError::conflict(message).with_code("invoice_closed")
            }
            RegistrarError::Overpayment { .. } => ApiError::conflict(message).with_code("overpayment"),
            RegistrarError::InvoiceHasPayments => {
                ApiError::conflict(message).with_code("invoice_has_payments")
            }
            RegistrarError::Duplicate { field } => {
                let mut err = ApiError::conflict(message).with_code("duplicate");
                err.body
                    .fields
                    .insert(field.to_owned(), "already in use".to_owned());
                err
            }
            RegistrarError::InvalidGrade(_) => ApiError::validation("grade", message),
            RegistrarError::Validation { field, message } => ApiError::validation(field, message),
        }
    }
}

/// Log a failed data-layer call and hide the details behind a generic 500.
pub fn db_error(context: &str, e: anyhow::Error) -> ApiError {
    error!(error = ?e, "{context} failed");
    ApiError::internal_error(format!("{context} failed"))
}

/// Map a data-layer error to a response.
///
/// Domain failures ([`RegistrarError`]) keep their specific status; anything
/// else is treated as a database error.
pub fn registrar_error(context: &str, e: anyhow::Error) -> ApiError {
    match e.downcast_ref::<RegistrarError>() {
        Some(domain) => ApiError::from(domain.clone()),
        None => db_error(context, e),
    }
}

/// Turn a missing row into a 404 naming the resource.
pub trait OptionNotFoundExt<T> {
    fn or_not_found(self, kind: &str, id: impl std::fmt::Display) -> Result<T, ApiError>;
}

impl<T> OptionNotFoundExt<T> for Option<T> {
    fn or_not_found(self, kind: &str, id: impl std::fmt::Display) -> Result<T, ApiError> {
        self.ok_or_else(|| ApiError::not_found(format!("{kind} {id} not found")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_errors_map_to_statuses() {
        let cases = [
            (RegistrarError::CourseNotFound(1), StatusCode::NOT_FOUND),
            (
                RegistrarError::CourseFull {
                    course_id: 1,
                    capacity: 2,
                },
                StatusCode::CONFLICT,
            ),
            (RegistrarError::AlreadyWaitlisted, StatusCode::CONFLICT),
            (
                RegistrarError::InvalidGrade("Z".to_owned()),
                StatusCode::BAD_REQUEST,
            ),
            (
                RegistrarError::Overpayment {
                    amount_cents: 2,
                    balance_cents: 1,
                },
                StatusCode::CONFLICT,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status, status);
        }
    }

    #[test]
    fn test_validation_carries_field() {
        let err = ApiError::from(RegistrarError::validation("email", "must be valid"));
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.body.code, "validation_failed");
        assert_eq!(
            err.body.fields.get("email").map(String::as_str),
            Some("must be valid")
        );
    }

    #[test]
    fn test_registrar_error_downcasts_through_context() {
        let e = anyhow::Error::from(RegistrarError::NotWaitlisted).context("leave waitlist");
        let api = registrar_error("leave waitlist", e);
        assert_eq!(api.status, StatusCode::NOT_FOUND);
        assert_eq!(api.body.code, "not_waitlisted");
    }

    #[test]
    fn test_unknown_errors_become_500() {
        let api = registrar_error("list", anyhow::anyhow!("connection reset"));
        assert_eq!(api.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(api.body.message, "list failed");
    }

    #[test]
    fn test_or_not_found() {
        let missing: Option<i32> = None;
        let err = missing.or_not_found("Course", 42).unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
        assert_eq!(err.body.message, "Course 42 not found");
    }

    #[test]
    fn test_body_omits_empty_fields() {
        let json = serde_json::to_value(ApiError::conflict("nope").body).unwrap();
        assert!(json.get("fields").is_none());
    }
}
