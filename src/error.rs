use std::sync::atomic::{AtomicBool, Ordering};

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        FromRequest, FromRequestParts,
    },
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;

use crate::places::services::DUPLICATE_PLACE;

static EXPOSE_INTERNAL: AtomicBool = AtomicBool::new(false);

/// Whether unexpected errors carry their full diagnostic chain in responses.
/// Turned on outside production at startup.
pub fn expose_internal_errors(on: bool) {
    EXPOSE_INTERNAL.store(on, Ordering::Relaxed);
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("Token is invalid or has expired")]
    InvalidOrExpiredToken,
    #[error("You are not logged in! Please log in to get access.")]
    NotAuthenticated,
    #[error("The user belonging to this token does no longer exist.")]
    UserGone,
    #[error("User recently changed password! Please log in again.")]
    StaleToken,
    #[error("{0}")]
    InvalidCredentials(&'static str),
    #[error("You do not have permission to perform this action")]
    Forbidden,
    #[error("{0}")]
    NotFound(String),
    #[error("There is no user with that email address.")]
    NoSuchUser,
    #[error("{0}")]
    Conflict(String),
    #[error("Too many requests from this IP, please try again in an hour")]
    TooManyRequests,
    #[error("There was an error sending the email. Try again later!")]
    DeliveryFailed,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    status: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_)
            | AppError::BadRequest(_)
            | AppError::InvalidOrExpiredToken => StatusCode::BAD_REQUEST,
            AppError::NotAuthenticated
            | AppError::UserGone
            | AppError::StaleToken
            | AppError::InvalidCredentials(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::NotFound(_) | AppError::NoSuchUser => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            AppError::DeliveryFailed | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Operational errors are expected and safe to show to the client.
    pub fn is_operational(&self) -> bool {
        !matches!(self, AppError::Internal(_))
    }

    pub fn not_found(what: &str) -> Self {
        AppError::NotFound(format!("No {what} found with that ID"))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let kind = if status.is_client_error() { "fail" } else { "error" };
        let body = match &self {
            AppError::Internal(e) => {
                error!(error = ?e, "unexpected error");
                if EXPOSE_INTERNAL.load(Ordering::Relaxed) {
                    ErrorBody {
                        status: kind,
                        message: e.to_string(),
                        error: Some(format!("{e:?}")),
                    }
                } else {
                    ErrorBody {
                        status: kind,
                        message: "Something went very wrong!".into(),
                        error: None,
                    }
                }
            }
            other => ErrorBody {
                status: kind,
                message: other.to_string(),
                error: None,
            },
        };
        (status, Json(body)).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::RowNotFound => AppError::NotFound("No document found with that ID".into()),
            sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
                AppError::Conflict(conflict_message(db.constraint()))
            }
            _ => AppError::Internal(e.into()),
        }
    }
}

fn conflict_message(constraint: Option<&str>) -> String {
    match constraint {
        Some("users_email_key") => "Email already registered".into(),
        Some("places_identity_key") => DUPLICATE_PLACE.into(),
        Some("places_slug_key") => "A place with this slug already exists".into(),
        _ => "Duplicate value".into(),
    }
}

impl From<JsonRejection> for AppError {
    fn from(r: JsonRejection) -> Self {
        AppError::Validation(r.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(r: PathRejection) -> Self {
        AppError::BadRequest(r.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(r: QueryRejection) -> Self {
        AppError::BadRequest(r.body_text())
    }
}

/// `Json` extractor whose rejection goes through [`AppError`].
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct AppJson<T>(pub T);

/// `Path` extractor whose rejection goes through [`AppError`].
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct AppPath<T>(pub T);

/// `Query` extractor whose rejection goes through [`AppError`].
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct AppQuery<T>(pub T);

pub async fn fallback(uri: Uri) -> AppError {
    AppError::NotFound(format!("can't find {uri} on this server!"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_json(resp: Response) -> serde_json::Value {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn status_codes_follow_taxonomy() {
        assert_eq!(AppError::Validation("x".into()).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::InvalidOrExpiredToken.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::NotAuthenticated.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::StaleToken.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::UserGone.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::Forbidden.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::NoSuchUser.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::Conflict("dup".into()).status_code(), StatusCode::CONFLICT);
        assert_eq!(AppError::DeliveryFailed.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn client_errors_are_fail_with_message() {
        let resp = AppError::Forbidden.into_response();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        let json = body_json(resp).await;
        assert_eq!(json["status"], "fail");
        assert_eq!(json["message"], "You do not have permission to perform this action");
    }

    #[tokio::test]
    async fn delivery_failure_is_error() {
        let json = body_json(AppError::DeliveryFailed.into_response()).await;
        assert_eq!(json["status"], "error");
    }

    #[test]
    fn only_internal_is_not_operational() {
        assert!(AppError::StaleToken.is_operational());
        assert!(!AppError::Internal(anyhow::anyhow!("boom")).is_operational());
    }

    #[test]
    fn unique_violations_name_the_constraint() {
        assert_eq!(conflict_message(Some("places_identity_key")), DUPLICATE_PLACE);
        assert_eq!(conflict_message(Some("users_email_key")), "Email already registered");
        assert_eq!(
            conflict_message(Some("places_slug_key")),
            "A place with this slug already exists"
        );
        assert_eq!(conflict_message(None), "Duplicate value");
    }

    #[test]
    fn row_not_found_maps_to_not_found() {
        let err: AppError = sqlx::Error::RowNotFound.into();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }
}
