use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CouponError>;

#[derive(Debug, Error)]
pub enum CouponError {
    #[error("invalid mobile number: {0}")]
    InvalidMobileNumber(String),

    #[error("no unused coupons remain in the pool")]
    PoolExhausted,

    #[error("mobile number {0} already has a distribution")]
    DuplicateMobile(String),

    #[error("coupon code {0} already exists in the pool")]
    DuplicateCode(String),

    #[error("coupon {0} not found")]
    CouponNotFound(i32),

    #[error("rate limit exceeded")]
    RateLimited,

    #[error("{message}")]
    InvalidUpload {
        error: &'static str,
        message: String,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("storage failure: {0}")]
    Storage(String),
}

impl From<sqlx::Error> for CouponError {
    fn from(err: sqlx::Error) -> Self {
        CouponError::Storage(err.to_string())
    }
}

impl IntoResponse for CouponError {
    fn into_response(self) -> Response {
        match self {
            CouponError::InvalidMobileNumber(detail) => (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "success": false,
                    "error": "Invalid mobile number",
                    "message": detail.clone(),
                    "details": [detail],
                })),
            )
                .into_response(),
            CouponError::PoolExhausted => (
                StatusCode::GONE,
                Json(json!({
                    "success": false,
                    "error": "No coupons available",
                    "message": "All coupon codes have been distributed. Please contact support.",
                })),
            )
                .into_response(),
            CouponError::RateLimited => {
                let mut response = (
                    StatusCode::TOO_MANY_REQUESTS,
                    Json(json!({
                        "success": false,
                        "error": "Rate limit exceeded",
                        "message": "Too many requests. Please try again later.",
                        "retryAfter": "60 seconds",
                    })),
                )
                    .into_response();
                response
                    .headers_mut()
                    .insert("Retry-After", HeaderValue::from_static("60"));
                response
            }
            CouponError::InvalidUpload { error, message } => (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "success": false,
                    "error": error,
                    "message": message,
                })),
            )
                .into_response(),
            // Conflicts and missing ids are recovered internally; reaching
            // here means an invariant broke. Log and hide the detail.
            other => {
                tracing::error!(error = %other, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({
                        "success": false,
                        "error": "Internal server error",
                        "message": "An unexpected error occurred while processing your request",
                    })),
                )
                    .into_response()
            }
        }
    }
}
