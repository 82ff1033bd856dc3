use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rust_decimal::Decimal;
use sea_orm::error::DbErr;
use serde::{Deserialize, Serialize};
use tracing::error;
use uuid::Uuid;

/// Error body returned by every HTTP endpoint
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// HTTP status category (e.g., "Not Found", "Unprocessable Entity")
    pub error: String,
    /// Human-readable error description
    pub message: String,
    /// ISO 8601 timestamp when error occurred
    pub timestamp: String,
}

/// Reasons a coupon code cannot be applied to an order total.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize)]
pub enum CouponError {
    #[error("Invalid coupon code: {0}")]
    NotFound(String),

    #[error("Coupon {0} has expired")]
    Expired(String),

    #[error("Order total {order_total} does not meet the minimum spend of {min_spend} for coupon {code}")]
    MinSpendNotMet {
        code: String,
        min_spend: Decimal,
        order_total: Decimal,
    },
}

#[derive(Debug, thiserror::Error, Serialize)]
pub enum ServiceError {
    #[error("Persistence failure: {0}")]
    PersistenceFailure(
        #[from]
        #[serde(skip)]
        DbErr,
    ),

    #[error("Cart is empty")]
    EmptyCart,

    #[error(transparent)]
    Coupon(#[from] CouponError),

    #[error("Insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: Uuid,
        requested: i32,
        available: i32,
    },

    #[error("Product {0} not found")]
    ProductNotFound(Uuid),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl ServiceError {
    /// Returns the HTTP status code for this error.
    /// This is the single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::PersistenceFailure(_) | Self::InternalError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::NotFound(_)
            | Self::ProductNotFound(_)
            | Self::Coupon(CouponError::NotFound(_)) => StatusCode::NOT_FOUND,
            Self::EmptyCart
            | Self::ValidationError(_)
            | Self::InvalidOperation(_)
            | Self::Coupon(_) => StatusCode::BAD_REQUEST,
            Self::InsufficientStock { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }

    /// Returns the error message suitable for HTTP responses.
    /// Store errors return a generic message to avoid leaking implementation details.
    pub fn response_message(&self) -> String {
        match self {
            Self::PersistenceFailure(_) | Self::InternalError(_) => {
                "Internal server error".to_string()
            }
            _ => self.to_string(),
        }
    }

    /// True for failures the shopper can fix by editing the cart or coupon.
    pub fn is_user_correctable(&self) -> bool {
        matches!(
            self,
            Self::EmptyCart
                | Self::Coupon(_)
                | Self::InsufficientStock { .. }
                | Self::ProductNotFound(_)
                | Self::ValidationError(_)
        )
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self, "request failed");
        }

        let body = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message: self.response_message(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(body)).into_response()
    }
}
