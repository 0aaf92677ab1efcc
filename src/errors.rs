use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".into())
            }
        };

        (
            status,
            Json(ErrorBody {
                success: false,
                error: message,
            }),
        )
            .into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        AppError::Internal(e.into())
    }
}

// ---------------------------------------------------------------------------
// Chain error classification
// ---------------------------------------------------------------------------

/// Coarse classification of RPC / transaction failures. Public RPC nodes
/// return these conditions as free-form message strings, so classification
/// is by substring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainErrorKind {
    /// 429 / "too many requests" — defer, never fatal.
    RateLimited,
    /// Signer cannot pay for gas or transfer value. Aborts a batch.
    InsufficientFunds,
    /// Node rejected the fee level (e.g. "max fee per gas less than block
    /// base fee", "fee cap"). Aborts a batch.
    FeeCapExceeded,
    /// Anything else — treated as transient for a single unit of work.
    Other,
}

impl ChainErrorKind {
    pub fn classify(message: &str) -> Self {
        let m = message.to_lowercase();
        if m.contains("too many requests") || m.contains("rate limit") || m.contains("429") {
            ChainErrorKind::RateLimited
        } else if m.contains("insufficient funds") {
            ChainErrorKind::InsufficientFunds
        } else if m.contains("fee cap") || m.contains("max fee per gas") {
            ChainErrorKind::FeeCapExceeded
        } else {
            ChainErrorKind::Other
        }
    }

    /// Whether a redemption batch should stop instead of continuing to fail.
    pub fn aborts_batch(&self) -> bool {
        matches!(
            self,
            ChainErrorKind::RateLimited
                | ChainErrorKind::InsufficientFunds
                | ChainErrorKind::FeeCapExceeded
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_rate_limit() {
        assert_eq!(
            ChainErrorKind::classify("HTTP 429 Too Many Requests"),
            ChainErrorKind::RateLimited
        );
    }

    #[test]
    fn classifies_insufficient_funds() {
        assert_eq!(
            ChainErrorKind::classify("insufficient funds for gas * price + value"),
            ChainErrorKind::InsufficientFunds
        );
    }

    #[test]
    fn classifies_fee_cap() {
        assert_eq!(
            ChainErrorKind::classify("tx fee cap exceeded"),
            ChainErrorKind::FeeCapExceeded
        );
        assert!(ChainErrorKind::classify("max fee per gas less than block base fee")
            .aborts_batch());
    }

    #[test]
    fn other_does_not_abort() {
        assert!(!ChainErrorKind::classify("connection reset by peer").aborts_batch());
    }
}
