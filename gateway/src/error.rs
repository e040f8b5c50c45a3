use alloy_primitives::Address;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use counter_lib::wire::ErrorResponse;
use counter_lib::{InputError, ProofError, RuntimeError};
use thiserror::Error;
use tracing::warn;

pub type GatewayResult<T> = Result<T, GatewayError>;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("FHE runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    #[error("Input proof error: {0}")]
    Proof(#[from] ProofError),

    #[error("Invalid input: {0}")]
    Input(#[from] InputError),

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("No counter deployed at {0}")]
    CounterNotFound(Address),

    #[error("Nonce mismatch for {account}: expected {expected}, got {actual}")]
    NonceMismatch {
        account: Address,
        expected: u64,
        actual: u64,
    },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl GatewayError {
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Runtime(RuntimeError::UnknownHandle(_)) | Self::CounterNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            Self::Runtime(RuntimeError::AccessDenied { .. }) | Self::InvalidSignature(_) => {
                StatusCode::FORBIDDEN
            }
            Self::Proof(ProofError::Signing(_)) | Self::Config(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::NonceMismatch { .. } => StatusCode::CONFLICT,
            Self::Runtime(_) | Self::Proof(_) | Self::Input(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Get error code for logging and API responses
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Runtime(inner) => inner.error_code(),
            Self::Proof(inner) => inner.error_code(),
            Self::Input(_) => "INVALID_INPUT",
            Self::InvalidSignature(_) => "INVALID_SIGNATURE",
            Self::CounterNotFound(_) => "COUNTER_NOT_FOUND",
            Self::NonceMismatch { .. } => "NONCE_MISMATCH",
            Self::Config(_) => "CONFIG_ERROR",
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        warn!("❌ Request failed ({}): {}", self.error_code(), self);

        let body = ErrorResponse {
            error: self.to_string(),
            code: self.error_code().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use counter_lib::CiphertextHandle;

    #[test]
    fn test_status_codes() {
        let handle = CiphertextHandle::UNINITIALIZED;
        assert_eq!(
            GatewayError::Runtime(RuntimeError::UnknownHandle(handle)).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            GatewayError::Runtime(RuntimeError::AccessDenied {
                handle,
                account: Address::ZERO
            })
            .status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            GatewayError::Runtime(RuntimeError::ProofRejected(ProofError::HandleNotInProof(handle)))
                .status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            GatewayError::NonceMismatch {
                account: Address::ZERO,
                expected: 1,
                actual: 0
            }
            .status_code(),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn test_error_codes_follow_inner_errors() {
        let err = GatewayError::Runtime(RuntimeError::ProofRejected(
            ProofError::InsufficientSignatures {
                valid: 0,
                required: 1,
            },
        ));
        assert_eq!(err.error_code(), "INSUFFICIENT_SIGNATURES");
        assert_eq!(
            GatewayError::CounterNotFound(Address::ZERO).error_code(),
            "COUNTER_NOT_FOUND"
        );
    }
}
