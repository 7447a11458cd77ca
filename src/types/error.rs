//! Error types for Favorr
//!
//! Every ledger, board and identity operation returns one of these kinds.
//! The HTTP layer maps each kind to a status code and a stable `code` string.

use hyper::StatusCode;

/// Main error type for Favorr operations
#[derive(Debug, thiserror::Error)]
pub enum FavorrError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Password confirmation does not match")]
    PasswordMismatch,

    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Request has already been claimed")]
    AlreadyClaimed,

    #[error("Creator cannot claim their own request")]
    SelfClaim,

    #[error("Debtor and creditor must be different users")]
    SelfReference,

    #[error("An account already exists for this username")]
    DuplicateIdentity,

    #[error("Unknown counterparty: {0}")]
    UnknownCounterparty(String),

    #[error("Not found: {0}")]
    UnknownEntity(String),

    #[error("Invalid range: {0}")]
    InvalidRange(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl FavorrError {
    /// Convert error to HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::PasswordMismatch => StatusCode::BAD_REQUEST,
            Self::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::InvalidTransition(_) => StatusCode::CONFLICT,
            Self::AlreadyClaimed => StatusCode::CONFLICT,
            Self::SelfClaim => StatusCode::BAD_REQUEST,
            Self::SelfReference => StatusCode::BAD_REQUEST,
            Self::DuplicateIdentity => StatusCode::CONFLICT,
            Self::UnknownCounterparty(_) => StatusCode::NOT_FOUND,
            Self::UnknownEntity(_) => StatusCode::NOT_FOUND,
            Self::InvalidRange(_) => StatusCode::BAD_REQUEST,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code for API clients
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::PasswordMismatch => "PASSWORD_MISMATCH",
            Self::Unauthenticated(_) => "UNAUTHENTICATED",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::InvalidTransition(_) => "INVALID_TRANSITION",
            Self::AlreadyClaimed => "ALREADY_CLAIMED",
            Self::SelfClaim => "SELF_CLAIM",
            Self::SelfReference => "SELF_REFERENCE",
            Self::DuplicateIdentity => "DUPLICATE_IDENTITY",
            Self::UnknownCounterparty(_) => "UNKNOWN_COUNTERPARTY",
            Self::UnknownEntity(_) => "UNKNOWN_ENTITY",
            Self::InvalidRange(_) => "INVALID_RANGE",
            Self::Unavailable(_) => "UNAVAILABLE",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Convert to status code and body tuple for HTTP response
    pub fn into_status_code_and_body(self) -> (StatusCode, String) {
        let status = self.status_code();
        let body = self.to_string();
        (status, body)
    }
}

// Implement From conversions for common error types

impl From<std::io::Error> for FavorrError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for FavorrError {
    fn from(err: serde_json::Error) -> Self {
        Self::Validation(format!("JSON error: {}", err))
    }
}

impl From<mongodb::error::Error> for FavorrError {
    fn from(err: mongodb::error::Error) -> Self {
        Self::Unavailable(format!("Database error: {}", err))
    }
}

impl From<bson::ser::Error> for FavorrError {
    fn from(err: bson::ser::Error) -> Self {
        Self::Internal(format!("BSON encode error: {}", err))
    }
}

impl From<bson::de::Error> for FavorrError {
    fn from(err: bson::de::Error) -> Self {
        Self::Internal(format!("BSON decode error: {}", err))
    }
}

impl From<jsonwebtoken::errors::Error> for FavorrError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        Self::Unauthenticated(format!("JWT error: {}", err))
    }
}

/// Result type alias for Favorr operations
pub type Result<T> = std::result::Result<T, FavorrError>;
