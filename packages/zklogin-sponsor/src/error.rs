//! Error types for the sponsor service.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::fmt;
use zklogin_types::AuthError;

/// Sponsor service error type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// No live ephemeral session; restart login.
    SessionExpired,
    NonceMismatch { expected: String, found: String },
    MalformedToken(String),
    /// Prover unreachable, timed out, or returned a non-2xx / malformed body.
    ProofService(String),
    /// Missing or expired inputs, or a transaction in the wrong stage.
    SignatureAssembly(String),
    SponsorKeyUnavailable(String),
    InsufficientSponsorBalance { required: u64, available: u128 },
    /// The network executed or refused the transaction without success.
    SubmissionRejected { digest: String, reason: String },
    /// Configuration error.
    Config(String),
    /// RPC communication error.
    Rpc(String),
    Timeout(String),
    Storage(String),
    InvalidInput(String),
    /// Missing or wrong API key on a protected route.
    Unauthorized,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::SessionExpired => write!(f, "session expired: restart login"),
            Error::NonceMismatch { expected, found } => {
                write!(f, "nonce mismatch: session={expected} token={found}")
            }
            Error::MalformedToken(msg) => write!(f, "malformed identity token: {msg}"),
            Error::ProofService(msg) => write!(f, "proof service error: {msg}"),
            Error::SignatureAssembly(msg) => write!(f, "signature assembly error: {msg}"),
            Error::SponsorKeyUnavailable(msg) => write!(f, "sponsor key unavailable: {msg}"),
            Error::InsufficientSponsorBalance {
                required,
                available,
            } => write!(
                f,
                "insufficient sponsor balance: required {required}, available {available}"
            ),
            Error::SubmissionRejected { digest, reason } => {
                write!(f, "submission rejected ({digest}): {reason}")
            }
            Error::Config(msg) => write!(f, "config error: {msg}"),
            Error::Rpc(msg) => write!(f, "rpc error: {msg}"),
            Error::Timeout(msg) => write!(f, "timeout: {msg}"),
            Error::Storage(msg) => write!(f, "storage error: {msg}"),
            Error::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            Error::Unauthorized => write!(f, "invalid or missing API key"),
        }
    }
}

impl std::error::Error for Error {}

impl From<AuthError> for Error {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::InvalidInput(msg) => Error::InvalidInput(msg),
            AuthError::MalformedToken(msg) => Error::MalformedToken(msg),
            AuthError::NonceMismatch { expected, found } => {
                Error::NonceMismatch { expected, found }
            }
            AuthError::SessionExpired => Error::SessionExpired,
            AuthError::Storage(msg) => Error::Storage(msg),
        }
    }
}

impl Error {
    /// Stable machine-readable kind, used in API bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::SessionExpired => "SessionExpired",
            Error::NonceMismatch { .. } => "NonceMismatch",
            Error::MalformedToken(_) => "MalformedToken",
            Error::ProofService(_) => "ProofServiceError",
            Error::SignatureAssembly(_) => "SignatureAssemblyError",
            Error::SponsorKeyUnavailable(_) => "SponsorKeyUnavailable",
            Error::InsufficientSponsorBalance { .. } => "InsufficientSponsorBalance",
            Error::SubmissionRejected { .. } => "SubmissionRejected",
            Error::Config(_) => "Config",
            Error::Rpc(_) => "Rpc",
            Error::Timeout(_) => "Timeout",
            Error::Storage(_) => "Storage",
            Error::InvalidInput(_) => "InvalidInput",
            Error::Unauthorized => "Unauthorized",
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::SessionExpired | Error::NonceMismatch { .. } | Error::Unauthorized => {
                StatusCode::UNAUTHORIZED
            }
            Error::MalformedToken(_) | Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Error::SignatureAssembly(_) => StatusCode::CONFLICT,
            Error::SubmissionRejected { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Error::InsufficientSponsorBalance { .. } | Error::SponsorKeyUnavailable(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Error::ProofService(_) | Error::Rpc(_) => StatusCode::BAD_GATEWAY,
            Error::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Error::Config(_) | Error::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = serde_json::json!({
            "success": false,
            "kind": self.kind(),
            "error": self.to_string()
        });
        (status, Json(body)).into_response()
    }
}
