//! Error types for contract-guardian

use hyper::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GuardianError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unable to resolve {path}: {reason}")]
    Resolution { path: String, reason: String },

    #[error("Missing key: {0}")]
    MissingKey(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unknown minted identity: {0}")]
    UnknownIdentity(String),

    #[error("Unknown endpoint: {0}")]
    UnknownEndpoint(String),

    #[error("unknown operation {0}")]
    UnknownOperation(String),

    #[error("missing request identifier for unique operation")]
    MissingRequestIdentifier,

    #[error("duplicate request for unique operation")]
    DuplicateRequest,

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("operation failed")]
    OperationFailed,

    #[error("unknown exception while performing operation")]
    OperationError,

    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("Platform error: {0}")]
    Platform(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("TOML write error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("Database error: {0}")]
    Database(#[from] sled::Error),

    #[error("Bundle error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GuardianError {
    pub fn resolution(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Resolution {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// HTTP status reported by the guardian façade for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::UnknownOperation(_) | Self::UnknownEndpoint(_) => StatusCode::NOT_FOUND,
            Self::DuplicateRequest | Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::OperationFailed => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Validation(_)
            | Self::OperationError
            | Self::MissingRequestIdentifier
            | Self::UnknownIdentity(_)
            | Self::MissingKey(_)
            | Self::Json(_)
            | Self::Crypto(_) => StatusCode::BAD_REQUEST,
            Self::Network(_) | Self::Http(_) | Self::Platform(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub type Result<T> = std::result::Result<T, GuardianError>;
