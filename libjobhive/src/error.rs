//! Error types for JobHive

use thiserror::Error;

pub type Result<T> = std::result::Result<T, JobHiveError>;

#[derive(Error, Debug)]
pub enum JobHiveError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Token storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl JobHiveError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            JobHiveError::InvalidInput(_) => 3,
            JobHiveError::Api(ApiError::MissingToken) => 2,
            JobHiveError::Api(ApiError::Status { status: 401 | 403, .. }) => 2,
            JobHiveError::Api(_) => 1,
            JobHiveError::Storage(_) => 1,
            JobHiveError::Config(_) => 1,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

/// Failures of the persistent token storage.
///
/// A missing token is not represented here: token reads return `Option`.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("OS keyring unavailable: {0}")]
    KeyringUnavailable(String),

    #[error("Keyring operation failed: {0}")]
    Keyring(String),

    #[error("Token file I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors surfaced by resource queries and backend calls.
///
/// `Clone` because a coalesced request hands the same outcome to every
/// waiting caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Transport(String),

    #[error("Unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("No authentication token stored")]
    MissingToken,

    /// The token store could not be read; distinct from `MissingToken`
    #[error("Token storage error: {0}")]
    Storage(String),
}

impl ApiError {
    /// True when the backend rejected the credentials rather than the request
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Status { status: 401 | 403, .. })
    }
}

/// Response body did not match the expected shape for a resource.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Failed to decode {resource} response: {message}")]
pub struct DecodeError {
    pub resource: String,
    pub message: String,
}

impl DecodeError {
    pub fn new(resource: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            message: message.into(),
        }
    }
}
