use thiserror::Error;

use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("Failed to serialize user record: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Login rejected: {0}")]
    LoginRejected(String),

    #[error("Malformed login response: {0}")]
    MalformedResponse(String),
}

pub type Result<T> = std::result::Result<T, SessionError>;
