//! WS-Security error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WsSecurityError {
    #[error("Missing Security header")]
    MissingSecurityHeader,

    #[error("Missing required element: {0}")]
    MissingElement(String),

    #[error("Invalid nonce encoding")]
    InvalidNonce,

    #[error("Invalid timestamp format")]
    InvalidTimestamp,

    /// `Created` lies further in the future than the allowed skew
    #[error("Timestamp {skew_secs}s ahead of local clock")]
    FromFuture { skew_secs: i64 },

    #[error("Request expired (age: {age_secs}s, max: {max_secs}s)")]
    Expired { age_secs: u64, max_secs: u64 },

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("XML parse error: {0}")]
    XmlError(String),
}
