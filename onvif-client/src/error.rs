use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Request failed with status: {0}")]
    Status(u16),

    #[error("Device rejected credentials: {0}")]
    NotAuthorized(String),

    #[error("SOAP fault {code}: {reason}")]
    Fault { code: String, reason: String },

    #[error("Digest auth error: {0}")]
    DigestAuth(String),

    #[error("Missing {0} in response")]
    MissingElement(&'static str),

    #[error("Could not determine device time")]
    NoDeviceTime,
}

impl ClientError {
    /// Errors that suggest the endpoint path is wrong rather than the device
    /// being unreachable
    pub(crate) fn is_endpoint_miss(&self) -> bool {
        match self {
            Self::Status(code) => matches!(code, 400 | 404 | 405 | 500 | 501),
            Self::Fault { code, reason } => {
                code.contains("ActionNotSupported")
                    || reason.to_ascii_lowercase().contains("not supported")
            }
            Self::NotAuthorized(_) => true,
            _ => false,
        }
    }
}
