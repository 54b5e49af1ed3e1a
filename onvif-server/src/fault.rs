use std::fmt;

use axum::http::StatusCode;

/// ONVIF fault subcodes produced by the emulator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultCode {
    InvalidArgVal,
    ActionNotSupported,
    NotAuthorized,
}

impl FaultCode {
    pub fn subcode(&self) -> &'static str {
        match self {
            Self::InvalidArgVal => "ter:InvalidArgVal",
            Self::ActionNotSupported => "ter:ActionNotSupported",
            Self::NotAuthorized => "ter:NotAuthorized",
        }
    }

    /// SOAP 1.2 top-level code
    pub fn value(&self) -> &'static str {
        match self {
            Self::ActionNotSupported => "s:Receiver",
            _ => "s:Sender",
        }
    }

    pub fn http_status(&self) -> StatusCode {
        match self {
            Self::NotAuthorized => StatusCode::UNAUTHORIZED,
            Self::InvalidArgVal => StatusCode::BAD_REQUEST,
            Self::ActionNotSupported => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Failure result of a protocol operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    pub code: FaultCode,
    pub reason: String,
}

impl Fault {
    pub fn new(code: FaultCode, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    pub fn invalid_arg(reason: impl Into<String>) -> Self {
        Self::new(FaultCode::InvalidArgVal, reason)
    }

    pub fn not_supported(action: &str) -> Self {
        Self::new(
            FaultCode::ActionNotSupported,
            format!("Unknown action: {}", action),
        )
    }

    pub fn not_authorized(reason: impl Into<String>) -> Self {
        Self::new(FaultCode::NotAuthorized, reason)
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.subcode(), self.reason)
    }
}
