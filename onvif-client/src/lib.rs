//! ONVIF client library
//!
//! Async SOAP client for a physical NVR with negotiated authentication
//! (WS-Security with clock-skew retry, or HTTP Digest), plus the profile
//! scanner that turns an NVR's media profiles into virtual camera records.

mod client;
mod error;
mod profiles;
mod scanner;
mod snapshot;
mod soap;

pub use client::{OnvifClient, DEVICE_SERVICE_PATH, MEDIA_SERVICE_PATHS};
pub use error::ClientError;
pub use profiles::{extract_profiles, MediaProfile};
pub use scanner::{build_cameras, extract_path, rtsp_port, scan_nvr, ScannedProfile};
pub use snapshot::fetch_snapshot;
pub use soap::{parse_fault, SoapFault};
