//! ONVIF Server Library
//!
//! Emulates the Device and Media services of one virtual camera. Operations
//! are pure functions of a [`CameraContext`] (persisted configuration plus
//! the resolved virtual IP); [`CameraServer`] binds them to an HTTP listener.
//!
//! WS-Security UsernameToken authentication is enforced only when the
//! context carries credentials.

mod context;
mod fault;
mod operations;
mod placeholder;
mod server;
mod templates;
mod time;

pub use context::{CameraContext, MAIN_PROFILE_TOKEN, SUB_PROFILE_TOKEN, VIDEO_SOURCE_TOKEN};
pub use fault::{Fault, FaultCode};
pub use operations::{
    dispatch, extract_argument, extract_soap_action, get_capabilities, get_device_information,
    get_profiles, get_services, get_snapshot_uri, get_stream_uri, get_system_date_and_time,
    get_video_sources, Action, MAX_REQUEST_AGE_SECS,
};
pub use placeholder::PLACEHOLDER_PNG;
pub use server::{router, CameraServer};
pub use time::{tz_string, ClockReading};

/// Placeholder and snapshot bodies
pub use axum::body::Bytes;
