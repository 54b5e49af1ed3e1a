//! Persisted records

use std::fmt;
use std::str::FromStr;

use crate::error::StoreError;

/// Physical NVR registered by the operator
#[derive(Debug, Clone, PartialEq)]
pub struct Nvr {
    pub id: i64,
    pub hostname: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewNvr {
    pub hostname: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterfaceStatus {
    Available,
    InUse,
}

impl InterfaceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::InUse => "in_use",
        }
    }
}

impl FromStr for InterfaceStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "available" => Ok(Self::Available),
            "in_use" => Ok(Self::InUse),
            other => Err(StoreError::InvalidValue {
                field: "interface status",
                value: other.to_string(),
            }),
        }
    }
}

/// Spoofable network identity created by provisioning
#[derive(Debug, Clone, PartialEq)]
pub struct VirtualInterface {
    pub id: i64,
    pub mac_address: String,
    pub interface_name: String,
    pub status: InterfaceStatus,
    pub assigned_camera_id: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraStatus {
    Stopped,
    Running,
    Error,
}

impl CameraStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Running => "running",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for CameraStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CameraStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stopped" => Ok(Self::Stopped),
            "running" => Ok(Self::Running),
            "error" => Ok(Self::Error),
            other => Err(StoreError::InvalidValue {
                field: "camera status",
                value: other.to_string(),
            }),
        }
    }
}

/// One quality variant of a camera's video.
///
/// Paths are relative to the NVR (`/Streaming/Channels/101`), never full URIs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamDescriptor {
    pub rtsp_path: Option<String>,
    pub snapshot_path: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub framerate: Option<u32>,
    pub bitrate: Option<u32>,
}

impl StreamDescriptor {
    /// Resolution, frame rate and bit rate are all known
    pub fn has_video_params(&self) -> bool {
        self.width.is_some()
            && self.height.is_some()
            && self.framerate.is_some()
            && self.bitrate.is_some()
    }
}

/// Camera produced by an NVR scan, before identity and ports are granted
#[derive(Debug, Clone, PartialEq)]
pub struct NewCamera {
    pub original_name: String,
    pub profile_token: String,
    pub video_source_token: String,
    pub hq: StreamDescriptor,
    pub lq: StreamDescriptor,
    pub target_rtsp_port: u16,
    pub target_snapshot_port: Option<u16>,
}

impl NewCamera {
    /// A snapshot proxy port is reserved only when there is something to proxy
    pub fn needs_snapshot_port(&self) -> bool {
        self.hq.snapshot_path.is_some() && self.target_snapshot_port.is_some()
    }
}

/// Durable description of one virtual camera.
///
/// `nvr_hostname` and `mac_address` are joined in from the owning NVR and
/// the assigned interface.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraConfig {
    pub id: i64,
    pub nvr_id: i64,
    pub interface_id: Option<i64>,
    pub uuid: String,
    pub custom_name: String,
    pub original_name: String,
    pub profile_token: String,
    pub video_source_token: String,
    pub server_port: u16,
    pub rtsp_proxy_port: u16,
    pub snapshot_proxy_port: Option<u16>,
    pub hq: StreamDescriptor,
    pub lq: StreamDescriptor,
    pub target_rtsp_port: u16,
    pub target_snapshot_port: Option<u16>,
    pub discovery_enabled: bool,
    pub status: CameraStatus,
    pub nvr_hostname: String,
    pub mac_address: Option<String>,
}

impl CameraConfig {
    pub fn has_snapshot_proxy(&self) -> bool {
        self.snapshot_proxy_port.is_some()
            && self.target_snapshot_port.is_some()
            && self.hq.snapshot_path.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for s in [CameraStatus::Stopped, CameraStatus::Running, CameraStatus::Error] {
            assert_eq!(s.as_str().parse::<CameraStatus>().unwrap(), s);
        }
        assert!("paused".parse::<CameraStatus>().is_err());
        assert_eq!("in_use".parse::<InterfaceStatus>().unwrap(), InterfaceStatus::InUse);
    }

    #[test]
    fn test_needs_snapshot_port() {
        let mut cam = NewCamera {
            original_name: "Cam".into(),
            profile_token: "p".into(),
            video_source_token: "v".into(),
            hq: StreamDescriptor::default(),
            lq: StreamDescriptor::default(),
            target_rtsp_port: 554,
            target_snapshot_port: Some(80),
        };
        assert!(!cam.needs_snapshot_port());
        cam.hq.snapshot_path = Some("/snap.jpg".into());
        assert!(cam.needs_snapshot_port());
        cam.target_snapshot_port = None;
        assert!(!cam.needs_snapshot_port());
    }
}
