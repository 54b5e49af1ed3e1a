//! Per-camera request context

use std::net::Ipv4Addr;

use camera_store::{CameraConfig, StreamDescriptor};
use ws_security::Credentials;

pub const MAIN_PROFILE_TOKEN: &str = "main_stream";
pub const SUB_PROFILE_TOKEN: &str = "sub_stream";
pub const VIDEO_SOURCE_TOKEN: &str = "video_src_token";

pub(crate) const DEFAULT_WIDTH: u32 = 1920;
pub(crate) const DEFAULT_HEIGHT: u32 = 1080;
pub(crate) const DEFAULT_FRAMERATE: u32 = 15;
pub(crate) const DEFAULT_BITRATE: u32 = 2048;

/// Everything an operation needs to answer for one camera: its persisted
/// configuration and the address it was started on.
#[derive(Debug, Clone)]
pub struct CameraContext {
    pub config: CameraConfig,
    pub ip: Ipv4Addr,
    /// When set, non pre-auth operations require a valid UsernameToken
    pub credentials: Option<Credentials>,
}

/// Resolved encoder parameters of one exposed profile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct VideoParams {
    pub width: u32,
    pub height: u32,
    pub framerate: u32,
    pub bitrate: u32,
}

impl CameraContext {
    pub fn new(config: CameraConfig, ip: Ipv4Addr, credentials: Option<Credentials>) -> Self {
        Self {
            config,
            ip,
            credentials,
        }
    }

    pub fn device_xaddr(&self) -> String {
        format!("http://{}:{}/onvif/device_service", self.ip, self.config.server_port)
    }

    pub fn media_xaddr(&self) -> String {
        format!("http://{}:{}/onvif/media_service", self.ip, self.config.server_port)
    }

    pub fn placeholder_uri(&self) -> String {
        format!("http://{}:{}/snapshot.png", self.ip, self.config.server_port)
    }

    /// Display name used as model and discovery scope
    pub fn display_name(&self) -> &str {
        if self.config.custom_name.is_empty() {
            "Virtual Camera"
        } else {
            &self.config.custom_name
        }
    }

    pub(crate) fn hq_params(&self) -> VideoParams {
        let hq = &self.config.hq;
        VideoParams {
            width: hq.width.unwrap_or(DEFAULT_WIDTH),
            height: hq.height.unwrap_or(DEFAULT_HEIGHT),
            framerate: hq.framerate.unwrap_or(DEFAULT_FRAMERATE),
            bitrate: hq.bitrate.unwrap_or(DEFAULT_BITRATE),
        }
    }

    /// Sub-stream parameters, only when the LQ data is complete and differs
    /// from the main stream.
    pub(crate) fn lq_params(&self) -> Option<VideoParams> {
        let lq = &self.config.lq;
        if !lq.has_video_params() || same_stream(lq, &self.config.hq) {
            return None;
        }
        Some(VideoParams {
            width: lq.width?,
            height: lq.height?,
            framerate: lq.framerate?,
            bitrate: lq.bitrate?,
        })
    }

    fn wants_sub(profile_token: Option<&str>) -> bool {
        profile_token == Some(SUB_PROFILE_TOKEN)
    }

    /// RTSP path for a profile token; the sub stream falls back to the main one.
    pub(crate) fn rtsp_path(&self, profile_token: Option<&str>) -> Option<&str> {
        let lq = self.config.lq.rtsp_path.as_deref();
        match lq {
            Some(path) if Self::wants_sub(profile_token) => Some(path),
            _ => self.config.hq.rtsp_path.as_deref(),
        }
    }

    pub(crate) fn snapshot_path(&self, profile_token: Option<&str>) -> Option<&str> {
        let lq = self.config.lq.snapshot_path.as_deref();
        match lq {
            Some(path) if Self::wants_sub(profile_token) => Some(path),
            _ => self.config.hq.snapshot_path.as_deref(),
        }
    }
}

fn same_stream(a: &StreamDescriptor, b: &StreamDescriptor) -> bool {
    a.rtsp_path == b.rtsp_path
        && a.width == b.width
        && a.height == b.height
        && a.framerate == b.framerate
        && a.bitrate == b.bitrate
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use camera_store::CameraStatus;

    pub(crate) fn sample_context() -> CameraContext {
        let config = CameraConfig {
            id: 3,
            nvr_id: 1,
            interface_id: Some(1),
            uuid: "5f0c1d2e-3a4b-4c5d-8e6f-708192a3b4c5".into(),
            custom_name: "Front Door".into(),
            original_name: "Channel 1".into(),
            profile_token: "Profile_101".into(),
            video_source_token: "VideoSource_1".into(),
            server_port: 9000,
            rtsp_proxy_port: 9001,
            snapshot_proxy_port: Some(9002),
            hq: StreamDescriptor {
                rtsp_path: Some("/Streaming/Channels/101".into()),
                snapshot_path: Some("/ISAPI/Streaming/channels/101/picture".into()),
                width: Some(1920),
                height: Some(1080),
                framerate: Some(25),
                bitrate: Some(4096),
            },
            lq: StreamDescriptor {
                rtsp_path: Some("/Streaming/Channels/102".into()),
                snapshot_path: None,
                width: Some(640),
                height: Some(360),
                framerate: Some(15),
                bitrate: Some(512),
            },
            target_rtsp_port: 554,
            target_snapshot_port: Some(80),
            discovery_enabled: true,
            status: CameraStatus::Stopped,
            nvr_hostname: "192.168.1.50".into(),
            mac_address: Some("02:00:00:00:00:01".into()),
        };
        CameraContext::new(config, Ipv4Addr::new(192, 168, 1, 201), None)
    }

    #[test]
    fn test_sub_profile_only_when_distinct() {
        let mut ctx = sample_context();
        assert_eq!(
            ctx.lq_params(),
            Some(VideoParams {
                width: 640,
                height: 360,
                framerate: 15,
                bitrate: 512
            })
        );

        // Single-profile source: LQ mirrors HQ
        ctx.config.lq = ctx.config.hq.clone();
        assert_eq!(ctx.lq_params(), None);

        ctx.config.lq.width = Some(640);
        ctx.config.lq.bitrate = None;
        assert_eq!(ctx.lq_params(), None);
    }

    #[test]
    fn test_path_selection() {
        let ctx = sample_context();
        assert_eq!(ctx.rtsp_path(Some("sub_stream")), Some("/Streaming/Channels/102"));
        assert_eq!(ctx.rtsp_path(Some("main_stream")), Some("/Streaming/Channels/101"));
        assert_eq!(ctx.rtsp_path(None), Some("/Streaming/Channels/101"));
        // No LQ snapshot: sub falls back to HQ
        assert_eq!(
            ctx.snapshot_path(Some("sub_stream")),
            Some("/ISAPI/Streaming/channels/101/picture")
        );
    }

    #[test]
    fn test_defaults_and_names() {
        let mut ctx = sample_context();
        ctx.config.hq.width = None;
        ctx.config.hq.framerate = None;
        let hq = ctx.hq_params();
        assert_eq!((hq.width, hq.height, hq.framerate), (1920, 1080, 15));

        assert_eq!(ctx.display_name(), "Front Door");
        ctx.config.custom_name.clear();
        assert_eq!(ctx.display_name(), "Virtual Camera");
        assert_eq!(ctx.device_xaddr(), "http://192.168.1.201:9000/onvif/device_service");
    }
}
