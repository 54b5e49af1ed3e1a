//! Device and Media operations
//!
//! Each operation is a pure function of the camera context (and the request
//! arguments) returning either a response document or a [`Fault`]. Nothing
//! here mutates camera state.

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::context::{CameraContext, MAIN_PROFILE_TOKEN, SUB_PROFILE_TOKEN, VIDEO_SOURCE_TOKEN};
use crate::fault::Fault;
use crate::templates::{self, DeviceInfo, ProfileEntry};
use crate::time::ClockReading;

/// Maximum age of WS-Security timestamps (5 minutes)
pub const MAX_REQUEST_AGE_SECS: u64 = 300;

/// Supported SOAP actions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    GetSystemDateAndTime,
    GetCapabilities,
    GetServices,
    GetDeviceInformation,
    GetProfiles,
    GetVideoSources,
    GetStreamUri,
    GetSnapshotUri,
}

impl Action {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "GetSystemDateAndTime" => Self::GetSystemDateAndTime,
            "GetCapabilities" => Self::GetCapabilities,
            "GetServices" => Self::GetServices,
            "GetDeviceInformation" => Self::GetDeviceInformation,
            "GetProfiles" => Self::GetProfiles,
            "GetVideoSources" => Self::GetVideoSources,
            "GetStreamUri" => Self::GetStreamUri,
            "GetSnapshotUri" => Self::GetSnapshotUri,
            _ => return None,
        })
    }

    /// Operations clients call before they can authenticate
    pub fn is_pre_auth(&self) -> bool {
        matches!(
            self,
            Self::GetSystemDateAndTime | Self::GetCapabilities | Self::GetServices
        )
    }
}

/// Extract SOAP action from ONVIF request body
pub fn extract_soap_action(xml: &str) -> String {
    let mut reader = Reader::from_str(xml);
    let mut in_body = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                let local_name = e.local_name();
                let name = String::from_utf8_lossy(local_name.as_ref()).to_string();
                if name == "Body" {
                    in_body = true;
                } else if in_body {
                    return name;
                }
            }
            Ok(Event::End(e)) => {
                if e.local_name().as_ref() == b"Body" {
                    in_body = false;
                }
            }
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
    }

    "Unknown".to_string()
}

/// Text of the first element named `name` inside the SOAP Body
pub fn extract_argument(xml: &str, name: &str) -> Option<String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut in_body = false;
    let mut capture = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let local = e.local_name();
                if local.as_ref() == b"Body" {
                    in_body = true;
                }
                capture = in_body && local.as_ref() == name.as_bytes();
            }
            Ok(Event::Text(t)) if capture => {
                let text = t.unescape().ok()?.trim().to_string();
                return (!text.is_empty()).then_some(text);
            }
            Ok(Event::End(_)) => capture = false,
            Ok(Event::Eof) | Err(_) => return None,
            _ => {}
        }
    }
}

pub fn get_device_information(ctx: &CameraContext) -> String {
    let hardware_id = format!("VIRT-{}", ctx.config.id);
    templates::device_information(&DeviceInfo {
        model: ctx.display_name(),
        serial: &ctx.config.uuid,
        hardware_id: &hardware_id,
    })
}

fn profile_count(ctx: &CameraContext) -> usize {
    if ctx.lq_params().is_some() {
        2
    } else {
        1
    }
}

/// `category` is the requested Category, None or "All" for every block.
pub fn get_capabilities(ctx: &CameraContext, category: Option<&str>) -> String {
    let wants = |block: &str| matches!(category, None | Some("All")) || category == Some(block);
    let mut blocks = Vec::new();
    if wants("Device") {
        blocks.push(templates::device_capability(&ctx.device_xaddr()));
    }
    if wants("Media") {
        blocks.push(templates::media_capability(&ctx.media_xaddr(), profile_count(ctx)));
    }
    templates::capabilities(&blocks)
}

pub fn get_services(ctx: &CameraContext) -> String {
    templates::services(&ctx.device_xaddr(), &ctx.media_xaddr())
}

pub fn get_profiles(ctx: &CameraContext) -> String {
    let hq = ctx.hq_params();
    let mut entries = vec![templates::profile(&ProfileEntry {
        token: MAIN_PROFILE_TOKEN,
        name: "MainStream",
        encoder_token: "encoder_hq_config_token",
        encoder_name: "HqConfig",
        quality: 4,
        source_token: VIDEO_SOURCE_TOKEN,
        source: hq,
        encoder: hq,
    })];
    if let Some(lq) = ctx.lq_params() {
        entries.push(templates::profile(&ProfileEntry {
            token: SUB_PROFILE_TOKEN,
            name: "SubStream",
            encoder_token: "encoder_lq_config_token",
            encoder_name: "LqConfig",
            quality: 1,
            source_token: VIDEO_SOURCE_TOKEN,
            source: hq,
            encoder: lq,
        }));
    }
    templates::profiles(&entries)
}

pub fn get_video_sources(ctx: &CameraContext) -> String {
    templates::video_sources(VIDEO_SOURCE_TOKEN, &ctx.hq_params())
}

pub fn get_stream_uri(ctx: &CameraContext, profile_token: Option<&str>) -> Result<String, Fault> {
    let path = ctx.rtsp_path(profile_token).ok_or_else(|| {
        tracing::error!(
            camera_id = ctx.config.id,
            "No RTSP path for profile token {:?}",
            profile_token
        );
        Fault::invalid_arg("No RTSP stream configured for the requested profile")
    })?;
    let uri = format!("rtsp://{}:{}{}", ctx.ip, ctx.config.rtsp_proxy_port, path);
    Ok(templates::media_uri("GetStreamUri", &uri))
}

/// Never faults: without a snapshot path/port the placeholder image is offered.
pub fn get_snapshot_uri(ctx: &CameraContext, profile_token: Option<&str>) -> String {
    let uri = match (ctx.snapshot_path(profile_token), ctx.config.snapshot_proxy_port) {
        (Some(path), Some(port)) => format!("http://{}:{}{}", ctx.ip, port, path),
        _ => {
            tracing::warn!(
                camera_id = ctx.config.id,
                "Snapshot requested but no snapshot path/port configured, returning placeholder"
            );
            ctx.placeholder_uri()
        }
    };
    templates::media_uri("GetSnapshotUri", &uri)
}

pub fn get_system_date_and_time(clock: &ClockReading) -> String {
    templates::system_date_and_time(clock)
}

/// Check WS-Security authentication for actions that need it
pub fn check_auth(ctx: &CameraContext, action: Option<Action>, body: &str) -> Result<(), Fault> {
    let Some(credentials) = &ctx.credentials else {
        return Ok(());
    };
    if action.is_some_and(|a| a.is_pre_auth()) {
        return Ok(());
    }
    ws_security::authenticate(body, credentials, MAX_REQUEST_AGE_SECS)
        .map_err(|e| Fault::not_authorized(format!("Sender not authorized: {}", e)))
}

/// Authenticate and run the operation named in `body`.
pub fn dispatch(ctx: &CameraContext, body: &str) -> Result<String, Fault> {
    let name = extract_soap_action(body);
    let action = Action::from_name(&name);
    check_auth(ctx, action, body)?;

    let Some(action) = action else {
        return Err(Fault::not_supported(&name));
    };
    let token = || extract_argument(body, "ProfileToken");

    Ok(match action {
        Action::GetSystemDateAndTime => get_system_date_and_time(&crate::time::now()),
        Action::GetCapabilities => {
            get_capabilities(ctx, extract_argument(body, "Category").as_deref())
        }
        Action::GetServices => get_services(ctx),
        Action::GetDeviceInformation => get_device_information(ctx),
        Action::GetProfiles => get_profiles(ctx),
        Action::GetVideoSources => get_video_sources(ctx),
        Action::GetStreamUri => get_stream_uri(ctx, token().as_deref())?,
        Action::GetSnapshotUri => get_snapshot_uri(ctx, token().as_deref()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::tests::sample_context;
    use crate::fault::FaultCode;
    use ws_security::{Credentials, TokenGenerator};

    fn request(body: &str) -> String {
        format!(
            r#"<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope" xmlns:trt="http://www.onvif.org/ver10/media/wsdl" xmlns:tds="http://www.onvif.org/ver10/device/wsdl"><s:Body>{}</s:Body></s:Envelope>"#,
            body
        )
    }

    fn stream_request(token: &str) -> String {
        request(&format!(
            "<trt:GetStreamUri><trt:StreamSetup/><trt:ProfileToken>{}</trt:ProfileToken></trt:GetStreamUri>",
            token
        ))
    }

    #[test]
    fn test_extract_action_and_arguments() {
        let xml = stream_request("sub_stream");
        assert_eq!(extract_soap_action(&xml), "GetStreamUri");
        assert_eq!(extract_argument(&xml, "ProfileToken").as_deref(), Some("sub_stream"));
        assert_eq!(extract_argument(&xml, "Category"), None);
        assert_eq!(extract_soap_action("<not-soap/>"), "Unknown");

        let caps = request("<tds:GetCapabilities><tds:Category>Media</tds:Category></tds:GetCapabilities>");
        assert_eq!(extract_argument(&caps, "Category").as_deref(), Some("Media"));
    }

    #[test]
    fn test_device_information() {
        let xml = get_device_information(&sample_context());
        assert!(xml.contains("<tds:Manufacturer>ONVIF Proxy</tds:Manufacturer>"));
        assert!(xml.contains("<tds:Model>Front Door</tds:Model>"));
        assert!(xml.contains("<tds:SerialNumber>5f0c1d2e-3a4b-4c5d-8e6f-708192a3b4c5</tds:SerialNumber>"));
        assert!(xml.contains("<tds:HardwareId>VIRT-3</tds:HardwareId>"));
    }

    #[test]
    fn test_capabilities_category_filter() {
        let ctx = sample_context();
        let all = get_capabilities(&ctx, None);
        assert!(all.contains("http://192.168.1.201:9000/onvif/device_service"));
        assert!(all.contains("http://192.168.1.201:9000/onvif/media_service"));
        assert!(all.contains("<tt:MaximumNumberOfProfiles>2</tt:MaximumNumberOfProfiles>"));
        assert_eq!(get_capabilities(&ctx, Some("All")), all);

        let media = get_capabilities(&ctx, Some("Media"));
        assert!(media.contains("<tt:Media>"));
        assert!(!media.contains("<tt:Device>"));

        let device = get_capabilities(&ctx, Some("Device"));
        assert!(device.contains("<tt:Device>"));
        assert!(!device.contains("<tt:Media>"));

        let events = get_capabilities(&ctx, Some("Events"));
        assert!(!events.contains("XAddr"));
    }

    #[test]
    fn test_services_list_both_endpoints() {
        let xml = get_services(&sample_context());
        assert_eq!(xml.matches("<tds:Service>").count(), 2);
        assert!(xml.contains("http://www.onvif.org/ver10/media/wsdl"));
        assert!(xml.contains("<tt:Minor>5</tt:Minor>"));
    }

    #[test]
    fn test_profiles_main_and_sub() {
        let mut ctx = sample_context();
        let xml = get_profiles(&ctx);
        assert!(xml.contains(r#"token="main_stream""#));
        assert!(xml.contains(r#"token="sub_stream""#));
        assert!(xml.contains("<tt:Width>640</tt:Width>"));
        // Sub stream bounds follow the source
        assert_eq!(xml.matches(r#"width="1920""#).count(), 2);

        ctx.config.lq = ctx.config.hq.clone();
        let xml = get_profiles(&ctx);
        assert!(!xml.contains("sub_stream"));
    }

    #[test]
    fn test_video_sources_from_hq() {
        let xml = get_video_sources(&sample_context());
        assert!(xml.contains(r#"token="video_src_token""#));
        assert!(xml.contains("<tt:Framerate>25</tt:Framerate>"));
        assert!(xml.contains("<tt:Height>1080</tt:Height>"));
    }

    #[test]
    fn test_stream_uri_selection() {
        let ctx = sample_context();
        let main = get_stream_uri(&ctx, Some("main_stream")).unwrap();
        assert!(main.contains("<tt:Uri>rtsp://192.168.1.201:9001/Streaming/Channels/101</tt:Uri>"));
        let sub = get_stream_uri(&ctx, Some("sub_stream")).unwrap();
        assert!(sub.contains("rtsp://192.168.1.201:9001/Streaming/Channels/102"));
        let unknown = get_stream_uri(&ctx, Some("whatever")).unwrap();
        assert!(unknown.contains("/Streaming/Channels/101"));
    }

    #[test]
    fn test_stream_uri_without_path_faults() {
        let mut ctx = sample_context();
        ctx.config.hq.rtsp_path = None;
        ctx.config.lq.rtsp_path = None;
        let fault = get_stream_uri(&ctx, Some("main_stream")).unwrap_err();
        assert_eq!(fault.code, FaultCode::InvalidArgVal);
        assert_eq!(fault.reason, "No RTSP stream configured for the requested profile");

        let xml = templates::fault(&fault);
        assert!(xml.contains("<s:Value>ter:InvalidArgVal</s:Value>"));
        assert!(!xml.contains("rtsp://"));
    }

    #[test]
    fn test_snapshot_uri_placeholder() {
        let mut ctx = sample_context();
        let xml = get_snapshot_uri(&ctx, Some("main_stream"));
        assert!(xml.contains("http://192.168.1.201:9002/ISAPI/Streaming/channels/101/picture"));

        // RTSP only: placeholder snapshot, valid stream
        ctx.config.hq.snapshot_path = None;
        ctx.config.snapshot_proxy_port = None;
        let xml = get_snapshot_uri(&ctx, Some("main_stream"));
        assert!(xml.contains("<tt:Uri>http://192.168.1.201:9000/snapshot.png</tt:Uri>"));
        assert!(get_stream_uri(&ctx, Some("main_stream")).is_ok());
    }

    #[test]
    fn test_system_date_and_time() {
        let xml = get_system_date_and_time(&crate::time::now());
        assert!(xml.contains("<tt:UTCDateTime>"));
        assert!(xml.contains("<tt:LocalDateTime>"));
        assert!(xml.contains("<tt:TZ>UTC"));
    }

    #[test]
    fn test_dispatch_unknown_action() {
        let fault = dispatch(&sample_context(), &request("<tds:Reboot/>")).unwrap_err();
        assert_eq!(fault.code, FaultCode::ActionNotSupported);
        assert!(fault.reason.contains("Reboot"));
    }

    #[test]
    fn test_dispatch_auth() {
        let creds = Credentials::new("admin", "secret");
        let mut ctx = sample_context();
        ctx.credentials = Some(creds.clone());

        // Pre-auth operations pass without a token
        assert!(dispatch(&ctx, &request("<tds:GetSystemDateAndTime/>")).is_ok());
        assert!(dispatch(&ctx, &request("<tds:GetCapabilities/>")).is_ok());

        let fault = dispatch(&ctx, &request("<trt:GetProfiles/>")).unwrap_err();
        assert_eq!(fault.code, FaultCode::NotAuthorized);

        let header = TokenGenerator::new(&creds).header(chrono::Duration::zero());
        let signed = format!(
            r#"<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope" xmlns:trt="http://www.onvif.org/ver10/media/wsdl"><s:Header>{}</s:Header><s:Body><trt:GetProfiles/></s:Body></s:Envelope>"#,
            header
        );
        assert!(dispatch(&ctx, &signed).unwrap().contains("main_stream"));
    }
}
