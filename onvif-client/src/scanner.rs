//! NVR profile scanner
//!
//! Turns a physical NVR's media profiles into virtual camera records: one
//! camera per video source, best profile as HQ, runner-up as LQ.

use camera_store::{NewCamera, StreamDescriptor};

use crate::client::OnvifClient;
use crate::error::ClientError;
use crate::profiles::MediaProfile;

const DEFAULT_RTSP_PORT: u16 = 554;

/// A profile with whatever URIs the device handed out for it
#[derive(Debug, Clone, Default)]
pub struct ScannedProfile {
    pub profile: MediaProfile,
    pub stream_uri: Option<String>,
    pub snapshot_uri: Option<String>,
}

/// Path and query of a URI (`rtsp://host:554/ch1?x=1` → `/ch1?x=1`).
///
/// Input without a scheme is returned unchanged; a URI with no path yields `/`.
pub fn extract_path(uri: &str) -> String {
    let Ok(parsed) = url::Url::parse(uri) else {
        return uri.to_string();
    };
    let path = match parsed.path() {
        "" => "/",
        p => p,
    };
    match parsed.query() {
        Some(q) => format!("{}?{}", path, q),
        None => path.to_string(),
    }
}

/// Explicit port of an RTSP URI, else 554
pub fn rtsp_port(uri: &str) -> u16 {
    match url::Url::parse(uri) {
        Ok(u) => u.port().unwrap_or(DEFAULT_RTSP_PORT),
        Err(e) => {
            tracing::warn!("Could not parse RTSP port from {}: {}", uri, e);
            DEFAULT_RTSP_PORT
        }
    }
}

fn descriptor(p: &ScannedProfile) -> StreamDescriptor {
    StreamDescriptor {
        rtsp_path: p.stream_uri.as_deref().map(extract_path),
        snapshot_path: p.snapshot_uri.as_deref().map(extract_path),
        width: p.profile.width,
        height: p.profile.height,
        framerate: p.profile.framerate,
        bitrate: p.profile.bitrate,
    }
}

/// Every field the LQ profile lacks is taken from HQ
fn with_fallback(lq: StreamDescriptor, hq: &StreamDescriptor) -> StreamDescriptor {
    StreamDescriptor {
        rtsp_path: lq.rtsp_path.or_else(|| hq.rtsp_path.clone()),
        snapshot_path: lq.snapshot_path.or_else(|| hq.snapshot_path.clone()),
        width: lq.width.or(hq.width),
        height: lq.height.or(hq.height),
        framerate: lq.framerate.or(hq.framerate),
        bitrate: lq.bitrate.or(hq.bitrate),
    }
}

/// Group by video source, rank, and build one camera per group.
///
/// Groups keep the order in which their first profile was reported.
/// `snapshot_port` is the NVR's HTTP port.
pub fn build_cameras(profiles: Vec<ScannedProfile>, snapshot_port: u16) -> Vec<NewCamera> {
    let mut groups: Vec<(String, Vec<ScannedProfile>)> = Vec::new();
    for p in profiles {
        let Some(source) = p.profile.video_source_token.clone() else {
            tracing::warn!("Skipping profile {} without a video source", p.profile.token);
            continue;
        };
        match groups.iter_mut().find(|(s, _)| *s == source) {
            Some((_, members)) => members.push(p),
            None => groups.push((source, vec![p])),
        }
    }

    groups
        .into_iter()
        .map(|(source, mut members)| {
            members.sort_by(|a, b| {
                b.profile.area().cmp(&a.profile.area()).then_with(|| {
                    let qa = a.profile.quality.unwrap_or(0.0);
                    let qb = b.profile.quality.unwrap_or(0.0);
                    qb.total_cmp(&qa)
                })
            });
            let main = &members[0];
            let sub = members.get(1).unwrap_or(main);

            let hq = descriptor(main);
            let lq = with_fallback(descriptor(sub), &hq);

            NewCamera {
                original_name: main
                    .profile
                    .video_source_name
                    .clone()
                    .unwrap_or_else(|| format!("Camera {}", source)),
                profile_token: main.profile.token.clone(),
                video_source_token: source,
                target_rtsp_port: main
                    .stream_uri
                    .as_deref()
                    .map(rtsp_port)
                    .unwrap_or(DEFAULT_RTSP_PORT),
                target_snapshot_port: Some(snapshot_port),
                hq,
                lq,
            }
        })
        .collect()
}

/// Query `client` for its profiles and build camera records.
///
/// Failing to list profiles fails the scan. Each profile's stream and
/// snapshot URIs are fetched independently; a failure only leaves that URI
/// empty.
pub async fn scan_nvr(
    client: &mut OnvifClient,
    snapshot_port: u16,
) -> Result<Vec<NewCamera>, ClientError> {
    let profiles = client.get_profiles().await?;
    tracing::info!("{} reported {} profile(s)", client.base_url(), profiles.len());

    let mut scanned = Vec::with_capacity(profiles.len());
    for profile in profiles {
        let snapshot_uri = match client.get_snapshot_uri(&profile.token).await {
            Ok(uri) => Some(uri),
            Err(e) => {
                tracing::warn!("No snapshot URI for profile {}: {}", profile.token, e);
                None
            }
        };
        let stream_uri = match client.get_stream_uri(&profile.token).await {
            Ok(uri) => Some(uri),
            Err(e) => {
                tracing::warn!("No stream URI for profile {}: {}", profile.token, e);
                None
            }
        };
        tracing::debug!("Profile {}", profile);
        scanned.push(ScannedProfile {
            profile,
            stream_uri,
            snapshot_uri,
        });
    }

    let cameras = build_cameras(scanned, snapshot_port);
    if cameras.is_empty() {
        tracing::warn!("No usable cameras found on {}", client.base_url());
    }
    Ok(cameras)
}
