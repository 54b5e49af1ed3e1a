//! Start/stop of one camera's live resources

use std::net::{Ipv4Addr, SocketAddr};

use camera_store::CameraConfig;
use onvif_server::{Bytes, CameraContext, CameraServer};
use ws_discovery::{DeviceIdentity, DiscoveryResponder, ResponderOptions};
use ws_security::Credentials;

use crate::error::SupervisorError;
use crate::proxy::StreamProxy;

/// Optional components that failed to come up on an otherwise running camera
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    Discovery,
    RtspProxy,
    SnapshotProxy,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartReport {
    pub ip: Option<Ipv4Addr>,
    pub degraded: Vec<Component>,
}

impl StartReport {
    pub fn is_degraded(&self) -> bool {
        !self.degraded.is_empty()
    }
}

/// Settings shared by every camera start
#[derive(Clone)]
pub struct StartOptions {
    pub discovery: ResponderOptions,
    pub credentials: Option<Credentials>,
    pub placeholder: Bytes,
}

/// Live resources of one started camera
pub struct RunningCamera {
    pub(crate) camera_id: i64,
    pub(crate) ip: Ipv4Addr,
    pub(crate) identity: DeviceIdentity,
    server: CameraServer,
    pub(crate) responder: Option<DiscoveryResponder>,
    rtsp: Option<StreamProxy>,
    snapshot: Option<StreamProxy>,
}

pub(crate) fn identity_for(config: &CameraConfig, ctx: &CameraContext) -> DeviceIdentity {
    DeviceIdentity {
        uuid: config.uuid.clone(),
        xaddr: ctx.device_xaddr(),
        name: ctx.display_name().to_string(),
    }
}

pub(crate) async fn start_responder(
    camera_id: i64,
    identity: DeviceIdentity,
    ip: Ipv4Addr,
    opts: &ResponderOptions,
) -> Option<DiscoveryResponder> {
    match DiscoveryResponder::start(camera_id, identity, ip, opts.clone()).await {
        Ok(r) => Some(r),
        Err(e) => {
            tracing::error!(camera_id, "Discovery responder failed to start: {}", e);
            None
        }
    }
}

impl RunningCamera {
    /// Bind the protocol server, then the optional components, on `ip`.
    ///
    /// Only a protocol server bind failure is fatal; nothing else has been
    /// opened at that point.
    pub async fn start(
        config: &CameraConfig,
        ip: Ipv4Addr,
        opts: &StartOptions,
    ) -> Result<(Self, StartReport), SupervisorError> {
        let camera_id = config.id;
        let ctx = CameraContext::new(config.clone(), ip, opts.credentials.clone());
        let identity = identity_for(config, &ctx);

        let server_addr = SocketAddr::from((ip, config.server_port));
        let server = CameraServer::bind(ctx, opts.placeholder.clone())
            .await
            .map_err(|source| SupervisorError::Bind {
                addr: server_addr,
                source,
            })?;

        let mut report = StartReport {
            ip: Some(ip),
            degraded: Vec::new(),
        };

        let responder = if config.discovery_enabled {
            let r = start_responder(camera_id, identity.clone(), ip, &opts.discovery).await;
            if r.is_none() {
                report.degraded.push(Component::Discovery);
            }
            r
        } else {
            None
        };

        let rtsp = match config.hq.rtsp_path {
            Some(_) => {
                let listen = SocketAddr::from((ip, config.rtsp_proxy_port));
                match StreamProxy::bind("RTSP", listen, &config.nvr_hostname, config.target_rtsp_port).await {
                    Ok(p) => Some(p),
                    Err(e) => {
                        tracing::error!(camera_id, "Failed to start RTSP proxy on {}: {}", listen, e);
                        report.degraded.push(Component::RtspProxy);
                        None
                    }
                }
            }
            None => {
                tracing::warn!(camera_id, "RTSP proxy not started, no RTSP path configured");
                None
            }
        };

        let snapshot = match (config.has_snapshot_proxy(), config.snapshot_proxy_port, config.target_snapshot_port) {
            (true, Some(port), Some(target)) => {
                let listen = SocketAddr::from((ip, port));
                match StreamProxy::bind("Snapshot", listen, &config.nvr_hostname, target).await {
                    Ok(p) => Some(p),
                    Err(e) => {
                        tracing::error!(camera_id, "Failed to start snapshot proxy on {}: {}", listen, e);
                        report.degraded.push(Component::SnapshotProxy);
                        None
                    }
                }
            }
            _ => {
                tracing::info!(camera_id, "Snapshot proxy not started (snapshot path or port not configured)");
                None
            }
        };

        tracing::info!(
            camera_id,
            "Virtual camera '{}' started on {}:{}",
            config.custom_name,
            ip,
            config.server_port
        );
        Ok((
            Self {
                camera_id,
                ip,
                identity,
                server,
                responder,
                rtsp,
                snapshot,
            },
            report,
        ))
    }

    pub fn ip(&self) -> Ipv4Addr {
        self.ip
    }

    pub fn server_addr(&self) -> SocketAddr {
        self.server.local_addr()
    }

    pub fn discovery_addr(&self) -> Option<SocketAddr> {
        self.responder.as_ref().map(DiscoveryResponder::local_addr)
    }

    pub fn rtsp_addr(&self) -> Option<SocketAddr> {
        self.rtsp.as_ref().map(StreamProxy::local_addr)
    }

    pub fn snapshot_addr(&self) -> Option<SocketAddr> {
        self.snapshot.as_ref().map(StreamProxy::local_addr)
    }

    /// Release everything. Each step runs regardless of the others.
    pub async fn stop(self) {
        let camera_id = self.camera_id;
        if let Some(responder) = self.responder {
            responder.stop().await;
        }
        self.server.stop().await;
        if let Some(proxy) = self.rtsp {
            proxy.stop().await;
        }
        if let Some(proxy) = self.snapshot {
            proxy.stop().await;
        }
        tracing::info!(camera_id, "Virtual camera stopped");
    }
}
