//! Passive WS-Discovery responder for one emulated camera
//!
//! Listens on the discovery port, joined to 239.255.255.250 on the camera's
//! address, and answers matching Probes with a unicast ProbeMatch sent from a
//! separate outbound socket bound to the camera address.

use std::collections::VecDeque;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::DiscoveryError;
use crate::messages::{build_probe_match, parse_probe, DeviceIdentity};
use crate::{DISCOVERY_PORT, MULTICAST_ADDR};

const MAX_DATAGRAM: usize = 8192;
/// Probe ids remembered for duplicate suppression
const RECENT_PROBES: usize = 64;

#[derive(Debug, Clone)]
pub struct ResponderOptions {
    pub port: u16,
    /// Without the multicast join only unicast probes are seen
    pub join_multicast: bool,
}

impl Default for ResponderOptions {
    fn default() -> Self {
        Self {
            port: DISCOVERY_PORT,
            join_multicast: true,
        }
    }
}

/// Bind the listening socket. With a multicast join the socket binds the
/// wildcard address so group traffic is delivered.
fn bind_listener(ip: Ipv4Addr, opts: &ResponderOptions) -> Result<UdpSocket, DiscoveryError> {
    let bind_ip = if opts.join_multicast { Ipv4Addr::UNSPECIFIED } else { ip };
    let addr = SocketAddrV4::new(bind_ip, opts.port);
    let bind_err = |source| DiscoveryError::Bind {
        addr: SocketAddr::V4(addr),
        source,
    };

    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP)).map_err(bind_err)?;
    socket.set_reuse_address(true).map_err(bind_err)?;
    #[cfg(unix)]
    socket.set_reuse_port(true).map_err(bind_err)?;
    socket.set_nonblocking(true).map_err(bind_err)?;
    socket.bind(&addr.into()).map_err(bind_err)?;

    if opts.join_multicast {
        socket
            .join_multicast_v4(&MULTICAST_ADDR, &ip)
            .map_err(|source| DiscoveryError::MulticastJoin { ip, source })?;
    }

    Ok(UdpSocket::from_std(socket.into())?)
}

struct Shared {
    camera_id: i64,
    identity: DeviceIdentity,
    sequence: AtomicU64,
    instance_id: u64,
    outbound: UdpSocket,
    recent: Mutex<VecDeque<String>>,
}

impl Shared {
    /// False if this probe id was already answered (same probe arriving via
    /// several interfaces)
    fn first_sighting(&self, message_id: &str) -> bool {
        let Ok(mut recent) = self.recent.lock() else {
            return true;
        };
        if recent.iter().any(|m| m == message_id) {
            return false;
        }
        if recent.len() == RECENT_PROBES {
            recent.pop_front();
        }
        recent.push_back(message_id.to_string());
        true
    }

    async fn handle(&self, datagram: Vec<u8>, from: SocketAddr) {
        let Ok(xml) = std::str::from_utf8(&datagram) else {
            tracing::debug!(camera_id = self.camera_id, "Non UTF-8 datagram from {}", from);
            return;
        };
        let Some(probe) = parse_probe(xml) else {
            tracing::trace!(camera_id = self.camera_id, "Ignoring non-probe message from {}", from);
            return;
        };
        if !probe.wants_video_transmitter() {
            tracing::trace!(
                camera_id = self.camera_id,
                "Ignoring probe for types {:?}",
                probe.types
            );
            return;
        }
        if !self.first_sighting(&probe.message_id) {
            return;
        }

        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        let reply = build_probe_match(&self.identity, &probe.message_id, seq, self.instance_id);
        tracing::debug!(
            camera_id = self.camera_id,
            "Answering probe {} from {}",
            probe.message_id,
            from
        );
        if let Err(e) = self.outbound.send_to(reply.as_bytes(), from).await {
            tracing::warn!(camera_id = self.camera_id, "Failed to send ProbeMatch to {}: {}", from, e);
        }
    }
}

/// Running responder. Dropping it without [`DiscoveryResponder::stop`]
/// leaves the task running until the runtime shuts down.
pub struct DiscoveryResponder {
    local_addr: SocketAddr,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl DiscoveryResponder {
    /// Bind and start answering probes for `identity` on `ip`.
    pub async fn start(
        camera_id: i64,
        identity: DeviceIdentity,
        ip: Ipv4Addr,
        opts: ResponderOptions,
    ) -> Result<Self, DiscoveryError> {
        let listener = bind_listener(ip, &opts)?;
        let local_addr = listener.local_addr()?;

        let out_addr = SocketAddr::V4(SocketAddrV4::new(ip, 0));
        let outbound = UdpSocket::bind(out_addr)
            .await
            .map_err(|source| DiscoveryError::Bind {
                addr: out_addr,
                source,
            })?;

        let instance_id = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(1);
        let shared = Arc::new(Shared {
            camera_id,
            identity,
            sequence: AtomicU64::new(1),
            instance_id,
            outbound,
            recent: Mutex::new(VecDeque::with_capacity(RECENT_PROBES)),
        });

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let task = tokio::spawn(async move {
            let mut buf = vec![0u8; MAX_DATAGRAM];
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    received = listener.recv_from(&mut buf) => match received {
                        Ok((len, from)) => {
                            let shared = shared.clone();
                            let datagram = buf[..len].to_vec();
                            tokio::spawn(async move { shared.handle(datagram, from).await });
                        }
                        Err(e) => {
                            tracing::warn!(camera_id, "Discovery receive error: {}", e);
                        }
                    }
                }
            }
            tracing::debug!(camera_id, "Discovery responder stopped");
        });

        tracing::info!(
            camera_id,
            "Discovery responder listening on {} (multicast: {})",
            local_addr,
            opts.join_multicast
        );
        Ok(Self {
            local_addr,
            cancel,
            task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop the receive loop and release the socket.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            tracing::warn!("Discovery responder task failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{build_probe, parse_probe_match};
    use std::time::Duration;

    fn identity() -> DeviceIdentity {
        DeviceIdentity {
            uuid: "0c6b2b3e-1111-4222-8333-944455556666".into(),
            xaddr: "http://127.0.0.1:9000/onvif/device_service".into(),
            name: "Lobby".into(),
        }
    }

    fn loopback_opts() -> ResponderOptions {
        ResponderOptions {
            port: 0,
            join_multicast: false,
        }
    }

    async fn start() -> DiscoveryResponder {
        DiscoveryResponder::start(1, identity(), Ipv4Addr::LOCALHOST, loopback_opts())
            .await
            .unwrap()
    }

    async fn recv_reply(socket: &UdpSocket) -> Option<String> {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        match tokio::time::timeout(Duration::from_millis(500), socket.recv_from(&mut buf)).await {
            Ok(Ok((len, _))) => Some(String::from_utf8_lossy(&buf[..len]).into_owned()),
            _ => None,
        }
    }

    #[tokio::test]
    async fn test_untyped_probe_gets_one_match() {
        let responder = start().await;
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let probe = r#"<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope" xmlns:a="http://schemas.xmlsoap.org/ws/2004/08/addressing" xmlns:d="http://schemas.xmlsoap.org/ws/2005/04/discovery"><s:Header><a:MessageID>urn:uuid:probe-1</a:MessageID></s:Header><s:Body><d:Probe/></s:Body></s:Envelope>"#;
        client.send_to(probe.as_bytes(), responder.local_addr()).await.unwrap();

        let reply = recv_reply(&client).await.expect("no ProbeMatch");
        let device = parse_probe_match(&reply, responder.local_addr()).unwrap();
        assert_eq!(device.uuid, "0c6b2b3e-1111-4222-8333-944455556666");
        assert!(reply.contains("<wsa:RelatesTo>urn:uuid:probe-1</wsa:RelatesTo>"));

        // Exactly one
        assert!(recv_reply(&client).await.is_none());
        responder.stop().await;
    }

    #[tokio::test]
    async fn test_foreign_type_ignored() {
        let responder = start().await;
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let probe = r#"<s:Envelope xmlns:s="x" xmlns:a="y" xmlns:d="z"><s:Header><a:MessageID>uuid:p2</a:MessageID></s:Header><s:Body><d:Probe><d:Types>pr:Printer</d:Types></d:Probe></s:Body></s:Envelope>"#;
        client.send_to(probe.as_bytes(), responder.local_addr()).await.unwrap();
        assert!(recv_reply(&client).await.is_none());
        responder.stop().await;
    }

    #[tokio::test]
    async fn test_sequence_increments_and_duplicates_suppressed() {
        let responder = start().await;
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        client
            .send_to(build_probe("uuid:a").as_bytes(), responder.local_addr())
            .await
            .unwrap();
        let first = recv_reply(&client).await.unwrap();

        // Same probe again, as if seen on a second interface
        client
            .send_to(build_probe("uuid:a").as_bytes(), responder.local_addr())
            .await
            .unwrap();
        assert!(recv_reply(&client).await.is_none());

        client
            .send_to(build_probe("uuid:b").as_bytes(), responder.local_addr())
            .await
            .unwrap();
        let second = recv_reply(&client).await.unwrap();

        assert!(first.contains(r#"MessageNumber="1""#));
        assert!(second.contains(r#"MessageNumber="2""#));
        responder.stop().await;
    }

    #[tokio::test]
    async fn test_stop_releases_port() {
        let responder = start().await;
        let addr = responder.local_addr();
        responder.stop().await;
        // Rebinding without SO_REUSEADDR succeeds only if the socket is gone
        assert!(std::net::UdpSocket::bind(addr).is_ok());
    }
}
