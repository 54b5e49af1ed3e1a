//! Active WS-Discovery scan
//!
//! One socket per local IPv4 address multicasts a NetworkVideoTransmitter
//! Probe; ProbeMatches are collected from all sockets until the window
//! closes, deduplicated by device UUID (first seen wins).

use std::collections::HashSet;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::DiscoveryError;
use crate::messages::{build_probe, parse_probe_match, DiscoveredDevice};
use crate::{DISCOVERY_PORT, MULTICAST_ADDR};

const MAX_DATAGRAM: usize = 65_535;

/// Non-loopback IPv4 addresses of this host
pub fn local_ipv4_addrs() -> Result<Vec<Ipv4Addr>, DiscoveryError> {
    let ifaces = if_addrs::get_if_addrs().map_err(DiscoveryError::Interfaces)?;
    let mut addrs: Vec<Ipv4Addr> = ifaces
        .iter()
        .filter(|i| !i.is_loopback())
        .filter_map(|i| match i.ip() {
            std::net::IpAddr::V4(v4) => Some(v4),
            _ => None,
        })
        .collect();
    addrs.dedup();
    Ok(addrs)
}

fn probe_socket(ip: Ipv4Addr) -> std::io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.set_broadcast(true)?;
    if let Err(e) = socket.set_multicast_if_v4(&ip) {
        tracing::debug!("Could not pin multicast interface to {}: {}", ip, e);
    }
    socket.set_nonblocking(true)?;
    socket.bind(&SocketAddrV4::new(ip, 0).into())?;
    UdpSocket::from_std(socket.into())
}

/// Send one probe from `ip` to `target` and forward matches until `deadline`.
async fn probe_one(
    ip: Ipv4Addr,
    target: SocketAddr,
    deadline: Instant,
    tx: mpsc::Sender<DiscoveredDevice>,
) {
    let socket = match probe_socket(ip) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!("WS-Discovery: cannot bind probe socket on {}: {}", ip, e);
            return;
        }
    };

    let probe = build_probe(&format!("uuid:{}", uuid::Uuid::new_v4()));
    if let Err(e) = socket.send_to(probe.as_bytes(), target).await {
        tracing::warn!("WS-Discovery: probe from {} failed: {}", ip, e);
        return;
    }
    tracing::debug!("WS-Discovery: probe sent from {} to {}", ip, target);

    let mut buf = vec![0u8; MAX_DATAGRAM];
    loop {
        let (len, from) = match tokio::time::timeout_at(deadline, socket.recv_from(&mut buf)).await {
            Err(_) => return,
            Ok(Err(e)) => {
                tracing::warn!("WS-Discovery: receive error on {}: {}", ip, e);
                return;
            }
            Ok(Ok(r)) => r,
        };
        let Ok(xml) = std::str::from_utf8(&buf[..len]) else {
            continue;
        };
        match parse_probe_match(xml, from) {
            Some(device) => {
                if tx.send(device).await.is_err() {
                    return;
                }
            }
            None => tracing::trace!("WS-Discovery: unparseable reply from {}", from),
        }
    }
}

/// Probe from each of `addrs` to `target` and collect for `window`.
///
/// Returns early only when `cancel` fires or every socket has failed.
pub async fn probe_from(
    addrs: &[Ipv4Addr],
    target: SocketAddr,
    window: Duration,
    cancel: &CancellationToken,
) -> Vec<DiscoveredDevice> {
    if addrs.is_empty() {
        return Vec::new();
    }

    let deadline = Instant::now() + window;
    let (tx, mut rx) = mpsc::channel(64);
    for ip in addrs {
        tokio::spawn(probe_one(*ip, target, deadline, tx.clone()));
    }
    drop(tx);

    let mut seen = HashSet::new();
    let mut devices = Vec::new();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!("WS-Discovery: scan cancelled");
                break;
            }
            _ = tokio::time::sleep_until(deadline) => break,
            received = rx.recv() => match received {
                Some(device) => {
                    if seen.insert(device.uuid.clone()) {
                        tracing::debug!(
                            "WS-Discovery: found {} at {:?}",
                            device.uuid,
                            device.primary_xaddr()
                        );
                        devices.push(device);
                    }
                }
                // Every probe task has finished
                None => break,
            }
        }
    }
    devices
}

/// Scan the local networks for ONVIF devices.
pub async fn discover(
    window: Duration,
    cancel: &CancellationToken,
) -> Result<Vec<DiscoveredDevice>, DiscoveryError> {
    let addrs = local_ipv4_addrs()?;
    if addrs.is_empty() {
        tracing::warn!("WS-Discovery: no non-loopback IPv4 address to probe from");
        return Ok(Vec::new());
    }
    let target = SocketAddr::V4(SocketAddrV4::new(MULTICAST_ADDR, DISCOVERY_PORT));
    let devices = probe_from(&addrs, target, window, cancel).await;
    tracing::info!(
        "WS-Discovery: {} device(s) found from {} address(es)",
        devices.len(),
        addrs.len()
    );
    Ok(devices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::DeviceIdentity;
    use crate::responder::{DiscoveryResponder, ResponderOptions};

    fn opts() -> ResponderOptions {
        ResponderOptions {
            port: 0,
            join_multicast: false,
        }
    }

    fn identity(uuid: &str) -> DeviceIdentity {
        DeviceIdentity {
            uuid: uuid.into(),
            xaddr: "http://127.0.0.1:9000/onvif/device_service".into(),
            name: "Cam".into(),
        }
    }

    #[tokio::test]
    async fn test_scan_finds_responder() {
        let responder = DiscoveryResponder::start(7, identity("dev-7"), Ipv4Addr::LOCALHOST, opts())
            .await
            .unwrap();
        let cancel = CancellationToken::new();

        let devices = probe_from(
            &[Ipv4Addr::LOCALHOST],
            responder.local_addr(),
            Duration::from_millis(300),
            &cancel,
        )
        .await;

        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].uuid, "dev-7");
        assert_eq!(
            devices[0].primary_xaddr(),
            Some("http://127.0.0.1:9000/onvif/device_service")
        );
        responder.stop().await;
    }

    #[tokio::test]
    async fn test_duplicate_uuids_collapsed() {
        // Two probe sockets hit the same responder; it answers each probe
        let responder = DiscoveryResponder::start(8, identity("dev-8"), Ipv4Addr::LOCALHOST, opts())
            .await
            .unwrap();
        let cancel = CancellationToken::new();
        let devices = probe_from(
            &[Ipv4Addr::LOCALHOST, Ipv4Addr::LOCALHOST],
            responder.local_addr(),
            Duration::from_millis(300),
            &cancel,
        )
        .await;
        assert_eq!(devices.len(), 1);
        responder.stop().await;
    }

    #[tokio::test]
    async fn test_no_addresses_returns_immediately() {
        let cancel = CancellationToken::new();
        let started = Instant::now();
        let devices = probe_from(
            &[],
            "127.0.0.1:3702".parse().unwrap(),
            Duration::from_secs(10),
            &cancel,
        )
        .await;
        assert!(devices.is_empty());
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_silence_waits_for_window_and_cancel_cuts_short() {
        // Nobody listens on this port
        let sink = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        let target = sink.local_addr().unwrap();
        drop(sink);

        let cancel = CancellationToken::new();
        let started = Instant::now();
        let devices = probe_from(&[Ipv4Addr::LOCALHOST], target, Duration::from_millis(200), &cancel).await;
        assert!(devices.is_empty());
        assert!(started.elapsed() >= Duration::from_millis(150));

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });
        let started = Instant::now();
        probe_from(&[Ipv4Addr::LOCALHOST], target, Duration::from_secs(10), &cancel).await;
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
