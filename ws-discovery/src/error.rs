use std::net::{Ipv4Addr, SocketAddr};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("Failed to bind discovery socket on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to join multicast group on {ip}: {source}")]
    MulticastJoin {
        ip: Ipv4Addr,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to enumerate local interfaces: {0}")]
    Interfaces(#[source] std::io::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
