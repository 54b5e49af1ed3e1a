use std::net::SocketAddr;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("Storage error: {0}")]
    Store(#[from] camera_store::StoreError),

    #[error("Camera store lock poisoned")]
    StoreLock,

    #[error("Configuration error: {0}")]
    Config(#[from] config_manager::ConfigError),

    #[error("NVR unreachable or rejected credentials: {0}")]
    Connectivity(#[from] onvif_client::ClientError),

    #[error("Discovery error: {0}")]
    Discovery(#[from] ws_discovery::DiscoveryError),

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("No IPv4 address for camera {camera_id} (MAC {mac})")]
    AddressUnresolved { camera_id: i64, mac: String },

    #[error("Camera {0} is already running")]
    AlreadyRunning(i64),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: i64 },
}

impl SupervisorError {
    pub(crate) fn camera_not_found(id: i64) -> Self {
        Self::NotFound { kind: "Camera", id }
    }
}
