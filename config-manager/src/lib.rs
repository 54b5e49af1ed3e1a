mod config;
mod error;
mod mac_map;
mod onvif_auth;
mod paths;

pub use config::{
    DiscoveryConfig, NetworkConfig, PortConfig, ProxyConfig, ScanConfig, SnapshotConfig,
    StorageConfig,
};
pub use error::ConfigError;
pub use mac_map::{MacEntry, MacIpMap};
pub use onvif_auth::OnvifAuthConfig;
pub use paths::{
    config_dir, config_path, data_dir, default_database_path, default_mac_map_path,
    ensure_parent_dir,
};
