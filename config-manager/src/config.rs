use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::onvif_auth::OnvifAuthConfig;
use crate::paths;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database. `None` resolves to the XDG data dir.
    pub database: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Provisioning output (`<mac> <iface> <ip>` per line)
    pub mac_map: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PortConfig {
    /// First port handed out when no camera exists yet
    pub base: u16,
}

impl Default for PortConfig {
    fn default() -> Self {
        Self { base: 9000 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// WS-Discovery port the per-camera responders listen on
    pub port: u16,
    /// How long an active network scan collects ProbeMatches
    pub scan_timeout_ms: u64,
    /// Join 239.255.255.250 on the camera interface. Without it only
    /// unicast probes reach the responder.
    pub join_multicast: bool,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            port: 3702,
            scan_timeout_ms: 3000,
            join_multicast: true,
        }
    }
}

impl DiscoveryConfig {
    pub fn scan_timeout(&self) -> Duration {
        Duration::from_millis(self.scan_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub request_timeout_secs: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 10,
        }
    }
}

impl ScanConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    /// PNG served instead of the built-in placeholder
    pub placeholder: Option<PathBuf>,
}

/// Top-level configuration, `config.toml`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    pub storage: StorageConfig,
    pub network: NetworkConfig,
    pub ports: PortConfig,
    pub discovery: DiscoveryConfig,
    pub scan: ScanConfig,
    pub snapshot: SnapshotConfig,
    /// Credentials required from ONVIF clients of the emulated cameras
    pub onvif_auth: Option<OnvifAuthConfig>,
}

impl ProxyConfig {
    pub fn exists() -> bool {
        paths::config_path().map(|p| p.exists()).unwrap_or(false)
    }

    pub fn default_path() -> Result<PathBuf, ConfigError> {
        paths::config_path()
    }

    /// Load from the XDG location
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&paths::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Like [`Self::load_from`], but a missing file yields the defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => paths::config_path()?,
        };
        match Self::load_from(&path) {
            Err(ConfigError::NotFound(_)) => {
                tracing::debug!("No config at {}, using defaults", path.display());
                Ok(Self::default())
            }
            other => other,
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        paths::ensure_parent_dir(path)?;
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.ports.base == 0 {
            return Err(ConfigError::Invalid("ports.base must be non-zero".into()));
        }
        if self.discovery.port == 0 {
            return Err(ConfigError::Invalid("discovery.port must be non-zero".into()));
        }
        if let Some(auth) = &self.onvif_auth {
            if auth.username.is_empty() {
                return Err(ConfigError::Invalid("onvif_auth.username is empty".into()));
            }
        }
        Ok(())
    }

    pub fn database_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.storage.database {
            Some(p) => Ok(p.clone()),
            None => paths::default_database_path(),
        }
    }

    pub fn mac_map_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.network.mac_map {
            Some(p) => Ok(p.clone()),
            None => paths::default_mac_map_path(),
        }
    }
}
