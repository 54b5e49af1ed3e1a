use std::path::PathBuf;

use crate::error::ConfigError;

const APP_DIR: &str = "onvif-proxy";

/// `$XDG_CONFIG_HOME/onvif-proxy`
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    dirs::config_dir()
        .map(|p| p.join(APP_DIR))
        .ok_or(ConfigError::NoConfigDir)
}

/// `$XDG_DATA_HOME/onvif-proxy`
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    dirs::data_dir()
        .map(|p| p.join(APP_DIR))
        .ok_or(ConfigError::NoDataDir)
}

/// `~/.config/onvif-proxy/config.toml`
pub fn config_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Default location of the provisioning output consumed by [`crate::MacIpMap`]
pub fn default_mac_map_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("mac_to_interface.txt"))
}

pub fn default_database_path() -> Result<PathBuf, ConfigError> {
    Ok(data_dir()?.join("cameras.db"))
}

/// Create `path`'s parent directory if missing. On Unix the directory is 0700.
pub fn ensure_parent_dir(path: &std::path::Path) -> Result<(), ConfigError> {
    let Some(dir) = path.parent() else {
        return Ok(());
    };
    if dir.as_os_str().is_empty() || dir.exists() {
        return Ok(());
    }
    std::fs::create_dir_all(dir)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700))?;
    }
    Ok(())
}
