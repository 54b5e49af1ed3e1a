//! MAC → IPv4 resolution for virtual interfaces

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::path::PathBuf;

use config_manager::MacIpMap;

use crate::error::SupervisorError;

/// Looks up the address currently provisioned for a virtual interface.
pub trait AddressResolver: Send + Sync {
    fn resolve(&self, mac: &str) -> Result<Option<Ipv4Addr>, SupervisorError>;
}

/// Reads the provisioning file on every lookup so addresses assigned after
/// startup are picked up without a restart.
pub struct MacMapResolver {
    path: PathBuf,
}

impl MacMapResolver {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl AddressResolver for MacMapResolver {
    fn resolve(&self, mac: &str) -> Result<Option<Ipv4Addr>, SupervisorError> {
        let map = MacIpMap::load(&self.path)?;
        Ok(map.lookup(mac))
    }
}

/// Fixed table
#[derive(Default)]
pub struct StaticResolver {
    entries: HashMap<String, Ipv4Addr>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, mac: &str, ip: Ipv4Addr) -> Self {
        self.entries.insert(mac.to_ascii_lowercase(), ip);
        self
    }
}

impl AddressResolver for StaticResolver {
    fn resolve(&self, mac: &str) -> Result<Option<Ipv4Addr>, SupervisorError> {
        Ok(self.entries.get(&mac.to_ascii_lowercase()).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_file_resolver_rereads() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "02:00:00:00:00:01 macvlan0 192.168.1.201").unwrap();
        file.flush().unwrap();

        let resolver = MacMapResolver::new(file.path().to_path_buf());
        assert_eq!(
            resolver.resolve("02:00:00:00:00:01").unwrap(),
            Some(Ipv4Addr::new(192, 168, 1, 201))
        );
        assert_eq!(resolver.resolve("02:00:00:00:00:02").unwrap(), None);

        // Provisioning adds a line later
        writeln!(file, "02:00:00:00:00:02 macvlan1 192.168.1.202").unwrap();
        file.flush().unwrap();
        assert_eq!(
            resolver.resolve("02:00:00:00:00:02").unwrap(),
            Some(Ipv4Addr::new(192, 168, 1, 202))
        );
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let resolver = MacMapResolver::new(PathBuf::from("/nonexistent/mac_to_interface.txt"));
        assert!(resolver.resolve("02:00:00:00:00:01").is_err());
    }

    #[test]
    fn test_static_resolver_case_insensitive() {
        let resolver = StaticResolver::new().with("02:AB:00:00:00:01", Ipv4Addr::LOCALHOST);
        assert_eq!(
            resolver.resolve("02:ab:00:00:00:01").unwrap(),
            Some(Ipv4Addr::LOCALHOST)
        );
    }
}
