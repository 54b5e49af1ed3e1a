//! MAC → IPv4 map written by the operator's network provisioning step
//!
//! One entry per line: `<mac> <interface> <ipv4>`. Blank lines and `#`
//! comments are skipped, malformed lines are logged and ignored.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::path::Path;

use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq)]
pub struct MacEntry {
    pub interface: String,
    pub ip: Ipv4Addr,
}

#[derive(Debug, Clone, Default)]
pub struct MacIpMap {
    entries: HashMap<String, MacEntry>,
}

fn normalize_mac(mac: &str) -> String {
    mac.trim().to_ascii_lowercase().replace('-', ":")
}

impl MacIpMap {
    pub fn parse(content: &str) -> Self {
        let mut entries = HashMap::new();
        for (lineno, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let fields: Vec<&str> = line.split_whitespace().collect();
            let [mac, interface, ip] = fields.as_slice() else {
                tracing::warn!(line = lineno + 1, "Ignoring malformed MAC map line");
                continue;
            };
            let Ok(ip) = ip.parse::<Ipv4Addr>() else {
                tracing::warn!(line = lineno + 1, "Ignoring MAC map line with invalid IPv4 '{}'", ip);
                continue;
            };
            entries.insert(
                normalize_mac(mac),
                MacEntry {
                    interface: interface.to_string(),
                    ip,
                },
            );
        }
        Self { entries }
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        Ok(Self::parse(&std::fs::read_to_string(path)?))
    }

    pub fn lookup(&self, mac: &str) -> Option<Ipv4Addr> {
        self.entries.get(&normalize_mac(mac)).map(|e| e.ip)
    }

    pub fn entry(&self, mac: &str) -> Option<&MacEntry> {
        self.entries.get(&normalize_mac(mac))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
