//! WS-Discovery for emulated ONVIF cameras
//!
//! Passive responder (one per running camera) and an active scanner that
//! probes the local networks for real ONVIF devices.

use std::net::Ipv4Addr;

mod error;
mod messages;
mod responder;
mod scanner;

pub use error::DiscoveryError;
pub use messages::{
    build_probe, build_probe_match, parse_probe, parse_probe_match, DeviceIdentity,
    DiscoveredDevice, Probe, NVT_TYPE,
};
pub use responder::{DiscoveryResponder, ResponderOptions};
pub use scanner::{discover, local_ipv4_addrs, probe_from};

/// WS-Discovery multicast group
pub const MULTICAST_ADDR: Ipv4Addr = Ipv4Addr::new(239, 255, 255, 250);
pub const DISCOVERY_PORT: u16 = 3702;
