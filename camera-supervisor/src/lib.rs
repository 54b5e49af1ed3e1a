//! Virtual camera supervisor
//!
//! Owns the running cameras of one process. Each start resolves the
//! camera's virtual interface to an address and brings up, on that address,
//! the ONVIF protocol server, the WS-Discovery responder and the RTSP and
//! snapshot stream proxies. Also fronts the scan, network discovery and
//! snapshot operations used by the CLI.

mod error;
mod lifecycle;
mod proxy;
mod resolver;
mod supervisor;

pub use error::SupervisorError;
pub use lifecycle::{Component, RunningCamera, StartOptions, StartReport};
pub use proxy::StreamProxy;
pub use resolver::{AddressResolver, MacMapResolver, StaticResolver};
pub use supervisor::{Snapshot, StopOutcome, Supervisor, SupervisorOptions};
