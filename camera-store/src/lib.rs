//! SQLite persistence for the ONVIF proxy
//!
//! Holds the registered NVRs, the pool of provisioned virtual interfaces,
//! and the virtual cameras built from NVR scans. Interface and port
//! allocation for new cameras lives in [`CameraStore::allocate_cameras`].

mod allocator;
mod db;
mod error;
mod models;

pub use db::CameraStore;
pub use error::StoreError;
pub use models::{
    CameraConfig, CameraStatus, InterfaceStatus, NewCamera, NewNvr, Nvr, StreamDescriptor,
    VirtualInterface,
};
