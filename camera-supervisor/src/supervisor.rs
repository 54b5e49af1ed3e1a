//! Registry of running cameras and the operations exposed to the CLI
//!
//! The registry maps camera id to a slot holding its [`RunningCamera`]. Each
//! slot has its own async mutex, so start/stop of one camera is serialized
//! while different cameras proceed in parallel. The store is locked only
//! around individual database calls, never across network I/O.

use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use camera_store::{CameraConfig, CameraStatus, CameraStore, StoreError};
use config_manager::{ConfigError, ProxyConfig};
use dashmap::DashMap;
use onvif_client::OnvifClient;
use onvif_server::{Bytes, PLACEHOLDER_PNG};
use tokio_util::sync::CancellationToken;
use ws_discovery::{DiscoveredDevice, ResponderOptions};
use ws_security::Credentials;

use crate::error::SupervisorError;
use crate::lifecycle::{start_responder, RunningCamera, StartOptions, StartReport};
use crate::resolver::{AddressResolver, MacMapResolver};

type Slot = Arc<tokio::sync::Mutex<Option<RunningCamera>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped,
    NotRunning,
}

/// Snapshot image returned by [`Supervisor::get_snapshot`]
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub bytes: Bytes,
    /// True when the NVR could not supply an image
    pub placeholder: bool,
}

#[derive(Clone)]
pub struct SupervisorOptions {
    pub base_port: u16,
    pub scan_window: Duration,
    pub request_timeout: Duration,
    pub start: StartOptions,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            base_port: 9000,
            scan_window: Duration::from_secs(3),
            request_timeout: Duration::from_secs(10),
            start: StartOptions {
                discovery: ResponderOptions::default(),
                credentials: None,
                placeholder: Bytes::from_static(PLACEHOLDER_PNG),
            },
        }
    }
}

impl SupervisorOptions {
    pub fn from_config(config: &ProxyConfig) -> Result<Self, SupervisorError> {
        let placeholder = match &config.snapshot.placeholder {
            Some(path) => Bytes::from(std::fs::read(path).map_err(ConfigError::from)?),
            None => Bytes::from_static(PLACEHOLDER_PNG),
        };
        Ok(Self {
            base_port: config.ports.base,
            scan_window: config.discovery.scan_timeout(),
            request_timeout: config.scan.request_timeout(),
            start: StartOptions {
                discovery: ResponderOptions {
                    port: config.discovery.port,
                    join_multicast: config.discovery.join_multicast,
                },
                credentials: config
                    .onvif_auth
                    .as_ref()
                    .map(|a| Credentials::new(&a.username, &a.password)),
                placeholder,
            },
        })
    }
}

pub struct Supervisor {
    store: Mutex<CameraStore>,
    registry: DashMap<i64, Slot>,
    resolver: Arc<dyn AddressResolver>,
    options: SupervisorOptions,
    http: reqwest::Client,
}

impl Supervisor {
    pub fn new(
        store: CameraStore,
        resolver: Arc<dyn AddressResolver>,
        options: SupervisorOptions,
    ) -> Result<Self, SupervisorError> {
        let http = reqwest::Client::builder()
            .timeout(options.request_timeout)
            .build()
            .map_err(onvif_client::ClientError::from)?;
        Ok(Self {
            store: Mutex::new(store),
            registry: DashMap::new(),
            resolver,
            options,
            http,
        })
    }

    /// Open the configured database and provisioning map.
    pub fn from_config(config: &ProxyConfig) -> Result<Self, SupervisorError> {
        let store = CameraStore::open_at(&config.database_path()?)?;
        let resolver = Arc::new(MacMapResolver::new(config.mac_map_path()?));
        Self::new(store, resolver, SupervisorOptions::from_config(config)?)
    }

    /// Run `f` with exclusive access to the store.
    pub fn with_store<T>(
        &self,
        f: impl FnOnce(&mut CameraStore) -> Result<T, StoreError>,
    ) -> Result<T, SupervisorError> {
        let mut store = self.store.lock().map_err(|_| SupervisorError::StoreLock)?;
        Ok(f(&mut store)?)
    }

    fn camera(&self, id: i64) -> Result<CameraConfig, SupervisorError> {
        self.with_store(|s| s.get_camera(id))?
            .ok_or_else(|| SupervisorError::camera_not_found(id))
    }

    fn slot(&self, id: i64) -> Slot {
        self.registry.entry(id).or_default().clone()
    }

    fn mark(&self, id: i64, status: CameraStatus) {
        if let Err(e) = self.with_store(|s| s.set_status(id, status)) {
            tracing::error!(camera_id = id, "Failed to persist status {}: {}", status, e);
        }
    }

    fn resolve_ip(&self, config: &CameraConfig) -> Result<Ipv4Addr, SupervisorError> {
        let unresolved = || SupervisorError::AddressUnresolved {
            camera_id: config.id,
            mac: config.mac_address.clone().unwrap_or_else(|| "<none>".into()),
        };
        let mac = config.mac_address.as_deref().ok_or_else(unresolved)?;
        self.resolver.resolve(mac)?.ok_or_else(unresolved)
    }

    pub async fn is_running(&self, id: i64) -> bool {
        let Some(slot) = self.registry.get(&id).map(|s| s.clone()) else {
            return false;
        };
        let running = slot.lock().await.is_some();
        running
    }

    pub async fn running_ids(&self) -> Vec<i64> {
        let slots: Vec<(i64, Slot)> = self
            .registry
            .iter()
            .map(|e| (*e.key(), e.value().clone()))
            .collect();
        let mut ids = Vec::new();
        for (id, slot) in slots {
            if slot.lock().await.is_some() {
                ids.push(id);
            }
        }
        ids.sort_unstable();
        ids
    }

    /// Drop the registry entry for `id` if it still holds `slot`. Callers
    /// hold the slot's lock with nothing running in it.
    fn release_slot(&self, id: i64, slot: &Slot) {
        self.registry.remove_if(&id, |_, current| Arc::ptr_eq(current, slot));
    }

    /// Start a camera. A second start without a stop is rejected.
    pub async fn start(&self, id: i64) -> Result<StartReport, SupervisorError> {
        let slot = self.slot(id);
        let mut running = slot.lock().await;
        if running.is_some() {
            return Err(SupervisorError::AlreadyRunning(id));
        }

        let config = match self.camera(id) {
            Ok(config) => config,
            Err(e) => {
                self.release_slot(id, &slot);
                return Err(e);
            }
        };
        let ip = match self.resolve_ip(&config) {
            Ok(ip) => ip,
            Err(e) => {
                tracing::error!(camera_id = id, "Cannot start: {}", e);
                self.mark(id, CameraStatus::Error);
                return Err(e);
            }
        };

        match RunningCamera::start(&config, ip, &self.options.start).await {
            Ok((camera, report)) => {
                if report.is_degraded() {
                    tracing::warn!(camera_id = id, "Started degraded: {:?}", report.degraded);
                }
                *running = Some(camera);
                self.mark(id, CameraStatus::Running);
                Ok(report)
            }
            Err(e) => {
                tracing::error!(camera_id = id, "Failed to start: {}", e);
                self.mark(id, CameraStatus::Error);
                Err(e)
            }
        }
    }

    /// Stop a camera. Not running is reported, not an error.
    pub async fn stop(&self, id: i64) -> Result<StopOutcome, SupervisorError> {
        let Some(slot) = self.registry.get(&id).map(|s| s.clone()) else {
            return Ok(StopOutcome::NotRunning);
        };
        let mut guard = slot.lock().await;
        let Some(camera) = guard.take() else {
            return Ok(StopOutcome::NotRunning);
        };
        camera.stop().await;
        self.with_store(|s| s.set_status(id, CameraStatus::Stopped))?;
        Ok(StopOutcome::Stopped)
    }

    /// Start every camera whose persisted status is `running`.
    pub async fn start_all_marked(&self) -> Result<Vec<(i64, Result<StartReport, SupervisorError>)>, SupervisorError> {
        let marked = self.with_store(|s| s.list_cameras_with_status(CameraStatus::Running))?;
        tracing::info!("Starting {} camera(s) marked running", marked.len());
        let mut results = Vec::with_capacity(marked.len());
        for camera in marked {
            let result = self.start(camera.id).await;
            results.push((camera.id, result));
        }
        Ok(results)
    }

    /// Stop every running camera, leaving persisted status untouched so they
    /// come back on the next start.
    pub async fn stop_all(&self) {
        let slots: Vec<Slot> = self.registry.iter().map(|e| e.value().clone()).collect();
        for slot in slots {
            let mut guard = slot.lock().await;
            if let Some(camera) = guard.take() {
                camera.stop().await;
            }
        }
    }

    /// Persist the discovery flag and apply it to a running camera.
    pub async fn set_discovery(&self, id: i64, enabled: bool) -> Result<(), SupervisorError> {
        self.with_store(|s| s.set_discovery(id, enabled))?;

        let Some(slot) = self.registry.get(&id).map(|s| s.clone()) else {
            return Ok(());
        };
        let mut guard = slot.lock().await;
        let Some(camera) = guard.as_mut() else {
            return Ok(());
        };

        match (enabled, camera.responder.take()) {
            (true, Some(existing)) => camera.responder = Some(existing),
            (true, None) => {
                tracing::info!(camera_id = id, "Enabling discovery");
                camera.responder = start_responder(
                    id,
                    camera.identity.clone(),
                    camera.ip,
                    &self.options.start.discovery,
                )
                .await;
            }
            (false, Some(responder)) => {
                tracing::info!(camera_id = id, "Disabling discovery");
                responder.stop().await;
            }
            (false, None) => {}
        }
        Ok(())
    }

    /// Stop if running, then delete the record and release its interface.
    ///
    /// The slot stays locked throughout, so a start racing the delete either
    /// finishes first and is stopped here, or runs afterwards and finds no
    /// record.
    pub async fn delete(&self, id: i64) -> Result<(), SupervisorError> {
        let slot = self.slot(id);
        let mut guard = slot.lock().await;
        if let Some(camera) = guard.take() {
            camera.stop().await;
        }
        let deleted = self.with_store(|s| s.delete_camera(id));
        self.release_slot(id, &slot);
        drop(guard);

        if !deleted? {
            return Err(SupervisorError::camera_not_found(id));
        }
        Ok(())
    }

    /// Query an NVR for its profiles and allocate a camera per video source.
    pub async fn scan(&self, nvr_id: i64) -> Result<Vec<CameraConfig>, SupervisorError> {
        let nvr = self
            .with_store(|s| s.get_nvr(nvr_id))?
            .ok_or(SupervisorError::NotFound { kind: "NVR", id: nvr_id })?;
        let credentials = nvr
            .username
            .as_deref()
            .map(|u| Credentials::new(u, nvr.password.as_deref().unwrap_or_default()));

        let mut client = OnvifClient::new(&nvr.hostname, nvr.port, credentials, self.options.request_timeout)?;
        let cameras = onvif_client::scan_nvr(&mut client, nvr.port).await?;
        if cameras.is_empty() {
            tracing::info!("No cameras found on NVR {}", nvr_id);
            return Ok(Vec::new());
        }

        let created = self.with_store(|s| s.allocate_cameras(nvr_id, &cameras, self.options.base_port))?;
        tracing::info!("Created {} camera(s) for NVR {}", created.len(), nvr_id);
        Ok(created)
    }

    /// Probe the local networks for ONVIF devices.
    pub async fn discover_network(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<DiscoveredDevice>, SupervisorError> {
        Ok(ws_discovery::discover(self.options.scan_window, cancel).await?)
    }

    /// Fetch a snapshot from the NVR, or the placeholder if the camera has
    /// no snapshot source or the NVR request fails.
    pub async fn get_snapshot(&self, id: i64) -> Result<Snapshot, SupervisorError> {
        let config = self.camera(id)?;
        let placeholder = Snapshot {
            bytes: self.options.start.placeholder.clone(),
            placeholder: true,
        };
        let (Some(path), Some(port)) = (config.hq.snapshot_path.as_deref(), config.target_snapshot_port) else {
            return Ok(placeholder);
        };

        let credentials = self
            .with_store(|s| s.get_nvr(config.nvr_id))?
            .and_then(|n| n.username.map(|u| Credentials::new(&u, &n.password.unwrap_or_default())));

        match onvif_client::fetch_snapshot(&self.http, &config.nvr_hostname, port, path, credentials.as_ref()).await {
            Ok(bytes) => Ok(Snapshot {
                bytes: Bytes::from(bytes),
                placeholder: false,
            }),
            Err(e) => {
                tracing::warn!(camera_id = id, "Snapshot from NVR failed, using placeholder: {}", e);
                Ok(placeholder)
            }
        }
    }
}
