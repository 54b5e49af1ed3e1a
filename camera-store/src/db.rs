//! SQLite-backed camera storage

use std::path::Path;
use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};

use crate::error::StoreError;
use crate::models::{
    CameraConfig, CameraStatus, InterfaceStatus, NewNvr, Nvr, StreamDescriptor, VirtualInterface,
};

/// Another process (CLI next to a running proxy) may hold the write lock briefly
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub(crate) const CAMERA_SELECT: &str = "SELECT
        c.id, c.nvr_id, c.interface_id, c.uuid, c.custom_name, c.original_name,
        c.profile_token, c.video_source_token,
        c.server_port, c.rtsp_proxy_port, c.snapshot_proxy_port,
        c.hq_rtsp_path, c.hq_snapshot_path, c.hq_width, c.hq_height, c.hq_framerate, c.hq_bitrate,
        c.lq_rtsp_path, c.lq_snapshot_path, c.lq_width, c.lq_height, c.lq_framerate, c.lq_bitrate,
        c.target_nvr_rtsp_port, c.target_nvr_snapshot_port,
        c.discovery_enabled, c.status,
        n.hostname, i.mac_address
     FROM virtual_cameras c
     JOIN nvrs n ON n.id = c.nvr_id
     LEFT JOIN virtual_interfaces i ON i.id = c.interface_id";

fn stream_from_row(row: &Row, first: usize) -> rusqlite::Result<StreamDescriptor> {
    Ok(StreamDescriptor {
        rtsp_path: row.get(first)?,
        snapshot_path: row.get(first + 1)?,
        width: row.get(first + 2)?,
        height: row.get(first + 3)?,
        framerate: row.get(first + 4)?,
        bitrate: row.get(first + 5)?,
    })
}

pub(crate) fn camera_from_row(row: &Row) -> rusqlite::Result<CameraConfig> {
    Ok(CameraConfig {
        id: row.get(0)?,
        nvr_id: row.get(1)?,
        interface_id: row.get(2)?,
        uuid: row.get(3)?,
        custom_name: row.get(4)?,
        original_name: row.get(5)?,
        profile_token: row.get(6)?,
        video_source_token: row.get(7)?,
        server_port: row.get(8)?,
        rtsp_proxy_port: row.get(9)?,
        snapshot_proxy_port: row.get(10)?,
        hq: stream_from_row(row, 11)?,
        lq: stream_from_row(row, 17)?,
        target_rtsp_port: row.get(23)?,
        target_snapshot_port: row.get(24)?,
        discovery_enabled: row.get(25)?,
        status: row
            .get::<_, String>(26)?
            .parse()
            .unwrap_or(CameraStatus::Error),
        nvr_hostname: row.get(27)?,
        mac_address: row.get(28)?,
    })
}

pub(crate) fn query_camera(conn: &Connection, id: i64) -> Result<Option<CameraConfig>, StoreError> {
    let sql = format!("{} WHERE c.id = ?", CAMERA_SELECT);
    Ok(conn.query_row(&sql, [id], camera_from_row).optional()?)
}

fn nvr_from_row(row: &Row) -> rusqlite::Result<Nvr> {
    Ok(Nvr {
        id: row.get(0)?,
        hostname: row.get(1)?,
        port: row.get(2)?,
        username: row.get(3)?,
        password: row.get(4)?,
    })
}

fn interface_from_row(row: &Row) -> rusqlite::Result<VirtualInterface> {
    Ok(VirtualInterface {
        id: row.get(0)?,
        mac_address: row.get(1)?,
        interface_name: row.get(2)?,
        status: row
            .get::<_, String>(3)?
            .parse()
            .unwrap_or(InterfaceStatus::InUse),
        assigned_camera_id: row.get(4)?,
    })
}

/// SQLite-backed store of NVRs, virtual interfaces and virtual cameras
pub struct CameraStore {
    pub(crate) conn: Connection,
}

impl CameraStore {
    /// Open or create database at a specific path
    pub fn open_at(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let store = Self {
            conn: Connection::open_in_memory()?,
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(
            "PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS nvrs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                hostname TEXT NOT NULL,
                port INTEGER NOT NULL DEFAULT 80,
                username TEXT,
                password TEXT
            );

            CREATE TABLE IF NOT EXISTS virtual_interfaces (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                mac_address TEXT NOT NULL UNIQUE,
                interface_name TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'available',
                assigned_camera_id INTEGER
            );

            CREATE TABLE IF NOT EXISTS virtual_cameras (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                nvr_id INTEGER NOT NULL REFERENCES nvrs(id),
                interface_id INTEGER REFERENCES virtual_interfaces(id),
                uuid TEXT NOT NULL UNIQUE,
                custom_name TEXT NOT NULL,
                original_name TEXT NOT NULL,
                profile_token TEXT NOT NULL,
                video_source_token TEXT NOT NULL,
                server_port INTEGER NOT NULL UNIQUE,
                rtsp_proxy_port INTEGER NOT NULL UNIQUE,
                snapshot_proxy_port INTEGER UNIQUE,
                hq_rtsp_path TEXT,
                hq_snapshot_path TEXT,
                hq_width INTEGER,
                hq_height INTEGER,
                hq_framerate INTEGER,
                hq_bitrate INTEGER,
                lq_rtsp_path TEXT,
                lq_snapshot_path TEXT,
                lq_width INTEGER,
                lq_height INTEGER,
                lq_framerate INTEGER,
                lq_bitrate INTEGER,
                target_nvr_rtsp_port INTEGER NOT NULL DEFAULT 554,
                target_nvr_snapshot_port INTEGER,
                discovery_enabled INTEGER NOT NULL DEFAULT 1,
                status TEXT NOT NULL DEFAULT 'stopped'
            );

            CREATE INDEX IF NOT EXISTS idx_cameras_nvr ON virtual_cameras(nvr_id);
            CREATE INDEX IF NOT EXISTS idx_interfaces_status ON virtual_interfaces(status);",
        )?;
        Ok(())
    }

    // --- NVRs ---

    pub fn add_nvr(&self, nvr: &NewNvr) -> Result<Nvr, StoreError> {
        self.conn.execute(
            "INSERT INTO nvrs (hostname, port, username, password) VALUES (?1, ?2, ?3, ?4)",
            params![nvr.hostname, nvr.port, nvr.username, nvr.password],
        )?;
        let id = self.conn.last_insert_rowid();
        tracing::info!(nvr_id = id, "Registered NVR {}:{}", nvr.hostname, nvr.port);
        Ok(Nvr {
            id,
            hostname: nvr.hostname.clone(),
            port: nvr.port,
            username: nvr.username.clone(),
            password: nvr.password.clone(),
        })
    }

    pub fn get_nvr(&self, id: i64) -> Result<Option<Nvr>, StoreError> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, hostname, port, username, password FROM nvrs WHERE id = ?",
                [id],
                nvr_from_row,
            )
            .optional()?)
    }

    pub fn list_nvrs(&self) -> Result<Vec<Nvr>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, hostname, port, username, password FROM nvrs ORDER BY id")?;
        let nvrs = stmt.query_map([], nvr_from_row)?;
        nvrs.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn update_nvr(&self, id: i64, nvr: &NewNvr) -> Result<(), StoreError> {
        let rows = self.conn.execute(
            "UPDATE nvrs SET hostname = ?1, port = ?2, username = ?3, password = ?4 WHERE id = ?5",
            params![nvr.hostname, nvr.port, nvr.username, nvr.password, id],
        )?;
        if rows == 0 {
            return Err(StoreError::NotFound { kind: "NVR", id });
        }
        Ok(())
    }

    /// Refused while cameras still reference the NVR
    pub fn delete_nvr(&self, id: i64) -> Result<bool, StoreError> {
        let cameras: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM virtual_cameras WHERE nvr_id = ?",
            [id],
            |row| row.get(0),
        )?;
        if cameras > 0 {
            return Err(StoreError::NvrInUse {
                nvr_id: id,
                cameras: cameras as usize,
            });
        }
        let rows = self.conn.execute("DELETE FROM nvrs WHERE id = ?", [id])?;
        Ok(rows > 0)
    }

    // --- Virtual interfaces ---

    pub fn add_interface(
        &self,
        mac_address: &str,
        interface_name: &str,
    ) -> Result<VirtualInterface, StoreError> {
        let mac = mac_address.trim().to_ascii_lowercase();
        self.conn.execute(
            "INSERT INTO virtual_interfaces (mac_address, interface_name, status)
             VALUES (?1, ?2, 'available')",
            params![mac, interface_name],
        )?;
        Ok(VirtualInterface {
            id: self.conn.last_insert_rowid(),
            mac_address: mac,
            interface_name: interface_name.to_string(),
            status: InterfaceStatus::Available,
            assigned_camera_id: None,
        })
    }

    pub fn get_interface(&self, id: i64) -> Result<Option<VirtualInterface>, StoreError> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, mac_address, interface_name, status, assigned_camera_id
                 FROM virtual_interfaces WHERE id = ?",
                [id],
                interface_from_row,
            )
            .optional()?)
    }

    pub fn list_interfaces(&self) -> Result<Vec<VirtualInterface>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, mac_address, interface_name, status, assigned_camera_id
             FROM virtual_interfaces ORDER BY id",
        )?;
        let ifaces = stmt.query_map([], interface_from_row)?;
        ifaces.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn count_available_interfaces(&self) -> Result<usize, StoreError> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM virtual_interfaces WHERE status = 'available'",
            [],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }

    // --- Cameras ---

    pub fn get_camera(&self, id: i64) -> Result<Option<CameraConfig>, StoreError> {
        query_camera(&self.conn, id)
    }

    pub fn list_cameras(&self) -> Result<Vec<CameraConfig>, StoreError> {
        let sql = format!("{} ORDER BY c.id", CAMERA_SELECT);
        let mut stmt = self.conn.prepare(&sql)?;
        let cameras = stmt.query_map([], camera_from_row)?;
        cameras.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn list_cameras_for_nvr(&self, nvr_id: i64) -> Result<Vec<CameraConfig>, StoreError> {
        let sql = format!("{} WHERE c.nvr_id = ? ORDER BY c.id", CAMERA_SELECT);
        let mut stmt = self.conn.prepare(&sql)?;
        let cameras = stmt.query_map([nvr_id], camera_from_row)?;
        cameras.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn list_cameras_with_status(
        &self,
        status: CameraStatus,
    ) -> Result<Vec<CameraConfig>, StoreError> {
        let sql = format!("{} WHERE c.status = ? ORDER BY c.id", CAMERA_SELECT);
        let mut stmt = self.conn.prepare(&sql)?;
        let cameras = stmt.query_map([status.as_str()], camera_from_row)?;
        cameras.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    fn update_camera_field(
        &self,
        id: i64,
        sql: &str,
        value: &dyn rusqlite::ToSql,
    ) -> Result<(), StoreError> {
        let rows = self.conn.execute(sql, params![value, id])?;
        if rows == 0 {
            return Err(StoreError::NotFound { kind: "Camera", id });
        }
        Ok(())
    }

    pub fn set_status(&self, id: i64, status: CameraStatus) -> Result<(), StoreError> {
        self.update_camera_field(
            id,
            "UPDATE virtual_cameras SET status = ?1 WHERE id = ?2",
            &status.as_str(),
        )
    }

    pub fn rename_camera(&self, id: i64, name: &str) -> Result<(), StoreError> {
        self.update_camera_field(
            id,
            "UPDATE virtual_cameras SET custom_name = ?1 WHERE id = ?2",
            &name,
        )
    }

    pub fn set_discovery(&self, id: i64, enabled: bool) -> Result<(), StoreError> {
        self.update_camera_field(
            id,
            "UPDATE virtual_cameras SET discovery_enabled = ?1 WHERE id = ?2",
            &enabled,
        )
    }

    /// Delete a camera and hand its interface back to the pool atomically.
    pub fn delete_camera(&mut self, id: i64) -> Result<bool, StoreError> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute(
            "UPDATE virtual_interfaces SET status = 'available', assigned_camera_id = NULL
             WHERE assigned_camera_id = ?",
            [id],
        )?;
        let rows = tx.execute("DELETE FROM virtual_cameras WHERE id = ?", [id])?;
        tx.commit()?;
        if rows > 0 {
            tracing::info!(camera_id = id, "Deleted camera and released its interface");
        }
        Ok(rows > 0)
    }
}
