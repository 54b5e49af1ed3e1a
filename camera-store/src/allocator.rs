//! Identity and port allocation for a batch of scanned cameras
//!
//! The whole batch runs in one `BEGIN IMMEDIATE` transaction: either every
//! camera gets an interface and a port triple, or nothing is written.

use rusqlite::{params, Transaction, TransactionBehavior};

use crate::db::{query_camera, CameraStore};
use crate::error::StoreError;
use crate::models::{CameraConfig, NewCamera};

/// Next free port: one above the highest port in any of the three columns
fn next_port(tx: &Transaction<'_>, base: u16) -> Result<u16, StoreError> {
    let max: Option<i64> = tx.query_row(
        "SELECT MAX(p) FROM (
            SELECT server_port AS p FROM virtual_cameras
            UNION ALL SELECT rtsp_proxy_port FROM virtual_cameras
            UNION ALL SELECT snapshot_proxy_port FROM virtual_cameras
         )",
        [],
        |row| row.get(0),
    )?;
    match max {
        None => Ok(base),
        Some(m) => u16::try_from(m + 1).map_err(|_| StoreError::PortsExhausted(u16::MAX)),
    }
}

fn available_interfaces(tx: &Transaction<'_>) -> Result<Vec<i64>, StoreError> {
    let mut stmt = tx.prepare(
        "SELECT id FROM virtual_interfaces WHERE status = 'available' ORDER BY id ASC",
    )?;
    let ids = stmt.query_map([], |row| row.get(0))?;
    ids.collect::<Result<Vec<_>, _>>().map_err(Into::into)
}

/// `(server, rtsp, snapshot)` starting at `next`, plus the following free port
fn port_triple(next: u16, with_snapshot: bool) -> Result<(u16, u16, Option<u16>, u16), StoreError> {
    let span = if with_snapshot { 3 } else { 2 };
    let after = next
        .checked_add(span)
        .ok_or(StoreError::PortsExhausted(next))?;
    let snapshot = with_snapshot.then(|| next + 2);
    Ok((next, next + 1, snapshot, after))
}

impl CameraStore {
    /// Create `cameras` under `nvr_id`, each with an exclusive virtual
    /// interface (lowest id first) and unique ports.
    ///
    /// Fails without side effects if fewer interfaces than cameras are
    /// available or an interface is claimed by someone else mid-batch.
    pub fn allocate_cameras(
        &mut self,
        nvr_id: i64,
        cameras: &[NewCamera],
        base_port: u16,
    ) -> Result<Vec<CameraConfig>, StoreError> {
        if cameras.is_empty() {
            return Ok(Vec::new());
        }

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let nvr_exists: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM nvrs WHERE id = ?)",
            [nvr_id],
            |row| row.get(0),
        )?;
        if !nvr_exists {
            return Err(StoreError::NotFound { kind: "NVR", id: nvr_id });
        }

        let free = available_interfaces(&tx)?;
        if free.len() < cameras.len() {
            tracing::warn!(
                nvr_id,
                "Cannot allocate {} camera(s): only {} free interface(s)",
                cameras.len(),
                free.len()
            );
            return Err(StoreError::NoFreeInterfaces {
                needed: cameras.len(),
                available: free.len(),
            });
        }

        let mut next = next_port(&tx, base_port)?;
        let mut ids = Vec::with_capacity(cameras.len());

        for (camera, interface_id) in cameras.iter().zip(free) {
            let (server, rtsp, snapshot, after) = port_triple(next, camera.needs_snapshot_port())?;
            next = after;

            tx.execute(
                "INSERT INTO virtual_cameras (
                    nvr_id, interface_id, uuid, custom_name, original_name,
                    profile_token, video_source_token,
                    server_port, rtsp_proxy_port, snapshot_proxy_port,
                    hq_rtsp_path, hq_snapshot_path, hq_width, hq_height, hq_framerate, hq_bitrate,
                    lq_rtsp_path, lq_snapshot_path, lq_width, lq_height, lq_framerate, lq_bitrate,
                    target_nvr_rtsp_port, target_nvr_snapshot_port, discovery_enabled, status
                ) VALUES (
                    ?1, ?2, ?3, ?4, ?4, ?5, ?6, ?7, ?8, ?9,
                    ?10, ?11, ?12, ?13, ?14, ?15,
                    ?16, ?17, ?18, ?19, ?20, ?21,
                    ?22, ?23, 1, 'stopped'
                )",
                params![
                    nvr_id,
                    interface_id,
                    uuid::Uuid::new_v4().to_string(),
                    camera.original_name,
                    camera.profile_token,
                    camera.video_source_token,
                    server,
                    rtsp,
                    snapshot,
                    camera.hq.rtsp_path,
                    camera.hq.snapshot_path,
                    camera.hq.width,
                    camera.hq.height,
                    camera.hq.framerate,
                    camera.hq.bitrate,
                    camera.lq.rtsp_path,
                    camera.lq.snapshot_path,
                    camera.lq.width,
                    camera.lq.height,
                    camera.lq.framerate,
                    camera.lq.bitrate,
                    camera.target_rtsp_port,
                    camera.target_snapshot_port,
                ],
            )?;
            let camera_id = tx.last_insert_rowid();

            // Re-check at claim time; the selection above may be stale
            let claimed = tx.execute(
                "UPDATE virtual_interfaces SET status = 'in_use', assigned_camera_id = ?1
                 WHERE id = ?2 AND status = 'available'",
                params![camera_id, interface_id],
            )?;
            if claimed != 1 {
                tracing::warn!(nvr_id, interface_id, "Interface claimed concurrently, aborting batch");
                return Err(StoreError::AllocationRace(interface_id));
            }
            ids.push(camera_id);
        }

        let mut configs = Vec::with_capacity(ids.len());
        for id in ids {
            configs.push(query_camera(&tx, id)?.ok_or(StoreError::NotFound { kind: "Camera", id })?);
        }
        tx.commit()?;

        tracing::info!(nvr_id, "Allocated {} camera(s)", configs.len());
        Ok(configs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::{sample_camera, sample_nvr};
    use crate::models::InterfaceStatus;
    use std::collections::HashSet;

    fn store_with_interfaces(n: usize) -> CameraStore {
        let store = CameraStore::open_in_memory().unwrap();
        for i in 0..n {
            store
                .add_interface(&format!("02:00:00:00:00:{:02x}", i + 1), &format!("macv{}", i + 1))
                .unwrap();
        }
        store
    }

    fn all_ports(store: &CameraStore) -> Vec<u16> {
        store
            .list_cameras()
            .unwrap()
            .iter()
            .flat_map(|c| [Some(c.server_port), Some(c.rtsp_proxy_port), c.snapshot_proxy_port])
            .flatten()
            .collect()
    }

    #[test]
    fn test_first_batch_starts_at_base() {
        let mut store = store_with_interfaces(2);
        let nvr = sample_nvr(&store);
        let cams = store
            .allocate_cameras(
                nvr.id,
                &[sample_camera("A", true), sample_camera("B", false)],
                9000,
            )
            .unwrap();

        assert_eq!(
            (cams[0].server_port, cams[0].rtsp_proxy_port, cams[0].snapshot_proxy_port),
            (9000, 9001, Some(9002))
        );
        assert_eq!(
            (cams[1].server_port, cams[1].rtsp_proxy_port, cams[1].snapshot_proxy_port),
            (9003, 9004, None)
        );
        assert_ne!(cams[0].uuid, cams[1].uuid);
        assert_eq!(cams[0].custom_name, "A");
        assert!(cams[0].discovery_enabled);
    }

    #[test]
    fn test_next_triple_follows_high_water_mark() {
        let mut store = store_with_interfaces(2);
        let nvr = sample_nvr(&store);
        store
            .allocate_cameras(nvr.id, &[sample_camera("A", true)], 9000)
            .unwrap();
        let cams = store
            .allocate_cameras(nvr.id, &[sample_camera("B", true)], 9000)
            .unwrap();
        assert_eq!(
            (cams[0].server_port, cams[0].rtsp_proxy_port, cams[0].snapshot_proxy_port),
            (9003, 9004, Some(9005))
        );
    }

    #[test]
    fn test_interfaces_claimed_lowest_id_first() {
        let mut store = store_with_interfaces(3);
        let nvr = sample_nvr(&store);
        let cams = store
            .allocate_cameras(nvr.id, &[sample_camera("A", true), sample_camera("B", true)], 9000)
            .unwrap();
        let ifaces = store.list_interfaces().unwrap();
        assert_eq!(cams[0].interface_id, Some(ifaces[0].id));
        assert_eq!(cams[1].interface_id, Some(ifaces[1].id));
        assert_eq!(ifaces[0].assigned_camera_id, Some(cams[0].id));
        assert_eq!(ifaces[2].status, InterfaceStatus::Available);
    }

    #[test]
    fn test_exhaustion_commits_nothing() {
        let mut store = store_with_interfaces(2);
        let nvr = sample_nvr(&store);
        let batch: Vec<_> = ["A", "B", "C"].iter().map(|n| sample_camera(n, true)).collect();

        let err = store.allocate_cameras(nvr.id, &batch, 9000).unwrap_err();
        assert!(matches!(
            err,
            StoreError::NoFreeInterfaces { needed: 3, available: 2 }
        ));
        assert!(store.list_cameras().unwrap().is_empty());
        assert!(store
            .list_interfaces()
            .unwrap()
            .iter()
            .all(|i| i.status == InterfaceStatus::Available && i.assigned_camera_id.is_none()));
    }

    #[test]
    fn test_race_rolls_back_whole_batch() {
        let mut store = store_with_interfaces(2);
        let nvr = sample_nvr(&store);
        // Simulates a concurrent claim that lands between selection and update
        store
            .conn
            .execute_batch(
                "CREATE TRIGGER steal AFTER INSERT ON virtual_cameras
                 WHEN NEW.custom_name = 'B'
                 BEGIN
                    UPDATE virtual_interfaces SET status = 'in_use' WHERE id = NEW.interface_id;
                 END;",
            )
            .unwrap();

        let err = store
            .allocate_cameras(nvr.id, &[sample_camera("A", true), sample_camera("B", true)], 9000)
            .unwrap_err();
        assert!(matches!(err, StoreError::AllocationRace(_)));
        assert!(store.list_cameras().unwrap().is_empty());
        assert_eq!(store.count_available_interfaces().unwrap(), 2);
    }

    #[test]
    fn test_ports_distinct_across_batches() {
        let mut store = store_with_interfaces(6);
        let nvr = sample_nvr(&store);
        for batch in [
            vec![sample_camera("A", true), sample_camera("B", false)],
            vec![sample_camera("C", false)],
            vec![sample_camera("D", true), sample_camera("E", true), sample_camera("F", false)],
        ] {
            store.allocate_cameras(nvr.id, &batch, 9000).unwrap();
        }
        let ports = all_ports(&store);
        let unique: HashSet<_> = ports.iter().collect();
        assert_eq!(ports.len(), unique.len());
    }

    #[test]
    fn test_empty_batch_and_unknown_nvr() {
        let mut store = store_with_interfaces(1);
        assert!(store.allocate_cameras(1, &[], 9000).unwrap().is_empty());
        assert!(matches!(
            store.allocate_cameras(42, &[sample_camera("A", true)], 9000),
            Err(StoreError::NotFound { kind: "NVR", id: 42 })
        ));
    }

    #[test]
    fn test_port_overflow() {
        assert!(matches!(
            port_triple(65534, true),
            Err(StoreError::PortsExhausted(65534))
        ));
        assert_eq!(port_triple(9000, false).unwrap(), (9000, 9001, None, 9002));
    }
}
