use crate::counts::mark_running;
use crate::rows::{
    clean_text, load_count, load_location, load_sku, load_task, now, sku_summary_at,
    timestamp_at, timestamp_to_sql,
};
use crate::{InventoryStore, StorageError};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tally_core::views::{LocationSummary, ScanView};
use tally_core::{
    ensure_quantity, new_id, InventoryCount, InventoryError, InventoryTask, RecountInput,
    ScanInput,
};
use tracing::debug;

const SCAN_VIEW_SELECT: &str = "
    SELECT s.id, s.task_id, s.qty, r.qty2, s.captured_at, s.device_id,
           l.id, l.code, l.expected_qty,
           k.id, k.code, k.name
    FROM inventory_scans s
    JOIN locations l ON l.id = s.location_id
    LEFT JOIN skus k ON k.id = s.sku_id
    LEFT JOIN inventory_recounts r ON r.scan_id = s.id
";

impl InventoryStore {
    /// Records one reading for a task. The first scan of a planned count
    /// starts it.
    pub fn record_scan(
        &mut self,
        count_id: &str,
        task_id: &str,
        input: ScanInput,
    ) -> Result<ScanView, StorageError> {
        let qty = ensure_quantity("qty", input.qty)?;

        let tx = self.conn.transaction()?;
        let (count, task) = open_task(&tx, count_id, task_id)?;

        let location = load_location(&tx, &input.location_id)?
            .filter(|location| location.project_id == count.project_id)
            .ok_or_else(|| InventoryError::not_found("location", input.location_id.as_str()))?;
        if location.zone_id != task.zone_id {
            return Err(InventoryError::Integrity(format!(
                "location {} is outside the zone of task {task_id}",
                location.code
            ))
            .into());
        }

        let sku_id = match clean_text(input.sku_id.as_deref()) {
            Some(sku_id) => {
                let sku = load_sku(&tx, &sku_id)?
                    .ok_or_else(|| InventoryError::not_found("sku", sku_id.as_str()))?;
                if sku.project_id != count.project_id {
                    return Err(InventoryError::Integrity(format!(
                        "sku {} belongs to another project",
                        sku.id
                    ))
                    .into());
                }
                Some(sku.id)
            }
            None => location.sku_id.clone(),
        };

        let scan_id = new_id();
        tx.execute(
            "
            INSERT INTO inventory_scans (id, task_id, location_id, sku_id, qty, device_id, captured_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ",
            params![
                scan_id,
                task.id,
                location.id,
                sku_id,
                qty,
                clean_text(input.device_id.as_deref()),
                timestamp_to_sql(now()),
            ],
        )?;
        mark_running(&tx, count_id)?;

        let view = scan_view(&tx, &scan_id)?
            .ok_or_else(|| InventoryError::not_found("scan", scan_id.as_str()))?;
        tx.commit()?;

        debug!(count_id, task_id, location = %location.code, qty, "recorded scan");
        Ok(view)
    }

    /// Stores or replaces the second reading of a scan.
    pub fn record_recount(
        &mut self,
        count_id: &str,
        task_id: &str,
        scan_id: &str,
        input: RecountInput,
    ) -> Result<ScanView, StorageError> {
        let qty2 = ensure_quantity("qty2", input.qty2)?;

        let tx = self.conn.transaction()?;
        let scan_task: Option<String> = tx
            .query_row(
                "SELECT task_id FROM inventory_scans WHERE id = ?1",
                [scan_id],
                |row| row.get(0),
            )
            .optional()?;
        if scan_task.as_deref() != Some(task_id) {
            return Err(InventoryError::not_found("scan", scan_id).into());
        }
        open_task(&tx, count_id, task_id)?;

        tx.execute(
            "
            INSERT INTO inventory_recounts (scan_id, qty2, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(scan_id) DO UPDATE SET
                qty2 = excluded.qty2,
                updated_at = excluded.updated_at
            ",
            params![scan_id, qty2, timestamp_to_sql(now())],
        )?;

        let view = scan_view(&tx, scan_id)?
            .ok_or_else(|| InventoryError::not_found("scan", scan_id))?;
        tx.commit()?;

        debug!(count_id, task_id, scan_id, qty2, "recorded recount");
        Ok(view)
    }
}

/// Loads a task of `count_id` whose count still accepts readings.
fn open_task(
    conn: &Connection,
    count_id: &str,
    task_id: &str,
) -> Result<(InventoryCount, InventoryTask), StorageError> {
    let task = load_task(conn, task_id)?
        .filter(|task| task.count_id == count_id)
        .ok_or_else(|| InventoryError::not_found("task", task_id))?;
    let count =
        load_count(conn, count_id)?.ok_or_else(|| InventoryError::not_found("count", count_id))?;
    if count.status.is_closed() {
        return Err(InventoryError::InvalidState(format!("count {count_id} is closed")).into());
    }
    Ok((count, task))
}

fn scan_view(conn: &Connection, scan_id: &str) -> Result<Option<ScanView>, StorageError> {
    let sql = format!("{SCAN_VIEW_SELECT} WHERE s.id = ?1");
    Ok(conn.query_row(&sql, [scan_id], scan_view_from_row).optional()?)
}

/// Scans of a task in capture order.
pub(crate) fn task_scans(conn: &Connection, task_id: &str) -> Result<Vec<ScanView>, StorageError> {
    let sql = format!("{SCAN_VIEW_SELECT} WHERE s.task_id = ?1 ORDER BY s.captured_at ASC, s.id ASC");
    let mut statement = conn.prepare(&sql)?;
    let rows = statement.query_map([task_id], scan_view_from_row)?;
    let mut scans = Vec::new();
    for row in rows {
        scans.push(row?);
    }
    Ok(scans)
}

fn scan_view_from_row(row: &Row<'_>) -> rusqlite::Result<ScanView> {
    let qty: f64 = row.get(2)?;
    let recount_qty: Option<f64> = row.get(3)?;
    Ok(ScanView {
        id: row.get(0)?,
        task_id: row.get(1)?,
        qty,
        final_qty: recount_qty.unwrap_or(qty),
        recount_qty,
        captured_at: timestamp_at(row, 4)?,
        device_id: row.get(5)?,
        location: LocationSummary {
            id: row.get(6)?,
            code: row.get(7)?,
            expected_qty: row.get(8)?,
        },
        sku: sku_summary_at(row, 9)?,
    })
}
