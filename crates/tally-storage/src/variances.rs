use crate::rows::{clean_text, load_count, sku_summary_at};
use crate::{InventoryStore, StorageError};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use tally_core::reconcile::{compute_variances, CatalogSlot, Reading, ReadingKey};
use tally_core::views::{RackRef, VarianceLocation, VarianceReportRow, VarianceView, ZoneRef};
use tally_core::{new_id, InventoryCount, InventoryError};
use tracing::debug;

const VARIANCE_VIEW_SELECT: &str = "
    SELECT v.id, v.count_id, v.expected_qty, v.found_qty, v.difference, v.percentage, v.reason,
           l.id, l.code, l.expected_qty,
           z.id, z.code, z.name,
           r.id, r.code, r.name,
           k.id, k.code, k.name
    FROM inventory_variances v
    JOIN locations l ON l.id = v.location_id
    JOIN warehouse_zones z ON z.id = l.zone_id
    JOIN racks r ON r.id = l.rack_id
    LEFT JOIN skus k ON k.id = v.sku_id
";

impl InventoryStore {
    /// Sets or clears the reviewer note on a variance. Blank text clears it.
    pub fn set_variance_reason(
        &mut self,
        count_id: &str,
        variance_id: &str,
        reason: Option<&str>,
    ) -> Result<VarianceView, StorageError> {
        let tx = self.conn.transaction()?;
        load_count(&tx, count_id)?.ok_or_else(|| InventoryError::not_found("count", count_id))?;

        let updated = tx.execute(
            "UPDATE inventory_variances SET reason = ?3 WHERE id = ?1 AND count_id = ?2",
            params![variance_id, count_id, clean_text(reason)],
        )?;
        if updated == 0 {
            return Err(InventoryError::not_found("variance", variance_id).into());
        }

        let view = variance_view(&tx, variance_id)?
            .ok_or_else(|| InventoryError::not_found("variance", variance_id))?;
        tx.commit()?;
        Ok(view)
    }

    pub fn variance_report(&self, count_id: &str) -> Result<Vec<VarianceReportRow>, StorageError> {
        load_count(&self.conn, count_id)?
            .ok_or_else(|| InventoryError::not_found("count", count_id))?;
        Ok(variance_views(&self.conn, count_id)?
            .iter()
            .map(VarianceReportRow::from)
            .collect())
    }
}

/// Replaces the variance set of a count with one computed from the current
/// catalog and readings. Returns the number of variances written.
pub(crate) fn reconcile_count(
    conn: &Connection,
    count: &InventoryCount,
    keep_reasons: bool,
) -> Result<usize, StorageError> {
    let catalog = {
        let mut statement = conn.prepare(
            "
            SELECT id, sku_id, expected_qty
            FROM locations
            WHERE project_id = ?1
            ORDER BY code ASC
            ",
        )?;
        let rows = statement.query_map([&count.project_id], |row| {
            Ok(CatalogSlot {
                location_id: row.get(0)?,
                sku_id: row.get(1)?,
                expected_qty: row.get(2)?,
            })
        })?;
        let mut catalog = Vec::new();
        for row in rows {
            catalog.push(row?);
        }
        catalog
    };

    let readings = {
        let mut statement = conn.prepare(
            "
            SELECT s.location_id, s.sku_id, s.qty, r.qty2
            FROM inventory_scans s
            JOIN inventory_tasks t ON t.id = s.task_id
            LEFT JOIN inventory_recounts r ON r.scan_id = s.id
            WHERE t.count_id = ?1
            ORDER BY s.captured_at ASC, s.id ASC
            ",
        )?;
        let rows = statement.query_map([&count.id], |row| {
            Ok(Reading {
                location_id: row.get(0)?,
                sku_id: row.get(1)?,
                qty: row.get(2)?,
                recount_qty: row.get(3)?,
            })
        })?;
        let mut readings = Vec::new();
        for row in rows {
            readings.push(row?);
        }
        readings
    };

    let reasons = if keep_reasons {
        previous_reasons(conn, &count.id)?
    } else {
        HashMap::new()
    };

    let drafts = compute_variances(&catalog, &readings, count.tolerance_pct);
    conn.execute(
        "DELETE FROM inventory_variances WHERE count_id = ?1",
        [&count.id],
    )?;

    for (seq, draft) in drafts.iter().enumerate() {
        let key = ReadingKey::new(&draft.location_id, draft.sku_id.as_deref());
        conn.execute(
            "
            INSERT INTO inventory_variances (
                id, count_id, location_id, sku_id, expected_qty, found_qty,
                difference, percentage, reason, seq
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ",
            params![
                new_id(),
                count.id,
                draft.location_id,
                draft.sku_id,
                draft.expected_qty,
                draft.found_qty,
                draft.difference,
                draft.percentage,
                reasons.get(&key),
                seq as i64,
            ],
        )?;
    }

    debug!(
        count_id = %count.id,
        locations = catalog.len(),
        readings = readings.len(),
        variances = drafts.len(),
        "reconciled count"
    );
    Ok(drafts.len())
}

fn previous_reasons(
    conn: &Connection,
    count_id: &str,
) -> Result<HashMap<ReadingKey, String>, StorageError> {
    let mut statement = conn.prepare(
        "
        SELECT location_id, sku_id, reason
        FROM inventory_variances
        WHERE count_id = ?1 AND reason IS NOT NULL
        ",
    )?;
    let rows = statement.query_map([count_id], |row| {
        let location_id: String = row.get(0)?;
        let sku_id: Option<String> = row.get(1)?;
        let reason: String = row.get(2)?;
        Ok((ReadingKey::new(&location_id, sku_id.as_deref()), reason))
    })?;

    let mut reasons = HashMap::new();
    for row in rows {
        let (key, reason) = row?;
        reasons.insert(key, reason);
    }
    Ok(reasons)
}

/// Variances of a count in reconciliation order.
pub(crate) fn variance_views(
    conn: &Connection,
    count_id: &str,
) -> Result<Vec<VarianceView>, StorageError> {
    let sql = format!("{VARIANCE_VIEW_SELECT} WHERE v.count_id = ?1 ORDER BY v.seq ASC");
    let mut statement = conn.prepare(&sql)?;
    let rows = statement.query_map([count_id], variance_view_from_row)?;
    let mut variances = Vec::new();
    for row in rows {
        variances.push(row?);
    }
    Ok(variances)
}

fn variance_view(conn: &Connection, variance_id: &str) -> Result<Option<VarianceView>, StorageError> {
    let sql = format!("{VARIANCE_VIEW_SELECT} WHERE v.id = ?1");
    Ok(conn
        .query_row(&sql, [variance_id], variance_view_from_row)
        .optional()?)
}

fn variance_view_from_row(row: &Row<'_>) -> rusqlite::Result<VarianceView> {
    Ok(VarianceView {
        id: row.get(0)?,
        count_id: row.get(1)?,
        expected_qty: row.get(2)?,
        found_qty: row.get(3)?,
        difference: row.get(4)?,
        percentage: row.get(5)?,
        reason: row.get(6)?,
        location: VarianceLocation {
            id: row.get(7)?,
            code: row.get(8)?,
            expected_qty: row.get(9)?,
            zone: ZoneRef {
                id: row.get(10)?,
                code: row.get(11)?,
                name: row.get(12)?,
            },
            rack: RackRef {
                id: row.get(13)?,
                code: row.get(14)?,
                name: row.get(15)?,
            },
        },
        sku: sku_summary_at(row, 16)?,
    })
}
