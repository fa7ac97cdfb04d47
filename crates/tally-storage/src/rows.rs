//! Row decoding and single-record lookups shared by the store modules.
//! Lookups take a plain `Connection` so they work on a `Transaction` too.

use crate::StorageError;
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tally_core::views::SkuSummary;
use tally_core::{CountStatus, InventoryCount, InventoryTask, Location, Sku, Zone};

/// Current time at the microsecond precision timestamps are stored with.
pub(crate) fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Fixed-width RFC 3339 so text ordering matches time ordering.
pub(crate) fn timestamp_to_sql(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(value)
        .map(|timestamp| timestamp.with_timezone(&Utc))
        .map_err(|err| StorageError::Timestamp(err.to_string()))
}

pub(crate) fn timestamp_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_timestamp(&raw).map_err(|err| conversion_failure(idx, err))
}

pub(crate) fn optional_timestamp_at(
    row: &Row<'_>,
    idx: usize,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    row.get::<_, Option<String>>(idx)?
        .map(|raw| parse_timestamp(&raw).map_err(|err| conversion_failure(idx, err)))
        .transpose()
}

pub(crate) fn status_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<CountStatus> {
    let raw: String = row.get(idx)?;
    raw.parse::<CountStatus>().map_err(|reason| {
        conversion_failure(
            idx,
            std::io::Error::new(std::io::ErrorKind::InvalidData, reason),
        )
    })
}

fn conversion_failure<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(err))
}

/// Reads a `COUNT(*)` column.
pub(crate) fn count_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<u64> {
    let raw: i64 = row.get(idx)?;
    Ok(u64::try_from(raw).unwrap_or_default())
}

/// Reads `id, code, name` of an optional joined SKU.
pub(crate) fn sku_summary_at(row: &Row<'_>, start: usize) -> rusqlite::Result<Option<SkuSummary>> {
    let Some(id) = row.get::<_, Option<String>>(start)? else {
        return Ok(None);
    };
    Ok(Some(SkuSummary {
        id,
        code: row.get(start + 1)?,
        name: row.get(start + 2)?,
    }))
}

/// Trims optional free text; blank becomes `None`.
pub(crate) fn clean_text(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

pub(crate) const COUNT_COLUMNS: &str =
    "id, project_id, status, tolerance_pct, planned_at, started_at, closed_at";

pub(crate) fn count_from_row(row: &Row<'_>) -> rusqlite::Result<InventoryCount> {
    Ok(InventoryCount {
        id: row.get(0)?,
        project_id: row.get(1)?,
        status: status_at(row, 2)?,
        tolerance_pct: row.get(3)?,
        planned_at: timestamp_at(row, 4)?,
        started_at: optional_timestamp_at(row, 5)?,
        closed_at: optional_timestamp_at(row, 6)?,
    })
}

pub(crate) fn load_count(
    conn: &Connection,
    count_id: &str,
) -> Result<Option<InventoryCount>, StorageError> {
    let sql = format!("SELECT {COUNT_COLUMNS} FROM inventory_counts WHERE id = ?1");
    Ok(conn
        .query_row(&sql, [count_id], count_from_row)
        .optional()?)
}

pub(crate) fn load_task(
    conn: &Connection,
    task_id: &str,
) -> Result<Option<InventoryTask>, StorageError> {
    Ok(conn
        .query_row(
            "
            SELECT id, count_id, zone_id, assigned_to_id, blind
            FROM inventory_tasks
            WHERE id = ?1
            ",
            [task_id],
            |row| {
                Ok(InventoryTask {
                    id: row.get(0)?,
                    count_id: row.get(1)?,
                    zone_id: row.get(2)?,
                    assigned_to_id: row.get(3)?,
                    blind: row.get::<_, i64>(4)? != 0,
                })
            },
        )
        .optional()?)
}

pub(crate) const LOCATION_COLUMNS: &str =
    "id, project_id, zone_id, rack_id, rack_row, rack_level, rack_pos, code, expected_qty, sku_id";

pub(crate) fn location_from_row(row: &Row<'_>) -> rusqlite::Result<Location> {
    Ok(Location {
        id: row.get(0)?,
        project_id: row.get(1)?,
        zone_id: row.get(2)?,
        rack_id: row.get(3)?,
        row: row.get(4)?,
        level: row.get(5)?,
        pos: row.get(6)?,
        code: row.get(7)?,
        expected_qty: row.get(8)?,
        sku_id: row.get(9)?,
    })
}

pub(crate) fn load_location(
    conn: &Connection,
    location_id: &str,
) -> Result<Option<Location>, StorageError> {
    let sql = format!("SELECT {LOCATION_COLUMNS} FROM locations WHERE id = ?1");
    Ok(conn
        .query_row(&sql, [location_id], location_from_row)
        .optional()?)
}

pub(crate) const SKU_COLUMNS: &str = "id, project_id, code, name, uom, length, width, height, weight";

pub(crate) fn sku_from_row(row: &Row<'_>) -> rusqlite::Result<Sku> {
    Ok(Sku {
        id: row.get(0)?,
        project_id: row.get(1)?,
        code: row.get(2)?,
        name: row.get(3)?,
        uom: row.get(4)?,
        length: row.get(5)?,
        width: row.get(6)?,
        height: row.get(7)?,
        weight: row.get(8)?,
    })
}

pub(crate) fn load_sku(conn: &Connection, sku_id: &str) -> Result<Option<Sku>, StorageError> {
    let sql = format!("SELECT {SKU_COLUMNS} FROM skus WHERE id = ?1");
    Ok(conn.query_row(&sql, [sku_id], sku_from_row).optional()?)
}

pub(crate) fn load_zone(conn: &Connection, zone_id: &str) -> Result<Option<Zone>, StorageError> {
    Ok(conn
        .query_row(
            "SELECT id, project_id, code, name FROM warehouse_zones WHERE id = ?1",
            params![zone_id],
            |row| {
                Ok(Zone {
                    id: row.get(0)?,
                    project_id: row.get(1)?,
                    code: row.get(2)?,
                    name: row.get(3)?,
                })
            },
        )
        .optional()?)
}
