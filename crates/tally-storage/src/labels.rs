use crate::catalog::location_view;
use crate::rows::{load_sku, now, timestamp_to_sql};
use crate::{InventoryStore, StorageError};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashSet;
use tally_core::views::{InstalledLabel, LabelPrintItem};
use tally_core::{new_id, InventoryError, LabelType, LABEL_FORMAT};
use tracing::{info, warn};

/// Entity a label is printed for, resolved before anything is written.
struct LabelTarget {
    entity_id: String,
    code: String,
    title: String,
    subtitle: String,
}

impl InventoryStore {
    /// Records one printed label per SKU or location and returns what a
    /// renderer needs to draw them. Reprinting refreshes `printed_at` on the
    /// existing `(project, type, code)` label.
    pub fn print_labels(
        &mut self,
        project_id: &str,
        label_type: LabelType,
        ids: &[String],
    ) -> Result<Vec<LabelPrintItem>, StorageError> {
        if ids.is_empty() {
            return Err(InventoryError::Validation("no items to print labels for".to_string()).into());
        }

        let mut seen = HashSet::new();
        let ids = ids
            .iter()
            .filter(|id| seen.insert(*id))
            .collect::<Vec<_>>();

        let tx = self.conn.transaction()?;
        let mut targets = Vec::with_capacity(ids.len());
        for id in ids {
            let target = match label_type {
                LabelType::Sku => sku_target(&tx, project_id, id)?,
                LabelType::Location => location_target(&tx, project_id, id)?,
            };
            targets.push(target);
        }

        let printed_at = timestamp_to_sql(now());
        let mut items = Vec::with_capacity(targets.len());
        for target in targets {
            let (sku_id, location_id) = match label_type {
                LabelType::Sku => (Some(target.entity_id.as_str()), None),
                LabelType::Location => (None, Some(target.entity_id.as_str())),
            };
            let label_id: String = tx.query_row(
                "
                INSERT INTO barcode_labels (
                    id, project_id, label_type, code, format, printed_at, sku_id, location_id
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                ON CONFLICT(project_id, label_type, code) DO UPDATE SET
                    printed_at = excluded.printed_at,
                    sku_id = COALESCE(excluded.sku_id, barcode_labels.sku_id),
                    location_id = COALESCE(excluded.location_id, barcode_labels.location_id)
                RETURNING id
                ",
                params![
                    new_id(),
                    project_id,
                    label_type.as_str(),
                    target.code,
                    LABEL_FORMAT,
                    printed_at,
                    sku_id,
                    location_id,
                ],
                |row| row.get(0),
            )?;

            items.push(LabelPrintItem {
                label_id,
                code: target.code,
                title: target.title,
                subtitle: Some(target.subtitle),
            });
        }

        tx.commit()?;
        info!(project_id, label_type = %label_type, printed = items.len(), "printed labels");
        Ok(items)
    }

    /// Stamps `installed_at` on the given labels of the project. Unknown ids
    /// and labels of other projects are skipped.
    pub fn mark_labels_installed(
        &mut self,
        project_id: &str,
        label_ids: &[String],
        user_id: &str,
    ) -> Result<Vec<InstalledLabel>, StorageError> {
        if label_ids.is_empty() {
            return Ok(Vec::new());
        }

        let installed_at = now();
        let stamp = timestamp_to_sql(installed_at);
        let tx = self.conn.transaction()?;
        let mut installed = Vec::new();
        let mut seen = HashSet::new();

        for label_id in label_ids {
            if !seen.insert(label_id.as_str()) {
                continue;
            }
            let updated = tx.execute(
                "
                UPDATE barcode_labels
                SET installed_at = ?3, installed_by_id = ?4
                WHERE id = ?1 AND project_id = ?2
                ",
                params![label_id, project_id, stamp, user_id],
            )?;
            if updated == 0 {
                warn!(project_id, label_id = %label_id, "label not found in project, skipping");
                continue;
            }
            installed.push(InstalledLabel {
                id: label_id.clone(),
                installed_at,
            });
        }

        tx.commit()?;
        info!(project_id, installed = installed.len(), "marked labels installed");
        Ok(installed)
    }
}

fn sku_target(conn: &Connection, project_id: &str, sku_id: &str) -> Result<LabelTarget, StorageError> {
    let sku = load_sku(conn, sku_id)?
        .filter(|sku| sku.project_id == project_id)
        .ok_or_else(|| InventoryError::not_found("sku", sku_id))?;
    Ok(LabelTarget {
        subtitle: format!("UOM: {}", sku.uom),
        title: sku.name,
        code: sku.code,
        entity_id: sku.id,
    })
}

fn location_target(
    conn: &Connection,
    project_id: &str,
    location_id: &str,
) -> Result<LabelTarget, StorageError> {
    let in_project = conn
        .query_row(
            "SELECT 1 FROM locations WHERE id = ?1 AND project_id = ?2",
            params![location_id, project_id],
            |_| Ok(()),
        )
        .optional()?
        .is_some();
    let location = if in_project {
        location_view(conn, location_id)?
    } else {
        None
    }
    .ok_or_else(|| InventoryError::not_found("location", location_id))?;

    Ok(LabelTarget {
        title: format!("{} · Rack {}", location.zone.code, location.rack.code),
        subtitle: format!(
            "Row {} · Level {} · Pos {}",
            location.row, location.level, location.pos
        ),
        code: location.code,
        entity_id: location.id,
    })
}
