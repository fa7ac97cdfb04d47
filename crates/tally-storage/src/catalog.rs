use crate::rows::{
    clean_text, load_location, load_sku, location_from_row, now, optional_timestamp_at,
    timestamp_at, timestamp_to_sql, LOCATION_COLUMNS,
};
use crate::{InventoryStore, StorageError};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tally_core::dedup::duplicate_pairs;
use tally_core::import::{ImportReport, RawSkuRow, SkuDraft};
use tally_core::provisioning::{ProvisionPlan, ProvisionReport, RangeDefinition};
use tally_core::views::{
    DuplicateCandidateView, LabelInfo, LocationCatalog, LocationView, RackRef, SkuSummary,
    SkuView, ZoneRef,
};
use tally_core::{ensure_quantity, new_id, InventoryError, Location, LocationAssignment};
use tracing::{debug, info};

const LOCATION_VIEW_SELECT: &str = "
    SELECT l.id, l.code, l.rack_row, l.rack_level, l.rack_pos, l.expected_qty, l.sku_id,
           z.id, z.code, z.name,
           r.id, r.code, r.name,
           b.id, b.printed_at, b.installed_at
    FROM locations l
    JOIN warehouse_zones z ON z.id = l.zone_id
    JOIN racks r ON r.id = l.rack_id
    LEFT JOIN barcode_labels b ON b.id = (
        SELECT id FROM barcode_labels
        WHERE location_id = l.id
        ORDER BY printed_at DESC, id DESC
        LIMIT 1
    )
";

impl InventoryStore {
    /// Expands every definition into locations inside one transaction.
    /// Definitions whose zone or rack code is blank are skipped.
    pub fn provision_locations(
        &mut self,
        project_id: &str,
        definitions: &[RangeDefinition],
    ) -> Result<ProvisionReport, StorageError> {
        let tx = self.conn.transaction()?;
        let mut report = ProvisionReport::default();

        for definition in definitions {
            let Some(plan) = definition.plan() else {
                debug!(
                    zone = %definition.zone.code,
                    rack = %definition.rack.code,
                    "skipping range definition with blank zone or rack code"
                );
                continue;
            };
            provision_plan(&tx, project_id, &plan, &mut report)?;
        }

        tx.commit()?;
        report.total = report.created + report.reused;
        info!(
            project_id,
            created = report.created,
            reused = report.reused,
            "provisioned locations"
        );
        Ok(report)
    }

    /// Upserts SKUs by normalized code in one transaction, then recomputes
    /// duplicate candidates for the whole project.
    pub fn import_skus(
        &mut self,
        project_id: &str,
        rows: &[RawSkuRow],
    ) -> Result<ImportReport, StorageError> {
        let tx = self.conn.transaction()?;
        let mut report = ImportReport::default();
        let stamp = timestamp_to_sql(now());

        for (index, row) in rows.iter().enumerate() {
            let Some(draft) = SkuDraft::from_row(row, &self.options.default_uom) else {
                debug!(row = index, "skipping sku row without a code");
                continue;
            };

            let existing: Option<String> = tx
                .query_row(
                    "SELECT id FROM skus WHERE project_id = ?1 AND code = ?2",
                    params![project_id, draft.code],
                    |row| row.get(0),
                )
                .optional()?;

            match existing {
                Some(sku_id) => {
                    tx.execute(
                        "
                        UPDATE skus
                        SET name = ?2, uom = ?3, length = ?4, width = ?5, height = ?6,
                            weight = ?7, updated_at = ?8
                        WHERE id = ?1
                        ",
                        params![
                            sku_id,
                            draft.name,
                            draft.uom,
                            draft.length,
                            draft.width,
                            draft.height,
                            draft.weight,
                            stamp,
                        ],
                    )?;
                    report.updated += 1;
                }
                None => {
                    tx.execute(
                        "
                        INSERT INTO skus (
                            id, project_id, code, name, uom, length, width, height, weight,
                            created_at, updated_at
                        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)
                        ",
                        params![
                            new_id(),
                            project_id,
                            draft.code,
                            draft.name,
                            draft.uom,
                            draft.length,
                            draft.width,
                            draft.height,
                            draft.weight,
                            stamp,
                        ],
                    )?;
                    report.created += 1;
                }
            }
        }

        tx.commit()?;
        report.total = report.created + report.updated;
        info!(
            project_id,
            created = report.created,
            updated = report.updated,
            "imported skus"
        );

        self.recompute_duplicates(project_id)?;
        Ok(report)
    }

    /// Replaces the project's duplicate candidates with exact normalized
    /// name matches. Returns the number of candidate pairs.
    pub fn recompute_duplicates(&mut self, project_id: &str) -> Result<usize, StorageError> {
        let tx = self.conn.transaction()?;

        let skus = {
            let mut statement =
                tx.prepare("SELECT id, name FROM skus WHERE project_id = ?1 ORDER BY code")?;
            let rows = statement.query_map([project_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;
            let mut skus = Vec::new();
            for row in rows {
                skus.push(row?);
            }
            skus
        };

        let pairs = duplicate_pairs(skus.iter().map(|(id, name)| (id.as_str(), name.as_str())));

        tx.execute(
            "DELETE FROM sku_dup_candidates WHERE project_id = ?1",
            [project_id],
        )?;
        for pair in &pairs {
            tx.execute(
                "
                INSERT OR IGNORE INTO sku_dup_candidates (project_id, sku_a_id, sku_b_id, similarity)
                VALUES (?1, ?2, ?3, ?4)
                ",
                params![project_id, pair.sku_a_id, pair.sku_b_id, pair.similarity],
            )?;
        }

        tx.commit()?;
        debug!(project_id, candidates = pairs.len(), "recomputed duplicate skus");
        Ok(pairs.len())
    }

    pub fn duplicate_candidates(
        &self,
        project_id: &str,
    ) -> Result<Vec<DuplicateCandidateView>, StorageError> {
        let mut statement = self.conn.prepare(
            "
            SELECT a.id, a.code, a.name, b.id, b.code, b.name, c.similarity
            FROM sku_dup_candidates c
            JOIN skus a ON a.id = c.sku_a_id
            JOIN skus b ON b.id = c.sku_b_id
            WHERE c.project_id = ?1
            ORDER BY c.id ASC
            ",
        )?;

        let rows = statement.query_map([project_id], |row| {
            Ok(DuplicateCandidateView {
                sku_a: SkuSummary {
                    id: row.get(0)?,
                    code: row.get(1)?,
                    name: row.get(2)?,
                },
                sku_b: SkuSummary {
                    id: row.get(3)?,
                    code: row.get(4)?,
                    name: row.get(5)?,
                },
                similarity: row.get(6)?,
            })
        })?;

        let mut candidates = Vec::new();
        for row in rows {
            candidates.push(row?);
        }
        Ok(candidates)
    }

    pub fn list_skus(&self, project_id: &str) -> Result<Vec<SkuView>, StorageError> {
        let mut statement = self.conn.prepare(
            "
            SELECT s.id, s.code, s.name, s.uom, s.length, s.width, s.height, s.weight,
                   b.id, b.printed_at, b.installed_at
            FROM skus s
            LEFT JOIN barcode_labels b ON b.id = (
                SELECT id FROM barcode_labels
                WHERE sku_id = s.id
                ORDER BY printed_at DESC, id DESC
                LIMIT 1
            )
            WHERE s.project_id = ?1
            ORDER BY s.code ASC
            ",
        )?;

        let rows = statement.query_map([project_id], |row| {
            Ok(SkuView {
                id: row.get(0)?,
                code: row.get(1)?,
                name: row.get(2)?,
                uom: row.get(3)?,
                length: row.get(4)?,
                width: row.get(5)?,
                height: row.get(6)?,
                weight: row.get(7)?,
                label: label_info_at(row, 8)?,
            })
        })?;

        let mut skus = Vec::new();
        for row in rows {
            skus.push(row?);
        }
        Ok(skus)
    }

    /// Raw location records of a project in code order.
    pub fn locations(&self, project_id: &str) -> Result<Vec<Location>, StorageError> {
        let sql = format!(
            "SELECT {LOCATION_COLUMNS} FROM locations WHERE project_id = ?1 ORDER BY code ASC"
        );
        let mut statement = self.conn.prepare(&sql)?;
        let rows = statement.query_map([project_id], location_from_row)?;
        let mut locations = Vec::new();
        for row in rows {
            locations.push(row?);
        }
        Ok(locations)
    }

    /// Location views in code order plus the per-zone installation rollup.
    pub fn list_locations(&self, project_id: &str) -> Result<LocationCatalog, StorageError> {
        let sql = format!("{LOCATION_VIEW_SELECT} WHERE l.project_id = ?1 ORDER BY l.code ASC");
        let mut statement = self.conn.prepare(&sql)?;
        let rows = statement.query_map([project_id], location_view_from_row)?;
        let mut locations = Vec::new();
        for row in rows {
            locations.push(row?);
        }
        Ok(LocationCatalog::new(locations))
    }

    /// Sets the expected quantity and assigned SKU the reconciler compares
    /// scans against.
    pub fn assign_location(
        &mut self,
        project_id: &str,
        location_id: &str,
        assignment: LocationAssignment,
    ) -> Result<LocationView, StorageError> {
        let expected_qty = assignment
            .expected_qty
            .map(|qty| ensure_quantity("expectedQty", qty))
            .transpose()?;

        let tx = self.conn.transaction()?;
        let location = load_location(&tx, location_id)?
            .filter(|location| location.project_id == project_id)
            .ok_or_else(|| InventoryError::not_found("location", location_id))?;

        let sku_id = match clean_text(assignment.sku_id.as_deref()) {
            Some(sku_id) => {
                let sku = load_sku(&tx, &sku_id)?
                    .ok_or_else(|| InventoryError::not_found("sku", sku_id.as_str()))?;
                if sku.project_id != project_id {
                    return Err(InventoryError::Integrity(format!(
                        "sku {} belongs to another project",
                        sku.id
                    ))
                    .into());
                }
                Some(sku.id)
            }
            None => None,
        };

        tx.execute(
            "UPDATE locations SET expected_qty = ?2, sku_id = ?3 WHERE id = ?1",
            params![location.id, expected_qty, sku_id],
        )?;
        let view = location_view(&tx, &location.id)?
            .ok_or_else(|| InventoryError::not_found("location", location_id))?;
        tx.commit()?;

        debug!(location = %view.code, ?expected_qty, "assigned location stock");
        Ok(view)
    }
}

fn provision_plan(
    conn: &Connection,
    project_id: &str,
    plan: &ProvisionPlan,
    report: &mut ProvisionReport,
) -> Result<(), StorageError> {
    let zone_id: String = conn.query_row(
        "
        INSERT INTO warehouse_zones (id, project_id, code, name)
        VALUES (?1, ?2, ?3, ?4)
        ON CONFLICT(project_id, code) DO UPDATE SET name = excluded.name
        RETURNING id
        ",
        params![new_id(), project_id, plan.zone_code, plan.zone_name],
        |row| row.get(0),
    )?;

    let rack_id: String = conn.query_row(
        "
        INSERT INTO racks (id, project_id, zone_id, code, name)
        VALUES (?1, ?2, ?3, ?4, ?5)
        ON CONFLICT(zone_id, code) DO UPDATE SET name = excluded.name
        RETURNING id
        ",
        params![new_id(), project_id, zone_id, plan.rack_code, plan.rack_name],
        |row| row.get(0),
    )?;

    for slot in plan.slots() {
        let existing: Option<String> = conn
            .query_row(
                "SELECT id FROM locations WHERE code = ?1",
                [&slot.code],
                |row| row.get(0),
            )
            .optional()?;

        match existing {
            Some(location_id) => {
                conn.execute(
                    "
                    UPDATE locations
                    SET project_id = ?2, zone_id = ?3, rack_id = ?4,
                        rack_row = ?5, rack_level = ?6, rack_pos = ?7
                    WHERE id = ?1
                    ",
                    params![
                        location_id,
                        project_id,
                        zone_id,
                        rack_id,
                        slot.row,
                        slot.level,
                        slot.pos
                    ],
                )?;
                report.reused += 1;
            }
            None => {
                conn.execute(
                    "
                    INSERT INTO locations (
                        id, project_id, zone_id, rack_id, rack_row, rack_level, rack_pos, code
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                    ",
                    params![
                        new_id(),
                        project_id,
                        zone_id,
                        rack_id,
                        slot.row,
                        slot.level,
                        slot.pos,
                        slot.code
                    ],
                )?;
                report.created += 1;
            }
        }
    }

    Ok(())
}

pub(crate) fn location_view(
    conn: &Connection,
    location_id: &str,
) -> Result<Option<LocationView>, StorageError> {
    let sql = format!("{LOCATION_VIEW_SELECT} WHERE l.id = ?1");
    Ok(conn
        .query_row(&sql, [location_id], location_view_from_row)
        .optional()?)
}

fn location_view_from_row(row: &Row<'_>) -> rusqlite::Result<LocationView> {
    Ok(LocationView {
        id: row.get(0)?,
        code: row.get(1)?,
        row: row.get(2)?,
        level: row.get(3)?,
        pos: row.get(4)?,
        expected_qty: row.get(5)?,
        sku_id: row.get(6)?,
        zone: ZoneRef {
            id: row.get(7)?,
            code: row.get(8)?,
            name: row.get(9)?,
        },
        rack: RackRef {
            id: row.get(10)?,
            code: row.get(11)?,
            name: row.get(12)?,
        },
        label: label_info_at(row, 13)?,
    })
}

/// Reads `id, printed_at, installed_at` of an optional joined label.
fn label_info_at(row: &Row<'_>, start: usize) -> rusqlite::Result<Option<LabelInfo>> {
    let Some(id) = row.get::<_, Option<String>>(start)? else {
        return Ok(None);
    };
    Ok(Some(LabelInfo {
        id,
        printed_at: timestamp_at(row, start + 1)?,
        installed_at: optional_timestamp_at(row, start + 2)?,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{seed_locations, store, PROJECT};
    use tally_core::provisioning::CodeAndName;
    use tally_core::ErrorKind;

    fn sku_row(pairs: &[(&str, &str)]) -> RawSkuRow {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }

    fn range() -> RangeDefinition {
        RangeDefinition::new("A", "1")
            .rows(1.0, 2.0)
            .levels(1.0, 1.0)
            .positions(1.0, 2.0)
    }

    #[test]
    fn provisioning_creates_expected_codes() {
        let mut db = store();
        let report = db.provision_locations(PROJECT, &[range()]).expect("provision");
        assert_eq!(
            report,
            ProvisionReport {
                created: 4,
                reused: 0,
                total: 4
            }
        );

        let codes = db
            .locations(PROJECT)
            .expect("locations")
            .into_iter()
            .map(|location| location.code)
            .collect::<Vec<_>>();
        assert_eq!(
            codes,
            vec![
                "ZA-R1-N0101-P01",
                "ZA-R1-N0101-P02",
                "ZA-R1-N0201-P01",
                "ZA-R1-N0201-P02",
            ]
        );
    }

    #[test]
    fn reprovisioning_reuses_every_location() {
        let mut db = store();
        db.provision_locations(PROJECT, &[range()]).expect("first");
        let before = db.locations(PROJECT).expect("locations");

        let report = db.provision_locations(PROJECT, &[range()]).expect("second");
        assert_eq!(report.created, 0);
        assert_eq!(report.reused, 4);
        assert_eq!(report.total, 4);

        let after = db.locations(PROJECT).expect("locations");
        assert_eq!(before, after);
    }

    #[test]
    fn blank_definitions_are_skipped_without_error() {
        let mut db = store();
        let blank = RangeDefinition::new(" ", "1").rows(1.0, 3.0);
        let report = db
            .provision_locations(PROJECT, &[blank, range()])
            .expect("provision");
        assert_eq!(report.created, 4);
        assert_eq!(report.reused, 0);
    }

    #[test]
    fn zone_and_rack_names_refresh_on_reprovision() {
        let mut db = store();
        db.provision_locations(PROJECT, &[range()]).expect("first");

        let mut renamed = range();
        renamed.zone = CodeAndName {
            code: "a".to_string(),
            name: Some("Picking".to_string()),
        };
        db.provision_locations(PROJECT, &[renamed]).expect("second");

        let catalog = db.list_locations(PROJECT).expect("catalog");
        assert_eq!(catalog.zones.len(), 1);
        assert_eq!(catalog.zones[0].zone_name, "Picking");
        assert_eq!(catalog.zones[0].total_locations, 4);
        assert_eq!(catalog.zones[0].installed_locations, 0);
        assert!(catalog.locations.iter().all(|location| location.rack.name == "1"));
    }

    #[test]
    fn import_upserts_by_normalized_code() {
        let mut db = store();
        let first = db
            .import_skus(
                PROJECT,
                &[
                    sku_row(&[("code", "tor-1"), ("name", "Tornillo"), ("length", "2,5")]),
                    sku_row(&[("sku", "TUE 1"), ("uom", "CJ")]),
                    sku_row(&[("name", "no code here")]),
                ],
            )
            .expect("import");
        assert_eq!(
            first,
            ImportReport {
                created: 2,
                updated: 0,
                total: 2
            }
        );

        let second = db
            .import_skus(
                PROJECT,
                &[sku_row(&[("product_code", " TOR-1 "), ("name", "Tornillo largo")])],
            )
            .expect("import");
        assert_eq!(second.created, 0);
        assert_eq!(second.updated, 1);

        let skus = db.list_skus(PROJECT).expect("skus");
        assert_eq!(skus.len(), 2);
        assert_eq!(skus[0].code, "TOR-1");
        assert_eq!(skus[0].name, "Tornillo largo");
        assert_eq!(skus[0].uom, "UND");
        assert_eq!(skus[0].length, None);
        assert_eq!(skus[1].code, "TUE1");
        assert_eq!(skus[1].name, "TUE1");
        assert_eq!(skus[1].uom, "CJ");
        assert!(skus.iter().all(|sku| sku.label.is_none()));
    }

    #[test]
    fn import_uses_configured_default_unit() {
        let mut db = InventoryStore::open_in_memory_with(crate::StoreOptions {
            default_uom: "EA".to_string(),
            ..Default::default()
        })
        .expect("open db");
        db.import_skus(PROJECT, &[sku_row(&[("code", "x")])])
            .expect("import");
        assert_eq!(db.list_skus(PROJECT).expect("skus")[0].uom, "EA");
    }

    #[test]
    fn import_recomputes_duplicate_candidates() {
        let mut db = store();
        db.import_skus(
            PROJECT,
            &[
                sku_row(&[("code", "a1"), ("name", "Cinta Adhesiva")]),
                sku_row(&[("code", "a2"), ("name", "cinta-adhesiva")]),
                sku_row(&[("code", "a3"), ("name", "Cínta adhesiva!")]),
                sku_row(&[("code", "b1"), ("name", "Pegamento")]),
            ],
        )
        .expect("import");

        let candidates = db.duplicate_candidates(PROJECT).expect("candidates");
        let pairs = candidates
            .iter()
            .map(|candidate| (candidate.sku_a.code.as_str(), candidate.sku_b.code.as_str()))
            .collect::<Vec<_>>();
        assert_eq!(pairs, vec![("A1", "A2"), ("A1", "A3"), ("A2", "A3")]);
        assert!(candidates.iter().all(|candidate| candidate.similarity == 1.0));

        db.import_skus(PROJECT, &[sku_row(&[("code", "a3"), ("name", "Cinta roja")])])
            .expect("rename");
        assert_eq!(db.recompute_duplicates(PROJECT).expect("recompute"), 1);
        assert_eq!(db.duplicate_candidates(PROJECT).expect("candidates").len(), 1);
    }

    #[test]
    fn assign_location_sets_expected_and_sku() {
        let mut db = store();
        let locations = seed_locations(&mut db);
        db.import_skus(PROJECT, &[sku_row(&[("code", "s1")])])
            .expect("import");
        let sku_id = db.list_skus(PROJECT).expect("skus")[0].id.clone();

        let view = db
            .assign_location(
                PROJECT,
                &locations[0].id,
                LocationAssignment {
                    sku_id: Some(sku_id.clone()),
                    expected_qty: Some(12.0),
                },
            )
            .expect("assign");
        assert_eq!(view.expected_qty, Some(12.0));
        assert_eq!(view.sku_id, Some(sku_id));

        let err = db
            .assign_location(
                PROJECT,
                &locations[0].id,
                LocationAssignment {
                    sku_id: None,
                    expected_qty: Some(-1.0),
                },
            )
            .expect_err("negative expected");
        assert_eq!(err.inventory_kind(), Some(ErrorKind::Validation));

        let err = db
            .assign_location("other", &locations[0].id, LocationAssignment::default())
            .expect_err("foreign project");
        assert_eq!(err.inventory_kind(), Some(ErrorKind::NotFound));
    }

    #[test]
    fn assign_location_rejects_foreign_sku() {
        let mut db = store();
        let locations = seed_locations(&mut db);
        db.import_skus("proj-2", &[sku_row(&[("code", "s1")])])
            .expect("import");
        let foreign = db.list_skus("proj-2").expect("skus")[0].id.clone();

        let err = db
            .assign_location(
                PROJECT,
                &locations[1].id,
                LocationAssignment {
                    sku_id: Some(foreign),
                    expected_qty: None,
                },
            )
            .expect_err("foreign sku");
        assert_eq!(err.inventory_kind(), Some(ErrorKind::IntegrityViolation));
        assert_eq!(db.locations(PROJECT).expect("locations")[1].sku_id, None);
    }
}
