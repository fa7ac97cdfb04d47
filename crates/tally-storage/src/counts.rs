use crate::rows::{
    clean_text, count_at, count_from_row, load_count, load_zone, now, timestamp_to_sql,
    COUNT_COLUMNS,
};
use crate::scans::task_scans;
use crate::variances::{reconcile_count, variance_views};
use crate::{InventoryStore, StorageError};
use rusqlite::{params, Connection};
use tally_core::views::{
    summarize_variances_by_sku, summarize_variances_by_zone, CountDetail, CountSummary,
    CountTotals, TaskDetail, TaskSummary, ZoneRef,
};
use tally_core::{
    ensure_quantity, new_id, CountPatch, CountStatus, InventoryCount, InventoryError,
    MemberDirectory, NewCount, NewTask,
};
use tracing::{debug, info};

impl InventoryStore {
    pub fn create_count(
        &mut self,
        project_id: &str,
        input: NewCount,
    ) -> Result<InventoryCount, StorageError> {
        let tolerance_pct = input
            .tolerance_pct
            .map(|pct| ensure_quantity("tolerancePct", pct))
            .transpose()?;

        let count = InventoryCount {
            id: new_id(),
            project_id: project_id.to_string(),
            status: CountStatus::Planned,
            tolerance_pct,
            planned_at: now(),
            started_at: None,
            closed_at: None,
        };

        self.conn.execute(
            "
            INSERT INTO inventory_counts (id, project_id, status, tolerance_pct, planned_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ",
            params![
                count.id,
                count.project_id,
                count.status.as_str(),
                count.tolerance_pct,
                timestamp_to_sql(count.planned_at),
            ],
        )?;

        info!(project_id, count_id = %count.id, ?tolerance_pct, "created count");
        Ok(count)
    }

    pub fn count(&self, count_id: &str) -> Result<Option<InventoryCount>, StorageError> {
        load_count(&self.conn, count_id)
    }

    /// Applies a status and/or tolerance change. Status only ever moves
    /// forward, and closing is reserved for [`InventoryStore::close_count`].
    pub fn update_count(
        &mut self,
        count_id: &str,
        patch: CountPatch,
    ) -> Result<InventoryCount, StorageError> {
        if let Some(Some(pct)) = patch.tolerance_pct {
            ensure_quantity("tolerancePct", pct)?;
        }

        let tx = self.conn.transaction()?;
        let count = load_count(&tx, count_id)?
            .ok_or_else(|| InventoryError::not_found("count", count_id))?;
        if patch.is_empty() {
            return Ok(count);
        }
        if count.status.is_closed() {
            return Err(InventoryError::InvalidState(format!("count {count_id} is closed")).into());
        }

        match patch.status {
            Some(CountStatus::Closed) => {
                return Err(InventoryError::InvalidState(
                    "counts can only be closed through close".to_string(),
                )
                .into());
            }
            Some(CountStatus::Planned) if count.status != CountStatus::Planned => {
                return Err(InventoryError::InvalidState(format!(
                    "count {count_id} cannot go back to planned"
                ))
                .into());
            }
            Some(CountStatus::Running) => {
                mark_running(&tx, count_id)?;
            }
            Some(CountStatus::Planned) | None => {}
        }

        if let Some(tolerance_pct) = patch.tolerance_pct {
            tx.execute(
                "UPDATE inventory_counts SET tolerance_pct = ?2 WHERE id = ?1",
                params![count_id, tolerance_pct],
            )?;
            debug!(count_id, ?tolerance_pct, "updated count tolerance");
        }

        let updated = load_count(&tx, count_id)?
            .ok_or_else(|| InventoryError::not_found("count", count_id))?;
        tx.commit()?;
        Ok(updated)
    }

    pub fn start_count(&mut self, count_id: &str) -> Result<InventoryCount, StorageError> {
        self.update_count(
            count_id,
            CountPatch {
                status: Some(CountStatus::Running),
                tolerance_pct: None,
            },
        )
    }

    /// Reconciles scans against the catalog and closes the count. Closing
    /// again recomputes the variances from the current data.
    pub fn close_count(&mut self, count_id: &str) -> Result<CountDetail, StorageError> {
        let keep_reasons = self.options.keep_variance_reasons;
        let tx = self.conn.transaction()?;
        let count = load_count(&tx, count_id)?
            .ok_or_else(|| InventoryError::not_found("count", count_id))?;
        if count.status == CountStatus::Planned {
            return Err(InventoryError::InvalidState(format!(
                "count {count_id} has not started"
            ))
            .into());
        }

        let generated = reconcile_count(&tx, &count, keep_reasons)?;
        tx.execute(
            "
            UPDATE inventory_counts
            SET status = 'closed', closed_at = ?2, started_at = COALESCE(started_at, ?2)
            WHERE id = ?1
            ",
            params![count_id, timestamp_to_sql(now())],
        )?;

        let detail = load_count_detail(&tx, count_id)?;
        tx.commit()?;
        info!(
            count_id,
            variances = generated,
            reclosed = count.status.is_closed(),
            "closed count"
        );
        Ok(detail)
    }

    /// Creates a task over one zone of the count's project.
    pub fn add_task(
        &mut self,
        count_id: &str,
        input: NewTask,
        members: &dyn MemberDirectory,
    ) -> Result<TaskSummary, StorageError> {
        let tx = self.conn.transaction()?;
        let count = load_count(&tx, count_id)?
            .ok_or_else(|| InventoryError::not_found("count", count_id))?;
        if count.status.is_closed() {
            return Err(InventoryError::InvalidState(format!("count {count_id} is closed")).into());
        }

        let zone = load_zone(&tx, &input.zone_id)?
            .filter(|zone| zone.project_id == count.project_id)
            .ok_or_else(|| InventoryError::not_found("zone", input.zone_id.as_str()))?;

        let assigned_to_id = clean_text(input.assigned_to_id.as_deref());
        if let Some(user_id) = assigned_to_id.as_deref() {
            if !members.is_member(&count.project_id, user_id) {
                return Err(InventoryError::Integrity(format!(
                    "user {user_id} is not a member of project {}",
                    count.project_id
                ))
                .into());
            }
        }

        let task_id = new_id();
        tx.execute(
            "
            INSERT INTO inventory_tasks (id, count_id, zone_id, assigned_to_id, blind, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ",
            params![
                task_id,
                count_id,
                zone.id,
                assigned_to_id,
                input.blind,
                timestamp_to_sql(now()),
            ],
        )?;
        tx.commit()?;

        debug!(count_id, task_id = %task_id, zone = %zone.code, "added count task");
        Ok(TaskSummary {
            id: task_id,
            zone: ZoneRef {
                id: zone.id,
                code: zone.code,
                name: zone.name,
            },
            assigned_to_id,
            blind: input.blind,
            scan_count: 0,
            recount_count: 0,
        })
    }

    /// Counts of a project, newest planned first.
    pub fn list_counts(&self, project_id: &str) -> Result<Vec<CountSummary>, StorageError> {
        let sql = format!(
            "
            SELECT {COUNT_COLUMNS}
            FROM inventory_counts
            WHERE project_id = ?1
            ORDER BY planned_at DESC, id DESC
            "
        );
        let counts = {
            let mut statement = self.conn.prepare(&sql)?;
            let rows = statement.query_map([project_id], count_from_row)?;
            let mut counts = Vec::new();
            for row in rows {
                counts.push(row?);
            }
            counts
        };

        let mut summaries = Vec::with_capacity(counts.len());
        for count in counts {
            let tasks = task_summaries(&self.conn, &count.id)?;
            let variances: i64 = self.conn.query_row(
                "SELECT COUNT(*) FROM inventory_variances WHERE count_id = ?1",
                [&count.id],
                |row| row.get(0),
            )?;
            let totals = CountTotals {
                tasks: tasks.len() as u64,
                scans: tasks.iter().map(|task| task.scan_count).sum(),
                recounts: tasks.iter().map(|task| task.recount_count).sum(),
                variances: u64::try_from(variances).unwrap_or_default(),
            };
            summaries.push(CountSummary {
                id: count.id,
                project_id: count.project_id,
                status: count.status,
                tolerance_pct: count.tolerance_pct,
                planned_at: count.planned_at,
                started_at: count.started_at,
                closed_at: count.closed_at,
                tasks,
                totals,
            });
        }
        Ok(summaries)
    }

    pub fn count_detail(&self, count_id: &str) -> Result<CountDetail, StorageError> {
        load_count_detail(&self.conn, count_id)
    }
}

/// Moves a planned count to running and stamps a missing `started_at`.
/// Guarded on the current status, so concurrent callers converge.
pub(crate) fn mark_running(conn: &Connection, count_id: &str) -> Result<(), StorageError> {
    let stamp = timestamp_to_sql(now());
    let started = conn.execute(
        "
        UPDATE inventory_counts
        SET status = 'running', started_at = COALESCE(started_at, ?2)
        WHERE id = ?1 AND status = 'planned'
        ",
        params![count_id, stamp],
    )?;
    if started > 0 {
        debug!(count_id, "count started");
        return Ok(());
    }

    conn.execute(
        "
        UPDATE inventory_counts
        SET started_at = ?2
        WHERE id = ?1 AND status = 'running' AND started_at IS NULL
        ",
        params![count_id, stamp],
    )?;
    Ok(())
}

fn task_summaries(conn: &Connection, count_id: &str) -> Result<Vec<TaskSummary>, StorageError> {
    let mut statement = conn.prepare(
        "
        SELECT t.id, t.assigned_to_id, t.blind, z.id, z.code, z.name,
               (SELECT COUNT(*) FROM inventory_scans s WHERE s.task_id = t.id),
               (SELECT COUNT(*)
                FROM inventory_recounts r
                JOIN inventory_scans s ON s.id = r.scan_id
                WHERE s.task_id = t.id)
        FROM inventory_tasks t
        JOIN warehouse_zones z ON z.id = t.zone_id
        WHERE t.count_id = ?1
        ORDER BY t.created_at ASC, t.id ASC
        ",
    )?;

    let rows = statement.query_map([count_id], |row| {
        Ok(TaskSummary {
            id: row.get(0)?,
            assigned_to_id: row.get(1)?,
            blind: row.get::<_, i64>(2)? != 0,
            zone: ZoneRef {
                id: row.get(3)?,
                code: row.get(4)?,
                name: row.get(5)?,
            },
            scan_count: count_at(row, 6)?,
            recount_count: count_at(row, 7)?,
        })
    })?;

    let mut tasks = Vec::new();
    for row in rows {
        tasks.push(row?);
    }
    Ok(tasks)
}

fn load_count_detail(conn: &Connection, count_id: &str) -> Result<CountDetail, StorageError> {
    let count =
        load_count(conn, count_id)?.ok_or_else(|| InventoryError::not_found("count", count_id))?;

    let mut tasks = Vec::new();
    for summary in task_summaries(conn, count_id)? {
        let scans = task_scans(conn, &summary.id)?;
        tasks.push(TaskDetail { summary, scans });
    }

    let variances = variance_views(conn, count_id)?;
    Ok(CountDetail {
        id: count.id,
        project_id: count.project_id,
        status: count.status,
        tolerance_pct: count.tolerance_pct,
        planned_at: count.planned_at,
        started_at: count.started_at,
        closed_at: count.closed_at,
        tasks,
        zone_summary: summarize_variances_by_zone(&variances),
        sku_summary: summarize_variances_by_sku(&variances),
        variances,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{planned_count, roster, seed_locations, store, PROJECT};
    use tally_core::{ErrorKind, LocationAssignment, ScanInput};

    fn scan(location_id: &str, qty: f64) -> ScanInput {
        ScanInput {
            location_id: location_id.to_string(),
            sku_id: None,
            qty,
            device_id: None,
        }
    }

    fn status_patch(status: CountStatus) -> CountPatch {
        CountPatch {
            status: Some(status),
            tolerance_pct: None,
        }
    }

    #[test]
    fn create_count_validates_tolerance() {
        let mut db = store();
        let count = db
            .create_count(PROJECT, NewCount { tolerance_pct: Some(2.5) })
            .expect("create");
        assert_eq!(count.status, CountStatus::Planned);
        assert_eq!(count.tolerance_pct, Some(2.5));
        assert_eq!(db.count(&count.id).expect("load"), Some(count));

        let err = db
            .create_count(PROJECT, NewCount { tolerance_pct: Some(-1.0) })
            .expect_err("negative tolerance");
        assert_eq!(err.inventory_kind(), Some(ErrorKind::Validation));
    }

    #[test]
    fn tolerance_patch_sets_and_clears() {
        let mut db = store();
        let count = db
            .create_count(PROJECT, NewCount { tolerance_pct: Some(5.0) })
            .expect("create");

        let unchanged = db
            .update_count(&count.id, status_patch(CountStatus::Planned))
            .expect("planned no-op");
        assert_eq!(unchanged.tolerance_pct, Some(5.0));

        let cleared = db
            .update_count(
                &count.id,
                CountPatch {
                    status: None,
                    tolerance_pct: Some(None),
                },
            )
            .expect("clear");
        assert_eq!(cleared.tolerance_pct, None);

        let set = db
            .update_count(
                &count.id,
                CountPatch {
                    status: None,
                    tolerance_pct: Some(Some(1.5)),
                },
            )
            .expect("set");
        assert_eq!(set.tolerance_pct, Some(1.5));
        assert_eq!(set.status, CountStatus::Planned);
    }

    #[test]
    fn lifecycle_only_moves_forward() {
        let mut db = store();
        let locations = seed_locations(&mut db);
        let (count_id, _) = planned_count(&mut db, &locations[0], None);

        let err = db.close_count(&count_id).expect_err("close planned");
        assert_eq!(err.inventory_kind(), Some(ErrorKind::InvalidState));

        let err = db
            .update_count(&count_id, status_patch(CountStatus::Closed))
            .expect_err("close via patch");
        assert_eq!(err.inventory_kind(), Some(ErrorKind::InvalidState));

        let running = db.start_count(&count_id).expect("start");
        assert_eq!(running.status, CountStatus::Running);
        let started_at = running.started_at.expect("started_at");

        let again = db.start_count(&count_id).expect("start again");
        assert_eq!(again.started_at, Some(started_at));

        let err = db
            .update_count(&count_id, status_patch(CountStatus::Planned))
            .expect_err("back to planned");
        assert_eq!(err.inventory_kind(), Some(ErrorKind::InvalidState));

        let closed = db.close_count(&count_id).expect("close");
        assert_eq!(closed.status, CountStatus::Closed);
        assert_eq!(closed.started_at, Some(started_at));
        assert!(closed.closed_at.is_some());

        for patch in [
            status_patch(CountStatus::Running),
            status_patch(CountStatus::Planned),
            CountPatch {
                status: None,
                tolerance_pct: Some(Some(1.0)),
            },
        ] {
            let err = db.update_count(&count_id, patch).expect_err("closed count");
            assert_eq!(err.inventory_kind(), Some(ErrorKind::InvalidState));
        }
        assert_eq!(
            db.count(&count_id).expect("load").expect("count").status,
            CountStatus::Closed
        );
    }

    #[test]
    fn first_scan_starts_a_planned_count() {
        let mut db = store();
        let locations = seed_locations(&mut db);
        let (count_id, task_id) = planned_count(&mut db, &locations[0], None);

        db.record_scan(&count_id, &task_id, scan(&locations[0].id, 1.0))
            .expect("scan");

        let count = db.count(&count_id).expect("load").expect("count");
        assert_eq!(count.status, CountStatus::Running);
        assert!(count.started_at.is_some());
        assert!(count.started_at.expect("started") >= count.planned_at);
    }

    #[test]
    fn add_task_checks_zone_and_membership() {
        let mut db = store();
        let locations = seed_locations(&mut db);
        let count = db
            .create_count(PROJECT, NewCount::default())
            .expect("create");

        let task = db
            .add_task(
                &count.id,
                NewTask {
                    zone_id: locations[0].zone_id.clone(),
                    assigned_to_id: Some("ana".to_string()),
                    blind: false,
                },
                &roster(),
            )
            .expect("member task");
        assert_eq!(task.zone.code, "A");
        assert_eq!(task.assigned_to_id.as_deref(), Some("ana"));
        assert!(!task.blind);

        let err = db
            .add_task(
                &count.id,
                NewTask {
                    zone_id: locations[0].zone_id.clone(),
                    assigned_to_id: Some("mallory".to_string()),
                    blind: true,
                },
                &roster(),
            )
            .expect_err("outsider");
        assert_eq!(err.inventory_kind(), Some(ErrorKind::IntegrityViolation));

        let err = db
            .add_task(
                &count.id,
                NewTask {
                    zone_id: "missing".to_string(),
                    assigned_to_id: None,
                    blind: true,
                },
                &|_: &str, _: &str| true,
            )
            .expect_err("missing zone");
        assert_eq!(err.inventory_kind(), Some(ErrorKind::NotFound));

        let foreign = db
            .create_count("proj-2", NewCount::default())
            .expect("foreign count");
        let err = db
            .add_task(
                &foreign.id,
                NewTask {
                    zone_id: locations[0].zone_id.clone(),
                    assigned_to_id: None,
                    blind: true,
                },
                &roster(),
            )
            .expect_err("zone of another project");
        assert_eq!(err.inventory_kind(), Some(ErrorKind::NotFound));
    }

    #[test]
    fn closed_counts_reject_new_tasks() {
        let mut db = store();
        let locations = seed_locations(&mut db);
        let (count_id, _) = planned_count(&mut db, &locations[0], None);
        db.start_count(&count_id).expect("start");
        db.close_count(&count_id).expect("close");

        let err = db
            .add_task(
                &count_id,
                NewTask {
                    zone_id: locations[0].zone_id.clone(),
                    assigned_to_id: None,
                    blind: true,
                },
                &roster(),
            )
            .expect_err("closed");
        assert_eq!(err.inventory_kind(), Some(ErrorKind::InvalidState));
    }

    #[test]
    fn closing_reports_variances_with_rollups() {
        let mut db = store();
        let locations = seed_locations(&mut db);
        db.assign_location(
            PROJECT,
            &locations[0].id,
            LocationAssignment {
                sku_id: None,
                expected_qty: Some(10.0),
            },
        )
        .expect("assign");
        let (count_id, task_id) = planned_count(&mut db, &locations[0], Some(5.0));

        db.record_scan(&count_id, &task_id, scan(&locations[0].id, 7.0))
            .expect("scan");
        db.record_scan(&count_id, &task_id, scan(&locations[1].id, 2.0))
            .expect("scan");

        let detail = db.close_count(&count_id).expect("close");
        assert_eq!(detail.variances.len(), 2);
        assert_eq!(detail.variances[0].location.code, "ZA-R1-N0101-P01");
        assert_eq!(detail.variances[0].difference, -3.0);
        assert_eq!(detail.variances[1].location.code, "ZA-R1-N0101-P02");
        assert_eq!(detail.variances[1].percentage, 100.0);

        assert_eq!(detail.tasks.len(), 1);
        assert_eq!(detail.tasks[0].summary.scan_count, 2);
        assert_eq!(detail.tasks[0].scans.len(), 2);
        assert_eq!(detail.zone_summary.len(), 1);
        assert_eq!(detail.zone_summary[0].totals.variance_count, 2);
        assert_eq!(detail.zone_summary[0].totals.difference_total, -1.0);
        assert_eq!(detail.sku_summary.len(), 1);
        assert_eq!(detail.sku_summary[0].sku_id, None);

        assert_eq!(db.count_detail(&count_id).expect("detail"), detail);
    }

    #[test]
    fn reclosing_yields_the_same_variances() {
        let mut db = store();
        let locations = seed_locations(&mut db);
        let (count_id, task_id) = planned_count(&mut db, &locations[0], None);
        db.record_scan(&count_id, &task_id, scan(&locations[3].id, 4.0))
            .expect("scan");

        let first = db.close_count(&count_id).expect("close");
        let second = db.close_count(&count_id).expect("close again");

        let shape = |detail: &CountDetail| {
            detail
                .variances
                .iter()
                .map(|variance| {
                    (
                        variance.location.id.clone(),
                        variance.sku.as_ref().map(|sku| sku.id.clone()),
                        variance.expected_qty,
                        variance.found_qty,
                        variance.difference,
                        variance.percentage,
                    )
                })
                .collect::<Vec<_>>()
        };
        assert_eq!(shape(&first), shape(&second));
        assert_eq!(second.variances.len(), 1);
        assert_eq!(second.status, CountStatus::Closed);
    }

    #[test]
    fn list_counts_puts_newest_first_with_totals() {
        let mut db = store();
        let locations = seed_locations(&mut db);
        let (older, task_id) = planned_count(&mut db, &locations[0], None);
        let scan_view = db
            .record_scan(&older, &task_id, scan(&locations[0].id, 3.0))
            .expect("scan");
        db.record_recount(
            &older,
            &task_id,
            &scan_view.id,
            tally_core::RecountInput { qty2: 2.0 },
        )
        .expect("recount");
        db.close_count(&older).expect("close");
        let newer = db
            .create_count(PROJECT, NewCount::default())
            .expect("create");

        let counts = db.list_counts(PROJECT).expect("list");
        assert_eq!(counts.len(), 2);
        assert_eq!(counts[0].id, newer.id);
        assert_eq!(counts[0].totals, CountTotals::default());
        assert_eq!(counts[1].id, older);
        assert_eq!(
            counts[1].totals,
            CountTotals {
                tasks: 1,
                scans: 1,
                recounts: 1,
                variances: 1,
            }
        );
        assert!(db.list_counts("proj-2").expect("list").is_empty());
    }

    #[test]
    fn unknown_count_is_not_found() {
        let mut db = store();
        assert_eq!(db.count("missing").expect("load"), None);
        for err in [
            db.start_count("missing").expect_err("start"),
            db.close_count("missing").expect_err("close"),
            db.count_detail("missing").expect_err("detail"),
        ] {
            assert_eq!(err.inventory_kind(), Some(ErrorKind::NotFound));
        }
    }
}
