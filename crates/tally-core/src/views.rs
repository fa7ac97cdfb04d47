//! Read projections handed to reporting, label rendering and the CLI.

use crate::CountStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Display name of the bucket collecting variances without a SKU.
pub const NO_SKU_NAME: &str = "(no sku)";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelInfo {
    pub id: String,
    pub printed_at: DateTime<Utc>,
    pub installed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkuView {
    pub id: String,
    pub code: String,
    pub name: String,
    pub uom: String,
    pub length: Option<f64>,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub weight: Option<f64>,
    pub label: Option<LabelInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneRef {
    pub id: String,
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RackRef {
    pub id: String,
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationView {
    pub id: String,
    pub code: String,
    pub row: u32,
    pub level: u32,
    pub pos: u32,
    pub expected_qty: Option<f64>,
    pub sku_id: Option<String>,
    pub zone: ZoneRef,
    pub rack: RackRef,
    pub label: Option<LabelInfo>,
}

impl LocationView {
    pub fn is_installed(&self) -> bool {
        self.label
            .as_ref()
            .is_some_and(|label| label.installed_at.is_some())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneSummary {
    pub zone_id: String,
    pub zone_code: String,
    pub zone_name: String,
    pub total_locations: u64,
    pub installed_locations: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationCatalog {
    pub locations: Vec<LocationView>,
    pub zones: Vec<ZoneSummary>,
}

impl LocationCatalog {
    pub fn new(locations: Vec<LocationView>) -> Self {
        let zones = summarize_zones(&locations);
        Self { locations, zones }
    }
}

/// Zone rollup sorted by zone code. A location is installed when its most
/// recently printed label carries an install timestamp.
pub fn summarize_zones(locations: &[LocationView]) -> Vec<ZoneSummary> {
    let mut zones: BTreeMap<String, ZoneSummary> = BTreeMap::new();
    for location in locations {
        let summary = zones
            .entry(location.zone.id.clone())
            .or_insert_with(|| ZoneSummary {
                zone_id: location.zone.id.clone(),
                zone_code: location.zone.code.clone(),
                zone_name: location.zone.name.clone(),
                total_locations: 0,
                installed_locations: 0,
            });
        summary.total_locations += 1;
        if location.is_installed() {
            summary.installed_locations += 1;
        }
    }

    let mut summaries = zones.into_values().collect::<Vec<_>>();
    summaries.sort_by(|a, b| a.zone_code.cmp(&b.zone_code));
    summaries
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationSummary {
    pub id: String,
    pub code: String,
    pub expected_qty: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkuSummary {
    pub id: String,
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanView {
    pub id: String,
    pub task_id: String,
    pub qty: f64,
    pub final_qty: f64,
    pub recount_qty: Option<f64>,
    pub captured_at: DateTime<Utc>,
    pub device_id: Option<String>,
    pub location: LocationSummary,
    pub sku: Option<SkuSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSummary {
    pub id: String,
    pub zone: ZoneRef,
    pub assigned_to_id: Option<String>,
    pub blind: bool,
    pub scan_count: u64,
    pub recount_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDetail {
    #[serde(flatten)]
    pub summary: TaskSummary,
    pub scans: Vec<ScanView>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountTotals {
    pub tasks: u64,
    pub scans: u64,
    pub recounts: u64,
    pub variances: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountSummary {
    pub id: String,
    pub project_id: String,
    pub status: CountStatus,
    pub tolerance_pct: Option<f64>,
    pub planned_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub tasks: Vec<TaskSummary>,
    pub totals: CountTotals,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VarianceLocation {
    pub id: String,
    pub code: String,
    pub expected_qty: Option<f64>,
    pub zone: ZoneRef,
    pub rack: RackRef,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VarianceView {
    pub id: String,
    pub count_id: String,
    pub expected_qty: f64,
    pub found_qty: f64,
    pub difference: f64,
    pub percentage: f64,
    pub reason: Option<String>,
    pub location: VarianceLocation,
    pub sku: Option<SkuSummary>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VarianceTotals {
    pub variance_count: u64,
    pub expected_total: f64,
    pub found_total: f64,
    pub difference_total: f64,
    pub absolute_difference: f64,
}

impl VarianceTotals {
    fn add(&mut self, variance: &VarianceView) {
        self.variance_count += 1;
        self.expected_total += variance.expected_qty;
        self.found_total += variance.found_qty;
        self.difference_total += variance.difference;
        self.absolute_difference += variance.difference.abs();
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneVarianceSummary {
    pub zone_id: String,
    pub zone_code: String,
    pub zone_name: String,
    #[serde(flatten)]
    pub totals: VarianceTotals,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkuVarianceSummary {
    pub sku_id: Option<String>,
    pub sku_code: String,
    pub sku_name: String,
    #[serde(flatten)]
    pub totals: VarianceTotals,
}

pub fn summarize_variances_by_zone(variances: &[VarianceView]) -> Vec<ZoneVarianceSummary> {
    let mut zones: BTreeMap<String, ZoneVarianceSummary> = BTreeMap::new();
    for variance in variances {
        let zone = &variance.location.zone;
        zones
            .entry(zone.id.clone())
            .or_insert_with(|| ZoneVarianceSummary {
                zone_id: zone.id.clone(),
                zone_code: zone.code.clone(),
                zone_name: zone.name.clone(),
                totals: VarianceTotals::default(),
            })
            .totals
            .add(variance);
    }

    let mut summaries = zones.into_values().collect::<Vec<_>>();
    summaries.sort_by(|a, b| a.zone_code.cmp(&b.zone_code));
    summaries
}

/// Per-SKU rollup sorted by SKU code; the no-SKU bucket comes last.
pub fn summarize_variances_by_sku(variances: &[VarianceView]) -> Vec<SkuVarianceSummary> {
    let mut skus: BTreeMap<Option<String>, SkuVarianceSummary> = BTreeMap::new();
    for variance in variances {
        let sku_id = variance.sku.as_ref().map(|sku| sku.id.clone());
        skus.entry(sku_id.clone())
            .or_insert_with(|| SkuVarianceSummary {
                sku_id,
                sku_code: variance
                    .sku
                    .as_ref()
                    .map(|sku| sku.code.clone())
                    .unwrap_or_default(),
                sku_name: variance
                    .sku
                    .as_ref()
                    .map(|sku| sku.name.clone())
                    .unwrap_or_else(|| NO_SKU_NAME.to_string()),
                totals: VarianceTotals::default(),
            })
            .totals
            .add(variance);
    }

    let mut summaries = skus.into_values().collect::<Vec<_>>();
    summaries.sort_by(|a, b| {
        a.sku_id
            .is_none()
            .cmp(&b.sku_id.is_none())
            .then_with(|| a.sku_code.cmp(&b.sku_code))
    });
    summaries
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountDetail {
    pub id: String,
    pub project_id: String,
    pub status: CountStatus,
    pub tolerance_pct: Option<f64>,
    pub planned_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub tasks: Vec<TaskDetail>,
    pub variances: Vec<VarianceView>,
    pub zone_summary: Vec<ZoneVarianceSummary>,
    pub sku_summary: Vec<SkuVarianceSummary>,
}

/// Flat variance row for spreadsheet export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarianceReportRow {
    pub location_code: String,
    pub zone_code: String,
    pub rack_code: String,
    pub sku_code: String,
    pub sku_name: String,
    pub expected_qty: f64,
    pub found_qty: f64,
    pub difference: f64,
    pub percentage: f64,
    pub reason: String,
}

impl From<&VarianceView> for VarianceReportRow {
    fn from(variance: &VarianceView) -> Self {
        Self {
            location_code: variance.location.code.clone(),
            zone_code: variance.location.zone.code.clone(),
            rack_code: variance.location.rack.code.clone(),
            sku_code: variance
                .sku
                .as_ref()
                .map(|sku| sku.code.clone())
                .unwrap_or_default(),
            sku_name: variance
                .sku
                .as_ref()
                .map(|sku| sku.name.clone())
                .unwrap_or_default(),
            expected_qty: variance.expected_qty,
            found_qty: variance.found_qty,
            difference: variance.difference,
            percentage: variance.percentage,
            reason: variance.reason.clone().unwrap_or_default(),
        }
    }
}

/// What a label renderer needs for one barcode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelPrintItem {
    pub label_id: String,
    pub code: String,
    pub title: String,
    pub subtitle: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstalledLabel {
    pub id: String,
    pub installed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateCandidateView {
    pub sku_a: SkuSummary,
    pub sku_b: SkuSummary,
    pub similarity: f64,
}
