//! Variance computation run when a count closes.
//!
//! Every catalog location is compared against the summed effective
//! quantities scanned for its `(location, sku)` key. Scanned keys that no
//! catalog location claims are reported afterwards with an expected
//! quantity of zero, which is how SKU mismatches surface.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Absolute slack for float comparisons on quantities and percentages.
pub const EPSILON: f64 = 1e-6;

/// Current catalog state of one location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogSlot {
    pub location_id: String,
    pub sku_id: Option<String>,
    pub expected_qty: Option<f64>,
}

/// One scan together with its recount, if any.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reading {
    pub location_id: String,
    pub sku_id: Option<String>,
    pub qty: f64,
    pub recount_qty: Option<f64>,
}

impl Reading {
    pub fn effective_qty(&self) -> f64 {
        self.recount_qty.unwrap_or(self.qty)
    }
}

/// Aggregation key. An empty `sku` stands for "no SKU".
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReadingKey {
    pub location_id: String,
    pub sku: String,
}

impl ReadingKey {
    pub fn new(location_id: &str, sku_id: Option<&str>) -> Self {
        Self {
            location_id: location_id.to_string(),
            sku: sku_id.unwrap_or_default().to_string(),
        }
    }

    pub fn sku_id(&self) -> Option<String> {
        if self.sku.is_empty() {
            None
        } else {
            Some(self.sku.clone())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VarianceDraft {
    pub location_id: String,
    pub sku_id: Option<String>,
    pub expected_qty: f64,
    pub found_qty: f64,
    pub difference: f64,
    pub percentage: f64,
}

impl VarianceDraft {
    fn evaluate(key: &ReadingKey, expected_qty: f64, found_qty: f64, tolerance: f64) -> Option<Self> {
        let difference = found_qty - expected_qty;
        let percentage = variance_percentage(expected_qty, found_qty);
        if !exceeds_tolerance(difference, percentage, tolerance) {
            return None;
        }
        Some(Self {
            location_id: key.location_id.clone(),
            sku_id: key.sku_id(),
            expected_qty,
            found_qty,
            difference,
            percentage,
        })
    }
}

/// Relative deviation in percent. With nothing expected, anything found
/// counts as a full 100%.
pub fn variance_percentage(expected_qty: f64, found_qty: f64) -> f64 {
    if expected_qty == 0.0 {
        if found_qty.abs() > 0.0 {
            100.0
        } else {
            0.0
        }
    } else {
        (found_qty - expected_qty).abs() / expected_qty.abs() * 100.0
    }
}

/// Both the absolute difference and the percentage over tolerance must
/// clear `EPSILON`.
pub fn exceeds_tolerance(difference: f64, percentage: f64, tolerance_pct: f64) -> bool {
    difference.abs() > EPSILON && percentage - tolerance_pct > EPSILON
}

pub fn aggregate_readings(readings: &[Reading]) -> BTreeMap<ReadingKey, f64> {
    let mut found = BTreeMap::new();
    for reading in readings {
        let key = ReadingKey::new(&reading.location_id, reading.sku_id.as_deref());
        *found.entry(key).or_insert(0.0) += reading.effective_qty();
    }
    found
}

/// Catalog slots are reported in the order given; leftover scanned keys
/// follow in key order.
pub fn compute_variances(
    catalog: &[CatalogSlot],
    readings: &[Reading],
    tolerance_pct: Option<f64>,
) -> Vec<VarianceDraft> {
    let tolerance = tolerance_pct.unwrap_or(0.0);
    let mut found = aggregate_readings(readings);
    let mut variances = Vec::new();

    for slot in catalog {
        let key = ReadingKey::new(&slot.location_id, slot.sku_id.as_deref());
        let expected_qty = slot.expected_qty.unwrap_or(0.0);
        let found_qty = found.remove(&key).unwrap_or(0.0);
        variances.extend(VarianceDraft::evaluate(&key, expected_qty, found_qty, tolerance));
    }

    for (key, found_qty) in found {
        variances.extend(VarianceDraft::evaluate(&key, 0.0, found_qty, tolerance));
    }

    variances
}
