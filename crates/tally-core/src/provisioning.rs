use crate::codes::{build_location_code, normalize_code, sanitize_range_value};
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeAndName {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub name: Option<String>,
}

impl CodeAndName {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            name: None,
        }
    }
}

/// One zone/rack block to expand into locations. Axis bounds are raw
/// numbers; they are sanitized and may be given in either order. A missing
/// end bound repeats the start.
///
/// When decoded, the short keys (`row`, `level`, `pos`, `posStart`,
/// `posEnd`) only fill bounds whose canonical key is absent or `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "RawRangeDefinition")]
pub struct RangeDefinition {
    pub zone: CodeAndName,
    pub rack: CodeAndName,
    pub row_start: f64,
    pub row_end: Option<f64>,
    pub level_start: f64,
    pub level_end: Option<f64>,
    pub position_start: f64,
    pub position_end: Option<f64>,
}

// A missing zone or rack decodes as a blank code, which `plan` skips.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRangeDefinition {
    #[serde(default)]
    zone: Option<CodeAndName>,
    #[serde(default)]
    rack: Option<CodeAndName>,
    row_start: Option<f64>,
    row: Option<f64>,
    row_end: Option<f64>,
    level_start: Option<f64>,
    level: Option<f64>,
    level_end: Option<f64>,
    position_start: Option<f64>,
    pos_start: Option<f64>,
    pos: Option<f64>,
    position_end: Option<f64>,
    pos_end: Option<f64>,
}

impl From<RawRangeDefinition> for RangeDefinition {
    fn from(raw: RawRangeDefinition) -> Self {
        Self {
            zone: raw.zone.unwrap_or_default(),
            rack: raw.rack.unwrap_or_default(),
            row_start: raw.row_start.or(raw.row).unwrap_or_default(),
            row_end: raw.row_end.or(raw.row),
            level_start: raw.level_start.or(raw.level).unwrap_or_default(),
            level_end: raw.level_end.or(raw.level),
            position_start: raw
                .position_start
                .or(raw.pos_start)
                .or(raw.pos)
                .unwrap_or_default(),
            position_end: raw.position_end.or(raw.pos_end).or(raw.pos),
        }
    }
}

impl RangeDefinition {
    pub fn new(zone: &str, rack: &str) -> Self {
        Self {
            zone: CodeAndName::new(zone),
            rack: CodeAndName::new(rack),
            row_start: 0.0,
            row_end: None,
            level_start: 0.0,
            level_end: None,
            position_start: 0.0,
            position_end: None,
        }
    }

    pub fn rows(mut self, start: f64, end: f64) -> Self {
        self.row_start = start;
        self.row_end = Some(end);
        self
    }

    pub fn levels(mut self, start: f64, end: f64) -> Self {
        self.level_start = start;
        self.level_end = Some(end);
        self
    }

    pub fn positions(mut self, start: f64, end: f64) -> Self {
        self.position_start = start;
        self.position_end = Some(end);
        self
    }

    /// Resolves codes, names and axis ranges. Returns `None` when the zone
    /// or rack code normalizes to nothing; such definitions are skipped.
    pub fn plan(&self) -> Option<ProvisionPlan> {
        let zone_code = normalize_code(&self.zone.code);
        let rack_code = normalize_code(&self.rack.code);
        if zone_code.is_empty() || rack_code.is_empty() {
            return None;
        }

        Some(ProvisionPlan {
            zone_name: display_name(self.zone.name.as_deref(), &zone_code),
            rack_name: display_name(self.rack.name.as_deref(), &rack_code),
            zone_code,
            rack_code,
            rows: axis(self.row_start, self.row_end),
            levels: axis(self.level_start, self.level_end),
            positions: axis(self.position_start, self.position_end),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionPlan {
    pub zone_code: String,
    pub zone_name: String,
    pub rack_code: String,
    pub rack_name: String,
    pub rows: RangeInclusive<u32>,
    pub levels: RangeInclusive<u32>,
    pub positions: RangeInclusive<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationSlot {
    pub row: u32,
    pub level: u32,
    pub pos: u32,
    pub code: String,
}

impl ProvisionPlan {
    /// Slots in row, level, position order.
    pub fn slots(&self) -> impl Iterator<Item = LocationSlot> + '_ {
        self.rows.clone().flat_map(move |row| {
            self.levels.clone().flat_map(move |level| {
                self.positions.clone().map(move |pos| LocationSlot {
                    row,
                    level,
                    pos,
                    code: build_location_code(&self.zone_code, &self.rack_code, row, level, pos),
                })
            })
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionReport {
    pub created: u64,
    pub reused: u64,
    pub total: u64,
}

fn display_name(name: Option<&str>, code: &str) -> String {
    name.map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(code)
        .to_string()
}

fn axis(start: f64, end: Option<f64>) -> RangeInclusive<u32> {
    let start = sanitize_range_value(start);
    let end = end.map(sanitize_range_value).unwrap_or(start);
    start.min(end)..=start.max(end)
}
