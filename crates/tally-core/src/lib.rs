use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

pub mod codes;
pub mod dedup;
pub mod error;
pub mod import;
pub mod provisioning;
pub mod reconcile;
pub mod views;

pub use error::{ensure_quantity, ErrorKind, InventoryError};

/// Placeholder unit for imported SKUs that carry none.
pub const DEFAULT_UOM: &str = "UND";

pub const LABEL_FORMAT: &str = "CODE128";

pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sku {
    pub id: String,
    pub project_id: String,
    pub code: String,
    pub name: String,
    pub uom: String,
    pub length: Option<f64>,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub weight: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Zone {
    pub id: String,
    pub project_id: String,
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub id: String,
    pub project_id: String,
    pub zone_id: String,
    pub rack_id: String,
    pub row: u32,
    pub level: u32,
    pub pos: u32,
    pub code: String,
    pub expected_qty: Option<f64>,
    pub sku_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CountStatus {
    Planned,
    Running,
    Closed,
}

impl CountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CountStatus::Planned => "planned",
            CountStatus::Running => "running",
            CountStatus::Closed => "closed",
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, CountStatus::Closed)
    }
}

impl fmt::Display for CountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CountStatus {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let normalized = input.trim().to_lowercase();
        match normalized.as_str() {
            "planned" => Ok(CountStatus::Planned),
            "running" => Ok(CountStatus::Running),
            "closed" => Ok(CountStatus::Closed),
            other => Err(format!("Unknown count status: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryCount {
    pub id: String,
    pub project_id: String,
    pub status: CountStatus,
    pub tolerance_pct: Option<f64>,
    pub planned_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryTask {
    pub id: String,
    pub count_id: String,
    pub zone_id: String,
    pub assigned_to_id: Option<String>,
    pub blind: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LabelType {
    Sku,
    Location,
}

impl LabelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LabelType::Sku => "sku",
            LabelType::Location => "location",
        }
    }
}

impl fmt::Display for LabelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LabelType {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let normalized = input.trim().to_lowercase();
        match normalized.as_str() {
            "sku" => Ok(LabelType::Sku),
            "location" | "loc" => Ok(LabelType::Location),
            other => Err(format!("Unknown label type: {other}")),
        }
    }
}

// Commands

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCount {
    #[serde(default)]
    pub tolerance_pct: Option<f64>,
}

/// Generic count update. `tolerance_pct` distinguishes an omitted field
/// (`None`) from an explicit `null` (`Some(None)`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountPatch {
    #[serde(default)]
    pub status: Option<CountStatus>,
    #[serde(
        default,
        deserialize_with = "deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub tolerance_pct: Option<Option<f64>>,
}

impl CountPatch {
    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.tolerance_pct.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTask {
    pub zone_id: String,
    #[serde(default)]
    pub assigned_to_id: Option<String>,
    #[serde(default = "default_blind")]
    pub blind: bool,
}

fn default_blind() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanInput {
    pub location_id: String,
    #[serde(default)]
    pub sku_id: Option<String>,
    pub qty: f64,
    #[serde(default)]
    pub device_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecountInput {
    pub qty2: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationAssignment {
    #[serde(default)]
    pub sku_id: Option<String>,
    #[serde(default)]
    pub expected_qty: Option<f64>,
}

/// Answers whether a user belongs to a project. Membership lives outside
/// this crate; callers plug in whatever directory they trust.
pub trait MemberDirectory {
    fn is_member(&self, project_id: &str, user_id: &str) -> bool;
}

impl<F> MemberDirectory for F
where
    F: Fn(&str, &str) -> bool,
{
    fn is_member(&self, project_id: &str, user_id: &str) -> bool {
        self(project_id, user_id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectRoster {
    members: HashMap<String, HashSet<String>>,
}

impl ProjectRoster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, project_id: impl Into<String>, user_id: impl Into<String>) {
        self.members
            .entry(project_id.into())
            .or_default()
            .insert(user_id.into());
    }
}

impl FromIterator<(String, Vec<String>)> for ProjectRoster {
    fn from_iter<I: IntoIterator<Item = (String, Vec<String>)>>(iter: I) -> Self {
        let mut roster = ProjectRoster::new();
        for (project_id, users) in iter {
            for user_id in users {
                roster.add(project_id.clone(), user_id);
            }
        }
        roster
    }
}

impl MemberDirectory for ProjectRoster {
    fn is_member(&self, project_id: &str, user_id: &str) -> bool {
        self.members
            .get(project_id)
            .is_some_and(|users| users.contains(user_id))
    }
}

/// Wraps a present value (including `null`) in `Some`, so an absent field
/// stays `None` through `#[serde(default)]`.
fn deserialize_present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}
